use std::process::ExitCode;

use clap::Parser;
use mur::cli::{Cli, Command};
use mur::error::find_mur_error;
use mur::{artifact_build, cmd, install, logging, publish, uninstall};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbose = cli.verbose;
    logging::init(verbose);

    let result = match cli.command {
        Command::Build => artifact_build::run(verbose),
        Command::Publish => publish::run(),
        Command::Install(args) => install::run(args.name.as_deref(), verbose),
        Command::Uninstall(args) => uninstall::run(args.name.as_deref(), verbose),
        Command::Login(args) => cmd::login::run_login(args),
        Command::Logout => cmd::login::run_logout(),
        Command::Config(config_cmd) => cmd::config::run(config_cmd),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match find_mur_error(&err) {
                Some(mur) => eprintln!("{}", mur.render(verbose)),
                None => eprintln!("Error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
