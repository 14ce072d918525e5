use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "mur")]
#[command(version)]
#[command(about = "Build, publish and install Murmur agents and tools")]
pub struct Cli {
    /// Enable verbose output (debug logs, no spinners)
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the artifact described by murmur-build.yaml in the current directory
    Build,
    /// Publish the built artifact to the configured registry
    Publish,
    /// Install artifacts from murmur.yaml, or a single artifact by name
    Install(InstallArgs),
    /// Uninstall artifacts from murmur.yaml, or a single artifact by name
    Uninstall(UninstallArgs),
    /// Log in to the Murmur API and store credentials
    Login(LoginArgs),
    /// Remove stored credentials
    Logout,
    /// Manage .murmurrc configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Artifact to install at its latest version
    pub name: Option<String>,
}

#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// Artifact to uninstall
    pub name: Option<String>,
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Account username (prompted when omitted)
    #[arg(short, long)]
    pub username: Option<String>,
    /// Account password (prompted when omitted)
    #[arg(short, long)]
    pub password: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Set a key in the [murmur-nexus] table (e.g. index-url)
    Set(ConfigSetArgs),
    /// Show a key, local file first
    Get(ConfigGetArgs),
    /// List global and local settings
    List,
    /// Remove a key
    Unset(ConfigUnsetArgs),
    /// Create a .murmurrc with default registry settings
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigSetArgs {
    /// Config key (e.g. index-url, extra-index-url, server-url)
    pub key: String,
    /// Value to assign; whitespace separated for several extra-index-url entries
    pub value: String,
    /// Write to the global ~/.murmurrc even when a local file exists
    #[arg(long)]
    pub global: bool,
}

#[derive(Args, Debug)]
pub struct ConfigGetArgs {
    pub key: String,
}

#[derive(Args, Debug)]
pub struct ConfigUnsetArgs {
    pub key: String,
    /// Remove from the global ~/.murmurrc even when a local file exists
    #[arg(long)]
    pub global: bool,
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Create the global ~/.murmurrc instead of ./.murmurrc
    #[arg(long)]
    pub global: bool,
}
