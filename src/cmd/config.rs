use anyhow::{Result, bail};

use crate::cli::ConfigCommand;
use crate::config::{RcFile, RcPaths, Scope};
use crate::error::{MurError, codes};

pub fn run(command: ConfigCommand) -> Result<()> {
    let paths = RcPaths::discover()?;
    match command {
        ConfigCommand::Set(args) => set_value(&paths, &args.key, &args.value, args.global),
        ConfigCommand::Get(args) => get_value(&paths, &args.key).map(|_| ()),
        ConfigCommand::List => list_values(&paths),
        ConfigCommand::Unset(args) => unset_value(&paths, &args.key, args.global).map(|_| ()),
        ConfigCommand::Init(args) => init_file(&paths, args.global).map(|_| ()),
    }
}

pub fn set_value(paths: &RcPaths, key: &str, value_str: &str, force_global: bool) -> Result<()> {
    let (path, scope) = paths.write_target(force_global);
    let result = (|| -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            bail!("config key cannot be empty");
        }
        let mut rc = RcFile::load(path)?;
        rc.set(key, value_str);
        rc.save(path)
    })();
    result.map_err(|err| {
        MurError::new(codes::CONFIG_SET, format!("Failed to set {key} in configuration"))
            .with_source(err)
    })?;
    println!("✓ Set {key}={value_str} in {} .murmurrc", scope.label());
    Ok(())
}

/// Looks the key up locally first, then globally.
pub fn get_value(paths: &RcPaths, key: &str) -> Result<Option<(String, Scope)>> {
    let found = (|| -> Result<Option<(String, Scope)>> {
        for scope in [Scope::Local, Scope::Global] {
            let path = paths.path(scope);
            if !path.exists() {
                continue;
            }
            let rc = RcFile::load(path)?;
            if let Some(value) = rc.get(key) {
                return Ok(Some((value.to_string(), scope)));
            }
        }
        Ok(None)
    })()
    .map_err(|err| {
        MurError::new(codes::CONFIG_GET, format!("Failed to get configuration for {key}"))
            .with_source(err)
    })?;

    match &found {
        Some((value, scope)) => println!("{key}: {value} ({})", scope.label()),
        None => println!("Configuration key '{key}' not found in local or global .murmurrc"),
    }
    Ok(found)
}

pub fn list_values(paths: &RcPaths) -> Result<()> {
    let listed = (|| -> Result<Vec<(Scope, Vec<(String, String)>)>> {
        let mut out = Vec::new();
        for scope in [Scope::Global, Scope::Local] {
            let path = paths.path(scope);
            if !path.exists() {
                continue;
            }
            let entries = RcFile::load(path)?.entries();
            if !entries.is_empty() {
                out.push((scope, entries));
            }
        }
        Ok(out)
    })()
    .map_err(|err| MurError::new(codes::CONFIG_LIST, "Failed to list configurations").with_source(err))?;

    if listed.is_empty() {
        println!("No configuration values found");
        return Ok(());
    }
    for (scope, entries) in listed {
        let title = match scope {
            Scope::Global => "Global",
            Scope::Local => "Local",
        };
        println!("\n{title} settings (.murmurrc):");
        println!("Path: {}", paths.path(scope).display());
        for (key, value) in entries {
            println!("{key}: {value}");
        }
    }
    Ok(())
}

/// Returns whether the key was present.
pub fn unset_value(paths: &RcPaths, key: &str, force_global: bool) -> Result<bool> {
    let (path, scope) = paths.write_target(force_global);
    let removed = (|| -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        let mut rc = RcFile::load(path)?;
        let removed = rc.remove(key).is_some();
        if removed {
            rc.save(path)?;
        }
        Ok(removed)
    })()
    .map_err(|err| {
        MurError::new(codes::CONFIG_UNSET, format!("Failed to unset configuration for {key}"))
            .with_source(err)
    })?;

    if removed {
        println!("✓ Removed {key} from {} .murmurrc", scope.label());
    } else {
        println!("Configuration key '{key}' not found in {} .murmurrc", scope.label());
    }
    Ok(removed)
}

/// Returns whether a new file was written.
pub fn init_file(paths: &RcPaths, global: bool) -> Result<bool> {
    let scope = if global { Scope::Global } else { Scope::Local };
    let other = if global { Scope::Local } else { Scope::Global };
    let path = paths.path(scope);
    let hint = (!paths.path(other).exists()).then(|| {
        format!(
            "\nTo create a {} config instead, run: mur config init{}",
            other.label(),
            if global { "" } else { " --global" }
        )
    });

    if path.exists() {
        let title = if global { "Global" } else { "Local" };
        println!(
            "{title} .murmurrc already exists at: {}{}",
            path.display(),
            hint.unwrap_or_default()
        );
        return Ok(false);
    }

    RcFile::with_defaults().save(path).map_err(|err| {
        MurError::new(codes::CONFIG_INIT, format!("Failed to create {} .murmurrc", scope.label()))
            .with_source(err)
    })?;

    println!(
        "✓ Created {} .murmurrc at: {}{}",
        scope.label(),
        path.display(),
        hint.unwrap_or_default()
    );
    Ok(true)
}
