use crate::config::generate::generate_starter_config;
use std::fs;
use std::path::PathBuf;

pub fn init(stdout: bool, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_content = generate_starter_config();

    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    let config_path = default_config_path();

    if config_path.exists() && !force {
        return Err(format!(
            "config file already exists at {}; remove it, pass --force, or use --stdout",
            config_path.display()
        )
        .into());
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&config_path, config_content)?;

    println!("Config file written to {}", config_path.display());
    Ok(())
}

/// `~/.config/cf-log-compactor/config.yml`, or the system location when
/// there is no home directory.
fn default_config_path() -> PathBuf {
    match dirs::home_dir() {
        Some(home_dir) => home_dir.join(".config/cf-log-compactor/config.yml"),
        None => PathBuf::from("/etc/cf-log-compactor/config.yml"),
    }
}

pub fn validate(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path.ok_or("no config file found; use --config to specify a path")?;

    println!("Validating config file: {}", path.display());
    crate::config::load_config(&path)?;
    println!("Config is valid");
    Ok(())
}
