use super::types::*;
use crate::config::{expand_env_vars, expand_tilde};
use regex::Regex;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config)?;
    Ok(config)
}

/// Read and parse a config file without validating it, for callers that
/// layer more settings on top before checking the result.
pub fn read_config(path: &Path) -> Result<Config, ConfigError> {
    use std::io::Read;

    let mut file = File::open(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut yaml_string = String::new();
    file.read_to_string(&mut yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    let config = parse_unvalidated(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(e) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        )),
        other => other,
    })?;

    Ok(config)
}

/// Parse and validate config from a YAML string.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    let config = parse_unvalidated(yaml)?;
    validate_config(&config)?;
    Ok(config)
}

fn parse_unvalidated(yaml: &str) -> Result<Config, ConfigError> {
    // Credentials are usually injected through the environment
    let yaml = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml)?;

    let mut config: Config = serde_yaml::from_str(&yaml)?;

    if let Some(scratch_dir) = &config.scratch_dir {
        config.scratch_dir = Some(expand_tilde(scratch_dir));
    }

    Ok(config)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let re = Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| ConfigError::Validation(e.to_string()))?;
    // Commented-out lines are never read, so a placeholder there is harmless
    let mut unexpanded_vars: Vec<String> = yaml_string
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .flat_map(|line| re.captures_iter(line))
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    let error_msg = if unexpanded_vars.len() == 1 {
        format!(
            "Environment variable $env{{{0}}} is not set.\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variable: export {0}=...\n\
             2. Replace $env{{{0}}} in the config file with the actual value",
            unexpanded_vars[0]
        )
    } else {
        format!(
            "Environment variables are not set: {}\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variables (e.g., export AWS_ACCESS_KEY_ID=...)\n\
             2. Replace the variables in the config file with actual values",
            unexpanded_vars.join(", ")
        )
    };

    Err(ConfigError::Validation(error_msg))
}

/// Validate a config, reporting every problem at once.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.bucket.trim().is_empty() {
        errors.push("bucket is required and cannot be empty".to_string());
    }

    if config.max_workers == Some(0) {
        errors.push("max_workers must be at least 1".to_string());
    }

    if config.download_concurrency == 0 {
        errors.push("download_concurrency must be at least 1".to_string());
    }

    let mut seen = HashSet::new();
    for (i, id) in config.distribution_ids.iter().enumerate() {
        if id.trim().is_empty() {
            errors.push(format!("distribution_ids[{}]: id cannot be empty", i));
        } else if id.contains('/') || id.contains('.') {
            errors.push(format!(
                "distribution_ids[{}]: '{}' cannot contain '/' or '.'",
                i, id
            ));
        } else if !seen.insert(id) {
            errors.push(format!("distribution_ids[{}]: duplicate id '{}'", i, id));
        }
    }

    match &config.window {
        WindowConfig::Range { start, end } if start > end => {
            errors.push(format!(
                "window: range start {} is after end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            ));
        }
        _ => {}
    }

    if config.s3.access_key_id.is_some() != config.s3.secret_access_key.is_some() {
        errors.push(
            "s3: access_key_id and secret_access_key must be provided together".to_string(),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}
