pub mod generate;
pub mod parse;
pub mod types;

use regex::Regex;
use std::path::{Path, PathBuf};

pub use parse::{load_config, parse_config, read_config, validate_config, ConfigError};
pub use types::{Config, S3Config, WindowConfig};

/// Expands environment variables in a string.
/// Supports $env{VAR_NAME} syntax.
/// If an environment variable is not set, it's left unchanged.
pub fn expand_env_vars(text: &str) -> String {
    // Pattern matches $env{VAR_NAME} where VAR_NAME starts with letter or underscore,
    // followed by alphanumeric characters or underscores
    let Ok(re) = Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}") else {
        return text.to_string();
    };

    re.replace_all(text, |caps: &regex::Captures| {
        let var_name = &caps[1];

        // If not set, leave the original match unchanged
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .to_string()
}

/// Expands tilde (~) in paths to the user's home directory.
/// If the path starts with "~/" or is exactly "~", replaces it with the home directory.
/// Returns the path unchanged if it doesn't start with tilde or home directory cannot be determined.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if path_str.starts_with("~/") {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(&path_str[2..]);
        }
    } else if path_str == "~" {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir;
        }
    }

    path.to_path_buf()
}

/// Resolves the config file path based on explicit argument or default locations.
/// Returns the first existing path from:
/// 1. Explicit path (if provided, with tilde expansion)
/// 2. ~/.config/cf-log-compactor/config.yml
/// 3. /etc/cf-log-compactor/config.yml
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        // Expand tilde if present
        return Some(expand_tilde(path));
    }

    // Check ~/.config/cf-log-compactor/config.yml
    if let Some(home_dir) = dirs::home_dir() {
        let user_config = home_dir.join(".config/cf-log-compactor/config.yml");
        if user_config.exists() {
            return Some(user_config);
        }
    }

    // Check /etc/cf-log-compactor/config.yml
    let system_config = PathBuf::from("/etc/cf-log-compactor/config.yml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}
