use crate::fragment::EligibilityWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Required, but may be left out of the file and supplied on the command line.
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub prefix: Option<String>,
    /// Use `prefix` verbatim instead of treating it as a folder.
    #[serde(default)]
    pub partial_matching: bool,
    /// Distributions to process in series. Empty means the whole bucket/prefix.
    #[serde(default, deserialize_with = "deserialize_distribution_ids")]
    pub distribution_ids: Vec<String>,
    /// Hours compacted concurrently within a day. Defaults to the core count.
    #[serde(default)]
    pub max_workers: Option<usize>,
    /// Simultaneous fragment downloads per hour.
    #[serde(default = "default_download_concurrency")]
    pub download_concurrency: usize,
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    /// Move on to the next distribution after one fails.
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub s3: S3Config,
}

fn default_download_concurrency() -> usize {
    6
}

fn deserialize_distribution_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    // Accept either a YAML list or a single space-separated string
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Ids {
        Joined(String),
        List(Vec<String>),
    }

    Ok(match Ids::deserialize(deserializer)? {
        Ids::Joined(joined) => joined.split_whitespace().map(str::to_string).collect(),
        Ids::List(list) => list,
    })
}

impl Config {
    /// Minimal config for a bucket, everything else defaulted.
    pub fn for_bucket(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: None,
            partial_matching: false,
            distribution_ids: Vec::new(),
            max_workers: None,
            download_concurrency: default_download_concurrency(),
            scratch_dir: None,
            continue_on_error: false,
            window: WindowConfig::default(),
            s3: S3Config::default(),
        }
    }

    /// The listing prefix, with a trailing `/` unless partial matching is on.
    pub fn normalized_prefix(&self) -> String {
        match self.prefix.as_deref() {
            None | Some("") => String::new(),
            Some(prefix) if !self.partial_matching && !prefix.ends_with('/') => {
                format!("{}/", prefix)
            }
            Some(prefix) => prefix.to_string(),
        }
    }

    pub fn effective_max_workers(&self) -> usize {
        self.max_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn eligibility_window(&self, now: DateTime<Utc>) -> EligibilityWindow {
        self.window.to_window(now)
    }
}

/// Which day-hours are due for compaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum WindowConfig {
    /// Keep the last `days` days untouched.
    Retention {
        #[serde(default = "default_retention_days")]
        days: u32,
        #[serde(default = "default_align_to_day")]
        align_to_day: bool,
    },
    /// Process an explicit, inclusive range.
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

fn default_retention_days() -> u32 {
    45
}

fn default_align_to_day() -> bool {
    true
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig::Retention {
            days: default_retention_days(),
            align_to_day: default_align_to_day(),
        }
    }
}

impl WindowConfig {
    pub fn to_window(&self, now: DateTime<Utc>) -> EligibilityWindow {
        match *self {
            WindowConfig::Retention { days, align_to_day } => {
                EligibilityWindow::retention(days, align_to_day, now)
            }
            WindowConfig::Range { start, end } => EligibilityWindow::range(start, end),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Config {
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint URL (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_normalization() {
        let mut config = Config::for_bucket("logs");
        assert_eq!(config.normalized_prefix(), "");

        config.prefix = Some("cloudfront".to_string());
        assert_eq!(config.normalized_prefix(), "cloudfront/");

        config.prefix = Some("cloudfront/".to_string());
        assert_eq!(config.normalized_prefix(), "cloudfront/");

        config.prefix = Some("cloudfront/E2".to_string());
        config.partial_matching = true;
        assert_eq!(config.normalized_prefix(), "cloudfront/E2");
    }

    #[test]
    fn test_distribution_ids_accepts_string_or_list() {
        let config: Config = serde_yaml::from_str("bucket: b\ndistribution_ids: E1 E2  E3\n").unwrap();
        assert_eq!(config.distribution_ids, vec!["E1", "E2", "E3"]);

        let config: Config = serde_yaml::from_str("bucket: b\ndistribution_ids: [E1, E2]\n").unwrap();
        assert_eq!(config.distribution_ids, vec!["E1", "E2"]);
    }

    #[test]
    fn test_defaults() {
        let config: Config = serde_yaml::from_str("bucket: b\n").unwrap();
        assert_eq!(config.download_concurrency, 6);
        assert!(!config.continue_on_error);
        assert_eq!(
            config.window,
            WindowConfig::Retention {
                days: 45,
                align_to_day: true
            }
        );
        assert!(config.effective_max_workers() >= 1);
    }

    #[test]
    fn test_range_window() {
        let yaml = "bucket: b\nwindow:\n  mode: range\n  start: 2023-05-01T00:00:00Z\n  end: 2023-05-31T23:00:00Z\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(config.window, WindowConfig::Range { .. }));
    }
}
