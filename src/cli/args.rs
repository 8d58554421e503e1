use crate::config::types::{Config, WindowConfig};
use chrono::{DateTime, Utc};
use clap::Args;

/// Command-line settings layered over the config file.
///
/// Every flag can also come from the environment, so the binary can run
/// with no config file at all.
#[derive(Args, Debug, Clone, Default)]
pub struct Overrides {
    /// Bucket holding the CloudFront logs
    #[arg(long, short = 'b', env = "BUCKET", global = true)]
    pub bucket: Option<String>,

    /// Folder (or, with --partial-matching, key prefix) the logs live under
    #[arg(long, short = 'p', env = "PREFIX", global = true)]
    pub prefix: Option<String>,

    /// Use --prefix as-is instead of treating it as a folder
    #[arg(long, short = 'm', env = "PARTIAL_MATCHING", global = true)]
    pub partial_matching: bool,

    /// Distribution ids to process, in order
    #[arg(long, short = 'c', env = "CFIDS", value_delimiter = ' ', num_args = 1.., global = true)]
    pub cfids: Vec<String>,

    /// Hours processed concurrently within a day
    #[arg(long, short = 'w', env = "MAX_WORKERS", global = true)]
    pub max_workers: Option<usize>,

    /// Leave the most recent N days untouched
    #[arg(long, env = "RETENTION_DAYS", conflicts_with_all = ["start", "end"], global = true)]
    pub retention_days: Option<u32>,

    /// Start of an explicit range to process (RFC 3339)
    #[arg(long, env = "START", requires = "end", global = true)]
    pub start: Option<DateTime<Utc>>,

    /// End of an explicit range to process, inclusive (RFC 3339)
    #[arg(long, env = "END", requires = "start", global = true)]
    pub end: Option<DateTime<Utc>>,

    #[arg(long, env = "AWS_REGION", global = true)]
    pub region: Option<String>,

    /// Custom S3 endpoint URL
    #[arg(long, env = "S3_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    #[arg(long, short = 'k', env = "AWS_ACCESS_KEY_ID", global = true, hide_env_values = true)]
    pub aws_access_key_id: Option<String>,

    #[arg(long, short = 's', env = "AWS_SECRET_ACCESS_KEY", global = true, hide_env_values = true)]
    pub aws_secret_access_key: Option<String>,
}

impl Overrides {
    /// Write every flag that was given over the matching config field.
    pub fn apply(&self, config: &mut Config) {
        if let Some(bucket) = &self.bucket {
            config.bucket = bucket.clone();
        }
        if let Some(prefix) = &self.prefix {
            config.prefix = Some(prefix.clone());
        }
        if self.partial_matching {
            config.partial_matching = true;
        }
        if !self.cfids.is_empty() {
            config.distribution_ids = self
                .cfids
                .iter()
                .filter(|id| !id.is_empty())
                .cloned()
                .collect();
        }
        if let Some(workers) = self.max_workers {
            config.max_workers = Some(workers);
        }

        if let (Some(start), Some(end)) = (self.start, self.end) {
            config.window = WindowConfig::Range { start, end };
        } else if let Some(days) = self.retention_days {
            let align_to_day = match config.window {
                WindowConfig::Retention { align_to_day, .. } => align_to_day,
                WindowConfig::Range { .. } => true,
            };
            config.window = WindowConfig::Retention { days, align_to_day };
        }

        if let Some(region) = &self.region {
            config.s3.region = Some(region.clone());
        }
        if let Some(endpoint) = &self.endpoint {
            config.s3.endpoint = Some(endpoint.clone());
        }
        if let Some(key) = &self.aws_access_key_id {
            config.s3.access_key_id = Some(key.clone());
        }
        if let Some(secret) = &self.aws_secret_access_key {
            config.s3.secret_access_key = Some(secret.clone());
        }
    }
}
