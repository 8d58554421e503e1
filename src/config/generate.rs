pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# CF-LOG-COMPACTOR CONFIGURATION
# =============================================================================
# Compacts hourly CloudFront access-log fragments older than a retention window
# into one cleaned archive per distribution-hour:
#
#   {prefix}processed/{distribution}/{year}/{month}/{day}/{hour}.gz
#
# The source fragments are deleted once their archive has been written.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/cf-log-compactor/config.yml
#   3. /etc/cf-log-compactor/config.yml
#
# Any value may reference an environment variable as $env{NAME}.

# Bucket the distributions deliver their logs to (required)
bucket: my-cloudfront-logs

# Folder the fragments live in. A trailing '/' is added unless
# partial_matching is true, in which case the prefix is matched verbatim.
prefix: cloudfront
partial_matching: false

# Distributions to process, one after another. Leave empty to process
# everything under the prefix.
distribution_ids: []

# Hours compacted in parallel within one day (defaults to the core count)
# max_workers: 4

# Simultaneous fragment downloads per hour
download_concurrency: 6

# Where per-hour scratch directories are created (defaults to the system temp dir)
# scratch_dir: ~/tmp

# Keep going with the next distribution when one fails. The first error is
# still reported at the end of the run.
continue_on_error: false

# -----------------------------------------------------------------------------
# WINDOW
# -----------------------------------------------------------------------------
# retention: compact everything older than `days`, measured from midnight UTC
#            when align_to_day is true
# range:     compact everything between start and end (inclusive, hourly)
window:
  mode: retention
  days: 45
  align_to_day: true
# window:
#   mode: range
#   start: 2023-05-01T00:00:00Z
#   end: 2023-05-31T23:00:00Z

# -----------------------------------------------------------------------------
# S3
# -----------------------------------------------------------------------------
# Omit credentials to use the default AWS provider chain.
s3:
  region: us-east-1
  # endpoint: http://localhost:9000
  # access_key_id: $env{AWS_ACCESS_KEY_ID}
  # secret_access_key: $env{AWS_SECRET_ACCESS_KEY}
  # profile: logs-admin
"#
    .to_string()
}
