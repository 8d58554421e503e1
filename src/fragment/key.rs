use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use tracing::debug;

/// A calendar day as it appears in fragment names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl LogDate {
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    /// Builds the instant at the start of `hour` on this day.
    /// Returns `None` when the fields don't form a real calendar date.
    pub fn at_hour(&self, hour: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)?.and_hms_opt(hour, 0, 0)
    }
}

impl fmt::Display for LogDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// One raw access-log fragment object, decoded from its key.
///
/// Fragment file names look like `E2ABC.2023-05-01-00.a1b2c3.gz`: four
/// dot-separated parts where the second is `year-month-day-hour`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentKey {
    pub distribution_id: String,
    pub date: LogDate,
    pub hour: u32,
    pub suffix: String,
    pub extension: String,
    /// Everything in the key before the file name, including the trailing `/`.
    pub directory: String,
    pub storage_path: String,
}

impl FragmentKey {
    /// Decode an object key. Keys that don't follow the fragment naming scheme
    /// yield `None`; callers treat them as ineligible.
    pub fn decode(key: &str) -> Option<Self> {
        let (directory, file_name) = match key.rfind('/') {
            Some(idx) => (&key[..=idx], &key[idx + 1..]),
            None => ("", key),
        };

        let parts: Vec<&str> = file_name.split('.').collect();
        if parts.len() != 4 {
            debug!(key = %key, "File name doesn't have four dot-separated parts");
            return None;
        }

        let date_parts: Vec<&str> = parts[1].split('-').collect();
        if date_parts.len() != 4 {
            debug!(key = %key, "Date part doesn't have four dash-separated fields");
            return None;
        }

        let year = date_parts[0].parse::<i32>().ok();
        let month = date_parts[1].parse::<u32>().ok();
        let day = date_parts[2].parse::<u32>().ok();
        let hour = date_parts[3].parse::<u32>().ok();

        let (Some(year), Some(month), Some(day), Some(hour)) = (year, month, day, hour) else {
            debug!(key = %key, "Date fields are not all numbers");
            return None;
        };

        Some(Self {
            distribution_id: parts[0].to_string(),
            date: LogDate::new(year, month, day),
            hour,
            suffix: parts[2].to_string(),
            extension: parts[3].to_string(),
            directory: directory.to_string(),
            storage_path: key.to_string(),
        })
    }

    /// Build the key for a fragment from its parts.
    pub fn encode(
        directory: &str,
        distribution_id: &str,
        date: LogDate,
        hour: u32,
        suffix: &str,
        extension: &str,
    ) -> String {
        format!(
            "{}{}.{}",
            hour_prefix(directory, distribution_id, date, hour),
            suffix,
            extension
        )
    }

    /// The last path segment of the key.
    pub fn file_name(&self) -> &str {
        file_name(&self.storage_path)
    }

    /// The instant this fragment's hour starts, if it is a valid calendar date.
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.date.at_hour(self.hour)
    }
}

/// The last `/`-separated segment of an object key.
pub fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Listing prefix that matches every fragment for one distribution-hour,
/// e.g. `logs/E2ABC.2023-05-01-07.`
pub fn hour_prefix(directory: &str, distribution_id: &str, date: LogDate, hour: u32) -> String {
    format!("{}{}.{}-{:02}.", directory, distribution_id, date, hour)
}

/// Object key of the compacted archive for one distribution-hour.
pub fn archive_key(prefix: &str, distribution_id: &str, date: LogDate, hour: u32) -> String {
    format!(
        "{}processed/{}/{}/{:02}/{:02}/{:02}.gz",
        prefix, distribution_id, date.year, date.month, date.day, hour
    )
}
