use super::key::FragmentKey;
use chrono::{DateTime, Duration, DurationRound, NaiveDateTime, Utc};
use tracing::debug;

/// Time boundary deciding which day-hours are due for compaction.
///
/// Fixed for the duration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EligibilityWindow {
    /// Everything strictly before this instant is eligible.
    Cutoff(DateTime<Utc>),
    /// Everything whose hour falls in `[start, end]` (hour granularity) is eligible.
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl EligibilityWindow {
    /// Cutoff `days` before `now`, optionally pulled back to midnight UTC so a
    /// day is only ever picked up once all of its hours are past the cutoff.
    pub fn retention(days: u32, align_to_day: bool, now: DateTime<Utc>) -> Self {
        let cutoff = now - Duration::days(i64::from(days));
        let cutoff = if align_to_day {
            cutoff
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|midnight| midnight.and_utc())
                .unwrap_or(cutoff)
        } else {
            cutoff
        };
        EligibilityWindow::Cutoff(cutoff)
    }

    pub fn range(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        EligibilityWindow::Range { start, end }
    }

    /// Whether an hour starting at `instant` may be processed.
    pub fn contains(&self, instant: NaiveDateTime) -> bool {
        let instant = instant.and_utc();
        match *self {
            EligibilityWindow::Cutoff(cutoff) => instant < cutoff,
            EligibilityWindow::Range { start, end } => {
                let hour = Duration::hours(1);
                let (Ok(start), Ok(end)) = (start.duration_trunc(hour), end.duration_trunc(hour))
                else {
                    return false;
                };
                instant >= start && instant <= end
            }
        }
    }

    /// Eligibility of a decoded fragment. Invalid calendar dates are never eligible.
    pub fn is_eligible(&self, fragment: &FragmentKey) -> bool {
        let Some(instant) = fragment.timestamp() else {
            debug!(key = %fragment.storage_path, "Invalid calendar date; not processable");
            return false;
        };

        let eligible = self.contains(instant);
        if eligible {
            debug!(key = %fragment.storage_path, "Fragment falls within processable window");
        } else {
            debug!(key = %fragment.storage_path, "Fragment is outside processable window");
        }
        eligible
    }
}
