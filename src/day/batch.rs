use crate::fragment::{archive_key, hour_prefix, FragmentKey, LogDate};
use std::fmt;

pub const HOURS_PER_DAY: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayState {
    Pending,
    Running,
    Complete,
    Failed,
}

/// One calendar day of one distribution, split into hour jobs.
///
/// Hours before `start_hour` were archived by an earlier run and start out
/// complete. Only the orchestrator driving the batch mutates it.
#[derive(Debug, Clone)]
pub struct DayBatch {
    pub distribution_id: String,
    pub date: LogDate,
    pub start_hour: u32,
    /// Folder the day's fragments live in (with trailing `/`, or empty).
    pub directory: String,
    completion: [bool; HOURS_PER_DAY],
    state: DayState,
}

impl DayBatch {
    pub fn new(
        distribution_id: impl Into<String>,
        date: LogDate,
        start_hour: u32,
        directory: impl Into<String>,
    ) -> Self {
        let mut completion = [false; HOURS_PER_DAY];
        for (hour, done) in completion.iter_mut().enumerate() {
            *done = (hour as u32) < start_hour;
        }

        Self {
            distribution_id: distribution_id.into(),
            date,
            start_hour,
            directory: directory.into(),
            completion,
            state: DayState::Pending,
        }
    }

    /// Seed a batch from the earliest eligible fragment the probe found.
    pub fn from_fragment(fragment: &FragmentKey) -> Self {
        Self::new(
            fragment.distribution_id.clone(),
            fragment.date,
            fragment.hour,
            fragment.directory.clone(),
        )
    }

    /// Hours still needing work, ascending.
    pub fn pending_hours(&self) -> Vec<u32> {
        self.completion
            .iter()
            .enumerate()
            .filter(|(_, done)| !**done)
            .map(|(hour, _)| hour as u32)
            .collect()
    }

    /// Record an hour as archived. Returns false if it was already complete
    /// or out of range.
    pub fn mark_complete(&mut self, hour: u32) -> bool {
        match self.completion.get_mut(hour as usize) {
            Some(done) if !*done => {
                *done = true;
                true
            }
            _ => false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completion.iter().all(|done| *done)
    }

    pub fn completion(&self) -> &[bool; HOURS_PER_DAY] {
        &self.completion
    }

    pub fn state(&self) -> DayState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: DayState) {
        self.state = state;
    }

    pub fn job(&self, hour: u32) -> HourJob {
        HourJob {
            distribution_id: self.distribution_id.clone(),
            date: self.date,
            hour,
            directory: self.directory.clone(),
        }
    }

    /// Identity used to detect a probe returning the same work twice.
    pub fn position(&self) -> (String, LogDate, u32) {
        (self.distribution_id.clone(), self.date, self.start_hour)
    }
}

impl fmt::Display for DayBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.distribution_id, self.date)
    }
}

/// A single distribution-hour to compact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HourJob {
    pub distribution_id: String,
    pub date: LogDate,
    pub hour: u32,
    pub directory: String,
}

impl HourJob {
    /// Listing prefix matching all of this hour's fragments.
    pub fn fragment_prefix(&self) -> String {
        hour_prefix(&self.directory, &self.distribution_id, self.date, self.hour)
    }

    pub fn archive_key(&self) -> String {
        archive_key(&self.directory, &self.distribution_id, self.date, self.hour)
    }
}

impl fmt::Display for HourJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}-{:02}", self.distribution_id, self.date, self.hour)
    }
}
