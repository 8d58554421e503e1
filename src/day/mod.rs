pub mod batch;
pub mod orchestrator;

pub use batch::{DayBatch, DayState, HourJob, HOURS_PER_DAY};
pub use orchestrator::{DayError, DayOrchestrator, DayReport};
