pub mod runner;

pub use runner::{process_logs, RunError, RunSettings, RunSummary, Runner, ALL_DISTRIBUTIONS};
