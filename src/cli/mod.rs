pub mod args;
pub mod config;
pub mod run;

pub use args::Overrides;
