pub mod cli;
pub mod compactor;
pub mod config;
pub mod day;
pub mod fragment;
pub mod pipeline;
pub mod probe;
pub mod store;
