pub mod key;
pub mod window;

pub use key::{archive_key, file_name, hour_prefix, FragmentKey, LogDate};
pub use window::EligibilityWindow;
