pub mod memory;
pub mod s3;
pub mod traits;

pub use memory::MemoryStore;
pub use s3::{create_s3_client, S3Store};
pub use traits::{ListPage, ObjectStore, StoreError};
