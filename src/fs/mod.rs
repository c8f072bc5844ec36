pub mod backend;
pub mod local;
pub mod memory;
pub mod s3;
pub mod types;

pub use backend::{ObjectMetadata, ObjectStore, ObjectStream, ObjectSummary, SHA256_METADATA_KEY};
pub use local::LocalFs;
pub use memory::MemoryStore;
pub use s3::S3Store;
pub use types::*;
