//! Storage backend abstraction

mod blob;
mod dir;
mod dist;
mod list_filter;
mod tempspool;
mod traits;

pub use blob::{BlobError, BlobStore, HttpBlobStore, LocalBlobStore};
pub use dir::DirBackend;
pub use dist::{dump_meta_dir, DistBackend, DumpBucket, DumpOwner, DumpRecord};
pub use tempspool::TempSpool;
pub use traits::{GetResult, StorageBackend, StorageError};
