pub mod error;
pub mod local;
pub mod s3;
pub mod traits;

pub use error::StorageBackendError;
pub use local::LocalBlobStorage;
pub use s3::S3BlobStorage;
pub use traits::BlobStorage;
