//! Durable job store (§4.1). `open()` dispatches on the connection string the
//! same way the teacher's `magnetar::open()` picks a backend from a URL scheme —
//! here there is only one real backend (`postgres://`), plus an in-memory one
//! callers construct directly for tests.

pub mod backends;
pub mod error;
pub mod traits;

pub use error::JobStoreError;
pub use traits::{JobStore, NewEvidence};

use backends::postgres::PostgresJobStore;
use std::sync::Arc;

/// Connects to the configured store and runs pending migrations. Only Postgres
/// is supported in production; anything else is a configuration error.
pub async fn open(database_url: &str) -> Result<Arc<dyn JobStore>, JobStoreError> {
    if !database_url.starts_with("postgres://") && !database_url.starts_with("postgresql://") {
        return Err(JobStoreError::Storage(format!(
            "unsupported job store URL scheme: {database_url}"
        )));
    }
    let store = PostgresJobStore::connect(database_url).await?;
    store.migrate().await?;
    Ok(Arc::new(store))
}
