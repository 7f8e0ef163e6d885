//! Storage backends for readings, circuit breakdowns and alerts
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database, feature `storage-sqlite`
//! - **In-Memory**: No persistence, used when storage is configured as `none` and in tests
//!
//! ## Usage
//!
//! ```no_run
//! use energy_monitoring::config::StorageConfig;
//! use energy_monitoring::storage;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = storage::open_backend(&StorageConfig::None).await?;
//!     let latest = backend.query_latest_reading().await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

use std::sync::Arc;

use tracing::info;

pub use backend::{ACTIVE_ALERT_LIMIT, HealthStatus, StorageBackend, UsageTotals};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;

use crate::config::StorageConfig;

/// Shared handle to the configured backend
pub type SharedStorage = Arc<dyn StorageBackend>;

/// Open the backend described by the configuration
pub async fn open_backend(config: &StorageConfig) -> StorageResult<SharedStorage> {
    match config {
        StorageConfig::None => {
            info!("using in-memory storage, readings are not persisted");
            Ok(Arc::new(MemoryBackend::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => Ok(Arc::new(sqlite::SqliteBackend::new(path).await?)),
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::ConnectionFailed(
            "SQLite storage requires the 'storage-sqlite' feature".to_string(),
        )),
    }
}
