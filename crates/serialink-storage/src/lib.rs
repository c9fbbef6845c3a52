//! SQLite persistence for serialink.
//!
//! Holds the network settings submitted from the configuration form. The
//! reconnect cycle reads the most recent record once per link loss.
//!
//! ```no_run
//! use serialink_storage::{Database, DatabaseConfig};
//! use serialink_storage::models::NetworkSettings;
//! use serialink_storage::repositories::{NetworkSettingsRepository, SqliteNetworkSettingsRepository};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DatabaseConfig::new("serialink.db")).await?;
//! let repo = SqliteNetworkSettingsRepository::new(db.pool().clone());
//!
//! repo.insert(&NetworkSettings::new().with_primary("office", "hunter2")).await?;
//! let active = repo.latest().await?;
//! assert_eq!(active.and_then(|s| s.primary_ssid().map(str::to_string)).as_deref(), Some("office"));
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;

pub use connection::{DEFAULT_DATABASE_PATH, Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
