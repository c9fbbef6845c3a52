#![allow(async_fn_in_trait)]

use crate::error::StorageResult;
use crate::models::NetworkSettings;
use sqlx::SqlitePool;
use tracing::debug;

/// Data access for persisted network settings.
///
/// Uses native async trait methods (Edition 2024).
pub trait NetworkSettingsRepository: Send + Sync {
    /// Validate and append a record, returning its id.
    async fn insert(&self, settings: &NetworkSettings) -> StorageResult<i64>;

    /// Most recent record, or `None` if nothing was ever saved.
    async fn latest(&self) -> StorageResult<Option<NetworkSettings>>;

    /// Every record, oldest first.
    async fn all(&self) -> StorageResult<Vec<NetworkSettings>>;
}

/// SQLite implementation of [`NetworkSettingsRepository`]
#[derive(Debug, Clone)]
pub struct SqliteNetworkSettingsRepository {
    pool: SqlitePool,
}

impl SqliteNetworkSettingsRepository {
    /// Create a new SQLite network settings repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl NetworkSettingsRepository for SqliteNetworkSettingsRepository {
    async fn insert(&self, settings: &NetworkSettings) -> StorageResult<i64> {
        settings.validate()?;

        let result = sqlx::query(
            r#"
            INSERT INTO network_settings (
                ip_address, dhcp_enabled, subnet_mask, gateway, dns1, dns2,
                primary_ssid, secondary_ssid, primary_password, secondary_password,
                created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&settings.ip_address)
        .bind(settings.dhcp_enabled)
        .bind(&settings.subnet_mask)
        .bind(&settings.gateway)
        .bind(&settings.dns1)
        .bind(&settings.dns2)
        .bind(&settings.primary_ssid)
        .bind(&settings.secondary_ssid)
        .bind(&settings.primary_password)
        .bind(&settings.secondary_password)
        .bind(settings.created_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(id, "Network settings saved");
        Ok(id)
    }

    async fn latest(&self) -> StorageResult<Option<NetworkSettings>> {
        let settings = sqlx::query_as::<_, NetworkSettings>(
            r#"
            SELECT id, ip_address, dhcp_enabled, subnet_mask, gateway, dns1, dns2,
                   primary_ssid, secondary_ssid, primary_password, secondary_password,
                   created_at
            FROM network_settings
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(settings)
    }

    async fn all(&self) -> StorageResult<Vec<NetworkSettings>> {
        let settings = sqlx::query_as::<_, NetworkSettings>(
            r#"
            SELECT id, ip_address, dhcp_enabled, subnet_mask, gateway, dns1, dns2,
                   primary_ssid, secondary_ssid, primary_password, secondary_password,
                   created_at
            FROM network_settings
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(settings)
    }
}
