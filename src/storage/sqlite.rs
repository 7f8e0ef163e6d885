//! SQLite storage backend implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers from the API are not blocked by the sampler's writes
//! - **Connection pooling**: Shared between the sampling actor and API handlers
//! - **Migrations**: Schema embedded at compile time with `sqlx::migrate!`
//!
//! Timestamps are stored as Unix milliseconds.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{ACTIVE_ALERT_LIMIT, HealthStatus, StorageBackend, UsageTotals};
use super::error::{StorageError, StorageResult};
use crate::alerts::{Alert, AlertKind, AlertSeverity};
use crate::{CircuitReading, CircuitStatus, Reading};

const READING_COLUMNS: &str = r#"id, timestamp, total_power, voltage, "current", frequency,
    power_factor, daily_usage, monthly_usage, cost_today, cost_month"#;

pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Open (or create) the database file and run the embedded migrations
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> StorageResult<DateTime<Utc>> {
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| StorageError::InvalidRow(format!("timestamp {millis} out of range")))
    }

    fn reading_from_row(row: &SqliteRow) -> StorageResult<Reading> {
        Ok(Reading {
            id: row.try_get("id")?,
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?)?,
            total_power: row.try_get("total_power")?,
            voltage: row.try_get("voltage")?,
            current: row.try_get("current")?,
            frequency: row.try_get("frequency")?,
            power_factor: row.try_get("power_factor")?,
            daily_usage: row.try_get("daily_usage")?,
            monthly_usage: row.try_get("monthly_usage")?,
            cost_today: row.try_get("cost_today")?,
            cost_month: row.try_get("cost_month")?,
        })
    }

    fn circuit_from_row(row: &SqliteRow) -> StorageResult<CircuitReading> {
        let status: String = row.try_get("status")?;
        Ok(CircuitReading {
            id: row.try_get("id")?,
            circuit_id: row.try_get("circuit_id")?,
            circuit_name: row.try_get("circuit_name")?,
            power: row.try_get("power")?,
            voltage: row.try_get("voltage")?,
            current: row.try_get("current")?,
            percentage: row.try_get("percentage")?,
            status: CircuitStatus::from_str(&status).map_err(StorageError::InvalidRow)?,
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?)?,
        })
    }

    fn alert_from_row(row: &SqliteRow) -> StorageResult<Alert> {
        let kind: String = row.try_get("type")?;
        let severity: String = row.try_get("severity")?;
        Ok(Alert {
            id: row.try_get("id")?,
            kind: AlertKind::from_str(&kind).map_err(StorageError::InvalidRow)?,
            severity: AlertSeverity::from_str(&severity).map_err(StorageError::InvalidRow)?,
            message: row.try_get("message")?,
            circuit_id: row.try_get("circuit_id")?,
            value: row.try_get("value")?,
            threshold: row.try_get("threshold")?,
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?)?,
            acknowledged: row.try_get::<i64, _>("acknowledged")? != 0,
        })
    }

    async fn average_power_since(&self, since: DateTime<Utc>) -> StorageResult<Option<f64>> {
        let row: (Option<f64>,) =
            sqlx::query_as("SELECT AVG(total_power) FROM energy_readings WHERE timestamp >= ?")
                .bind(Self::timestamp_to_millis(&since))
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip_all, fields(id = %reading.id))]
    async fn store_reading(&self, reading: &Reading) -> StorageResult<()> {
        sqlx::query(&format!(
            "INSERT INTO energy_readings ({READING_COLUMNS}, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&reading.id)
        .bind(Self::timestamp_to_millis(&reading.timestamp))
        .bind(reading.total_power)
        .bind(reading.voltage)
        .bind(reading.current)
        .bind(reading.frequency)
        .bind(reading.power_factor)
        .bind(reading.daily_usage)
        .bind(reading.monthly_usage)
        .bind(reading.cost_today)
        .bind(reading.cost_month)
        .bind(Self::timestamp_to_millis(&Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, circuits), fields(count = circuits.len()))]
    async fn store_circuit_readings(&self, circuits: &[CircuitReading]) -> StorageResult<()> {
        if circuits.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for circuit in circuits {
            sqlx::query(
                r#"
                INSERT INTO circuit_readings (
                    id, circuit_id, circuit_name, power, voltage, "current",
                    status, percentage, timestamp
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&circuit.id)
            .bind(&circuit.circuit_id)
            .bind(&circuit.circuit_name)
            .bind(circuit.power)
            .bind(circuit.voltage)
            .bind(circuit.current)
            .bind(circuit.status.as_str())
            .bind(circuit.percentage)
            .bind(Self::timestamp_to_millis(&circuit.timestamp))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip_all, fields(id = %alert.id, kind = %alert.kind))]
    async fn store_alert(&self, alert: &Alert) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO energy_alerts (
                id, "type", severity, message, circuit_id, value, threshold,
                timestamp, acknowledged
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&alert.id)
        .bind(alert.kind.as_str())
        .bind(alert.severity.as_str())
        .bind(&alert.message)
        .bind(&alert.circuit_id)
        .bind(alert.value)
        .bind(alert.threshold)
        .bind(Self::timestamp_to_millis(&alert.timestamp))
        .bind(i64::from(alert.acknowledged))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn query_latest_reading(&self) -> StorageResult<Option<Reading>> {
        let row = sqlx::query(&format!(
            "SELECT {READING_COLUMNS} FROM energy_readings ORDER BY timestamp DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::reading_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn query_circuit_readings(&self) -> StorageResult<Vec<CircuitReading>> {
        let rows = sqlx::query(
            r#"
            SELECT id, circuit_id, circuit_name, power, voltage, "current",
                   status, percentage, timestamp
            FROM circuit_readings
            WHERE timestamp = (SELECT MAX(timestamp) FROM circuit_readings)
            ORDER BY rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::circuit_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn query_usage_history(&self, window_hours: u32) -> StorageResult<Vec<Reading>> {
        let since = Utc::now() - Duration::hours(i64::from(window_hours));

        let rows = sqlx::query(&format!(
            "SELECT {READING_COLUMNS} FROM energy_readings
             WHERE timestamp >= ?
             ORDER BY timestamp ASC"
        ))
        .bind(Self::timestamp_to_millis(&since))
        .fetch_all(&self.pool)
        .await?;

        let readings: Vec<Reading> = rows
            .iter()
            .map(Self::reading_from_row)
            .collect::<StorageResult<_>>()?;
        debug!("usage history returned {} readings", readings.len());
        Ok(readings)
    }

    #[instrument(skip(self))]
    async fn query_usage_totals(
        &self,
        day_start: DateTime<Utc>,
        month_start: DateTime<Utc>,
    ) -> StorageResult<UsageTotals> {
        Ok(UsageTotals {
            day_average_power: self.average_power_since(day_start).await?,
            month_average_power: self.average_power_since(month_start).await?,
        })
    }

    #[instrument(skip(self))]
    async fn query_active_alerts(&self) -> StorageResult<Vec<Alert>> {
        let rows = sqlx::query(
            r#"
            SELECT id, "type", severity, message, circuit_id, value, threshold,
                   timestamp, acknowledged
            FROM energy_alerts
            WHERE acknowledged = 0
            ORDER BY timestamp DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(ACTIVE_ALERT_LIMIT as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::alert_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn acknowledge_alert(&self, id: &str) -> StorageResult<()> {
        // SQLite counts matched rows, so an already acknowledged alert still reports one
        let result = sqlx::query("UPDATE energy_alerts SET acknowledged = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                message: "SQLite backend operational".to_string(),
                metadata: HashMap::from([
                    ("backend".to_string(), "sqlite".to_string()),
                    ("db_path".to_string(), self.db_path.clone()),
                ]),
            }),
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
