use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlDatabaseError};
use sqlx::{Connection, MySqlConnection};
use tracing::debug;

use empload_core::{
    BatchRecords, ConnectionSettings, Department, DurabilityLevel, SessionOption, SessionSetting,
};

use crate::error::StoreError;
use crate::store::{Connector, Session};

mod queries;

const ENGINE: &str = "mysql";

/// ER_SPECIFIC_ACCESS_DENIED_ERROR: the statement needs SUPER or
/// SYSTEM_VARIABLES_ADMIN.
const ACCESS_DENIED: u16 = 1227;

/// Opens single MySQL connections.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    options: MySqlConnectOptions,
}

impl MySqlConnector {
    pub fn new(settings: &ConnectionSettings) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .password(&settings.password)
            .database(&settings.database);
        Self { options }
    }

    pub fn from_options(options: MySqlConnectOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    type Session = MySqlSession;

    fn engine(&self) -> &'static str {
        ENGINE
    }

    async fn connect(&self) -> Result<MySqlSession, StoreError> {
        let conn = MySqlConnection::connect_with(&self.options).await?;
        Ok(MySqlSession { conn })
    }
}

pub struct MySqlSession {
    conn: MySqlConnection,
}

/// System variable backing each option. Flush behaviour only exists at
/// global scope.
fn variable(option: SessionOption) -> &'static str {
    match option {
        SessionOption::UniquenessChecks => "@@session.unique_checks",
        SessionOption::ReferentialChecks => "@@session.foreign_key_checks",
        SessionOption::Durability => "@@global.innodb_flush_log_at_trx_commit",
    }
}

fn variable_value(setting: SessionSetting) -> &'static str {
    match setting {
        SessionSetting::DisableUniquenessChecks(disable)
        | SessionSetting::DisableReferentialChecks(disable) => {
            if disable {
                "0"
            } else {
                "1"
            }
        }
        SessionSetting::DurabilityLevel(DurabilityLevel::Strict) => "1",
        SessionSetting::DurabilityLevel(DurabilityLevel::Relaxed) => "2",
        SessionSetting::DurabilityLevel(DurabilityLevel::None) => "0",
    }
}

fn access_denied_as_unsupported(err: sqlx::Error, variable: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        let denied = db
            .try_downcast_ref::<MySqlDatabaseError>()
            .is_some_and(|mysql| mysql.number() == ACCESS_DENIED);
        if denied {
            return StoreError::Unsupported {
                engine: ENGINE,
                what: format!("not permitted to change {variable}: {}", db.message()),
            };
        }
    }
    err.into()
}

#[async_trait]
impl Session for MySqlSession {
    async fn read_option(&mut self, option: SessionOption) -> Result<String, StoreError> {
        queries::read_variable(&mut self.conn, variable(option)).await
    }

    async fn apply_setting(&mut self, setting: SessionSetting) -> Result<(), StoreError> {
        let name = variable(setting.option());
        queries::set_variable(&mut self.conn, name, variable_value(setting))
            .await
            .map_err(|err| access_denied_as_unsupported(err, name))
    }

    async fn restore_option(&mut self, option: SessionOption, raw: &str) -> Result<(), StoreError> {
        let raw = raw.trim();
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(StoreError::Other(format!(
                "refusing to restore {option} to non-numeric value '{raw}'"
            )));
        }
        queries::set_variable(&mut self.conn, variable(option), raw).await?;
        Ok(())
    }

    async fn provision_schema(&mut self) -> Result<(), StoreError> {
        queries::create_schema(&mut self.conn).await
    }

    async fn seed_departments(&mut self, departments: &[Department]) -> Result<(), StoreError> {
        queries::seed_departments(&mut self.conn, departments).await
    }

    async fn count_employees(&mut self) -> Result<u64, StoreError> {
        queries::count_employees(&mut self.conn).await
    }

    async fn insert_batch(&mut self, records: &BatchRecords) -> Result<(), StoreError> {
        let mut tx = self.conn.begin().await?;
        match queries::insert_records(&mut tx, records).await {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    debug!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn refresh_statistics(&mut self) -> Result<(), StoreError> {
        queries::analyze(&mut self.conn).await
    }

    async fn close(self) -> Result<(), StoreError> {
        self.conn.close().await?;
        Ok(())
    }
}
