use async_trait::async_trait;
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection};
use tracing::debug;

use empload_core::{
    BatchRecords, ConnectionSettings, Department, DurabilityLevel, SessionOption, SessionSetting,
};

use crate::error::StoreError;
use crate::store::{Connector, Session};

mod queries;

const ENGINE: &str = "postgres";

/// SQLSTATE for insufficient_privilege.
const INSUFFICIENT_PRIVILEGE: &str = "42501";

/// Opens single PostgreSQL connections.
#[derive(Debug, Clone)]
pub struct PostgresConnector {
    options: PgConnectOptions,
}

impl PostgresConnector {
    pub fn new(settings: &ConnectionSettings) -> Self {
        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .password(&settings.password)
            .database(&settings.database)
            .application_name("empload");
        Self { options }
    }

    pub fn from_options(options: PgConnectOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    type Session = PostgresSession;

    fn engine(&self) -> &'static str {
        ENGINE
    }

    async fn connect(&self) -> Result<PostgresSession, StoreError> {
        let conn = PgConnection::connect_with(&self.options).await?;
        Ok(PostgresSession { conn })
    }
}

pub struct PostgresSession {
    conn: PgConnection,
}

/// Server setting backing each option. PostgreSQL cannot switch off
/// uniqueness enforcement.
fn setting_name(option: SessionOption) -> Result<&'static str, StoreError> {
    match option {
        SessionOption::UniquenessChecks => Err(StoreError::Unsupported {
            engine: ENGINE,
            what: "uniqueness checks cannot be disabled per session".to_string(),
        }),
        SessionOption::ReferentialChecks => Ok("session_replication_role"),
        SessionOption::Durability => Ok("synchronous_commit"),
    }
}

fn setting_value(setting: SessionSetting) -> &'static str {
    match setting {
        SessionSetting::DisableUniquenessChecks(_) => "",
        SessionSetting::DisableReferentialChecks(true) => "replica",
        SessionSetting::DisableReferentialChecks(false) => "origin",
        SessionSetting::DurabilityLevel(DurabilityLevel::Strict) => "on",
        SessionSetting::DurabilityLevel(DurabilityLevel::Relaxed) => "local",
        SessionSetting::DurabilityLevel(DurabilityLevel::None) => "off",
    }
}

/// Permission errors on a setting mean the option is out of reach for this
/// role, which the caller treats like an unsupported option.
fn privilege_as_unsupported(err: sqlx::Error, name: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(INSUFFICIENT_PRIVILEGE) {
            return StoreError::Unsupported {
                engine: ENGINE,
                what: format!("not permitted to change {name}: {}", db.message()),
            };
        }
    }
    err.into()
}

#[async_trait]
impl Session for PostgresSession {
    async fn read_option(&mut self, option: SessionOption) -> Result<String, StoreError> {
        let name = setting_name(option)?;
        queries::current_setting(&mut self.conn, name).await
    }

    async fn apply_setting(&mut self, setting: SessionSetting) -> Result<(), StoreError> {
        let name = setting_name(setting.option())?;
        queries::set_config(&mut self.conn, name, setting_value(setting))
            .await
            .map_err(|err| privilege_as_unsupported(err, name))
    }

    async fn restore_option(&mut self, option: SessionOption, raw: &str) -> Result<(), StoreError> {
        let name = setting_name(option)?;
        queries::set_config(&mut self.conn, name, raw).await?;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniqueness_checks_are_unsupported() {
        assert!(matches!(
            setting_name(SessionOption::UniquenessChecks),
            Err(StoreError::Unsupported { engine: "postgres", .. })
        ));
    }

    #[test]
    fn referential_and_durability_map_to_gucs() {
        assert_eq!(
            setting_name(SessionOption::ReferentialChecks).ok(),
            Some("session_replication_role")
        );
        assert_eq!(
            setting_value(SessionSetting::DisableReferentialChecks(true)),
            "replica"
        );
        assert_eq!(
            setting_value(SessionSetting::DurabilityLevel(DurabilityLevel::Relaxed)),
            "local"
        );
    }
}
