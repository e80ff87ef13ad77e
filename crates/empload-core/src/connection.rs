use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Store engines empload can load into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    Postgres,
    Mysql,
}

impl Engine {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::Mysql),
            other => Err(Error::Config(format!("unsupported engine: {other}"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Self::Postgres => 5432,
            Self::Mysql => 3306,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to open a store session.
///
/// The password never appears in `Debug` output; use [`redacted`] for
/// anything that ends up in logs or run artifacts.
///
/// [`redacted`]: ConnectionSettings::redacted
#[derive(Clone)]
pub struct ConnectionSettings {
    pub engine: Engine,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl ConnectionSettings {
    pub fn redacted(&self) -> RedactedConnection {
        let password = if self.password.is_empty() { "" } else { ":***" };
        RedactedConnection {
            engine: self.engine.as_str().to_string(),
            user: self.user.clone(),
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            redacted: format!(
                "{}://{}{}@{}:{}/{}",
                self.engine.as_str(),
                self.user,
                password,
                self.host,
                self.port,
                self.database
            ),
        }
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

/// Connection metadata with secrets redacted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactedConnection {
    pub engine: String,
    pub user: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub redacted: String,
}
