//! Declarative session tuning applied for the duration of a load.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Session option a store backend can read, change and restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionOption {
    UniquenessChecks,
    ReferentialChecks,
    Durability,
}

impl SessionOption {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionOption::UniquenessChecks => "uniqueness-checks",
            SessionOption::ReferentialChecks => "referential-checks",
            SessionOption::Durability => "durability",
        }
    }
}

impl fmt::Display for SessionOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commit durability requested from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurabilityLevel {
    /// Flush on every commit.
    Strict,
    /// Flush periodically; a crash may lose the last moments of commits.
    Relaxed,
    /// Leave flushing entirely to the store.
    None,
}

impl DurabilityLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "relaxed" => Some(Self::Relaxed),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Relaxed => "relaxed",
            Self::None => "none",
        }
    }
}

/// One requested session change, keyed as in `SESSION_TUNING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "key", content = "value", rename_all = "kebab-case")]
pub enum SessionSetting {
    DisableUniquenessChecks(bool),
    DisableReferentialChecks(bool),
    DurabilityLevel(DurabilityLevel),
}

impl SessionSetting {
    pub fn key(&self) -> &'static str {
        match self {
            SessionSetting::DisableUniquenessChecks(_) => "disable-uniqueness-checks",
            SessionSetting::DisableReferentialChecks(_) => "disable-referential-checks",
            SessionSetting::DurabilityLevel(_) => "durability-level",
        }
    }

    pub fn option(&self) -> SessionOption {
        match self {
            SessionSetting::DisableUniquenessChecks(_) => SessionOption::UniquenessChecks,
            SessionSetting::DisableReferentialChecks(_) => SessionOption::ReferentialChecks,
            SessionSetting::DurabilityLevel(_) => SessionOption::Durability,
        }
    }

    pub fn parse(key: &str, value: &str) -> Result<Self> {
        match key.trim() {
            "disable-uniqueness-checks" => {
                parse_flag(key, value).map(SessionSetting::DisableUniquenessChecks)
            }
            "disable-referential-checks" => {
                parse_flag(key, value).map(SessionSetting::DisableReferentialChecks)
            }
            "durability-level" => DurabilityLevel::parse(value)
                .map(SessionSetting::DurabilityLevel)
                .ok_or_else(|| {
                    Error::Config(format!(
                        "durability-level must be strict, relaxed or none (got '{value}')"
                    ))
                }),
            other => Err(Error::Config(format!("unknown session option '{other}'"))),
        }
    }

    /// Tuning used when `SESSION_TUNING` is not set: trade mid-load
    /// guarantees for bulk insert speed.
    pub fn bulk_load_defaults() -> Vec<SessionSetting> {
        vec![
            SessionSetting::DisableUniquenessChecks(true),
            SessionSetting::DisableReferentialChecks(true),
            SessionSetting::DurabilityLevel(DurabilityLevel::Relaxed),
        ]
    }
}

impl fmt::Display for SessionSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionSetting::DisableUniquenessChecks(flag)
            | SessionSetting::DisableReferentialChecks(flag) => {
                write!(f, "{}={flag}", self.key())
            }
            SessionSetting::DurabilityLevel(level) => write!(f, "{}={}", self.key(), level.as_str()),
        }
    }
}

/// Parse a comma separated `key=value` list, e.g.
/// `disable-referential-checks=true,durability-level=relaxed`.
///
/// An empty string yields no tuning at all.
pub fn parse_session_tuning(list: &str) -> Result<Vec<SessionSetting>> {
    let mut settings: Vec<SessionSetting> = Vec::new();
    for entry in list.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (key, value) = entry.split_once('=').ok_or_else(|| {
            Error::Config(format!("session option '{entry}' must be key=value"))
        })?;
        let setting = SessionSetting::parse(key, value)?;
        if settings.iter().any(|existing| existing.option() == setting.option()) {
            return Err(Error::Config(format!(
                "session option '{}' given twice",
                setting.key()
            )));
        }
        settings.push(setting);
    }
    Ok(settings)
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{key} expects a boolean (got '{value}')"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tuning_list() {
        let settings =
            parse_session_tuning("disable-referential-checks=yes, durability-level=none")
                .expect("valid tuning");
        assert_eq!(
            settings,
            vec![
                SessionSetting::DisableReferentialChecks(true),
                SessionSetting::DurabilityLevel(DurabilityLevel::None),
            ]
        );
        assert!(parse_session_tuning("").expect("empty tuning").is_empty());
    }

    #[test]
    fn rejects_unknown_and_duplicate_keys() {
        assert!(matches!(
            parse_session_tuning("disable-everything=true"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            parse_session_tuning("durability-level=strict,durability-level=none"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            parse_session_tuning("durability-level"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for setting in SessionSetting::bulk_load_defaults() {
            let rendered = setting.to_string();
            let (key, value) = rendered.split_once('=').expect("key=value");
            assert_eq!(SessionSetting::parse(key, value).expect("parse"), setting);
        }
    }
}
