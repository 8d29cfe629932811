use serde::{Deserialize, Serialize};

use crate::{
    to_sql::PrinterConfig,
    translate::{Dialect, postgres::Postgres, sqlite::Sqlite},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Postgres,
    Sqlite,
}

impl DialectKind {
    pub fn dialect(self) -> Box<dyn Dialect> {
        match self {
            DialectKind::Postgres => Box::new(Postgres),
            DialectKind::Sqlite => Box::new(Sqlite),
        }
    }
}

impl std::str::FromStr for DialectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DialectKind::Postgres),
            "sqlite" | "sqlite3" => Ok(DialectKind::Sqlite),
            other => Err(format!("unknown dialect '{other}'")),
        }
    }
}

/// Options for a [Converter](crate::translate::Converter). Every field has a
///  default, so a partial JSON document is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dialect: DialectKind,
    /// When false, only identifiers that need quoting are quoted
    pub quote_identifiers: bool,
    /// Table aliases are this prefix followed by the dependant's index
    pub alias_prefix: String,
    /// End each statement with `;`
    pub terminate: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dialect: DialectKind::default(),
            quote_identifiers: true,
            alias_prefix: "t".to_string(),
            terminate: true,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn printer(&self) -> PrinterConfig {
        PrinterConfig {
            dialect: self.dialect.dialect(),
            quote_identifiers: self.quote_identifiers,
            terminate: self.terminate,
        }
    }
}
