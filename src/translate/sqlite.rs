use std::fmt::{Formatter, Result};

use super::{Dialect, postgres, write_string_literal};
use crate::value::Value;

/// SQLite has no boolean or date types: booleans are integers and dates are
///  ISO-8601 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn write_literal(&self, out: &mut Formatter, value: &Value) -> Result {
        match value {
            Value::Bool(b) => write!(out, "{}", if *b { 1 } else { 0 }),
            Value::Date(d) => write_string_literal(out, &d.format("%Y-%m-%d").to_string()),
            Value::DateTime(d) => {
                write_string_literal(out, &d.format("%Y-%m-%d %H:%M:%S%.f").to_string())
            }
            Value::Bytes(bytes) => {
                write!(out, "X'")?;
                for b in bytes {
                    write!(out, "{b:02X}")?;
                }
                write!(out, "'")
            }
            _ => postgres::write_literal(out, value),
        }
    }

    // OFFSET is only accepted after a LIMIT; -1 means no limit
    fn write_ending(
        &self,
        out: &mut Formatter,
        limit: Option<u64>,
        offset: Option<u64>,
        terminate: bool,
    ) -> Result {
        match (limit, offset) {
            (Some(limit), _) => write!(out, " LIMIT {limit}")?,
            (None, Some(_)) => write!(out, " LIMIT -1")?,
            (None, None) => {}
        }
        if let Some(offset) = offset {
            write!(out, " OFFSET {offset}")?;
        }
        if terminate {
            write!(out, ";")?;
        }
        Ok(())
    }

    fn box_clone(&self) -> Box<dyn Dialect> {
        Box::new(*self)
    }
}
