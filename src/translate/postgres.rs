use std::fmt::{Formatter, Result};

use super::{Dialect, write_string_literal};
use crate::value::Value;

/// The default target. Other dialects delegate to [write_literal] for the
///  values they render the same way.
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn write_literal(&self, out: &mut Formatter, value: &Value) -> Result {
        write_literal(out, value)
    }

    fn box_clone(&self) -> Box<dyn Dialect> {
        Box::new(*self)
    }
}

pub fn write_literal(out: &mut Formatter, value: &Value) -> Result {
    match value {
        Value::Null => write!(out, "NULL"),
        Value::Bool(b) => write!(out, "{}", if *b { "TRUE" } else { "FALSE" }),
        Value::Int(i) => write!(out, "{i}"),
        // Debug keeps the decimal point: 3.0 rather than 3
        Value::Float(f) => write!(out, "{f:?}"),
        Value::Str(s) => write_string_literal(out, s),
        Value::Date(d) => write!(out, "DATE '{}'", d.format("%Y-%m-%d")),
        Value::DateTime(d) => write!(out, "TIMESTAMP '{}'", d.format("%Y-%m-%d %H:%M:%S%.f")),
        Value::Bytes(bytes) => {
            write!(out, "'\\x")?;
            for b in bytes {
                write!(out, "{b:02x}")?;
            }
            write!(out, "'::bytea")
        }
        Value::List(_) | Value::Record(_) => Err(std::fmt::Error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sql::Expression,
        to_sql::{Printer, PrinterConfig},
    };
    use chrono::NaiveDate;

    fn lit(v: impl Into<Value>) -> String {
        Printer::new(Expression::Literal(v.into()), PrinterConfig::default()).to_string()
    }

    #[test]
    fn literals() {
        assert_eq!(lit(true), "TRUE");
        assert_eq!(lit(3.0), "3.0");
        assert_eq!(lit(-4), "-4");
        assert_eq!(lit("O'Brien"), "'O''Brien'");
        assert_eq!(lit(Value::Null), "NULL");

        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(lit(day), "DATE '2024-03-01'");
        assert_eq!(
            lit(day.and_hms_opt(13, 5, 0).unwrap()),
            "TIMESTAMP '2024-03-01 13:05:00'"
        );
        assert_eq!(lit(Value::Bytes(vec![0xde, 0xad])), "'\\xdead'::bytea");
    }
}
