use std::{
    fmt::{Display, Formatter, Result},
    sync::LazyLock,
};

use regex::Regex;

use crate::{
    sql::{Expression, Join, OrderBy, Parenthesize, Projection, Query, SelectColumn},
    translate::{Dialect, Operator, postgres::Postgres},
};

/// Identifiers that can be written bare. Anything with upper case letters
///  would be folded by the server, so it gets quoted.
static PLAIN_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^[a-z_][a-z0-9_]*$").expect("identifier pattern is valid")
});

const RESERVED: &[&str] = &[
    "all", "and", "as", "by", "case", "from", "group", "limit", "not", "null", "or", "order",
    "select", "table", "user", "where",
];

#[derive(Debug, Clone)]
pub struct PrinterConfig {
    pub dialect: Box<dyn Dialect>,
    /// Quote every identifier, rather than only those that need it
    pub quote_identifiers: bool,
    /// End statements with the dialect's terminator
    pub terminate: bool,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            dialect: Box::new(Postgres),
            quote_identifiers: true,
            terminate: true,
        }
    }
}

impl PrinterConfig {
    pub fn write_identifier(&self, out: &mut Formatter, name: &str) -> Result {
        let plain = PLAIN_IDENTIFIER.is_match(name) && !RESERVED.contains(&name);
        if self.quote_identifiers || !plain {
            write!(out, "\"{}\"", name.replace('"', "\"\""))
        } else {
            out.write_str(name)
        }
    }
}

pub struct Printer<T> {
    tree: T,
    config: PrinterConfig,
}

impl<T> Printer<T> {
    pub fn new(tree: T, config: PrinterConfig) -> Self {
        Self { tree, config }
    }
}

pub trait ToSQL {
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result;
}

impl<T> ToSQL for Box<T>
where
    T: ToSQL,
{
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result {
        self.as_ref().to_sql(out, conf)
    }
}

impl<T> ToSQL for &T
where
    T: ToSQL + ?Sized,
{
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result {
        (*self).to_sql(out, conf)
    }
}

impl<T> Display for Printer<T>
where
    T: ToSQL,
{
    fn fmt(&self, f: &mut Formatter) -> Result {
        self.tree.to_sql(f, &self.config)
    }
}

impl ToSQL for Operator {
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result {
        out.write_str(conf.dialect.token(*self))
    }
}

fn write_list<T: ToSQL>(out: &mut Formatter, conf: &PrinterConfig, items: &[T], sep: &str) -> Result {
    let mut is_first = true;
    for item in items {
        if is_first {
            is_first = false;
        } else {
            out.write_str(sep)?;
        }
        item.to_sql(out, conf)?;
    }
    Ok(())
}

impl ToSQL for Expression {
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result {
        match self {
            Expression::Literal(v) => conf.dialect.write_literal(out, v),
            Expression::Column { table, name } => {
                write!(out, "{table}.")?;
                conf.write_identifier(out, name)
            }
            Expression::Binary(l, op, r, p) => {
                //NOTE: order of operations is kept by parenthesizing every
                // operator; only the root of a clause drops them.
                if *p == Parenthesize::Yes {
                    write!(out, "(")?;
                }
                l.to_sql(out, conf)?;
                op.to_sql(out, conf)?;
                r.to_sql(out, conf)?;
                if *p == Parenthesize::Yes {
                    write!(out, ")")?;
                }
                Ok(())
            }
            Expression::Negative(e) => {
                write!(out, "(")?;
                Operator::Negative.to_sql(out, conf)?;
                e.to_sql(out, conf)?;
                write!(out, ")")
            }
            Expression::Not(e) => {
                write!(out, "(NOT ")?;
                e.to_sql(out, conf)?;
                write!(out, ")")
            }
            Expression::IsNull(e, op) => {
                write!(out, "(")?;
                e.to_sql(out, conf)?;
                write!(out, ")")?;
                op.to_sql(out, conf)
            }
            Expression::InList {
                item,
                list,
                negated,
            } => {
                write!(out, "(")?;
                item.to_sql(out, conf)?;
                write!(out, "{}IN (", if *negated { " NOT " } else { " " })?;
                write_list(out, conf, list, ", ")?;
                write!(out, "))")
            }
            Expression::Like {
                item,
                pattern,
                negated,
                escape,
            } => {
                write!(out, "(")?;
                item.to_sql(out, conf)?;
                write!(out, "{}LIKE ", if *negated { " NOT " } else { " " })?;
                pattern.to_sql(out, conf)?;
                if *escape {
                    write!(out, " ESCAPE '\\'")?;
                }
                write!(out, ")")
            }
            Expression::Concat(parts) => {
                write!(out, "(")?;
                write_list(out, conf, parts, " || ")?;
                write!(out, ")")
            }
            Expression::Conditional {
                test,
                if_true,
                if_false,
            } => {
                write!(out, "CASE WHEN ")?;
                test.to_sql(out, conf)?;
                write!(out, " THEN ")?;
                if_true.to_sql(out, conf)?;
                write!(out, " ELSE ")?;
                if_false.to_sql(out, conf)?;
                write!(out, " END")
            }
            Expression::FunctionCall { name, args } => {
                write!(out, "{name}(")?;
                write_list(out, conf, args, ", ")?;
                write!(out, ")")
            }
        }
    }
}

impl ToSQL for SelectColumn {
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result {
        write!(out, "{}.", self.table)?;
        conf.write_identifier(out, &self.name)?;
        if let Some(label) = &self.label {
            // labels may contain dots, always quote them
            write!(out, " AS \"{}\"", label.replace('"', "\"\""))?;
        }
        Ok(())
    }
}

impl ToSQL for Join {
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result {
        write!(out, " LEFT JOIN ")?;
        conf.write_identifier(out, &self.table)?;
        write!(out, " AS {} ON {}.", self.alias, self.alias)?;
        conf.write_identifier(out, &self.key)?;
        write!(out, " = {}.", self.parent_alias)?;
        conf.write_identifier(out, &self.foreign_key)
    }
}

impl ToSQL for OrderBy {
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result {
        self.expr.to_sql(out, conf)?;
        write!(out, "{}", if self.descending { " DESC" } else { " ASC" })
    }
}

impl ToSQL for Query {
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result {
        write!(out, "SELECT ")?;
        match &self.projection {
            Projection::Columns(columns) => write_list(out, conf, columns, ", ")?,
            Projection::Count => write!(out, "COUNT(*)")?,
            Projection::One => write!(out, "1")?,
        }
        write!(out, " FROM ")?;
        conf.write_identifier(out, &self.table)?;
        write!(out, " AS {}", self.alias)?;
        for join in &self.joins {
            join.to_sql(out, conf)?;
        }
        if let Some(filter) = &self.filter {
            write!(out, " WHERE ")?;
            filter.to_sql(out, conf)?;
        }
        if !self.order.is_empty() {
            write!(out, " ORDER BY ")?;
            write_list(out, conf, &self.order, ", ")?;
        }
        conf.dialect
            .write_ending(out, self.limit, self.offset, conf.terminate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{translate::sqlite::Sqlite, value::Value};

    fn print<T: ToSQL>(tree: T, config: PrinterConfig) -> String {
        Printer::new(tree, config).to_string()
    }

    #[test]
    fn identifiers() {
        let quoted = PrinterConfig::default();
        let bare = PrinterConfig {
            quote_identifiers: false,
            ..PrinterConfig::default()
        };
        let col = || Expression::column("t0", "name");
        assert_eq!(print(col(), quoted), "t0.\"name\"");
        assert_eq!(print(col(), bare.clone()), "t0.name");
        assert_eq!(print(Expression::column("t0", "FirstName"), bare.clone()), "t0.\"FirstName\"");
        assert_eq!(print(Expression::column("t0", "order"), bare.clone()), "t0.\"order\"");
        assert_eq!(print(Expression::column("t0", "a\"b"), bare), "t0.\"a\"\"b\"");
    }

    #[test]
    fn predicates() {
        let conf = PrinterConfig::default;
        let id = || Box::new(Expression::column("t0", "Id"));

        let in_list = Expression::InList {
            item: id(),
            list: vec![1i64.into(), 2i64.into()],
            negated: true,
        };
        assert_eq!(print(in_list, conf()), "(t0.\"Id\" NOT IN (1, 2))");

        let is_null = Expression::IsNull(id(), Operator::NotEqualsNull);
        assert_eq!(print(is_null, conf()), "(t0.\"Id\") IS NOT NULL");

        let like = Expression::Like {
            item: id(),
            pattern: Box::new("50\\%%".into()),
            negated: false,
            escape: true,
        };
        assert_eq!(print(like, conf()), "(t0.\"Id\" LIKE '50\\%%' ESCAPE '\\')");

        let and = Expression::binary(
            Expression::binary(Expression::Literal(Value::Int(1)), Operator::Equals, 1i64.into()),
            Operator::And,
            Expression::Not(id()),
        )
        .unparenthesized();
        assert_eq!(print(and, conf()), "(1 = 1) AND (NOT t0.\"Id\")");
    }

    #[test]
    fn query_layout() {
        let query = Query {
            projection: Projection::Columns(vec![
                SelectColumn {
                    table: "t0".into(),
                    name: "Id".into(),
                    label: None,
                },
                SelectColumn {
                    table: "t1".into(),
                    name: "Name".into(),
                    label: Some("Manager.Name".into()),
                },
            ]),
            table: "people".into(),
            alias: "t0".into(),
            joins: vec![Join {
                table: "people".into(),
                alias: "t1".into(),
                key: "Id".into(),
                parent_alias: "t0".into(),
                foreign_key: "manager_id".into(),
            }],
            filter: None,
            order: vec![OrderBy {
                expr: Expression::column("t0", "Id"),
                descending: true,
            }],
            limit: None,
            offset: Some(10),
        };

        assert_eq!(
            print(&query, PrinterConfig::default()),
            "SELECT t0.\"Id\", t1.\"Name\" AS \"Manager.Name\" FROM \"people\" AS t0 \
             LEFT JOIN \"people\" AS t1 ON t1.\"Id\" = t0.\"manager_id\" \
             ORDER BY t0.\"Id\" DESC OFFSET 10;"
        );

        let sqlite = PrinterConfig {
            dialect: Box::new(Sqlite),
            quote_identifiers: false,
            terminate: false,
        };
        assert_eq!(
            print(&query, sqlite),
            "SELECT t0.\"Id\", t1.\"Name\" AS \"Manager.Name\" FROM people AS t0 \
             LEFT JOIN people AS t1 ON t1.\"Id\" = t0.manager_id \
             ORDER BY t0.\"Id\" DESC LIMIT -1 OFFSET 10"
        );
    }
}
