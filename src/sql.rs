use crate::{translate::Operator, value::Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Parenthesize {
    #[default]
    Yes,
    No,
}

/// This is the output type of translation: an expression tree goes in, a SQL
///  AST comes out. Printing is done by [crate::to_sql].
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    Column {
        table: String,
        name: String,
    },
    Binary(Box<Expression>, Operator, Box<Expression>, Parenthesize),
    Negative(Box<Expression>),
    Not(Box<Expression>),
    /// `(expr) IS NULL` for [Operator::EqualsNull], `IS NOT NULL` for
    ///  [Operator::NotEqualsNull]
    IsNull(Box<Expression>, Operator),
    InList {
        item: Box<Expression>,
        list: Vec<Expression>,
        negated: bool,
    },
    Like {
        item: Box<Expression>,
        pattern: Box<Expression>,
        negated: bool,
        /// Set when the pattern is a folded literal whose wildcards were
        ///  escaped with a backslash
        escape: bool,
    },
    Concat(Vec<Expression>),
    Conditional {
        test: Box<Expression>,
        if_true: Box<Expression>,
        if_false: Box<Expression>,
    },
    FunctionCall {
        name: &'static str,
        args: Vec<Expression>,
    },
}

impl Expression {
    pub fn binary(l: Expression, op: Operator, r: Expression) -> Self {
        Expression::Binary(Box::new(l), op, Box::new(r), Parenthesize::Yes)
    }

    pub fn column(table: impl Into<String>, name: impl Into<String>) -> Self {
        Expression::Column {
            table: table.into(),
            name: name.into(),
        }
    }

    pub fn function(name: &'static str, arg: Expression) -> Self {
        Expression::FunctionCall {
            name,
            args: vec![arg],
        }
    }

    /// Drops the outer parentheses of a binary operator; used for the root of
    ///  a WHERE clause.
    pub fn unparenthesized(self) -> Self {
        match self {
            Expression::Binary(l, op, r, _) => Expression::Binary(l, op, r, Parenthesize::No),
            other => other,
        }
    }
}

impl From<Value> for Expression {
    fn from(v: Value) -> Self {
        Expression::Literal(v)
    }
}
impl From<&str> for Expression {
    fn from(s: &str) -> Self {
        Expression::Literal(Value::Str(s.to_string()))
    }
}
impl From<i64> for Expression {
    fn from(i: i64) -> Self {
        Expression::Literal(Value::Int(i))
    }
}

/// One projected column. `label` is set when the output name differs from
///  the column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectColumn {
    pub table: String,
    pub name: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Columns(Vec<SelectColumn>),
    Count,
    /// `SELECT 1`, for existence checks
    One,
}

/// `LEFT JOIN <table> AS <alias> ON <alias>.<key> = <parent_alias>.<foreign_key>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub table: String,
    pub alias: String,
    pub key: String,
    pub parent_alias: String,
    pub foreign_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expression,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub projection: Projection,
    pub table: String,
    pub alias: String,
    pub joins: Vec<Join>,
    pub filter: Option<Expression>,
    pub order: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}
