use std::fmt::{Formatter, Write as _};

use tracing::{debug, trace};

use crate::{
    ast::{BinaryOp, Expression as E, UnaryOp},
    config::Config,
    error::{Error, Result},
    evaluate::{self, ClosedEvaluator, StandardEvaluator, is_evaluatable},
    methods::{DeclaringType, KnownMethod, MethodRef},
    model::{Model, ModelLookup, PropertyDescriptor},
    sql::{self, Expression as Sql, Projection, Query, SelectColumn},
    to_sql::{Printer, PrinterConfig},
    value::{Value, ValueType},
    walk::{WalkContext, Walker, lambda_parts},
};

pub mod postgres;
pub mod sqlite;

/// The operators a query is built from. Most map to a SQL token supplied by
///  the [Dialect]; the structural ones (`New`, `Lambda`, `Evaluate`,
///  `Conditional`, `Call`) only appear on the walk's operator stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Operator {
    Null,
    New,
    Lambda,
    Evaluate,
    Conditional,
    Call,
    Negative,
    And,
    Or,
    Equals,
    NotEquals,
    LessThanOrEquals,
    GreaterThanOrEquals,
    LessThan,
    GreaterThan,
    Divide,
    Subtract,
    Add,
    Multiply,
    Modulus,
    EqualsNull,
    NotEqualsNull,
}

impl Operator {
    /// The operator that yields the logical complement. Operators without a
    ///  complement are returned unchanged.
    pub fn invert(self) -> Self {
        use Operator::*;
        match self {
            And => Or,
            Or => And,
            Equals => NotEquals,
            NotEquals => Equals,
            LessThan => GreaterThanOrEquals,
            GreaterThanOrEquals => LessThan,
            LessThanOrEquals => GreaterThan,
            GreaterThan => LessThanOrEquals,
            EqualsNull => NotEqualsNull,
            NotEqualsNull => EqualsNull,
            other => other,
        }
    }

    fn from_binary(op: BinaryOp) -> Option<Self> {
        Some(match op {
            BinaryOp::Add => Operator::Add,
            BinaryOp::Subtract => Operator::Subtract,
            BinaryOp::Multiply => Operator::Multiply,
            BinaryOp::Divide => Operator::Divide,
            BinaryOp::Modulo => Operator::Modulus,
            BinaryOp::And => Operator::And,
            BinaryOp::Or => Operator::Or,
            BinaryOp::Equal => Operator::Equals,
            BinaryOp::NotEqual => Operator::NotEquals,
            BinaryOp::LessThan => Operator::LessThan,
            BinaryOp::LessThanOrEqual => Operator::LessThanOrEquals,
            BinaryOp::GreaterThan => Operator::GreaterThan,
            BinaryOp::GreaterThanOrEqual => Operator::GreaterThanOrEquals,
            BinaryOp::ArrayIndex => return None,
        })
    }
}

/// Everything that differs between SQL targets. Only formatting lives here;
///  the shape of the query is decided by the [Converter].
///
/// A new target can delegate whatever it shares with Postgres:
///
/// ```rust
/// # use lambda_sql::{translate::{Dialect, postgres}, value::Value};
/// # use std::fmt::Formatter;
/// #[derive(Debug, Clone, Copy)]
/// struct Cockroach;
///
/// impl Dialect for Cockroach {
///     fn name(&self) -> &'static str {
///         "cockroach"
///     }
///
///     fn write_literal(&self, out: &mut Formatter, value: &Value) -> std::fmt::Result {
///         postgres::write_literal(out, value)
///     }
///
///     fn box_clone(&self) -> Box<dyn Dialect> {
///         Box::new(*self)
///     }
/// }
/// ```
pub trait Dialect: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Token for an operator, including any surrounding whitespace.
    fn token(&self, op: Operator) -> &'static str {
        match op {
            Operator::Null => "NULL",
            Operator::Negative => "-",
            Operator::And => " AND ",
            Operator::Or => " OR ",
            Operator::Equals => " = ",
            Operator::NotEquals => " <> ",
            Operator::LessThanOrEquals => " <= ",
            Operator::GreaterThanOrEquals => " >= ",
            Operator::LessThan => " < ",
            Operator::GreaterThan => " > ",
            Operator::Divide => " / ",
            Operator::Subtract => " - ",
            Operator::Add => " + ",
            Operator::Multiply => " * ",
            Operator::Modulus => " % ",
            Operator::EqualsNull => " IS NULL",
            Operator::NotEqualsNull => " IS NOT NULL",
            Operator::New
            | Operator::Lambda
            | Operator::Evaluate
            | Operator::Conditional
            | Operator::Call => "",
        }
    }

    /// Writes a scalar value. Lists and records never reach this point.
    fn write_literal(&self, out: &mut Formatter, value: &Value) -> std::fmt::Result;

    /// Paging and the statement terminator.
    fn write_ending(
        &self,
        out: &mut Formatter,
        limit: Option<u64>,
        offset: Option<u64>,
        terminate: bool,
    ) -> std::fmt::Result {
        if let Some(limit) = limit {
            write!(out, " LIMIT {limit}")?;
        }
        if let Some(offset) = offset {
            write!(out, " OFFSET {offset}")?;
        }
        if terminate {
            write!(out, ";")?;
        }
        Ok(())
    }

    fn box_clone(&self) -> Box<dyn Dialect>;
}

impl Clone for Box<dyn Dialect> {
    fn clone(&self) -> Box<dyn Dialect> {
        self.box_clone()
    }
}

/// Writes a single quoted string literal, doubling embedded quotes.
pub fn write_string_literal(out: &mut Formatter, s: &str) -> std::fmt::Result {
    write!(out, "'{}'", s.replace('\'', "''"))
}

/// Escapes LIKE wildcards so the text matches literally under `ESCAPE '\'`.
fn escape_like(s: &str) -> String {
    let mut res = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            res.push('\\');
        }
        res.push(c);
    }
    res
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectKind {
    #[default]
    Many,
    First,
    Single,
    Count,
    Any,
}

impl SelectKind {
    /// (LIMIT, OFFSET) for this kind of select.
    fn paging(self, skip: Option<u64>, take: Option<u64>) -> (Option<u64>, Option<u64>) {
        let at_most = |n: u64| Some(take.map_or(n, |t| t.min(n)));
        match self {
            SelectKind::Many => (take, skip),
            SelectKind::First | SelectKind::Any => (at_most(1), skip),
            // two rows are enough to tell "exactly one" from "more than one"
            SelectKind::Single => (at_most(2), skip),
            SelectKind::Count => (None, None),
        }
    }

    fn is_ordered(self) -> bool {
        matches!(self, SelectKind::Many | SelectKind::First | SelectKind::Single)
    }
}

impl std::str::FromStr for SelectKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "many" | "list" => Ok(SelectKind::Many),
            "first" => Ok(SelectKind::First),
            "single" => Ok(SelectKind::Single),
            "count" => Ok(SelectKind::Count),
            "any" => Ok(SelectKind::Any),
            other => Err(format!("unknown select kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// One ORDER BY key: a lambda over the query's model.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpec {
    pub key: E,
    pub direction: Direction,
}

/// Which columns to project and which relations to bring along. A graph
///  with no explicit columns projects every serializable property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeGraph {
    pub columns: Option<Vec<String>>,
    pub relations: Vec<Relation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// A navigation property: one with a foreign identity
    pub property: String,
    pub graph: IncludeGraph,
}

impl IncludeGraph {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn columns<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: Some(names.into_iter().map(Into::into).collect()),
            relations: Vec::new(),
        }
    }

    pub fn include(mut self, property: impl Into<String>, graph: IncludeGraph) -> Self {
        self.relations.push(Relation {
            property: property.into(),
            graph,
        });
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRequest {
    pub select: SelectKind,
    pub model: String,
    pub filter: Option<E>,
    pub order: Vec<OrderSpec>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
    pub include: Option<IncludeGraph>,
}

impl QueryRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn select(mut self, select: SelectKind) -> Self {
        self.select = select;
        self
    }

    pub fn filter(mut self, filter: E) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, key: E) -> Self {
        self.order.push(OrderSpec {
            key,
            direction: Direction::Ascending,
        });
        self
    }

    pub fn order_by_descending(mut self, key: E) -> Self {
        self.order.push(OrderSpec {
            key,
            direction: Direction::Descending,
        });
        self
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    pub fn take(mut self, n: u64) -> Self {
        self.take = Some(n);
        self
    }

    pub fn include(mut self, graph: IncludeGraph) -> Self {
        self.include = Some(graph);
        self
    }
}

/// A node of the dependant tree: the root model, or a model reached through a
///  navigation property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependant {
    pub alias: String,
    pub model: String,
    pub table: String,
    pub via: Option<Via>,
}

/// How a dependant hangs off its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Via {
    pub parent: usize,
    pub property: String,
    /// Column on the parent holding the key
    pub foreign_key: String,
    /// Key column on the dependant
    pub key: String,
}

/// The models a query touches. Node 0 is the root; every other node becomes
///  a LEFT JOIN, in the order it was discovered.
#[derive(Debug, Clone)]
pub struct DependantTree {
    nodes: Vec<Dependant>,
    prefix: String,
}

impl DependantTree {
    pub fn new(root: &Model, prefix: &str) -> Self {
        Self {
            nodes: vec![Dependant {
                alias: format!("{prefix}0"),
                model: root.name.clone(),
                table: root.table_name().to_string(),
                via: None,
            }],
            prefix: prefix.to_string(),
        }
    }

    pub fn root(&self) -> &Dependant {
        &self.nodes[0]
    }

    pub fn alias(&self, node: usize) -> &str {
        &self.nodes[node].alias
    }

    /// The dependant reached from `parent` through `property`, created on
    ///  first use. Two properties referencing the same model get two nodes.
    pub fn child(&mut self, parent: usize, property: &PropertyDescriptor, target: &Model) -> usize {
        let existing = self.nodes.iter().position(|n| {
            n.via
                .as_ref()
                .is_some_and(|via| via.parent == parent && via.property == property.name)
        });
        if let Some(index) = existing {
            return index;
        }

        let key = property
            .foreign_identity
            .as_ref()
            .map(|fi| {
                target
                    .get(&fi.property)
                    .map(|p| p.column_name())
                    .unwrap_or(&fi.property)
            })
            .unwrap_or("Id")
            .to_string();
        let alias = format!("{}{}", self.prefix, self.nodes.len());
        trace!(%alias, model = %target.name, via = %property.name, "joined dependant");

        self.nodes.push(Dependant {
            alias,
            model: target.name.clone(),
            table: target.table_name().to_string(),
            via: Some(Via {
                parent,
                property: property.name.clone(),
                foreign_key: property.column_name().to_string(),
                key,
            }),
        });
        self.nodes.len() - 1
    }

    pub fn joins(&self) -> Vec<sql::Join> {
        self.nodes
            .iter()
            .filter_map(|node| {
                let via = node.via.as_ref()?;
                Some(sql::Join {
                    table: node.table.clone(),
                    alias: node.alias.clone(),
                    key: via.key.clone(),
                    parent_alias: self.nodes[via.parent].alias.clone(),
                    foreign_key: via.foreign_key.clone(),
                })
            })
            .collect()
    }
}

/// Compiles [QueryRequest]s into SQL text.
///
/// The converter only borrows its metadata source; it can be shared between
///  threads when that source and the evaluator can.
pub struct Converter<'a, M: ?Sized, V = StandardEvaluator> {
    models: &'a M,
    evaluator: V,
    printer: PrinterConfig,
    alias_prefix: String,
}

impl<'a, M: ModelLookup + ?Sized> Converter<'a, M> {
    pub fn new(models: &'a M, config: &Config) -> Self {
        Self {
            models,
            evaluator: StandardEvaluator::new(),
            printer: config.printer(),
            alias_prefix: config.alias_prefix.clone(),
        }
    }
}

impl<'a, M: ModelLookup + ?Sized, V: ClosedEvaluator> Converter<'a, M, V> {
    /// Replaces the evaluator used for closed subtrees.
    pub fn with_evaluator<W: ClosedEvaluator>(self, evaluator: W) -> Converter<'a, M, W> {
        Converter {
            models: self.models,
            evaluator,
            printer: self.printer,
            alias_prefix: self.alias_prefix,
        }
    }

    /// Builds the SQL AST for a request without printing it.
    pub fn build(&self, request: &QueryRequest) -> Result<Query> {
        debug!(
            model = %request.model,
            select = ?request.select,
            dialect = self.printer.dialect.name(),
            "converting query"
        );
        let root = self
            .models
            .get_model(&request.model)
            .ok_or_else(|| Error::UnknownModel(request.model.clone()))?;

        let mut walk = Translation {
            models: self.models,
            evaluator: &self.evaluator,
            cx: WalkContext::new(),
            tree: DependantTree::new(root, &self.alias_prefix),
        };

        // WHERE first, then ORDER BY, then includes: all three share one tree
        let filter = request
            .filter
            .as_ref()
            .map(|f| walk.visit(f))
            .transpose()?
            .map(Sql::unparenthesized);

        let mut order = Vec::new();
        if request.select.is_ordered() {
            for spec in &request.order {
                order.push(sql::OrderBy {
                    expr: walk.visit_value_lambda(&spec.key)?,
                    descending: spec.direction == Direction::Descending,
                });
            }
        }

        let projection = match request.select {
            SelectKind::Count => Projection::Count,
            SelectKind::Any => Projection::One,
            _ => Projection::Columns(walk.project(root, request.include.as_ref())?),
        };

        let (limit, offset) = request.select.paging(request.skip, request.take);
        let query = Query {
            projection,
            table: root.table_name().to_string(),
            alias: walk.tree.root().alias.clone(),
            joins: walk.tree.joins(),
            filter,
            order,
            limit,
            offset,
        };
        debug!(joins = query.joins.len(), "converted query");
        Ok(query)
    }

    /// Compiles a request into one SQL statement.
    pub fn convert(&self, request: &QueryRequest) -> Result<String> {
        let query = self.build(request)?;
        let mut out = String::new();
        write!(out, "{}", Printer::new(&query, self.printer.clone()))
            .map_err(|_| Error::UnrenderableValue("query".to_string()))?;
        Ok(out)
    }
}

fn lookup_property<'m>(model: &'m Model, name: &str) -> Result<&'m PropertyDescriptor> {
    model.get(name).ok_or_else(|| Error::UnknownProperty {
        model: model.name.clone(),
        property: name.to_string(),
    })
}

fn literal(value: Value) -> Result<Sql> {
    match &value {
        Value::List(_) | Value::Record(_) => Err(Error::UnrenderableValue(value.type_name())),
        Value::Float(f) if !f.is_finite() => Err(Error::UnrenderableValue(value.type_name())),
        _ => Ok(Sql::Literal(value)),
    }
}

fn push_concat(parts: &mut Vec<Sql>, expr: Sql) {
    match expr {
        Sql::Concat(inner) => parts.extend(inner),
        other => parts.push(other),
    }
}

/// State of one conversion.
struct Translation<'c, 'e, M: ?Sized> {
    models: &'c M,
    evaluator: &'c dyn ClosedEvaluator,
    cx: WalkContext<'e>,
    tree: DependantTree,
}

impl<'e, M: ModelLookup + ?Sized> Walker<'e> for Translation<'_, 'e, M> {
    fn context(&mut self) -> &mut WalkContext<'e> {
        &mut self.cx
    }
}

impl<'c, 'e, M: ModelLookup + ?Sized> Translation<'c, 'e, M> {
    fn model(&self, name: &str) -> Result<&'c Model> {
        self.models
            .get_model(name)
            .ok_or_else(|| Error::UnknownModel(name.to_string()))
    }

    fn unsupported(&self, err: Error) -> Error {
        debug!(operators = ?self.cx.operators(), error = %err, "unsupported construct");
        err
    }

    fn visit(&mut self, expr: &'e E) -> Result<Sql> {
        match expr {
            E::MemberAccess {
                owner: Some(owner),
                member,
            } => self.with_member(&member.name, |s| s.visit(owner)),
            E::MemberAccess { owner: None, .. } | E::Constant { .. } => self.boundary(expr),
            E::Parameter { name, ty } => self.parameter(name, ty),
            E::Unary {
                op: UnaryOp::Convert,
                operand,
            } => self.visit(operand),

            // Nothing below consumes a member chain, so one waiting here must
            //  be applied to the node's result
            _ if self.cx.has_pending_members() => self.member_of_expression(expr),

            E::Binary {
                op: BinaryOp::ArrayIndex,
                ..
            } => {
                if is_evaluatable(expr)? {
                    self.boundary(expr)
                } else {
                    Err(self.unsupported(Error::UnsupportedOperator {
                        node: expr.kind(),
                        op: "ArrayIndex".to_string(),
                    }))
                }
            }
            E::Binary { op, left, right } if op.is_logical() => self.logical(*op, left, right),
            E::Binary { op, left, right } if op.is_comparison() => {
                self.comparison(*op, left, right)
            }
            E::Binary { op, left, right } => self.arithmetic(*op, left, right),

            E::Unary {
                op: UnaryOp::Not,
                operand,
            } => self.inverted(|s| s.visit_condition(operand)),
            E::Unary {
                op: UnaryOp::Negate,
                operand,
            } => self.with_operator(Operator::Negative, |s| {
                s.neutral(|s| Ok(Sql::Negative(Box::new(s.visit(operand)?))))
            }),

            E::MethodCall {
                target,
                method,
                args,
            } => self.method_call(expr, target.as_deref(), method, args),

            E::New { .. } | E::NewArray { .. } => {
                if is_evaluatable(expr)? {
                    self.with_operator(Operator::New, |s| s.boundary(expr))
                } else {
                    Err(self.unsupported(Error::NotEvaluatable(expr.kind())))
                }
            }

            E::Conditional {
                test,
                if_true,
                if_false,
            } => self.with_operator(Operator::Conditional, |s| {
                let test = s.neutral(|s| s.visit_condition(test))?;
                Ok(Sql::Conditional {
                    test: Box::new(test),
                    if_true: Box::new(s.visit_condition(if_true)?),
                    if_false: Box::new(s.visit_condition(if_false)?),
                })
            }),

            E::Lambda { params, body } => self.with_lambda(params, |s| s.visit_condition(body)),
        }
    }

    /// Visits a node in logical position. Leaves that can't absorb a pending
    ///  NOT themselves (a boolean column, a constant) get wrapped in one.
    fn visit_condition(&mut self, expr: &'e E) -> Result<Sql> {
        let sql = self.visit(expr)?;
        if self.cx.is_inverted() && !handles_inversion(expr)? {
            Ok(Sql::Not(Box::new(sql)))
        } else {
            Ok(sql)
        }
    }

    /// An ORDER BY key: a lambda whose body is a value, not a condition.
    fn visit_value_lambda(&mut self, key: &'e E) -> Result<Sql> {
        match lambda_parts(key) {
            Some((params, body)) => self.with_lambda(params, |s| s.visit(body)),
            None => self.visit(key),
        }
    }

    fn logical(&mut self, op: BinaryOp, left: &'e E, right: &'e E) -> Result<Sql> {
        let mut op = if op == BinaryOp::And {
            Operator::And
        } else {
            Operator::Or
        };
        if self.cx.is_inverted() {
            op = op.invert();
        }
        self.with_operator(op, |s| {
            let left = s.visit_condition(left)?;
            let right = s.visit_condition(right)?;
            Ok(Sql::binary(left, op, right))
        })
    }

    fn comparison(&mut self, op: BinaryOp, left: &'e E, right: &'e E) -> Result<Sql> {
        let Some(mut op) = Operator::from_binary(op) else {
            return Err(Error::UnsupportedNode("Binary"));
        };
        if self.cx.is_inverted() {
            op = op.invert();
        }

        let null_op = match op {
            Operator::Equals => Some(Operator::EqualsNull),
            Operator::NotEquals => Some(Operator::NotEqualsNull),
            _ => None,
        };
        if let Some(null_op) = null_op {
            let side = if self.is_provably_null(left)? {
                Some(right)
            } else if self.is_provably_null(right)? {
                Some(left)
            } else {
                None
            };
            if let Some(side) = side {
                return self.with_operator(null_op, |s| {
                    s.neutral(|s| Ok(Sql::IsNull(Box::new(s.visit(side)?), null_op)))
                });
            }
        }

        self.with_operator(op, |s| {
            s.neutral(|s| {
                let left = s.visit(left)?;
                let right = s.visit(right)?;
                Ok(Sql::binary(left, op, right))
            })
        })
    }

    /// True when `expr` is certain to be null: a null constant, a closed
    ///  subtree that evaluates to null, or a member of such a thing.
    fn is_provably_null(&self, expr: &E) -> Result<bool> {
        let structurally = match expr {
            E::Constant { value, .. } => return Ok(value.is_null()),
            E::MemberAccess {
                owner: Some(owner),
                ..
            } => self.is_provably_null(owner)?,
            E::Binary {
                op: BinaryOp::ArrayIndex,
                left,
                ..
            } => self.is_provably_null(left)?,
            E::Unary {
                op: UnaryOp::Convert,
                operand,
            } => return self.is_provably_null(operand),
            _ => false,
        };
        if structurally {
            return Ok(true);
        }
        Ok(is_evaluatable(expr)? && evaluate::evaluate(expr, self.evaluator)?.is_null())
    }

    fn arithmetic(&mut self, op: BinaryOp, left: &'e E, right: &'e E) -> Result<Sql> {
        let Some(operator) = Operator::from_binary(op) else {
            return Err(Error::UnsupportedNode("Binary"));
        };
        let concat = operator == Operator::Add
            && (self.static_type(left) == Some(ValueType::String)
                || self.static_type(right) == Some(ValueType::String));

        self.with_operator(operator, |s| {
            s.neutral(|s| {
                let left = s.visit(left)?;
                let right = s.visit(right)?;
                if concat {
                    let mut parts = Vec::new();
                    push_concat(&mut parts, left);
                    push_concat(&mut parts, right);
                    Ok(Sql::Concat(parts))
                } else {
                    Ok(Sql::binary(left, operator, right))
                }
            })
        })
    }

    /// Evaluates a closed subtree and drills the pending member chain into
    ///  the result.
    fn boundary(&mut self, expr: &'e E) -> Result<Sql> {
        let value = self.with_operator(Operator::Evaluate, |s| {
            evaluate::evaluate(expr, s.evaluator)
        })?;
        let value = self.drill(value)?;
        trace!(kind = expr.kind(), %value, "evaluated constant boundary");
        literal(value)
    }

    fn drill(&self, mut value: Value) -> Result<Value> {
        for member in self.cx.pending_members() {
            value = value
                .member(member)
                .ok_or_else(|| Error::unsupported_member(value.type_name(), member))?;
        }
        Ok(value)
    }

    /// Resolves `param.A.B...` against the model metadata, joining through
    ///  every navigation property that is followed by another member.
    fn parameter(&mut self, name: &str, ty: &str) -> Result<Sql> {
        let missing = || Error::MissingParameter {
            name: name.to_string(),
            ty: ty.to_string(),
        };
        let model_name = self.cx.model_for(name).ok_or_else(missing)?;
        if model_name != self.tree.root().model {
            return Err(missing());
        }
        let mut model = self.model(model_name)?;

        let members: Vec<&'e str> = self.cx.pending_members().collect();
        let Some((first, rest)) = members.split_first() else {
            return Err(self.unsupported(Error::UnsupportedNode("Parameter")));
        };

        let mut node = 0;
        let mut property = lookup_property(model, first)?;
        let mut rest = rest.iter().copied().peekable();
        // `HasValue` tests the foreign key itself; `Value` unwraps nothing
        while let Some(fi) = &property.foreign_identity
            && let Some(next) = rest.peek().copied()
            && next != "HasValue"
        {
            rest.next();
            if next == "Value" {
                continue;
            }
            let target = self.model(&fi.model)?;
            node = self.tree.child(node, property, target);
            model = target;
            property = lookup_property(model, next)?;
        }

        let column = Sql::column(self.tree.alias(node), property.column_name());
        self.scalar_members(column, property.ty.clone(), rest)
    }

    /// Members applied to a computed column: `Length` of strings and the
    ///  nullable wrappers `Value` and `HasValue`.
    fn scalar_members(
        &self,
        mut expr: Sql,
        mut ty: ValueType,
        members: impl Iterator<Item = &'e str>,
    ) -> Result<Sql> {
        for member in members {
            let is_string = ty == ValueType::String;
            expr = match member {
                "Length" if is_string => {
                    ty = ValueType::Int;
                    Sql::function("LENGTH", expr)
                }
                "Value" => expr,
                "HasValue" => {
                    ty = ValueType::Bool;
                    Sql::IsNull(Box::new(expr), Operator::NotEqualsNull)
                }
                _ => {
                    let err = Error::unsupported_member(ty.to_string(), member);
                    return Err(self.unsupported(err));
                }
            };
        }
        Ok(expr)
    }

    /// A member access on something that isn't a member chain, constant or
    ///  parameter: `(a + b).Length`, `p.Name.Trim().Length`.
    fn member_of_expression(&mut self, expr: &'e E) -> Result<Sql> {
        if is_evaluatable(expr)? {
            return self.boundary(expr);
        }
        let Some(ty) = self.static_type(expr) else {
            let member = self.cx.pending_members().next().unwrap_or_default();
            return Err(self.unsupported(Error::unsupported_member(expr.kind(), member)));
        };
        let members: Vec<&'e str> = self.cx.pending_members().collect();
        let inner = self.isolated(|s| s.visit(expr))?;
        self.scalar_members(inner, ty, members.into_iter())
    }

    fn method_call(
        &mut self,
        expr: &'e E,
        target: Option<&'e E>,
        method: &'e MethodRef,
        args: &'e [E],
    ) -> Result<Sql> {
        if is_evaluatable(expr)? {
            return self.boundary(expr);
        }
        let on_string = method.declaring_type == DeclaringType::String;
        let on_sequence = method.declaring_type.is_sequence();

        self.with_operator(Operator::Call, |s| match (method.known(), target, args) {
            (Some(KnownMethod::Contains), None, [collection, item]) if on_sequence => {
                s.in_list(collection, item)
            }
            (Some(KnownMethod::Contains), Some(collection), [item]) if on_sequence => {
                s.in_list(collection, item)
            }
            (
                Some(kind @ (KnownMethod::Contains | KnownMethod::StartsWith | KnownMethod::EndsWith)),
                Some(target),
                [pattern],
            ) if on_string => s.like(kind, target, pattern),
            (
                Some(kind @ (KnownMethod::ToUpper | KnownMethod::ToLower | KnownMethod::Trim)),
                Some(target),
                [],
            ) if on_string => {
                let name = match kind {
                    KnownMethod::ToUpper => "UPPER",
                    KnownMethod::ToLower => "LOWER",
                    _ => "TRIM",
                };
                let arg = s.neutral(|s| s.visit(target))?;
                Ok(Sql::function(name, arg))
            }
            _ => Err(s.unsupported(Error::unsupported_method(method))),
        })
    }

    /// `collection.Contains(item)` with a closed collection.
    fn in_list(&mut self, collection: &'e E, item: &'e E) -> Result<Sql> {
        if !is_evaluatable(collection)? {
            return Err(self.unsupported(Error::NotEvaluatable("Contains collection")));
        }
        let negated = self.cx.is_inverted();
        let values = evaluate::evaluate(collection, self.evaluator)?.into_list();
        let count = values.len();
        let values: Vec<Value> = values.into_iter().filter(|v| !v.is_null()).collect();
        let has_null = values.len() != count;

        // An empty list matches nothing
        if count == 0 {
            let rhs: i64 = if negated { 1 } else { 0 };
            return Ok(Sql::binary(Sql::from(1i64), Operator::Equals, Sql::from(rhs)));
        }

        let item = self.neutral(|s| s.visit(item))?;
        let list = values.into_iter().map(literal).collect::<Result<Vec<_>>>()?;
        if !has_null {
            return Ok(Sql::InList {
                item: Box::new(item),
                list,
                negated,
            });
        }

        // NULL never matches IN, so a null element becomes an explicit check
        let null_op = if negated {
            Operator::NotEqualsNull
        } else {
            Operator::EqualsNull
        };
        let is_null = Sql::IsNull(Box::new(item.clone()), null_op);
        if list.is_empty() {
            return Ok(is_null);
        }
        let in_list = Sql::InList {
            item: Box::new(item),
            list,
            negated,
        };
        let join = if negated { Operator::And } else { Operator::Or };
        Ok(Sql::binary(in_list, join, is_null))
    }

    fn like(&mut self, kind: KnownMethod, target: &'e E, pattern: &'e E) -> Result<Sql> {
        let negated = self.cx.is_inverted();
        let item = Box::new(self.neutral(|s| s.visit(target))?);

        if is_evaluatable(pattern)? {
            let text = match evaluate::evaluate(pattern, self.evaluator)? {
                Value::Str(text) => text,
                other => {
                    return Err(Error::Evaluation(format!(
                        "{kind} expects a string pattern, got {other}"
                    )));
                }
            };
            let text = escape_like(&text);
            let folded = match kind {
                KnownMethod::StartsWith => format!("{text}%"),
                KnownMethod::EndsWith => format!("%{text}"),
                _ => format!("%{text}%"),
            };
            return Ok(Sql::Like {
                item,
                pattern: Box::new(folded.as_str().into()),
                negated,
                escape: true,
            });
        }

        let pattern = self.neutral(|s| s.visit(pattern))?;
        let parts = match kind {
            KnownMethod::StartsWith => vec![pattern, "%".into()],
            KnownMethod::EndsWith => vec!["%".into(), pattern],
            _ => vec!["%".into(), pattern, "%".into()],
        };
        Ok(Sql::Like {
            item,
            pattern: Box::new(Sql::Concat(parts)),
            negated,
            escape: false,
        })
    }

    /// The declared type of an expression, where it can be told without
    ///  walking it.
    fn static_type(&self, expr: &E) -> Option<ValueType> {
        match expr {
            E::Constant { ty, value } if value.is_null() => Some(ty.clone()),
            E::Constant { value, .. } => Some(value.value_type()),
            E::Unary {
                op: UnaryOp::Convert,
                operand,
            } => self.static_type(operand),
            E::Parameter { name, .. } => self
                .cx
                .model_for(name)
                .map(|m| ValueType::Model(m.to_string())),
            E::MemberAccess {
                owner: Some(owner),
                member,
            } => match (self.static_type(owner)?, member.name.as_str()) {
                (ValueType::String, "Length") => Some(ValueType::Int),
                (ValueType::Model(model), name) => {
                    Some(self.models.get_model(&model)?.get(name)?.ty.clone())
                }
                _ => None,
            },
            E::MethodCall { method, .. } => match method.known()? {
                KnownMethod::ToUpper
                | KnownMethod::ToLower
                | KnownMethod::Trim
                | KnownMethod::Substring
                | KnownMethod::ToString => Some(ValueType::String),
                _ => None,
            },
            E::Binary {
                op: BinaryOp::Add,
                left,
                right,
            } => {
                let string = Some(ValueType::String);
                (self.static_type(left) == string || self.static_type(right) == string)
                    .then_some(ValueType::String)
            }
            E::Conditional { if_true, .. } => self.static_type(if_true),
            _ => None,
        }
    }

    /// Columns for the SELECT list, joining included relations.
    fn project(&mut self, root: &'c Model, include: Option<&IncludeGraph>) -> Result<Vec<SelectColumn>> {
        let all = IncludeGraph::all();
        let mut columns = Vec::new();
        self.project_node(0, root, include.unwrap_or(&all), "", &mut columns)?;
        Ok(columns)
    }

    fn project_node(
        &mut self,
        node: usize,
        model: &'c Model,
        graph: &IncludeGraph,
        path: &str,
        columns: &mut Vec<SelectColumn>,
    ) -> Result<()> {
        let alias = self.tree.alias(node).to_string();
        let properties: Vec<&PropertyDescriptor> = match &graph.columns {
            None => model.serializable().collect(),
            Some(names) => names
                .iter()
                .map(|name| lookup_property(model, name))
                .collect::<Result<_>>()?,
        };
        for property in properties {
            let label = format!("{path}{}", property.name);
            columns.push(SelectColumn {
                table: alias.clone(),
                name: property.column_name().to_string(),
                label: (label != property.column_name()).then_some(label),
            });
        }

        for relation in &graph.relations {
            let property = lookup_property(model, &relation.property)?;
            let Some(fi) = &property.foreign_identity else {
                return Err(Error::unsupported_member(&model.name, &relation.property));
            };
            let target = self.model(&fi.model)?;
            let child = self.tree.child(node, property, target);
            let path = format!("{path}{}.", property.name);
            self.project_node(child, target, &relation.graph, &path, columns)?;
        }
        Ok(())
    }
}

/// Whether a node deals with an enclosing NOT itself rather than needing
///  to be wrapped.
fn handles_inversion(expr: &E) -> Result<bool> {
    Ok(match expr {
        E::Binary { op, .. } => op.is_logical() || op.is_comparison(),
        E::Unary {
            op: UnaryOp::Not, ..
        }
        | E::Conditional { .. }
        | E::Lambda { .. } => true,
        E::Unary {
            op: UnaryOp::Convert,
            operand,
        } => handles_inversion(operand)?,
        E::MethodCall { method, .. } => {
            matches!(
                method.known(),
                Some(KnownMethod::Contains | KnownMethod::StartsWith | KnownMethod::EndsWith)
            ) && !is_evaluatable(expr)?
        }
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Catalog, PropertyDescriptor as P};

    #[test]
    fn invert_is_an_involution() {
        use Operator::*;
        for op in [
            And,
            Or,
            Equals,
            NotEquals,
            LessThan,
            GreaterThanOrEquals,
            LessThanOrEquals,
            GreaterThan,
            EqualsNull,
            NotEqualsNull,
            Add,
            Call,
        ] {
            assert_eq!(op.invert().invert(), op);
        }
        assert_eq!(LessThan.invert(), GreaterThanOrEquals);
        assert_eq!(LessThanOrEquals.invert(), GreaterThan);
        assert_eq!(Add.invert(), Add);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("foo"), "foo");
        assert_eq!(escape_like("50%_off"), r"50\%\_off");
        assert_eq!(escape_like(r"a\b"), r"a\\b");
    }

    #[test]
    fn paging() {
        assert_eq!(SelectKind::Many.paging(Some(5), Some(10)), (Some(10), Some(5)));
        assert_eq!(SelectKind::First.paging(None, Some(10)), (Some(1), None));
        assert_eq!(SelectKind::First.paging(None, Some(0)), (Some(0), None));
        assert_eq!(SelectKind::Single.paging(Some(3), None), (Some(2), Some(3)));
        assert_eq!(SelectKind::Count.paging(Some(3), Some(4)), (None, None));
    }

    #[test]
    fn dependants_are_keyed_by_property() {
        let person = Model::new("Person")
            .property(P::new("Id", "int"))
            .property(P::new("Manager", "Person").column("manager_id").references("Person", "Id"))
            .property(P::new("Mentor", "Person").column("mentor_id").references("Person", "Id"));
        let catalog = Catalog::new().with(person.clone());
        let person = catalog.get_model("Person").unwrap();

        let mut tree = DependantTree::new(person, "t");
        let manager = person.get("Manager").unwrap();
        let mentor = person.get("Mentor").unwrap();

        let a = tree.child(0, manager, person);
        let b = tree.child(0, mentor, person);
        assert_eq!(tree.child(0, manager, person), a);
        assert_ne!(a, b);

        let nested = tree.child(a, manager, person);
        assert_eq!(tree.alias(nested), "t3");

        let joins = tree.joins();
        assert_eq!(joins.len(), 3);
        assert_eq!(joins[0].foreign_key, "manager_id");
        assert_eq!(joins[1].foreign_key, "mentor_id");
        assert_eq!(joins[2].parent_alias, "t1");
    }
}
