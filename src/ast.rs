use crate::{
    methods::{DeclaringType, MemberRef, MethodRef},
    value::{Value, ValueType},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    And,
    Or,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    ArrayIndex,
}

impl BinaryOp {
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::ArrayIndex => "[]",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
    /// Casts and nullable lifting; carries no meaning for translation
    Convert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LambdaParam {
    pub name: String,
    pub ty: String,
}

/// An expression tree over one bound model parameter. This is the input to
///  both the SQL translator and the value extractor; neither modifies it.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    /// `owner.member`, or a static member when there is no owner
    MemberAccess {
        owner: Option<Box<Expression>>,
        member: MemberRef,
    },
    Constant {
        ty: ValueType,
        value: Value,
    },
    /// `ty` names the model the parameter is bound to
    Parameter {
        name: String,
        ty: String,
    },
    MethodCall {
        target: Option<Box<Expression>>,
        method: MethodRef,
        args: Vec<Expression>,
    },
    New {
        ty: String,
        args: Vec<Expression>,
    },
    NewArray {
        element_ty: ValueType,
        items: Vec<Expression>,
    },
    Conditional {
        test: Box<Expression>,
        if_true: Box<Expression>,
        if_false: Box<Expression>,
    },
    Lambda {
        params: Vec<LambdaParam>,
        body: Box<Expression>,
    },
}

impl Expression {
    /// Name of the node kind, as reported in errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Expression::Binary { .. } => "Binary",
            Expression::Unary { .. } => "Unary",
            Expression::MemberAccess { .. } => "MemberAccess",
            Expression::Constant { .. } => "Constant",
            Expression::Parameter { .. } => "Parameter",
            Expression::MethodCall { .. } => "MethodCall",
            Expression::New { .. } => "New",
            Expression::NewArray { .. } => "NewArray",
            Expression::Conditional { .. } => "Conditional",
            Expression::Lambda { .. } => "Lambda",
        }
    }

    // Constructors. These mirror what a C# compiler produces for the
    //  corresponding source and keep tests readable.

    pub fn constant(value: impl Into<Value>) -> Self {
        let value = value.into();
        Expression::Constant {
            ty: value.value_type(),
            value,
        }
    }

    pub fn null() -> Self {
        Expression::Constant {
            ty: ValueType::Unknown,
            value: Value::Null,
        }
    }

    pub fn param(name: impl Into<String>, model: impl Into<String>) -> Self {
        Expression::Parameter {
            name: name.into(),
            ty: model.into(),
        }
    }

    /// Instance member access; the declaring type is taken from a parameter
    ///  owner when there is one.
    pub fn member(self, name: impl Into<String>) -> Self {
        let declaring_type = match &self {
            Expression::Parameter { ty, .. } => ty.clone(),
            _ => "object".to_string(),
        };
        Expression::MemberAccess {
            owner: Some(Box::new(self)),
            member: MemberRef::new(declaring_type, name),
        }
    }

    pub fn static_member(declaring_type: impl Into<String>, name: impl Into<String>) -> Self {
        Expression::MemberAccess {
            owner: None,
            member: MemberRef::new(declaring_type, name),
        }
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn equal(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOp::Equal, left, right)
    }

    pub fn not_equal(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOp::NotEqual, left, right)
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOp::And, left, right)
    }

    pub fn or(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOp::Or, left, right)
    }

    pub fn unary(op: UnaryOp, operand: Expression) -> Self {
        Expression::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn not(operand: Expression) -> Self {
        Self::unary(UnaryOp::Not, operand)
    }

    pub fn call(target: Expression, method: MethodRef, args: Vec<Expression>) -> Self {
        Expression::MethodCall {
            target: Some(Box::new(target)),
            method,
            args,
        }
    }

    pub fn static_call(method: MethodRef, args: Vec<Expression>) -> Self {
        Expression::MethodCall {
            target: None,
            method,
            args,
        }
    }

    pub fn new_array(element_ty: ValueType, items: Vec<Expression>) -> Self {
        Expression::NewArray { element_ty, items }
    }

    pub fn conditional(test: Expression, if_true: Expression, if_false: Expression) -> Self {
        Expression::Conditional {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        }
    }

    /// `name => body` with the parameter bound to `model`
    pub fn lambda(name: impl Into<String>, model: impl Into<String>, body: Expression) -> Self {
        Expression::Lambda {
            params: vec![LambdaParam {
                name: name.into(),
                ty: model.into(),
            }],
            body: Box::new(body),
        }
    }

    /// `collection.Contains(item)` as the `Enumerable.Contains` extension call
    pub fn contains(collection: Expression, item: Expression) -> Self {
        Self::static_call(
            MethodRef::new(DeclaringType::Enumerable, "Contains"),
            vec![collection, item],
        )
    }
}

fn write_args(f: &mut std::fmt::Formatter<'_>, args: &[Expression]) -> std::fmt::Result {
    let mut first = true;
    for arg in args {
        if first {
            first = false;
        } else {
            write!(f, ", ")?;
        }
        write!(f, "{arg}")?;
    }
    Ok(())
}

/// Prints the tree back as C#-style source, parenthesizing every operator.
impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Binary {
                op: BinaryOp::ArrayIndex,
                left,
                right,
            } => write!(f, "{left}[{right}]"),
            Expression::Binary { op, left, right } => {
                write!(f, "({left} {} {right})", op.symbol())
            }
            Expression::Unary { op, operand } => match op {
                UnaryOp::Not => write!(f, "!{operand}"),
                UnaryOp::Negate => write!(f, "-{operand}"),
                UnaryOp::Convert => write!(f, "{operand}"),
            },
            Expression::MemberAccess {
                owner: Some(owner),
                member,
            } => write!(f, "{owner}.{}", member.name),
            Expression::MemberAccess {
                owner: None,
                member,
            } => write!(f, "{}.{}", member.declaring_type, member.name),
            Expression::Constant { value, .. } => write!(f, "{value}"),
            Expression::Parameter { name, .. } => write!(f, "{name}"),
            Expression::MethodCall {
                target,
                method,
                args,
            } => {
                match target {
                    Some(target) => write!(f, "{target}.{}(", method.name)?,
                    None => write!(f, "{method}(")?,
                }
                write_args(f, args)?;
                write!(f, ")")
            }
            Expression::New { ty, args } => {
                write!(f, "new {ty}(")?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Expression::NewArray { items, .. } => {
                write!(f, "new[] {{ ")?;
                write_args(f, items)?;
                write!(f, " }}")
            }
            Expression::Conditional {
                test,
                if_true,
                if_false,
            } => write!(f, "({test} ? {if_true} : {if_false})"),
            Expression::Lambda { params, body } => {
                if let [param] = params.as_slice() {
                    write!(f, "{} => {body}", param.name)
                } else {
                    write!(f, "(")?;
                    for (i, param) in params.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", param.name)?;
                    }
                    write!(f, ") => {body}")
                }
            }
        }
    }
}
