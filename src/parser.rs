//! Parses C#-style lambda text into an [Expression] tree.
//!
//! ```text
//! p => p.Manager.Name == "Bob" && !new[] { 1, 2 }.Contains(p.Id)
//! ```
//!
//! The grammar covers what the translator understands: literals, member
//!  access, calls, `new`, casts, the usual operators and `?:`. Declaring
//!  types of members and methods are inferred from the model catalog, so
//!  `p.Name.Contains(..)` becomes a string method and `p.Tags.Contains(..)` a
//!  collection one.

use crate::{
    ast::{BinaryOp, Expression, LambdaParam, UnaryOp},
    lex::{Error as LexerError, Lexer, Token, TokenType},
    methods::{KnownMethod, MemberRef, MethodRef},
    model::ModelLookup,
    value::{Value, ValueType},
};

/// Trees deeper than this are rejected rather than risking the stack in the
///  recursive walks that follow.
const MAX_DEPTH: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Returned when the input is empty (or just whitespace)
    #[error("empty input")]
    NoExpression,
    #[error("lexical error: {0}")]
    Lexical(#[from] LexerError),
    #[error("expected {expected} at {at}")]
    Expected { expected: &'static str, at: usize },
    #[error("unexpected token {0}")]
    UnexpectedToken(Token),
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),
    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),
    #[error("invalid escape sequence at {0}")]
    InvalidEscape(usize),
    #[error("expression nests deeper than {MAX_DEPTH} levels")]
    TooDeep,
}

/// Parses `text`, a lambda whose parameter is bound to `model`.
pub fn parse_lambda(
    text: &str,
    model: &str,
    models: &dyn ModelLookup,
) -> Result<Expression, Error> {
    let mut parser = Parser {
        lexer: Lexer::new(text.as_bytes()),
        models,
        params: Vec::new(),
        depth: 0,
    };
    let root = parser.parse_lambda(model)?;

    // Make sure we've completely parsed the input
    if let Some(tok) = parser.lexer.next_token()? {
        Err(Error::UnexpectedToken(tok))
    } else {
        Ok(root)
    }
}

struct Parser<'input, 'm> {
    lexer: Lexer<'input>,
    models: &'m dyn ModelLookup,
    /// Parameters in scope: (name, model)
    params: Vec<LambdaParam>,
    depth: usize,
}

impl<'input> Parser<'input, '_> {
    fn next(&mut self) -> Result<Token, Error> {
        self.lexer.next_token()?.ok_or(Error::UnexpectedEof)
    }

    fn expect(&mut self, ty: TokenType, expected: &'static str) -> Result<Token, Error> {
        let tok = self.next()?;
        if tok.ty == ty {
            Ok(tok)
        } else {
            Err(Error::Expected {
                expected,
                at: tok.start(),
            })
        }
    }

    fn text(&self, tok: &Token) -> String {
        String::from_utf8_lossy(self.lexer.contents(tok)).into_owned()
    }

    /// `p => body` or `(a, b) => body`
    fn parse_lambda(&mut self, model: &str) -> Result<Expression, Error> {
        let first = self.lexer.next_token()?.ok_or(Error::NoExpression)?;
        let mut names = Vec::new();
        match first.ty {
            TokenType::Identifier => names.push(self.text(&first)),
            TokenType::ParenLeft => loop {
                let name = self.expect(TokenType::Identifier, "a parameter name")?;
                names.push(self.text(&name));
                if !self.lexer.consume(TokenType::Comma)? {
                    self.expect(TokenType::ParenRight, "')'")?;
                    break;
                }
            },
            _ => return Err(Error::UnexpectedToken(first)),
        }
        self.expect(TokenType::Arrow, "'=>'")?;

        let params: Vec<LambdaParam> = names
            .into_iter()
            .map(|name| LambdaParam {
                name,
                ty: model.to_string(),
            })
            .collect();
        self.params = params.clone();
        let body = self.parse_expr(0)?;
        Ok(Expression::Lambda {
            params,
            body: Box::new(body),
        })
    }

    fn parse_expr(&mut self, min_binding_power: u8) -> Result<Expression, Error> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(Error::TooDeep);
        }
        let res = self.parse_expr_inner(min_binding_power);
        self.depth -= 1;
        res
    }

    fn parse_expr_inner(&mut self, min_binding_power: u8) -> Result<Expression, Error> {
        let mut lhs = self.parse_prefix()?;

        // height of `lhs`; every trip round the loop can only grow it
        let mut levels = height(&lhs, MAX_DEPTH);
        if levels > MAX_DEPTH {
            return Err(Error::TooDeep);
        }
        loop {
            let Some(op_tok) = self.lexer.peek_token()? else {
                break;
            };

            if let Some(l_pow) = postfix_binding(op_tok.ty) {
                if l_pow < min_binding_power {
                    break;
                }
                lhs = self.parse_postfix(lhs)?;
                // the owner comes first; the rest are the index or arguments
                let rest = children(&lhs).into_iter().skip(1);
                levels = rest.map(|c| height(c, MAX_DEPTH)).fold(levels, usize::max) + 1;
            } else if let Some((l_pow, r_pow)) = infix_binding(op_tok.ty) {
                if l_pow < min_binding_power {
                    break;
                }
                _ = self.next()?;

                if op_tok.ty == TokenType::Question {
                    let if_true = self.parse_expr(0)?;
                    self.expect(TokenType::Colon, "':'")?;
                    let if_false = self.parse_expr(r_pow)?;
                    levels = levels
                        .max(height(&if_true, MAX_DEPTH))
                        .max(height(&if_false, MAX_DEPTH))
                        + 1;
                    lhs = Expression::conditional(lhs, if_true, if_false);
                } else {
                    let rhs = self.parse_expr(r_pow)?;
                    levels = levels.max(height(&rhs, MAX_DEPTH)) + 1;
                    lhs = Expression::binary(binary_op(op_tok)?, lhs, rhs);
                }
            } else {
                break;
            }

            if levels > MAX_DEPTH {
                return Err(Error::TooDeep);
            }
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expression, Error> {
        let tok = self.next()?;
        match tok.ty {
            TokenType::ParenLeft => {
                if self.consume_cast()? {
                    let ((), pow) = PREFIX_BINDING;
                    let operand = self.parse_expr(pow)?;
                    return Ok(Expression::unary(UnaryOp::Convert, operand));
                }
                let inner = self.parse_expr(0)?;
                self.expect(TokenType::ParenRight, "')'")?;
                Ok(inner)
            }
            TokenType::Bang | TokenType::Minus => {
                let ((), pow) = PREFIX_BINDING;
                let operand = self.parse_expr(pow)?;
                let op = if tok.ty == TokenType::Bang {
                    UnaryOp::Not
                } else {
                    UnaryOp::Negate
                };
                Ok(Expression::unary(op, operand))
            }
            TokenType::Number => self.parse_number(&tok),
            TokenType::String | TokenType::Char => {
                Ok(Expression::constant(unescape(self.lexer.contents(&tok), tok.start())?))
            }
            TokenType::VerbatimString => {
                Ok(Expression::constant(self.text(&tok).replace("\"\"", "\"")))
            }
            TokenType::True => Ok(Expression::constant(true)),
            TokenType::False => Ok(Expression::constant(false)),
            TokenType::Null => Ok(Expression::null()),
            TokenType::New => self.parse_new(),
            TokenType::Identifier => self.parse_identifier(&tok),
            _ => Err(Error::UnexpectedToken(tok)),
        }
    }

    /// After a `(`: consumes `type)` or `type?)` when the parenthesis opens a
    ///  cast. Only scalar type names make a cast; anything else is grouping.
    fn consume_cast(&mut self) -> Result<bool, Error> {
        let mut ahead = self.lexer.clone();
        let Some(name) = ahead.next_token()? else {
            return Ok(false);
        };
        if name.ty != TokenType::Identifier || !is_scalar_type(&self.text(&name)) {
            return Ok(false);
        }
        _ = ahead.consume(TokenType::Question)?;
        if !ahead.consume(TokenType::ParenRight)? {
            return Ok(false);
        }
        self.lexer = ahead;
        Ok(true)
    }

    fn parse_number(&self, tok: &Token) -> Result<Expression, Error> {
        let text = self.text(tok);
        let digits = text.trim_end_matches(|c: char| c.is_ascii_alphabetic());
        let suffix = text[digits.len()..].to_ascii_lowercase();
        let invalid = || Error::InvalidNumber(text.clone());

        if digits.contains('.') || matches!(suffix.as_str(), "m" | "d" | "f") {
            let value: f64 = digits.parse().map_err(|_| invalid())?;
            let ty = if suffix == "m" {
                ValueType::Decimal
            } else {
                ValueType::Float
            };
            return Ok(Expression::Constant {
                ty,
                value: Value::Float(value),
            });
        }
        if !matches!(suffix.as_str(), "" | "l" | "u" | "ul" | "lu") {
            return Err(invalid());
        }
        let value: i64 = digits.parse().map_err(|_| invalid())?;
        Ok(Expression::constant(value))
    }

    /// `new[] { .. }`, `new T[] { .. }`, `new List<T> { .. }` or `new T(args)`
    fn parse_new(&mut self) -> Result<Expression, Error> {
        if self.lexer.consume(TokenType::BracketLeft)? {
            self.expect(TokenType::BracketRight, "']'")?;
            let items = self.parse_list(TokenType::BraceLeft, TokenType::BraceRight)?;
            let element_ty = items
                .iter()
                .map(|item| self.type_of(item))
                .find(|ty| *ty != ValueType::Unknown)
                .unwrap_or(ValueType::Unknown);
            return Ok(Expression::new_array(element_ty, items));
        }

        let name = self.expect(TokenType::Identifier, "a type name")?;
        let mut ty = self.text(&name);
        if self.lexer.consume(TokenType::LT)? {
            let arg = self.expect(TokenType::Identifier, "a type argument")?;
            ty = format!("{ty}<{}>", self.text(&arg));
            self.expect(TokenType::GT, "'>'")?;
        } else if self.lexer.consume(TokenType::BracketLeft)? {
            self.expect(TokenType::BracketRight, "']'")?;
            ty.push_str("[]");
        }

        match self.lexer.peek_token()?.map(|t| t.ty) {
            Some(TokenType::ParenLeft) => {
                let args = self.parse_list(TokenType::ParenLeft, TokenType::ParenRight)?;
                Ok(Expression::New { ty, args })
            }
            Some(TokenType::BraceLeft) => {
                let element_ty = match ValueType::parse_name(&ty).0 {
                    ValueType::List(element) => *element,
                    _ => return Err(Error::Expected {
                        expected: "a collection type",
                        at: name.start(),
                    }),
                };
                let items = self.parse_list(TokenType::BraceLeft, TokenType::BraceRight)?;
                Ok(Expression::new_array(element_ty, items))
            }
            _ => Err(Error::Expected {
                expected: "'(' or '{'",
                at: name.start(),
            }),
        }
    }

    /// A lambda parameter, or a type name for a static member or call.
    fn parse_identifier(&mut self, tok: &Token) -> Result<Expression, Error> {
        let name = self.text(tok);
        if let Some(param) = self.params.iter().find(|p| p.name == name) {
            return Ok(Expression::param(&param.name, &param.ty));
        }

        // type names are PascalCase, apart from the C# keywords
        let is_type = name.starts_with(|c: char| c.is_ascii_uppercase()) || is_scalar_type(&name);
        if !is_type || !self.lexer.consume(TokenType::Dot)? {
            return Err(Error::UnknownIdentifier(name));
        }
        let member = self.expect(TokenType::Identifier, "a member name")?;
        let member = self.text(&member);
        if self.lexer.peek_token()?.map(|t| t.ty) == Some(TokenType::ParenLeft) {
            let args = self.parse_list(TokenType::ParenLeft, TokenType::ParenRight)?;
            Ok(Expression::static_call(MethodRef::new(name, member), args))
        } else {
            Ok(Expression::static_member(name, member))
        }
    }

    /// `.Member`, `.Method(args)` or `[index]` applied to `owner`.
    fn parse_postfix(&mut self, owner: Expression) -> Result<Expression, Error> {
        let tok = self.next()?;
        if tok.ty == TokenType::BracketLeft {
            let index = self.parse_expr(0)?;
            self.expect(TokenType::BracketRight, "']'")?;
            return Ok(Expression::binary(BinaryOp::ArrayIndex, owner, index));
        }

        let member = self.expect(TokenType::Identifier, "a member name")?;
        let member = self.text(&member);
        let owner_ty = self.type_of(&owner);
        if self.lexer.peek_token()?.map(|t| t.ty) == Some(TokenType::ParenLeft) {
            let args = self.parse_list(TokenType::ParenLeft, TokenType::ParenRight)?;
            let method = MethodRef::new(declaring_type(&owner_ty), member);
            return Ok(Expression::call(owner, method, args));
        }

        Ok(Expression::MemberAccess {
            owner: Some(Box::new(owner)),
            member: MemberRef::new(declaring_type(&owner_ty), member),
        })
    }

    /// `open item, item, .. close`, with the opening token still pending.
    fn parse_list(&mut self, open: TokenType, close: TokenType) -> Result<Vec<Expression>, Error> {
        let start = self.next()?;
        if start.ty != open {
            return Err(Error::UnexpectedToken(start));
        }
        let mut items = Vec::new();
        if self.lexer.consume(close)? {
            return Ok(items);
        }
        loop {
            items.push(self.parse_expr(0)?);
            if self.lexer.consume(close)? {
                return Ok(items);
            }
            let tok = self.next()?;
            if tok.ty != TokenType::Comma {
                return Err(Error::UnexpectedToken(tok));
            }
        }
    }

    /// Best effort static type, used to pick declaring types.
    fn type_of(&self, expr: &Expression) -> ValueType {
        match expr {
            Expression::Constant { ty, .. } => ty.clone(),
            Expression::Parameter { ty, .. } => ValueType::Model(ty.clone()),
            Expression::MemberAccess {
                owner: Some(owner),
                member,
            } => match (self.type_of(owner), member.name.as_str()) {
                (ValueType::Model(model), name) => self
                    .models
                    .get_model(&model)
                    .and_then(|m| m.get(name))
                    .map(|p| p.ty.clone())
                    .unwrap_or(ValueType::Unknown),
                (ValueType::String | ValueType::List(_) | ValueType::Bytes, "Length" | "Count") => {
                    ValueType::Int
                }
                (ty, "Value") => ty,
                (_, "HasValue") => ValueType::Bool,
                _ => ValueType::Unknown,
            },
            Expression::MemberAccess { owner: None, member } => {
                match (member.declaring_type.as_str(), member.name.as_str()) {
                    ("DateTime", _) => ValueType::DateTime,
                    ("string" | "String", "Empty") => ValueType::String,
                    (_, "MaxValue" | "MinValue") => ValueType::Int,
                    _ => ValueType::Unknown,
                }
            }
            Expression::MethodCall { method, target, .. } => match method.known() {
                Some(
                    KnownMethod::ToUpper
                    | KnownMethod::ToLower
                    | KnownMethod::Trim
                    | KnownMethod::Substring
                    | KnownMethod::ToString,
                ) => ValueType::String,
                Some(
                    KnownMethod::Contains
                    | KnownMethod::StartsWith
                    | KnownMethod::EndsWith
                    | KnownMethod::Equals,
                ) => ValueType::Bool,
                Some(KnownMethod::AddDays) => target
                    .as_deref()
                    .map(|t| self.type_of(t))
                    .unwrap_or(ValueType::Unknown),
                _ => ValueType::Unknown,
            },
            Expression::New { ty, .. } => ValueType::parse_name(ty).0,
            Expression::NewArray { element_ty, .. } => ValueType::List(Box::new(element_ty.clone())),
            Expression::Unary { op, operand } => match op {
                UnaryOp::Not => ValueType::Bool,
                _ => self.type_of(operand),
            },
            Expression::Binary { op, left, right } => {
                if op.is_logical() || op.is_comparison() {
                    ValueType::Bool
                } else if *op == BinaryOp::ArrayIndex {
                    self.type_of(left).element().cloned().unwrap_or(ValueType::Unknown)
                } else {
                    let left = self.type_of(left);
                    if left == ValueType::String || self.type_of(right) == ValueType::String {
                        ValueType::String
                    } else {
                        left
                    }
                }
            }
            Expression::Conditional { if_true, .. } => self.type_of(if_true),
            Expression::Lambda { .. } => ValueType::Unknown,
        }
    }
}

fn declaring_type(ty: &ValueType) -> String {
    match ty {
        ValueType::String => "string".to_string(),
        ValueType::List(_) => "List".to_string(),
        ValueType::Date | ValueType::DateTime => "DateTime".to_string(),
        ValueType::Model(name) => name.clone(),
        other => other.to_string(),
    }
}

fn is_scalar_type(name: &str) -> bool {
    matches!(
        name,
        "bool" | "byte" | "short" | "int" | "long" | "float" | "double" | "decimal" | "string"
            | "char" | "object" | "DateTime" | "DateOnly"
    )
}

fn unescape(raw: &[u8], at: usize) -> Result<String, Error> {
    let raw = String::from_utf8_lossy(raw);
    let mut res = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            res.push(c);
            continue;
        }
        let escaped = match chars.next() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('0') => '\0',
            Some(c @ ('\\' | '"' | '\'')) => c,
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or(Error::InvalidEscape(at))?
            }
            _ => return Err(Error::InvalidEscape(at)),
        };
        res.push(escaped);
    }
    Ok(res)
}

fn binary_op(tok: Token) -> Result<BinaryOp, Error> {
    Ok(match tok.ty {
        TokenType::Plus => BinaryOp::Add,
        TokenType::Minus => BinaryOp::Subtract,
        TokenType::Asterisk => BinaryOp::Multiply,
        TokenType::ForwardSlash => BinaryOp::Divide,
        TokenType::Percent => BinaryOp::Modulo,
        TokenType::Equals => BinaryOp::Equal,
        TokenType::NotEquals => BinaryOp::NotEqual,
        TokenType::LT => BinaryOp::LessThan,
        TokenType::LTE => BinaryOp::LessThanOrEqual,
        TokenType::GT => BinaryOp::GreaterThan,
        TokenType::GTE => BinaryOp::GreaterThanOrEqual,
        TokenType::And => BinaryOp::And,
        TokenType::Or => BinaryOp::Or,
        _ => return Err(Error::UnexpectedToken(tok)),
    })
}

// NOTE binding power is a more intuitive version of "precedence": higher
//  binding power means the operator binds more tightly. Prefix `!` and `-`
//  bind tighter than any infix operator but looser than member access, so
//  `!p.IsActive` negates the member rather than the parameter.
/// Direct subexpressions of `expr`, owner or target first.
fn children(expr: &Expression) -> Vec<&Expression> {
    match expr {
        Expression::Binary { left, right, .. } => vec![&**left, &**right],
        Expression::Unary { operand, .. } => vec![&**operand],
        Expression::MemberAccess { owner, .. } => owner.iter().map(|o| &**o).collect(),
        Expression::MethodCall { target, args, .. } => {
            target.iter().map(|t| &**t).chain(args).collect()
        }
        Expression::New { args, .. } => args.iter().collect(),
        Expression::NewArray { items, .. } => items.iter().collect(),
        Expression::Conditional {
            test,
            if_true,
            if_false,
        } => vec![&**test, &**if_true, &**if_false],
        Expression::Lambda { body, .. } => vec![&**body],
        Expression::Constant { .. } | Expression::Parameter { .. } => Vec::new(),
    }
}

/// Levels in `expr`, counting no further than `cap + 1` so the measurement
///  itself never recurses past the limit.
fn height(expr: &Expression, cap: usize) -> usize {
    if cap == 0 {
        return 1;
    }
    1 + children(expr)
        .into_iter()
        .map(|c| height(c, cap - 1))
        .max()
        .unwrap_or(0)
}

const PREFIX_BINDING: ((), u8) = ((), 70);

fn postfix_binding(ty: TokenType) -> Option<u8> {
    match ty {
        TokenType::Dot | TokenType::BracketLeft => Some(80),
        _ => None,
    }
}

// NOTE for infix bindings we specify a left and right side of the operator;
//  a right side lower than the left makes the operator right associative,
//  which the conditional operator needs.
fn infix_binding(ty: TokenType) -> Option<(u8, u8)> {
    match ty {
        TokenType::Asterisk | TokenType::ForwardSlash | TokenType::Percent => Some((60, 61)),
        TokenType::Plus | TokenType::Minus => Some((50, 51)),
        TokenType::LT | TokenType::LTE | TokenType::GT | TokenType::GTE => Some((40, 41)),
        TokenType::Equals | TokenType::NotEquals => Some((30, 31)),
        TokenType::And => Some((20, 21)),
        TokenType::Or => Some((10, 11)),
        TokenType::Question => Some((5, 4)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        methods::DeclaringType,
        model::{Catalog, Model, PropertyDescriptor as P},
    };

    fn catalog() -> Catalog {
        Catalog::new().with(
            Model::new("Person")
                .property(P::new("Id", "int"))
                .property(P::new("Name", "string?"))
                .property(P::new("Tags", "List<string>"))
                .property(P::new("Manager", "Person").references("Person", "Id")),
        )
    }

    fn parse(text: &str) -> Result<Expression, Error> {
        parse_lambda(text, "Person", &catalog())
    }

    fn body(text: &str) -> Expression {
        match parse(text).expect("a valid parse") {
            Expression::Lambda { body, .. } => *body,
            other => panic!("Expected a Lambda, got {other:?}"),
        }
    }

    #[test]
    fn precedence() {
        assert_eq!(
            body("p => p.Id + 1 * 2 == 3 || !p.Tags.Contains(\"x\") && p.Id < 4").to_string(),
            "(((p.Id + (1 * 2)) == 3) || (!p.Tags.Contains(\"x\") && (p.Id < 4)))"
        );
        assert_eq!(
            body("p => p.Id > 1 ? p.Name : \"none\"").to_string(),
            "((p.Id > 1) ? p.Name : \"none\")"
        );
        assert_eq!(body("p => -(p.Id - 1)").to_string(), "-(p.Id - 1)");
    }

    #[test]
    fn declaring_types_follow_the_catalog() {
        let Expression::MethodCall { method, .. } = body(r#"p => p.Name.StartsWith("B")"#) else {
            panic!("Expected a MethodCall")
        };
        assert_eq!(method.declaring_type, DeclaringType::String);

        let Expression::MethodCall { method, .. } = body(r#"p => p.Tags.Contains("x")"#) else {
            panic!("Expected a MethodCall")
        };
        assert_eq!(method.declaring_type, DeclaringType::Collection);

        let Expression::MethodCall { method, .. } = body("p => p.Manager.Name.Trim().ToUpper()") else {
            panic!("Expected a MethodCall")
        };
        assert_eq!(method.declaring_type, DeclaringType::String);
    }

    #[test]
    fn literals() {
        assert_eq!(body("p => 42L"), Expression::constant(42));
        assert_eq!(body("p => 1.5"), Expression::constant(1.5));
        assert_eq!(body(r#"p => "a\"b\n""#), Expression::constant("a\"b\n"));
        assert_eq!(body(r#"p => @"C:\x""y""#), Expression::constant("C:\\x\"y"));
        assert_eq!(body("p => 'c'"), Expression::constant("c"));
        assert_eq!(body("p => null"), Expression::null());
        assert!(matches!(
            body("p => 2.5m"),
            Expression::Constant {
                ty: ValueType::Decimal,
                ..
            }
        ));
    }

    #[test]
    fn arrays_statics_and_construction() {
        assert_eq!(
            body("p => new[] { 1, 2 }.Contains(p.Id)").to_string(),
            "new[] { 1, 2 }.Contains(p.Id)"
        );
        assert_eq!(
            body("p => new List<int> { 3 }.Contains(p.Id)").to_string(),
            "new[] { 3 }.Contains(p.Id)"
        );
        assert_eq!(
            body("p => Enumerable.Contains(new long[] { }, p.Id)").to_string(),
            "Enumerable.Contains(new[] {  }, p.Id)"
        );
        assert_eq!(
            body("p => new DateTime(2024, 1, 2) < DateTime.Today").to_string(),
            "(new DateTime(2024, 1, 2) < DateTime.Today)"
        );
        assert_eq!(
            body("p => (long)p.Id == 1").to_string(),
            "(p.Id == 1)"
        );
        assert_eq!(
            body("p => (p.Id) == 1").to_string(),
            "(p.Id == 1)"
        );
    }

    #[test]
    fn parameter_lists() {
        let Expression::Lambda { params, .. } = parse("(a, b) => a.Id == b.Id").expect("a valid parse")
        else {
            panic!("Expected a Lambda")
        };
        assert_eq!(params.len(), 2);
        assert!(parse("(p) => p.Id == 1").is_ok());
    }

    #[test]
    fn errors() {
        assert_eq!(parse(""), Err(Error::NoExpression));
        assert_eq!(parse("   "), Err(Error::NoExpression));
        assert_eq!(parse("p => q.Id"), Err(Error::UnknownIdentifier("q".into())));
        assert_eq!(parse("p => p.Id =="), Err(Error::UnexpectedEof));
        assert!(matches!(parse("p p.Id"), Err(Error::Expected { .. })));
        assert_eq!(parse("p => (p.Id"), Err(Error::UnexpectedEof));
        assert!(matches!(parse("p => (p.Id]"), Err(Error::Expected { .. })));
        assert!(matches!(parse("p => p.Id ) "), Err(Error::UnexpectedToken(_))));
        assert!(matches!(parse(r#"p => "open"#), Err(Error::Lexical(_))));
        assert_eq!(
            parse("p => 99999999999999999999"),
            Err(Error::InvalidNumber("99999999999999999999".into()))
        );

        let deep = format!("p => {}p.Id{}", "(".repeat(500), ")".repeat(500));
        assert_eq!(parse(&deep), Err(Error::TooDeep));
        let long = format!("p => p.Id{}", " + 1".repeat(500));
        assert_eq!(parse(&long), Err(Error::TooDeep));

        // each group stays under the limit on its own, but the chains stack
        let mut nested = "p.Id".to_string();
        for level in 0..150 {
            nested = format!("({nested}{})", " + 1".repeat(40 + level));
        }
        assert_eq!(parse(&format!("p => {nested} > 0")), Err(Error::TooDeep));

        let wide = format!("p => {}", vec!["(p.Id + 1 > 0)"; 150].join(" && "));
        assert!(parse(&wide).is_ok());
    }
}
