//! Mines literal candidates for named properties out of a predicate.
//!
//! The extractor walks the same grammar as the [Converter](crate::translate::Converter)
//!  but produces no text. Only two shapes contribute: `prop == values` and
//!  `values.Contains(prop)`. The result is advisory; a caller uses it to
//!  pre-fetch rows or check a cache, so over-reporting is safe and
//!  under-reporting is not.

use std::collections::HashMap;

use tracing::debug;

use crate::{
    ast::{BinaryOp, Expression as E, UnaryOp},
    error::{Error, Result},
    evaluate::{self, ClosedEvaluator, StandardEvaluator, is_evaluatable},
    methods::{DeclaringType, KnownMethod, MethodRef},
    model::ModelLookup,
    value::Value,
    walk::{WalkContext, Walker},
};

/// What a subtree resolved to, if anything.
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Values(Vec<Value>),
    Property { model: String, property: String },
}

pub struct Extractor<'a, M: ?Sized, V = StandardEvaluator> {
    models: &'a M,
    evaluator: V,
}

impl<'a, M: ModelLookup + ?Sized> Extractor<'a, M> {
    pub fn new(models: &'a M) -> Self {
        Self {
            models,
            evaluator: StandardEvaluator::new(),
        }
    }
}

impl<'a, M: ModelLookup + ?Sized, V: ClosedEvaluator> Extractor<'a, M, V> {
    pub fn with_evaluator<W: ClosedEvaluator>(self, evaluator: W) -> Extractor<'a, M, W> {
        Extractor {
            models: self.models,
            evaluator,
        }
    }

    /// Values `filter` compares properties of `model` against, for each of
    ///  `names`. Every name is present in the result, possibly empty.
    pub fn extract<I, S>(
        &self,
        filter: &E,
        model: &str,
        names: I,
    ) -> Result<HashMap<String, Vec<Value>>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.models.get_model(model).is_none() {
            return Err(Error::UnknownModel(model.to_string()));
        }
        let found: HashMap<String, Vec<Value>> = names
            .into_iter()
            .map(|name| (name.into(), Vec::new()))
            .collect();
        debug!(model, names = found.len(), "extracting values");

        let mut walk = Extraction {
            models: self.models,
            evaluator: &self.evaluator,
            cx: WalkContext::new(),
            model,
            found,
        };
        walk.visit(filter)?;

        let found = walk.found;
        debug!(
            values = found.values().map(Vec::len).sum::<usize>(),
            "extracted values"
        );
        Ok(found)
    }
}

struct Extraction<'c, 'e, M: ?Sized> {
    models: &'c M,
    evaluator: &'c dyn ClosedEvaluator,
    cx: WalkContext<'e>,
    model: &'c str,
    found: HashMap<String, Vec<Value>>,
}

impl<'e, M: ModelLookup + ?Sized> Walker<'e> for Extraction<'_, 'e, M> {
    fn context(&mut self) -> &mut WalkContext<'e> {
        &mut self.cx
    }
}

impl<'e, M: ModelLookup + ?Sized> Extraction<'_, 'e, M> {
    fn visit(&mut self, expr: &'e E) -> Result<Option<Operand>> {
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
            E::Lambda { params, body } => self.with_lambda(params, |s| s.visit(body)),

            _ if is_evaluatable(expr)? => self.boundary(expr),
            // a member of a computed value never names a property
            _ if self.cx.has_pending_members() => {
                self.isolated(|s| s.visit(expr))?;
                Ok(None)
            }

            E::Binary {
                op: BinaryOp::ArrayIndex,
                ..
            } => Err(Error::UnsupportedOperator {
                node: expr.kind(),
                op: "ArrayIndex".to_string(),
            }),
            E::Binary {
                op: BinaryOp::Equal,
                left,
                right,
            } => {
                // equality contributes under any number of NOTs
                let (left, right) =
                    self.neutral(|s| Ok::<_, Error>((s.visit(left)?, s.visit(right)?)))?;
                self.contribute(left, right);
                Ok(None)
            }
            E::Binary { op, left, right } if op.is_logical() => {
                self.visit(left)?;
                self.visit(right)?;
                Ok(None)
            }
            E::Binary { left, right, .. } => {
                self.neutral(|s| {
                    s.visit(left)?;
                    s.visit(right)
                })?;
                Ok(None)
            }

            E::Unary {
                op: UnaryOp::Not,
                operand,
            } => {
                self.inverted(|s| s.visit(operand))?;
                Ok(None)
            }
            E::Unary { operand, .. } => {
                self.neutral(|s| s.visit(operand))?;
                Ok(None)
            }

            E::MethodCall {
                target,
                method,
                args,
            } => self.method_call(target.as_deref(), method, args),

            E::New { .. } | E::NewArray { .. } => Err(Error::NotEvaluatable(expr.kind())),

            E::Conditional {
                test,
                if_true,
                if_false,
            } => {
                // every branch contributes, whichever one would run
                self.neutral(|s| s.visit(test))?;
                self.visit(if_true)?;
                self.visit(if_false)?;
                Ok(None)
            }
        }
    }

    fn boundary(&mut self, expr: &E) -> Result<Option<Operand>> {
        let mut value = evaluate::evaluate(expr, self.evaluator)?;
        for member in self.cx.pending_members() {
            value = value
                .member(member)
                .ok_or_else(|| Error::unsupported_member(value.type_name(), member))?;
        }
        Ok(Some(Operand::Values(value.into_list())))
    }

    /// `param.A.B` resolves to the property `B` of the model `A` refers to.
    fn parameter(&mut self, name: &str, ty: &str) -> Result<Option<Operand>> {
        let missing = || Error::MissingParameter {
            name: name.to_string(),
            ty: ty.to_string(),
        };
        let model_name = self.cx.model_for(name).ok_or_else(missing)?;
        let mut model = self
            .models
            .get_model(model_name)
            .ok_or_else(|| Error::UnknownModel(model_name.to_string()))?;

        // `Value` unwraps a nullable without changing what it names
        let mut members = self.cx.pending_members().filter(|m| *m != "Value");
        let Some(first) = members.next() else {
            return Ok(None);
        };
        let mut property = first;
        loop {
            let descriptor = model.get(property).ok_or_else(|| Error::UnknownProperty {
                model: model.name.clone(),
                property: property.to_string(),
            })?;
            let Some(next) = members.next() else {
                return Ok(Some(Operand::Property {
                    model: model.name.clone(),
                    property: property.to_string(),
                }));
            };
            let Some(fi) = &descriptor.foreign_identity else {
                // `p.Name.Length` is a computed value, not a property
                return Ok(None);
            };
            model = self
                .models
                .get_model(&fi.model)
                .ok_or_else(|| Error::UnknownModel(fi.model.clone()))?;
            property = next;
        }
    }

    fn method_call(
        &mut self,
        target: Option<&'e E>,
        method: &'e MethodRef,
        args: &'e [E],
    ) -> Result<Option<Operand>> {
        let (collection, item) = match (method.known(), target, args) {
            (Some(KnownMethod::Contains), None, [collection, item])
                if method.declaring_type.is_sequence() =>
            {
                (collection, item)
            }
            (Some(KnownMethod::Contains), Some(collection), [item])
                if method.declaring_type.is_sequence() =>
            {
                (collection, item)
            }
            (Some(known), Some(_), _) if method.declaring_type == DeclaringType::String => {
                return match known {
                    KnownMethod::Contains
                    | KnownMethod::StartsWith
                    | KnownMethod::EndsWith
                    | KnownMethod::ToUpper
                    | KnownMethod::ToLower
                    | KnownMethod::Trim => Ok(None),
                    _ => Err(Error::unsupported_method(method)),
                };
            }
            _ => return Err(Error::unsupported_method(method)),
        };

        let inverted = self.cx.is_inverted();
        let (collection, item) =
            self.neutral(|s| Ok::<_, Error>((s.visit(collection)?, s.visit(item)?)))?;
        if !inverted {
            self.contribute(item, collection);
        }
        Ok(None)
    }

    fn contribute(&mut self, a: Option<Operand>, b: Option<Operand>) {
        let (model, property, values) = match (a, b) {
            (Some(Operand::Property { model, property }), Some(Operand::Values(values)))
            | (Some(Operand::Values(values)), Some(Operand::Property { model, property })) => {
                (model, property, values)
            }
            _ => return,
        };
        if model != self.model {
            return;
        }
        if let Some(found) = self.found.get_mut(&property) {
            found.extend(values);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{Catalog, Model, PropertyDescriptor as P},
        value::{Record, ValueType},
    };

    fn catalog() -> Catalog {
        Catalog::new()
            .with(
                Model::new("Person")
                    .property(P::new("Id", "int"))
                    .property(P::new("Name", "string?"))
                    .property(P::new("Department", "Department").references("Department", "Id")),
            )
            .with(
                Model::new("Department")
                    .property(P::new("Id", "int"))
                    .property(P::new("Code", "string")),
            )
    }

    fn p() -> E {
        E::param("p", "Person")
    }

    fn ids() -> E {
        E::new_array(ValueType::Int, vec![E::constant(1), E::constant(2)])
    }

    fn extract(body: E, model: &str, names: &[&str]) -> HashMap<String, Vec<Value>> {
        let catalog = catalog();
        Extractor::new(&catalog)
            .extract(&E::lambda("p", "Person", body), model, names.iter().copied())
            .unwrap()
    }

    #[test]
    fn equality_on_either_side() {
        let found = extract(E::equal(E::constant(7), p().member("Id")), "Person", &["Id"]);
        assert_eq!(found["Id"], vec![Value::Int(7)]);

        let found = extract(
            E::not(E::equal(p().member("Id"), E::constant(7))),
            "Person",
            &["Id"],
        );
        assert_eq!(found["Id"], vec![Value::Int(7)]);
    }

    #[test]
    fn instance_contains_respects_negation() {
        let contains = || E::call(ids(), MethodRef::new("List", "Contains"), vec![p().member("Id")]);
        assert_eq!(
            extract(contains(), "Person", &["Id"])["Id"],
            vec![Value::Int(1), Value::Int(2)]
        );
        assert!(extract(E::not(contains()), "Person", &["Id"])["Id"].is_empty());
        // two NOTs cancel out
        assert_eq!(extract(E::not(E::not(contains())), "Person", &["Id"])["Id"].len(), 2);
    }

    #[test]
    fn navigation_resolves_to_referenced_model() {
        let body = E::and(
            E::equal(p().member("Department").member("Code"), E::constant("ENG")),
            E::equal(p().member("Name"), E::constant("Bob")),
        );
        let found = extract(body.clone(), "Department", &["Code", "Name"]);
        assert_eq!(found["Code"], vec![Value::from("ENG")]);
        assert!(found["Name"].is_empty());

        let found = extract(body, "Person", &["Code", "Name"]);
        assert!(found["Code"].is_empty());
        assert_eq!(found["Name"], vec![Value::from("Bob")]);
    }

    #[test]
    fn nullable_value_names_the_property() {
        let body = E::equal(p().member("Name").member("Value"), E::constant("Bob"));
        assert_eq!(extract(body, "Person", &["Name"])["Name"], vec![Value::from("Bob")]);

        let body = E::equal(
            p().member("Department").member("Value").member("Code"),
            E::constant("ENG"),
        );
        assert_eq!(extract(body, "Department", &["Code"])["Code"], vec![Value::from("ENG")]);

        // a computed member is not the property
        let body = E::equal(p().member("Name").member("Length"), E::constant(3));
        assert!(extract(body, "Person", &["Name"])["Name"].is_empty());
    }

    #[test]
    fn closure_members_and_string_methods() {
        let closure = Record::new("Closure").with("wanted", vec![3, 4]);
        let body = E::or(
            E::contains(E::constant(closure).member("wanted"), p().member("Id")),
            E::call(
                p().member("Name"),
                MethodRef::new("string", "Contains"),
                vec![E::constant("x")],
            ),
        );
        let found = extract(body, "Person", &["Id", "Name"]);
        assert_eq!(found["Id"], vec![Value::Int(3), Value::Int(4)]);
        assert!(found["Name"].is_empty());
    }

    #[test]
    fn conditional_contributes_every_branch() {
        let body = E::conditional(
            E::equal(p().member("Name"), E::null()),
            E::equal(p().member("Id"), E::constant(1)),
            E::equal(p().member("Id"), E::constant(2)),
        );
        let found = extract(body, "Person", &["Id"]);
        assert_eq!(found["Id"], vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn failures() {
        let catalog = catalog();
        let extractor = Extractor::new(&catalog);
        let two = E::Lambda {
            params: vec![
                crate::ast::LambdaParam {
                    name: "a".into(),
                    ty: "Person".into(),
                },
                crate::ast::LambdaParam {
                    name: "b".into(),
                    ty: "Person".into(),
                },
            ],
            body: Box::new(E::constant(true)),
        };
        assert_eq!(extractor.extract(&two, "Person", ["Id"]), Err(Error::LambdaArity(2)));

        let unbound = E::equal(E::param("q", "Person").member("Id"), E::constant(1));
        assert!(matches!(
            extractor.extract(&unbound, "Person", ["Id"]),
            Err(Error::MissingParameter { .. })
        ));
        assert_eq!(
            extractor.extract(&E::constant(true), "Nope", ["Id"]),
            Err(Error::UnknownModel("Nope".into()))
        );
    }
}
