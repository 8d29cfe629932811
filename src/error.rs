use thiserror::Error;

use crate::parser;

/// Every way a translation or extraction can fail. All of them abort the whole
///  call; nothing is retried and no partial output is produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("unsupported expression node: {0}")]
    UnsupportedNode(&'static str),

    #[error("unsupported operator {op} on {node}")]
    UnsupportedOperator { node: &'static str, op: String },

    #[error("unsupported method {method} declared on {declaring_type}")]
    UnsupportedMethod {
        declaring_type: String,
        method: String,
    },

    #[error("member {member} of {declaring_type} is not supported")]
    UnsupportedMember {
        declaring_type: String,
        member: String,
    },

    #[error("lambda must take exactly one model parameter, got {0}")]
    LambdaArity(usize),

    #[error("no model is bound to parameter '{name}' of type {ty}")]
    MissingParameter { name: String, ty: String },

    #[error("unknown model {0}")]
    UnknownModel(String),

    #[error("model {model} has no property {property}")]
    UnknownProperty { model: String, property: String },

    #[error("{0} must only depend on constant values")]
    NotEvaluatable(&'static str),

    #[error("could not evaluate constant expression: {0}")]
    Evaluation(String),

    #[error("a value of type {0} has no SQL literal form")]
    UnrenderableValue(String),

    #[error(transparent)]
    Parse(#[from] parser::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn unsupported_method(method: &crate::methods::MethodRef) -> Self {
        Error::UnsupportedMethod {
            declaring_type: method.declaring_type.to_string(),
            method: method.name.clone(),
        }
    }

    pub(crate) fn unsupported_member(
        declaring_type: impl Into<String>,
        member: impl Into<String>,
    ) -> Self {
        Error::UnsupportedMember {
            declaring_type: declaring_type.into(),
            member: member.into(),
        }
    }
}
