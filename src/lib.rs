//! Compiles C#-style lambda predicates over a described data model into SQL,
//!  and mines the literal values a predicate compares properties against.
//!
//! ```rust
//! use lambda_sql::{
//!     config::Config,
//!     model::{Catalog, Model, PropertyDescriptor},
//!     parser::parse_lambda,
//!     translate::{Converter, QueryRequest},
//! };
//!
//! let catalog = Catalog::new().with(
//!     Model::new("Person")
//!         .table("people")
//!         .property(PropertyDescriptor::new("Id", "int"))
//!         .property(PropertyDescriptor::new("Name", "string?")),
//! );
//! let filter = parse_lambda("p => p.Name == null", "Person", &catalog).unwrap();
//! let sql = Converter::new(&catalog, &Config::default())
//!     .convert(&QueryRequest::new("Person").filter(filter))
//!     .unwrap();
//! assert_eq!(
//!     sql,
//!     r#"SELECT t0."Id", t0."Name" FROM "people" AS t0 WHERE (t0."Name") IS NULL;"#
//! );
//! ```

pub mod ast;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod extract;
pub mod fuzz_helper;
pub mod lex;
pub mod methods;
pub mod model;
pub mod parser;
pub mod sql;
pub mod to_sql;
pub mod translate;
pub mod value;
mod walk;


pub use error::{Error, Result};
pub use extract::Extractor;
pub use translate::{Converter, QueryRequest, SelectKind};
