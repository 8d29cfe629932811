use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::value::ValueType;

/// Marks a property as a navigable relationship: the property's column holds
///  the key of a row in `model`, matched against that model's `property`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignIdentity {
    pub model: String,
    #[serde(default = "default_identity")]
    pub property: String,
}

fn default_identity() -> String {
    "Id".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PropertyDef")]
pub struct PropertyDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ValueType,
    pub nullable: bool,
    /// Column name when it differs from the property name
    pub column: Option<String>,
    /// Whether the property is projected by a default SELECT
    pub serialize: bool,
    pub foreign_identity: Option<ForeignIdentity>,
}

// The on-disk shape: `type` is a C# type name that may carry a `?`
#[derive(Deserialize)]
struct PropertyDef {
    name: String,
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    nullable: bool,
    #[serde(default)]
    column: Option<String>,
    #[serde(default = "default_true")]
    serialize: bool,
    #[serde(default)]
    foreign_identity: Option<ForeignIdentity>,
}

fn default_true() -> bool {
    true
}

impl From<PropertyDef> for PropertyDescriptor {
    fn from(def: PropertyDef) -> Self {
        let (ty, marked_nullable) = ValueType::parse_name(&def.ty);
        Self {
            name: def.name,
            ty,
            nullable: def.nullable || marked_nullable,
            column: def.column,
            serialize: def.serialize,
            foreign_identity: def.foreign_identity,
        }
    }
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, ty: impl Into<ValueType>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            nullable: false,
            column: None,
            serialize: true,
            foreign_identity: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.serialize = false;
        self
    }

    /// Makes this property a relationship to `model`, keyed by `property`.
    pub fn references(mut self, model: impl Into<String>, property: impl Into<String>) -> Self {
        self.foreign_identity = Some(ForeignIdentity {
            model: model.into(),
            property: property.into(),
        });
        self
    }

    pub fn column_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    #[serde(default)]
    pub table: Option<String>,
    pub properties: Vec<PropertyDescriptor>,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            properties: Vec::new(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }

    pub fn get(&self, property: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == property)
    }

    /// Properties a default SELECT projects, in declaration order.
    pub fn serializable(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.iter().filter(|p| p.serialize)
    }
}

/// Metadata seam: given a model type name, return its description.
///
/// Implementations must be deterministic and free of side effects; a walk may
///  ask for the same model any number of times.
pub trait ModelLookup {
    fn get_model(&self, name: &str) -> Option<&Model>;
}

/// An in-memory [ModelLookup], built in code or loaded from JSON:
///
/// ```json
/// { "models": [
///     { "name": "Person", "table": "people", "properties": [
///         { "name": "Id", "type": "int" },
///         { "name": "Manager", "type": "Person?", "foreign_identity": { "model": "Person" } }
///     ] }
/// ] }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "CatalogDef", into = "CatalogDef")]
pub struct Catalog {
    models: HashMap<String, Model>,
}

#[derive(Serialize, Deserialize)]
struct CatalogDef {
    models: Vec<Model>,
}

impl From<CatalogDef> for Catalog {
    fn from(def: CatalogDef) -> Self {
        def.models.into_iter().fold(Catalog::default(), Catalog::with)
    }
}

impl From<Catalog> for CatalogDef {
    fn from(catalog: Catalog) -> Self {
        let mut models: Vec<Model> = catalog.models.into_values().collect();
        models.sort_by(|a, b| a.name.cmp(&b.name));
        CatalogDef { models }
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, model: Model) -> Self {
        self.insert(model);
        self
    }

    pub fn insert(&mut self, model: Model) {
        self.models.insert(model.name.clone(), model);
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl ModelLookup for Catalog {
    fn get_model(&self, name: &str) -> Option<&Model> {
        self.models.get(name)
    }
}
