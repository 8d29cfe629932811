use chrono::{Datelike, NaiveDate, NaiveDateTime};

/// The declared type of a constant, a property, or a parameter.
///
/// Type names follow the C# spelling the expressions were written in, so
///  `int?`, `List<string>`, and `Person` all parse; anything not recognized
///  as a scalar or a sequence is taken to name a model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Decimal,
    String,
    Date,
    DateTime,
    Bytes,
    List(Box<ValueType>),
    Model(String),
    Unknown,
}

impl ValueType {
    pub fn element(&self) -> Option<&ValueType> {
        match self {
            ValueType::List(inner) => Some(inner),
            _ => None,
        }
    }

    /// Parses a type name. The second element reports whether the name carried
    ///  a nullable marker (`int?`).
    pub fn parse_name(name: &str) -> (ValueType, bool) {
        let name = name.trim();
        if let Some(inner) = name.strip_suffix('?') {
            return (Self::parse_name(inner).0, true);
        }
        if let Some(inner) = name.strip_prefix("Nullable<").and_then(|s| s.strip_suffix('>')) {
            return (Self::parse_name(inner).0, true);
        }
        if let Some(inner) = name.strip_suffix("[]") {
            let inner = Self::parse_name(inner).0;
            // byte[] is a blob, not a sequence of numbers
            if inner == ValueType::Int && name.starts_with("byte") {
                return (ValueType::Bytes, false);
            }
            return (ValueType::List(Box::new(inner)), false);
        }
        if let Some((outer, inner)) = name.split_once('<')
            && let Some(inner) = inner.strip_suffix('>')
            && matches!(
                outer,
                "List" | "IList" | "ICollection" | "IEnumerable" | "HashSet" | "ISet"
                    | "IReadOnlyList" | "IReadOnlyCollection"
            )
        {
            return (ValueType::List(Box::new(Self::parse_name(inner).0)), false);
        }

        let ty = match name {
            "bool" | "Boolean" => ValueType::Bool,
            "byte" | "sbyte" | "short" | "ushort" | "int" | "uint" | "long" | "ulong"
            | "Int16" | "Int32" | "Int64" => ValueType::Int,
            "float" | "double" | "Single" | "Double" => ValueType::Float,
            "decimal" | "Decimal" => ValueType::Decimal,
            "string" | "String" | "char" | "Char" | "Guid" => ValueType::String,
            "DateOnly" | "date" => ValueType::Date,
            "DateTime" | "DateTimeOffset" => ValueType::DateTime,
            "" | "object" | "Object" => ValueType::Unknown,
            model => ValueType::Model(model.to_string()),
        };
        (ty, false)
    }
}

impl From<String> for ValueType {
    fn from(s: String) -> Self {
        ValueType::parse_name(&s).0
    }
}

impl From<ValueType> for String {
    fn from(ty: ValueType) -> Self {
        ty.to_string()
    }
}

impl From<&str> for ValueType {
    fn from(s: &str) -> Self {
        ValueType::parse_name(s).0
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueType::Bool => write!(f, "bool"),
            ValueType::Int => write!(f, "long"),
            ValueType::Float => write!(f, "double"),
            ValueType::Decimal => write!(f, "decimal"),
            ValueType::String => write!(f, "string"),
            ValueType::Date => write!(f, "DateOnly"),
            ValueType::DateTime => write!(f, "DateTime"),
            ValueType::Bytes => write!(f, "byte[]"),
            ValueType::List(inner) => write!(f, "{inner}[]"),
            ValueType::Model(name) => write!(f, "{name}"),
            ValueType::Unknown => write!(f, "object"),
        }
    }
}

/// A record stands in for any object value that is not a scalar: a captured
///  closure, an instance built by a constructor, an entity passed in by the
///  caller. Fields are kept in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub type_name: String,
    pub fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, v)| v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Record(Record),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The runtime type of this value. Null has no type of its own.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Unknown,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::String,
            Value::Date(_) => ValueType::Date,
            Value::DateTime(_) => ValueType::DateTime,
            Value::Bytes(_) => ValueType::Bytes,
            Value::List(items) => ValueType::List(Box::new(
                items
                    .iter()
                    .find(|v| !v.is_null())
                    .map(Value::value_type)
                    .unwrap_or(ValueType::Unknown),
            )),
            Value::Record(r) => ValueType::Model(r.type_name.clone()),
        }
    }

    /// Name of the type a member lookup is performed against, used in error
    ///  messages.
    pub fn type_name(&self) -> String {
        match self {
            Value::Record(r) => r.type_name.clone(),
            other => other.value_type().to_string(),
        }
    }

    /// Field or property get. Returns `None` when the member does not exist
    ///  on this value's type; a null owner yields null for any member except
    ///  `HasValue`.
    pub fn member(&self, name: &str) -> Option<Value> {
        match (self, name) {
            (Value::Null, "HasValue") => Some(Value::Bool(false)),
            (Value::Null, _) => Some(Value::Null),
            (Value::Record(r), name) => r.get(name).cloned(),
            (Value::Str(s), "Length") => Some(Value::Int(s.chars().count() as i64)),
            (Value::List(items), "Count" | "Length") => Some(Value::Int(items.len() as i64)),
            (Value::Bytes(b), "Length") => Some(Value::Int(b.len() as i64)),
            (Value::Date(d), "Year") => Some(Value::Int(d.year().into())),
            (Value::Date(d), "Month") => Some(Value::Int(d.month().into())),
            (Value::Date(d), "Day") => Some(Value::Int(d.day().into())),
            (Value::DateTime(d), "Year") => Some(Value::Int(d.year().into())),
            (Value::DateTime(d), "Month") => Some(Value::Int(d.month().into())),
            (Value::DateTime(d), "Day") => Some(Value::Int(d.day().into())),
            (Value::DateTime(d), "Date") => d.date().and_hms_opt(0, 0, 0).map(Value::DateTime),
            (_, "HasValue") => Some(Value::Bool(true)),
            (_, "Value") => Some(self.clone()),
            _ => None,
        }
    }

    /// Flattens a sequence into its elements; any other value becomes a
    ///  single element list. Strings and blobs are not sequences here.
    pub fn into_list(self) -> Vec<Value> {
        match self {
            Value::List(items) => items,
            other => vec![other],
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}
impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}
impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Record(v)
    }
}
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Str(s) => write!(f, "\"{s}\""),
            Value::Date(d) => write!(f, "{d}"),
            Value::DateTime(d) => write!(f, "{d}"),
            Value::Bytes(b) => write!(f, "byte[{}]", b.len()),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Record(r) => write!(f, "{} {{..}}", r.type_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_type_names() {
        assert_eq!(ValueType::parse_name("int"), (ValueType::Int, false));
        assert_eq!(ValueType::parse_name("int?"), (ValueType::Int, true));
        assert_eq!(
            ValueType::parse_name("Nullable<DateTime>"),
            (ValueType::DateTime, true)
        );
        assert_eq!(ValueType::parse_name("byte[]"), (ValueType::Bytes, false));
        assert_eq!(
            ValueType::parse_name("List<string>"),
            (ValueType::List(Box::new(ValueType::String)), false)
        );
        assert_eq!(
            ValueType::parse_name("long[]"),
            (ValueType::List(Box::new(ValueType::Int)), false)
        );
        assert_eq!(
            ValueType::parse_name("Person"),
            (ValueType::Model("Person".into()), false)
        );
    }

    #[test]
    fn member_of_null_is_null() {
        assert_eq!(Value::Null.member("Anything"), Some(Value::Null));
    }

    #[test]
    fn record_members() {
        let r = Value::Record(Record::new("Filter").with("Id", 7).with("Name", "Bob"));
        assert_eq!(r.member("Id"), Some(Value::Int(7)));
        assert_eq!(r.member("Missing"), None);
        assert_eq!(Value::from("hello").member("Length"), Some(Value::Int(5)));
    }

    #[test]
    fn into_list_flattens_sequences_only() {
        assert_eq!(
            Value::from(vec![1, 2, 3]).into_list(),
            vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        );
        assert_eq!(Value::from("abc").into_list(), vec![Value::from("abc")]);
        assert_eq!(Value::Null.into_list(), vec![Value::Null]);
    }
}
