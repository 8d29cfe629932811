use std::str::FromStr;

/// The type a method or static member is declared on. Only the types the
///  translator dispatches on get their own variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeclaringType {
    /// `System.Linq.Enumerable` static extension methods
    Enumerable,
    /// `System.Linq.Queryable` static extension methods
    Queryable,
    /// Instance methods of arrays, lists, sets and other collections
    Collection,
    String,
    DateTime,
    Math,
    Other(String),
}

impl DeclaringType {
    pub fn is_sequence(&self) -> bool {
        matches!(
            self,
            DeclaringType::Enumerable | DeclaringType::Queryable | DeclaringType::Collection
        )
    }
}

impl From<&str> for DeclaringType {
    fn from(s: &str) -> Self {
        match s {
            "Enumerable" => DeclaringType::Enumerable,
            "Queryable" => DeclaringType::Queryable,
            "List" | "IList" | "ICollection" | "HashSet" | "ISet" | "Array" | "Collection" => {
                DeclaringType::Collection
            }
            "string" | "String" => DeclaringType::String,
            "DateTime" | "DateOnly" => DeclaringType::DateTime,
            "Math" => DeclaringType::Math,
            other => DeclaringType::Other(other.to_string()),
        }
    }
}

impl From<String> for DeclaringType {
    fn from(s: String) -> Self {
        DeclaringType::from(s.as_str())
    }
}

impl std::fmt::Display for DeclaringType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeclaringType::Enumerable => write!(f, "Enumerable"),
            DeclaringType::Queryable => write!(f, "Queryable"),
            DeclaringType::Collection => write!(f, "ICollection"),
            DeclaringType::String => write!(f, "String"),
            DeclaringType::DateTime => write!(f, "DateTime"),
            DeclaringType::Math => write!(f, "Math"),
            DeclaringType::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Methods with a known meaning. Anything else is carried by name and only
///  survives if the whole call can be evaluated up front.
#[derive(strum::Display, strum::EnumString, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownMethod {
    Contains,
    StartsWith,
    EndsWith,
    ToUpper,
    ToLower,
    Trim,
    Substring,
    ToString,
    Equals,
    AddDays,
    Abs,
    Max,
    Min,
}

/// A reference to a method: where it's declared and what it's called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRef {
    pub declaring_type: DeclaringType,
    pub name: String,
}

impl MethodRef {
    pub fn new(declaring_type: impl Into<DeclaringType>, name: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
        }
    }

    pub fn known(&self) -> Option<KnownMethod> {
        KnownMethod::from_str(&self.name).ok()
    }
}

impl std::fmt::Display for MethodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.declaring_type, self.name)
    }
}

/// A reference to a field or property, including static ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    pub declaring_type: String,
    pub name: String,
}

impl MemberRef {
    pub fn new(declaring_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_methods() {
        assert_eq!(
            MethodRef::new("Enumerable", "Contains").known(),
            Some(KnownMethod::Contains)
        );
        assert_eq!(MethodRef::new("string", "Frobnicate").known(), None);
        assert_eq!(KnownMethod::StartsWith.to_string(), "StartsWith");
    }

    #[test]
    fn declaring_types() {
        assert_eq!(DeclaringType::from("List"), DeclaringType::Collection);
        assert_eq!(DeclaringType::from("string"), DeclaringType::String);
        assert_eq!(
            DeclaringType::from("Widget"),
            DeclaringType::Other("Widget".into())
        );
        assert!(DeclaringType::Queryable.is_sequence());
        assert!(!DeclaringType::String.is_sequence());
    }
}
