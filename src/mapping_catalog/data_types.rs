//! Semantic (model-level) and physical (store-level) data types.
//!
//! Every resolved expression carries both: the semantic type drives
//! semi-structured casts and result-set mapping, the physical type is what
//! the result schema declares to the execution layer.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Model-level type of a property or expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SemanticType {
    String,
    Integer,
    Float,
    Decimal,
    Number,
    Boolean,
    StrictDate,
    DateTime,
    Date,
    /// Enumeration, by fully qualified path
    Enum(String),
    /// Class, by fully qualified path
    Class(String),
}

impl SemanticType {
    /// Resolve a primitive type name (`String`, `Integer`, ...).
    ///
    /// Returns `None` for anything that is not a primitive; the class model
    /// decides whether such a name is an enum or a class.
    pub fn primitive(name: &str) -> Option<SemanticType> {
        match name {
            "String" => Some(SemanticType::String),
            "Integer" => Some(SemanticType::Integer),
            "Float" => Some(SemanticType::Float),
            "Decimal" => Some(SemanticType::Decimal),
            "Number" => Some(SemanticType::Number),
            "Boolean" => Some(SemanticType::Boolean),
            "StrictDate" => Some(SemanticType::StrictDate),
            "DateTime" => Some(SemanticType::DateTime),
            "Date" => Some(SemanticType::Date),
            _ => None,
        }
    }

    pub fn is_class(&self) -> bool {
        matches!(self, SemanticType::Class(_))
    }

    pub fn class_path(&self) -> Option<&str> {
        match self {
            SemanticType::Class(path) => Some(path.as_str()),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            SemanticType::Integer | SemanticType::Float | SemanticType::Decimal | SemanticType::Number
        )
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SemanticType::String => "String",
            SemanticType::Integer => "Integer",
            SemanticType::Float => "Float",
            SemanticType::Decimal => "Decimal",
            SemanticType::Number => "Number",
            SemanticType::Boolean => "Boolean",
            SemanticType::StrictDate => "StrictDate",
            SemanticType::DateTime => "DateTime",
            SemanticType::Date => "Date",
            SemanticType::Enum(path) | SemanticType::Class(path) => path.as_str(),
        };
        write!(f, "{}", name)
    }
}

impl Serialize for SemanticType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Store-level column type, as declared in the result schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PhysicalType {
    Varchar(Option<u32>),
    Integer,
    BigInt,
    Double,
    Decimal { precision: u8, scale: u8 },
    Boolean,
    Date,
    Timestamp,
    Variant,
    Other(String),
}

/// Width used for strings read out of semi-structured documents
pub const SEMI_STRUCTURED_VARCHAR_WIDTH: u32 = 8192;

impl PhysicalType {
    /// Physical type used when a value has no declared column type
    /// (semi-structured accesses, computed expressions).
    pub fn default_for(semantic: &SemanticType) -> PhysicalType {
        match semantic {
            SemanticType::String | SemanticType::Enum(_) => {
                PhysicalType::Varchar(Some(SEMI_STRUCTURED_VARCHAR_WIDTH))
            }
            SemanticType::Integer => PhysicalType::BigInt,
            SemanticType::Float | SemanticType::Number => PhysicalType::Double,
            SemanticType::Decimal => PhysicalType::Decimal {
                precision: 38,
                scale: 18,
            },
            SemanticType::Boolean => PhysicalType::Boolean,
            SemanticType::StrictDate | SemanticType::Date => PhysicalType::Date,
            SemanticType::DateTime => PhysicalType::Timestamp,
            SemanticType::Class(_) => PhysicalType::Variant,
        }
    }
}

impl fmt::Display for PhysicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicalType::Varchar(Some(n)) => write!(f, "VARCHAR({})", n),
            PhysicalType::Varchar(None) => write!(f, "VARCHAR"),
            PhysicalType::Integer => write!(f, "INT"),
            PhysicalType::BigInt => write!(f, "BIGINT"),
            PhysicalType::Double => write!(f, "DOUBLE"),
            PhysicalType::Decimal { precision, scale } => {
                write!(f, "DECIMAL({},{})", precision, scale)
            }
            PhysicalType::Boolean => write!(f, "BOOLEAN"),
            PhysicalType::Date => write!(f, "DATE"),
            PhysicalType::Timestamp => write!(f, "TIMESTAMP"),
            PhysicalType::Variant => write!(f, "VARIANT"),
            PhysicalType::Other(raw) => write!(f, "{}", raw),
        }
    }
}

impl FromStr for PhysicalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err("empty physical type".to_string());
        }
        let upper = raw.to_ascii_uppercase();
        let (name, args) = match upper.split_once('(') {
            Some((name, rest)) => {
                let args = rest
                    .strip_suffix(')')
                    .ok_or_else(|| format!("unbalanced parentheses in type '{}'", raw))?;
                (name.trim().to_string(), Some(args.to_string()))
            }
            None => (upper.clone(), None),
        };

        let parse_u = |v: &str| -> Result<u32, String> {
            v.trim()
                .parse::<u32>()
                .map_err(|e| format!("invalid size '{}' in type '{}': {}", v, raw, e))
        };

        let ty = match (name.as_str(), args) {
            ("VARCHAR" | "STRING" | "TEXT", None) => PhysicalType::Varchar(None),
            ("VARCHAR", Some(n)) => PhysicalType::Varchar(Some(parse_u(&n)?)),
            ("INT" | "INTEGER", None) => PhysicalType::Integer,
            ("BIGINT", None) => PhysicalType::BigInt,
            ("DOUBLE" | "FLOAT", None) => PhysicalType::Double,
            ("DECIMAL" | "NUMERIC", Some(args)) => {
                let (p, s) = args.split_once(',').unwrap_or((args.as_str(), "0"));
                PhysicalType::Decimal {
                    precision: parse_u(p)?.min(u8::MAX as u32) as u8,
                    scale: parse_u(s)?.min(u8::MAX as u32) as u8,
                }
            }
            ("BOOLEAN" | "BIT", None) => PhysicalType::Boolean,
            ("DATE", None) => PhysicalType::Date,
            ("TIMESTAMP", None) => PhysicalType::Timestamp,
            ("VARIANT" | "SEMISTRUCTURED", None) => PhysicalType::Variant,
            _ => PhysicalType::Other(raw.to_string()),
        };
        Ok(ty)
    }
}

/// Target of a semi-structured value cast; the dialect spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CastType {
    Varchar,
    Number,
    Float,
    Boolean,
    Date,
    Timestamp,
}

impl CastType {
    /// Cast applied to a semi-structured value of the given semantic type.
    ///
    /// Class-typed values stay uncast (they remain documents).
    pub fn for_semantic(ty: &SemanticType) -> Option<CastType> {
        match ty {
            SemanticType::String | SemanticType::Enum(_) => Some(CastType::Varchar),
            SemanticType::Integer | SemanticType::Decimal => Some(CastType::Number),
            SemanticType::Float | SemanticType::Number => Some(CastType::Float),
            SemanticType::Boolean => Some(CastType::Boolean),
            SemanticType::StrictDate | SemanticType::Date => Some(CastType::Date),
            SemanticType::DateTime => Some(CastType::Timestamp),
            SemanticType::Class(_) => None,
        }
    }

    pub fn semantic_type(&self) -> SemanticType {
        match self {
            CastType::Varchar => SemanticType::String,
            CastType::Number => SemanticType::Integer,
            CastType::Float => SemanticType::Float,
            CastType::Boolean => SemanticType::Boolean,
            CastType::Date => SemanticType::StrictDate,
            CastType::Timestamp => SemanticType::DateTime,
        }
    }
}

impl FromStr for CastType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "varchar" | "string" => Ok(CastType::Varchar),
            "number" | "integer" | "int" => Ok(CastType::Number),
            "float" | "double" => Ok(CastType::Float),
            "boolean" | "bool" => Ok(CastType::Boolean),
            "date" => Ok(CastType::Date),
            "timestamp" => Ok(CastType::Timestamp),
            other => Err(format!("unknown cast type '{}'", other)),
        }
    }
}

impl Serialize for PhysicalType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("VARCHAR(100)", PhysicalType::Varchar(Some(100)) ; "sized varchar")]
    #[test_case("varchar", PhysicalType::Varchar(None) ; "bare varchar")]
    #[test_case("INTEGER", PhysicalType::Integer ; "integer")]
    #[test_case("DECIMAL(10, 2)", PhysicalType::Decimal { precision: 10, scale: 2 } ; "decimal")]
    #[test_case("GEOGRAPHY", PhysicalType::Other("GEOGRAPHY".to_string()) ; "unknown passthrough")]
    fn test_parse_physical_type(raw: &str, expected: PhysicalType) {
        assert_eq!(raw.parse::<PhysicalType>().unwrap(), expected);
    }

    #[test]
    fn test_physical_type_display_roundtrip() {
        let ty: PhysicalType = "VARCHAR(200)".parse().unwrap();
        assert_eq!(ty.to_string(), "VARCHAR(200)");
    }

    #[test]
    fn test_default_physical_types() {
        assert_eq!(
            PhysicalType::default_for(&SemanticType::String).to_string(),
            "VARCHAR(8192)"
        );
        assert_eq!(
            PhysicalType::default_for(&SemanticType::Integer).to_string(),
            "BIGINT"
        );
    }

    #[test]
    fn test_semantic_display() {
        assert_eq!(SemanticType::StrictDate.to_string(), "StrictDate");
        assert_eq!(
            SemanticType::Enum("model::EntityType".into()).to_string(),
            "model::EntityType"
        );
        assert!(SemanticType::primitive("model::Firm").is_none());
    }

    #[test]
    fn test_cast_for_semantic() {
        assert_eq!(
            CastType::for_semantic(&SemanticType::Integer),
            Some(CastType::Number)
        );
        assert_eq!(
            CastType::for_semantic(&SemanticType::Class("m::Firm".into())),
            None
        );
        assert_eq!("NUMBER".parse::<CastType>().unwrap(), CastType::Number);
    }
}
