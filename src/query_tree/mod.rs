//! Resolved, type-checked query tree consumed by the compiler.
//!
//! The tree is produced by an upstream front end (or deserialized from a
//! YAML/JSON query document). Every property application already names its
//! property; the compiler looks up bindings and types itself.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedQuery {
    /// Fully qualified class the query starts from (`Person.all()`)
    pub root_class: String,
    /// Dates applied to the root (`Person.all(%2020-01-01)`)
    #[serde(default)]
    pub root_dates: Option<TemporalArgument>,
    /// Query-level filter (`->filter(p | ...)`)
    #[serde(default)]
    pub filter: Option<QueryExpr>,
    /// Select list of a non-grouped query
    #[serde(default)]
    pub projections: Vec<Projection>,
    /// Grouped select list; mutually exclusive with `projections`
    #[serde(default)]
    pub group_by: Option<GroupBy>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub distinct: bool,
    #[serde(default)]
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub name: String,
    pub expr: QueryExpr,
}

impl Projection {
    pub fn new(name: impl Into<String>, expr: QueryExpr) -> Self {
        Projection {
            name: name.into(),
            expr,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupBy {
    pub keys: Vec<Projection>,
    /// Each expression must be an aggregate
    pub aggregates: Vec<Projection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderTarget {
    /// A projected column, by name
    Column(String),
    Expr(QueryExpr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    /// `{ column: Name }` or `{ expr: ... }` in query documents
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub target: OrderTarget,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Business and/or processing date applied to a milestoned property
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct TemporalArgument {
    #[serde(default)]
    pub business_date: Option<NaiveDate>,
    #[serde(default)]
    pub processing_date: Option<NaiveDate>,
}

impl TemporalArgument {
    pub fn is_empty(&self) -> bool {
        self.business_date.is_none() && self.processing_date.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyArgument {
    /// Literal array index: `otherNames->at(0)`
    Index(i64),
    Dates(TemporalArgument),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyApplication {
    pub property: String,
    #[serde(default)]
    pub argument: Option<PropertyArgument>,
    /// Collection-valued at this point of the chain
    #[serde(default)]
    pub is_collection: bool,
}

impl PropertyApplication {
    pub fn new(property: impl Into<String>) -> Self {
        PropertyApplication {
            property: property.into(),
            argument: None,
            is_collection: false,
        }
    }

    pub fn index(&self) -> Option<i64> {
        match self.argument {
            Some(PropertyArgument::Index(i)) => Some(i),
            _ => None,
        }
    }

    pub fn dates(&self) -> Option<&TemporalArgument> {
        match &self.argument {
            Some(PropertyArgument::Dates(d)) => Some(d),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PathRoot {
    /// The query's root row (`$p` in `Person.all()->project(p | ...)`)
    #[default]
    Root,
    /// The element bound by the enclosing lambda (filter / match branch)
    Current,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyPath {
    #[serde(default)]
    pub root: PathRoot,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchBranch {
    /// Fully qualified class the branch matches
    pub subtype: String,
    /// Branch body, evaluated against the matched element (`PathRoot::Current`)
    pub body: QueryExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    Property(PropertyApplication),
    /// `->subType(@Dog)`
    SubType { class: String },
    /// `->match([d: Dog[1] | ..., c: Cat[1] | ...])`
    Match { branches: Vec<MatchBranch> },
    /// `->type()->name()`: the runtime type, fully qualified
    TypeName,
    /// `->type()->elementToPath()`: same literal as `TypeName`
    TypePath,
    /// `->filter(x | ...)` over the preceding collection
    Filter { predicate: Box<QueryExpr> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiteralValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Boolean(b) => write!(f, "{}", b),
            LiteralValue::Integer(i) => write!(f, "{}", i),
            LiteralValue::Float(v) => write!(f, "{}", v),
            LiteralValue::String(s) => write!(f, "'{}'", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Sum,
    Count,
    Min,
    Max,
    Average,
    /// String concatenation with a separator (`listagg`)
    JoinStrings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryExpr {
    Path(PropertyPath),
    Literal {
        value: LiteralValue,
    },
    /// Named runtime constant bound before execution (`${name}` in SQL)
    Constant {
        name: String,
        value: LiteralValue,
    },
    Function {
        name: String,
        #[serde(default)]
        args: Vec<QueryExpr>,
    },
    Aggregate {
        function: AggregateFunction,
        argument: Box<QueryExpr>,
        #[serde(default)]
        separator: Option<String>,
    },
    /// `$x->instanceOf(Dog)`
    InstanceOf {
        path: PropertyPath,
        class: String,
    },
}

impl QueryExpr {
    /// Path from the query root through the given properties.
    pub fn root_path(properties: &[&str]) -> QueryExpr {
        QueryExpr::Path(PropertyPath {
            root: PathRoot::Root,
            steps: properties
                .iter()
                .map(|p| Step::Property(PropertyApplication::new(*p)))
                .collect(),
        })
    }

    /// Path from the current lambda element through the given properties.
    pub fn current_path(properties: &[&str]) -> QueryExpr {
        QueryExpr::Path(PropertyPath {
            root: PathRoot::Current,
            steps: properties
                .iter()
                .map(|p| Step::Property(PropertyApplication::new(*p)))
                .collect(),
        })
    }

    pub fn path(root: PathRoot, steps: Vec<Step>) -> QueryExpr {
        QueryExpr::Path(PropertyPath { root, steps })
    }

    pub fn string(value: impl Into<String>) -> QueryExpr {
        QueryExpr::Literal {
            value: LiteralValue::String(value.into()),
        }
    }

    pub fn integer(value: i64) -> QueryExpr {
        QueryExpr::Literal {
            value: LiteralValue::Integer(value),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<QueryExpr>) -> QueryExpr {
        QueryExpr::Function {
            name: name.into(),
            args,
        }
    }

    pub fn eq(left: QueryExpr, right: QueryExpr) -> QueryExpr {
        QueryExpr::call("equal", vec![left, right])
    }

    pub fn aggregate(function: AggregateFunction, argument: QueryExpr) -> QueryExpr {
        QueryExpr::Aggregate {
            function,
            argument: Box::new(argument),
            separator: None,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, QueryExpr::Aggregate { .. })
    }
}

impl ResolvedQuery {
    pub fn new(root_class: impl Into<String>) -> Self {
        ResolvedQuery {
            root_class: root_class.into(),
            root_dates: None,
            filter: None,
            projections: Vec::new(),
            group_by: None,
            order_by: Vec::new(),
            distinct: false,
            limit: None,
        }
    }

    pub fn project(mut self, name: impl Into<String>, expr: QueryExpr) -> Self {
        self.projections.push(Projection::new(name, expr));
        self
    }

    pub fn with_filter(mut self, filter: QueryExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_document_yaml() {
        let yaml = r#"
root_class: model::Person
filter:
  kind: function
  name: equal
  args:
    - kind: path
      steps:
        - { step: property, property: firstName }
    - kind: literal
      value: John
projections:
  - name: First Name
    expr:
      kind: path
      steps:
        - { step: property, property: firstName }
  - name: Other Name
    expr:
      kind: path
      steps:
        - step: property
          property: firm
        - step: property
          property: otherNames
          argument: { index: 0 }
          is_collection: true
limit: 10
"#;
        let query = ResolvedQuery::from_yaml_str(yaml).unwrap();
        assert_eq!(query.root_class, "model::Person");
        assert_eq!(query.projections.len(), 2);
        assert_eq!(query.limit, Some(10));
        match &query.projections[1].expr {
            QueryExpr::Path(path) => match &path.steps[1] {
                Step::Property(app) => assert_eq!(app.index(), Some(0)),
                other => panic!("unexpected step {:?}", other),
            },
            other => panic!("unexpected expr {:?}", other),
        }
        assert_eq!(
            query.filter,
            Some(QueryExpr::eq(
                QueryExpr::root_path(&["firstName"]),
                QueryExpr::string("John")
            ))
        );
    }

    #[test]
    fn test_order_targets_yaml() {
        let yaml = r#"
root_class: model::Person
projections:
  - name: First Name
    expr: { kind: path, steps: [{ step: property, property: firstName }] }
order_by:
  - target: { column: First Name }
    direction: desc
  - target:
      expr:
        kind: path
        steps:
          - { step: property, property: age }
"#;
        let query = ResolvedQuery::from_yaml_str(yaml).unwrap();
        assert_eq!(
            query.order_by[0].target,
            OrderTarget::Column("First Name".into())
        );
        assert_eq!(query.order_by[0].direction, SortDirection::Desc);
        assert_eq!(
            query.order_by[1].target,
            OrderTarget::Expr(QueryExpr::root_path(&["age"]))
        );
        assert_eq!(query.order_by[1].direction, SortDirection::Asc);

        let json = serde_json::to_string(&query.order_by).unwrap();
        assert!(json.starts_with(r#"[{"target":{"column":"First Name"}"#));
    }

    #[test]
    fn test_dates_argument_json() {
        let json = r#"{"step":"property","property":"employer","argument":{"dates":{"business_date":"2020-01-01"}}}"#;
        let step: Step = serde_json::from_str(json).unwrap();
        match step {
            Step::Property(app) => {
                let dates = app.dates().unwrap();
                assert_eq!(
                    dates.business_date,
                    NaiveDate::from_ymd_opt(2020, 1, 1)
                );
                assert!(dates.processing_date.is_none());
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_literal_untagged() {
        let v: LiteralValue = serde_json::from_str("3").unwrap();
        assert_eq!(v, LiteralValue::Integer(3));
        let v: LiteralValue = serde_json::from_str("\"x\"").unwrap();
        assert_eq!(v, LiteralValue::String("x".into()));
    }
}
