//! Results of resolving query expressions, and the cursor threaded through a
//! property chain while it is being walked.

use crate::mapping_catalog::data_types::{CastType, PhysicalType, SemanticType};
use crate::query_tree::TemporalArgument;
use crate::sql_generator::sql_ast::SqlExpr;

use super::alias_registry::JoinPath;

/// Alias an expression depends on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequiredJoin {
    Table(String),
    Flatten(String),
}

impl RequiredJoin {
    pub fn alias(&self) -> &str {
        match self {
            RequiredJoin::Table(a) | RequiredJoin::Flatten(a) => a,
        }
    }
}

pub(crate) fn add_required(into: &mut Vec<RequiredJoin>, join: RequiredJoin) {
    if !into.contains(&join) {
        into.push(join);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedExpression {
    pub sql: SqlExpr,
    pub semantic_type: SemanticType,
    pub physical_type: PhysicalType,
    /// Type declared on the mapped column, for plain column reads
    pub declared_type: Option<PhysicalType>,
    pub required_joins: Vec<RequiredJoin>,
    /// Conditions over flattened rows that must hold for this value;
    /// only produced while resolving filters and aggregates
    pub post_filters: Vec<SqlExpr>,
    /// Condition that holds for some flattened element row; it keeps its
    /// meaning only under `and`/`or`
    pub existential: bool,
}

impl ResolvedExpression {
    pub fn new(sql: SqlExpr, semantic_type: SemanticType) -> Self {
        let physical_type = PhysicalType::default_for(&semantic_type);
        ResolvedExpression {
            sql,
            semantic_type,
            physical_type,
            declared_type: None,
            required_joins: Vec::new(),
            post_filters: Vec::new(),
            existential: false,
        }
    }

    /// Take over the joins and post filters another expression depends on
    pub fn absorb(&mut self, other: &ResolvedExpression) {
        for join in &other.required_joins {
            add_required(&mut self.required_joins, join.clone());
        }
        self.post_filters.extend(other.post_filters.iter().cloned());
        self.existential |= other.existential;
    }

    /// Fold pending post filters into this condition itself.
    pub fn attach_post_filters(&mut self) {
        if self.post_filters.is_empty() {
            return;
        }
        let mut conditions = vec![self.sql.clone()];
        conditions.append(&mut self.post_filters);
        if let Some(sql) = SqlExpr::and_all(conditions) {
            self.sql = sql;
        }
        self.existential = true;
    }

    pub fn flatten_aliases(&self) -> impl Iterator<Item = &str> {
        self.required_joins.iter().filter_map(|j| match j {
            RequiredJoin::Flatten(a) => Some(a.as_str()),
            RequiredJoin::Table(_) => None,
        })
    }
}

/// Where a property chain currently points
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    /// A row of a mapped table (or derived table) under `alias`
    Row {
        alias: String,
        class: String,
        dates: Option<TemporalArgument>,
    },
    /// A semi-structured object of an embedded class
    Document { expr: SqlExpr, class: String },
    /// A primitive value
    Value {
        expr: SqlExpr,
        ty: SemanticType,
        /// Read out of a semi-structured document and still uncast
        semi_structured: bool,
        declared: Option<PhysicalType>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub location: Location,
    /// Join path of the row the cursor belongs to
    pub path: JoinPath,
    pub required: Vec<RequiredJoin>,
    pub post_filters: Vec<SqlExpr>,
    /// Set right after an unindexed array has been flattened
    pub flattened: bool,
}

impl Cursor {
    pub fn row(alias: impl Into<String>, class: impl Into<String>, path: JoinPath) -> Self {
        Cursor {
            location: Location::Row {
                alias: alias.into(),
                class: class.into(),
                dates: None,
            },
            path,
            required: Vec::new(),
            post_filters: Vec::new(),
            flattened: false,
        }
    }

    pub fn class(&self) -> Option<&str> {
        match &self.location {
            Location::Row { class, .. } | Location::Document { class, .. } => Some(class),
            Location::Value { .. } => None,
        }
    }

    pub fn with_location(&self, location: Location) -> Self {
        Cursor {
            location,
            path: self.path.clone(),
            required: self.required.clone(),
            post_filters: self.post_filters.clone(),
            flattened: false,
        }
    }

    pub fn require(&mut self, join: RequiredJoin) {
        add_required(&mut self.required, join);
    }

    /// Value expression of the cursor, cast when it was read from a document.
    pub fn finish(self) -> ResolvedExpression {
        let (sql, semantic_type, physical_type, declared_type) = match self.location {
            Location::Value {
                expr,
                ty,
                semi_structured,
                declared,
            } => {
                let sql = match (semi_structured, CastType::for_semantic(&ty)) {
                    (true, Some(cast)) => SqlExpr::cast(expr, cast),
                    _ => expr,
                };
                let physical = declared
                    .clone()
                    .unwrap_or_else(|| PhysicalType::default_for(&ty));
                (sql, ty, physical, declared)
            }
            Location::Document { expr, class } => {
                (expr, SemanticType::Class(class), PhysicalType::Variant, None)
            }
            Location::Row { alias, class, .. } => (
                SqlExpr::AllColumns { table_alias: alias },
                SemanticType::Class(class),
                PhysicalType::Variant,
                None,
            ),
        };
        ResolvedExpression {
            sql,
            semantic_type,
            physical_type,
            declared_type,
            required_joins: self.required,
            post_filters: self.post_filters,
            existential: false,
        }
    }
}
