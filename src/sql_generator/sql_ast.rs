//! Relational AST produced by the query compiler and rendered by a dialect.

use chrono::NaiveDate;
use serde::Serialize;

use crate::mapping_catalog::binding_parser::PathSegment;
use crate::mapping_catalog::data_types::CastType;
use crate::query_tree::SortDirection;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SqlLiteral {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SqlOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
}

impl SqlOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlOperator::Eq => "=",
            SqlOperator::NotEq => "<>",
            SqlOperator::Lt => "<",
            SqlOperator::LtEq => "<=",
            SqlOperator::Gt => ">",
            SqlOperator::GtEq => ">=",
            SqlOperator::Add => "+",
            SqlOperator::Sub => "-",
            SqlOperator::Mul => "*",
            SqlOperator::Div => "/",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            SqlOperator::Eq
                | SqlOperator::NotEq
                | SqlOperator::Lt
                | SqlOperator::LtEq
                | SqlOperator::Gt
                | SqlOperator::GtEq
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseBranch {
    pub when: SqlExpr,
    pub then: SqlExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SqlExpr {
    /// `"alias".COLUMN`; `quoted` wraps the column name as well
    Column {
        table_alias: String,
        column: String,
        quoted: bool,
    },
    /// `"alias".*`
    AllColumns { table_alias: String },
    /// Column without table qualifier
    Identifier { name: String, quoted: bool },
    /// Element column of a flatten pseudo-table
    FlattenValue { flatten_alias: String },
    /// `base['k'][0]`
    JsonAccess {
        base: Box<SqlExpr>,
        segments: Vec<PathSegment>,
    },
    Cast {
        expr: Box<SqlExpr>,
        cast: CastType,
    },
    Literal(SqlLiteral),
    /// `${name}`, bound by an allocation node; `quoted` renders `'${name}'`
    Placeholder { name: String, quoted: bool },
    Function { name: String, args: Vec<SqlExpr> },
    /// Ordered string aggregation (`listagg`)
    StringAgg {
        expr: Box<SqlExpr>,
        separator: String,
    },
    BinaryOp {
        op: SqlOperator,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    And(Vec<SqlExpr>),
    Or(Vec<SqlExpr>),
    Not(Box<SqlExpr>),
    IsNull(Box<SqlExpr>),
    IsNotNull(Box<SqlExpr>),
    InList {
        expr: Box<SqlExpr>,
        list: Vec<SqlExpr>,
    },
    Case {
        branches: Vec<CaseBranch>,
        else_expr: Option<Box<SqlExpr>>,
    },
}

impl SqlExpr {
    pub fn column(table_alias: impl Into<String>, column: impl Into<String>) -> SqlExpr {
        SqlExpr::Column {
            table_alias: table_alias.into(),
            column: column.into(),
            quoted: false,
        }
    }

    pub fn quoted_column(table_alias: impl Into<String>, column: impl Into<String>) -> SqlExpr {
        SqlExpr::Column {
            table_alias: table_alias.into(),
            column: column.into(),
            quoted: true,
        }
    }

    pub fn flatten_value(flatten_alias: impl Into<String>) -> SqlExpr {
        SqlExpr::FlattenValue {
            flatten_alias: flatten_alias.into(),
        }
    }

    /// JSON access that keeps a single chain: accessing into an access
    /// appends segments instead of nesting.
    pub fn json_access(base: SqlExpr, segments: &[PathSegment]) -> SqlExpr {
        if segments.is_empty() {
            return base;
        }
        match base {
            SqlExpr::JsonAccess {
                base,
                segments: mut existing,
            } => {
                existing.extend_from_slice(segments);
                SqlExpr::JsonAccess {
                    base,
                    segments: existing,
                }
            }
            other => SqlExpr::JsonAccess {
                base: Box::new(other),
                segments: segments.to_vec(),
            },
        }
    }

    pub fn cast(expr: SqlExpr, cast: CastType) -> SqlExpr {
        SqlExpr::Cast {
            expr: Box::new(expr),
            cast,
        }
    }

    pub fn string(value: impl Into<String>) -> SqlExpr {
        SqlExpr::Literal(SqlLiteral::String(value.into()))
    }

    pub fn binary(op: SqlOperator, left: SqlExpr, right: SqlExpr) -> SqlExpr {
        SqlExpr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: SqlExpr, right: SqlExpr) -> SqlExpr {
        Self::binary(SqlOperator::Eq, left, right)
    }

    /// Conjunction of the given conditions, flattening nested `and`s.
    /// Returns `None` for an empty list.
    pub fn and_all(conditions: Vec<SqlExpr>) -> Option<SqlExpr> {
        let mut flat = Vec::with_capacity(conditions.len());
        for condition in conditions {
            match condition {
                SqlExpr::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(SqlExpr::And(flat)),
        }
    }

    /// Whether rendering needs no parentheses when used as an operand of a
    /// postfix construct (cast, `is null`, `in`).
    pub fn is_atomic(&self) -> bool {
        match self {
            SqlExpr::BinaryOp { op, .. } => !op.is_comparison(),
            SqlExpr::Not(_)
            | SqlExpr::IsNull(_)
            | SqlExpr::IsNotNull(_)
            | SqlExpr::InList { .. }
            | SqlExpr::Case { .. } => false,
            _ => true,
        }
    }

    /// Table and flatten aliases referenced by this expression.
    pub fn referenced_aliases(&self, out: &mut Vec<String>) {
        match self {
            SqlExpr::Column { table_alias, .. } | SqlExpr::AllColumns { table_alias } => {
                push_unique(out, table_alias)
            }
            SqlExpr::FlattenValue { flatten_alias } => push_unique(out, flatten_alias),
            SqlExpr::JsonAccess { base: e, .. }
            | SqlExpr::Cast { expr: e, .. }
            | SqlExpr::StringAgg { expr: e, .. }
            | SqlExpr::Not(e)
            | SqlExpr::IsNull(e)
            | SqlExpr::IsNotNull(e) => e.referenced_aliases(out),
            SqlExpr::Function { args: list, .. } | SqlExpr::And(list) | SqlExpr::Or(list) => {
                for e in list {
                    e.referenced_aliases(out);
                }
            }
            SqlExpr::BinaryOp { left, right, .. } => {
                left.referenced_aliases(out);
                right.referenced_aliases(out);
            }
            SqlExpr::InList { expr, list } => {
                expr.referenced_aliases(out);
                for e in list {
                    e.referenced_aliases(out);
                }
            }
            SqlExpr::Case {
                branches,
                else_expr,
            } => {
                for b in branches {
                    b.when.referenced_aliases(out);
                    b.then.referenced_aliases(out);
                }
                if let Some(e) = else_expr {
                    e.referenced_aliases(out);
                }
            }
            SqlExpr::Identifier { .. } | SqlExpr::Literal(_) | SqlExpr::Placeholder { .. } => {}
        }
    }
}

fn push_unique(out: &mut Vec<String>, alias: &str) {
    if !out.iter().any(|a| a == alias) {
        out.push(alias.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectItem {
    pub expr: SqlExpr,
    pub alias: Option<String>,
    pub quote_alias: bool,
}

impl SelectItem {
    /// `expr as "Name"`
    pub fn named(expr: SqlExpr, alias: impl Into<String>) -> Self {
        SelectItem {
            expr,
            alias: Some(alias.into()),
            quote_alias: true,
        }
    }

    /// `expr as NAME`
    pub fn bare(expr: SqlExpr, alias: impl Into<String>) -> Self {
        SelectItem {
            expr,
            alias: Some(alias.into()),
            quote_alias: false,
        }
    }

    pub fn unnamed(expr: SqlExpr) -> Self {
        SelectItem {
            expr,
            alias: None,
            quote_alias: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TableSource {
    /// Schema-qualified table name
    Table(String),
    Subquery(Box<SelectStatement>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRef {
    pub source: TableSource,
    pub alias: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JoinKind {
    Inner,
    LeftOuter,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum JoinClause {
    Table {
        kind: JoinKind,
        table: TableRef,
        on: SqlExpr,
    },
    /// Lateral flatten of a semi-structured array
    Flatten { input: SqlExpr, alias: String },
}

impl JoinClause {
    pub fn alias(&self) -> &str {
        match self {
            JoinClause::Table { table, .. } => &table.alias,
            JoinClause::Flatten { alias, .. } => alias,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItem {
    pub expr: SqlExpr,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectStatement {
    pub distinct: bool,
    pub items: Vec<SelectItem>,
    pub from: TableRef,
    pub joins: Vec<JoinClause>,
    pub filter: Option<SqlExpr>,
    pub group_by: Vec<SqlExpr>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
}

impl SelectStatement {
    pub fn new(from: TableRef) -> Self {
        SelectStatement {
            distinct: false,
            items: Vec::new(),
            from,
            joins: Vec::new(),
            filter: None,
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_access_compresses_chain() {
        let base = SqlExpr::column("root", "DOC");
        let first = SqlExpr::json_access(base, &[PathSegment::Key("a".into())]);
        let second = SqlExpr::json_access(first, &[PathSegment::Index(2)]);
        match second {
            SqlExpr::JsonAccess { base, segments } => {
                assert_eq!(*base, SqlExpr::column("root", "DOC"));
                assert_eq!(segments.len(), 2);
            }
            other => panic!("expected one access, got {:?}", other),
        }
    }

    #[test]
    fn test_and_all_flattens() {
        let a = SqlExpr::eq(SqlExpr::column("x", "A"), SqlExpr::string("1"));
        let b = SqlExpr::eq(SqlExpr::column("x", "B"), SqlExpr::string("2"));
        let c = SqlExpr::eq(SqlExpr::column("x", "C"), SqlExpr::string("3"));
        let nested = SqlExpr::and_all(vec![a.clone(), SqlExpr::And(vec![b, c])]).unwrap();
        match nested {
            SqlExpr::And(items) => assert_eq!(items.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(SqlExpr::and_all(vec![a.clone()]), Some(a));
        assert_eq!(SqlExpr::and_all(vec![]), None);
    }

    #[test]
    fn test_referenced_aliases() {
        let expr = SqlExpr::eq(
            SqlExpr::cast(
                SqlExpr::json_access(
                    SqlExpr::flatten_value("ss_flatten_0"),
                    &[PathSegment::Key("id".into())],
                ),
                CastType::Number,
            ),
            SqlExpr::column("firm", "ID"),
        );
        let mut aliases = Vec::new();
        expr.referenced_aliases(&mut aliases);
        assert_eq!(aliases, vec!["ss_flatten_0", "firm"]);
    }
}
