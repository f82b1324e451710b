use super::sql_ast::{
    JoinClause, JoinKind, OrderItem, SelectItem, SelectStatement, SqlExpr, SqlLiteral, TableRef,
    TableSource,
};
use super::SqlDialect;
use crate::query_tree::SortDirection;

/// Render a relational AST node with a dialect.
///
/// Rendering is total: the compiler only builds well-formed trees, so there
/// is nothing left to fail here.
pub trait ToSql {
    fn to_sql(&self, dialect: &dyn SqlDialect) -> String;
}

fn join_sql<T: ToSql>(items: &[T], dialect: &dyn SqlDialect, sep: &str) -> String {
    items
        .iter()
        .map(|i| i.to_sql(dialect))
        .collect::<Vec<_>>()
        .join(sep)
}

fn wrapped(expr: &SqlExpr, dialect: &dyn SqlDialect) -> String {
    if expr.is_atomic() {
        expr.to_sql(dialect)
    } else {
        format!("({})", expr.to_sql(dialect))
    }
}

impl ToSql for SqlLiteral {
    fn to_sql(&self, dialect: &dyn SqlDialect) -> String {
        match self {
            SqlLiteral::String(s) => dialect.string_literal(s),
            SqlLiteral::Integer(i) => i.to_string(),
            SqlLiteral::Float(f) => f.to_string(),
            SqlLiteral::Boolean(b) => b.to_string(),
            SqlLiteral::Date(d) => dialect.string_literal(&d.format("%Y-%m-%d").to_string()),
            SqlLiteral::Null => "null".to_string(),
        }
    }
}

impl ToSql for SqlExpr {
    fn to_sql(&self, dialect: &dyn SqlDialect) -> String {
        match self {
            SqlExpr::Column {
                table_alias,
                column,
                quoted,
            } => {
                if *quoted {
                    format!(
                        "{}.{}",
                        dialect.quote_identifier(table_alias),
                        dialect.quote_identifier(column)
                    )
                } else {
                    format!("{}.{}", dialect.quote_identifier(table_alias), column)
                }
            }
            SqlExpr::AllColumns { table_alias } => {
                format!("{}.*", dialect.quote_identifier(table_alias))
            }
            SqlExpr::Identifier { name, quoted } => {
                if *quoted {
                    dialect.quote_identifier(name)
                } else {
                    name.clone()
                }
            }
            SqlExpr::FlattenValue { flatten_alias } => format!(
                "{}.{}",
                dialect.quote_identifier(flatten_alias),
                dialect.flatten_value_column()
            ),
            SqlExpr::JsonAccess { base, segments } => {
                let mut sql = base.to_sql(dialect);
                for segment in segments {
                    sql.push_str(&dialect.json_segment(segment));
                }
                sql
            }
            SqlExpr::Cast { expr, cast } => dialect.cast(&wrapped(expr, dialect), *cast),
            SqlExpr::Literal(lit) => lit.to_sql(dialect),
            SqlExpr::Placeholder { name, quoted } => {
                if *quoted {
                    format!("'${{{}}}'", name)
                } else {
                    format!("${{{}}}", name)
                }
            }
            SqlExpr::Function { name, args } => {
                format!("{}({})", name, join_sql(args, dialect, ", "))
            }
            SqlExpr::StringAgg { expr, separator } => {
                dialect.string_agg(&expr.to_sql(dialect), separator)
            }
            SqlExpr::BinaryOp { op, left, right } => {
                if op.is_comparison() {
                    format!(
                        "{} {} {}",
                        left.to_sql(dialect),
                        op.as_str(),
                        right.to_sql(dialect)
                    )
                } else {
                    format!(
                        "({} {} {})",
                        left.to_sql(dialect),
                        op.as_str(),
                        right.to_sql(dialect)
                    )
                }
            }
            SqlExpr::And(items) => format!("({})", join_sql(items, dialect, " and ")),
            SqlExpr::Or(items) => format!("({})", join_sql(items, dialect, " or ")),
            SqlExpr::Not(inner) => format!("not {}", wrapped(inner, dialect)),
            SqlExpr::IsNull(inner) => format!("{} is null", wrapped(inner, dialect)),
            SqlExpr::IsNotNull(inner) => format!("{} is not null", wrapped(inner, dialect)),
            SqlExpr::InList { expr, list } => format!(
                "{} in ({})",
                wrapped(expr, dialect),
                join_sql(list, dialect, ", ")
            ),
            SqlExpr::Case {
                branches,
                else_expr,
            } => {
                let mut sql = String::from("case");
                for branch in branches {
                    sql.push_str(&format!(
                        " when {} then {}",
                        branch.when.to_sql(dialect),
                        branch.then.to_sql(dialect)
                    ));
                }
                if let Some(e) = else_expr {
                    sql.push_str(&format!(" else {}", e.to_sql(dialect)));
                }
                sql.push_str(" end");
                sql
            }
        }
    }
}

impl ToSql for SelectItem {
    fn to_sql(&self, dialect: &dyn SqlDialect) -> String {
        match &self.alias {
            Some(alias) if self.quote_alias => format!(
                "{} as {}",
                self.expr.to_sql(dialect),
                dialect.quote_identifier(alias)
            ),
            Some(alias) => format!("{} as {}", self.expr.to_sql(dialect), alias),
            None => self.expr.to_sql(dialect),
        }
    }
}

impl ToSql for TableRef {
    fn to_sql(&self, dialect: &dyn SqlDialect) -> String {
        let source = match &self.source {
            TableSource::Table(name) => name.clone(),
            TableSource::Subquery(select) => format!("({})", select.to_sql(dialect)),
        };
        format!("{} as {}", source, dialect.quote_identifier(&self.alias))
    }
}

impl ToSql for JoinClause {
    fn to_sql(&self, dialect: &dyn SqlDialect) -> String {
        match self {
            JoinClause::Table { kind, table, on } => {
                let keyword = match kind {
                    JoinKind::Inner => "inner join",
                    JoinKind::LeftOuter => "left outer join",
                };
                let condition = match on {
                    SqlExpr::And(_) | SqlExpr::Or(_) => on.to_sql(dialect),
                    other => format!("({})", other.to_sql(dialect)),
                };
                format!("{} {} on {}", keyword, table.to_sql(dialect), condition)
            }
            JoinClause::Flatten { input, alias } => {
                dialect.flatten_join(&input.to_sql(dialect), alias)
            }
        }
    }
}

impl ToSql for OrderItem {
    fn to_sql(&self, dialect: &dyn SqlDialect) -> String {
        let direction = match self.direction {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        };
        format!("{} {}", self.expr.to_sql(dialect), direction)
    }
}

impl ToSql for SelectStatement {
    fn to_sql(&self, dialect: &dyn SqlDialect) -> String {
        let mut sql = String::from("select ");
        if self.distinct {
            sql.push_str("distinct ");
        }
        sql.push_str(&join_sql(&self.items, dialect, ", "));
        sql.push_str(" from ");
        sql.push_str(&self.from.to_sql(dialect));

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.to_sql(dialect));
        }

        if let Some(filter) = &self.filter {
            sql.push_str(" where ");
            sql.push_str(&filter.to_sql(dialect));
        }

        if !self.group_by.is_empty() {
            sql.push_str(" group by ");
            sql.push_str(&join_sql(&self.group_by, dialect, ", "));
        }

        if !self.order_by.is_empty() {
            sql.push_str(" order by ");
            sql.push_str(&join_sql(&self.order_by, dialect, ", "));
        }

        if let Some(rows) = self.limit {
            sql.push(' ');
            sql.push_str(&dialect.limit(rows));
        }

        sql
    }
}
