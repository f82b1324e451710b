//! Aggregation subqueries.
//!
//! An aggregate in a non-grouped select list cannot be computed in the outer
//! query without collapsing its rows. It becomes a derived table grouped by
//! the driving table's primary key, left outer joined back on that key:
//!
//! ```sql
//! left outer join (select "person_table_2".ID as ID, listagg(..., ';') as aggCol
//!                  from PERSON_SCHEMA.PERSON_TABLE as "person_table_2" ...
//!                  group by "person_table_2".ID) as "person_table_1"
//!   on ("root".ID = "person_table_1".ID)
//! ```

use crate::mapping_catalog::data_types::SemanticType;
use crate::query_tree::{AggregateFunction, PathRoot, QueryExpr, Step};
use crate::sql_generator::sql_ast::{
    JoinClause, JoinKind, SelectItem, SelectStatement, SqlExpr, TableRef, TableSource,
};
use crate::utils::alias_naming::table_base_name;

use super::alias_registry::{JoinPath, JoinStep, JoinStepKind};
use super::compile_ctx::{CompileCtx, Env, ResolveMode};
use super::errors::CompileError;
use super::path_resolver::resolve_expr;
use super::resolved_expr::{Cursor, Location, RequiredJoin, ResolvedExpression};
use super::store_source::{milestoning_conditions, table_ref};

pub fn aggregate_sql(function: AggregateFunction, argument: SqlExpr, separator: Option<&str>) -> SqlExpr {
    let name = match function {
        AggregateFunction::JoinStrings => {
            return SqlExpr::StringAgg {
                expr: Box::new(argument),
                separator: separator.unwrap_or_default().to_string(),
            }
        }
        AggregateFunction::Sum => "sum",
        AggregateFunction::Count => "count",
        AggregateFunction::Min => "min",
        AggregateFunction::Max => "max",
        AggregateFunction::Average => "avg",
    };
    SqlExpr::Function {
        name: name.to_string(),
        args: vec![argument],
    }
}

pub fn aggregate_result_type(function: AggregateFunction, argument: &SemanticType) -> SemanticType {
    match function {
        AggregateFunction::Count => SemanticType::Integer,
        AggregateFunction::Average => SemanticType::Float,
        AggregateFunction::JoinStrings => SemanticType::String,
        AggregateFunction::Sum | AggregateFunction::Min | AggregateFunction::Max => {
            argument.clone()
        }
    }
}

fn parts(expr: &QueryExpr) -> Result<(AggregateFunction, &QueryExpr, Option<&str>), CompileError> {
    match expr {
        QueryExpr::Aggregate {
            function,
            argument,
            separator,
        } => Ok((*function, argument.as_ref(), separator.as_deref())),
        _ => Err(CompileError::invalid_query("expected an aggregate expression")),
    }
}

/// Aggregate in the outer select list of a grouped query.
pub fn group_aggregate(
    ctx: &mut CompileCtx<'_>,
    expr: &QueryExpr,
    env: &Env,
) -> Result<ResolvedExpression, CompileError> {
    let (function, argument, separator) = parts(expr)?;
    if contains_aggregate(argument) {
        return Err(CompileError::unsupported("nested aggregation"));
    }
    let arg = resolve_expr(ctx, argument, env, ResolveMode::Projection)?;
    let ty = aggregate_result_type(function, &arg.semantic_type);
    let mut out = ResolvedExpression::new(aggregate_sql(function, arg.sql.clone(), separator), ty);
    out.absorb(&arg);
    Ok(out)
}

/// Aggregate in a non-grouped context: correlated derived table.
pub fn sub_aggregate(
    ctx: &mut CompileCtx<'_>,
    expr: &QueryExpr,
    env: &Env,
    mode: ResolveMode,
) -> Result<ResolvedExpression, CompileError> {
    if matches!(mode, ResolveMode::Aggregation | ResolveMode::JoinCondition) {
        return Err(CompileError::unsupported("nested aggregation"));
    }
    let (function, argument, separator) = parts(expr)?;

    let mut roots = Vec::new();
    collect_roots(argument, &mut roots);
    let driving_root = match roots.as_slice() {
        [] => PathRoot::Root,
        [single] => *single,
        _ => {
            return Err(CompileError::unsupported(
                "aggregate argument mixes the query root and a lambda element",
            ))
        }
    };
    let driving = match driving_root {
        PathRoot::Root => env.root.clone(),
        PathRoot::Current => env.current.clone().ok_or_else(|| {
            CompileError::invalid_query("path refers to the current element outside a lambda")
        })?,
    };
    let (driving_alias, class, dates) = match &driving.location {
        Location::Row {
            alias,
            class,
            dates,
        } => (alias.clone(), class.clone(), dates.clone()),
        _ => {
            return Err(CompileError::unsupported(
                "aggregation must be driven by a row of a mapped table",
            ))
        }
    };

    let schema = ctx.schema;
    let store = schema.table_store(&class, ctx.model)?;
    let keys = store.primary_key().to_vec();
    if keys.is_empty() {
        return Err(CompileError::unsupported(format!(
            "aggregation over `{}` needs a primary key",
            class
        )));
    }
    let base = table_base_name(store.table_name().unwrap_or(&class));

    let step = JoinStep {
        kind: JoinStepKind::Aggregation,
        origin: driving_alias.clone(),
        class: class.clone(),
        property: serde_json::to_string(expr).unwrap_or_else(|_| format!("{:?}", expr)),
        dates: dates.clone(),
        filter: None,
    };
    let path = driving.path.extend(step);
    let (derived, fresh) = ctx.allocate_alias(&path, &base)?;
    let aggregate_column = ctx.config.aggregate_column.clone();

    if fresh {
        let scope = ctx.push_scope();
        let inner_path = JoinPath::root(scope, &class, dates.clone());
        let (inner, _) = ctx.allocate_alias(&inner_path, &base)?;
        let mut inner_cursor = Cursor::row(&inner, &class, inner_path);
        if let Location::Row { dates: d, .. } = &mut inner_cursor.location {
            *d = dates.clone();
        }
        let inner_env = Env::new(inner_cursor.clone()).with_current(inner_cursor);

        let arg = resolve_expr(ctx, argument, &inner_env, ResolveMode::Aggregation)?;
        let ty = aggregate_result_type(function, &arg.semantic_type);

        let mut select = SelectStatement::new(table_ref(store, &inner)?);
        for key in &keys {
            select
                .items
                .push(SelectItem::bare(SqlExpr::column(&inner, key), key.clone()));
            select.group_by.push(SqlExpr::column(&inner, key));
        }
        select.items.push(SelectItem::bare(
            aggregate_sql(function, arg.sql, separator),
            aggregate_column.clone(),
        ));
        let mut conditions = arg.post_filters;
        conditions.extend(milestoning_conditions(store, &inner, dates.as_ref()));
        select.filter = SqlExpr::and_all(conditions);
        select.joins = ctx.pop_scope()?;

        let on = SqlExpr::and_all(
            keys.iter()
                .map(|k| SqlExpr::eq(SqlExpr::column(&driving_alias, k), SqlExpr::column(&derived, k)))
                .collect(),
        )
        .ok_or_else(|| CompileError::invalid_query("aggregation without join keys"))?;

        log::debug!(
            "Aggregation subquery '{}' over '{}' for {:?}",
            derived,
            inner,
            function
        );
        ctx.add_join(JoinClause::Table {
            kind: JoinKind::LeftOuter,
            table: TableRef {
                source: TableSource::Subquery(Box::new(select)),
                alias: derived.clone(),
            },
            on,
        })?;
        ctx.remember_aggregate_type(&derived, ty);
    }

    let ty = ctx
        .aggregate_type(&derived)
        .cloned()
        .unwrap_or(SemanticType::Number);
    let mut out = ResolvedExpression::new(SqlExpr::column(&derived, &aggregate_column), ty);
    out.required_joins = driving.required.clone();
    out.required_joins.push(RequiredJoin::Table(derived));
    Ok(out)
}

fn contains_aggregate(expr: &QueryExpr) -> bool {
    match expr {
        QueryExpr::Aggregate { .. } => true,
        QueryExpr::Function { args, .. } => args.iter().any(contains_aggregate),
        _ => false,
    }
}

/// Roots of every path in the expression, first occurrence order.
fn collect_roots(expr: &QueryExpr, out: &mut Vec<PathRoot>) {
    fn push(root: PathRoot, out: &mut Vec<PathRoot>) {
        if !out.contains(&root) {
            out.push(root);
        }
    }
    match expr {
        QueryExpr::Path(path) => {
            push(path.root, out);
            for step in &path.steps {
                // Lambda bodies rebind the current element
                if let Step::Filter { predicate } = step {
                    let mut inner = Vec::new();
                    collect_roots(predicate, &mut inner);
                    if inner.contains(&PathRoot::Root) {
                        push(PathRoot::Root, out);
                    }
                }
            }
        }
        QueryExpr::InstanceOf { path, .. } => push(path.root, out),
        QueryExpr::Function { args, .. } => {
            for arg in args {
                collect_roots(arg, out);
            }
        }
        QueryExpr::Aggregate { argument, .. } => collect_roots(argument, out),
        QueryExpr::Literal { .. } | QueryExpr::Constant { .. } => {}
    }
}
