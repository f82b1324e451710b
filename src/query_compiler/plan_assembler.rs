//! Plan Assembler
//!
//! Drives one compilation in the structural order of the query (root, filter,
//! select list, ordering) and assembles the outer select statement:
//! select list, root table, joins in first-allocation order with flattens
//! threaded in, `where`, `group by`, `order by`, `limit`. The statement is
//! rendered once and wrapped with its result schema, session statements and
//! constant allocations.

use crate::query_tree::{OrderTarget, Projection, ResolvedQuery};
use crate::relational_plan::{ExecutionPlan, RelationalPlan, ResultColumn};
use crate::sql_generator::sql_ast::{OrderItem, SelectItem, SelectStatement, SqlExpr};
use crate::utils::alias_naming::table_base_name;

use super::aggregation_builder::group_aggregate;
use super::alias_registry::JoinPath;
use super::compile_ctx::{CompileCtx, Env, ResolveMode};
use super::errors::CompileError;
use super::path_resolver::resolve_expr;
use super::resolved_expr::{Cursor, Location, ResolvedExpression};
use super::store_source::{milestoning_conditions, table_ref};

pub fn assemble(
    ctx: &mut CompileCtx<'_>,
    query: &ResolvedQuery,
) -> Result<ExecutionPlan, CompileError> {
    let schema = ctx.schema;
    let store = schema.table_store(&query.root_class, ctx.model)?;
    let root_alias = ctx.config.root_alias.clone();

    let scope = ctx.push_scope();
    let root_path = JoinPath::root(scope, &query.root_class, query.root_dates.clone());
    ctx.bind_alias(&root_path, &root_alias)?;
    ctx.reserve_alias(&table_base_name(
        store.table_name().unwrap_or(&query.root_class),
    ));
    let mut root = Cursor::row(&root_alias, &query.root_class, root_path);
    if let Location::Row { dates, .. } = &mut root.location {
        *dates = query.root_dates.clone();
    }
    let env = Env::new(root);

    // where
    let mut conditions =
        milestoning_conditions(store, &root_alias, query.root_dates.as_ref());
    let mut filter_flattens: Vec<String> = Vec::new();
    if let Some(filter) = &query.filter {
        let resolved = resolve_expr(ctx, filter, &env, ResolveMode::Filter)?;
        filter_flattens.extend(resolved.flatten_aliases().map(str::to_string));
        conditions.push(resolved.sql);
        conditions.extend(resolved.post_filters);
    }

    // select list
    let mut items = Vec::new();
    let mut columns = Vec::new();
    let mut group_by = Vec::new();
    match &query.group_by {
        Some(grouping) => {
            if !query.projections.is_empty() {
                return Err(CompileError::invalid_query(
                    "a grouped query cannot also declare plain projections",
                ));
            }
            for key in &grouping.keys {
                if key.expr.is_aggregate() {
                    return Err(CompileError::invalid_query(format!(
                        "group key `{}` is an aggregate",
                        key.name
                    )));
                }
                let resolved = projected(ctx, key, &env)?;
                group_by.push(resolved.sql.clone());
                push_column(&mut items, &mut columns, &key.name, resolved)?;
            }
            for aggregate in &grouping.aggregates {
                if !aggregate.expr.is_aggregate() {
                    return Err(CompileError::invalid_query(format!(
                        "grouped column `{}` is not an aggregate",
                        aggregate.name
                    )));
                }
                let resolved = group_aggregate(ctx, &aggregate.expr, &env)?;
                push_column(&mut items, &mut columns, &aggregate.name, resolved)?;
            }
        }
        None => {
            for projection in &query.projections {
                let resolved = projected(ctx, projection, &env)?;
                push_column(&mut items, &mut columns, &projection.name, resolved)?;
            }
        }
    }
    if items.is_empty() {
        return Err(CompileError::invalid_query("query projects no columns"));
    }

    // order by
    let mut order_by = Vec::with_capacity(query.order_by.len());
    for order in &query.order_by {
        let expr = match &order.target {
            OrderTarget::Column(name) => {
                if !columns.iter().any(|c: &ResultColumn| &c.name == name) {
                    return Err(CompileError::invalid_query(format!(
                        "order by refers to unknown column `{}`",
                        name
                    )));
                }
                SqlExpr::Identifier {
                    name: name.clone(),
                    quoted: true,
                }
            }
            OrderTarget::Expr(expr) => {
                let resolved = resolve_expr(ctx, expr, &env, ResolveMode::Projection)?;
                if !resolved.post_filters.is_empty() {
                    return Err(CompileError::PostFilterRequired);
                }
                resolved.sql
            }
        };
        order_by.push(OrderItem {
            expr,
            direction: order.direction,
        });
    }

    // A flatten used only for filtering multiplies rows
    let mut used = Vec::new();
    for item in &items {
        item.expr.referenced_aliases(&mut used);
    }
    for item in &order_by {
        item.expr.referenced_aliases(&mut used);
    }
    let filter_only = filter_flattens.iter().any(|f| !used.contains(f));
    if filter_only {
        log::debug!("Filter-only flattens {:?}; selecting distinct rows", filter_flattens);
    }

    let mut select = SelectStatement::new(table_ref(store, &root_alias)?);
    select.distinct = query.distinct || filter_only;
    select.items = items;
    select.joins = ctx.pop_scope()?;
    select.filter = SqlExpr::and_all(conditions);
    select.group_by = group_by;
    select.order_by = order_by;
    select.limit = query.limit;

    let join_count = select.joins.len();
    let sql = ctx.render_statement(&select);
    let plan = RelationalPlan {
        result_schema: columns,
        sql,
        connection: schema.database_type(),
        pre_execution: ctx.dialect.pre_execution_statements(ctx.config),
        post_execution: ctx.dialect.post_execution_statements(ctx.config),
    };
    let allocations = ctx.take_allocations();
    log::info!(
        "Compiled {} query: {} columns, {} joins, {} allocations",
        query.root_class,
        plan.result_schema.len(),
        join_count,
        allocations.len()
    );
    Ok(ExecutionPlan::with_allocations(plan, allocations)?)
}

fn projected(
    ctx: &mut CompileCtx<'_>,
    projection: &Projection,
    env: &Env,
) -> Result<ResolvedExpression, CompileError> {
    let resolved = resolve_expr(ctx, &projection.expr, env, ResolveMode::Projection)?;
    if !resolved.post_filters.is_empty() {
        return Err(CompileError::PostFilterRequired);
    }
    Ok(resolved)
}

fn push_column(
    items: &mut Vec<SelectItem>,
    columns: &mut Vec<ResultColumn>,
    name: &str,
    resolved: ResolvedExpression,
) -> Result<(), CompileError> {
    if columns.iter().any(|c| c.name == name) {
        return Err(CompileError::invalid_query(format!(
            "column `{}` is projected twice",
            name
        )));
    }
    columns.push(ResultColumn {
        name: name.to_string(),
        semantic_type: resolved.semantic_type,
        physical_type: resolved.physical_type,
        declared_type: resolved.declared_type,
    });
    items.push(SelectItem::named(resolved.sql, name));
    Ok(())
}
