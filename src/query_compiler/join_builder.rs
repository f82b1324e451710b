//! Join Builder Module
//!
//! Builds the left outer joins a property chain needs when it crosses from
//! one mapped table to another:
//! - associations, joined on the mapped predicate with the source side
//!   substituted from the current row or document
//! - explosions, joined to a derived table that flattens a tagged array of
//!   the target table and exposes the element id as the join key
//!
//! Every join is identified by its join path; a path already joined in the
//! plan reuses its alias and adds nothing.

use crate::mapping_catalog::binding_parser::{
    ComparisonOp, JoinPredicate, JsonRoot, OperandPath, PathSegment, PredicateOperand,
};
use crate::mapping_catalog::data_types::CastType;
use crate::mapping_catalog::mapping_schema::ExplosionBinding;
use crate::mapping_catalog::MappingError;
use crate::query_tree::{PropertyApplication, QueryExpr, TemporalArgument};
use crate::sql_generator::sql_ast::{
    JoinClause, JoinKind, SelectItem, SelectStatement, SqlExpr, SqlOperator, TableRef,
    TableSource,
};
use crate::utils::alias_naming::table_base_name;

use super::alias_registry::{JoinPath, JoinStep, JoinStepKind};
use super::compile_ctx::{CompileCtx, Env, ResolveMode};
use super::errors::CompileError;
use super::path_resolver::{binding_literal, resolve_expr};
use super::resolved_expr::{Cursor, Location, RequiredJoin};
use super::store_source::{milestoning_conditions, table_ref};

/// Join an associated class. Returns the cursor on the joined row and
/// whether `filter` was folded into the join condition.
#[allow(clippy::too_many_arguments)]
pub fn association(
    ctx: &mut CompileCtx<'_>,
    cursor: Cursor,
    class: &str,
    app: &PropertyApplication,
    target_class: &str,
    predicate: &JoinPredicate,
    filter: Option<&QueryExpr>,
    env: &Env,
    mode: ResolveMode,
) -> Result<(Cursor, bool), CompileError> {
    if mode == ResolveMode::JoinCondition {
        return Err(CompileError::unsupported(
            "association navigation inside a join condition",
        ));
    }
    let schema = ctx.schema;
    let model = ctx.model;
    let store = schema.table_store(target_class, model)?;
    let base = table_base_name(store.table_name().unwrap_or(target_class));
    let dates = app.dates().cloned();

    let origin = origin_key(ctx, &cursor)?;
    let step = JoinStep {
        kind: JoinStepKind::Association,
        origin,
        class: class.to_string(),
        property: app.property.clone(),
        dates: dates.clone(),
        filter: filter.map(canonical),
    };
    let path = cursor.path.extend(step);
    let (alias, fresh) = ctx.allocate_alias(&path, &base)?;

    if fresh {
        let mut conditions = Vec::with_capacity(predicate.conjuncts.len());
        for comparison in &predicate.conjuncts {
            let left = operand_sql(&cursor, &alias, &comparison.left, class, &app.property)?;
            let right = operand_sql(&cursor, &alias, &comparison.right, class, &app.property)?;
            conditions.push(SqlExpr::binary(comparison_op(comparison.op), left, right));
        }
        conditions.extend(milestoning_conditions(store, &alias, dates.as_ref()));
        if let Some(filter) = filter {
            conditions.push(join_filter(ctx, &alias, target_class, &path, filter, env)?);
        }
        let on = SqlExpr::and_all(conditions).ok_or_else(|| {
            MappingError::invalid_binding(class, &app.property, "association has no join condition")
        })?;
        log::debug!(
            "Joining '{}' as '{}' for {}.{}",
            target_class,
            alias,
            class,
            app.property
        );
        ctx.add_join(JoinClause::Table {
            kind: JoinKind::LeftOuter,
            table: table_ref(store, &alias)?,
            on,
        })?;
    }

    Ok((joined_cursor(&cursor, alias, target_class, dates, path), filter.is_some()))
}

/// Join the rows of `explosion.target_class` whose tagged array elements
/// point back at the current row.
///
/// ```sql
/// left outer join (select "t".*, "ss_flatten_0".VALUE['id']::number as "leftJoinKey"
///                  from S.T as "t" inner join lateral flatten(...) as "ss_flatten_0"
///                  where "ss_flatten_0".VALUE['tag']::varchar = 'X') as "t_1"
///   on ("root".ID = "t_1"."leftJoinKey")
/// ```
#[allow(clippy::too_many_arguments)]
pub fn explosion(
    ctx: &mut CompileCtx<'_>,
    cursor: Cursor,
    class: &str,
    app: &PropertyApplication,
    explosion: &ExplosionBinding,
    filter: Option<&QueryExpr>,
    env: &Env,
    mode: ResolveMode,
) -> Result<(Cursor, bool), CompileError> {
    if mode == ResolveMode::JoinCondition {
        return Err(CompileError::unsupported(
            "explosion navigation inside a join condition",
        ));
    }
    let origin_alias = match &cursor.location {
        Location::Row { alias, .. } => alias.clone(),
        _ => {
            return Err(CompileError::unsupported(format!(
                "explosion `{}` reached from inside a document",
                app.property
            )))
        }
    };
    let array_column = match &explosion.array_path.root {
        JsonRoot::Column(column) => column.clone(),
        JsonRoot::Context => {
            return Err(MappingError::invalid_binding(
                class,
                &app.property,
                "explosion array must start at a column",
            )
            .into())
        }
    };

    let schema = ctx.schema;
    let model = ctx.model;
    let target = explosion.target_class.as_str();
    let store = schema.table_store(target, model)?;
    let base = table_base_name(store.table_name().unwrap_or(target));
    let dates = app.dates().cloned();

    let step = JoinStep {
        kind: JoinStepKind::Explosion,
        origin: origin_alias.clone(),
        class: class.to_string(),
        property: app.property.clone(),
        dates: dates.clone(),
        filter: filter.map(canonical),
    };
    let path = cursor.path.extend(step);
    // Derived alias first; the inner alias is numbered after it
    let (alias, fresh) = ctx.allocate_alias(&path, &base)?;

    if fresh {
        let scope = ctx.push_scope();
        let inner_path = JoinPath::root(scope, target, dates.clone());
        let (inner, _) = ctx.allocate_alias(&inner_path, &base)?;

        let array = SqlExpr::json_access(
            SqlExpr::column(&inner, &array_column),
            &explosion.array_path.segments,
        );
        let element = ctx.flatten(array, None)?;
        let element_value = SqlExpr::flatten_value(&element);

        let id_cast = CastType::for_semantic(&explosion.id_type).unwrap_or(CastType::Varchar);
        let key_column = ctx.config.explosion_key_column.clone();
        let mut select = SelectStatement::new(table_ref(store, &inner)?);
        select.items.push(SelectItem::unnamed(SqlExpr::AllColumns {
            table_alias: inner.clone(),
        }));
        select.items.push(SelectItem::named(
            SqlExpr::cast(
                SqlExpr::json_access(
                    element_value.clone(),
                    &[PathSegment::Key(explosion.id_field.clone())],
                ),
                id_cast,
            ),
            key_column.clone(),
        ));

        let mut conditions = Vec::new();
        if let (Some(tag_field), Some(tag_value)) = (&explosion.tag_field, &explosion.tag_value) {
            conditions.push(SqlExpr::eq(
                SqlExpr::cast(
                    SqlExpr::json_access(element_value, &[PathSegment::Key(tag_field.clone())]),
                    CastType::Varchar,
                ),
                SqlExpr::string(tag_value.clone()),
            ));
        }
        conditions.extend(milestoning_conditions(store, &inner, dates.as_ref()));
        select.filter = SqlExpr::and_all(conditions);
        select.joins = ctx.pop_scope()?;

        let mut on = vec![SqlExpr::eq(
            SqlExpr::column(&origin_alias, &explosion.origin_key),
            SqlExpr::quoted_column(&alias, &key_column),
        )];
        if let Some(filter) = filter {
            on.push(join_filter(ctx, &alias, target, &path, filter, env)?);
        }
        let on = SqlExpr::and_all(on)
            .ok_or_else(|| CompileError::invalid_query("explosion without join condition"))?;

        log::debug!(
            "Exploding '{}' into '{}' for {}.{}",
            target,
            alias,
            class,
            app.property
        );
        ctx.add_join(JoinClause::Table {
            kind: JoinKind::LeftOuter,
            table: TableRef {
                source: TableSource::Subquery(Box::new(select)),
                alias: alias.clone(),
            },
            on,
        })?;
    }

    Ok((joined_cursor(&cursor, alias, target, dates, path), filter.is_some()))
}

fn joined_cursor(
    from: &Cursor,
    alias: String,
    class: &str,
    dates: Option<TemporalArgument>,
    path: JoinPath,
) -> Cursor {
    let mut next = from.with_location(Location::Row {
        alias: alias.clone(),
        class: class.to_string(),
        dates,
    });
    next.path = path;
    next.require(RequiredJoin::Table(alias));
    next
}

/// Identity of the join origin: the row alias, or the rendered document.
fn origin_key(ctx: &CompileCtx<'_>, cursor: &Cursor) -> Result<String, CompileError> {
    match &cursor.location {
        Location::Row { alias, .. } => Ok(alias.clone()),
        Location::Document { expr, .. } => Ok(ctx.render(expr)),
        Location::Value { .. } => Err(CompileError::invalid_query(
            "association applied to a primitive value",
        )),
    }
}

/// Canonical text of a filter expression, part of the join identity.
pub(crate) fn canonical(filter: &QueryExpr) -> String {
    serde_json::to_string(filter).unwrap_or_else(|_| format!("{:?}", filter))
}

/// Collection filter folded into the `on` clause of the join it filters.
/// It may only read the joined row itself.
fn join_filter(
    ctx: &mut CompileCtx<'_>,
    alias: &str,
    class: &str,
    path: &JoinPath,
    filter: &QueryExpr,
    env: &Env,
) -> Result<SqlExpr, CompileError> {
    let mut element = Cursor::row(alias, class, path.clone());
    element.require(RequiredJoin::Table(alias.to_string()));
    let condition = resolve_expr(
        ctx,
        filter,
        &env.with_current(element),
        ResolveMode::JoinCondition,
    )?;
    if let Some(other) = condition
        .required_joins
        .iter()
        .find(|join| join.alias() != alias)
    {
        return Err(CompileError::unsupported(format!(
            "join filter on '{}' refers to '{}'",
            alias,
            other.alias()
        )));
    }
    if !condition.post_filters.is_empty() {
        return Err(CompileError::unsupported(
            "collection filter nested in a join filter",
        ));
    }
    Ok(condition.sql)
}

fn operand_sql(
    source: &Cursor,
    target_alias: &str,
    operand: &PredicateOperand,
    class: &str,
    property: &str,
) -> Result<SqlExpr, CompileError> {
    let expr = match operand {
        PredicateOperand::Literal(lit) => return Ok(binding_literal(lit).0),
        PredicateOperand::Target(path) => {
            let column = path.column.as_ref().ok_or_else(|| {
                MappingError::invalid_binding(class, property, "target operand without a column")
            })?;
            cast_operand(
                SqlExpr::json_access(SqlExpr::column(target_alias, column), &path.segments),
                path,
            )
        }
        PredicateOperand::Source(path) => match (&source.location, &path.column) {
            (Location::Row { alias, .. }, Some(column)) => cast_operand(
                SqlExpr::json_access(SqlExpr::column(alias, column), &path.segments),
                path,
            ),
            // Inside a document a source column reads the key of the same name
            (Location::Document { expr, .. }, Some(column)) => {
                let mut segments = vec![PathSegment::Key(column.clone())];
                segments.extend(path.segments.iter().cloned());
                cast_operand(SqlExpr::json_access(expr.clone(), &segments), path)
            }
            (Location::Document { expr, .. }, None) => {
                cast_operand(SqlExpr::json_access(expr.clone(), &path.segments), path)
            }
            _ => {
                return Err(MappingError::invalid_binding(
                    class,
                    property,
                    "source operand does not match the owning store",
                )
                .into())
            }
        },
    };
    Ok(expr)
}

fn cast_operand(expr: SqlExpr, path: &OperandPath) -> SqlExpr {
    match path.cast {
        Some(cast) => SqlExpr::cast(expr, cast),
        None => expr,
    }
}

fn comparison_op(op: ComparisonOp) -> SqlOperator {
    match op {
        ComparisonOp::Equal => SqlOperator::Eq,
        ComparisonOp::NotEqual => SqlOperator::NotEq,
        ComparisonOp::Less => SqlOperator::Lt,
        ComparisonOp::LessOrEqual => SqlOperator::LtEq,
        ComparisonOp::Greater => SqlOperator::Gt,
        ComparisonOp::GreaterOrEqual => SqlOperator::GtEq,
    }
}
