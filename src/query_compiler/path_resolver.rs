//! Property chain resolution.
//!
//! Walks a chain step by step from a [`Cursor`], deciding per binding whether
//! the next value is a column read, a semi-structured path access, a lateral
//! flatten, a join to another mapped table or a derived computation. Type
//! dispatch steps and aggregates are delegated to their own modules.

use crate::mapping_catalog::binding_parser::{
    BindingLiteral, DerivedArg, DerivedExpression, JsonRoot, PathSegment,
};
use crate::mapping_catalog::class_model::PropertyDef;
use crate::mapping_catalog::data_types::{PhysicalType, SemanticType};
use crate::mapping_catalog::mapping_schema::{Binding, ResolvedBinding};
use crate::query_tree::{
    LiteralValue, PathRoot, PropertyApplication, PropertyPath, QueryExpr, Step,
};
use crate::sql_generator::function_registry::{get_function_mapping, FunctionKind};
use crate::sql_generator::sql_ast::{SqlExpr, SqlLiteral};

use super::aggregation_builder;
use super::compile_ctx::{CompileCtx, Env, ResolveMode};
use super::errors::CompileError;
use super::join_builder;
use super::resolved_expr::{Cursor, Location, RequiredJoin, ResolvedExpression};
use super::type_dispatch;

/// Outcome of walking a chain: a cursor that can still be navigated, or a
/// finished expression produced by a terminal dispatch step.
#[derive(Debug)]
pub enum Walked {
    Cursor(Cursor),
    Resolved(ResolvedExpression),
}

/// Resolve any query expression to SQL.
pub fn resolve_expr(
    ctx: &mut CompileCtx<'_>,
    expr: &QueryExpr,
    env: &Env,
    mode: ResolveMode,
) -> Result<ResolvedExpression, CompileError> {
    match expr {
        QueryExpr::Path(path) => resolve_path(ctx, path, env, mode),
        QueryExpr::Literal { value } => Ok(literal(value)),
        QueryExpr::Constant { name, value } => constant(ctx, name, value),
        QueryExpr::Function { name, args } => resolve_function(ctx, name, args, env, mode),
        QueryExpr::Aggregate { .. } => aggregation_builder::sub_aggregate(ctx, expr, env, mode),
        QueryExpr::InstanceOf { path, class } => {
            type_dispatch::instance_of(ctx, path, class, env, mode)
        }
    }
}

pub fn resolve_path(
    ctx: &mut CompileCtx<'_>,
    path: &PropertyPath,
    env: &Env,
    mode: ResolveMode,
) -> Result<ResolvedExpression, CompileError> {
    match walk(ctx, path, env, mode)? {
        Walked::Resolved(resolved) => Ok(resolved),
        Walked::Cursor(cursor) => match &cursor.location {
            Location::Row { alias, class, .. } => {
                if mode == ResolveMode::Projection {
                    return Err(CompileError::invalid_query(format!(
                        "cannot project an instance of `{}`; project one of its properties",
                        class
                    )));
                }
                row_identity(ctx, &cursor, alias, class)
            }
            _ => Ok(cursor.finish()),
        },
    }
}

/// A joined row stands for itself through its first primary key column,
/// so that `isEmpty($p.manager)` can test the outer join.
fn row_identity(
    ctx: &CompileCtx<'_>,
    cursor: &Cursor,
    alias: &str,
    class: &str,
) -> Result<ResolvedExpression, CompileError> {
    let store = ctx.schema.table_store(class, ctx.model)?;
    let key = store.primary_key().first().ok_or_else(|| {
        CompileError::unsupported(format!(
            "`{}` has no primary key to stand for the row",
            class
        ))
    })?;
    let mut resolved = ResolvedExpression::new(
        SqlExpr::column(alias, key),
        SemanticType::Class(class.to_string()),
    );
    resolved.required_joins = cursor.required.clone();
    resolved.post_filters = cursor.post_filters.clone();
    Ok(resolved)
}

pub fn walk(
    ctx: &mut CompileCtx<'_>,
    path: &PropertyPath,
    env: &Env,
    mode: ResolveMode,
) -> Result<Walked, CompileError> {
    let start = match path.root {
        PathRoot::Root => env.root.clone(),
        PathRoot::Current => env.current.clone().ok_or_else(|| {
            CompileError::invalid_query("path refers to the current element outside a lambda")
        })?,
    };
    walk_from(ctx, start, &path.steps, env, mode)
}

pub fn walk_from(
    ctx: &mut CompileCtx<'_>,
    start: Cursor,
    steps: &[Step],
    env: &Env,
    mode: ResolveMode,
) -> Result<Walked, CompileError> {
    let mut cursor = start;
    let mut i = 0;
    while i < steps.len() {
        match &steps[i] {
            Step::Property(app) => {
                let next_filter = match steps.get(i + 1) {
                    Some(Step::Filter { predicate }) => Some(predicate.as_ref()),
                    _ => None,
                };
                let (next, consumed_filter) =
                    step_property(ctx, cursor, app, next_filter, env, mode)?;
                cursor = next;
                i += if consumed_filter { 2 } else { 1 };
                continue;
            }
            Step::SubType { class } => cursor = narrow(ctx, cursor, class)?,
            Step::Match { branches } => {
                ensure_terminal(steps, i, "match")?;
                let resolved = type_dispatch::compile_match(ctx, cursor, branches, env, mode)?;
                return Ok(Walked::Resolved(resolved));
            }
            Step::TypeName | Step::TypePath => {
                ensure_terminal(steps, i, "type name")?;
                let resolved = type_dispatch::type_name(ctx, cursor)?;
                return Ok(Walked::Resolved(resolved));
            }
            Step::Filter { predicate } => {
                cursor = collection_filter(ctx, cursor, predicate, env, mode)?;
            }
        }
        i += 1;
    }
    Ok(Walked::Cursor(cursor))
}

fn ensure_terminal(steps: &[Step], index: usize, what: &str) -> Result<(), CompileError> {
    if index + 1 < steps.len() {
        return Err(CompileError::unsupported(format!(
            "navigation after a {} step",
            what
        )));
    }
    Ok(())
}

/// `->subType(@C)`: narrows the static class, emits nothing.
fn narrow(ctx: &CompileCtx<'_>, mut cursor: Cursor, target: &str) -> Result<Cursor, CompileError> {
    ctx.model.get_class(target)?;
    let current = cursor
        .class()
        .ok_or_else(|| CompileError::invalid_query("subType applied to a primitive value"))?
        .to_string();
    if !ctx.model.is_subtype_of(target, &current) {
        return Err(CompileError::TypeDispatch(format!(
            "`{}` is not a subtype of `{}`",
            target, current
        )));
    }
    match &mut cursor.location {
        Location::Row { class, .. } | Location::Document { class, .. } => {
            *class = target.to_string()
        }
        Location::Value { .. } => {}
    }
    Ok(cursor)
}

/// `->filter(x | ...)` over a flattened semi-structured array.
fn collection_filter(
    ctx: &mut CompileCtx<'_>,
    mut cursor: Cursor,
    predicate: &QueryExpr,
    env: &Env,
    mode: ResolveMode,
) -> Result<Cursor, CompileError> {
    if !cursor.flattened {
        return Err(CompileError::unsupported(
            "filter must directly follow a collection-valued property",
        ));
    }
    match mode {
        ResolveMode::Projection => Err(CompileError::PostFilterRequired),
        ResolveMode::JoinCondition => Err(CompileError::unsupported(
            "semi-structured collection filter inside a join condition",
        )),
        ResolveMode::Filter | ResolveMode::Aggregation => {
            let mut element = cursor.clone();
            element.post_filters.clear();
            let condition = resolve_expr(ctx, predicate, &env.with_current(element), mode)?;
            log::debug!("Collection filter becomes a post-filter conjunct");
            for join in &condition.required_joins {
                cursor.require(join.clone());
            }
            cursor.post_filters.push(condition.sql);
            cursor.post_filters.extend(condition.post_filters);
            Ok(cursor)
        }
    }
}

/// One property application. Returns the new cursor and whether the
/// following filter step was folded into a join.
fn step_property(
    ctx: &mut CompileCtx<'_>,
    cursor: Cursor,
    app: &PropertyApplication,
    next_filter: Option<&QueryExpr>,
    env: &Env,
    mode: ResolveMode,
) -> Result<(Cursor, bool), CompileError> {
    let schema = ctx.schema;
    let model = ctx.model;

    let (class, in_document) = match &cursor.location {
        Location::Row { class, .. } => (class.clone(), false),
        Location::Document { class, .. } => (class.clone(), true),
        Location::Value { .. } => {
            return Err(CompileError::invalid_query(format!(
                "property `{}` applied to a primitive value",
                app.property
            )))
        }
    };
    let (_, def) = model.find_property(&class, &app.property)?;
    let def = def.clone();
    let binding = schema.binding(&class, &app.property, model, in_document)?;

    let temporal = matches!(
        binding,
        ResolvedBinding::Declared(Binding::Association { .. })
            | ResolvedBinding::Declared(Binding::Explosion(_))
    );
    if app.dates().is_some() && !temporal {
        return Err(CompileError::invalid_step_with_context(
            "dates can only be applied to associations",
            &class,
            &app.property,
        ));
    }

    let implicit_key = [PathSegment::Key(app.property.clone())];
    let filter_key = next_filter.map(join_builder::canonical);
    let filter_key = filter_key.as_deref();
    let row_alias = match &cursor.location {
        Location::Row { alias, .. } => Some(alias.clone()),
        _ => None,
    };
    let next = match binding {
        ResolvedBinding::ImplicitKey(path) => {
            document_access(ctx, cursor, &path.segments, &def, app, filter_key, mode)?
        }
        ResolvedBinding::Declared(Binding::Column {
            column,
            physical_type,
        }) => match row_alias {
            Some(alias) => {
                let expr = SqlExpr::column(alias, column);
                enter_value(
                    ctx,
                    cursor,
                    expr,
                    &def,
                    app,
                    false,
                    physical_type.clone(),
                    filter_key,
                    mode,
                )?
            }
            // Column bindings of a table mapping do not apply inside a document
            None => document_access(ctx, cursor, &implicit_key, &def, app, filter_key, mode)?,
        },
        ResolvedBinding::Declared(Binding::JsonPath(path)) => {
            match (&path.root, row_alias) {
                (JsonRoot::Column(column), Some(alias)) => {
                    let expr = SqlExpr::json_access(SqlExpr::column(alias, column), &path.segments);
                    enter_value(ctx, cursor, expr, &def, app, true, None, filter_key, mode)?
                }
                (JsonRoot::Context, None) => {
                    document_access(ctx, cursor, &path.segments, &def, app, filter_key, mode)?
                }
                (JsonRoot::Column(_), None) => {
                    document_access(ctx, cursor, &implicit_key, &def, app, filter_key, mode)?
                }
                (JsonRoot::Context, Some(_)) => {
                    return Err(crate::mapping_catalog::MappingError::invalid_binding(
                        &class,
                        &app.property,
                        "relative path used on a table row",
                    )
                    .into())
                }
            }
        }
        ResolvedBinding::Declared(Binding::Association {
            target_class,
            predicate,
        }) => {
            return join_builder::association(
                ctx,
                cursor,
                &class,
                app,
                target_class,
                predicate,
                next_filter,
                env,
                mode,
            )
        }
        ResolvedBinding::Declared(Binding::Explosion(explosion)) => {
            return join_builder::explosion(
                ctx,
                cursor,
                &class,
                app,
                explosion,
                next_filter,
                env,
                mode,
            )
        }
        ResolvedBinding::Declared(Binding::Derived(derived)) => {
            derived_value(ctx, cursor, &def, derived, env, mode)?
        }
    };
    Ok((next, false))
}

/// Key access relative to the document the cursor points at.
fn document_access(
    ctx: &mut CompileCtx<'_>,
    cursor: Cursor,
    segments: &[PathSegment],
    def: &PropertyDef,
    app: &PropertyApplication,
    filter_key: Option<&str>,
    mode: ResolveMode,
) -> Result<Cursor, CompileError> {
    let base = match &cursor.location {
        Location::Document { expr, .. } => expr.clone(),
        _ => {
            return Err(CompileError::invalid_query(format!(
                "property `{}` is only reachable inside a document",
                app.property
            )))
        }
    };
    let expr = SqlExpr::json_access(base, segments);
    enter_value(ctx, cursor, expr, def, app, true, None, filter_key, mode)
}

/// Move the cursor onto a property value, indexing or flattening arrays.
#[allow(clippy::too_many_arguments)]
fn enter_value(
    ctx: &mut CompileCtx<'_>,
    mut cursor: Cursor,
    expr: SqlExpr,
    def: &PropertyDef,
    app: &PropertyApplication,
    semi_structured: bool,
    declared: Option<PhysicalType>,
    filter_key: Option<&str>,
    mode: ResolveMode,
) -> Result<Cursor, CompileError> {
    let mut expr = expr;
    let mut semi_structured = semi_structured;
    let mut flattened = false;
    if let Some(index) = app.index() {
        if !def.is_collection {
            return Err(CompileError::invalid_query(format!(
                "index applied to single-valued property `{}`",
                app.property
            )));
        }
        expr = SqlExpr::json_access(expr, &[PathSegment::Index(index)]);
        semi_structured = true;
    } else if def.is_collection {
        if mode == ResolveMode::JoinCondition {
            return Err(CompileError::unsupported(
                "array navigation inside a join condition",
            ));
        }
        let alias = ctx.flatten(expr, filter_key)?;
        cursor.require(RequiredJoin::Flatten(alias.clone()));
        expr = SqlExpr::flatten_value(alias);
        semi_structured = true;
        flattened = true;
    }

    let location = match &def.ty {
        SemanticType::Class(class) => Location::Document {
            expr,
            class: class.clone(),
        },
        ty => Location::Value {
            expr,
            ty: ty.clone(),
            semi_structured,
            declared: if semi_structured { None } else { declared },
        },
    };
    let mut next = cursor.with_location(location);
    next.flattened = flattened;
    Ok(next)
}

/// Computed property: resolve each argument chain from the owning object
/// and apply the mapped function.
fn derived_value(
    ctx: &mut CompileCtx<'_>,
    cursor: Cursor,
    def: &PropertyDef,
    derived: &DerivedExpression,
    env: &Env,
    mode: ResolveMode,
) -> Result<Cursor, CompileError> {
    let mapping = get_function_mapping(&derived.function).ok_or_else(|| {
        CompileError::UnknownFunction {
            name: derived.function.clone(),
        }
    })?;
    if !mapping.accepts(derived.args.len()) {
        return Err(CompileError::invalid_query(format!(
            "derived property `{}` passes {} arguments to `{}`",
            def.name,
            derived.args.len(),
            derived.function
        )));
    }

    let mut args = Vec::with_capacity(derived.args.len());
    let mut types = Vec::with_capacity(derived.args.len());
    let mut next = cursor.clone();
    for arg in &derived.args {
        match arg {
            DerivedArg::Property(chain) => {
                let steps: Vec<Step> = chain
                    .iter()
                    .map(|p| Step::Property(PropertyApplication::new(p.clone())))
                    .collect();
                let start = cursor.with_location(cursor.location.clone());
                let resolved = match walk_from(ctx, start, &steps, env, mode)? {
                    Walked::Cursor(c) => c.finish(),
                    Walked::Resolved(r) => r,
                };
                for join in &resolved.required_joins {
                    next.require(join.clone());
                }
                next.post_filters.extend(resolved.post_filters.iter().cloned());
                args.push(resolved.sql);
                types.push(resolved.semantic_type);
            }
            DerivedArg::Literal(lit) => {
                let (sql, ty) = binding_literal(lit);
                args.push(sql);
                types.push(ty);
            }
        }
    }

    let sql = mapping.build(args, &types);
    Ok(next.with_location(Location::Value {
        expr: sql,
        ty: def.ty.clone(),
        semi_structured: false,
        declared: None,
    }))
}

pub(crate) fn binding_literal(lit: &BindingLiteral) -> (SqlExpr, SemanticType) {
    match lit {
        BindingLiteral::String(s) => (SqlExpr::string(s.clone()), SemanticType::String),
        BindingLiteral::Integer(i) => (SqlExpr::Literal(SqlLiteral::Integer(*i)), SemanticType::Integer),
        BindingLiteral::Float(f) => (SqlExpr::Literal(SqlLiteral::Float(*f)), SemanticType::Float),
        BindingLiteral::Boolean(b) => (SqlExpr::Literal(SqlLiteral::Boolean(*b)), SemanticType::Boolean),
    }
}

fn literal_parts(value: &LiteralValue) -> (SqlLiteral, SemanticType) {
    match value {
        LiteralValue::Boolean(b) => (SqlLiteral::Boolean(*b), SemanticType::Boolean),
        LiteralValue::Integer(i) => (SqlLiteral::Integer(*i), SemanticType::Integer),
        LiteralValue::Float(f) => (SqlLiteral::Float(*f), SemanticType::Float),
        LiteralValue::String(s) => (SqlLiteral::String(s.clone()), SemanticType::String),
    }
}

fn literal(value: &LiteralValue) -> ResolvedExpression {
    let (lit, ty) = literal_parts(value);
    ResolvedExpression::new(SqlExpr::Literal(lit), ty)
}

fn constant(
    ctx: &mut CompileCtx<'_>,
    name: &str,
    value: &LiteralValue,
) -> Result<ResolvedExpression, CompileError> {
    let valid = name
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(CompileError::invalid_query(format!(
            "constant name `{}` is not a plain identifier",
            name
        )));
    }
    let (_, ty) = literal_parts(value);
    ctx.allocate_constant(name, ty.clone(), value)?;
    let placeholder = SqlExpr::Placeholder {
        name: name.to_string(),
        quoted: matches!(value, LiteralValue::String(_)),
    };
    Ok(ResolvedExpression::new(placeholder, ty))
}

fn resolve_function(
    ctx: &mut CompileCtx<'_>,
    name: &str,
    args: &[QueryExpr],
    env: &Env,
    mode: ResolveMode,
) -> Result<ResolvedExpression, CompileError> {
    let mapping = get_function_mapping(name).ok_or_else(|| CompileError::UnknownFunction {
        name: name.to_string(),
    })?;
    if !mapping.accepts(args.len()) {
        return Err(CompileError::invalid_query(format!(
            "function `{}` does not take {} arguments",
            name,
            args.len()
        )));
    }

    let mut resolved = Vec::with_capacity(args.len());
    for arg in args {
        resolved.push(resolve_expr(ctx, arg, env, mode)?);
    }
    if mode == ResolveMode::Filter {
        check_element_conditions(name, mapping.kind, &mut resolved)?;
    }
    let types: Vec<SemanticType> = resolved.iter().map(|r| r.semantic_type.clone()).collect();
    let sql = mapping.build(resolved.iter().map(|r| r.sql.clone()).collect(), &types);

    let mut out = ResolvedExpression::new(sql, mapping.result_type(&types));
    for r in &resolved {
        out.absorb(r);
    }
    if mode == ResolveMode::Filter && out.semantic_type == SemanticType::Boolean {
        out.attach_post_filters();
    }
    Ok(out)
}

/// In a `where`, a collection filter condition stays with the test over the
/// flattened element it belongs to. Flattened rows only express "some
/// element", so such a test may be combined with `and`/`or` but never negated
/// or branched on.
fn check_element_conditions(
    name: &str,
    kind: FunctionKind,
    args: &mut [ResolvedExpression],
) -> Result<(), CompileError> {
    match kind {
        FunctionKind::And | FunctionKind::Or => {
            for arg in args.iter_mut() {
                arg.attach_post_filters();
            }
            Ok(())
        }
        FunctionKind::Not | FunctionKind::IsNull | FunctionKind::Conditional => {
            if args.iter().any(|a| a.existential || !a.post_filters.is_empty()) {
                return Err(CompileError::unsupported(format!(
                    "`{}` over a filtered collection",
                    name
                )));
            }
            Ok(())
        }
        _ => {
            if args.iter().any(|a| a.existential) {
                return Err(CompileError::unsupported(format!(
                    "filtered collection test used as an argument of `{}`",
                    name
                )));
            }
            Ok(())
        }
    }
}
