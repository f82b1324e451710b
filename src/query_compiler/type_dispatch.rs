//! Type dispatch over semi-structured documents.
//!
//! A document of a polymorphic class carries a discriminator field whose
//! stored literal names its concrete class. Matches, type names and
//! `instanceOf` tests become conditions over that field, with literal sets
//! taken from the [`TypeTaxonomy`](crate::mapping_catalog::TypeTaxonomy).

use crate::mapping_catalog::binding_parser::PathSegment;
use crate::mapping_catalog::data_types::{CastType, PhysicalType, SemanticType};
use crate::query_tree::{MatchBranch, PropertyPath};
use crate::sql_generator::sql_ast::{CaseBranch, SqlExpr, SqlLiteral};

use super::compile_ctx::{CompileCtx, Env, ResolveMode};
use super::errors::CompileError;
use super::path_resolver::{resolve_expr, walk, Walked};
use super::resolved_expr::{Cursor, Location, ResolvedExpression};

/// `doc['@type']::varchar`
fn discriminator(ctx: &CompileCtx<'_>, doc: &SqlExpr, class: &str) -> Result<SqlExpr, CompileError> {
    let field = ctx.taxonomy.discriminator_field(class)?;
    Ok(SqlExpr::cast(
        SqlExpr::json_access(doc.clone(), &[PathSegment::Key(field.to_string())]),
        CastType::Varchar,
    ))
}

fn literal_list(literals: Vec<String>) -> Vec<SqlExpr> {
    literals.into_iter().map(SqlExpr::string).collect()
}

/// Expression carrying the joins and post filters of the cursor it came from.
fn from_cursor(cursor: &Cursor, sql: SqlExpr, ty: SemanticType) -> ResolvedExpression {
    let mut resolved = ResolvedExpression::new(sql, ty);
    resolved.required_joins = cursor.required.clone();
    resolved.post_filters = cursor.post_filters.clone();
    resolved
}

/// `->match([a: A[1] | ..., b: B[1] | ...])` over a document.
pub fn compile_match(
    ctx: &mut CompileCtx<'_>,
    cursor: Cursor,
    branches: &[MatchBranch],
    env: &Env,
    mode: ResolveMode,
) -> Result<ResolvedExpression, CompileError> {
    let (doc, static_class) = match &cursor.location {
        Location::Document { expr, class } => (expr.clone(), class.clone()),
        Location::Row { class, .. } => {
            return Err(CompileError::unsupported(format!(
                "match over rows of the mapped table for `{}`",
                class
            )))
        }
        Location::Value { .. } => {
            return Err(CompileError::TypeDispatch(
                "match applied to a primitive value".to_string(),
            ))
        }
    };
    if branches.is_empty() {
        return Err(CompileError::TypeDispatch(format!(
            "match over `{}` has no branches",
            static_class
        )));
    }
    let disc = discriminator(ctx, &doc, &static_class)?;

    let mut case_branches = Vec::with_capacity(branches.len());
    let mut claimed: Vec<String> = Vec::new();
    let mut result_type: Option<SemanticType> = None;
    let mut out = from_cursor(&cursor, SqlExpr::Literal(SqlLiteral::Null), SemanticType::String);

    for branch in branches {
        ctx.model.get_class(&branch.subtype)?;
        if !ctx.model.is_subtype_of(&branch.subtype, &static_class) {
            return Err(CompileError::TypeDispatch(format!(
                "match branch `{}` is not a subtype of `{}`",
                branch.subtype, static_class
            )));
        }
        let literals = ctx.taxonomy.dispatch_literals(&branch.subtype)?;
        if literals.is_empty() {
            return Err(CompileError::TypeDispatch(format!(
                "`{}` has no concrete descendant with a discriminator literal",
                branch.subtype
            )));
        }
        // A literal belongs to the first branch that covers it
        let literals: Vec<String> = literals
            .into_iter()
            .filter(|l| !claimed.contains(l))
            .collect();
        if literals.is_empty() {
            return Err(CompileError::TypeDispatch(format!(
                "match branch `{}` is unreachable; earlier branches cover all its types",
                branch.subtype
            )));
        }
        claimed.extend(literals.iter().cloned());
        log::debug!(
            "Dispatch branch {} on {:?}",
            branch.subtype,
            literals
        );

        let element = cursor.with_location(Location::Document {
            expr: doc.clone(),
            class: branch.subtype.clone(),
        });
        let body = resolve_expr(ctx, &branch.body, &env.with_current(element), mode)?;
        result_type = Some(match result_type {
            None => body.semantic_type.clone(),
            Some(ty) => unify(ty, &body.semantic_type)?,
        });
        out.absorb(&body);
        case_branches.push(CaseBranch {
            when: SqlExpr::InList {
                expr: Box::new(disc.clone()),
                list: literal_list(literals),
            },
            then: body.sql,
        });
    }

    let ty = result_type.unwrap_or(SemanticType::String);
    out.sql = SqlExpr::Case {
        branches: case_branches,
        else_expr: Some(Box::new(SqlExpr::Literal(SqlLiteral::Null))),
    };
    out.physical_type = PhysicalType::default_for(&ty);
    out.semantic_type = ty;
    Ok(out)
}

fn unify(left: SemanticType, right: &SemanticType) -> Result<SemanticType, CompileError> {
    if &left == right {
        Ok(left)
    } else if left.is_numeric() && right.is_numeric() {
        Ok(SemanticType::Number)
    } else {
        Err(CompileError::TypeDispatch(format!(
            "match branches return incompatible types {} and {}",
            left, right
        )))
    }
}

/// Fully qualified runtime class of the value under the cursor.
pub fn type_name(
    ctx: &mut CompileCtx<'_>,
    cursor: Cursor,
) -> Result<ResolvedExpression, CompileError> {
    match &cursor.location {
        Location::Row { class, .. } => {
            let sql = SqlExpr::string(class.clone());
            Ok(from_cursor(&cursor, sql, SemanticType::String))
        }
        Location::Document { expr, class } => {
            if !ctx.taxonomy.has_subtypes(class)? {
                let sql = SqlExpr::string(class.clone());
                return Ok(from_cursor(&cursor, sql, SemanticType::String));
            }
            let concrete = ctx.taxonomy.concrete_classes(class)?;
            if concrete.is_empty() {
                return Err(CompileError::TypeDispatch(format!(
                    "`{}` has no concrete subtype",
                    class
                )));
            }
            let disc = discriminator(ctx, expr, class)?;
            let mut branches = Vec::with_capacity(concrete.len());
            for candidate in &concrete {
                let Some(literal) = ctx.taxonomy.literal_for(candidate)? else {
                    continue;
                };
                branches.push(CaseBranch {
                    when: SqlExpr::InList {
                        expr: Box::new(disc.clone()),
                        list: vec![SqlExpr::string(literal)],
                    },
                    then: SqlExpr::string(candidate.clone()),
                });
            }
            let sql = SqlExpr::Case {
                branches,
                else_expr: Some(Box::new(SqlExpr::Literal(SqlLiteral::Null))),
            };
            Ok(from_cursor(&cursor, sql, SemanticType::String))
        }
        Location::Value { .. } => Err(CompileError::invalid_query(
            "type name requested for a primitive value",
        )),
    }
}

/// `$x->instanceOf(C)`
pub fn instance_of(
    ctx: &mut CompileCtx<'_>,
    path: &PropertyPath,
    class: &str,
    env: &Env,
    mode: ResolveMode,
) -> Result<ResolvedExpression, CompileError> {
    ctx.model.get_class(class)?;
    let cursor = match walk(ctx, path, env, mode)? {
        Walked::Cursor(cursor) => cursor,
        Walked::Resolved(_) => {
            return Err(CompileError::invalid_query(
                "instanceOf applied to a computed value",
            ))
        }
    };

    let sql = match &cursor.location {
        Location::Document { expr, class: static_class } => {
            let literals = ctx.taxonomy.dispatch_literals(class)?;
            if literals.is_empty() {
                return Err(CompileError::TypeDispatch(format!(
                    "`{}` has no concrete descendant with a discriminator literal",
                    class
                )));
            }
            SqlExpr::InList {
                expr: Box::new(discriminator(ctx, expr, static_class)?),
                list: literal_list(literals),
            }
        }
        Location::Row { class: static_class, .. } => {
            if ctx.model.is_subtype_of(static_class, class) {
                SqlExpr::Literal(SqlLiteral::Boolean(true))
            } else if ctx.model.is_subtype_of(class, static_class) {
                return Err(CompileError::unsupported(format!(
                    "runtime subtype test of `{}` rows against `{}`",
                    static_class, class
                )));
            } else {
                SqlExpr::Literal(SqlLiteral::Boolean(false))
            }
        }
        Location::Value { .. } => {
            return Err(CompileError::invalid_query(
                "instanceOf applied to a primitive value",
            ))
        }
    };
    Ok(from_cursor(&cursor, sql, SemanticType::Boolean))
}
