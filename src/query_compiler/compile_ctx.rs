//! Mutable state of one compilation.
//!
//! The mapping schema, class model and configuration are borrowed read-only;
//! the alias registry, flatten counter, select scopes and allocations are
//! owned here and discarded with the context.

use std::collections::HashMap;

use crate::config::CompilerConfig;
use crate::mapping_catalog::class_model::ClassModel;
use crate::mapping_catalog::data_types::SemanticType;
use crate::mapping_catalog::mapping_schema::MappingSchema;
use crate::mapping_catalog::type_taxonomy::TypeTaxonomy;
use crate::query_tree::LiteralValue;
use crate::relational_plan::Allocation;
use crate::sql_generator::sql_ast::{JoinClause, SelectStatement, SqlExpr};
use crate::sql_generator::{SqlDialect, ToSql};

use super::alias_registry::{AliasRegistry, JoinPath};
use super::errors::CompileError;
use super::flatten_injector::FlattenInjector;
use super::resolved_expr::Cursor;

/// What the expression being resolved is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Select list, order by, group keys
    Projection,
    /// Query filter (`where`)
    Filter,
    /// Argument of an aggregation subquery
    Aggregation,
    /// Collection filter pushed into a join's `on` clause
    JoinCondition,
}

/// Cursors a path can start from
#[derive(Debug, Clone)]
pub struct Env {
    pub root: Cursor,
    /// Element bound by the enclosing lambda
    pub current: Option<Cursor>,
}

impl Env {
    pub fn new(root: Cursor) -> Self {
        Env {
            root,
            current: None,
        }
    }

    pub fn with_current(&self, current: Cursor) -> Self {
        Env {
            root: self.root.clone(),
            current: Some(current),
        }
    }
}

#[derive(Debug)]
struct Scope {
    id: usize,
    joins: Vec<JoinClause>,
}

pub struct CompileCtx<'a> {
    pub schema: &'a MappingSchema,
    pub model: &'a ClassModel,
    pub taxonomy: TypeTaxonomy,
    pub config: &'a CompilerConfig,
    pub dialect: &'static dyn SqlDialect,
    aliases: AliasRegistry,
    flattens: FlattenInjector,
    scopes: Vec<Scope>,
    next_scope: usize,
    allocations: Vec<Allocation>,
    /// Result type of each aggregation subquery, by derived alias
    aggregate_types: HashMap<String, SemanticType>,
}

impl<'a> CompileCtx<'a> {
    pub fn new(
        schema: &'a MappingSchema,
        model: &'a ClassModel,
        taxonomy: TypeTaxonomy,
        config: &'a CompilerConfig,
        dialect: &'static dyn SqlDialect,
    ) -> Self {
        CompileCtx {
            schema,
            model,
            taxonomy,
            config,
            dialect,
            aliases: AliasRegistry::new(),
            flattens: FlattenInjector::new(config.flatten_alias_prefix.clone()),
            scopes: Vec::new(),
            next_scope: 0,
            allocations: Vec::new(),
            aggregate_types: HashMap::new(),
        }
    }

    /// Open a select scope; joins requested from now on land in it.
    pub fn push_scope(&mut self) -> usize {
        let id = self.next_scope;
        self.next_scope += 1;
        self.scopes.push(Scope {
            id,
            joins: Vec::new(),
        });
        id
    }

    /// Close the innermost scope and return its joins in allocation order.
    pub fn pop_scope(&mut self) -> Result<Vec<JoinClause>, CompileError> {
        self.scopes
            .pop()
            .map(|s| s.joins)
            .ok_or_else(|| CompileError::invalid_query("no open select scope"))
    }

    pub fn scope_id(&self) -> Result<usize, CompileError> {
        self.scopes
            .last()
            .map(|s| s.id)
            .ok_or_else(|| CompileError::invalid_query("no open select scope"))
    }

    pub fn add_join(&mut self, join: JoinClause) -> Result<(), CompileError> {
        let scope = self
            .scopes
            .last_mut()
            .ok_or_else(|| CompileError::invalid_query("no open select scope"))?;
        scope.joins.push(join);
        Ok(())
    }

    pub fn allocate_alias(
        &mut self,
        path: &JoinPath,
        base: &str,
    ) -> Result<(String, bool), CompileError> {
        self.aliases.allocate(path, base)
    }

    pub fn bind_alias(&mut self, path: &JoinPath, alias: &str) -> Result<(), CompileError> {
        self.aliases.bind(path, alias)
    }

    pub fn reserve_alias(&mut self, name: &str) {
        self.aliases.reserve(name);
    }

    /// Flatten `input` in the current scope and return the flatten alias.
    /// A traversal filtered by `filter_key` never shares its flatten with an
    /// unfiltered or differently filtered one.
    pub fn flatten(
        &mut self,
        input: SqlExpr,
        filter_key: Option<&str>,
    ) -> Result<String, CompileError> {
        let scope = self.scope_id()?;
        let rendered = self.render(&input);
        let (alias, fresh) = self.flattens.request(scope, &rendered, filter_key);
        if fresh {
            self.add_join(JoinClause::Flatten {
                input,
                alias: alias.clone(),
            })?;
        }
        Ok(alias)
    }

    /// Register a runtime constant; the same name must always carry the same value.
    pub fn allocate_constant(
        &mut self,
        name: &str,
        semantic_type: SemanticType,
        value: &LiteralValue,
    ) -> Result<(), CompileError> {
        if let Some(existing) = self.allocations.iter().find(|a| a.name == name) {
            if &existing.value != value {
                return Err(CompileError::invalid_query(format!(
                    "constant `{}` bound to both {} and {}",
                    name, existing.value, value
                )));
            }
            return Ok(());
        }
        self.allocations.push(Allocation {
            name: name.to_string(),
            semantic_type,
            value: value.clone(),
        });
        Ok(())
    }

    pub fn remember_aggregate_type(&mut self, alias: &str, ty: SemanticType) {
        self.aggregate_types.insert(alias.to_string(), ty);
    }

    pub fn aggregate_type(&self, alias: &str) -> Option<&SemanticType> {
        self.aggregate_types.get(alias)
    }

    pub fn take_allocations(&mut self) -> Vec<Allocation> {
        std::mem::take(&mut self.allocations)
    }

    pub fn render(&self, expr: &SqlExpr) -> String {
        expr.to_sql(self.dialect)
    }

    pub fn render_statement(&self, select: &SelectStatement) -> String {
        select.to_sql(self.dialect)
    }
}
