//! Join path → alias registry.
//!
//! Every table or derived table joined into a plan is identified by the
//! structural path that reached it. Equal paths share one alias; distinct
//! paths to the same table get distinct aliases, numbered per base name.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use super::errors::CompileError;
use crate::query_tree::TemporalArgument;
use crate::utils::alias_naming::numbered_alias;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStepKind {
    /// Driving table of a select scope
    Root,
    Association,
    Explosion,
    Aggregation,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JoinStep {
    pub kind: JoinStepKind,
    /// Rendered origin: the parent alias, or the JSON element expression
    pub origin: String,
    pub class: String,
    /// Property name; for aggregations the canonical aggregate expression
    pub property: String,
    pub dates: Option<TemporalArgument>,
    /// Canonical form of a collection filter pushed into the join
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JoinPath {
    /// Select scope the path lives in
    pub scope: usize,
    pub steps: Vec<JoinStep>,
}

impl JoinPath {
    pub fn root(scope: usize, class: &str, dates: Option<TemporalArgument>) -> Self {
        JoinPath {
            scope,
            steps: vec![JoinStep {
                kind: JoinStepKind::Root,
                origin: String::new(),
                class: class.to_string(),
                property: String::new(),
                dates,
                filter: None,
            }],
        }
    }

    pub fn extend(&self, step: JoinStep) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        JoinPath {
            scope: self.scope,
            steps,
        }
    }
}

impl fmt::Display for JoinPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope {}:", self.scope)?;
        for step in &self.steps {
            match step.kind {
                JoinStepKind::Root => write!(f, " {}", step.class)?,
                _ => write!(f, " -> {}.{}", step.class, step.property)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct AliasRegistry {
    by_path: HashMap<JoinPath, String>,
    by_alias: HashMap<String, JoinPath>,
    used: HashSet<String>,
}

impl AliasRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, path: &JoinPath) -> Option<&str> {
        self.by_path.get(path).map(|s| s.as_str())
    }

    /// Alias for `path`, reusing the existing one when the path was seen.
    ///
    /// Returns the alias and whether it was newly allocated.
    pub fn allocate(&mut self, path: &JoinPath, base: &str) -> Result<(String, bool), CompileError> {
        if let Some(alias) = self.by_path.get(path) {
            log::debug!("Reusing alias '{}' for {}", alias, path);
            return Ok((alias.clone(), false));
        }

        let mut counter = if self.used.contains(base) { 1 } else { 0 };
        let mut alias = numbered_alias(base, counter);
        while self.used.contains(&alias) {
            counter += 1;
            alias = numbered_alias(base, counter);
        }

        self.bind(path, &alias)?;
        log::debug!("Allocated alias '{}' for {}", alias, path);
        Ok((alias, true))
    }

    /// Bind a fixed alias (the root) to a path.
    pub fn bind(&mut self, path: &JoinPath, alias: &str) -> Result<(), CompileError> {
        if let Some(existing) = self.by_alias.get(alias) {
            if existing != path {
                return Err(CompileError::JoinPathCollision {
                    alias: alias.to_string(),
                    existing: existing.to_string(),
                    claimed: path.to_string(),
                });
            }
            return Ok(());
        }
        self.used.insert(alias.to_string());
        self.by_alias.insert(alias.to_string(), path.clone());
        self.by_path.insert(path.clone(), alias.to_string());
        Ok(())
    }

    /// Mark a name as taken without binding a path to it.
    pub fn reserve(&mut self, name: &str) {
        self.used.insert(name.to_string());
    }
}
