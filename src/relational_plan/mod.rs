//! Executable output of a compilation.
//!
//! A [`RelationalPlan`] is one SQL statement with its typed result schema and
//! the session statements that bracket it. Plans that reference named runtime
//! constants are wrapped in an [`ExecutionPlan::Sequence`] whose allocations
//! bind every `${name}` placeholder before the statement runs.

pub mod explain;

use std::collections::BTreeSet;

use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::mapping_catalog::data_types::{PhysicalType, SemanticType};
use crate::mapping_catalog::mapping_schema::DatabaseType;
use crate::query_tree::LiteralValue;

lazy_static::lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex is valid");
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlanError {
    #[error("Placeholder `${{{name}}}` has no allocation")]
    UnboundPlaceholder { name: String },

    #[error("Allocation `{name}` is declared twice")]
    DuplicateAllocation { name: String },
}

/// One column of the tabular result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultColumn {
    pub name: String,
    pub semantic_type: SemanticType,
    /// Type of the emitted value
    pub physical_type: PhysicalType,
    /// Type declared on the mapped column, when the value is a plain column
    pub declared_type: Option<PhysicalType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationalPlan {
    pub result_schema: Vec<ResultColumn>,
    pub sql: String,
    pub connection: DatabaseType,
    pub pre_execution: Vec<String>,
    /// Run after the query whether or not it succeeded
    pub post_execution: Vec<String>,
}

impl RelationalPlan {
    /// Placeholder names referenced by the SQL, in order of first use.
    pub fn placeholders(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for capture in PLACEHOLDER.captures_iter(&self.sql) {
            let name = capture[1].to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

/// Runtime constant bound before the relational statement runs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    pub name: String,
    pub semantic_type: SemanticType,
    pub value: LiteralValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionPlan {
    Relational(RelationalPlan),
    Sequence {
        allocations: Vec<Allocation>,
        relational: RelationalPlan,
    },
}

impl ExecutionPlan {
    /// Wrap a plan with its allocations. Every placeholder must be bound.
    pub fn with_allocations(
        plan: RelationalPlan,
        allocations: Vec<Allocation>,
    ) -> Result<Self, PlanError> {
        let mut seen = BTreeSet::new();
        for allocation in &allocations {
            if !seen.insert(allocation.name.as_str()) {
                return Err(PlanError::DuplicateAllocation {
                    name: allocation.name.clone(),
                });
            }
        }
        for name in plan.placeholders() {
            if !seen.contains(name.as_str()) {
                return Err(PlanError::UnboundPlaceholder { name });
            }
        }

        if allocations.is_empty() {
            Ok(ExecutionPlan::Relational(plan))
        } else {
            Ok(ExecutionPlan::Sequence {
                allocations,
                relational: plan,
            })
        }
    }

    pub fn relational(&self) -> &RelationalPlan {
        match self {
            ExecutionPlan::Relational(plan) => plan,
            ExecutionPlan::Sequence { relational, .. } => relational,
        }
    }

    pub fn allocations(&self) -> &[Allocation] {
        match self {
            ExecutionPlan::Relational(_) => &[],
            ExecutionPlan::Sequence { allocations, .. } => allocations,
        }
    }

    pub fn sql(&self) -> &str {
        &self.relational().sql
    }

    /// Stable SHA-256 of the explained plan, for caller-side caching
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(sql: &str) -> RelationalPlan {
        RelationalPlan {
            result_schema: vec![ResultColumn {
                name: "First Name".into(),
                semantic_type: SemanticType::String,
                physical_type: PhysicalType::Varchar(Some(100)),
                declared_type: Some(PhysicalType::Varchar(Some(100))),
            }],
            sql: sql.into(),
            connection: DatabaseType::Snowflake,
            pre_execution: vec![],
            post_execution: vec![],
        }
    }

    #[test]
    fn test_placeholders_in_order() {
        let p = plan("select 1 where a = '${region}' and b = ${limit} and c = '${region}'");
        assert_eq!(p.placeholders(), vec!["region", "limit"]);
    }

    #[test]
    fn test_unbound_placeholder_rejected() {
        let err = ExecutionPlan::with_allocations(plan("select '${region}'"), vec![]).unwrap_err();
        assert_eq!(
            err,
            PlanError::UnboundPlaceholder {
                name: "region".into()
            }
        );
    }

    #[test]
    fn test_sequence_when_allocations_present() {
        let exec = ExecutionPlan::with_allocations(
            plan("select '${region}'"),
            vec![Allocation {
                name: "region".into(),
                semantic_type: SemanticType::String,
                value: LiteralValue::String("UK".into()),
            }],
        )
        .unwrap();
        assert!(matches!(exec, ExecutionPlan::Sequence { .. }));
        assert_eq!(exec.allocations().len(), 1);
        assert_eq!(exec.sql(), "select '${region}'");
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = ExecutionPlan::Relational(plan("select 1"));
        let b = ExecutionPlan::Relational(plan("select 1"));
        let c = ExecutionPlan::Relational(plan("select 2"));
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }
}
