//! Human-readable plan explanation.
//!
//! ```text
//! Relational
//! (
//!   type = TDS[(First Name, String, VARCHAR(100), "")]
//!   resultColumns = [("First Name", VARCHAR(100))]
//!   sql = select "root".FIRSTNAME as "First Name" from PERSON_SCHEMA.PERSON_TABLE as "root"
//!   connection = RelationalDatabaseConnection(type = "Snowflake")
//! )
//! ```
//!
//! Session statements wrap the node in a block with a `finallyExecutionNodes`
//! section; allocations wrap it in a `Sequence`.

use std::fmt;

use super::{Allocation, ExecutionPlan, RelationalPlan, ResultColumn};
use crate::mapping_catalog::mapping_schema::DatabaseType;

const INDENT: &str = "  ";

fn tds_type(columns: &[ResultColumn]) -> String {
    let items: Vec<String> = columns
        .iter()
        .map(|c| {
            format!(
                "({}, {}, {}, \"\")",
                c.name, c.semantic_type, c.physical_type
            )
        })
        .collect();
    format!("TDS[{}]", items.join(", "))
}

fn result_columns(columns: &[ResultColumn]) -> String {
    let items: Vec<String> = columns
        .iter()
        .map(|c| {
            let declared = c
                .declared_type
                .as_ref()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "\"\"".to_string());
            format!("(\"{}\", {})", c.name, declared)
        })
        .collect();
    format!("[{}]", items.join(", "))
}

fn connection(database_type: DatabaseType) -> String {
    format!(
        "connection = RelationalDatabaseConnection(type = \"{}\")",
        database_type
    )
}

/// `Name ( body )` with the body indented one level
fn node(name: &str, body: Vec<String>) -> Vec<String> {
    let mut lines = Vec::with_capacity(body.len() + 3);
    lines.push(name.to_string());
    lines.push("(".to_string());
    lines.extend(body.into_iter().map(|l| format!("{}{}", INDENT, l)));
    lines.push(")".to_string());
    lines
}

/// Nested node list `( ... )`, one level deeper
fn children(nodes: Vec<Vec<String>>) -> Vec<String> {
    let mut lines = vec!["(".to_string()];
    for n in nodes {
        lines.extend(n.into_iter().map(|l| format!("{}{}", INDENT, l)));
    }
    lines.push(")".to_string());
    lines
}

fn statement_node(sql: &str, database_type: DatabaseType) -> Vec<String> {
    node(
        "SQL",
        vec![
            "type = Void".to_string(),
            "resultColumns = []".to_string(),
            format!("sql = {}", sql),
            connection(database_type),
        ],
    )
}

fn relational_node(plan: &RelationalPlan) -> Vec<String> {
    node(
        "Relational",
        vec![
            format!("type = {}", tds_type(&plan.result_schema)),
            format!("resultColumns = {}", result_columns(&plan.result_schema)),
            format!("sql = {}", plan.sql),
            connection(plan.connection),
        ],
    )
}

/// Relational node, wrapped in a block when session statements apply
fn relational_lines(plan: &RelationalPlan) -> Vec<String> {
    if plan.pre_execution.is_empty() && plan.post_execution.is_empty() {
        return relational_node(plan);
    }

    let mut steps: Vec<Vec<String>> = plan
        .pre_execution
        .iter()
        .map(|s| statement_node(s, plan.connection))
        .collect();
    steps.push(relational_node(plan));

    let mut body = vec![format!("type = {}", tds_type(&plan.result_schema))];
    body.extend(children(steps));
    if !plan.post_execution.is_empty() {
        body.push("finallyExecutionNodes = ".to_string());
        body.extend(children(
            plan.post_execution
                .iter()
                .map(|s| statement_node(s, plan.connection))
                .collect(),
        ));
    }
    node("RelationalBlockExecutionNode", body)
}

fn allocation_node(allocation: &Allocation) -> Vec<String> {
    node(
        "Allocation",
        vec![
            format!("type = {}", allocation.semantic_type),
            format!("name = {}", allocation.name),
            format!("value = {}", allocation.value),
        ],
    )
}

impl ExecutionPlan {
    pub fn explain_lines(&self) -> Vec<String> {
        match self {
            ExecutionPlan::Relational(plan) => relational_lines(plan),
            ExecutionPlan::Sequence {
                allocations,
                relational,
            } => {
                let mut steps: Vec<Vec<String>> =
                    allocations.iter().map(allocation_node).collect();
                steps.push(relational_lines(relational));

                let mut body = vec![format!("type = {}", tds_type(&relational.result_schema))];
                body.extend(children(steps));
                node("Sequence", body)
            }
        }
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.explain_lines() {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}
