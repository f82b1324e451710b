//! Centralized table alias naming utilities.
//!
//! **All** alias generation for joined tables and flatten pseudo-tables goes
//! through these functions so that the alias registry, the aggregation
//! builder and the explosion builder agree on spelling.
//!
//! ## Naming Convention
//! - Table aliases: lower-cased base table name, schema qualifier dropped.
//!   The first use of a base name is bare, later uses get `_{n}`.
//! - Flatten aliases: `{prefix}_{n}` with `n` counted per plan from 0.
//!
//! Examples:
//! - `PERSON_SCHEMA.PERSON_TABLE` → `"person_table"`, then `"person_table_1"`
//! - flatten prefix `ss_flatten`, counter 2 → `"ss_flatten_2"`

/// Derive the alias base name for a physical table.
///
/// # Examples
/// ```
/// use relplan::utils::alias_naming::table_base_name;
///
/// assert_eq!(table_base_name("PERSON_SCHEMA.PERSON_TABLE"), "person_table");
/// assert_eq!(table_base_name("FirmTable"), "firmtable");
/// assert_eq!(table_base_name("DB.\"My Table\""), "my_table");
/// ```
pub fn table_base_name(table: &str) -> String {
    let last = table.rsplit('.').next().unwrap_or(table);
    let cleaned: String = last
        .trim_matches('"')
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "t".to_string()
    } else {
        cleaned
    }
}

/// Generate the alias for the `counter`-th use of a base name.
///
/// Counter 0 is the bare base name.
///
/// ```
/// use relplan::utils::alias_naming::numbered_alias;
///
/// assert_eq!(numbered_alias("person_table", 0), "person_table");
/// assert_eq!(numbered_alias("person_table", 3), "person_table_3");
/// ```
pub fn numbered_alias(base: &str, counter: usize) -> String {
    if counter == 0 {
        base.to_string()
    } else {
        format!("{}_{}", base, counter)
    }
}

/// Generate a flatten alias.
///
/// ```
/// use relplan::utils::alias_naming::flatten_alias;
///
/// assert_eq!(flatten_alias("ss_flatten", 0), "ss_flatten_0");
/// ```
pub fn flatten_alias(prefix: &str, counter: usize) -> String {
    format!("{}_{}", prefix, counter)
}

/// Check whether an alias was produced by [`flatten_alias`] with `prefix`.
pub fn is_flatten_alias(alias: &str, prefix: &str) -> bool {
    alias
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('_'))
        .map(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_name_drops_schema() {
        assert_eq!(table_base_name("A.B.PERSON"), "person");
    }

    #[test]
    fn test_base_name_sanitizes() {
        assert_eq!(table_base_name("firm-table"), "firm_table");
        assert_eq!(table_base_name(""), "t");
    }

    #[test]
    fn test_flatten_alias_detection() {
        assert!(is_flatten_alias("ss_flatten_12", "ss_flatten"));
        assert!(!is_flatten_alias("ss_flatten_", "ss_flatten"));
        assert!(!is_flatten_alias("person_table_1", "ss_flatten"));
    }
}
