//! Numbered lateral flatten pseudo-tables.
//!
//! Aliases are numbered plan-wide. A flatten is reused only for the exact
//! same input expression and element filter within the same select scope.

use std::collections::HashMap;

use crate::utils::alias_naming::flatten_alias;

#[derive(Debug)]
pub struct FlattenInjector {
    prefix: String,
    next: usize,
    /// (scope, rendered input, element filter) -> alias
    by_input: HashMap<(usize, String, Option<String>), String>,
}

impl FlattenInjector {
    pub fn new(prefix: impl Into<String>) -> Self {
        FlattenInjector {
            prefix: prefix.into(),
            next: 0,
            by_input: HashMap::new(),
        }
    }

    /// Alias flattening `rendered_input` in `scope`, and whether it is new.
    pub fn request(
        &mut self,
        scope: usize,
        rendered_input: &str,
        filter_key: Option<&str>,
    ) -> (String, bool) {
        let key = (
            scope,
            rendered_input.to_string(),
            filter_key.map(str::to_string),
        );
        if let Some(alias) = self.by_input.get(&key) {
            log::debug!("Reusing flatten '{}' for {}", alias, rendered_input);
            return (alias.clone(), false);
        }
        let alias = flatten_alias(&self.prefix, self.next);
        self.next += 1;
        log::debug!("Injecting flatten '{}' over {}", alias, rendered_input);
        self.by_input.insert(key, alias.clone());
        (alias, true)
    }

    pub fn count(&self) -> usize {
        self.next
    }
}
