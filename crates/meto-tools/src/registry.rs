// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use meto_model::ToolSchema;

use crate::{Allowlist, Tool};

/// Registry of tool definitions.
///
/// Cloning is cheap (the tools themselves are shared), which lets every agent
/// loop extend the shared base set with its own session-bound tools.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Look up `name` as seen by an agent restricted to `allowlist`.
    /// Disallowed tools are indistinguishable from unknown ones.
    pub fn resolve(&self, name: &str, allowlist: &Allowlist) -> Option<Arc<dyn Tool>> {
        if !allowlist.allows(name) {
            return None;
        }
        self.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Schemas of the tools visible through `allowlist`, sorted by name.
    pub fn schemas_for(&self, allowlist: &Allowlist) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .filter(|t| allowlist.allows(t.name()))
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Names visible through `allowlist`, sorted.
    pub fn names_for(&self, allowlist: &Allowlist) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .keys()
            .filter(|n| allowlist.allows(n))
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn names(&self) -> Vec<String> {
        self.names_for(&Allowlist::All)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::{ToolCall, ToolOutput, ToolPermission};

    struct Named(&'static str);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "test tool"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object", "properties": {} })
        }
        fn permission(&self) -> ToolPermission {
            ToolPermission::Never
        }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, self.0)
        }
    }

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(Named("shell"));
        r.register(Named("read_file"));
        r.register(Named("list_dir"));
        r
    }

    #[test]
    fn schemas_are_sorted_and_filtered() {
        let r = registry();
        let names: Vec<String> = r
            .schemas_for(&Allowlist::only(["shell", "list_dir"]))
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["list_dir", "shell"]);
    }

    #[test]
    fn resolve_hides_disallowed_tools() {
        let r = registry();
        let only_read = Allowlist::only(["read_file"]);
        assert!(r.resolve("read_file", &only_read).is_some());
        assert!(r.resolve("shell", &only_read).is_none());
        assert!(r.resolve("missing", &Allowlist::All).is_none());
    }

    #[test]
    fn clone_shares_definitions_but_not_registrations() {
        let base = registry();
        let mut extended = base.clone();
        extended.register(Named("manage_todos"));
        assert!(extended.contains("manage_todos"));
        assert!(!base.contains("manage_todos"));
        assert_eq!(base.names(), vec!["list_dir", "read_file", "shell"]);
    }
}
