use std::collections::HashMap;

use kbeauty_core::tool::ToolDescriptor;
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("duplicate tool name '{0}'")]
    DuplicateName(String),
    #[error("tool name must not be empty")]
    EmptyName,
}

/// Catalog backing both `tools/list` and the `tools/call` name check.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = ToolDescriptor>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::default();
        for descriptor in descriptors {
            if descriptor.name.trim().is_empty() {
                return Err(RegistryError::EmptyName);
            }
            if registry.index.contains_key(&descriptor.name) {
                return Err(RegistryError::DuplicateName(descriptor.name));
            }
            registry
                .index
                .insert(descriptor.name.clone(), registry.tools.len());
            registry.tools.push(descriptor);
        }
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&position| &self.tools[position])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|tool| tool.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn list_payload(&self) -> Value {
        json!({ "tools": self.tools })
    }
}
