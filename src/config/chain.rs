//! An ordered sequence of per-scope config files. Position encodes priority:
//! later entries win when the same tool name appears more than once.

use anyhow::Result;

use crate::config::{ConfigFile, ToolConfig, Tools};
use crate::scope::Scope;

struct ChainItem {
    /// `None` marks a scope that was intentionally not loaded; such entries
    /// are skipped during merge and lookup rather than treated as errors.
    config: Option<ConfigFile>,
    scope: Scope,
}

#[derive(Default)]
pub struct ConfigChain {
    items: Vec<ChainItem>,
}

impl ConfigChain {
    pub fn new() -> ConfigChain {
        ConfigChain::default()
    }

    /// Appends a config; later additions take priority over earlier ones.
    pub fn add(&mut self, config: ConfigFile, scope: Scope) {
        self.items.push(ChainItem {
            config: Some(config),
            scope,
        });
    }

    /// Records a not-yet-loaded scope so positional priority stays intact.
    pub fn add_missing(&mut self, scope: Scope) {
        self.items.push(ChainItem {
            config: None,
            scope,
        });
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Merges all loaded configs by tool name. A tool present only in a
    /// lower-priority file survives into the result unless the same name is
    /// set again at higher priority.
    pub fn merge(&self) -> Tools {
        let mut merged = Tools::new();
        for item in &self.items {
            let Some(config) = &item.config else {
                continue;
            };
            for (name, tool) in config.tools.iter() {
                merged.set_with_attr(name.clone(), tool.version.clone(), tool.attr.clone());
            }
        }
        merged
    }

    /// Scans from highest to lowest priority. Absence is a normal outcome.
    pub fn get_tool(&self, name: &str) -> Option<(&ToolConfig, Scope)> {
        for item in self.items.iter().rev() {
            let Some(config) = &item.config else {
                continue;
            };
            if let Some(tool) = config.tools.get(name) {
                return Some((tool, item.scope));
            }
        }
        None
    }

    pub fn get_tool_version(&self, name: &str) -> Option<(&str, Scope)> {
        self.get_tool(name)
            .map(|(tool, scope)| (tool.version.as_str(), scope))
    }

    pub fn get_by_scope(&self, scope: Scope) -> Option<&ConfigFile> {
        self.items
            .iter()
            .find(|item| item.scope == scope)
            .and_then(|item| item.config.as_ref())
    }

    pub fn get_mut_by_scope(&mut self, scope: Scope) -> Option<&mut ConfigFile> {
        self.items
            .iter_mut()
            .find(|item| item.scope == scope)
            .and_then(|item| item.config.as_mut())
    }

    /// Saves every loaded config in chain order. There is no cross-file
    /// transaction: a failure mid-way leaves earlier files written and later
    /// ones untouched.
    pub fn save(&mut self) -> Result<()> {
        for item in &mut self.items {
            if let Some(config) = &mut item.config {
                config.save()?;
            }
        }
        Ok(())
    }
}
