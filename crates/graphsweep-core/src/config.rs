//! Run configuration
//!
//! Read once when a run starts. Every field has a default so an empty TOML
//! document is a valid configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::addon::{NamespacePattern, SettingValue};
use crate::errors::{Result, SweepError};

/// How the collecting phase obtains the object graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStrategy {
    /// Walk the heap independently
    #[default]
    Full,
    /// Reuse the edges observed during the backup snapshot's save walk
    Inline,
}

/// Per-addon toggles and setting overrides, keyed by addon id in [`RunConfig`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddonConfig {
    pub enabled: bool,
    pub settings: BTreeMap<String, SettingValue>,
}

impl Default for AddonConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            settings: BTreeMap::new(),
        }
    }
}

/// Objects no longer attached to anything meaningful
///
/// Matches objects of `type_name` whose `active_field` is false and whose
/// `anchor_fields` are all null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachedRule {
    pub type_name: String,
    pub active_field: String,
    #[serde(default)]
    pub anchor_fields: Vec<String>,
}

/// Objects referenced only by a registry container
///
/// The container is found in `container_field` of the object registered
/// under `owner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbandonedRule {
    pub type_name: String,
    pub owner: String,
    pub container_field: String,
}

/// Rules of the built-in catch-all addon
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultAddonRules {
    pub detached: Vec<DetachedRule>,
    pub abandoned: Vec<AbandonedRule>,
}

/// Configuration of one cleanup run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Block removals nobody has authority over instead of asking the catch-all
    pub compatibility_mode: bool,
    pub collection_strategy: CollectionStrategy,
    /// Ticks a phase announcement is held before heavy work starts
    pub message_delay_ticks: u32,
    /// Middle part of snapshot names, usually the world or save name
    pub save_label: String,
    /// Namespaces of infrastructure types that carry no removal authority
    pub wrapper_namespaces: Vec<String>,
    pub addons: BTreeMap<String, AddonConfig>,
    pub default_addon: DefaultAddonRules,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            compatibility_mode: false,
            collection_strategy: CollectionStrategy::Full,
            message_delay_ticks: 3,
            save_label: "world".to_string(),
            wrapper_namespaces: vec!["Sys".to_string(), "Sys.*".to_string()],
            addons: BTreeMap::new(),
            default_addon: DefaultAddonRules::default(),
        }
    }
}

impl RunConfig {
    /// Parse and validate a TOML document
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for malformed TOML or values that fail
    /// validation, and `InvalidPattern` for a bad wrapper namespace.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: RunConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read, otherwise as [`Self::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| SweepError::Io {
            op: format!("read config {}", path.display()),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` or `InvalidPattern` on the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.save_label.trim().is_empty() {
            return Err(SweepError::InvalidConfig {
                reason: "save_label must not be empty".to_string(),
            });
        }
        if self
            .save_label
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':'))
        {
            return Err(SweepError::InvalidConfig {
                reason: format!("save_label '{}' contains a path separator", self.save_label),
            });
        }
        self.wrapper_patterns()?;
        Ok(())
    }

    /// Compiled wrapper namespace patterns
    ///
    /// # Errors
    ///
    /// Returns `InvalidPattern` for the first pattern that does not compile.
    pub fn wrapper_patterns(&self) -> Result<Vec<NamespacePattern>> {
        NamespacePattern::compile_all(&self.wrapper_namespaces)
    }

    pub fn is_addon_enabled(&self, addon_id: &str) -> bool {
        self.addons.get(addon_id).map_or(true, |c| c.enabled)
    }
}
