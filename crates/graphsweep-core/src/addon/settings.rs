//! Typed addon settings and their per-run resolved values

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SweepError};

/// Value type, default and bounds of a setting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettingKind {
    Bool { default: bool },
    Int { default: i64, min: i64, max: i64 },
    Float { default: f64, min: f64, max: f64 },
    Str { default: String },
}

impl SettingKind {
    fn type_name(&self) -> &'static str {
        match self {
            SettingKind::Bool { .. } => "bool",
            SettingKind::Int { .. } => "int",
            SettingKind::Float { .. } => "float",
            SettingKind::Str { .. } => "string",
        }
    }

    fn default_value(&self) -> SettingValue {
        match self {
            SettingKind::Bool { default } => SettingValue::Bool(*default),
            SettingKind::Int { default, .. } => SettingValue::Int(*default),
            SettingKind::Float { default, .. } => SettingValue::Float(*default),
            SettingKind::Str { default } => SettingValue::Str(default.clone()),
        }
    }
}

/// Declared setting of an addon, as shown to the host's settings UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingDef {
    pub id: String,
    pub name: String,
    pub hint: String,
    pub order: i32,
    pub kind: SettingKind,
}

impl SettingDef {
    pub fn bool(id: &str, name: &str, hint: &str, default: bool) -> Self {
        Self::with_kind(id, name, hint, SettingKind::Bool { default })
    }

    pub fn int(id: &str, name: &str, hint: &str, default: i64, min: i64, max: i64) -> Self {
        Self::with_kind(id, name, hint, SettingKind::Int { default, min, max })
    }

    pub fn float(id: &str, name: &str, hint: &str, default: f64, min: f64, max: f64) -> Self {
        Self::with_kind(id, name, hint, SettingKind::Float { default, min, max })
    }

    pub fn string(id: &str, name: &str, hint: &str, default: &str) -> Self {
        Self::with_kind(
            id,
            name,
            hint,
            SettingKind::Str {
                default: default.to_string(),
            },
        )
    }

    /// Display order within the addon's settings group
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    fn with_kind(id: &str, name: &str, hint: &str, kind: SettingKind) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            hint: hint.to_string(),
            order: 0,
            kind,
        }
    }
}

/// A concrete setting value, as found in run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Settings of one addon, resolved once when a run starts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingValues {
    addon_id: String,
    values: BTreeMap<String, SettingValue>,
}

impl SettingValues {
    /// Overlay configured values on the declared defaults
    ///
    /// Numeric values are clamped into the declared bounds; integers are
    /// accepted for float settings.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSetting` for an override the addon does not declare,
    /// or `SettingTypeMismatch` when the override has the wrong type.
    pub fn resolve(
        addon_id: &str,
        defs: &[SettingDef],
        overrides: &BTreeMap<String, SettingValue>,
    ) -> Result<Self> {
        let mut values: BTreeMap<String, SettingValue> = defs
            .iter()
            .map(|d| (d.id.clone(), d.kind.default_value()))
            .collect();

        for (id, raw) in overrides {
            let def = defs
                .iter()
                .find(|d| &d.id == id)
                .ok_or_else(|| SweepError::UnknownSetting {
                    addon_id: addon_id.to_string(),
                    setting_id: id.clone(),
                })?;

            let value = match (&def.kind, raw) {
                (SettingKind::Bool { .. }, SettingValue::Bool(b)) => SettingValue::Bool(*b),
                (SettingKind::Int { min, max, .. }, SettingValue::Int(i)) => {
                    SettingValue::Int((*i).clamp(*min, *max))
                }
                (SettingKind::Float { min, max, .. }, SettingValue::Float(f)) => {
                    SettingValue::Float(f.clamp(*min, *max))
                }
                (SettingKind::Float { min, max, .. }, SettingValue::Int(i)) => {
                    SettingValue::Float((*i as f64).clamp(*min, *max))
                }
                (SettingKind::Str { .. }, SettingValue::Str(s)) => SettingValue::Str(s.clone()),
                (kind, _) => {
                    return Err(SweepError::SettingTypeMismatch {
                        addon_id: addon_id.to_string(),
                        setting_id: id.clone(),
                        expected: kind.type_name().to_string(),
                    })
                }
            };
            values.insert(id.clone(), value);
        }

        Ok(Self {
            addon_id: addon_id.to_string(),
            values,
        })
    }

    pub fn addon_id(&self) -> &str {
        &self.addon_id
    }

    pub fn get(&self, id: &str) -> Option<&SettingValue> {
        self.values.get(id)
    }

    /// Read a boolean setting
    ///
    /// # Errors
    ///
    /// Returns `UnknownSetting` or `SettingTypeMismatch`.
    pub fn get_bool(&self, id: &str) -> Result<bool> {
        match self.lookup(id)? {
            SettingValue::Bool(b) => Ok(*b),
            _ => Err(self.mismatch(id, "bool")),
        }
    }

    /// Read an integer setting
    ///
    /// # Errors
    ///
    /// Returns `UnknownSetting` or `SettingTypeMismatch`.
    pub fn get_int(&self, id: &str) -> Result<i64> {
        match self.lookup(id)? {
            SettingValue::Int(i) => Ok(*i),
            _ => Err(self.mismatch(id, "int")),
        }
    }

    /// Read a float setting
    ///
    /// # Errors
    ///
    /// Returns `UnknownSetting` or `SettingTypeMismatch`.
    pub fn get_float(&self, id: &str) -> Result<f64> {
        match self.lookup(id)? {
            SettingValue::Float(f) => Ok(*f),
            _ => Err(self.mismatch(id, "float")),
        }
    }

    /// Read a string setting
    ///
    /// # Errors
    ///
    /// Returns `UnknownSetting` or `SettingTypeMismatch`.
    pub fn get_str(&self, id: &str) -> Result<&str> {
        match self.lookup(id)? {
            SettingValue::Str(s) => Ok(s),
            _ => Err(self.mismatch(id, "string")),
        }
    }

    /// Boolean setting, or `fallback` when absent or mistyped
    pub fn flag(&self, id: &str, fallback: bool) -> bool {
        self.get_bool(id).unwrap_or(fallback)
    }

    fn lookup(&self, id: &str) -> Result<&SettingValue> {
        self.values.get(id).ok_or_else(|| SweepError::UnknownSetting {
            addon_id: self.addon_id.clone(),
            setting_id: id.to_string(),
        })
    }

    fn mismatch(&self, id: &str, expected: &str) -> SweepError {
        SweepError::SettingTypeMismatch {
            addon_id: self.addon_id.clone(),
            setting_id: id.to_string(),
            expected: expected.to_string(),
        }
    }
}
