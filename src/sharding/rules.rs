// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Name-keyed weight sharding rules.
//!
//! A rule document is a flat map from tensor name to axis. Names may use `*`
//! in place of numeric path segments so one rule covers every layer:
//!
//! ```toml
//! "layers.*.attention.wq.weight" = 0
//! "layers.*.attention_norm.weight" = -1
//! ```
//!
//! `-1` (or `null` in JSON and YAML) means replicated. Axes past
//! [`MAX_AXIS`] are rejected.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ShardingError;

/// Highest tensor axis a rule may name.
pub const MAX_AXIS: usize = 7;

/// Sharding decision for one tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Option<i64>", into = "Option<i64>")]
pub enum AxisRule {
    Replicated,
    Axis(usize),
}

impl AxisRule {
    pub fn axis(&self) -> Option<usize> {
        match self {
            AxisRule::Replicated => None,
            AxisRule::Axis(axis) => Some(*axis),
        }
    }
}

impl TryFrom<Option<i64>> for AxisRule {
    type Error = ShardingError;

    fn try_from(raw: Option<i64>) -> Result<Self, Self::Error> {
        match raw {
            None | Some(-1) => Ok(AxisRule::Replicated),
            Some(raw) => match usize::try_from(raw) {
                Ok(axis) if axis <= MAX_AXIS => Ok(AxisRule::Axis(axis)),
                _ => Err(ShardingError::InvalidAxis(raw)),
            },
        }
    }
}

impl From<AxisRule> for Option<i64> {
    fn from(rule: AxisRule) -> Self {
        rule.axis().map(|axis| i64::try_from(axis).unwrap_or(i64::MAX))
    }
}

/// Replace every integer dotted segment with `*`.
///
/// `layers.3.attention.wq.weight` becomes `layers.*.attention.wq.weight`.
/// A segment counts as an integer when it is ASCII digits with an optional
/// leading `+` or `-`, so `layers.-1.w` also becomes `layers.*.w`.
pub fn normalize_name(name: &str) -> String {
    name.split('.')
        .map(|segment| if is_integer(segment) { "*" } else { segment })
        .collect::<Vec<_>>()
        .join(".")
}

fn is_integer(segment: &str) -> bool {
    let digits = segment
        .strip_prefix('-')
        .or_else(|| segment.strip_prefix('+'))
        .unwrap_or(segment);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Lookup table of sharding rules by (possibly wildcarded) tensor name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardingRules {
    rules: BTreeMap<String, AxisRule>,
}

impl ShardingRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(rules: BTreeMap<String, AxisRule>) -> Self {
        Self { rules }
    }

    pub fn from_toml_str(document: &str) -> Result<Self, ShardingError> {
        let rules = toml::from_str(document).map_err(|e| ShardingError::Parse(e.to_string()))?;
        Ok(Self { rules })
    }

    pub fn from_json_str(document: &str) -> Result<Self, ShardingError> {
        let rules =
            serde_json::from_str(document).map_err(|e| ShardingError::Parse(e.to_string()))?;
        Ok(Self { rules })
    }

    pub fn from_yaml_str(document: &str) -> Result<Self, ShardingError> {
        let rules =
            serde_yaml::from_str(document).map_err(|e| ShardingError::Parse(e.to_string()))?;
        Ok(Self { rules })
    }

    /// Load a `.toml`, `.json`, `.yaml` or `.yml` rule document.
    pub fn from_file(path: &Path) -> Result<Self, ShardingError> {
        let document = std::fs::read_to_string(path).map_err(|source| ShardingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&document),
            Some("json") => Self::from_json_str(&document),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&document),
            _ => Err(ShardingError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Check every rule names an axis no higher than [`MAX_AXIS`].
    ///
    /// Parsed documents are checked on load; this covers rules built in code.
    pub fn validate(&self) -> Result<(), ShardingError> {
        for rule in self.rules.values() {
            if let AxisRule::Axis(axis) = rule {
                if *axis > MAX_AXIS {
                    return Err(ShardingError::InvalidAxis(
                        i64::try_from(*axis).unwrap_or(i64::MAX),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn insert(&mut self, name: impl Into<String>, rule: AxisRule) {
        self.rules.insert(name.into(), rule);
    }

    /// Layer `other` on top; its entries win on conflict.
    pub fn merge(&mut self, other: &BTreeMap<String, AxisRule>) {
        for (name, rule) in other {
            self.rules.insert(name.clone(), *rule);
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Literal name first, then its wildcarded form.
    pub fn lookup(&self, name: &str) -> Option<AxisRule> {
        if let Some(rule) = self.rules.get(name) {
            return Some(*rule);
        }
        self.rules.get(&normalize_name(name)).copied()
    }

    pub fn resolve(&self, name: &str) -> Result<AxisRule, ShardingError> {
        self.lookup(name)
            .ok_or_else(|| ShardingError::MissingRule(name.to_string()))
    }
}
