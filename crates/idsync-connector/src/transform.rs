//! Attribute transformation engine.
//!
//! Runs an item's transformer chain over a value list in one direction.

use std::collections::HashMap;
use std::sync::Mutex;

use regex::Regex;
use tracing::warn;

use crate::mapping::{ItemTransformer, MappingDirection, Transform};

/// Applies [`Transform`]s to attribute values.
///
/// Compiled regular expressions are kept per pattern.
#[derive(Debug, Default)]
pub struct TransformEngine {
    regexes: Mutex<HashMap<String, Regex>>,
}

impl TransformEngine {
    /// Create a new transformation engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every transformer configured for `direction` over `values`.
    ///
    /// A transformer that fails on a value is logged and leaves the value
    /// untouched. `Default` transforms also fire on an empty value list.
    #[must_use]
    pub fn apply_chain(
        &self,
        transformers: &[ItemTransformer],
        direction: MappingDirection,
        values: Vec<String>,
    ) -> Vec<String> {
        transformers
            .iter()
            .filter(|t| t.direction.applies_to(direction))
            .fold(values, |values, transformer| {
                if values.is_empty() {
                    return match Self::default_of(&transformer.transform) {
                        Some(default) => vec![default],
                        None => values,
                    };
                }

                values
                    .into_iter()
                    .map(|value| {
                        self.apply_transform(&transformer.transform, &value)
                            .unwrap_or_else(|e| {
                                warn!(error = %e, "Transform failed, keeping original value");
                                value
                            })
                    })
                    .collect()
            })
    }

    /// Apply a transformation to a value.
    pub fn apply_transform(&self, transform: &Transform, value: &str) -> Result<String, String> {
        match transform {
            Transform::Lowercase => Ok(value.to_lowercase()),
            Transform::Uppercase => Ok(value.to_uppercase()),
            Transform::Trim => Ok(value.trim().to_string()),
            Transform::Replace { from, to } => Ok(value.replace(from, to)),
            Transform::Substring { start, end } => {
                let chars: Vec<char> = value.chars().collect();
                let start = (*start).min(chars.len());
                let end = end.map_or(chars.len(), |e| e.min(chars.len())).max(start);
                Ok(chars[start..end].iter().collect())
            }
            Transform::Regex { pattern, group } => self.capture(pattern, *group, value),
            Transform::Default { value: default } => Ok(if value.is_empty() {
                default.clone()
            } else {
                value.to_string()
            }),
            Transform::EmailFormat { domain } => Ok(if value.contains('@') {
                value.to_string()
            } else {
                format!("{value}{domain}")
            }),
            Transform::DnFormat { template } => Ok(template.replace("{value}", value)),
            Transform::Chain { transforms } => transforms
                .iter()
                .try_fold(value.to_string(), |current, t| self.apply_transform(t, &current)),
        }
    }

    fn capture(&self, pattern: &str, group: usize, value: &str) -> Result<String, String> {
        let mut regexes = self
            .regexes
            .lock()
            .map_err(|_| "regex cache poisoned".to_string())?;
        let re = match regexes.get(pattern) {
            Some(re) => re,
            None => {
                let re = Regex::new(pattern).map_err(|e| format!("Invalid regex: {e}"))?;
                regexes.entry(pattern.to_string()).or_insert(re)
            }
        };

        Ok(re
            .captures(value)
            .and_then(|caps| caps.get(group))
            .map_or_else(String::new, |m| m.as_str().to_string()))
    }

    fn default_of(transform: &Transform) -> Option<String> {
        match transform {
            Transform::Default { value } => Some(value.clone()),
            Transform::Chain { transforms } => transforms.iter().find_map(Self::default_of),
            _ => None,
        }
    }
}
