//! JSON permutation variable definitions.
//!
//! Registers variables described by a JSON object of the form:
//!
//! ```json
//! {
//!   "SHADOWS": { "Type": "bool", "Default": true },
//!   "MSAA_SAMPLES": { "Type": "int", "Values": [1, 2, 4, 8], "Default": 4 },
//!   "TONEMAP": {
//!     "Type": "enum",
//!     "Values": [{ "OFF": 0 }, { "ACES": 1 }, { "REINHARD": 2 }],
//!     "Default": "ACES"
//!   }
//! }
//! ```
//!
//! Entries are processed independently: a broken definition is logged and
//! skipped, the rest still register, and the overall result reports the
//! failure.

use std::sync::Arc;

use serde_json::Value;

use crate::logger::Logger;
use crate::select::PermutationManager;
use crate::shader::file_cache::FileCache;
use crate::shader::file_locator::FileLocator;

/// Loading variable definitions failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DefinitionError {
    /// The definition file could not be located.
    FileNotFound,
    /// The text is not a JSON object.
    InvalidJson,
    /// One or more definitions were invalid or failed to register.
    InvalidDefinitions,
}

impl std::fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            DefinitionError::FileNotFound => "definition file not found",
            DefinitionError::InvalidJson => "definition text is not a JSON object",
            DefinitionError::InvalidDefinitions => "one or more definitions are invalid",
        };
        f.write_str(message)
    }
}

/// Registers permutation variables from JSON definition files.
pub struct VariableDefinitionLoader {
    logger: Arc<dyn Logger>,
}

impl VariableDefinitionLoader {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger }
    }

    /// Locates `path` through the cache and locator and registers every
    /// definition in the file.
    pub fn register_from_file(
        &self,
        manager: &mut PermutationManager,
        cache: &dyn FileCache,
        locator: &dyn FileLocator,
        path: &str,
    ) -> Result<(), DefinitionError> {
        let normalized = cache.normalize_path(path);
        let Some(resolved) = locator.find(cache, "", &normalized) else {
            self.logger.error(&format!(
                "variable definition file '{normalized}' could not be found"
            ));
            return Err(DefinitionError::FileNotFound);
        };

        let Some(content) = cache.content(&resolved) else {
            self.logger.error(&format!(
                "variable definition file '{resolved}' could not be read"
            ));
            return Err(DefinitionError::FileNotFound);
        };

        let result = self.register_from_str(manager, &content);
        match &result {
            Ok(()) => self.logger.info(&format!(
                "registered permutation variables from '{resolved}'"
            )),
            Err(_) => self.logger.error(&format!(
                "failed to register permutation variables from '{resolved}'"
            )),
        }
        result
    }

    /// Registers every definition in a JSON string.
    pub fn register_from_str(
        &self,
        manager: &mut PermutationManager,
        json: &str,
    ) -> Result<(), DefinitionError> {
        let root: Value = match serde_json::from_str(json) {
            Ok(value) => value,
            Err(error) => {
                self.logger
                    .error(&format!("variable definitions are not valid JSON: {error}"));
                return Err(DefinitionError::InvalidJson);
            }
        };
        let Some(definitions) = root.as_object() else {
            self.logger
                .error("variable definitions must be a JSON object");
            return Err(DefinitionError::InvalidJson);
        };

        // Keep registering past broken entries and report at the end.
        let mut failed = false;
        for (name, definition) in definitions {
            if self.register_definition(manager, name, definition).is_err() {
                failed = true;
            }
        }

        if failed {
            Err(DefinitionError::InvalidDefinitions)
        } else {
            Ok(())
        }
    }

    fn register_definition(
        &self,
        manager: &mut PermutationManager,
        name: &str,
        definition: &Value,
    ) -> Result<(), ()> {
        match definition.get("Type").and_then(Value::as_str) {
            Some("bool") => self.register_bool(manager, name, definition),
            Some("int") => self.register_int(manager, name, definition),
            Some("enum") => self.register_enum(manager, name, definition),
            Some(other) => {
                self.logger
                    .error(&format!("invalid type '{other}' for variable '{name}'"));
                Err(())
            }
            None => {
                self.logger
                    .error(&format!("missing type information for variable '{name}'"));
                Err(())
            }
        }
    }

    fn register_bool(
        &self,
        manager: &mut PermutationManager,
        name: &str,
        definition: &Value,
    ) -> Result<(), ()> {
        let default = match definition.get("Default") {
            Some(Value::Bool(value)) => Some(*value),
            Some(other) => {
                self.logger.error(&format!(
                    "invalid default value {other} for bool variable '{name}'"
                ));
                return Err(());
            }
            None => None,
        };

        manager.register_bool(name, default).map(|_| ()).map_err(|_| ())
    }

    fn register_int(
        &self,
        manager: &mut PermutationManager,
        name: &str,
        definition: &Value,
    ) -> Result<(), ()> {
        let mut allowed = Vec::new();
        if let Some(values) = definition.get("Values") {
            let Some(items) = values.as_array() else {
                self.logger.error(&format!(
                    "values of int variable '{name}' must be an array"
                ));
                return Err(());
            };
            for item in items {
                match self.int_value(item) {
                    Some(value) => allowed.push(value),
                    None => {
                        self.logger.error(&format!(
                            "invalid entry {item} in values of int variable '{name}'"
                        ));
                        return Err(());
                    }
                }
            }
        }

        let default = match definition.get("Default") {
            Some(value) => match self.int_value(value) {
                Some(default) => Some(default),
                None => {
                    self.logger.error(&format!(
                        "invalid default value {value} for int variable '{name}'"
                    ));
                    return Err(());
                }
            },
            None => None,
        };

        manager
            .register_int(name, &allowed, default)
            .map(|_| ())
            .map_err(|_| ())
    }

    fn register_enum(
        &self,
        manager: &mut PermutationManager,
        name: &str,
        definition: &Value,
    ) -> Result<(), ()> {
        let mut allowed: Vec<(String, i32)> = Vec::new();
        if let Some(values) = definition.get("Values") {
            let Some(items) = values.as_array() else {
                self.logger.error(&format!(
                    "values of enum variable '{name}' must be an array"
                ));
                return Err(());
            };
            for item in items {
                // Each entry is a single-key object: {"LABEL": INT}.
                let entry = item
                    .as_object()
                    .filter(|object| object.len() == 1)
                    .and_then(|object| {
                        let (label, value) = object.iter().next()?;
                        Some((label.clone(), self.int_value(value)?))
                    });
                match entry {
                    Some(pair) => allowed.push(pair),
                    None => {
                        self.logger.error(&format!(
                            "invalid entry {item} in values of enum variable '{name}'"
                        ));
                        return Err(());
                    }
                }
            }
        }

        let default = match definition.get("Default") {
            Some(Value::String(label)) => {
                match allowed.iter().find(|(allowed_label, _)| allowed_label == label) {
                    Some((_, value)) => Some(*value),
                    None => {
                        self.logger.error(&format!(
                            "default '{label}' is not in the values of enum variable '{name}'"
                        ));
                        return Err(());
                    }
                }
            }
            Some(other) => {
                self.logger.error(&format!(
                    "default of enum variable '{name}' must be a label string, got {other}"
                ));
                return Err(());
            }
            None => None,
        };

        let borrowed: Vec<(&str, i32)> = allowed
            .iter()
            .map(|(label, value)| (label.as_str(), *value))
            .collect();
        manager
            .register_enum(name, &borrowed, default)
            .map(|_| ())
            .map_err(|_| ())
    }

    fn int_value(&self, value: &Value) -> Option<i32> {
        value.as_i64().and_then(|wide| i32::try_from(wide).ok())
    }
}
