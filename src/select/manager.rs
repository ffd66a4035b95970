//! Variable registration, bit allocation, and state finalization.
//!
//! A [`PermutationManager`] is populated once during initialization and then
//! frozen: registration is single-threaded, lookups and
//! [`finalize_state`](PermutationManager::finalize_state) are pure reads and
//! may be shared across threads.
//!
//! # Bit allocation
//!
//! Variables are packed into 64-bit blocks so that no variable crosses a
//! block boundary. Partially used blocks are kept sorted by remaining bits
//! (then block index), and the smallest fit wins. Tight fits keep variables
//! densely packed, which shrinks the block window a shader's used set spans
//! and with it the merge loop.

use std::collections::HashMap;
use std::sync::Arc;

use crate::hash::{selection_hash, SelectionHashFn};
use crate::logger::{FacadeLogger, Logger};
use crate::select::state::{for_each_variable, merge_internal, VariableSelection, VariableSet, VariableState};
use crate::select::variable::{ManagerId, PermutationVariable, VariableKind};
use crate::stdx::{low_bits, BITS_PER_BLOCK};

/// Registration failed; the previously registered entry, if any, is kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterError {
    /// Int and Enum variables need a non-empty allowed-value list.
    EmptyAllowedValues,
    /// A variable with this name exists with a different kind.
    KindConflict,
    /// A variable with this name exists with a different allowed list.
    AllowedValuesConflict,
    /// A variable with this name exists with a different default value.
    DefaultConflict,
    /// The default value does not decode to an allowed value.
    InvalidDefault,
}

impl std::fmt::Display for RegisterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            RegisterError::EmptyAllowedValues => "a set of allowed values is required",
            RegisterError::KindConflict => "variable exists with a different kind",
            RegisterError::AllowedValuesConflict => "variable exists with different allowed values",
            RegisterError::DefaultConflict => "variable exists with a different default value",
            RegisterError::InvalidDefault => "default value is not an allowed value",
        };
        f.write_str(message)
    }
}

/// Finalization found used variables with neither a value nor a default.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalizeError {
    /// The missing variables from the first deficient block, each reported
    /// once.
    pub missing: Vec<String>,
}

impl std::fmt::Display for FinalizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unset permutation variables: {}", self.missing.join(", "))
    }
}

/// Capabilities handed to a manager at construction time.
#[derive(Clone)]
pub struct ManagerOptions {
    /// Sink for registration and finalization diagnostics.
    pub logger: Arc<dyn Logger>,
    /// Fingerprint function for finalized selections.
    pub hasher: SelectionHashFn,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            logger: Arc::new(FacadeLogger),
            hasher: selection_hash,
        }
    }
}

/// A block with free bits left, tracked during registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct BlockAllocation {
    // Field order gives the smallest-fit-first sort: remaining bits, then
    // block index.
    remaining_bits: u32,
    block_index: u32,
}

/// Registry of permutation variables with packed bit ranges.
pub struct PermutationManager {
    id: ManagerId,
    variables: Vec<PermutationVariable>,
    by_name: HashMap<String, usize>,
    by_start_bit: Vec<Option<usize>>,
    allocations: Vec<BlockAllocation>,
    next_block: u32,
    default_state: VariableState,
    logger: Arc<dyn Logger>,
    hasher: SelectionHashFn,
}

impl PermutationManager {
    pub fn new(options: ManagerOptions) -> Self {
        Self {
            id: ManagerId::next(),
            variables: Vec::new(),
            by_name: HashMap::new(),
            by_start_bit: Vec::new(),
            allocations: Vec::new(),
            next_block: 0,
            default_state: VariableState::new(),
            logger: options.logger,
            hasher: options.hasher,
        }
    }

    /// This manager's opaque identity.
    pub fn id(&self) -> ManagerId {
        self.id
    }

    /// Registers a one-bit bool variable.
    pub fn register_bool(
        &mut self,
        name: &str,
        default: Option<bool>,
    ) -> Result<&PermutationVariable, RegisterError> {
        self.register_internal(
            name,
            VariableKind::Bool,
            Vec::new(),
            default.map(i32::from),
        )
    }

    /// Registers an int variable over a closed value set. Labels are the
    /// decimal strings of the values.
    pub fn register_int(
        &mut self,
        name: &str,
        allowed: &[i32],
        default: Option<i32>,
    ) -> Result<&PermutationVariable, RegisterError> {
        let allowed = allowed
            .iter()
            .map(|value| (value.to_string(), *value))
            .collect();
        self.register_internal(name, VariableKind::Int, allowed, default)
    }

    /// Registers an enum variable with user-supplied labels. `default` is
    /// the integer value, not the label.
    pub fn register_enum(
        &mut self,
        name: &str,
        allowed: &[(&str, i32)],
        default: Option<i32>,
    ) -> Result<&PermutationVariable, RegisterError> {
        let allowed = allowed
            .iter()
            .map(|(label, value)| (label.to_string(), *value))
            .collect();
        self.register_internal(name, VariableKind::Enum, allowed, default)
    }

    /// Looks up a variable by name.
    pub fn variable(&self, name: &str) -> Option<&PermutationVariable> {
        self.by_name.get(name).map(|&index| &self.variables[index])
    }

    /// Looks up a variable by the first bit of its packed range.
    pub fn variable_at_bit(&self, start_bit: u32) -> Option<&PermutationVariable> {
        self.by_start_bit
            .get(start_bit as usize)
            .copied()
            .flatten()
            .map(|index| &self.variables[index])
    }

    /// Number of registered variables.
    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// Merges the registered defaults with `state`, restricted to `used`,
    /// and fingerprints the result.
    ///
    /// Fails when a used variable has neither a state value nor a default;
    /// every such variable (from the first deficient block) is logged once
    /// and listed in the error, and `out` is left cleared.
    pub fn finalize_state(
        &self,
        state: &VariableState,
        used: &VariableSet,
        out: &mut VariableSelection,
    ) -> Result<(), FinalizeError> {
        out.clear();

        let mut missing = Vec::new();
        let mut report_missing = |base_bit: u32, missing_bits: u64| {
            let mut bits = missing_bits;
            while bits > 0 {
                let offset = bits.trailing_zeros();
                let variable = self
                    .variable_at_bit(base_bit + offset)
                    .expect("used-set bit does not map to a registered variable");

                self.logger.error(&format!(
                    "permutation variable '{}' is not set in the state and has no default value",
                    variable.name()
                ));
                missing.push(variable.name().to_string());

                bits &= !(low_bits(variable.num_bits() as u32) << offset);
            }
        };

        let merged = merge_internal(
            &self.default_state,
            state,
            used,
            &mut out.values,
            &mut out.values_mask,
            Some(&mut report_missing),
        );

        if merged.is_err() {
            out.clear();
            return Err(FinalizeError { missing });
        }

        out.manager = Some(self.id);
        out.hash = out.values.hash_with(self.hasher);
        Ok(())
    }

    /// Visits every registered variable that has a default, with its default
    /// value decoded.
    pub fn iterate_defaults(&self, mut callback: impl FnMut(&PermutationVariable, i32, &str)) {
        for_each_variable(self, &self.default_state.values_mask, |variable| {
            let encoded = self
                .default_state
                .values
                .bits(variable.start_bit(), variable.num_bits() as u32) as u32;
            callback(variable, variable.value_int(encoded), variable.value_label(encoded));
        });
    }

    fn register_internal(
        &mut self,
        name: &str,
        kind: VariableKind,
        allowed: Vec<(String, i32)>,
        default: Option<i32>,
    ) -> Result<&PermutationVariable, RegisterError> {
        if kind != VariableKind::Bool && allowed.is_empty() {
            self.logger.error(&format!(
                "a set of allowed values must be specified for variable '{name}'"
            ));
            return Err(RegisterError::EmptyAllowedValues);
        }

        if let Some(&existing_index) = self.by_name.get(name) {
            let existing = &self.variables[existing_index];

            if existing.kind() != kind {
                self.logger.error(&format!(
                    "variable '{}' of type '{}' already exists as '{}'",
                    name,
                    kind.name(),
                    existing.kind().name()
                ));
                return Err(RegisterError::KindConflict);
            }

            if existing.allowed_values() != allowed.as_slice() {
                self.logger.error(&format!(
                    "variable '{name}' already exists with different allowed values"
                ));
                return Err(RegisterError::AllowedValuesConflict);
            }

            if let Some(default) = default {
                if existing.default_value() != Some(default) {
                    self.logger.error(&format!(
                        "variable '{}' already exists with default value {:?}, got {}",
                        name,
                        existing.default_value(),
                        default
                    ));
                    return Err(RegisterError::DefaultConflict);
                }
            }

            return Ok(&self.variables[existing_index]);
        }

        let num_bits = if kind == VariableKind::Bool {
            1
        } else {
            bits_for(allowed.len())
        };

        let mut variable = PermutationVariable {
            name: name.to_string(),
            start_bit: 0,
            num_bits,
            kind,
            default_value: default,
            allowed,
            manager: self.id,
        };

        // Validate the default before committing any bit range.
        let encoded_default = match default {
            Some(default) => match variable.encode_int(default) {
                Ok(encoded) => Some(encoded),
                Err(_) => {
                    self.logger.error(&format!(
                        "{default} is not a valid default value for permutation variable '{name}'"
                    ));
                    return Err(RegisterError::InvalidDefault);
                }
            },
            None => None,
        };

        variable.start_bit = self.free_bit_index(num_bits as u32);

        if let Some(encoded) = encoded_default {
            self.default_state.set_encoded(&variable, encoded);
        }

        let start_bit = variable.start_bit as usize;
        let index = self.variables.len();
        self.by_name.insert(name.to_string(), index);
        if self.by_start_bit.len() <= start_bit {
            self.by_start_bit.resize(start_bit + 1, None);
        }
        self.by_start_bit[start_bit] = Some(index);
        self.variables.push(variable);

        Ok(&self.variables[index])
    }

    /// Allocates `num_bits` contiguous bits that do not cross a block
    /// boundary, preferring the partially used block with the tightest fit.
    fn free_bit_index(&mut self, num_bits: u32) -> u32 {
        debug_assert!(num_bits >= 1 && num_bits <= BITS_PER_BLOCK);

        let mut bit_index = None;
        for slot in 0..self.allocations.len() {
            let allocation = &mut self.allocations[slot];
            if allocation.remaining_bits >= num_bits {
                bit_index = Some(
                    (allocation.block_index + 1) * BITS_PER_BLOCK - allocation.remaining_bits,
                );
                allocation.remaining_bits -= num_bits;
                if allocation.remaining_bits == 0 {
                    self.allocations.remove(slot);
                }
                break;
            }
        }

        let bit_index = match bit_index {
            Some(index) => index,
            None => {
                let index = self.next_block * BITS_PER_BLOCK;
                self.allocations.push(BlockAllocation {
                    remaining_bits: BITS_PER_BLOCK - num_bits,
                    block_index: self.next_block,
                });
                self.next_block += 1;
                index
            }
        };

        self.allocations.sort_unstable();
        bit_index
    }
}

/// Bits needed to encode an index into a list of `len` values, at least 1.
fn bits_for(len: usize) -> u16 {
    (len.next_power_of_two().trailing_zeros() as u16).max(1)
}
