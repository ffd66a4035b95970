//! Bit-packed views over the permutation variable space.
//!
//! Three containers share one block layout:
//!
//! - [`VariableSet`]: which variables a shader cares about (a mask).
//! - [`VariableState`]: a partial assignment (values plus a set-mask).
//! - [`VariableSelection`]: a finalized, used-set-restricted assignment
//!   with a stable fingerprint, used as a cache key.
//!
//! Merging combines two states block by block under a used-set mask, so the
//! cost is proportional to the blocks the shader actually spans rather than
//! the whole registered variable space.

use crate::logger::Logger;
use crate::select::manager::PermutationManager;
use crate::select::variable::{ManagerId, PermutationVariable, ValueError, VariableKind};
use crate::stdx::{low_bits, BitSet, Block, BITS_PER_BLOCK};

/// Required bits were unset during a merge with a missing-values observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct MissingValues;

/// Walks every variable whose mask bits are set, in ascending bit order.
///
/// Each variable is visited exactly once: after the callback its full
/// `num_bits`-wide mask is cleared from the working copy of the block before
/// the scan continues.
pub(crate) fn for_each_variable(
    manager: &PermutationManager,
    mask: &BitSet,
    mut callback: impl FnMut(&PermutationVariable),
) {
    let mut bit_base = mask.block_start() as u32 * BITS_PER_BLOCK;

    for &stored in mask.blocks() {
        let mut block = stored;
        while block > 0 {
            let offset = block.trailing_zeros();
            let variable = manager
                .variable_at_bit(bit_base + offset)
                .expect("mask bit does not map to a registered variable");

            callback(variable);

            block &= !(low_bits(variable.num_bits() as u32) << offset);
        }

        bit_base += BITS_PER_BLOCK;
    }
}

/// Membership mask: the variables a particular shader may permute over.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VariableSet {
    pub(crate) manager: Option<ManagerId>,
    pub(crate) mask: BitSet,
}

impl VariableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable to the set. The first added variable decides which
    /// manager the set belongs to; mixing managers is a programmer error.
    pub fn add(&mut self, variable: &PermutationVariable) {
        assert!(
            self.manager.is_none() || self.manager == Some(variable.manager_id()),
            "variable belongs to a different manager"
        );
        self.manager = Some(variable.manager_id());
        self.mask
            .set_ones(variable.start_bit(), variable.num_bits() as u32);
    }

    /// Visits the member variables in ascending bit order.
    pub fn iterate(&self, manager: &PermutationManager, callback: impl FnMut(&PermutationVariable)) {
        if let Some(id) = self.manager {
            assert_eq!(id, manager.id(), "set iterated with a different manager");
            for_each_variable(manager, &self.mask, callback);
        }
    }

    /// Writes the member variable names to the logger.
    pub fn dump_to_log(&self, manager: &PermutationManager, logger: &dyn Logger) {
        self.iterate(manager, |variable| logger.info(variable.name()));
    }

    pub fn clear(&mut self) {
        self.manager = None;
        self.mask.clear();
    }
}

/// A partial assignment of permutation variables.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VariableState {
    pub(crate) manager: Option<ManagerId>,
    pub(crate) values: BitSet,
    pub(crate) values_mask: BitSet,
}

impl VariableState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns a bool variable.
    pub fn set_bool(
        &mut self,
        variable: &PermutationVariable,
        value: bool,
    ) -> Result<(), ValueError> {
        if variable.kind() != VariableKind::Bool {
            return Err(ValueError::KindMismatch);
        }
        self.set_encoded(variable, value as u32);
        Ok(())
    }

    /// Assigns an int or enum variable by integer value.
    pub fn set_int(&mut self, variable: &PermutationVariable, value: i32) -> Result<(), ValueError> {
        if variable.kind() != VariableKind::Int && variable.kind() != VariableKind::Enum {
            return Err(ValueError::KindMismatch);
        }
        let encoded = variable.encode_int(value)?;
        self.set_encoded(variable, encoded);
        Ok(())
    }

    /// Assigns any variable by its label (`"TRUE"`, `"VAL3"`, `"8"`, …).
    pub fn set_label(
        &mut self,
        variable: &PermutationVariable,
        label: &str,
    ) -> Result<(), ValueError> {
        let encoded = variable.encode_label(label)?;
        self.set_encoded(variable, encoded);
        Ok(())
    }

    pub(crate) fn set_encoded(&mut self, variable: &PermutationVariable, encoded: u32) {
        assert!(
            self.manager.is_none() || self.manager == Some(variable.manager_id()),
            "variable belongs to a different manager"
        );
        self.manager = Some(variable.manager_id());

        self.values.set_bits(
            variable.start_bit(),
            variable.num_bits() as u32,
            encoded as Block,
        );
        self.values_mask
            .set_ones(variable.start_bit(), variable.num_bits() as u32);
    }

    /// Visits the explicitly set variables with their decoded values.
    pub fn iterate(
        &self,
        manager: &PermutationManager,
        mut callback: impl FnMut(&PermutationVariable, i32, &str),
    ) {
        if let Some(id) = self.manager {
            assert_eq!(id, manager.id(), "state iterated with a different manager");
            for_each_variable(manager, &self.values_mask, |variable| {
                let encoded =
                    self.values.bits(variable.start_bit(), variable.num_bits() as u32) as u32;
                callback(variable, variable.value_int(encoded), variable.value_label(encoded));
            });
        }
    }

    /// Writes `name=label` lines to the logger.
    pub fn dump_to_log(&self, manager: &PermutationManager, logger: &dyn Logger) {
        self.iterate(manager, |variable, _value, label| {
            logger.info(&format!("{}={}", variable.name(), label));
        });
    }

    pub fn clear(&mut self) {
        self.manager = None;
        self.values.clear();
        self.values_mask.clear();
    }

    /// Merges two states under a used-variable filter: where both states set
    /// a variable, `b` wins; the result is restricted to `used`.
    pub fn merge_b_onto_a(
        a: &VariableState,
        b: &VariableState,
        used: &VariableSet,
        out: &mut VariableState,
    ) {
        let result = merge_internal(a, b, used, &mut out.values, &mut out.values_mask, None);
        debug_assert!(result.is_ok(), "merge without an observer cannot fail");
        out.manager = used.manager;
    }
}

/// A complete, used-set-restricted assignment identifying one shader variant.
#[derive(Clone, Debug, Default)]
pub struct VariableSelection {
    pub(crate) manager: Option<ManagerId>,
    pub(crate) values: BitSet,
    pub(crate) values_mask: BitSet,
    pub(crate) hash: u32,
}

impl VariableSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fingerprint of the packed values. Stable for a fixed manager layout;
    /// an in-process cache key, not a portable identifier.
    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// Visits the selected variables with their decoded values.
    pub fn iterate(
        &self,
        manager: &PermutationManager,
        mut callback: impl FnMut(&PermutationVariable, i32, &str),
    ) {
        if let Some(id) = self.manager {
            assert_eq!(
                id,
                manager.id(),
                "selection iterated with a different manager"
            );
            for_each_variable(manager, &self.values_mask, |variable| {
                let encoded =
                    self.values.bits(variable.start_bit(), variable.num_bits() as u32) as u32;
                callback(variable, variable.value_int(encoded), variable.value_label(encoded));
            });
        }
    }

    /// Writes `name=label` lines to the logger.
    pub fn dump_to_log(&self, manager: &PermutationManager, logger: &dyn Logger) {
        self.iterate(manager, |variable, _value, label| {
            logger.info(&format!("{}={}", variable.name(), label));
        });
    }

    pub fn clear(&mut self) {
        self.manager = None;
        self.values.clear();
        self.values_mask.clear();
        self.hash = 0;
    }
}

impl PartialEq for VariableSelection {
    fn eq(&self, other: &Self) -> bool {
        // The hash is derived from the values and does not participate.
        self.manager == other.manager
            && self.values == other.values
            && self.values_mask == other.values_mask
    }
}

impl Eq for VariableSelection {}

/// Three-way masked merge over the used set's block window.
///
/// With a `missing_values` observer, the first block whose merged mask does
/// not cover the used mask reports `(block_base_bit, missing_bits)` and the
/// merge fails; without one, incomplete coverage is allowed.
pub(crate) fn merge_internal(
    a: &VariableState,
    b: &VariableState,
    used: &VariableSet,
    out_values: &mut BitSet,
    out_mask: &mut BitSet,
    mut missing_values: Option<&mut dyn FnMut(u32, Block)>,
) -> Result<(), MissingValues> {
    debug_assert!(
        (a.manager == b.manager && a.manager == used.manager)
            || a.manager.is_none()
            || b.manager.is_none(),
        "merge inputs belong to different managers"
    );

    let start = used.mask.block_start();
    let count = used.mask.block_count();

    out_values.clear();
    out_values.reserve(start, count);
    out_mask.clear();
    out_mask.reserve(start, count);

    for slot in 0..count as usize {
        let block_index = start as u32 + slot as u32;
        let used_mask = used.mask.blocks()[slot];

        let values_a = a.values.block_or_empty(block_index);
        let values_b = b.values.block_or_empty(block_index);
        let mask_a = a.values_mask.block_or_empty(block_index);
        let mask_b = b.values_mask.block_or_empty(block_index);

        let merged_values = (values_b | (values_a & !mask_b)) & used_mask;
        let merged_mask = (mask_a | mask_b) & used_mask;

        out_values.blocks_mut()[slot] = merged_values;
        out_mask.blocks_mut()[slot] = merged_mask;

        if merged_mask != used_mask {
            if let Some(observer) = missing_values.as_mut() {
                observer(block_index * BITS_PER_BLOCK, !merged_mask & used_mask);
                return Err(MissingValues);
            }
        }
    }

    Ok(())
}
