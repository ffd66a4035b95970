//! Permutation variable entries and value encoding.
//!
//! A [`PermutationVariable`] is an immutable record created by registration:
//! a name, a packed bit range, a kind, the ordered list of allowed values,
//! and an optional default. The *encoded* value stored in the packed bit
//! space is `0`/`1` for bools and the index into the allowed list for ints
//! and enums, which keeps the bit width at `ceil(log2(len))` regardless of
//! the magnitudes involved.

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identity of a [`PermutationManager`](crate::select::PermutationManager).
///
/// Entries and containers remember which manager they belong to through this
/// id; it is a relation, not ownership.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ManagerId(NonZeroU64);

impl ManagerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        let id = NEXT.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroU64::new(id).expect("manager id counter overflowed"))
    }
}

/// The three variable shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VariableKind {
    /// One bit, fixed `"FALSE"`/`"TRUE"` labels.
    Bool,
    /// A closed set of integers; labels are the decimal strings.
    Int,
    /// A closed set of named integers.
    Enum,
}

impl VariableKind {
    pub fn name(self) -> &'static str {
        match self {
            VariableKind::Bool => "Bool",
            VariableKind::Int => "Int",
            VariableKind::Enum => "Enum",
        }
    }
}

/// A value does not fit the variable it is being assigned to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueError {
    /// The setter's value type does not match the variable's kind.
    KindMismatch,
    /// The value or label is not in the variable's allowed list.
    NotAllowed,
}

impl std::fmt::Display for ValueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueError::KindMismatch => write!(f, "value type does not match the variable kind"),
            ValueError::NotAllowed => write!(f, "value is not in the allowed list"),
        }
    }
}

const FALSE_LABEL: &str = "FALSE";
const TRUE_LABEL: &str = "TRUE";

/// An immutable registered variable.
#[derive(Clone, Debug)]
pub struct PermutationVariable {
    pub(crate) name: String,
    pub(crate) start_bit: u32,
    pub(crate) num_bits: u16,
    pub(crate) kind: VariableKind,
    pub(crate) default_value: Option<i32>,
    pub(crate) allowed: Vec<(String, i32)>,
    pub(crate) manager: ManagerId,
}

impl PermutationVariable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    /// First bit of the packed range. `start_bit + num_bits` never crosses a
    /// 64-bit block boundary.
    pub fn start_bit(&self) -> u32 {
        self.start_bit
    }

    pub fn num_bits(&self) -> u16 {
        self.num_bits
    }

    pub fn default_value(&self) -> Option<i32> {
        self.default_value
    }

    /// Ordered `(label, value)` pairs. Empty for bools.
    pub fn allowed_values(&self) -> &[(String, i32)] {
        &self.allowed
    }

    /// The manager this variable was registered with.
    pub fn manager_id(&self) -> ManagerId {
        self.manager
    }

    /// Encodes an integer value into its packed bit pattern.
    pub fn encode_int(&self, value: i32) -> Result<u32, ValueError> {
        if self.kind == VariableKind::Bool {
            return match value {
                0 | 1 => Ok(value as u32),
                _ => Err(ValueError::NotAllowed),
            };
        }

        self.allowed
            .iter()
            .position(|(_, allowed)| *allowed == value)
            .map(|index| index as u32)
            .ok_or(ValueError::NotAllowed)
    }

    /// Encodes a string label into its packed bit pattern (case-sensitive).
    pub fn encode_label(&self, label: &str) -> Result<u32, ValueError> {
        if self.kind == VariableKind::Bool {
            return match label {
                TRUE_LABEL => Ok(1),
                FALSE_LABEL => Ok(0),
                _ => Err(ValueError::NotAllowed),
            };
        }

        self.allowed
            .iter()
            .position(|(allowed, _)| allowed == label)
            .map(|index| index as u32)
            .ok_or(ValueError::NotAllowed)
    }

    /// The integer value behind an encoded bit pattern.
    ///
    /// Panics if `encoded` is out of range for the allowed list.
    pub fn value_int(&self, encoded: u32) -> i32 {
        if self.kind == VariableKind::Bool {
            encoded as i32
        } else {
            self.allowed[encoded as usize].1
        }
    }

    /// The label behind an encoded bit pattern.
    ///
    /// Panics if `encoded` is out of range for the allowed list.
    pub fn value_label(&self, encoded: u32) -> &str {
        if self.kind == VariableKind::Bool {
            if encoded != 0 {
                TRUE_LABEL
            } else {
                FALSE_LABEL
            }
        } else {
            &self.allowed[encoded as usize].0
        }
    }
}
