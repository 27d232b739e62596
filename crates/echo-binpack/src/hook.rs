// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-leaf value transform hook used while rebuilding a graph.

use crate::storage::StorageType;
use crate::value::{Slot, Value};

/// A decoded leaf about to be stored.
#[derive(Debug)]
pub struct LeafContext<'a> {
    /// Decoded value.
    pub value: &'a Value,
    /// Storage type it was read as.
    pub storage_type: StorageType,
    /// Where it goes.
    pub slot: &'a Slot,
}

/// What to store for a leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum HookOutcome {
    /// Store the decoded value unchanged.
    Keep,
    /// Store this value instead.
    Replace(Value),
    /// Store [`Value::Null`] now; the caller fills the slot later.
    Defer,
}

/// Called exactly once per decoded leaf, in wire order.
///
/// Implemented for every `FnMut(&LeafContext<'_>) -> HookOutcome`.
pub trait TransformValueHook {
    /// Decide what to store for `leaf`.
    fn transform(&mut self, leaf: &LeafContext<'_>) -> HookOutcome;
}

impl<F> TransformValueHook for F
where
    F: FnMut(&LeafContext<'_>) -> HookOutcome,
{
    fn transform(&mut self, leaf: &LeafContext<'_>) -> HookOutcome {
        self(leaf)
    }
}

/// Hook that keeps every value.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepValues;

impl TransformValueHook for KeepValues {
    fn transform(&mut self, _leaf: &LeafContext<'_>) -> HookOutcome {
        HookOutcome::Keep
    }
}

pub(crate) fn apply(hook: &mut dyn TransformValueHook, leaf: &LeafContext<'_>) -> Value {
    match hook.transform(leaf) {
        HookOutcome::Keep => leaf.value.clone(),
        HookOutcome::Replace(value) => value,
        HookOutcome::Defer => Value::Null,
    }
}
