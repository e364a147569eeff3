//! Where values live: the register allocator's vocabulary.
//!
//! A [Location] names a concrete home for one value (register, register
//! pair, stack slot, constant), or, before allocation, a constraint on where
//! it may live. The locations builder pass creates one [LocationSummary] per
//! instruction out of constraints; the external allocator replaces them with
//! concrete locations before the instruction visitor runs. By that point
//! every location this crate reads is concrete.

use crate::ir::{ConstVal, InstId, Type};
use smallvec::SmallVec;

/// Constraint placed on a not-yet-allocated operand.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Policy {
    Any,
    RequiresRegister,
    RequiresFpuRegister,
    /// Output must reuse input 0's register (two-address style ops).
    SameAsFirstInput,
}

/// A concrete (or, pre-allocation, constrained) home for a value.
///
/// Register numbers are target register codes; this type is target neutral
/// and the backend translates codes to its own register enums.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Location {
    Invalid,
    /// The value is this compile-time constant; `origin` lets the backend
    /// re-read the defining instruction when it needs the raw bits.
    Constant { value: ConstVal, origin: InstId },
    Gpr(u32),
    Fpr(u32),
    /// Two core registers holding a 64-bit value (32-bit targets only).
    GprPair(u32, u32),
    /// 32-bit spill slot at this byte offset from SP.
    StackSlot(i32),
    /// 64-bit spill slot at this byte offset from SP.
    DoubleStackSlot(i32),
    Unallocated(Policy),
}

impl Location {
    pub fn is_register(&self) -> bool {
        matches!(self, Location::Gpr(_))
    }

    pub fn is_fpu_register(&self) -> bool {
        matches!(self, Location::Fpr(_))
    }

    pub fn is_any_register(&self) -> bool {
        matches!(self, Location::Gpr(_) | Location::Fpr(_) | Location::GprPair(..))
    }

    pub fn is_stack_slot(&self) -> bool {
        matches!(self, Location::StackSlot(_))
    }

    pub fn is_double_stack_slot(&self) -> bool {
        matches!(self, Location::DoubleStackSlot(_))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Location::Constant { .. })
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Location::Invalid)
    }

    pub fn as_gpr(&self) -> u32 {
        match self {
            Location::Gpr(r) => *r,
            _ => panic!("not a core register: {self:?}"),
        }
    }

    pub fn as_fpr(&self) -> u32 {
        match self {
            Location::Fpr(r) => *r,
            _ => panic!("not an FPU register: {self:?}"),
        }
    }

    pub fn as_constant(&self) -> ConstVal {
        match self {
            Location::Constant { value, .. } => *value,
            _ => panic!("not a constant: {self:?}"),
        }
    }

    pub fn stack_offset(&self) -> i32 {
        match self {
            Location::StackSlot(off) | Location::DoubleStackSlot(off) => *off,
            _ => panic!("not a stack slot: {self:?}"),
        }
    }

    /// Whether two locations can hold overlapping bytes. Used by the move
    /// resolver's blocking test.
    pub fn overlaps_with(&self, other: &Location) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            // A wide slot overlaps the narrow slot in its upper half.
            (Location::DoubleStackSlot(a), Location::StackSlot(b))
            | (Location::StackSlot(b), Location::DoubleStackSlot(a)) => {
                *b == *a || *b == *a + 4
            }
            (Location::GprPair(lo, hi), Location::Gpr(r))
            | (Location::Gpr(r), Location::GprPair(lo, hi)) => r == lo || r == hi,
            _ => false,
        }
    }
}

/// Whether an instruction calls out, which decides what the allocator must
/// treat as clobbered across it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    NoCall,
    CallOnSlowPath,
    CallOnMainPath,
}

/// A bitmask pair over core and FPU registers; snapshots of live registers
/// for slow paths, and caller-save sets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegisterSet {
    pub gpr: u32,
    pub fpr: u32,
}

impl RegisterSet {
    pub fn empty() -> Self {
        RegisterSet::default()
    }

    pub fn add(&mut self, loc: Location) {
        match loc {
            Location::Gpr(r) => self.gpr |= 1 << r,
            Location::Fpr(r) => self.fpr |= 1 << r,
            Location::GprPair(lo, hi) => self.gpr |= (1 << lo) | (1 << hi),
            _ => panic!("not a register location: {loc:?}"),
        }
    }

    pub fn contains_gpr(&self, r: u32) -> bool {
        self.gpr & (1 << r) != 0
    }

    pub fn contains_fpr(&self, r: u32) -> bool {
        self.fpr & (1 << r) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.gpr == 0 && self.fpr == 0
    }
}

/// Per-instruction record pairing operand positions with locations.
///
/// Built by the locations-builder pass with constraints, rewritten in place
/// by the external allocator, then read by the instruction visitor.
#[derive(Clone, Debug)]
pub struct LocationSummary {
    inputs: SmallVec<[Location; 4]>,
    temps: SmallVec<[Location; 2]>,
    output: Location,
    call_kind: CallKind,
    intrinsified: bool,
    /// Live registers the enclosing slow path must preserve.
    pub live_registers: RegisterSet,
    /// For [CallKind::CallOnSlowPath] summaries whose slow path clobbers a
    /// custom set rather than the default caller saves.
    pub custom_slow_path_caller_saves: RegisterSet,
}

impl LocationSummary {
    pub fn new(call_kind: CallKind) -> Self {
        LocationSummary {
            inputs: SmallVec::new(),
            temps: SmallVec::new(),
            output: Location::Invalid,
            call_kind,
            intrinsified: false,
            live_registers: RegisterSet::empty(),
            custom_slow_path_caller_saves: RegisterSet::empty(),
        }
    }

    pub fn new_intrinsified(call_kind: CallKind) -> Self {
        let mut s = Self::new(call_kind);
        s.intrinsified = true;
        s
    }

    pub fn set_in_at(&mut self, index: usize, loc: Location) {
        if self.inputs.len() <= index {
            self.inputs.resize(index + 1, Location::Invalid);
        }
        self.inputs[index] = loc;
    }

    pub fn in_at(&self, index: usize) -> Location {
        self.inputs[index]
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn add_temp(&mut self, loc: Location) {
        self.temps.push(loc);
    }

    pub fn temp(&self, index: usize) -> Location {
        self.temps[index]
    }

    pub fn num_temps(&self) -> usize {
        self.temps.len()
    }

    pub fn set_out(&mut self, loc: Location) {
        self.output = loc;
    }

    pub fn out(&self) -> Location {
        self.output
    }

    pub fn call_kind(&self) -> CallKind {
        self.call_kind
    }

    pub fn is_intrinsified(&self) -> bool {
        self.intrinsified
    }

    pub fn can_call(&self) -> bool {
        self.call_kind != CallKind::NoCall
    }
}

/// Frame-layout helpers shared by the backends.
pub fn stack_slot_size(ty: Type) -> i32 {
    if ty.is_64bit() { 8 } else { 4 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_is_symmetric_for_wide_slots() {
        let wide = Location::DoubleStackSlot(16);
        let lo = Location::StackSlot(16);
        let hi = Location::StackSlot(20);
        let far = Location::StackSlot(24);
        assert!(wide.overlaps_with(&lo));
        assert!(hi.overlaps_with(&wide));
        assert!(!wide.overlaps_with(&far));
    }

    #[test]
    fn register_set_tracks_pairs() {
        let mut set = RegisterSet::empty();
        set.add(Location::GprPair(2, 3));
        assert!(set.contains_gpr(2));
        assert!(set.contains_gpr(3));
        assert!(!set.contains_gpr(4));
    }
}
