//! MIPS64 calling conventions.
//!
//! Two conventions exist. The managed convention carries the method pointer
//! in A0 and passes arguments in A1..A7 / F13..F19 with a parallel cursor:
//! an argument consumes its slot in both register files, so the i-th
//! argument always sits at a position derivable without scanning earlier
//! types. The runtime convention is the plain native one (A0..A7, F12..F19)
//! used when calling quick entrypoints.

use crate::ir::Type;
use crate::locations::Location;
use crate::mips64::{FpuReg, GpuReg};

/// Registers of the managed convention.
pub const METHOD_REG: GpuReg = GpuReg::A0;
pub const MANAGED_GP_ARGS: [GpuReg; 7] = [
    GpuReg::A1,
    GpuReg::A2,
    GpuReg::A3,
    GpuReg::A4,
    GpuReg::A5,
    GpuReg::A6,
    GpuReg::A7,
];
pub const MANAGED_FP_ARGS: [FpuReg; 7] = [
    FpuReg::F13,
    FpuReg::F14,
    FpuReg::F15,
    FpuReg::F16,
    FpuReg::F17,
    FpuReg::F18,
    FpuReg::F19,
];

pub const RUNTIME_GP_ARGS: [GpuReg; 8] = [
    GpuReg::A0,
    GpuReg::A1,
    GpuReg::A2,
    GpuReg::A3,
    GpuReg::A4,
    GpuReg::A5,
    GpuReg::A6,
    GpuReg::A7,
];
pub const RUNTIME_FP_ARGS: [FpuReg; 8] = [
    FpuReg::F12,
    FpuReg::F13,
    FpuReg::F14,
    FpuReg::F15,
    FpuReg::F16,
    FpuReg::F17,
    FpuReg::F18,
    FpuReg::F19,
];

/// Stack argument slots are 4 bytes; 64-bit arguments take two.
const SLOT_SIZE: i32 = 4;

/// Where a method returns its value.
pub fn return_location(ty: Type) -> Location {
    match ty {
        Type::Void => Location::Invalid,
        t if t.is_fp() => Location::Fpr(FpuReg::F0 as u32),
        _ => Location::Gpr(GpuReg::V0 as u32),
    }
}

/// Argument location cursor for the managed convention.
///
/// Stack offsets are relative to SP at the call site; slot 0 holds the
/// callee's method pointer, so arguments start one slot up. Space is
/// reserved for all arguments, register-passed ones included, which is
/// what keeps the cursor parallel.
#[derive(Debug, Default)]
pub struct ManagedArgCursor {
    gp_index: usize,
    fp_index: usize,
    stack_index: i32,
}

impl ManagedArgCursor {
    pub fn new() -> Self {
        ManagedArgCursor::default()
    }

    pub fn next_location(&mut self, ty: Type) -> Location {
        assert_ne!(ty, Type::Void);
        let next = if ty.is_fp() && self.fp_index < MANAGED_FP_ARGS.len() {
            let reg = MANAGED_FP_ARGS[self.fp_index];
            self.fp_index += 1;
            self.gp_index += 1;
            Location::Fpr(reg as u32)
        } else if !ty.is_fp() && self.gp_index < MANAGED_GP_ARGS.len() {
            let reg = MANAGED_GP_ARGS[self.gp_index];
            self.gp_index += 1;
            self.fp_index += 1;
            Location::Gpr(reg as u32)
        } else {
            let offset = SLOT_SIZE * (self.stack_index + 1);
            if ty.is_64bit() {
                Location::DoubleStackSlot(offset)
            } else {
                Location::StackSlot(offset)
            }
        };
        self.stack_index += if ty.is_64bit() { 2 } else { 1 };
        next
    }
}

/// Argument location cursor for calls into the runtime.
#[derive(Debug, Default)]
pub struct RuntimeArgCursor {
    gp_index: usize,
    fp_index: usize,
}

impl RuntimeArgCursor {
    pub fn new() -> Self {
        RuntimeArgCursor::default()
    }

    pub fn next_gpr(&mut self) -> GpuReg {
        let reg = RUNTIME_GP_ARGS[self.gp_index];
        self.gp_index += 1;
        reg
    }

    pub fn next_fpr(&mut self) -> FpuReg {
        let reg = RUNTIME_FP_ARGS[self.fp_index];
        self.fp_index += 1;
        reg
    }

    pub fn next_location(&mut self, ty: Type) -> Location {
        assert_ne!(ty, Type::Void);
        if ty.is_fp() {
            Location::Fpr(self.next_fpr() as u32)
        } else {
            Location::Gpr(self.next_gpr() as u32)
        }
    }
}

/// Callee-saved registers of the managed convention (S0..S7, S8, RA). The
/// thread register S1 is callee saved but never reallocated, so it is spilled
/// with the rest.
pub const CALLEE_SAVED_GP: [GpuReg; 10] = [
    GpuReg::S0,
    GpuReg::S1,
    GpuReg::S2,
    GpuReg::S3,
    GpuReg::S4,
    GpuReg::S5,
    GpuReg::S6,
    GpuReg::S7,
    GpuReg::S8,
    GpuReg::Ra,
];

pub const CALLEE_SAVED_FP: [FpuReg; 8] = [
    FpuReg::F24,
    FpuReg::F25,
    FpuReg::F26,
    FpuReg::F27,
    FpuReg::F28,
    FpuReg::F29,
    FpuReg::F30,
    FpuReg::F31,
];

/// Caller-saved register mask (everything not callee saved, minus the
/// reserved registers that are never allocatable).
pub fn caller_saved_gp_mask() -> u32 {
    let callee: u32 = CALLEE_SAVED_GP.iter().map(|r| 1u32 << r.code()).sum();
    let reserved = (1 << GpuReg::Zero.code())
        | (1 << GpuReg::At.code())
        | (1 << GpuReg::K0.code())
        | (1 << GpuReg::K1.code())
        | (1 << GpuReg::Gp.code())
        | (1 << GpuReg::Sp.code());
    !(callee | reserved)
}

pub fn caller_saved_fp_mask() -> u32 {
    let callee: u32 = CALLEE_SAVED_FP.iter().map(|r| 1u32 << r.code()).sum();
    !callee
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_cursor_skips_both_files() {
        let mut cursor = ManagedArgCursor::new();
        assert_eq!(cursor.next_location(Type::Int32), Location::Gpr(GpuReg::A1 as u32));
        // The float lands in F14, not F13: the int above consumed slot 0 of
        // both files.
        assert_eq!(cursor.next_location(Type::Float32), Location::Fpr(FpuReg::F14 as u32));
        assert_eq!(cursor.next_location(Type::Int64), Location::Gpr(GpuReg::A3 as u32));
    }

    #[test]
    fn stack_args_skip_method_slot_and_widen() {
        let mut cursor = ManagedArgCursor::new();
        for _ in 0..7 {
            cursor.next_location(Type::Int32);
        }
        // Registers exhausted; 7 slots already reserved, method at slot 0.
        assert_eq!(cursor.next_location(Type::Int64), Location::DoubleStackSlot(32));
        // The 64-bit arg consumed two slots.
        assert_eq!(cursor.next_location(Type::Int32), Location::StackSlot(40));
    }

    #[test]
    fn runtime_cursor_starts_at_a0() {
        let mut cursor = RuntimeArgCursor::new();
        assert_eq!(cursor.next_gpr(), GpuReg::A0);
        assert_eq!(cursor.next_location(Type::Float64), Location::Fpr(FpuReg::F12 as u32));
        assert_eq!(cursor.next_gpr(), GpuReg::A1);
    }

    #[test]
    fn saved_masks_do_not_overlap() {
        assert_eq!(caller_saved_gp_mask() & (1 << GpuReg::S0.code()), 0);
        assert_ne!(caller_saved_gp_mask() & (1 << GpuReg::V0.code()), 0);
        assert_eq!(caller_saved_fp_mask() & (1 << FpuReg::F24.code()), 0);
    }
}
