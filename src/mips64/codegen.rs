//! The MIPS64R6 instruction visitor.
//!
//! Compilation runs in three steps. [CodeGenerator::build_locations] walks
//! the graph once and attaches a [LocationSummary] of operand constraints to
//! every instruction. The embedding register allocator rewrites those
//! summaries in place with concrete registers and stack slots and reports
//! which registers it handed out. [CodeGenerator::compile] then walks the
//! graph a second time and emits machine code, trusting every location it
//! reads to be concrete.
//!
//! Code that must run rarely (throws, runtime initialization, reference
//! marking) is deferred into [SlowPath] records and emitted after the last
//! block, so the main path stays branch-not-taken.

use index_vec::{index_vec, IndexVec};
use log::{debug, trace};
use smallvec::SmallVec;

use crate::config::{
    read_barrier_mark_entry_offset, ObjectModel, QuickEntrypoint, ReadBarrierKind, TargetConfig,
    ThreadModel,
};
use crate::errors::CodegenError;
use crate::ir::{
    BlockId, Cond, DataLoadKind, DexRef, FieldInfo, FpBias, Graph, Inst, InstId, MethodLoadKind,
    Type,
};
use crate::locations::{CallKind, Location, LocationSummary, Policy, RegisterSet};
use crate::mips64::abi::{
    self, ManagedArgCursor, RuntimeArgCursor, CALLEE_SAVED_FP, CALLEE_SAVED_GP, METHOD_REG,
};
use crate::mips64::asm::{
    LabelId, LoadOperandType, Mips64Assembler, StoreOperandType,
};
use crate::mips64::{intrinsics, vector, FpuReg, GpuReg};
use crate::moves::{MoveEmitter, MoveOp, ParallelMoveResolver};
use crate::stack_map::{FrameInfo, LinkerPatch, PatchKind, StackMapEntry, StackMapStream};

/// Stack probe distance; frames larger than this are rejected outright.
const STACK_OVERFLOW_RESERVED_BYTES: u32 = 16 * 1024;

const FRAME_ALIGNMENT: u32 = 16;

/// Above this many cases a packed switch compiles to a jump table instead of
/// a compare cascade.
const PACKED_SWITCH_JUMP_TABLE_THRESHOLD: usize = 6;

/// Placeholder immediates rewritten by the linker; see [LinkerPatch].
const PLACEHOLDER_HIGH: u16 = 0x1234;
const PLACEHOLDER_LOW: i16 = 0x5678;

pub(super) fn gpr_of(loc: Location) -> GpuReg {
    GpuReg::from_code(loc.as_gpr())
}

pub(super) fn fpr_of(loc: Location) -> FpuReg {
    FpuReg::from_code(loc.as_fpr())
}

pub(super) fn is_int16(v: i64) -> bool {
    (i64::from(i16::MIN)..=i64::from(i16::MAX)).contains(&v)
}

fn is_uint16(v: i64) -> bool {
    (0..=i64::from(u16::MAX)).contains(&v)
}

fn round_up(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Registers the allocator must never hand out: the assembler scratches, the
/// zero register, kernel and stack registers, the thread register and T9
/// (clobbered by every call sequence).
pub fn blocked_core_registers() -> u32 {
    (1 << GpuReg::Zero.code())
        | (1 << GpuReg::At.code())
        | (1 << GpuReg::K0.code())
        | (1 << GpuReg::K1.code())
        | (1 << GpuReg::Gp.code())
        | (1 << GpuReg::Sp.code())
        | (1 << GpuReg::Ra.code())
        | (1 << GpuReg::T9.code())
        | (1 << GpuReg::TMP.code())
        | (1 << GpuReg::TMP2.code())
        | (1 << GpuReg::TR.code())
}

pub fn blocked_fpu_registers() -> u32 {
    1 << FpuReg::FTMP.code()
}

/// Magic-number multiplier and shift for signed division by a constant,
/// after Hacker's Delight (2nd ed.), chapter 10.
fn magic_and_shift_for_div_rem(divisor: i64, is_long: bool) -> (i64, u32) {
    debug_assert!(divisor != 0 && divisor != 1 && divisor != -1);
    let bits: u32 = if is_long { 64 } else { 32 };
    let exp: u64 = 1u64 << (bits - 1);
    let abs_d: u64 = if is_long {
        divisor.unsigned_abs()
    } else {
        u64::from((divisor as i32).unsigned_abs())
    };
    let sign_bit: u64 = if is_long {
        (divisor as u64) >> 63
    } else {
        u64::from((divisor as u32) >> 31)
    };
    // abs_nc is the most negative value of the dividend's magnitude class.
    let tmp = exp.wrapping_add(sign_bit);
    let abs_nc = tmp - 1 - tmp % abs_d;

    let mut p = bits - 1;
    let mut q1 = exp / abs_nc;
    let mut r1 = exp % abs_nc;
    let mut q2 = exp / abs_d;
    let mut r2 = exp % abs_d;
    loop {
        p += 1;
        q1 = q1.wrapping_mul(2);
        r1 = r1.wrapping_mul(2);
        if r1 >= abs_nc {
            q1 = q1.wrapping_add(1);
            r1 -= abs_nc;
        }
        q2 = q2.wrapping_mul(2);
        r2 = r2.wrapping_mul(2);
        if r2 >= abs_d {
            q2 = q2.wrapping_add(1);
            r2 -= abs_d;
        }
        let delta = abs_d - r2;
        if !(q1 < delta || (q1 == delta && r1 == 0)) {
            break;
        }
    }

    let mut magic = if divisor > 0 {
        q2.wrapping_add(1) as i64
    } else {
        -(q2.wrapping_add(1) as i64)
    };
    if !is_long {
        magic = i64::from(magic as i32);
    }
    (magic, p - bits)
}

/// The finished artifact for one method.
#[derive(Debug)]
pub struct CompiledMethod {
    pub code: Vec<u8>,
    pub frame_info: FrameInfo,
    pub stack_maps: Vec<StackMapEntry>,
    pub patches: Vec<LinkerPatch>,
}

/// Deferred out-of-line code. Each record remembers the labels the main path
/// already branched to; emission happens after the last block, in creation
/// order.
enum SlowPath {
    ThrowNullPointer {
        inst: InstId,
        entry: LabelId,
    },
    ThrowDivZero {
        inst: InstId,
        entry: LabelId,
    },
    ThrowArrayBounds {
        inst: InstId,
        entry: LabelId,
        index: Location,
        length: Location,
    },
    Suspend {
        inst: InstId,
        entry: LabelId,
        resume: LabelId,
    },
    /// Resolves (and optionally initializes) a class, then moves the result
    /// into `out` when the caller wants it.
    LoadClass {
        inst: InstId,
        entry: LabelId,
        exit: LabelId,
        type_ref: DexRef,
        do_clinit: bool,
        out: Location,
    },
    LoadString {
        inst: InstId,
        entry: LabelId,
        exit: LabelId,
        out: Location,
    },
    Deoptimize {
        inst: InstId,
        entry: LabelId,
    },
    /// Baker read barrier marking. The mark helper takes and returns the
    /// reference in the same register and preserves everything else, so no
    /// live registers are saved here. With `entrypoint_in_t9` the main path
    /// already loaded the helper's address.
    ReadBarrierMark {
        entry: LabelId,
        exit: LabelId,
        ref_loc: Location,
        entrypoint_in_t9: bool,
    },
    /// Non-Baker read barrier for a heap reference load.
    ReadBarrierHeapReference {
        inst: InstId,
        entry: LabelId,
        exit: LabelId,
        out: Location,
        obj: Location,
        offset: i32,
        index: Option<Location>,
        shift: u32,
    },
    /// Non-Baker read barrier for a GC root load.
    ReadBarrierRoot {
        inst: InstId,
        entry: LabelId,
        exit: LabelId,
        out: Location,
        root: Location,
    },
    /// Reference array store whose static type check failed.
    StoreArrayElement {
        inst: InstId,
        entry: LabelId,
        exit: LabelId,
        array: Location,
        index: Location,
        value: Location,
    },
    /// Fallback from an intrinsic fast path to the real call.
    Intrinsic {
        inst: InstId,
        entry: LabelId,
        exit: LabelId,
    },
}

pub struct CodeGenerator<'a> {
    pub(super) graph: &'a Graph,
    pub(super) config: TargetConfig,
    pub(super) asm: Mips64Assembler,
    locations: IndexVec<InstId, Option<LocationSummary>>,
    /// Conditions consumed by the branch directly after them never
    /// materialize a boolean.
    fused_conds: IndexVec<InstId, bool>,
    block_labels: IndexVec<BlockId, LabelId>,
    frame_entry_label: LabelId,
    slow_paths: Vec<SlowPath>,
    stack_maps: StackMapStream,
    patches: Vec<LinkerPatch>,
    allocated_gprs: u32,
    allocated_fprs: u32,
    frame_size: u32,
    core_spill_mask: u32,
    fpu_spill_mask: u32,
    slow_path_spill_offset: i32,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(graph: &'a Graph, config: TargetConfig) -> Self {
        let mut asm = Mips64Assembler::new();
        let block_labels = graph.blocks.iter().map(|_| asm.new_label()).collect();
        let frame_entry_label = asm.new_label();

        let mut fused_conds = index_vec![false; graph.insts.len()];
        for block in &graph.blocks {
            for pair in block.insts.windows(2) {
                let (first, second) = (pair[0], pair[1]);
                let consumed = match graph.node(second).op {
                    Inst::If { cond, .. } | Inst::Deoptimize { cond } => cond == first,
                    _ => false,
                };
                if consumed && matches!(graph.node(first).op, Inst::Condition { .. }) {
                    fused_conds[first] = true;
                }
            }
        }

        CodeGenerator {
            graph,
            config,
            asm,
            locations: index_vec![None; graph.insts.len()],
            fused_conds,
            block_labels,
            frame_entry_label,
            slow_paths: Vec::new(),
            stack_maps: StackMapStream::new(),
            patches: Vec::new(),
            allocated_gprs: 0,
            allocated_fprs: 0,
            frame_size: 0,
            core_spill_mask: 0,
            fpu_spill_mask: 0,
            slow_path_spill_offset: 0,
        }
    }

    pub fn locations(&self, inst: InstId) -> &LocationSummary {
        match &self.locations[inst] {
            Some(summary) => summary,
            None => panic!("no location summary for {inst:?}"),
        }
    }

    pub fn locations_mut(&mut self, inst: InstId) -> &mut LocationSummary {
        match &mut self.locations[inst] {
            Some(summary) => summary,
            None => panic!("no location summary for {inst:?}"),
        }
    }

    /// Report the registers the allocator used, register-code bitmasks per
    /// file. Decides which callee saves the frame spills.
    pub fn set_allocated_registers(&mut self, gprs: u32, fprs: u32) {
        self.allocated_gprs = gprs;
        self.allocated_fprs = fprs;
    }

    // ------------------------------------------------------------------
    // Locations pass.

    pub fn build_locations(&mut self) -> Result<(), CodegenError> {
        let graph = self.graph;
        let mut params = ManagedArgCursor::new();
        for id in (0..graph.insts.len()).map(InstId::from_usize) {
            let summary = self.build_locations_for(id, &mut params)?;
            self.locations[id] = Some(summary);
        }
        Ok(())
    }

    fn const_or_register(&self, operand: InstId, legal: impl Fn(i64) -> bool) -> Location {
        match self.graph.node(operand).as_const() {
            Some(value) if legal(value.as_i64()) => Location::Constant { value, origin: operand },
            _ => Location::Unallocated(Policy::RequiresRegister),
        }
    }

    fn build_locations_for(
        &self,
        id: InstId,
        params: &mut ManagedArgCursor,
    ) -> Result<LocationSummary, CodegenError> {
        let graph = self.graph;
        let node = graph.node(id);
        let reg = Location::Unallocated(Policy::RequiresRegister);
        let freg = Location::Unallocated(Policy::RequiresFpuRegister);

        let mut summary = LocationSummary::new(CallKind::NoCall);
        match &node.op {
            Inst::Constant(value) => {
                summary.set_out(Location::Constant { value: *value, origin: id });
            }
            Inst::ParameterValue { .. } => {
                summary.set_out(params.next_location(node.ty));
            }
            Inst::CurrentMethod => {
                summary.set_out(Location::Gpr(METHOD_REG.code()));
            }

            Inst::Add { rhs, .. } | Inst::Sub { rhs, .. } => {
                if node.ty.is_fp() {
                    summary.set_in_at(0, freg);
                    summary.set_in_at(1, freg);
                    summary.set_out(freg);
                } else {
                    summary.set_in_at(0, reg);
                    summary.set_in_at(1, self.const_or_register(*rhs, |_| true));
                    summary.set_out(reg);
                }
            }
            Inst::And { rhs, .. } | Inst::Or { rhs, .. } | Inst::Xor { rhs, .. } => {
                summary.set_in_at(0, reg);
                summary.set_in_at(1, self.const_or_register(*rhs, is_uint16));
                summary.set_out(reg);
            }
            Inst::Mul { .. } => {
                if node.ty.is_fp() {
                    summary.set_in_at(0, freg);
                    summary.set_in_at(1, freg);
                    summary.set_out(freg);
                } else {
                    summary.set_in_at(0, reg);
                    summary.set_in_at(1, reg);
                    summary.set_out(reg);
                }
            }
            Inst::Div { rhs, .. } | Inst::Rem { rhs, .. } => {
                if node.ty.is_fp() {
                    if matches!(node.op, Inst::Rem { .. }) {
                        // fmod goes through the runtime.
                        summary = LocationSummary::new(CallKind::CallOnMainPath);
                        let mut args = RuntimeArgCursor::new();
                        summary.set_in_at(0, args.next_location(node.ty));
                        summary.set_in_at(1, args.next_location(node.ty));
                        summary.set_out(abi::return_location(node.ty));
                    } else {
                        summary.set_in_at(0, freg);
                        summary.set_in_at(1, freg);
                        summary.set_out(freg);
                    }
                } else {
                    summary.set_in_at(0, reg);
                    summary.set_in_at(1, self.const_or_register(*rhs, |_| true));
                    summary.set_out(reg);
                }
            }
            Inst::Shl { amount, .. }
            | Inst::Shr { amount, .. }
            | Inst::UShr { amount, .. }
            | Inst::Ror { amount, .. } => {
                summary.set_in_at(0, reg);
                summary.set_in_at(1, self.const_or_register(*amount, |_| true));
                summary.set_out(reg);
            }
            Inst::Neg { .. } | Inst::Not { .. } => {
                if node.ty.is_fp() {
                    summary.set_in_at(0, freg);
                    summary.set_out(freg);
                } else {
                    summary.set_in_at(0, reg);
                    summary.set_out(reg);
                }
            }
            Inst::BooleanNot { .. } => {
                summary.set_in_at(0, reg);
                summary.set_out(reg);
            }
            Inst::Compare { lhs, rhs, .. } => {
                if graph.node(*lhs).ty.is_fp() {
                    summary.set_in_at(0, freg);
                    summary.set_in_at(1, freg);
                } else {
                    summary.set_in_at(0, reg);
                    summary.set_in_at(1, self.const_or_register(*rhs, |_| true));
                }
                summary.set_out(reg);
            }
            Inst::Condition { lhs, rhs, .. } => {
                if graph.node(*lhs).ty.is_fp() {
                    summary.set_in_at(0, freg);
                    summary.set_in_at(1, freg);
                } else {
                    summary.set_in_at(0, reg);
                    summary.set_in_at(1, self.const_or_register(*rhs, |_| true));
                }
                if !self.fused_conds[id] {
                    summary.set_out(reg);
                }
            }
            Inst::TypeConversion { input } => {
                let from = graph.node(*input).ty;
                summary.set_in_at(0, if from.is_fp() { freg } else { reg });
                summary.set_out(if node.ty.is_fp() { freg } else { reg });
            }

            Inst::Goto { .. } => {}
            Inst::If { cond, .. } | Inst::Deoptimize { cond } => {
                if matches!(node.op, Inst::Deoptimize { .. }) {
                    summary = LocationSummary::new(CallKind::CallOnSlowPath);
                }
                let fused = self.fused_conds[*cond];
                if !fused && graph.node(*cond).as_const().is_none() {
                    summary.set_in_at(0, reg);
                }
            }
            Inst::Return { value } => {
                if let Some(value) = value {
                    summary.set_in_at(0, abi::return_location(graph.node(*value).ty));
                }
            }
            Inst::PackedSwitch { .. } => {
                summary.set_in_at(0, reg);
            }

            Inst::NullCheck { .. } => {
                if !self.config.implicit_null_checks {
                    summary = LocationSummary::new(CallKind::CallOnSlowPath);
                }
                summary.set_in_at(0, reg);
            }
            Inst::BoundsCheck { .. } => {
                summary = LocationSummary::new(CallKind::CallOnSlowPath);
                summary.set_in_at(0, reg);
                summary.set_in_at(1, reg);
                let mut caller_saves = RegisterSet::empty();
                caller_saves.add(Location::Gpr(GpuReg::A0.code()));
                caller_saves.add(Location::Gpr(GpuReg::A1.code()));
                summary.custom_slow_path_caller_saves = caller_saves;
            }
            Inst::DivZeroCheck { value } => {
                summary = LocationSummary::new(CallKind::CallOnSlowPath);
                summary.set_in_at(0, self.const_or_register(*value, |_| true));
            }
            Inst::SuspendCheck => {
                summary = LocationSummary::new(CallKind::CallOnSlowPath);
            }
            Inst::ClinitCheck { .. } => {
                summary = LocationSummary::new(CallKind::CallOnSlowPath);
                summary.set_in_at(0, reg);
            }

            Inst::LoadClass { load_kind, .. } => {
                summary = self.build_data_load(*load_kind);
            }
            Inst::LoadString { load_kind } => {
                summary = self.build_data_load(*load_kind);
            }

            Inst::InstanceFieldGet { field, .. } | Inst::StaticFieldGet { field, .. } => {
                summary = self.build_field_get(*field);
            }
            Inst::InstanceFieldSet { value, field, .. }
            | Inst::StaticFieldSet { value, field, .. } => {
                summary.set_in_at(0, reg);
                if field.ty.is_fp() {
                    summary.set_in_at(1, self.const_or_register(*value, |_| true));
                    if !summary.in_at(1).is_constant() {
                        summary.set_in_at(1, freg);
                    }
                } else {
                    summary.set_in_at(1, self.const_or_register(*value, |_| true));
                }
            }
            Inst::ArrayGet { .. } => {
                let with_read_barrier =
                    node.ty == Type::Reference && self.config.emit_read_barriers();
                if with_read_barrier {
                    summary = LocationSummary::new(CallKind::CallOnSlowPath);
                    if self.config.baker_read_barriers() {
                        summary.custom_slow_path_caller_saves = RegisterSet::empty();
                    }
                }
                summary.set_in_at(0, reg);
                summary.set_in_at(
                    1,
                    match &node.op {
                        Inst::ArrayGet { index, .. } => self.const_or_register(*index, |_| true),
                        _ => unreachable!(),
                    },
                );
                summary.set_out(if node.ty.is_fp() { freg } else { reg });
                if with_read_barrier && self.config.baker_read_barriers() {
                    summary.add_temp(reg);
                }
            }
            Inst::ArraySet { index, value, needs_type_check, .. } => {
                if *needs_type_check {
                    summary = LocationSummary::new(CallKind::CallOnSlowPath);
                }
                summary.set_in_at(0, reg);
                summary.set_in_at(1, self.const_or_register(*index, |_| true));
                if node.ty.is_fp() {
                    let loc = self.const_or_register(*value, |_| true);
                    summary.set_in_at(2, if loc.is_constant() { loc } else { freg });
                } else if node.ty == Type::Reference {
                    // Only a null constant may bypass the value register.
                    summary.set_in_at(2, self.const_or_register(*value, |v| v == 0));
                } else {
                    summary.set_in_at(2, self.const_or_register(*value, |_| true));
                }
                let needs_write_barrier =
                    node.ty == Type::Reference && !summary.in_at(2).is_constant();
                if needs_write_barrier {
                    // Also used for reference poisoning.
                    summary.add_temp(reg);
                }
            }
            Inst::ArrayLength { .. } => {
                summary.set_in_at(0, reg);
                summary.set_out(reg);
            }

            Inst::InvokeStaticOrDirect { load_kind, args, intrinsic } => {
                if let Some(intrinsic) = intrinsic {
                    if let Some(s) = intrinsics::try_build_locations(self, *intrinsic, id) {
                        return Ok(s);
                    }
                }
                summary = self.build_invoke(args, node.ty);
                if matches!(load_kind, MethodLoadKind::Recursive) {
                    summary.set_in_at(args.len(), Location::Gpr(METHOD_REG.code()));
                }
            }
            Inst::InvokeVirtual { args, intrinsic, .. } => {
                if let Some(intrinsic) = intrinsic {
                    if let Some(s) = intrinsics::try_build_locations(self, *intrinsic, id) {
                        return Ok(s);
                    }
                }
                summary = self.build_invoke(args, node.ty);
            }

            Inst::MonitorOperation { .. } => {
                summary = LocationSummary::new(CallKind::CallOnMainPath);
                summary.set_in_at(0, Location::Gpr(GpuReg::A0.code()));
            }

            Inst::VecOp { .. } => {
                return vector::build_locations(self, id);
            }
        }
        Ok(summary)
    }

    fn build_data_load(&self, load_kind: DataLoadKind) -> LocationSummary {
        let mut summary;
        match load_kind {
            DataLoadKind::BootImageRelRo(_) => {
                summary = LocationSummary::new(CallKind::NoCall);
                summary.set_out(Location::Unallocated(Policy::RequiresRegister));
            }
            DataLoadKind::BssEntry(_) => {
                summary = LocationSummary::new(CallKind::CallOnSlowPath);
                if self.config.baker_read_barriers() {
                    summary.custom_slow_path_caller_saves = RegisterSet::empty();
                }
                summary.set_out(Location::Unallocated(Policy::RequiresRegister));
            }
            DataLoadKind::RuntimeCall(_) => {
                summary = LocationSummary::new(CallKind::CallOnMainPath);
                summary.set_out(abi::return_location(Type::Reference));
            }
        }
        summary
    }

    fn build_field_get(&self, field: FieldInfo) -> LocationSummary {
        let object_ref_with_read_barrier =
            field.ty == Type::Reference && self.config.emit_read_barriers();
        let mut summary = LocationSummary::new(if object_ref_with_read_barrier {
            CallKind::CallOnSlowPath
        } else {
            CallKind::NoCall
        });
        if object_ref_with_read_barrier && self.config.baker_read_barriers() {
            summary.custom_slow_path_caller_saves = RegisterSet::empty();
        }
        summary.set_in_at(0, Location::Unallocated(Policy::RequiresRegister));
        summary.set_out(Location::Unallocated(if field.ty.is_fp() {
            Policy::RequiresFpuRegister
        } else {
            Policy::RequiresRegister
        }));
        if object_ref_with_read_barrier && self.config.baker_read_barriers() {
            summary.add_temp(Location::Unallocated(Policy::RequiresRegister));
        }
        summary
    }

    fn build_invoke(&self, args: &[InstId], return_ty: Type) -> LocationSummary {
        let mut summary = LocationSummary::new(CallKind::CallOnMainPath);
        let mut cursor = ManagedArgCursor::new();
        for (i, arg) in args.iter().enumerate() {
            summary.set_in_at(i, cursor.next_location(self.graph.node(*arg).ty));
        }
        summary.add_temp(Location::Gpr(METHOD_REG.code()));
        summary.set_out(abi::return_location(return_ty));
        summary
    }

    // ------------------------------------------------------------------
    // Emission.

    pub fn compile(mut self) -> Result<CompiledMethod, CodegenError> {
        self.compute_frame_layout()?;
        debug!(
            "compiling graph: {} blocks, {} instructions, frame {} bytes",
            self.graph.blocks.len(),
            self.graph.insts.len(),
            self.frame_size
        );

        self.generate_frame_entry();
        for pos in 0..self.graph.block_order.len() {
            let block = self.graph.block_order[pos];
            self.asm.bind(self.block_labels[block]);
            for i in 0..self.graph.blocks[block].insts.len() {
                let inst = self.graph.blocks[block].insts[i];
                self.visit(block, inst);
            }
        }
        let paths = std::mem::take(&mut self.slow_paths);
        for path in &paths {
            self.emit_slow_path(path);
        }
        self.slow_paths = paths;

        self.asm.finalize_code();
        let mut asm = std::mem::replace(&mut self.asm, Mips64Assembler::new());
        self.stack_maps
            .adjust_native_offsets(|off| asm.adjusted_position(off));
        for patch in &mut self.patches {
            patch.pc_insn_offset = asm.adjusted_position(patch.pc_insn_offset);
            patch.insn_offset = asm.adjusted_position(patch.insn_offset);
        }
        self.stack_maps.set_frame_info(FrameInfo {
            frame_size_in_bytes: self.frame_size,
            core_spill_mask: self.core_spill_mask,
            fpu_spill_mask: self.fpu_spill_mask,
        });

        let code = asm.into_code();
        debug!("emitted {} bytes, {} safepoints", code.len(), self.stack_maps.entries().len());
        Ok(CompiledMethod {
            code,
            frame_info: self.stack_maps.frame_info(),
            stack_maps: self.stack_maps.entries().to_vec(),
            patches: self.patches,
        })
    }

    fn compute_frame_layout(&mut self) -> Result<(), CodegenError> {
        let graph = self.graph;
        let callee_gp: u32 = CALLEE_SAVED_GP.iter().map(|r| 1u32 << r.code()).sum();
        let callee_fp: u32 = CALLEE_SAVED_FP.iter().map(|r| 1u32 << r.code()).sum();
        self.core_spill_mask = self.allocated_gprs & callee_gp;
        if graph.has_calls {
            self.core_spill_mask |= 1 << GpuReg::Ra.code();
        }
        self.fpu_spill_mask = self.allocated_fprs & callee_fp;

        // Largest live-register snapshot any slow path will spill.
        let mut slow_path_spill = 0u32;
        for summary in self.locations.iter().flatten() {
            if summary.call_kind() == CallKind::CallOnSlowPath {
                let gp = summary.live_registers.gpr & abi::caller_saved_gp_mask();
                let fp = summary.live_registers.fpr & abi::caller_saved_fp_mask();
                let bytes = 8 * (gp.count_ones() + fp.count_ones());
                slow_path_spill = slow_path_spill.max(bytes);
            }
        }

        let spill_size =
            8 * (self.core_spill_mask.count_ones() + self.fpu_spill_mask.count_ones());
        let vreg_area = round_up(4 * u32::from(graph.num_vregs), 8);
        let out_area = graph.outgoing_args_size.max(8);

        let empty = !graph.has_calls
            && graph.num_vregs == 0
            && graph.outgoing_args_size == 0
            && spill_size == 0
            && slow_path_spill == 0;
        if empty {
            self.frame_size = 0;
            return Ok(());
        }

        self.slow_path_spill_offset = out_area as i32;
        self.frame_size =
            round_up(out_area + slow_path_spill + vreg_area + spill_size, FRAME_ALIGNMENT);
        if self.frame_size > STACK_OVERFLOW_RESERVED_BYTES {
            return Err(CodegenError::FrameTooLarge(self.frame_size as usize));
        }
        Ok(())
    }

    fn generate_frame_entry(&mut self) {
        self.asm.bind(self.frame_entry_label);

        let do_overflow_check = self.graph.has_calls
            || self.frame_size >= STACK_OVERFLOW_RESERVED_BYTES / 2;
        if do_overflow_check && self.frame_size != 0 {
            self.asm.load_from_offset(
                LoadOperandType::Word,
                GpuReg::Zero,
                GpuReg::Sp,
                -(STACK_OVERFLOW_RESERVED_BYTES as i32),
            );
            self.record_pc_info_raw(0, 0);
        }

        if self.frame_size == 0 {
            return;
        }

        self.asm
            .daddiu64(GpuReg::Sp, GpuReg::Sp, -i64::from(self.frame_size), GpuReg::At);

        let mut ofs = self.frame_size as i32;
        for reg in CALLEE_SAVED_GP.iter().rev() {
            if self.core_spill_mask & (1 << reg.code()) != 0 {
                ofs -= 8;
                self.asm
                    .store_to_offset(StoreOperandType::Doubleword, *reg, GpuReg::Sp, ofs);
            }
        }
        for reg in CALLEE_SAVED_FP.iter().rev() {
            if self.fpu_spill_mask & (1 << reg.code()) != 0 {
                ofs -= 8;
                self.asm
                    .store_fpu_to_offset(StoreOperandType::Doubleword, *reg, GpuReg::Sp, ofs);
            }
        }

        self.asm
            .store_to_offset(StoreOperandType::Doubleword, METHOD_REG, GpuReg::Sp, 0);
    }

    fn generate_frame_exit(&mut self) {
        if self.frame_size != 0 {
            // Restore RA first; it starts the return's dependency chain.
            let mut ofs = self.frame_size as i32;
            for reg in CALLEE_SAVED_GP.iter().rev() {
                if self.core_spill_mask & (1 << reg.code()) != 0 {
                    ofs -= 8;
                    self.asm
                        .load_from_offset(LoadOperandType::Doubleword, *reg, GpuReg::Sp, ofs);
                }
            }
            for reg in CALLEE_SAVED_FP.iter().rev() {
                if self.fpu_spill_mask & (1 << reg.code()) != 0 {
                    ofs -= 8;
                    self.asm
                        .load_fpu_from_offset(LoadOperandType::Doubleword, *reg, GpuReg::Sp, ofs);
                }
            }
            self.asm
                .daddiu64(GpuReg::Sp, GpuReg::Sp, i64::from(self.frame_size), GpuReg::At);
        }
        self.asm.jic(GpuReg::Ra, 0);
    }

    // ------------------------------------------------------------------
    // Runtime calls and metadata.

    pub(super) fn invoke_runtime(&mut self, entrypoint: QuickEntrypoint, inst: InstId) {
        trace!("runtime call {entrypoint} at {:#x}", self.asm.size());
        self.asm.load_from_offset(
            LoadOperandType::Doubleword,
            GpuReg::T9,
            GpuReg::TR,
            entrypoint.thread_offset(),
        );
        self.asm.jalr_ra(GpuReg::T9);
        self.asm.nop();
        if entrypoint.can_trigger_gc() {
            self.record_pc_info(inst);
        }
    }

    pub(super) fn record_pc_info(&mut self, inst: InstId) {
        let dex_pc = self.graph.node(inst).dex_pc;
        let mask = self.locations(inst).live_registers.gpr;
        self.record_pc_info_raw(dex_pc, mask);
    }

    fn record_pc_info_raw(&mut self, dex_pc: u32, register_mask: u32) {
        self.stack_maps.push(StackMapEntry {
            native_pc_offset: self.asm.size() as u32,
            dex_pc,
            register_mask,
            stack_mask: 0,
        });
    }

    fn save_live_registers(&mut self, inst: InstId) {
        let live = self.locations(inst).live_registers;
        let gp = live.gpr & abi::caller_saved_gp_mask();
        let fp = live.fpr & abi::caller_saved_fp_mask();
        let mut ofs = self.slow_path_spill_offset;
        for code in 0..32 {
            if gp & (1 << code) != 0 {
                self.asm.store_to_offset(
                    StoreOperandType::Doubleword,
                    GpuReg::from_code(code),
                    GpuReg::Sp,
                    ofs,
                );
                ofs += 8;
            }
        }
        for code in 0..32 {
            if fp & (1 << code) != 0 {
                self.asm.store_fpu_to_offset(
                    StoreOperandType::Doubleword,
                    FpuReg::from_code(code),
                    GpuReg::Sp,
                    ofs,
                );
                ofs += 8;
            }
        }
    }

    fn restore_live_registers(&mut self, inst: InstId) {
        let live = self.locations(inst).live_registers;
        let gp = live.gpr & abi::caller_saved_gp_mask();
        let fp = live.fpr & abi::caller_saved_fp_mask();
        let mut ofs = self.slow_path_spill_offset;
        for code in 0..32 {
            if gp & (1 << code) != 0 {
                self.asm.load_from_offset(
                    LoadOperandType::Doubleword,
                    GpuReg::from_code(code),
                    GpuReg::Sp,
                    ofs,
                );
                ofs += 8;
            }
        }
        for code in 0..32 {
            if fp & (1 << code) != 0 {
                self.asm.load_fpu_from_offset(
                    LoadOperandType::Doubleword,
                    FpuReg::from_code(code),
                    GpuReg::Sp,
                    ofs,
                );
                ofs += 8;
            }
        }
    }

    pub(super) fn add_intrinsic_slow_path(&mut self, inst: InstId) -> (LabelId, LabelId) {
        let entry = self.asm.new_label();
        let exit = self.asm.new_label();
        self.slow_paths.push(SlowPath::Intrinsic { inst, entry, exit });
        (entry, exit)
    }

    fn add_patch(&mut self, kind: PatchKind, target: DexRef, pc_insn_offset: u32) {
        let insn_offset = self.asm.size() as u32;
        self.patches.push(LinkerPatch { kind, target, pc_insn_offset, insn_offset });
    }

    /// Emits the `auipc` half of a PC-relative pair and returns its offset;
    /// the caller emits the dependent instruction next and records the patch.
    fn emit_pc_relative_high(&mut self, reg: GpuReg) -> u32 {
        let offset = self.asm.size() as u32;
        self.asm.auipc(reg, PLACEHOLDER_HIGH);
        offset
    }

    // ------------------------------------------------------------------
    // Heap reference helpers.

    pub(super) fn maybe_unpoison_heap_reference(&mut self, reg: GpuReg) {
        if self.config.poison_heap_references {
            self.asm.subu(reg, GpuReg::Zero, reg);
        }
    }

    fn poison_heap_reference(&mut self, dst: GpuReg, src: GpuReg) {
        self.asm.subu(dst, GpuReg::Zero, src);
    }

    pub(super) fn mark_gc_card(&mut self, object: GpuReg, value: GpuReg, value_can_be_null: bool) {
        let done = if value_can_be_null {
            let label = self.asm.new_label();
            self.asm.beqzc(value, label);
            Some(label)
        } else {
            None
        };
        let card = GpuReg::At;
        let temp = GpuReg::TMP;
        self.asm.load_from_offset(
            LoadOperandType::Doubleword,
            card,
            GpuReg::TR,
            ThreadModel::CARD_TABLE_OFFSET,
        );
        self.asm.dsrl(temp, object, ObjectModel::CARD_SHIFT);
        self.asm.daddu(temp, card, temp);
        self.asm.sb(card, temp, 0);
        if let Some(label) = done {
            self.asm.bind(label);
        }
    }

    /// Loads a GC root (a class or string slot) and, when read barriers are
    /// on, arranges for it to be marked.
    fn generate_gc_root_field_load(
        &mut self,
        inst: InstId,
        root: Location,
        obj: GpuReg,
        offset: i32,
        with_read_barrier: bool,
    ) {
        let root_reg = gpr_of(root);
        if with_read_barrier && self.config.baker_read_barriers() {
            // Fast path: only call the mark helper while the GC is marking,
            // signalled by a non-null per-register entrypoint slot.
            self.asm
                .load_from_offset(LoadOperandType::UnsignedWord, root_reg, obj, offset);
            let entry = self.asm.new_label();
            let exit = self.asm.new_label();
            self.asm.load_from_offset(
                LoadOperandType::Doubleword,
                GpuReg::T9,
                GpuReg::TR,
                read_barrier_mark_entry_offset(root_reg.code()),
            );
            self.asm.bnezc(GpuReg::T9, entry);
            self.asm.bind(exit);
            self.slow_paths.push(SlowPath::ReadBarrierMark {
                entry,
                exit,
                ref_loc: root,
                entrypoint_in_t9: true,
            });
        } else if with_read_barrier {
            self.asm
                .load_from_offset(LoadOperandType::UnsignedWord, root_reg, obj, offset);
            let entry = self.asm.new_label();
            let exit = self.asm.new_label();
            self.asm.bc(entry);
            self.asm.bind(exit);
            self.slow_paths.push(SlowPath::ReadBarrierRoot {
                inst,
                entry,
                exit,
                out: root,
                root,
            });
        } else {
            self.asm
                .load_from_offset(LoadOperandType::UnsignedWord, root_reg, obj, offset);
        }
    }

    /// Baker read barrier for a reference field: load the object's lock word
    /// first and branch to marking if the read barrier state bit says gray.
    fn generate_field_load_with_baker_read_barrier(
        &mut self,
        ref_loc: Location,
        obj: GpuReg,
        offset: i32,
        index: Option<Location>,
        temp: Location,
    ) {
        let ref_reg = gpr_of(ref_loc);
        let temp_reg = gpr_of(temp);

        self.asm
            .load_from_offset(LoadOperandType::Word, temp_reg, obj, ObjectModel::MONITOR_OFFSET);
        self.asm.sync(0);

        match index {
            None => {
                self.asm
                    .load_from_offset(LoadOperandType::UnsignedWord, ref_reg, obj, offset);
            }
            Some(index) => {
                let index_reg = gpr_of(index);
                self.asm.dlsa(GpuReg::TMP, index_reg, obj, 2);
                self.asm
                    .load_from_offset(LoadOperandType::UnsignedWord, ref_reg, GpuReg::TMP, offset);
            }
        }
        self.maybe_unpoison_heap_reference(ref_reg);

        let entry = self.asm.new_label();
        let exit = self.asm.new_label();
        self.slow_paths.push(SlowPath::ReadBarrierMark {
            entry,
            exit,
            ref_loc,
            entrypoint_in_t9: false,
        });
        // Shift the state bits into the sign; gray objects go negative.
        self.asm
            .sll(temp_reg, temp_reg, 31 - ObjectModel::READ_BARRIER_STATE_SHIFT);
        self.asm.bltzc(temp_reg, entry);
        self.asm.bind(exit);
    }

    /// Non-Baker read barrier: the loaded reference is unconditionally
    /// reprocessed by the runtime.
    fn generate_read_barrier_slow(
        &mut self,
        inst: InstId,
        out: Location,
        obj: Location,
        offset: i32,
        index: Option<Location>,
        shift: u32,
    ) {
        let entry = self.asm.new_label();
        let exit = self.asm.new_label();
        self.asm.bc(entry);
        self.asm.bind(exit);
        self.slow_paths.push(SlowPath::ReadBarrierHeapReference {
            inst,
            entry,
            exit,
            out,
            obj,
            offset,
            index,
            shift,
        });
    }

    // ------------------------------------------------------------------
    // Slow path emission.

    fn emit_slow_path(&mut self, path: &SlowPath) {
        match path {
            SlowPath::ThrowNullPointer { inst, entry } => {
                self.asm.bind(*entry);
                self.invoke_runtime(QuickEntrypoint::ThrowNullPointer, *inst);
            }
            SlowPath::ThrowDivZero { inst, entry } => {
                self.asm.bind(*entry);
                self.invoke_runtime(QuickEntrypoint::ThrowDivZero, *inst);
            }
            SlowPath::ThrowArrayBounds { inst, entry, index, length } => {
                self.asm.bind(*entry);
                let mut moves = ParallelMoveResolver::new();
                moves.add_move(*index, Location::Gpr(GpuReg::A0.code()), Type::Int32);
                moves.add_move(*length, Location::Gpr(GpuReg::A1.code()), Type::Int32);
                moves.resolve(self);
                self.invoke_runtime(QuickEntrypoint::ThrowArrayBounds, *inst);
            }
            SlowPath::Suspend { inst, entry, resume } => {
                self.asm.bind(*entry);
                self.save_live_registers(*inst);
                self.invoke_runtime(QuickEntrypoint::TestSuspend, *inst);
                self.restore_live_registers(*inst);
                self.asm.bc(*resume);
            }
            SlowPath::LoadClass { inst, entry, exit, type_ref, do_clinit, out } => {
                self.asm.bind(*entry);
                self.save_live_registers(*inst);
                self.asm.load_const32(GpuReg::A0, type_ref.0 as i32);
                let entrypoint = if *do_clinit {
                    QuickEntrypoint::InitializeStaticStorage
                } else {
                    QuickEntrypoint::InitializeType
                };
                self.invoke_runtime(entrypoint, *inst);
                if out.is_valid() {
                    self.move_location(*out, abi::return_location(Type::Reference), Type::Reference);
                }
                self.restore_live_registers(*inst);
                self.asm.bc(*exit);
            }
            SlowPath::LoadString { inst, entry, exit, out } => {
                self.asm.bind(*entry);
                let string_ref = match self.graph.node(*inst).op {
                    Inst::LoadString { load_kind: DataLoadKind::BssEntry(r) } => r,
                    Inst::LoadString { load_kind: DataLoadKind::RuntimeCall(r) } => r,
                    _ => panic!("string slow path on a non-string instruction"),
                };
                self.save_live_registers(*inst);
                self.asm.load_const32(GpuReg::A0, string_ref.0 as i32);
                self.invoke_runtime(QuickEntrypoint::ResolveString, *inst);
                self.move_location(*out, abi::return_location(Type::Reference), Type::Reference);
                self.restore_live_registers(*inst);
                self.asm.bc(*exit);
            }
            SlowPath::Deoptimize { inst, entry } => {
                self.asm.bind(*entry);
                self.save_live_registers(*inst);
                self.asm.load_const32(GpuReg::A0, 0);
                self.invoke_runtime(QuickEntrypoint::Deoptimize, *inst);
            }
            SlowPath::ReadBarrierMark { entry, exit, ref_loc, entrypoint_in_t9 } => {
                self.asm.bind(*entry);
                let ref_reg = gpr_of(*ref_loc);
                if !entrypoint_in_t9 {
                    self.asm.load_from_offset(
                        LoadOperandType::Doubleword,
                        GpuReg::T9,
                        GpuReg::TR,
                        read_barrier_mark_entry_offset(ref_reg.code()),
                    );
                }
                // The helper takes and returns the reference in ref_reg and
                // preserves all other registers.
                self.asm.jalr_ra(GpuReg::T9);
                self.asm.nop();
                self.asm.bc(*exit);
            }
            SlowPath::ReadBarrierHeapReference {
                inst,
                entry,
                exit,
                out,
                obj,
                offset,
                index,
                shift,
            } => {
                self.asm.bind(*entry);
                self.save_live_registers(*inst);
                let mut moves = ParallelMoveResolver::new();
                moves.add_move(*out, Location::Gpr(GpuReg::A0.code()), Type::Reference);
                moves.add_move(*obj, Location::Gpr(GpuReg::A1.code()), Type::Reference);
                if let Some(index) = index {
                    moves.add_move(*index, Location::Gpr(GpuReg::A2.code()), Type::Int32);
                }
                moves.resolve(self);
                if index.is_some() {
                    self.asm.dsll(GpuReg::A2, GpuReg::A2, *shift);
                    self.asm.addiu32(GpuReg::A2, GpuReg::A2, *offset);
                } else {
                    self.asm.load_const32(GpuReg::A2, *offset);
                }
                self.invoke_runtime(QuickEntrypoint::ReadBarrierSlow, *inst);
                self.move_location(*out, abi::return_location(Type::Reference), Type::Reference);
                self.restore_live_registers(*inst);
                self.asm.bc(*exit);
            }
            SlowPath::ReadBarrierRoot { inst, entry, exit, out, root } => {
                self.asm.bind(*entry);
                self.save_live_registers(*inst);
                self.move_location(Location::Gpr(GpuReg::A0.code()), *root, Type::Reference);
                self.invoke_runtime(QuickEntrypoint::ReadBarrierForRootSlow, *inst);
                self.move_location(*out, abi::return_location(Type::Reference), Type::Reference);
                self.restore_live_registers(*inst);
                self.asm.bc(*exit);
            }
            SlowPath::StoreArrayElement { inst, entry, exit, array, index, value } => {
                self.asm.bind(*entry);
                self.save_live_registers(*inst);
                let mut moves = ParallelMoveResolver::new();
                moves.add_move(*array, Location::Gpr(GpuReg::A0.code()), Type::Reference);
                moves.add_move(*index, Location::Gpr(GpuReg::A1.code()), Type::Int32);
                moves.add_move(*value, Location::Gpr(GpuReg::A2.code()), Type::Reference);
                moves.resolve(self);
                self.invoke_runtime(QuickEntrypoint::AputObject, *inst);
                self.restore_live_registers(*inst);
                self.asm.bc(*exit);
            }
            SlowPath::Intrinsic { inst, entry, exit } => {
                self.asm.bind(*entry);
                self.save_live_registers(*inst);
                self.move_invoke_arguments(*inst);
                self.generate_invoke_call(*inst, GpuReg::TMP);
                let node = self.graph.node(*inst);
                if node.ty != Type::Void {
                    let out = self.locations(*inst).out();
                    self.move_location(out, abi::return_location(node.ty), node.ty);
                }
                self.restore_live_registers(*inst);
                self.asm.bc(*exit);
            }
        }
    }

    // ------------------------------------------------------------------
    // Moves.

    pub(super) fn move_location(&mut self, destination: Location, source: Location, ty: Type) {
        if source == destination {
            return;
        }
        let is64 = ty.is_64bit();
        match destination {
            Location::Gpr(_) => {
                if source.is_register() {
                    self.asm.move_(gpr_of(destination), gpr_of(source));
                } else if source.is_fpu_register() {
                    if is64 {
                        self.asm.dmfc1(gpr_of(destination), fpr_of(source));
                    } else {
                        self.asm.mfc1(gpr_of(destination), fpr_of(source));
                    }
                } else if source.is_constant() {
                    let value = source.as_constant().as_i64();
                    if is64 {
                        self.asm.load_const64(gpr_of(destination), value);
                    } else {
                        self.asm.load_const32(gpr_of(destination), value as i32);
                    }
                } else {
                    let load_ty = if is64 {
                        LoadOperandType::Doubleword
                    } else {
                        LoadOperandType::Word
                    };
                    self.asm.load_from_offset(
                        load_ty,
                        gpr_of(destination),
                        GpuReg::Sp,
                        source.stack_offset(),
                    );
                }
            }
            Location::Fpr(_) => {
                if source.is_fpu_register() {
                    if is64 {
                        self.asm.mov_d(fpr_of(destination), fpr_of(source));
                    } else {
                        self.asm.mov_s(fpr_of(destination), fpr_of(source));
                    }
                } else if source.is_register() {
                    if is64 {
                        self.asm.dmtc1(gpr_of(source), fpr_of(destination));
                    } else {
                        self.asm.mtc1(gpr_of(source), fpr_of(destination));
                    }
                } else if source.is_constant() {
                    let value = source.as_constant().as_i64();
                    if value == 0 {
                        if is64 {
                            self.asm.dmtc1(GpuReg::Zero, fpr_of(destination));
                        } else {
                            self.asm.mtc1(GpuReg::Zero, fpr_of(destination));
                        }
                    } else if is64 {
                        self.asm.load_const64(GpuReg::At, value);
                        self.asm.dmtc1(GpuReg::At, fpr_of(destination));
                    } else {
                        self.asm.load_const32(GpuReg::At, value as i32);
                        self.asm.mtc1(GpuReg::At, fpr_of(destination));
                    }
                } else {
                    let load_ty = if is64 {
                        LoadOperandType::Doubleword
                    } else {
                        LoadOperandType::Word
                    };
                    self.asm.load_fpu_from_offset(
                        load_ty,
                        fpr_of(destination),
                        GpuReg::Sp,
                        source.stack_offset(),
                    );
                }
            }
            Location::StackSlot(_) | Location::DoubleStackSlot(_) => {
                let store_ty = if is64 {
                    StoreOperandType::Doubleword
                } else {
                    StoreOperandType::Word
                };
                if source.is_register() {
                    self.asm.store_to_offset(
                        store_ty,
                        gpr_of(source),
                        GpuReg::Sp,
                        destination.stack_offset(),
                    );
                } else if source.is_fpu_register() {
                    self.asm.store_fpu_to_offset(
                        store_ty,
                        fpr_of(source),
                        GpuReg::Sp,
                        destination.stack_offset(),
                    );
                } else if source.is_constant() {
                    let value = source.as_constant().as_i64();
                    let reg = if value == 0 {
                        GpuReg::Zero
                    } else if is64 {
                        self.asm.load_const64(GpuReg::TMP, value);
                        GpuReg::TMP
                    } else {
                        self.asm.load_const32(GpuReg::TMP, value as i32);
                        GpuReg::TMP
                    };
                    self.asm
                        .store_to_offset(store_ty, reg, GpuReg::Sp, destination.stack_offset());
                } else {
                    let load_ty = if is64 {
                        LoadOperandType::Doubleword
                    } else {
                        LoadOperandType::Word
                    };
                    self.asm.load_from_offset(
                        load_ty,
                        GpuReg::TMP,
                        GpuReg::Sp,
                        source.stack_offset(),
                    );
                    self.asm.store_to_offset(
                        store_ty,
                        GpuReg::TMP,
                        GpuReg::Sp,
                        destination.stack_offset(),
                    );
                }
            }
            _ => panic!("unsupported move destination {destination:?}"),
        }
    }

    fn swap_locations(&mut self, loc1: Location, loc2: Location, ty: Type) {
        let is64 = ty.is_64bit();
        if loc1.is_register() && loc2.is_register() {
            let (r1, r2) = (gpr_of(loc1), gpr_of(loc2));
            self.asm.move_(GpuReg::TMP, r1);
            self.asm.move_(r1, r2);
            self.asm.move_(r2, GpuReg::TMP);
        } else if loc1.is_fpu_register() && loc2.is_fpu_register() {
            let (f1, f2) = (fpr_of(loc1), fpr_of(loc2));
            if is64 {
                self.asm.mov_d(FpuReg::FTMP, f1);
                self.asm.mov_d(f1, f2);
                self.asm.mov_d(f2, FpuReg::FTMP);
            } else {
                self.asm.mov_s(FpuReg::FTMP, f1);
                self.asm.mov_s(f1, f2);
                self.asm.mov_s(f2, FpuReg::FTMP);
            }
        } else if loc1.is_any_register() || loc2.is_any_register() {
            let (reg_loc, slot) = if loc1.is_any_register() { (loc1, loc2) } else { (loc2, loc1) };
            let load_ty = if is64 { LoadOperandType::Doubleword } else { LoadOperandType::Word };
            let store_ty = if is64 { StoreOperandType::Doubleword } else { StoreOperandType::Word };
            if reg_loc.is_register() {
                let reg = gpr_of(reg_loc);
                self.asm
                    .load_from_offset(load_ty, GpuReg::TMP, GpuReg::Sp, slot.stack_offset());
                self.asm.store_to_offset(store_ty, reg, GpuReg::Sp, slot.stack_offset());
                self.asm.move_(reg, GpuReg::TMP);
            } else {
                let reg = fpr_of(reg_loc);
                if is64 {
                    self.asm.mov_d(FpuReg::FTMP, reg);
                } else {
                    self.asm.mov_s(FpuReg::FTMP, reg);
                }
                self.asm
                    .load_fpu_from_offset(load_ty, reg, GpuReg::Sp, slot.stack_offset());
                self.asm
                    .store_fpu_to_offset(store_ty, FpuReg::FTMP, GpuReg::Sp, slot.stack_offset());
            }
        } else {
            // Two stack slots; TMP carries one side, FTMP the other.
            let load_ty = if is64 { LoadOperandType::Doubleword } else { LoadOperandType::Word };
            let store_ty = if is64 { StoreOperandType::Doubleword } else { StoreOperandType::Word };
            self.asm
                .load_from_offset(load_ty, GpuReg::TMP, GpuReg::Sp, loc1.stack_offset());
            self.asm
                .load_fpu_from_offset(load_ty, FpuReg::FTMP, GpuReg::Sp, loc2.stack_offset());
            self.asm
                .store_to_offset(store_ty, GpuReg::TMP, GpuReg::Sp, loc2.stack_offset());
            self.asm
                .store_fpu_to_offset(store_ty, FpuReg::FTMP, GpuReg::Sp, loc1.stack_offset());
        }
    }

    pub(super) fn store_const_to_offset(
        &mut self,
        ty: StoreOperandType,
        value: i64,
        base: GpuReg,
        offset: i32,
        scratch: GpuReg,
    ) {
        let reg = if value == 0 {
            GpuReg::Zero
        } else {
            assert_ne!(scratch, base);
            if ty == StoreOperandType::Doubleword {
                self.asm.load_const64(scratch, value);
            } else {
                self.asm.load_const32(scratch, value as i32);
            }
            scratch
        };
        self.asm.store_to_offset(ty, reg, base, offset);
    }

    // ------------------------------------------------------------------
    // The instruction visitor.

    fn visit(&mut self, block: BlockId, id: InstId) {
        let graph = self.graph;
        let node = graph.node(id);

        if self.locations(id).is_intrinsified() {
            let intrinsic = match &node.op {
                Inst::InvokeStaticOrDirect { intrinsic: Some(i), .. } => *i,
                Inst::InvokeVirtual { intrinsic: Some(i), .. } => *i,
                _ => panic!("intrinsified summary on a non-invoke"),
            };
            intrinsics::generate(self, intrinsic, id);
            return;
        }

        match &node.op {
            Inst::Constant(_) | Inst::ParameterValue { .. } | Inst::CurrentMethod => {}

            Inst::Add { .. } | Inst::Sub { .. } => self.visit_add_sub(id),
            Inst::And { .. } | Inst::Or { .. } | Inst::Xor { .. } => self.visit_logic(id),
            Inst::Mul { .. } => self.visit_mul(id),
            Inst::Div { .. } | Inst::Rem { .. } => self.visit_div_rem(id),
            Inst::Shl { .. } | Inst::Shr { .. } | Inst::UShr { .. } | Inst::Ror { .. } => {
                self.visit_shift(id)
            }
            Inst::Neg { .. } => self.visit_neg(id),
            Inst::Not { .. } => {
                let summary = self.locations(id).clone();
                self.asm
                    .nor(gpr_of(summary.out()), gpr_of(summary.in_at(0)), GpuReg::Zero);
            }
            Inst::BooleanNot { .. } => {
                let summary = self.locations(id).clone();
                self.asm.xori(gpr_of(summary.out()), gpr_of(summary.in_at(0)), 1);
            }
            Inst::Compare { lhs, bias, .. } => self.visit_compare(id, *lhs, *bias),
            Inst::Condition { cond, lhs, bias, .. } => {
                if self.fused_conds[id] {
                    return;
                }
                let summary = self.locations(id).clone();
                let in_ty = graph.node(*lhs).ty;
                if in_ty.is_fp() {
                    self.generate_fp_compare(*cond, *bias, in_ty, &summary);
                } else {
                    self.generate_int_long_compare(*cond, in_ty.is_64bit(), &summary);
                }
            }
            Inst::TypeConversion { input } => self.visit_type_conversion(id, *input),

            Inst::Goto { target } => {
                if graph.next_in_order(block) != Some(*target) {
                    self.asm.bc(self.block_labels[*target]);
                }
            }
            Inst::If { cond, true_target, false_target } => {
                let next = graph.next_in_order(block);
                let true_label =
                    (next != Some(*true_target)).then(|| self.block_labels[*true_target]);
                let false_label =
                    (next != Some(*false_target)).then(|| self.block_labels[*false_target]);
                self.generate_test_and_branch(id, *cond, true_label, false_label);
            }
            Inst::Deoptimize { cond } => {
                let entry = self.asm.new_label();
                self.slow_paths.push(SlowPath::Deoptimize { inst: id, entry });
                self.generate_test_and_branch(id, *cond, Some(entry), None);
            }
            Inst::Return { .. } => self.generate_frame_exit(),
            Inst::PackedSwitch { start_value, targets, default_target, .. } => {
                let summary = self.locations(id).clone();
                self.visit_packed_switch(
                    block,
                    gpr_of(summary.in_at(0)),
                    *start_value,
                    targets,
                    *default_target,
                );
            }

            Inst::NullCheck { .. } => self.visit_null_check(id),
            Inst::BoundsCheck { .. } => {
                let summary = self.locations(id).clone();
                let entry = self.asm.new_label();
                self.slow_paths.push(SlowPath::ThrowArrayBounds {
                    inst: id,
                    entry,
                    index: summary.in_at(0),
                    length: summary.in_at(1),
                });
                self.asm
                    .bgeuc(gpr_of(summary.in_at(0)), gpr_of(summary.in_at(1)), entry);
            }
            Inst::DivZeroCheck { .. } => {
                let summary = self.locations(id).clone();
                let entry = self.asm.new_label();
                self.slow_paths.push(SlowPath::ThrowDivZero { inst: id, entry });
                let value = summary.in_at(0);
                if value.is_constant() {
                    if value.as_constant().is_zero_bits() {
                        self.asm.bc(entry);
                    }
                } else {
                    self.asm.beqzc(gpr_of(value), entry);
                }
            }
            Inst::SuspendCheck => {
                let entry = self.asm.new_label();
                let resume = self.asm.new_label();
                self.asm.load_from_offset(
                    LoadOperandType::UnsignedHalfword,
                    GpuReg::TMP,
                    GpuReg::TR,
                    ThreadModel::FLAGS_OFFSET,
                );
                self.asm.bnezc(GpuReg::TMP, entry);
                self.asm.bind(resume);
                self.slow_paths.push(SlowPath::Suspend { inst: id, entry, resume });
            }
            Inst::ClinitCheck { class } => self.visit_clinit_check(id, *class),

            Inst::LoadClass { load_kind, needs_access_check } => {
                self.visit_load_class(id, *load_kind, *needs_access_check)
            }
            Inst::LoadString { load_kind } => self.visit_load_string(id, *load_kind),

            Inst::InstanceFieldGet { field, .. } | Inst::StaticFieldGet { field, .. } => {
                self.visit_field_get(id, *field)
            }
            Inst::InstanceFieldSet { field, value_can_be_null, .. }
            | Inst::StaticFieldSet { field, value_can_be_null, .. } => {
                self.visit_field_set(id, *field, *value_can_be_null)
            }
            Inst::ArrayGet { .. } => self.visit_array_get(id),
            Inst::ArraySet { value_can_be_null, needs_type_check, .. } => {
                self.visit_array_set(id, *value_can_be_null, *needs_type_check)
            }
            Inst::ArrayLength { .. } => {
                let summary = self.locations(id).clone();
                self.asm.load_from_offset(
                    LoadOperandType::Word,
                    gpr_of(summary.out()),
                    gpr_of(summary.in_at(0)),
                    ObjectModel::ARRAY_LENGTH_OFFSET,
                );
            }

            Inst::InvokeStaticOrDirect { .. } | Inst::InvokeVirtual { .. } => {
                let temp_reg = gpr_of(self.locations(id).temp(0));
                self.generate_invoke_call(id, temp_reg);
            }

            Inst::MonitorOperation { is_enter, .. } => {
                let entrypoint = if *is_enter {
                    QuickEntrypoint::LockObject
                } else {
                    QuickEntrypoint::UnlockObject
                };
                self.invoke_runtime(entrypoint, id);
            }

            Inst::VecOp { .. } => vector::generate(self, id),
        }
    }

    // ------------------------------------------------------------------
    // Arithmetic.

    fn visit_add_sub(&mut self, id: InstId) {
        let node = self.graph.node(id);
        let summary = self.locations(id).clone();
        let is_sub = matches!(node.op, Inst::Sub { .. });
        if node.ty.is_fp() {
            let dst = fpr_of(summary.out());
            let lhs = fpr_of(summary.in_at(0));
            let rhs = fpr_of(summary.in_at(1));
            match (is_sub, node.ty) {
                (false, Type::Float32) => self.asm.add_s(dst, lhs, rhs),
                (false, _) => self.asm.add_d(dst, lhs, rhs),
                (true, Type::Float32) => self.asm.sub_s(dst, lhs, rhs),
                (true, _) => self.asm.sub_d(dst, lhs, rhs),
            }
            return;
        }
        let dst = gpr_of(summary.out());
        let lhs = gpr_of(summary.in_at(0));
        let rhs = summary.in_at(1);
        let is64 = node.ty.is_64bit();
        if rhs.is_constant() {
            let mut imm = rhs.as_constant().as_i64();
            if is_sub {
                imm = imm.wrapping_neg();
            }
            if is64 {
                self.asm.daddiu64(dst, lhs, imm, GpuReg::At);
            } else {
                self.asm.addiu32(dst, lhs, imm as i32);
            }
        } else {
            let rhs = gpr_of(rhs);
            match (is_sub, is64) {
                (false, false) => self.asm.addu(dst, lhs, rhs),
                (false, true) => self.asm.daddu(dst, lhs, rhs),
                (true, false) => self.asm.subu(dst, lhs, rhs),
                (true, true) => self.asm.dsubu(dst, lhs, rhs),
            }
        }
    }

    fn visit_logic(&mut self, id: InstId) {
        let node = self.graph.node(id);
        let summary = self.locations(id).clone();
        let dst = gpr_of(summary.out());
        let lhs = gpr_of(summary.in_at(0));
        let rhs = summary.in_at(1);
        if rhs.is_constant() {
            let imm = rhs.as_constant().as_i64() as u16;
            match node.op {
                Inst::And { .. } => self.asm.andi(dst, lhs, imm),
                Inst::Or { .. } => self.asm.ori(dst, lhs, imm),
                Inst::Xor { .. } => self.asm.xori(dst, lhs, imm),
                _ => unreachable!(),
            }
        } else {
            let rhs = gpr_of(rhs);
            match node.op {
                Inst::And { .. } => self.asm.and(dst, lhs, rhs),
                Inst::Or { .. } => self.asm.or(dst, lhs, rhs),
                Inst::Xor { .. } => self.asm.xor(dst, lhs, rhs),
                _ => unreachable!(),
            }
        }
    }

    fn visit_mul(&mut self, id: InstId) {
        let node = self.graph.node(id);
        let summary = self.locations(id).clone();
        match node.ty {
            Type::Int32 => self.asm.mul(
                gpr_of(summary.out()),
                gpr_of(summary.in_at(0)),
                gpr_of(summary.in_at(1)),
            ),
            Type::Int64 => self.asm.dmul(
                gpr_of(summary.out()),
                gpr_of(summary.in_at(0)),
                gpr_of(summary.in_at(1)),
            ),
            Type::Float32 => self.asm.mul_s(
                fpr_of(summary.out()),
                fpr_of(summary.in_at(0)),
                fpr_of(summary.in_at(1)),
            ),
            Type::Float64 => self.asm.mul_d(
                fpr_of(summary.out()),
                fpr_of(summary.in_at(0)),
                fpr_of(summary.in_at(1)),
            ),
            _ => panic!("unexpected mul type {:?}", node.ty),
        }
    }

    fn visit_neg(&mut self, id: InstId) {
        let node = self.graph.node(id);
        let summary = self.locations(id).clone();
        match node.ty {
            Type::Int32 => {
                self.asm
                    .subu(gpr_of(summary.out()), GpuReg::Zero, gpr_of(summary.in_at(0)))
            }
            Type::Int64 => {
                self.asm
                    .dsubu(gpr_of(summary.out()), GpuReg::Zero, gpr_of(summary.in_at(0)))
            }
            Type::Float32 => self.asm.neg_s(fpr_of(summary.out()), fpr_of(summary.in_at(0))),
            Type::Float64 => self.asm.neg_d(fpr_of(summary.out()), fpr_of(summary.in_at(0))),
            _ => panic!("unexpected neg type {:?}", node.ty),
        }
    }

    fn visit_shift(&mut self, id: InstId) {
        let node = self.graph.node(id);
        let summary = self.locations(id).clone();
        let dst = gpr_of(summary.out());
        let lhs = gpr_of(summary.in_at(0));
        let rhs = summary.in_at(1);
        let is64 = node.ty.is_64bit();
        if rhs.is_constant() {
            let mask = if is64 { 63 } else { 31 };
            let shamt = (rhs.as_constant().as_i64() & mask) as u32;
            if shamt == 0 {
                if dst != lhs {
                    self.asm.move_(dst, lhs);
                }
            } else if !is64 {
                match node.op {
                    Inst::Shl { .. } => self.asm.sll(dst, lhs, shamt),
                    Inst::Shr { .. } => self.asm.sra(dst, lhs, shamt),
                    Inst::UShr { .. } => self.asm.srl(dst, lhs, shamt),
                    Inst::Ror { .. } => self.asm.rotr(dst, lhs, shamt),
                    _ => unreachable!(),
                }
            } else if shamt < 32 {
                match node.op {
                    Inst::Shl { .. } => self.asm.dsll(dst, lhs, shamt),
                    Inst::Shr { .. } => self.asm.dsra(dst, lhs, shamt),
                    Inst::UShr { .. } => self.asm.dsrl(dst, lhs, shamt),
                    Inst::Ror { .. } => self.asm.drotr(dst, lhs, shamt),
                    _ => unreachable!(),
                }
            } else {
                match node.op {
                    Inst::Shl { .. } => self.asm.dsll32(dst, lhs, shamt - 32),
                    Inst::Shr { .. } => self.asm.dsra32(dst, lhs, shamt - 32),
                    Inst::UShr { .. } => self.asm.dsrl32(dst, lhs, shamt - 32),
                    Inst::Ror { .. } => self.asm.drotr32(dst, lhs, shamt - 32),
                    _ => unreachable!(),
                }
            }
        } else {
            let rhs = gpr_of(rhs);
            if !is64 {
                match node.op {
                    Inst::Shl { .. } => self.asm.sllv(dst, lhs, rhs),
                    Inst::Shr { .. } => self.asm.srav(dst, lhs, rhs),
                    Inst::UShr { .. } => self.asm.srlv(dst, lhs, rhs),
                    Inst::Ror { .. } => self.asm.rotrv(dst, lhs, rhs),
                    _ => unreachable!(),
                }
            } else {
                match node.op {
                    Inst::Shl { .. } => self.asm.dsllv(dst, lhs, rhs),
                    Inst::Shr { .. } => self.asm.dsrav(dst, lhs, rhs),
                    Inst::UShr { .. } => self.asm.dsrlv(dst, lhs, rhs),
                    Inst::Ror { .. } => self.asm.drotrv(dst, lhs, rhs),
                    _ => unreachable!(),
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Division.

    fn visit_div_rem(&mut self, id: InstId) {
        let node = self.graph.node(id);
        let summary = self.locations(id).clone();
        let is_div = matches!(node.op, Inst::Div { .. });
        match node.ty {
            Type::Int32 | Type::Int64 => self.generate_div_rem_integral(id, is_div),
            Type::Float32 => {
                if is_div {
                    self.asm.div_s(
                        fpr_of(summary.out()),
                        fpr_of(summary.in_at(0)),
                        fpr_of(summary.in_at(1)),
                    );
                } else {
                    self.invoke_runtime(QuickEntrypoint::FmodF, id);
                }
            }
            Type::Float64 => {
                if is_div {
                    self.asm.div_d(
                        fpr_of(summary.out()),
                        fpr_of(summary.in_at(0)),
                        fpr_of(summary.in_at(1)),
                    );
                } else {
                    self.invoke_runtime(QuickEntrypoint::Fmod, id);
                }
            }
            _ => panic!("unexpected div/rem type {:?}", node.ty),
        }
    }

    fn generate_div_rem_integral(&mut self, id: InstId, is_div: bool) {
        let node = self.graph.node(id);
        let summary = self.locations(id).clone();
        let is64 = node.ty.is_64bit();
        let out = gpr_of(summary.out());
        let second = summary.in_at(1);

        if second.is_constant() {
            let imm = second.as_constant().as_i64();
            let dividend = gpr_of(summary.in_at(0));
            if imm == 0 {
                // A preceding DivZeroCheck keeps this unreachable.
            } else if imm == 1 || imm == -1 {
                self.div_rem_one_or_minus_one(out, dividend, imm, is_div, is64);
            } else if imm.unsigned_abs().is_power_of_two() {
                self.div_rem_by_power_of_two(out, dividend, imm, is_div, is64);
            } else {
                self.div_rem_with_any_constant(out, dividend, imm, is_div, is64);
            }
        } else {
            let dividend = gpr_of(summary.in_at(0));
            let divisor = gpr_of(second);
            match (is_div, is64) {
                (true, false) => self.asm.div(out, dividend, divisor),
                (true, true) => self.asm.ddiv(out, dividend, divisor),
                (false, false) => self.asm.mod_(out, dividend, divisor),
                (false, true) => self.asm.dmod(out, dividend, divisor),
            }
        }
    }

    fn div_rem_one_or_minus_one(
        &mut self,
        out: GpuReg,
        dividend: GpuReg,
        imm: i64,
        is_div: bool,
        is64: bool,
    ) {
        if !is_div {
            self.asm.move_(out, GpuReg::Zero);
        } else if imm == -1 {
            if is64 {
                self.asm.dsubu(out, GpuReg::Zero, dividend);
            } else {
                self.asm.subu(out, GpuReg::Zero, dividend);
            }
        } else if out != dividend {
            self.asm.move_(out, dividend);
        }
    }

    fn div_rem_by_power_of_two(
        &mut self,
        out: GpuReg,
        dividend: GpuReg,
        imm: i64,
        is_div: bool,
        is64: bool,
    ) {
        let abs_imm = imm.unsigned_abs();
        let ctz_imm = abs_imm.trailing_zeros();
        let tmp = GpuReg::TMP;

        if is_div {
            if !is64 {
                if ctz_imm == 1 {
                    // Division by +/-2 is common enough for a shorter path.
                    self.asm.srl(tmp, dividend, 31);
                } else {
                    self.asm.sra(tmp, dividend, 31);
                    self.asm.srl(tmp, tmp, 32 - ctz_imm);
                }
                self.asm.addu(out, dividend, tmp);
                self.asm.sra(out, out, ctz_imm);
                if imm < 0 {
                    self.asm.subu(out, GpuReg::Zero, out);
                }
            } else {
                if ctz_imm == 1 {
                    self.asm.dsrl32(tmp, dividend, 31);
                } else {
                    self.asm.dsra32(tmp, dividend, 31);
                    if ctz_imm > 32 {
                        self.asm.dsrl(tmp, tmp, 64 - ctz_imm);
                    } else {
                        self.asm.dsrl32(tmp, tmp, 32 - ctz_imm);
                    }
                }
                self.asm.daddu(out, dividend, tmp);
                if ctz_imm < 32 {
                    self.asm.dsra(out, out, ctz_imm);
                } else {
                    self.asm.dsra32(out, out, ctz_imm - 32);
                }
                if imm < 0 {
                    self.asm.dsubu(out, GpuReg::Zero, out);
                }
            }
        } else if !is64 {
            if ctz_imm == 1 {
                self.asm.sra(tmp, dividend, 31);
                self.asm.subu(out, dividend, tmp);
                self.asm.andi(out, out, 1);
                self.asm.addu(out, out, tmp);
            } else {
                self.asm.sra(tmp, dividend, 31);
                self.asm.srl(tmp, tmp, 32 - ctz_imm);
                self.asm.addu(out, dividend, tmp);
                self.asm.ins(out, GpuReg::Zero, ctz_imm, 32 - ctz_imm);
                self.asm.subu(out, out, tmp);
            }
        } else if ctz_imm == 1 {
            self.asm.dsra32(tmp, dividend, 31);
            self.asm.dsubu(out, dividend, tmp);
            self.asm.andi(out, out, 1);
            self.asm.daddu(out, out, tmp);
        } else {
            self.asm.dsra32(tmp, dividend, 31);
            if ctz_imm > 32 {
                self.asm.dsrl(tmp, tmp, 64 - ctz_imm);
            } else {
                self.asm.dsrl32(tmp, tmp, 32 - ctz_imm);
            }
            self.asm.daddu(out, dividend, tmp);
            self.asm.dbl_ins(out, GpuReg::Zero, ctz_imm, 64 - ctz_imm);
            self.asm.dsubu(out, out, tmp);
        }
    }

    fn div_rem_with_any_constant(
        &mut self,
        out: GpuReg,
        dividend: GpuReg,
        imm: i64,
        is_div: bool,
        is64: bool,
    ) {
        let (magic, shift) = magic_and_shift_for_div_rem(imm, is64);
        let tmp = GpuReg::TMP;

        if !is64 {
            self.asm.load_const32(tmp, magic as i32);
            self.asm.muh(tmp, dividend, tmp);
            if imm > 0 && magic < 0 {
                self.asm.addu(tmp, tmp, dividend);
            } else if imm < 0 && magic > 0 {
                self.asm.subu(tmp, tmp, dividend);
            }
            if shift != 0 {
                self.asm.sra(tmp, tmp, shift);
            }
            if is_div {
                self.asm.sra(out, tmp, 31);
                self.asm.subu(out, tmp, out);
            } else {
                self.asm.sra(GpuReg::At, tmp, 31);
                self.asm.subu(GpuReg::At, tmp, GpuReg::At);
                self.asm.load_const32(tmp, imm as i32);
                self.asm.mul(tmp, GpuReg::At, tmp);
                self.asm.subu(out, dividend, tmp);
            }
        } else {
            self.asm.load_const64(tmp, magic);
            self.asm.dmuh(tmp, dividend, tmp);
            if imm > 0 && magic < 0 {
                self.asm.daddu(tmp, tmp, dividend);
            } else if imm < 0 && magic > 0 {
                self.asm.dsubu(tmp, tmp, dividend);
            }
            if shift >= 32 {
                self.asm.dsra32(tmp, tmp, shift - 32);
            } else if shift > 0 {
                self.asm.dsra(tmp, tmp, shift);
            }
            if is_div {
                self.asm.dsra32(out, tmp, 31);
                self.asm.dsubu(out, tmp, out);
            } else {
                self.asm.dsra32(GpuReg::At, tmp, 31);
                self.asm.dsubu(GpuReg::At, tmp, GpuReg::At);
                self.asm.load_const64(tmp, imm);
                self.asm.dmul(tmp, GpuReg::At, tmp);
                self.asm.dsubu(out, dividend, tmp);
            }
        }
    }

    // ------------------------------------------------------------------
    // Comparisons and branches.

    fn visit_compare(&mut self, id: InstId, lhs: InstId, bias: Option<FpBias>) {
        let summary = self.locations(id).clone();
        let in_ty = self.graph.node(lhs).ty;
        let dst = gpr_of(summary.out());

        if !in_ty.is_fp() {
            let lhs_reg = gpr_of(summary.in_at(0));
            let rhs_loc = summary.in_at(1);
            let rhs_reg = if rhs_loc.is_constant() {
                let imm = rhs_loc.as_constant().as_i64();
                if imm == 0 {
                    GpuReg::Zero
                } else {
                    self.asm.load_const64(GpuReg::At, imm);
                    GpuReg::At
                }
            } else {
                gpr_of(rhs_loc)
            };
            self.asm.slt(GpuReg::TMP, lhs_reg, rhs_reg);
            self.asm.slt(dst, rhs_reg, lhs_reg);
            self.asm.subu(dst, dst, GpuReg::TMP);
            return;
        }

        let lhs_reg = fpr_of(summary.in_at(0));
        let rhs_reg = fpr_of(summary.in_at(1));
        let gt_bias = bias != Some(FpBias::LtBias);
        let done = self.asm.new_label();
        let single = in_ty == Type::Float32;
        if single {
            self.asm.cmp_eq_s(FpuReg::FTMP, lhs_reg, rhs_reg);
        } else {
            self.asm.cmp_eq_d(FpuReg::FTMP, lhs_reg, rhs_reg);
        }
        self.asm.load_const32(dst, 0);
        self.asm.bc1nez(FpuReg::FTMP, done);
        if gt_bias {
            if single {
                self.asm.cmp_lt_s(FpuReg::FTMP, lhs_reg, rhs_reg);
            } else {
                self.asm.cmp_lt_d(FpuReg::FTMP, lhs_reg, rhs_reg);
            }
            self.asm.load_const32(dst, -1);
            self.asm.bc1nez(FpuReg::FTMP, done);
            self.asm.load_const32(dst, 1);
        } else {
            if single {
                self.asm.cmp_lt_s(FpuReg::FTMP, rhs_reg, lhs_reg);
            } else {
                self.asm.cmp_lt_d(FpuReg::FTMP, rhs_reg, lhs_reg);
            }
            self.asm.load_const32(dst, 1);
            self.asm.bc1nez(FpuReg::FTMP, done);
            self.asm.load_const32(dst, -1);
        }
        self.asm.bind(done);
    }

    fn generate_int_long_compare(&mut self, cond: Cond, is64: bool, summary: &LocationSummary) {
        let dst = gpr_of(summary.out());
        let lhs = gpr_of(summary.in_at(0));
        let rhs_loc = summary.in_at(1);
        let use_imm = rhs_loc.is_constant();
        let imm = if use_imm { rhs_loc.as_constant().as_i64() } else { 0 };

        let materialize = |asm: &mut Mips64Assembler| -> GpuReg {
            if use_imm {
                asm.load_const64(GpuReg::TMP, imm);
                GpuReg::TMP
            } else {
                gpr_of(rhs_loc)
            }
        };

        match cond {
            Cond::Eq | Cond::Ne => {
                if use_imm && is_int16(imm.wrapping_neg()) {
                    if imm == 0 {
                        if cond == Cond::Eq {
                            self.asm.sltiu(dst, lhs, 1);
                        } else {
                            self.asm.sltu(dst, GpuReg::Zero, lhs);
                        }
                        return;
                    }
                    if is64 {
                        self.asm.daddiu(dst, lhs, -imm as i16);
                    } else {
                        self.asm.addiu(dst, lhs, -imm as i16);
                    }
                } else if use_imm && is_uint16(imm) {
                    self.asm.xori(dst, lhs, imm as u16);
                } else {
                    let rhs = materialize(&mut self.asm);
                    self.asm.xor(dst, lhs, rhs);
                }
                if cond == Cond::Eq {
                    self.asm.sltiu(dst, dst, 1);
                } else {
                    self.asm.sltu(dst, GpuReg::Zero, dst);
                }
            }
            Cond::Lt | Cond::Ge => {
                if use_imm && is_int16(imm) {
                    self.asm.slti(dst, lhs, imm as i16);
                } else {
                    let rhs = materialize(&mut self.asm);
                    self.asm.slt(dst, lhs, rhs);
                }
                if cond == Cond::Ge {
                    self.asm.xori(dst, dst, 1);
                }
            }
            Cond::Le | Cond::Gt => {
                if use_imm && imm != i64::MAX && is_int16(imm + 1) {
                    // x <= c is x < c + 1.
                    self.asm.slti(dst, lhs, (imm + 1) as i16);
                    if cond == Cond::Gt {
                        self.asm.xori(dst, dst, 1);
                    }
                } else {
                    let rhs = materialize(&mut self.asm);
                    self.asm.slt(dst, rhs, lhs);
                    if cond == Cond::Le {
                        self.asm.xori(dst, dst, 1);
                    }
                }
            }
            Cond::B | Cond::Ae => {
                if use_imm && is_int16(imm) {
                    self.asm.sltiu(dst, lhs, imm as i16);
                } else {
                    let rhs = materialize(&mut self.asm);
                    self.asm.sltu(dst, lhs, rhs);
                }
                if cond == Cond::Ae {
                    self.asm.xori(dst, dst, 1);
                }
            }
            Cond::Be | Cond::A => {
                if use_imm && imm != i64::MAX && is_int16(imm + 1) {
                    self.asm.sltiu(dst, lhs, (imm + 1) as i16);
                    if cond == Cond::A {
                        self.asm.xori(dst, dst, 1);
                    }
                } else {
                    let rhs = materialize(&mut self.asm);
                    self.asm.sltu(dst, rhs, lhs);
                    if cond == Cond::Be {
                        self.asm.xori(dst, dst, 1);
                    }
                }
            }
        }
    }

    fn generate_int_long_compare_and_branch(
        &mut self,
        cond: Cond,
        summary: &LocationSummary,
        label: LabelId,
    ) {
        let lhs = gpr_of(summary.in_at(0));
        let rhs_loc = summary.in_at(1);
        if rhs_loc.is_constant() && rhs_loc.as_constant().is_zero_bits() {
            match cond {
                Cond::Eq | Cond::Be => self.asm.beqzc(lhs, label),
                Cond::Ne | Cond::A => self.asm.bnezc(lhs, label),
                Cond::Lt => self.asm.bltzc(lhs, label),
                Cond::Ge => self.asm.bgezc(lhs, label),
                Cond::Le => self.asm.blezc(lhs, label),
                Cond::Gt => self.asm.bgtzc(lhs, label),
                // Unsigned below zero is never taken.
                Cond::B => {}
                Cond::Ae => self.asm.bc(label),
            }
            return;
        }
        let rhs = if rhs_loc.is_constant() {
            self.asm.load_const64(GpuReg::TMP, rhs_loc.as_constant().as_i64());
            GpuReg::TMP
        } else {
            gpr_of(rhs_loc)
        };
        match cond {
            Cond::Eq => self.asm.beqc(lhs, rhs, label),
            Cond::Ne => self.asm.bnec(lhs, rhs, label),
            Cond::Lt => self.asm.bltc(lhs, rhs, label),
            Cond::Ge => self.asm.bgec(lhs, rhs, label),
            Cond::Le => self.asm.bgec(rhs, lhs, label),
            Cond::Gt => self.asm.bltc(rhs, lhs, label),
            Cond::B => self.asm.bltuc(lhs, rhs, label),
            Cond::Ae => self.asm.bgeuc(lhs, rhs, label),
            Cond::Be => self.asm.bgeuc(rhs, lhs, label),
            Cond::A => self.asm.bltuc(rhs, lhs, label),
        }
    }

    fn generate_fp_compare(
        &mut self,
        cond: Cond,
        bias: Option<FpBias>,
        ty: Type,
        summary: &LocationSummary,
    ) {
        let dst = gpr_of(summary.out());
        let lhs = fpr_of(summary.in_at(0));
        let rhs = fpr_of(summary.in_at(1));
        self.emit_fp_condition(cond, bias, ty, lhs, rhs);
        self.asm.mfc1(dst, FpuReg::FTMP);
        if cond == Cond::Ne {
            // The compare wrote all ones or zero; plus one gives 0 or 1.
            self.asm.addiu(dst, dst, 1);
        } else {
            self.asm.andi(dst, dst, 1);
        }
    }

    /// Emits the cmp.cond into FTMP so that "predicate true" means the
    /// condition holds, except for Ne where the caller inverts.
    fn emit_fp_condition(
        &mut self,
        cond: Cond,
        bias: Option<FpBias>,
        ty: Type,
        lhs: FpuReg,
        rhs: FpuReg,
    ) {
        let gt_bias = bias != Some(FpBias::LtBias);
        let single = ty == Type::Float32;
        let ftmp = FpuReg::FTMP;
        match (cond, single) {
            (Cond::Eq | Cond::Ne, true) => self.asm.cmp_eq_s(ftmp, lhs, rhs),
            (Cond::Eq | Cond::Ne, false) => self.asm.cmp_eq_d(ftmp, lhs, rhs),
            (Cond::Lt, true) => {
                if gt_bias {
                    self.asm.cmp_lt_s(ftmp, lhs, rhs);
                } else {
                    self.asm.cmp_ult_s(ftmp, lhs, rhs);
                }
            }
            (Cond::Lt, false) => {
                if gt_bias {
                    self.asm.cmp_lt_d(ftmp, lhs, rhs);
                } else {
                    self.asm.cmp_ult_d(ftmp, lhs, rhs);
                }
            }
            (Cond::Le, true) => {
                if gt_bias {
                    self.asm.cmp_le_s(ftmp, lhs, rhs);
                } else {
                    self.asm.cmp_ule_s(ftmp, lhs, rhs);
                }
            }
            (Cond::Le, false) => {
                if gt_bias {
                    self.asm.cmp_le_d(ftmp, lhs, rhs);
                } else {
                    self.asm.cmp_ule_d(ftmp, lhs, rhs);
                }
            }
            (Cond::Gt, true) => {
                if gt_bias {
                    self.asm.cmp_ult_s(ftmp, rhs, lhs);
                } else {
                    self.asm.cmp_lt_s(ftmp, rhs, lhs);
                }
            }
            (Cond::Gt, false) => {
                if gt_bias {
                    self.asm.cmp_ult_d(ftmp, rhs, lhs);
                } else {
                    self.asm.cmp_lt_d(ftmp, rhs, lhs);
                }
            }
            (Cond::Ge, true) => {
                if gt_bias {
                    self.asm.cmp_ule_s(ftmp, rhs, lhs);
                } else {
                    self.asm.cmp_le_s(ftmp, rhs, lhs);
                }
            }
            (Cond::Ge, false) => {
                if gt_bias {
                    self.asm.cmp_ule_d(ftmp, rhs, lhs);
                } else {
                    self.asm.cmp_le_d(ftmp, rhs, lhs);
                }
            }
            _ => panic!("unsigned condition {cond:?} on float operands"),
        }
    }

    fn generate_fp_compare_and_branch(
        &mut self,
        cond: Cond,
        bias: Option<FpBias>,
        ty: Type,
        summary: &LocationSummary,
        label: LabelId,
    ) {
        let lhs = fpr_of(summary.in_at(0));
        let rhs = fpr_of(summary.in_at(1));
        self.emit_fp_condition(cond, bias, ty, lhs, rhs);
        if cond == Cond::Ne {
            self.asm.bc1eqz(FpuReg::FTMP, label);
        } else {
            self.asm.bc1nez(FpuReg::FTMP, label);
        }
    }

    fn generate_test_and_branch(
        &mut self,
        user: InstId,
        cond_id: InstId,
        true_target: Option<LabelId>,
        false_target: Option<LabelId>,
    ) {
        let graph = self.graph;
        let cond_node = graph.node(cond_id);

        if let Some(value) = cond_node.as_const() {
            // Constant condition; the branch direction is known here.
            if !value.is_zero_bits() {
                if let Some(label) = true_target {
                    self.asm.bc(label);
                }
            } else if let Some(label) = false_target {
                self.asm.bc(label);
            }
            return;
        }

        if self.fused_conds[cond_id] {
            let (cond, lhs, bias) = match cond_node.op {
                Inst::Condition { cond, lhs, bias, .. } => (cond, lhs, bias),
                _ => panic!("fused flag on a non-condition"),
            };
            let (branch_cond, label) = match (true_target, false_target) {
                (Some(label), _) => (cond, label),
                (None, Some(label)) => (cond.negated(), label),
                (None, None) => return,
            };
            let summary = self.locations(cond_id).clone();
            let in_ty = graph.node(lhs).ty;
            if in_ty.is_fp() {
                self.generate_fp_compare_and_branch(branch_cond, bias, in_ty, &summary, label);
            } else {
                self.generate_int_long_compare_and_branch(branch_cond, &summary, label);
            }
        } else {
            let reg = gpr_of(self.locations(user).in_at(0));
            match (true_target, false_target) {
                (None, Some(label)) => self.asm.beqzc(reg, label),
                (Some(label), _) => self.asm.bnezc(reg, label),
                (None, None) => return,
            }
        }
        if let (Some(_), Some(label)) = (true_target, false_target) {
            self.asm.bc(label);
        }
    }

    fn visit_packed_switch(
        &mut self,
        block: BlockId,
        value_reg: GpuReg,
        lower_bound: i32,
        targets: &[BlockId],
        default_target: BlockId,
    ) {
        let num_entries = targets.len();
        if num_entries > PACKED_SWITCH_JUMP_TABLE_THRESHOLD {
            let labels: Vec<LabelId> = targets.iter().map(|b| self.block_labels[*b]).collect();
            let table = self.asm.create_jump_table(labels);
            let default_label = self.block_labels[default_target];

            self.asm.addiu32(GpuReg::TMP, value_reg, -lower_bound);
            self.asm.load_const32(GpuReg::At, num_entries as i32);
            self.asm.bgeuc(GpuReg::TMP, GpuReg::At, default_label);

            // The table holds offsets relative to its own start.
            let table_label = self.asm.jump_table_label(table);
            self.asm.load_label_address(GpuReg::At, table_label);
            self.asm.dlsa(GpuReg::TMP, GpuReg::TMP, GpuReg::At, 2);
            self.asm.lw(GpuReg::TMP, GpuReg::TMP, 0);
            self.asm.daddu(GpuReg::TMP, GpuReg::TMP, GpuReg::At);
            self.asm.jr(GpuReg::TMP);
            self.asm.nop();
        } else {
            let temp = GpuReg::TMP;
            let default_label = self.block_labels[default_target];
            self.asm.addiu32(temp, value_reg, -lower_bound);
            // A negative index implies out of range; skip the upper check.
            self.asm.bltzc(temp, default_label);

            self.asm.beqzc(temp, self.block_labels[targets[0]]);
            let mut last_index = 0;
            while num_entries - last_index > 2 {
                self.asm.addiu(temp, temp, -2);
                self.asm.bltzc(temp, self.block_labels[targets[last_index + 1]]);
                self.asm.beqzc(temp, self.block_labels[targets[last_index + 2]]);
                last_index += 2;
            }
            if num_entries - last_index == 2 {
                self.asm.addiu(temp, temp, -1);
                self.asm.beqzc(temp, self.block_labels[targets[last_index + 1]]);
            }

            if self.graph.next_in_order(block) != Some(default_target) {
                self.asm.bc(default_label);
            }
        }
    }

    // ------------------------------------------------------------------
    // Checks.

    fn visit_null_check(&mut self, id: InstId) {
        let summary = self.locations(id).clone();
        let obj = gpr_of(summary.in_at(0));
        if self.config.implicit_null_checks {
            // A load through null faults; the fault handler maps the PC back
            // through the stack map recorded here.
            self.asm.lw(GpuReg::Zero, obj, 0);
            self.record_pc_info(id);
        } else {
            let entry = self.asm.new_label();
            self.slow_paths.push(SlowPath::ThrowNullPointer { inst: id, entry });
            self.asm.beqzc(obj, entry);
        }
    }

    fn visit_clinit_check(&mut self, id: InstId, class: InstId) {
        let summary = self.locations(id).clone();
        let class_reg = gpr_of(summary.in_at(0));
        let type_ref = match self.graph.node(class).op {
            Inst::LoadClass {
                load_kind:
                    DataLoadKind::BootImageRelRo(r)
                    | DataLoadKind::BssEntry(r)
                    | DataLoadKind::RuntimeCall(r),
                ..
            } => r,
            _ => panic!("clinit check input is not a class load"),
        };
        let entry = self.asm.new_label();
        let exit = self.asm.new_label();
        self.slow_paths.push(SlowPath::LoadClass {
            inst: id,
            entry,
            exit,
            type_ref,
            do_clinit: true,
            out: Location::Invalid,
        });
        self.asm.load_from_offset(
            LoadOperandType::UnsignedByte,
            GpuReg::TMP,
            class_reg,
            ObjectModel::CLASS_STATUS_BYTE_OFFSET,
        );
        self.asm
            .sltiu(GpuReg::TMP, GpuReg::TMP, ObjectModel::CLASS_STATUS_INITIALIZED as i16);
        self.asm.bnezc(GpuReg::TMP, entry);
        // Publish the initialized class's fields before first use.
        self.asm.sync(0);
        self.asm.bind(exit);
    }

    // ------------------------------------------------------------------
    // Class and string loads.

    fn visit_load_class(&mut self, id: InstId, load_kind: DataLoadKind, needs_access_check: bool) {
        let summary = self.locations(id).clone();
        match load_kind {
            DataLoadKind::BootImageRelRo(type_ref) => {
                assert!(!needs_access_check);
                let out = gpr_of(summary.out());
                let high = self.emit_pc_relative_high(GpuReg::At);
                self.add_patch(PatchKind::BootImageType, type_ref, high);
                self.asm.lwu(out, GpuReg::At, PLACEHOLDER_LOW);
            }
            DataLoadKind::BssEntry(type_ref) => {
                assert!(!needs_access_check);
                let out = summary.out();
                let out_reg = gpr_of(out);
                let high = self.emit_pc_relative_high(out_reg);
                self.add_patch(PatchKind::TypeBssEntry, type_ref, high);
                self.generate_gc_root_field_load(
                    id,
                    out,
                    out_reg,
                    i32::from(PLACEHOLDER_LOW),
                    self.config.emit_read_barriers(),
                );
                let entry = self.asm.new_label();
                let exit = self.asm.new_label();
                self.slow_paths.push(SlowPath::LoadClass {
                    inst: id,
                    entry,
                    exit,
                    type_ref,
                    do_clinit: false,
                    out,
                });
                self.asm.beqzc(out_reg, entry);
                self.asm.bind(exit);
            }
            DataLoadKind::RuntimeCall(type_ref) => {
                self.asm.load_const32(GpuReg::A0, type_ref.0 as i32);
                let entrypoint = if needs_access_check {
                    QuickEntrypoint::InitializeTypeAndVerifyAccess
                } else {
                    QuickEntrypoint::InitializeType
                };
                self.invoke_runtime(entrypoint, id);
            }
        }
    }

    fn visit_load_string(&mut self, id: InstId, load_kind: DataLoadKind) {
        let summary = self.locations(id).clone();
        match load_kind {
            DataLoadKind::BootImageRelRo(string_ref) => {
                let out = gpr_of(summary.out());
                let high = self.emit_pc_relative_high(GpuReg::At);
                self.add_patch(PatchKind::BootImageString, string_ref, high);
                self.asm.lwu(out, GpuReg::At, PLACEHOLDER_LOW);
            }
            DataLoadKind::BssEntry(string_ref) => {
                let out = summary.out();
                let out_reg = gpr_of(out);
                let high = self.emit_pc_relative_high(out_reg);
                self.add_patch(PatchKind::StringBssEntry, string_ref, high);
                self.generate_gc_root_field_load(
                    id,
                    out,
                    out_reg,
                    i32::from(PLACEHOLDER_LOW),
                    self.config.emit_read_barriers(),
                );
                let entry = self.asm.new_label();
                let exit = self.asm.new_label();
                self.slow_paths.push(SlowPath::LoadString { inst: id, entry, exit, out });
                self.asm.beqzc(out_reg, entry);
                self.asm.bind(exit);
            }
            DataLoadKind::RuntimeCall(string_ref) => {
                self.asm.load_const32(GpuReg::A0, string_ref.0 as i32);
                self.invoke_runtime(QuickEntrypoint::ResolveString, id);
            }
        }
    }

    // ------------------------------------------------------------------
    // Field access.

    fn load_operand_type(ty: Type) -> LoadOperandType {
        match ty {
            Type::Bool | Type::Uint8 => LoadOperandType::UnsignedByte,
            Type::Int8 => LoadOperandType::SignedByte,
            Type::Uint16 => LoadOperandType::UnsignedHalfword,
            Type::Int16 => LoadOperandType::SignedHalfword,
            Type::Int32 | Type::Float32 => LoadOperandType::Word,
            Type::Int64 | Type::Float64 => LoadOperandType::Doubleword,
            Type::Reference => LoadOperandType::UnsignedWord,
            Type::Void => panic!("void load"),
        }
    }

    fn store_operand_type(ty: Type) -> StoreOperandType {
        match ty {
            Type::Bool | Type::Uint8 | Type::Int8 => StoreOperandType::Byte,
            Type::Uint16 | Type::Int16 => StoreOperandType::Halfword,
            Type::Int32 | Type::Float32 | Type::Reference => StoreOperandType::Word,
            Type::Int64 | Type::Float64 => StoreOperandType::Doubleword,
            Type::Void => panic!("void store"),
        }
    }

    fn visit_field_get(&mut self, id: InstId, field: FieldInfo) {
        let summary = self.locations(id).clone();
        let obj = gpr_of(summary.in_at(0));
        let out = summary.out();

        if field.ty == Type::Reference && self.config.emit_read_barriers() {
            if self.config.baker_read_barriers() {
                let temp = summary.temp(0);
                self.generate_field_load_with_baker_read_barrier(out, obj, field.offset, None, temp);
                if field.is_volatile {
                    self.asm.sync(0);
                }
            } else {
                self.asm
                    .load_from_offset(LoadOperandType::UnsignedWord, gpr_of(out), obj, field.offset);
                if field.is_volatile {
                    self.asm.sync(0);
                }
                self.generate_read_barrier_slow(id, out, summary.in_at(0), field.offset, None, 0);
            }
            return;
        }

        let load_ty = Self::load_operand_type(field.ty);
        if field.ty.is_fp() {
            self.asm
                .load_fpu_from_offset(load_ty, fpr_of(out), obj, field.offset);
        } else {
            self.asm.load_from_offset(load_ty, gpr_of(out), obj, field.offset);
            if field.ty == Type::Reference {
                self.maybe_unpoison_heap_reference(gpr_of(out));
            }
        }
        if field.is_volatile {
            self.asm.sync(0);
        }
    }

    fn visit_field_set(&mut self, id: InstId, field: FieldInfo, value_can_be_null: bool) {
        let summary = self.locations(id).clone();
        let obj = gpr_of(summary.in_at(0));
        let value = summary.in_at(1);
        let store_ty = Self::store_operand_type(field.ty);

        if field.is_volatile {
            self.asm.sync(0);
        }

        if value.is_constant() {
            self.store_const_to_offset(
                store_ty,
                value.as_constant().as_i64(),
                obj,
                field.offset,
                GpuReg::TMP,
            );
        } else if field.ty.is_fp() {
            self.asm
                .store_fpu_to_offset(store_ty, fpr_of(value), obj, field.offset);
        } else if field.ty == Type::Reference && self.config.poison_heap_references {
            self.poison_heap_reference(GpuReg::TMP, gpr_of(value));
            self.asm.store_to_offset(store_ty, GpuReg::TMP, obj, field.offset);
        } else {
            self.asm
                .store_to_offset(store_ty, gpr_of(value), obj, field.offset);
        }

        if field.ty == Type::Reference && !value.is_constant() {
            self.mark_gc_card(obj, gpr_of(value), value_can_be_null);
        }

        if field.is_volatile {
            self.asm.sync(0);
        }
    }

    // ------------------------------------------------------------------
    // Arrays.

    fn visit_array_get(&mut self, id: InstId) {
        let node = self.graph.node(id);
        let summary = self.locations(id).clone();
        let obj_loc = summary.in_at(0);
        let obj = gpr_of(obj_loc);
        let index = summary.in_at(1);
        let out = summary.out();
        let ty = node.ty;
        let shift = ty.size_shift();
        let data_offset = ObjectModel::array_data_offset(ty.size());

        if ty == Type::Reference && self.config.emit_read_barriers() {
            if self.config.baker_read_barriers() {
                let temp = summary.temp(0);
                if index.is_constant() {
                    let offset =
                        (index.as_constant().as_i64() as i32) * (1 << shift) + data_offset;
                    self.generate_field_load_with_baker_read_barrier(out, obj, offset, None, temp);
                } else {
                    self.generate_field_load_with_baker_read_barrier(
                        out,
                        obj,
                        data_offset,
                        Some(index),
                        temp,
                    );
                }
            } else {
                let out_reg = gpr_of(out);
                if index.is_constant() {
                    let offset =
                        (index.as_constant().as_i64() as i32) * (1 << shift) + data_offset;
                    self.asm
                        .load_from_offset(LoadOperandType::UnsignedWord, out_reg, obj, offset);
                    self.generate_read_barrier_slow(id, out, obj_loc, offset, None, 0);
                } else {
                    self.asm.dlsa(GpuReg::TMP, gpr_of(index), obj, 2);
                    self.asm.load_from_offset(
                        LoadOperandType::UnsignedWord,
                        out_reg,
                        GpuReg::TMP,
                        data_offset,
                    );
                    self.generate_read_barrier_slow(
                        id,
                        out,
                        obj_loc,
                        data_offset,
                        Some(index),
                        shift,
                    );
                }
            }
            return;
        }

        let load_ty = Self::load_operand_type(ty);
        let (base, offset) = if index.is_constant() {
            (obj, (index.as_constant().as_i64() as i32) * (1 << shift) + data_offset)
        } else {
            if shift == 0 {
                self.asm.daddu(GpuReg::TMP, obj, gpr_of(index));
            } else {
                self.asm.dlsa(GpuReg::TMP, gpr_of(index), obj, shift);
            }
            (GpuReg::TMP, data_offset)
        };
        if ty.is_fp() {
            self.asm.load_fpu_from_offset(load_ty, fpr_of(out), base, offset);
        } else {
            self.asm.load_from_offset(load_ty, gpr_of(out), base, offset);
            if ty == Type::Reference {
                self.maybe_unpoison_heap_reference(gpr_of(out));
            }
        }
    }

    fn visit_array_set(&mut self, id: InstId, value_can_be_null: bool, needs_type_check: bool) {
        let node = self.graph.node(id);
        let summary = self.locations(id).clone();
        let obj_loc = summary.in_at(0);
        let obj = gpr_of(obj_loc);
        let index = summary.in_at(1);
        let value_loc = summary.in_at(2);
        let ty = node.ty;
        let shift = ty.size_shift();
        let data_offset = ObjectModel::array_data_offset(ty.size());
        let base_reg = if index.is_constant() { obj } else { GpuReg::TMP };

        let element_address = |cg: &mut Self| -> i32 {
            if index.is_constant() {
                (index.as_constant().as_i64() as i32) * (1 << shift) + data_offset
            } else {
                if shift == 0 {
                    cg.asm.daddu(base_reg, obj, gpr_of(index));
                } else {
                    cg.asm.dlsa(base_reg, gpr_of(index), obj, shift);
                }
                data_offset
            }
        };

        if ty != Type::Reference {
            let offset = element_address(self);
            let store_ty = Self::store_operand_type(ty);
            if value_loc.is_constant() {
                self.store_const_to_offset(
                    store_ty,
                    value_loc.as_constant().as_i64(),
                    base_reg,
                    offset,
                    GpuReg::At,
                );
            } else if ty.is_fp() {
                self.asm
                    .store_fpu_to_offset(store_ty, fpr_of(value_loc), base_reg, offset);
            } else {
                self.asm
                    .store_to_offset(store_ty, gpr_of(value_loc), base_reg, offset);
            }
            return;
        }

        if value_loc.is_constant() {
            // Storing null needs no type check and no write barrier.
            assert!(value_loc.as_constant().is_zero_bits());
            let offset = element_address(self);
            self.asm
                .store_to_offset(StoreOperandType::Word, GpuReg::Zero, base_reg, offset);
            return;
        }

        let value = gpr_of(value_loc);
        let temp1 = gpr_of(summary.temp(0));
        let temp2 = GpuReg::TMP; // Does not need to survive the slow path.
        let mut done = None;
        let mut slow = None;

        if needs_type_check {
            let entry = self.asm.new_label();
            let exit = self.asm.new_label();
            self.slow_paths.push(SlowPath::StoreArrayElement {
                inst: id,
                entry,
                exit,
                array: obj_loc,
                index,
                value: value_loc,
            });
            slow = Some((entry, exit));

            if value_can_be_null {
                let non_zero = self.asm.new_label();
                let done_label = self.asm.new_label();
                self.asm.bnezc(value, non_zero);
                let offset = element_address(self);
                self.asm
                    .store_to_offset(StoreOperandType::Word, value, base_reg, offset);
                self.asm.bc(done_label);
                self.asm.bind(non_zero);
                done = Some(done_label);
            }

            // The type check compares possibly poisoned references, which is
            // fine: equal poisoned values are equal unpoisoned.
            self.asm.load_from_offset(
                LoadOperandType::UnsignedWord,
                temp1,
                obj,
                ObjectModel::CLASS_OFFSET,
            );
            self.maybe_unpoison_heap_reference(temp1);
            self.asm.load_from_offset(
                LoadOperandType::UnsignedWord,
                temp1,
                temp1,
                ObjectModel::COMPONENT_TYPE_OFFSET,
            );
            self.asm.load_from_offset(
                LoadOperandType::UnsignedWord,
                temp2,
                value,
                ObjectModel::CLASS_OFFSET,
            );
            let do_put = self.asm.new_label();
            self.asm.beqc(temp1, temp2, do_put);
            self.maybe_unpoison_heap_reference(temp1);
            self.asm.load_from_offset(
                LoadOperandType::UnsignedWord,
                temp1,
                temp1,
                ObjectModel::SUPER_CLASS_OFFSET,
            );
            // Only Object (whose super class is null) absorbs any element.
            self.asm.bnezc(temp1, entry);
            self.asm.bind(do_put);
        }

        let source = if self.config.poison_heap_references {
            self.asm.move_(temp1, value);
            self.poison_heap_reference(temp1, temp1);
            temp1
        } else {
            value
        };

        let offset = element_address(self);
        self.asm
            .store_to_offset(StoreOperandType::Word, source, base_reg, offset);

        self.mark_gc_card(obj, value, value_can_be_null);

        if let Some(label) = done {
            self.asm.bind(label);
        }
        if let Some((_, exit)) = slow {
            self.asm.bind(exit);
        }
    }

    // ------------------------------------------------------------------
    // Invokes.

    /// Moves an intrinsified invoke's operands into the managed argument
    /// locations before its slow path falls back to the real call.
    fn move_invoke_arguments(&mut self, id: InstId) {
        let args: SmallVec<[InstId; 4]> = match &self.graph.node(id).op {
            Inst::InvokeStaticOrDirect { args, .. } | Inst::InvokeVirtual { args, .. } => {
                args.clone()
            }
            _ => panic!("argument moves on a non-invoke"),
        };
        let mut cursor = ManagedArgCursor::new();
        for (i, arg) in args.iter().enumerate() {
            let ty = self.graph.node(*arg).ty;
            let dest = cursor.next_location(ty);
            let src = self.locations(id).in_at(i);
            self.move_location(dest, src, ty);
        }
    }

    fn generate_invoke_call(&mut self, id: InstId, temp: GpuReg) {
        let node = self.graph.node(id);
        match &node.op {
            Inst::InvokeStaticOrDirect { load_kind, .. } => {
                self.generate_static_or_direct_call(id, *load_kind, temp);
            }
            Inst::InvokeVirtual { vtable_index, .. } => {
                self.generate_virtual_call(id, *vtable_index, temp);
            }
            _ => panic!("invoke emission on a non-invoke"),
        }
    }

    fn generate_static_or_direct_call(
        &mut self,
        id: InstId,
        load_kind: MethodLoadKind,
        temp: GpuReg,
    ) {
        match load_kind {
            MethodLoadKind::Recursive => {
                // The callee is this very method; its pointer already sits in
                // the method register.
                self.asm.balc(self.frame_entry_label);
                self.record_pc_info(id);
                return;
            }
            MethodLoadKind::BootImageRelRo(method_ref) => {
                let high = self.emit_pc_relative_high(GpuReg::At);
                self.add_patch(PatchKind::BootImageMethod, method_ref, high);
                self.asm.lwu(temp, GpuReg::At, PLACEHOLDER_LOW);
            }
            MethodLoadKind::BssEntry(method_ref) => {
                let high = self.emit_pc_relative_high(GpuReg::At);
                self.add_patch(PatchKind::MethodBssEntry, method_ref, high);
                self.asm.ld(temp, GpuReg::At, PLACEHOLDER_LOW);
            }
            MethodLoadKind::DirectAddress(address) => {
                let literal = self.asm.new_literal64(address);
                self.asm.load_literal(temp, literal, false);
            }
            MethodLoadKind::RuntimeCall(method_ref) => {
                // The resolution helper resolves the callee and tail-calls it.
                self.asm.load_const32(GpuReg::A0, method_ref.0 as i32);
                self.invoke_runtime(QuickEntrypoint::ResolveMethod, id);
                return;
            }
        }
        self.asm.load_from_offset(
            LoadOperandType::Doubleword,
            GpuReg::T9,
            temp,
            ObjectModel::METHOD_QUICK_CODE_OFFSET,
        );
        self.asm.jalr_ra(GpuReg::T9);
        self.asm.nop();
        self.record_pc_info(id);
    }

    fn generate_virtual_call(&mut self, id: InstId, vtable_index: u32, temp: GpuReg) {
        let receiver = gpr_of(self.locations(id).in_at(0));
        self.asm.load_from_offset(
            LoadOperandType::UnsignedWord,
            temp,
            receiver,
            ObjectModel::CLASS_OFFSET,
        );
        self.maybe_unpoison_heap_reference(temp);
        let method_offset =
            ObjectModel::EMBEDDED_VTABLE_OFFSET + (vtable_index as i32) * ThreadModel::POINTER_SIZE;
        self.asm
            .load_from_offset(LoadOperandType::Doubleword, temp, temp, method_offset);
        self.asm.load_from_offset(
            LoadOperandType::Doubleword,
            GpuReg::T9,
            temp,
            ObjectModel::METHOD_QUICK_CODE_OFFSET,
        );
        self.asm.jalr_ra(GpuReg::T9);
        self.asm.nop();
        self.record_pc_info(id);
    }

    // ------------------------------------------------------------------
    // Conversions.

    fn visit_type_conversion(&mut self, id: InstId, input: InstId) {
        let graph = self.graph;
        let to = graph.node(id).ty;
        let from = graph.node(input).ty;
        let summary = self.locations(id).clone();

        if to.is_integral() && from.is_integral() {
            let dst = gpr_of(summary.out());
            let src = gpr_of(summary.in_at(0));
            match to {
                Type::Bool | Type::Uint8 => self.asm.andi(dst, src, 0xFF),
                Type::Int8 => {
                    if from == Type::Int64 {
                        self.asm.sll(dst, src, 0);
                        self.asm.seb(dst, dst);
                    } else {
                        self.asm.seb(dst, src);
                    }
                }
                Type::Uint16 => self.asm.andi(dst, src, 0xFFFF),
                Type::Int16 => {
                    if from == Type::Int64 {
                        self.asm.sll(dst, src, 0);
                        self.asm.seh(dst, dst);
                    } else {
                        self.asm.seh(dst, src);
                    }
                }
                Type::Int32 | Type::Int64 => {
                    // Sign-extend the low word; widening and narrowing agree
                    // on this representation.
                    if from == Type::Int64 || dst != src {
                        self.asm.sll(dst, src, 0);
                    }
                }
                _ => unreachable!(),
            }
        } else if to.is_fp() && from.is_integral() {
            let dst = fpr_of(summary.out());
            let src = gpr_of(summary.in_at(0));
            if from == Type::Int64 {
                self.asm.dmtc1(src, FpuReg::FTMP);
                if to == Type::Float32 {
                    self.asm.cvt_s_l(dst, FpuReg::FTMP);
                } else {
                    self.asm.cvt_d_l(dst, FpuReg::FTMP);
                }
            } else {
                self.asm.mtc1(src, FpuReg::FTMP);
                if to == Type::Float32 {
                    self.asm.cvt_s_w(dst, FpuReg::FTMP);
                } else {
                    self.asm.cvt_d_w(dst, FpuReg::FTMP);
                }
            }
        } else if to.is_integral() && from.is_fp() {
            let dst = gpr_of(summary.out());
            let src = fpr_of(summary.in_at(0));
            if to == Type::Int64 {
                if from == Type::Float32 {
                    self.asm.trunc_l_s(FpuReg::FTMP, src);
                } else {
                    self.asm.trunc_l_d(FpuReg::FTMP, src);
                }
                self.asm.dmfc1(dst, FpuReg::FTMP);
            } else {
                if from == Type::Float32 {
                    self.asm.trunc_w_s(FpuReg::FTMP, src);
                } else {
                    self.asm.trunc_w_d(FpuReg::FTMP, src);
                }
                self.asm.mfc1(dst, FpuReg::FTMP);
            }
        } else {
            let dst = fpr_of(summary.out());
            let src = fpr_of(summary.in_at(0));
            if to == Type::Float32 {
                self.asm.cvt_s_d(dst, src);
            } else {
                self.asm.cvt_d_s(dst, src);
            }
        }
    }
}

impl MoveEmitter for CodeGenerator<'_> {
    fn emit_move(&mut self, mv: &MoveOp) {
        self.move_location(mv.destination(), mv.source(), mv.ty());
    }

    fn emit_swap(&mut self, mv: &MoveOp) {
        self.swap_locations(mv.source(), mv.destination(), mv.ty());
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use crate::ir::{Block, InstNode};

    pub(crate) fn graph_from(blocks: Vec<Vec<Inst>>, types: Vec<Vec<Type>>) -> Graph {
        let mut graph = Graph::default();
        for (block_insts, block_types) in blocks.into_iter().zip(types) {
            let mut block = Block::default();
            for (op, ty) in block_insts.into_iter().zip(block_types) {
                let id = graph.insts.push(InstNode::new(op, ty, 0));
                block.insts.push(id);
            }
            let id = graph.blocks.push(block);
            graph.block_order.push(id);
        }
        graph
    }

    /// Stand-in for the register allocator: give every unallocated operand a
    /// distinct caller-saved register.
    pub(crate) fn allocate_trivially(cg: &mut CodeGenerator<'_>) {
        const GPRS: [GpuReg; 8] = [
            GpuReg::T0,
            GpuReg::T1,
            GpuReg::T2,
            GpuReg::V1,
            GpuReg::A6,
            GpuReg::A7,
            GpuReg::A4,
            GpuReg::A5,
        ];
        const FPRS: [FpuReg; 4] = [FpuReg::F4, FpuReg::F5, FpuReg::F6, FpuReg::F7];
        for id in (0..cg.graph.insts.len()).map(InstId::from_usize) {
            let mut next_gpr = 0;
            let mut next_fpr = 0;
            let mut pick = |loc: Location| match loc {
                Location::Unallocated(Policy::RequiresFpuRegister) => {
                    next_fpr += 1;
                    Location::Fpr(FPRS[next_fpr - 1].code())
                }
                Location::Unallocated(_) => {
                    next_gpr += 1;
                    Location::Gpr(GPRS[next_gpr - 1].code())
                }
                other => other,
            };
            // LocationSummary has no temp setter, so rebuild the whole
            // summary with concrete locations.
            let summary = cg.locations(id);
            let call_kind = summary.call_kind();
            let intrinsified = summary.is_intrinsified();
            let caller_saves = summary.custom_slow_path_caller_saves;
            let inputs: Vec<Location> =
                (0..summary.num_inputs()).map(|i| pick(summary.in_at(i))).collect();
            let temps: Vec<Location> =
                (0..summary.num_temps()).map(|i| pick(summary.temp(i))).collect();
            let out = match summary.out() {
                Location::Unallocated(Policy::SameAsFirstInput) => inputs[0],
                other => pick(other),
            };
            let mut rebuilt = if intrinsified {
                LocationSummary::new_intrinsified(call_kind)
            } else {
                LocationSummary::new(call_kind)
            };
            for (i, loc) in inputs.into_iter().enumerate() {
                rebuilt.set_in_at(i, loc);
            }
            for loc in temps {
                rebuilt.add_temp(loc);
            }
            rebuilt.set_out(out);
            rebuilt.custom_slow_path_caller_saves = caller_saves;
            *cg.locations_mut(id) = rebuilt;
        }
    }

    pub(crate) fn compile(graph: &Graph, config: TargetConfig) -> CompiledMethod {
        let mut cg = CodeGenerator::new(graph, config);
        cg.build_locations().unwrap();
        allocate_trivially(&mut cg);
        cg.set_allocated_registers(0, 0);
        cg.compile().unwrap()
    }

    pub(crate) fn leaf_config() -> TargetConfig {
        TargetConfig { read_barrier: ReadBarrierKind::None, ..TargetConfig::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;
    use crate::ir::ConstVal;
    use smallvec::smallvec;

    #[test]
    fn magic_numbers_match_known_divisors() {
        assert_eq!(magic_and_shift_for_div_rem(7, false), (0x92492493u32 as i32 as i64, 2));
        assert_eq!(magic_and_shift_for_div_rem(3, false), (0x55555556, 0));
        assert_eq!(magic_and_shift_for_div_rem(10, false), (0x66666667, 2));
        assert_eq!(magic_and_shift_for_div_rem(7, true), (0x4924924924924925, 1));
        assert_eq!(magic_and_shift_for_div_rem(-3, false), (0x55555555, 1));
    }

    #[test]
    fn leaf_method_records_no_safepoints() {
        let graph = graph_from(
            vec![vec![
                Inst::ParameterValue { index: 0 },
                Inst::ParameterValue { index: 1 },
                Inst::Add { lhs: InstId::from_usize(0), rhs: InstId::from_usize(1) },
                Inst::Return { value: Some(InstId::from_usize(2)) },
            ]],
            vec![vec![Type::Int32, Type::Int32, Type::Int32, Type::Void]],
        );
        let method = compile(&graph, leaf_config());
        assert!(method.stack_maps.is_empty());
        assert_eq!(method.frame_info.frame_size_in_bytes, 0);
        assert!(!method.code.is_empty());
    }

    #[test]
    fn runtime_call_records_a_safepoint() {
        let mut graph = graph_from(
            vec![vec![
                Inst::ParameterValue { index: 0 },
                Inst::MonitorOperation { object: InstId::from_usize(0), is_enter: true },
                Inst::Return { value: None },
            ]],
            vec![vec![Type::Reference, Type::Void, Type::Void]],
        );
        graph.has_calls = true;
        let method = compile(&graph, leaf_config());
        // One safepoint for the overflow probe, one for the lock call.
        assert_eq!(method.stack_maps.len(), 2);
        assert_ne!(method.frame_info.core_spill_mask & (1 << GpuReg::Ra.code()), 0);
    }

    #[test]
    fn explicit_null_check_defers_the_throw() {
        let mut config = leaf_config();
        config.implicit_null_checks = false;
        let graph = graph_from(
            vec![vec![
                Inst::ParameterValue { index: 0 },
                Inst::NullCheck { object: InstId::from_usize(0) },
                Inst::Return { value: None },
            ]],
            vec![vec![Type::Reference, Type::Void, Type::Void]],
        );
        let method = compile(&graph, config);
        // The throw entrypoint call sits after the return sequence and
        // records its own safepoint.
        assert_eq!(method.stack_maps.len(), 1);
    }

    #[test]
    fn implicit_null_check_is_a_probe_with_a_stack_map() {
        let graph = graph_from(
            vec![vec![
                Inst::ParameterValue { index: 0 },
                Inst::NullCheck { object: InstId::from_usize(0) },
                Inst::Return { value: None },
            ]],
            vec![vec![Type::Reference, Type::Void, Type::Void]],
        );
        let implicit = compile(&graph, leaf_config());
        assert_eq!(implicit.stack_maps.len(), 1);

        let mut config = leaf_config();
        config.implicit_null_checks = false;
        let explicit = compile(&graph, config);
        // The explicit variant branches out of line, so it emits more code.
        assert!(explicit.code.len() > implicit.code.len());
    }

    #[test]
    fn bss_string_load_emits_a_patch_pair() {
        let graph = graph_from(
            vec![vec![
                Inst::LoadString { load_kind: DataLoadKind::BssEntry(DexRef(17)) },
                Inst::Return { value: None },
            ]],
            vec![vec![Type::Reference, Type::Void]],
        );
        let method = compile(&graph, leaf_config());
        assert_eq!(method.patches.len(), 1);
        let patch = method.patches[0];
        assert_eq!(patch.kind, PatchKind::StringBssEntry);
        assert_eq!(patch.target, DexRef(17));
        assert!(patch.pc_insn_offset < patch.insn_offset);
    }

    #[test]
    fn boot_image_class_load_patch_kind() {
        let graph = graph_from(
            vec![vec![
                Inst::LoadClass {
                    load_kind: DataLoadKind::BootImageRelRo(DexRef(3)),
                    needs_access_check: false,
                },
                Inst::Return { value: None },
            ]],
            vec![vec![Type::Reference, Type::Void]],
        );
        let method = compile(&graph, leaf_config());
        assert_eq!(method.patches.len(), 1);
        assert_eq!(method.patches[0].kind, PatchKind::BootImageType);
    }

    #[test]
    fn baker_reference_get_emits_more_code_than_plain() {
        let field = FieldInfo { offset: 16, ty: Type::Reference, is_volatile: false };
        let graph = graph_from(
            vec![vec![
                Inst::ParameterValue { index: 0 },
                Inst::InstanceFieldGet { object: InstId::from_usize(0), field },
                Inst::Return { value: None },
            ]],
            vec![vec![Type::Reference, Type::Reference, Type::Void]],
        );
        let plain = compile(&graph, leaf_config());
        let baker = compile(
            &graph,
            TargetConfig { read_barrier: ReadBarrierKind::Baker, ..leaf_config() },
        );
        assert!(baker.code.len() > plain.code.len());
    }

    #[test]
    fn forced_slow_read_barrier_always_calls_the_runtime() {
        let field = FieldInfo { offset: 16, ty: Type::Reference, is_volatile: false };
        let graph = graph_from(
            vec![vec![
                Inst::ParameterValue { index: 0 },
                Inst::InstanceFieldGet { object: InstId::from_usize(0), field },
                Inst::Return { value: None },
            ]],
            vec![vec![Type::Reference, Type::Reference, Type::Void]],
        );
        let plain = compile(&graph, leaf_config());
        let slow = compile(
            &graph,
            TargetConfig { read_barrier: ReadBarrierKind::Slow, ..leaf_config() },
        );
        // The reprocessing call reaches a safepoint; a plain load never does.
        assert!(plain.stack_maps.is_empty());
        assert_eq!(slow.stack_maps.len(), 1);
        assert!(slow.code.len() > plain.code.len());
    }

    #[test]
    fn fused_condition_has_no_output() {
        let graph = graph_from(
            vec![
                vec![
                    Inst::ParameterValue { index: 0 },
                    Inst::Constant(ConstVal::Int32(10)),
                    Inst::Condition {
                        cond: Cond::Lt,
                        lhs: InstId::from_usize(0),
                        rhs: InstId::from_usize(1),
                        bias: None,
                    },
                    Inst::If {
                        cond: InstId::from_usize(2),
                        true_target: BlockId::from_usize(1),
                        false_target: BlockId::from_usize(2),
                    },
                ],
                vec![Inst::Return { value: None }],
                vec![Inst::Return { value: None }],
            ],
            vec![
                vec![Type::Int32, Type::Int32, Type::Bool, Type::Void],
                vec![Type::Void],
                vec![Type::Void],
            ],
        );
        let mut cg = CodeGenerator::new(&graph, leaf_config());
        cg.build_locations().unwrap();
        assert!(!cg.locations(InstId::from_usize(2)).out().is_valid());
        // And the whole thing still compiles.
        allocate_trivially(&mut cg);
        cg.set_allocated_registers(0, 0);
        cg.compile().unwrap();
    }

    #[test]
    fn division_by_constant_avoids_the_divider() {
        let graph = graph_from(
            vec![vec![
                Inst::ParameterValue { index: 0 },
                Inst::Constant(ConstVal::Int32(7)),
                Inst::Div { lhs: InstId::from_usize(0), rhs: InstId::from_usize(1) },
                Inst::Return { value: Some(InstId::from_usize(2)) },
            ]],
            vec![vec![Type::Int32, Type::Int32, Type::Int32, Type::Void]],
        );
        let method = compile(&graph, leaf_config());
        assert!(method.stack_maps.is_empty());
        assert!(!method.code.is_empty());
    }

    #[test]
    fn large_packed_switch_uses_a_jump_table() {
        let build = |entries: usize| {
            let mut blocks = vec![Vec::new()];
            let mut types = vec![Vec::new()];
            blocks[0].push(Inst::ParameterValue { index: 0 });
            types[0].push(Type::Int32);
            let targets: smallvec::SmallVec<[BlockId; 8]> =
                (1..=entries).map(BlockId::from_usize).collect();
            blocks[0].push(Inst::PackedSwitch {
                input: InstId::from_usize(0),
                start_value: 0,
                targets,
                default_target: BlockId::from_usize(entries + 1),
            });
            types[0].push(Type::Void);
            for _ in 0..=entries {
                blocks.push(vec![Inst::Return { value: None }]);
                types.push(vec![Type::Void]);
            }
            graph_from(blocks, types)
        };
        let small = compile(&build(3), leaf_config());
        let large = compile(&build(9), leaf_config());
        // The table form carries 4 bytes per entry of pooled data.
        assert!(large.code.len() > small.code.len());
    }

    #[test]
    fn bounds_check_branches_to_a_throwing_path() {
        let graph = graph_from(
            vec![vec![
                Inst::ParameterValue { index: 0 },
                Inst::ParameterValue { index: 1 },
                Inst::BoundsCheck {
                    index: InstId::from_usize(0),
                    length: InstId::from_usize(1),
                },
                Inst::Return { value: None },
            ]],
            vec![vec![Type::Int32, Type::Int32, Type::Void, Type::Void]],
        );
        let method = compile(&graph, leaf_config());
        // The out-of-line throw records its safepoint.
        assert_eq!(method.stack_maps.len(), 1);
    }

    #[test]
    fn frame_too_large_is_an_error() {
        let mut graph = graph_from(
            vec![vec![Inst::Return { value: None }]],
            vec![vec![Type::Void]],
        );
        graph.num_vregs = u16::MAX;
        let mut cg = CodeGenerator::new(&graph, leaf_config());
        cg.build_locations().unwrap();
        allocate_trivially(&mut cg);
        assert!(matches!(cg.compile(), Err(CodegenError::FrameTooLarge(_))));
    }

    #[test]
    fn recursive_call_targets_the_frame_entry() {
        let mut graph = graph_from(
            vec![vec![
                Inst::InvokeStaticOrDirect {
                    load_kind: MethodLoadKind::Recursive,
                    args: smallvec![],
                    intrinsic: None,
                },
                Inst::Return { value: None },
            ]],
            vec![vec![Type::Void, Type::Void]],
        );
        graph.has_calls = true;
        let method = compile(&graph, leaf_config());
        // Probe at entry plus the self-call safepoint.
        assert_eq!(method.stack_maps.len(), 2);
    }
}
