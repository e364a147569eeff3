//! A MIPS64R6 assembler with two-pass branch finalization.
//!
//! Instructions append to a [CodeBuffer]. Branches, PC-relative label
//! address loads and literal loads are not encoded on first emission:
//! each reserves placeholder words and records a [Branch] describing what
//! must eventually land there. After all code is emitted, [Mips64Assembler::
//! finalize_code] runs the promotion fixed point (short branches whose
//! targets drifted out of range become long encodings, relocating
//! everything after them) and then rewrites every placeholder in overwrite
//! mode. Labels record their pending users as explicit branch-id lists.

use crate::buffer::CodeBuffer;
use crate::mips64::{FpuReg, GpuReg, VecReg};
use index_vec::{define_index_type, IndexVec};

define_index_type! {
    /// A recorded branch (or branch-like pseudo instruction).
    pub struct BranchId = u32;
}

define_index_type! {
    pub struct LabelId = u32;
}

const WORD: u32 = 4;
const DWORD: u32 = 8;

fn is_int(bits: u32, value: i64) -> bool {
    debug_assert!(bits > 0 && bits < 64);
    let half = 1i64 << (bits - 1);
    (-half..half).contains(&value)
}

fn is_uint(bits: u32, value: i64) -> bool {
    debug_assert!(bits > 0 && bits < 64);
    (0..(1i64 << bits)).contains(&value)
}

fn low16(value: u32) -> u16 {
    value as u16
}

fn high16(value: u32) -> u16 {
    (value >> 16) as u16
}

/// Conditions of the compare-and-branch instructions. The Z forms compare
/// one register against zero and reach two more offset bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BranchCondition {
    Lt,
    Ge,
    Le,
    Gt,
    Ltz,
    Gez,
    Lez,
    Gtz,
    Eq,
    Ne,
    Eqz,
    Nez,
    Ltu,
    Geu,
    /// FP predicate false (bc1eqz); the tested FPU register travels in the
    /// branch's lhs slot.
    F,
    /// FP predicate true (bc1nez).
    T,
    Uncond,
}

impl BranchCondition {
    fn opposite(self) -> BranchCondition {
        match self {
            BranchCondition::Lt => BranchCondition::Ge,
            BranchCondition::Ge => BranchCondition::Lt,
            BranchCondition::Le => BranchCondition::Gt,
            BranchCondition::Gt => BranchCondition::Le,
            BranchCondition::Ltz => BranchCondition::Gez,
            BranchCondition::Gez => BranchCondition::Ltz,
            BranchCondition::Lez => BranchCondition::Gtz,
            BranchCondition::Gtz => BranchCondition::Lez,
            BranchCondition::Eq => BranchCondition::Ne,
            BranchCondition::Ne => BranchCondition::Eq,
            BranchCondition::Eqz => BranchCondition::Nez,
            BranchCondition::Nez => BranchCondition::Eqz,
            BranchCondition::Ltu => BranchCondition::Geu,
            BranchCondition::Geu => BranchCondition::Ltu,
            BranchCondition::F => BranchCondition::T,
            BranchCondition::T => BranchCondition::F,
            BranchCondition::Uncond => panic!("unconditional branch has no opposite"),
        }
    }
}

/// Encoding shape of a recorded branch. Short kinds may be promoted to
/// their long counterparts; bare kinds may not (no scratch, no extra word).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BranchKind {
    // Short branches, promotable.
    UncondBranch,
    CondBranch,
    Call,
    // Short branches that must stay short.
    BareUncondBranch,
    BareCondBranch,
    BareCall,
    // Label address load.
    Label,
    // PC-relative literal loads.
    Literal,
    LiteralUnsigned,
    LiteralLong,
    // Long forms.
    LongUncondBranch,
    LongCondBranch,
    LongCall,
    FarLabel,
    FarLiteral,
    FarLiteralUnsigned,
    FarLiteralLong,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum OffsetBits {
    Offset16 = 16,
    Offset18 = 18,
    Offset21 = 21,
    Offset23 = 23,
    Offset28 = 28,
    Offset32 = 32,
}

struct BranchInfo {
    /// Branch length in instruction words.
    length: u32,
    /// Index of the instruction word holding the offset (or its high half).
    instr_offset: u32,
    /// PC-relative origin distance from that word, in instruction words.
    pc_org: u32,
    offset_size: OffsetBits,
    /// Hardware shift applied to the encoded offset.
    offset_shift: u32,
}

impl BranchKind {
    fn info(self) -> BranchInfo {
        use BranchKind::*;
        use OffsetBits::*;
        match self {
            UncondBranch => BranchInfo { length: 1, instr_offset: 0, pc_org: 1, offset_size: Offset28, offset_shift: 2 },
            // Offset23 applies instead for the EQZ/NEZ conditions.
            CondBranch => BranchInfo { length: 2, instr_offset: 0, pc_org: 1, offset_size: Offset18, offset_shift: 2 },
            Call => BranchInfo { length: 1, instr_offset: 0, pc_org: 1, offset_size: Offset28, offset_shift: 2 },
            BareUncondBranch => BranchInfo { length: 1, instr_offset: 0, pc_org: 1, offset_size: Offset28, offset_shift: 2 },
            BareCondBranch => BranchInfo { length: 1, instr_offset: 0, pc_org: 1, offset_size: Offset18, offset_shift: 2 },
            BareCall => BranchInfo { length: 1, instr_offset: 0, pc_org: 1, offset_size: Offset28, offset_shift: 2 },
            Label => BranchInfo { length: 1, instr_offset: 0, pc_org: 0, offset_size: Offset21, offset_shift: 2 },
            Literal => BranchInfo { length: 1, instr_offset: 0, pc_org: 0, offset_size: Offset21, offset_shift: 2 },
            LiteralUnsigned => BranchInfo { length: 1, instr_offset: 0, pc_org: 0, offset_size: Offset21, offset_shift: 2 },
            LiteralLong => BranchInfo { length: 1, instr_offset: 0, pc_org: 0, offset_size: Offset21, offset_shift: 3 },
            LongUncondBranch => BranchInfo { length: 2, instr_offset: 0, pc_org: 0, offset_size: Offset32, offset_shift: 0 },
            LongCondBranch => BranchInfo { length: 3, instr_offset: 1, pc_org: 0, offset_size: Offset32, offset_shift: 0 },
            LongCall => BranchInfo { length: 2, instr_offset: 0, pc_org: 0, offset_size: Offset32, offset_shift: 0 },
            FarLabel => BranchInfo { length: 2, instr_offset: 0, pc_org: 0, offset_size: Offset32, offset_shift: 0 },
            FarLiteral => BranchInfo { length: 2, instr_offset: 0, pc_org: 0, offset_size: Offset32, offset_shift: 0 },
            FarLiteralUnsigned => BranchInfo { length: 2, instr_offset: 0, pc_org: 0, offset_size: Offset32, offset_shift: 0 },
            FarLiteralLong => BranchInfo { length: 2, instr_offset: 0, pc_org: 0, offset_size: Offset32, offset_shift: 0 },
        }
    }
}

const UNRESOLVED: u32 = 0xffff_ffff;
/// Longest branch expansion in instruction words; distances are padded by
/// this (in bytes) when deciding offset sizes so the decision is safe no
/// matter where inside a composite branch the offset word sits.
const MAX_BRANCH_LENGTH: u32 = 32;
const MAX_BRANCH_SIZE: u32 = MAX_BRANCH_LENGTH * WORD;

/// One recorded branch, label address load or literal load.
#[derive(Clone, Debug)]
struct Branch {
    /// Location before any promotion-driven relocation.
    old_location: u32,
    location: u32,
    /// Target location, or [UNRESOLVED] while the label is unbound.
    target: u32,
    /// Compared registers, or the destination register of label/literal
    /// loads (in `lhs`).
    lhs: GpuReg,
    rhs: GpuReg,
    condition: BranchCondition,
    kind: BranchKind,
    old_kind: BranchKind,
}

impl Branch {
    fn new_uncond(location: u32, target: u32, is_call: bool, is_bare: bool) -> Branch {
        let mut b = Branch {
            old_location: location,
            location,
            target,
            lhs: GpuReg::Zero,
            rhs: GpuReg::Zero,
            condition: BranchCondition::Uncond,
            kind: BranchKind::UncondBranch,
            old_kind: BranchKind::UncondBranch,
        };
        b.initialize(match (is_call, is_bare) {
            (true, true) => BranchKind::BareCall,
            (true, false) => BranchKind::Call,
            (false, true) => BranchKind::BareUncondBranch,
            (false, false) => BranchKind::UncondBranch,
        });
        b
    }

    fn new_cond(
        location: u32,
        target: u32,
        condition: BranchCondition,
        lhs: GpuReg,
        rhs: GpuReg,
        is_bare: bool,
    ) -> Branch {
        assert_ne!(condition, BranchCondition::Uncond);
        assert!(!Branch::is_nop(condition, lhs, rhs));
        let mut b = Branch {
            old_location: location,
            location,
            target,
            lhs,
            rhs,
            condition,
            kind: BranchKind::CondBranch,
            old_kind: BranchKind::CondBranch,
        };
        if Branch::is_uncond(condition, lhs, rhs) {
            b.condition = BranchCondition::Uncond;
            b.initialize(if is_bare { BranchKind::BareUncondBranch } else { BranchKind::UncondBranch });
        } else {
            b.initialize(if is_bare { BranchKind::BareCondBranch } else { BranchKind::CondBranch });
        }
        b
    }

    fn new_label_or_literal(location: u32, dest: GpuReg, kind: BranchKind) -> Branch {
        assert!(matches!(
            kind,
            BranchKind::Label | BranchKind::Literal | BranchKind::LiteralUnsigned | BranchKind::LiteralLong
        ));
        let mut b = Branch {
            old_location: location,
            location,
            target: UNRESOLVED,
            lhs: dest,
            rhs: GpuReg::Zero,
            condition: BranchCondition::Uncond,
            kind,
            old_kind: kind,
        };
        b.initialize(kind);
        b
    }

    /// A conditional branch that can never be taken.
    fn is_nop(condition: BranchCondition, lhs: GpuReg, rhs: GpuReg) -> bool {
        matches!(
            condition,
            BranchCondition::Lt | BranchCondition::Gt | BranchCondition::Ne | BranchCondition::Ltu
        ) && lhs == rhs
    }

    /// A conditional branch that is always taken.
    fn is_uncond(condition: BranchCondition, lhs: GpuReg, rhs: GpuReg) -> bool {
        match condition {
            BranchCondition::Uncond => true,
            BranchCondition::Ge
            | BranchCondition::Le
            | BranchCondition::Eq
            | BranchCondition::Geu => lhs == rhs,
            _ => false,
        }
    }

    fn initialize(&mut self, initial: BranchKind) {
        let needed = Branch::offset_size_needed(self.location, self.target);
        match initial {
            BranchKind::Label
            | BranchKind::Literal
            | BranchKind::LiteralUnsigned
            | BranchKind::LiteralLong => {
                assert!(!self.is_resolved());
                self.kind = initial;
            }
            BranchKind::UncondBranch => {
                self.kind = if needed <= BranchKind::UncondBranch.info().offset_size {
                    BranchKind::UncondBranch
                } else {
                    BranchKind::LongUncondBranch
                };
            }
            BranchKind::CondBranch => {
                let fits = match self.condition {
                    BranchCondition::Eqz | BranchCondition::Nez => needed <= OffsetBits::Offset23,
                    _ => needed <= BranchKind::CondBranch.info().offset_size,
                };
                self.kind = if fits { BranchKind::CondBranch } else { BranchKind::LongCondBranch };
            }
            BranchKind::Call => {
                self.kind = if needed <= BranchKind::Call.info().offset_size {
                    BranchKind::Call
                } else {
                    BranchKind::LongCall
                };
            }
            BranchKind::BareUncondBranch | BranchKind::BareCondBranch | BranchKind::BareCall => {
                self.kind = initial;
                assert!(needed <= self.offset_size(), "bare branch out of range");
            }
            _ => panic!("bad initial branch kind {initial:?}"),
        }
        self.old_kind = self.kind;
    }

    /// The smallest offset field that can express the given distance. The
    /// distance is padded by [MAX_BRANCH_SIZE] so that the answer is valid
    /// from any word of any not-yet-final branch encoding.
    fn offset_size_needed(location: u32, target: u32) -> OffsetBits {
        if target == UNRESOLVED {
            return OffsetBits::Offset16;
        }
        let mut distance = i64::from(target) - i64::from(location);
        distance += if distance >= 0 { i64::from(MAX_BRANCH_SIZE) } else { -i64::from(MAX_BRANCH_SIZE) };
        if is_int(16, distance) {
            OffsetBits::Offset16
        } else if is_int(18, distance) {
            OffsetBits::Offset18
        } else if is_int(21, distance) {
            OffsetBits::Offset21
        } else if is_int(23, distance) {
            OffsetBits::Offset23
        } else if is_int(28, distance) {
            OffsetBits::Offset28
        } else {
            OffsetBits::Offset32
        }
    }

    fn offset_size(&self) -> OffsetBits {
        match (self.kind, self.condition) {
            (
                BranchKind::CondBranch | BranchKind::BareCondBranch,
                BranchCondition::Eqz | BranchCondition::Nez,
            ) => OffsetBits::Offset23,
            _ => self.kind.info().offset_size,
        }
    }

    fn length(&self) -> u32 {
        self.kind.info().length
    }

    fn size(&self) -> u32 {
        self.length() * WORD
    }

    fn old_size(&self) -> u32 {
        self.old_kind.info().length * WORD
    }

    fn end_location(&self) -> u32 {
        self.location + self.size()
    }

    fn old_end_location(&self) -> u32 {
        self.old_location + self.old_size()
    }

    fn is_long(&self) -> bool {
        matches!(
            self.kind,
            BranchKind::LongUncondBranch
                | BranchKind::LongCondBranch
                | BranchKind::LongCall
                | BranchKind::FarLabel
                | BranchKind::FarLiteral
                | BranchKind::FarLiteralUnsigned
                | BranchKind::FarLiteralLong
        )
    }

    fn is_bare(&self) -> bool {
        matches!(
            self.kind,
            BranchKind::BareUncondBranch | BranchKind::BareCondBranch | BranchKind::BareCall
        )
    }

    fn is_resolved(&self) -> bool {
        self.target != UNRESOLVED
    }

    fn resolve(&mut self, target: u32) {
        self.target = target;
    }

    /// Shift this branch (and its target, if it lies past the expansion
    /// point) to account for another branch growing by `delta` bytes.
    /// Strictly past: the promoted branch itself must not move.
    fn relocate(&mut self, expand_location: u32, delta: u32) {
        if self.location > expand_location {
            self.location += delta;
        }
        if self.target != UNRESOLVED && self.target > expand_location {
            self.target += delta;
        }
    }

    fn promote_to_long(&mut self) {
        self.kind = match self.kind {
            BranchKind::UncondBranch => BranchKind::LongUncondBranch,
            BranchKind::CondBranch => BranchKind::LongCondBranch,
            BranchKind::Call => BranchKind::LongCall,
            BranchKind::Label => BranchKind::FarLabel,
            BranchKind::Literal => BranchKind::FarLiteral,
            BranchKind::LiteralUnsigned => BranchKind::FarLiteralUnsigned,
            BranchKind::LiteralLong => BranchKind::FarLiteralLong,
            k => panic!("cannot promote branch kind {k:?}"),
        };
        assert!(self.size() > self.old_size());
    }

    /// Promote if the short offset field can no longer reach the target;
    /// returns the growth in bytes. `max_short_distance` below `u32::MAX`
    /// forces promotion of reachable branches too (testing knob).
    fn promote_if_needed(&mut self, max_short_distance: u32) -> u32 {
        if self.is_long() || !self.is_resolved() {
            return 0;
        }
        if Branch::offset_size_needed(self.offset_location(), self.target) > self.offset_size() {
            self.promote_to_long();
            let delta = self.size() - self.old_size();
            assert!(delta > 0);
            return delta;
        }
        if max_short_distance != u32::MAX && !self.is_bare() {
            let distance = (i64::from(self.target) - i64::from(self.location)).unsigned_abs();
            if distance >= u64::from(max_short_distance) {
                self.promote_to_long();
                return self.size() - self.old_size();
            }
        }
        0
    }

    /// Location of the instruction word holding the encoded offset.
    fn offset_location(&self) -> u32 {
        self.location + self.kind.info().instr_offset * WORD
    }

    /// The offset bits ready to drop into the instruction encoding.
    fn offset(&self) -> u32 {
        assert!(self.is_resolved());
        let info = self.kind.info();
        let mask = 0xffff_ffffu32 >> (32 - self.offset_size() as u32);
        let mut offset_location = self.offset_location();
        if self.kind == BranchKind::LiteralLong {
            // ldpc rounds PC down to a multiple of 8 before adding the
            // offset; promotion already 8-aligned the literal itself.
            offset_location &= !(DWORD - 1);
        }
        let offset = self
            .target
            .wrapping_sub(offset_location)
            .wrapping_sub(info.pc_org * WORD);
        (offset & mask) >> info.offset_shift
    }
}

#[derive(Debug, Default)]
struct LabelData {
    /// Bound position relative to the end of the preceding branch (the
    /// whole-buffer position when no branch precedes). Branch promotion
    /// moves code, so an absolute position would go stale; the relative
    /// one stays correct because no branch sits in between.
    position: Option<u32>,
    prev_branch_id_plus_one: u32,
    /// Branches waiting for this label to be bound.
    pending: Vec<BranchId>,
}

/// Handle to a pooled constant emitted after the method body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiteralId {
    index: usize,
    long: bool,
}

#[derive(Debug)]
struct LiteralData {
    value: u64,
    label: LabelId,
}

/// Handle to a reserved in-code jump table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JumpTableId(usize);

#[derive(Debug)]
struct JumpTableData {
    label: LabelId,
    targets: Vec<LabelId>,
}

const JUMP_TABLE_FILLER: u32 = 0x1abe_1234;

/// Width selector for [Mips64Assembler::load_from_offset].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOperandType {
    SignedByte,
    UnsignedByte,
    SignedHalfword,
    UnsignedHalfword,
    Word,
    UnsignedWord,
    Doubleword,
    Quadword,
}

/// Width selector for [Mips64Assembler::store_to_offset].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOperandType {
    Byte,
    Halfword,
    Word,
    Doubleword,
    Quadword,
}

// Field shifts shared by all encodings.
const OPCODE_SHIFT: u32 = 26;
const RS_SHIFT: u32 = 21;
const RT_SHIFT: u32 = 16;
const RD_SHIFT: u32 = 11;
const SHAMT_SHIFT: u32 = 6;
const FMT_SHIFT: u32 = 21;
const FT_SHIFT: u32 = 16;
const FS_SHIFT: u32 = 11;
const FD_SHIFT: u32 = 6;

// MSA fields.
const MSA_MAJOR: u32 = 0x1e;
const MSA_OPERATION_SHIFT: u32 = 23;
const MSA_ELM_OPERATION_SHIFT: u32 = 22;
const MSA_2R_OPERATION_SHIFT: u32 = 18;
const MSA_2RF_OPERATION_SHIFT: u32 = 17;
const DF_SHIFT: u32 = 21;
const DF_M_SHIFT: u32 = 16;
const DF_N_SHIFT: u32 = 16;
const DF_2R_SHIFT: u32 = 16;
const WT_SHIFT: u32 = 16;
const WS_SHIFT: u32 = 11;
const WD_SHIFT: u32 = 6;
const S10_SHIFT: u32 = 16;
const S10_MINOR_SHIFT: u32 = 2;
const I10_SHIFT: u32 = 11;

const DF_M_BYTE: u32 = 0x70;
const DF_M_HALF: u32 = 0x60;
const DF_M_WORD: u32 = 0x40;
const DF_M_DOUBLE: u32 = 0x00;
const DF_N_BYTE: u32 = 0x00;
const DF_N_HALF: u32 = 0x20;
const DF_N_WORD: u32 = 0x30;
const DF_N_DOUBLE: u32 = 0x38;
const MSA_S10_MASK: u32 = 0x3ff;

pub struct Mips64Assembler {
    buffer: CodeBuffer,
    branches: IndexVec<BranchId, Branch>,
    labels: IndexVec<LabelId, LabelData>,
    literals: Vec<LiteralData>,
    long_literals: Vec<LiteralData>,
    jump_tables: Vec<JumpTableData>,
    /// Testing knob: force promotion of short branches spanning at least
    /// this many bytes.
    max_short_distance: u32,
    // Incremental state for `adjusted_position`, queried in code order.
    last_position_adjustment: u32,
    last_old_position: u32,
    last_branch_id: usize,
    finalized: bool,
}

impl Default for Mips64Assembler {
    fn default() -> Self {
        Mips64Assembler::new()
    }
}

impl Mips64Assembler {
    pub fn new() -> Mips64Assembler {
        Mips64Assembler {
            buffer: CodeBuffer::new(),
            branches: IndexVec::new(),
            labels: IndexVec::new(),
            literals: Vec::new(),
            long_literals: Vec::new(),
            jump_tables: Vec::new(),
            max_short_distance: u32::MAX,
            last_position_adjustment: 0,
            last_old_position: 0,
            last_branch_id: 0,
            finalized: false,
        }
    }

    pub fn set_max_short_distance(&mut self, distance: u32) {
        self.max_short_distance = distance;
    }

    pub fn size(&self) -> usize {
        self.buffer.size()
    }

    pub fn code(&self) -> &[u8] {
        assert!(self.finalized);
        self.buffer.as_slice()
    }

    pub fn into_code(self) -> Vec<u8> {
        assert!(self.finalized);
        self.buffer.finalize()
    }

    fn emit(&mut self, value: u32) {
        self.buffer.emit32(value);
    }

    // Raw field encoders.

    fn emit_r(&mut self, opcode: u32, rs: GpuReg, rt: GpuReg, rd: GpuReg, shamt: u32, funct: u32) {
        self.emit(
            opcode << OPCODE_SHIFT
                | rs.code() << RS_SHIFT
                | rt.code() << RT_SHIFT
                | rd.code() << RD_SHIFT
                | shamt << SHAMT_SHIFT
                | funct,
        );
    }

    fn emit_rsd(&mut self, opcode: u32, rs: GpuReg, rd: GpuReg, shamt: u32, funct: u32) {
        self.emit_r(opcode, rs, GpuReg::Zero, rd, shamt, funct);
    }

    fn emit_rtd(&mut self, opcode: u32, rt: GpuReg, rd: GpuReg, shamt: u32, funct: u32) {
        self.emit_r(opcode, GpuReg::Zero, rt, rd, shamt, funct);
    }

    fn emit_i(&mut self, opcode: u32, rs: GpuReg, rt: GpuReg, imm16: u16) {
        self.emit(
            opcode << OPCODE_SHIFT
                | rs.code() << RS_SHIFT
                | rt.code() << RT_SHIFT
                | u32::from(imm16),
        );
    }

    fn emit_i21(&mut self, opcode: u32, rs: GpuReg, imm21: u32) {
        assert!(is_uint(21, i64::from(imm21)));
        self.emit(opcode << OPCODE_SHIFT | rs.code() << RS_SHIFT | imm21);
    }

    fn emit_i26(&mut self, opcode: u32, imm26: u32) {
        assert!(is_uint(26, i64::from(imm26)));
        self.emit(opcode << OPCODE_SHIFT | imm26);
    }

    fn emit_fr(&mut self, opcode: u32, fmt: u32, ft: FpuReg, fs: FpuReg, fd: FpuReg, funct: u32) {
        self.emit(
            opcode << OPCODE_SHIFT
                | fmt << FMT_SHIFT
                | ft.code() << FT_SHIFT
                | fs.code() << FS_SHIFT
                | fd.code() << FD_SHIFT
                | funct,
        );
    }

    fn emit_msa_3r(&mut self, operation: u32, df: u32, wt: VecReg, ws: VecReg, wd: VecReg, minor: u32) {
        self.emit(
            MSA_MAJOR << OPCODE_SHIFT
                | operation << MSA_OPERATION_SHIFT
                | df << DF_SHIFT
                | wt.code() << WT_SHIFT
                | ws.code() << WS_SHIFT
                | wd.code() << WD_SHIFT
                | minor,
        );
    }

    fn emit_msa_bit(&mut self, operation: u32, df_m: u32, ws: VecReg, wd: VecReg, minor: u32) {
        self.emit(
            MSA_MAJOR << OPCODE_SHIFT
                | operation << MSA_OPERATION_SHIFT
                | df_m << DF_M_SHIFT
                | ws.code() << WS_SHIFT
                | wd.code() << WD_SHIFT
                | minor,
        );
    }

    fn emit_msa_elm(&mut self, operation: u32, df_n: u32, ws: VecReg, wd: VecReg, minor: u32) {
        self.emit(
            MSA_MAJOR << OPCODE_SHIFT
                | operation << MSA_ELM_OPERATION_SHIFT
                | df_n << DF_N_SHIFT
                | ws.code() << WS_SHIFT
                | wd.code() << WD_SHIFT
                | minor,
        );
    }

    fn emit_msa_mi10(&mut self, s10: u32, rs: GpuReg, wd: VecReg, minor: u32, df: u32) {
        assert!(is_uint(10, i64::from(s10)));
        self.emit(
            MSA_MAJOR << OPCODE_SHIFT
                | s10 << S10_SHIFT
                | rs.code() << WS_SHIFT
                | wd.code() << WD_SHIFT
                | minor << S10_MINOR_SHIFT
                | df,
        );
    }

    fn emit_msa_i10(&mut self, operation: u32, df: u32, i10: u32, wd: VecReg, minor: u32) {
        assert!(is_uint(10, i64::from(i10)));
        self.emit(
            MSA_MAJOR << OPCODE_SHIFT
                | operation << MSA_OPERATION_SHIFT
                | df << DF_SHIFT
                | i10 << I10_SHIFT
                | wd.code() << WD_SHIFT
                | minor,
        );
    }

    fn emit_msa_2r(&mut self, operation: u32, df: u32, ws: VecReg, wd: VecReg, minor: u32) {
        self.emit(
            MSA_MAJOR << OPCODE_SHIFT
                | operation << MSA_2R_OPERATION_SHIFT
                | df << DF_2R_SHIFT
                | ws.code() << WS_SHIFT
                | wd.code() << WD_SHIFT
                | minor,
        );
    }

    fn emit_msa_2rf(&mut self, operation: u32, df: u32, ws: VecReg, wd: VecReg, minor: u32) {
        self.emit(
            MSA_MAJOR << OPCODE_SHIFT
                | operation << MSA_2RF_OPERATION_SHIFT
                | df << DF_2R_SHIFT
                | ws.code() << WS_SHIFT
                | wd.code() << WD_SHIFT
                | minor,
        );
    }

    // Arithmetic and logic.

    pub fn addu(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 0, 0x21);
    }

    pub fn addiu(&mut self, rt: GpuReg, rs: GpuReg, imm16: i16) {
        self.emit_i(0x9, rs, rt, imm16 as u16);
    }

    pub fn daddu(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 0, 0x2d);
    }

    pub fn daddiu(&mut self, rt: GpuReg, rs: GpuReg, imm16: i16) {
        self.emit_i(0x19, rs, rt, imm16 as u16);
    }

    pub fn subu(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 0, 0x23);
    }

    pub fn dsubu(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 0, 0x2f);
    }

    pub fn mul(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 2, 0x18);
    }

    pub fn muh(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 3, 0x18);
    }

    pub fn div(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 2, 0x1a);
    }

    pub fn mod_(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 3, 0x1a);
    }

    pub fn divu(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 2, 0x1b);
    }

    pub fn modu(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 3, 0x1b);
    }

    pub fn dmul(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 2, 0x1c);
    }

    pub fn dmuh(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 3, 0x1c);
    }

    pub fn ddiv(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 2, 0x1e);
    }

    pub fn dmod(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 3, 0x1e);
    }

    pub fn ddivu(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 2, 0x1f);
    }

    pub fn dmodu(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 3, 0x1f);
    }

    pub fn and(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 0, 0x24);
    }

    pub fn andi(&mut self, rt: GpuReg, rs: GpuReg, imm16: u16) {
        self.emit_i(0xc, rs, rt, imm16);
    }

    pub fn or(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 0, 0x25);
    }

    pub fn ori(&mut self, rt: GpuReg, rs: GpuReg, imm16: u16) {
        self.emit_i(0xd, rs, rt, imm16);
    }

    pub fn xor(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 0, 0x26);
    }

    pub fn xori(&mut self, rt: GpuReg, rs: GpuReg, imm16: u16) {
        self.emit_i(0xe, rs, rt, imm16);
    }

    pub fn nor(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 0, 0x27);
    }

    pub fn slt(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 0, 0x2a);
    }

    pub fn sltu(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 0, 0x2b);
    }

    pub fn slti(&mut self, rt: GpuReg, rs: GpuReg, imm16: i16) {
        self.emit_i(0xa, rs, rt, imm16 as u16);
    }

    pub fn sltiu(&mut self, rt: GpuReg, rs: GpuReg, imm16: i16) {
        self.emit_i(0xb, rs, rt, imm16 as u16);
    }

    pub fn seleqz(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 0, 0x35);
    }

    pub fn selnez(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg) {
        self.emit_r(0, rs, rt, rd, 0, 0x37);
    }

    pub fn clz(&mut self, rd: GpuReg, rs: GpuReg) {
        self.emit_rsd(0, rs, rd, 0x01, 0x10);
    }

    pub fn clo(&mut self, rd: GpuReg, rs: GpuReg) {
        self.emit_rsd(0, rs, rd, 0x01, 0x11);
    }

    pub fn dclz(&mut self, rd: GpuReg, rs: GpuReg) {
        self.emit_rsd(0, rs, rd, 0x01, 0x12);
    }

    pub fn dclo(&mut self, rd: GpuReg, rs: GpuReg) {
        self.emit_rsd(0, rs, rd, 0x01, 0x13);
    }

    // Bit manipulation.

    pub fn seb(&mut self, rd: GpuReg, rt: GpuReg) {
        self.emit_rtd(0x1f, rt, rd, 0x10, 0x20);
    }

    pub fn seh(&mut self, rd: GpuReg, rt: GpuReg) {
        self.emit_rtd(0x1f, rt, rd, 0x18, 0x20);
    }

    pub fn dsbh(&mut self, rd: GpuReg, rt: GpuReg) {
        self.emit_rtd(0x1f, rt, rd, 0x2, 0x24);
    }

    pub fn dshd(&mut self, rd: GpuReg, rt: GpuReg) {
        self.emit_rtd(0x1f, rt, rd, 0x5, 0x24);
    }

    pub fn wsbh(&mut self, rd: GpuReg, rt: GpuReg) {
        self.emit_rtd(0x1f, rt, rd, 2, 0x20);
    }

    pub fn bitswap(&mut self, rd: GpuReg, rt: GpuReg) {
        self.emit_rtd(0x1f, rt, rd, 0x0, 0x20);
    }

    pub fn dbitswap(&mut self, rd: GpuReg, rt: GpuReg) {
        self.emit_rtd(0x1f, rt, rd, 0x0, 0x24);
    }

    pub fn dext(&mut self, rt: GpuReg, rs: GpuReg, pos: u32, size: u32) {
        assert!(pos < 32 && size > 0 && size <= 32);
        self.emit_r(0x1f, rs, rt, GpuReg::from_code(size - 1), pos, 0x3);
    }

    pub fn ins(&mut self, rt: GpuReg, rs: GpuReg, pos: u32, size: u32) {
        assert!(pos < 32 && size > 0 && pos + size <= 32);
        self.emit_r(0x1f, rs, rt, GpuReg::from_code(pos + size - 1), pos, 0x4);
    }

    pub fn dins(&mut self, rt: GpuReg, rs: GpuReg, pos: u32, size: u32) {
        assert!(pos < 32 && size > 0 && pos + size <= 32);
        self.emit_r(0x1f, rs, rt, GpuReg::from_code(pos + size - 1), pos, 0x7);
    }

    pub fn dinsm(&mut self, rt: GpuReg, rs: GpuReg, pos: u32, size: u32) {
        assert!(pos < 32 && size >= 2 && pos + size > 32 && pos + size <= 64);
        self.emit_r(0x1f, rs, rt, GpuReg::from_code(pos + size - 33), pos, 0x5);
    }

    pub fn dinsu(&mut self, rt: GpuReg, rs: GpuReg, pos: u32, size: u32) {
        assert!((32..64).contains(&pos) && size > 0 && pos + size <= 64);
        self.emit_r(0x1f, rs, rt, GpuReg::from_code(pos + size - 33), pos - 32, 0x6);
    }

    /// Insert into any bit range of a 64-bit register, picking among the
    /// dins/dinsm/dinsu encodings.
    pub fn dbl_ins(&mut self, rt: GpuReg, rs: GpuReg, pos: u32, size: u32) {
        if pos >= 32 {
            self.dinsu(rt, rs, pos, size);
        } else if pos + size <= 32 {
            self.dins(rt, rs, pos, size);
        } else {
            self.dinsm(rt, rs, pos, size);
        }
    }

    pub fn lsa(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg, sa_plus_one: u32) {
        assert!((1..=4).contains(&sa_plus_one));
        self.emit_r(0x0, rs, rt, rd, sa_plus_one - 1, 0x05);
    }

    pub fn dlsa(&mut self, rd: GpuReg, rs: GpuReg, rt: GpuReg, sa_plus_one: u32) {
        assert!((1..=4).contains(&sa_plus_one));
        self.emit_r(0x0, rs, rt, rd, sa_plus_one - 1, 0x15);
    }

    // Shifts.

    pub fn sll(&mut self, rd: GpuReg, rt: GpuReg, shamt: u32) {
        self.emit_r(0, GpuReg::Zero, rt, rd, shamt & 0x1f, 0x00);
    }

    pub fn srl(&mut self, rd: GpuReg, rt: GpuReg, shamt: u32) {
        self.emit_r(0, GpuReg::Zero, rt, rd, shamt & 0x1f, 0x02);
    }

    pub fn rotr(&mut self, rd: GpuReg, rt: GpuReg, shamt: u32) {
        // rs = 1 distinguishes rotr from srl.
        self.emit_r(0, GpuReg::from_code(1), rt, rd, shamt & 0x1f, 0x02);
    }

    pub fn sra(&mut self, rd: GpuReg, rt: GpuReg, shamt: u32) {
        self.emit_r(0, GpuReg::Zero, rt, rd, shamt & 0x1f, 0x03);
    }

    pub fn sllv(&mut self, rd: GpuReg, rt: GpuReg, rs: GpuReg) {
        self.emit_r(0, rs, rt, rd, 0, 0x04);
    }

    pub fn srlv(&mut self, rd: GpuReg, rt: GpuReg, rs: GpuReg) {
        self.emit_r(0, rs, rt, rd, 0, 0x06);
    }

    pub fn rotrv(&mut self, rd: GpuReg, rt: GpuReg, rs: GpuReg) {
        self.emit_r(0, rs, rt, rd, 1, 0x06);
    }

    pub fn srav(&mut self, rd: GpuReg, rt: GpuReg, rs: GpuReg) {
        self.emit_r(0, rs, rt, rd, 0, 0x07);
    }

    pub fn dsll(&mut self, rd: GpuReg, rt: GpuReg, shamt: u32) {
        self.emit_r(0, GpuReg::Zero, rt, rd, shamt & 0x1f, 0x38);
    }

    pub fn dsrl(&mut self, rd: GpuReg, rt: GpuReg, shamt: u32) {
        self.emit_r(0, GpuReg::Zero, rt, rd, shamt & 0x1f, 0x3a);
    }

    pub fn drotr(&mut self, rd: GpuReg, rt: GpuReg, shamt: u32) {
        self.emit_r(0, GpuReg::from_code(1), rt, rd, shamt & 0x1f, 0x3a);
    }

    pub fn dsra(&mut self, rd: GpuReg, rt: GpuReg, shamt: u32) {
        self.emit_r(0, GpuReg::Zero, rt, rd, shamt & 0x1f, 0x3b);
    }

    pub fn dsll32(&mut self, rd: GpuReg, rt: GpuReg, shamt: u32) {
        self.emit_r(0, GpuReg::Zero, rt, rd, shamt & 0x1f, 0x3c);
    }

    pub fn dsrl32(&mut self, rd: GpuReg, rt: GpuReg, shamt: u32) {
        self.emit_r(0, GpuReg::Zero, rt, rd, shamt & 0x1f, 0x3e);
    }

    pub fn drotr32(&mut self, rd: GpuReg, rt: GpuReg, shamt: u32) {
        self.emit_r(0, GpuReg::from_code(1), rt, rd, shamt & 0x1f, 0x3e);
    }

    pub fn dsra32(&mut self, rd: GpuReg, rt: GpuReg, shamt: u32) {
        self.emit_r(0, GpuReg::Zero, rt, rd, shamt & 0x1f, 0x3f);
    }

    pub fn dsllv(&mut self, rd: GpuReg, rt: GpuReg, rs: GpuReg) {
        self.emit_r(0, rs, rt, rd, 0, 0x14);
    }

    pub fn dsrlv(&mut self, rd: GpuReg, rt: GpuReg, rs: GpuReg) {
        self.emit_r(0, rs, rt, rd, 0, 0x16);
    }

    pub fn drotrv(&mut self, rd: GpuReg, rt: GpuReg, rs: GpuReg) {
        self.emit_r(0, rs, rt, rd, 1, 0x16);
    }

    pub fn dsrav(&mut self, rd: GpuReg, rt: GpuReg, rs: GpuReg) {
        self.emit_r(0, rs, rt, rd, 0, 0x17);
    }

    // Loads and stores.

    pub fn lb(&mut self, rt: GpuReg, rs: GpuReg, imm16: i16) {
        self.emit_i(0x20, rs, rt, imm16 as u16);
    }

    pub fn lh(&mut self, rt: GpuReg, rs: GpuReg, imm16: i16) {
        self.emit_i(0x21, rs, rt, imm16 as u16);
    }

    pub fn lw(&mut self, rt: GpuReg, rs: GpuReg, imm16: i16) {
        self.emit_i(0x23, rs, rt, imm16 as u16);
    }

    pub fn ld(&mut self, rt: GpuReg, rs: GpuReg, imm16: i16) {
        self.emit_i(0x37, rs, rt, imm16 as u16);
    }

    pub fn lbu(&mut self, rt: GpuReg, rs: GpuReg, imm16: i16) {
        self.emit_i(0x24, rs, rt, imm16 as u16);
    }

    pub fn lhu(&mut self, rt: GpuReg, rs: GpuReg, imm16: i16) {
        self.emit_i(0x25, rs, rt, imm16 as u16);
    }

    pub fn lwu(&mut self, rt: GpuReg, rs: GpuReg, imm16: i16) {
        self.emit_i(0x27, rs, rt, imm16 as u16);
    }

    pub fn sb(&mut self, rt: GpuReg, rs: GpuReg, imm16: i16) {
        self.emit_i(0x28, rs, rt, imm16 as u16);
    }

    pub fn sh(&mut self, rt: GpuReg, rs: GpuReg, imm16: i16) {
        self.emit_i(0x29, rs, rt, imm16 as u16);
    }

    pub fn sw(&mut self, rt: GpuReg, rs: GpuReg, imm16: i16) {
        self.emit_i(0x2b, rs, rt, imm16 as u16);
    }

    pub fn sd(&mut self, rt: GpuReg, rs: GpuReg, imm16: i16) {
        self.emit_i(0x3f, rs, rt, imm16 as u16);
    }

    pub fn ll(&mut self, rt: GpuReg, rs: GpuReg, imm9: i16) {
        assert!(is_int(9, i64::from(imm9)));
        self.emit_i(0x1f, rs, rt, (((imm9 as u16) & 0x1ff) << 7) | 0x36);
    }

    pub fn lld(&mut self, rt: GpuReg, rs: GpuReg, imm9: i16) {
        assert!(is_int(9, i64::from(imm9)));
        self.emit_i(0x1f, rs, rt, (((imm9 as u16) & 0x1ff) << 7) | 0x37);
    }

    pub fn sc(&mut self, rt: GpuReg, rs: GpuReg, imm9: i16) {
        assert!(is_int(9, i64::from(imm9)));
        self.emit_i(0x1f, rs, rt, (((imm9 as u16) & 0x1ff) << 7) | 0x26);
    }

    pub fn scd(&mut self, rt: GpuReg, rs: GpuReg, imm9: i16) {
        assert!(is_int(9, i64::from(imm9)));
        self.emit_i(0x1f, rs, rt, (((imm9 as u16) & 0x1ff) << 7) | 0x27);
    }

    pub fn lui(&mut self, rt: GpuReg, imm16: u16) {
        self.emit_i(0xf, GpuReg::Zero, rt, imm16);
    }

    pub fn aui(&mut self, rt: GpuReg, rs: GpuReg, imm16: u16) {
        self.emit_i(0xf, rs, rt, imm16);
    }

    pub fn daui(&mut self, rt: GpuReg, rs: GpuReg, imm16: u16) {
        assert_ne!(rs, GpuReg::Zero);
        self.emit_i(0x1d, rs, rt, imm16);
    }

    pub fn dahi(&mut self, rs: GpuReg, imm16: u16) {
        self.emit_i(1, rs, GpuReg::from_code(6), imm16);
    }

    pub fn dati(&mut self, rs: GpuReg, imm16: u16) {
        self.emit_i(1, rs, GpuReg::from_code(0x1e), imm16);
    }

    pub fn sync(&mut self, stype: u32) {
        self.emit_r(0, GpuReg::Zero, GpuReg::Zero, GpuReg::Zero, stype & 0x1f, 0xf);
    }

    // Jumps and PC-relative loads.

    pub fn jalr(&mut self, rd: GpuReg, rs: GpuReg) {
        self.emit_r(0, rs, GpuReg::Zero, rd, 0, 0x09);
    }

    pub fn jalr_ra(&mut self, rs: GpuReg) {
        self.jalr(GpuReg::Ra, rs);
    }

    pub fn jr(&mut self, rs: GpuReg) {
        self.jalr(GpuReg::Zero, rs);
    }

    pub fn jic(&mut self, rt: GpuReg, imm16: u16) {
        self.emit_i(0x36, GpuReg::Zero, rt, imm16);
    }

    fn jialc(&mut self, rt: GpuReg, imm16: u16) {
        self.emit_i(0x3e, GpuReg::Zero, rt, imm16);
    }

    pub fn auipc(&mut self, rs: GpuReg, imm16: u16) {
        self.emit_i(0x3b, rs, GpuReg::from_code(0x1e), imm16);
    }

    fn addiupc(&mut self, rs: GpuReg, imm19: u32) {
        assert!(is_uint(19, i64::from(imm19)));
        self.emit_i21(0x3b, rs, imm19);
    }

    fn lwpc(&mut self, rs: GpuReg, imm19: u32) {
        assert!(is_uint(19, i64::from(imm19)));
        self.emit_i21(0x3b, rs, (0x01 << 19) | imm19);
    }

    fn lwupc(&mut self, rs: GpuReg, imm19: u32) {
        assert!(is_uint(19, i64::from(imm19)));
        self.emit_i21(0x3b, rs, (0x02 << 19) | imm19);
    }

    fn ldpc(&mut self, rs: GpuReg, imm18: u32) {
        assert!(is_uint(18, i64::from(imm18)));
        self.emit_i21(0x3b, rs, (0x06 << 18) | imm18);
    }

    pub fn nop(&mut self) {
        self.emit(0);
    }

    pub fn move_(&mut self, rd: GpuReg, rs: GpuReg) {
        self.or(rd, rs, GpuReg::Zero);
    }

    pub fn clear(&mut self, rd: GpuReg) {
        self.move_(rd, GpuReg::Zero);
    }

    pub fn not(&mut self, rd: GpuReg, rs: GpuReg) {
        self.nor(rd, rs, GpuReg::Zero);
    }

    // Raw compare-and-branch encodings. Offsets come pre-masked and
    // pre-shifted from `Branch::offset`.

    fn emit_bc(&mut self, imm26: u32) {
        self.emit_i26(0x32, imm26);
    }

    fn emit_balc(&mut self, imm26: u32) {
        self.emit_i26(0x3a, imm26);
    }

    fn emit_beqzc(&mut self, rs: GpuReg, imm21: u32) {
        assert_ne!(rs, GpuReg::Zero);
        self.emit_i21(0x36, rs, imm21);
    }

    fn emit_bnezc(&mut self, rs: GpuReg, imm21: u32) {
        assert_ne!(rs, GpuReg::Zero);
        self.emit_i21(0x3e, rs, imm21);
    }

    fn emit_beqc(&mut self, rs: GpuReg, rt: GpuReg, imm16: u16) {
        assert!(rs != GpuReg::Zero && rt != GpuReg::Zero && rs != rt);
        self.emit_i(0x8, rs.min(rt), rs.max(rt), imm16);
    }

    fn emit_bnec(&mut self, rs: GpuReg, rt: GpuReg, imm16: u16) {
        assert!(rs != GpuReg::Zero && rt != GpuReg::Zero && rs != rt);
        self.emit_i(0x18, rs.min(rt), rs.max(rt), imm16);
    }

    fn emit_bltc(&mut self, rs: GpuReg, rt: GpuReg, imm16: u16) {
        assert!(rs != GpuReg::Zero && rt != GpuReg::Zero && rs != rt);
        self.emit_i(0x17, rs, rt, imm16);
    }

    fn emit_bgec(&mut self, rs: GpuReg, rt: GpuReg, imm16: u16) {
        assert!(rs != GpuReg::Zero && rt != GpuReg::Zero && rs != rt);
        self.emit_i(0x16, rs, rt, imm16);
    }

    fn emit_bltuc(&mut self, rs: GpuReg, rt: GpuReg, imm16: u16) {
        assert!(rs != GpuReg::Zero && rt != GpuReg::Zero && rs != rt);
        self.emit_i(0x7, rs, rt, imm16);
    }

    fn emit_bgeuc(&mut self, rs: GpuReg, rt: GpuReg, imm16: u16) {
        assert!(rs != GpuReg::Zero && rt != GpuReg::Zero && rs != rt);
        self.emit_i(0x6, rs, rt, imm16);
    }

    fn emit_bltzc(&mut self, rt: GpuReg, imm16: u16) {
        assert_ne!(rt, GpuReg::Zero);
        self.emit_i(0x17, rt, rt, imm16);
    }

    fn emit_bgezc(&mut self, rt: GpuReg, imm16: u16) {
        assert_ne!(rt, GpuReg::Zero);
        self.emit_i(0x16, rt, rt, imm16);
    }

    fn emit_blezc(&mut self, rt: GpuReg, imm16: u16) {
        assert_ne!(rt, GpuReg::Zero);
        self.emit_i(0x16, GpuReg::Zero, rt, imm16);
    }

    fn emit_bgtzc(&mut self, rt: GpuReg, imm16: u16) {
        assert_ne!(rt, GpuReg::Zero);
        self.emit_i(0x17, GpuReg::Zero, rt, imm16);
    }

    fn emit_bc1eqz(&mut self, ft: FpuReg, imm16: u16) {
        self.emit(0x11 << OPCODE_SHIFT | 0x9 << FMT_SHIFT | ft.code() << FT_SHIFT | u32::from(imm16));
    }

    fn emit_bc1nez(&mut self, ft: FpuReg, imm16: u16) {
        self.emit(0x11 << OPCODE_SHIFT | 0xd << FMT_SHIFT | ft.code() << FT_SHIFT | u32::from(imm16));
    }

    fn emit_bcond(&mut self, cond: BranchCondition, rs: GpuReg, rt: GpuReg, offset: u32) {
        match cond {
            BranchCondition::Lt => self.emit_bltc(rs, rt, offset as u16),
            BranchCondition::Ge => self.emit_bgec(rs, rt, offset as u16),
            BranchCondition::Le => self.emit_bgec(rt, rs, offset as u16),
            BranchCondition::Gt => self.emit_bltc(rt, rs, offset as u16),
            BranchCondition::Ltz => {
                assert_eq!(rt, GpuReg::Zero);
                self.emit_bltzc(rs, offset as u16);
            }
            BranchCondition::Gez => {
                assert_eq!(rt, GpuReg::Zero);
                self.emit_bgezc(rs, offset as u16);
            }
            BranchCondition::Lez => {
                assert_eq!(rt, GpuReg::Zero);
                self.emit_blezc(rs, offset as u16);
            }
            BranchCondition::Gtz => {
                assert_eq!(rt, GpuReg::Zero);
                self.emit_bgtzc(rs, offset as u16);
            }
            BranchCondition::Eq => self.emit_beqc(rs, rt, offset as u16),
            BranchCondition::Ne => self.emit_bnec(rs, rt, offset as u16),
            BranchCondition::Eqz => {
                assert_eq!(rt, GpuReg::Zero);
                self.emit_beqzc(rs, offset);
            }
            BranchCondition::Nez => {
                assert_eq!(rt, GpuReg::Zero);
                self.emit_bnezc(rs, offset);
            }
            BranchCondition::Ltu => self.emit_bltuc(rs, rt, offset as u16),
            BranchCondition::Geu => self.emit_bgeuc(rs, rt, offset as u16),
            BranchCondition::F => {
                assert_eq!(rt, GpuReg::Zero);
                self.emit_bc1eqz(FpuReg::from_code(rs.code()), offset as u16);
            }
            BranchCondition::T => {
                assert_eq!(rt, GpuReg::Zero);
                self.emit_bc1nez(FpuReg::from_code(rs.code()), offset as u16);
            }
            BranchCondition::Uncond => panic!("condition required"),
        }
    }

    // FPU.

    pub fn add_s(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x10, ft, fs, fd, 0x0);
    }

    pub fn add_d(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x11, ft, fs, fd, 0x0);
    }

    pub fn sub_s(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x10, ft, fs, fd, 0x1);
    }

    pub fn sub_d(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x11, ft, fs, fd, 0x1);
    }

    pub fn mul_s(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x10, ft, fs, fd, 0x2);
    }

    pub fn mul_d(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x11, ft, fs, fd, 0x2);
    }

    pub fn div_s(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x10, ft, fs, fd, 0x3);
    }

    pub fn div_d(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x11, ft, fs, fd, 0x3);
    }

    pub fn sqrt_s(&mut self, fd: FpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x10, FpuReg::F0, fs, fd, 0x4);
    }

    pub fn sqrt_d(&mut self, fd: FpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x11, FpuReg::F0, fs, fd, 0x4);
    }

    pub fn abs_s(&mut self, fd: FpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x10, FpuReg::F0, fs, fd, 0x5);
    }

    pub fn abs_d(&mut self, fd: FpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x11, FpuReg::F0, fs, fd, 0x5);
    }

    pub fn mov_s(&mut self, fd: FpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x10, FpuReg::F0, fs, fd, 0x6);
    }

    pub fn mov_d(&mut self, fd: FpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x11, FpuReg::F0, fs, fd, 0x6);
    }

    pub fn neg_s(&mut self, fd: FpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x10, FpuReg::F0, fs, fd, 0x7);
    }

    pub fn neg_d(&mut self, fd: FpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x11, FpuReg::F0, fs, fd, 0x7);
    }

    pub fn trunc_l_s(&mut self, fd: FpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x10, FpuReg::F0, fs, fd, 0x9);
    }

    pub fn trunc_l_d(&mut self, fd: FpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x11, FpuReg::F0, fs, fd, 0x9);
    }

    pub fn trunc_w_s(&mut self, fd: FpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x10, FpuReg::F0, fs, fd, 0xd);
    }

    pub fn trunc_w_d(&mut self, fd: FpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x11, FpuReg::F0, fs, fd, 0xd);
    }

    pub fn cvt_s_w(&mut self, fd: FpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x14, FpuReg::F0, fs, fd, 0x20);
    }

    pub fn cvt_d_w(&mut self, fd: FpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x14, FpuReg::F0, fs, fd, 0x21);
    }

    pub fn cvt_s_l(&mut self, fd: FpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x15, FpuReg::F0, fs, fd, 0x20);
    }

    pub fn cvt_d_l(&mut self, fd: FpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x15, FpuReg::F0, fs, fd, 0x21);
    }

    pub fn cvt_s_d(&mut self, fd: FpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x11, FpuReg::F0, fs, fd, 0x20);
    }

    pub fn cvt_d_s(&mut self, fd: FpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x10, FpuReg::F0, fs, fd, 0x21);
    }

    pub fn sel_s(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x10, ft, fs, fd, 0x10);
    }

    pub fn sel_d(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x11, ft, fs, fd, 0x10);
    }

    pub fn seleqz_s(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x10, ft, fs, fd, 0x14);
    }

    pub fn seleqz_d(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x11, ft, fs, fd, 0x14);
    }

    pub fn selnez_s(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x10, ft, fs, fd, 0x17);
    }

    pub fn selnez_d(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x11, ft, fs, fd, 0x17);
    }

    pub fn class_s(&mut self, fd: FpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x10, FpuReg::F0, fs, fd, 0x1b);
    }

    pub fn class_d(&mut self, fd: FpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x11, FpuReg::F0, fs, fd, 0x1b);
    }

    pub fn min_s(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x10, ft, fs, fd, 0x1c);
    }

    pub fn min_d(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x11, ft, fs, fd, 0x1c);
    }

    pub fn max_s(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x10, ft, fs, fd, 0x1e);
    }

    pub fn max_d(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x11, ft, fs, fd, 0x1e);
    }

    pub fn cmp_un_s(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x14, ft, fs, fd, 0x01);
    }

    pub fn cmp_eq_s(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x14, ft, fs, fd, 0x02);
    }

    pub fn cmp_ueq_s(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x14, ft, fs, fd, 0x03);
    }

    pub fn cmp_lt_s(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x14, ft, fs, fd, 0x04);
    }

    pub fn cmp_ult_s(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x14, ft, fs, fd, 0x05);
    }

    pub fn cmp_le_s(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x14, ft, fs, fd, 0x06);
    }

    pub fn cmp_ule_s(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x14, ft, fs, fd, 0x07);
    }

    pub fn cmp_un_d(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x15, ft, fs, fd, 0x01);
    }

    pub fn cmp_eq_d(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x15, ft, fs, fd, 0x02);
    }

    pub fn cmp_ueq_d(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x15, ft, fs, fd, 0x03);
    }

    pub fn cmp_lt_d(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x15, ft, fs, fd, 0x04);
    }

    pub fn cmp_ult_d(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x15, ft, fs, fd, 0x05);
    }

    pub fn cmp_le_d(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x15, ft, fs, fd, 0x06);
    }

    pub fn cmp_ule_d(&mut self, fd: FpuReg, fs: FpuReg, ft: FpuReg) {
        self.emit_fr(0x11, 0x15, ft, fs, fd, 0x07);
    }

    pub fn mfc1(&mut self, rt: GpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x00, FpuReg::from_code(rt.code()), fs, FpuReg::F0, 0x0);
    }

    pub fn mfhc1(&mut self, rt: GpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x03, FpuReg::from_code(rt.code()), fs, FpuReg::F0, 0x0);
    }

    pub fn mtc1(&mut self, rt: GpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x04, FpuReg::from_code(rt.code()), fs, FpuReg::F0, 0x0);
    }

    pub fn mthc1(&mut self, rt: GpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x07, FpuReg::from_code(rt.code()), fs, FpuReg::F0, 0x0);
    }

    pub fn dmfc1(&mut self, rt: GpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x01, FpuReg::from_code(rt.code()), fs, FpuReg::F0, 0x0);
    }

    pub fn dmtc1(&mut self, rt: GpuReg, fs: FpuReg) {
        self.emit_fr(0x11, 0x05, FpuReg::from_code(rt.code()), fs, FpuReg::F0, 0x0);
    }

    pub fn lwc1(&mut self, ft: FpuReg, rs: GpuReg, imm16: i16) {
        self.emit_i(0x31, rs, GpuReg::from_code(ft.code()), imm16 as u16);
    }

    pub fn ldc1(&mut self, ft: FpuReg, rs: GpuReg, imm16: i16) {
        self.emit_i(0x35, rs, GpuReg::from_code(ft.code()), imm16 as u16);
    }

    pub fn swc1(&mut self, ft: FpuReg, rs: GpuReg, imm16: i16) {
        self.emit_i(0x39, rs, GpuReg::from_code(ft.code()), imm16 as u16);
    }

    pub fn sdc1(&mut self, ft: FpuReg, rs: GpuReg, imm16: i16) {
        self.emit_i(0x3d, rs, GpuReg::from_code(ft.code()), imm16 as u16);
    }

    // MSA.

    pub fn and_v(&mut self, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x0, 0x0, wt, ws, wd, 0x1e);
    }

    pub fn or_v(&mut self, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x0, 0x1, wt, ws, wd, 0x1e);
    }

    pub fn nor_v(&mut self, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x0, 0x2, wt, ws, wd, 0x1e);
    }

    pub fn xor_v(&mut self, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x0, 0x3, wt, ws, wd, 0x1e);
    }

    pub fn addv(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x0, df, wt, ws, wd, 0xe);
    }

    pub fn subv(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x1, df, wt, ws, wd, 0xe);
    }

    pub fn max_s_df(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x2, df, wt, ws, wd, 0xe);
    }

    pub fn max_u_df(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x3, df, wt, ws, wd, 0xe);
    }

    pub fn min_s_df(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x4, df, wt, ws, wd, 0xe);
    }

    pub fn min_u_df(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x5, df, wt, ws, wd, 0xe);
    }

    pub fn add_a(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x0, df, wt, ws, wd, 0x10);
    }

    pub fn ave_s(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x4, df, wt, ws, wd, 0x10);
    }

    pub fn ave_u(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x5, df, wt, ws, wd, 0x10);
    }

    pub fn aver_s(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x6, df, wt, ws, wd, 0x10);
    }

    pub fn aver_u(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x7, df, wt, ws, wd, 0x10);
    }

    pub fn asub_s(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x4, df, wt, ws, wd, 0x11);
    }

    pub fn asub_u(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x5, df, wt, ws, wd, 0x11);
    }

    pub fn mulv(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x0, df, wt, ws, wd, 0x12);
    }

    pub fn maddv(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x1, df, wt, ws, wd, 0x12);
    }

    pub fn msubv(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x2, df, wt, ws, wd, 0x12);
    }

    pub fn div_s_df(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x4, df, wt, ws, wd, 0x12);
    }

    pub fn div_u_df(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x5, df, wt, ws, wd, 0x12);
    }

    pub fn mod_s_df(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x6, df, wt, ws, wd, 0x12);
    }

    pub fn mod_u_df(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x7, df, wt, ws, wd, 0x12);
    }

    pub fn sll_df(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x0, df, wt, ws, wd, 0xd);
    }

    pub fn sra_df(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x1, df, wt, ws, wd, 0xd);
    }

    pub fn srl_df(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x2, df, wt, ws, wd, 0xd);
    }

    pub fn slli_b(&mut self, wd: VecReg, ws: VecReg, shamt: u32) {
        assert!(shamt < 8);
        self.emit_msa_bit(0x0, shamt | DF_M_BYTE, ws, wd, 0x9);
    }

    pub fn slli_h(&mut self, wd: VecReg, ws: VecReg, shamt: u32) {
        assert!(shamt < 16);
        self.emit_msa_bit(0x0, shamt | DF_M_HALF, ws, wd, 0x9);
    }

    pub fn slli_w(&mut self, wd: VecReg, ws: VecReg, shamt: u32) {
        assert!(shamt < 32);
        self.emit_msa_bit(0x0, shamt | DF_M_WORD, ws, wd, 0x9);
    }

    pub fn slli_d(&mut self, wd: VecReg, ws: VecReg, shamt: u32) {
        assert!(shamt < 64);
        self.emit_msa_bit(0x0, shamt | DF_M_DOUBLE, ws, wd, 0x9);
    }

    pub fn srai_b(&mut self, wd: VecReg, ws: VecReg, shamt: u32) {
        assert!(shamt < 8);
        self.emit_msa_bit(0x1, shamt | DF_M_BYTE, ws, wd, 0x9);
    }

    pub fn srai_h(&mut self, wd: VecReg, ws: VecReg, shamt: u32) {
        assert!(shamt < 16);
        self.emit_msa_bit(0x1, shamt | DF_M_HALF, ws, wd, 0x9);
    }

    pub fn srai_w(&mut self, wd: VecReg, ws: VecReg, shamt: u32) {
        assert!(shamt < 32);
        self.emit_msa_bit(0x1, shamt | DF_M_WORD, ws, wd, 0x9);
    }

    pub fn srai_d(&mut self, wd: VecReg, ws: VecReg, shamt: u32) {
        assert!(shamt < 64);
        self.emit_msa_bit(0x1, shamt | DF_M_DOUBLE, ws, wd, 0x9);
    }

    pub fn srli_b(&mut self, wd: VecReg, ws: VecReg, shamt: u32) {
        assert!(shamt < 8);
        self.emit_msa_bit(0x2, shamt | DF_M_BYTE, ws, wd, 0x9);
    }

    pub fn srli_h(&mut self, wd: VecReg, ws: VecReg, shamt: u32) {
        assert!(shamt < 16);
        self.emit_msa_bit(0x2, shamt | DF_M_HALF, ws, wd, 0x9);
    }

    pub fn srli_w(&mut self, wd: VecReg, ws: VecReg, shamt: u32) {
        assert!(shamt < 32);
        self.emit_msa_bit(0x2, shamt | DF_M_WORD, ws, wd, 0x9);
    }

    pub fn srli_d(&mut self, wd: VecReg, ws: VecReg, shamt: u32) {
        assert!(shamt < 64);
        self.emit_msa_bit(0x2, shamt | DF_M_DOUBLE, ws, wd, 0x9);
    }

    pub fn move_v(&mut self, wd: VecReg, ws: VecReg) {
        self.emit_msa_bit(0x1, 0x3e, ws, wd, 0x19);
    }

    pub fn splati_b(&mut self, wd: VecReg, ws: VecReg, n: u32) {
        assert!(n < 16);
        self.emit_msa_elm(0x1, n | DF_N_BYTE, ws, wd, 0x19);
    }

    pub fn splati_h(&mut self, wd: VecReg, ws: VecReg, n: u32) {
        assert!(n < 8);
        self.emit_msa_elm(0x1, n | DF_N_HALF, ws, wd, 0x19);
    }

    pub fn splati_w(&mut self, wd: VecReg, ws: VecReg, n: u32) {
        assert!(n < 4);
        self.emit_msa_elm(0x1, n | DF_N_WORD, ws, wd, 0x19);
    }

    pub fn splati_d(&mut self, wd: VecReg, ws: VecReg, n: u32) {
        assert!(n < 2);
        self.emit_msa_elm(0x1, n | DF_N_DOUBLE, ws, wd, 0x19);
    }

    pub fn copy_s_b(&mut self, rd: GpuReg, ws: VecReg, n: u32) {
        assert!(n < 16);
        self.emit_msa_elm(0x2, n | DF_N_BYTE, ws, VecReg::from_code(rd.code()), 0x19);
    }

    pub fn copy_s_h(&mut self, rd: GpuReg, ws: VecReg, n: u32) {
        assert!(n < 8);
        self.emit_msa_elm(0x2, n | DF_N_HALF, ws, VecReg::from_code(rd.code()), 0x19);
    }

    pub fn copy_s_w(&mut self, rd: GpuReg, ws: VecReg, n: u32) {
        assert!(n < 4);
        self.emit_msa_elm(0x2, n | DF_N_WORD, ws, VecReg::from_code(rd.code()), 0x19);
    }

    pub fn copy_s_d(&mut self, rd: GpuReg, ws: VecReg, n: u32) {
        assert!(n < 2);
        self.emit_msa_elm(0x2, n | DF_N_DOUBLE, ws, VecReg::from_code(rd.code()), 0x19);
    }

    pub fn copy_u_b(&mut self, rd: GpuReg, ws: VecReg, n: u32) {
        assert!(n < 16);
        self.emit_msa_elm(0x3, n | DF_N_BYTE, ws, VecReg::from_code(rd.code()), 0x19);
    }

    pub fn copy_u_h(&mut self, rd: GpuReg, ws: VecReg, n: u32) {
        assert!(n < 8);
        self.emit_msa_elm(0x3, n | DF_N_HALF, ws, VecReg::from_code(rd.code()), 0x19);
    }

    pub fn copy_u_w(&mut self, rd: GpuReg, ws: VecReg, n: u32) {
        assert!(n < 4);
        self.emit_msa_elm(0x3, n | DF_N_WORD, ws, VecReg::from_code(rd.code()), 0x19);
    }

    pub fn insert_b(&mut self, wd: VecReg, rs: GpuReg, n: u32) {
        assert!(n < 16);
        self.emit_msa_elm(0x4, n | DF_N_BYTE, VecReg::from_code(rs.code()), wd, 0x19);
    }

    pub fn insert_h(&mut self, wd: VecReg, rs: GpuReg, n: u32) {
        assert!(n < 8);
        self.emit_msa_elm(0x4, n | DF_N_HALF, VecReg::from_code(rs.code()), wd, 0x19);
    }

    pub fn insert_w(&mut self, wd: VecReg, rs: GpuReg, n: u32) {
        assert!(n < 4);
        self.emit_msa_elm(0x4, n | DF_N_WORD, VecReg::from_code(rs.code()), wd, 0x19);
    }

    pub fn insert_d(&mut self, wd: VecReg, rs: GpuReg, n: u32) {
        assert!(n < 2);
        self.emit_msa_elm(0x4, n | DF_N_DOUBLE, VecReg::from_code(rs.code()), wd, 0x19);
    }

    pub fn fill_b(&mut self, wd: VecReg, rs: GpuReg) {
        self.emit_msa_2r(0xc0, 0x0, VecReg::from_code(rs.code()), wd, 0x1e);
    }

    pub fn fill_h(&mut self, wd: VecReg, rs: GpuReg) {
        self.emit_msa_2r(0xc0, 0x1, VecReg::from_code(rs.code()), wd, 0x1e);
    }

    pub fn fill_w(&mut self, wd: VecReg, rs: GpuReg) {
        self.emit_msa_2r(0xc0, 0x2, VecReg::from_code(rs.code()), wd, 0x1e);
    }

    pub fn fill_d(&mut self, wd: VecReg, rs: GpuReg) {
        self.emit_msa_2r(0xc0, 0x3, VecReg::from_code(rs.code()), wd, 0x1e);
    }

    pub fn ldi_b(&mut self, wd: VecReg, imm8: i32) {
        assert!(is_int(8, i64::from(imm8)));
        self.emit_msa_i10(0x6, 0x0, (imm8 as u32) & MSA_S10_MASK, wd, 0x7);
    }

    pub fn ldi_h(&mut self, wd: VecReg, imm10: i32) {
        assert!(is_int(10, i64::from(imm10)));
        self.emit_msa_i10(0x6, 0x1, (imm10 as u32) & MSA_S10_MASK, wd, 0x7);
    }

    pub fn ldi_w(&mut self, wd: VecReg, imm10: i32) {
        assert!(is_int(10, i64::from(imm10)));
        self.emit_msa_i10(0x6, 0x2, (imm10 as u32) & MSA_S10_MASK, wd, 0x7);
    }

    pub fn ldi_d(&mut self, wd: VecReg, imm10: i32) {
        assert!(is_int(10, i64::from(imm10)));
        self.emit_msa_i10(0x6, 0x3, (imm10 as u32) & MSA_S10_MASK, wd, 0x7);
    }

    pub fn ld_b(&mut self, wd: VecReg, rs: GpuReg, offset: i32) {
        assert!(is_int(10, i64::from(offset)));
        self.emit_msa_mi10((offset as u32) & MSA_S10_MASK, rs, wd, 0x8, 0x0);
    }

    pub fn ld_h(&mut self, wd: VecReg, rs: GpuReg, offset: i32) {
        assert!(is_int(11, i64::from(offset)) && offset % 2 == 0);
        self.emit_msa_mi10(((offset >> 1) as u32) & MSA_S10_MASK, rs, wd, 0x8, 0x1);
    }

    pub fn ld_w(&mut self, wd: VecReg, rs: GpuReg, offset: i32) {
        assert!(is_int(12, i64::from(offset)) && offset % 4 == 0);
        self.emit_msa_mi10(((offset >> 2) as u32) & MSA_S10_MASK, rs, wd, 0x8, 0x2);
    }

    pub fn ld_d(&mut self, wd: VecReg, rs: GpuReg, offset: i32) {
        assert!(is_int(13, i64::from(offset)) && offset % 8 == 0);
        self.emit_msa_mi10(((offset >> 3) as u32) & MSA_S10_MASK, rs, wd, 0x8, 0x3);
    }

    pub fn st_b(&mut self, wd: VecReg, rs: GpuReg, offset: i32) {
        assert!(is_int(10, i64::from(offset)));
        self.emit_msa_mi10((offset as u32) & MSA_S10_MASK, rs, wd, 0x9, 0x0);
    }

    pub fn st_h(&mut self, wd: VecReg, rs: GpuReg, offset: i32) {
        assert!(is_int(11, i64::from(offset)) && offset % 2 == 0);
        self.emit_msa_mi10(((offset >> 1) as u32) & MSA_S10_MASK, rs, wd, 0x9, 0x1);
    }

    pub fn st_w(&mut self, wd: VecReg, rs: GpuReg, offset: i32) {
        assert!(is_int(12, i64::from(offset)) && offset % 4 == 0);
        self.emit_msa_mi10(((offset >> 2) as u32) & MSA_S10_MASK, rs, wd, 0x9, 0x2);
    }

    pub fn st_d(&mut self, wd: VecReg, rs: GpuReg, offset: i32) {
        assert!(is_int(13, i64::from(offset)) && offset % 8 == 0);
        self.emit_msa_mi10(((offset >> 3) as u32) & MSA_S10_MASK, rs, wd, 0x9, 0x3);
    }

    pub fn ilvl(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x4, df, wt, ws, wd, 0x14);
    }

    pub fn ilvr(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x5, df, wt, ws, wd, 0x14);
    }

    pub fn ilvev(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x6, df, wt, ws, wd, 0x14);
    }

    pub fn ilvod(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x7, df, wt, ws, wd, 0x14);
    }

    pub fn hadd_s(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        assert!(df >= 1);
        self.emit_msa_3r(0x4, df, wt, ws, wd, 0x15);
    }

    pub fn hadd_u(&mut self, df: u32, wd: VecReg, ws: VecReg, wt: VecReg) {
        assert!(df >= 1);
        self.emit_msa_3r(0x5, df, wt, ws, wd, 0x15);
    }

    pub fn fadd_w(&mut self, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x0, 0x0, wt, ws, wd, 0x1b);
    }

    pub fn fadd_d(&mut self, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x0, 0x1, wt, ws, wd, 0x1b);
    }

    pub fn fsub_w(&mut self, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x0, 0x2, wt, ws, wd, 0x1b);
    }

    pub fn fsub_d(&mut self, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x0, 0x3, wt, ws, wd, 0x1b);
    }

    pub fn fmul_w(&mut self, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x1, 0x0, wt, ws, wd, 0x1b);
    }

    pub fn fmul_d(&mut self, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x1, 0x1, wt, ws, wd, 0x1b);
    }

    pub fn fdiv_w(&mut self, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x1, 0x2, wt, ws, wd, 0x1b);
    }

    pub fn fdiv_d(&mut self, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x1, 0x3, wt, ws, wd, 0x1b);
    }

    pub fn fmadd_w(&mut self, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x2, 0x0, wt, ws, wd, 0x1b);
    }

    pub fn fmadd_d(&mut self, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x2, 0x1, wt, ws, wd, 0x1b);
    }

    pub fn fmsub_w(&mut self, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x2, 0x2, wt, ws, wd, 0x1b);
    }

    pub fn fmsub_d(&mut self, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x2, 0x3, wt, ws, wd, 0x1b);
    }

    pub fn fmax_w(&mut self, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x7, 0x0, wt, ws, wd, 0x1b);
    }

    pub fn fmax_d(&mut self, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x7, 0x1, wt, ws, wd, 0x1b);
    }

    pub fn fmin_w(&mut self, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x6, 0x0, wt, ws, wd, 0x1b);
    }

    pub fn fmin_d(&mut self, wd: VecReg, ws: VecReg, wt: VecReg) {
        self.emit_msa_3r(0x6, 0x1, wt, ws, wd, 0x1b);
    }

    pub fn ffint_s_w(&mut self, wd: VecReg, ws: VecReg) {
        self.emit_msa_2rf(0x19e, 0x0, ws, wd, 0x1e);
    }

    pub fn ffint_s_d(&mut self, wd: VecReg, ws: VecReg) {
        self.emit_msa_2rf(0x19e, 0x1, ws, wd, 0x1e);
    }

    pub fn ftint_s_w(&mut self, wd: VecReg, ws: VecReg) {
        self.emit_msa_2rf(0x19c, 0x0, ws, wd, 0x1e);
    }

    pub fn ftint_s_d(&mut self, wd: VecReg, ws: VecReg) {
        self.emit_msa_2rf(0x19c, 0x1, ws, wd, 0x1e);
    }

    // Labels and branches.

    pub fn new_label(&mut self) -> LabelId {
        self.labels.push(LabelData::default())
    }

    pub fn is_bound(&self, label: LabelId) -> bool {
        self.labels[label].position.is_some()
    }

    /// Bind `label` at the current end of the buffer, resolving every
    /// branch waiting on it.
    pub fn bind(&mut self, label: LabelId) {
        assert!(!self.is_bound(label), "label bound twice");
        let bound_pc = self.buffer.size() as u32;
        let pending = std::mem::take(&mut self.labels[label].pending);
        for branch_id in pending {
            self.branches[branch_id].resolve(bound_pc);
        }
        // Store the position relative to the end of the preceding branch:
        // no branch sits in between, so the relative distance survives
        // later branch expansion.
        let prev_branch_id_plus_one = self.branches.len() as u32;
        let mut position = bound_pc;
        if prev_branch_id_plus_one != 0 {
            let prev = &self.branches[BranchId::from_usize(prev_branch_id_plus_one as usize - 1)];
            position -= prev.end_location();
        }
        let data = &mut self.labels[label];
        data.prev_branch_id_plus_one = prev_branch_id_plus_one;
        data.position = Some(position);
    }

    /// The label's current absolute location. Valid for bound labels only;
    /// reflects branch expansion performed so far.
    pub fn label_location(&self, label: LabelId) -> u32 {
        let data = &self.labels[label];
        let mut target = match data.position {
            Some(p) => p,
            None => panic!("location of unbound label"),
        };
        if data.prev_branch_id_plus_one != 0 {
            let prev =
                &self.branches[BranchId::from_usize(data.prev_branch_id_plus_one as usize - 1)];
            target += prev.end_location();
        }
        target
    }

    /// Translate a pre-finalization buffer position into its final
    /// location. Called in nondecreasing position order (code order), which
    /// keeps the whole sweep linear in branches plus queries.
    pub fn adjusted_position(&mut self, old_position: u32) -> u32 {
        if old_position < self.last_old_position {
            self.last_position_adjustment = 0;
            self.last_old_position = 0;
            self.last_branch_id = 0;
        }
        while self.last_branch_id != self.branches.len() {
            let branch = &self.branches[BranchId::from_usize(self.last_branch_id)];
            if branch.location >= old_position + self.last_position_adjustment {
                break;
            }
            self.last_position_adjustment += branch.size() - branch.old_size();
            self.last_branch_id += 1;
        }
        self.last_old_position = old_position;
        old_position + self.last_position_adjustment
    }

    fn finalize_labeled_branch(&mut self, label: LabelId) {
        let branch_id = BranchId::from_usize(self.branches.len() - 1);
        let length = self.branches[branch_id].length();
        if !self.is_bound(label) {
            self.labels[label].pending.push(branch_id);
        }
        for _ in 0..length {
            self.nop();
        }
    }

    fn buncond(&mut self, label: LabelId, is_call: bool, is_bare: bool) {
        let target = if self.is_bound(label) { self.label_location(label) } else { UNRESOLVED };
        self.branches.push(Branch::new_uncond(self.buffer.size() as u32, target, is_call, is_bare));
        self.finalize_labeled_branch(label);
    }

    /// Emit a conditional branch; drops never-taken branches and strength
    /// reduces always-taken ones to unconditional.
    pub fn bcond(&mut self, label: LabelId, condition: BranchCondition, lhs: GpuReg, rhs: GpuReg) {
        if Branch::is_nop(condition, lhs, rhs) {
            return;
        }
        let target = if self.is_bound(label) { self.label_location(label) } else { UNRESOLVED };
        self.branches.push(Branch::new_cond(
            self.buffer.size() as u32,
            target,
            condition,
            lhs,
            rhs,
            false,
        ));
        self.finalize_labeled_branch(label);
    }

    pub fn bc(&mut self, label: LabelId) {
        self.buncond(label, false, false);
    }

    pub fn balc(&mut self, label: LabelId) {
        self.buncond(label, true, false);
    }

    pub fn beqc(&mut self, rs: GpuReg, rt: GpuReg, label: LabelId) {
        self.bcond(label, BranchCondition::Eq, rs, rt);
    }

    pub fn bnec(&mut self, rs: GpuReg, rt: GpuReg, label: LabelId) {
        self.bcond(label, BranchCondition::Ne, rs, rt);
    }

    pub fn bltc(&mut self, rs: GpuReg, rt: GpuReg, label: LabelId) {
        self.bcond(label, BranchCondition::Lt, rs, rt);
    }

    pub fn bgec(&mut self, rs: GpuReg, rt: GpuReg, label: LabelId) {
        self.bcond(label, BranchCondition::Ge, rs, rt);
    }

    pub fn bltuc(&mut self, rs: GpuReg, rt: GpuReg, label: LabelId) {
        self.bcond(label, BranchCondition::Ltu, rs, rt);
    }

    pub fn bgeuc(&mut self, rs: GpuReg, rt: GpuReg, label: LabelId) {
        self.bcond(label, BranchCondition::Geu, rs, rt);
    }

    pub fn beqzc(&mut self, rs: GpuReg, label: LabelId) {
        self.bcond(label, BranchCondition::Eqz, rs, GpuReg::Zero);
    }

    pub fn bnezc(&mut self, rs: GpuReg, label: LabelId) {
        self.bcond(label, BranchCondition::Nez, rs, GpuReg::Zero);
    }

    pub fn bltzc(&mut self, rs: GpuReg, label: LabelId) {
        self.bcond(label, BranchCondition::Ltz, rs, GpuReg::Zero);
    }

    pub fn bgezc(&mut self, rs: GpuReg, label: LabelId) {
        self.bcond(label, BranchCondition::Gez, rs, GpuReg::Zero);
    }

    pub fn blezc(&mut self, rs: GpuReg, label: LabelId) {
        self.bcond(label, BranchCondition::Lez, rs, GpuReg::Zero);
    }

    pub fn bgtzc(&mut self, rs: GpuReg, label: LabelId) {
        self.bcond(label, BranchCondition::Gtz, rs, GpuReg::Zero);
    }

    pub fn bc1eqz(&mut self, ft: FpuReg, label: LabelId) {
        self.bcond(label, BranchCondition::F, GpuReg::from_code(ft.code()), GpuReg::Zero);
    }

    pub fn bc1nez(&mut self, ft: FpuReg, label: LabelId) {
        self.bcond(label, BranchCondition::T, GpuReg::from_code(ft.code()), GpuReg::Zero);
    }

    /// Load the address a label will be bound at. The label must not be
    /// bound yet; the load is recorded like a forward branch.
    pub fn load_label_address(&mut self, dest: GpuReg, label: LabelId) {
        assert!(!self.is_bound(label));
        self.branches.push(Branch::new_label_or_literal(
            self.buffer.size() as u32,
            dest,
            BranchKind::Label,
        ));
        self.finalize_labeled_branch(label);
    }

    // Literals.

    pub fn new_literal32(&mut self, value: u32) -> LiteralId {
        let label = self.new_label();
        self.literals.push(LiteralData { value: u64::from(value), label });
        LiteralId { index: self.literals.len() - 1, long: false }
    }

    pub fn new_literal64(&mut self, value: u64) -> LiteralId {
        let label = self.new_label();
        self.long_literals.push(LiteralData { value, label });
        LiteralId { index: self.long_literals.len() - 1, long: true }
    }

    /// PC-relative load of a pooled literal. `sign_extend` selects lwpc
    /// over lwupc for 32-bit literals.
    pub fn load_literal(&mut self, dest: GpuReg, literal: LiteralId, sign_extend: bool) {
        let (label, kind) = if literal.long {
            (self.long_literals[literal.index].label, BranchKind::LiteralLong)
        } else {
            let kind = if sign_extend { BranchKind::Literal } else { BranchKind::LiteralUnsigned };
            (self.literals[literal.index].label, kind)
        };
        assert!(!self.is_bound(label));
        self.branches.push(Branch::new_label_or_literal(self.buffer.size() as u32, dest, kind));
        self.finalize_labeled_branch(label);
    }

    // Jump tables.

    /// Record an in-code jump table whose entries are target addresses
    /// relative to the table start. Space is reserved during finalization.
    pub fn create_jump_table(&mut self, targets: Vec<LabelId>) -> JumpTableId {
        let label = self.new_label();
        self.jump_tables.push(JumpTableData { label, targets });
        JumpTableId(self.jump_tables.len() - 1)
    }

    /// The label marking a jump table's first entry.
    pub fn jump_table_label(&self, table: JumpTableId) -> LabelId {
        self.jump_tables[table.0].label
    }

    // Composite sequences.

    /// Materialize a 32-bit constant in at most two instructions.
    pub fn load_const32(&mut self, rd: GpuReg, value: i32) {
        if is_uint(16, i64::from(value)) {
            self.ori(rd, GpuReg::Zero, value as u16);
        } else if is_int(16, i64::from(value)) {
            self.addiu(rd, GpuReg::Zero, value as i16);
        } else {
            self.lui(rd, high16(value as u32));
            if value & 0xffff != 0 {
                self.ori(rd, rd, low16(value as u32));
            }
        }
    }

    /// Materialize a 64-bit constant, picking the cheapest of the
    /// single-register R6 recipes (1 to 4 instructions).
    pub fn load_const64(&mut self, rd: GpuReg, value: i64) {
        let bit31 = (value & 0x8000_0000) != 0;
        let bit31_adj = if bit31 { 1i64 } else { 0 };
        // Instruction count for loading the value if its two 32-bit halves
        // are equal; used to decide when dinsu replication wins.
        let rep32_count = {
            let x = value as i32;
            let y = (value >> 32) as i32;
            if x == y {
                if is_uint(16, i64::from(x)) || is_int(16, i64::from(x)) || (x & 0xffff) == 0 {
                    Some(2)
                } else {
                    Some(3)
                }
            } else {
                None
            }
        };

        if is_uint(16, value) {
            self.ori(rd, GpuReg::Zero, value as u16);
        } else if is_int(16, value) {
            self.daddiu(rd, GpuReg::Zero, value as i16);
        } else if (value & 0xffff) == 0 && is_int(16, value >> 16) {
            self.lui(rd, (value >> 16) as u16);
        } else if is_int(32, value) {
            self.lui(rd, (value >> 16) as u16);
            self.ori(rd, rd, value as u16);
        } else if (value & 0xffff_0000) == 0 && is_int(16, value >> 32) {
            self.ori(rd, GpuReg::Zero, value as u16);
            self.dahi(rd, (value >> 32) as u16);
        } else if (value as u64) & 0xffff_ffff_0000 == 0 {
            self.ori(rd, GpuReg::Zero, value as u16);
            self.dati(rd, (value >> 48) as u16);
        } else if (value & 0xffff) == 0
            && (-32768 - bit31_adj) <= (value >> 32)
            && (value >> 32) <= (32767 - bit31_adj)
        {
            self.lui(rd, (value >> 16) as u16);
            self.dahi(rd, ((value >> 32) + bit31_adj) as u16);
        } else if (value & 0xffff) == 0
            && ((value >> 31) & 0x1ffff) == ((0x20000 - bit31_adj) & 0x1ffff)
        {
            self.lui(rd, (value >> 16) as u16);
            self.dati(rd, ((value >> 48) + bit31_adj) as u16);
        } else if is_int(16, i64::from(value as i32))
            && (-32768 - bit31_adj) <= (value >> 32)
            && (value >> 32) <= (32767 - bit31_adj)
        {
            self.daddiu(rd, GpuReg::Zero, value as i16);
            self.dahi(rd, ((value >> 32) + bit31_adj) as u16);
        } else if is_int(16, i64::from(value as i32))
            && ((value >> 31) & 0x1ffff) == ((0x20000 - bit31_adj) & 0x1ffff)
        {
            self.daddiu(rd, GpuReg::Zero, value as i16);
            self.dati(rd, ((value >> 48) + bit31_adj) as u16);
        } else if (value as u64).wrapping_add(1).is_power_of_two() {
            // All-ones run from the top bit downward.
            let shift_cnt = 64 - (value as u64).wrapping_add(1).trailing_zeros();
            self.daddiu(rd, GpuReg::Zero, -1);
            if shift_cnt < 32 {
                self.dsrl(rd, rd, shift_cnt);
            } else {
                self.dsrl32(rd, rd, shift_cnt & 31);
            }
        } else {
            let shift_cnt = value.trailing_zeros();
            let tmp = value >> shift_cnt;
            if is_uint(16, tmp) {
                self.ori(rd, GpuReg::Zero, tmp as u16);
                if shift_cnt < 32 {
                    self.dsll(rd, rd, shift_cnt);
                } else {
                    self.dsll32(rd, rd, shift_cnt & 31);
                }
            } else if is_int(16, tmp) {
                self.daddiu(rd, GpuReg::Zero, tmp as i16);
                if shift_cnt < 32 {
                    self.dsll(rd, rd, shift_cnt);
                } else {
                    self.dsll32(rd, rd, shift_cnt & 31);
                }
            } else if rep32_count.is_some_and(|n| n < 3) {
                self.load_const32(rd, value as i32);
                self.dinsu(rd, rd, 32, 32);
            } else if is_int(32, tmp) {
                self.lui(rd, (tmp >> 16) as u16);
                self.ori(rd, rd, tmp as u16);
                if shift_cnt < 32 {
                    self.dsll(rd, rd, shift_cnt);
                } else {
                    self.dsll32(rd, rd, shift_cnt & 31);
                }
            } else {
                let shift_cnt = 16 + (value >> 16).trailing_zeros();
                let tmp = value >> shift_cnt;
                if is_uint(16, tmp) {
                    self.ori(rd, GpuReg::Zero, tmp as u16);
                    if shift_cnt < 32 {
                        self.dsll(rd, rd, shift_cnt);
                    } else {
                        self.dsll32(rd, rd, shift_cnt & 31);
                    }
                    self.ori(rd, rd, value as u16);
                } else if is_int(16, tmp) {
                    self.daddiu(rd, GpuReg::Zero, tmp as i16);
                    if shift_cnt < 32 {
                        self.dsll(rd, rd, shift_cnt);
                    } else {
                        self.dsll32(rd, rd, shift_cnt & 31);
                    }
                    self.ori(rd, rd, value as u16);
                } else if rep32_count.is_some_and(|n| n < 4) {
                    self.load_const32(rd, value as i32);
                    self.dinsu(rd, rd, 32, 32);
                } else {
                    self.load_const32(rd, value as i32);
                    let mut tmp2 = value as u64;
                    if bit31 {
                        tmp2 = tmp2.wrapping_add(0x1_0000_0000);
                    }
                    if (tmp2 >> 32) & 0xffff != 0 {
                        self.dahi(rd, (tmp2 >> 32) as u16);
                    }
                    if tmp2 & 0x8000_0000_0000 != 0 {
                        tmp2 = tmp2.wrapping_add(0x1_0000_0000_0000);
                    }
                    if tmp2 >> 48 != 0 {
                        self.dati(rd, (tmp2 >> 48) as u16);
                    }
                }
            }
        }
    }

    /// Add a 32-bit immediate, materializing it through AT when it does
    /// not fit addiu.
    pub fn addiu32(&mut self, rt: GpuReg, rs: GpuReg, value: i32) {
        if is_int(16, i64::from(value)) {
            self.addiu(rt, rs, value as i16);
        } else {
            let hi = ((value >> 16) as i32 + i32::from((value & 0x8000) != 0)) as u16;
            self.aui(rt, rs, hi);
            if value & 0xffff != 0 {
                self.addiu(rt, rt, value as i16);
            }
        }
    }

    /// Add a 64-bit immediate. `rtmp` must differ from `rs` unless the
    /// immediate fits daddiu.
    pub fn daddiu64(&mut self, rt: GpuReg, rs: GpuReg, value: i64, rtmp: GpuReg) {
        if is_int(16, value) {
            self.daddiu(rt, rs, value as i16);
        } else {
            assert_ne!(rtmp, rs);
            self.load_const64(rtmp, value);
            self.daddu(rt, rs, rtmp);
        }
    }

    /// Rewrite `base`/`offset` so `offset` (and `offset + 4` for a
    /// two-access doubleword) fits the 16-bit load/store immediate.
    /// Clobbers AT when an adjustment is required.
    pub fn adjust_base_and_offset(
        &mut self,
        base: &mut GpuReg,
        offset: &mut i32,
        is_doubleword: bool,
    ) {
        assert_ne!(*base, GpuReg::At);

        let doubleword_aligned = *offset % 8 == 0;
        let two_accesses = is_doubleword && !doubleword_aligned;

        if is_int(16, i64::from(*offset))
            && (!two_accesses || is_int(16, i64::from(*offset + 4)))
        {
            return;
        }

        let misalignment = *offset & 7;

        // Max int16 that is a multiple of 8, so the misalignment of the
        // offset is preserved.
        const MIN_SIMPLE_ADJUSTMENT: i32 = 0x7ff8;
        const MAX_SIMPLE_ADJUSTMENT: i32 = 2 * MIN_SIMPLE_ADJUSTMENT;

        if (0..=MAX_SIMPLE_ADJUSTMENT).contains(offset) {
            self.daddiu(GpuReg::At, *base, MIN_SIMPLE_ADJUSTMENT as i16);
            *offset -= MIN_SIMPLE_ADJUSTMENT;
        } else if (-MAX_SIMPLE_ADJUSTMENT..0).contains(offset) {
            self.daddiu(GpuReg::At, *base, -MIN_SIMPLE_ADJUSTMENT as i16);
            *offset += MIN_SIMPLE_ADJUSTMENT;
        } else {
            let offset_low = *offset as i16;
            let mut offset_low32 = i32::from(offset_low);
            let mut offset_high = (*offset >> 16) as i16;
            let mut overflow_hi16 = false;
            if offset_low < 0 {
                offset_high = offset_high.wrapping_add(1);
                overflow_hi16 = offset_high == i16::MIN;
            }
            self.daui(GpuReg::At, *base, offset_high as u16);
            if overflow_hi16 {
                self.dahi(GpuReg::At, 1);
            }
            if two_accesses && !is_int(16, i64::from(offset_low32 + 4)) {
                // Avoid the +4 overflowing the instruction's offset field.
                self.daddiu(GpuReg::At, GpuReg::At, 8);
                offset_low32 -= 8;
            }
            *offset = offset_low32;
        }
        *base = GpuReg::At;

        assert!(is_int(16, i64::from(*offset)));
        if two_accesses {
            assert!(is_int(16, i64::from(*offset + 4)));
        }
        assert_eq!(misalignment, *offset & 7);
    }

    /// Rewrite `base`/`offset` for an MSA vector access and pick the
    /// widest element size the offset alignment permits.
    fn adjust_base_offset_and_element_size_shift(
        &mut self,
        base: &mut GpuReg,
        offset: &mut i32,
        element_size_shift: &mut i32,
    ) {
        assert_ne!(*base, GpuReg::At);

        if *element_size_shift >= 0 {
            assert!(*element_size_shift <= 3);
            assert!(offset.trailing_zeros() as i32 >= *element_size_shift || *offset == 0);
        } else if *offset % 8 == 0 {
            *element_size_shift = 3;
        } else if *offset % 4 == 0 {
            *element_size_shift = 2;
        } else if *offset % 2 == 0 {
            *element_size_shift = 1;
        } else {
            *element_size_shift = 0;
        }

        let low_len = 10 + *element_size_shift;
        let mut low = *offset & ((1 << low_len) - 1);
        low -= (low & (1 << (low_len - 1))) << 1;
        if low == *offset {
            return;
        }

        let max_delta_simple = 0x8000 - (1 << *element_size_shift);
        let max_load_store_offset = 0x1ff << *element_size_shift;
        let max_offset_simple = max_delta_simple + max_load_store_offset;

        if is_int(16, i64::from(*offset)) {
            self.daddiu(GpuReg::At, *base, *offset as i16);
            *offset = 0;
        } else if (0..=max_offset_simple).contains(offset) {
            self.daddiu(GpuReg::At, *base, max_delta_simple as i16);
            *offset -= max_delta_simple;
        } else if (-max_offset_simple..0).contains(offset) {
            self.daddiu(GpuReg::At, *base, -max_delta_simple as i16);
            *offset += max_delta_simple;
        } else {
            // Supply the remaining 16-bit parts through daui/dahi/daddiu,
            // compensating for each one's sign extension.
            let mut tmp = (*offset as u32 as u64).wrapping_sub(low as u32 as u64);
            tmp = tmp.wrapping_add((tmp & (1 << 15)) << 1);
            tmp = tmp.wrapping_add((tmp & (1 << 31)) << 1);
            let mid = tmp as u16;
            let upper = (tmp >> 16) as u16;
            let hi = (tmp >> 32) as u16;
            self.daui(GpuReg::At, *base, upper);
            if hi != 0 {
                assert_eq!(hi, 1);
                self.dahi(GpuReg::At, hi);
            }
            if mid != 0 {
                self.daddiu(GpuReg::At, GpuReg::At, mid as i16);
            }
            *offset = low;
        }
        *base = GpuReg::At;
        assert!(*offset == 0 || offset.trailing_zeros() as i32 >= *element_size_shift);
        assert!(is_int(10, i64::from(*offset >> *element_size_shift)));
    }

    pub fn load_from_offset(
        &mut self,
        ty: LoadOperandType,
        reg: GpuReg,
        mut base: GpuReg,
        mut offset: i32,
    ) {
        assert_ne!(ty, LoadOperandType::Quadword);
        self.adjust_base_and_offset(&mut base, &mut offset, ty == LoadOperandType::Doubleword);
        match ty {
            LoadOperandType::SignedByte => self.lb(reg, base, offset as i16),
            LoadOperandType::UnsignedByte => self.lbu(reg, base, offset as i16),
            LoadOperandType::SignedHalfword => self.lh(reg, base, offset as i16),
            LoadOperandType::UnsignedHalfword => self.lhu(reg, base, offset as i16),
            LoadOperandType::Word => {
                assert_eq!(offset % 4, 0);
                self.lw(reg, base, offset as i16);
            }
            LoadOperandType::UnsignedWord => {
                assert_eq!(offset % 4, 0);
                self.lwu(reg, base, offset as i16);
            }
            LoadOperandType::Doubleword => {
                if offset % 8 != 0 {
                    assert_eq!(offset % 4, 0);
                    assert_ne!(reg, GpuReg::TMP2);
                    self.lwu(reg, base, offset as i16);
                    self.lwu(GpuReg::TMP2, base, (offset + 4) as i16);
                    self.dinsu(reg, GpuReg::TMP2, 32, 32);
                } else {
                    self.ld(reg, base, offset as i16);
                }
            }
            LoadOperandType::Quadword => unreachable!(),
        }
    }

    pub fn store_to_offset(
        &mut self,
        ty: StoreOperandType,
        reg: GpuReg,
        mut base: GpuReg,
        mut offset: i32,
    ) {
        assert_ne!(ty, StoreOperandType::Quadword);
        assert!(reg != GpuReg::TMP2 && base != GpuReg::TMP2);
        self.adjust_base_and_offset(&mut base, &mut offset, ty == StoreOperandType::Doubleword);
        match ty {
            StoreOperandType::Byte => self.sb(reg, base, offset as i16),
            StoreOperandType::Halfword => self.sh(reg, base, offset as i16),
            StoreOperandType::Word => {
                assert_eq!(offset % 4, 0);
                self.sw(reg, base, offset as i16);
            }
            StoreOperandType::Doubleword => {
                if offset % 8 != 0 {
                    assert_eq!(offset % 4, 0);
                    self.sw(reg, base, offset as i16);
                    self.dsrl32(GpuReg::TMP2, reg, 0);
                    self.sw(GpuReg::TMP2, base, (offset + 4) as i16);
                } else {
                    self.sd(reg, base, offset as i16);
                }
            }
            StoreOperandType::Quadword => unreachable!(),
        }
    }

    pub fn load_fpu_from_offset(
        &mut self,
        ty: LoadOperandType,
        reg: FpuReg,
        mut base: GpuReg,
        mut offset: i32,
    ) {
        let mut element_size_shift = -1;
        if ty != LoadOperandType::Quadword {
            self.adjust_base_and_offset(&mut base, &mut offset, ty == LoadOperandType::Doubleword);
        } else {
            self.adjust_base_offset_and_element_size_shift(
                &mut base,
                &mut offset,
                &mut element_size_shift,
            );
        }
        match ty {
            LoadOperandType::Word => {
                assert_eq!(offset % 4, 0);
                self.lwc1(reg, base, offset as i16);
            }
            LoadOperandType::Doubleword => {
                if offset % 8 != 0 {
                    assert_eq!(offset % 4, 0);
                    self.lwc1(reg, base, offset as i16);
                    self.lw(GpuReg::TMP2, base, (offset + 4) as i16);
                    self.mthc1(GpuReg::TMP2, reg);
                } else {
                    self.ldc1(reg, base, offset as i16);
                }
            }
            LoadOperandType::Quadword => {
                let w = VecReg::from_code(reg.code());
                match element_size_shift {
                    0 => self.ld_b(w, base, offset),
                    1 => self.ld_h(w, base, offset),
                    2 => self.ld_w(w, base, offset),
                    3 => self.ld_d(w, base, offset),
                    _ => unreachable!(),
                }
            }
            _ => panic!("bad FPU load type {ty:?}"),
        }
    }

    pub fn store_fpu_to_offset(
        &mut self,
        ty: StoreOperandType,
        reg: FpuReg,
        mut base: GpuReg,
        mut offset: i32,
    ) {
        let mut element_size_shift = -1;
        if ty != StoreOperandType::Quadword {
            self.adjust_base_and_offset(&mut base, &mut offset, ty == StoreOperandType::Doubleword);
        } else {
            self.adjust_base_offset_and_element_size_shift(
                &mut base,
                &mut offset,
                &mut element_size_shift,
            );
        }
        match ty {
            StoreOperandType::Word => {
                assert_eq!(offset % 4, 0);
                self.swc1(reg, base, offset as i16);
            }
            StoreOperandType::Doubleword => {
                if offset % 8 != 0 {
                    assert_eq!(offset % 4, 0);
                    self.mfhc1(GpuReg::TMP2, reg);
                    self.swc1(reg, base, offset as i16);
                    self.sw(GpuReg::TMP2, base, (offset + 4) as i16);
                } else {
                    self.sdc1(reg, base, offset as i16);
                }
            }
            StoreOperandType::Quadword => {
                let w = VecReg::from_code(reg.code());
                match element_size_shift {
                    0 => self.st_b(w, base, offset),
                    1 => self.st_h(w, base, offset),
                    2 => self.st_w(w, base, offset),
                    3 => self.st_d(w, base, offset),
                    _ => unreachable!(),
                }
            }
            _ => panic!("bad FPU store type {ty:?}"),
        }
    }

    // Finalization.

    /// Emit pooled data, run branch promotion to a fixed point and rewrite
    /// every placeholder with its final encoding. No code may be appended
    /// afterwards.
    pub fn finalize_code(&mut self) {
        assert!(!self.finalized);
        self.emit_literals();
        self.reserve_jump_table_space();
        self.promote_branches();
        self.emit_branches();
        self.emit_jump_tables();
        self.finalized = true;
    }

    fn emit_literals(&mut self) {
        for i in 0..self.literals.len() {
            let label = self.literals[i].label;
            let value = self.literals[i].value as u32;
            self.bind(label);
            self.buffer.emit32(value);
        }
        // 64-bit literals want 8-byte alignment but no padding is inserted
        // here; promote_branches aligns them once code motion is final.
        for i in 0..self.long_literals.len() {
            let label = self.long_literals[i].label;
            let value = self.long_literals[i].value;
            self.bind(label);
            self.buffer.emit64(value);
        }
    }

    fn reserve_jump_table_space(&mut self) {
        for i in 0..self.jump_tables.len() {
            let label = self.jump_tables[i].label;
            let entries = self.jump_tables[i].targets.len();
            self.bind(label);
            // Filler, not final data: branch promotion may still move it.
            for _ in 0..entries {
                self.buffer.emit32(JUMP_TABLE_FILLER);
            }
        }
    }

    fn promote_branches(&mut self) {
        // Grow branches until no offset is out of range. Each promotion
        // relocates everything downstream, which can push other offsets
        // out of range, hence the fixed point.
        let mut changed = true;
        while changed {
            changed = false;
            for i in 0..self.branches.len() {
                let id = BranchId::from_usize(i);
                assert!(self.branches[id].is_resolved());
                let delta = self.branches[id].promote_if_needed(self.max_short_distance);
                if delta != 0 {
                    changed = true;
                    let expand_location = self.branches[id].location;
                    for branch in self.branches.iter_mut() {
                        branch.relocate(expand_location, delta);
                    }
                }
            }
        }

        // Move the code between branch placeholders to its final place,
        // walking backward so source bytes are read before being clobbered.
        if let Some(last) = self.branches.last() {
            let size_delta = last.end_location() - last.old_end_location();
            let old_size = self.buffer.size();
            self.buffer.resize(old_size + size_delta as usize);
            let mut end = old_size as u32;
            for i in (0..self.branches.len()).rev() {
                let branch = &self.branches[BranchId::from_usize(i)];
                let size = end - branch.old_end_location();
                self.buffer.move_within(
                    branch.end_location() as usize,
                    branch.old_end_location() as usize,
                    size as usize,
                );
                end = branch.old_location;
            }
        }

        // 8-align the 64-bit literal pool by moving it down one word;
        // shrinking the distance keeps every literal load in range.
        if !self.long_literals.is_empty() {
            let first_literal_location = self.label_location(self.long_literals[0].label);
            let lit_size = self.long_literals.len() * 8;
            let buf_size = self.buffer.size();
            assert_eq!(first_literal_location as usize + lit_size, buf_size);
            if first_literal_location % 8 != 0 {
                self.buffer.move_within(
                    first_literal_location as usize - 4,
                    first_literal_location as usize,
                    lit_size,
                );
                self.buffer.resize(buf_size - 4);
                for branch in self.branches.iter_mut() {
                    let target = branch.target;
                    if target >= first_literal_location {
                        branch.resolve(target - 4);
                    }
                }
                for lit in &self.long_literals {
                    let data = &mut self.labels[lit.label];
                    if let Some(p) = data.position.as_mut() {
                        *p -= 4;
                    }
                }
            }
        }
    }

    fn emit_branches(&mut self) {
        let size = self.buffer.size();
        self.buffer.ensure_capacity(size);
        self.buffer.begin_overwrite(0);
        for i in 0..self.branches.len() {
            let branch = self.branches[BranchId::from_usize(i)].clone();
            self.emit_branch(&branch);
        }
        self.buffer.end_overwrite();
    }

    fn emit_branch(&mut self, branch: &Branch) {
        self.buffer.set_cursor(branch.location as usize);
        let mut offset = branch.offset();
        let condition = branch.condition;
        let lhs = branch.lhs;
        let rhs = branch.rhs;
        match branch.kind {
            BranchKind::UncondBranch | BranchKind::BareUncondBranch => {
                self.emit_bc(offset);
            }
            BranchKind::CondBranch => {
                self.emit_bcond(condition, lhs, rhs, offset);
                // The forbidden slot after a compact conditional branch must
                // not hold another branch; pad it with a nop.
                self.nop();
            }
            BranchKind::BareCondBranch => {
                self.emit_bcond(condition, lhs, rhs, offset);
            }
            BranchKind::Call | BranchKind::BareCall => {
                self.emit_balc(offset);
            }
            BranchKind::Label => {
                self.addiupc(lhs, offset);
            }
            BranchKind::Literal => {
                self.lwpc(lhs, offset);
            }
            BranchKind::LiteralUnsigned => {
                self.lwupc(lhs, offset);
            }
            BranchKind::LiteralLong => {
                self.ldpc(lhs, offset);
            }
            BranchKind::LongUncondBranch => {
                // Account for sign extension in jic.
                offset = offset.wrapping_add((offset & 0x8000) << 1);
                self.auipc(GpuReg::At, high16(offset));
                self.jic(GpuReg::At, low16(offset));
            }
            BranchKind::LongCondBranch => {
                self.emit_bcond(condition.opposite(), lhs, rhs, 2);
                offset = offset.wrapping_add((offset & 0x8000) << 1);
                self.auipc(GpuReg::At, high16(offset));
                self.jic(GpuReg::At, low16(offset));
            }
            BranchKind::LongCall => {
                offset = offset.wrapping_add((offset & 0x8000) << 1);
                self.auipc(GpuReg::At, high16(offset));
                self.jialc(GpuReg::At, low16(offset));
            }
            BranchKind::FarLabel => {
                offset = offset.wrapping_add((offset & 0x8000) << 1);
                self.auipc(GpuReg::At, high16(offset));
                self.daddiu(lhs, GpuReg::At, low16(offset) as i16);
            }
            BranchKind::FarLiteral => {
                offset = offset.wrapping_add((offset & 0x8000) << 1);
                self.auipc(GpuReg::At, high16(offset));
                self.lw(lhs, GpuReg::At, low16(offset) as i16);
            }
            BranchKind::FarLiteralUnsigned => {
                offset = offset.wrapping_add((offset & 0x8000) << 1);
                self.auipc(GpuReg::At, high16(offset));
                self.lwu(lhs, GpuReg::At, low16(offset) as i16);
            }
            BranchKind::FarLiteralLong => {
                offset = offset.wrapping_add((offset & 0x8000) << 1);
                self.auipc(GpuReg::At, high16(offset));
                self.ld(lhs, GpuReg::At, low16(offset) as i16);
            }
        }
        assert_eq!(self.buffer.cursor(), branch.end_location() as usize);
        assert!(branch.size() < MAX_BRANCH_SIZE);
    }

    fn emit_jump_tables(&mut self) {
        if self.jump_tables.is_empty() {
            return;
        }
        let size = self.buffer.size();
        self.buffer.ensure_capacity(size);
        self.buffer.begin_overwrite(0);
        for i in 0..self.jump_tables.len() {
            let start = self.label_location(self.jump_tables[i].label);
            let targets = self.jump_tables[i].targets.clone();
            self.buffer.set_cursor(start as usize);
            for target in targets {
                assert_eq!(self.buffer.load32(self.buffer.cursor()), JUMP_TABLE_FILLER);
                let offset = self.label_location(target).wrapping_sub(start);
                self.buffer.emit32(offset);
            }
        }
        self.buffer.end_overwrite();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(code: &[u8]) -> Vec<u32> {
        code.chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn alu_encodings() {
        let mut asm = Mips64Assembler::new();
        asm.daddu(GpuReg::V0, GpuReg::A0, GpuReg::A1);
        asm.ori(GpuReg::T0, GpuReg::Zero, 0x1234);
        asm.dsll32(GpuReg::T1, GpuReg::T1, 5);
        asm.finalize_code();
        let w = words(asm.code());
        assert_eq!(w[0], (4 << 21) | (5 << 16) | (2 << 11) | 0x2d);
        assert_eq!(w[1], (0xd << 26) | (12 << 16) | 0x1234);
        assert_eq!(w[2], (13 << 16) | (13 << 11) | (5 << 6) | 0x3c);
    }

    #[test]
    fn short_backward_branch_offset() {
        let mut asm = Mips64Assembler::new();
        let target = asm.new_label();
        asm.bind(target);
        asm.nop();
        asm.nop();
        asm.bc(target);
        asm.finalize_code();
        let w = words(asm.code());
        // bc at byte 8 targeting byte 0: offset words = (0 - 8 - 4) >> 2.
        let imm26 = w[2] & 0x03ff_ffff;
        assert_eq!(w[2] >> 26, 0x32);
        assert_eq!(imm26, (-3i32 as u32) & 0x03ff_ffff);
    }

    #[test]
    fn forward_cond_branch_resolves_on_bind() {
        let mut asm = Mips64Assembler::new();
        let done = asm.new_label();
        asm.bnezc(GpuReg::A0, done);
        asm.nop();
        asm.bind(done);
        asm.finalize_code();
        let w = words(asm.code());
        // bnezc is the first word, followed by the forbidden-slot nop.
        assert_eq!(w[0] >> 26, 0x3e);
        // Target is byte 12, offset words = (12 - 0 - 4) >> 2 = 2.
        assert_eq!(w[0] & 0x1f_ffff, 2);
        assert_eq!(w[1], 0);
    }

    #[test]
    fn cond_branch_to_self_register_is_elided() {
        let mut asm = Mips64Assembler::new();
        let l = asm.new_label();
        // a0 < a0 is never true; nothing should be emitted.
        asm.bltc(GpuReg::A0, GpuReg::A0, l);
        assert_eq!(asm.size(), 0);
        asm.bind(l);
        asm.finalize_code();
    }

    #[test]
    fn always_taken_cond_becomes_uncond() {
        let mut asm = Mips64Assembler::new();
        let l = asm.new_label();
        asm.bgec(GpuReg::A0, GpuReg::A0, l);
        asm.bind(l);
        asm.finalize_code();
        let w = words(asm.code());
        // One word: bc, not the two-word cond-branch-plus-nop form.
        assert_eq!(w.len(), 1);
        assert_eq!(w[0] >> 26, 0x32);
    }

    #[test]
    fn forced_promotion_emits_long_form() {
        let mut asm = Mips64Assembler::new();
        asm.set_max_short_distance(0);
        let done = asm.new_label();
        asm.beqzc(GpuReg::A0, done);
        asm.nop();
        asm.bind(done);
        asm.finalize_code();
        let w = words(asm.code());
        // Long cond branch: opposite short branch over it, then auipc+jic.
        assert_eq!(w.len(), 4);
        // bnezc a0, +2 words.
        assert_eq!(w[0] >> 26, 0x3e);
        assert_eq!(w[0] & 0x1f_ffff, 2);
        // auipc at.
        assert_eq!(w[1] >> 26, 0x3b);
        // jic at.
        assert_eq!(w[2] >> 26, 0x36);
        assert_eq!(w[3], 0);
    }

    #[test]
    fn promotion_fixed_point_is_deterministic() {
        let emit = || {
            let mut asm = Mips64Assembler::new();
            let far = asm.new_label();
            asm.beqzc(GpuReg::A0, far);
            // Enough filler that the 23-bit beqzc offset cannot reach.
            for _ in 0..(1 << 21) {
                asm.nop();
            }
            asm.bind(far);
            asm.nop();
            asm.finalize_code();
            asm.into_code()
        };
        let a = emit();
        let b = emit();
        assert_eq!(a.len(), b.len());
        assert_eq!(a, b);
    }

    #[test]
    fn label_location_tracks_expansion() {
        let mut asm = Mips64Assembler::new();
        asm.set_max_short_distance(0);
        let l1 = asm.new_label();
        let l2 = asm.new_label();
        asm.bc(l1);
        asm.nop();
        asm.bind(l1);
        asm.bc(l2);
        asm.bind(l2);
        asm.finalize_code();
        // bc promoted to 2 words each; l1 sits after the first long branch
        // and its nop.
        assert_eq!(asm.label_location(l1), 12);
        assert_eq!(asm.label_location(l2), 16);
        assert_eq!(asm.size(), 16);
    }

    #[test]
    fn adjusted_position_accounts_for_growth() {
        let mut asm = Mips64Assembler::new();
        asm.set_max_short_distance(0);
        let l = asm.new_label();
        asm.bc(l);
        asm.nop();
        asm.bind(l);
        asm.finalize_code();
        // Positions before the branch do not move, positions after it
        // shift by the 4-byte growth.
        assert_eq!(asm.adjusted_position(0), 0);
        assert_eq!(asm.adjusted_position(8), 12);
    }

    #[test]
    fn literal_load_and_pool_emission() {
        let mut asm = Mips64Assembler::new();
        let lit = asm.new_literal32(0xdead_beef);
        asm.load_literal(GpuReg::V0, lit, false);
        asm.nop();
        asm.finalize_code();
        let w = words(asm.code());
        // lwupc v0, +2 words; pool word follows the nop.
        assert_eq!(w[0] >> 26, 0x3b);
        assert_eq!((w[0] >> 19) & 0x3, 0x02);
        assert_eq!(w[0] & 0x7_ffff, 2);
        assert_eq!(w[2], 0xdead_beef);
    }

    #[test]
    fn long_literal_pool_is_8_aligned() {
        let mut asm = Mips64Assembler::new();
        let lit = asm.new_literal64(0x0123_4567_89ab_cdef);
        asm.load_literal(GpuReg::V0, lit, false);
        asm.nop();
        asm.nop();
        asm.finalize_code();
        let lit_loc = asm.label_location(asm.long_literals[0].label);
        assert_eq!(lit_loc % 8, 0);
        let w = words(asm.code());
        let idx = (lit_loc / 4) as usize;
        assert_eq!(w[idx], 0x89ab_cdef);
        assert_eq!(w[idx + 1], 0x0123_4567);
    }

    #[test]
    fn jump_table_entries_are_relative_to_table_start() {
        let mut asm = Mips64Assembler::new();
        let case0 = asm.new_label();
        let case1 = asm.new_label();
        let table = asm.create_jump_table(vec![case0, case1]);
        asm.bind(case0);
        asm.nop();
        asm.bind(case1);
        asm.nop();
        asm.finalize_code();
        let start = asm.label_location(asm.jump_table_label(table));
        let w = words(asm.code());
        let idx = (start / 4) as usize;
        assert_eq!(w[idx], asm.label_location(case0).wrapping_sub(start));
        assert_eq!(w[idx + 1], asm.label_location(case1).wrapping_sub(start));
    }

    #[test]
    fn load_const64_uses_short_recipes() {
        let mut asm = Mips64Assembler::new();
        asm.load_const64(GpuReg::V0, 0x7fff);
        asm.load_const64(GpuReg::V0, -1);
        asm.finalize_code();
        let w = words(asm.code());
        assert_eq!(w.len(), 2);
        // ori v0, zero, 0x7fff then daddiu v0, zero, -1.
        assert_eq!(w[0] >> 26, 0xd);
        assert_eq!(w[1] >> 26, 0x19);
        assert_eq!(w[1] & 0xffff, 0xffff);
    }

    #[test]
    fn adjust_base_and_offset_preserves_alignment() {
        let mut asm = Mips64Assembler::new();
        let mut base = GpuReg::Sp;
        let mut offset = 0x2_0004;
        asm.adjust_base_and_offset(&mut base, &mut offset, true);
        assert_eq!(base, GpuReg::At);
        assert_eq!(offset & 7, 4);
        assert!(offset >= i32::from(i16::MIN) && offset + 4 <= i32::from(i16::MAX));
    }

    #[test]
    fn misaligned_doubleword_store_splits() {
        let mut asm = Mips64Assembler::new();
        asm.store_to_offset(StoreOperandType::Doubleword, GpuReg::V0, GpuReg::Sp, 4);
        asm.finalize_code();
        let w = words(asm.code());
        // sw, dsrl32, sw.
        assert_eq!(w.len(), 3);
        assert_eq!(w[0] >> 26, 0x2b);
        assert_eq!(w[1] & 0x3f, 0x3e);
        assert_eq!(w[2] >> 26, 0x2b);
    }
}
