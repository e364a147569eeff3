//! The instruction graph this crate consumes.
//!
//! The graph arrives fully built and fully optimized: a list of basic blocks,
//! each a list of typed instructions, with control flow expressed as block
//! ids. This layer reads it and never rewrites it; the register allocator's
//! output (a [crate::locations::LocationSummary] per instruction) is kept in
//! a side table owned by the code generator rather than on the nodes, so the
//! graph itself stays immutable here.
//!
//! Instructions are a closed enum, and both code-generation passes (the
//! locations builder and the instruction visitor) are single `match`es over
//! it. Instructions and blocks live in index-addressed arenas scoped to one
//! compilation.

use index_vec::{define_index_type, IndexVec};
use smallvec::SmallVec;

define_index_type! {
    /// An instruction in [Graph::insts].
    pub struct InstId = u32;
}

define_index_type! {
    /// A basic block in [Graph::blocks].
    pub struct BlockId = u32;
}

/// Value types. `Reference` is a 32-bit compressed heap reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Type {
    Bool,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Int64,
    Float32,
    Float64,
    Reference,
    Void,
}

impl Type {
    pub fn size(self) -> u32 {
        match self {
            Type::Bool | Type::Int8 | Type::Uint8 => 1,
            Type::Int16 | Type::Uint16 => 2,
            Type::Int32 | Type::Float32 | Type::Reference => 4,
            Type::Int64 | Type::Float64 => 8,
            Type::Void => panic!("void has no size"),
        }
    }

    pub fn size_shift(self) -> u32 {
        self.size().trailing_zeros()
    }

    pub fn is_fp(self) -> bool {
        matches!(self, Type::Float32 | Type::Float64)
    }

    pub fn is_64bit(self) -> bool {
        matches!(self, Type::Int64 | Type::Float64)
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            Type::Bool
                | Type::Int8
                | Type::Uint8
                | Type::Int16
                | Type::Uint16
                | Type::Int32
                | Type::Int64
        )
    }
}

/// A compile-time constant value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConstVal {
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Null,
}

impl ConstVal {
    /// The constant widened to 64 bits, for immediate-legality decisions.
    pub fn as_i64(&self) -> i64 {
        match self {
            ConstVal::Int32(v) => *v as i64,
            ConstVal::Int64(v) => *v,
            ConstVal::Float32(v) => v.to_bits() as i32 as i64,
            ConstVal::Float64(v) => v.to_bits() as i64,
            ConstVal::Null => 0,
        }
    }

    pub fn is_zero_bits(&self) -> bool {
        self.as_i64() == 0
    }
}

/// Comparison conditions, including the unsigned ("below"/"above") forms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    B,
    Be,
    A,
    Ae,
}

impl Cond {
    pub fn negated(self) -> Cond {
        match self {
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Lt => Cond::Ge,
            Cond::Le => Cond::Gt,
            Cond::Gt => Cond::Le,
            Cond::Ge => Cond::Lt,
            Cond::B => Cond::Ae,
            Cond::Be => Cond::A,
            Cond::A => Cond::Be,
            Cond::Ae => Cond::B,
        }
    }
}

/// Bias for float comparisons that must totally order NaN.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FpBias {
    GtBias,
    LtBias,
}

/// An external reference to be resolved by the linker or at run time.
/// The numeric value is an index into the dex file's respective table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DexRef(pub u32);

/// How a statically-bound callee is materialized at the call site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodLoadKind {
    /// Callee is the method being compiled; reuse the method register.
    Recursive,
    /// Boot-image method whose address is computed PC-relatively and patched
    /// by the linker.
    BootImageRelRo(DexRef),
    /// Load from the .bss entry the class linker fills on first resolution.
    BssEntry(DexRef),
    /// JIT-known raw code address.
    DirectAddress(u64),
    /// Give up and resolve through the runtime at the call site.
    RuntimeCall(DexRef),
}

/// How a class or string constant is materialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataLoadKind {
    BootImageRelRo(DexRef),
    BssEntry(DexRef),
    RuntimeCall(DexRef),
}

/// Instance or static field access descriptor.
#[derive(Clone, Copy, Debug)]
pub struct FieldInfo {
    pub offset: i32,
    pub ty: Type,
    pub is_volatile: bool,
}

/// The fixed allow-list of library methods with hand-written fast paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intrinsic {
    DoubleDoubleToRawLongBits,
    DoubleLongBitsToDouble,
    FloatFloatToRawIntBits,
    FloatIntBitsToFloat,
    IntegerReverse,
    IntegerReverseBytes,
    IntegerBitCount,
    IntegerNumberOfLeadingZeros,
    IntegerNumberOfTrailingZeros,
    IntegerValueOf,
    LongReverse,
    LongReverseBytes,
    LongBitCount,
    LongNumberOfLeadingZeros,
    LongNumberOfTrailingZeros,
    ShortReverseBytes,
    MathAbsDouble,
    MathAbsFloat,
    MathAbsInt,
    MathAbsLong,
    MathMinIntInt,
    MathMinLongLong,
    MathMinFloatFloat,
    MathMinDoubleDouble,
    MathMaxIntInt,
    MathMaxLongLong,
    MathMaxFloatFloat,
    MathMaxDoubleDouble,
    MathSqrt,
    StringCompareTo,
    StringEquals,
    StringIndexOf,
    StringIndexOfAfter,
    SystemArrayCopyChar,
    ThreadCurrentThread,
    ThreadInterrupted,
}

/// Packed SIMD type: an element type replicated across a 128-bit vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackedType {
    pub elem: Type,
    pub lanes: u8,
}

impl PackedType {
    pub fn new(elem: Type, lanes: u8) -> Self {
        PackedType { elem, lanes }
    }

    pub fn bit_width(&self) -> u32 {
        self.elem.size() * 8 * u32::from(self.lanes)
    }
}

/// Vector operation kinds; the operand arity lives in the enclosing
/// [Inst::VecOp]'s input list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VecOpKind {
    ReplicateScalar,
    ExtractScalar,
    ReduceSum,
    Neg,
    Abs,
    Not,
    Add,
    /// Halving add, optionally rounded; signedness follows the element type.
    HalvingAdd { rounded: bool },
    SaturatingAdd,
    Sub,
    SaturatingSub,
    Mul,
    Div,
    Min,
    Max,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    UShr,
    /// out += a * b (fused into one op by the earlier simplifier pass).
    MulAdd,
    MulSub,
    Load,
    Store,
}

/// One IR operation. Operand instruction ids refer into [Graph::insts].
#[derive(Clone, Debug)]
pub enum Inst {
    Constant(ConstVal),
    /// Incoming method parameter number `index` (receiver included).
    ParameterValue { index: u16 },
    /// The method pointer of the method being compiled.
    CurrentMethod,

    Add { lhs: InstId, rhs: InstId },
    Sub { lhs: InstId, rhs: InstId },
    Mul { lhs: InstId, rhs: InstId },
    Div { lhs: InstId, rhs: InstId },
    Rem { lhs: InstId, rhs: InstId },
    And { lhs: InstId, rhs: InstId },
    Or { lhs: InstId, rhs: InstId },
    Xor { lhs: InstId, rhs: InstId },
    Shl { value: InstId, amount: InstId },
    Shr { value: InstId, amount: InstId },
    UShr { value: InstId, amount: InstId },
    Ror { value: InstId, amount: InstId },
    Neg { input: InstId },
    Not { input: InstId },
    BooleanNot { input: InstId },
    /// Three-way compare producing -1/0/1, with a NaN bias for floats.
    Compare { lhs: InstId, rhs: InstId, bias: Option<FpBias> },
    /// A materializable boolean condition; may instead be fused into a
    /// consuming [Inst::If] when it is the sole user.
    Condition { cond: Cond, lhs: InstId, rhs: InstId, bias: Option<FpBias> },
    /// Numeric conversion; the source type is the operand's result type.
    TypeConversion { input: InstId },

    Goto { target: BlockId },
    If { cond: InstId, true_target: BlockId, false_target: BlockId },
    Return { value: Option<InstId> },
    PackedSwitch {
        input: InstId,
        start_value: i32,
        targets: SmallVec<[BlockId; 8]>,
        default_target: BlockId,
    },

    NullCheck { object: InstId },
    BoundsCheck { index: InstId, length: InstId },
    DivZeroCheck { value: InstId },
    SuspendCheck,
    ClinitCheck { class: InstId },

    LoadClass { load_kind: DataLoadKind, needs_access_check: bool },
    LoadString { load_kind: DataLoadKind },

    InstanceFieldGet { object: InstId, field: FieldInfo },
    InstanceFieldSet {
        object: InstId,
        value: InstId,
        field: FieldInfo,
        value_can_be_null: bool,
    },
    StaticFieldGet { class: InstId, field: FieldInfo },
    StaticFieldSet {
        class: InstId,
        value: InstId,
        field: FieldInfo,
        value_can_be_null: bool,
    },
    ArrayGet { array: InstId, index: InstId },
    ArraySet {
        array: InstId,
        index: InstId,
        value: InstId,
        value_can_be_null: bool,
        needs_type_check: bool,
    },
    ArrayLength { array: InstId },

    InvokeStaticOrDirect {
        load_kind: MethodLoadKind,
        args: SmallVec<[InstId; 4]>,
        intrinsic: Option<Intrinsic>,
    },
    InvokeVirtual {
        vtable_index: u32,
        args: SmallVec<[InstId; 4]>,
        intrinsic: Option<Intrinsic>,
    },

    MonitorOperation { object: InstId, is_enter: bool },
    Deoptimize { cond: InstId },

    VecOp {
        kind: VecOpKind,
        packed: PackedType,
        inputs: SmallVec<[InstId; 4]>,
        /// Memory operand offset for vector load/store.
        offset: i32,
    },
}

/// An instruction node: the operation, its result type and the bytecode
/// position it came from (carried into stack maps and diagnostics).
#[derive(Clone, Debug)]
pub struct InstNode {
    pub op: Inst,
    pub ty: Type,
    pub dex_pc: u32,
}

impl InstNode {
    pub fn new(op: Inst, ty: Type, dex_pc: u32) -> Self {
        InstNode { op, ty, dex_pc }
    }

    pub fn as_const(&self) -> Option<ConstVal> {
        match self.op {
            Inst::Constant(c) => Some(c),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Block {
    pub insts: Vec<InstId>,
    pub successors: SmallVec<[BlockId; 2]>,
}

/// One method's instruction graph plus the per-method facts the frame
/// builder needs.
#[derive(Debug, Default)]
pub struct Graph {
    pub blocks: IndexVec<BlockId, Block>,
    pub insts: IndexVec<InstId, InstNode>,
    /// Blocks in the order code is laid out; the first is the entry.
    pub block_order: Vec<BlockId>,
    /// Dex registers in the frame's vreg area.
    pub num_vregs: u16,
    /// Stack space reserved for outgoing call arguments, in bytes.
    pub outgoing_args_size: u32,
    /// True if any instruction can reach a safepoint (forces RA save).
    pub has_calls: bool,
}

impl Graph {
    pub fn node(&self, id: InstId) -> &InstNode {
        &self.insts[id]
    }

    /// The block laid out directly after `block`, if any; used to elide
    /// branches that would target the fallthrough successor.
    pub fn next_in_order(&self, block: BlockId) -> Option<BlockId> {
        let pos = self.block_order.iter().position(|b| *b == block)?;
        self.block_order.get(pos + 1).copied()
    }
}
