//! Hand-written fast paths for recognized library methods.
//!
//! An intrinsified invoke keeps its invoke node; only its location summary
//! and emission change. [try_build_locations] either commits to the fast
//! path by returning a summary or refuses, in which case the invoke is
//! compiled as a plain call. Fast paths that can still bail out at run time
//! (range guards, allocation) branch to an intrinsic slow path that re-does
//! the original call out of line.

use crate::config::{ObjectModel, QuickEntrypoint, ThreadModel};
use crate::ir::{Inst, InstId, Intrinsic, Type};
use crate::locations::{CallKind, Location, LocationSummary, Policy};
use crate::mips64::asm::{LabelId, LoadOperandType, StoreOperandType};
use crate::mips64::codegen::{fpr_of, gpr_of, is_int16, CodeGenerator};
use crate::mips64::{FpuReg, GpuReg};
use smallvec::SmallVec;

fn invoke_args(cg: &CodeGenerator<'_>, inst: InstId) -> SmallVec<[InstId; 4]> {
    match &cg.graph.node(inst).op {
        Inst::InvokeStaticOrDirect { args, .. } | Inst::InvokeVirtual { args, .. } => args.clone(),
        _ => panic!("intrinsic on a non-invoke"),
    }
}

fn const_i32_arg(cg: &CodeGenerator<'_>, arg: InstId) -> Option<i32> {
    cg.graph.node(arg).as_const().map(|c| c.as_i64() as i32)
}

fn const_or_register(cg: &CodeGenerator<'_>, arg: InstId) -> Location {
    match cg.graph.node(arg).as_const() {
        Some(value) => Location::Constant { value, origin: arg },
        None => Location::Unallocated(Policy::RequiresRegister),
    }
}

// ----------------------------------------------------------------------
// Location summary shapes shared by groups of intrinsics.

fn int_to_int() -> LocationSummary {
    let mut s = LocationSummary::new_intrinsified(CallKind::NoCall);
    s.set_in_at(0, Location::Unallocated(Policy::RequiresRegister));
    s.set_out(Location::Unallocated(Policy::RequiresRegister));
    s
}

fn fp_to_fp() -> LocationSummary {
    let mut s = LocationSummary::new_intrinsified(CallKind::NoCall);
    s.set_in_at(0, Location::Unallocated(Policy::RequiresFpuRegister));
    s.set_out(Location::Unallocated(Policy::RequiresFpuRegister));
    s
}

fn fp_to_int() -> LocationSummary {
    let mut s = LocationSummary::new_intrinsified(CallKind::NoCall);
    s.set_in_at(0, Location::Unallocated(Policy::RequiresFpuRegister));
    s.set_out(Location::Unallocated(Policy::RequiresRegister));
    s
}

fn int_to_fp() -> LocationSummary {
    let mut s = LocationSummary::new_intrinsified(CallKind::NoCall);
    s.set_in_at(0, Location::Unallocated(Policy::RequiresRegister));
    s.set_out(Location::Unallocated(Policy::RequiresFpuRegister));
    s
}

fn int_int_to_int() -> LocationSummary {
    let mut s = int_to_int();
    s.set_in_at(1, Location::Unallocated(Policy::RequiresRegister));
    s
}

fn fp_fp_to_fp() -> LocationSummary {
    let mut s = fp_to_fp();
    s.set_in_at(1, Location::Unallocated(Policy::RequiresFpuRegister));
    s
}

/// Commit-or-refuse: `Some` pins the invoke to the fast path below, `None`
/// sends it down the ordinary call path.
pub(super) fn try_build_locations(
    cg: &CodeGenerator<'_>,
    intrinsic: Intrinsic,
    inst: InstId,
) -> Option<LocationSummary> {
    use Intrinsic::*;
    let summary = match intrinsic {
        DoubleDoubleToRawLongBits | FloatFloatToRawIntBits => fp_to_int(),
        DoubleLongBitsToDouble | FloatIntBitsToFloat => int_to_fp(),

        IntegerReverse | IntegerReverseBytes | IntegerBitCount | IntegerNumberOfLeadingZeros
        | IntegerNumberOfTrailingZeros | LongReverse | LongReverseBytes | LongBitCount
        | LongNumberOfLeadingZeros | LongNumberOfTrailingZeros | ShortReverseBytes
        | MathAbsInt | MathAbsLong => int_to_int(),

        MathAbsDouble | MathAbsFloat | MathSqrt => fp_to_fp(),

        MathMinIntInt | MathMinLongLong | MathMaxIntInt | MathMaxLongLong => int_int_to_int(),
        MathMinFloatFloat | MathMinDoubleDouble | MathMaxFloatFloat | MathMaxDoubleDouble => {
            fp_fp_to_fp()
        }

        IntegerValueOf => {
            let arg = invoke_args(cg, inst)[0];
            let mut s = LocationSummary::new_intrinsified(CallKind::CallOnMainPath);
            s.set_in_at(0, match cg.graph.node(arg).as_const() {
                Some(value) => Location::Constant { value, origin: arg },
                None => Location::Gpr(GpuReg::A0.code()),
            });
            s.set_out(Location::Gpr(GpuReg::V0.code()));
            s
        }

        StringCompareTo => {
            let mut s = LocationSummary::new_intrinsified(CallKind::CallOnMainPath);
            s.set_in_at(0, Location::Gpr(GpuReg::A0.code()));
            s.set_in_at(1, Location::Gpr(GpuReg::A1.code()));
            s.set_out(Location::Gpr(GpuReg::V0.code()));
            s
        }

        StringEquals => {
            // The inline class comparison reads raw class words; with read
            // barriers those may be stale, so keep the plain call.
            if cg.config.emit_read_barriers() {
                return None;
            }
            let mut s = LocationSummary::new_intrinsified(CallKind::NoCall);
            s.set_in_at(0, Location::Unallocated(Policy::RequiresRegister));
            s.set_in_at(1, Location::Unallocated(Policy::RequiresRegister));
            s.set_out(Location::Unallocated(Policy::RequiresRegister));
            // Lengths and the running pointers.
            s.add_temp(Location::Unallocated(Policy::RequiresRegister));
            s.add_temp(Location::Unallocated(Policy::RequiresRegister));
            s.add_temp(Location::Unallocated(Policy::RequiresRegister));
            s
        }

        StringIndexOf => {
            let mut s = LocationSummary::new_intrinsified(CallKind::CallOnMainPath);
            s.set_in_at(0, Location::Gpr(GpuReg::A0.code()));
            s.set_in_at(1, Location::Gpr(GpuReg::A1.code()));
            // Start index, fixed at zero by this overload.
            s.add_temp(Location::Gpr(GpuReg::A2.code()));
            s.set_out(Location::Gpr(GpuReg::V0.code()));
            s
        }
        StringIndexOfAfter => {
            let mut s = LocationSummary::new_intrinsified(CallKind::CallOnMainPath);
            s.set_in_at(0, Location::Gpr(GpuReg::A0.code()));
            s.set_in_at(1, Location::Gpr(GpuReg::A1.code()));
            s.set_in_at(2, Location::Gpr(GpuReg::A2.code()));
            s.set_out(Location::Gpr(GpuReg::V0.code()));
            s
        }

        SystemArrayCopyChar => {
            let args = invoke_args(cg, inst);
            // A negative constant position or length always throws; let the
            // plain call raise it.
            let negative = |a: InstId| const_i32_arg(cg, a).map_or(false, |v| v < 0);
            if negative(args[1]) || negative(args[3]) || negative(args[4]) {
                return None;
            }
            let mut s = LocationSummary::new_intrinsified(CallKind::CallOnSlowPath);
            s.set_in_at(0, Location::Unallocated(Policy::RequiresRegister));
            s.set_in_at(1, const_or_register(cg, args[1]));
            s.set_in_at(2, Location::Unallocated(Policy::RequiresRegister));
            s.set_in_at(3, const_or_register(cg, args[3]));
            s.set_in_at(4, const_or_register(cg, args[4]));
            // Running source/destination pointers and the element count.
            s.add_temp(Location::Unallocated(Policy::RequiresRegister));
            s.add_temp(Location::Unallocated(Policy::RequiresRegister));
            s.add_temp(Location::Unallocated(Policy::RequiresRegister));
            s
        }

        ThreadCurrentThread | ThreadInterrupted => {
            let mut s = LocationSummary::new_intrinsified(CallKind::NoCall);
            s.set_out(Location::Unallocated(Policy::RequiresRegister));
            s
        }
    };
    Some(summary)
}

pub(super) fn generate(cg: &mut CodeGenerator<'_>, intrinsic: Intrinsic, inst: InstId) {
    use Intrinsic::*;
    match intrinsic {
        DoubleDoubleToRawLongBits => generate_fp_to_int_bits(cg, inst, true),
        FloatFloatToRawIntBits => generate_fp_to_int_bits(cg, inst, false),
        DoubleLongBitsToDouble => generate_int_bits_to_fp(cg, inst, true),
        FloatIntBitsToFloat => generate_int_bits_to_fp(cg, inst, false),

        IntegerReverse => generate_reverse(cg, inst, false),
        LongReverse => generate_reverse(cg, inst, true),
        IntegerReverseBytes => generate_reverse_bytes(cg, inst, Type::Int32),
        LongReverseBytes => generate_reverse_bytes(cg, inst, Type::Int64),
        ShortReverseBytes => generate_reverse_bytes(cg, inst, Type::Int16),
        IntegerBitCount => generate_bit_count(cg, inst, false),
        LongBitCount => generate_bit_count(cg, inst, true),
        IntegerNumberOfLeadingZeros => generate_leading_zeros(cg, inst, false),
        LongNumberOfLeadingZeros => generate_leading_zeros(cg, inst, true),
        IntegerNumberOfTrailingZeros => generate_trailing_zeros(cg, inst, false),
        LongNumberOfTrailingZeros => generate_trailing_zeros(cg, inst, true),

        MathAbsInt => generate_abs_integer(cg, inst, false),
        MathAbsLong => generate_abs_integer(cg, inst, true),
        MathAbsFloat => generate_abs_fp(cg, inst, false),
        MathAbsDouble => generate_abs_fp(cg, inst, true),
        MathSqrt => {
            let summary = cg.locations(inst).clone();
            cg.asm.sqrt_d(fpr_of(summary.out()), fpr_of(summary.in_at(0)));
        }

        MathMinIntInt | MathMinLongLong => generate_min_max_int(cg, inst, true),
        MathMaxIntInt | MathMaxLongLong => generate_min_max_int(cg, inst, false),
        MathMinFloatFloat => generate_min_max_fp(cg, inst, true, false),
        MathMinDoubleDouble => generate_min_max_fp(cg, inst, true, true),
        MathMaxFloatFloat => generate_min_max_fp(cg, inst, false, false),
        MathMaxDoubleDouble => generate_min_max_fp(cg, inst, false, true),

        IntegerValueOf => generate_integer_value_of(cg, inst),
        StringCompareTo => generate_string_compare_to(cg, inst),
        StringEquals => generate_string_equals(cg, inst),
        StringIndexOf => generate_string_index_of(cg, inst, true),
        StringIndexOfAfter => generate_string_index_of(cg, inst, false),
        SystemArrayCopyChar => generate_system_array_copy_char(cg, inst),
        ThreadCurrentThread => {
            let out = gpr_of(cg.locations(inst).out());
            cg.asm.load_from_offset(
                LoadOperandType::UnsignedWord,
                out,
                GpuReg::TR,
                ThreadModel::PEER_OFFSET,
            );
        }
        ThreadInterrupted => generate_thread_interrupted(cg, inst),
    }
}

// ----------------------------------------------------------------------
// Bit manipulation.

fn generate_fp_to_int_bits(cg: &mut CodeGenerator<'_>, inst: InstId, is64: bool) {
    let summary = cg.locations(inst).clone();
    let src = fpr_of(summary.in_at(0));
    let dst = gpr_of(summary.out());
    if is64 {
        cg.asm.dmfc1(dst, src);
    } else {
        cg.asm.mfc1(dst, src);
    }
}

fn generate_int_bits_to_fp(cg: &mut CodeGenerator<'_>, inst: InstId, is64: bool) {
    let summary = cg.locations(inst).clone();
    let src = gpr_of(summary.in_at(0));
    let dst = fpr_of(summary.out());
    if is64 {
        cg.asm.dmtc1(src, dst);
    } else {
        cg.asm.mtc1(src, dst);
    }
}

fn generate_reverse_bytes(cg: &mut CodeGenerator<'_>, inst: InstId, ty: Type) {
    let summary = cg.locations(inst).clone();
    let src = gpr_of(summary.in_at(0));
    let dst = gpr_of(summary.out());
    match ty {
        Type::Int16 => {
            cg.asm.dsbh(dst, src);
            cg.asm.seh(dst, dst);
        }
        Type::Int32 => {
            cg.asm.rotr(dst, src, 16);
            cg.asm.wsbh(dst, dst);
        }
        Type::Int64 => {
            cg.asm.dsbh(dst, src);
            cg.asm.dshd(dst, dst);
        }
        _ => panic!("unexpected byte-reverse width: {ty:?}"),
    }
}

fn generate_reverse(cg: &mut CodeGenerator<'_>, inst: InstId, is64: bool) {
    let summary = cg.locations(inst).clone();
    let src = gpr_of(summary.in_at(0));
    let dst = gpr_of(summary.out());
    if is64 {
        cg.asm.dsbh(dst, src);
        cg.asm.dshd(dst, dst);
        cg.asm.dbitswap(dst, dst);
    } else {
        cg.asm.rotr(dst, src, 16);
        cg.asm.wsbh(dst, dst);
        cg.asm.bitswap(dst, dst);
    }
}

fn generate_leading_zeros(cg: &mut CodeGenerator<'_>, inst: InstId, is64: bool) {
    let summary = cg.locations(inst).clone();
    let src = gpr_of(summary.in_at(0));
    let dst = gpr_of(summary.out());
    if is64 {
        cg.asm.dclz(dst, src);
    } else {
        cg.asm.clz(dst, src);
    }
}

// Bit-reverse, then count leading zeros.
fn generate_trailing_zeros(cg: &mut CodeGenerator<'_>, inst: InstId, is64: bool) {
    let summary = cg.locations(inst).clone();
    let src = gpr_of(summary.in_at(0));
    let dst = gpr_of(summary.out());
    if is64 {
        cg.asm.dsbh(dst, src);
        cg.asm.dshd(dst, dst);
        cg.asm.dbitswap(dst, dst);
        cg.asm.dclz(dst, dst);
    } else {
        cg.asm.rotr(dst, src, 16);
        cg.asm.wsbh(dst, dst);
        cg.asm.bitswap(dst, dst);
        cg.asm.clz(dst, dst);
    }
}

/// Parallel popcount: fold pairs, nibbles, then multiply-accumulate the
/// byte sums into the top byte.
fn generate_bit_count(cg: &mut CodeGenerator<'_>, inst: InstId, is64: bool) {
    let summary = cg.locations(inst).clone();
    let src = gpr_of(summary.in_at(0));
    let dst = gpr_of(summary.out());
    let tmp = GpuReg::TMP;
    let at = GpuReg::At;
    if is64 {
        cg.asm.dsrl(tmp, src, 1);
        cg.asm.load_const64(at, 0x5555_5555_5555_5555);
        cg.asm.and(tmp, tmp, at);
        cg.asm.dsubu(tmp, src, tmp);
        cg.asm.load_const64(at, 0x3333_3333_3333_3333);
        cg.asm.and(dst, tmp, at);
        cg.asm.dsrl(tmp, tmp, 2);
        cg.asm.and(tmp, tmp, at);
        cg.asm.daddu(tmp, dst, tmp);
        cg.asm.dsrl(dst, tmp, 4);
        cg.asm.daddu(dst, dst, tmp);
        cg.asm.load_const64(at, 0x0F0F_0F0F_0F0F_0F0F);
        cg.asm.and(dst, dst, at);
        cg.asm.load_const64(tmp, 0x0101_0101_0101_0101);
        cg.asm.dmul(dst, dst, tmp);
        cg.asm.dsrl32(dst, dst, 24);
    } else {
        cg.asm.srl(tmp, src, 1);
        cg.asm.load_const32(at, 0x5555_5555);
        cg.asm.and(tmp, tmp, at);
        cg.asm.subu(tmp, src, tmp);
        cg.asm.load_const32(at, 0x3333_3333);
        cg.asm.and(dst, tmp, at);
        cg.asm.srl(tmp, tmp, 2);
        cg.asm.and(tmp, tmp, at);
        cg.asm.addu(tmp, dst, tmp);
        cg.asm.srl(dst, tmp, 4);
        cg.asm.addu(dst, dst, tmp);
        cg.asm.load_const32(at, 0x0F0F_0F0F);
        cg.asm.and(dst, dst, at);
        cg.asm.load_const32(tmp, 0x0101_0101);
        cg.asm.mul(dst, dst, tmp);
        cg.asm.srl(dst, dst, 24);
    }
}

// ----------------------------------------------------------------------
// Abs, min, max, sqrt.

fn generate_abs_integer(cg: &mut CodeGenerator<'_>, inst: InstId, is64: bool) {
    let summary = cg.locations(inst).clone();
    let src = gpr_of(summary.in_at(0));
    let dst = gpr_of(summary.out());
    let at = GpuReg::At;
    if is64 {
        cg.asm.dsra32(at, src, 31);
        cg.asm.xor(dst, src, at);
        cg.asm.dsubu(dst, dst, at);
    } else {
        cg.asm.sra(at, src, 31);
        cg.asm.xor(dst, src, at);
        cg.asm.subu(dst, dst, at);
    }
}

fn generate_abs_fp(cg: &mut CodeGenerator<'_>, inst: InstId, is64: bool) {
    let summary = cg.locations(inst).clone();
    let src = fpr_of(summary.in_at(0));
    let dst = fpr_of(summary.out());
    if is64 {
        cg.asm.abs_d(dst, src);
    } else {
        cg.asm.abs_s(dst, src);
    }
}

fn generate_min_max_int(cg: &mut CodeGenerator<'_>, inst: InstId, is_min: bool) {
    let summary = cg.locations(inst).clone();
    let lhs = gpr_of(summary.in_at(0));
    let rhs = gpr_of(summary.in_at(1));
    let dst = gpr_of(summary.out());
    let at = GpuReg::At;

    if lhs == rhs {
        if dst != lhs {
            cg.asm.move_(dst, lhs);
        }
        return;
    }

    // Branchless select: AT keeps the loser, OR merges since the winner
    // lane was zeroed.
    if dst == lhs {
        cg.asm.slt(at, rhs, lhs);
        if is_min {
            cg.asm.seleqz(dst, lhs, at);
            cg.asm.selnez(at, rhs, at);
        } else {
            cg.asm.selnez(dst, lhs, at);
            cg.asm.seleqz(at, rhs, at);
        }
    } else {
        cg.asm.slt(at, lhs, rhs);
        if is_min {
            cg.asm.seleqz(dst, rhs, at);
            cg.asm.selnez(at, lhs, at);
        } else {
            cg.asm.selnez(dst, rhs, at);
            cg.asm.seleqz(at, lhs, at);
        }
    }
    cg.asm.or(dst, dst, at);
}

fn generate_min_max_fp(cg: &mut CodeGenerator<'_>, inst: InstId, is_min: bool, is64: bool) {
    let summary = cg.locations(inst).clone();
    let a = fpr_of(summary.in_at(0));
    let b = fpr_of(summary.in_at(1));
    let dst = fpr_of(summary.out());

    let no_nans = cg.asm.new_label();
    let done = cg.asm.new_label();

    // The NaN blend must not clobber an input it still reads.
    let ftmp = if dst != a && dst != b { dst } else { FpuReg::FTMP };

    if is64 {
        cg.asm.cmp_un_d(FpuReg::FTMP, a, b);
        cg.asm.bc1eqz(FpuReg::FTMP, no_nans);
        // One of the operands is NaN: the result is the NaN operand.
        cg.asm.cmp_eq_d(ftmp, a, a);
        cg.asm.sel_d(ftmp, a, b);
        if ftmp != dst {
            cg.asm.mov_d(dst, ftmp);
        }
        cg.asm.bc(done);
        cg.asm.bind(no_nans);
        if is_min {
            cg.asm.min_d(dst, a, b);
        } else {
            cg.asm.max_d(dst, a, b);
        }
    } else {
        cg.asm.cmp_un_s(FpuReg::FTMP, a, b);
        cg.asm.bc1eqz(FpuReg::FTMP, no_nans);
        cg.asm.cmp_eq_s(ftmp, a, a);
        cg.asm.sel_s(ftmp, a, b);
        if ftmp != dst {
            cg.asm.mov_s(dst, ftmp);
        }
        cg.asm.bc(done);
        cg.asm.bind(no_nans);
        if is_min {
            cg.asm.min_s(dst, a, b);
        } else {
            cg.asm.max_s(dst, a, b);
        }
    }
    cg.asm.bind(done);
}

// ----------------------------------------------------------------------
// Boxed integers.

fn generate_integer_value_of(cg: &mut CodeGenerator<'_>, inst: InstId) {
    const LOW: i32 = ObjectModel::INTEGER_CACHE_LOW;
    const HIGH: i32 = ObjectModel::INTEGER_CACHE_HIGH;
    let data_offset =
        ObjectModel::array_data_offset(ObjectModel::HEAP_REFERENCE_SIZE) as i64;
    let cache = ObjectModel::INTEGER_CACHE_ARRAY_ADDRESS as i64;

    let args = invoke_args(cg, inst);
    let summary = cg.locations(inst).clone();
    let dst = gpr_of(summary.out());

    if let Some(value) = const_i32_arg(cg, args[0]) {
        if (LOW..=HIGH).contains(&value) {
            // The cache slot address is a link-time constant; one load
            // turns it into the boxed object. No safepoint needed.
            let index = (value - LOW) as i64;
            cg.asm.load_const64(dst, cache + data_offset + 4 * index);
            cg.asm.lwu(dst, dst, 0);
            cg.maybe_unpoison_heap_reference(dst);
        } else {
            cg.asm
                .load_const64(GpuReg::A0, ObjectModel::INTEGER_CLASS_ADDRESS as i64);
            cg.invoke_runtime(QuickEntrypoint::AllocObjectInitialized, inst);
            cg.store_const_to_offset(
                StoreOperandType::Word,
                value as i64,
                dst,
                ObjectModel::BOXED_INT_VALUE_OFFSET,
                GpuReg::TMP,
            );
            // The boxed value is final; publish it before the reference
            // escapes.
            cg.asm.sync(0);
        }
    } else {
        let src = gpr_of(summary.in_at(0));
        let allocate = cg.asm.new_label();
        let done = cg.asm.new_label();
        let count = HIGH - LOW + 1;

        // In cache iff (unsigned) value - LOW < count.
        cg.asm.addiu32(dst, src, -LOW);
        cg.asm.load_const32(GpuReg::At, count);
        cg.asm.bgeuc(dst, GpuReg::At, allocate);

        cg.asm.load_const64(GpuReg::TMP, cache + data_offset);
        cg.asm.dlsa(dst, dst, GpuReg::TMP, 2);
        cg.asm.lwu(dst, dst, 0);
        cg.maybe_unpoison_heap_reference(dst);
        cg.asm.bc(done);

        cg.asm.bind(allocate);
        cg.asm
            .load_const64(GpuReg::A0, ObjectModel::INTEGER_CLASS_ADDRESS as i64);
        cg.invoke_runtime(QuickEntrypoint::AllocObjectInitialized, inst);
        cg.asm
            .store_to_offset(StoreOperandType::Word, src, dst, ObjectModel::BOXED_INT_VALUE_OFFSET);
        cg.asm.sync(0);
        cg.asm.bind(done);
    }
}

// ----------------------------------------------------------------------
// Strings.

fn generate_string_compare_to(cg: &mut CodeGenerator<'_>, inst: InstId) {
    let summary = cg.locations(inst).clone();
    let argument = gpr_of(summary.in_at(1));
    let (entry, exit) = cg.add_intrinsic_slow_path(inst);
    // The receiver was null-checked already; a null argument throws, which
    // the plain call handles.
    cg.asm.beqzc(argument, entry);
    cg.invoke_runtime(QuickEntrypoint::StringCompareTo, inst);
    cg.asm.bind(exit);
}

fn generate_string_equals(cg: &mut CodeGenerator<'_>, inst: InstId) {
    let summary = cg.locations(inst).clone();
    let str_reg = gpr_of(summary.in_at(0));
    let arg_reg = gpr_of(summary.in_at(1));
    let dst = gpr_of(summary.out());
    let temp1 = gpr_of(summary.temp(0));
    let temp2 = gpr_of(summary.temp(1));
    let temp3 = gpr_of(summary.temp(2));

    // Same register means same object.
    if str_reg == arg_reg {
        cg.asm.load_const64(dst, 1);
        return;
    }

    let loop_head = cg.asm.new_label();
    let end = cg.asm.new_label();
    let return_true = cg.asm.new_label();
    let return_false = cg.asm.new_label();

    cg.asm.beqzc(arg_reg, return_false);
    cg.asm.beqc(str_reg, arg_reg, return_true);

    // Strings are final, so one class word comparison is an exact instanceof
    // check. Poisoned references compare equal without unpoisoning.
    cg.asm.lw(temp1, str_reg, ObjectModel::CLASS_OFFSET as i16);
    cg.asm.lw(temp2, arg_reg, ObjectModel::CLASS_OFFSET as i16);
    cg.asm.bnec(temp1, temp2, return_false);

    // Count words must match exactly; the comparison covers the compression
    // bit too, and zero means empty either way.
    cg.asm.lw(temp1, str_reg, ObjectModel::STRING_COUNT_OFFSET as i16);
    cg.asm.lw(temp2, arg_reg, ObjectModel::STRING_COUNT_OFFSET as i16);
    cg.asm.bnec(temp1, temp2, return_false);
    cg.asm.beqzc(temp1, return_true);

    cg.asm.move_(GpuReg::TMP, str_reg);
    cg.asm.move_(temp3, arg_reg);

    if cg.config.compressed_strings {
        // Byte count to compare: length doubled when uncompressed.
        cg.asm.dext(temp2, temp1, 0, 1);
        cg.asm.srl(temp1, temp1, 1);
        cg.asm.sllv(temp1, temp1, temp2);
    }

    // Compare eight bytes a round; the char array is zero-padded to the
    // object alignment so overreading the tail is safe.
    cg.asm.bind(loop_head);
    cg.asm.ld(dst, GpuReg::TMP, ObjectModel::STRING_VALUE_OFFSET as i16);
    cg.asm.ld(temp2, temp3, ObjectModel::STRING_VALUE_OFFSET as i16);
    cg.asm.bnec(dst, temp2, return_false);
    cg.asm.daddiu(GpuReg::TMP, GpuReg::TMP, 8);
    cg.asm.daddiu(temp3, temp3, 8);
    let step: i16 = if cg.config.compressed_strings { -8 } else { -4 };
    cg.asm.addiu(temp1, temp1, step);
    cg.asm.bgtzc(temp1, loop_head);

    cg.asm.bind(return_true);
    cg.asm.load_const64(dst, 1);
    cg.asm.bc(end);
    cg.asm.bind(return_false);
    cg.asm.load_const64(dst, 0);
    cg.asm.bind(end);
}

fn generate_string_index_of(cg: &mut CodeGenerator<'_>, inst: InstId, start_at_zero: bool) {
    let args = invoke_args(cg, inst);
    let summary = cg.locations(inst).clone();
    let tmp_reg = if start_at_zero { gpr_of(summary.temp(0)) } else { GpuReg::TMP };

    // Code points above the basic plane need the full library search; guard
    // them out to the slow path (or straight to it for a constant).
    let mut guard_exit = None;
    match const_i32_arg(cg, args[1]) {
        Some(code_point) => {
            if code_point as u32 > u16::MAX as u32 {
                let (entry, exit) = cg.add_intrinsic_slow_path(inst);
                cg.asm.bc(entry);
                cg.asm.bind(exit);
                return;
            }
        }
        None => {
            if cg.graph.node(args[1]).ty != Type::Uint16 {
                let char_reg = gpr_of(summary.in_at(1));
                cg.asm.load_const32(tmp_reg, u16::MAX as i32);
                let (entry, exit) = cg.add_intrinsic_slow_path(inst);
                cg.asm.bltuc(tmp_reg, char_reg, entry);
                guard_exit = Some(exit);
            }
        }
    }

    if start_at_zero {
        cg.asm.move_(tmp_reg, GpuReg::Zero);
    }

    let entrypoint = if start_at_zero {
        QuickEntrypoint::StringIndexOf
    } else {
        QuickEntrypoint::StringIndexOfAfter
    };
    cg.invoke_runtime(entrypoint, inst);

    if let Some(exit) = guard_exit {
        cg.asm.bind(exit);
    }
}

// ----------------------------------------------------------------------
// Char array copy.

/// Branch to `entry` unless `available >= length`.
fn check_enough_items(
    cg: &mut CodeGenerator<'_>,
    available: GpuReg,
    length: Location,
    entry: LabelId,
) {
    match length {
        Location::Constant { value, .. } => {
            let v = value.as_i64();
            if is_int16(v) {
                cg.asm.slti(GpuReg::TMP, available, v as i16);
                cg.asm.bnezc(GpuReg::TMP, entry);
            } else {
                cg.asm.load_const32(GpuReg::TMP, v as i32);
                cg.asm.bltc(available, GpuReg::TMP, entry);
            }
        }
        _ => {
            cg.asm.bltc(available, gpr_of(length), entry);
        }
    }
}

/// Branch to `entry` unless `0 <= pos` and `length(input) - pos >= length`.
fn check_position(
    cg: &mut CodeGenerator<'_>,
    pos: Location,
    input: GpuReg,
    length: Location,
    entry: LabelId,
) {
    let length_offset = ObjectModel::ARRAY_LENGTH_OFFSET as i16;
    match pos {
        Location::Constant { value, .. } => {
            let pos_const = value.as_i64() as i32;
            cg.asm.lw(GpuReg::At, input, length_offset);
            if pos_const != 0 {
                // The builder rejected negative constants already.
                cg.asm.addiu32(GpuReg::At, GpuReg::At, -pos_const);
                cg.asm.bltzc(GpuReg::At, entry);
            }
            check_enough_items(cg, GpuReg::At, length, entry);
        }
        _ => {
            let pos_reg = gpr_of(pos);
            cg.asm.bltzc(pos_reg, entry);
            cg.asm.lw(GpuReg::At, input, length_offset);
            cg.asm.subu(GpuReg::At, GpuReg::At, pos_reg);
            cg.asm.bltzc(GpuReg::At, entry);
            check_enough_items(cg, GpuReg::At, length, entry);
        }
    }
}

fn generate_system_array_copy_char(cg: &mut CodeGenerator<'_>, inst: InstId) {
    let summary = cg.locations(inst).clone();
    let src = gpr_of(summary.in_at(0));
    let src_pos = summary.in_at(1);
    let dest = gpr_of(summary.in_at(2));
    let dest_pos = summary.in_at(3);
    let length = summary.in_at(4);
    let dest_base = gpr_of(summary.temp(0));
    let src_base = gpr_of(summary.temp(1));
    let count = gpr_of(summary.temp(2));

    let (entry, exit) = cg.add_intrinsic_slow_path(inst);
    let loop_head = cg.asm.new_label();

    // Overlapping or null arrays go down the full library path.
    cg.asm.beqc(src, dest, entry);
    cg.asm.beqzc(src, entry);
    cg.asm.beqzc(dest, entry);

    match length {
        Location::Constant { value, .. } => {
            cg.asm.load_const32(count, value.as_i64() as i32);
        }
        _ => {
            let length_reg = gpr_of(length);
            cg.asm.bltzc(length_reg, entry);
            cg.asm.move_(count, length_reg);
        }
    }

    let count_loc = Location::Gpr(count.code());
    check_position(cg, src_pos, src, count_loc, entry);
    check_position(cg, dest_pos, dest, count_loc, entry);

    // Nothing to copy.
    cg.asm.beqzc(count, exit);

    let char_size: i64 = 2;
    let data_offset = ObjectModel::array_data_offset(char_size as u32) as i64;

    match src_pos {
        Location::Constant { value, .. } => {
            let pos = value.as_i64();
            cg.asm
                .daddiu64(src_base, src, data_offset + char_size * pos, GpuReg::TMP);
        }
        _ => {
            cg.asm.daddiu64(src_base, src, data_offset, GpuReg::TMP);
            cg.asm.dlsa(src_base, gpr_of(src_pos), src_base, 1);
        }
    }
    match dest_pos {
        Location::Constant { value, .. } => {
            let pos = value.as_i64();
            cg.asm
                .daddiu64(dest_base, dest, data_offset + char_size * pos, GpuReg::TMP);
        }
        _ => {
            cg.asm.daddiu64(dest_base, dest, data_offset, GpuReg::TMP);
            cg.asm.dlsa(dest_base, gpr_of(dest_pos), dest_base, 1);
        }
    }

    cg.asm.bind(loop_head);
    cg.asm.lh(GpuReg::TMP, src_base, 0);
    cg.asm.daddiu(src_base, src_base, char_size as i16);
    cg.asm.daddiu(count, count, -1);
    cg.asm.sh(GpuReg::TMP, dest_base, 0);
    cg.asm.daddiu(dest_base, dest_base, char_size as i16);
    cg.asm.bnezc(count, loop_head);

    cg.asm.bind(exit);
}

// ----------------------------------------------------------------------
// Thread state.

fn generate_thread_interrupted(cg: &mut CodeGenerator<'_>, inst: InstId) {
    let dst = gpr_of(cg.locations(inst).out());
    let offset = ThreadModel::INTERRUPTED_OFFSET;
    cg.asm
        .load_from_offset(LoadOperandType::Word, dst, GpuReg::TR, offset);
    let done = cg.asm.new_label();
    cg.asm.beqzc(dst, done);
    // Clear the flag with full fences on both sides; the runtime reads it
    // from other threads.
    cg.asm.sync(0);
    cg.asm
        .store_to_offset(StoreOperandType::Word, GpuReg::Zero, GpuReg::TR, offset);
    cg.asm.sync(0);
    cg.asm.bind(done);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetConfig;
    use crate::ir::{ConstVal, DexRef, Graph, MethodLoadKind};
    use crate::mips64::codegen::test_util::{compile, graph_from, leaf_config};
    use smallvec::smallvec;

    fn invoke_graph(intrinsic: Intrinsic, arg_types: Vec<Type>, ret: Type) -> Graph {
        let mut insts = Vec::new();
        let mut types = Vec::new();
        for (i, ty) in arg_types.iter().enumerate() {
            insts.push(Inst::ParameterValue { index: i as u16 });
            types.push(*ty);
        }
        let args: SmallVec<[InstId; 4]> =
            (0..arg_types.len()).map(InstId::from_usize).collect();
        insts.push(Inst::InvokeStaticOrDirect {
            load_kind: MethodLoadKind::RuntimeCall(DexRef(7)),
            args,
            intrinsic: Some(intrinsic),
        });
        types.push(ret);
        let ret_value = (ret != Type::Void).then(|| InstId::from_usize(arg_types.len()));
        insts.push(Inst::Return { value: ret_value });
        types.push(Type::Void);
        graph_from(vec![insts], vec![types])
    }

    #[test]
    fn bit_count_stays_a_leaf() {
        let graph = invoke_graph(Intrinsic::IntegerBitCount, vec![Type::Int32], Type::Int32);
        let method = compile(&graph, leaf_config());
        assert!(method.stack_maps.is_empty());
        assert_eq!(method.frame_info.frame_size_in_bytes, 0);
        assert!(!method.code.is_empty());
    }

    #[test]
    fn current_thread_is_a_single_load() {
        let graph =
            invoke_graph(Intrinsic::ThreadCurrentThread, vec![], Type::Reference);
        let method = compile(&graph, leaf_config());
        // One load plus the return; no frame, no safepoints.
        assert_eq!(method.code.len(), 8);
        assert!(method.stack_maps.is_empty());
    }

    #[test]
    fn string_equals_forks_on_compression() {
        let graph = invoke_graph(
            Intrinsic::StringEquals,
            vec![Type::Reference, Type::Reference],
            Type::Bool,
        );
        let compressed = compile(&graph, leaf_config());
        let plain = compile(
            &graph,
            TargetConfig { compressed_strings: false, ..leaf_config() },
        );
        // The compressed variant inserts the flag extract, length shift and
        // byte-count double before the loop.
        assert_eq!(compressed.code.len(), plain.code.len() + 12);
    }

    #[test]
    fn string_equals_is_refused_under_read_barriers() {
        let graph = invoke_graph(
            Intrinsic::StringEquals,
            vec![Type::Reference, Type::Reference],
            Type::Bool,
        );
        let invoke = InstId::from_usize(2);
        let mut cg = CodeGenerator::new(&graph, TargetConfig::default());
        cg.build_locations().unwrap();
        assert!(!cg.locations(invoke).is_intrinsified());

        let mut cg = CodeGenerator::new(&graph, leaf_config());
        cg.build_locations().unwrap();
        assert!(cg.locations(invoke).is_intrinsified());
    }

    #[test]
    fn in_cache_value_of_needs_no_safepoint() {
        let mut graph = graph_from(
            vec![vec![
                Inst::Constant(ConstVal::Int32(7)),
                Inst::InvokeStaticOrDirect {
                    load_kind: MethodLoadKind::RuntimeCall(DexRef(7)),
                    args: smallvec![InstId::from_usize(0)],
                    intrinsic: Some(Intrinsic::IntegerValueOf),
                },
                Inst::Return { value: Some(InstId::from_usize(1)) },
            ]],
            vec![vec![Type::Int32, Type::Reference, Type::Void]],
        );
        graph.has_calls = true;
        let method = compile(&graph, leaf_config());
        // Only the overflow probe; the cached box is loaded without a call.
        assert_eq!(method.stack_maps.len(), 1);
    }

    #[test]
    fn out_of_cache_value_of_allocates() {
        let mut graph = graph_from(
            vec![vec![
                Inst::Constant(ConstVal::Int32(100_000)),
                Inst::InvokeStaticOrDirect {
                    load_kind: MethodLoadKind::RuntimeCall(DexRef(7)),
                    args: smallvec![InstId::from_usize(0)],
                    intrinsic: Some(Intrinsic::IntegerValueOf),
                },
                Inst::Return { value: Some(InstId::from_usize(1)) },
            ]],
            vec![vec![Type::Int32, Type::Reference, Type::Void]],
        );
        graph.has_calls = true;
        let method = compile(&graph, leaf_config());
        // Overflow probe plus the allocation entrypoint.
        assert_eq!(method.stack_maps.len(), 2);
    }

    #[test]
    fn array_copy_refuses_negative_constants() {
        let bad = graph_from(
            vec![vec![
                Inst::ParameterValue { index: 0 },
                Inst::ParameterValue { index: 1 },
                Inst::Constant(ConstVal::Int32(-3)),
                Inst::InvokeStaticOrDirect {
                    load_kind: MethodLoadKind::RuntimeCall(DexRef(7)),
                    args: smallvec![
                        InstId::from_usize(0),
                        InstId::from_usize(2),
                        InstId::from_usize(1),
                        InstId::from_usize(2),
                        InstId::from_usize(2),
                    ],
                    intrinsic: Some(Intrinsic::SystemArrayCopyChar),
                },
                Inst::Return { value: None },
            ]],
            vec![vec![
                Type::Reference,
                Type::Reference,
                Type::Int32,
                Type::Void,
                Type::Void,
            ]],
        );
        let mut cg = CodeGenerator::new(&bad, leaf_config());
        cg.build_locations().unwrap();
        assert!(!cg.locations(InstId::from_usize(3)).is_intrinsified());

        let good = invoke_graph(
            Intrinsic::SystemArrayCopyChar,
            vec![Type::Reference, Type::Int32, Type::Reference, Type::Int32, Type::Int32],
            Type::Void,
        );
        let mut cg = CodeGenerator::new(&good, leaf_config());
        cg.build_locations().unwrap();
        assert!(cg.locations(InstId::from_usize(5)).is_intrinsified());
    }

    #[test]
    fn array_copy_emits_the_bounds_protocol() {
        let mut graph = invoke_graph(
            Intrinsic::SystemArrayCopyChar,
            vec![Type::Reference, Type::Int32, Type::Reference, Type::Int32, Type::Int32],
            Type::Void,
        );
        graph.has_calls = true;
        let method = compile(&graph, leaf_config());
        // Probe plus the out-of-line fallback call the position and length
        // guards branch to.
        assert_eq!(method.stack_maps.len(), 2);
        // Null and range guards, base computation and the copy loop all land
        // on the main path.
        assert!(method.code.len() > 100);
    }

    #[test]
    fn index_of_guards_wide_code_points() {
        let guarded = invoke_graph(
            Intrinsic::StringIndexOf,
            vec![Type::Reference, Type::Int32],
            Type::Int32,
        );
        let chars_only = invoke_graph(
            Intrinsic::StringIndexOf,
            vec![Type::Reference, Type::Uint16],
            Type::Int32,
        );
        let mut g = guarded;
        g.has_calls = true;
        let mut c = chars_only;
        c.has_calls = true;
        let with_guard = compile(&g, leaf_config());
        let without = compile(&c, leaf_config());
        // The int overload adds the range test and its out-of-line call.
        assert!(with_guard.code.len() > without.code.len());
        assert_eq!(without.stack_maps.len(), 2);
        assert_eq!(with_guard.stack_maps.len(), 3);
    }

    #[test]
    fn compare_to_defers_the_null_check() {
        let mut graph = invoke_graph(
            Intrinsic::StringCompareTo,
            vec![Type::Reference, Type::Reference],
            Type::Int32,
        );
        graph.has_calls = true;
        let method = compile(&graph, leaf_config());
        // Probe plus the slow-path resolution call; the fast-path compare
        // helper itself never reaches a safepoint.
        assert_eq!(method.stack_maps.len(), 2);
    }
}
