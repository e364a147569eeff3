//! MSA (128-bit SIMD) code generation.
//!
//! Vector values live in the MSA register file, which aliases the FPU
//! registers; the allocator hands out FPU locations and this module widens
//! them to [VecReg]. All lane arithmetic selects the data format from the
//! packed element type, so one visitor arm covers every element width.

use crate::errors::CodegenError;
use crate::ir::{Inst, InstId, PackedType, Type, VecOpKind};
use crate::locations::{CallKind, Location, LocationSummary, Policy};
use crate::mips64::codegen::{gpr_of, CodeGenerator};
use crate::mips64::{FpuReg, GpuReg, VecReg};

fn vec_of(loc: Location) -> VecReg {
    VecReg::from(FpuReg::from_code(loc.as_fpr()))
}

/// MSA data format selector (b/h/w/d) for an element type.
fn df(packed: PackedType) -> u32 {
    packed.elem.size_shift()
}

fn is_unsigned(packed: PackedType) -> bool {
    matches!(packed.elem, Type::Uint8 | Type::Uint16)
}

pub(super) fn build_locations(
    cg: &CodeGenerator<'_>,
    inst: InstId,
) -> Result<LocationSummary, CodegenError> {
    if !cg.config.has_msa {
        return Err(CodegenError::FeatureUnavailable("msa"));
    }
    let node = cg.graph.node(inst);
    let (kind, packed, inputs) = match &node.op {
        Inst::VecOp { kind, packed, inputs, .. } => (*kind, *packed, inputs),
        _ => panic!("vector locations on a non-vector instruction"),
    };
    // MSA registers are exactly 128 bits; a narrower packed type would
    // silently widen to the full-register op.
    assert_eq!(packed.bit_width(), 128, "unsupported packed type {packed:?}");
    // No MSA saturating arithmetic; the vectorizer must not emit these here.
    if matches!(kind, VecOpKind::SaturatingAdd | VecOpKind::SaturatingSub) {
        return Err(CodegenError::FeatureUnavailable("msa saturating arithmetic"));
    }

    let reg = Location::Unallocated(Policy::RequiresRegister);
    let freg = Location::Unallocated(Policy::RequiresFpuRegister);
    let mut summary = LocationSummary::new(CallKind::NoCall);
    match kind {
        VecOpKind::ReplicateScalar => {
            summary.set_in_at(0, if packed.elem.is_fp() { freg } else { reg });
            summary.set_out(freg);
        }
        VecOpKind::ExtractScalar => {
            summary.set_in_at(0, freg);
            if packed.elem.is_fp() {
                // Lane 0 of the vector is the FPU register itself.
                summary.set_out(Location::Unallocated(Policy::SameAsFirstInput));
            } else {
                summary.set_out(reg);
            }
        }
        VecOpKind::ReduceSum => {
            summary.set_in_at(0, freg);
            summary.add_temp(freg);
            summary.set_out(freg);
        }
        VecOpKind::Neg | VecOpKind::Abs | VecOpKind::Not => {
            summary.set_in_at(0, freg);
            summary.set_out(freg);
        }
        VecOpKind::Add
        | VecOpKind::HalvingAdd { .. }
        | VecOpKind::Sub
        | VecOpKind::Mul
        | VecOpKind::Div
        | VecOpKind::Min
        | VecOpKind::Max
        | VecOpKind::And
        | VecOpKind::Or
        | VecOpKind::Xor => {
            summary.set_in_at(0, freg);
            summary.set_in_at(1, freg);
            summary.set_out(freg);
        }
        VecOpKind::Shl | VecOpKind::Shr | VecOpKind::UShr => {
            let amount = cg.graph.node(inputs[1]).as_const();
            assert!(amount.is_some(), "vector shifts take a constant distance");
            summary.set_in_at(0, freg);
            summary.set_in_at(
                1,
                Location::Constant { value: amount.unwrap(), origin: inputs[1] },
            );
            summary.set_out(freg);
        }
        VecOpKind::MulAdd | VecOpKind::MulSub => {
            // The accumulator is updated in place.
            summary.set_in_at(0, freg);
            summary.set_in_at(1, freg);
            summary.set_in_at(2, freg);
            summary.set_out(Location::Unallocated(Policy::SameAsFirstInput));
        }
        VecOpKind::Load => {
            summary.set_in_at(0, reg);
            summary.set_out(freg);
        }
        VecOpKind::Store => {
            summary.set_in_at(0, reg);
            summary.set_in_at(1, freg);
        }
        VecOpKind::SaturatingAdd | VecOpKind::SaturatingSub => unreachable!(),
    }
    Ok(summary)
}

pub(super) fn generate(cg: &mut CodeGenerator<'_>, inst: InstId) {
    let node = cg.graph.node(inst);
    let (kind, packed, offset) = match &node.op {
        Inst::VecOp { kind, packed, offset, .. } => (*kind, *packed, *offset),
        _ => panic!("vector emission on a non-vector instruction"),
    };
    let summary = cg.locations(inst).clone();
    let df = df(packed);
    let unsigned = is_unsigned(packed);

    match kind {
        VecOpKind::ReplicateScalar => {
            let dst = vec_of(summary.out());
            if packed.elem.is_fp() {
                let src = vec_of(summary.in_at(0));
                if packed.elem == Type::Float32 {
                    cg.asm.splati_w(dst, src, 0);
                } else {
                    cg.asm.splati_d(dst, src, 0);
                }
            } else {
                let src = gpr_of(summary.in_at(0));
                match df {
                    0 => cg.asm.fill_b(dst, src),
                    1 => cg.asm.fill_h(dst, src),
                    2 => cg.asm.fill_w(dst, src),
                    _ => cg.asm.fill_d(dst, src),
                }
            }
        }
        VecOpKind::ExtractScalar => {
            if packed.elem.is_fp() {
                // Out aliases the input; lane 0 is already in place.
            } else {
                let dst = gpr_of(summary.out());
                let src = vec_of(summary.in_at(0));
                match (df, unsigned) {
                    (0, false) => cg.asm.copy_s_b(dst, src, 0),
                    (0, true) => cg.asm.copy_u_b(dst, src, 0),
                    (1, false) => cg.asm.copy_s_h(dst, src, 0),
                    (1, true) => cg.asm.copy_u_h(dst, src, 0),
                    (2, _) => cg.asm.copy_s_w(dst, src, 0),
                    _ => cg.asm.copy_s_d(dst, src, 0),
                }
            }
        }
        VecOpKind::ReduceSum => {
            let dst = vec_of(summary.out());
            let src = vec_of(summary.in_at(0));
            let tmp = vec_of(summary.temp(0));
            match packed.elem {
                Type::Int32 => {
                    // Pairwise widen to doublewords, then fold the halves.
                    cg.asm.hadd_s(3, tmp, src, src);
                    cg.asm.ilvl(3, dst, tmp, tmp);
                    cg.asm.addv(3, dst, dst, tmp);
                }
                Type::Int64 => {
                    cg.asm.ilvl(3, dst, src, src);
                    cg.asm.addv(3, dst, dst, src);
                }
                _ => panic!("unsupported reduction element {:?}", packed.elem),
            }
        }
        VecOpKind::Neg => {
            let dst = vec_of(summary.out());
            let src = vec_of(summary.in_at(0));
            match packed.elem {
                Type::Float32 => {
                    cg.asm.fill_w(dst, GpuReg::Zero);
                    cg.asm.fsub_w(dst, dst, src);
                }
                Type::Float64 => {
                    cg.asm.fill_d(dst, GpuReg::Zero);
                    cg.asm.fsub_d(dst, dst, src);
                }
                _ => {
                    match df {
                        0 => cg.asm.fill_b(dst, GpuReg::Zero),
                        1 => cg.asm.fill_h(dst, GpuReg::Zero),
                        2 => cg.asm.fill_w(dst, GpuReg::Zero),
                        _ => cg.asm.fill_d(dst, GpuReg::Zero),
                    }
                    cg.asm.subv(df, dst, dst, src);
                }
            }
        }
        VecOpKind::Abs => {
            let dst = vec_of(summary.out());
            let src = vec_of(summary.in_at(0));
            match packed.elem {
                Type::Float32 => {
                    // Clear the sign bit with an all-but-sign mask.
                    cg.asm.ldi_w(dst, -1);
                    cg.asm.srli_w(dst, dst, 1);
                    cg.asm.and_v(dst, dst, src);
                }
                Type::Float64 => {
                    cg.asm.ldi_d(dst, -1);
                    cg.asm.srli_d(dst, dst, 1);
                    cg.asm.and_v(dst, dst, src);
                }
                _ => {
                    // |0| + |src| per lane.
                    match df {
                        0 => cg.asm.fill_b(dst, GpuReg::Zero),
                        1 => cg.asm.fill_h(dst, GpuReg::Zero),
                        2 => cg.asm.fill_w(dst, GpuReg::Zero),
                        _ => cg.asm.fill_d(dst, GpuReg::Zero),
                    }
                    cg.asm.add_a(df, dst, dst, src);
                }
            }
        }
        VecOpKind::Not => {
            let dst = vec_of(summary.out());
            let src = vec_of(summary.in_at(0));
            if packed.elem == Type::Bool {
                cg.asm.ldi_b(dst, 1);
                cg.asm.xor_v(dst, dst, src);
            } else {
                cg.asm.nor_v(dst, src, src);
            }
        }
        VecOpKind::Add => {
            let (dst, lhs, rhs) = three(&summary);
            if packed.elem == Type::Float32 {
                cg.asm.fadd_w(dst, lhs, rhs);
            } else if packed.elem == Type::Float64 {
                cg.asm.fadd_d(dst, lhs, rhs);
            } else {
                cg.asm.addv(df, dst, lhs, rhs);
            }
        }
        VecOpKind::HalvingAdd { rounded } => {
            let (dst, lhs, rhs) = three(&summary);
            match (rounded, unsigned) {
                (true, true) => cg.asm.aver_u(df, dst, lhs, rhs),
                (true, false) => cg.asm.aver_s(df, dst, lhs, rhs),
                (false, true) => cg.asm.ave_u(df, dst, lhs, rhs),
                (false, false) => cg.asm.ave_s(df, dst, lhs, rhs),
            }
        }
        VecOpKind::Sub => {
            let (dst, lhs, rhs) = three(&summary);
            if packed.elem == Type::Float32 {
                cg.asm.fsub_w(dst, lhs, rhs);
            } else if packed.elem == Type::Float64 {
                cg.asm.fsub_d(dst, lhs, rhs);
            } else {
                cg.asm.subv(df, dst, lhs, rhs);
            }
        }
        VecOpKind::Mul => {
            let (dst, lhs, rhs) = three(&summary);
            if packed.elem == Type::Float32 {
                cg.asm.fmul_w(dst, lhs, rhs);
            } else if packed.elem == Type::Float64 {
                cg.asm.fmul_d(dst, lhs, rhs);
            } else {
                cg.asm.mulv(df, dst, lhs, rhs);
            }
        }
        VecOpKind::Div => {
            let (dst, lhs, rhs) = three(&summary);
            if packed.elem == Type::Float32 {
                cg.asm.fdiv_w(dst, lhs, rhs);
            } else if packed.elem == Type::Float64 {
                cg.asm.fdiv_d(dst, lhs, rhs);
            } else if unsigned {
                cg.asm.div_u_df(df, dst, lhs, rhs);
            } else {
                cg.asm.div_s_df(df, dst, lhs, rhs);
            }
        }
        VecOpKind::Min => {
            let (dst, lhs, rhs) = three(&summary);
            if packed.elem == Type::Float32 {
                cg.asm.fmin_w(dst, lhs, rhs);
            } else if packed.elem == Type::Float64 {
                cg.asm.fmin_d(dst, lhs, rhs);
            } else if unsigned {
                cg.asm.min_u_df(df, dst, lhs, rhs);
            } else {
                cg.asm.min_s_df(df, dst, lhs, rhs);
            }
        }
        VecOpKind::Max => {
            let (dst, lhs, rhs) = three(&summary);
            if packed.elem == Type::Float32 {
                cg.asm.fmax_w(dst, lhs, rhs);
            } else if packed.elem == Type::Float64 {
                cg.asm.fmax_d(dst, lhs, rhs);
            } else if unsigned {
                cg.asm.max_u_df(df, dst, lhs, rhs);
            } else {
                cg.asm.max_s_df(df, dst, lhs, rhs);
            }
        }
        VecOpKind::And => {
            let (dst, lhs, rhs) = three(&summary);
            cg.asm.and_v(dst, lhs, rhs);
        }
        VecOpKind::Or => {
            let (dst, lhs, rhs) = three(&summary);
            cg.asm.or_v(dst, lhs, rhs);
        }
        VecOpKind::Xor => {
            let (dst, lhs, rhs) = three(&summary);
            cg.asm.xor_v(dst, lhs, rhs);
        }
        VecOpKind::Shl | VecOpKind::Shr | VecOpKind::UShr => {
            let dst = vec_of(summary.out());
            let src = vec_of(summary.in_at(0));
            let bits = 8 * packed.elem.size();
            let shamt = (summary.in_at(1).as_constant().as_i64() as u32) & (bits - 1);
            match (kind, df) {
                (VecOpKind::Shl, 0) => cg.asm.slli_b(dst, src, shamt),
                (VecOpKind::Shl, 1) => cg.asm.slli_h(dst, src, shamt),
                (VecOpKind::Shl, 2) => cg.asm.slli_w(dst, src, shamt),
                (VecOpKind::Shl, _) => cg.asm.slli_d(dst, src, shamt),
                (VecOpKind::Shr, 0) => cg.asm.srai_b(dst, src, shamt),
                (VecOpKind::Shr, 1) => cg.asm.srai_h(dst, src, shamt),
                (VecOpKind::Shr, 2) => cg.asm.srai_w(dst, src, shamt),
                (VecOpKind::Shr, _) => cg.asm.srai_d(dst, src, shamt),
                (_, 0) => cg.asm.srli_b(dst, src, shamt),
                (_, 1) => cg.asm.srli_h(dst, src, shamt),
                (_, 2) => cg.asm.srli_w(dst, src, shamt),
                (_, _) => cg.asm.srli_d(dst, src, shamt),
            }
        }
        VecOpKind::MulAdd | VecOpKind::MulSub => {
            let acc = vec_of(summary.out());
            assert_eq!(summary.out(), summary.in_at(0));
            let lhs = vec_of(summary.in_at(1));
            let rhs = vec_of(summary.in_at(2));
            let is_add = kind == VecOpKind::MulAdd;
            if packed.elem == Type::Float32 {
                if is_add {
                    cg.asm.fmadd_w(acc, lhs, rhs);
                } else {
                    cg.asm.fmsub_w(acc, lhs, rhs);
                }
            } else if packed.elem == Type::Float64 {
                if is_add {
                    cg.asm.fmadd_d(acc, lhs, rhs);
                } else {
                    cg.asm.fmsub_d(acc, lhs, rhs);
                }
            } else if is_add {
                cg.asm.maddv(df, acc, lhs, rhs);
            } else {
                cg.asm.msubv(df, acc, lhs, rhs);
            }
        }
        VecOpKind::Load => {
            let dst = vec_of(summary.out());
            let base = gpr_of(summary.in_at(0));
            match df {
                0 => cg.asm.ld_b(dst, base, offset),
                1 => cg.asm.ld_h(dst, base, offset),
                2 => cg.asm.ld_w(dst, base, offset),
                _ => cg.asm.ld_d(dst, base, offset),
            }
        }
        VecOpKind::Store => {
            let src = vec_of(summary.in_at(1));
            let base = gpr_of(summary.in_at(0));
            match df {
                0 => cg.asm.st_b(src, base, offset),
                1 => cg.asm.st_h(src, base, offset),
                2 => cg.asm.st_w(src, base, offset),
                _ => cg.asm.st_d(src, base, offset),
            }
        }
        VecOpKind::SaturatingAdd | VecOpKind::SaturatingSub => {
            unreachable!("rejected by the locations builder")
        }
    }
}

fn three(summary: &LocationSummary) -> (VecReg, VecReg, VecReg) {
    (vec_of(summary.out()), vec_of(summary.in_at(0)), vec_of(summary.in_at(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetConfig;
    use crate::ir::{ConstVal, Graph, PackedType};
    use crate::mips64::codegen::test_util::{allocate_trivially, graph_from, leaf_config};
    use smallvec::smallvec;

    fn vec_graph(kind: VecOpKind, packed: PackedType) -> Graph {
        graph_from(
            vec![vec![
                Inst::ParameterValue { index: 0 },
                Inst::ParameterValue { index: 1 },
                Inst::VecOp {
                    kind,
                    packed,
                    inputs: smallvec![InstId::from_usize(0), InstId::from_usize(1)],
                    offset: 0,
                },
                Inst::Return { value: None },
            ]],
            vec![vec![Type::Float64, Type::Float64, Type::Float64, Type::Void]],
        )
    }

    #[test]
    fn vector_ops_require_msa() {
        let graph = vec_graph(VecOpKind::Add, PackedType::new(Type::Int32, 4));
        let mut cg = CodeGenerator::new(&graph, leaf_config());
        assert!(matches!(
            cg.build_locations(),
            Err(CodegenError::FeatureUnavailable("msa"))
        ));
    }

    #[test]
    #[should_panic(expected = "unsupported packed type")]
    fn sub_register_vectors_are_rejected() {
        // Two Int32 lanes are only 64 bits; compiling them would emit the
        // full 4-lane op over garbage upper lanes.
        let graph = vec_graph(VecOpKind::Add, PackedType::new(Type::Int32, 2));
        let config = TargetConfig { has_msa: true, ..leaf_config() };
        let mut cg = CodeGenerator::new(&graph, config);
        let _ = cg.build_locations();
    }

    #[test]
    fn saturating_arithmetic_is_rejected() {
        let graph = vec_graph(VecOpKind::SaturatingAdd, PackedType::new(Type::Int16, 8));
        let config = TargetConfig { has_msa: true, ..leaf_config() };
        let mut cg = CodeGenerator::new(&graph, config);
        assert!(matches!(
            cg.build_locations(),
            Err(CodegenError::FeatureUnavailable(_))
        ));
    }

    #[test]
    fn packed_add_compiles_for_every_width() {
        let config = TargetConfig { has_msa: true, ..leaf_config() };
        for packed in [
            PackedType::new(Type::Int8, 16),
            PackedType::new(Type::Int16, 8),
            PackedType::new(Type::Int32, 4),
            PackedType::new(Type::Float64, 2),
        ] {
            let graph = vec_graph(VecOpKind::Add, packed);
            let mut cg = CodeGenerator::new(&graph, config);
            cg.build_locations().unwrap();
            allocate_trivially(&mut cg);
            cg.set_allocated_registers(0, 0);
            let method = cg.compile().unwrap();
            // One 4-byte op plus the return sequence.
            assert!(method.code.len() >= 8);
        }
    }

    #[test]
    fn shift_distance_must_be_constant_and_is_masked() {
        let graph = graph_from(
            vec![vec![
                Inst::ParameterValue { index: 0 },
                Inst::Constant(ConstVal::Int32(33)),
                Inst::VecOp {
                    kind: VecOpKind::Shl,
                    packed: PackedType::new(Type::Int32, 4),
                    inputs: smallvec![InstId::from_usize(0), InstId::from_usize(1)],
                    offset: 0,
                },
                Inst::Return { value: None },
            ]],
            vec![vec![Type::Float64, Type::Int32, Type::Float64, Type::Void]],
        );
        let config = TargetConfig { has_msa: true, ..leaf_config() };
        let mut cg = CodeGenerator::new(&graph, config);
        cg.build_locations().unwrap();
        allocate_trivially(&mut cg);
        cg.set_allocated_registers(0, 0);
        // 33 & 31 == 1; must encode without tripping the shamt range assert.
        cg.compile().unwrap();
    }
}
