//! The MIPS64R6 backend: assembler, ABI, code generator, SIMD and
//! intrinsic expansions.

pub mod abi;
pub mod asm;
pub mod codegen;
pub mod intrinsics;
pub mod vector;

/// General purpose registers, numbered as encoded in instructions.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum GpuReg {
    Zero = 0,
    At = 1,
    V0 = 2,
    V1 = 3,
    A0 = 4,
    A1 = 5,
    A2 = 6,
    A3 = 7,
    A4 = 8,
    A5 = 9,
    A6 = 10,
    A7 = 11,
    T0 = 12,
    T1 = 13,
    T2 = 14,
    T3 = 15,
    S0 = 16,
    S1 = 17,
    S2 = 18,
    S3 = 19,
    S4 = 20,
    S5 = 21,
    S6 = 22,
    S7 = 23,
    T8 = 24,
    T9 = 25,
    K0 = 26,
    K1 = 27,
    Gp = 28,
    Sp = 29,
    S8 = 30,
    Ra = 31,
}

const GPU_REGS: [GpuReg; 32] = [
    GpuReg::Zero,
    GpuReg::At,
    GpuReg::V0,
    GpuReg::V1,
    GpuReg::A0,
    GpuReg::A1,
    GpuReg::A2,
    GpuReg::A3,
    GpuReg::A4,
    GpuReg::A5,
    GpuReg::A6,
    GpuReg::A7,
    GpuReg::T0,
    GpuReg::T1,
    GpuReg::T2,
    GpuReg::T3,
    GpuReg::S0,
    GpuReg::S1,
    GpuReg::S2,
    GpuReg::S3,
    GpuReg::S4,
    GpuReg::S5,
    GpuReg::S6,
    GpuReg::S7,
    GpuReg::T8,
    GpuReg::T9,
    GpuReg::K0,
    GpuReg::K1,
    GpuReg::Gp,
    GpuReg::Sp,
    GpuReg::S8,
    GpuReg::Ra,
];

impl GpuReg {
    /// First scratch register, reserved for code generation sequences.
    pub const TMP: GpuReg = GpuReg::T8;
    /// Second scratch register.
    pub const TMP2: GpuReg = GpuReg::T3;
    /// Dedicated thread register.
    pub const TR: GpuReg = GpuReg::S1;

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> GpuReg {
        GPU_REGS[code as usize]
    }
}

/// Floating point registers. On MIPS64 each holds a single or a double.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum FpuReg {
    F0 = 0,
    F1 = 1,
    F2 = 2,
    F3 = 3,
    F4 = 4,
    F5 = 5,
    F6 = 6,
    F7 = 7,
    F8 = 8,
    F9 = 9,
    F10 = 10,
    F11 = 11,
    F12 = 12,
    F13 = 13,
    F14 = 14,
    F15 = 15,
    F16 = 16,
    F17 = 17,
    F18 = 18,
    F19 = 19,
    F20 = 20,
    F21 = 21,
    F22 = 22,
    F23 = 23,
    F24 = 24,
    F25 = 25,
    F26 = 26,
    F27 = 27,
    F28 = 28,
    F29 = 29,
    F30 = 30,
    F31 = 31,
}

const FPU_REGS: [FpuReg; 32] = [
    FpuReg::F0,
    FpuReg::F1,
    FpuReg::F2,
    FpuReg::F3,
    FpuReg::F4,
    FpuReg::F5,
    FpuReg::F6,
    FpuReg::F7,
    FpuReg::F8,
    FpuReg::F9,
    FpuReg::F10,
    FpuReg::F11,
    FpuReg::F12,
    FpuReg::F13,
    FpuReg::F14,
    FpuReg::F15,
    FpuReg::F16,
    FpuReg::F17,
    FpuReg::F18,
    FpuReg::F19,
    FpuReg::F20,
    FpuReg::F21,
    FpuReg::F22,
    FpuReg::F23,
    FpuReg::F24,
    FpuReg::F25,
    FpuReg::F26,
    FpuReg::F27,
    FpuReg::F28,
    FpuReg::F29,
    FpuReg::F30,
    FpuReg::F31,
];

impl FpuReg {
    /// Scratch FPU register.
    pub const FTMP: FpuReg = FpuReg::F8;

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> FpuReg {
        FPU_REGS[code as usize]
    }
}

/// MSA 128-bit vector registers; Wn overlaps Fn in hardware.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum VecReg {
    W0 = 0,
    W1 = 1,
    W2 = 2,
    W3 = 3,
    W4 = 4,
    W5 = 5,
    W6 = 6,
    W7 = 7,
    W8 = 8,
    W9 = 9,
    W10 = 10,
    W11 = 11,
    W12 = 12,
    W13 = 13,
    W14 = 14,
    W15 = 15,
    W16 = 16,
    W17 = 17,
    W18 = 18,
    W19 = 19,
    W20 = 20,
    W21 = 21,
    W22 = 22,
    W23 = 23,
    W24 = 24,
    W25 = 25,
    W26 = 26,
    W27 = 27,
    W28 = 28,
    W29 = 29,
    W30 = 30,
    W31 = 31,
}

const VEC_REGS: [VecReg; 32] = [
    VecReg::W0,
    VecReg::W1,
    VecReg::W2,
    VecReg::W3,
    VecReg::W4,
    VecReg::W5,
    VecReg::W6,
    VecReg::W7,
    VecReg::W8,
    VecReg::W9,
    VecReg::W10,
    VecReg::W11,
    VecReg::W12,
    VecReg::W13,
    VecReg::W14,
    VecReg::W15,
    VecReg::W16,
    VecReg::W17,
    VecReg::W18,
    VecReg::W19,
    VecReg::W20,
    VecReg::W21,
    VecReg::W22,
    VecReg::W23,
    VecReg::W24,
    VecReg::W25,
    VecReg::W26,
    VecReg::W27,
    VecReg::W28,
    VecReg::W29,
    VecReg::W30,
    VecReg::W31,
];

impl VecReg {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> VecReg {
        VEC_REGS[code as usize]
    }

    /// The FPU register overlapping this vector register.
    pub fn as_fpu(self) -> FpuReg {
        FpuReg::from_code(self.code())
    }
}

impl From<FpuReg> for VecReg {
    fn from(f: FpuReg) -> VecReg {
        VecReg::from_code(f.code())
    }
}
