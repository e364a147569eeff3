//! Machine-code emission for a register-based VM's method compiler.
//!
//! This crate is the back end of the pipeline: it consumes a control-flow
//! graph of typed instructions whose input/output *locations* (registers and
//! stack slots) have already been decided by an external register allocator,
//! and produces a finished code buffer plus the metadata the surrounding
//! toolchain needs (safepoint stack maps and linker patch records).
//!
//! The split is:
//!
//!   * [ir], [locations], [moves], [buffer], [stack_map] and [config] are
//!     target neutral;
//!   * [mips64] is the one concrete target: assembler, calling conventions,
//!     instruction selection, intrinsics, and MSA vector support.
//!
//! Nothing in this crate blocks or shares mutable state: one compilation unit
//! is generated to completion on one thread. Invariant violations (an operand
//! combination the target cannot express, a branch out of even long-form
//! range) are compiler bugs and panic; conditions the *target program* can
//! hit at run time (null dereference, bounds, division by zero) are compiled
//! into slow paths instead.

pub mod buffer;
pub mod config;
pub mod errors;
pub mod ir;
pub mod locations;
pub mod mips64;
pub mod moves;
pub mod stack_map;

pub use errors::CodegenError;
