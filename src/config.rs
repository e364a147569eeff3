//! Per-build code generation configuration and runtime object-model facts.
//!
//! Everything here is decided once per build of the embedding runtime and is
//! immutable for the lifetime of a compilation: the GC read-barrier style,
//! heap reference poisoning, string compression, and the byte offsets this
//! layer needs into objects and into the thread structure. Threading one
//! [TargetConfig] value through every component keeps these decisions
//! explicit and lets tests exercise several configurations side by side.

use strum_macros::Display;

/// How heap reference loads coordinate with the concurrent collector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadBarrierKind {
    /// No read barriers: plain loads (still unpoisoned if poisoning is on).
    None,
    /// Baker-style: load, inline-check the object's gray state, and only
    /// call the mark slow path when the object may be stale.
    Baker,
    /// Always call the runtime read barrier slow path.
    Slow,
}

/// Immutable code generation configuration for one target build.
#[derive(Clone, Copy, Debug)]
pub struct TargetConfig {
    pub read_barrier: ReadBarrierKind,
    /// Heap references are stored XOR-poisoned and must be unpoisoned after
    /// every load and poisoned before every store.
    pub poison_heap_references: bool,
    /// `String` stores 8-bit chars when possible; the count field packs the
    /// compression flag into bit 0 and the length into the remaining bits.
    pub compressed_strings: bool,
    /// MSA 128-bit SIMD is available.
    pub has_msa: bool,
    /// Null checks on the first access may rely on page-zero faults instead
    /// of an explicit test-and-branch.
    pub implicit_null_checks: bool,
}

impl TargetConfig {
    pub fn emit_read_barriers(&self) -> bool {
        self.read_barrier != ReadBarrierKind::None
    }

    pub fn baker_read_barriers(&self) -> bool {
        self.read_barrier == ReadBarrierKind::Baker
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        TargetConfig {
            read_barrier: ReadBarrierKind::Baker,
            poison_heap_references: false,
            compressed_strings: true,
            has_msa: false,
            implicit_null_checks: true,
        }
    }
}

/// Byte offsets into heap objects and related layout facts, injected from the
/// runtime build. This layer never derives these; it only consumes them.
pub struct ObjectModel;

impl ObjectModel {
    /// Offset of the class pointer in every object header.
    pub const CLASS_OFFSET: i32 = 0;
    /// Offset of the lock word (which also carries the read barrier state).
    pub const MONITOR_OFFSET: i32 = 4;
    /// Lock word bit holding the Baker "gray" read barrier state.
    pub const READ_BARRIER_STATE_SHIFT: u32 = 28;

    pub const OBJECT_ALIGNMENT: u32 = 8;
    pub const HEAP_REFERENCE_SIZE: u32 = 4;

    pub const ARRAY_LENGTH_OFFSET: i32 = 8;
    /// First element offset for a given element size; 8-byte elements are
    /// aligned past the 12-byte header.
    pub const fn array_data_offset(elem_size: u32) -> i32 {
        if elem_size == 8 { 16 } else { 12 }
    }

    /// `String.count`: length, with the compression flag in bit 0 when
    /// compressed strings are enabled (0 = compressed, 1 = uncompressed).
    pub const STRING_COUNT_OFFSET: i32 = 8;
    pub const STRING_VALUE_OFFSET: i32 = 16;

    /// `Integer.value` in the boxed integer object.
    pub const BOXED_INT_VALUE_OFFSET: i32 = 8;

    /// Class status byte, compared against [Self::CLASS_STATUS_INITIALIZED]
    /// by class initialization checks.
    pub const CLASS_STATUS_BYTE_OFFSET: i32 = 108;
    pub const CLASS_STATUS_INITIALIZED: i32 = 14;
    /// Start of the class's embedded vtable; entries are pointer sized.
    pub const EMBEDDED_VTABLE_OFFSET: i32 = 112;
    /// Component type of an array class.
    pub const COMPONENT_TYPE_OFFSET: i32 = 4;
    /// Super class pointer within a class.
    pub const SUPER_CLASS_OFFSET: i32 = 8;

    /// log2 of the card size used by the card-marking write barrier.
    pub const CARD_SHIFT: u32 = 10;

    /// Quickened entry point within a method structure.
    pub const METHOD_QUICK_CODE_OFFSET: i32 = 32;

    /// Small-integer cache range for `Integer.valueOf`.
    pub const INTEGER_CACHE_LOW: i32 = -128;
    pub const INTEGER_CACHE_HIGH: i32 = 127;
    /// Boot-image address of the boxed-integer cache array. Boot-image
    /// objects never move, so the address can be baked into code.
    pub const INTEGER_CACHE_ARRAY_ADDRESS: u32 = 0x7010_0000;
    /// Boot-image address of the boxed integer class itself.
    pub const INTEGER_CLASS_ADDRESS: u32 = 0x7010_2000;
}

/// Byte offsets into the thread structure addressed through the dedicated
/// thread register.
pub struct ThreadModel;

impl ThreadModel {
    pub const POINTER_SIZE: i32 = 8;

    /// 16-bit state-and-flags word tested by suspend checks.
    pub const FLAGS_OFFSET: i32 = 0;
    pub const IS_GC_MARKING_OFFSET: i32 = 52;
    pub const CARD_TABLE_OFFSET: i32 = 120;
    pub const EXCEPTION_OFFSET: i32 = 128;
    pub const PEER_OFFSET: i32 = 136;
    pub const INTERRUPTED_OFFSET: i32 = 56;
    /// Top of the quick entry point table; entries are pointer sized.
    pub const ENTRYPOINTS_OFFSET: i32 = 512;
    /// Per-register read barrier mark entry points, one slot per GPR.
    pub const READ_BARRIER_MARK_ENTRYPOINTS_OFFSET: i32 = 280;
}

/// The runtime helpers this layer may call. Only identity and thread-table
/// offset matter here; the helpers themselves live in the runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum QuickEntrypoint {
    AllocObjectInitialized,
    AllocObjectWithChecks,
    AllocArrayResolved,
    InitializeStaticStorage,
    InitializeType,
    InitializeTypeAndVerifyAccess,
    ResolveString,
    ResolveMethod,
    ThrowNullPointer,
    ThrowArrayBounds,
    ThrowDivZero,
    ThrowStackOverflow,
    DeliverException,
    Deoptimize,
    TestSuspend,
    ReadBarrierSlow,
    ReadBarrierForRootSlow,
    StringCompareTo,
    StringIndexOf,
    StringIndexOfAfter,
    StringNewStringFromChars,
    StringNewStringFromString,
    LockObject,
    UnlockObject,
    InstanceofNonTrivial,
    CheckInstanceOf,
    Cos,
    Sin,
    Fmod,
    FmodF,
    AputObject,
}

impl QuickEntrypoint {
    /// Offset of this helper's code pointer from the thread register.
    pub fn thread_offset(self) -> i32 {
        ThreadModel::ENTRYPOINTS_OFFSET + (self as i32) * ThreadModel::POINTER_SIZE
    }

    /// Whether a call to this helper can reach a safepoint, i.e. whether the
    /// call site must record a stack map.
    pub fn can_trigger_gc(self) -> bool {
        !matches!(
            self,
            QuickEntrypoint::Cos
                | QuickEntrypoint::Sin
                | QuickEntrypoint::Fmod
                | QuickEntrypoint::FmodF
                | QuickEntrypoint::StringCompareTo
        )
    }
}

/// Offset of the per-register Baker mark helper for GPR number `reg`.
pub fn read_barrier_mark_entry_offset(reg: u32) -> i32 {
    assert!(reg < 32);
    ThreadModel::READ_BARRIER_MARK_ENTRYPOINTS_OFFSET + (reg as i32) * ThreadModel::POINTER_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entrypoint_offsets_are_pointer_strided() {
        let a = QuickEntrypoint::AllocObjectInitialized.thread_offset();
        let b = QuickEntrypoint::AllocObjectWithChecks.thread_offset();
        assert_eq!(b - a, ThreadModel::POINTER_SIZE);
    }

    #[test]
    fn array_data_offset_aligns_wide_elements() {
        assert_eq!(ObjectModel::array_data_offset(4), 12);
        assert_eq!(ObjectModel::array_data_offset(8) % 8, 0);
    }
}
