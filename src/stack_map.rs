//! Safepoint and linkage metadata collected during emission.
//!
//! The surrounding toolchain consumes these as plain ordered data; the
//! binary serialization format lives outside this crate.

use crate::ir::DexRef;

/// One safepoint: enough for the runtime to walk the frame at this PC.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackMapEntry {
    /// Offset of the instruction after the safepoint call, in bytes from
    /// the method entry, post branch promotion.
    pub native_pc_offset: u32,
    pub dex_pc: u32,
    /// Core registers holding live references at this point.
    pub register_mask: u32,
    /// Stack slots holding live references, one bit per slot.
    pub stack_mask: u64,
}

/// Frame facts the runtime needs to unwind one method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameInfo {
    pub frame_size_in_bytes: u32,
    pub core_spill_mask: u32,
    pub fpu_spill_mask: u32,
}

/// Ordered safepoint collection for one method.
#[derive(Debug, Default)]
pub struct StackMapStream {
    entries: Vec<StackMapEntry>,
    frame_info: FrameInfo,
}

impl StackMapStream {
    pub fn new() -> Self {
        StackMapStream::default()
    }

    pub fn set_frame_info(&mut self, frame_info: FrameInfo) {
        self.frame_info = frame_info;
    }

    pub fn frame_info(&self) -> FrameInfo {
        self.frame_info
    }

    pub fn push(&mut self, entry: StackMapEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[StackMapEntry] {
        &self.entries
    }

    /// Rewrite recorded native offsets after branch promotion moved code.
    /// `adjust` maps a pre-promotion offset to its final one.
    pub fn adjust_native_offsets(&mut self, mut adjust: impl FnMut(u32) -> u32) {
        for entry in &mut self.entries {
            entry.native_pc_offset = adjust(entry.native_pc_offset);
        }
    }
}

/// What a PC-relative patch resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchKind {
    /// Boot-image method address in the .data.bimg.rel.ro section.
    BootImageMethod,
    /// Method's .bss entry, filled on first resolution.
    MethodBssEntry,
    BootImageType,
    TypeBssEntry,
    BootImageString,
    StringBssEntry,
}

/// One linker patch: the `auipc` at `pc_insn_offset` and the dependent
/// instruction at `insn_offset` together materialize the target's address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkerPatch {
    pub kind: PatchKind,
    pub target: DexRef,
    pub pc_insn_offset: u32,
    pub insn_offset: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_offsets_are_adjustable_in_place() {
        let mut stream = StackMapStream::new();
        stream.push(StackMapEntry {
            native_pc_offset: 8,
            dex_pc: 1,
            register_mask: 0,
            stack_mask: 0,
        });
        stream.push(StackMapEntry {
            native_pc_offset: 24,
            dex_pc: 2,
            register_mask: 0,
            stack_mask: 0,
        });
        stream.adjust_native_offsets(|off| off + 4);
        assert_eq!(stream.entries()[0].native_pc_offset, 12);
        assert_eq!(stream.entries()[1].native_pc_offset, 28);
    }
}
