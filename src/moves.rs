//! Parallel move resolution.
//!
//! At block boundaries and around calls, a batch of location-to-location
//! moves must behave as if simultaneous: every destination receives the value
//! its source held before any move in the batch ran. This module orders the
//! batch into plain moves, breaking dependency cycles with swaps. The swap
//! instruction itself is supplied by the backend through [MoveEmitter], so
//! the algorithm is target neutral and testable against a simulator.
//!
//! The algorithm is the classic depth-first one: recursively perform any
//! move blocking this one, detecting cycles via a "pending" mark, and break
//! a cycle with a swap of this move's endpoints. A swap rewrites the sources
//! of the remaining moves. One subtlety: when a cycle mixes 64-bit and
//! 32-bit moves, swaps of 64-bit pairs must happen first, otherwise a
//! 32-bit swap could split a pair across two homes the pair swap cannot
//! express. A move that discovers this walks the recursion back by
//! returning the move that must be swapped instead.

use crate::ir::Type;
use crate::locations::Location;
use smallvec::SmallVec;

/// One pending move of the batch.
#[derive(Clone, Debug)]
pub struct MoveOp {
    source: Location,
    destination: Location,
    ty: Type,
}

impl MoveOp {
    pub fn new(source: Location, destination: Location, ty: Type) -> Self {
        MoveOp { source, destination, ty }
    }

    pub fn source(&self) -> Location {
        self.source
    }

    pub fn destination(&self) -> Location {
        self.destination
    }

    pub fn ty(&self) -> Type {
        self.ty
    }

    /// A pending move has had its destination stashed by the resolver.
    fn is_pending(&self) -> bool {
        !self.destination.is_valid() && self.source.is_valid()
    }

    fn is_eliminated(&self) -> bool {
        !self.source.is_valid() && !self.destination.is_valid()
    }

    fn is_redundant(&self) -> bool {
        !self.is_pending() && (!self.destination.is_valid() || self.source == self.destination)
    }

    fn eliminate(&mut self) {
        self.source = Location::Invalid;
        self.destination = Location::Invalid;
    }

    /// Whether this not-yet-performed move still needs to read `loc`.
    fn blocks(&self, loc: &Location) -> bool {
        !self.is_eliminated() && self.source.overlaps_with(loc)
    }

    fn is_64bit(&self) -> bool {
        self.ty.is_64bit()
    }

    /// Stash the destination to mark this move pending; returns it.
    fn mark_pending(&mut self) -> Location {
        assert!(!self.is_pending());
        let dest = self.destination;
        self.destination = Location::Invalid;
        dest
    }

    fn clear_pending(&mut self, dest: Location) {
        assert!(self.is_pending());
        self.destination = dest;
    }
}

/// Half views of a 64-bit location, for rewriting a 32-bit source after a
/// wide swap moved one half of a pair.
fn low_of(loc: &Location) -> Option<Location> {
    match loc {
        Location::GprPair(lo, _) => Some(Location::Gpr(*lo)),
        Location::DoubleStackSlot(off) => Some(Location::StackSlot(*off)),
        _ => None,
    }
}

fn high_of(loc: &Location) -> Option<Location> {
    match loc {
        Location::GprPair(_, hi) => Some(Location::Gpr(*hi)),
        Location::DoubleStackSlot(off) => Some(Location::StackSlot(*off + 4)),
        _ => None,
    }
}

/// `updated_location` has just been swapped with `new_source`; fix `move_`'s
/// source accordingly, extracting a half when the move is narrower than the
/// swapped location.
fn update_source_of(mv: &mut MoveOp, updated_location: &Location, new_source: &Location) {
    let source = mv.source;
    if low_of(updated_location) == Some(source) {
        mv.source = low_of(new_source).unwrap();
    } else if high_of(updated_location) == Some(source) {
        mv.source = high_of(new_source).unwrap();
    } else {
        assert_eq!(*updated_location, source);
        mv.source = *new_source;
    }
}

/// The backend's move/swap vocabulary. `emit_swap` must exchange the two
/// locations' full width.
pub trait MoveEmitter {
    fn emit_move(&mut self, mv: &MoveOp);
    fn emit_swap(&mut self, mv: &MoveOp);
}

/// Swap-based resolver: cycles are broken with an exchange of this move's
/// endpoints rather than a spill to scratch.
#[derive(Debug, Default)]
pub struct ParallelMoveResolver {
    moves: SmallVec<[MoveOp; 4]>,
}

impl ParallelMoveResolver {
    pub fn new() -> Self {
        ParallelMoveResolver::default()
    }

    pub fn add_move(&mut self, source: Location, destination: Location, ty: Type) {
        self.moves.push(MoveOp::new(source, destination, ty));
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Resolve and emit the whole batch. The resolver is left empty.
    pub fn resolve<E: MoveEmitter>(&mut self, emitter: &mut E) {
        // Drop moves that are already in place.
        self.moves.retain(|m| !m.is_redundant());

        // Stack-to-stack moves first: they are the ones that need a scratch
        // register on constrained targets, so run them while registers that
        // later moves will occupy are still free.
        for i in 0..self.moves.len() {
            let mv = &self.moves[i];
            if mv.is_eliminated() || mv.source.is_constant() {
                continue;
            }
            if (mv.source.is_stack_slot() || mv.source.is_double_stack_slot())
                && (mv.destination.is_stack_slot() || mv.destination.is_double_stack_slot())
            {
                self.perform_move(i, emitter);
            }
        }

        // Everything except constants. Constants never block another move,
        // and deferring them keeps their destination registers free.
        for i in 0..self.moves.len() {
            let mv = &self.moves[i];
            if !mv.is_eliminated() && !mv.source.is_constant() {
                self.perform_move(i, emitter);
            }
        }

        for i in 0..self.moves.len() {
            if !self.moves[i].is_eliminated() {
                assert!(self.moves[i].source.is_constant());
                emitter.emit_move(&self.moves[i]);
                self.moves[i].eliminate();
            }
        }

        self.moves.clear();
    }

    /// Perform move `index`, first recursively performing anything blocking
    /// it. Returns the index of a move that must be swapped further up the
    /// cycle (the 64-bit-before-32-bit protocol), or `None`.
    fn perform_move<E: MoveEmitter>(&mut self, index: usize, emitter: &mut E) -> Option<usize> {
        assert!(!self.moves[index].is_pending());
        if self.moves[index].is_redundant() {
            // An earlier pair swap can make moves redundant in passing.
            self.moves[index].eliminate();
            return None;
        }

        assert!(self.moves[index].source.is_valid());
        let destination = self.moves[index].mark_pending();

        // Depth-first over the moves blocked on this one's destination. A
        // swap deeper in the recursion can rewrite sources, so a swapped
        // callee forces a re-scan from the start.
        let mut required_swap: Option<usize> = None;
        let mut i = 0;
        while i < self.moves.len() {
            let blocks = self.moves[i].blocks(&destination) && !self.moves[i].is_pending();
            if blocks {
                required_swap = self.perform_move(i, emitter);
                if required_swap == Some(index) {
                    // We are the move that must swap; do so immediately.
                    break;
                } else if required_swap == Some(i) {
                    // The callee itself got swapped; sources may have
                    // changed, look for a new cycle from scratch.
                    required_swap = None;
                    i = 0;
                    continue;
                } else if required_swap.is_some() {
                    // Walk the cycle back to the move that must swap.
                    self.moves[index].clear_pending(destination);
                    return required_swap;
                }
            }
            i += 1;
        }

        self.moves[index].clear_pending(destination);

        // Swaps above may have rewritten our source; if it now equals the
        // destination this was the last move of its cycle.
        if self.moves[index].source == destination {
            self.moves[index].eliminate();
            assert!(required_swap.is_none());
            return None;
        }

        // Any remaining blocker must be pending, i.e. we are in a cycle.
        let mut do_swap = false;
        if let Some(rs) = required_swap {
            assert_eq!(rs, index);
            do_swap = true;
        } else {
            for j in 0..self.moves.len() {
                if self.moves[j].blocks(&destination) {
                    assert!(self.moves[j].is_pending());
                    if !self.moves[index].is_64bit() && self.moves[j].is_64bit() {
                        // Swap wide moves before narrow ones; unwind to j.
                        return Some(j);
                    }
                    do_swap = true;
                    break;
                }
            }
        }

        if do_swap {
            emitter.emit_swap(&self.moves[index]);
            let source = self.moves[index].source;
            let swap_destination = self.moves[index].destination;
            self.moves[index].eliminate();
            for j in 0..self.moves.len() {
                if self.moves[j].blocks(&source) {
                    update_source_of(&mut self.moves[j], &source, &swap_destination);
                } else if self.moves[j].blocks(&swap_destination) {
                    update_source_of(&mut self.moves[j], &swap_destination, &source);
                }
            }
            // Tell the caller its dependency scan must restart if the swap
            // was demanded from the middle of a cycle.
            required_swap
        } else {
            emitter.emit_move(&self.moves[index]);
            self.moves[index].eliminate();
            assert!(required_swap.is_none());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ConstVal;
    use crate::ir::InstId;
    use std::collections::HashMap;

    /// Simulates the emitted sequence against a value store so the batch's
    /// as-if-simultaneous contract can be checked directly. Stack slots are
    /// 4-byte cells; a double slot reads and writes two of them, so slot
    /// aliasing behaves as it does in a real frame.
    #[derive(Default)]
    struct Simulator {
        gprs: HashMap<u32, i64>,
        fprs: HashMap<u32, i64>,
        stack: HashMap<i32, u32>,
        log: Vec<String>,
    }

    fn key(loc: &Location) -> String {
        format!("{loc:?}")
    }

    impl Simulator {
        fn set(&mut self, loc: &Location, v: i64) {
            match loc {
                Location::Gpr(r) => {
                    self.gprs.insert(*r, v);
                }
                Location::Fpr(r) => {
                    self.fprs.insert(*r, v);
                }
                Location::StackSlot(o) => {
                    self.stack.insert(*o, v as u32);
                }
                Location::DoubleStackSlot(o) => {
                    self.stack.insert(*o, v as u32);
                    self.stack.insert(*o + 4, (v >> 32) as u32);
                }
                Location::GprPair(lo, hi) => {
                    self.gprs.insert(*lo, v as u32 as i64);
                    self.gprs.insert(*hi, v >> 32);
                }
                _ => panic!("cannot store to {loc:?}"),
            }
        }

        fn get(&self, loc: &Location) -> i64 {
            match loc {
                Location::Constant { value, .. } => value.as_i64(),
                Location::Gpr(r) => *self.gprs.get(r).unwrap_or(&0),
                Location::Fpr(r) => *self.fprs.get(r).unwrap_or(&0),
                Location::StackSlot(o) => i64::from(*self.stack.get(o).unwrap_or(&0)),
                Location::DoubleStackSlot(o) => {
                    let lo = u64::from(*self.stack.get(o).unwrap_or(&0));
                    let hi = u64::from(*self.stack.get(&(o + 4)).unwrap_or(&0));
                    (lo | (hi << 32)) as i64
                }
                Location::GprPair(lo, hi) => {
                    let lo = *self.gprs.get(lo).unwrap_or(&0) as u32 as u64;
                    let hi = *self.gprs.get(hi).unwrap_or(&0) as u64;
                    (lo | (hi << 32)) as i64
                }
                _ => panic!("cannot read {loc:?}"),
            }
        }
    }

    impl MoveEmitter for Simulator {
        fn emit_move(&mut self, mv: &MoveOp) {
            let v = self.get(&mv.source());
            self.set(&mv.destination(), v);
            self.log.push(format!("{} <- {}", key(&mv.destination()), key(&mv.source())));
        }

        fn emit_swap(&mut self, mv: &MoveOp) {
            let a = self.get(&mv.source());
            let b = self.get(&mv.destination());
            self.set(&mv.source(), b);
            self.set(&mv.destination(), a);
            self.log.push(format!("swap {} {}", key(&mv.source()), key(&mv.destination())));
        }
    }

    fn constant(v: i32) -> Location {
        Location::Constant { value: ConstVal::Int32(v), origin: InstId::from_raw(0) }
    }

    fn run(moves: &[(Location, Location, Type)], init: &[(Location, i64)]) -> Simulator {
        let mut sim = Simulator::default();
        for (loc, v) in init {
            sim.set(loc, *v);
        }
        let expected: Vec<(Location, i64)> = moves
            .iter()
            .map(|(src, dst, _)| (*dst, sim.get(src)))
            .collect();
        let mut resolver = ParallelMoveResolver::new();
        for (src, dst, ty) in moves {
            resolver.add_move(*src, *dst, *ty);
        }
        resolver.resolve(&mut sim);
        for (dst, want) in expected {
            assert_eq!(sim.get(&dst), want, "destination {dst:?}");
        }
        sim
    }

    #[test]
    fn straight_line_chain() {
        run(
            &[
                (Location::Gpr(1), Location::Gpr(2), Type::Int64),
                (Location::Gpr(2), Location::Gpr(3), Type::Int64),
            ],
            &[(Location::Gpr(1), 11), (Location::Gpr(2), 22)],
        );
    }

    #[test]
    fn two_cycle_uses_one_swap() {
        let sim = run(
            &[
                (Location::Gpr(1), Location::Gpr(2), Type::Int64),
                (Location::Gpr(2), Location::Gpr(1), Type::Int64),
            ],
            &[(Location::Gpr(1), 11), (Location::Gpr(2), 22)],
        );
        assert_eq!(sim.log.iter().filter(|l| l.starts_with("swap")).count(), 1);
    }

    #[test]
    fn three_cycle() {
        run(
            &[
                (Location::Gpr(1), Location::Gpr(2), Type::Int64),
                (Location::Gpr(2), Location::Gpr(3), Type::Int64),
                (Location::Gpr(3), Location::Gpr(1), Type::Int64),
            ],
            &[
                (Location::Gpr(1), 1),
                (Location::Gpr(2), 2),
                (Location::Gpr(3), 3),
            ],
        );
    }

    #[test]
    fn cycle_through_stack_slots() {
        run(
            &[
                (Location::StackSlot(0), Location::Gpr(4), Type::Int32),
                (Location::Gpr(4), Location::StackSlot(0), Type::Int32),
            ],
            &[(Location::StackSlot(0), 7), (Location::Gpr(4), 9)],
        );
    }

    #[test]
    fn constants_go_last() {
        let sim = run(
            &[
                (constant(99), Location::Gpr(1), Type::Int32),
                (Location::Gpr(1), Location::Gpr(2), Type::Int32),
            ],
            &[(Location::Gpr(1), 5)],
        );
        // The register-to-register move must precede the constant load.
        let const_pos = sim.log.iter().position(|l| l.contains("Constant")).unwrap();
        assert_eq!(const_pos, sim.log.len() - 1);
    }

    #[test]
    fn redundant_moves_emit_nothing() {
        let sim = run(
            &[(Location::Gpr(1), Location::Gpr(1), Type::Int32)],
            &[(Location::Gpr(1), 3)],
        );
        assert!(sim.log.is_empty());
    }

    #[test]
    fn mixed_width_cycle_swaps_wide_first() {
        // The 32-bit move reads the low half of the wide pair's home; the
        // wide swap must run first and the narrow source be rewritten.
        let sim = run(
            &[
                (Location::DoubleStackSlot(0), Location::DoubleStackSlot(8), Type::Int64),
                (Location::StackSlot(8), Location::StackSlot(0), Type::Int32),
            ],
            &[
                (Location::StackSlot(0), 10),
                (Location::StackSlot(4), 20),
                (Location::StackSlot(8), 30),
                (Location::StackSlot(12), 40),
            ],
        );
        assert!(sim.log.iter().any(|l| l.starts_with("swap")));
    }
}
