/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Checker: verifies that an assignment keeps every value intact from its
//! definitions to its uses.
//!
//! Two kinds of checks are made.  The static ones look at the assignment
//! alone: every range lies within its file, is aligned, avoids its
//! forbidden registers, and no two interfering ranges overlap.  Operands
//! that the hardware requires to be disjoint (send destination and sources,
//! the two payloads of a split send, a DPAS destination and its src1) must
//! not share registers either.
//!
//! The dynamic check tracks symbolic values through the kernel.  Every byte
//! of every physical register holds an abstract value:
//!
//!   - `Unknown`: nothing written yet (the lattice top),
//!   - `Var(v)`: last written by a definition of variable v,
//!   - `Conflicted`: different variables along different paths (bottom).
//!
//! A definition of v at bytes B sets `Var(v)` on the physical bytes B maps
//! to.  At joins, values meet: two different variables meet to
//! `Conflicted`.  After the fixpoint, each read of v must find either
//! `Var(v)`, `Unknown` or `Conflicted` in every byte v ever writes.  A
//! definite `Var(w)` there means w clobbered v.
//!
//! `Conflicted` is accepted because a variable undefined along some path
//! may share its registers with another variable on that path.

use log::{debug, info};

use crate::analysis::FlowInfo;
use crate::bit_set::BitSet;
use crate::data_structures::{
  BlockIx, DeclIx, InstIx, LrIx, Queue, TypedIxVec,
};
use crate::interface::{
  InstKind, Kernel, Operand, RegAllocOptions, RegFile, NUM_REG_FILES,
};
use crate::interference::InterferenceGraph;
use crate::live_range::{ForbiddenRegs, LiveRange};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckerError {
  OutOfRange { decl: DeclIx, start: u32, num_regs: u32, file_size: u32 },
  Misaligned { decl: DeclIx, start: u32, align: u32 },
  ForbiddenRegister { decl: DeclIx, start: u32 },
  /// A split piece that isn't at its offset inside its parent.
  PieceOutsideParent { decl: DeclIx, start: u32, expected: u32 },
  InterferingOverlap { a: DeclIx, b: DeclIx },
  /// Weakly interfering ranges may share storage only from the same start.
  WeakOverlap { a: DeclIx, b: DeclIx },
  OperandOverlap { inst: InstIx, a: DeclIx, b: DeclIx },
  ValueClobbered {
    inst: InstIx,
    decl: DeclIx,
    found: DeclIx,
    file: RegFile,
    byte: u32,
  },
}

#[derive(Clone, Debug, Default)]
pub struct CheckerErrors {
  pub errors: Vec<CheckerError>,
}

/// Abstract value of one register byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckerValue {
  Unknown,
  Conflicted,
  Var(LrIx),
}

impl CheckerValue {
  /// Meet function of the abstract-interpretation value lattice.
  pub fn meet(&self, other: &CheckerValue) -> CheckerValue {
    match (self, other) {
      (&CheckerValue::Unknown, _) => *other,
      (_, &CheckerValue::Unknown) => *self,
      (&CheckerValue::Conflicted, _) => *self,
      (_, &CheckerValue::Conflicted) => *other,
      _ if *self == *other => *self,
      _ => CheckerValue::Conflicted,
    }
  }
}

/// The abstract contents of every register file, byte by byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckerState {
  files: Vec<Vec<CheckerValue>>,
}

impl CheckerState {
  pub fn new(file_bytes: &[u32; NUM_REG_FILES]) -> Self {
    Self {
      files: file_bytes
        .iter()
        .map(|n| vec![CheckerValue::Unknown; *n as usize])
        .collect(),
    }
  }

  /// Merge with the state of another predecessor.  Returns whether
  /// anything changed.
  pub fn meet_with(&mut self, other: &CheckerState) -> bool {
    let mut changed = false;
    for (mine, theirs) in self.files.iter_mut().zip(other.files.iter()) {
      for (a, b) in mine.iter_mut().zip(theirs.iter()) {
        let m = a.meet(b);
        if m != *a {
          *a = m;
          changed = true;
        }
      }
    }
    changed
  }

  pub fn get(&self, file: RegFile, byte: u32) -> CheckerValue {
    self.files[file.index()]
      .get(byte as usize)
      .cloned()
      .unwrap_or(CheckerValue::Unknown)
  }

  pub fn set(&mut self, file: RegFile, start: u32, len: u32, v: CheckerValue) {
    let bytes = &mut self.files[file.index()];
    let end = ((start + len) as usize).min(bytes.len());
    for b in (start as usize).min(end)..end {
      bytes[b] = v;
    }
  }
}

pub struct Checker<'a, K: Kernel> {
  kernel: &'a K,
  flow: &'a FlowInfo,
  lrs: &'a TypedIxVec<LrIx, LiveRange>,
  intf: &'a InterferenceGraph,
  forbidden: &'a ForbiddenRegs,
  /// Start unit of each range.
  assignments: &'a TypedIxVec<LrIx, Option<u32>>,
  opts: &'a RegAllocOptions,
  num_grf: u32,
  /// Bytes of each variable written by some definition.
  written: TypedIxVec<LrIx, BitSet>,
  errors: Vec<CheckerError>,
}

impl<'a, K: Kernel> Checker<'a, K> {
  pub fn new(
    kernel: &'a K, flow: &'a FlowInfo, lrs: &'a TypedIxVec<LrIx, LiveRange>,
    intf: &'a InterferenceGraph, forbidden: &'a ForbiddenRegs,
    assignments: &'a TypedIxVec<LrIx, Option<u32>>,
    opts: &'a RegAllocOptions, num_grf: u32,
  ) -> Self {
    let decls = kernel.declares();
    let mut written = TypedIxVec::new();
    for (_, d) in flow.vars.vars.enumerate() {
      written.push(BitSet::new(decls[d.get_usize()].byte_size() as usize));
    }
    for info in flow.infos.iter() {
      for op in info.writes() {
        if let Some(lr) = flow.vars.lr_of(op.decl) {
          let w = &mut written[lr];
          let end = (op.end() as usize).min(w.len());
          let start = (op.offset as usize).min(end);
          w.set_range(start, end - start);
        }
      }
    }
    Self {
      kernel,
      flow,
      lrs,
      intf,
      forbidden,
      assignments,
      opts,
      num_grf,
      written,
      errors: vec![],
    }
  }

  fn file_size(&self, file: RegFile) -> u32 {
    self.opts.file_size(file, self.num_grf)
  }

  /// Physical byte address of byte 0 of `decl`'s variable.
  fn base_of(&self, decl: DeclIx) -> Option<(LrIx, RegFile, u32)> {
    let lr = self.flow.vars.lr_of(decl)?;
    let start = self.assignments[lr]?;
    let file = self.lrs[lr].reg_file;
    Some((lr, file, start * self.opts.unit_bytes(file)))
  }

  fn span_of(&self, op: &Operand) -> Option<(LrIx, RegFile, u32, u32)> {
    let (lr, file, base) = self.base_of(op.decl)?;
    Some((lr, file, base + op.offset, base + op.end()))
  }

  // === Static checks ===

  fn check_placement(&mut self) {
    for (lr, range) in self.lrs.enumerate() {
      let start = match self.assignments[lr] {
        Some(s) => s,
        None => continue,
      };
      let size = self.file_size(range.reg_file);
      if start + range.num_regs > size {
        self.errors.push(CheckerError::OutOfRange {
          decl: range.decl,
          start,
          num_regs: range.num_regs,
          file_size: size,
        });
        continue;
      }
      if let Some((p, off)) = range.parent {
        if let Some(ps) = self.assignments[p] {
          if start != ps + off {
            self.errors.push(CheckerError::PieceOutsideParent {
              decl: range.decl,
              start,
              expected: ps + off,
            });
          }
        }
      }
      if range.precolored.is_some() {
        continue;
      }
      let align = range.unit_align();
      if start % align != 0 {
        self.errors.push(CheckerError::Misaligned {
          decl: range.decl,
          start,
          align,
        });
      }
      let mask = self.forbidden.mask_for(range, size);
      if mask.any_in_range(start as usize, range.num_regs as usize) {
        self
          .errors
          .push(CheckerError::ForbiddenRegister { decl: range.decl, start });
      }
    }
  }

  fn overlap(&self, a: LrIx, b: LrIx) -> Option<(u32, u32)> {
    let (ra, rb) = (&self.lrs[a], &self.lrs[b]);
    if ra.reg_file != rb.reg_file {
      return None;
    }
    let (x, y) = (self.assignments[a]?, self.assignments[b]?);
    if x + ra.num_regs <= y || y + rb.num_regs <= x {
      None
    } else {
      Some((x, y))
    }
  }

  fn check_interference(&mut self) {
    for (a, b) in self.intf.edges() {
      if self.overlap(a, b).is_some() {
        self.errors.push(CheckerError::InterferingOverlap {
          a: self.lrs[a].decl,
          b: self.lrs[b].decl,
        });
      }
    }
    for a in self.lrs.range() {
      for b in self.intf.weak_neighbors(a) {
        if a >= *b || self.intf.interfere(a, *b) {
          continue;
        }
        if let Some((x, y)) = self.overlap(a, *b) {
          if x != y {
            self.errors.push(CheckerError::WeakOverlap {
              a: self.lrs[a].decl,
              b: self.lrs[*b].decl,
            });
          }
        }
      }
    }
  }

  fn check_operands(&mut self) {
    for iix in self.kernel.insts() {
      let info = &self.flow.infos[iix];
      let mut pairs: Vec<(Operand, Operand)> = vec![];
      match info.kind {
        InstKind::Send { split } => {
          if let Some(d) = info.dst {
            for s in info.srcs.iter().filter_map(|s| *s) {
              pairs.push((d, s));
            }
          }
          if split {
            if let (Some(a), Some(b)) = (info.src(0), info.src(1)) {
              pairs.push((a, b));
            }
          }
        }
        InstKind::Dpas => {
          if let (Some(d), Some(s)) = (info.dst, info.src(1)) {
            pairs.push((d, s));
          }
        }
        _ => {}
      }
      for (a, b) in pairs {
        let (sa, sb) = match (self.span_of(&a), self.span_of(&b)) {
          (Some(sa), Some(sb)) => (sa, sb),
          _ => continue,
        };
        if sa.0 == sb.0 || sa.1 != sb.1 {
          continue;
        }
        if sa.2 < sb.3 && sb.2 < sa.3 {
          self.errors.push(CheckerError::OperandOverlap {
            inst: iix,
            a: a.decl,
            b: b.decl,
          });
        }
      }
    }
  }

  // === Value tracking ===

  fn initial_state(&self) -> CheckerState {
    let mut sizes = [0u32; NUM_REG_FILES];
    for file in RegFile::all().iter() {
      sizes[file.index()] = self.file_size(*file) * self.opts.unit_bytes(*file);
    }
    let mut state = CheckerState::new(&sizes);
    let decls = self.kernel.declares();
    for (lr, d) in self.flow.vars.vars.enumerate() {
      let decl = &decls[d.get_usize()];
      if !decl.flags.input {
        continue;
      }
      if let Some((_, file, base)) = self.base_of(*d) {
        state.set(file, base, decl.byte_size(), CheckerValue::Var(lr));
      }
    }
    state
  }

  /// Apply one instruction to `state`, reporting clobbered reads when
  /// `report` is set.
  fn step(&mut self, state: &mut CheckerState, iix: InstIx, report: bool) {
    let flow = self.flow;
    let info = &flow.infos[iix];
    if info.kind == InstKind::Kill {
      return;
    }
    let mut found: Vec<CheckerError> = vec![];
    if report {
      for op in info.reads() {
        let (lr, file, base) = match self.base_of(op.decl) {
          Some(x) => x,
          None => continue,
        };
        let written = &self.written[lr];
        for b in op.offset..op.end() {
          if !written.contains(b as usize) {
            continue;
          }
          if let CheckerValue::Var(w) = state.get(file, base + b) {
            if w != lr {
              found.push(CheckerError::ValueClobbered {
                inst: iix,
                decl: self.lrs[lr].decl,
                found: self.lrs[w].decl,
                file,
                byte: base + b,
              });
              break;
            }
          }
        }
      }
    }
    for op in info.writes() {
      if let Some((lr, file, base)) = self.base_of(op.decl) {
        state.set(file, base + op.offset, op.size, CheckerValue::Var(lr));
      }
    }
    self.errors.extend(found);
  }

  fn walk_block(
    &mut self, bix: BlockIx, state: &mut CheckerState, report: bool,
  ) {
    for iix in self.kernel.block_insts(bix) {
      self.step(state, iix, report);
    }
  }

  fn check_values(&mut self) {
    let num_blocks = self.flow.cfg.succ_map.len();
    let mut in_states: TypedIxVec<BlockIx, Option<CheckerState>> =
      TypedIxVec::new();
    in_states.resize(num_blocks, None);

    let entry = self.kernel.entry_block();
    in_states[entry] = Some(self.initial_state());
    let mut work = Queue::<BlockIx>::new();
    let mut queued = vec![false; num_blocks as usize];
    work.push_back(entry);
    queued[entry.get_usize()] = true;

    while let Some(bix) = work.pop_front() {
      queued[bix.get_usize()] = false;
      let mut state = match &in_states[bix] {
        Some(s) => s.clone(),
        None => continue,
      };
      self.walk_block(bix, &mut state, false);
      for succ in self.flow.cfg.succ_map[bix].iter() {
        let changed = match &mut in_states[*succ] {
          Some(s) => s.meet_with(&state),
          slot @ None => {
            *slot = Some(state.clone());
            true
          }
        };
        if changed && !queued[succ.get_usize()] {
          queued[succ.get_usize()] = true;
          work.push_back(*succ);
        }
      }
    }

    for bix in self.kernel.blocks() {
      if let Some(s) = in_states[bix].take() {
        let mut state = s;
        self.walk_block(bix, &mut state, true);
      }
    }
  }

  /// Run every check.
  pub fn run(mut self) -> Result<(), CheckerErrors> {
    debug!("checker: begin");
    self.check_placement();
    self.check_interference();
    self.check_operands();
    self.check_values();
    debug!("checker: end, {} errors", self.errors.len());
    if self.errors.is_empty() {
      Ok(())
    } else {
      for e in self.errors.iter() {
        info!("checker: {:?}", e);
      }
      Err(CheckerErrors { errors: self.errors })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn v(n: u32) -> CheckerValue {
    CheckerValue::Var(LrIx::new(n))
  }

  #[test]
  fn meet_lattice() {
    let u = CheckerValue::Unknown;
    let c = CheckerValue::Conflicted;
    assert_eq!(u.meet(&v(1)), v(1));
    assert_eq!(v(1).meet(&u), v(1));
    assert_eq!(v(1).meet(&v(1)), v(1));
    assert_eq!(v(1).meet(&v(2)), c);
    assert_eq!(c.meet(&v(2)), c);
    assert_eq!(u.meet(&u), u);
  }

  #[test]
  fn state_meet_reports_change() {
    let sizes = [64, 8, 32, 0];
    let mut a = CheckerState::new(&sizes);
    let mut b = CheckerState::new(&sizes);
    a.set(RegFile::Grf, 0, 4, v(0));
    b.set(RegFile::Grf, 2, 4, v(1));
    assert!(a.meet_with(&b));
    assert_eq!(a.get(RegFile::Grf, 0), v(0));
    assert_eq!(a.get(RegFile::Grf, 2), CheckerValue::Conflicted);
    assert_eq!(a.get(RegFile::Grf, 5), v(1));
    assert!(!a.meet_with(&b));
    // Writes past the end of a file are dropped.
    a.set(RegFile::Flag, 6, 4, v(2));
    assert_eq!(a.get(RegFile::Flag, 7), v(2));
    assert_eq!(a.get(RegFile::Flag, 8), CheckerValue::Unknown);
  }
}
