/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

#![allow(non_snake_case)]

//! SIMD-mask-aware augmentation of the interference graph.
//!
//! Classical liveness reasons about a variable as one scalar value.  On a
//! SIMD machine a write under a partial channel mask leaves the other
//! channels' bytes untouched, so a variable whose scalar live range has
//! ended may still hold live data in disabled channels.  This pass classifies
//! each variable's write pattern, builds lexical live intervals per
//! function, and sweeps them: overlapping variables whose patterns don't line
//! up channel for channel get a hard edge if the bytes they write overlap and
//! a weak edge (same start register or nothing) otherwise.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use log::{debug, info};

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

use crate::analysis::FlowInfo;
use crate::bit_set::BitSet;
use crate::data_structures::{
  BlockIx, DeclIx, FuncIx, InstIx, LrIx, Map, Set, TypedIxVec,
};
use crate::interface::{
  GrfAlign, InstInfo, InstKind, Kernel, Operand, RegFile,
};
use crate::interference::{check_and_add_edge, CallSite, InterferenceGraph};
use crate::live_range::LiveRange;

/// How a variable's channels map onto its bytes, as far as all of its
/// writes show.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum AugmentationMask {
  Undetermined,
  /// Channel `i` always writes element `i` (modulo the SIMD width), with
  /// elements of 2, 4 or 8 bytes.
  Default16Bit,
  Default32Bit,
  Default64Bit,
  /// A flag written by a full-width condition modifier.
  DefaultPredicateMask,
  NonDefault,
}

impl AugmentationMask {
  pub fn is_default(self) -> bool {
    match self {
      AugmentationMask::Default16Bit
      | AugmentationMask::Default32Bit
      | AugmentationMask::Default64Bit
      | AugmentationMask::DefaultPredicateMask => true,
      AugmentationMask::Undetermined | AugmentationMask::NonDefault => false,
    }
  }

  /// Fold the category of one more write into the running classification.
  pub fn merge(self, other: AugmentationMask) -> AugmentationMask {
    match (self, other) {
      (AugmentationMask::Undetermined, m) => m,
      (m, AugmentationMask::Undetermined) => m,
      (a, b) if a == b => a,
      _ => AugmentationMask::NonDefault,
    }
  }
}

impl Default for AugmentationMask {
  fn default() -> Self {
    AugmentationMask::Undetermined
  }
}

//=============================================================================
// Incremental state carried between attempts

/// Mask classifications from earlier attempts.  Entries for declares touched
/// by spill insertion are dropped before each attempt; everything goes when
/// the register file changes shape.
#[derive(Default)]
pub struct AugmentationState {
  cache: Map<DeclIx, (RegFile, AugmentationMask)>,
  num_grf: u32,
  /// The classification used by the latest attempt, per root declare.
  pub masks: Map<DeclIx, AugmentationMask>,
  pub reused: u32,
}

impl AugmentationState {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn invalidate(&mut self) {
    self.cache.clear();
  }

  pub fn begin_attempt(
    &mut self, num_grf: u32, touched: &Set<DeclIx>, incremental: bool,
  ) {
    if !incremental || num_grf != self.num_grf {
      self.invalidate();
    }
    self.num_grf = num_grf;
    for d in touched.iter() {
      self.cache.remove(d);
    }
    self.reused = 0;
  }

  pub fn mask_of(&self, decl: DeclIx) -> AugmentationMask {
    self.masks.get(&decl).cloned().unwrap_or_default()
  }
}

//=============================================================================
// Classification

/// Category of a single write.
pub fn classify_write(
  info: &InstInfo, op: &Operand, is_cond_mod: bool, lr: &LiveRange,
  simd: u32,
) -> AugmentationMask {
  if lr.address_sensitive || info.no_mask || info.kind == InstKind::Dpas {
    return AugmentationMask::NonDefault;
  }
  match lr.reg_file {
    RegFile::Flag => {
      if is_cond_mod && info.exec_size == simd && op.offset == 0 {
        AugmentationMask::DefaultPredicateMask
      } else {
        AugmentationMask::NonDefault
      }
    }
    RegFile::Grf => {
      if is_cond_mod
        || op.stride != 1
        || info.exec_size <= 1
        || info.exec_size > simd
        || simd == 0
      {
        return AugmentationMask::NonDefault;
      }
      let esize = op.elem_size;
      let mask = match esize {
        2 => AugmentationMask::Default16Bit,
        4 => AugmentationMask::Default32Bit,
        8 => AugmentationMask::Default64Bit,
        _ => return AugmentationMask::NonDefault,
      };
      if op.offset % esize != 0 {
        return AugmentationMask::NonDefault;
      }
      // Channel i writes element (offset / esize + i); it must be the
      // element belonging to that channel.
      let first_elem = op.offset / esize;
      if first_elem % simd != info.mask_offset % simd {
        return AugmentationMask::NonDefault;
      }
      mask
    }
    RegFile::Address | RegFile::Scalar => AugmentationMask::NonDefault,
  }
}

/// Classify every variable, reusing cached answers where allowed, and
/// record the bytes each one writes.
#[inline(never)]
pub fn classify_masks<K: Kernel>(
  kernel: &K, flow: &FlowInfo, lrs: &TypedIxVec<LrIx, LiveRange>,
  state: &mut AugmentationState,
) -> (TypedIxVec<LrIx, AugmentationMask>, TypedIxVec<LrIx, BitSet>) {
  debug!("classify_masks: begin");
  let decls = kernel.declares();
  let simd = kernel.simd_size();
  let nVars = flow.num_vars();

  let mut masks = TypedIxVec::<LrIx, AugmentationMask>::new();
  masks.resize(nVars, AugmentationMask::Undetermined);
  // A declare that moved between files means nothing cached can be trusted.
  if lrs.iter().any(|r| {
    state.cache.get(&r.decl).map_or(false, |(file, _)| *file != r.reg_file)
  }) {
    state.invalidate();
  }
  let mut cached = vec![false; nVars as usize];
  for (lr, r) in lrs.enumerate() {
    if let Some((_, m)) = state.cache.get(&r.decl) {
      masks[lr] = *m;
      cached[lr.get_usize()] = true;
      state.reused += 1;
    }
  }

  let mut footprints = TypedIxVec::<LrIx, BitSet>::new();
  for (_, r) in lrs.enumerate() {
    footprints.push(BitSet::new(decls[r.decl.get_usize()].byte_size() as usize));
  }

  for iix in kernel.insts() {
    let info = &flow.infos[iix];
    if info.kind == InstKind::Kill {
      continue;
    }
    let writes = info
      .dst
      .iter()
      .map(|op| (*op, false))
      .chain(info.cond_mod.iter().map(|op| (*op, true)));
    for (op, is_cond_mod) in writes {
      let lr = match flow.vars.lr_of(op.decl) {
        Some(lr) => lr,
        None => continue,
      };
      footprints[lr].set_range(op.offset as usize, op.size as usize);
      if !cached[lr.get_usize()] {
        let m = classify_write(info, &op, is_cond_mod, &lrs[lr], simd);
        masks[lr] = masks[lr].merge(m);
      }
    }
    if let Some(ind) = info.indirect {
      if ind.is_dst {
        for p in kernel.points_to(ind.addr.decl) {
          if let Some(lr) = flow.vars.lr_of(*p) {
            let len = footprints[lr].len();
            footprints[lr].set_range(0, len);
            if !cached[lr.get_usize()] {
              masks[lr] = AugmentationMask::NonDefault;
            }
          }
        }
      }
    }
  }

  for (lr, r) in lrs.enumerate() {
    let d = &decls[r.decl.get_usize()];
    if d.flags.input || r.is_pseudo() {
      masks[lr] = AugmentationMask::NonDefault;
    }
    if masks[lr] == AugmentationMask::Undetermined {
      masks[lr] = AugmentationMask::NonDefault;
    }
    // Never written here: any byte may hold live data.
    if footprints[lr].is_empty() {
      let len = footprints[lr].len();
      footprints[lr].set_range(0, len);
    }
  }

  // A split family is only as regular as its least regular member.
  let mut family_nondefault = Map::<LrIx, bool>::default();
  for (lr, r) in lrs.enumerate() {
    let root = r.parent.map_or(lr, |(p, _)| p);
    let nd = masks[lr] == AugmentationMask::NonDefault;
    *family_nondefault.entry(root).or_insert(false) |= nd;
  }
  for (lr, r) in lrs.enumerate() {
    let root = r.parent.map_or(lr, |(p, _)| p);
    if family_nondefault.get(&root).cloned().unwrap_or(false) {
      masks[lr] = AugmentationMask::NonDefault;
    }
  }

  state.masks.clear();
  for (lr, r) in lrs.enumerate() {
    state.cache.insert(r.decl, (r.reg_file, masks[lr]));
    state.masks.insert(r.decl, masks[lr]);
  }
  debug!("classify_masks: end, {} reused", state.reused);
  (masks, footprints)
}

//=============================================================================
// Live intervals

/// A lexical interval `[start, end]` over instruction numbers.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Interval {
  pub lr: LrIx,
  pub start: u32,
  pub end: u32,
}

/// How a variable that crosses function boundaries is treated.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CrossFuncCategory {
  /// Defined once on kernel entry and never again: classical liveness says
  /// everything needed.
  LiveThrough,
  /// Every definition sits just before a call.
  DefBeforeEachCall,
  Unknown,
}

struct Hull {
  start: u32,
  end: u32,
}

impl Hull {
  fn add(hull: &mut Option<Hull>, at: u32) {
    match hull {
      None => *hull = Some(Hull { start: at, end: at }),
      Some(h) => {
        h.start = h.start.min(at);
        h.end = h.end.max(at);
      }
    }
  }
}

#[inline(never)]
pub fn build_intervals<K: Kernel>(
  kernel: &K, flow: &FlowInfo, lrs: &TypedIxVec<LrIx, LiveRange>,
  calls: &[CallSite],
) -> Vec<Interval> {
  debug!("build_intervals: begin");
  let nFuncs = kernel.num_funcs() as usize;
  let nVars = flow.num_vars() as usize;
  let entry = kernel.entry_block();

  // Lexical extent of each function.
  let mut func_span: Vec<Option<Hull>> = (0..nFuncs).map(|_| None).collect();
  for bix in kernel.blocks() {
    let f = kernel.block_func(bix).get_usize();
    let r = kernel.block_insts(bix);
    Hull::add(&mut func_span[f], r.first().get());
    Hull::add(&mut func_span[f], r.end().get() - 1);
  }

  // Per (variable, function) hull of references and live block edges.
  let mut hulls: Vec<Vec<Option<Hull>>> =
    (0..nVars).map(|_| (0..nFuncs).map(|_| None).collect()).collect();
  let mut add = |lr: usize, f: FuncIx, at: InstIx| {
    Hull::add(&mut hulls[lr][f.get_usize()], at.get());
  };
  for bix in kernel.blocks() {
    let f = kernel.block_func(bix);
    let r = kernel.block_insts(bix);
    for lr in flow.liveness.live_in[bix].iter() {
      add(lr, f, r.first());
    }
    for lr in flow.liveness.live_out[bix].iter() {
      add(lr, f, r.end().minus(1));
    }
    for iix in r {
      let refs = &flow.refs[iix];
      for u in refs.uses.iter() {
        add(u.get_usize(), f, iix);
      }
      for (d, _) in refs.defs.iter() {
        add(d.get_usize(), f, iix);
      }
    }
  }
  // A value live into the target of a lexically backward edge, loop back
  // edge or otherwise, stays live over the whole span the edge closes.
  for src in kernel.blocks() {
    let f = kernel.block_func(src);
    let last = kernel.block_insts(src).end().minus(1);
    for tgt in kernel.block_succs(src) {
      let first = kernel.block_insts(tgt).first();
      if kernel.block_func(tgt) != f || first > last {
        continue;
      }
      for lr in flow.liveness.live_in[tgt].iter() {
        add(lr, f, first);
        add(lr, f, last);
      }
    }
  }

  let call_block = |iix: InstIx| flow.cfg.inst_block[iix];
  let mut intervals = Vec::<Interval>::new();
  for (lr, r) in lrs.enumerate() {
    match r.reg_file {
      RegFile::Grf | RegFile::Flag => {}
      _ => continue,
    }
    if r.is_pseudo() {
      continue;
    }
    let ix = lr.get_usize();
    let funcs: Vec<usize> =
      (0..nFuncs).filter(|f| hulls[ix][*f].is_some()).collect();
    if funcs.len() <= 1 {
      for f in funcs {
        if let Some(h) = &hulls[ix][f] {
          intervals.push(Interval { lr, start: h.start, end: h.end });
        }
      }
      continue;
    }

    let defs = &flow.sums[lr].defs;
    let category = if defs.len() == 1 && call_block(defs[0]) == entry {
      CrossFuncCategory::LiveThrough
    } else if !defs.is_empty()
      && defs.iter().all(|d| next_call_in_block(kernel, flow, *d).is_some())
    {
      CrossFuncCategory::DefBeforeEachCall
    } else {
      CrossFuncCategory::Unknown
    };
    match category {
      CrossFuncCategory::LiveThrough => {}
      CrossFuncCategory::DefBeforeEachCall => {
        let mut def_funcs = vec![];
        for d in defs.iter() {
          if let Some(c) = next_call_in_block(kernel, flow, *d) {
            intervals.push(Interval { lr, start: d.get(), end: c.get() });
          }
          def_funcs.push(kernel.block_func(call_block(*d)).get_usize());
        }
        for f in funcs {
          if def_funcs.contains(&f) {
            continue;
          }
          if let Some(h) = &hulls[ix][f] {
            intervals.push(Interval { lr, start: h.start, end: h.end });
          }
        }
      }
      CrossFuncCategory::Unknown => {
        for f in funcs {
          if let Some(span) = &func_span[f] {
            intervals.push(Interval { lr, start: span.start, end: span.end });
          }
        }
      }
    }
  }

  // Call pseudos exist only at the call itself.
  for call in calls {
    if let InstKind::Call { pseudo: Some(p), .. } = flow.infos[call.inst].kind {
      if let Some(vca) = flow.vars.lr_of(p) {
        let at = call.inst.get();
        intervals.push(Interval { lr: vca, start: at, end: at });
      }
    }
  }

  intervals.sort_by_key(|i| (i.start, i.lr));
  debug!("build_intervals: end, {} intervals", intervals.len());
  intervals
}

/// The call ending the block of `def`, if one follows it there.
fn next_call_in_block<K: Kernel>(
  kernel: &K, flow: &FlowInfo, def: InstIx,
) -> Option<InstIx> {
  let bix: BlockIx = flow.cfg.inst_block[def];
  let r = kernel.block_insts(bix);
  let mut iix = def.plus(1);
  while r.contains(iix) {
    if let InstKind::Call { .. } = flow.infos[iix].kind {
      return Some(iix);
    }
    iix = iix.plus(1);
  }
  None
}

//=============================================================================
// The sweep

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PairAction {
  Nothing,
  /// Same start register or fully disjoint.
  Weak,
  Hard,
  /// Both become even aligned; with two rows each they then either
  /// coincide or are disjoint.
  PromoteEven,
}

/// What to do about two variables live at once per the intervals but not
/// interfering per classical liveness.
pub fn pair_action(
  ma: AugmentationMask, mb: AugmentationMask, a: &LiveRange, b: &LiveRange,
  footprints_overlap: bool,
) -> PairAction {
  if ma == mb && ma.is_default() {
    if a.reg_file != RegFile::Grf {
      return PairAction::Nothing;
    }
    let rows = a.num_regs.max(b.num_regs);
    if rows > 2 {
      PairAction::Weak
    } else if rows == 2 {
      PairAction::PromoteEven
    } else {
      PairAction::Nothing
    }
  } else if footprints_overlap {
    PairAction::Hard
  } else {
    PairAction::Weak
  }
}

/// Do the written bytes overlap when both variables start at the same
/// register?
fn footprints_overlap(a: &BitSet, b: &BitSet) -> bool {
  a.iter().any(|byte| b.contains(byte))
}

#[inline(never)]
pub fn augment_interference<K: Kernel>(
  kernel: &K, flow: &FlowInfo, lrs: &mut TypedIxVec<LrIx, LiveRange>,
  intf: &mut InterferenceGraph, calls: &[CallSite],
  state: &mut AugmentationState, divergent: bool,
) {
  debug!("augment_interference: begin");
  let (masks, footprints) = classify_masks(kernel, flow, lrs, state);
  // Regular writes under uniform control flow leave nothing for classical
  // liveness to miss.
  if !divergent && masks.iter().all(|m| m.is_default()) {
    debug!("augment_interference: end, all writes regular");
    return;
  }
  let intervals = build_intervals(kernel, flow, lrs, calls);

  let mut default_q = BinaryHeap::<Reverse<(u32, LrIx)>>::new();
  let mut nondefault_q = BinaryHeap::<Reverse<(u32, LrIx)>>::new();
  let (mut nHard, mut nWeak, mut nPromoted) = (0, 0, 0);

  for cur in intervals.iter() {
    for q in [&mut default_q, &mut nondefault_q].iter_mut() {
      while let Some(Reverse((end, _))) = q.peek() {
        if *end < cur.start {
          q.pop();
        } else {
          break;
        }
      }
    }

    let active: Vec<LrIx> = default_q
      .iter()
      .chain(nondefault_q.iter())
      .map(|Reverse((_, lr))| *lr)
      .collect();
    for other in active {
      let (a, b) = (cur.lr, other);
      if a == b || lrs[a].reg_file != lrs[b].reg_file || intf.interfere(a, b)
      {
        continue;
      }
      let overlap = footprints_overlap(&footprints[a], &footprints[b]);
      match pair_action(masks[a], masks[b], &lrs[a], &lrs[b], overlap) {
        PairAction::Nothing => {}
        PairAction::Weak => {
          intf.add_weak_edge(a, b);
          nWeak += 1;
        }
        PairAction::Hard => {
          check_and_add_edge(intf, lrs, a, b);
          nHard += 1;
        }
        PairAction::PromoteEven => {
          for x in [a, b].iter() {
            if lrs[*x].align == GrfAlign::Either {
              lrs[*x].align = GrfAlign::Even;
              nPromoted += 1;
            }
          }
        }
      }
    }

    if masks[cur.lr] == AugmentationMask::NonDefault {
      nondefault_q.push(Reverse((cur.end, cur.lr)));
    } else {
      default_q.push(Reverse((cur.end, cur.lr)));
    }
  }

  // Values live across a call must survive everything the callee writes.
  for call in calls {
    if call.callee.get() >= flow.maydefs.len() {
      continue;
    }
    let clobbered = &flow.maydefs[call.callee];
    for v in call.live_across.iter() {
      for m in clobbered.iter() {
        let (a, b) = (LrIx::new(v as u32), LrIx::new(m as u32));
        if lrs[a].is_pseudo() || lrs[b].is_pseudo() {
          continue;
        }
        if !intf.interfere(a, b) {
          check_and_add_edge(intf, lrs, a, b);
          nHard += 1;
        }
      }
    }
  }

  info!(
    "augmentation: {} intervals, {} hard edges, {} weak edges, {} promoted",
    intervals.len(),
    nHard,
    nWeak,
    nPromoted
  );
  debug!("augment_interference: end");
}

#[cfg(test)]
mod tests {
  use super::*;
  use smallvec::smallvec;

  fn grf(num_regs: u32) -> LiveRange {
    LiveRange::new(DeclIx::new(0), RegFile::Grf, num_regs)
  }

  fn mov(exec: u32, mask_offset: u32, dst: Operand) -> InstInfo {
    let mut info = InstInfo::new(InstKind::Alu, exec);
    info.mask_offset = mask_offset;
    info.dst = Some(dst);
    info.srcs = smallvec![None];
    info
  }

  #[test]
  fn regular_writes_are_default() {
    let d = DeclIx::new(0);
    let lr = grf(2);
    let full = mov(16, 0, Operand::region(d, 0, 4, 1, 16));
    assert_eq!(
      classify_write(&full, &full.dst.unwrap(), false, &lr, 16),
      AugmentationMask::Default32Bit
    );
    // Second half of a SIMD16 variable written by the M8 channels.
    let half = mov(8, 8, Operand::region(d, 32, 4, 1, 8));
    assert_eq!(
      classify_write(&half, &half.dst.unwrap(), false, &lr, 16),
      AugmentationMask::Default32Bit
    );
    // Same bytes written by the wrong channels.
    let skewed = mov(8, 0, Operand::region(d, 32, 4, 1, 8));
    assert_eq!(
      classify_write(&skewed, &skewed.dst.unwrap(), false, &lr, 16),
      AugmentationMask::NonDefault
    );
  }

  #[test]
  fn irregular_writes_are_nondefault() {
    let d = DeclIx::new(0);
    let lr = grf(1);
    let mut nomask = mov(8, 0, Operand::region(d, 0, 4, 1, 8));
    nomask.no_mask = true;
    assert_eq!(
      classify_write(&nomask, &nomask.dst.unwrap(), false, &lr, 8),
      AugmentationMask::NonDefault
    );
    let scalar = mov(1, 0, Operand::region(d, 0, 4, 0, 1));
    assert_eq!(
      classify_write(&scalar, &scalar.dst.unwrap(), false, &lr, 8),
      AugmentationMask::NonDefault
    );
    let bytes = mov(8, 0, Operand::region(d, 0, 1, 1, 8));
    assert_eq!(
      classify_write(&bytes, &bytes.dst.unwrap(), false, &lr, 8),
      AugmentationMask::NonDefault
    );
  }

  #[test]
  fn predicate_masks() {
    let f = DeclIx::new(0);
    let lr = LiveRange::new(f, RegFile::Flag, 1);
    let mut cmp = InstInfo::new(InstKind::Alu, 16);
    cmp.cond_mod = Some(Operand::block(f, 0, 2));
    assert_eq!(
      classify_write(&cmp, &cmp.cond_mod.unwrap(), true, &lr, 16),
      AugmentationMask::DefaultPredicateMask
    );
    let mut narrow = cmp.clone();
    narrow.exec_size = 8;
    assert_eq!(
      classify_write(&narrow, &narrow.cond_mod.unwrap(), true, &lr, 16),
      AugmentationMask::NonDefault
    );
  }

  #[test]
  fn merging_categories() {
    use AugmentationMask::*;
    assert_eq!(Undetermined.merge(Default32Bit), Default32Bit);
    assert_eq!(Default32Bit.merge(Default32Bit), Default32Bit);
    assert_eq!(Default32Bit.merge(Default16Bit), NonDefault);
    assert_eq!(NonDefault.merge(Undetermined), NonDefault);
  }

  #[test]
  fn pair_rules() {
    use AugmentationMask::*;
    let one = grf(1);
    let two = grf(2);
    let four = grf(4);
    assert_eq!(
      pair_action(Default32Bit, Default32Bit, &one, &one, true),
      PairAction::Nothing
    );
    assert_eq!(
      pair_action(Default32Bit, Default32Bit, &two, &two, true),
      PairAction::PromoteEven
    );
    assert_eq!(
      pair_action(Default64Bit, Default64Bit, &four, &four, true),
      PairAction::Weak
    );
    assert_eq!(
      pair_action(NonDefault, Default32Bit, &one, &one, true),
      PairAction::Hard
    );
    assert_eq!(
      pair_action(NonDefault, NonDefault, &one, &one, false),
      PairAction::Weak
    );
    assert_eq!(
      pair_action(Default16Bit, Default32Bit, &one, &one, false),
      PairAction::Weak
    );
  }

  #[test]
  fn incremental_cache_drops_touched() {
    let mut st = AugmentationState::new();
    st.begin_attempt(128, &Set::empty(), true);
    st.cache.insert(DeclIx::new(1), (RegFile::Grf, AugmentationMask::Default32Bit));
    st.cache.insert(DeclIx::new(2), (RegFile::Grf, AugmentationMask::NonDefault));
    st.begin_attempt(128, &Set::unit(DeclIx::new(2)), true);
    assert!(st.cache.contains_key(&DeclIx::new(1)));
    assert!(!st.cache.contains_key(&DeclIx::new(2)));
    // A GRF count change throws everything away.
    st.begin_attempt(256, &Set::empty(), true);
    assert!(st.cache.is_empty());
  }
}
