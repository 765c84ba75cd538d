/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! The coloring engine: alignment-aware edge weights and degrees, spill
//! costs, the simplification order and the assignment of physical
//! registers, per register file.

use log::{debug, info, log_enabled, trace, Level};

use crate::bank_conflict::{bundle_of, BankDecision};
use crate::bit_set::BitSet;
use crate::data_structures::{LrIx, Queue, TypedIxVec};
use crate::interface::{GrfAlign, RegAllocOptions, RegFile, SubRegAlign};
use crate::interference::InterferenceGraph;
use crate::live_range::{ForbiddenRegs, LiveRange};
use crate::phy_reg_usage::{PhyRegUsage, SearchRequest};

/// Cost of a range that must never be spilled.
pub const MAXSPILLCOST: f32 = f32::MAX;
/// Cost of a range that should be the first to go.
pub const MINSPILLCOST: f32 = -f32::MAX;

//=============================================================================
// Edge weights
//
// The weight of the edge (lr1, lr2), seen from lr1, bounds how many
// candidate start registers of lr1 a colored lr2 can block, given both
// sizes and alignments.  Weights are not symmetric.

fn pad(n: u32, align: u32) -> u32 {
  (align - n % align) % align
}

pub fn edge_weight_grf(n1: u32, a1: GrfAlign, n2: u32, a2: GrfAlign) -> u32 {
  let sum = n1 + n2;
  match (a1, a2) {
    (GrfAlign::Either, _) => sum - 1,
    (GrfAlign::Even, GrfAlign::Either) => sum + 1 - sum % 2,
    (GrfAlign::Even, _) => sum - 1 + n1 % 2 + n2 % 2,
    (GrfAlign::Quad, GrfAlign::Either) => sum + 3 - sum % 4,
    (GrfAlign::Quad, GrfAlign::Even) => {
      if pad(n1, 4) >= 2 {
        sum - 1 + pad(n1, 4) - 2
      } else {
        sum - 1 + pad(n1, 4) + pad(n2, 2)
      }
    }
    (GrfAlign::Quad, GrfAlign::Quad) => sum - 1 + pad(n1, 4) + pad(n2, 4),
  }
}

/// Flag and address registers, in words.
pub fn edge_weight_sub(
  n1: u32, a1: SubRegAlign, n2: u32, a2: SubRegAlign,
) -> u32 {
  let sum = n1 + n2;
  match (a1, a2) {
    (SubRegAlign::Any, _) => sum - 1,
    (SubRegAlign::EvenWord, SubRegAlign::Any) => sum + 1 - sum % 2,
    (SubRegAlign::EvenWord, _) => {
      if n1 % 2 == 0 && n2 % 2 == 0 {
        sum - 2
      } else {
        sum - 1 + n1 % 2 + n2 % 2
      }
    }
    (SubRegAlign::FourWord, SubRegAlign::Any)
    | (SubRegAlign::FourWord, SubRegAlign::EvenWord) => sum + 3 - sum % 4,
    (SubRegAlign::FourWord, _) => sum - 1 + pad(n1, 4) + pad(n2, 4),
    (SubRegAlign::EightWord, SubRegAlign::Any)
    | (SubRegAlign::EightWord, SubRegAlign::EvenWord) => sum + 7 - sum % 8,
    (SubRegAlign::EightWord, SubRegAlign::FourWord) => {
      if pad(n1, 8) >= 4 {
        sum - 1 + pad(n1, 8) - 4
      } else {
        sum - 1 + pad(n1, 8) + pad(n2, 4)
      }
    }
    (SubRegAlign::EightWord, SubRegAlign::EightWord) => {
      sum - 1 + pad(n1, 8) + pad(n2, 8)
    }
  }
}

/// Weight of the edge (lr1, lr2) as seen from lr1.
pub fn edge_weight(lr1: &LiveRange, lr2: &LiveRange) -> u32 {
  match lr1.reg_file {
    RegFile::Grf => {
      edge_weight_grf(lr1.num_regs, lr1.align, lr2.num_regs, lr2.align)
    }
    RegFile::Flag | RegFile::Address => edge_weight_sub(
      lr1.num_regs,
      lr1.sub_align,
      lr2.num_regs,
      lr2.sub_align,
    ),
    RegFile::Scalar => lr1.num_regs + lr2.num_regs - 1,
  }
}

/// Neighbors counted in the degree of `lr`: its hard neighbors, then weak
/// neighbors that are not also hard ones.  All are in `lr`'s file.
fn degree_neighbors<'a>(
  lrs: &'a TypedIxVec<LrIx, LiveRange>, intf: &'a InterferenceGraph,
  lr: LrIx,
) -> impl Iterator<Item = LrIx> + 'a {
  let file = lrs[lr].reg_file;
  intf
    .neighbors(lr)
    .iter()
    .cloned()
    .chain(
      intf
        .weak_neighbors(lr)
        .iter()
        .cloned()
        .filter(move |n| !intf.interfere(lr, *n)),
    )
    .filter(move |n| lrs[*n].reg_file == file)
}

#[inline(never)]
pub fn compute_degrees(
  lrs: &mut TypedIxVec<LrIx, LiveRange>, intf: &InterferenceGraph,
) {
  let mut degrees = Vec::with_capacity(lrs.len() as usize);
  {
    let view: &TypedIxVec<LrIx, LiveRange> = lrs;
    for lr in view.range() {
      let d: u32 = degree_neighbors(view, intf, lr)
        .map(|n| edge_weight(&view[lr], &view[n]))
        .sum();
      degrees.push(d);
    }
  }
  for (lr, d) in lrs.iter_mut().zip(degrees) {
    lr.degree = d;
  }
}

//=============================================================================
// Spill costs

/// Cost of one range, before the address-sensitive adjustment.
pub fn spill_cost(lr: &LiveRange, opts: &RegAllocOptions) -> f32 {
  let f = &lr.flags;
  if f.do_not_spill
    || f.ret_addr
    || f.old_frame_ptr
    || f.addr_flag_spill
    || f.spill_temp
    || lr.infinite_cost
  {
    return MAXSPILLCOST;
  }
  if lr.is_pseudo() || f.force_spill {
    return MINSPILLCOST;
  }
  if lr.num_refs == 0 {
    return 0.0;
  }
  let refs = lr.weighted_refs as f32;
  let degree = lr.degree.max(1) as f32;
  if opts.use_new_spill_cost {
    refs * refs * refs / (degree * degree)
  } else {
    let bytes = (lr.num_regs * opts.unit_bytes(lr.reg_file)) as f32;
    refs * refs * bytes * bytes.sqrt() / degree.sqrt()
  }
}

/// Set every range's spill cost.  Degrees must be computed first.  Ranges
/// reachable through an address register cost more than any ordinary range,
/// so that they are colored first.
#[inline(never)]
pub fn compute_spill_costs(
  lrs: &mut TypedIxVec<LrIx, LiveRange>, opts: &RegAllocOptions,
) {
  let mut max_normal: f32 = 0.0;
  for lr in lrs.iter_mut() {
    lr.spill_cost = spill_cost(lr, opts);
    if !lr.address_sensitive && lr.spill_cost < MAXSPILLCOST {
      max_normal = max_normal.max(lr.spill_cost);
    }
  }
  for lr in lrs.iter_mut() {
    if lr.address_sensitive
      && lr.spill_cost < MAXSPILLCOST
      && lr.spill_cost > MINSPILLCOST
    {
      lr.spill_cost = max_normal + lr.spill_cost.max(0.0) + 1.0;
    }
  }
}

//=============================================================================
// Simplification

/// The degree bookkeeping of the simplification phase for one file.
pub struct Simplifier<'a> {
  lrs: &'a TypedIxVec<LrIx, LiveRange>,
  intf: &'a InterferenceGraph,
  file_size: u32,
  degree: Vec<u32>,
  num_forbidden: Vec<u32>,
  active: Vec<bool>,
  queued: Vec<bool>,
  unconstrained: Queue<LrIx>,
  /// Ranges of the file not yet removed.
  remaining: u32,
}

impl<'a> Simplifier<'a> {
  pub fn new(
    lrs: &'a TypedIxVec<LrIx, LiveRange>, intf: &'a InterferenceGraph,
    file: RegFile, file_size: u32, forbidden: &ForbiddenRegs,
  ) -> Self {
    let n = lrs.len() as usize;
    let mut s = Self {
      lrs,
      intf,
      file_size,
      degree: lrs.iter().map(|lr| lr.degree).collect(),
      num_forbidden: vec![0; n],
      active: vec![false; n],
      queued: vec![false; n],
      unconstrained: Queue::new(),
      remaining: 0,
    };
    for (lr, range) in lrs.enumerate() {
      if range.reg_file != file || range.precolored.is_some() {
        continue;
      }
      s.active[lr.get_usize()] = true;
      s.num_forbidden[lr.get_usize()] =
        forbidden.mask_for(range, file_size).card() as u32;
      s.remaining += 1;
    }
    for lr in lrs.range() {
      if s.active[lr.get_usize()] && s.is_unconstrained(lr) {
        s.queued[lr.get_usize()] = true;
        s.unconstrained.push_back(lr);
      }
    }
    s
  }

  pub fn degree(&self, lr: LrIx) -> u32 {
    self.degree[lr.get_usize()]
  }

  pub fn is_active(&self, lr: LrIx) -> bool {
    self.active[lr.get_usize()]
  }

  /// Colorable whatever its neighbors do.
  pub fn is_unconstrained(&self, lr: LrIx) -> bool {
    let i = lr.get_usize();
    let avail = self.file_size.saturating_sub(self.num_forbidden[i]);
    self.degree[i] + self.lrs[lr].num_regs <= avail
  }

  /// Take `lr` out of the graph, relaxing its still-active neighbors by the
  /// weight of their edge to it.
  pub fn remove(&mut self, lr: LrIx) {
    debug_assert!(self.is_active(lr));
    self.active[lr.get_usize()] = false;
    self.remaining -= 1;
    let neighbors: Vec<LrIx> =
      degree_neighbors(self.lrs, self.intf, lr).collect();
    for n in neighbors {
      let i = n.get_usize();
      if !self.active[i] {
        continue;
      }
      let w = edge_weight(&self.lrs[n], &self.lrs[lr]);
      self.degree[i] = self.degree[i].saturating_sub(w);
      if !self.queued[i] && self.is_unconstrained(n) {
        self.queued[i] = true;
        self.unconstrained.push_back(n);
      }
    }
  }

  fn next_unconstrained(&mut self) -> Option<LrIx> {
    while let Some(lr) = self.unconstrained.pop_front() {
      if self.active[lr.get_usize()] {
        return Some(lr);
      }
    }
    None
  }
}

/// The order in which ranges of `file` leave the graph.  They are colored
/// in the reverse order.  Unconstrained ranges go first; when none is left
/// the cheapest constrained range, lowest id on ties, is removed
/// optimistically.
#[inline(never)]
pub fn determine_color_order(
  lrs: &TypedIxVec<LrIx, LiveRange>, intf: &InterferenceGraph,
  file: RegFile, file_size: u32, forbidden: &ForbiddenRegs,
) -> Vec<LrIx> {
  let mut simp = Simplifier::new(lrs, intf, file, file_size, forbidden);

  let mut by_cost: Vec<LrIx> =
    lrs.range().into_iter().filter(|lr| simp.is_active(*lr)).collect();
  by_cost.sort_by(|a, b| {
    lrs[*a]
      .spill_cost
      .partial_cmp(&lrs[*b].spill_cost)
      .unwrap_or(std::cmp::Ordering::Equal)
      .then(a.cmp(b))
  });
  let mut cursor = 0;

  let mut order = Vec::with_capacity(by_cost.len());
  while simp.remaining > 0 {
    if let Some(lr) = simp.next_unconstrained() {
      simp.remove(lr);
      order.push(lr);
      continue;
    }
    while !simp.is_active(by_cost[cursor]) {
      cursor += 1;
    }
    let lr = by_cost[cursor];
    trace!("  optimistic removal of {:?} (degree {})", lr, simp.degree(lr));
    simp.remove(lr);
    order.push(lr);
  }
  order
}

//=============================================================================
// Assignment

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ColorHeuristic {
  /// Each search starts after the last register handed out; any failure
  /// aborts the attempt.
  RoundRobin,
  /// Each search starts from the bottom; failures become spills.
  FirstFit,
}

/// Everything the assignment phase reads.
pub struct ColorContext<'a> {
  pub lrs: &'a TypedIxVec<LrIx, LiveRange>,
  pub intf: &'a InterferenceGraph,
  pub forbidden: &'a ForbiddenRegs,
  pub opts: &'a RegAllocOptions,
  pub num_grf: u32,
  pub bank: &'a BankDecision,
  /// Honor the bank hints.
  pub use_bank_hints: bool,
}

/// A split piece as seen while placing its parent.
struct Piece {
  usage: PhyRegUsage,
  forbidden: BitSet,
  num_regs: u32,
  align: u32,
  offset: u32,
  /// Where the piece already sits, if anywhere.
  fixed: Option<u32>,
}

impl Piece {
  fn fits(&self, parent_start: u32) -> bool {
    let start = parent_start + self.offset;
    if let Some(at) = self.fixed {
      return at == start;
    }
    let req = SearchRequest::new(self.num_regs, self.align, &self.forbidden);
    self.usage.try_exact(start, &req)
  }
}

pub struct ColorOutcome {
  /// Start unit of each range in its file.
  pub assignments: TypedIxVec<LrIx, Option<u32>>,
  /// Ranges left without a register, in coloring order.
  pub spilled: Vec<LrIx>,
  /// Files where round-robin gave up and first-fit took over.
  pub fell_back: Vec<RegFile>,
}

impl<'a> ColorContext<'a> {
  fn file_size(&self, file: RegFile) -> u32 {
    self.opts.file_size(file, self.num_grf)
  }

  /// Split pieces and their parents, each with the pieces' row offsets.
  fn children(&self) -> Vec<Vec<(LrIx, u32)>> {
    let mut res = vec![vec![]; self.lrs.len() as usize];
    for (lr, range) in self.lrs.enumerate() {
      if let Some((p, off)) = range.parent {
        res[p.get_usize()].push((lr, off));
      }
    }
    res
  }

  /// Bundles a DPAS partner already colored makes undesirable for `lr`.
  fn bundles_to_avoid(
    &self, lr: LrIx, assignments: &TypedIxVec<LrIx, Option<u32>>,
  ) -> Vec<u32> {
    let mut res = vec![];
    if !self.use_bank_hints {
      return res;
    }
    for bp in self.bank.bundle_pairs.iter() {
      if bp.lr == lr {
        if let Some(t) = assignments[bp.other] {
          let r = t as i32 - bp.offset;
          if r >= 0 {
            res.push(bundle_of(r as u32));
          }
        }
      } else if bp.other == lr {
        if let Some(t) = assignments[bp.lr] {
          let r = t as i32 + bp.offset;
          if r >= 0 {
            res.push(bundle_of(r as u32));
          }
        }
      }
    }
    res
  }

  /// Where the assigned neighbors of `lr` sit.
  fn usage_for(
    &self, lr: LrIx, assignments: &TypedIxVec<LrIx, Option<u32>>,
  ) -> PhyRegUsage {
    let range = &self.lrs[lr];
    let mut usage =
      PhyRegUsage::new(range.reg_file, self.file_size(range.reg_file));
    for n in self.intf.neighbors(lr) {
      let nr = &self.lrs[*n];
      if nr.reg_file != range.reg_file {
        continue;
      }
      if let Some(start) = assignments[*n] {
        usage.mark_busy(start, nr.num_regs);
      }
    }
    for n in self.intf.weak_neighbors(lr) {
      if self.intf.interfere(lr, *n) {
        continue;
      }
      if let Some(start) = assignments[*n] {
        usage.add_weak(start, self.lrs[*n].num_regs);
      }
    }
    usage
  }

  fn assign_one(
    &self, lr: LrIx, heuristic: ColorHeuristic, rr_start: u32,
    children: &[Vec<(LrIx, u32)>],
    assignments: &TypedIxVec<LrIx, Option<u32>>,
  ) -> Option<u32> {
    let range = &self.lrs[lr];
    let file = range.reg_file;
    let size = self.file_size(file);
    let usage = self.usage_for(lr, assignments);
    let forbidden: BitSet = self.forbidden.mask_for(range, size);
    let avoid = self.bundles_to_avoid(lr, assignments);

    let mut req =
      SearchRequest::new(range.num_regs, range.unit_align(), &forbidden);
    req.one_grf_bank_division = self.opts.one_grf_bank_division;
    req.avoid_bundles = &avoid;
    if self.use_bank_hints && file == RegFile::Grf {
      req.bank = range.bank;
      req.split_halves = self.bank.high_internal_conflict;
    }
    req.start = match heuristic {
      ColorHeuristic::RoundRobin => rr_start,
      ColorHeuristic::FirstFit => 0,
    };
    if file == RegFile::Grf && range.crosses_call && self.opts.has_stack_calls
    {
      req.start = self.opts.callee_save_start(self.num_grf);
    }

    // A split family is placed as one: every piece starts at its offset
    // from the parent's start, clear of the piece's own neighbors.
    let pieces: Vec<Piece> = children[lr.get_usize()]
      .iter()
      .map(|(c, off)| self.piece(*c, *off, assignments))
      .collect();
    usage.find_with(&req, |start| pieces.iter().all(|p| p.fits(start)))
  }

  fn piece(
    &self, lr: LrIx, offset: u32,
    assignments: &TypedIxVec<LrIx, Option<u32>>,
  ) -> Piece {
    let range = &self.lrs[lr];
    let size = self.file_size(range.reg_file);
    Piece {
      usage: self.usage_for(lr, assignments),
      forbidden: self.forbidden.mask_for(range, size),
      num_regs: range.num_regs,
      align: range.unit_align(),
      offset,
      fixed: assignments[lr],
    }
  }

  /// Give `lr` and its pieces their registers.
  fn commit(
    &self, lr: LrIx, start: u32, children: &[Vec<(LrIx, u32)>],
    assignments: &mut TypedIxVec<LrIx, Option<u32>>,
  ) {
    assignments[lr] = Some(start);
    for (c, off) in children[lr.get_usize()].iter() {
      assignments[*c] = Some(start + off);
    }
    if log_enabled!(Level::Trace) {
      let range = &self.lrs[lr];
      trace!("  {:?} -> {}{}", lr, range.reg_file.prefix(), start);
    }
  }

  /// Color the ranges of one file in the reverse of `order`, each search
  /// starting after the previous assignment.  Returns the first range that
  /// found no register.  Pieces come with their parent.
  fn round_robin_file(
    &self, order: &[LrIx], assignments: &mut TypedIxVec<LrIx, Option<u32>>,
  ) -> Result<(), LrIx> {
    let children = self.children();
    let mut rr_start = 0;
    for lr in order.iter().rev() {
      let range = &self.lrs[*lr];
      if range.parent.is_some() {
        continue;
      }
      let start = self
        .assign_one(
          *lr,
          ColorHeuristic::RoundRobin,
          rr_start,
          &children,
          assignments,
        )
        .ok_or(*lr)?;
      self.commit(*lr, start, &children, assignments);
      let size = self.file_size(range.reg_file).max(1);
      rr_start = (start + range.num_regs) % size;
    }
    Ok(())
  }

  /// Color the ranges of one file in the reverse of `order`, each search
  /// starting from the bottom.  A parent that finds no register is spilled
  /// together with its pieces.
  fn first_fit_file(
    &self, order: &[LrIx], assignments: &mut TypedIxVec<LrIx, Option<u32>>,
    spilled: &mut Vec<LrIx>,
  ) {
    let children = self.children();
    for lr in order.iter().rev() {
      if self.lrs[*lr].parent.is_some() {
        continue;
      }
      match self.assign_one(
        *lr,
        ColorHeuristic::FirstFit,
        0,
        &children,
        assignments,
      ) {
        Some(start) => self.commit(*lr, start, &children, assignments),
        None => {
          spilled.push(*lr);
          for (c, _) in children[lr.get_usize()].iter() {
            if self.lrs[*c].precolored.is_none() {
              spilled.push(*c);
            }
          }
        }
      }
    }
  }
}

/// Color every register file.  With `round_robin`, each file is first
/// tried round-robin and redone first-fit if that fails.
#[inline(never)]
pub fn color_graph(ctx: &ColorContext, round_robin: bool) -> ColorOutcome {
  debug!("color_graph: begin");
  let mut assignments = TypedIxVec::<LrIx, Option<u32>>::new();
  for range in ctx.lrs.iter() {
    assignments.push(range.precolored);
  }
  for (lr, range) in ctx.lrs.enumerate() {
    if let Some((p, off)) = range.parent {
      if assignments[lr].is_none() {
        assignments[lr] = ctx.lrs[p].precolored.map(|pr| pr + off);
      }
    }
  }
  let mut spilled = vec![];
  let mut fell_back = vec![];

  for file in RegFile::all().iter().cloned() {
    let size = ctx.file_size(file);
    let order =
      determine_color_order(ctx.lrs, ctx.intf, file, size, ctx.forbidden);
    if order.is_empty() {
      continue;
    }

    if round_robin {
      let mut trial = assignments.clone();
      match ctx.round_robin_file(&order, &mut trial) {
        Ok(()) => {
          assignments = trial;
          debug!("color_graph: {:?} colored round-robin", file);
          continue;
        }
        Err(lr) => {
          info!(
            "color_graph: round-robin failed on {:?} at {:?}; first-fit",
            file, lr
          );
          fell_back.push(file);
        }
      }
    }

    let before = spilled.len();
    ctx.first_fit_file(&order, &mut assignments, &mut spilled);
    debug!(
      "color_graph: {:?}: {} ranges, {} spilled",
      file,
      order.len(),
      spilled.len() - before
    );
  }

  info!(
    "color_graph: {} ranges, {} spilled",
    ctx.lrs.len(),
    spilled.len()
  );
  debug!("color_graph: end");
  ColorOutcome { assignments, spilled, fell_back }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::data_structures::DeclIx;
  use crate::interface::DEFAULT_DENSE_MATRIX_LIMIT;

  fn opts(num_grf: u32) -> RegAllocOptions {
    let mut o = RegAllocOptions::default();
    o.num_grf = num_grf;
    o.max_num_grf = num_grf;
    o.reserve_r0 = false;
    o.eot_grf_binding = false;
    o
  }

  fn grf(n: u32, num_regs: u32) -> LiveRange {
    LiveRange::new(DeclIx::new(n), RegFile::Grf, num_regs)
  }

  fn graph(n: u32, edges: &[(u32, u32)]) -> InterferenceGraph {
    let mut g = InterferenceGraph::new(n, DEFAULT_DENSE_MATRIX_LIMIT);
    for (a, b) in edges {
      g.add_edge(LrIx::new(*a), LrIx::new(*b));
    }
    g.finalize();
    g
  }

  fn color(
    lrs: &mut TypedIxVec<LrIx, LiveRange>, g: &InterferenceGraph,
    o: &RegAllocOptions, round_robin: bool,
  ) -> ColorOutcome {
    compute_degrees(lrs, g);
    compute_spill_costs(lrs, o);
    let forbidden = ForbiddenRegs::new(o, o.num_grf, false);
    let bank = BankDecision::default();
    let ctx = ColorContext {
      lrs: &*lrs,
      intf: g,
      forbidden: &forbidden,
      opts: o,
      num_grf: o.num_grf,
      bank: &bank,
      use_bank_hints: false,
    };
    color_graph(&ctx, round_robin)
  }

  fn check_valid(
    lrs: &TypedIxVec<LrIx, LiveRange>, g: &InterferenceGraph,
    out: &ColorOutcome,
  ) {
    for (a, b) in g.edges() {
      if let (Some(x), Some(y)) = (out.assignments[a], out.assignments[b]) {
        let (na, nb) = (lrs[a].num_regs, lrs[b].num_regs);
        assert!(x + na <= y || y + nb <= x, "{:?} and {:?} overlap", a, b);
      }
    }
    for (lr, range) in lrs.enumerate() {
      if let Some(x) = out.assignments[lr] {
        assert_eq!(x % range.unit_align(), 0);
      }
    }
  }

  #[test]
  fn grf_edge_weights() {
    use GrfAlign::*;
    assert_eq!(edge_weight_grf(2, Either, 3, Quad), 4);
    assert_eq!(edge_weight_grf(1, Even, 1, Either), 3);
    assert_eq!(edge_weight_grf(2, Even, 1, Either), 3);
    assert_eq!(edge_weight_grf(2, Even, 2, Even), 3);
    assert_eq!(edge_weight_grf(1, Even, 1, Even), 3);
    assert_eq!(edge_weight_grf(2, Even, 2, Quad), 3);
    assert_eq!(edge_weight_grf(1, Quad, 1, Either), 3);
    assert_eq!(edge_weight_grf(3, Quad, 2, Either), 7);
    assert_eq!(edge_weight_grf(1, Quad, 1, Even), 2);
    assert_eq!(edge_weight_grf(4, Quad, 1, Even), 5);
    assert_eq!(edge_weight_grf(4, Quad, 4, Quad), 7);
    assert_eq!(edge_weight_grf(3, Quad, 1, Quad), 7);
  }

  #[test]
  fn sub_register_edge_weights() {
    use SubRegAlign::*;
    assert_eq!(edge_weight_sub(1, Any, 2, EvenWord), 2);
    assert_eq!(edge_weight_sub(1, EvenWord, 2, Any), 3);
    assert_eq!(edge_weight_sub(2, EvenWord, 2, EvenWord), 2);
    assert_eq!(edge_weight_sub(1, EvenWord, 2, EvenWord), 3);
    assert_eq!(edge_weight_sub(2, FourWord, 1, Any), 3);
    assert_eq!(edge_weight_sub(4, FourWord, 4, FourWord), 7);
    assert_eq!(edge_weight_sub(1, EightWord, 1, Any), 7);
    assert_eq!(edge_weight_sub(2, EightWord, 4, FourWord), 7);
    assert_eq!(edge_weight_sub(8, EightWord, 4, FourWord), 11);
    assert_eq!(edge_weight_sub(8, EightWord, 8, EightWord), 15);
  }

  #[test]
  fn degree_is_sum_of_weights() {
    let mut lrs = TypedIxVec::from_vec(vec![grf(0, 2), grf(1, 1), grf(2, 3)]);
    lrs[LrIx::new(0)].align = GrfAlign::Even;
    let g = graph(3, &[(0, 1), (0, 2)]);
    compute_degrees(&mut lrs, &g);
    assert_eq!(lrs[LrIx::new(0)].degree, 3 + 5);
    assert_eq!(lrs[LrIx::new(1)].degree, 2);
    assert_eq!(lrs[LrIx::new(2)].degree, 4);
  }

  #[test]
  fn removal_relaxes_by_edge_weight() {
    let mut lrs =
      TypedIxVec::from_vec(vec![grf(0, 2), grf(1, 1), grf(2, 3), grf(3, 1)]);
    lrs[LrIx::new(1)].align = GrfAlign::Quad;
    let g = graph(4, &[(0, 1), (0, 2), (1, 2), (2, 3)]);
    compute_degrees(&mut lrs, &g);
    let o = opts(4);
    let forbidden = ForbiddenRegs::new(&o, 4, false);
    let mut simp = Simplifier::new(&lrs, &g, RegFile::Grf, 4, &forbidden);
    let x = LrIx::new(2);
    let before: Vec<u32> =
      lrs.range().into_iter().map(|lr| simp.degree(lr)).collect();
    simp.remove(x);
    for n in [0u32, 1, 3].iter().map(|n| LrIx::new(*n)) {
      let w = edge_weight(&lrs[n], &lrs[x]);
      assert_eq!(simp.degree(n), before[n.get_usize()] - w);
    }
  }

  #[test]
  fn spill_cost_overrides() {
    let o = opts(8);
    let mut lr = grf(0, 1);
    assert_eq!(spill_cost(&lr, &o), 0.0);
    lr.num_refs = 2;
    lr.weighted_refs = 4;
    lr.degree = 2;
    assert_eq!(spill_cost(&lr, &o), 16.0);
    lr.flags.spill_temp = true;
    assert_eq!(spill_cost(&lr, &o), MAXSPILLCOST);
    let mut lr = grf(1, 1);
    lr.flags.force_spill = true;
    lr.num_refs = 5;
    assert_eq!(spill_cost(&lr, &o), MINSPILLCOST);

    let mut legacy = o.clone();
    legacy.use_new_spill_cost = false;
    let mut lr = grf(2, 1);
    lr.num_refs = 1;
    lr.weighted_refs = 1;
    lr.degree = 4;
    // 1 * 32 * sqrt(32) / 2
    let want = 32.0 * 32f32.sqrt() / 2.0;
    assert!((spill_cost(&lr, &legacy) - want).abs() < 1e-3);
  }

  #[test]
  fn address_sensitive_ranges_outrank_others() {
    let o = opts(8);
    let mut lrs = TypedIxVec::from_vec(vec![grf(0, 1), grf(1, 1)]);
    lrs[LrIx::new(0)].num_refs = 10;
    lrs[LrIx::new(0)].weighted_refs = 100;
    lrs[LrIx::new(1)].num_refs = 1;
    lrs[LrIx::new(1)].weighted_refs = 1;
    lrs[LrIx::new(1)].address_sensitive = true;
    compute_spill_costs(&mut lrs, &o);
    assert!(lrs[LrIx::new(1)].spill_cost > lrs[LrIx::new(0)].spill_cost);
  }

  #[test]
  fn low_degree_graph_colors_without_spills() {
    // A 5-cycle needs 3 colors; each node has degree 2.
    let mut lrs = TypedIxVec::from_vec((0..5).map(|i| grf(i, 1)).collect());
    let g = graph(5, &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 0)]);
    let o = opts(3);
    let out = color(&mut lrs, &g, &o, false);
    assert!(out.spilled.is_empty());
    check_valid(&lrs, &g, &out);
  }

  #[test]
  fn cheapest_range_is_spilled() {
    // K4 in three registers: exactly one goes, and it is the cheapest.
    let mut lrs = TypedIxVec::from_vec((0..4).map(|i| grf(i, 1)).collect());
    for (i, lr) in lrs.iter_mut().enumerate() {
      lr.num_refs = 1;
      lr.weighted_refs = if i == 2 { 1 } else { 10 };
    }
    let g = graph(4, &[(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]);
    let o = opts(3);
    let out = color(&mut lrs, &g, &o, false);
    assert_eq!(out.spilled, vec![LrIx::new(2)]);
    check_valid(&lrs, &g, &out);
  }

  #[test]
  fn every_range_is_colored_or_spilled() {
    let mut lrs =
      TypedIxVec::from_vec((0..6).map(|i| grf(i, 1 + i % 3)).collect());
    let mut edges = vec![];
    for a in 0..6 {
      for b in a + 1..6 {
        edges.push((a, b));
      }
    }
    let g = graph(6, &edges);
    let o = opts(6);
    let out = color(&mut lrs, &g, &o, true);
    for lr in lrs.range() {
      assert!(out.assignments[lr].is_some() != out.spilled.contains(&lr));
    }
    check_valid(&lrs, &g, &out);
  }

  #[test]
  fn round_robin_aborts_where_first_fit_succeeds() {
    // x and y do not interfere; z interferes with both.  Round-robin puts
    // y after x and leaves z only a single free register.
    let mut lrs = TypedIxVec::from_vec(vec![grf(0, 1), grf(1, 2), grf(2, 2)]);
    lrs[LrIx::new(1)].align = GrfAlign::Even;
    let g = graph(3, &[(0, 2), (1, 2)]);
    let o = opts(4);
    compute_degrees(&mut lrs, &g);
    compute_spill_costs(&mut lrs, &o);
    let forbidden = ForbiddenRegs::new(&o, 4, false);
    let bank = BankDecision::default();
    let ctx = ColorContext {
      lrs: &lrs,
      intf: &g,
      forbidden: &forbidden,
      opts: &o,
      num_grf: 4,
      bank: &bank,
      use_bank_hints: false,
    };
    let order = vec![LrIx::new(2), LrIx::new(1), LrIx::new(0)];

    let mut rr = TypedIxVec::from_vec(vec![None; 3]);
    assert_eq!(ctx.round_robin_file(&order, &mut rr), Err(LrIx::new(2)));

    let mut ff = TypedIxVec::from_vec(vec![None; 3]);
    let mut spilled = vec![];
    ctx.first_fit_file(&order, &mut ff, &mut spilled);
    assert!(spilled.is_empty());
    assert_eq!(ff.elems(), &[Some(0), Some(0), Some(2)]);
  }

  #[test]
  fn precolored_neighbors_are_respected() {
    let mut lrs = TypedIxVec::from_vec(vec![grf(0, 2), grf(1, 2)]);
    lrs[LrIx::new(0)].precolored = Some(0);
    let g = graph(2, &[(0, 1)]);
    let o = opts(4);
    let out = color(&mut lrs, &g, &o, false);
    assert_eq!(out.assignments[LrIx::new(0)], Some(0));
    assert_eq!(out.assignments[LrIx::new(1)], Some(2));
  }

  #[test]
  fn split_piece_follows_parent() {
    // The parent is removed last, so it is colored first.
    let mut lrs = TypedIxVec::from_vec(vec![grf(0, 2), grf(1, 4)]);
    lrs[LrIx::new(0)].parent = Some((LrIx::new(1), 2));
    let g = graph(2, &[]);
    let o = opts(8);
    let out = color(&mut lrs, &g, &o, false);
    let p = out.assignments[LrIx::new(1)].unwrap();
    assert_eq!(out.assignments[LrIx::new(0)], Some(p + 2));
  }

  // big: two registers; lo and hi: its halves; x: interferes with hi.
  fn split_family() -> (TypedIxVec<LrIx, LiveRange>, InterferenceGraph) {
    let mut lrs =
      TypedIxVec::from_vec(vec![grf(0, 2), grf(1, 1), grf(2, 1), grf(3, 1)]);
    lrs[LrIx::new(1)].parent = Some((LrIx::new(0), 0));
    lrs[LrIx::new(2)].parent = Some((LrIx::new(0), 1));
    for lr in lrs.iter_mut() {
      lr.num_refs = 2;
      lr.weighted_refs = 2;
    }
    (lrs, graph(4, &[(2, 3)]))
  }

  #[test]
  fn split_pieces_sit_inside_their_parent() {
    for round_robin in [false, true].iter() {
      let (mut lrs, g) = split_family();
      let o = opts(3);
      let out = color(&mut lrs, &g, &o, *round_robin);
      assert!(out.spilled.is_empty());
      check_valid(&lrs, &g, &out);
      let big = out.assignments[LrIx::new(0)].unwrap();
      assert_eq!(out.assignments[LrIx::new(1)], Some(big));
      assert_eq!(out.assignments[LrIx::new(2)], Some(big + 1));
    }
  }

  #[test]
  fn blocked_split_family_is_spilled_whole() {
    // With x pinned to r1, hi can't sit at big+1 anywhere in two registers.
    let (mut lrs, g) = split_family();
    lrs[LrIx::new(3)].precolored = Some(1);
    let o = opts(2);
    let out = color(&mut lrs, &g, &o, false);
    let mut spilled = out.spilled.clone();
    spilled.sort();
    assert_eq!(spilled, vec![LrIx::new(0), LrIx::new(1), LrIx::new(2)]);
    for lr in 0..3 {
      assert_eq!(out.assignments[LrIx::new(lr)], None);
    }
  }

  #[test]
  fn planted_colorings() {
    // Random graphs with a planted 4-coloring, sparse enough to color.
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move || {
      seed ^= seed << 13;
      seed ^= seed >> 7;
      seed ^= seed << 17;
      seed
    };
    for _ in 0..20 {
      let n = 24u32;
      let k = 4u64;
      let class: Vec<u64> = (0..n).map(|_| next() % k).collect();
      let mut edges = vec![];
      for a in 0..n {
        for b in a + 1..n {
          if class[a as usize] != class[b as usize] && next() % 8 == 0 {
            edges.push((a, b));
          }
        }
      }
      let mut lrs = TypedIxVec::from_vec((0..n).map(|i| grf(i, 1)).collect());
      for lr in lrs.iter_mut() {
        lr.num_refs = 1;
        lr.weighted_refs = 1;
      }
      let g = graph(n, &edges);
      let o = opts(8);
      let out = color(&mut lrs, &g, &o, false);
      check_valid(&lrs, &g, &out);
      for lr in lrs.range() {
        assert!(out.assignments[lr].is_some() != out.spilled.contains(&lr));
      }
    }
  }
}
