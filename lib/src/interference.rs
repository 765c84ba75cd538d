/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

#![allow(non_snake_case)]

//! The interference graph.  Edges are kept in a matrix whose representation
//! (a packed upper-triangle bit matrix, or hashed rows) is picked once from
//! the number of variables; adjacency lists are materialized once all edges
//! are in.  Weak edges, which only constrain placement, live on the side.

use log::{debug, info, log_enabled, trace, Level};

use crate::analysis::{AnalysisError, FlowInfo};
use crate::augmentation::{augment_interference, AugmentationState};
use crate::bit_set::BitSet;
use crate::data_structures::{FuncIx, InstIx, LrIx, Map, Set, TypedIxVec};
use crate::interface::{InstKind, Kernel, RegAllocOptions, RegFile};
use crate::live_range::{create_live_ranges, ForbiddenKind, LiveRange};

//=============================================================================
// Edge storage

/// Storage for a symmetric, irreflexive relation over `0 .. n`.  Callers
/// always pass `a < b`.
pub trait IntfMatrix {
  fn contains(&self, a: u32, b: u32) -> bool;
  /// Returns true if the edge is new.
  fn insert(&mut self, a: u32, b: u32) -> bool;
  fn remove(&mut self, a: u32, b: u32);
  /// Every `x` with an edge to `a`, in increasing order.
  fn neighbors(&self, a: u32) -> Vec<u32>;
}

/// Packed upper triangle: row `i` holds the bits for `i+1 .. n`.
pub struct DenseMatrix {
  n: u32,
  bits: BitSet,
}

impl DenseMatrix {
  pub fn new(n: u32) -> Self {
    let n64 = n as usize;
    Self { n, bits: BitSet::new(n64 * n64.saturating_sub(1) / 2) }
  }

  #[inline]
  fn index(&self, a: u32, b: u32) -> usize {
    debug_assert!(a < b && b < self.n);
    let (a, b, n) = (a as usize, b as usize, self.n as usize);
    a * n - a * (a + 1) / 2 + (b - a - 1)
  }
}

impl IntfMatrix for DenseMatrix {
  fn contains(&self, a: u32, b: u32) -> bool {
    self.bits.contains(self.index(a, b))
  }
  fn insert(&mut self, a: u32, b: u32) -> bool {
    let ix = self.index(a, b);
    let new = !self.bits.contains(ix);
    self.bits.insert(ix);
    new
  }
  fn remove(&mut self, a: u32, b: u32) {
    let ix = self.index(a, b);
    self.bits.delete(ix);
  }
  fn neighbors(&self, a: u32) -> Vec<u32> {
    let mut res = Vec::new();
    for x in 0..a {
      if self.contains(x, a) {
        res.push(x);
      }
    }
    for x in a + 1..self.n {
      if self.contains(a, x) {
        res.push(x);
      }
    }
    res
  }
}

/// Hashed rows, stored in both directions.
pub struct SparseMatrix {
  rows: Vec<Set<u32>>,
}

impl SparseMatrix {
  pub fn new(n: u32) -> Self {
    Self { rows: (0..n).map(|_| Set::empty()).collect() }
  }
}

impl IntfMatrix for SparseMatrix {
  fn contains(&self, a: u32, b: u32) -> bool {
    self.rows[a as usize].contains(b)
  }
  fn insert(&mut self, a: u32, b: u32) -> bool {
    if self.rows[a as usize].contains(b) {
      return false;
    }
    self.rows[a as usize].insert(b);
    self.rows[b as usize].insert(a);
    true
  }
  fn remove(&mut self, a: u32, b: u32) {
    self.rows[a as usize].delete(b);
    self.rows[b as usize].delete(a);
  }
  fn neighbors(&self, a: u32) -> Vec<u32> {
    self.rows[a as usize].to_vec()
  }
}

//=============================================================================
// The graph

pub struct InterferenceGraph {
  num_vars: u32,
  dense: bool,
  matrix: Box<dyn IntfMatrix>,
  num_edges: u32,
  adj: TypedIxVec<LrIx, Vec<LrIx>>,
  weak: Map<LrIx, Vec<LrIx>>,
}

impl InterferenceGraph {
  pub fn new(num_vars: u32, dense_matrix_limit: u32) -> Self {
    let dense = num_vars <= dense_matrix_limit;
    let matrix: Box<dyn IntfMatrix> = if dense {
      Box::new(DenseMatrix::new(num_vars))
    } else {
      Box::new(SparseMatrix::new(num_vars))
    };
    let mut adj = TypedIxVec::new();
    adj.resize(num_vars, vec![]);
    Self { num_vars, dense, matrix, num_edges: 0, adj, weak: Map::default() }
  }

  pub fn num_vars(&self) -> u32 {
    self.num_vars
  }

  pub fn is_dense(&self) -> bool {
    self.dense
  }

  pub fn num_edges(&self) -> u32 {
    self.num_edges
  }

  fn order(a: LrIx, b: LrIx) -> (u32, u32) {
    if a < b {
      (a.get(), b.get())
    } else {
      (b.get(), a.get())
    }
  }

  pub fn interfere(&self, a: LrIx, b: LrIx) -> bool {
    if a == b {
      return false;
    }
    let (x, y) = Self::order(a, b);
    self.matrix.contains(x, y)
  }

  /// Add an edge with no questions asked, other than refusing self-edges.
  pub fn add_edge(&mut self, a: LrIx, b: LrIx) {
    if a == b {
      return;
    }
    let (x, y) = Self::order(a, b);
    if self.matrix.insert(x, y) {
      self.num_edges += 1;
    }
  }

  pub fn remove_edge(&mut self, a: LrIx, b: LrIx) {
    if self.interfere(a, b) {
      let (x, y) = Self::order(a, b);
      self.matrix.remove(x, y);
      self.num_edges -= 1;
    }
  }

  /// Record that `a` and `b` may share storage only from the same start
  /// register.
  pub fn add_weak_edge(&mut self, a: LrIx, b: LrIx) {
    if a == b || self.has_weak_edge(a, b) {
      return;
    }
    self.weak.entry(a).or_insert_with(Vec::new).push(b);
    self.weak.entry(b).or_insert_with(Vec::new).push(a);
  }

  pub fn has_weak_edge(&self, a: LrIx, b: LrIx) -> bool {
    self.weak.get(&a).map_or(false, |v| v.contains(&b))
  }

  pub fn weak_neighbors(&self, lr: LrIx) -> &[LrIx] {
    self.weak.get(&lr).map(|v| &v[..]).unwrap_or(&[])
  }

  pub fn num_weak_edges(&self) -> usize {
    self.weak.values().map(|v| v.len()).sum::<usize>() / 2
  }

  /// Neighbors of `lr`.  Only meaningful after `finalize`.
  pub fn neighbors(&self, lr: LrIx) -> &[LrIx] {
    &self.adj[lr]
  }

  pub fn for_each_neighbor<F: FnMut(LrIx)>(&self, lr: LrIx, mut f: F) {
    for n in self.adj[lr].iter() {
      f(*n);
    }
  }

  /// Materialize the adjacency lists from the matrix.
  pub fn finalize(&mut self) {
    for i in 0..self.num_vars {
      let ns = self.matrix.neighbors(i).into_iter().map(LrIx::new).collect();
      self.adj[LrIx::new(i)] = ns;
    }
  }

  /// Every edge `(a, b)` with `a < b`, sorted.
  pub fn edges(&self) -> Vec<(LrIx, LrIx)> {
    let mut res = vec![];
    for i in 0..self.num_vars {
      for j in self.matrix.neighbors(i) {
        if i < j {
          res.push((LrIx::new(i), LrIx::new(j)));
        }
      }
    }
    res
  }

  pub fn degree_unweighted(&self, lr: LrIx) -> usize {
    self.adj[lr].len()
  }
}

//=============================================================================
// Families: a split parent and its pieces share storage by construction and
// must never interfere with each other.

fn family_root(lrs: &TypedIxVec<LrIx, LiveRange>, lr: LrIx) -> LrIx {
  match lrs[lr].parent {
    Some((p, _)) => p,
    None => lr,
  }
}

pub fn same_family(
  lrs: &TypedIxVec<LrIx, LiveRange>, a: LrIx, b: LrIx,
) -> bool {
  let (ra, rb) = (family_root(lrs, a), family_root(lrs, b));
  ra == rb && (lrs[a].parent.is_some() || lrs[b].parent.is_some())
}

/// Add `a`-`b` unless they can never compete for registers.
pub fn check_and_add_edge(
  intf: &mut InterferenceGraph, lrs: &TypedIxVec<LrIx, LiveRange>, a: LrIx,
  b: LrIx,
) {
  if a == b || lrs[a].reg_file != lrs[b].reg_file || same_family(lrs, a, b)
  {
    return;
  }
  intf.add_edge(a, b);
}

/// Remove any parent/child and sibling edges that slipped in.
pub fn clear_family_edges(
  intf: &mut InterferenceGraph, lrs: &TypedIxVec<LrIx, LiveRange>,
) {
  let mut children = Map::<LrIx, Vec<LrIx>>::default();
  for (lr, r) in lrs.enumerate() {
    if let Some((p, _)) = r.parent {
      children.entry(p).or_insert_with(Vec::new).push(lr);
    }
  }
  for (p, kids) in children.iter() {
    for (i, c) in kids.iter().enumerate() {
      intf.remove_edge(*p, *c);
      for d in kids[i + 1..].iter() {
        intf.remove_edge(*c, *d);
      }
    }
  }
}

//=============================================================================
// Construction from liveness

/// Variables live across one call, for the callee-save bias and for the
/// may-def edges added by augmentation.
#[derive(Clone, Debug)]
pub struct CallSite {
  pub inst: InstIx,
  pub callee: FuncIx,
  pub live_across: BitSet,
}

/// Build the graph for one attempt.  Per block, the live set is seeded with
/// live-out ∩ def-out and instructions are walked bottom-up: a definition
/// interferes with everything live below it, then each read makes its
/// variable live.
#[inline(never)]
pub fn compute_interference<K: Kernel>(
  kernel: &K, flow: &FlowInfo, lrs: &mut TypedIxVec<LrIx, LiveRange>,
  opts: &RegAllocOptions, aug_state: &mut AugmentationState,
) -> (InterferenceGraph, Vec<CallSite>) {
  debug!("compute_interference: begin");
  let nVars = flow.num_vars();
  let mut intf = InterferenceGraph::new(nVars, opts.dense_matrix_limit);
  let mut calls = Vec::<CallSite>::new();
  let lv = &flow.liveness;

  for bix in kernel.blocks() {
    let mut live = lv.live_out[bix].clone();
    live.intersect(&lv.def_out[bix]);

    let insts: Vec<InstIx> = kernel.block_insts(bix).into_iter().collect();
    for iix in insts.into_iter().rev() {
      let info = &flow.infos[iix];
      let r = &flow.refs[iix];

      // === Definitions ===
      for (i, (d, _)) in r.defs.iter().enumerate() {
        for l in live.iter() {
          check_and_add_edge(&mut intf, lrs, *d, LrIx::new(l as u32));
        }
        // Two values written by one instruction land at once.
        for (e, _) in r.defs[i + 1..].iter() {
          check_and_add_edge(&mut intf, lrs, *d, *e);
        }
      }

      if let InstKind::Call { callee, pseudo } = info.kind {
        let mut across = live.clone();
        for (d, _) in r.defs.iter() {
          across.delete(d.get_usize());
        }
        if callee.get() < flow.maydefs.len() {
          across.remove(&flow.maydefs[callee]);
        }
        if let Some(vca) = pseudo.and_then(|p| flow.vars.lr_of(p)) {
          for l in across.iter() {
            check_and_add_edge(&mut intf, lrs, vca, LrIx::new(l as u32));
          }
        }
        for l in across.iter() {
          lrs[LrIx::new(l as u32)].crosses_call = true;
        }
        calls.push(CallSite { inst: iix, callee, live_across: across });
      }

      for (d, kills) in r.defs.iter() {
        if *kills {
          live.delete(d.get_usize());
        }
      }

      // === Operand overlap hazards ===
      let dst_lr = info.dst.and_then(|op| flow.vars.lr_of(op.decl));
      let src_lr = |n: usize| info.src(n).and_then(|op| flow.vars.lr_of(op.decl));
      match info.kind {
        InstKind::Send { split } => {
          if let Some(d) = dst_lr {
            for n in 0..info.srcs.len() {
              if let Some(s) = src_lr(n) {
                check_and_add_edge(&mut intf, lrs, d, s);
              }
            }
          }
          if split {
            if let (Some(a), Some(b)) = (src_lr(0), src_lr(1)) {
              check_and_add_edge(&mut intf, lrs, a, b);
            }
          }
          if info.eot && opts.eot_grf_binding {
            for n in 0..info.srcs.len() {
              if let Some(s) = src_lr(n) {
                if lrs[s].reg_file == RegFile::Grf {
                  lrs[s].eot_src = true;
                  lrs[s].add_forbidden(ForbiddenKind::Eot);
                }
              }
            }
          }
        }
        InstKind::Dpas => {
          if let (Some(d), Some(s1)) = (dst_lr, src_lr(1)) {
            check_and_add_edge(&mut intf, lrs, d, s1);
          }
        }
        _ => {}
      }

      // === Uses ===
      for u in r.uses.iter() {
        live.insert(u.get_usize());
      }
      if log_enabled!(Level::Trace) {
        trace!("  {:?}: live above {:?}", iix, live);
      }
    }
  }

  // Everything live into the kernel arrives together.
  let entry_live: Vec<usize> =
    lv.live_in[kernel.entry_block()].iter().collect();
  for (i, a) in entry_live.iter().enumerate() {
    for b in entry_live[i + 1..].iter() {
      check_and_add_edge(
        &mut intf,
        lrs,
        LrIx::new(*a as u32),
        LrIx::new(*b as u32),
      );
    }
  }

  // Outputs are all read after the kernel ends.
  let decls = kernel.declares();
  let outputs: Vec<LrIx> = flow
    .vars
    .vars
    .enumerate()
    .filter(|(_, d)| decls[d.get_usize()].flags.output)
    .map(|(lr, _)| lr)
    .collect();
  for (i, a) in outputs.iter().enumerate() {
    for b in outputs[i + 1..].iter() {
      check_and_add_edge(&mut intf, lrs, *a, *b);
    }
  }

  if opts.augmentation {
    let divergent =
      kernel.blocks().into_iter().any(|b| kernel.block_divergent(b));
    augment_interference(
      kernel, flow, lrs, &mut intf, &calls, aug_state, divergent,
    );
  }

  clear_family_edges(&mut intf, lrs);
  intf.finalize();

  info!(
    "interference: {} vars, {} edges, {} weak edges, {}",
    nVars,
    intf.num_edges(),
    intf.num_weak_edges(),
    if intf.is_dense() { "dense" } else { "sparse" }
  );
  debug!("compute_interference: end");
  (intf, calls)
}

/// The graph a first attempt at allocating `kernel` would color, with the
/// analyses it is expressed over.
pub fn interference_for_kernel<K: Kernel>(
  kernel: &K, opts: &RegAllocOptions,
) -> Result<
  (FlowInfo, TypedIxVec<LrIx, LiveRange>, InterferenceGraph),
  AnalysisError,
> {
  let flow = FlowInfo::compute(kernel, &Set::empty(), opts)?;
  let mut lrs = create_live_ranges(
    kernel,
    &flow.vars,
    &flow.sums,
    opts,
    opts.num_grf,
    false,
  );
  let mut aug = AugmentationState::new();
  aug.begin_attempt(opts.num_grf, &Set::empty(), false);
  let (intf, _) = compute_interference(kernel, &flow, &mut lrs, opts, &mut aug);
  Ok((flow, lrs, intf))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::data_structures::DeclIx;

  fn lr(n: u32) -> LrIx {
    LrIx::new(n)
  }

  fn ranges(n: u32) -> TypedIxVec<LrIx, LiveRange> {
    let mut lrs = TypedIxVec::new();
    for i in 0..n {
      lrs.push(LiveRange::new(DeclIx::new(i), RegFile::Grf, 1));
    }
    lrs
  }

  #[test]
  fn dense_index_is_a_bijection() {
    let m = DenseMatrix::new(7);
    let mut seen = vec![];
    for a in 0..7 {
      for b in a + 1..7 {
        seen.push(m.index(a, b));
      }
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen, (0..21).collect::<Vec<_>>());
  }

  #[test]
  fn symmetric_and_irreflexive() {
    for limit in &[100, 0] {
      let mut g = InterferenceGraph::new(5, *limit);
      g.add_edge(lr(3), lr(1));
      g.add_edge(lr(1), lr(3));
      g.add_edge(lr(2), lr(2));
      g.add_edge(lr(0), lr(4));
      assert_eq!(g.num_edges(), 2);
      assert!(g.interfere(lr(1), lr(3)) && g.interfere(lr(3), lr(1)));
      assert!(!g.interfere(lr(2), lr(2)));
      g.finalize();
      assert_eq!(g.neighbors(lr(4)), &[lr(0)]);
      assert_eq!(g.edges(), vec![(lr(0), lr(4)), (lr(1), lr(3))]);
      g.remove_edge(lr(3), lr(1));
      assert!(!g.interfere(lr(1), lr(3)));
      assert_eq!(g.num_edges(), 1);
    }
  }

  #[test]
  fn dense_and_sparse_agree() {
    let mut d = InterferenceGraph::new(40, 40);
    let mut s = InterferenceGraph::new(40, 39);
    assert!(d.is_dense() && !s.is_dense());
    for i in 0..40u32 {
      for j in 0..40u32 {
        if (i * 7 + j * 13) % 11 == 0 {
          d.add_edge(lr(i), lr(j));
          s.add_edge(lr(i), lr(j));
        }
      }
    }
    d.finalize();
    s.finalize();
    assert_eq!(d.edges(), s.edges());
    assert_eq!(d.num_edges(), s.num_edges());
    for i in 0..40 {
      assert_eq!(d.neighbors(lr(i)), s.neighbors(lr(i)));
    }
  }

  #[test]
  fn family_edges_never_survive() {
    let mut lrs = ranges(5);
    lrs[lr(1)].parent = Some((lr(0), 0));
    lrs[lr(2)].parent = Some((lr(0), 1));
    lrs[lr(4)].reg_file = RegFile::Flag;
    let mut g = InterferenceGraph::new(5, 100);
    for a in 0..5 {
      for b in 0..5 {
        check_and_add_edge(&mut g, &lrs, lr(a), lr(b));
      }
    }
    assert!(!g.interfere(lr(0), lr(1)));
    assert!(!g.interfere(lr(0), lr(2)));
    assert!(!g.interfere(lr(1), lr(2)));
    assert!(g.interfere(lr(1), lr(3)));
    // Different register files never compete.
    assert!(!g.interfere(lr(3), lr(4)));

    // Raw edges added behind the family check's back are cleared.
    g.add_edge(lr(0), lr(2));
    g.add_edge(lr(1), lr(2));
    clear_family_edges(&mut g, &lrs);
    assert!(!g.interfere(lr(0), lr(2)));
    assert!(!g.interfere(lr(1), lr(2)));
  }

  #[test]
  fn weak_edges_are_symmetric() {
    let mut g = InterferenceGraph::new(3, 100);
    g.add_weak_edge(lr(0), lr(2));
    g.add_weak_edge(lr(2), lr(0));
    assert!(g.has_weak_edge(lr(2), lr(0)));
    assert_eq!(g.weak_neighbors(lr(0)), &[lr(2)]);
    assert_eq!(g.num_weak_edges(), 1);
    assert!(!g.interfere(lr(0), lr(2)));
  }
}
