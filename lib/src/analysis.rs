/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

#![allow(non_snake_case)]

//! Flow-graph and liveness analysis for a kernel: predecessor/successor
//! maps, dominators, loop depths and back edges, the canonical variable
//! table, and per-block use/def/live-in/live-out sets.

use std::fmt;

use log::{debug, log_enabled, trace, Level};
use smallvec::SmallVec;

use crate::bit_set::BitSet;
use crate::data_structures::{
  BlockIx, DeclIx, FuncIx, InstIx, LrIx, Queue, Set, TypedIxVec,
};
use crate::interface::{
  Declare, GrfAlign, InstInfo, InstKind, Kernel, Operand, RegFile, RegAllocOptions, SubRegAlign, MAX_LOOP_WEIGHT_NEST,
};

#[derive(Clone, Debug)]
pub enum AnalysisError {
  /// The kernel has no blocks.
  EmptyKernel,

  /// A block's instruction range or successor list points outside the
  /// kernel.
  BadBlock(BlockIx),

  /// A declare is internally inconsistent.
  BadDeclare { decl: DeclIx, reason: String },

  /// An instruction names a declare that doesn't exist, or reaches past its
  /// end.
  BadOperand { inst: InstIx, decl: DeclIx },

  /// Following alias links from this declare never reaches a root.
  AliasCycle(DeclIx),
}

impl fmt::Display for AnalysisError {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    match self {
      AnalysisError::EmptyKernel => write!(fmt, "kernel has no blocks"),
      AnalysisError::BadBlock(bix) => write!(
        fmt,
        "block {:?} refers to instructions or blocks that don't exist",
        bix
      ),
      AnalysisError::BadDeclare { decl, reason } => {
        write!(fmt, "declare {:?} is malformed: {}", decl, reason)
      }
      AnalysisError::BadOperand { inst, decl } => write!(
        fmt,
        "instruction {:?} mentions declare {:?} out of bounds",
        inst, decl
      ),
      AnalysisError::AliasCycle(decl) => {
        write!(fmt, "alias chain starting at declare {:?} is cyclic", decl)
      }
    }
  }
}

//=============================================================================
// Up-front validation of the client's kernel.  Anything caught here is an
// upstream contract violation; it is reported rather than asserted so that
// the fuzzer can feed us garbage.

fn validate_declares(decls: &[Declare]) -> Result<(), AnalysisError> {
  let n = decls.len() as u32;
  for (i, d) in decls.iter().enumerate() {
    let dix = DeclIx::new(i as u32);
    let bad = |reason: &str| AnalysisError::BadDeclare {
      decl: dix,
      reason: reason.to_string(),
    };
    if d.num_elems == 0 {
      return Err(bad("zero elements"));
    }
    if d.reg_file != RegFile::Grf && d.align != GrfAlign::Either {
      return Err(bad("register alignment on a non-GRF declare"));
    }
    if !d.reg_file.is_word_granular() && d.sub_align != SubRegAlign::Any {
      return Err(bad("word alignment on a register-granular declare"));
    }
    if let Some((base, off)) = d.alias {
      if base.get() >= n || base == dix {
        return Err(bad("alias base out of range"));
      }
      let b = &decls[base.get_usize()];
      if b.reg_file != d.reg_file {
        return Err(bad("alias crosses register files"));
      }
      if off + d.byte_size() > b.byte_size() {
        return Err(bad("alias reaches past its base"));
      }
      if d.split_parent.is_some() || d.precolored.is_some() || d.is_pseudo() {
        return Err(bad("alias with its own storage attributes"));
      }
    }
    if let Some((parent, off)) = d.split_parent {
      if parent.get() >= n || parent == dix {
        return Err(bad("split parent out of range"));
      }
      let p = &decls[parent.get_usize()];
      if p.reg_file != RegFile::Grf || d.reg_file != RegFile::Grf {
        return Err(bad("split of a non-GRF declare"));
      }
      if p.alias.is_some() || p.split_parent.is_some() {
        return Err(bad("split parent is itself derived"));
      }
      if off + d.byte_size() > p.byte_size() {
        return Err(bad("split piece reaches past its parent"));
      }
    }
    if d.is_pseudo() && d.reg_file != RegFile::Grf {
      return Err(bad("pseudo declare outside the GRF"));
    }
  }

  // Alias chains must terminate.
  for i in 0..n {
    let mut cur = DeclIx::new(i);
    let mut steps = 0;
    while let Some((base, _)) = decls[cur.get_usize()].alias {
      cur = base;
      steps += 1;
      if steps > n {
        return Err(AnalysisError::AliasCycle(DeclIx::new(i)));
      }
    }
  }
  Ok(())
}

pub fn validate<K: Kernel>(kernel: &K) -> Result<(), AnalysisError> {
  let nBlocks = kernel.blocks().len() as u32;
  if nBlocks == 0 {
    return Err(AnalysisError::EmptyKernel);
  }
  let nInsts = kernel.insts().len() as u32;
  for bix in kernel.blocks() {
    let r = kernel.block_insts(bix);
    if r.len() == 0 || r.end().get() > nInsts {
      return Err(AnalysisError::BadBlock(bix));
    }
    if kernel.block_succs(bix).iter().any(|s| s.get() >= nBlocks) {
      return Err(AnalysisError::BadBlock(bix));
    }
    if kernel.block_func(bix).get() >= kernel.num_funcs() {
      return Err(AnalysisError::BadBlock(bix));
    }
  }
  let decls = kernel.declares();
  validate_declares(decls)?;

  let nDecls = decls.len() as u32;
  let check = |iix: InstIx, op: &Operand| -> Result<(), AnalysisError> {
    if op.decl.get() >= nDecls
      || op.end() > decls[op.decl.get_usize()].byte_size()
    {
      return Err(AnalysisError::BadOperand { inst: iix, decl: op.decl });
    }
    Ok(())
  };
  for iix in kernel.insts() {
    let info = kernel.get_inst_info(iix);
    for op in info.reads().chain(info.writes()) {
      check(iix, &op)?;
    }
    if let InstKind::Call { pseudo: Some(p), .. } = info.kind {
      if p.get() >= nDecls {
        return Err(AnalysisError::BadOperand { inst: iix, decl: p });
      }
    }
    if let Some(ind) = info.indirect {
      for p in kernel.points_to(ind.addr.decl) {
        if p.get() >= nDecls {
          return Err(AnalysisError::BadOperand { inst: iix, decl: *p });
        }
      }
    }
  }
  Ok(())
}

//=============================================================================
// Control-flow analysis results for a kernel: predecessors, successors,
// dominators, loop depths and back edges.

pub struct CfgInfo {
  // All these TypedIxVecs contain one element per Block in the kernel.

  // Predecessor and successor maps.
  pub pred_map: TypedIxVec<BlockIx, SmallVec<[BlockIx; 4]>>,
  pub succ_map: TypedIxVec<BlockIx, SmallVec<[BlockIx; 4]>>,

  // This maps from a Block to the set of Blocks it is dominated by
  pub dom_map: TypedIxVec<BlockIx, Set<BlockIx>>,

  // This maps from a Block to the loop depth that it is at
  pub depth_map: TypedIxVec<BlockIx, u32>,

  // Edges m->n where n dominates m.
  pub back_edges: Vec<(BlockIx, BlockIx)>,

  // Pre- and post-order sequences.  Iterating forwards through these
  // vectors enumerates the blocks in preorder and postorder respectively.
  pub pre_ord: Vec<BlockIx>,
  pub post_ord: Vec<BlockIx>,

  // The block containing each instruction.
  pub inst_block: TypedIxVec<InstIx, BlockIx>,
}

impl CfgInfo {
  #[inline(never)]
  pub fn create<K: Kernel>(kernel: &K) -> Self {
    let nBlocks = kernel.blocks().len() as u32;

    // === BEGIN compute successor and predecessor maps ===
    //
    let mut succ_map = TypedIxVec::<BlockIx, SmallVec<[BlockIx; 4]>>::new();
    for b in kernel.blocks() {
      let mut succs = SmallVec::<[BlockIx; 4]>::new();
      for s in kernel.block_succs(b) {
        if !succs.contains(&s) {
          succs.push(s);
        }
      }
      succ_map.push(succs);
    }

    // Now invert the mapping
    let mut pred_map = TypedIxVec::<BlockIx, SmallVec<[BlockIx; 4]>>::new();
    pred_map.resize(nBlocks, SmallVec::new());
    for (src, dst_set) in (0..).zip(succ_map.iter()) {
      for dst in dst_set.iter() {
        pred_map[*dst].push(BlockIx::new(src));
      }
    }

    let mut inst_block = TypedIxVec::<InstIx, BlockIx>::new();
    inst_block.resize(kernel.insts().len() as u32, BlockIx::new(0));
    for b in kernel.blocks() {
      for iix in kernel.block_insts(b) {
        inst_block[iix] = b;
      }
    }
    //
    // === END compute successor and predecessor maps ===

    // === BEGIN compute preord/postord sequences ===
    //
    // Depth first, with an explicit stack.  Each stack entry carries the
    // index of the next successor to visit, so that postorder falls out
    // when a block's successors are exhausted.
    let mut pre_ord = Vec::<BlockIx>::new();
    let mut post_ord = Vec::<BlockIx>::new();

    let mut visited = TypedIxVec::<BlockIx, bool>::new();
    visited.resize(nBlocks, false);

    let mut roots = vec![kernel.entry_block()];
    for f in 0..kernel.num_funcs() {
      roots.push(kernel.func_entry(FuncIx::new(f)));
    }
    // Deal with any leftovers unreachable from the entry points.
    roots.extend(BlockIx::new(0).dotdot(BlockIx::new(nBlocks)));

    for root in roots {
      if visited[root] {
        continue;
      }
      let mut stack = vec![(root, 0usize)];
      visited[root] = true;
      pre_ord.push(root);
      while let Some((bix, next)) = stack.pop() {
        if next < succ_map[bix].len() {
          stack.push((bix, next + 1));
          let succ = succ_map[bix][next];
          if !visited[succ] {
            visited[succ] = true;
            pre_ord.push(succ);
            stack.push((succ, 0));
          }
        } else {
          post_ord.push(bix);
        }
      }
    }

    assert!(pre_ord.len() == nBlocks as usize);
    assert!(post_ord.len() == nBlocks as usize);
    //
    // === END compute preord/postord sequences ===

    // === BEGIN compute dominator sets ===
    //
    let dom_map = calc_dominators(&pred_map, &post_ord, kernel.entry_block());
    assert!(dom_map.len() == nBlocks);
    //
    // === END compute dominator sets ===

    // === BEGIN compute loop depth of all Blocks
    //
    // A "back edge" m->n is some edge m->n where n dominates m.  'n' is
    // the loop header node.
    let mut back_edges = Vec::<(BlockIx, BlockIx)>::new();
    for bixM in BlockIx::new(0).dotdot(BlockIx::new(nBlocks)) {
      for bixN in succ_map[bixM].iter() {
        if dom_map[bixM].contains(*bixN) {
          back_edges.push((bixM, *bixN));
        }
      }
    }

    // For each back edge, collect up all the blocks in the natural loop
    // defined by the back edge M->N.  This algorithm is from Fig 7.21 of
    // Muchnick 1997.
    let mut natural_loops = Vec::<Set<BlockIx>>::new();
    for (bixM, bixN) in back_edges.iter() {
      let mut Loop = Set::<BlockIx>::two(*bixM, *bixN);
      let mut Stack = Vec::<BlockIx>::new();
      if bixM != bixN {
        Stack.push(*bixM);
        while let Some(bixP) = Stack.pop() {
          for bixQ in pred_map[bixP].iter() {
            if !Loop.contains(*bixQ) {
              Loop.insert(*bixQ);
              Stack.push(*bixQ);
            }
          }
        }
      }
      natural_loops.push(Loop);
    }

    // Order the loops by increasing size, then count for each loop how
    // many of the later (larger) loops contain it.  This relies on loops
    // being either disjoint or nested.
    natural_loops.sort_by(|a, b| a.card().cmp(&b.card()));

    let nLoops = natural_loops.len();
    let mut loop_depths = vec![0u32; nLoops];
    for i in 0..nLoops {
      let mut curr = i;
      let mut depth = 1;
      for j in i + 1..nLoops {
        if natural_loops[curr].is_subset_of(&natural_loops[j]) {
          depth += 1;
          curr = j;
        }
      }
      loop_depths[i] = depth;
    }

    let mut depth_map = TypedIxVec::<BlockIx, u32>::new();
    depth_map.resize(nBlocks, 0);
    for (loopBixs, depth) in natural_loops.iter().zip(loop_depths) {
      for loopBix in loopBixs.iter() {
        if depth_map[*loopBix] < depth {
          depth_map[*loopBix] = depth;
        }
      }
    }
    //
    // === END compute loop depth of all Blocks

    CfgInfo {
      pred_map,
      succ_map,
      dom_map,
      depth_map,
      back_edges,
      pre_ord,
      post_ord,
      inst_block,
    }
  }
}

// Calculate the dominance relationship, given |pred_map| and a start node
// |start|.  The resulting vector maps each block to the set of blocks that
// dominate it. This algorithm is from Fig 7.14 of Muchnick 1997.  Blocks
// unreachable from |start| end up dominated by everything, which keeps them
// out of the way of loop detection.
#[inline(never)]
fn calc_dominators(
  pred_map: &TypedIxVec<BlockIx, SmallVec<[BlockIx; 4]>>,
  post_ord: &Vec<BlockIx>, start: BlockIx,
) -> TypedIxVec<BlockIx, Set<BlockIx>> {
  debug!("calc_dominators: begin");
  let nBlocks = pred_map.len();
  let mut dom_map = TypedIxVec::<BlockIx, Set<BlockIx>>::new();
  {
    let r: BlockIx = start;
    let N: Set<BlockIx> =
      Set::from_vec((0..nBlocks).map(|bixNo| BlockIx::new(bixNo)).collect());
    dom_map.resize(nBlocks, Set::<BlockIx>::empty());
    dom_map[r] = Set::unit(r);
    for ixnoN in 0..nBlocks {
      let bixN = BlockIx::new(ixnoN);
      if bixN != r {
        dom_map[bixN] = N.clone();
      }
    }
    loop {
      let mut change = false;
      for i in 0..nBlocks {
        // bixN travels in "reverse postorder"
        let bixN = post_ord[(nBlocks - 1 - i) as usize];
        if bixN == r {
          continue;
        }
        let mut T = N.clone();
        for bixP in pred_map[bixN].iter() {
          T.intersect(&dom_map[*bixP]);
        }
        let mut D = T;
        D.insert(bixN);
        if !D.equals(&dom_map[bixN]) {
          change = true;
          dom_map[bixN] = D;
        }
      }
      if !change {
        break;
      }
    }
  }
  debug!("calc_dominators: end");
  dom_map
}

//=============================================================================
// The canonical variable table.  Alias declares are resolved once, here, to
// (root declare, byte offset); every root that takes part in allocation gets
// a dense LrIx.

pub struct VarTable {
  root: TypedIxVec<DeclIx, (DeclIx, u32)>,
  lr_of_root: TypedIxVec<DeclIx, Option<LrIx>>,
  pub vars: TypedIxVec<LrIx, DeclIx>,
}

impl VarTable {
  /// `referenced` holds, per declare, whether any instruction mentions it
  /// directly.  Unreferenced roots don't take part unless their role keeps
  /// them alive (inputs, outputs, pseudo declares); `exclude` removes
  /// declares already dealt with by spilling.
  pub fn new(
    decls: &[Declare], referenced: &[bool], exclude: &Set<DeclIx>,
  ) -> Self {
    let n = decls.len() as u32;
    let mut root = TypedIxVec::<DeclIx, (DeclIx, u32)>::new();
    for i in 0..n {
      let mut cur = DeclIx::new(i);
      let mut off = 0;
      while let Some((base, o)) = decls[cur.get_usize()].alias {
        cur = base;
        off += o;
      }
      root.push((cur, off));
    }

    let mut live_root = vec![false; n as usize];
    for i in 0..n as usize {
      let d = &decls[i];
      if referenced[i] || d.flags.input || d.flags.output || d.is_pseudo() {
        live_root[root.elems()[i].0.get_usize()] = true;
      }
    }
    // A split parent and its pieces share storage; keep the family whole.
    for i in 0..n as usize {
      if let Some((parent, _)) = decls[i].split_parent {
        if live_root[i] {
          live_root[parent.get_usize()] = true;
        }
      }
    }

    let mut lr_of_root = TypedIxVec::<DeclIx, Option<LrIx>>::new();
    lr_of_root.resize(n, None);
    let mut vars = TypedIxVec::<LrIx, DeclIx>::new();
    for i in 0..n {
      let dix = DeclIx::new(i);
      if decls[i as usize].alias.is_none()
        && live_root[i as usize]
        && !exclude.contains(dix)
      {
        lr_of_root[dix] = Some(LrIx::new(vars.len()));
        vars.push(dix);
      }
    }
    Self { root, lr_of_root, vars }
  }

  pub fn num_vars(&self) -> u32 {
    self.vars.len()
  }

  /// Root declare and byte offset of `decl` within it.
  pub fn root_of(&self, decl: DeclIx) -> (DeclIx, u32) {
    self.root[decl]
  }

  /// The variable a declare (or alias) belongs to, if it takes part.
  pub fn lr_of(&self, decl: DeclIx) -> Option<LrIx> {
    self.lr_of_root[self.root[decl].0]
  }

  pub fn decl_of(&self, lr: LrIx) -> DeclIx {
    self.vars[lr]
  }

  /// Rewrite an operand in terms of its root declare.
  pub fn canonicalize(&self, op: &Operand) -> Operand {
    let (root, off) = self.root[op.decl];
    Operand { decl: root, offset: op.offset + off, ..*op }
  }

  pub fn canonicalize_info(&self, info: &mut InstInfo) {
    if let Some(ref mut d) = info.dst {
      *d = self.canonicalize(d);
    }
    for s in info.srcs.iter_mut() {
      if let Some(ref mut op) = s {
        *op = self.canonicalize(op);
      }
    }
    if let Some(ref mut p) = info.pred {
      *p = self.canonicalize(p);
    }
    if let Some(ref mut c) = info.cond_mod {
      *c = self.canonicalize(c);
    }
    if let Some(ref mut ind) = info.indirect {
      ind.addr = self.canonicalize(&ind.addr);
    }
  }
}

/// Which declares does any instruction mention directly?
pub fn referenced_declares<K: Kernel>(kernel: &K) -> Vec<bool> {
  let mut referenced = vec![false; kernel.declares().len()];
  for iix in kernel.insts() {
    let info = kernel.get_inst_info(iix);
    for op in info.reads().chain(info.writes()) {
      referenced[op.decl.get_usize()] = true;
    }
    if let Some(ind) = info.indirect {
      for p in kernel.points_to(ind.addr.decl) {
        referenced[p.get_usize()] = true;
      }
    }
  }
  referenced
}

//=============================================================================
// Per-instruction variable references.  Computed once per attempt from the
// canonicalized instruction summaries and shared by liveness, interference
// and the checker.

#[derive(Clone, Debug, Default)]
pub struct InstVarRefs {
  /// Variables read.  Includes the declares reachable through an indirect
  /// source and the implicit read of a callee-save pseudo at a return.
  pub uses: SmallVec<[LrIx; 6]>,
  /// Variables written, with whether the write kills the previous value.
  pub defs: SmallVec<[(LrIx, bool); 2]>,
}

/// Does this write cover the whole of its root declare, in every channel?
pub fn write_kills(
  info: &InstInfo, op: &Operand, root_size: u32, divergent: bool,
) -> bool {
  if info.kind == InstKind::Kill {
    return true;
  }
  op.offset == 0
    && op.size >= root_size
    && info.pred.is_none()
    && (!divergent || info.no_mask)
}

pub fn compute_inst_refs<K: Kernel>(
  kernel: &K, vars: &VarTable, infos: &TypedIxVec<InstIx, InstInfo>,
  cfg: &CfgInfo,
) -> TypedIxVec<InstIx, InstVarRefs> {
  let decls = kernel.declares();
  let mut refs = TypedIxVec::<InstIx, InstVarRefs>::new();
  refs.resize(infos.len(), InstVarRefs::default());

  for iix in kernel.insts() {
    let info = &infos[iix];
    let bix = cfg.inst_block[iix];
    let divergent = kernel.block_divergent(bix);
    let r = &mut refs[iix];
    for op in info.reads() {
      if let Some(lr) = vars.lr_of(op.decl) {
        if !r.uses.contains(&lr) {
          r.uses.push(lr);
        }
      }
    }
    for op in info.writes() {
      if let Some(lr) = vars.lr_of(op.decl) {
        let size = decls[op.decl.get_usize()].byte_size();
        let kills = write_kills(info, &op, size, divergent);
        r.defs.push((lr, kills));
      }
    }
    if let Some(ind) = info.indirect {
      for p in kernel.points_to(ind.addr.decl) {
        if let Some(lr) = vars.lr_of(*p) {
          if ind.is_dst {
            r.defs.push((lr, false));
          } else if !r.uses.contains(&lr) {
            r.uses.push(lr);
          }
        }
      }
    }
  }

  // The callee-save pseudo of each function is defined on entry and read at
  // every return.
  for f in 0..kernel.num_funcs() {
    let fix = FuncIx::new(f);
    if let Some(vce) = kernel.callee_save_pseudo(fix) {
      if let Some(lr) = vars.lr_of(vce) {
        let first = kernel.block_insts(kernel.func_entry(fix)).first();
        refs[first].defs.push((lr, true));
        for iix in kernel.insts() {
          if infos[iix].kind == InstKind::Return
            && kernel.block_func(cfg.inst_block[iix]) == fix
          {
            refs[iix].uses.push(lr);
          }
        }
      }
    }
  }
  refs
}

//=============================================================================
// Reference counts and block locality.

#[derive(Clone, Debug, Default)]
pub struct VarRefSummary {
  /// Direct, unweighted references.
  pub num_refs: u32,
  /// References weighted by loop nesting.
  pub weighted_refs: u32,
  pub defs: SmallVec<[InstIx; 2]>,
  /// The only block referencing the variable, if there is just one.
  pub only_block: Option<BlockIx>,
  pub multi_block: bool,
}

/// Weight of one reference at loop depth `depth`.
pub fn loop_weight(factor: u32, depth: u32) -> u32 {
  factor.saturating_pow(depth.min(MAX_LOOP_WEIGHT_NEST))
}

pub fn summarize_refs<K: Kernel>(
  kernel: &K, refs: &TypedIxVec<InstIx, InstVarRefs>,
  infos: &TypedIxVec<InstIx, InstInfo>, cfg: &CfgInfo, num_vars: u32,
  opts: &RegAllocOptions,
) -> TypedIxVec<LrIx, VarRefSummary> {
  let mut sums = TypedIxVec::<LrIx, VarRefSummary>::new();
  sums.resize(num_vars, VarRefSummary::default());
  for iix in kernel.insts() {
    if infos[iix].kind == InstKind::Kill {
      continue;
    }
    let bix = cfg.inst_block[iix];
    let w = loop_weight(opts.loop_iteration_factor, cfg.depth_map[bix]);
    let r = &refs[iix];
    let mut touch = |lr: LrIx, is_def: bool| {
      let s = &mut sums[lr];
      s.num_refs = s.num_refs.saturating_add(1);
      s.weighted_refs = s.weighted_refs.saturating_add(w);
      if is_def && !s.defs.contains(&iix) {
        s.defs.push(iix);
      }
      let only = s.only_block;
      match only {
        None if !s.multi_block => s.only_block = Some(bix),
        Some(b) if b != bix => {
          s.only_block = None;
          s.multi_block = true;
        }
        _ => {}
      }
    };
    for lr in r.uses.iter() {
      touch(*lr, false);
    }
    for (lr, _) in r.defs.iter() {
      touch(*lr, true);
    }
  }
  sums
}

//=============================================================================
// Computation of live-in and live-out sets

pub struct Liveness {
  // All these TypedIxVecs contain one element per block.

  /// Upward-exposed reads.
  pub use_sets: TypedIxVec<BlockIx, BitSet>,
  /// Any write, partial or not.
  pub def_sets: TypedIxVec<BlockIx, BitSet>,
  /// Writes that end the previous value.
  pub kill_sets: TypedIxVec<BlockIx, BitSet>,
  pub live_in: TypedIxVec<BlockIx, BitSet>,
  pub live_out: TypedIxVec<BlockIx, BitSet>,
  /// Variables defined on some path reaching the block's entry / exit.
  pub def_in: TypedIxVec<BlockIx, BitSet>,
  pub def_out: TypedIxVec<BlockIx, BitSet>,
  /// Variables live on entry to or exit from some block.
  pub global: BitSet,
}

impl Liveness {
  pub fn is_global(&self, lr: LrIx) -> bool {
    self.global.contains(lr.get_usize())
  }
}

#[inline(never)]
pub fn compute_liveness<K: Kernel>(
  kernel: &K, vars: &VarTable, refs: &TypedIxVec<InstIx, InstVarRefs>,
  cfg: &CfgInfo,
) -> Liveness {
  debug!("compute_liveness: begin");
  let nBlocks = kernel.blocks().len() as u32;
  let nVars = vars.num_vars() as usize;
  let decls = kernel.declares();
  let empty = BitSet::new(nVars);

  // === BEGIN per-block use/def/kill ===
  let mut use_sets = TypedIxVec::<BlockIx, BitSet>::new();
  let mut def_sets = TypedIxVec::<BlockIx, BitSet>::new();
  let mut kill_sets = TypedIxVec::<BlockIx, BitSet>::new();
  for b in kernel.blocks() {
    let mut uce = empty.clone();
    let mut def = empty.clone();
    let mut kill = empty.clone();
    for iix in kernel.block_insts(b) {
      let r = &refs[iix];
      // Reads happen before writes; a read is upward exposed unless the
      // variable was fully written earlier in the block.
      for u in r.uses.iter() {
        if !kill.contains(u.get_usize()) {
          uce.insert(u.get_usize());
        }
      }
      for (d, kills) in r.defs.iter() {
        def.insert(d.get_usize());
        if *kills {
          kill.insert(d.get_usize());
        }
      }
    }
    use_sets.push(uce);
    def_sets.push(def);
    kill_sets.push(kill);
  }
  // === END per-block use/def/kill ===

  // Outputs are read after the kernel's exit blocks.
  let mut exit_live = empty.clone();
  for (lr, dix) in vars.vars.enumerate() {
    if decls[dix.get_usize()].flags.output {
      exit_live.insert(lr.get_usize());
    }
  }
  let is_exit = |b: BlockIx| {
    cfg.succ_map[b].is_empty() && kernel.block_func(b) == FuncIx::new(0)
  };

  // === BEGIN backward live-in/live-out ===
  let mut live_out = TypedIxVec::<BlockIx, BitSet>::new();
  live_out.resize(nBlocks, empty.clone());
  let mut live_in = TypedIxVec::<BlockIx, BitSet>::new();
  live_in.resize(nBlocks, empty.clone());

  // Initialise the work queue so as to do a reverse preorder traversal
  // through the graph, after which blocks are re-evaluated on demand.
  let mut workQ = Queue::<BlockIx>::new();
  let mut inQ = vec![false; nBlocks as usize];
  for i in 0..nBlocks {
    let bixI = cfg.pre_ord[(nBlocks - 1 - i) as usize];
    workQ.push_back(bixI);
    inQ[bixI.get_usize()] = true;
  }

  let mut nEvals = 0;
  while let Some(bixI) = workQ.pop_front() {
    inQ[bixI.get_usize()] = false;
    let mut out = if is_exit(bixI) { exit_live.clone() } else { empty.clone() };
    for bixJ in cfg.succ_map[bixI].iter() {
      out.union(&live_in[*bixJ]);
    }
    live_out[bixI] = out;
    let mut inn = live_out[bixI].clone();
    inn.remove(&kill_sets[bixI]);
    inn.union(&use_sets[bixI]);
    nEvals += 1;

    if inn != live_in[bixI] {
      live_in[bixI] = inn;
      for bixJ in cfg.pred_map[bixI].iter() {
        if !inQ[bixJ.get_usize()] {
          inQ[bixJ.get_usize()] = true;
          workQ.push_back(*bixJ);
        }
      }
    }
  }
  // === END backward live-in/live-out ===

  // === BEGIN forward def-in/def-out ===
  let mut def_in = TypedIxVec::<BlockIx, BitSet>::new();
  def_in.resize(nBlocks, empty.clone());
  let mut def_out = TypedIxVec::<BlockIx, BitSet>::new();
  def_out.resize(nBlocks, empty.clone());

  let mut inputs = empty.clone();
  for (lr, dix) in vars.vars.enumerate() {
    if decls[dix.get_usize()].flags.input {
      inputs.insert(lr.get_usize());
    }
  }
  let entry = kernel.entry_block();

  for i in 0..nBlocks {
    let bixI = cfg.post_ord[(nBlocks - 1 - i) as usize];
    workQ.push_back(bixI);
    inQ[bixI.get_usize()] = true;
  }
  while let Some(bixI) = workQ.pop_front() {
    inQ[bixI.get_usize()] = false;
    let mut inn = if bixI == entry { inputs.clone() } else { empty.clone() };
    for bixP in cfg.pred_map[bixI].iter() {
      inn.union(&def_out[*bixP]);
    }
    def_in[bixI] = inn;
    let mut out = def_in[bixI].clone();
    out.union(&def_sets[bixI]);
    if out != def_out[bixI] {
      def_out[bixI] = out;
      for bixS in cfg.succ_map[bixI].iter() {
        if !inQ[bixS.get_usize()] {
          inQ[bixS.get_usize()] = true;
          workQ.push_back(*bixS);
        }
      }
    }
  }
  // === END forward def-in/def-out ===

  if log_enabled!(Level::Trace) {
    for b in kernel.blocks() {
      trace!(
        "  {:?}: livein {:?} liveout {:?} defout {:?}",
        b,
        live_in[b],
        live_out[b],
        def_out[b]
      );
    }
  }
  let mut global = empty.clone();
  for b in kernel.blocks() {
    global.union(&live_in[b]);
    global.union(&live_out[b]);
  }
  debug!("compute_liveness: end, {} evaluations", nEvals);

  Liveness {
    use_sets,
    def_sets,
    kill_sets,
    live_in,
    live_out,
    def_in,
    def_out,
    global,
  }
}

//=============================================================================
// Subroutine may-defs.  The declares each function writes, directly or via
// the functions it calls, found with an explicit worklist over the call
// graph.

pub fn compute_func_maydefs<K: Kernel>(
  kernel: &K, refs: &TypedIxVec<InstIx, InstVarRefs>,
  infos: &TypedIxVec<InstIx, InstInfo>, cfg: &CfgInfo, num_vars: u32,
) -> TypedIxVec<FuncIx, BitSet> {
  let nFuncs = kernel.num_funcs();
  let mut direct = TypedIxVec::<FuncIx, BitSet>::new();
  direct.resize(nFuncs, BitSet::new(num_vars as usize));
  let mut callees = TypedIxVec::<FuncIx, Vec<FuncIx>>::new();
  callees.resize(nFuncs, vec![]);
  for iix in kernel.insts() {
    let f = kernel.block_func(cfg.inst_block[iix]);
    for (lr, _) in refs[iix].defs.iter() {
      direct[f].insert(lr.get_usize());
    }
    if let InstKind::Call { callee, .. } = infos[iix].kind {
      if callee.get() < nFuncs && !callees[f].contains(&callee) {
        callees[f].push(callee);
      }
    }
  }

  let mut maydefs = TypedIxVec::<FuncIx, BitSet>::new();
  for f in 0..nFuncs {
    let fix = FuncIx::new(f);
    let mut acc = direct[fix].clone();
    let mut seen = vec![false; nFuncs as usize];
    seen[f as usize] = true;
    let mut stack: Vec<FuncIx> = callees[fix].clone();
    while let Some(g) = stack.pop() {
      if seen[g.get_usize()] {
        continue;
      }
      seen[g.get_usize()] = true;
      acc.union(&direct[g]);
      stack.extend(callees[g].iter().cloned());
    }
    maydefs.push(acc);
  }
  maydefs
}

//=============================================================================
// Everything the allocator derives from the kernel before building live
// ranges, for one attempt.

pub struct FlowInfo {
  pub cfg: CfgInfo,
  pub vars: VarTable,
  /// Instruction summaries with every operand rewritten to its root
  /// declare.
  pub infos: TypedIxVec<InstIx, InstInfo>,
  pub refs: TypedIxVec<InstIx, InstVarRefs>,
  pub sums: TypedIxVec<LrIx, VarRefSummary>,
  pub liveness: Liveness,
  pub maydefs: TypedIxVec<FuncIx, BitSet>,
}

impl FlowInfo {
  /// Validate the kernel and run every analysis.  Declares in `exclude`
  /// (already spilled) take no part.
  #[inline(never)]
  pub fn compute<K: Kernel>(
    kernel: &K, exclude: &Set<DeclIx>, opts: &RegAllocOptions,
  ) -> Result<Self, AnalysisError> {
    debug!("FlowInfo::compute: begin");
    validate(kernel)?;
    let cfg = CfgInfo::create(kernel);
    let referenced = referenced_declares(kernel);
    let vars = VarTable::new(kernel.declares(), &referenced, exclude);

    let mut infos = TypedIxVec::<InstIx, InstInfo>::new();
    for iix in kernel.insts() {
      let mut info = kernel.get_inst_info(iix);
      vars.canonicalize_info(&mut info);
      infos.push(info);
    }

    let refs = compute_inst_refs(kernel, &vars, &infos, &cfg);
    let sums =
      summarize_refs(kernel, &refs, &infos, &cfg, vars.num_vars(), opts);
    let liveness = compute_liveness(kernel, &vars, &refs, &cfg);
    let maydefs =
      compute_func_maydefs(kernel, &refs, &infos, &cfg, vars.num_vars());
    debug!(
      "FlowInfo::compute: end, {} vars, {} blocks, {} back edges",
      vars.num_vars(),
      cfg.pred_map.len(),
      cfg.back_edges.len()
    );
    Ok(FlowInfo { cfg, vars, infos, refs, sums, liveness, maydefs })
  }

  pub fn num_vars(&self) -> u32 {
    self.vars.num_vars()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn errors_format_through_display() {
    let err = AnalysisError::AliasCycle(DeclIx::new(4));
    assert_eq!(
      format!("{}", err),
      "alias chain starting at declare d4 is cyclic"
    );
    let wrapped: crate::RegAllocError = AnalysisError::EmptyKernel.into();
    assert_eq!(wrapped.to_string(), "analysis error: kernel has no blocks");
  }
}
