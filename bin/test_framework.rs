/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

#![allow(non_snake_case)]

/// As part of this set of test cases, we define a mini GPU IR and implement
/// the `Kernel` trait for it so that we can use the gpu-regalloc public
/// interface.  The IR comes with a spill/fill inserter and an interpreter
/// that can run a program before and after allocation.
use gpu_regalloc::{
  BlockIx, DeclIx, Declare, ElemType, FuncIx, GrfAlign, Indirect, InstInfo,
  InstIx, InstKind, Kernel, Map, MyRange, Operand, RegAllocOptions,
  RegAllocResult, RegFile, SpillOutcome, SpillRequest, TypedIxVec,
  NUM_REG_FILES,
};

use log::{debug, info};
use std::fmt;

//=============================================================================
// Instructions.  Each carries the operand summary the allocator sees, plus
// what the interpreter needs on top of it.  Destinations come first.

#[derive(Clone)]
pub struct Inst {
  pub info: InstInfo,
  /// Scratch offset of a fill or spill.
  pub mem: u32,
  /// Position in the program as first built.  Spill code has none.
  pub origin: Option<u32>,
}

impl Inst {
  fn new(kind: InstKind, exec_size: u32) -> Self {
    Self { info: InstInfo::new(kind, exec_size), mem: 0, origin: None }
  }

  /// Write regardless of the channel enables.
  pub fn nomask(mut self) -> Self {
    self.info.no_mask = true;
    self
  }

  /// Execute for channels starting at `offset`.
  pub fn at(mut self, offset: u32) -> Self {
    self.info.mask_offset = offset;
    self
  }

  pub fn pred(mut self, flag: Operand) -> Self {
    self.info.pred = Some(flag);
    self
  }

  pub fn cmod(mut self, flag: Operand) -> Self {
    self.info.cond_mod = Some(flag);
    self
  }

  pub fn eot(mut self) -> Self {
    self.info.eot = true;
    self
  }

  pub fn indirect(mut self, addr: Operand, is_dst: bool) -> Self {
    self.info.indirect = Some(Indirect { addr, is_dst });
    self
  }

  pub fn is_fill(&self) -> bool {
    self.info.kind == InstKind::Fill
  }
}

pub fn i_alu(exec_size: u32, dst: Operand, srcs: &[Operand]) -> Inst {
  let mut i = Inst::new(InstKind::Alu, exec_size);
  i.info.dst = Some(dst);
  for s in srcs {
    i.info.srcs.push(Some(*s));
  }
  i
}

pub fn i_mov(exec_size: u32, dst: Operand, src: Operand) -> Inst {
  i_alu(exec_size, dst, &[src])
}

/// Define `dst` from immediates only.
pub fn i_imm(exec_size: u32, dst: Operand) -> Inst {
  i_alu(exec_size, dst, &[])
}

pub fn i_mad(
  exec_size: u32, dst: Operand, src0: Operand, src1: Operand, src2: Operand,
) -> Inst {
  let mut i = i_alu(exec_size, dst, &[src0, src1, src2]);
  i.info.kind = InstKind::Mad;
  i
}

pub fn i_dpas(
  exec_size: u32, dst: Operand, src0: Operand, src1: Operand, src2: Operand,
) -> Inst {
  let mut i = i_alu(exec_size, dst, &[src0, src1, src2]);
  i.info.kind = InstKind::Dpas;
  i
}

/// A message send.  Passing `ext` makes it a split send.
pub fn i_send(
  exec_size: u32, dst: Option<Operand>, payload: Operand,
  ext: Option<Operand>,
) -> Inst {
  let mut i =
    Inst::new(InstKind::Send { split: ext.is_some() }, exec_size).nomask();
  i.info.dst = dst;
  i.info.srcs.push(Some(payload));
  if let Some(e) = ext {
    i.info.srcs.push(Some(e));
  }
  i
}

pub fn i_call(callee: FuncIx, pseudo: Option<DeclIx>) -> Inst {
  Inst::new(InstKind::Call { callee, pseudo }, 1).nomask()
}

pub fn i_ret() -> Inst {
  Inst::new(InstKind::Return, 1).nomask()
}

pub fn i_branch() -> Inst {
  Inst::new(InstKind::Branch, 1)
}

pub fn i_kill(dst: Operand) -> Inst {
  let mut i = Inst::new(InstKind::Kill, 1).nomask();
  i.info.dst = Some(dst);
  i
}

fn i_fill(dst: Operand, mem: u32) -> Inst {
  let mut i = Inst::new(InstKind::Fill, 1).nomask();
  i.info.dst = Some(dst);
  i.mem = mem;
  i
}

fn i_spill(src: Operand, mem: u32) -> Inst {
  let mut i = Inst::new(InstKind::Spill, 1).nomask();
  i.info.srcs.push(Some(src));
  i.mem = mem;
  i
}

fn show_op(op: &Operand) -> String {
  if op.stride > 1 {
    format!("{:?}[{}..{};{}]", op.decl, op.offset, op.end(), op.stride)
  } else {
    format!("{:?}[{}..{}]", op.decl, op.offset, op.end())
  }
}

impl fmt::Debug for Inst {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    let info = &self.info;
    let name = match info.kind {
      InstKind::Alu => "alu".to_string(),
      InstKind::Mad => "mad".to_string(),
      InstKind::Dpas => "dpas".to_string(),
      InstKind::Send { split: false } => "send".to_string(),
      InstKind::Send { split: true } => "sends".to_string(),
      InstKind::Call { callee, .. } => format!("call {:?}", callee),
      InstKind::Return => "ret".to_string(),
      InstKind::Branch => "br".to_string(),
      InstKind::Kill => "kill".to_string(),
      InstKind::Fill => format!("fill @{}", self.mem),
      InstKind::Spill => format!("spill @{}", self.mem),
    };
    write!(fmt, "{} ({}|M{})", name, info.exec_size, info.mask_offset)?;
    if let Some(p) = &info.pred {
      write!(fmt, " ({})", show_op(p))?;
    }
    if let Some(d) = &info.dst {
      write!(fmt, " {}", show_op(d))?;
    }
    let srcs: Vec<String> =
      info.srcs.iter().filter_map(|s| s.as_ref()).map(show_op).collect();
    if !srcs.is_empty() {
      write!(fmt, " <- {}", srcs.join(", "))?;
    }
    if info.no_mask {
      write!(fmt, " {{NoMask}}")?;
    }
    if info.eot {
      write!(fmt, " {{EOT}}")?;
    }
    Ok(())
  }
}

//=============================================================================
// Definition of Block and Program, and printing thereof.

#[derive(Clone, Debug)]
pub struct Block {
  pub name: String,
  pub start: InstIx,
  pub len: u32,
  pub func: FuncIx,
  pub divergent: bool,
  succ_names: Vec<String>,
  /// Successors within the function.  A block ending in a call lists its
  /// return site here.
  pub succs: Vec<BlockIx>,
  /// Successors as the allocator sees them: a call goes to the callee's
  /// entry and a return goes back to every return site of its function.
  pub cfg_succs: Vec<BlockIx>,
}

#[derive(Clone, Debug)]
pub struct FuncDef {
  pub name: String,
  pub entry: Option<BlockIx>,
  pub callee_save: Option<DeclIx>,
}

#[derive(Clone, Debug)]
pub struct Program {
  pub name: String,
  pub simd_size: u32,
  pub decls: Vec<Declare>,
  pub insts: TypedIxVec<InstIx, Inst>,
  // Note that |blocks| must be in order of increasing |Block::start|.
  pub blocks: TypedIxVec<BlockIx, Block>,
  pub funcs: Vec<FuncDef>,
  pub pointees: Map<DeclIx, Vec<DeclIx>>,
  /// Counts temporaries, to give them distinct names.
  num_temps: u32,
  grf_bytes: u32,
}

// Find a block Ix for a block name
fn lookup(blocks: &TypedIxVec<BlockIx, Block>, name: &str) -> BlockIx {
  for (bix, b) in blocks.enumerate() {
    if b.name == name {
      return bix;
    }
  }
  panic!("Program::lookup: can't resolve block name '{}'", name);
}

impl Program {
  pub fn new(name: &str, simd_size: u32) -> Self {
    Program {
      name: name.to_string(),
      simd_size,
      decls: vec![],
      insts: TypedIxVec::new(),
      blocks: TypedIxVec::new(),
      funcs: vec![FuncDef {
        name: name.to_string(),
        entry: None,
        callee_save: None,
      }],
      pointees: Map::default(),
      num_temps: 0,
      grf_bytes: 32,
    }
  }

  pub fn decl(&mut self, d: Declare) -> DeclIx {
    self.decls.push(d);
    DeclIx::new(self.decls.len() as u32 - 1)
  }

  /// The whole of a declare.
  pub fn v(&self, d: DeclIx) -> Operand {
    Operand::block(d, 0, self.decls[d.get_usize()].byte_size())
  }

  /// Part of a declare, `size` bytes from `offset`.
  pub fn part(&self, d: DeclIx, offset: u32, size: u32) -> Operand {
    Operand::block(d, offset, size)
  }

  /// One element per channel, `stride` elements apart.
  pub fn strided(&self, d: DeclIx, stride: u32, exec_size: u32) -> Operand {
    let elem = self.decls[d.get_usize()].elem_type.size();
    Operand::region(d, 0, elem, stride, exec_size)
  }

  pub fn points_to(&mut self, addr: DeclIx, targets: &[DeclIx]) {
    self.pointees.insert(addr, targets.to_vec());
  }

  /// Declare a subroutine.  Its blocks are added with `block_in`.
  pub fn func(&mut self, name: &str, callee_save: Option<DeclIx>) -> FuncIx {
    self.funcs.push(FuncDef {
      name: name.to_string(),
      entry: None,
      callee_save,
    });
    FuncIx::new(self.funcs.len() as u32 - 1)
  }

  pub fn block(&mut self, name: &str, insts: Vec<Inst>, succs: &[&str]) {
    self.add_block(FuncIx::new(0), name, insts, succs, false);
  }

  /// A block executing under a partial channel mask.
  pub fn divergent_block(
    &mut self, name: &str, insts: Vec<Inst>, succs: &[&str],
  ) {
    self.add_block(FuncIx::new(0), name, insts, succs, true);
  }

  pub fn block_in(
    &mut self, func: FuncIx, name: &str, insts: Vec<Inst>, succs: &[&str],
  ) {
    self.add_block(func, name, insts, succs, false);
  }

  fn add_block(
    &mut self, func: FuncIx, name: &str, insts: Vec<Inst>, succs: &[&str],
    divergent: bool,
  ) {
    let start = InstIx::new(self.insts.len());
    let len = insts.len() as u32;
    for i in insts {
      self.insts.push(i);
    }
    let bix = BlockIx::new(self.blocks.len());
    let f = &mut self.funcs[func.get_usize()];
    if f.entry.is_none() {
      f.entry = Some(bix);
    }
    self.blocks.push(Block {
      name: name.to_string(),
      start,
      len,
      func,
      divergent,
      succ_names: succs.iter().map(|s| s.to_string()).collect(),
      succs: vec![],
      cfg_succs: vec![],
    });
  }

  // All blocks have been added.  Resolve names, number the instructions and
  // work out the allocator's view of calls and returns.
  pub fn finish(&mut self) {
    if self.blocks.len() == 0 || self.blocks[BlockIx::new(0)].func.get() != 0
    {
      panic!("Program::finish: the first block must belong to the kernel");
    }
    for bix in self.blocks.range() {
      let b = &self.blocks[bix];
      if b.len == 0 {
        panic!("Program::finish: block '{}' is empty", b.name);
      }
      let succs: Vec<BlockIx> =
        b.succ_names.iter().map(|n| lookup(&self.blocks, n)).collect();
      self.blocks[bix].succs = succs;
    }

    let mut ret_sites: Vec<Vec<BlockIx>> = vec![vec![]; self.funcs.len()];
    for b in self.blocks.iter() {
      if let InstKind::Call { callee, .. } = self.last_kind(b) {
        ret_sites[callee.get_usize()].extend(b.succs.iter().cloned());
      }
    }
    for bix in self.blocks.range() {
      let cfg_succs = match self.last_kind(&self.blocks[bix]) {
        InstKind::Call { callee, .. } => {
          match self.funcs.get(callee.get_usize()).and_then(|f| f.entry) {
            Some(entry) => vec![entry],
            None => panic!("Program::finish: call of an empty function"),
          }
        }
        InstKind::Return => {
          ret_sites[self.blocks[bix].func.get_usize()].clone()
        }
        _ => self.blocks[bix].succs.clone(),
      };
      self.blocks[bix].cfg_succs = cfg_succs;
    }

    for (n, i) in self.insts.iter_mut().enumerate() {
      i.origin = Some(n as u32);
    }
  }

  fn last_kind(&self, b: &Block) -> InstKind {
    self.insts[b.start.plus(b.len - 1)].info.kind
  }

  /// Root declare and byte offset of `d` within it.
  pub fn root_of(&self, d: DeclIx) -> (DeclIx, u32) {
    let mut cur = d;
    let mut off = 0;
    while let Some((base, o)) = self.decls[cur.get_usize()].alias {
      cur = base;
      off += o;
    }
    (cur, off)
  }

  pub fn decl_named(&self, name: &str) -> Option<DeclIx> {
    self
      .decls
      .iter()
      .position(|d| d.name == name)
      .map(|i| DeclIx::new(i as u32))
  }

  pub fn print(&self, who: &str) {
    println!("");
    println!("Program {}: name='{}' simd{} {{", who, self.name, self.simd_size);
    for (ix, d) in self.decls.iter().enumerate() {
      println!(
        "  {:?} = {} {}{} x {:?}{}",
        DeclIx::new(ix as u32),
        d.name,
        d.reg_file.prefix(),
        d.num_elems,
        d.elem_type,
        match d.alias {
          Some((base, off)) => format!(" alias {:?}+{}", base, off),
          None => "".to_string(),
        }
      );
    }
    for (bix, b) in self.blocks.enumerate() {
      println!(
        "  {:?}:{} ({}){} -> {:?}",
        bix,
        b.name,
        self.funcs[b.func.get_usize()].name,
        if b.divergent { " divergent" } else { "" },
        b.succs
      );
      for i in b.start.get()..b.start.get() + b.len {
        let iix = InstIx::new(i);
        println!("      {:<4?}   {:?}", iix, self.insts[iix]);
      }
    }
    println!("}}");
  }
}

//=============================================================================
// Spill and fill insertion, and the coalescing post-pass.

impl Program {
  fn new_temp(&mut self, root: DeclIx) -> DeclIx {
    let base = &self.decls[root.get_usize()];
    let mut t = Declare::new(
      &format!("{}.t{}", base.name, self.num_temps),
      base.reg_file,
      base.elem_type,
      base.num_elems,
    )
    .with_align(base.align)
    .with_sub_align(base.sub_align);
    t.flags.spill_temp = true;
    t.flags.addr_flag_spill = base.reg_file != RegFile::Grf;
    self.num_temps += 1;
    self.decl(t)
  }

  /// Rewrite one instruction, appending it with its fills, kills and spills
  /// to `out`.
  fn spill_one(
    &mut self, iix: InstIx, divergent: bool, req: &SpillRequest,
    out: &mut Vec<Inst>, outcome: &mut SpillOutcome,
  ) {
    let mut inst = self.insts[iix].clone();

    // (root, temp, read or partially written, written)
    let mut roots: Vec<(DeclIx, DeclIx, bool, bool)> = vec![];
    let reads: Vec<Operand> = inst.info.reads().collect();
    let writes: Vec<Operand> = inst.info.writes().collect();
    for (op, is_write) in reads
      .iter()
      .map(|op| (op, false))
      .chain(writes.iter().map(|op| (op, true)))
    {
      let (root, off) = self.root_of(op.decl);
      if !req.contains(root) {
        continue;
      }
      let size = self.decls[root.get_usize()].byte_size();
      let full = off + op.offset == 0
        && op.size >= size
        && op.stride <= 1
        && inst.info.pred.is_none()
        && (!divergent || inst.info.no_mask);
      let preload = !is_write || !full;
      match roots.iter_mut().find(|r| r.0 == root) {
        Some(r) => {
          r.2 |= preload;
          r.3 |= is_write;
        }
        None => {
          let t = self.new_temp(root);
          outcome.new_declares.push(t);
          roots.push((root, t, preload, is_write));
        }
      }
    }
    if roots.is_empty() {
      out.push(inst);
      return;
    }

    for (root, t, preload, written) in roots.iter() {
      let mem = req.range_of(*root).map_or(0, |r| r.spill_offset);
      let whole = self.v(*t);
      if *preload {
        out.push(i_fill(whole, mem));
        outcome.num_fills += 1;
      } else if *written {
        out.push(i_kill(whole));
      }
    }

    let rewrite = |op: &mut Operand| {
      let (root, off) = self.root_of(op.decl);
      if let Some(r) = roots.iter().find(|r| r.0 == root) {
        op.decl = r.1;
        op.offset += off;
      }
    };
    if let Some(ref mut d) = inst.info.dst {
      rewrite(d);
    }
    for s in inst.info.srcs.iter_mut() {
      if let Some(ref mut op) = s {
        rewrite(op);
      }
    }
    if let Some(ref mut p) = inst.info.pred {
      rewrite(p);
    }
    if let Some(ref mut c) = inst.info.cond_mod {
      rewrite(c);
    }
    if let Some(ref mut ind) = inst.info.indirect {
      rewrite(&mut ind.addr);
    }
    out.push(inst);

    for (root, t, _, written) in roots.iter() {
      if *written {
        let mem = req.range_of(*root).map_or(0, |r| r.spill_offset);
        out.push(i_spill(self.v(*t), mem));
        outcome.num_spills += 1;
      }
    }
  }

  /// Rebuild the instruction stream block by block.
  fn rebuild<F>(&mut self, mut per_block: F)
  where
    F: FnMut(&mut Program, BlockIx, &mut Vec<Inst>),
  {
    let mut new_insts = Vec::<Inst>::new();
    for bix in self.blocks.range() {
      let start = new_insts.len() as u32;
      per_block(self, bix, &mut new_insts);
      let b = &mut self.blocks[bix];
      b.start = InstIx::new(start);
      b.len = new_insts.len() as u32 - start;
    }
    self.insts = TypedIxVec::from_vec(new_insts);
  }

  /// Can the fill at `iix` join a group of fills whose memory ends at
  /// `next_mem`?
  fn fill_joins(&self, iix: InstIx, next_mem: u32) -> bool {
    let i = &self.insts[iix];
    if !i.is_fill() || i.mem != next_mem {
      return false;
    }
    match i.info.dst {
      Some(op) => {
        let d = &self.decls[op.decl.get_usize()];
        d.reg_file == RegFile::Grf
          && d.alias.is_none()
          && d.align == GrfAlign::Either
          && d.flags.spill_temp
          && d.byte_size() % self.grf_bytes == 0
      }
      None => false,
    }
  }
}

impl Kernel for Program {
  fn name(&self) -> &str {
    &self.name
  }

  fn simd_size(&self) -> u32 {
    self.simd_size
  }

  fn insts(&self) -> MyRange<InstIx> {
    MyRange::new(InstIx::new(0), self.insts.len() as usize)
  }

  fn blocks(&self) -> MyRange<BlockIx> {
    MyRange::new(BlockIx::new(0), self.blocks.len() as usize)
  }

  fn entry_block(&self) -> BlockIx {
    BlockIx::new(0)
  }

  fn block_insts(&self, block: BlockIx) -> MyRange<InstIx> {
    let b = &self.blocks[block];
    MyRange::new(b.start, b.len as usize)
  }

  fn block_succs(&self, block: BlockIx) -> Vec<BlockIx> {
    self.blocks[block].cfg_succs.clone()
  }

  fn block_divergent(&self, block: BlockIx) -> bool {
    self.blocks[block].divergent
  }

  fn num_funcs(&self) -> u32 {
    self.funcs.len() as u32
  }

  fn block_func(&self, block: BlockIx) -> FuncIx {
    self.blocks[block].func
  }

  fn func_entry(&self, func: FuncIx) -> BlockIx {
    self.funcs[func.get_usize()].entry.unwrap_or(BlockIx::new(0))
  }

  fn callee_save_pseudo(&self, func: FuncIx) -> Option<DeclIx> {
    self.funcs[func.get_usize()].callee_save
  }

  fn get_inst_info(&self, inst: InstIx) -> InstInfo {
    self.insts[inst].info.clone()
  }

  fn declares(&self) -> &[Declare] {
    &self.decls
  }

  fn points_to(&self, addr: DeclIx) -> &[DeclIx] {
    let (root, _) = self.root_of(addr);
    self.pointees.get(&root).map(|v| v.as_slice()).unwrap_or(&[])
  }

  /// Fill every spilled declare into a fresh temporary before each
  /// instruction reading it, and spill the temporary after each instruction
  /// writing it.  A write that covers the whole declare in every channel
  /// gets a kill instead of a fill.
  fn insert_spill_code(
    &mut self, req: &SpillRequest,
  ) -> Result<SpillOutcome, String> {
    debug!("insert_spill_code: begin, {} ranges", req.ranges.len());
    for r in req.ranges.iter() {
      match self.decls.get(r.decl.get_usize()) {
        None => return Err(format!("no such declare {:?}", r.decl)),
        Some(d) if d.alias.is_some() => {
          return Err(format!("declare '{}' is an alias", d.name))
        }
        Some(_) => {}
      }
    }
    self.grf_bytes = req.grf_bytes;

    let mut outcome = SpillOutcome::default();
    self.rebuild(|prog, bix, out| {
      let b = prog.blocks[bix].clone();
      for iix in b.start.dotdot(b.start.plus(b.len)) {
        prog.spill_one(iix, b.divergent, req, out, &mut outcome);
      }
    });
    info!(
      "insert_spill_code: {} fills, {} spills, {} temporaries",
      outcome.num_fills,
      outcome.num_spills,
      outcome.new_declares.len()
    );
    Ok(outcome)
  }

  /// Merge runs of adjacent fills from consecutive scratch offsets into one
  /// wider fill.  The merged temporaries become aliases of the wide one.
  fn coalesce_spill_code(&mut self) {
    let mut merged = 0;
    self.rebuild(|prog, bix, out| {
      let b = prog.blocks[bix].clone();
      let end = b.start.plus(b.len);
      let mut iix = b.start;
      while iix < end {
        let first = prog.insts[iix].clone();
        let mut group = vec![iix];
        if prog.fill_joins(iix, first.mem) {
          let mut next_mem = first.mem + fill_size(&first);
          let mut j = iix.plus(1);
          while j < end && prog.fill_joins(j, next_mem) {
            next_mem += fill_size(&prog.insts[j]);
            group.push(j);
            j = j.plus(1);
          }
        }
        if group.len() < 2 {
          out.push(first);
          iix = iix.plus(1);
          continue;
        }

        let total: u32 = group.iter().map(|g| fill_size(&prog.insts[*g])).sum();
        let mut wide = Declare::grf(
          &format!("fill.t{}", prog.num_temps),
          ElemType::UB,
          total,
        );
        wide.flags.spill_temp = true;
        prog.num_temps += 1;
        let w = prog.decl(wide);
        let mut off = 0;
        for g in group.iter() {
          if let Some(op) = prog.insts[*g].info.dst {
            prog.decls[op.decl.get_usize()].alias = Some((w, off));
            off += op.size;
          }
        }
        out.push(i_fill(prog.v(w), first.mem));
        merged += group.len() - 1;
        iix = iix.plus(group.len() as u32);
      }
    });
    debug!("coalesce_spill_code: {} fills merged away", merged);
  }
}

fn fill_size(i: &Inst) -> u32 {
  i.info.dst.map_or(0, |op| op.size)
}

//=============================================================================
// The interpreter.  Storage is byte-addressed and every byte is either a
// known value or garbage (`None`).  Before allocation each root declare has
// its own storage; after, declares live in the physical register files at
// the locations the allocator gave them.  Each instruction computes its
// destination bytes as a hash of what it reads, so any clobbered value
// shows up as a different trace.

#[derive(PartialEq)]
pub enum RunStage {
  BeforeRegalloc,
  AfterRegalloc,
}

/// What an instruction of the original program read, and where.
#[derive(Clone, Debug, PartialEq)]
pub struct TraceEntry {
  pub origin: u32,
  pub bytes: Vec<Option<u8>>,
}

#[derive(Clone, Debug, Default)]
pub struct RunResult {
  pub trace: Vec<TraceEntry>,
  /// Final value of each output declare.
  pub outputs: Vec<(String, Vec<Option<u8>>)>,
  pub n_insts: usize,
  pub n_fills: usize,
  pub n_spills: usize,
}

/// Upper bound on instructions executed per run.
const MAX_STEPS: usize = 100_000;

fn input_byte(decl: DeclIx, k: u32) -> u8 {
  (decl.get().wrapping_mul(131).wrapping_add(k.wrapping_mul(29)) & 0xff) as u8
}

fn mix(h: u32, v: u32) -> u32 {
  (h ^ v).wrapping_mul(16_777_619)
}

/// The bytes `op` covers, relative to its declare.
fn op_bytes(op: &Operand) -> Vec<u32> {
  if op.stride <= 1 {
    return (op.offset..op.end()).collect();
  }
  let elem = op.elem_size.max(1);
  let chans = (op.size / elem - 1) / op.stride + 1;
  let mut v = vec![];
  for c in 0..chans {
    let base = op.offset + c * op.stride * elem;
    v.extend(base..base + elem);
  }
  v
}

struct Alloc<'a> {
  result: &'a RegAllocResult,
  opts: &'a RegAllocOptions,
}

struct IState<'a> {
  prog: &'a Program,
  alloc: Option<Alloc<'a>>,
  /// Before allocation, one space per declare; after, one per register
  /// file.
  spaces: Vec<Vec<Option<u8>>>,
  scratch: Vec<Option<u8>>,
  visits: Vec<u32>,
  call_stack: Vec<BlockIx>,
  res: RunResult,
}

impl<'a> IState<'a> {
  fn new(prog: &'a Program, alloc: Option<Alloc<'a>>) -> Self {
    let spaces = match &alloc {
      None => prog
        .decls
        .iter()
        .map(|d| vec![None; d.byte_size() as usize])
        .collect(),
      Some(a) => {
        let mut s = vec![vec![]; NUM_REG_FILES];
        for file in RegFile::all().iter() {
          let units = a.opts.file_size(*file, a.result.num_grf);
          s[file.index()] =
            vec![None; (units * a.opts.unit_bytes(*file)) as usize];
        }
        s
      }
    };
    IState {
      prog,
      alloc,
      spaces,
      scratch: vec![],
      visits: vec![0; prog.blocks.len() as usize],
      call_stack: vec![],
      res: RunResult::default(),
    }
  }

  /// Space and byte address of byte `k` of declare `d`.
  fn addr(&self, d: DeclIx, k: u32) -> Result<(usize, usize), String> {
    let (root, off) = self.prog.root_of(d);
    let rd = &self.prog.decls[root.get_usize()];
    let a = match &self.alloc {
      None => return Ok((root.get_usize(), (off + k) as usize)),
      Some(a) => a,
    };
    let at = a.result.assignment(root).ok_or_else(|| {
      format!("declare '{}' is used but has no register", rd.name)
    })?;
    let elem = rd.elem_type.size();
    let base = match rd.reg_file {
      RegFile::Grf => at.reg * a.opts.grf_bytes + at.sub_reg * elem,
      RegFile::Scalar => at.reg * a.opts.scalar_reg_bytes + at.sub_reg * elem,
      RegFile::Flag => (at.reg * 2 + at.sub_reg) * 2,
      RegFile::Address => at.sub_reg * elem,
    };
    Ok((rd.reg_file.index(), (base + off + k) as usize))
  }

  fn get(&self, d: DeclIx, k: u32) -> Result<Option<u8>, String> {
    let (s, a) = self.addr(d, k)?;
    match self.spaces[s].get(a) {
      Some(v) => Ok(*v),
      None => Err(format!("read of {:?} byte {} out of range", d, k)),
    }
  }

  fn set(&mut self, d: DeclIx, k: u32, v: Option<u8>) -> Result<(), String> {
    let (s, a) = self.addr(d, k)?;
    match self.spaces[s].get_mut(a) {
      Some(slot) => {
        *slot = v;
        Ok(())
      }
      None => Err(format!("write of {:?} byte {} out of range", d, k)),
    }
  }

  fn read_op(&self, op: &Operand) -> Result<Vec<Option<u8>>, String> {
    op_bytes(op).into_iter().map(|k| self.get(op.decl, k)).collect()
  }

  fn scratch_at(&mut self, off: usize) -> &mut Option<u8> {
    if self.scratch.len() <= off {
      self.scratch.resize(off + 1, None);
    }
    &mut self.scratch[off]
  }

  /// Where a declare's memory copy lives, if it was spilled.
  fn spill_slot(&self, d: DeclIx) -> Option<u32> {
    self.alloc.as_ref().and_then(|a| {
      a.result.spilled.iter().find(|s| s.decl == d).map(|s| s.spill_offset)
    })
  }

  fn init_inputs(&mut self) -> Result<(), String> {
    let prog = self.prog;
    for (i, d) in prog.decls.iter().enumerate() {
      if !d.flags.input || d.alias.is_some() {
        continue;
      }
      let dix = DeclIx::new(i as u32);
      for k in 0..d.byte_size() {
        let v = Some(input_byte(dix, k));
        match self.spill_slot(dix) {
          Some(off) => *self.scratch_at((off + k) as usize) = v,
          None => self.set(dix, k, v)?,
        }
      }
    }
    Ok(())
  }

  fn collect_outputs(&mut self) -> Result<(), String> {
    let prog = self.prog;
    for (i, d) in prog.decls.iter().enumerate() {
      if !d.flags.output || d.alias.is_some() {
        continue;
      }
      let dix = DeclIx::new(i as u32);
      let mut bytes = vec![];
      for k in 0..d.byte_size() {
        bytes.push(match self.spill_slot(dix) {
          Some(off) => *self.scratch_at((off + k) as usize),
          None => self.get(dix, k)?,
        });
      }
      self.res.outputs.push((d.name.clone(), bytes));
    }
    Ok(())
  }

  fn step(&mut self, iix: InstIx) -> Result<(), String> {
    let prog = self.prog;
    let inst = &prog.insts[iix];
    let info = &inst.info;
    self.res.n_insts += 1;
    match info.kind {
      InstKind::Fill => {
        self.res.n_fills += 1;
        if let Some(op) = info.dst {
          for (n, k) in op_bytes(&op).into_iter().enumerate() {
            let v = *self.scratch_at(inst.mem as usize + n);
            self.set(op.decl, k, v)?;
          }
        }
        return Ok(());
      }
      InstKind::Spill => {
        self.res.n_spills += 1;
        if let Some(op) = info.src(0) {
          let bytes = self.read_op(&op)?;
          for (n, v) in bytes.into_iter().enumerate() {
            *self.scratch_at(inst.mem as usize + n) = v;
          }
        }
        return Ok(());
      }
      InstKind::Kill => return Ok(()),
      _ => {}
    }

    let mut read = vec![];
    for op in info.reads() {
      read.extend(self.read_op(&op)?);
    }
    if let Some(origin) = inst.origin {
      self.res.trace.push(TraceEntry { origin, bytes: read.clone() });
    }
    let poisoned = read.iter().any(|b| b.is_none());
    let mut h = mix(0x811c_9dc5, inst.origin.unwrap_or(u32::MAX));
    for b in read.iter() {
      h = mix(h, b.unwrap_or(0) as u32);
    }
    let writes: Vec<Operand> = info.writes().collect();
    for (w, op) in writes.iter().enumerate() {
      for k in op_bytes(op) {
        let v = if poisoned {
          None
        } else {
          Some((mix(mix(h, w as u32), k) >> 24) as u8)
        };
        self.set(op.decl, k, v)?;
      }
    }
    Ok(())
  }

  /// Pick where control goes at the end of `bix`, or `None` at the end of
  /// the kernel.  Branches cycle through their successors on successive
  /// visits so loops run more than once.
  fn next_block(&mut self, bix: BlockIx) -> Option<BlockIx> {
    let prog = self.prog;
    let b = &prog.blocks[bix];
    let last = &prog.insts[b.start.plus(b.len - 1)].info;
    match last.kind {
      InstKind::Call { callee, .. } => {
        if let Some(ret) = b.succs.first() {
          self.call_stack.push(*ret);
        }
        return prog.funcs[callee.get_usize()].entry;
      }
      InstKind::Return => return self.call_stack.pop(),
      InstKind::Send { .. } if last.eot => return None,
      _ => {}
    }
    if b.succs.is_empty() {
      return None;
    }
    let n = self.visits[bix.get_usize()];
    self.visits[bix.get_usize()] += 1;
    Some(b.succs[n as usize % b.succs.len()])
  }

  fn run(&mut self) -> Result<(), String> {
    self.init_inputs()?;
    let prog = self.prog;
    let mut cur = Some(BlockIx::new(0));
    while let Some(bix) = cur {
      let b = &prog.blocks[bix];
      for iix in b.start.dotdot(b.start.plus(b.len)) {
        self.step(iix)?;
      }
      if self.res.n_insts > MAX_STEPS {
        return Err(format!("more than {} instructions executed", MAX_STEPS));
      }
      cur = self.next_block(bix);
    }
    self.collect_outputs()
  }
}

pub fn run_program(
  prog: &Program, who: &str, run_stage: RunStage,
  alloc: Option<(&RegAllocResult, &RegAllocOptions)>,
) -> Result<RunResult, String> {
  let alloc = match (run_stage, alloc) {
    (RunStage::BeforeRegalloc, _) => None,
    (RunStage::AfterRegalloc, Some((result, opts))) => {
      Some(Alloc { result, opts })
    }
    (RunStage::AfterRegalloc, None) => {
      return Err("running after allocation needs a result".to_string())
    }
  };
  let mut st = IState::new(prog, alloc);
  st.run()?;
  info!(
    "Running stage '{}': done.  {} insts, {} fills, {} spills",
    who, st.res.n_insts, st.res.n_fills, st.res.n_spills
  );
  Ok(st.res)
}

/// Check that every instruction of the original program read the same
/// bytes after allocation as before, wherever it read a defined value
/// before, and that the outputs agree.
pub fn check_results(
  before: &RunResult, after: &RunResult,
) -> Result<(), String> {
  if before.trace.len() != after.trace.len() {
    return Err(format!(
      "{} instructions traced before allocation, {} after",
      before.trace.len(),
      after.trace.len()
    ));
  }
  for (b, a) in before.trace.iter().zip(after.trace.iter()) {
    if b.origin != a.origin || b.bytes.len() != a.bytes.len() {
      return Err(format!(
        "control flow differs at original instruction {}",
        b.origin
      ));
    }
    for (k, (vb, va)) in b.bytes.iter().zip(a.bytes.iter()).enumerate() {
      if vb.is_some() && vb != va {
        return Err(format!(
          "original instruction {} read byte {} as {:?}, expected {:?}",
          b.origin, k, va, vb
        ));
      }
    }
  }
  for ((name, b), (_, a)) in before.outputs.iter().zip(after.outputs.iter()) {
    for (k, (vb, va)) in b.iter().zip(a.iter()).enumerate() {
      if vb.is_some() && vb != va {
        return Err(format!("output '{}' byte {} differs", name, k));
      }
    }
  }
  Ok(())
}
