/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Per-attempt coloring state for each variable taking part in allocation,
//! and the forbidden-register sets derived from the register file and the
//! calling convention.

use log::debug;
use smallvec::SmallVec;

use crate::analysis::{FlowInfo, VarRefSummary, VarTable};
use crate::bank_conflict::BankConflict;
use crate::bit_set::BitSet;
use crate::data_structures::{DeclIx, LrIx, TypedIxVec};
use crate::interface::{
  DeclFlags, GrfAlign, Kernel, PhysReg, PseudoKind, RegAllocOptions,
  RegFile, SubRegAlign, STACK_CALL_RESERVED_GRF,
};

/// EOT sends must take their payload from this many GRFs at the top of the
/// register file.
pub const EOT_GRF_WINDOW: u32 = 16;

/// Groups of GRFs a live range may be barred from.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ForbiddenKind {
  /// r0 and the registers the stack-call ABI keeps for itself.
  Reserved,
  /// The GRFs held back for spill temporaries by a fail-safe attempt.
  FailSafe,
  /// The caller-save registers, r1 up to the first callee-save register.
  CallerSave,
  /// The callee-save registers.
  CalleeSave,
  /// Everything below the EOT window.
  Eot,
}

//=============================================================================
// Live ranges

#[derive(Clone, Debug)]
pub struct LiveRange {
  pub decl: DeclIx,
  pub reg_file: RegFile,
  /// Size in allocation units: GRFs, flag/address words, scalar registers.
  pub num_regs: u32,
  pub align: GrfAlign,
  pub sub_align: SubRegAlign,
  pub pseudo: PseudoKind,
  pub flags: DeclFlags,
  pub forbidden: SmallVec<[ForbiddenKind; 3]>,
  /// Split parent and this range's unit offset within it.
  pub parent: Option<(LrIx, u32)>,
  /// Fixed location, in units, from an earlier pass.
  pub precolored: Option<u32>,
  pub num_refs: u32,
  pub weighted_refs: u32,
  pub infinite_cost: bool,
  /// Reachable through some address register.
  pub address_sensitive: bool,
  pub bank: BankConflict,
  /// Payload of an end-of-thread send.
  pub eot_src: bool,
  /// Live across some call.
  pub crosses_call: bool,
  pub degree: u32,
  pub spill_cost: f32,
}

impl LiveRange {
  pub fn new(
    decl: DeclIx, reg_file: RegFile, num_regs: u32,
  ) -> Self {
    Self {
      decl,
      reg_file,
      num_regs,
      align: GrfAlign::Either,
      sub_align: SubRegAlign::Any,
      pseudo: PseudoKind::None,
      flags: DeclFlags::default(),
      forbidden: SmallVec::new(),
      parent: None,
      precolored: None,
      num_refs: 0,
      weighted_refs: 0,
      infinite_cost: false,
      address_sensitive: false,
      bank: BankConflict::None,
      eot_src: false,
      crosses_call: false,
      degree: 0,
      spill_cost: 0.0,
    }
  }

  pub fn is_pseudo(&self) -> bool {
    self.pseudo != PseudoKind::None
  }

  pub fn add_forbidden(&mut self, kind: ForbiddenKind) {
    if !self.forbidden.contains(&kind) {
      self.forbidden.push(kind);
    }
  }

  /// Alignment in units: rows for the GRF, words for flag/address.
  pub fn unit_align(&self) -> u32 {
    match self.reg_file {
      RegFile::Grf => self.align.rows(),
      RegFile::Flag | RegFile::Address => self.sub_align.words(),
      RegFile::Scalar => 1,
    }
  }
}

/// Number of allocation units a declare of `byte_size` bytes needs.
pub fn units_for(bytes: u32, unit_bytes: u32) -> u32 {
  ((bytes + unit_bytes - 1) / unit_bytes).max(1)
}

/// Convert a precolored physical location to units of its file.
pub fn phys_to_units(
  at: PhysReg, file: RegFile, elem_size: u32, opts: &RegAllocOptions,
) -> u32 {
  match file {
    RegFile::Grf | RegFile::Scalar => at.reg,
    RegFile::Flag => at.reg * 2 + at.sub_reg,
    RegFile::Address => at.sub_reg * elem_size / opts.unit_bytes(file),
  }
}

/// Convert a unit number plus byte offset back to a physical location.
pub fn units_to_phys(
  unit: u32, byte_offset: u32, file: RegFile, elem_size: u32,
  opts: &RegAllocOptions,
) -> PhysReg {
  let unit_bytes = opts.unit_bytes(file);
  let elem_size = elem_size.max(1);
  match file {
    RegFile::Grf | RegFile::Scalar => PhysReg::new(
      unit + byte_offset / unit_bytes,
      (byte_offset % unit_bytes) / elem_size,
    ),
    RegFile::Flag => {
      let w = unit + byte_offset / 2;
      PhysReg::new(w / 2, w % 2)
    }
    RegFile::Address => {
      let w = unit + byte_offset / 2;
      PhysReg::new(0, w * 2 / elem_size)
    }
  }
}

/// Create exactly one live range per variable.
#[inline(never)]
pub fn create_live_ranges<K: Kernel>(
  kernel: &K, vars: &VarTable, sums: &TypedIxVec<LrIx, VarRefSummary>,
  opts: &RegAllocOptions, num_grf: u32, fail_safe: bool,
) -> TypedIxVec<LrIx, LiveRange> {
  debug!("create_live_ranges: begin");
  let decls = kernel.declares();

  // Pointees of any address register.
  let mut address_sensitive = vec![false; decls.len()];
  for (i, _) in decls.iter().enumerate() {
    for p in kernel.points_to(DeclIx::new(i as u32)) {
      if let Some(slot) = address_sensitive.get_mut(p.get_usize()) {
        *slot = true;
      }
    }
  }

  let mut lrs = TypedIxVec::<LrIx, LiveRange>::new();
  for (lr, dix) in vars.vars.enumerate() {
    let d = &decls[dix.get_usize()];
    let file = d.reg_file;
    let num_regs = match d.pseudo {
      PseudoKind::CallerSave => {
        opts.callee_save_start(num_grf).saturating_sub(1).max(1)
      }
      PseudoKind::CalleeSave => opts
        .callee_save_end(num_grf)
        .saturating_sub(opts.callee_save_start(num_grf))
        .max(1),
      PseudoKind::None => units_for(d.byte_size(), opts.unit_bytes(file)),
    };
    let mut r = LiveRange::new(*dix, file, num_regs);
    r.align = d.align;
    r.sub_align = d.sub_align;
    r.pseudo = d.pseudo;
    r.flags = d.flags;
    r.num_refs = sums[lr].num_refs;
    r.weighted_refs = sums[lr].weighted_refs;
    r.address_sensitive =
      d.flags.address_taken || address_sensitive[dix.get_usize()];
    r.precolored = d
      .precolored
      .map(|at| phys_to_units(at, file, d.elem_type.size(), opts));

    if file == RegFile::Grf {
      r.add_forbidden(ForbiddenKind::Reserved);
      if fail_safe && !d.flags.spill_temp {
        r.add_forbidden(ForbiddenKind::FailSafe);
      }
      if opts.has_stack_calls {
        match d.pseudo {
          PseudoKind::CallerSave => r.add_forbidden(ForbiddenKind::CalleeSave),
          PseudoKind::CalleeSave => r.add_forbidden(ForbiddenKind::CallerSave),
          PseudoKind::None => {}
        }
        if d.flags.old_frame_ptr {
          r.add_forbidden(ForbiddenKind::CallerSave);
        }
      }
      if let Some((parent, off)) = d.split_parent {
        if let Some(plr) = vars.lr_of(parent) {
          r.parent = Some((plr, off / opts.grf_bytes));
        }
      }
    }
    lrs.push(r);
  }
  debug!("create_live_ranges: end, {} ranges", lrs.len());
  lrs
}

//=============================================================================
// Forbidden registers

/// The forbidden GRF sets for one attempt, one mask per kind.
pub struct ForbiddenRegs {
  num_grf: u32,
  reserved: BitSet,
  fail_safe: BitSet,
  caller_save: BitSet,
  callee_save: BitSet,
  eot: BitSet,
}

impl ForbiddenRegs {
  pub fn new(opts: &RegAllocOptions, num_grf: u32, fail_safe: bool) -> Self {
    let n = num_grf as usize;
    let mut reserved = BitSet::new(n);
    if opts.reserve_r0 {
      reserved.insert(0);
    }
    let top = if opts.has_stack_calls {
      num_grf.saturating_sub(STACK_CALL_RESERVED_GRF)
    } else {
      num_grf
    };
    reserved.set_range(top as usize, n - top as usize);

    let mut fail_safe_set = BitSet::new(n);
    if fail_safe {
      let allocatable = num_grf - reserved.card() as u32;
      let count = opts.fail_safe_reserved_grf.min(allocatable / 2);
      let start = top.saturating_sub(count);
      fail_safe_set.set_range(start as usize, (top - start) as usize);
    }

    let mut caller_save = BitSet::new(n);
    let mut callee_save = BitSet::new(n);
    if opts.has_stack_calls {
      let start = opts.callee_save_start(num_grf);
      let end = opts.callee_save_end(num_grf);
      caller_save.set_range(1, start as usize - 1);
      callee_save.set_range(start as usize, (end - start) as usize);
    }

    let mut eot = BitSet::new(n);
    if opts.eot_grf_binding {
      eot.set_range(0, num_grf.saturating_sub(EOT_GRF_WINDOW) as usize);
    }

    Self {
      num_grf,
      reserved,
      fail_safe: fail_safe_set,
      caller_save,
      callee_save,
      eot,
    }
  }

  pub fn num_grf(&self) -> u32 {
    self.num_grf
  }

  pub fn kind_mask(&self, kind: ForbiddenKind) -> &BitSet {
    match kind {
      ForbiddenKind::Reserved => &self.reserved,
      ForbiddenKind::FailSafe => &self.fail_safe,
      ForbiddenKind::CallerSave => &self.caller_save,
      ForbiddenKind::CalleeSave => &self.callee_save,
      ForbiddenKind::Eot => &self.eot,
    }
  }

  /// Union of the masks that apply to `lr`, sized to its register file.
  pub fn mask_for(&self, lr: &LiveRange, file_size: u32) -> BitSet {
    let mut mask = BitSet::new(file_size as usize);
    if lr.reg_file != RegFile::Grf {
      return mask;
    }
    for kind in lr.forbidden.iter() {
      mask.union(self.kind_mask(*kind));
    }
    mask
  }
}

//=============================================================================
// Infinite spill cost

/// Mark as unspillable every block-local range referenced exactly twice
/// where the definition is read by the very next instruction.  Spilling such
/// a range would free nothing.  Blocks are walked bottom-up and candidacy is
/// dropped at the first definition seen.
#[inline(never)]
pub fn mark_infinite_spill_costs<K: Kernel>(
  kernel: &K, flow: &FlowInfo, lrs: &mut TypedIxVec<LrIx, LiveRange>,
) {
  debug!("mark_infinite_spill_costs: begin");
  let mut candidate: Vec<bool> = flow
    .sums
    .enumerate()
    .map(|(lr, s)| {
      s.num_refs == 2
        && s.only_block.is_some()
        && !lrs[lr].is_pseudo()
        && !flow.liveness.is_global(lr)
    })
    .collect();

  let mut count = 0;
  for bix in kernel.blocks() {
    let insts = kernel.block_insts(bix);
    for iix in insts.into_iter().collect::<Vec<_>>().into_iter().rev() {
      for (lr, _) in flow.refs[iix].defs.iter() {
        if !candidate[lr.get_usize()] {
          continue;
        }
        candidate[lr.get_usize()] = false;
        let next = iix.plus(1);
        if !insts.contains(next) {
          continue;
        }
        let read_next = flow.infos[next]
          .reads()
          .any(|op| flow.vars.lr_of(op.decl) == Some(*lr));
        if read_next {
          lrs[*lr].infinite_cost = true;
          count += 1;
        }
      }
    }
  }
  debug!("mark_infinite_spill_costs: end, {} ranges", count);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn forbidden_sets_for_stack_calls() {
    let mut opts = RegAllocOptions::default();
    opts.has_stack_calls = true;
    opts.num_callee_save_grf = 64;
    let f = ForbiddenRegs::new(&opts, 128, false);
    // r0 plus the top three.
    assert_eq!(f.kind_mask(ForbiddenKind::Reserved).to_vec(), vec![0, 125, 126, 127]);
    assert_eq!(opts.callee_save_start(128), 61);
    assert_eq!(f.kind_mask(ForbiddenKind::CallerSave).card(), 60);
    assert!(f.kind_mask(ForbiddenKind::CalleeSave).contains(61));
    assert!(f.kind_mask(ForbiddenKind::CalleeSave).contains(124));
    assert!(!f.kind_mask(ForbiddenKind::CalleeSave).contains(125));
  }

  #[test]
  fn fail_safe_reserve_is_capped() {
    let mut opts = RegAllocOptions::default();
    opts.fail_safe_reserved_grf = 8;
    let f = ForbiddenRegs::new(&opts, 128, true);
    assert_eq!(f.kind_mask(ForbiddenKind::FailSafe).to_vec(), (120..128).collect::<Vec<_>>());
    // With 9 allocatable registers only 4 are held back.
    let g = ForbiddenRegs::new(&opts, 10, true);
    assert_eq!(g.kind_mask(ForbiddenKind::FailSafe).to_vec(), vec![6, 7, 8, 9]);
  }

  #[test]
  fn spill_temps_escape_fail_safe() {
    let opts = RegAllocOptions::default();
    let f = ForbiddenRegs::new(&opts, 16, true);
    let mut ordinary = LiveRange::new(DeclIx::new(0), RegFile::Grf, 1);
    ordinary.add_forbidden(ForbiddenKind::Reserved);
    ordinary.add_forbidden(ForbiddenKind::FailSafe);
    let mut temp = ordinary.clone();
    temp.forbidden.retain(|k| *k != ForbiddenKind::FailSafe);
    assert!(f.mask_for(&ordinary, 16).contains(15));
    assert!(!f.mask_for(&temp, 16).contains(15));
    assert!(f.mask_for(&temp, 16).contains(0));
  }

  #[test]
  fn phys_conversions() {
    let opts = RegAllocOptions::default();
    assert_eq!(units_to_phys(5, 40, RegFile::Grf, 4, &opts), PhysReg::new(6, 2));
    assert_eq!(units_to_phys(3, 0, RegFile::Flag, 2, &opts), PhysReg::new(1, 1));
    assert_eq!(units_to_phys(4, 0, RegFile::Address, 2, &opts), PhysReg::new(0, 4));
    assert_eq!(phys_to_units(PhysReg::new(1, 1), RegFile::Flag, 2, &opts), 3);
    assert_eq!(units_for(33, 32), 2);
    assert_eq!(units_for(0, 32), 1);
  }
}
