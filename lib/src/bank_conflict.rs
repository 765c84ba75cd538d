/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Bank and bundle conflict hints.  This pass assigns no registers: it only
//! records, per live range, which bank its first register should land in so
//! that the sources of three-source and DPAS instructions are read from
//! different banks in the same cycle.

use log::{debug, info};

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

use crate::analysis::{loop_weight, CfgInfo, VarTable};
use crate::data_structures::{InstIx, LrIx, TypedIxVec};
use crate::interface::{
  InstInfo, InstKind, Kernel, Operand, Platform, RegAllocOptions, RegFile,
};
use crate::live_range::LiveRange;

/// Bank hint for the first register of a range.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum BankConflict {
  None,
  FirstHalfEven,
  FirstHalfOdd,
  SecondHalfEven,
  SecondHalfOdd,
}

impl BankConflict {
  pub fn new(second_half: bool, odd: bool) -> Self {
    match (second_half, odd) {
      (false, false) => BankConflict::FirstHalfEven,
      (false, true) => BankConflict::FirstHalfOdd,
      (true, false) => BankConflict::SecondHalfEven,
      (true, true) => BankConflict::SecondHalfOdd,
    }
  }

  pub fn is_none(self) -> bool {
    self == BankConflict::None
  }

  pub fn is_second_half(self) -> bool {
    match self {
      BankConflict::SecondHalfEven | BankConflict::SecondHalfOdd => true,
      _ => false,
    }
  }

  pub fn is_odd(self) -> bool {
    match self {
      BankConflict::FirstHalfOdd | BankConflict::SecondHalfOdd => true,
      _ => false,
    }
  }

  pub fn is_even(self) -> bool {
    match self {
      BankConflict::FirstHalfEven | BankConflict::SecondHalfEven => true,
      _ => false,
    }
  }
}

/// Bank of a physical GRF: 0 for even, 1 for odd.
pub fn bank_of(reg: u32, one_grf_bank_division: bool) -> u32 {
  if one_grf_bank_division {
    reg % 2
  } else {
    (reg / 2) % 2
  }
}

/// DPAS bundle of a physical GRF.
pub fn bundle_of(reg: u32) -> u32 {
  (reg / 2) % 8
}

/// A pair of ranges read by the same DPAS, with the row distance between
/// the two operands.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BundlePair {
  pub lr: LrIx,
  pub other: LrIx,
  pub offset: i32,
}

/// The kernel-level outcome of the pass.
#[derive(Clone, Debug, Default)]
pub struct BankDecision {
  /// Enough three-source work for the hints to be worth honoring.
  pub three_source_candidate: bool,
  /// Many instructions read two sources from one bank whatever we do;
  /// spread ranges over both halves of the file as well.
  pub high_internal_conflict: bool,
  pub num_three_source: u32,
  pub internal_conflicts: u32,
  pub bundle_pairs: Vec<BundlePair>,
}

//=============================================================================
// Per-operand hint assignment

/// The source of one instruction as seen by the pass: its range and the
/// register row the operand starts at within it.
#[derive(Clone, Copy, Debug)]
pub struct BankOperand {
  pub lr: LrIx,
  pub row: u32,
}

pub struct BankAssigner {
  one_grf_bank_division: bool,
  /// Registers pinned so far, by [half][bank].
  counts: [[u32; 2]; 2],
  pub internal_conflicts: u32,
}

impl BankAssigner {
  pub fn new(one_grf_bank_division: bool) -> Self {
    Self { one_grf_bank_division, counts: [[0; 2]; 2], internal_conflicts: 0 }
  }

  /// Does starting `row` registers into a range flip its bank?  Hinted
  /// ranges start on a bank boundary, so this depends on `row` alone.
  fn row_flip(&self, row: u32) -> u32 {
    if self.one_grf_bank_division {
      row % 2
    } else {
      (row / 2) % 2
    }
  }

  /// The bank this operand reads from, if already decided.
  fn operand_bank(
    &self, lrs: &TypedIxVec<LrIx, LiveRange>, op: BankOperand,
  ) -> Option<u32> {
    let lr = &lrs[op.lr];
    if let Some(reg) = lr.precolored {
      return Some(bank_of(reg + op.row, self.one_grf_bank_division));
    }
    if lr.bank.is_none() {
      return None;
    }
    let base = if lr.bank.is_odd() { 1 } else { 0 };
    Some(base ^ self.row_flip(op.row))
  }

  fn emptier_half(&self) -> usize {
    let first = self.counts[0][0] + self.counts[0][1];
    let second = self.counts[1][0] + self.counts[1][1];
    if second < first {
      1
    } else {
      0
    }
  }

  /// Pin `op` so that it reads from `bank`.
  fn pin(
    &mut self, lrs: &mut TypedIxVec<LrIx, LiveRange>, op: BankOperand,
    bank: u32, half: usize,
  ) {
    let base = bank ^ self.row_flip(op.row);
    let lr = &mut lrs[op.lr];
    lr.bank = BankConflict::new(half == 1, base == 1);
    self.counts[half][base as usize] += lr.num_regs;
  }

  fn lighter_bank(&self, half: usize) -> u32 {
    if self.counts[half][1] < self.counts[half][0] {
      1
    } else {
      0
    }
  }

  fn eligible(lrs: &TypedIxVec<LrIx, LiveRange>, op: &BankOperand) -> bool {
    let lr = &lrs[op.lr];
    lr.reg_file == RegFile::Grf && !lr.is_pseudo()
  }

  /// Two operands that must read from different banks.
  pub fn separate(
    &mut self, lrs: &mut TypedIxVec<LrIx, LiveRange>, a: BankOperand,
    b: BankOperand,
  ) {
    if a.lr == b.lr || !Self::eligible(lrs, &a) || !Self::eligible(lrs, &b) {
      return;
    }
    match (self.operand_bank(lrs, a), self.operand_bank(lrs, b)) {
      (Some(x), Some(y)) => {
        if x == y {
          self.internal_conflicts += 1;
        }
      }
      (Some(x), None) => {
        let half = self.emptier_half();
        self.pin(lrs, b, 1 - x, half);
      }
      (None, Some(y)) => {
        let half = self.emptier_half();
        self.pin(lrs, a, 1 - y, half);
      }
      (None, None) => {
        let half = self.emptier_half();
        let bank = self.lighter_bank(half);
        self.pin(lrs, a, bank, half);
        self.pin(lrs, b, 1 - bank, half);
      }
    }
  }

  /// `center` must read from a bank different from every one of `others`.
  pub fn separate_from_all(
    &mut self, lrs: &mut TypedIxVec<LrIx, LiveRange>, center: BankOperand,
    others: &[BankOperand],
  ) {
    if !Self::eligible(lrs, &center) {
      return;
    }
    let view: &TypedIxVec<LrIx, LiveRange> = lrs;
    let others: Vec<BankOperand> = others
      .iter()
      .filter(|o| o.lr != center.lr && Self::eligible(view, o))
      .cloned()
      .collect();
    if others.is_empty() {
      return;
    }
    let center_bank = match self.operand_bank(lrs, center) {
      Some(bank) => bank,
      None => {
        // Take the bank none of the decided operands is on, if any.
        let view: &TypedIxVec<LrIx, LiveRange> = lrs;
        let decided: Vec<u32> =
          others.iter().filter_map(|o| self.operand_bank(view, *o)).collect();
        let half = self.emptier_half();
        let bank = if decided.iter().all(|b| *b == 0) && !decided.is_empty() {
          1
        } else if decided.iter().all(|b| *b == 1) && !decided.is_empty() {
          0
        } else {
          self.lighter_bank(half)
        };
        self.pin(lrs, center, bank, half);
        bank
      }
    };
    for o in others.iter() {
      match self.operand_bank(lrs, *o) {
        Some(bank) => {
          if bank == center_bank {
            self.internal_conflicts += 1;
          }
        }
        None => {
          let half = self.emptier_half();
          self.pin(lrs, *o, 1 - center_bank, half);
        }
      }
    }
  }
}

//=============================================================================
// The pass

fn grf_source(
  info: &InstInfo, n: usize, vars: &VarTable,
  lrs: &TypedIxVec<LrIx, LiveRange>, grf_bytes: u32,
) -> Option<BankOperand> {
  let op: Operand = info.src(n)?;
  let lr = vars.lr_of(op.decl)?;
  if lrs[lr].reg_file != RegFile::Grf {
    return None;
  }
  Some(BankOperand { lr, row: op.offset / grf_bytes })
}

/// Decide whether bank conflict reduction is worthwhile for this kernel and,
/// if so, set the hints.  Three-source instructions are visited bottom-up in
/// each block.
#[inline(never)]
pub fn compute_bank_conflicts<K: Kernel>(
  kernel: &K, infos: &TypedIxVec<InstIx, InstInfo>, vars: &VarTable,
  cfg: &CfgInfo, lrs: &mut TypedIxVec<LrIx, LiveRange>,
  opts: &RegAllocOptions,
) -> BankDecision {
  debug!("compute_bank_conflicts: begin");
  let mut decision = BankDecision::default();

  // === BEGIN kernel-level estimate ===
  let mut total: u64 = 0;
  let mut three_src: u64 = 0;
  for bix in kernel.blocks() {
    let w = loop_weight(opts.loop_iteration_factor, cfg.depth_map[bix]) as u64;
    for iix in kernel.block_insts(bix) {
      total += w;
      match infos[iix].kind {
        InstKind::Mad | InstKind::Dpas => {
          three_src += w;
          decision.num_three_source += 1;
        }
        _ => {}
      }
    }
  }
  decision.three_source_candidate = opts.do_bank_conflict_reduction
    && total > 0
    && (three_src as f64 / total as f64) >= opts.three_source_ratio as f64;
  // === END kernel-level estimate ===

  if !decision.three_source_candidate {
    debug!("compute_bank_conflicts: end, not worthwhile");
    return decision;
  }

  let mut assigner = BankAssigner::new(opts.one_grf_bank_division);
  let grf_bytes = opts.grf_bytes;
  for bix in kernel.blocks() {
    let insts: Vec<InstIx> = kernel.block_insts(bix).into_iter().collect();
    for iix in insts.into_iter().rev() {
      let info = &infos[iix];
      let s0 = grf_source(info, 0, vars, lrs, grf_bytes);
      let s1 = grf_source(info, 1, vars, lrs, grf_bytes);
      let s2 = grf_source(info, 2, vars, lrs, grf_bytes);
      match (info.kind, opts.platform) {
        (InstKind::Mad, Platform::Legacy) => {
          if let (Some(a), Some(b)) = (s1, s2) {
            assigner.separate(lrs, a, b);
          }
        }
        (InstKind::Mad, Platform::Tgl) | (InstKind::Dpas, _) => {
          if let Some(c) = s1 {
            let others: Vec<BankOperand> =
              s0.iter().chain(s2.iter()).cloned().collect();
            assigner.separate_from_all(lrs, c, &others);
          }
          if info.kind == InstKind::Dpas {
            if let Some(c) = s1 {
              for o in s0.iter().chain(s2.iter()) {
                if o.lr != c.lr {
                  decision.bundle_pairs.push(BundlePair {
                    lr: c.lr,
                    other: o.lr,
                    offset: c.row as i32 - o.row as i32,
                  });
                }
              }
            }
          }
        }
        _ => {}
      }
    }
  }

  decision.internal_conflicts = assigner.internal_conflicts;
  decision.high_internal_conflict = decision.num_three_source > 0
    && (decision.internal_conflicts as f32 / decision.num_three_source as f32)
      > opts.internal_conflict_ratio;

  info!(
    "bank conflicts: {} three-source insts, {} internal conflicts{}",
    decision.num_three_source,
    decision.internal_conflicts,
    if decision.high_internal_conflict { " (high)" } else { "" }
  );
  debug!("compute_bank_conflicts: end");
  decision
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bit_set::BitSet;
  use crate::data_structures::DeclIx;
  use crate::phy_reg_usage::{PhyRegUsage, SearchRequest};

  fn grf_ranges(n: u32) -> TypedIxVec<LrIx, LiveRange> {
    let mut lrs = TypedIxVec::new();
    for i in 0..n {
      lrs.push(LiveRange::new(DeclIx::new(i), RegFile::Grf, 1));
    }
    lrs
  }

  fn op(lr: u32, row: u32) -> BankOperand {
    BankOperand { lr: LrIx::new(lr), row }
  }

  #[test]
  fn predicates_are_explicit() {
    assert!(BankConflict::SecondHalfOdd.is_second_half());
    assert!(BankConflict::SecondHalfOdd.is_odd());
    assert!(!BankConflict::SecondHalfOdd.is_even());
    assert!(!BankConflict::FirstHalfEven.is_second_half());
    assert!(BankConflict::FirstHalfEven.is_even());
    assert!(!BankConflict::None.is_even() && !BankConflict::None.is_odd());
  }

  #[test]
  fn bank_division() {
    assert_eq!(bank_of(5, true), 1);
    assert_eq!(bank_of(5, false), 0);
    assert_eq!(bank_of(6, false), 1);
  }

  #[test]
  fn fresh_pair_gets_complementary_banks() {
    let mut lrs = grf_ranges(3);
    let mut a = BankAssigner::new(true);
    a.separate(&mut lrs, op(0, 0), op(1, 0));
    assert!(!lrs[LrIx::new(0)].bank.is_none());
    assert_ne!(lrs[LrIx::new(0)].bank.is_odd(), lrs[LrIx::new(1)].bank.is_odd());

    // A third range paired with lr1 lands opposite to it.
    a.separate(&mut lrs, op(2, 0), op(1, 0));
    assert_ne!(lrs[LrIx::new(2)].bank.is_odd(), lrs[LrIx::new(1)].bank.is_odd());
    assert_eq!(a.internal_conflicts, 0);

    // lr0 and lr2 now share a bank: an unavoidable conflict.
    a.separate(&mut lrs, op(0, 0), op(2, 0));
    assert_eq!(a.internal_conflicts, 1);
  }

  #[test]
  fn row_offset_adjusts_bank() {
    let mut lrs = grf_ranges(2);
    lrs[LrIx::new(1)].num_regs = 2;
    let mut a = BankAssigner::new(true);
    // Operand starts one row into lr1, so lr1 itself shares lr0's bank.
    a.separate(&mut lrs, op(0, 0), op(1, 1));
    assert_eq!(lrs[LrIx::new(0)].bank.is_odd(), lrs[LrIx::new(1)].bank.is_odd());
  }

  #[test]
  fn center_differs_from_all() {
    let mut lrs = grf_ranges(3);
    lrs[LrIx::new(0)].precolored = Some(4);
    let mut a = BankAssigner::new(true);
    a.separate_from_all(&mut lrs, op(1, 0), &[op(0, 0), op(2, 0)]);
    assert!(lrs[LrIx::new(1)].bank.is_odd());
    assert!(lrs[LrIx::new(2)].bank.is_even());
    assert_eq!(a.internal_conflicts, 0);
  }

  #[test]
  fn two_grf_rows_flip_every_other_pair() {
    let mut lrs = grf_ranges(2);
    lrs[LrIx::new(0)].precolored = Some(0);
    lrs[LrIx::new(1)].num_regs = 4;
    let mut a = BankAssigner::new(false);
    // Row 1 sits in the same pair as row 0; row 2 is in the other bank.
    assert_eq!(a.row_flip(1), 0);
    assert_eq!(a.row_flip(2), 1);
    a.separate(&mut lrs, op(0, 0), op(1, 2));
    assert!(lrs[LrIx::new(1)].bank.is_even());
    let none = BitSet::new(32);
    let mut u = PhyRegUsage::new(RegFile::Grf, 32);
    u.mark_busy(0, 1);
    let mut req = SearchRequest::new(4, 1, &none);
    req.one_grf_bank_division = false;
    req.bank = lrs[LrIx::new(1)].bank;
    let start = u.find(&req).unwrap();
    assert_eq!(bank_of(start + 2, false), 1 - bank_of(0, false));
    assert_eq!(a.internal_conflicts, 0);
  }
}
