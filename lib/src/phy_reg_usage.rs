/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Physical register usage while coloring one live range: which units its
//! colored neighbors occupy, and the search for a free aligned block.

use crate::bank_conflict::{bank_of, bundle_of, BankConflict};
use crate::bit_set::BitSet;
use crate::interface::RegFile;

/// What the search should look for, beyond a free block.
#[derive(Clone, Debug)]
pub struct SearchRequest<'a> {
  pub num_regs: u32,
  /// Start alignment in units.
  pub align: u32,
  pub forbidden: &'a BitSet,
  /// Honored for the GRF only.
  pub bank: BankConflict,
  /// Spread hinted ranges over both halves of the file.
  pub split_halves: bool,
  pub one_grf_bank_division: bool,
  /// Where to begin looking; the search wraps around to 0.
  pub start: u32,
  /// Bundles to stay clear of, if possible.
  pub avoid_bundles: &'a [u32],
}

impl<'a> SearchRequest<'a> {
  pub fn new(num_regs: u32, align: u32, forbidden: &'a BitSet) -> Self {
    Self {
      num_regs,
      align: align.max(1),
      forbidden,
      bank: BankConflict::None,
      split_halves: false,
      one_grf_bank_division: true,
      start: 0,
      avoid_bundles: &[],
    }
  }
}

pub struct PhyRegUsage {
  file: RegFile,
  size: u32,
  busy: BitSet,
  /// Placements of weak neighbors: sharing is allowed only from the same
  /// start.
  weak: Vec<(u32, u32)>,
}

impl PhyRegUsage {
  pub fn new(file: RegFile, size: u32) -> Self {
    Self { file, size, busy: BitSet::new(size as usize), weak: vec![] }
  }

  pub fn size(&self) -> u32 {
    self.size
  }

  pub fn mark_busy(&mut self, start: u32, len: u32) {
    self.busy.set_range(start as usize, len as usize);
  }

  pub fn add_weak(&mut self, start: u32, len: u32) {
    self.weak.push((start, len));
  }

  pub fn is_busy(&self, unit: u32) -> bool {
    self.busy.contains(unit as usize)
  }

  fn weak_ok(&self, start: u32, n: u32) -> bool {
    self.weak.iter().all(|(s, len)| {
      *s == start || start + n <= *s || s + len <= start
    })
  }

  /// Can a block of `n` units start at `start`?
  pub fn is_free(&self, start: u32, n: u32, forbidden: &BitSet) -> bool {
    if start + n > self.size {
      return false;
    }
    !self.busy.any_in_range(start as usize, n as usize)
      && !forbidden.any_in_range(start as usize, n as usize)
      && self.weak_ok(start, n)
  }

  /// Candidate starts in the order the search visits them.
  fn search_order(&self, req: &SearchRequest) -> Vec<u32> {
    let n = req.num_regs;
    if n == 0 || n > self.size {
      return vec![];
    }
    let last = self.size - n;
    let aligned: Vec<u32> =
      (0..=last).filter(|s| s % req.align == 0).collect();

    let hinted = self.file == RegFile::Grf && !req.bank.is_none();
    if hinted && req.split_halves {
      if req.bank.is_second_half() {
        if n > 1 {
          // Wide ranges in the second half grow down from the top.
          return aligned.into_iter().rev().collect();
        }
        let mid = self.size / 2;
        let (lo, hi): (Vec<u32>, Vec<u32>) =
          aligned.into_iter().partition(|s| *s < mid);
        return hi.into_iter().chain(lo).collect();
      }
      return aligned;
    }

    let start = req.start.min(self.size);
    let (before, after): (Vec<u32>, Vec<u32>) =
      aligned.into_iter().partition(|s| *s < start);
    after.into_iter().chain(before).collect()
  }

  /// Find a free block, preferring the hinted bank and then blocks clear of
  /// the bundles to avoid.
  pub fn find(&self, req: &SearchRequest) -> Option<u32> {
    self.find_with(req, |_| true)
  }

  /// Like `find`, but only over the starts `accept` agrees to.
  pub fn find_with<F: Fn(u32) -> bool>(
    &self, req: &SearchRequest, accept: F,
  ) -> Option<u32> {
    let free: Vec<u32> = self
      .search_order(req)
      .into_iter()
      .filter(|s| self.is_free(*s, req.num_regs, req.forbidden) && accept(*s))
      .collect();
    if free.is_empty() {
      return None;
    }
    let hinted = self.file == RegFile::Grf && !req.bank.is_none();
    // With two-register banks a hinted range starts on a bank boundary, so
    // that the bank of every row follows from the hint.
    let bank_ok = |s: u32| {
      !hinted
        || ((req.one_grf_bank_division || s % 2 == 0)
          && (bank_of(s, req.one_grf_bank_division) == 1)
            == req.bank.is_odd())
    };
    let bundle_ok = |s: u32| !req.avoid_bundles.contains(&bundle_of(s));
    free
      .iter()
      .find(|s| bank_ok(**s) && bundle_ok(**s))
      .or_else(|| free.iter().find(|s| bank_ok(**s)))
      .or_else(|| free.first())
      .cloned()
  }

  /// Take exactly `start`, if possible.
  pub fn try_exact(&self, start: u32, req: &SearchRequest) -> bool {
    start % req.align == 0 && self.is_free(start, req.num_regs, req.forbidden)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn first_fit_with_alignment() {
    let none = BitSet::new(16);
    let mut u = PhyRegUsage::new(RegFile::Grf, 16);
    u.mark_busy(0, 3);
    assert_eq!(u.find(&SearchRequest::new(2, 1, &none)), Some(3));
    assert_eq!(u.find(&SearchRequest::new(2, 2, &none)), Some(4));
    assert_eq!(u.find(&SearchRequest::new(4, 4, &none)), Some(4));
    assert_eq!(u.find(&SearchRequest::new(17, 1, &none)), None);
  }

  #[test]
  fn forbidden_registers_are_skipped() {
    let mut forbidden = BitSet::new(8);
    forbidden.insert(0);
    forbidden.set_range(4, 4);
    let u = PhyRegUsage::new(RegFile::Grf, 8);
    assert_eq!(u.find(&SearchRequest::new(3, 1, &forbidden)), Some(1));
    assert_eq!(u.find(&SearchRequest::new(4, 1, &forbidden)), None);
  }

  #[test]
  fn round_robin_wraps() {
    let none = BitSet::new(8);
    let mut u = PhyRegUsage::new(RegFile::Grf, 8);
    u.mark_busy(6, 2);
    let mut req = SearchRequest::new(1, 1, &none);
    req.start = 5;
    assert_eq!(u.find(&req), Some(5));
    req.num_regs = 2;
    assert_eq!(u.find(&req), Some(0));
  }

  #[test]
  fn bank_hint_prefers_parity() {
    let none = BitSet::new(16);
    let u = PhyRegUsage::new(RegFile::Grf, 16);
    let mut req = SearchRequest::new(1, 1, &none);
    req.bank = BankConflict::FirstHalfOdd;
    assert_eq!(u.find(&req), Some(1));
    req.bank = BankConflict::SecondHalfEven;
    req.split_halves = true;
    assert_eq!(u.find(&req), Some(8));
    req.num_regs = 2;
    req.bank = BankConflict::SecondHalfOdd;
    // Grows down from the top, first odd start.
    assert_eq!(u.find(&req), Some(13));
  }

  #[test]
  fn two_grf_banks_start_on_a_pair() {
    let none = BitSet::new(16);
    let mut u = PhyRegUsage::new(RegFile::Grf, 16);
    u.mark_busy(0, 3);
    let mut req = SearchRequest::new(2, 1, &none);
    req.one_grf_bank_division = false;
    req.bank = BankConflict::FirstHalfOdd;
    // r3 is in an odd bank but r4 is not; r6..r7 are both odd.
    assert_eq!(u.find(&req), Some(6));
    req.bank = BankConflict::FirstHalfEven;
    assert_eq!(u.find(&req), Some(4));
  }

  #[test]
  fn weak_neighbors_share_only_exact_start() {
    let none = BitSet::new(8);
    let mut u = PhyRegUsage::new(RegFile::Grf, 8);
    u.add_weak(2, 2);
    assert!(u.is_free(2, 2, &none));
    assert!(!u.is_free(1, 2, &none));
    assert!(!u.is_free(3, 1, &none));
    assert!(u.is_free(4, 2, &none));
    assert!(u.is_free(0, 2, &none));
  }

  #[test]
  fn sub_register_alignment() {
    let none = BitSet::new(4);
    let mut u = PhyRegUsage::new(RegFile::Flag, 4);
    u.mark_busy(0, 1);
    assert_eq!(u.find(&SearchRequest::new(1, 1, &none)), Some(1));
    assert_eq!(u.find(&SearchRequest::new(2, 2, &none)), Some(2));
    assert!(u.try_exact(3, &SearchRequest::new(1, 1, &none)));
    assert!(!u.try_exact(3, &SearchRequest::new(1, 2, &none)));
  }
}
