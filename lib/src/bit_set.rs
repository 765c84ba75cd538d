/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Fixed-capacity bit vectors.  These carry the per-block liveness sets, the
//! dense interference matrix rows, the forbidden-register masks and the
//! busy-register maps used while searching for a free register.

use std::cmp;
use std::fmt;

const BLOCK_SIZE: usize = 64;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BitSet {
  bits: Vec<u64>,
  len: usize,
}

impl BitSet {
  #[inline(always)]
  fn get_bits_index(item: usize) -> usize {
    item / BLOCK_SIZE
  }

  #[inline(always)]
  fn get_offset(item: usize) -> usize {
    item % BLOCK_SIZE
  }

  /// A set able to hold the items `0 .. len`, initially empty.
  pub fn new(len: usize) -> Self {
    Self { bits: vec![0; (len + BLOCK_SIZE - 1) / BLOCK_SIZE], len }
  }

  /// A set able to hold the items `0 .. len`, initially full.
  pub fn full(len: usize) -> Self {
    let mut s = Self::new(len);
    s.set_range(0, len);
    s
  }

  /// Capacity of the set, not its cardinality.
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn card(&self) -> usize {
    let mut counter = 0;
    for &bits in &self.bits {
      counter += bits.count_ones();
    }
    counter as usize
  }

  pub fn is_empty(&self) -> bool {
    self.bits.iter().all(|&b| b == 0)
  }

  #[inline]
  pub fn contains(&self, item: usize) -> bool {
    if item >= self.len {
      return false;
    }
    let ix = Self::get_bits_index(item);
    (1 & (self.bits[ix] >> Self::get_offset(item))) != 0
  }

  #[inline]
  pub fn insert(&mut self, item: usize) {
    assert!(item < self.len, "BitSet::insert: {} out of range", item);
    let ix = Self::get_bits_index(item);
    self.bits[ix] |= 1u64 << Self::get_offset(item);
  }

  #[inline]
  pub fn delete(&mut self, item: usize) {
    if item < self.len {
      let ix = Self::get_bits_index(item);
      self.bits[ix] &= !(1u64 << Self::get_offset(item));
    }
  }

  /// Set `count` consecutive items starting at `start`, clipped to the
  /// capacity.
  pub fn set_range(&mut self, start: usize, count: usize) {
    let end = cmp::min(start + count, self.len);
    for item in start..end {
      let ix = Self::get_bits_index(item);
      self.bits[ix] |= 1u64 << Self::get_offset(item);
    }
  }

  pub fn clear_range(&mut self, start: usize, count: usize) {
    let end = cmp::min(start + count, self.len);
    for item in start..end {
      self.delete(item);
    }
  }

  /// Are any of the items in `start .. start + count` present?
  pub fn any_in_range(&self, start: usize, count: usize) -> bool {
    let end = cmp::min(start + count, self.len);
    (start..end).any(|item| self.contains(item))
  }

  pub fn clear(&mut self) {
    for bits in self.bits.iter_mut() {
      *bits = 0;
    }
  }

  pub fn union(&mut self, other: &Self) -> bool {
    debug_assert!(self.len == other.len);
    let mut changed = false;
    for (mine, theirs) in self.bits.iter_mut().zip(other.bits.iter()) {
      let new = *mine | *theirs;
      changed |= new != *mine;
      *mine = new;
    }
    changed
  }

  pub fn intersect(&mut self, other: &Self) {
    debug_assert!(self.len == other.len);
    for (mine, theirs) in self.bits.iter_mut().zip(other.bits.iter()) {
      *mine &= *theirs;
    }
  }

  pub fn remove(&mut self, other: &Self) {
    debug_assert!(self.len == other.len);
    for (mine, theirs) in self.bits.iter_mut().zip(other.bits.iter()) {
      *mine &= !*theirs;
    }
  }

  pub fn intersects(&self, other: &Self) -> bool {
    self.bits.iter().zip(other.bits.iter()).any(|(a, b)| a & b != 0)
  }

  pub fn is_subset_of(&self, other: &Self) -> bool {
    self.bits.iter().zip(other.bits.iter()).all(|(a, b)| (a | b) == *b)
  }

  /// Iterate over the items present, in increasing order.
  pub fn iter(&self) -> BitSetIter {
    BitSetIter { set: self, word: 0, cur: self.bits.first().cloned().unwrap_or(0) }
  }

  pub fn to_vec(&self) -> Vec<usize> {
    self.iter().collect()
  }
}

impl fmt::Debug for BitSet {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    write!(fmt, "{{")?;
    for (i, item) in self.iter().enumerate() {
      if i > 0 {
        write!(fmt, " ")?;
      }
      write!(fmt, "{}", item)?;
    }
    write!(fmt, "}}")
  }
}

pub struct BitSetIter<'a> {
  set: &'a BitSet,
  word: usize,
  cur: u64,
}

impl<'a> Iterator for BitSetIter<'a> {
  type Item = usize;
  fn next(&mut self) -> Option<usize> {
    loop {
      if self.cur != 0 {
        let tz = self.cur.trailing_zeros() as usize;
        self.cur &= self.cur - 1;
        return Some(self.word * BLOCK_SIZE + tz);
      }
      self.word += 1;
      if self.word >= self.set.bits.len() {
        return None;
      }
      self.cur = self.set.bits[self.word];
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn insert_delete_contains() {
    let mut s = BitSet::new(130);
    assert!(s.is_empty());
    s.insert(0);
    s.insert(64);
    s.insert(129);
    assert!(s.contains(0) && s.contains(64) && s.contains(129));
    assert!(!s.contains(1));
    assert!(!s.contains(1000));
    assert_eq!(s.card(), 3);
    s.delete(64);
    assert_eq!(s.to_vec(), vec![0, 129]);
  }

  #[test]
  fn ranges_clip_to_capacity() {
    let mut s = BitSet::new(10);
    s.set_range(8, 5);
    assert_eq!(s.to_vec(), vec![8, 9]);
    assert!(s.any_in_range(0, 9));
    assert!(!s.any_in_range(0, 8));
    s.clear_range(9, 4);
    assert_eq!(s.to_vec(), vec![8]);
  }

  #[test]
  fn set_algebra() {
    let mut a = BitSet::new(100);
    let mut b = BitSet::new(100);
    a.set_range(0, 10);
    b.set_range(5, 10);
    let mut u = a.clone();
    assert!(u.union(&b));
    assert!(!u.union(&b));
    assert_eq!(u.card(), 15);
    let mut i = a.clone();
    i.intersect(&b);
    assert_eq!(i.to_vec(), vec![5, 6, 7, 8, 9]);
    let mut d = a.clone();
    d.remove(&b);
    assert_eq!(d.to_vec(), vec![0, 1, 2, 3, 4]);
    assert!(a.intersects(&b));
    assert!(i.is_subset_of(&a) && i.is_subset_of(&b));
    assert!(!a.is_subset_of(&b));
  }

  #[test]
  fn full_set() {
    let s = BitSet::full(70);
    assert_eq!(s.card(), 70);
    assert!(!s.contains(70));
  }
}
