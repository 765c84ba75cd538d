/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

#![allow(non_snake_case)]

//! Data structures for the whole crate.

use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::ops::Index;
use std::ops::IndexMut;
use std::slice::{Iter, IterMut};

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

//=============================================================================
// Queues

pub type Queue<T> = VecDeque<T>;

//=============================================================================
// Maps

pub type Map<K, V> = FxHashMap<K, V>;

//=============================================================================
// Sets of things

pub struct Set<T> {
  set: FxHashSet<T>,
}

impl<T: Eq + Ord + Hash + Copy + fmt::Debug> Set<T> {
  #[inline(never)]
  pub fn empty() -> Self {
    Self { set: FxHashSet::<T>::default() }
  }

  #[inline(never)]
  pub fn unit(item: T) -> Self {
    let mut s = Self::empty();
    s.insert(item);
    s
  }

  #[inline(never)]
  pub fn two(item1: T, item2: T) -> Self {
    let mut s = Self::empty();
    s.insert(item1);
    s.insert(item2);
    s
  }

  #[inline(never)]
  pub fn card(&self) -> usize {
    self.set.len()
  }

  #[inline(never)]
  pub fn insert(&mut self, item: T) {
    self.set.insert(item);
  }

  #[inline(never)]
  pub fn delete(&mut self, item: T) {
    self.set.remove(&item);
  }

  #[inline(never)]
  pub fn is_empty(&self) -> bool {
    self.set.is_empty()
  }

  #[inline(never)]
  pub fn contains(&self, item: T) -> bool {
    self.set.contains(&item)
  }

  #[inline(never)]
  pub fn intersect(&mut self, other: &Self) {
    let mut res = FxHashSet::<T>::default();
    for item in self.set.iter() {
      if other.set.contains(item) {
        res.insert(*item);
      }
    }
    self.set = res;
  }

  #[inline(never)]
  pub fn union(&mut self, other: &Self) {
    for item in other.set.iter() {
      self.set.insert(*item);
    }
  }

  #[inline(never)]
  pub fn remove(&mut self, other: &Self) {
    for item in other.set.iter() {
      self.set.remove(item);
    }
  }

  #[inline(never)]
  pub fn intersects(&self, other: &Self) -> bool {
    !self.set.is_disjoint(&other.set)
  }

  #[inline(never)]
  pub fn is_subset_of(&self, other: &Self) -> bool {
    self.set.is_subset(&other.set)
  }

  #[inline(never)]
  pub fn to_vec(&self) -> Vec<T> {
    let mut res = Vec::<T>::new();
    for item in self.set.iter() {
      res.push(*item)
    }
    // Don't delete this.  It is important.
    res.sort_unstable();
    res
  }

  #[inline(never)]
  pub fn from_vec(vec: Vec<T>) -> Self {
    let mut res = Set::<T>::empty();
    for x in vec {
      res.insert(x);
    }
    res
  }

  #[inline(never)]
  pub fn equals(&self, other: &Self) -> bool {
    self.set == other.set
  }
}

impl<T: Eq + Ord + Hash + Copy + fmt::Debug> fmt::Debug for Set<T> {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    // Print the elements in some way which depends only on what is
    // present in the set, and not on any other factor.  In particular,
    // <Debug for FxHashSet> has been observed to to print the elements
    // of a two element set in both orders on different occasions.
    let sorted_vec = self.to_vec();
    let mut s = "{".to_string();
    for i in 0..sorted_vec.len() {
      if i > 0 {
        s = s + &", ".to_string();
      }
      s = s + &format!("{:?}", &sorted_vec[i]);
    }
    s = s + &"}".to_string();
    write!(fmt, "{}", s)
  }
}

impl<T: Eq + Ord + Hash + Copy + Clone + fmt::Debug> Clone for Set<T> {
  #[inline(never)]
  fn clone(&self) -> Self {
    let mut res = Set::<T>::empty();
    for item in self.set.iter() {
      res.set.insert(item.clone());
    }
    res
  }
}

pub struct SetIter<'a, T> {
  set_iter: std::collections::hash_set::Iter<'a, T>,
}
impl<T> Set<T> {
  pub fn iter(&self) -> SetIter<T> {
    SetIter { set_iter: self.set.iter() }
  }
}
impl<'a, T> Iterator for SetIter<'a, T> {
  type Item = &'a T;
  fn next(&mut self) -> Option<Self::Item> {
    self.set_iter.next()
  }
}

//=============================================================================
// Iteration boilerplate for entities.  The only purpose of this is to support
// constructions of the form
//
//   for ent in startEnt .dotdot( endPlus1Ent ) {
//   }
//
// until such time as |trait Step| is available in stable Rust.

pub trait PlusOne {
  fn plus_one(&self) -> Self;
}

#[derive(Clone, Copy)]
pub struct MyRange<T> {
  first: T,
  lastPlus1: T,
  len: usize,
}
impl<T: Copy + PartialOrd + PlusOne> IntoIterator for MyRange<T> {
  type Item = T;
  type IntoIter = MyIterator<T>;
  fn into_iter(self) -> Self::IntoIter {
    MyIterator { range: self, next: self.first }
  }
}

impl<T: Copy + Eq + Ord + PlusOne> MyRange<T> {
  /// Create a new range object.
  pub fn new(from: T, len: usize) -> MyRange<T> {
    let mut end = from;
    for _ in 0..len {
      end = end.plus_one();
    }
    MyRange { first: from, lastPlus1: end, len }
  }

  pub fn first(&self) -> T {
    assert!(self.len() > 0);
    self.first
  }

  pub fn end(&self) -> T {
    self.lastPlus1
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn contains(&self, t: T) -> bool {
    t >= self.first && t < self.lastPlus1
  }
}

pub struct MyIterator<T> {
  range: MyRange<T>,
  next: T,
}
impl<T: Copy + PartialOrd + PlusOne> Iterator for MyIterator<T> {
  type Item = T;
  fn next(&mut self) -> Option<Self::Item> {
    if self.next >= self.range.lastPlus1 {
      None
    } else {
      let res = Some(self.next);
      self.next = self.next.plus_one();
      res
    }
  }
}

//=============================================================================
// Vectors where both the index and element types can be specified (and at
// most 2^32-1 elems can be stored.  What if this overflows?)

pub struct TypedIxVec<TyIx, Ty> {
  vek: Vec<Ty>,
  ty_ix: PhantomData<TyIx>,
}

impl<TyIx, Ty> TypedIxVec<TyIx, Ty>
where
  Ty: Clone,
  TyIx: Copy + Eq + Ord + PlusOne + PartialOrd + From<u32> + Into<u32>,
{
  pub fn new() -> Self {
    Self { vek: Vec::new(), ty_ix: PhantomData::<TyIx> }
  }
  pub fn from_vec(vek: Vec<Ty>) -> Self {
    Self { vek, ty_ix: PhantomData::<TyIx> }
  }
  pub fn iter(&self) -> Iter<Ty> {
    self.vek.iter()
  }
  pub fn iter_mut(&mut self) -> IterMut<Ty> {
    self.vek.iter_mut()
  }
  pub fn len(&self) -> u32 {
    // FIXME what if this overflows?
    self.vek.len() as u32
  }
  pub fn push(&mut self, item: Ty) {
    // FIXME what if this overflows?
    self.vek.push(item);
  }
  pub fn resize(&mut self, new_len: u32, value: Ty) {
    self.vek.resize(new_len as usize, value);
  }
  pub fn elems(&self) -> &[Ty] {
    &self.vek[..]
  }
  pub fn range(&self) -> MyRange<TyIx> {
    MyRange::new(TyIx::from(0), self.len() as usize)
  }
  /// Iterate over (index, element) pairs.
  pub fn enumerate(&self) -> impl Iterator<Item = (TyIx, &Ty)> {
    self.vek.iter().enumerate().map(|(i, t)| (TyIx::from(i as u32), t))
  }
}

impl<TyIx, Ty> Index<TyIx> for TypedIxVec<TyIx, Ty>
where
  TyIx: Into<u32>,
{
  type Output = Ty;
  fn index(&self, ix: TyIx) -> &Ty {
    &self.vek[ix.into() as usize]
  }
}

impl<TyIx, Ty> IndexMut<TyIx> for TypedIxVec<TyIx, Ty>
where
  TyIx: Into<u32>,
{
  fn index_mut(&mut self, ix: TyIx) -> &mut Ty {
    &mut self.vek[ix.into() as usize]
  }
}

impl<TyIx, Ty> Clone for TypedIxVec<TyIx, Ty>
where
  Ty: Clone,
{
  fn clone(&self) -> Self {
    Self { vek: self.vek.clone(), ty_ix: PhantomData::<TyIx> }
  }
}

impl<TyIx, Ty: fmt::Debug> fmt::Debug for TypedIxVec<TyIx, Ty> {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    write!(fmt, "{:?}", self.vek)
  }
}

impl<TyIx, Ty: PartialEq> PartialEq for TypedIxVec<TyIx, Ty> {
  fn eq(&self, other: &Self) -> bool {
    self.vek == other.vek
  }
}

//=============================================================================

macro_rules! generate_boilerplate {
  ($TypeIx:ident, $Type:ident, $PrintingPrefix:expr) => {
    #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
    // Firstly, the indexing type (TypeIx)
    pub enum $TypeIx {
      $TypeIx(u32),
    }
    impl $TypeIx {
      #[allow(dead_code)]
      #[inline(always)]
      pub fn new(n: u32) -> Self {
        Self::$TypeIx(n)
      }
      #[allow(dead_code)]
      #[inline(always)]
      pub fn get(self) -> u32 {
        match self {
          $TypeIx::$TypeIx(n) => n,
        }
      }
      #[allow(dead_code)]
      #[inline(always)]
      pub fn get_usize(self) -> usize {
        self.get() as usize
      }
      #[allow(dead_code)]
      #[inline(always)]
      pub fn plus(self, delta: u32) -> $TypeIx {
        $TypeIx::$TypeIx(self.get() + delta)
      }
      #[allow(dead_code)]
      #[inline(always)]
      pub fn minus(self, delta: u32) -> $TypeIx {
        $TypeIx::$TypeIx(self.get() - delta)
      }
      #[allow(dead_code)]
      pub fn dotdot(&self, lastPlus1: $TypeIx) -> MyRange<$TypeIx> {
        let len = (lastPlus1.get() - self.get()) as usize;
        MyRange::new(*self, len)
      }
    }
    impl fmt::Debug for $TypeIx {
      fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}{}", $PrintingPrefix, &self.get())
      }
    }
    impl PlusOne for $TypeIx {
      #[inline(always)]
      fn plus_one(&self) -> Self {
        self.plus(1)
      }
    }
    impl From<u32> for $TypeIx {
      #[inline(always)]
      fn from(n: u32) -> Self {
        Self::$TypeIx(n)
      }
    }
    impl Into<u32> for $TypeIx {
      #[inline(always)]
      fn into(self) -> u32 {
        self.get()
      }
    }
  };
}

generate_boilerplate!(InstIx, Inst, "i");

generate_boilerplate!(BlockIx, Block, "b");

generate_boilerplate!(FuncIx, Func, "fn");

generate_boilerplate!(DeclIx, Declare, "d");

generate_boilerplate!(LrIx, LiveRange, "lr");

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn typed_ix_vec_indexing() {
    let mut v = TypedIxVec::<DeclIx, u32>::new();
    v.push(10);
    v.push(20);
    v.push(30);
    assert_eq!(v.len(), 3);
    assert_eq!(v[DeclIx::new(1)], 20);
    v[DeclIx::new(2)] += 1;
    let collected: Vec<(DeclIx, u32)> =
      v.enumerate().map(|(ix, x)| (ix, *x)).collect();
    assert_eq!(collected[2], (DeclIx::new(2), 31));
    let ixs: Vec<DeclIx> = v.range().into_iter().collect();
    assert_eq!(ixs, vec![DeclIx::new(0), DeclIx::new(1), DeclIx::new(2)]);
  }

  #[test]
  fn set_prints_sorted() {
    let s = Set::from_vec(vec![LrIx::new(3), LrIx::new(1), LrIx::new(2)]);
    assert_eq!(format!("{:?}", s), "{lr1, lr2, lr3}");
    assert!(s.contains(LrIx::new(2)));
    assert!(!s.contains(LrIx::new(0)));
  }

  #[test]
  fn set_two_collapses_duplicates() {
    let s = Set::two(BlockIx::new(4), BlockIx::new(1));
    assert_eq!(s.card(), 2);
    assert!(s.contains(BlockIx::new(4)) && s.contains(BlockIx::new(1)));
    let t = Set::two(BlockIx::new(3), BlockIx::new(3));
    assert!(t.equals(&Set::unit(BlockIx::new(3))));
  }
}
