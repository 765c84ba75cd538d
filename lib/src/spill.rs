/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! The boundary with the spill code inserter: what is handed to the kernel
//! after a failed attempt, and the bookkeeping of spill memory.

use log::debug;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

use crate::data_structures::{DeclIx, LrIx, TypedIxVec};
use crate::interface::Declare;
use crate::live_range::LiveRange;

/// Bytes of scratch memory addressable by a scratch message.
pub const SCRATCH_MSG_LIMIT: u32 = 128 * 1024;

/// One range to move to memory.  `decl` is a root declare; aliases and
/// split pieces of it live at `spill_offset` plus their own offset.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct SpilledRange {
  pub decl: DeclIx,
  pub byte_size: u32,
  pub spill_offset: u32,
  pub spill_cost: f32,
}

/// Everything the inserter needs for one round of spilling.
#[derive(Clone, Debug)]
pub struct SpillRequest {
  pub ranges: Vec<SpilledRange>,
  /// The attempt that failed, counting from 0.
  pub iteration: u32,
  pub num_grf: u32,
  pub grf_bytes: u32,
}

impl SpillRequest {
  pub fn contains(&self, decl: DeclIx) -> bool {
    self.ranges.iter().any(|r| r.decl == decl)
  }

  pub fn range_of(&self, decl: DeclIx) -> Option<&SpilledRange> {
    self.ranges.iter().find(|r| r.decl == decl)
  }
}

/// What the inserter did.
#[derive(Clone, Debug, Default)]
pub struct SpillOutcome {
  /// Temporaries created for fills and spills.
  pub new_declares: Vec<DeclIx>,
  pub num_fills: u32,
  pub num_spills: u32,
}

//=============================================================================
// Spill memory

/// A bump allocator over the scratch space, in whole GRFs.
#[derive(Clone, Debug)]
pub struct SpillMemory {
  next_offset: u32,
  limit: u32,
  grf_bytes: u32,
}

impl SpillMemory {
  pub fn new(grf_bytes: u32, limit: u32) -> Self {
    Self { next_offset: 0, limit, grf_bytes }
  }

  pub fn used(&self) -> u32 {
    self.next_offset
  }

  /// Offset for `bytes` more bytes, or the total that would have been
  /// needed if that exceeds the limit.
  pub fn alloc(&mut self, bytes: u32) -> Result<u32, u32> {
    let rounded =
      ((bytes + self.grf_bytes - 1) / self.grf_bytes).max(1) * self.grf_bytes;
    let end = self.next_offset + rounded;
    if end > self.limit {
      return Err(end);
    }
    let offset = self.next_offset;
    self.next_offset = end;
    Ok(offset)
  }
}

/// Give each range a slot in spill memory.  Ranges keep the order they
/// were spilled in.  On overflow, returns the number of bytes that would
/// have been required.
#[inline(never)]
pub fn build_spill_request(
  decls: &[Declare], lrs: &TypedIxVec<LrIx, LiveRange>, spilled: &[LrIx],
  mem: &mut SpillMemory, iteration: u32, num_grf: u32, grf_bytes: u32,
) -> Result<SpillRequest, u32> {
  let mut ranges = Vec::with_capacity(spilled.len());
  for lr in spilled {
    let range = &lrs[*lr];
    let byte_size = decls[range.decl.get_usize()].byte_size();
    let spill_offset = mem.alloc(byte_size)?;
    debug!(
      "spill: {} ({} bytes) at offset {}",
      decls[range.decl.get_usize()].name,
      byte_size,
      spill_offset
    );
    ranges.push(SpilledRange {
      decl: range.decl,
      byte_size,
      spill_offset,
      spill_cost: range.spill_cost,
    });
  }
  Ok(SpillRequest { ranges, iteration, num_grf, grf_bytes })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::interface::{ElemType, RegFile};

  #[test]
  fn offsets_are_grf_aligned() {
    let mut mem = SpillMemory::new(32, 1024);
    assert_eq!(mem.alloc(4), Ok(0));
    assert_eq!(mem.alloc(64), Ok(32));
    assert_eq!(mem.alloc(33), Ok(96));
    assert_eq!(mem.used(), 160);
  }

  #[test]
  fn limit_is_enforced() {
    let mut mem = SpillMemory::new(32, 64);
    assert_eq!(mem.alloc(32), Ok(0));
    assert_eq!(mem.alloc(64), Err(96));
    // A failed request leaves the allocator untouched.
    assert_eq!(mem.alloc(32), Ok(32));
  }

  #[test]
  fn request_carries_sizes_and_offsets() {
    let decls = vec![
      Declare::grf("a", ElemType::D, 16),
      Declare::grf("b", ElemType::D, 8),
    ];
    let mut lrs = TypedIxVec::new();
    lrs.push(LiveRange::new(DeclIx::new(0), RegFile::Grf, 2));
    lrs.push(LiveRange::new(DeclIx::new(1), RegFile::Grf, 1));
    let mut mem = SpillMemory::new(32, SCRATCH_MSG_LIMIT);
    let req = build_spill_request(
      &decls,
      &lrs,
      &[LrIx::new(1), LrIx::new(0)],
      &mut mem,
      0,
      128,
      32,
    )
    .unwrap();
    assert_eq!(req.ranges.len(), 2);
    assert_eq!(req.range_of(DeclIx::new(1)).unwrap().spill_offset, 0);
    assert_eq!(req.range_of(DeclIx::new(0)).unwrap().spill_offset, 32);
    assert_eq!(req.range_of(DeclIx::new(0)).unwrap().byte_size, 64);
    assert!(!req.contains(DeclIx::new(2)));
  }
}
