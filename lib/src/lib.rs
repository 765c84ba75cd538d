/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Main file / top-level module for the gpu-regalloc library.

// Make the analysis modules public for fuzzing.
#[cfg(feature = "fuzzing")]
pub mod analysis;
#[cfg(not(feature = "fuzzing"))]
mod analysis;

#[cfg(feature = "fuzzing")]
pub mod augmentation;
#[cfg(not(feature = "fuzzing"))]
mod augmentation;

#[cfg(feature = "fuzzing")]
pub mod graph_color;
#[cfg(not(feature = "fuzzing"))]
mod graph_color;

#[cfg(feature = "fuzzing")]
pub mod interference;
#[cfg(not(feature = "fuzzing"))]
mod interference;

#[cfg(feature = "fuzzing")]
pub mod live_range;
#[cfg(not(feature = "fuzzing"))]
mod live_range;

mod bank_conflict;
mod bit_set;
mod checker;
mod data_structures;
mod driver;
mod interface;
mod phy_reg_usage;
mod spill;

pub use crate::interface::*;
