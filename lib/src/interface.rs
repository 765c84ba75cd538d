/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! This is the top level interface for the gpu-regalloc library.

use smallvec::SmallVec;
use std::fmt;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

// Stuff that is defined by the library

// Sets and maps of things.  We can refine these later; but for now the
// interface needs some way to speak about them, so let's use the
// library-provided versions.

pub use crate::data_structures::Map;
pub use crate::data_structures::Set;

// TypedIxVector, so that the interface can speak about vectors of blocks,
// instructions and declares.

pub use crate::data_structures::TypedIxVec;
pub use crate::data_structures::{
  BlockIx, DeclIx, FuncIx, InstIx, LrIx, MyRange,
};

pub use crate::analysis::AnalysisError;
pub use crate::augmentation::AugmentationMask;
pub use crate::bank_conflict::BankConflict;
pub use crate::checker::{CheckerError, CheckerErrors};
pub use crate::spill::{
  SpillOutcome, SpillRequest, SpilledRange, SCRATCH_MSG_LIMIT,
};

//=============================================================================
// Register files, element types and alignment

/// The register files a declare can be allocated in.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum RegFile {
  /// General register file, allocated in whole registers.
  Grf,
  /// Flag registers, allocated in 16-bit words.
  Flag,
  /// Address registers, allocated in 16-bit words.
  Address,
  /// A small dedicated file of scalar registers.
  Scalar,
}

pub const NUM_REG_FILES: usize = 4;

impl RegFile {
  pub fn index(self) -> usize {
    match self {
      RegFile::Grf => 0,
      RegFile::Flag => 1,
      RegFile::Address => 2,
      RegFile::Scalar => 3,
    }
  }

  pub fn all() -> [RegFile; NUM_REG_FILES] {
    [RegFile::Address, RegFile::Flag, RegFile::Scalar, RegFile::Grf]
  }

  /// Flag and address registers are handed out at word granularity, the
  /// others by whole registers.
  pub fn is_word_granular(self) -> bool {
    match self {
      RegFile::Flag | RegFile::Address => true,
      RegFile::Grf | RegFile::Scalar => false,
    }
  }

  pub fn prefix(self) -> &'static str {
    match self {
      RegFile::Grf => "r",
      RegFile::Flag => "f",
      RegFile::Address => "a",
      RegFile::Scalar => "s",
    }
  }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum ElemType {
  B,
  UB,
  W,
  UW,
  HF,
  D,
  UD,
  F,
  Q,
  UQ,
  DF,
}

impl ElemType {
  pub fn size(self) -> u32 {
    match self {
      ElemType::B | ElemType::UB => 1,
      ElemType::W | ElemType::UW | ElemType::HF => 2,
      ElemType::D | ElemType::UD | ElemType::F => 4,
      ElemType::Q | ElemType::UQ | ElemType::DF => 8,
    }
  }
}

/// Start-register alignment of a GRF declare.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum GrfAlign {
  Either,
  Even,
  Quad,
}

impl GrfAlign {
  pub fn rows(self) -> u32 {
    match self {
      GrfAlign::Either => 1,
      GrfAlign::Even => 2,
      GrfAlign::Quad => 4,
    }
  }
}

/// Sub-register alignment, in 16-bit words, for the word-granular files.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum SubRegAlign {
  Any,
  EvenWord,
  FourWord,
  EightWord,
}

impl SubRegAlign {
  pub fn words(self) -> u32 {
    match self {
      SubRegAlign::Any => 1,
      SubRegAlign::EvenWord => 2,
      SubRegAlign::FourWord => 4,
      SubRegAlign::EightWord => 8,
    }
  }
}

//=============================================================================
// Declares

/// The pseudo declares used to model the register save/restore effect of
/// calls under the stack-call ABI.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum PseudoKind {
  None,
  /// Live only at a call site; occupies the caller-save registers.
  CallerSave,
  /// Live through a whole stack-call function; occupies the callee-save
  /// registers.
  CalleeSave,
}

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct DeclFlags {
  /// Defined on entry to the kernel.
  pub input: bool,
  /// Read after the kernel ends.
  pub output: bool,
  /// Accessed through an address register.
  pub address_taken: bool,
  pub do_not_spill: bool,
  pub force_spill: bool,
  pub ret_addr: bool,
  pub old_frame_ptr: bool,
  /// Created by spill/fill insertion.
  pub spill_temp: bool,
  /// A spill temporary for a flag or address declare.
  pub addr_flag_spill: bool,
}

/// A physical location.  For the GRF and scalar files `reg` is the register
/// number and `sub_reg` the element offset within it; for flags `reg` is the
/// flag register and `sub_reg` the word; for address registers `reg` is
/// always 0 and `sub_reg` the element offset.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct PhysReg {
  pub reg: u32,
  pub sub_reg: u32,
}

impl PhysReg {
  pub fn new(reg: u32, sub_reg: u32) -> Self {
    Self { reg, sub_reg }
  }
}

impl fmt::Debug for PhysReg {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    write!(fmt, "{}.{}", self.reg, self.sub_reg)
  }
}

/// A named virtual storage location: the unit the allocator assigns.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Declare {
  pub name: String,
  pub reg_file: RegFile,
  pub elem_type: ElemType,
  pub num_elems: u32,
  pub align: GrfAlign,
  pub sub_align: SubRegAlign,
  /// This declare names part of another one: (base, byte offset).
  pub alias: Option<(DeclIx, u32)>,
  /// This declare is a split-off piece of a larger one: (parent, byte
  /// offset of this piece within the parent).
  pub split_parent: Option<(DeclIx, u32)>,
  pub pseudo: PseudoKind,
  pub flags: DeclFlags,
  /// Fixed by an earlier pass (local RA, ABI).  Expressed in the same
  /// terms as the allocator's results.
  pub precolored: Option<PhysReg>,
}

impl Declare {
  pub fn new(
    name: &str, reg_file: RegFile, elem_type: ElemType, num_elems: u32,
  ) -> Self {
    Self {
      name: name.to_string(),
      reg_file,
      elem_type,
      num_elems,
      align: GrfAlign::Either,
      sub_align: SubRegAlign::Any,
      alias: None,
      split_parent: None,
      pseudo: PseudoKind::None,
      flags: DeclFlags::default(),
      precolored: None,
    }
  }

  pub fn grf(name: &str, elem_type: ElemType, num_elems: u32) -> Self {
    Self::new(name, RegFile::Grf, elem_type, num_elems)
  }

  /// A flag declare covering `num_bits` channels.
  pub fn flag(name: &str, num_bits: u32) -> Self {
    let words = (num_bits + 15) / 16;
    Self::new(name, RegFile::Flag, ElemType::UW, words.max(1))
  }

  pub fn addr(name: &str, num_elems: u32) -> Self {
    Self::new(name, RegFile::Address, ElemType::UW, num_elems)
  }

  pub fn with_align(mut self, align: GrfAlign) -> Self {
    self.align = align;
    self
  }

  pub fn with_sub_align(mut self, sub_align: SubRegAlign) -> Self {
    self.sub_align = sub_align;
    self
  }

  pub fn alias_of(mut self, base: DeclIx, byte_offset: u32) -> Self {
    self.alias = Some((base, byte_offset));
    self
  }

  pub fn split_of(mut self, parent: DeclIx, byte_offset: u32) -> Self {
    self.split_parent = Some((parent, byte_offset));
    self
  }

  pub fn with_pseudo(mut self, pseudo: PseudoKind) -> Self {
    self.pseudo = pseudo;
    self
  }

  pub fn with_flags(mut self, flags: DeclFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn precolored(mut self, at: PhysReg) -> Self {
    self.precolored = Some(at);
    self
  }

  pub fn byte_size(&self) -> u32 {
    self.elem_type.size() * self.num_elems
  }

  pub fn is_pseudo(&self) -> bool {
    self.pseudo != PseudoKind::None
  }
}

//=============================================================================
// Instructions, as seen by the allocator

/// A reference to (part of) a declare.  `offset` and `size` are in bytes
/// relative to the start of the declare named; `stride` is the distance in
/// elements between consecutive channels, 0 for a scalar operand.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Operand {
  pub decl: DeclIx,
  pub offset: u32,
  pub size: u32,
  pub elem_size: u32,
  pub stride: u32,
}

impl Operand {
  /// A contiguous block of bytes, with no per-channel layout.
  pub fn block(decl: DeclIx, offset: u32, size: u32) -> Self {
    Self { decl, offset, size, elem_size: size, stride: 0 }
  }

  /// A channel-strided region as used by ordinary ALU instructions.
  pub fn region(
    decl: DeclIx, offset: u32, elem_size: u32, stride: u32, exec_size: u32,
  ) -> Self {
    let size = if stride == 0 || exec_size <= 1 {
      elem_size
    } else {
      ((exec_size - 1) * stride + 1) * elem_size
    };
    Self { decl, offset, size, elem_size, stride }
  }

  pub fn end(&self) -> u32 {
    self.offset + self.size
  }
}

/// An indirect access through an address register.  The declares it may
/// touch come from `Kernel::points_to`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Indirect {
  pub addr: Operand,
  pub is_dst: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InstKind {
  Alu,
  /// Three-source ALU instruction.
  Mad,
  /// Systolic matrix multiply-accumulate.
  Dpas,
  /// Message send.  A split send carries two payload sources.
  Send { split: bool },
  /// Subroutine or stack call.  `pseudo` is the caller-save pseudo declare
  /// modeling the call's clobbers.
  Call { callee: FuncIx, pseudo: Option<DeclIx> },
  Return,
  Branch,
  /// Marks the start of a live range; defines its destination without
  /// reading anything.
  Kill,
  Fill,
  Spill,
}

impl InstKind {
  pub fn is_send(self) -> bool {
    match self {
      InstKind::Send { .. } => true,
      _ => false,
    }
  }
}

/// Summary of one instruction's operands, provided by the client through
/// `Kernel::get_inst_info`.
#[derive(Clone, Debug)]
pub struct InstInfo {
  pub kind: InstKind,
  pub exec_size: u32,
  /// First channel this instruction executes for.
  pub mask_offset: u32,
  /// Write regardless of the channel enables.
  pub no_mask: bool,
  /// Final send of the thread.
  pub eot: bool,
  pub dst: Option<Operand>,
  /// Positional: `srcs[1]` is always src1, with `None` for immediates.
  pub srcs: SmallVec<[Option<Operand>; 3]>,
  pub pred: Option<Operand>,
  pub cond_mod: Option<Operand>,
  pub indirect: Option<Indirect>,
}

impl InstInfo {
  pub fn new(kind: InstKind, exec_size: u32) -> Self {
    Self {
      kind,
      exec_size,
      mask_offset: 0,
      no_mask: false,
      eot: false,
      dst: None,
      srcs: SmallVec::new(),
      pred: None,
      cond_mod: None,
      indirect: None,
    }
  }

  pub fn src(&self, n: usize) -> Option<Operand> {
    self.srcs.get(n).cloned().flatten()
  }

  /// Every operand read by the instruction itself, not counting the
  /// declares reachable through an indirect access.
  pub fn reads(&self) -> impl Iterator<Item = Operand> + '_ {
    self
      .srcs
      .iter()
      .filter_map(|s| *s)
      .chain(self.pred.iter().cloned())
      .chain(self.indirect.iter().map(|ind| ind.addr))
  }

  /// Every operand written by the instruction itself.
  pub fn writes(&self) -> impl Iterator<Item = Operand> + '_ {
    self.dst.iter().cloned().chain(self.cond_mod.iter().cloned())
  }
}

//=============================================================================
// The kernel: the client's view of the program being allocated

/// A trait defined by the regalloc client to provide access to its kernel
/// representation: instructions, flow graph, declares, and the spill/fill
/// insertion collaborator.
pub trait Kernel {
  /// Kernel name, used in diagnostics.
  fn name(&self) -> &str;

  /// Dispatch SIMD width.
  fn simd_size(&self) -> u32;

  // -------------
  // CFG traversal
  // -------------

  /// Allow iteration across all instructions.
  fn insts(&self) -> MyRange<InstIx>;

  /// Allow iteration over basic blocks (in instruction order).
  fn blocks(&self) -> MyRange<BlockIx>;

  /// Get the index of the entry block.
  fn entry_block(&self) -> BlockIx;

  /// Provide the range of instruction indices contained in each block.
  fn block_insts(&self, block: BlockIx) -> MyRange<InstIx>;

  /// Get CFG successors for a given block.
  fn block_succs(&self, block: BlockIx) -> Vec<BlockIx>;

  /// Does the block execute under a partial channel mask?
  fn block_divergent(&self, block: BlockIx) -> bool;

  // -----------
  // Subroutines
  // -----------

  /// Number of functions; function 0 is the kernel itself.
  fn num_funcs(&self) -> u32 {
    1
  }

  /// The function a block belongs to.
  fn block_func(&self, _block: BlockIx) -> FuncIx {
    FuncIx::new(0)
  }

  fn func_entry(&self, _func: FuncIx) -> BlockIx {
    self.entry_block()
  }

  /// The callee-save pseudo declare of a stack-call function, if any.  It
  /// is treated as defined on entry to the function and read at each
  /// return.
  fn callee_save_pseudo(&self, _func: FuncIx) -> Option<DeclIx> {
    None
  }

  // ------------------
  // Instruction access
  // ------------------

  /// Provide the operand summary for an instruction.
  fn get_inst_info(&self, inst: InstIx) -> InstInfo;

  // -----------------
  // Declares
  // -----------------

  /// The declare table.  Spill insertion only ever appends to it.
  fn declares(&self) -> &[Declare];

  /// The declares an address declare may point at.
  fn points_to(&self, _addr: DeclIx) -> &[DeclIx] {
    &[]
  }

  // ------------------
  // Spill collaborator
  // ------------------

  /// Insert fill and spill code for the ranges in `request`.  New
  /// temporaries must be appended to the declare table.
  fn insert_spill_code(
    &mut self, request: &SpillRequest,
  ) -> Result<SpillOutcome, String>;

  /// Merge adjacent spill/fill transfers.  Optional; the result is correct
  /// either way.
  fn coalesce_spill_code(&mut self) {}
}

//=============================================================================
// Options

/// Bank structure of the generation being targeted.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum Platform {
  /// Even/odd register banks, one bank conflict heuristic for mad only.
  Legacy,
  /// Bank-aware heuristic covering all three sources, plus DPAS bundles.
  Tgl,
}

/// Top GRFs reserved by the stack-call ABI (frame and stack pointers,
/// return address scratch).
pub const STACK_CALL_RESERVED_GRF: u32 = 3;

/// Default assumed trip count of a loop, when weighting references.
pub const DEFAULT_LOOP_ITERATION_FACTOR: u32 = 10;

/// Loop nesting beyond this depth no longer increases reference weights.
pub const MAX_LOOP_WEIGHT_NEST: u32 = 8;

pub const DEFAULT_INTERNAL_CONFLICT_RATIO: f32 = 0.25;

pub const DEFAULT_THREE_SOURCE_RATIO: f32 = 0.1;

/// Above this many live ranges the interference matrix is kept sparse.
pub const DEFAULT_DENSE_MATRIX_LIMIT: u32 = 32768;

#[derive(Clone, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct RegAllocOptions {
  /// GRFs available to the first attempt.
  pub num_grf: u32,
  /// The driver may grow the GRF count up to this before spilling.
  pub max_num_grf: u32,
  pub grf_bytes: u32,
  pub num_flag_words: u32,
  pub num_addr_words: u32,
  pub num_scalar_regs: u32,
  pub scalar_reg_bytes: u32,
  /// Banks alternate every register (true) or every two registers.
  pub one_grf_bank_division: bool,
  pub has_stack_calls: bool,
  pub num_callee_save_grf: u32,
  /// r0 carries the thread payload and is never allocated.
  pub reserve_r0: bool,
  pub max_iterations: u32,
  /// From this attempt on, GRFs are held back for spill temporaries.
  pub fail_safe_iteration: u32,
  pub fail_safe_reserved_grf: u32,
  pub do_bank_conflict_reduction: bool,
  pub platform: Platform,
  pub use_new_spill_cost: bool,
  pub loop_iteration_factor: u32,
  pub internal_conflict_ratio: f32,
  pub three_source_ratio: f32,
  pub dense_matrix_limit: u32,
  pub augmentation: bool,
  pub incremental: bool,
  pub spill_coalescing: bool,
  /// Try the round-robin heuristic on the first attempt.
  pub round_robin: bool,
  /// EOT sends must source their payload from the last 16 GRFs.
  pub eot_grf_binding: bool,
  pub run_checker: bool,
  pub spill_mem_limit: u32,
}

impl Default for RegAllocOptions {
  fn default() -> Self {
    Self {
      num_grf: 128,
      max_num_grf: 128,
      grf_bytes: 32,
      num_flag_words: 4,
      num_addr_words: 16,
      num_scalar_regs: 0,
      scalar_reg_bytes: 8,
      one_grf_bank_division: true,
      has_stack_calls: false,
      num_callee_save_grf: 64,
      reserve_r0: true,
      max_iterations: 10,
      fail_safe_iteration: 3,
      fail_safe_reserved_grf: 8,
      do_bank_conflict_reduction: true,
      platform: Platform::Legacy,
      use_new_spill_cost: true,
      loop_iteration_factor: DEFAULT_LOOP_ITERATION_FACTOR,
      internal_conflict_ratio: DEFAULT_INTERNAL_CONFLICT_RATIO,
      three_source_ratio: DEFAULT_THREE_SOURCE_RATIO,
      dense_matrix_limit: DEFAULT_DENSE_MATRIX_LIMIT,
      augmentation: true,
      incremental: true,
      spill_coalescing: true,
      round_robin: true,
      eot_grf_binding: true,
      run_checker: false,
      spill_mem_limit: SCRATCH_MSG_LIMIT,
    }
  }
}

impl RegAllocOptions {
  /// Size, in allocation units, of a register file for an attempt with
  /// `num_grf` general registers.
  pub fn file_size(&self, file: RegFile, num_grf: u32) -> u32 {
    match file {
      RegFile::Grf => num_grf,
      RegFile::Flag => self.num_flag_words,
      RegFile::Address => self.num_addr_words,
      RegFile::Scalar => self.num_scalar_regs,
    }
  }

  /// Bytes per allocation unit.
  pub fn unit_bytes(&self, file: RegFile) -> u32 {
    match file {
      RegFile::Grf => self.grf_bytes,
      RegFile::Flag | RegFile::Address => 2,
      RegFile::Scalar => self.scalar_reg_bytes,
    }
  }

  /// First callee-save GRF under the stack-call ABI.  Registers from r1 up
  /// to it are caller-save.
  pub fn callee_save_start(&self, num_grf: u32) -> u32 {
    let top = num_grf.saturating_sub(STACK_CALL_RESERVED_GRF);
    top.saturating_sub(self.num_callee_save_grf).max(1)
  }

  pub fn callee_save_end(&self, num_grf: u32) -> u32 {
    num_grf.saturating_sub(STACK_CALL_RESERVED_GRF)
  }
}

//=============================================================================
// Results

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum AllocStatus {
  /// Colored without spilling.
  Success,
  /// Spill code was inserted and a later attempt colored everything.
  SpilledAndResolved,
}

/// Per-declare bookkeeping exported for later passes.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct DeclRaInfo {
  pub ref_count: u32,
  pub aug_mask: AugmentationMask,
  pub bank_conflict: BankConflict,
  pub infinite_spill_cost: bool,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct SpilledDecl {
  pub decl: DeclIx,
  pub name: String,
  pub byte_size: u32,
  pub spill_offset: u32,
}

/// The result of register allocation.  Note that allocation can fail!
#[derive(Clone, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct RegAllocResult {
  pub status: AllocStatus,
  /// Indexed by declare number.  Aliases and split pieces resolve to their
  /// root's location plus offset.
  pub assignments: Vec<Option<PhysReg>>,
  /// Every declare spilled by any attempt, in the order spilled.
  pub spilled: Vec<SpilledDecl>,
  /// Pseudo declares that did not get their register block: the client
  /// must save and restore around the corresponding call or function.
  pub save_restore: Vec<DeclIx>,
  pub num_iterations: u32,
  /// GRF count of the successful attempt.
  pub num_grf: u32,
  /// One past the highest GRF assigned.
  pub grf_used: u32,
  pub spill_mem_used: u32,
  /// Indexed by declare number.
  pub decl_info: Vec<DeclRaInfo>,
}

impl RegAllocResult {
  pub fn assignment(&self, decl: DeclIx) -> Option<PhysReg> {
    self.assignments.get(decl.get_usize()).cloned().flatten()
  }
}

//=============================================================================
// Errors

#[derive(Clone, Debug)]
pub enum RegAllocError {
  Analysis(AnalysisError),
  /// Register pressure could not be brought within the register file.
  Infeasible {
    kernel: String,
    spilled: Vec<String>,
    iterations: u32,
  },
  SpillMemoryExhausted {
    kernel: String,
    required: u32,
    limit: u32,
  },
  SpillInsertion(String),
  Checker(CheckerErrors),
}

impl fmt::Display for RegAllocError {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    match self {
      RegAllocError::Analysis(err) => {
        write!(fmt, "analysis error: {}", err)
      }
      RegAllocError::Infeasible { kernel, spilled, iterations } => {
        write!(
          fmt,
          "register pressure too high in kernel '{}' after {} attempts; \
           consider rewriting it",
          kernel, iterations
        )?;
        if !spilled.is_empty() {
          write!(fmt, " (still spilled: {})", spilled.join(", "))?;
        }
        Ok(())
      }
      RegAllocError::SpillMemoryExhausted { kernel, required, limit } => write!(
        fmt,
        "kernel '{}' needs {} bytes of spill memory, more than the {} \
         addressable; register pressure too high",
        kernel, required, limit
      ),
      RegAllocError::SpillInsertion(msg) => {
        write!(fmt, "spill code insertion failed: {}", msg)
      }
      RegAllocError::Checker(errors) => {
        write!(fmt, "checker found {} errors", errors.errors.len())
      }
    }
  }
}

impl std::error::Error for RegAllocError {}

impl From<AnalysisError> for RegAllocError {
  fn from(err: AnalysisError) -> Self {
    RegAllocError::Analysis(err)
  }
}

impl From<CheckerErrors> for RegAllocError {
  fn from(errors: CheckerErrors) -> Self {
    RegAllocError::Checker(errors)
  }
}

pub use crate::driver::allocate_registers;
