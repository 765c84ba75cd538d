/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Implements fuzzing primitives: random kernels for the test IR.
//!
//! Generated kernels only use root GRF declares, so the interpreter can run
//! them before and after allocation and compare.  Control flow is built so
//! that the interpreter's round-robin choice of successor always reaches the
//! last block.

use arbitrary::{Arbitrary, Result, Unstructured};
use rustc_hash::FxHashSet;

use crate::test_framework::*;
use gpu_regalloc::{DeclFlags, DeclIx, Declare, ElemType, GrfAlign, Operand};

pub const MAX_DECLS: u32 = 24;
pub const MAX_BLOCKS: u32 = 6;
pub const MAX_BLOCK_INSTS: u32 = 10;

struct FuzzingEnv {
  simd_size: u32,
  /// Declare, and its size in bytes.
  decls: Vec<(DeclIx, u32)>,
  /// Declares written so far, in program order.  Reads prefer these.
  defined: FxHashSet<DeclIx>,
  output: DeclIx,
}

impl FuzzingEnv {
  fn any_decl(&self, u: &mut Unstructured) -> Result<(DeclIx, u32)> {
    Ok(*u.choose(&self.decls)?)
  }

  fn src(&self, p: &Program, u: &mut Unstructured) -> Result<Operand> {
    let defined: Vec<&(DeclIx, u32)> =
      self.decls.iter().filter(|(d, _)| self.defined.contains(d)).collect();
    let (d, _) = if !defined.is_empty() && u.ratio(7, 8)? {
      **u.choose(&defined)?
    } else {
      self.any_decl(u)?
    };
    Ok(p.v(d))
  }

  fn dst(&mut self, p: &Program, u: &mut Unstructured) -> Result<Operand> {
    let (d, bytes) = self.any_decl(u)?;
    self.defined.insert(d);
    // A partial write, one register's worth, now and then.
    if bytes > 32 && u.ratio(1, 4)? {
      let off = 32 * u.int_in_range(0..=bytes / 32 - 1)?;
      return Ok(p.part(d, off, 32));
    }
    Ok(p.v(d))
  }

  fn inst(&mut self, p: &Program, u: &mut Unstructured) -> Result<Inst> {
    const NUM_VARIANTS: u8 = 6;
    let exec = self.simd_size;
    let inst = match u8::arbitrary(u)? % NUM_VARIANTS {
      0 => i_imm(exec, self.dst(p, u)?),
      1 => {
        let s0 = self.src(p, u)?;
        let s1 = self.src(p, u)?;
        i_alu(exec, self.dst(p, u)?, &[s0, s1])
      }
      2 => {
        let s = self.src(p, u)?;
        i_mov(exec, self.dst(p, u)?, s).nomask()
      }
      3 => {
        let s0 = self.src(p, u)?;
        let s1 = self.src(p, u)?;
        let s2 = self.src(p, u)?;
        i_mad(exec, self.dst(p, u)?, s0, s1, s2)
      }
      4 => {
        let payload = self.src(p, u)?;
        if bool::arbitrary(u)? {
          let dst = self.dst(p, u)?;
          i_send(exec, Some(dst), payload, None)
        } else {
          let ext = self.src(p, u)?;
          i_send(exec, None, payload, Some(ext))
        }
      }
      5 => {
        // The upper half of a SIMD16 kernel.
        let s = self.src(p, u)?;
        i_mov(8, self.dst(p, u)?, s).at(if exec == 16 { 8 } else { 0 })
      }
      x => {
        debug_assert!(x < NUM_VARIANTS, "update NUM_VARIANTS above");
        unreachable!()
      }
    };
    Ok(inst)
  }

  /// Successors of block `n` of `num_blocks`.  The first successor is
  /// taken on the first visit, so a back edge must be paired with a way
  /// forward.
  fn succs(
    &self, n: u32, num_blocks: u32, u: &mut Unstructured,
  ) -> Result<Vec<String>> {
    if n + 1 == num_blocks {
      return Ok(vec![]);
    }
    let next = format!("b{}", n + 1);
    Ok(match u8::arbitrary(u)? % 4 {
      0 => {
        let back = u.int_in_range(0..=n)?;
        vec![format!("b{}", back), next]
      }
      1 if n + 2 < num_blocks => {
        let skip = u.int_in_range(n + 2..=num_blocks - 1)?;
        vec![next, format!("b{}", skip)]
      }
      _ => vec![next],
    })
  }
}

fn align_for(bytes: u32, u: &mut Unstructured) -> Result<GrfAlign> {
  Ok(match u8::arbitrary(u)? % 4 {
    1 if bytes >= 64 => GrfAlign::Even,
    2 if bytes >= 128 => GrfAlign::Quad,
    _ => GrfAlign::Either,
  })
}

impl<'a> Arbitrary<'a> for Program {
  fn arbitrary(u: &mut Unstructured<'a>) -> Result<Program> {
    let simd_size = if bool::arbitrary(u)? { 16 } else { 8 };
    let mut p = Program::new("funk", simd_size);

    let num_decls = u.int_in_range(2..=MAX_DECLS)?;
    let mut decls = vec![];
    for n in 0..num_decls {
      let num_elems = *u.choose(&[8u32, 16, 32])?;
      let bytes = num_elems * ElemType::D.size();
      let flags = DeclFlags { input: n < 2, ..DeclFlags::default() };
      let d = p.decl(
        Declare::grf(&format!("v{}", n), ElemType::D, num_elems)
          .with_align(align_for(bytes, u)?)
          .with_flags(flags),
      );
      decls.push((d, bytes));
    }
    let out_flags = DeclFlags { output: true, ..DeclFlags::default() };
    let output =
      p.decl(Declare::grf("out", ElemType::D, simd_size).with_flags(out_flags));

    let mut env = FuzzingEnv {
      simd_size,
      defined: decls.iter().take(2).map(|(d, _)| *d).collect(),
      decls,
      output,
    };

    let num_blocks = u.int_in_range(1..=MAX_BLOCKS)?;
    for n in 0..num_blocks {
      let num_insts = u.int_in_range(1..=MAX_BLOCK_INSTS)?;
      let mut insts = vec![];
      for _ in 0..num_insts {
        insts.push(env.inst(&p, u)?);
      }
      let succs = env.succs(n, num_blocks, u)?;
      if n + 1 == num_blocks {
        let s = env.src(&p, u)?;
        insts.push(i_alu(simd_size, p.v(env.output), &[s]));
      }
      let succs: Vec<&str> = succs.iter().map(|s| s.as_str()).collect();
      let name = format!("b{}", n);
      if n > 0 && u.ratio(1, 3)? {
        p.divergent_block(&name, insts, &succs);
      } else {
        p.block(&name, insts, &succs);
      }
    }
    p.finish();
    Ok(p)
  }
}

/// Bytes for `Unstructured`, reproducible from `seed`.
pub fn bytes_from_seed(seed: u64, len: usize) -> Vec<u8> {
  let mut x = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
  (0..len)
    .map(|_| {
      // xorshift64*
      x ^= x >> 12;
      x ^= x << 25;
      x ^= x >> 27;
      (x.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 56) as u8
    })
    .collect()
}

/// The random kernel for `seed`.
pub fn kernel_from_seed(seed: u64) -> Result<Program> {
  let bytes = bytes_from_seed(seed, 4096);
  let mut u = Unstructured::new(&bytes);
  Program::arbitrary(&mut u)
}
