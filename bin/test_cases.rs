/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

/// Test cases.  The list of them is right at the bottom, function
/// |find_kernel|.  Add new ones there.
use gpu_regalloc::{
  DeclFlags, Declare, ElemType, GrfAlign, PseudoKind, SubRegAlign,
};

use crate::test_framework::*;

fn input() -> DeclFlags {
  DeclFlags { input: true, ..DeclFlags::default() }
}

fn output() -> DeclFlags {
  DeclFlags { output: true, ..DeclFlags::default() }
}

/// Two values whose lives don't overlap, and not much else.
fn test_disjoint_pair() -> Program {
  let mut p = Program::new("disjoint_pair", 8);
  let a = p.decl(Declare::grf("a", ElemType::D, 8));
  let t = p.decl(Declare::grf("t", ElemType::D, 8));
  let b = p.decl(Declare::grf("b", ElemType::D, 8));
  let out = p.decl(Declare::grf("out", ElemType::D, 8).with_flags(output()));

  p.block(
    "start",
    vec![
      i_imm(8, p.v(a)),
      i_alu(8, p.v(t), &[p.v(a), p.v(a)]),
      i_send(8, None, p.v(t), None),
    ],
    &["next"],
  );
  p.block(
    "next",
    vec![i_imm(8, p.v(b)), i_mov(8, p.v(out), p.v(b))],
    &[],
  );
  p.finish();
  p
}

/// Three values live at once, read together by a mad.
fn test_three_live() -> Program {
  let mut p = Program::new("three_live", 8);
  let a = p.decl(Declare::grf("a", ElemType::F, 8));
  let b = p.decl(Declare::grf("b", ElemType::F, 8));
  let c = p.decl(Declare::grf("c", ElemType::F, 8));
  let d = p.decl(Declare::grf("d", ElemType::F, 8).with_flags(output()));

  p.block(
    "start",
    vec![
      i_imm(8, p.v(a)),
      i_imm(8, p.v(b)),
      i_imm(8, p.v(c)),
      i_mad(8, p.v(d), p.v(a), p.v(b), p.v(c)),
    ],
    &[],
  );
  p.finish();
  p
}

/// `n` one-register values defined up front and summed afterwards, so all
/// of them are live at once.  With `tight` set, a back-to-back temporary
/// sits in the middle of the sum.
fn pressure(name: &str, n: u32, tight: bool) -> Program {
  let mut p = Program::new(name, 8);
  let vs: Vec<_> = (0..n)
    .map(|i| p.decl(Declare::grf(&format!("v{}", i), ElemType::D, 8)))
    .collect();
  let acc = p.decl(Declare::grf("acc", ElemType::D, 8).with_flags(output()));
  let t = p.decl(Declare::grf("t", ElemType::D, 8));

  let mut defs: Vec<Inst> = vs.iter().map(|v| i_imm(8, p.v(*v))).collect();
  defs.push(i_imm(8, p.v(acc)));
  p.block("defs", defs, &["sum"]);

  let mut sum = vec![];
  for (i, v) in vs.iter().enumerate() {
    sum.push(i_alu(8, p.v(acc), &[p.v(acc), p.v(*v)]));
    if tight && i == vs.len() / 2 {
      sum.push(i_alu(8, p.v(t), &[p.v(acc), p.v(acc)]));
      sum.push(i_mov(8, p.v(acc), p.v(t)));
    }
  }
  p.block("sum", sum, &[]);
  p.finish();
  p
}

fn test_pressure() -> Program {
  pressure("pressure", 12, false)
}

fn test_back_to_back() -> Program {
  pressure("back_to_back", 16, true)
}

/// An even-aligned pair of registers next to odd-sized neighbours that
/// would happily push it onto an odd start.
fn test_even_pair() -> Program {
  let mut p = Program::new("even_pair", 16);
  let x = p.decl(Declare::grf("x", ElemType::D, 8));
  let w = p.decl(Declare::grf("w", ElemType::D, 16).with_align(GrfAlign::Even));
  let y = p.decl(Declare::grf("y", ElemType::D, 8));
  let q = p.decl(Declare::grf("q", ElemType::D, 32).with_align(GrfAlign::Quad));
  let out =
    p.decl(Declare::grf("out", ElemType::D, 16).with_flags(output()));

  p.block(
    "start",
    vec![
      i_imm(8, p.v(x)),
      i_imm(16, p.v(w)),
      i_imm(8, p.v(y)),
      i_alu(16, p.v(q), &[p.v(w), p.v(x)]),
      i_alu(16, p.v(out), &[p.v(q), p.v(w), p.v(y)]),
    ],
    &[],
  );
  p.finish();
  p
}

/// Two divergent paths.  `x` gets its upper half written NoMask by
/// channels 8..15 on one path; `y` is written and consumed NoMask by
/// channels 0..7 on the other.  With `overlap` set, `x` is written by
/// channels 0..7 instead.
fn channels(name: &str, overlap: bool) -> Program {
  let mut p = Program::new(name, 16);
  let c = p.decl(Declare::grf("c", ElemType::D, 16));
  let x = p.decl(Declare::grf("x", ElemType::D, 16));
  let y = p.decl(Declare::grf("y", ElemType::D, 8));

  let (x_off, m) = if overlap { (0, 0) } else { (32, 8) };
  p.block("start", vec![i_imm(16, p.v(c))], &["then", "else"]);
  p.divergent_block(
    "then",
    vec![i_mov(8, p.part(x, x_off, 32), p.part(c, x_off, 32))
      .at(m)
      .nomask()],
    &["join"],
  );
  p.divergent_block(
    "else",
    vec![
      i_mov(8, p.v(y), p.part(c, 0, 32)).nomask(),
      i_send(8, None, p.v(y), None),
    ],
    &["join"],
  );
  p.block("join", vec![i_send(16, None, p.v(x), None).eot()], &[]);
  p.finish();
  p
}

fn test_aug_disjoint() -> Program {
  channels("aug_disjoint", false)
}

fn test_aug_overlap() -> Program {
  channels("aug_overlap", true)
}

/// Regular SIMD16 writes inside a divergent loop body, where only the
/// channel-aware model can tell the values apart.
fn test_aug_default_masks() -> Program {
  let mut p = Program::new("aug_default_masks", 16);
  let s = p.decl(Declare::grf("s", ElemType::F, 16).with_flags(input()));
  let a = p.decl(Declare::grf("a", ElemType::F, 16));
  let b = p.decl(Declare::grf("b", ElemType::F, 16));
  let r = p.decl(Declare::grf("r", ElemType::F, 16).with_flags(output()));

  p.block("start", vec![i_mov(16, p.v(r), p.v(s))], &["body"]);
  p.divergent_block(
    "body",
    vec![
      i_alu(16, p.v(a), &[p.v(s), p.v(r)]),
      i_alu(16, p.v(b), &[p.v(a), p.v(a)]),
      i_alu(16, p.v(r), &[p.v(b), p.v(r)]),
    ],
    &["body", "exit"],
  );
  p.block("exit", vec![i_send(16, None, p.v(r), None)], &[]);
  p.finish();
  p
}

/// Straight-line code where `x` is dead while a NoMask write to `y` is
/// live, but both sit inside the span `x` is used over.
fn test_aug_nomask_straight() -> Program {
  let mut p = Program::new("aug_nomask_straight", 8);
  let base = p.decl(Declare::grf("base", ElemType::D, 8).with_flags(input()));
  let x = p.decl(Declare::grf("x", ElemType::D, 8));
  let y = p.decl(Declare::grf("y", ElemType::D, 8));
  let t = p.decl(Declare::grf("t", ElemType::D, 8));
  let out = p.decl(Declare::grf("out", ElemType::D, 8).with_flags(output()));

  p.block(
    "start",
    vec![
      i_alu(8, p.v(x), &[p.v(base)]),
      i_alu(8, p.v(out), &[p.v(x)]),
      i_mov(8, p.v(y), p.v(base)).nomask(),
      i_alu(8, p.v(t), &[p.v(y)]),
      i_alu(8, p.v(x), &[p.v(t)]),
      i_alu(8, p.v(out), &[p.v(out), p.v(x)]),
    ],
    &[],
  );
  p.finish();
  p
}

/// A loop carrying `v` from a NoMask write at the bottom of the body to a
/// read at the top.  `w` lives in between, where `v` is dead.
fn test_aug_loop_nomask() -> Program {
  let mut p = Program::new("aug_loop_nomask", 8);
  let base = p.decl(Declare::grf("base", ElemType::D, 8).with_flags(input()));
  let v = p.decl(Declare::grf("v", ElemType::D, 8));
  let w = p.decl(Declare::grf("w", ElemType::D, 8));
  let out = p.decl(Declare::grf("out", ElemType::D, 8).with_flags(output()));

  p.block("pre", vec![i_mov(8, p.v(v), p.v(base)).nomask()], &["body"]);
  p.block(
    "body",
    vec![
      i_alu(8, p.v(out), &[p.v(v), p.v(base)]),
      i_alu(8, p.v(w), &[p.v(base), p.v(out)]),
      i_alu(8, p.v(out), &[p.v(out), p.v(w)]),
      i_mov(8, p.v(v), p.v(out)).nomask(),
    ],
    &["body", "exit"],
  );
  p.block("exit", vec![i_alu(8, p.v(out), &[p.v(out), p.v(base)])], &[]);
  p.finish();
  p
}

/// Lots of mads reading values from the same few registers; the bank
/// conflict pass has something to chew on.
fn test_bank_mad() -> Program {
  let mut p = Program::new("bank_mad", 16);
  let srcs: Vec<_> = (0..6)
    .map(|i| {
      p.decl(
        Declare::grf(&format!("s{}", i), ElemType::F, 16).with_flags(input()),
      )
    })
    .collect();
  let accs: Vec<_> = (0..3)
    .map(|i| p.decl(Declare::grf(&format!("acc{}", i), ElemType::F, 16)))
    .collect();
  let out = p.decl(Declare::grf("out", ElemType::F, 16).with_flags(output()));

  let mut body = vec![];
  for (k, acc) in accs.iter().enumerate() {
    body.push(i_imm(16, p.v(*acc)));
    for j in 0..4 {
      let (x, y) = (srcs[(k + j) % 6], srcs[(k + 2 * j + 1) % 6]);
      body.push(i_mad(16, p.v(*acc), p.v(*acc), p.v(x), p.v(y)));
    }
  }
  body.push(i_mad(16, p.v(out), p.v(accs[0]), p.v(accs[1]), p.v(accs[2])));
  p.block("start", body, &["loop"]);
  p.block(
    "loop",
    vec![i_mad(16, p.v(out), p.v(out), p.v(srcs[0]), p.v(srcs[3]))],
    &["loop", "exit"],
  );
  p.block("exit", vec![i_send(16, None, p.v(out), None).eot()], &[]);
  p.finish();
  p
}

/// A stack call.  Two values live across the call, one doesn't; the
/// callee has a value of its own.
fn test_stack_call() -> Program {
  let mut p = Program::new("stack_call", 8);
  let keep1 = p.decl(Declare::grf("keep1", ElemType::D, 8));
  let keep2 = p.decl(Declare::grf("keep2", ElemType::D, 16));
  let arg = p.decl(Declare::grf("arg", ElemType::D, 8));
  let local = p.decl(Declare::grf("local", ElemType::D, 8));
  let out = p.decl(Declare::grf("out", ElemType::D, 8).with_flags(output()));
  let vca = p.decl(
    Declare::grf("vca", ElemType::UD, 8).with_pseudo(PseudoKind::CallerSave),
  );
  let vce = p.decl(
    Declare::grf("vce", ElemType::UD, 8).with_pseudo(PseudoKind::CalleeSave),
  );
  let f = p.func("f", Some(vce));

  p.block(
    "start",
    vec![
      i_imm(8, p.v(keep1)),
      i_imm(16, p.v(keep2)),
      i_imm(8, p.v(arg)),
      i_call(f, Some(vca)),
    ],
    &["after"],
  );
  p.block(
    "after",
    vec![i_alu(8, p.v(out), &[p.v(keep1), p.part(keep2, 32, 32), p.v(arg)])],
    &[],
  );
  p.block_in(
    f,
    "f_body",
    vec![
      i_alu(8, p.v(local), &[p.v(arg), p.v(arg)]),
      i_mov(8, p.v(arg), p.v(local)),
      i_ret(),
    ],
    &[],
  );
  p.finish();
  p
}

/// The thread's final send must take its payload from the top GRFs.
fn test_eot() -> Program {
  let mut p = Program::new("eot", 16);
  let a = p.decl(Declare::grf("a", ElemType::F, 16).with_flags(input()));
  let payload = p.decl(Declare::grf("payload", ElemType::F, 16));
  p.block(
    "start",
    vec![
      i_alu(16, p.v(payload), &[p.v(a), p.v(a)]),
      i_send(16, None, p.v(payload), None).eot(),
    ],
    &[],
  );
  p.finish();
  p
}

/// Sends, a split send and a dpas, whose operands mustn't overlap.
fn test_send_dpas() -> Program {
  let mut p = Program::new("send_dpas", 8);
  let addr = p.decl(Declare::grf("addr", ElemType::UD, 8).with_flags(input()));
  let hdr = p.decl(Declare::grf("hdr", ElemType::UD, 8));
  let data = p.decl(Declare::grf("data", ElemType::F, 16));
  let ld = p.decl(Declare::grf("ld", ElemType::F, 16));
  let acc = p.decl(Declare::grf("acc", ElemType::F, 16));
  let wts = p.decl(Declare::grf("wts", ElemType::D, 32));
  let res = p.decl(Declare::grf("res", ElemType::F, 16));

  p.block(
    "start",
    vec![
      i_mov(8, p.v(hdr), p.v(addr)),
      i_send(8, Some(p.v(ld)), p.v(hdr), None),
      i_imm(8, p.v(acc)),
      i_imm(8, p.v(wts)),
      i_dpas(8, p.v(res), p.v(acc), p.v(ld), p.v(wts)),
      i_alu(8, p.v(data), &[p.v(res), p.v(ld)]),
      i_send(8, None, p.v(hdr), Some(p.v(data))),
    ],
    &[],
  );
  p.finish();
  p
}

/// Flag and address registers: a compare writing a flag that predicates a
/// move, and an indirect read through an address register.
fn test_flags_addr() -> Program {
  let mut p = Program::new("flags_addr", 16);
  let x = p.decl(Declare::grf("x", ElemType::F, 16).with_flags(input()));
  let y = p.decl(Declare::grf("y", ElemType::F, 16));
  let tbl = p.decl(Declare::grf("tbl", ElemType::F, 16));
  let f0 = p.decl(Declare::flag("f0", 16));
  let f1 = p.decl(
    Declare::flag("f1", 32).with_sub_align(SubRegAlign::EvenWord),
  );
  let a0 = p.decl(Declare::addr("a0", 2));
  let out = p.decl(Declare::grf("out", ElemType::F, 16).with_flags(output()));
  p.points_to(a0, &[tbl]);

  p.block(
    "start",
    vec![
      i_imm(16, p.v(tbl)),
      i_alu(16, p.v(y), &[p.v(x)]).cmod(p.v(f0)),
      i_alu(16, p.v(y), &[p.v(x), p.v(y)]).cmod(p.v(f1)),
      i_mov(16, p.v(out), p.v(y)).pred(p.v(f0)),
      i_imm(1, p.v(a0)),
      i_mov(16, p.v(y), p.v(out)).indirect(p.v(a0), false),
      i_alu(16, p.v(out), &[p.v(y), p.v(out)]).pred(p.part(f1, 2, 2)),
    ],
    &[],
  );
  p.finish();
  p
}

/// A declare split into two pieces, and an alias reading across both.
fn test_split_alias() -> Program {
  let mut p = Program::new("split_alias", 16);
  let big = p.decl(Declare::grf("big", ElemType::F, 32));
  let lo = p.decl(Declare::grf("lo", ElemType::F, 16).split_of(big, 0));
  let hi = p.decl(Declare::grf("hi", ElemType::F, 16).split_of(big, 64));
  let mid = p.decl(Declare::grf("mid", ElemType::F, 16).alias_of(big, 32));
  let out = p.decl(Declare::grf("out", ElemType::F, 16).with_flags(output()));

  p.block(
    "start",
    vec![
      i_imm(16, p.v(lo)),
      i_imm(16, p.v(hi)),
      i_mov(16, p.part(big, 0, 64), p.v(lo)),
      i_mov(16, p.part(big, 64, 64), p.v(hi)),
      i_alu(16, p.v(out), &[p.v(mid), p.part(big, 0, 64)]),
    ],
    &[],
  );
  p.finish();
  p
}

/// Both halves of a split declare live at once, with a value that has to
/// keep clear of the upper half.
fn test_split_pair() -> Program {
  let mut p = Program::new("split_pair", 8);
  let big = p.decl(Declare::grf("big", ElemType::D, 16));
  let lo = p.decl(Declare::grf("lo", ElemType::D, 8).split_of(big, 0));
  let hi = p.decl(Declare::grf("hi", ElemType::D, 8).split_of(big, 32));
  let x = p.decl(Declare::grf("x", ElemType::D, 8));
  let out = p.decl(Declare::grf("out", ElemType::D, 8).with_flags(output()));

  p.block(
    "start",
    vec![
      i_imm(8, p.v(lo)),
      i_imm(8, p.v(x)),
      i_imm(8, p.v(hi)),
      i_alu(8, p.v(out), &[p.v(lo), p.v(hi), p.v(x)]),
    ],
    &[],
  );
  p.finish();
  p
}

/// A loop nest with a strided write and a predicated update; enough values
/// that a small register file needs several attempts.
fn test_loop_nest() -> Program {
  let mut p = Program::new("loop_nest", 8);
  let base = p.decl(Declare::grf("base", ElemType::D, 8).with_flags(input()));
  let i = p.decl(Declare::grf("i", ElemType::D, 8));
  let j = p.decl(Declare::grf("j", ElemType::D, 8));
  let wide = p.decl(Declare::grf("wide", ElemType::W, 32));
  let sum = p.decl(Declare::grf("sum", ElemType::D, 8).with_flags(output()));
  let cond = p.decl(Declare::flag("cond", 8));
  let ks: Vec<_> = (0..5)
    .map(|n| p.decl(Declare::grf(&format!("k{}", n), ElemType::D, 8)))
    .collect();

  let mut pre = vec![i_imm(8, p.v(sum)), i_imm(8, p.v(i)), i_imm(16, p.v(wide))];
  for k in ks.iter() {
    pre.push(i_alu(8, p.v(*k), &[p.v(base)]));
  }
  p.block("pre", pre, &["outer"]);
  p.block("outer", vec![i_imm(8, p.v(j))], &["inner"]);
  let mut inner = vec![
    i_alu(8, p.strided(wide, 2, 8), &[p.v(j), p.v(i)]),
    i_alu(8, p.v(j), &[p.v(j), p.v(base)]).cmod(p.v(cond)),
  ];
  for k in ks.iter() {
    inner.push(i_alu(8, p.v(sum), &[p.v(sum), p.v(*k)]).pred(p.v(cond)));
  }
  p.block("inner", inner, &["inner", "latch"]);
  p.block(
    "latch",
    vec![
      i_alu(8, p.v(sum), &[p.v(sum), p.strided(wide, 2, 8)]),
      i_alu(8, p.v(i), &[p.v(i), p.v(j)]),
    ],
    &["outer", "exit"],
  );
  p.block("exit", vec![i_send(8, None, p.v(sum), None)], &[]);
  p.finish();
  p
}

pub fn find_kernel(name: &str) -> Result<Program, Vec<String>> {
  let all_kernels = vec![
    test_disjoint_pair(),
    test_three_live(),
    test_pressure(),
    test_back_to_back(),
    test_even_pair(),
    test_aug_disjoint(),
    test_aug_overlap(),
    test_aug_default_masks(),
    test_aug_nomask_straight(),
    test_aug_loop_nomask(),
    test_bank_mad(),
    test_stack_call(),
    test_eot(),
    test_send_dpas(),
    test_flags_addr(),
    test_split_alias(),
    test_split_pair(),
    test_loop_nest(),
  ];

  let mut all_names = Vec::new();
  for cand in &all_kernels {
    all_names.push(cand.name.clone());
  }

  for cand in all_kernels {
    if cand.name == *name {
      return Ok(cand);
    }
  }

  all_names.sort();
  Err(all_names)
}

/// Every built-in kernel, for tests that sweep them all.
pub fn all_kernel_names() -> Vec<String> {
  match find_kernel("") {
    Ok(_) => vec![],
    Err(names) => names,
  }
}
