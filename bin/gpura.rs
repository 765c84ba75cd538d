/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

/* Followups:

- Local splitting of long ranges around their hot regions, before giving
  up and spilling the whole declare.

- Spill coalescing only merges fills.  Merging adjacent spills needs the
  kernel to tell us which temps are written back together.
*/

mod fuzzing;
mod test_cases;
mod test_framework;

use gpu_regalloc::{
  allocate_registers, Platform, RegAllocOptions, RegAllocResult,
};
use test_framework::{check_results, run_program, Program, RunStage};

use clap;
use log::{self, error, info};
use pretty_env_logger;
use std::fs::File;
use std::io::BufWriter;

//=============================================================================
// Top level

fn main() {
  pretty_env_logger::init();

  let app = clap::App::new("gpura")
    .about("a simple program to allow separate testing of gpu-regalloc")
    .arg(
      clap::Arg::new("test")
        .short('t')
        .takes_value(true)
        .required_unless_present("seed")
        .help("test kernel name"),
    )
    .arg(
      clap::Arg::new("seed")
        .short('s')
        .takes_value(true)
        .conflicts_with("test")
        .help("allocate a random kernel generated from this seed instead"),
    )
    .arg(
      clap::Arg::new("grf")
        .short('g')
        .takes_value(true)
        .help("number of GRFs for the first attempt (128 if not set)"),
    )
    .arg(
      clap::Arg::new("max-grf")
        .short('m')
        .takes_value(true)
        .help("number of GRFs the allocator may grow to (-g if not set)"),
    )
    .arg(
      clap::Arg::new("platform")
        .short('p')
        .takes_value(true)
        .possible_values(["legacy", "tgl"])
        .help("bank structure to allocate for"),
    )
    .arg(
      clap::Arg::new("no-augmentation")
        .long("no-augmentation")
        .help("don't refine interference with channel masks"),
    )
    .arg(
      clap::Arg::new("checker")
        .short('c')
        .help("run the checker on the final assignment"),
    )
    .arg(
      clap::Arg::new("dump")
        .short('o')
        .takes_value(true)
        .help("write the allocation result to this file, bincode-encoded"),
    );
  let matches = app.get_matches();

  let mut prog = match (matches.value_of("test"), matches.value_of("seed")) {
    (Some(name), _) => match crate::test_cases::find_kernel(name) {
      Ok(prog) => prog,
      Err(available_kernel_names) => {
        error!("can't find kernel with name '{}'", name);
        println!("available kernel names are:");
        for name in available_kernel_names {
          println!("     {}", name);
        }
        return;
      }
    },
    (None, Some(seed)) => {
      let kernel = seed.parse::<u64>().map_err(|e| e.to_string()).and_then(
        |s| fuzzing::kernel_from_seed(s).map_err(|e| e.to_string()),
      );
      match kernel {
        Ok(prog) => prog,
        Err(e) => {
          println!("can't generate a kernel from seed '{}': {}", seed, e);
          return;
        }
      }
    }
    (None, None) => unreachable!(),
  };

  let num_grf = match matches.value_of("grf").unwrap_or("128").parse::<u32>()
  {
    Ok(n) => n,
    Err(_) => {
      println!("invalid GRF count");
      return;
    }
  };
  let max_num_grf = match matches.value_of("max-grf").map(|v| v.parse::<u32>())
  {
    None => num_grf,
    Some(Ok(n)) if n >= num_grf => n,
    Some(_) => {
      println!("invalid maximum GRF count");
      return;
    }
  };
  let platform = match matches.value_of("platform") {
    Some("tgl") => Platform::Tgl,
    _ => Platform::Legacy,
  };

  let opts = RegAllocOptions {
    num_grf,
    max_num_grf,
    platform,
    has_stack_calls: prog.funcs.len() > 1,
    augmentation: !matches.is_present("no-augmentation"),
    run_checker: matches.is_present("checker"),
    ..RegAllocOptions::default()
  };
  info!("options: {:?}", opts);

  prog.print("before allocation");

  // Just so we can run it later.  Not needed for actual allocation.
  let original_prog = prog.clone();

  let result = match allocate_registers(&mut prog, &opts) {
    Err(e) => {
      println!("allocation failed: {}", e);
      return;
    }
    Ok(r) => r,
  };

  prog.print("after allocation");
  print_result(&prog, &result);

  if let Some(path) = matches.value_of("dump") {
    let written = File::create(path)
      .map_err(|e| e.to_string())
      .and_then(|f| {
        bincode::serialize_into(BufWriter::new(f), &result)
          .map_err(|e| e.to_string())
      });
    if let Err(e) = written {
      println!("can't write the result to '{}': {}", path, e);
    }
  }

  let before_regalloc_result = run_program(
    &original_prog,
    "Before allocation",
    RunStage::BeforeRegalloc,
    None,
  );
  let after_regalloc_result = run_program(
    &prog,
    "After allocation",
    RunStage::AfterRegalloc,
    Some((&result, &opts)),
  );

  println!("");

  match (before_regalloc_result, after_regalloc_result) {
    (Ok(before), Ok(after)) => match check_results(&before, &after) {
      Ok(()) => println!("results agree"),
      Err(e) => println!("results differ: {}", e),
    },
    (Err(e), _) => println!("can't run the kernel before allocation: {}", e),
    (_, Err(e)) => println!("can't run the kernel after allocation: {}", e),
  }
}

fn print_result(prog: &Program, result: &RegAllocResult) {
  println!(
    "{:?} after {} attempts, {} GRFs, {} used, {} bytes of spill memory",
    result.status,
    result.num_iterations,
    result.num_grf,
    result.grf_used,
    result.spill_mem_used
  );
  for (d, at) in prog.decls.iter().zip(result.assignments.iter()) {
    if let Some(at) = at {
      println!("  {:<12} {}{:?}", d.name, d.reg_file.prefix(), at);
    }
  }
  for s in result.spilled.iter() {
    println!(
      "  {:<12} spilled, {} bytes at offset {}",
      s.name, s.byte_size, s.spill_offset
    );
  }
  for d in result.save_restore.iter() {
    println!("  {:<12} save/restore", prog.decls[d.get_usize()].name);
  }
}

#[cfg(test)]
mod test_utils {
  use gpu_regalloc::analysis::FlowInfo;
  use gpu_regalloc::interference::{
    interference_for_kernel, InterferenceGraph,
  };
  use gpu_regalloc::live_range::LiveRange;
  use gpu_regalloc::{LrIx, TypedIxVec};

  use super::*;

  pub fn opts(num_grf: u32) -> RegAllocOptions {
    RegAllocOptions {
      num_grf,
      max_num_grf: num_grf,
      run_checker: true,
      ..RegAllocOptions::default()
    }
  }

  pub fn kernel(name: &str) -> Program {
    test_cases::find_kernel(name).unwrap()
  }

  pub fn run(
    prog: &mut Program, opts: &RegAllocOptions,
  ) -> Result<RegAllocResult, RegAllocError> {
    let _ = pretty_env_logger::try_init();
    allocate_registers(prog, opts)
  }

  /// Allocate, then run the program before and after and compare.
  pub fn check_program(
    mut prog: Program, opts: &RegAllocOptions,
  ) -> (Program, RegAllocResult) {
    let _ = pretty_env_logger::try_init();
    let before =
      run_program(&prog, "Before allocation", RunStage::BeforeRegalloc, None)
        .unwrap();
    prog.print("BEFORE");
    let result = allocate_registers(&mut prog, opts).unwrap_or_else(|err| {
      panic!("allocation failed: {}", err);
    });
    prog.print("AFTER");
    let after = run_program(
      &prog,
      "After allocation",
      RunStage::AfterRegalloc,
      Some((&result, opts)),
    )
    .unwrap();
    check_results(&before, &after).unwrap();
    (prog, result)
  }

  pub fn check(name: &str, opts: &RegAllocOptions) -> (Program, RegAllocResult) {
    check_program(kernel(name), opts)
  }

  pub struct Graph {
    pub prog: Program,
    pub flow: FlowInfo,
    pub lrs: TypedIxVec<LrIx, LiveRange>,
    pub intf: InterferenceGraph,
  }

  impl Graph {
    pub fn lr(&self, name: &str) -> LrIx {
      let d = self.prog.decl_named(name).unwrap();
      self.flow.vars.lr_of(d).unwrap()
    }
  }

  pub fn graph(name: &str, opts: &RegAllocOptions) -> Graph {
    let _ = pretty_env_logger::try_init();
    let prog = kernel(name);
    let (flow, lrs, intf) = interference_for_kernel(&prog, opts).unwrap();
    Graph { prog, flow, lrs, intf }
  }

  /// Every declare split off another sits at its offset inside it.
  pub fn check_split_pieces(prog: &Program, result: &RegAllocResult) {
    let grf_bytes = RegAllocOptions::default().grf_bytes;
    for (i, d) in prog.decls.iter().enumerate() {
      if let Some((parent, off)) = d.split_parent {
        let piece = result.assignment(DeclIx::new(i as u32)).unwrap();
        let base = result.assignment(parent).unwrap();
        assert_eq!(piece.reg, base.reg + off / grf_bytes, "{}", d.name);
        assert_eq!(piece.sub_reg, 0, "{}", d.name);
      }
    }
  }
}

#[cfg(test)]
use gpu_regalloc::{AllocStatus, DeclIx, LrIx, RegAllocError};
#[cfg(test)]
use test_utils::*;

#[test]
fn disjoint_values_share_a_register() {
  let g = graph("disjoint_pair", &opts(2));
  assert!(!g.intf.interfere(g.lr("a"), g.lr("b")));
  let (prog, result) = check("disjoint_pair", &opts(2));
  let a = result.assignment(prog.decl_named("a").unwrap()).unwrap();
  let b = result.assignment(prog.decl_named("b").unwrap()).unwrap();
  assert_eq!(a.reg, 1);
  assert_eq!(a, b);
}

#[test]
fn simultaneously_live_values_get_distinct_registers() {
  let g = graph("three_live", &opts(8));
  for (x, y) in [("a", "b"), ("b", "c"), ("a", "c")].iter() {
    assert!(g.intf.interfere(g.lr(x), g.lr(y)));
  }
  let (prog, result) = check("three_live", &opts(8));
  let regs: Vec<u32> = ["a", "b", "c"]
    .iter()
    .map(|n| result.assignment(prog.decl_named(n).unwrap()).unwrap().reg)
    .collect();
  assert_ne!(regs[0], regs[1]);
  assert_ne!(regs[1], regs[2]);
  assert_ne!(regs[0], regs[2]);
}

#[test]
fn pressure_spills_and_resolves() {
  let (_, result) = check("pressure", &opts(8));
  assert_eq!(result.status, AllocStatus::SpilledAndResolved);
  assert!(!result.spilled.is_empty());
  assert!(result.num_iterations > 1);
  assert!(result.grf_used <= 8);

  // Spill slots don't overlap and fit in what was reported.
  let mut slots: Vec<(u32, u32)> = result
    .spilled
    .iter()
    .map(|s| (s.spill_offset, s.spill_offset + s.byte_size))
    .collect();
  slots.sort();
  for w in slots.windows(2) {
    assert!(w[0].1 <= w[1].0);
  }
  assert!(slots.last().unwrap().1 <= result.spill_mem_used);
}

#[test]
fn pressure_grows_the_file_before_spilling() {
  let o = RegAllocOptions { max_num_grf: 32, ..opts(8) };
  let (_, result) = check("pressure", &o);
  assert_eq!(result.status, AllocStatus::Success);
  assert!(result.spilled.is_empty());
  assert_eq!(result.num_grf, 16);
}

#[test]
fn back_to_back_temp_is_never_spilled() {
  let (prog, result) = check("back_to_back", &opts(8));
  assert!(!result.spilled.is_empty());
  assert!(result.spilled.iter().all(|s| s.name != "t"));
  let t = prog.decl_named("t").unwrap();
  assert!(result.decl_info[t.get_usize()].infinite_spill_cost);
  assert!(result.assignment(t).is_some());
}

#[test]
fn aligned_ranges_start_on_aligned_registers() {
  let (prog, result) = check("even_pair", &opts(16));
  let w = result.assignment(prog.decl_named("w").unwrap()).unwrap();
  let q = result.assignment(prog.decl_named("q").unwrap()).unwrap();
  assert_eq!(w.reg % 2, 0);
  assert_eq!(q.reg % 4, 0);
}

#[test]
fn disjoint_channel_footprints_give_a_weak_edge() {
  let g = graph("aug_disjoint", &opts(128));
  let (x, y) = (g.lr("x"), g.lr("y"));
  assert!(!g.intf.interfere(x, y));
  assert!(g.intf.has_weak_edge(x, y));
  assert!(g.intf.has_weak_edge(y, x));
  check("aug_disjoint", &opts(128));
}

#[test]
fn overlapping_channel_footprints_give_a_hard_edge() {
  let g = graph("aug_overlap", &opts(128));
  assert!(g.intf.interfere(g.lr("x"), g.lr("y")));

  let o = RegAllocOptions { augmentation: false, ..opts(128) };
  let g = graph("aug_overlap", &o);
  assert!(!g.intf.interfere(g.lr("x"), g.lr("y")));
}

#[test]
fn nomask_writes_in_uniform_code_give_a_hard_edge() {
  let g = graph("aug_nomask_straight", &opts(128));
  assert!(g.intf.interfere(g.lr("x"), g.lr("y")));

  let o = RegAllocOptions { augmentation: false, ..opts(128) };
  let g = graph("aug_nomask_straight", &o);
  assert!(!g.intf.interfere(g.lr("x"), g.lr("y")));
  check("aug_nomask_straight", &opts(128));
}

#[test]
fn loop_carried_values_span_the_whole_loop() {
  use gpu_regalloc::augmentation::build_intervals;
  use gpu_regalloc::{BlockIx, Kernel};

  let g = graph("aug_loop_nomask", &opts(128));
  let body = g.prog.block_insts(BlockIx::new(1));
  let (first, last) = (body.first().get(), body.end().get() - 1);
  let v = g.lr("v");
  let intervals = build_intervals(&g.prog, &g.flow, &g.lrs, &[]);
  assert!(intervals
    .iter()
    .any(|i| i.lr == v && i.start <= first && i.end >= last));

  // Classical liveness has v dead wherever w is live.
  assert!(g.intf.interfere(v, g.lr("w")));
  check("aug_loop_nomask", &opts(128));
}

#[test]
fn graphs_are_symmetric_without_self_edges() {
  for name in test_cases::all_kernel_names() {
    let mut o = opts(128);
    o.has_stack_calls = name == "stack_call";
    let g = graph(&name, &o);
    let n = g.intf.num_vars();
    for i in 0..n {
      let a = LrIx::new(i);
      assert!(!g.intf.interfere(a, a), "{}: self edge", name);
      for j in 0..n {
        let b = LrIx::new(j);
        assert_eq!(g.intf.interfere(a, b), g.intf.interfere(b, a));
        assert_eq!(g.intf.has_weak_edge(a, b), g.intf.has_weak_edge(b, a));
      }
    }
    assert_eq!(g.intf.edges().len() as u32, g.intf.num_edges());
  }
}

#[test]
fn graphs_are_rebuilt_identically() {
  for name in test_cases::all_kernel_names() {
    let mut o = opts(128);
    o.has_stack_calls = name == "stack_call";
    let g1 = graph(&name, &o);
    let g2 = graph(&name, &o);
    assert_eq!(g1.intf.edges(), g2.intf.edges(), "{}", name);
    assert_eq!(g1.intf.num_weak_edges(), g2.intf.num_weak_edges());
    for i in 0..g1.intf.num_vars() {
      let mut w1 = g1.intf.weak_neighbors(LrIx::new(i)).to_vec();
      let mut w2 = g2.intf.weak_neighbors(LrIx::new(i)).to_vec();
      w1.sort();
      w2.sort();
      assert_eq!(w1, w2);
    }

    // The sparse representation holds the same graph.
    let sparse = graph(&name, &RegAllocOptions { dense_matrix_limit: 0, ..o });
    assert!(!sparse.intf.is_dense());
    assert_eq!(g1.intf.edges(), sparse.intf.edges(), "{}", name);
  }
}

#[test]
fn split_pieces_never_interfere_with_their_family() {
  let g = graph("split_alias", &opts(128));
  let (big, lo, hi) = (g.lr("big"), g.lr("lo"), g.lr("hi"));
  assert_eq!(g.lrs[lo].parent, Some((big, 0)));
  assert_eq!(g.lrs[hi].parent, Some((big, 2)));
  assert!(!g.intf.interfere(lo, hi));
  assert!(!g.intf.interfere(big, lo));
  assert!(!g.intf.interfere(big, hi));
}

#[test]
fn split_pieces_sit_at_their_offset_in_the_parent() {
  for name in ["split_alias", "split_pair"].iter() {
    for round_robin in [true, false].iter() {
      let o = RegAllocOptions { round_robin: *round_robin, ..opts(16) };
      let (prog, result) = check(name, &o);
      check_split_pieces(&prog, &result);
    }
  }

  let g = graph("split_pair", &opts(16));
  assert!(g.intf.interfere(g.lr("x"), g.lr("hi")));
  assert!(g.intf.interfere(g.lr("x"), g.lr("lo")));
  let (prog, result) = check("split_pair", &opts(16));
  let x = result.assignment(prog.decl_named("x").unwrap()).unwrap();
  let big = result.assignment(prog.decl_named("big").unwrap()).unwrap();
  assert!(x.reg < big.reg || x.reg >= big.reg + 2);
}

#[test]
fn eot_payload_sits_in_the_top_registers() {
  let (prog, result) = check("eot", &opts(128));
  let p = result.assignment(prog.decl_named("payload").unwrap()).unwrap();
  assert!(p.reg >= 128 - 16);

  let o = RegAllocOptions { eot_grf_binding: false, ..opts(128) };
  let (prog, result) = check("eot", &o);
  let p = result.assignment(prog.decl_named("payload").unwrap()).unwrap();
  assert!(p.reg < 128 - 16);
}

#[test]
fn values_live_across_a_stack_call_use_callee_save_registers() {
  let o = RegAllocOptions { has_stack_calls: true, ..opts(128) };
  let g = graph("stack_call", &o);
  assert!(g.lrs[g.lr("keep1")].crosses_call);
  assert!(g.lrs[g.lr("keep2")].crosses_call);
  assert!(!g.lrs[g.lr("out")].crosses_call);

  let (prog, result) = check("stack_call", &o);
  let start = o.callee_save_start(128);
  let end = o.callee_save_end(128);
  for name in ["keep1", "keep2"].iter() {
    let at = result.assignment(prog.decl_named(name).unwrap()).unwrap();
    assert!(at.reg >= start && at.reg < end, "{} at {:?}", name, at);
  }
}

#[test]
fn sends_and_dpas_keep_their_operands_apart() {
  let g = graph("send_dpas", &opts(128));
  assert!(g.intf.interfere(g.lr("ld"), g.lr("hdr")));
  assert!(g.intf.interfere(g.lr("hdr"), g.lr("data")));
  assert!(g.intf.interfere(g.lr("res"), g.lr("ld")));
  check("send_dpas", &opts(128));
}

#[test]
fn all_kernels_run_the_same_after_allocation() {
  for name in test_cases::all_kernel_names() {
    let mut o = opts(128);
    o.has_stack_calls = name == "stack_call";
    check(&name, &o);
  }
}

#[test]
fn all_kernels_run_the_same_on_a_small_file() {
  for name in test_cases::all_kernel_names() {
    if name == "stack_call" {
      continue;
    }
    check(&name, &opts(24));
  }
}

#[test]
fn tgl_bank_heuristic_is_sound() {
  for name in ["bank_mad", "send_dpas", "loop_nest"].iter() {
    let o = RegAllocOptions { platform: Platform::Tgl, ..opts(128) };
    check(name, &o);
  }
}

#[test]
fn exhausting_the_iterations_is_an_error() {
  let o = RegAllocOptions { max_iterations: 1, ..opts(4) };
  let mut prog = kernel("pressure");
  let err = run(&mut prog, &o).unwrap_err();
  match &err {
    RegAllocError::Infeasible { kernel, iterations, spilled } => {
      assert_eq!(kernel, "pressure");
      assert_eq!(*iterations, 1);
      assert!(!spilled.is_empty());
    }
    other => panic!("unexpected error {:?}", other),
  }
  assert!(err.to_string().contains("register pressure too high"));
}

#[test]
fn exhausting_spill_memory_is_an_error() {
  let o = RegAllocOptions { spill_mem_limit: 32, ..opts(4) };
  let mut prog = kernel("pressure");
  match run(&mut prog, &o) {
    Err(RegAllocError::SpillMemoryExhausted { required, limit, .. }) => {
      assert_eq!(limit, 32);
      assert!(required > limit);
    }
    other => panic!("unexpected outcome {:?}", other.map(|r| r.status)),
  }
}

#[test]
fn random_kernels_run_the_same_after_allocation() {
  let _ = pretty_env_logger::try_init();
  for seed in 0..48 {
    let prog = match fuzzing::kernel_from_seed(seed) {
      Ok(prog) => prog,
      Err(_) => continue,
    };
    let before = match run_program(
      &prog,
      "Before allocation",
      RunStage::BeforeRegalloc,
      None,
    ) {
      Ok(r) => r,
      Err(_) => continue,
    };
    let o = RegAllocOptions { max_num_grf: 32, ..opts(16) };
    let mut prog = prog;
    let result = match allocate_registers(&mut prog, &o) {
      Ok(r) => r,
      Err(RegAllocError::Infeasible { .. }) => continue,
      Err(e) => panic!("seed {}: allocation failed: {}", seed, e),
    };
    let after = run_program(
      &prog,
      "After allocation",
      RunStage::AfterRegalloc,
      Some((&result, &o)),
    )
    .unwrap();
    if let Err(e) = check_results(&before, &after) {
      panic!("seed {}: {}", seed, e);
    }
  }
}
