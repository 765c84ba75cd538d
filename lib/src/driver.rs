/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! The iteration driver: analyze, color, and on failure grow the register
//! file or spill and go round again.

use log::{debug, info, log_enabled, Level};

use crate::analysis::FlowInfo;
use crate::augmentation::AugmentationState;
use crate::bank_conflict::{compute_bank_conflicts, BankConflict};
use crate::checker::Checker;
use crate::data_structures::{DeclIx, LrIx, Set, TypedIxVec};
use crate::graph_color::{
  color_graph, compute_degrees, compute_spill_costs, ColorContext,
  ColorOutcome, MAXSPILLCOST,
};
use crate::interface::{
  AllocStatus, DeclRaInfo, Kernel, PhysReg, RegAllocError, RegAllocOptions,
  RegAllocResult, RegFile, SpilledDecl,
};
use crate::interference::compute_interference;
use crate::live_range::{
  create_live_ranges, mark_infinite_spill_costs, units_to_phys,
  ForbiddenRegs, LiveRange,
};
use crate::spill::{build_spill_request, SpillMemory};

/// State carried from one attempt to the next.
struct RaState {
  num_grf: u32,
  /// Root declares already in memory.
  spilled_set: Set<DeclIx>,
  spilled: Vec<SpilledDecl>,
  /// Declares created or rewritten by the latest round of spilling.
  touched: Set<DeclIx>,
  aug: AugmentationState,
  mem: SpillMemory,
}

/// What one attempt produced.
struct Attempt {
  flow: FlowInfo,
  lrs: TypedIxVec<LrIx, LiveRange>,
  outcome: ColorOutcome,
}

fn run_attempt<K: Kernel>(
  kernel: &K, opts: &RegAllocOptions, st: &mut RaState, iteration: u32,
) -> Result<Attempt, RegAllocError> {
  let fail_safe = iteration >= opts.fail_safe_iteration;
  st.aug.begin_attempt(st.num_grf, &st.touched, opts.incremental);
  st.touched = Set::empty();

  let flow = FlowInfo::compute(kernel, &st.spilled_set, opts)?;
  let mut lrs = create_live_ranges(
    kernel,
    &flow.vars,
    &flow.sums,
    opts,
    st.num_grf,
    fail_safe,
  );
  mark_infinite_spill_costs(kernel, &flow, &mut lrs);
  let bank = compute_bank_conflicts(
    kernel,
    &flow.infos,
    &flow.vars,
    &flow.cfg,
    &mut lrs,
    opts,
  );
  let (intf, calls) =
    compute_interference(kernel, &flow, &mut lrs, opts, &mut st.aug);
  compute_degrees(&mut lrs, &intf);
  compute_spill_costs(&mut lrs, opts);

  let forbidden = ForbiddenRegs::new(opts, st.num_grf, fail_safe);
  let ctx = ColorContext {
    lrs: &lrs,
    intf: &intf,
    forbidden: &forbidden,
    opts,
    num_grf: st.num_grf,
    bank: &bank,
    use_bank_hints: bank.three_source_candidate,
  };
  let round_robin = opts.round_robin && iteration == 0 && !fail_safe;
  let outcome = color_graph(&ctx, round_robin);
  debug!(
    "attempt {}: {} calls, {} files fell back to first-fit",
    iteration,
    calls.len(),
    outcome.fell_back.len()
  );

  let colored = outcome.spilled.iter().all(|lr| lrs[*lr].is_pseudo());
  if colored && opts.run_checker {
    Checker::new(
      kernel,
      &flow,
      &lrs,
      &intf,
      &forbidden,
      &outcome.assignments,
      opts,
      st.num_grf,
    )
    .run()?;
  }
  Ok(Attempt { flow, lrs, outcome })
}

/// Translate the per-range assignment into physical locations for every
/// declare, aliases and split pieces included.
fn build_result<K: Kernel>(
  kernel: &K, opts: &RegAllocOptions, st: RaState, att: &Attempt,
  iteration: u32,
) -> RegAllocResult {
  let decls = kernel.declares();
  let vars = &att.flow.vars;
  let mut assignments = Vec::with_capacity(decls.len());
  let mut decl_info = Vec::with_capacity(decls.len());
  for (i, d) in decls.iter().enumerate() {
    let dix = DeclIx::new(i as u32);
    let (root, off) = vars.root_of(dix);
    let lr = vars.lr_of(dix);
    let at: Option<PhysReg> = lr
      .and_then(|lr| att.outcome.assignments[lr])
      .map(|unit| {
        units_to_phys(unit, off, d.reg_file, d.elem_type.size(), opts)
      });
    assignments.push(at);
    decl_info.push(DeclRaInfo {
      ref_count: lr.map_or(0, |lr| att.flow.sums[lr].num_refs),
      aug_mask: st.aug.mask_of(root),
      bank_conflict: lr.map_or(BankConflict::None, |lr| att.lrs[lr].bank),
      infinite_spill_cost: lr.map_or(false, |lr| att.lrs[lr].infinite_cost),
    });
  }

  let grf_used = att
    .lrs
    .enumerate()
    .filter(|(_, r)| r.reg_file == RegFile::Grf)
    .filter_map(|(lr, r)| att.outcome.assignments[lr].map(|s| s + r.num_regs))
    .max()
    .unwrap_or(0);
  let save_restore: Vec<DeclIx> =
    att.outcome.spilled.iter().map(|lr| att.lrs[*lr].decl).collect();

  RegAllocResult {
    status: if st.spilled.is_empty() {
      AllocStatus::Success
    } else {
      AllocStatus::SpilledAndResolved
    },
    assignments,
    spilled: st.spilled,
    save_restore,
    num_iterations: iteration + 1,
    num_grf: st.num_grf,
    grf_used,
    spill_mem_used: st.mem.used(),
    decl_info,
  }
}

/// Allocate registers for `kernel`, inserting spill code through the kernel
/// as needed.  Fails when register pressure can't be brought within the
/// register file in `max_iterations` attempts, or when spill memory runs
/// out.
#[inline(never)]
pub fn allocate_registers<K: Kernel>(
  kernel: &mut K, opts: &RegAllocOptions,
) -> Result<RegAllocResult, RegAllocError> {
  info!("allocate_registers: begin, kernel '{}'", kernel.name());
  let mut st = RaState {
    num_grf: opts.num_grf,
    spilled_set: Set::empty(),
    spilled: vec![],
    touched: Set::empty(),
    aug: AugmentationState::new(),
    mem: SpillMemory::new(opts.grf_bytes, opts.spill_mem_limit),
  };
  let mut still_spilled: Vec<String> = vec![];
  let mut attempts = 0;

  for iteration in 0..opts.max_iterations {
    attempts = iteration + 1;
    let att = run_attempt(&*kernel, opts, &mut st, iteration)?;
    let decls = kernel.declares();

    let real: Vec<LrIx> = att
      .outcome
      .spilled
      .iter()
      .cloned()
      .filter(|lr| !att.lrs[*lr].is_pseudo())
      .collect();
    if real.is_empty() {
      let res = build_result(&*kernel, opts, st, &att, iteration);
      info!(
        "allocate_registers: end, {} attempts, {} GRFs used, {} spilled, \
         {} bytes of spill memory",
        res.num_iterations,
        res.grf_used,
        res.spilled.len(),
        res.spill_mem_used
      );
      return Ok(res);
    }

    still_spilled = real
      .iter()
      .map(|lr| decls[att.lrs[*lr].decl.get_usize()].name.clone())
      .collect();
    let spillable: Vec<LrIx> = real
      .iter()
      .cloned()
      .filter(|lr| {
        let r = &att.lrs[*lr];
        r.spill_cost < MAXSPILLCOST && !r.address_sensitive
      })
      .collect();
    info!(
      "attempt {}: {} ranges uncolored, {} spillable, {} GRFs",
      iteration,
      real.len(),
      spillable.len(),
      st.num_grf
    );

    // === BEGIN grow the register file ===
    if st.num_grf < opts.max_num_grf {
      st.num_grf = (st.num_grf * 2).min(opts.max_num_grf);
      info!("attempt {}: growing GRF file to {}", iteration, st.num_grf);
      continue;
    }
    // === END grow the register file ===

    if spillable.is_empty() {
      break;
    }

    // === BEGIN spill ===
    let req = build_spill_request(
      decls,
      &att.lrs,
      &spillable,
      &mut st.mem,
      iteration,
      st.num_grf,
      opts.grf_bytes,
    )
    .map_err(|required| RegAllocError::SpillMemoryExhausted {
      kernel: kernel.name().to_string(),
      required,
      limit: opts.spill_mem_limit,
    })?;
    for r in req.ranges.iter() {
      st.spilled_set.insert(r.decl);
      st.touched.insert(r.decl);
      st.spilled.push(SpilledDecl {
        decl: r.decl,
        name: decls[r.decl.get_usize()].name.clone(),
        byte_size: r.byte_size,
        spill_offset: r.spill_offset,
      });
    }
    if log_enabled!(Level::Debug) {
      for r in req.ranges.iter() {
        debug!(
          "  spill {:?} cost {} at offset {}",
          r.decl, r.spill_cost, r.spill_offset
        );
      }
    }

    let out = kernel
      .insert_spill_code(&req)
      .map_err(RegAllocError::SpillInsertion)?;
    if opts.spill_coalescing {
      kernel.coalesce_spill_code();
    }
    for d in out.new_declares {
      st.touched.insert(d);
    }
    info!(
      "attempt {}: {} fills, {} spills inserted",
      iteration, out.num_fills, out.num_spills
    );
    // === END spill ===
  }

  info!("allocate_registers: end, giving up");
  Err(RegAllocError::Infeasible {
    kernel: kernel.name().to_string(),
    spilled: still_spilled,
    iterations: attempts,
  })
}
