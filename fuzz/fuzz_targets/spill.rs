#![no_main]
use libfuzzer_sys::fuzz_target;

use gpu_regalloc::{self, RegAllocError, RegAllocOptions};
use gpura::test_framework as ir;

static mut COUNTER_GEN: usize = 0;
static mut COUNTER_OK: usize = 0;

fuzz_target!(|prog: ir::Program| {
  let (num_gen, num_ok) = unsafe {
    COUNTER_GEN += 1;
    (COUNTER_GEN, COUNTER_OK)
  };
  println!(
    "=== status: #ok/#total: {}/{} == {} ",
    num_ok,
    num_gen,
    100.0 * (num_ok as f64) / (num_gen as f64)
  );

  let before = match ir::run_program(
    &prog,
    "Before allocation",
    ir::RunStage::BeforeRegalloc,
    None,
  ) {
    Ok(r) => r,
    Err(_) => return,
  };

  // Few enough registers that most kernels spill.
  let mut prog = prog;
  let opts = RegAllocOptions {
    num_grf: 12,
    max_num_grf: 12,
    run_checker: true,
    ..RegAllocOptions::default()
  };
  let result = match gpu_regalloc::allocate_registers(&mut prog, &opts) {
    Ok(result) => {
      unsafe {
        COUNTER_OK += 1;
      }
      result
    }
    Err(err @ RegAllocError::Checker(_))
    | Err(err @ RegAllocError::SpillInsertion(_)) => {
      prog.print("failing kernel");
      panic!("spill.rs: {:?}", err);
    }
    Err(err) => {
      println!("allocation error: {}", err);
      return;
    }
  };

  let after = ir::run_program(
    &prog,
    "After allocation",
    ir::RunStage::AfterRegalloc,
    Some((&result, &opts)),
  )
  .unwrap();
  if let Err(e) = ir::check_results(&before, &after) {
    prog.print("failing kernel");
    panic!("spill.rs: {}", e);
  }
});
