#![no_main]
use libfuzzer_sys::fuzz_target;

use gpu_regalloc::interference::interference_for_kernel;
use gpu_regalloc::{self, RegAllocError, RegAllocOptions};
use gpura::test_framework as ir;

fuzz_target!(|prog: ir::Program| {
  let with_aug = RegAllocOptions {
    num_grf: 64,
    max_num_grf: 64,
    run_checker: true,
    ..RegAllocOptions::default()
  };
  let without_aug = RegAllocOptions { augmentation: false, ..with_aug.clone() };

  let (_, _, refined) = interference_for_kernel(&prog, &with_aug).unwrap();
  let (_, _, plain) = interference_for_kernel(&prog, &without_aug).unwrap();

  // Channel masks only ever add constraints.
  for (a, b) in plain.edges() {
    assert!(refined.interfere(a, b), "edge {:?}-{:?} lost", a, b);
  }

  let mut prog = prog;
  match gpu_regalloc::allocate_registers(&mut prog, &with_aug) {
    Ok(_) => {}
    Err(err @ RegAllocError::Checker(_)) => {
      prog.print("failing kernel");
      panic!("augmentation.rs: checker error: {:?}", err);
    }
    Err(err) => println!("allocation error: {}", err),
  }
});
