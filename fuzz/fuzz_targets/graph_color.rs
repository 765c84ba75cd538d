#![no_main]
use libfuzzer_sys::fuzz_target;

use gpu_regalloc::{self, RegAllocError, RegAllocOptions};
use gpura::test_framework as ir;

fuzz_target!(|prog: ir::Program| {
  let mut prog = prog;
  let opts = RegAllocOptions {
    num_grf: 32,
    max_num_grf: 64,
    run_checker: true,
    ..RegAllocOptions::default()
  };

  let (_, _, intf) =
    match gpu_regalloc::interference::interference_for_kernel(&prog, &opts) {
      Ok(g) => g,
      Err(err) => panic!("graph_color.rs: analysis error: {}", err),
    };
  for (a, b) in intf.edges() {
    assert!(a != b && intf.interfere(b, a));
  }

  match gpu_regalloc::allocate_registers(&mut prog, &opts) {
    Ok(_) => {}
    Err(err @ RegAllocError::Checker(_)) => {
      prog.print("failing kernel");
      panic!("graph_color.rs: checker error: {:?}", err);
    }
    Err(err) => println!("allocation error: {}", err),
  }
});
