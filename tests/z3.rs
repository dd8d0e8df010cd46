#![cfg(feature = "z3")]

mod utils;

use codeanalyzer::{
    analyzer::{CodeAnalyzer, Context, Mode},
    arch::ArchInfo,
    solver::{SatResult, Z3Solver},
    translator::SmtTranslator,
};
use utils::{increment_path, init};
use z3_solver::{Config, Context as Z3Context};

#[test]
fn increment_path_with_in_process_solver() {
    init();

    let config = Config::new();
    let z3 = Z3Context::new(&config);

    let arch = ArchInfo::x86();
    let mut analyzer = CodeAnalyzer::new(
        &arch,
        Z3Solver::new(&z3),
        SmtTranslator::with_defaults(&arch),
    );

    let context = Context::builder()
        .register("eax", 32, 5)
        .memory_value(0x8000, 0xdead_beef, 4)
        .build();

    analyzer.set_context(context.clone()).unwrap();

    assert_eq!(
        analyzer.check_path_satisfiability(&increment_path(0x2000), 0x1000),
        Ok(true)
    );

    let result = analyzer.get_context().unwrap();

    assert_eq!(result.register("eax").and_then(|r| r.value), Some(6));
    assert_eq!(result.memory_value(0x8000, 4), Some(0xdead_beef));

    let al = analyzer.get_register_expr("al", Mode::Pre).unwrap();
    assert_eq!(analyzer.get_expr_value(&al), Ok(5));

    analyzer.reset(true).unwrap();
    analyzer.set_context(context).unwrap();

    assert_eq!(
        analyzer.check_path_satisfiability(&increment_path(0x1003), 0x1000),
        Ok(false)
    );
    assert_eq!(analyzer.check(), Ok(SatResult::Unsat));
}
