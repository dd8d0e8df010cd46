#![allow(dead_code)]

use codeanalyzer::{
    block::{BasicBlock, DualInstruction, NativeInstruction},
    smt::Expr,
    solver::{Declarations, SatResult, SmtLibSolver, Solver, SolverError, SolverOptions},
};
use log::{info, warn};
use std::{collections::BTreeMap, sync::Once, thread, time::Instant};
use which::which;

static INIT_LOGGER: Once = Once::new();

pub fn init() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Options for a `z3` process found in `$PATH`, `None` after reporting the calling test as
/// skipped.
pub fn z3_options() -> Option<SolverOptions> {
    match which("z3") {
        Ok(binary) => Some(SolverOptions {
            binary,
            ..SolverOptions::default()
        }),
        Err(_) => {
            let current = thread::current();
            warn!(
                "{}: skipped, z3 is not installed",
                current.name().unwrap_or("test")
            );
            None
        }
    }
}

pub fn smtlib_solver() -> Option<SmtLibSolver> {
    z3_options().map(|options| SmtLibSolver::new(options).expect("z3 can be started"))
}

pub fn time<F, R>(s: &str, mut f: F) -> R
where
    F: FnMut() -> R,
{
    let start = Instant::now();
    let result = f();
    let end = Instant::now();

    info!("{}: {:?}", s, end.duration_since(start));

    result
}

pub fn dual(address: u64, size: u64, text: &str, ir: &[&str]) -> DualInstruction {
    DualInstruction::parse(NativeInstruction::new(address, size, text), ir).unwrap()
}

/// `inc eax; jz` style block at 0x1000 followed by the block at `next`.
///
/// The branch is taken towards 0x2000 when `eax` equals 6 after the increment, otherwise
/// execution falls through to 0x1003.
pub fn increment_path(next: u64) -> Vec<BasicBlock> {
    let first = BasicBlock::new(vec![
        dual(
            0x1000,
            1,
            "inc eax",
            &["add [DWORD eax, DWORD 0x1, DWORD eax]"],
        ),
        dual(
            0x1001,
            2,
            "jz 0x2000",
            &[
                "sub [DWORD eax, DWORD 0x6, DWORD t0]",
                "bisz [DWORD t0, EMPTY, BIT t1]",
                "jcc [BIT t1, EMPTY, DWORD 0x2000]",
            ],
        ),
    ])
    .with_branches(Some(0x2000), Some(0x1003));

    let second = BasicBlock::new(vec![dual(
        next,
        1,
        "nop",
        &["nop [EMPTY, EMPTY, EMPTY]"],
    )]);

    vec![first, second]
}

/// Solver double which records assertions and answers every check with `answer`.
#[derive(Default)]
pub struct RecordingSolver {
    pub assertions: Vec<String>,
    pub checks: usize,
    pub answer: Option<SatResult>,
    pub values: BTreeMap<String, u64>,
    declarations: Declarations,
    has_model: bool,
}

impl RecordingSolver {
    pub fn answering(answer: SatResult) -> Self {
        Self {
            answer: Some(answer),
            ..Self::default()
        }
    }
}

impl Solver for RecordingSolver {
    fn name() -> &'static str {
        "Recording"
    }

    fn add(&mut self, assertion: &Expr) -> Result<(), SolverError> {
        self.declarations.declare(assertion)?;
        self.assertions.push(assertion.to_string());
        self.has_model = false;

        Ok(())
    }

    fn check_impl(&mut self) -> Result<SatResult, SolverError> {
        self.checks += 1;

        let answer = self.answer.unwrap_or(SatResult::Sat);
        self.has_model = answer.is_sat();

        Ok(answer)
    }

    fn get_value(&mut self, expr: &Expr) -> Result<u64, SolverError> {
        if !self.has_model {
            return Err(SolverError::MissingModel);
        }

        Ok(self.values.get(&expr.to_string()).copied().unwrap_or(0))
    }

    fn declarations(&self) -> &BTreeMap<String, Expr> {
        self.declarations.as_map()
    }

    fn reset(&mut self) -> Result<(), SolverError> {
        self.assertions.clear();
        self.declarations.clear();
        self.has_model = false;

        Ok(())
    }
}
