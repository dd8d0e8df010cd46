//! Path satisfiability checking
//!
//! [`CodeAnalyzer`] feeds the IR of a candidate path through a [`Translator`] into a [`Solver`]
//! and asks the solver, block by block, whether the path can still be taken. Before a check the
//! caller may bind the initial state of the path to a concrete [`Context`]; after a satisfiable
//! check the final state can be read back as a new [`Context`].

pub mod context;

pub use self::context::{Context, ContextBuilder, Flag, Register};

use crate::{
    arch::ArchInfo,
    block::{BasicBlock, DualInstruction},
    reil::{IrAddress, IrInstruction, Operand},
    smt::Expr,
    solver::{SatResult, Solver, SolverError},
    translator::{TranslationError, Translator},
    util::mask,
};
use log::{debug, error, info, trace, warn};
use std::{collections::BTreeMap, fmt, str::FromStr};
use strum::{EnumString, IntoStaticStr};
use thiserror::Error;

/// Selects the initial (`Pre`) or the current (`Post`) version of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    Pre,
    Post,
}

impl Mode {
    pub fn parse(mode: &str) -> Result<Self, AnalyzerError> {
        Mode::from_str(mode).map_err(|_| AnalyzerError::InvalidMode(mode.to_owned()))
    }
}

/// Irregularities in a path which are tolerated while checking it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathAnomaly {
    /// A conditional branch which is not the last instruction of its block. It is skipped.
    MisplacedBranch { block: u64, instruction: IrAddress },
    /// None of the outgoing edges of `block` leads to `next`. The branch is skipped.
    UnmatchedEdge {
        block: u64,
        next: u64,
        instruction: IrAddress,
    },
}

impl fmt::Display for PathAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PathAnomaly::MisplacedBranch { block, instruction } => write!(
                f,
                "branch {} is not at the end of block {:#x}",
                instruction, block
            ),
            PathAnomaly::UnmatchedEdge {
                block,
                next,
                instruction,
            } => write!(
                f,
                "branch {} of block {:#x} has no edge to {:#x}",
                instruction, block, next
            ),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalyzerError {
    #[error("invalid operand: {0}")]
    InvalidOperand(String),

    #[error("invalid mode {0}, expected pre or post")]
    InvalidMode(String),

    #[error("no model available, run a satisfiable check first")]
    MissingModel,

    #[error("solver does not know symbol {0}")]
    UnknownSymbol(String),

    #[error("width of register {0} is unknown")]
    UnknownRegister(String),

    #[error("{0} must be at least one bit wide")]
    InvalidWidth(String),

    #[error("memory read of zero bytes at {0:#x}")]
    EmptyMemoryRead(u64),

    #[error("address {0:#x} does not fit into the address space")]
    AddressOutOfRange(u64),

    #[error("no context has been set")]
    MissingContext,

    #[error("a path needs at least two basic blocks, got {0}")]
    PathTooShort(usize),

    #[error("translation failed: {0}")]
    Translation(TranslationError),

    #[error("solver failed: {0}")]
    Solver(SolverError),
}

impl From<SolverError> for AnalyzerError {
    fn from(err: SolverError) -> Self {
        match err {
            SolverError::MissingModel => AnalyzerError::MissingModel,
            other => AnalyzerError::Solver(other),
        }
    }
}

impl From<TranslationError> for AnalyzerError {
    fn from(err: TranslationError) -> Self {
        match err {
            TranslationError::InvalidOperand(operand) => AnalyzerError::InvalidOperand(operand),
            TranslationError::UnknownRegister(name) => AnalyzerError::UnknownRegister(name),
            other => AnalyzerError::Translation(other),
        }
    }
}

pub struct CodeAnalyzer<'a, S: Solver, T: Translator> {
    arch: &'a ArchInfo,
    solver: S,
    translator: T,
    context: Option<Context>,
    anomalies: Vec<PathAnomaly>,
}

impl<'a, S: Solver, T: Translator> CodeAnalyzer<'a, S, T> {
    pub fn new(arch: &'a ArchInfo, solver: S, translator: T) -> Self {
        Self {
            arch,
            solver,
            translator,
            context: None,
            anomalies: Vec::new(),
        }
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn translator(&self) -> &T {
        &self.translator
    }

    /// The context set last, if any.
    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    /// Anomalies found by the last path check.
    pub fn anomalies(&self) -> &[PathAnomaly] {
        &self.anomalies
    }

    /// Binds the initial symbols to the values of `context`.
    ///
    /// Registers, flags and memory cells absent from the context stay unconstrained. The assertions
    /// are added to whatever the solver already holds.
    pub fn set_context(&mut self, context: Context) -> Result<(), AnalyzerError> {
        debug!("setting context:\n{}", context);

        // nothing is asserted unless the whole context can be lowered
        for register in context.registers() {
            if register.value.is_some() && self.arch.alias(&register.name).is_none() {
                self.width_of(&register.name, register.width)?;
            }
        }
        for flag in context.flags() {
            if flag.value.is_some() {
                self.width_of(&flag.name, Some(self.translator.flag_width()))?;
            }
        }
        for address in context.memory().keys() {
            self.check_address(*address)?;
        }

        for register in context.registers() {
            if let Some(value) = register.value {
                let expr = self.context_register_expr(&register.name, register.width, Mode::Pre)?;
                let value = Expr::constant(value, expr.width());
                self.add_constraint(&expr._eq(&value))?;
            }
        }

        for flag in context.flags() {
            if let Some(value) = flag.value {
                let expr = self.flag_expr(&flag.name, Mode::Pre);
                let value = Expr::constant(value, expr.width());
                self.add_constraint(&expr._eq(&value))?;
            }
        }

        let memory = self.translator.memory_init();
        for (address, value) in context.memory().iter() {
            let address = Expr::constant(*address, self.arch.address_size());
            let cell = memory.select(&address);
            self.add_constraint(&cell._eq(&Expr::constant(u64::from(*value), 8)))?;
        }

        self.context = Some(context);

        Ok(())
    }

    /// Reads the final values of everything named in the context set before out of the model.
    pub fn get_context(&mut self) -> Result<Context, AnalyzerError> {
        let reference = self
            .context
            .clone()
            .ok_or(AnalyzerError::MissingContext)?;

        let mut registers = Vec::new();
        for register in reference.registers() {
            let expr = match self.arch.alias(&register.name) {
                Some(_) => self.get_register_expr(&register.name, Mode::Post)?,
                None => self.declared_or_fresh(&register.name, register.width)?,
            };
            let value = self.solver.get_value(&expr)?;

            registers.push(Register::new(
                &register.name,
                register.width.or_else(|| Some(expr.width())),
                Some(value),
            ));
        }

        let mut flags = Vec::new();
        for flag in reference.flags() {
            let expr = self.declared_or_fresh(&flag.name, Some(self.translator.flag_width()))?;
            let value = self.solver.get_value(&expr)?;

            flags.push(Flag::new(&flag.name, Some(value)));
        }

        let mut memory = BTreeMap::new();
        for address in reference.memory().keys() {
            let expr = self.get_memory_expr(*address, 1, Mode::Post)?;
            let value = self.solver.get_value(&expr)?;

            memory.insert(*address, value as u8);
        }

        Ok(Context::new(registers, flags, memory))
    }

    /// Checks whether the branches connecting the blocks of `path` can all be taken.
    ///
    /// Translation starts at the native instruction at `start_address`, everything before it is
    /// skipped. The solver is consulted after every block and the check stops at the first block
    /// which makes the path unsatisfiable.
    pub fn check_path_satisfiability(
        &mut self,
        path: &[BasicBlock],
        start_address: u64,
    ) -> Result<bool, AnalyzerError> {
        if path.len() < 2 {
            return Err(AnalyzerError::PathTooShort(path.len()));
        }

        self.anomalies.clear();

        time_info!("path satisfiability checked", {
            self.check_path(path, start_address)
        })
    }

    fn check_path(&mut self, path: &[BasicBlock], start_address: u64) -> Result<bool, AnalyzerError> {
        let mut started = false;
        let mut result = SatResult::Unknown;

        for pair in path.windows(2) {
            let (current, next) = (&pair[0], &pair[1]);

            info!("basic block {:#x}", current.address);

            for instruction in current {
                if !started {
                    if instruction.address() == start_address {
                        started = true;
                    } else {
                        continue;
                    }
                }

                if self.add_dual_instruction(instruction, current, next)? {
                    break;
                }
            }

            if !started {
                warn!(
                    "start address {:#x} not found in basic block {:#x}",
                    start_address, current.address
                );
            }

            result = self.solver.check()?;

            info!("basic block {:#x}: {}", current.address, result);

            if !result.is_sat() {
                break;
            }
        }

        Ok(result.is_sat())
    }

    /// Adds the IR of one native instruction. Returns `true` once the terminating branch of the
    /// block has been handled.
    fn add_dual_instruction(
        &mut self,
        instruction: &DualInstruction,
        current: &BasicBlock,
        next: &BasicBlock,
    ) -> Result<bool, AnalyzerError> {
        debug!("{:#x} {}", instruction.address(), instruction.native.text);

        for ir in instruction.ir.iter() {
            debug!("{} {}", ir.address, ir);

            if !ir.is_branch() {
                self.add_instruction(ir)?;
                continue;
            }

            if !current.ends_with(instruction) {
                error!(
                    "unexpected branch {} ({}) inside basic block {:#x}",
                    ir.address, ir, current.address
                );
                self.anomalies.push(PathAnomaly::MisplacedBranch {
                    block: current.address,
                    instruction: ir.address,
                });
                continue;
            }

            let goal = if current.taken_branch == Some(next.address) {
                1
            } else if current.not_taken_branch == Some(next.address) {
                0
            } else if current.direct_branch == Some(next.address) {
                continue;
            } else {
                warn!(
                    "basic block {:#x} has no edge to {:#x}, ignoring {}",
                    current.address, next.address, ir
                );
                self.anomalies.push(PathAnomaly::UnmatchedEdge {
                    block: current.address,
                    next: next.address,
                    instruction: ir.address,
                });
                continue;
            };

            let condition = self.get_operand_var(&ir.operands[0])?;
            self.add_constraint(&condition.eq_value(goal))?;

            return Ok(true);
        }

        Ok(false)
    }

    /// Expression of `operand` as a source of the instruction being translated.
    pub fn get_operand_var(&self, operand: &Operand) -> Result<Expr, AnalyzerError> {
        Ok(self.translator.translate_src_operand(operand)?)
    }

    pub fn get_operand_expr(&self, operand: &Operand, mode: Mode) -> Result<Expr, AnalyzerError> {
        match operand {
            Operand::Register { name, .. } if self.arch.is_architectural(name) => {
                self.get_register_expr(name, mode)
            }
            Operand::Register { name, size } => {
                Ok(self.translator.make_bitvec(*size, &self.var_name(name, mode)))
            }
            Operand::Immediate { .. } => self.get_immediate_expr(operand),
            Operand::Empty => Err(AnalyzerError::InvalidOperand(operand.to_string())),
        }
    }

    pub fn get_immediate_expr(&self, operand: &Operand) -> Result<Expr, AnalyzerError> {
        match operand {
            Operand::Immediate { value, size } => Ok(Expr::constant(*value, *size)),
            other => Err(AnalyzerError::InvalidOperand(other.to_string())),
        }
    }

    /// Register expression, sub-registers are extracted from their base register.
    pub fn get_register_expr(&self, name: &str, mode: Mode) -> Result<Expr, AnalyzerError> {
        match self.arch.alias(name) {
            Some((base, offset)) => {
                let base_expr = self.get_register_expr(base, mode)?;
                let width = self.width_of(name, None)?;
                Ok(base_expr.extract(offset, width))
            }
            None => {
                let width = self.width_of(name, None)?;
                Ok(self.translator.make_bitvec(width, &self.var_name(name, mode)))
            }
        }
    }

    /// `size` bytes of memory starting at `address`, read in little-endian order.
    pub fn get_memory_expr(&self, address: u64, size: u32, mode: Mode) -> Result<Expr, AnalyzerError> {
        if size == 0 {
            return Err(AnalyzerError::EmptyMemoryRead(address));
        }
        self.check_address(address)?;

        let memory = self.get_memory(mode);
        let width = self.arch.address_size();

        let bytes = (0..u64::from(size))
            .rev()
            .map(|i| memory.select(&Expr::constant(address.wrapping_add(i), width)))
            .collect::<Vec<_>>();

        Ok(Expr::concat(&bytes))
    }

    pub fn get_memory(&self, mode: Mode) -> Expr {
        match mode {
            Mode::Pre => self.translator.memory_init(),
            Mode::Post => self.translator.memory(),
        }
    }

    /// Translates `instruction` and asserts the result.
    pub fn add_instruction(&mut self, instruction: &IrInstruction) -> Result<(), AnalyzerError> {
        for formula in self.translator.translate(instruction)? {
            self.add_constraint(&formula)?;
        }

        Ok(())
    }

    pub fn add_constraint(&mut self, constraint: &Expr) -> Result<(), AnalyzerError> {
        trace!("assert {}", constraint);

        Ok(self.solver.add(constraint)?)
    }

    pub fn set_preconditions(&mut self, conditions: &[Expr]) -> Result<(), AnalyzerError> {
        conditions.iter().try_for_each(|c| self.add_constraint(c))
    }

    pub fn set_postconditions(&mut self, conditions: &[Expr]) -> Result<(), AnalyzerError> {
        conditions.iter().try_for_each(|c| self.add_constraint(c))
    }

    pub fn check(&mut self) -> Result<SatResult, AnalyzerError> {
        Ok(self.solver.check()?)
    }

    pub fn get_expr_value(&mut self, expr: &Expr) -> Result<u64, AnalyzerError> {
        Ok(self.solver.get_value(expr)?)
    }

    /// Drops all assertions. A full reset also restarts symbol versioning and forgets the context.
    pub fn reset(&mut self, full: bool) -> Result<(), AnalyzerError> {
        debug!("resetting analyzer (full: {})", full);

        self.solver.reset()?;
        self.anomalies.clear();

        if full {
            self.translator.reset();
            self.context = None;
        }

        Ok(())
    }

    fn var_name(&self, name: &str, mode: Mode) -> String {
        match mode {
            Mode::Pre => self.translator.init_name(name),
            Mode::Post => self.translator.curr_name(name),
        }
    }

    fn width_of(&self, name: &str, declared: Option<u32>) -> Result<u32, AnalyzerError> {
        let width = if self.arch.is_flag(name) {
            self.translator.flag_width()
        } else {
            declared
                .or_else(|| self.arch.register_size(name))
                .ok_or_else(|| AnalyzerError::UnknownRegister(name.to_owned()))?
        };

        if width == 0 {
            return Err(AnalyzerError::InvalidWidth(name.to_owned()));
        }

        Ok(width)
    }

    fn check_address(&self, address: u64) -> Result<(), AnalyzerError> {
        if address > mask(self.arch.address_size()) {
            Err(AnalyzerError::AddressOutOfRange(address))
        } else {
            Ok(())
        }
    }

    fn flag_expr(&self, name: &str, mode: Mode) -> Expr {
        let width = self.translator.flag_width();
        self.translator.make_bitvec(width, &self.var_name(name, mode))
    }

    fn context_register_expr(
        &self,
        name: &str,
        width: Option<u32>,
        mode: Mode,
    ) -> Result<Expr, AnalyzerError> {
        if self.arch.alias(name).is_some() {
            return self.get_register_expr(name, mode);
        }

        let width = self.width_of(name, width)?;

        Ok(self.translator.make_bitvec(width, &self.var_name(name, mode)))
    }

    /// Current symbol of `name` as declared to the solver, or a fresh one if it never was.
    fn declared_or_fresh(&self, name: &str, width: Option<u32>) -> Result<Expr, AnalyzerError> {
        let current = self.translator.curr_name(name);

        if let Some(symbol) = self.solver.declaration(&current) {
            return Ok(symbol.clone());
        }

        match self.width_of(name, width) {
            Ok(width) => Ok(self.translator.make_bitvec(width, &current)),
            Err(AnalyzerError::UnknownRegister(_)) => Err(AnalyzerError::UnknownSymbol(current)),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        block::NativeInstruction,
        translator::{SmtTranslator, TranslatorOptions},
    };

    /// Keeps assertions in memory and answers checks with a fixed result.
    #[derive(Default)]
    struct Recorder {
        assertions: Vec<String>,
        declarations: crate::solver::Declarations,
        answer: Option<SatResult>,
        checks: usize,
        has_model: bool,
    }

    impl Solver for Recorder {
        fn name() -> &'static str {
            "Recorder"
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

        fn get_value(&mut self, _expr: &Expr) -> Result<u64, SolverError> {
            if self.has_model {
                Ok(0)
            } else {
                Err(SolverError::MissingModel)
            }
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

    fn analyzer(arch: &ArchInfo) -> CodeAnalyzer<'_, Recorder, SmtTranslator<'_>> {
        CodeAnalyzer::new(arch, Recorder::default(), SmtTranslator::with_defaults(arch))
    }

    fn dual(address: u64, size: u64, ir: &[&str]) -> DualInstruction {
        DualInstruction::parse(NativeInstruction::new(address, size, "insn"), ir).unwrap()
    }

    fn branch_path(taken: bool) -> Vec<BasicBlock> {
        let first = BasicBlock::new(vec![
            dual(0x1000, 1, &["add [DWORD eax, DWORD 0x1, DWORD eax]"]),
            dual(
                0x1001,
                2,
                &[
                    "sub [DWORD eax, DWORD 0x6, DWORD t0]",
                    "bisz [DWORD t0, EMPTY, BIT t1]",
                    "jcc [BIT t1, EMPTY, DWORD 0x2000]",
                ],
            ),
        ])
        .with_branches(Some(0x2000), Some(0x1003));

        let target = if taken { 0x2000 } else { 0x1003 };
        let second = BasicBlock::new(vec![dual(target, 1, &["nop [EMPTY, EMPTY, EMPTY]"])]);

        vec![first, second]
    }

    #[test]
    fn modes_parse_from_text() {
        assert_eq!(Mode::parse("pre"), Ok(Mode::Pre));
        assert_eq!(Mode::parse("post"), Ok(Mode::Post));
        assert_eq!(
            Mode::parse("during"),
            Err(AnalyzerError::InvalidMode(String::from("during")))
        );
    }

    #[test]
    fn context_binds_initial_symbols() {
        let arch = ArchInfo::x86();
        let mut analyzer = analyzer(&arch);

        let context = Context::builder()
            .register("eax", 32, 5)
            .register("bl", 8, 0xff)
            .free_register("ecx", None)
            .flag("zf", 1)
            .memory(0x1000, 0xab)
            .build();

        analyzer.set_context(context.clone()).unwrap();

        assert_eq!(
            analyzer.solver().assertions,
            vec![
                "(= ((_ extract 7 0) ebx_0) (_ bv255 8))",
                "(= eax_0 (_ bv5 32))",
                "(= zf_0 (_ bv1 32))",
                "(= (select MEM_0 (_ bv4096 32)) (_ bv171 8))",
            ]
        );
        assert_eq!(analyzer.context(), Some(&context));
    }

    #[test]
    fn taken_branch_asserts_goal_one() {
        let arch = ArchInfo::x86();
        let mut analyzer = analyzer(&arch);

        assert_eq!(
            analyzer.check_path_satisfiability(&branch_path(true), 0x1000),
            Ok(true)
        );

        let assertions = &analyzer.solver().assertions;
        assert_eq!(assertions.last().unwrap(), "(= t1_1 (_ bv1 1))");
        assert_eq!(assertions.len(), 4);
        assert_eq!(analyzer.solver().checks, 1);
        assert!(analyzer.anomalies().is_empty());
    }

    #[test]
    fn not_taken_branch_asserts_goal_zero() {
        let arch = ArchInfo::x86();
        let mut analyzer = analyzer(&arch);

        analyzer
            .check_path_satisfiability(&branch_path(false), 0x1000)
            .unwrap();

        assert_eq!(
            analyzer.solver().assertions.last().unwrap(),
            "(= t1_1 (_ bv0 1))"
        );
    }

    #[test]
    fn instructions_before_start_are_skipped() {
        let arch = ArchInfo::x86();
        let mut analyzer = analyzer(&arch);

        analyzer
            .check_path_satisfiability(&branch_path(true), 0x1001)
            .unwrap();

        let assertions = &analyzer.solver().assertions;
        assert_eq!(assertions.len(), 3);
        assert_eq!(assertions[0], "(= t0_1 (bvsub eax_0 (_ bv6 32)))");
    }

    #[test]
    fn direct_edges_need_no_goal() {
        let arch = ArchInfo::x86();
        let mut analyzer = analyzer(&arch);

        let mut path = branch_path(true);
        path[0].taken_branch = None;
        path[0].not_taken_branch = None;
        path[0].direct_branch = Some(0x2000);

        assert_eq!(analyzer.check_path_satisfiability(&path, 0x1000), Ok(true));
        assert_eq!(analyzer.solver().assertions.len(), 3);
        assert!(analyzer.anomalies().is_empty());
    }

    #[test]
    fn unmatched_edges_are_recorded() {
        let arch = ArchInfo::x86();
        let mut analyzer = analyzer(&arch);

        let mut path = branch_path(true);
        path[1] = BasicBlock::new(vec![dual(0x3000, 1, &[])]);

        assert_eq!(analyzer.check_path_satisfiability(&path, 0x1000), Ok(true));
        assert_eq!(analyzer.solver().assertions.len(), 3);
        assert_eq!(
            analyzer.anomalies(),
            &[PathAnomaly::UnmatchedEdge {
                block: 0x1000,
                next: 0x3000,
                instruction: IrAddress::new(0x1001, 2),
            }]
        );
    }

    #[test]
    fn misplaced_branches_are_recorded_and_skipped() {
        let arch = ArchInfo::x86();
        let mut analyzer = analyzer(&arch);

        let first = BasicBlock::new(vec![
            dual(0x1000, 2, &["jcc [BIT 0x1, EMPTY, DWORD 0x2000]"]),
            dual(0x1002, 1, &["str [DWORD 0x7, EMPTY, DWORD ebx]"]),
        ])
        .with_direct_branch(0x2000);
        let second = BasicBlock::new(vec![dual(0x2000, 1, &[])]);

        assert_eq!(
            analyzer.check_path_satisfiability(&[first, second], 0x1000),
            Ok(true)
        );
        assert_eq!(analyzer.solver().assertions, vec!["(= ebx_1 (_ bv7 32))"]);
        assert_eq!(
            analyzer.anomalies(),
            &[PathAnomaly::MisplacedBranch {
                block: 0x1000,
                instruction: IrAddress::new(0x1000, 0),
            }]
        );
    }

    #[test]
    fn unsatisfiable_block_stops_the_check() {
        let arch = ArchInfo::x86();
        let mut analyzer = CodeAnalyzer::new(
            &arch,
            Recorder {
                answer: Some(SatResult::Unsat),
                ..Recorder::default()
            },
            SmtTranslator::with_defaults(&arch),
        );

        let mut path = branch_path(true);
        path.push(BasicBlock::new(vec![dual(0x4000, 1, &[])]));
        path[1].direct_branch = Some(0x4000);

        assert_eq!(analyzer.check_path_satisfiability(&path, 0x1000), Ok(false));
        assert_eq!(analyzer.solver().checks, 1);
    }

    #[test]
    fn short_paths_are_rejected() {
        let arch = ArchInfo::x86();
        let mut analyzer = analyzer(&arch);

        assert_eq!(
            analyzer.check_path_satisfiability(&branch_path(true)[..1], 0x1000),
            Err(AnalyzerError::PathTooShort(1))
        );
    }

    #[test]
    fn operand_expressions_follow_mode() {
        let arch = ArchInfo::x86();
        let mut analyzer = analyzer(&arch);

        analyzer
            .add_instruction(
                &IrInstruction::parse_at(
                    IrAddress::new(0x1000, 0),
                    "str [DWORD 0x1, EMPTY, DWORD eax]",
                )
                .unwrap(),
            )
            .unwrap();

        let eax = Operand::register("eax", 32);
        let al = Operand::register("al", 8);
        let t3 = Operand::register("t3", 16);

        assert_eq!(
            analyzer.get_operand_expr(&eax, Mode::Pre).unwrap().to_string(),
            "eax_0"
        );
        assert_eq!(
            analyzer.get_operand_expr(&eax, Mode::Post).unwrap().to_string(),
            "eax_1"
        );
        assert_eq!(
            analyzer.get_operand_expr(&al, Mode::Post).unwrap().to_string(),
            "((_ extract 7 0) eax_1)"
        );
        assert_eq!(
            analyzer.get_operand_expr(&t3, Mode::Pre).unwrap().width(),
            16
        );
        assert_eq!(
            analyzer
                .get_operand_expr(&Operand::immediate(0x10, 8), Mode::Post)
                .unwrap()
                .to_string(),
            "(_ bv16 8)"
        );
        assert!(matches!(
            analyzer.get_operand_expr(&Operand::Empty, Mode::Pre),
            Err(AnalyzerError::InvalidOperand(_))
        ));
        assert_eq!(
            analyzer.get_operand_var(&eax).unwrap().to_string(),
            "eax_1"
        );
    }

    #[test]
    fn memory_expressions_are_little_endian() {
        let arch = ArchInfo::x86();
        let analyzer = analyzer(&arch);

        assert_eq!(
            analyzer.get_memory_expr(0x10, 2, Mode::Pre).unwrap().to_string(),
            "(concat (select MEM_0 (_ bv17 32)) (select MEM_0 (_ bv16 32)))"
        );
        assert_eq!(analyzer.get_memory(Mode::Post).name(), Some("MEM_0"));
    }

    #[test]
    fn invalid_contexts_assert_nothing() {
        let arch = ArchInfo::x86();
        let mut analyzer = analyzer(&arch);

        let context = Context::new(
            vec![
                Register::new("eax", Some(32), Some(5)),
                Register::new("t0", Some(0), Some(1)),
            ],
            Vec::<Flag>::new(),
            BTreeMap::new(),
        );

        assert_eq!(
            analyzer.set_context(context),
            Err(AnalyzerError::InvalidWidth(String::from("t0")))
        );

        let context = Context::builder()
            .register("eax", 32, 5)
            .memory(0x1_0000_0000, 0xab)
            .build();

        assert_eq!(
            analyzer.set_context(context),
            Err(AnalyzerError::AddressOutOfRange(0x1_0000_0000))
        );

        assert!(analyzer.solver().assertions.is_empty());
        assert_eq!(analyzer.context(), None);
    }

    #[test]
    fn memory_reads_need_bytes_inside_the_address_space() {
        let arch = ArchInfo::x86();
        let analyzer = analyzer(&arch);

        assert_eq!(
            analyzer.get_memory_expr(0x10, 0, Mode::Post),
            Err(AnalyzerError::EmptyMemoryRead(0x10))
        );
        assert_eq!(
            analyzer.get_memory_expr(0x1_0000_0000, 1, Mode::Pre),
            Err(AnalyzerError::AddressOutOfRange(0x1_0000_0000))
        );
        assert!(analyzer.get_memory_expr(0xffff_ffff, 1, Mode::Pre).is_ok());

        let wide = ArchInfo::x86_64();
        let wide_analyzer = CodeAnalyzer::new(
            &wide,
            Recorder::default(),
            SmtTranslator::with_defaults(&wide),
        );

        assert!(wide_analyzer
            .get_memory_expr(0x1_0000_0000, 1, Mode::Pre)
            .is_ok());
    }

    #[test]
    fn get_context_requires_context_and_model() {
        let arch = ArchInfo::x86();
        let mut analyzer = analyzer(&arch);

        assert_eq!(analyzer.get_context(), Err(AnalyzerError::MissingContext));

        analyzer
            .set_context(Context::builder().register("eax", 32, 5).build())
            .unwrap();

        assert_eq!(analyzer.get_context(), Err(AnalyzerError::MissingModel));

        analyzer.check().unwrap();

        let context = analyzer.get_context().unwrap();
        assert_eq!(context.register("eax").and_then(|r| r.value), Some(0));
    }

    #[test]
    fn full_reset_restarts_naming() {
        let arch = ArchInfo::x86();
        let mut analyzer = CodeAnalyzer::new(
            &arch,
            Recorder::default(),
            SmtTranslator::new(&arch, TranslatorOptions::default()),
        );

        analyzer
            .check_path_satisfiability(&branch_path(true), 0x1000)
            .unwrap();

        analyzer.reset(false).unwrap();
        assert_eq!(analyzer.translator().curr_name("eax"), "eax_1");
        assert!(analyzer.solver().assertions.is_empty());

        analyzer.reset(true).unwrap();
        assert_eq!(analyzer.translator().curr_name("eax"), "eax_0");
        assert_eq!(analyzer.context(), None);
    }

    #[test]
    fn errors_map_onto_dedicated_variants() {
        assert_eq!(
            AnalyzerError::from(SolverError::MissingModel),
            AnalyzerError::MissingModel
        );
        assert_eq!(
            AnalyzerError::from(TranslationError::InvalidOperand(String::from("EMPTY"))),
            AnalyzerError::InvalidOperand(String::from("EMPTY"))
        );
    }
}
