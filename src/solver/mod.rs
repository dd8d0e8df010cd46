pub mod smtlib;
#[cfg(feature = "z3")]
pub mod z3;

pub use self::smtlib::*;
#[cfg(feature = "z3")]
pub use self::z3::*;

use crate::smt::Expr;
use log::debug;
use std::{
    collections::BTreeMap,
    convert::From,
    io,
    path::PathBuf,
    time::Duration,
};
use strum::{EnumString, IntoStaticStr};
use thiserror::Error;

pub mod defaults {
    pub const BINARY: &str = "z3";
    pub const ARGS: [&str; 2] = ["-in", "-smt2"];
    pub const LOGIC: &str = "QF_AUFBV";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown,
}

impl SatResult {
    pub fn is_sat(&self) -> bool {
        *self == SatResult::Sat
    }
}

impl std::fmt::Display for SatResult {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name: &'static str = self.into();
        write!(f, "{}", name)
    }
}

/// Incremental solver consumed by the analyzer.
///
/// Assertions accumulate until [`Solver::reset`]. A model exists only after a check returned
/// [`SatResult::Sat`] and no assertion was added since.
pub trait Solver {
    fn name() -> &'static str;

    fn add(&mut self, assertion: &Expr) -> Result<(), SolverError>;

    fn check(&mut self) -> Result<SatResult, SolverError> {
        debug!("check satisfiability with {} solver", Self::name());

        time_debug!("finished satisfiability check", { self.check_impl() })
    }

    fn check_impl(&mut self) -> Result<SatResult, SolverError>;

    /// Model value of a bit-vector or boolean expression.
    fn get_value(&mut self, expr: &Expr) -> Result<u64, SolverError>;

    /// Every symbol declared so far, by name.
    fn declarations(&self) -> &BTreeMap<String, Expr>;

    fn declaration(&self, name: &str) -> Option<&Expr> {
        self.declarations().get(name)
    }

    fn reset(&mut self) -> Result<(), SolverError>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SolverError {
    #[error("no model available, the last check was not satisfiable")]
    MissingModel,

    #[error("only boolean terms can be asserted: {0}")]
    NotBoolean(String),

    #[error("symbol {0} is used with two different sorts")]
    SortMismatch(String),

    #[error("model value of {0} does not fit into 64 bits")]
    ValueTooWide(String),

    #[error("unexpected solver response: {0}")]
    Protocol(String),

    #[error("solver failed with IO error")]
    IoError(String),
}

impl From<io::Error> for SolverError {
    fn from(err: io::Error) -> Self {
        SolverError::IoError(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Solver executable speaking SMT-LIB2 on stdin/stdout.
    pub binary: PathBuf,
    pub args: Vec<String>,
    pub logic: String,
    pub timeout: Option<Duration>,
    /// Mirror of every command sent to the solver.
    pub transcript: Option<PathBuf>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(defaults::BINARY),
            args: defaults::ARGS.iter().map(|a| String::from(*a)).collect(),
            logic: String::from(defaults::LOGIC),
            timeout: None,
            transcript: None,
        }
    }
}

/// Symbols a solver has been told about.
#[derive(Debug, Clone, Default)]
pub struct Declarations {
    symbols: BTreeMap<String, Expr>,
}

impl Declarations {
    /// Registers the free symbols of `expr` and returns those not seen before.
    pub fn declare(&mut self, expr: &Expr) -> Result<Vec<Expr>, SolverError> {
        let mut found = BTreeMap::new();
        expr.symbols(&mut found);

        for (name, symbol) in found.iter() {
            if let Some(known) = self.symbols.get(name) {
                if known.sort() != symbol.sort() {
                    return Err(SolverError::SortMismatch(name.clone()));
                }
            }
        }

        let mut fresh = Vec::new();

        for (name, symbol) in found.into_iter() {
            if !self.symbols.contains_key(&name) {
                self.symbols.insert(name, symbol.clone());
                fresh.push(symbol);
            }
        }

        Ok(fresh)
    }

    pub fn as_map(&self) -> &BTreeMap<String, Expr> {
        &self.symbols
    }

    pub fn clear(&mut self) {
        self.symbols.clear();
    }
}

pub(crate) fn ensure_boolean(assertion: &Expr) -> Result<(), SolverError> {
    if assertion.is_bool() {
        Ok(())
    } else {
        Err(SolverError::NotBoolean(assertion.to_string()))
    }
}
