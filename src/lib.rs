#[macro_use]
pub mod util;

pub mod analyzer;
pub mod arch;
pub mod block;
pub mod listing;
pub mod reil;
pub mod smt;
pub mod solver;
pub mod translator;
