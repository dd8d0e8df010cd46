use anyhow::{anyhow, Result};
use clap::{command, value_parser, Arg, ArgMatches, Command};
use std::path::PathBuf;

pub const LOGGING_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
pub const SOLVERS: [&str; 2] = ["smtlib", "z3"];
pub const ARCHITECTURES: [&str; 2] = ["x86", "x86-64"];

pub fn expect_arg<'a>(m: &'a ArgMatches, arg: &str) -> &'a String {
    m.get_one::<String>(arg)
        .unwrap_or_else(|| panic!("argument \"{}\" has to be set in CLI at all times", arg))
}

fn parse_address(v: &str) -> Result<u64> {
    let parsed = match v.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => v.parse::<u64>(),
    };

    parsed.map_err(|e| anyhow!("invalid address {:?}: {}", v, e))
}

pub fn args() -> Command {
    command!()
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("configure logging level to use")
                .value_name("LEVEL")
                .value_parser(LOGGING_LEVELS)
                .default_value(LOGGING_LEVELS[2])
                .global(true),
        )
        .subcommand(
            Command::new("check")
                .about("Check whether a path of basic blocks is satisfiable")
                .arg(
                    Arg::new("input-file")
                        .help("Listing with the initial context and the basic blocks of the path")
                        .value_name("FILE")
                        .value_parser(value_parser!(PathBuf))
                        .required(true),
                )
                .arg(
                    Arg::new("start")
                        .help("Address of the first instruction to analyze [default: start of the path]")
                        .short('s')
                        .long("start")
                        .value_name("ADDRESS")
                        .value_parser(parse_address),
                )
                .arg(
                    Arg::new("arch")
                        .help("Register layout of the analyzed code")
                        .short('a')
                        .long("arch")
                        .value_name("ARCH")
                        .value_parser(ARCHITECTURES)
                        .default_value(ARCHITECTURES[0]),
                )
                .arg(
                    Arg::new("solver")
                        .help("Solver backend")
                        .long("solver")
                        .value_name("SOLVER")
                        .value_parser(SOLVERS)
                        .default_value(SOLVERS[0]),
                )
                .arg(
                    Arg::new("solver-binary")
                        .help("SMT-LIB2 solver executable used by the smtlib backend")
                        .long("solver-binary")
                        .value_name("PATH")
                        .value_parser(value_parser!(PathBuf))
                        .default_value(codeanalyzer::solver::defaults::BINARY),
                )
                .arg(
                    Arg::new("timeout")
                        .help("Timeout for every satisfiability check in milliseconds")
                        .short('t')
                        .long("timeout")
                        .value_name("MS")
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    Arg::new("transcript")
                        .help("Write every command sent to the smtlib backend to this file")
                        .long("transcript")
                        .value_name("FILE")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("flag-width")
                        .help("Bit width used to encode flags")
                        .long("flag-width")
                        .value_name("BITS")
                        .value_parser(value_parser!(u32).range(1..=64))
                        .default_value("32"),
                ),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
}
