mod cli;

use anyhow::{bail, Context, Result};
use cli::expect_arg;
use codeanalyzer::{
    analyzer::CodeAnalyzer,
    arch::{ArchInfo, ArchPreset},
    listing::{self, Listing},
    solver::{SmtLibSolver, Solver, SolverOptions},
    translator::{SmtTranslator, TranslatorOptions},
};
use log::{info, LevelFilter};
use std::{path::PathBuf, str::FromStr, time::Duration};

fn main() -> Result<()> {
    let matches = cli::args().get_matches();

    let log_level = LevelFilter::from_str(expect_arg(&matches, "verbose"))?;

    // RUST_LOG overrides the level given on the command line
    env_logger::Builder::new()
        .filter_module("codeanalyzer", log_level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .init();

    match matches.subcommand() {
        Some(("check", args)) => {
            let input = args
                .get_one::<PathBuf>("input-file")
                .expect("input file is required");

            let listing = listing::load(input)?;

            let start = match args.get_one::<u64>("start") {
                Some(start) => *start,
                None => listing
                    .entry()
                    .context("listing does not contain any basic block")?,
            };

            let arch = match expect_arg(args, "arch").as_str() {
                "x86-64" => ArchInfo::preset(ArchPreset::X86_64),
                _ => ArchInfo::preset(ArchPreset::X86),
            };

            let translator_options = TranslatorOptions {
                flag_width: *args.get_one::<u32>("flag-width").expect("has default"),
            };

            let timeout = args.get_one::<u64>("timeout").map(|ms| Duration::from_millis(*ms));

            match expect_arg(args, "solver").as_str() {
                "smtlib" => {
                    let options = SolverOptions {
                        binary: args
                            .get_one::<PathBuf>("solver-binary")
                            .expect("has default")
                            .clone(),
                        timeout,
                        transcript: args.get_one::<PathBuf>("transcript").cloned(),
                        ..SolverOptions::default()
                    };

                    let solver = SmtLibSolver::new(options)
                        .context("could not start the SMT-LIB solver")?;

                    check(&arch, solver, translator_options, &listing, start)
                }
                "z3" => check_with_z3(&arch, translator_options, &listing, start, timeout),
                other => bail!("unknown solver {}", other),
            }
        }
        _ => unreachable!(),
    }
}

#[cfg(feature = "z3")]
fn check_with_z3(
    arch: &ArchInfo,
    translator_options: TranslatorOptions,
    listing: &Listing,
    start: u64,
    timeout: Option<Duration>,
) -> Result<()> {
    use codeanalyzer::solver::Z3Solver;
    use z3_solver::{Config, Context as Z3Context};

    let mut config = Config::new();
    if let Some(timeout) = timeout {
        config.set_timeout_msec(timeout.as_millis() as u64);
    }
    let context = Z3Context::new(&config);

    check(arch, Z3Solver::new(&context), translator_options, listing, start)
}

#[cfg(not(feature = "z3"))]
fn check_with_z3(
    _arch: &ArchInfo,
    _translator_options: TranslatorOptions,
    _listing: &Listing,
    _start: u64,
    _timeout: Option<Duration>,
) -> Result<()> {
    bail!("this binary was built without the z3 feature")
}

fn check<S: Solver>(
    arch: &ArchInfo,
    solver: S,
    translator_options: TranslatorOptions,
    listing: &Listing,
    start: u64,
) -> Result<()> {
    info!(
        "checking path of {} basic blocks from {:#x} with {} solver",
        listing.path.len(),
        start,
        S::name()
    );

    let translator = SmtTranslator::new(arch, translator_options);
    let mut analyzer = CodeAnalyzer::new(arch, solver, translator);

    analyzer.set_context(listing.context.clone())?;

    let satisfiable = analyzer.check_path_satisfiability(&listing.path, start)?;

    for anomaly in analyzer.anomalies() {
        println!("warning: {}", anomaly);
    }

    if satisfiable {
        println!("sat");

        if !listing.context.is_empty() {
            print!("{}", analyzer.get_context()?);
        }
    } else {
        println!("unsat");
    }

    Ok(())
}
