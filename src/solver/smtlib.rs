//! External solver process driven through SMT-LIB2 text
//!
//! Commands are written to the solver's stdin as they are issued, so the solver keeps its own
//! incremental state. Replies are read only for commands that produce one (`check-sat`,
//! `get-value`).

use super::{ensure_boolean, Declarations, SatResult, Solver, SolverError, SolverOptions};
use crate::smt::{declaration, Expr, Sort};
use log::{debug, trace};
use regex::Regex;
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
    str::FromStr,
};

pub struct SmtLibSolver {
    options: SolverOptions,
    child: Child,
    input: BufWriter<ChildStdin>,
    output: BufReader<ChildStdout>,
    transcript: Option<BufWriter<File>>,
    declarations: Declarations,
    has_model: bool,
    value_pattern: Regex,
}

impl SmtLibSolver {
    pub fn new(options: SolverOptions) -> Result<Self, SolverError> {
        debug!(
            "starting solver {} {}",
            options.binary.display(),
            options.args.join(" ")
        );

        let mut child = Command::new(&options.binary)
            .args(&options.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let input = child
            .stdin
            .take()
            .ok_or_else(|| SolverError::IoError(String::from("solver has no stdin")))?;
        let output = child
            .stdout
            .take()
            .ok_or_else(|| SolverError::IoError(String::from("solver has no stdout")))?;

        let transcript = match options.transcript {
            Some(ref path) => Some(BufWriter::new(File::create(path)?)),
            None => None,
        };

        let mut solver = Self {
            options,
            child,
            input: BufWriter::new(input),
            output: BufReader::new(output),
            transcript,
            declarations: Declarations::default(),
            has_model: false,
            value_pattern: value_pattern(),
        };

        solver.init()?;

        Ok(solver)
    }

    fn init(&mut self) -> Result<(), SolverError> {
        self.send("(set-option :produce-models true)")?;

        if let Some(timeout) = self.options.timeout {
            self.send(&format!("(set-option :timeout {})", timeout.as_millis()))?;
        }

        let logic = format!("(set-logic {})", self.options.logic);
        self.send(&logic)
    }

    fn send(&mut self, command: &str) -> Result<(), SolverError> {
        trace!("smt> {}", command);

        writeln!(self.input, "{}", command)?;
        self.input.flush()?;

        if let Some(transcript) = self.transcript.as_mut() {
            writeln!(transcript, "{}", command)?;
            transcript.flush()?;
        }

        Ok(())
    }

    /// Reads one complete s-expression or atom from the solver.
    fn receive(&mut self) -> Result<String, SolverError> {
        let mut response = String::new();
        let mut depth = 0_i64;

        loop {
            let mut line = String::new();

            if self.output.read_line(&mut line)? == 0 {
                return Err(SolverError::Protocol(format!(
                    "solver terminated unexpectedly after {:?}",
                    response
                )));
            }

            depth += paren_balance(&line);
            response.push_str(&line);

            if depth <= 0 && !response.trim().is_empty() {
                break;
            }
        }

        let response = response.trim().to_owned();

        trace!("smt< {}", response);

        if response.starts_with("(error") {
            Err(SolverError::Protocol(response))
        } else {
            Ok(response)
        }
    }
}

fn paren_balance(line: &str) -> i64 {
    let mut in_string = false;
    let mut balance = 0;

    for c in line.chars() {
        match c {
            '"' => in_string = !in_string,
            '(' if !in_string => balance += 1,
            ')' if !in_string => balance -= 1,
            _ => {}
        }
    }

    balance
}

fn value_pattern() -> Regex {
    Regex::new(r"#x([0-9a-fA-F]+)|#b([01]+)|\(_\s+bv([0-9]+)\s+[0-9]+\)|\b(true|false)\b")
        .expect("value pattern is a valid regex")
}

/// Extracts the value of a `get-value` reply. The value is the last literal of the reply, the
/// echoed term in front of it may contain literals itself.
pub(crate) fn parse_value(pattern: &Regex, response: &str) -> Result<u64, SolverError> {
    let captures = pattern
        .captures_iter(response)
        .last()
        .ok_or_else(|| SolverError::Protocol(response.to_owned()))?;

    let too_wide = || SolverError::ValueTooWide(response.to_owned());

    if let Some(hex) = captures.get(1) {
        let digits = hex.as_str().trim_start_matches('0');
        if digits.is_empty() {
            return Ok(0);
        }
        u64::from_str_radix(digits, 16).map_err(|_| too_wide())
    } else if let Some(bin) = captures.get(2) {
        let digits = bin.as_str().trim_start_matches('0');
        if digits.is_empty() {
            return Ok(0);
        }
        u64::from_str_radix(digits, 2).map_err(|_| too_wide())
    } else if let Some(dec) = captures.get(3) {
        dec.as_str().parse::<u64>().map_err(|_| too_wide())
    } else {
        Ok(u64::from(&captures[4] == "true"))
    }
}

impl Solver for SmtLibSolver {
    fn name() -> &'static str {
        "SMT-LIB"
    }

    fn add(&mut self, assertion: &Expr) -> Result<(), SolverError> {
        ensure_boolean(assertion)?;

        for symbol in self.declarations.declare(assertion)? {
            let name = symbol.name().expect("declared symbols are named").to_owned();
            self.send(&declaration(&name, symbol.sort()))?;
        }

        self.has_model = false;

        self.send(&format!("(assert {})", assertion))
    }

    fn check_impl(&mut self) -> Result<SatResult, SolverError> {
        self.send("(check-sat)")?;

        let response = self.receive()?;

        let result = SatResult::from_str(&response).map_err(|_| SolverError::Protocol(response))?;

        self.has_model = result.is_sat();

        Ok(result)
    }

    fn get_value(&mut self, expr: &Expr) -> Result<u64, SolverError> {
        if !self.has_model {
            return Err(SolverError::MissingModel);
        }

        if let Sort::Array { .. } = expr.sort() {
            return Err(SolverError::Protocol(format!(
                "cannot read an array value: {}",
                expr
            )));
        }

        // terms over undeclared symbols would be rejected by the solver
        for symbol in self.declarations.declare(expr)? {
            let name = symbol.name().expect("declared symbols are named").to_owned();
            self.send(&declaration(&name, symbol.sort()))?;
        }

        self.send(&format!("(get-value ({}))", expr))?;

        let response = self.receive()?;

        parse_value(&self.value_pattern, &response)
    }

    fn declarations(&self) -> &BTreeMap<String, Expr> {
        self.declarations.as_map()
    }

    fn reset(&mut self) -> Result<(), SolverError> {
        self.send("(reset)")?;

        self.declarations.clear();
        self.has_model = false;

        self.init()
    }
}

impl Drop for SmtLibSolver {
    fn drop(&mut self) {
        let _ = self.send("(exit)");

        if self.child.wait().is_err() {
            let _ = self.child.kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hexadecimal_value() {
        let pattern = value_pattern();

        assert_eq!(
            parse_value(&pattern, "((eax_1 #x00000006))"),
            Ok(6)
        );
    }

    #[test]
    fn parse_binary_and_indexed_values() {
        let pattern = value_pattern();

        assert_eq!(parse_value(&pattern, "((t2_1 #b1))"), Ok(1));
        assert_eq!(parse_value(&pattern, "((x (_ bv42 32)))"), Ok(42));
        assert_eq!(parse_value(&pattern, "(((= x_0 y_0) true))"), Ok(1));
        assert_eq!(parse_value(&pattern, "(((= x_0 y_0) false))"), Ok(0));
    }

    #[test]
    fn value_is_the_last_literal() {
        let pattern = value_pattern();

        assert_eq!(
            parse_value(&pattern, "(((bvadd eax_0 #x00000001) #x00000006))"),
            Ok(6)
        );
        assert_eq!(
            parse_value(
                &pattern,
                "(((concat (select MEM_0 #x00001001) (select MEM_0 #x00001000)) #xbeef))"
            ),
            Ok(0xbeef)
        );
    }

    #[test]
    fn wide_values_are_rejected_unless_leading_zeros() {
        let pattern = value_pattern();

        assert_eq!(
            parse_value(&pattern, "((x #x0000000000000000000000000000ffff))"),
            Ok(0xffff)
        );
        assert!(matches!(
            parse_value(&pattern, "((x #x100000000000000000))"),
            Err(SolverError::ValueTooWide(_))
        ));
    }

    #[test]
    fn garbage_is_a_protocol_error() {
        let pattern = value_pattern();

        assert!(matches!(
            parse_value(&pattern, "unsupported"),
            Err(SolverError::Protocol(_))
        ));
    }

    #[test]
    fn parentheses_in_strings_are_ignored() {
        assert_eq!(paren_balance("(error \"line 3 column 4: (x\")"), 0);
        assert_eq!(paren_balance("((x #x01)"), 1);
    }
}
