//! Lowering of IR instructions into formulas
//!
//! Registers are modeled in static single assignment form. Every write to a register creates a
//! new symbol `<name>_<version>`, reads always refer to the most recent version. Version `0` is
//! the initial value of a register and is never reassigned until [`Translator::reset`].
//! Memory is a byte array `MEM_<version>` which is versioned the same way.

use crate::{
    arch::ArchInfo,
    reil::{IrInstruction, IrMnemonic, Operand},
    smt::Expr,
    util::bytes_for,
};
use log::trace;
use std::collections::HashMap;
use thiserror::Error;

pub mod defaults {
    pub const FLAG_WIDTH: u32 = 32;
    pub const MEMORY_NAME: &str = "MEM";
}

#[derive(Debug, Clone)]
pub struct TranslatorOptions {
    /// Width used to encode flags in formulas.
    pub flag_width: u32,
}

impl Default for TranslatorOptions {
    fn default() -> Self {
        Self {
            flag_width: defaults::FLAG_WIDTH,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranslationError {
    #[error("operand {0} cannot be used as an expression")]
    InvalidOperand(String),

    #[error("{mnemonic} requires operand {index}")]
    MissingOperand { mnemonic: IrMnemonic, index: usize },

    #[error("register {0} has no known width")]
    UnknownRegister(String),
}

/// Translator capability used by the analyzer.
pub trait Translator {
    /// Formulas describing the effect of `instruction` on registers and memory.
    fn translate(&mut self, instruction: &IrInstruction) -> Result<Vec<Expr>, TranslationError>;

    /// Expression of `operand` read as a source at the current version.
    fn translate_src_operand(&self, operand: &Operand) -> Result<Expr, TranslationError>;

    fn make_bitvec(&self, width: u32, name: &str) -> Expr {
        Expr::bitvec(name, width)
    }

    fn init_name(&self, name: &str) -> String;

    fn curr_name(&self, name: &str) -> String;

    /// Current memory array.
    fn memory(&self) -> Expr;

    /// Memory array at session start.
    fn memory_init(&self) -> Expr;

    fn flag_width(&self) -> u32;

    /// Forgets all versions, the next symbols start over at version `0`.
    fn reset(&mut self);
}

/// Version bookkeeping for SSA names.
#[derive(Debug, Clone, Default)]
pub struct VariableNamer {
    versions: HashMap<String, usize>,
}

impl VariableNamer {
    pub fn version(&self, name: &str) -> usize {
        self.versions.get(name).copied().unwrap_or(0)
    }

    pub fn init_name(&self, name: &str) -> String {
        format!("{}_0", name)
    }

    pub fn curr_name(&self, name: &str) -> String {
        format!("{}_{}", name, self.version(name))
    }

    /// Bumps the version of `name` and returns the new current name.
    pub fn next_name(&mut self, name: &str) -> String {
        let version = self.versions.entry(name.to_owned()).or_insert(0);
        *version += 1;

        format!("{}_{}", name, version)
    }

    pub fn reset(&mut self) {
        self.versions.clear();
    }
}

/// Reference translator from IR into bit-vector and array formulas.
pub struct SmtTranslator<'a> {
    arch: &'a ArchInfo,
    options: TranslatorOptions,
    names: VariableNamer,
}

impl<'a> SmtTranslator<'a> {
    pub fn new(arch: &'a ArchInfo, options: TranslatorOptions) -> Self {
        Self {
            arch,
            options,
            names: VariableNamer::default(),
        }
    }

    pub fn with_defaults(arch: &'a ArchInfo) -> Self {
        Self::new(arch, TranslatorOptions::default())
    }

    pub fn names(&self) -> &VariableNamer {
        &self.names
    }

    fn register_width(&self, name: &str) -> Result<u32, TranslationError> {
        if self.arch.is_flag(name) {
            Ok(self.options.flag_width)
        } else {
            self.arch
                .register_size(name)
                .ok_or_else(|| TranslationError::UnknownRegister(name.to_owned()))
        }
    }

    fn current(&self, name: &str) -> Result<Expr, TranslationError> {
        let width = self.register_width(name)?;

        Ok(self.make_bitvec(width, &self.names.curr_name(name)))
    }

    fn read_register(&self, name: &str, size: u32) -> Result<Expr, TranslationError> {
        if !self.arch.is_architectural(name) {
            return Ok(self.make_bitvec(size, &self.names.curr_name(name)));
        }

        let value = match self.arch.alias(name) {
            Some((base, offset)) => {
                let width = self.register_width(name)?;
                self.current(base)?.extract(offset, width)
            }
            None => self.current(name)?,
        };

        Ok(value.fit(size))
    }

    fn write_register(
        &mut self,
        name: &str,
        size: u32,
        value: &Expr,
    ) -> Result<Expr, TranslationError> {
        if !self.arch.is_architectural(name) {
            let next = self.names.next_name(name);
            let target = self.make_bitvec(size, &next);
            return Ok(target._eq(&value.fit(size)));
        }

        match self.arch.alias(name) {
            Some((base, offset)) => {
                let width = self.register_width(name)?;
                let base_width = self.register_width(base)?;
                let previous = self.current(base)?;

                let mut parts = Vec::with_capacity(3);
                if offset + width < base_width {
                    parts.push(previous.extract(offset + width, base_width - offset - width));
                }
                parts.push(value.fit(width));
                if offset > 0 {
                    parts.push(previous.extract(0, offset));
                }

                let next = self.names.next_name(base);
                let target = self.make_bitvec(base_width, &next);
                Ok(target._eq(&Expr::concat(&parts)))
            }
            None => {
                let width = self.register_width(name)?;
                let next = self.names.next_name(name);
                let target = self.make_bitvec(width, &next);
                Ok(target._eq(&value.fit(width)))
            }
        }
    }

    fn write_dst(&mut self, operand: &Operand, value: &Expr) -> Result<Expr, TranslationError> {
        match operand {
            Operand::Register { name, size } => self.write_register(name, *size, value),
            other => Err(TranslationError::InvalidOperand(other.to_string())),
        }
    }

    fn address(&self, operand: &Operand) -> Result<Expr, TranslationError> {
        Ok(self
            .translate_src_operand(operand)?
            .fit(self.arch.address_size()))
    }

    fn load(&self, address: &Expr, bytes: u32) -> Expr {
        let memory = self.memory();
        let width = address.width();

        let parts = (0..bytes)
            .rev()
            .map(|i| memory.select(&address.bvadd(&Expr::constant(u64::from(i), width))))
            .collect::<Vec<_>>();

        Expr::concat(&parts)
    }

    fn store(&mut self, address: &Expr, value: &Expr) -> Expr {
        let bytes = bytes_for(value.width());
        let value = value.fit(bytes * 8);
        let width = address.width();

        let mut memory = self.memory();
        for i in 0..bytes {
            let index = address.bvadd(&Expr::constant(u64::from(i), width));
            memory = memory.store(&index, &value.extract(i * 8, 8));
        }

        let name = self.names.next_name(defaults::MEMORY_NAME);
        Expr::array(&name, self.arch.address_size(), 8)._eq(&memory)
    }

    fn translate_impl(
        &mut self,
        instruction: &IrInstruction,
    ) -> Result<Vec<Expr>, TranslationError> {
        let mnemonic = instruction.mnemonic;
        let [first, second, third] = &instruction.operands;

        let required = |operand: &Operand, index: usize| {
            if operand.is_empty() {
                Err(TranslationError::MissingOperand { mnemonic, index })
            } else {
                Ok(())
            }
        };

        let destination_size = || third.size().unwrap_or_default();

        let formulas = match mnemonic {
            IrMnemonic::Add
            | IrMnemonic::Sub
            | IrMnemonic::Mul
            | IrMnemonic::Div
            | IrMnemonic::Mod
            | IrMnemonic::And
            | IrMnemonic::Or
            | IrMnemonic::Xor => {
                required(first, 0)?;
                required(second, 1)?;
                required(third, 2)?;

                let size = destination_size();
                let a = self.translate_src_operand(first)?.fit(size);
                let b = self.translate_src_operand(second)?.fit(size);

                let result = match mnemonic {
                    IrMnemonic::Add => a.bvadd(&b),
                    IrMnemonic::Sub => a.bvsub(&b),
                    IrMnemonic::Mul => a.bvmul(&b),
                    IrMnemonic::Div => a.bvudiv(&b),
                    IrMnemonic::Mod => a.bvurem(&b),
                    IrMnemonic::And => a.bvand(&b),
                    IrMnemonic::Or => a.bvor(&b),
                    _ => a.bvxor(&b),
                };

                vec![self.write_dst(third, &result)?]
            }
            IrMnemonic::Sdiv | IrMnemonic::Smod => {
                required(first, 0)?;
                required(second, 1)?;
                required(third, 2)?;

                let size = destination_size();
                let a = self.translate_src_operand(first)?.sign_fit(size);
                let b = self.translate_src_operand(second)?.sign_fit(size);

                let result = if mnemonic == IrMnemonic::Sdiv {
                    a.bvsdiv(&b)
                } else {
                    a.bvsrem(&b)
                };

                vec![self.write_dst(third, &result)?]
            }
            IrMnemonic::Bsh => {
                required(first, 0)?;
                required(second, 1)?;
                required(third, 2)?;

                // positive amounts shift left, negative amounts shift right
                let a = self.translate_src_operand(first)?;
                let b = self.translate_src_operand(second)?;
                let width = a.width().max(b.width()).max(destination_size());

                let a = a.fit(width);
                let b = b.sign_fit(width);
                let zero = Expr::constant(0, width);

                let result = Expr::ite(&b.slt(&zero), &a.bvlshr(&b.bvneg()), &a.bvshl(&b));

                vec![self.write_dst(third, &result)?]
            }
            IrMnemonic::Ldm => {
                required(first, 0)?;
                required(third, 2)?;

                let size = destination_size();
                let address = self.address(first)?;
                let value = self.load(&address, bytes_for(size));

                vec![self.write_dst(third, &value)?]
            }
            IrMnemonic::Stm => {
                required(first, 0)?;
                required(third, 2)?;

                let value = self.translate_src_operand(first)?;
                let address = self.address(third)?;

                vec![self.store(&address, &value)]
            }
            IrMnemonic::Str => {
                required(first, 0)?;
                required(third, 2)?;

                let value = self.translate_src_operand(first)?;

                vec![self.write_dst(third, &value)?]
            }
            IrMnemonic::Bisz => {
                required(first, 0)?;
                required(third, 2)?;

                let size = destination_size();
                let value = self.translate_src_operand(first)?;
                let is_zero = value.eq_value(0);

                let result = Expr::ite(
                    &is_zero,
                    &Expr::constant(1, size),
                    &Expr::constant(0, size),
                );

                vec![self.write_dst(third, &result)?]
            }
            IrMnemonic::Sext => {
                required(first, 0)?;
                required(third, 2)?;

                let value = self
                    .translate_src_operand(first)?
                    .sign_fit(destination_size());

                vec![self.write_dst(third, &value)?]
            }
            IrMnemonic::Undef => {
                required(third, 2)?;

                match third {
                    Operand::Register { name, size } if self.arch.alias(name).is_some() => {
                        let fresh = self.names.next_name(&format!("{}_undef", name));
                        let value = self.make_bitvec(*size, &fresh);

                        vec![self.write_dst(third, &value)?]
                    }
                    Operand::Register { name, .. } => {
                        self.names.next_name(name);
                        vec![]
                    }
                    other => return Err(TranslationError::InvalidOperand(other.to_string())),
                }
            }
            IrMnemonic::Jcc | IrMnemonic::Unkn | IrMnemonic::Nop => vec![],
        };

        Ok(formulas)
    }
}

impl<'a> Translator for SmtTranslator<'a> {
    fn translate(&mut self, instruction: &IrInstruction) -> Result<Vec<Expr>, TranslationError> {
        let formulas = self.translate_impl(instruction)?;

        trace!(
            "{} {} lowered to {} formula(s)",
            instruction.address,
            instruction,
            formulas.len()
        );

        Ok(formulas)
    }

    fn translate_src_operand(&self, operand: &Operand) -> Result<Expr, TranslationError> {
        match operand {
            Operand::Register { name, size } => self.read_register(name, *size),
            Operand::Immediate { value, size } => Ok(Expr::constant(*value, *size)),
            Operand::Empty => Err(TranslationError::InvalidOperand(operand.to_string())),
        }
    }

    fn init_name(&self, name: &str) -> String {
        self.names.init_name(name)
    }

    fn curr_name(&self, name: &str) -> String {
        self.names.curr_name(name)
    }

    fn memory(&self) -> Expr {
        Expr::array(
            &self.names.curr_name(defaults::MEMORY_NAME),
            self.arch.address_size(),
            8,
        )
    }

    fn memory_init(&self) -> Expr {
        Expr::array(
            &self.names.init_name(defaults::MEMORY_NAME),
            self.arch.address_size(),
            8,
        )
    }

    fn flag_width(&self) -> u32 {
        self.options.flag_width
    }

    fn reset(&mut self) {
        self.names.reset();
    }
}
