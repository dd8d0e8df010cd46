//! Concrete execution contexts
//!
//! A [`Context`] is a snapshot of concrete register, flag and memory values. The analyzer binds
//! the initial symbols of a session to a context and reads a fresh context back out of a model.
//! Snapshots are never modified after construction.

use crate::util::truncate;
use byteorder::{ByteOrder, LittleEndian};
use std::{collections::BTreeMap, fmt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    pub name: String,
    /// Falls back to the architecture's width when absent.
    pub width: Option<u32>,
    /// `None` leaves the register unconstrained.
    pub value: Option<u64>,
}

impl Register {
    pub fn new(name: &str, width: Option<u32>, value: Option<u64>) -> Self {
        Self {
            name: name.to_owned(),
            width,
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flag {
    pub name: String,
    pub value: Option<u64>,
}

impl Flag {
    pub fn new(name: &str, value: Option<u64>) -> Self {
        Self {
            name: name.to_owned(),
            value,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    registers: BTreeMap<String, Register>,
    flags: BTreeMap<String, Flag>,
    memory: BTreeMap<u64, u8>,
}

impl Context {
    pub fn new<R, F>(registers: R, flags: F, memory: BTreeMap<u64, u8>) -> Self
    where
        R: IntoIterator<Item = Register>,
        F: IntoIterator<Item = Flag>,
    {
        Self {
            registers: registers
                .into_iter()
                .map(|r| (r.name.clone(), r))
                .collect(),
            flags: flags.into_iter().map(|f| (f.name.clone(), f)).collect(),
            memory,
        }
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    pub fn registers(&self) -> impl Iterator<Item = &Register> {
        self.registers.values()
    }

    pub fn flags(&self) -> impl Iterator<Item = &Flag> {
        self.flags.values()
    }

    pub fn memory(&self) -> &BTreeMap<u64, u8> {
        &self.memory
    }

    pub fn register(&self, name: &str) -> Option<&Register> {
        self.registers.get(name)
    }

    pub fn flag(&self, name: &str) -> Option<&Flag> {
        self.flags.get(name)
    }

    /// Little-endian value of `size` bytes starting at `address`, if all of them are known.
    pub fn memory_value(&self, address: u64, size: usize) -> Option<u64> {
        if size == 0 || size > 8 {
            return None;
        }

        let bytes = (0..size as u64)
            .map(|i| self.memory.get(&address.wrapping_add(i)).copied())
            .collect::<Option<Vec<u8>>>()?;

        Some(LittleEndian::read_uint(&bytes, size))
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty() && self.flags.is_empty() && self.memory.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    context: Context,
}

impl ContextBuilder {
    pub fn register(mut self, name: &str, width: u32, value: u64) -> Self {
        let register = Register::new(name, Some(width), Some(truncate(value, width)));
        self.context.registers.insert(name.to_owned(), register);
        self
    }

    /// Register that is reported but left unconstrained.
    pub fn free_register(mut self, name: &str, width: Option<u32>) -> Self {
        let register = Register::new(name, width, None);
        self.context.registers.insert(name.to_owned(), register);
        self
    }

    pub fn flag(mut self, name: &str, value: u64) -> Self {
        self.context
            .flags
            .insert(name.to_owned(), Flag::new(name, Some(value)));
        self
    }

    pub fn memory(mut self, address: u64, value: u8) -> Self {
        self.context.memory.insert(address, value);
        self
    }

    /// Stores the lowest `size` bytes of `value` in little-endian order.
    pub fn memory_value(mut self, address: u64, value: u64, size: usize) -> Self {
        let size = size.min(8);
        let mut bytes = [0_u8; 8];

        if size > 0 {
            let value = truncate(value, size as u32 * 8);
            LittleEndian::write_uint(&mut bytes[..size], value, size);
        }

        for (i, byte) in bytes[..size].iter().enumerate() {
            self.context
                .memory
                .insert(address.wrapping_add(i as u64), *byte);
        }
        self
    }

    pub fn build(self) -> Context {
        self.context
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "registers:")?;
        for register in self.registers.values() {
            write!(f, "  {}", register.name)?;
            if let Some(width) = register.width {
                write!(f, " ({})", width)?;
            }
            match register.value {
                Some(value) => writeln!(f, " = {:#x}", value)?,
                None => writeln!(f, " = ?")?,
            }
        }

        writeln!(f, "flags:")?;
        for flag in self.flags.values() {
            match flag.value {
                Some(value) => writeln!(f, "  {} = {:#x}", flag.name, value)?,
                None => writeln!(f, "  {} = ?", flag.name)?,
            }
        }

        writeln!(f, "memory:")?;
        for (address, value) in self.memory.iter() {
            writeln!(f, "  {:#x} = {:#04x}", address, value)?;
        }

        Ok(())
    }
}
