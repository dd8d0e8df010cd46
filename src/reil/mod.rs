//! REIL-style intermediate representation
//!
//! Every native instruction lowers to an ordered sequence of IR instructions. An IR instruction
//! has a mnemonic and exactly three operand slots; unused slots hold [`Operand::Empty`].

mod parser;

pub use self::parser::ParseError;
pub(crate) use self::parser::parse_number;

use std::fmt;
use strum::{EnumString, EnumVariantNames, IntoStaticStr};

/// Composite address of an IR instruction: the native address plus its position inside the
/// lowering of that native instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IrAddress {
    pub native: u64,
    pub index: u8,
}

impl IrAddress {
    pub fn new(native: u64, index: u8) -> Self {
        Self { native, index }
    }

    /// Packed form `native << 8 | index`.
    pub fn packed(&self) -> u64 {
        (self.native << 8) | u64::from(self.index)
    }

    pub fn from_packed(packed: u64) -> Self {
        Self {
            native: packed >> 8,
            index: (packed & 0xff) as u8,
        }
    }
}

impl fmt::Display for IrAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}:{:02}", self.native, self.index)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumVariantNames, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum IrMnemonic {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Bsh,
    And,
    Or,
    Xor,
    Ldm,
    Stm,
    Str,
    Bisz,
    Jcc,
    Unkn,
    Undef,
    Nop,
    Sext,
    Sdiv,
    Smod,
}

impl IrMnemonic {
    pub fn is_branch(&self) -> bool {
        *self == IrMnemonic::Jcc
    }
}

impl fmt::Display for IrMnemonic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name: &'static str = self.into();
        f.pad(name)
    }
}

/// Operand of an IR instruction.
///
/// `Empty` marks an unused slot. Any expression builder handed an `Empty` operand fails with an
/// invalid-operand error.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Register { name: String, size: u32 },
    Immediate { value: u64, size: u32 },
    Empty,
}

impl Operand {
    pub fn register(name: &str, size: u32) -> Self {
        Operand::Register {
            name: name.to_owned(),
            size,
        }
    }

    pub fn immediate(value: u64, size: u32) -> Self {
        Operand::Immediate {
            value: crate::util::truncate(value, size),
            size,
        }
    }

    pub fn size(&self) -> Option<u32> {
        match self {
            Operand::Register { size, .. } | Operand::Immediate { size, .. } => Some(*size),
            Operand::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Operand::Empty)
    }
}

fn size_to_str(size: u32) -> String {
    match size {
        1 => String::from("BIT"),
        8 => String::from("BYTE"),
        16 => String::from("WORD"),
        32 => String::from("DWORD"),
        64 => String::from("QWORD"),
        128 => String::from("DQWORD"),
        other => format!("BITS{}", other),
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operand::Register { name, size } => write!(f, "{} {}", size_to_str(*size), name),
            Operand::Immediate { value, size } => {
                write!(f, "{} {:#x}", size_to_str(*size), value)
            }
            Operand::Empty => write!(f, "EMPTY"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrInstruction {
    pub address: IrAddress,
    pub mnemonic: IrMnemonic,
    pub operands: [Operand; 3],
}

impl IrInstruction {
    pub fn new(address: IrAddress, mnemonic: IrMnemonic, operands: [Operand; 3]) -> Self {
        Self {
            address,
            mnemonic,
            operands,
        }
    }

    /// Parses the textual form and places the instruction at `address`.
    pub fn parse_at(address: IrAddress, text: &str) -> Result<Self, ParseError> {
        let mut instruction: IrInstruction = text.parse()?;
        instruction.address = address;
        Ok(instruction)
    }

    pub fn is_branch(&self) -> bool {
        self.mnemonic.is_branch()
    }
}

impl fmt::Display for IrInstruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:<5} [{}, {}, {}]",
            self.mnemonic, self.operands[0], self.operands[1], self.operands[2]
        )
    }
}
