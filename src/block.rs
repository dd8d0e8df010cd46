//! Basic blocks as handed over by an external CFG builder.

use crate::reil::{IrAddress, IrInstruction, ParseError};
use std::convert::TryFrom;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeInstruction {
    pub address: u64,
    pub size: u64,
    pub text: String,
}

impl NativeInstruction {
    pub fn new(address: u64, size: u64, text: &str) -> Self {
        Self {
            address,
            size,
            text: text.to_owned(),
        }
    }

    /// Address of the last byte of the encoding, `None` if it lies beyond the address space.
    pub fn checked_end_address(&self) -> Option<u64> {
        self.address.checked_add(self.size.max(1) - 1)
    }

    /// Address of the last byte of the encoding, saturating at the end of the address space.
    pub fn end_address(&self) -> u64 {
        self.address.saturating_add(self.size.max(1) - 1)
    }
}

/// A native instruction paired with its IR lowering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DualInstruction {
    pub native: NativeInstruction,
    pub ir: Vec<IrInstruction>,
}

impl DualInstruction {
    pub fn new(native: NativeInstruction, ir: Vec<IrInstruction>) -> Self {
        Self { native, ir }
    }

    /// Builds a dual instruction from textual IR, numbering the IR instructions in order.
    pub fn parse(native: NativeInstruction, ir: &[&str]) -> Result<Self, ParseError> {
        let ir = ir
            .iter()
            .enumerate()
            .map(|(index, text)| {
                let index = u8::try_from(index)
                    .map_err(|_| ParseError::TooManyInstructions(native.address))?;
                IrInstruction::parse_at(IrAddress::new(native.address, index), text)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { native, ir })
    }

    pub fn address(&self) -> u64 {
        self.native.address
    }
}

/// `end_address` is the address of the last byte of the block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    pub address: u64,
    pub end_address: u64,
    pub instructions: Vec<DualInstruction>,
    pub taken_branch: Option<u64>,
    pub not_taken_branch: Option<u64>,
    pub direct_branch: Option<u64>,
}

impl BasicBlock {
    /// Block spanning exactly the given instructions without any outgoing edge.
    pub fn new(instructions: Vec<DualInstruction>) -> Self {
        let address = instructions.first().map_or(0, |i| i.native.address);
        let end_address = instructions
            .last()
            .map_or(address, |i| i.native.end_address());

        Self {
            address,
            end_address,
            instructions,
            taken_branch: None,
            not_taken_branch: None,
            direct_branch: None,
        }
    }

    pub fn with_branches(mut self, taken: Option<u64>, not_taken: Option<u64>) -> Self {
        self.taken_branch = taken;
        self.not_taken_branch = not_taken;
        self
    }

    pub fn with_direct_branch(mut self, target: u64) -> Self {
        self.direct_branch = Some(target);
        self
    }

    /// Whether `instruction` is the final native instruction of this block.
    pub fn ends_with(&self, instruction: &DualInstruction) -> bool {
        instruction.native.end_address() == self.end_address
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DualInstruction> {
        self.instructions.iter()
    }
}

impl<'a> IntoIterator for &'a BasicBlock {
    type Item = &'a DualInstruction;
    type IntoIter = std::slice::Iter<'a, DualInstruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}
