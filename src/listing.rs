//! Textual description of a candidate path and its initial context
//!
//! ```text
//! # initial context
//! reg eax 32 0x5
//! reg ecx 32 ?
//! flag zf 0x0
//! mem 0x8000 0xff
//!
//! block taken=0x2000 not_taken=0x1003
//! 0x1000 1 inc eax
//!     add [DWORD eax, DWORD 0x1, DWORD t0]
//!     str [DWORD t0, EMPTY, DWORD eax]
//! 0x1001 2 jz 0x2000
//!     ...
//! block
//! 0x2000 1 nop
//!     nop [EMPTY, EMPTY, EMPTY]
//! ```
//!
//! Native instructions are lines starting with an address, followed by their encoded size and
//! their disassembly. Every other line inside a block is an IR instruction of the preceding native
//! instruction.

use crate::{
    analyzer::{Context, Flag, Register},
    block::{BasicBlock, DualInstruction, NativeInstruction},
    reil::{parse_number, IrAddress, IrInstruction},
};
use anyhow::{anyhow, bail, Context as _, Result};
use std::{collections::BTreeMap, convert::TryFrom, fs, path::Path};

#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub context: Context,
    pub path: Vec<BasicBlock>,
}

impl Listing {
    /// Address of the first native instruction of the path.
    pub fn entry(&self) -> Option<u64> {
        self.path.first().map(|block| block.address)
    }
}

#[derive(Default)]
struct PendingBlock {
    taken: Option<u64>,
    not_taken: Option<u64>,
    direct: Option<u64>,
    instructions: Vec<DualInstruction>,
}

impl PendingBlock {
    fn finish(self) -> Result<BasicBlock> {
        if self.instructions.is_empty() {
            bail!("basic block without instructions");
        }

        let mut block =
            BasicBlock::new(self.instructions).with_branches(self.taken, self.not_taken);
        block.direct_branch = self.direct;

        Ok(block)
    }
}

fn number(token: Option<&str>, what: &str) -> Result<u64> {
    let token = token.ok_or_else(|| anyhow!("missing {}", what))?;

    parse_number(token).with_context(|| format!("invalid {}", what))
}

fn optional_number(token: Option<&str>, what: &str) -> Result<Option<u64>> {
    match token {
        Some("?") => Ok(None),
        token => number(token, what).map(Some),
    }
}

fn block_header(tokens: &[&str]) -> Result<PendingBlock> {
    let mut block = PendingBlock::default();

    for token in tokens {
        let (key, value) = token
            .split_once('=')
            .ok_or_else(|| anyhow!("expected key=value, found {:?}", token))?;

        let target = Some(number(Some(value), key)?);

        match key {
            "taken" => block.taken = target,
            "not_taken" => block.not_taken = target,
            "direct" => block.direct = target,
            other => bail!("unknown branch kind {:?}", other),
        }
    }

    Ok(block)
}

fn native_instruction(line: &str) -> Result<NativeInstruction> {
    let mut tokens = line.splitn(3, char::is_whitespace);

    let address = number(tokens.next(), "instruction address")?;
    let size = number(tokens.next(), "instruction size")?;
    let text = tokens.next().unwrap_or("").trim();

    let native = NativeInstruction::new(address, size, text);
    if native.checked_end_address().is_none() {
        bail!(
            "instruction at {:#x} of {} bytes exceeds the address space",
            address,
            size
        );
    }

    Ok(native)
}

pub fn parse(source: &str) -> Result<Listing> {
    let mut registers = Vec::new();
    let mut flags = Vec::new();
    let mut memory = BTreeMap::new();

    let mut path = Vec::new();
    let mut block: Option<PendingBlock> = None;

    for (index, line) in source.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();

        if line.is_empty() {
            continue;
        }

        let tokens = line.split_whitespace().collect::<Vec<_>>();

        let result = match tokens[0] {
            "reg" => {
                let name = tokens.get(1).ok_or_else(|| anyhow!("missing register name"));
                name.and_then(|name| {
                    let width = number(tokens.get(2).copied(), "register width")?;
                    let width = match u32::try_from(width) {
                        Ok(width) if width > 0 => width,
                        _ => bail!("invalid register width {}", width),
                    };
                    let value = optional_number(tokens.get(3).copied(), "register value")?;
                    registers.push(Register::new(name, Some(width), value));
                    Ok(())
                })
            }
            "flag" => {
                let name = tokens.get(1).ok_or_else(|| anyhow!("missing flag name"));
                name.and_then(|name| {
                    let value = optional_number(tokens.get(2).copied(), "flag value")?;
                    flags.push(Flag::new(name, value));
                    Ok(())
                })
            }
            "mem" => number(tokens.get(1).copied(), "memory address").and_then(|address| {
                let value = number(tokens.get(2).copied(), "memory value")?;
                if value > 0xff {
                    bail!("memory value {:#x} is wider than a byte", value);
                }
                memory.insert(address, value as u8);
                Ok(())
            }),
            "block" => block_header(&tokens[1..]).and_then(|next| {
                if let Some(previous) = block.replace(next) {
                    path.push(previous.finish()?);
                }
                Ok(())
            }),
            first if parse_number(first).is_ok() => match block.as_mut() {
                Some(block) => native_instruction(line).map(|native| {
                    block.instructions.push(DualInstruction::new(native, vec![]))
                }),
                None => Err(anyhow!("instruction outside of a basic block")),
            },
            _ => match block.as_mut().and_then(|b| b.instructions.last_mut()) {
                Some(dual) => {
                    let index = u8::try_from(dual.ir.len()).map_err(|_| {
                        anyhow!(
                            "native instruction {:#x} has more than 256 IR instructions",
                            dual.native.address
                        )
                    })?;
                    let position = IrAddress::new(dual.native.address, index);
                    IrInstruction::parse_at(position, line)
                        .map(|ir| dual.ir.push(ir))
                        .map_err(anyhow::Error::from)
                }
                None => Err(anyhow!("IR instruction without native instruction")),
            },
        };

        result.with_context(|| format!("line {}: {}", index + 1, line))?;
    }

    if let Some(last) = block {
        path.push(last.finish()?);
    }

    Ok(Listing {
        context: Context::new(registers, flags, memory),
        path,
    })
}

pub fn load(file: &Path) -> Result<Listing> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("could not read listing {}", file.display()))?;

    parse(&source).with_context(|| format!("could not parse listing {}", file.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "
        # eax starts at 5
        reg eax 32 0x5
        reg ecx 32 ?
        flag zf 0
        mem 0x8000 0xff

        block taken=0x2000 not_taken=0x1003
        0x1000 1 inc eax
            add [DWORD eax, DWORD 0x1, DWORD eax]
        0x1001 2 jz 0x2000
            bisz [DWORD eax, EMPTY, BIT t0]
            jcc [BIT t0, EMPTY, DWORD 0x2000]
        block
        0x2000 1 nop
            nop [EMPTY, EMPTY, EMPTY]
    ";

    #[test]
    fn parse_context_and_path() {
        let listing = parse(LISTING).unwrap();

        assert_eq!(
            listing.context.register("eax"),
            Some(&Register::new("eax", Some(32), Some(5)))
        );
        assert_eq!(listing.context.register("ecx").and_then(|r| r.value), None);
        assert_eq!(listing.context.flag("zf").and_then(|f| f.value), Some(0));
        assert_eq!(listing.context.memory_value(0x8000, 1), Some(0xff));

        assert_eq!(listing.path.len(), 2);
        assert_eq!(listing.entry(), Some(0x1000));

        let first = &listing.path[0];
        assert_eq!(first.end_address, 0x1002);
        assert_eq!(first.taken_branch, Some(0x2000));
        assert_eq!(first.not_taken_branch, Some(0x1003));
        assert_eq!(first.instructions[1].native.text, "jz 0x2000");
        assert_eq!(first.instructions[1].ir[1].address, IrAddress::new(0x1001, 1));
        assert!(first.instructions[1].ir[1].is_branch());
    }

    #[test]
    fn errors_name_the_line() {
        let error = parse("block\n0x1000 1 nop\n    frob [EMPTY, EMPTY, EMPTY]").unwrap_err();

        assert!(format!("{:#}", error).contains("line 3"));
    }

    #[test]
    fn ir_outside_block_is_rejected() {
        assert!(parse("nop [EMPTY, EMPTY, EMPTY]").is_err());
        assert!(parse("0x1000 1 nop").is_err());
        assert!(parse("block\n").is_err());
        assert!(parse("mem 0x10 0x100").is_err());
    }

    #[test]
    fn register_widths_must_be_positive() {
        let error = parse("reg eax 0 5").unwrap_err();
        assert!(format!("{:#}", error).contains("invalid register width 0"));

        assert!(parse("reg eax 0x100000000 5").is_err());
        assert!(parse("reg xmm0 128 ?").is_ok());
    }

    #[test]
    fn instructions_must_fit_the_address_space() {
        let error = parse("block\n0xffffffffffffffff 2 nop\nnop [EMPTY, EMPTY, EMPTY]").unwrap_err();
        assert!(format!("{:#}", error).contains("exceeds the address space"));

        let listing = parse("block\n0xffffffffffffffff 1 nop\nnop [EMPTY, EMPTY, EMPTY]").unwrap();
        assert_eq!(listing.path[0].end_address, u64::max_value());
    }

    #[test]
    fn ir_sub_indices_are_bounded() {
        let mut source = String::from("block\n0x1000 1 rep nop\n");
        for _ in 0..257 {
            source.push_str("nop [EMPTY, EMPTY, EMPTY]\n");
        }

        let error = parse(&source).unwrap_err();
        assert!(format!("{:#}", error).contains("line 259"));
    }
}
