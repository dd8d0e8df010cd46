use super::{IrAddress, IrInstruction, IrMnemonic, Operand};
use crate::util::truncate;
use std::{convert::TryFrom, str::FromStr};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown mnemonic {0:?}")]
    UnknownMnemonic(String),

    #[error("expected operand list in brackets: {0:?}")]
    MissingOperandList(String),

    #[error("expected 3 operands, found {0}")]
    OperandCount(usize),

    #[error("unknown operand size {0:?}")]
    UnknownSize(String),

    #[error("malformed operand {0:?}")]
    MalformedOperand(String),

    #[error("malformed number {0:?}")]
    MalformedNumber(String),

    #[error("native instruction {0:#x} has more than 256 IR instructions")]
    TooManyInstructions(u64),
}

fn parse_size(text: &str) -> Result<u32, ParseError> {
    match text {
        "BIT" => Ok(1),
        "BYTE" => Ok(8),
        "WORD" => Ok(16),
        "DWORD" => Ok(32),
        "QWORD" => Ok(64),
        "DQWORD" => Ok(128),
        other => other
            .strip_prefix("BITS")
            .and_then(|bits| bits.parse::<u32>().ok())
            .filter(|bits| *bits > 0)
            .ok_or_else(|| ParseError::UnknownSize(other.to_owned())),
    }
}

/// Parses decimal or `0x` prefixed hexadecimal numbers, optionally negated.
pub(crate) fn parse_number(text: &str) -> Result<u64, ParseError> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let value = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => digits.parse::<u64>(),
    }
    .map_err(|_| ParseError::MalformedNumber(text.to_owned()))?;

    Ok(if negative {
        value.wrapping_neg()
    } else {
        value
    })
}

fn is_number(token: &str) -> bool {
    token
        .trim_start_matches('-')
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_digit())
}

fn parse_operand(text: &str) -> Result<Operand, ParseError> {
    let text = text.trim();

    if text == "EMPTY" {
        return Ok(Operand::Empty);
    }

    let mut parts = text.split_whitespace();

    let (size, token) = match (parts.next(), parts.next(), parts.next()) {
        (Some(size), Some(token), None) => (parse_size(size)?, token),
        _ => return Err(ParseError::MalformedOperand(text.to_owned())),
    };

    if is_number(token) {
        Ok(Operand::Immediate {
            value: truncate(parse_number(token)?, size),
            size,
        })
    } else {
        Ok(Operand::Register {
            name: token.to_owned(),
            size,
        })
    }
}

impl FromStr for IrInstruction {
    type Err = ParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();

        let open = text
            .find('[')
            .ok_or_else(|| ParseError::MissingOperandList(text.to_owned()))?;

        let operands = text[open + 1..]
            .strip_suffix(']')
            .ok_or_else(|| ParseError::MissingOperandList(text.to_owned()))?;

        let name = text[..open].trim();
        let mnemonic = IrMnemonic::from_str(name)
            .map_err(|_| ParseError::UnknownMnemonic(name.to_owned()))?;

        let operands = operands
            .split(',')
            .map(parse_operand)
            .collect::<Result<Vec<_>, _>>()?;

        match <[Operand; 3]>::try_from(operands) {
            Ok(operands) => Ok(IrInstruction::new(IrAddress::new(0, 0), mnemonic, operands)),
            Err(operands) => Err(ParseError::OperandCount(operands.len())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_binary_operation() {
        let instruction: IrInstruction = "add [DWORD eax, DWORD 0x1, QWORD t0]".parse().unwrap();

        assert_eq!(instruction.mnemonic, IrMnemonic::Add);
        assert_eq!(
            instruction.operands,
            [
                Operand::register("eax", 32),
                Operand::immediate(1, 32),
                Operand::register("t0", 64)
            ]
        );
    }

    #[test]
    fn parse_empty_operands_and_padding() {
        let instruction: IrInstruction = "  jcc   [BIT t3, EMPTY, DWORD 0x8048010]  "
            .parse()
            .unwrap();

        assert_eq!(instruction.mnemonic, IrMnemonic::Jcc);
        assert_eq!(instruction.operands[0], Operand::register("t3", 1));
        assert_eq!(instruction.operands[1], Operand::Empty);
        assert_eq!(instruction.operands[2], Operand::immediate(0x8048010, 32));
    }

    #[test]
    fn negative_immediates_are_twos_complement() {
        let instruction: IrInstruction = "bsh [DWORD eax, BYTE -0x1, DWORD t1]".parse().unwrap();

        assert_eq!(instruction.operands[1], Operand::immediate(0xff, 8));
    }

    #[test]
    fn display_output_parses_back() {
        let text = "stm   [WORD ax, EMPTY, DWORD esp]";
        let instruction: IrInstruction = text.parse().unwrap();

        assert_eq!(instruction.to_string(), text);
    }

    #[test]
    fn parse_at_sets_address() {
        let instruction =
            IrInstruction::parse_at(IrAddress::new(0x400, 2), "nop [EMPTY, EMPTY, EMPTY]")
                .unwrap();

        assert_eq!(instruction.address, IrAddress::new(0x400, 2));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(
            "mov [DWORD eax, EMPTY, DWORD ebx]".parse::<IrInstruction>(),
            Err(ParseError::UnknownMnemonic(String::from("mov")))
        );
        assert_eq!(
            "str [DWORD eax, EMPTY]".parse::<IrInstruction>(),
            Err(ParseError::OperandCount(2))
        );
        assert_eq!(
            "str [NIBBLE eax, EMPTY, DWORD ebx]".parse::<IrInstruction>(),
            Err(ParseError::UnknownSize(String::from("NIBBLE")))
        );
        assert!(matches!(
            "str DWORD eax".parse::<IrInstruction>(),
            Err(ParseError::MissingOperandList(_))
        ));
    }
}
