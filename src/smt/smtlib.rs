use super::{BinaryOp, Expr, Node, Sort, UnaryOp};
use std::fmt;

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Sort::Bool => write!(f, "Bool"),
            Sort::BitVec(width) => write!(f, "(_ BitVec {})", width),
            Sort::Array { index, element } => write!(
                f,
                "(Array (_ BitVec {}) (_ BitVec {}))",
                index, element
            ),
        }
    }
}

fn unary_to_str(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::BvNot => "bvnot",
        UnaryOp::BvNeg => "bvneg",
        UnaryOp::Not => "not",
    }
}

fn binary_to_str(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::BvAdd => "bvadd",
        BinaryOp::BvSub => "bvsub",
        BinaryOp::BvMul => "bvmul",
        BinaryOp::BvUdiv => "bvudiv",
        BinaryOp::BvUrem => "bvurem",
        BinaryOp::BvSdiv => "bvsdiv",
        BinaryOp::BvSrem => "bvsrem",
        BinaryOp::BvAnd => "bvand",
        BinaryOp::BvOr => "bvor",
        BinaryOp::BvXor => "bvxor",
        BinaryOp::BvShl => "bvshl",
        BinaryOp::BvLshr => "bvlshr",
        BinaryOp::Eq => "=",
        BinaryOp::Ult => "bvult",
        BinaryOp::Slt => "bvslt",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
    }
}

fn is_simple_symbol(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || "_.$@".contains(c))
}

/// SMT-LIB2 spelling of a symbol name, quoted when necessary.
pub fn symbol(name: &str) -> String {
    if is_simple_symbol(name) {
        name.to_owned()
    } else {
        format!("|{}|", name)
    }
}

/// `declare-fun` command for a symbol.
pub fn declaration(name: &str, sort: Sort) -> String {
    format!("(declare-fun {} () {})", symbol(name), sort)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.node() {
            Node::Constant { value, width } => write!(f, "(_ bv{} {})", value, width),
            Node::Boolean(value) => write!(f, "{}", value),
            Node::Symbol { name } => write!(f, "{}", symbol(name)),
            Node::Unary { op, value } => write!(f, "({} {})", unary_to_str(*op), value),
            Node::Binary { op, left, right } => {
                write!(f, "({} {} {})", binary_to_str(*op), left, right)
            }
            Node::Extract {
                value,
                offset,
                width,
            } => write!(
                f,
                "((_ extract {} {}) {})",
                offset + width - 1,
                offset,
                value
            ),
            Node::Concat(parts) => {
                // binary concat nests to the right
                let (last, init) = parts.split_last().expect("concat has parts");

                for part in init {
                    write!(f, "(concat {} ", part)?;
                }
                write!(f, "{}", last)?;
                for _ in init {
                    write!(f, ")")?;
                }
                Ok(())
            }
            Node::ZeroExt { value, by } => write!(f, "((_ zero_extend {}) {})", by, value),
            Node::SignExt { value, by } => write!(f, "((_ sign_extend {}) {})", by, value),
            Node::Ite {
                cond,
                then,
                otherwise,
            } => write!(f, "(ite {} {} {})", cond, then, otherwise),
            Node::Select { array, index } => write!(f, "(select {} {})", array, index),
            Node::Store {
                array,
                index,
                value,
            } => write!(f, "(store {} {} {})", array, index, value),
        }
    }
}
