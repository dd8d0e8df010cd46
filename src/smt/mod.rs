//! Formula language shared by translators and solvers
//!
//! An [`Expr`] is an immutable, reference counted term over bit-vectors, booleans and
//! byte-addressed arrays. Every term caches its [`Sort`], so width checks while building
//! formulas are cheap. Terms render to SMT-LIB2 through their `Display` implementation.

mod smtlib;

pub use self::smtlib::{declaration, symbol};

use crate::util::truncate;
use std::{collections::BTreeMap, rc::Rc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sort {
    Bool,
    BitVec(u32),
    Array { index: u32, element: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    BvNot,
    BvNeg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    BvAdd,
    BvSub,
    BvMul,
    BvUdiv,
    BvUrem,
    BvSdiv,
    BvSrem,
    BvAnd,
    BvOr,
    BvXor,
    BvShl,
    BvLshr,
    Eq,
    Ult,
    Slt,
    And,
    Or,
}

impl BinaryOp {
    fn is_predicate(&self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::Ult | BinaryOp::Slt)
    }

    fn is_boolean(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
pub enum Node {
    Constant { value: u64, width: u32 },
    Boolean(bool),
    Symbol { name: String },
    Unary { op: UnaryOp, value: Expr },
    Binary { op: BinaryOp, left: Expr, right: Expr },
    Extract { value: Expr, offset: u32, width: u32 },
    Concat(Vec<Expr>),
    ZeroExt { value: Expr, by: u32 },
    SignExt { value: Expr, by: u32 },
    Ite { cond: Expr, then: Expr, otherwise: Expr },
    Select { array: Expr, index: Expr },
    Store { array: Expr, index: Expr, value: Expr },
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct Term {
    sort: Sort,
    node: Node,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Expr(Rc<Term>);

impl Expr {
    fn with_sort(sort: Sort, node: Node) -> Self {
        Expr(Rc::new(Term { sort, node }))
    }

    pub fn bitvec(name: &str, width: u32) -> Self {
        assert!(width > 0, "bit-vector {} needs a positive width", name);

        Self::with_sort(
            Sort::BitVec(width),
            Node::Symbol {
                name: name.to_owned(),
            },
        )
    }

    pub fn constant(value: u64, width: u32) -> Self {
        assert!(width > 0, "constant needs a positive width");

        Self::with_sort(
            Sort::BitVec(width),
            Node::Constant {
                value: truncate(value, width),
                width,
            },
        )
    }

    pub fn boolean(value: bool) -> Self {
        Self::with_sort(Sort::Bool, Node::Boolean(value))
    }

    /// Array symbol mapping `index`-bit addresses to `element`-bit values.
    pub fn array(name: &str, index: u32, element: u32) -> Self {
        Self::with_sort(
            Sort::Array { index, element },
            Node::Symbol {
                name: name.to_owned(),
            },
        )
    }

    pub fn sort(&self) -> Sort {
        self.0.sort
    }

    pub fn node(&self) -> &Node {
        &self.0.node
    }

    /// Width of a bit-vector term.
    ///
    /// Panics for booleans and arrays.
    pub fn width(&self) -> u32 {
        match self.sort() {
            Sort::BitVec(width) => width,
            sort => panic!("expected a bit-vector, found {:?}", sort),
        }
    }

    pub fn is_bool(&self) -> bool {
        self.sort() == Sort::Bool
    }

    pub fn name(&self) -> Option<&str> {
        match self.node() {
            Node::Symbol { name } => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<u64> {
        match self.node() {
            Node::Constant { value, .. } => Some(*value),
            _ => None,
        }
    }

    fn unary(&self, op: UnaryOp) -> Self {
        match op {
            UnaryOp::Not => assert!(self.is_bool(), "not expects a boolean"),
            _ => assert!(
                matches!(self.sort(), Sort::BitVec(_)),
                "{:?} expects a bit-vector",
                op
            ),
        }

        Self::with_sort(
            self.sort(),
            Node::Unary {
                op,
                value: self.clone(),
            },
        )
    }

    fn binary(&self, op: BinaryOp, other: &Expr) -> Self {
        let sort = if op.is_boolean() {
            assert!(
                self.is_bool() && other.is_bool(),
                "{:?} expects boolean operands",
                op
            );
            Sort::Bool
        } else if op == BinaryOp::Eq {
            assert_eq!(
                self.sort(),
                other.sort(),
                "equality expects operands of the same sort"
            );
            Sort::Bool
        } else {
            assert_eq!(
                self.width(),
                other.width(),
                "{:?} expects operands of equal width",
                op
            );
            if op.is_predicate() {
                Sort::Bool
            } else {
                self.sort()
            }
        };

        Self::with_sort(
            sort,
            Node::Binary {
                op,
                left: self.clone(),
                right: other.clone(),
            },
        )
    }

    pub fn bvadd(&self, other: &Expr) -> Self {
        self.binary(BinaryOp::BvAdd, other)
    }

    pub fn bvsub(&self, other: &Expr) -> Self {
        self.binary(BinaryOp::BvSub, other)
    }

    pub fn bvmul(&self, other: &Expr) -> Self {
        self.binary(BinaryOp::BvMul, other)
    }

    pub fn bvudiv(&self, other: &Expr) -> Self {
        self.binary(BinaryOp::BvUdiv, other)
    }

    pub fn bvurem(&self, other: &Expr) -> Self {
        self.binary(BinaryOp::BvUrem, other)
    }

    pub fn bvsdiv(&self, other: &Expr) -> Self {
        self.binary(BinaryOp::BvSdiv, other)
    }

    pub fn bvsrem(&self, other: &Expr) -> Self {
        self.binary(BinaryOp::BvSrem, other)
    }

    pub fn bvand(&self, other: &Expr) -> Self {
        self.binary(BinaryOp::BvAnd, other)
    }

    pub fn bvor(&self, other: &Expr) -> Self {
        self.binary(BinaryOp::BvOr, other)
    }

    pub fn bvxor(&self, other: &Expr) -> Self {
        self.binary(BinaryOp::BvXor, other)
    }

    pub fn bvshl(&self, other: &Expr) -> Self {
        self.binary(BinaryOp::BvShl, other)
    }

    pub fn bvlshr(&self, other: &Expr) -> Self {
        self.binary(BinaryOp::BvLshr, other)
    }

    pub fn bvnot(&self) -> Self {
        self.unary(UnaryOp::BvNot)
    }

    pub fn bvneg(&self) -> Self {
        self.unary(UnaryOp::BvNeg)
    }

    /// Equality of two terms of the same sort.
    pub fn _eq(&self, other: &Expr) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    /// Equality against a constant of the same width.
    pub fn eq_value(&self, value: u64) -> Self {
        self._eq(&Expr::constant(value, self.width()))
    }

    pub fn ult(&self, other: &Expr) -> Self {
        self.binary(BinaryOp::Ult, other)
    }

    pub fn slt(&self, other: &Expr) -> Self {
        self.binary(BinaryOp::Slt, other)
    }

    pub fn and(&self, other: &Expr) -> Self {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(&self, other: &Expr) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    pub fn not(&self) -> Self {
        self.unary(UnaryOp::Not)
    }

    /// Bits `[offset, offset + width)` of a bit-vector.
    pub fn extract(&self, offset: u32, width: u32) -> Self {
        assert!(
            width > 0 && offset + width <= self.width(),
            "cannot extract bits {}..{} from a {} bit value",
            offset,
            offset + width,
            self.width()
        );

        if offset == 0 && width == self.width() {
            return self.clone();
        }

        Self::with_sort(
            Sort::BitVec(width),
            Node::Extract {
                value: self.clone(),
                offset,
                width,
            },
        )
    }

    /// Concatenation with the first part ending up in the most significant bits.
    pub fn concat(parts: &[Expr]) -> Self {
        assert!(!parts.is_empty(), "cannot concatenate nothing");

        if parts.len() == 1 {
            return parts[0].clone();
        }

        let width = parts.iter().map(|p| p.width()).sum();

        Self::with_sort(Sort::BitVec(width), Node::Concat(parts.to_vec()))
    }

    pub fn zero_ext(&self, by: u32) -> Self {
        if by == 0 {
            return self.clone();
        }

        if let Some(value) = self.as_constant() {
            if self.width() + by <= 64 {
                return Expr::constant(value, self.width() + by);
            }
        }

        Self::with_sort(
            Sort::BitVec(self.width() + by),
            Node::ZeroExt {
                value: self.clone(),
                by,
            },
        )
    }

    pub fn sign_ext(&self, by: u32) -> Self {
        if by == 0 {
            return self.clone();
        }

        Self::with_sort(
            Sort::BitVec(self.width() + by),
            Node::SignExt {
                value: self.clone(),
                by,
            },
        )
    }

    /// Zero-extends or truncates to `width` bits.
    pub fn fit(&self, width: u32) -> Self {
        let current = self.width();

        if current < width {
            self.zero_ext(width - current)
        } else {
            self.extract(0, width)
        }
    }

    /// Sign-extends or truncates to `width` bits.
    pub fn sign_fit(&self, width: u32) -> Self {
        let current = self.width();

        if current < width {
            self.sign_ext(width - current)
        } else {
            self.extract(0, width)
        }
    }

    pub fn ite(cond: &Expr, then: &Expr, otherwise: &Expr) -> Self {
        assert!(cond.is_bool(), "ite expects a boolean condition");
        assert_eq!(
            then.sort(),
            otherwise.sort(),
            "ite branches must have the same sort"
        );

        Self::with_sort(
            then.sort(),
            Node::Ite {
                cond: cond.clone(),
                then: then.clone(),
                otherwise: otherwise.clone(),
            },
        )
    }

    fn array_sorts(&self) -> (u32, u32) {
        match self.sort() {
            Sort::Array { index, element } => (index, element),
            sort => panic!("expected an array, found {:?}", sort),
        }
    }

    pub fn select(&self, index: &Expr) -> Self {
        let (index_width, element) = self.array_sorts();

        assert_eq!(index.width(), index_width, "array index has the wrong width");

        Self::with_sort(
            Sort::BitVec(element),
            Node::Select {
                array: self.clone(),
                index: index.clone(),
            },
        )
    }

    pub fn store(&self, index: &Expr, value: &Expr) -> Self {
        let (index_width, element) = self.array_sorts();

        assert_eq!(index.width(), index_width, "array index has the wrong width");
        assert_eq!(value.width(), element, "array element has the wrong width");

        Self::with_sort(
            self.sort(),
            Node::Store {
                array: self.clone(),
                index: index.clone(),
                value: value.clone(),
            },
        )
    }

    /// Collects every free symbol of this term, keyed by name.
    pub fn symbols(&self, into: &mut BTreeMap<String, Expr>) {
        match self.node() {
            Node::Symbol { name } => {
                if !into.contains_key(name) {
                    into.insert(name.clone(), self.clone());
                }
            }
            Node::Constant { .. } | Node::Boolean(_) => {}
            Node::Unary { value, .. }
            | Node::Extract { value, .. }
            | Node::ZeroExt { value, .. }
            | Node::SignExt { value, .. } => value.symbols(into),
            Node::Binary { left, right, .. } => {
                left.symbols(into);
                right.symbols(into);
            }
            Node::Concat(parts) => parts.iter().for_each(|p| p.symbols(into)),
            Node::Ite {
                cond,
                then,
                otherwise,
            } => {
                cond.symbols(into);
                then.symbols(into);
                otherwise.symbols(into);
            }
            Node::Select { array, index } => {
                array.symbols(into);
                index.symbols(into);
            }
            Node::Store {
                array,
                index,
                value,
            } => {
                array.symbols(into);
                index.symbols(into);
                value.symbols(into);
            }
        }
    }
}
