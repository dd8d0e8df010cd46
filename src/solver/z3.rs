use super::{ensure_boolean, Declarations, SatResult, Solver, SolverError};
use crate::smt::{BinaryOp, Expr, Node, Sort, UnaryOp};
use std::collections::{BTreeMap, HashMap};
use z3_solver::{
    ast::{Array, Ast, Bool, Dynamic, BV},
    Context, Model, SatResult as Z3SatResult, Solver as NativeSolver, Sort as Z3Sort,
};

/// In-process Z3 backend.
///
/// The context is owned by the caller, a solver timeout has to be configured on its `Config`.
pub struct Z3Solver<'ctx> {
    context: &'ctx Context,
    solver: NativeSolver<'ctx>,
    mapping: HashMap<Expr, Dynamic<'ctx>>,
    declarations: Declarations,
    model: Option<Model<'ctx>>,
}

impl<'ctx> Z3Solver<'ctx> {
    pub fn new(context: &'ctx Context) -> Self {
        Self {
            context,
            solver: NativeSolver::new(context),
            mapping: HashMap::new(),
            declarations: Declarations::default(),
            model: None,
        }
    }

    fn visit(&mut self, expr: &Expr) -> Dynamic<'ctx> {
        if let Some(translated) = self.mapping.get(expr) {
            return translated.clone();
        }

        let translated = self.translate(expr);
        self.mapping.insert(expr.clone(), translated.clone());
        translated
    }

    fn visit_bv(&mut self, expr: &Expr) -> BV<'ctx> {
        self.visit(expr).as_bv().expect("bv")
    }

    fn visit_bool(&mut self, expr: &Expr) -> Bool<'ctx> {
        self.visit(expr).as_bool().expect("bool")
    }

    fn visit_array(&mut self, expr: &Expr) -> Array<'ctx> {
        self.visit(expr).as_array().expect("array")
    }

    fn constant(&self, value: u64, width: u32) -> BV<'ctx> {
        if width > 64 {
            BV::from_u64(self.context, value, 64).zero_ext(width - 64)
        } else {
            BV::from_u64(self.context, value, width)
        }
    }

    #[rustfmt::skip]
    fn translate(&mut self, expr: &Expr) -> Dynamic<'ctx> {
        match expr.node() {
            Node::Constant { value, width } => self.constant(*value, *width).into(),
            Node::Boolean(value) => Bool::from_bool(self.context, *value).into(),
            Node::Symbol { name } => match expr.sort() {
                Sort::Bool => Bool::new_const(self.context, name.as_str()).into(),
                Sort::BitVec(width) => BV::new_const(self.context, name.as_str(), width).into(),
                Sort::Array { index, element } => Array::new_const(
                    self.context,
                    name.as_str(),
                    &Z3Sort::bitvector(self.context, index),
                    &Z3Sort::bitvector(self.context, element),
                )
                .into(),
            },
            Node::Unary { op: UnaryOp::Not, value } => self.visit_bool(value).not().into(),
            Node::Unary { op: UnaryOp::BvNot, value } => self.visit_bv(value).bvnot().into(),
            Node::Unary { op: UnaryOp::BvNeg, value } => self.visit_bv(value).bvneg().into(),
            Node::Binary { op: BinaryOp::And, left, right } => {
                let z3_left = self.visit_bool(left);
                let z3_right = self.visit_bool(right);
                Bool::and(self.context, &[&z3_left, &z3_right]).into()
            }
            Node::Binary { op: BinaryOp::Or, left, right } => {
                let z3_left = self.visit_bool(left);
                let z3_right = self.visit_bool(right);
                Bool::or(self.context, &[&z3_left, &z3_right]).into()
            }
            Node::Binary { op: BinaryOp::Eq, left, right } => {
                let z3_left = self.visit(left);
                let z3_right = self.visit(right);
                z3_left._eq(&z3_right).into()
            }
            Node::Binary { op, left, right } => {
                let z3_left = self.visit_bv(left);
                let z3_right = self.visit_bv(right);
                match op {
                    BinaryOp::BvAdd => z3_left.bvadd(&z3_right).into(),
                    BinaryOp::BvSub => z3_left.bvsub(&z3_right).into(),
                    BinaryOp::BvMul => z3_left.bvmul(&z3_right).into(),
                    BinaryOp::BvUdiv => z3_left.bvudiv(&z3_right).into(),
                    BinaryOp::BvUrem => z3_left.bvurem(&z3_right).into(),
                    BinaryOp::BvSdiv => z3_left.bvsdiv(&z3_right).into(),
                    BinaryOp::BvSrem => z3_left.bvsrem(&z3_right).into(),
                    BinaryOp::BvAnd => z3_left.bvand(&z3_right).into(),
                    BinaryOp::BvOr => z3_left.bvor(&z3_right).into(),
                    BinaryOp::BvXor => z3_left.bvxor(&z3_right).into(),
                    BinaryOp::BvShl => z3_left.bvshl(&z3_right).into(),
                    BinaryOp::BvLshr => z3_left.bvlshr(&z3_right).into(),
                    BinaryOp::Ult => z3_left.bvult(&z3_right).into(),
                    BinaryOp::Slt => z3_left.bvslt(&z3_right).into(),
                    BinaryOp::Eq | BinaryOp::And | BinaryOp::Or => unreachable!(),
                }
            }
            Node::Extract { value, offset, width } => {
                self.visit_bv(value).extract(offset + width - 1, *offset).into()
            }
            Node::Concat(parts) => {
                let mut parts = parts.iter();
                let first = parts.next().expect("concat has parts");
                let mut result = self.visit_bv(first);
                for part in parts {
                    let z3_part = self.visit_bv(part);
                    result = result.concat(&z3_part);
                }
                result.into()
            }
            Node::ZeroExt { value, by } => self.visit_bv(value).zero_ext(*by).into(),
            Node::SignExt { value, by } => self.visit_bv(value).sign_ext(*by).into(),
            Node::Ite { cond, then, otherwise } => {
                let z3_cond = self.visit_bool(cond);
                let z3_then = self.visit(then);
                let z3_otherwise = self.visit(otherwise);
                z3_cond.ite(&z3_then, &z3_otherwise)
            }
            Node::Select { array, index } => {
                let z3_array = self.visit_array(array);
                let z3_index = self.visit_bv(index);
                z3_array.select(&z3_index)
            }
            Node::Store { array, index, value } => {
                let z3_array = self.visit_array(array);
                let z3_index = self.visit_bv(index);
                let z3_value = self.visit_bv(value);
                z3_array.store(&z3_index, &z3_value).into()
            }
        }
    }
}

impl<'ctx> Solver for Z3Solver<'ctx> {
    fn name() -> &'static str {
        "Z3"
    }

    fn add(&mut self, assertion: &Expr) -> Result<(), SolverError> {
        ensure_boolean(assertion)?;

        self.declarations.declare(assertion)?;

        let z3_bool = self.visit_bool(assertion);
        self.solver.assert(&z3_bool);
        self.model = None;

        Ok(())
    }

    fn check_impl(&mut self) -> Result<SatResult, SolverError> {
        let result = match self.solver.check() {
            Z3SatResult::Sat => SatResult::Sat,
            Z3SatResult::Unsat => SatResult::Unsat,
            Z3SatResult::Unknown => SatResult::Unknown,
        };

        self.model = if result.is_sat() {
            self.solver.get_model()
        } else {
            None
        };

        Ok(result)
    }

    fn get_value(&mut self, expr: &Expr) -> Result<u64, SolverError> {
        if self.model.is_none() {
            return Err(SolverError::MissingModel);
        }

        self.declarations.declare(expr)?;

        let translated = self.visit(expr);
        let model = self.model.as_ref().ok_or(SolverError::MissingModel)?;

        match expr.sort() {
            Sort::Bool => {
                let z3_bool = translated.as_bool().expect("bool");
                model
                    .eval(&z3_bool, true)
                    .and_then(|b| b.as_bool())
                    .map(u64::from)
                    .ok_or_else(|| SolverError::Protocol(expr.to_string()))
            }
            Sort::BitVec(_) => {
                let z3_bv = translated.as_bv().expect("bv");
                model
                    .eval(&z3_bv, true)
                    .ok_or_else(|| SolverError::Protocol(expr.to_string()))?
                    .as_u64()
                    .ok_or_else(|| SolverError::ValueTooWide(expr.to_string()))
            }
            Sort::Array { .. } => Err(SolverError::Protocol(format!(
                "cannot read an array value: {}",
                expr
            ))),
        }
    }

    fn declarations(&self) -> &BTreeMap<String, Expr> {
        self.declarations.as_map()
    }

    fn reset(&mut self) -> Result<(), SolverError> {
        self.solver.reset();
        self.mapping.clear();
        self.declarations.clear();
        self.model = None;

        Ok(())
    }
}
