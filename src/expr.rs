// expr.rs -- Expression trees for function-node bodies.
//
// An `Expr` is a scalar formula over output coordinates, reduction
// domain coordinates, buffer reads and calls to earlier function
// nodes. Operator overloads on `Expr` let pipeline builders read close
// to the algebra they implement:
//
//   let up = 0.25f32 * f.at([x() / 2 - 1 + 2 * (x() % 2), y()])
//          + 0.75f32 * f.at([x() / 2, y()]);
//
// Expressions are plain trees; sharing a subexpression means cloning
// it. Builders keep shared work in separate function nodes instead
// (the graph memoizes per node, not per expression).

use crate::graph::{FuncId, SourceId};
use crate::value::{DType, Value};

/// Binary operators. `Lt`/`Gt` produce i32 0/1; the bit operators are
/// integer-only (checked during plan-time type inference).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Min,
    Max,
    Pow,
    And,
    Or,
    Shl,
    Shr,
    Lt,
    Gt,
}

/// Unary operators. `Powi(n)` raises to an integer power by
/// exponentiation-by-squaring, so `powi(256)` performs exactly eight
/// successive squarings. The night filter depends on this exact
/// rounding behavior for its photometric falloff approximation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Exp,
    Sqrt,
    Powi(u32),
}

/// A scalar expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal constant.
    Const(Value),
    /// Output coordinate of the enclosing function (axis 0 = x).
    Coord(usize),
    /// Reduction-domain coordinate (only inside a reduction update).
    DomainCoord(usize),
    /// Accumulator of the enclosing reduction update.
    Accum,
    /// Read a source buffer at computed integer coordinates.
    Read(SourceId, Vec<Expr>),
    /// Call an earlier function node at computed integer coordinates.
    Call(FuncId, Vec<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Unary(UnOp, Box<Expr>),
    /// `Select(cond, if_true, if_false)`; cond is truthy if nonzero.
    Select(Box<Expr>, Box<Expr>, Box<Expr>),
    Cast(DType, Box<Expr>),
}

impl Expr {
    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn min(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(BinOp::Min, self, other.into())
    }

    pub fn max(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(BinOp::Max, self, other.into())
    }

    /// Clamp into `[lo, hi]` via max-then-min.
    pub fn clamp(self, lo: impl Into<Expr>, hi: impl Into<Expr>) -> Expr {
        self.max(lo.into()).min(hi.into())
    }

    pub fn lt(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(BinOp::Lt, self, other.into())
    }

    pub fn gt(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(BinOp::Gt, self, other.into())
    }

    pub fn exp(self) -> Expr {
        Expr::Unary(UnOp::Exp, Box::new(self))
    }

    pub fn sqrt(self) -> Expr {
        Expr::Unary(UnOp::Sqrt, Box::new(self))
    }

    /// Integer power by repeated squaring (see `UnOp::Powi`).
    pub fn powi(self, n: u32) -> Expr {
        Expr::Unary(UnOp::Powi(n), Box::new(self))
    }

    pub fn pow(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(BinOp::Pow, self, other.into())
    }

    pub fn cast(self, dtype: DType) -> Expr {
        Expr::Cast(dtype, Box::new(self))
    }
}

/// Output x coordinate (axis 0).
pub fn x() -> Expr {
    Expr::Coord(0)
}

/// Output y coordinate (axis 1).
pub fn y() -> Expr {
    Expr::Coord(1)
}

/// Reduction-domain x coordinate.
pub fn rx() -> Expr {
    Expr::DomainCoord(0)
}

/// Reduction-domain y coordinate.
pub fn ry() -> Expr {
    Expr::DomainCoord(1)
}

/// The reduction accumulator.
pub fn acc() -> Expr {
    Expr::Accum
}

/// Literal constant of any supported scalar type.
pub fn lit(v: impl Into<Value>) -> Expr {
    Expr::Const(v.into())
}

/// `select(cond, if_true, if_false)`.
pub fn select(cond: Expr, if_true: impl Into<Expr>, if_false: impl Into<Expr>) -> Expr {
    Expr::Select(
        Box::new(cond),
        Box::new(if_true.into()),
        Box::new(if_false.into()),
    )
}

impl From<f32> for Expr {
    fn from(v: f32) -> Expr {
        Expr::Const(Value::F32(v))
    }
}

impl From<i32> for Expr {
    fn from(v: i32) -> Expr {
        Expr::Const(Value::I32(v))
    }
}

impl From<u32> for Expr {
    fn from(v: u32) -> Expr {
        Expr::Const(Value::U32(v))
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Expr {
        Expr::Const(v)
    }
}

// Operator sugar: Expr op anything-convertible, and scalar op Expr for
// the common literal-on-the-left spellings (0.25f32 * e, 2 * e, ...).

macro_rules! expr_binop {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<R: Into<Expr>> std::ops::$trait<R> for Expr {
            type Output = Expr;
            fn $method(self, rhs: R) -> Expr {
                Expr::binary($op, self, rhs.into())
            }
        }
    };
}

expr_binop!(Add, add, BinOp::Add);
expr_binop!(Sub, sub, BinOp::Sub);
expr_binop!(Mul, mul, BinOp::Mul);
expr_binop!(Div, div, BinOp::Div);
expr_binop!(Rem, rem, BinOp::Rem);
expr_binop!(BitAnd, bitand, BinOp::And);
expr_binop!(BitOr, bitor, BinOp::Or);
expr_binop!(Shl, shl, BinOp::Shl);
expr_binop!(Shr, shr, BinOp::Shr);

macro_rules! scalar_lhs_binop {
    ($scalar:ty) => {
        impl std::ops::Add<Expr> for $scalar {
            type Output = Expr;
            fn add(self, rhs: Expr) -> Expr {
                Expr::binary(BinOp::Add, self.into(), rhs)
            }
        }
        impl std::ops::Sub<Expr> for $scalar {
            type Output = Expr;
            fn sub(self, rhs: Expr) -> Expr {
                Expr::binary(BinOp::Sub, self.into(), rhs)
            }
        }
        impl std::ops::Mul<Expr> for $scalar {
            type Output = Expr;
            fn mul(self, rhs: Expr) -> Expr {
                Expr::binary(BinOp::Mul, self.into(), rhs)
            }
        }
        impl std::ops::Div<Expr> for $scalar {
            type Output = Expr;
            fn div(self, rhs: Expr) -> Expr {
                Expr::binary(BinOp::Div, self.into(), rhs)
            }
        }
    };
}

scalar_lhs_binop!(f32);
scalar_lhs_binop!(i32);
scalar_lhs_binop!(u32);

impl FuncId {
    /// Call this function node at computed coordinates: `f.at([x(), y()])`.
    pub fn at<const N: usize>(self, coords: [Expr; N]) -> Expr {
        Expr::Call(self, coords.into_iter().collect())
    }
}

impl SourceId {
    /// Read this source buffer at computed coordinates: `k.read([rx(), ry()])`.
    pub fn read<const N: usize>(self, coords: [Expr; N]) -> Expr {
        Expr::Read(self, coords.into_iter().collect())
    }
}

impl std::ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Unary(UnOp::Neg, Box::new(self))
    }
}
