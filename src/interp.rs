// interp.rs -- reference backend: a memoized host interpreter.
//
// Functions are evaluated demand-driven, one output coordinate at a
// time, with a per-function memo table so shared producers are
// computed once per coordinate no matter how many consumers read them.
// Reductions fold their domain with axis 0 innermost.

use std::collections::HashMap;

use crate::buffer::BufMut;
use crate::expr::{BinOp, Expr, UnOp};
use crate::graph::{FuncBody, FuncId, Graph};
use crate::pipeline::{
    check_realization, resolve_plan, Bindings, BoundsHint, ExecutablePlan, ExecutionBackend,
    RealizeError,
};
use crate::value::Value;

/// Executes graphs on the CPU. Stateless; one instance serves any
/// number of pipelines.
#[derive(Default)]
pub struct HostBackend;

impl HostBackend {
    pub fn new() -> Self {
        HostBackend
    }
}

impl ExecutionBackend for HostBackend {
    fn plan(
        &self,
        graph: &Graph,
        outputs: &[FuncId],
        hints: &[BoundsHint],
    ) -> Result<ExecutablePlan, RealizeError> {
        resolve_plan(graph, outputs, hints)
    }

    fn realize(
        &self,
        graph: &Graph,
        plan: &ExecutablePlan,
        bindings: &Bindings<'_>,
        outputs: &mut [BufMut<'_>],
    ) -> Result<(), RealizeError> {
        check_realization(graph, plan, bindings, outputs)?;
        let mut ev = Evaluator::new(graph, plan, bindings);
        for ((buf, &func), extents) in outputs
            .iter_mut()
            .zip(&plan.outputs)
            .zip(&plan.output_extents)
        {
            ev.fill(func, extents, buf)?;
        }
        Ok(())
    }

    fn has_accelerator(&self) -> bool {
        false
    }
}

struct Evaluator<'a> {
    graph: &'a Graph,
    plan: &'a ExecutablePlan,
    bindings: &'a Bindings<'a>,
    /// Per-function memo, keyed by output coordinates (unused axes
    /// pinned to 0).
    memo: Vec<HashMap<[i64; 2], Value>>,
}

/// Evaluation context for one expression walk.
struct Ctx {
    coords: [i64; 2],
    dom: [i64; 2],
    accum: Option<Value>,
}

impl<'a> Evaluator<'a> {
    fn new(graph: &'a Graph, plan: &'a ExecutablePlan, bindings: &'a Bindings<'a>) -> Self {
        Self {
            graph,
            plan,
            bindings,
            memo: vec![HashMap::new(); graph.num_funcs()],
        }
    }

    fn fill(
        &mut self,
        func: FuncId,
        extents: &[usize],
        buf: &mut BufMut<'_>,
    ) -> Result<(), RealizeError> {
        match extents.len() {
            0 => {
                let v = self.eval_func(func, [0, 0])?;
                buf.put_flat(0, v);
            }
            1 => {
                for xx in 0..extents[0] {
                    let v = self.eval_func(func, [xx as i64, 0])?;
                    buf.put_flat(xx, v);
                }
            }
            2 => {
                let w = extents[0];
                for yy in 0..extents[1] {
                    for xx in 0..w {
                        let v = self.eval_func(func, [xx as i64, yy as i64])?;
                        buf.put_flat(yy * w + xx, v);
                    }
                }
            }
            _ => {
                return Err(RealizeError::OutputMismatch(format!(
                    "rank {} outputs are unsupported",
                    extents.len()
                )))
            }
        }
        Ok(())
    }

    fn eval_func(&mut self, func: FuncId, coords: [i64; 2]) -> Result<Value, RealizeError> {
        if let Some(v) = self.memo[func.0].get(&coords) {
            return Ok(*v);
        }
        let node = self.graph.func(func);
        let raw = match &node.body {
            FuncBody::Pure(e) => {
                let ctx = Ctx {
                    coords,
                    dom: [0, 0],
                    accum: None,
                };
                self.eval_expr(e, &ctx, &node.name)?
            }
            FuncBody::Reduce { init, update, domain } => {
                let ctx = Ctx {
                    coords,
                    dom: [0, 0],
                    accum: None,
                };
                let mut acc = self.eval_expr(init, &ctx, &node.name)?;
                let ranges = domain.ranges();
                match ranges.len() {
                    1 => {
                        for dx in ranges[0].clone() {
                            let ctx = Ctx {
                                coords,
                                dom: [dx, 0],
                                accum: Some(acc),
                            };
                            acc = self.eval_expr(update, &ctx, &node.name)?;
                        }
                    }
                    2 => {
                        for dy in ranges[1].clone() {
                            for dx in ranges[0].clone() {
                                let ctx = Ctx {
                                    coords,
                                    dom: [dx, dy],
                                    accum: Some(acc),
                                };
                                acc = self.eval_expr(update, &ctx, &node.name)?;
                            }
                        }
                    }
                    rank => {
                        return Err(RealizeError::Type(format!(
                            "reduction '{}' has unsupported domain rank {rank}",
                            node.name
                        )))
                    }
                }
                acc
            }
        };
        // Functions have one element type across all coordinates.
        let v = match self.plan.dtype_of(func) {
            Some(dt) => raw.cast(dt),
            None => raw,
        };
        self.memo[func.0].insert(coords, v);
        Ok(v)
    }

    fn eval_expr(&mut self, e: &Expr, ctx: &Ctx, name: &str) -> Result<Value, RealizeError> {
        match e {
            Expr::Const(v) => Ok(*v),
            Expr::Coord(axis) => Ok(Value::I32(ctx.coords[*axis] as i32)),
            Expr::DomainCoord(axis) => Ok(Value::I32(ctx.dom[*axis] as i32)),
            Expr::Accum => ctx.accum.ok_or_else(|| {
                RealizeError::Type(format!("accumulator outside a reduction in '{name}'"))
            }),
            Expr::Read(src, args) => {
                let coords = self.eval_coords(args, ctx, name)?;
                let decl = self.graph.source(*src);
                let buf = self
                    .bindings
                    .get(*src)
                    .ok_or_else(|| RealizeError::UnboundSource(decl.name.clone()))?;
                buf.value_at(&coords)
                    .ok_or_else(|| RealizeError::OutOfBounds {
                        source: decl.name.clone(),
                        coords,
                    })
            }
            Expr::Call(f, args) => {
                let coords = self.eval_coords(args, ctx, name)?;
                let mut padded = [0i64; 2];
                padded[..coords.len()].copy_from_slice(&coords);
                self.eval_func(*f, padded)
            }
            Expr::Binary(op, lhs, rhs) => {
                let l = self.eval_expr(lhs, ctx, name)?;
                let r = self.eval_expr(rhs, ctx, name)?;
                apply_binop(*op, l, r, name)
            }
            Expr::Unary(op, operand) => {
                let v = self.eval_expr(operand, ctx, name)?;
                Ok(apply_unop(*op, v))
            }
            Expr::Select(cond, if_true, if_false) => {
                let c = self.eval_expr(cond, ctx, name)?;
                if c.is_truthy() {
                    self.eval_expr(if_true, ctx, name)
                } else {
                    self.eval_expr(if_false, ctx, name)
                }
            }
            Expr::Cast(dtype, operand) => {
                let v = self.eval_expr(operand, ctx, name)?;
                Ok(v.cast(*dtype))
            }
        }
    }

    fn eval_coords(
        &mut self,
        args: &[Expr],
        ctx: &Ctx,
        name: &str,
    ) -> Result<Vec<i64>, RealizeError> {
        let mut out = Vec::with_capacity(args.len());
        for a in args {
            let v = self.eval_expr(a, ctx, name)?;
            let idx = v.as_index().ok_or_else(|| {
                RealizeError::Type(format!("non-integer coordinate in '{name}'"))
            })?;
            out.push(idx);
        }
        Ok(out)
    }
}

fn apply_binop(op: BinOp, l: Value, r: Value, name: &str) -> Result<Value, RealizeError> {
    let dt = l.dtype().promote(r.dtype());
    let l = l.cast(dt);
    let r = r.cast(dt);
    match (op, l, r) {
        (BinOp::Lt, _, _) => Ok(Value::I32(if value_lt(l, r) { 1 } else { 0 })),
        (BinOp::Gt, _, _) => Ok(Value::I32(if value_lt(r, l) { 1 } else { 0 })),
        (BinOp::Pow, _, _) => Ok(Value::F32(l.as_f32().powf(r.as_f32()))),

        (BinOp::Add, Value::F32(a), Value::F32(b)) => Ok(Value::F32(a + b)),
        (BinOp::Sub, Value::F32(a), Value::F32(b)) => Ok(Value::F32(a - b)),
        (BinOp::Mul, Value::F32(a), Value::F32(b)) => Ok(Value::F32(a * b)),
        (BinOp::Div, Value::F32(a), Value::F32(b)) => Ok(Value::F32(a / b)),
        (BinOp::Rem, Value::F32(a), Value::F32(b)) => Ok(Value::F32(a % b)),
        (BinOp::Min, Value::F32(a), Value::F32(b)) => Ok(Value::F32(a.min(b))),
        (BinOp::Max, Value::F32(a), Value::F32(b)) => Ok(Value::F32(a.max(b))),

        (BinOp::Add, Value::I32(a), Value::I32(b)) => Ok(Value::I32(a.wrapping_add(b))),
        (BinOp::Sub, Value::I32(a), Value::I32(b)) => Ok(Value::I32(a.wrapping_sub(b))),
        (BinOp::Mul, Value::I32(a), Value::I32(b)) => Ok(Value::I32(a.wrapping_mul(b))),
        (BinOp::Div, Value::I32(a), Value::I32(b)) => int_div(a, b, name).map(Value::I32),
        (BinOp::Rem, Value::I32(a), Value::I32(b)) => int_rem(a, b, name).map(Value::I32),
        (BinOp::Min, Value::I32(a), Value::I32(b)) => Ok(Value::I32(a.min(b))),
        (BinOp::Max, Value::I32(a), Value::I32(b)) => Ok(Value::I32(a.max(b))),
        (BinOp::And, Value::I32(a), Value::I32(b)) => Ok(Value::I32(a & b)),
        (BinOp::Or, Value::I32(a), Value::I32(b)) => Ok(Value::I32(a | b)),
        (BinOp::Shl, Value::I32(a), Value::I32(b)) => Ok(Value::I32(a.wrapping_shl(b as u32))),
        (BinOp::Shr, Value::I32(a), Value::I32(b)) => Ok(Value::I32(a.wrapping_shr(b as u32))),

        (BinOp::Add, Value::U32(a), Value::U32(b)) => Ok(Value::U32(a.wrapping_add(b))),
        (BinOp::Sub, Value::U32(a), Value::U32(b)) => Ok(Value::U32(a.wrapping_sub(b))),
        (BinOp::Mul, Value::U32(a), Value::U32(b)) => Ok(Value::U32(a.wrapping_mul(b))),
        (BinOp::Div, Value::U32(a), Value::U32(b)) => {
            if b == 0 {
                Err(RealizeError::DivideByZero { func: name.to_string() })
            } else {
                Ok(Value::U32(a / b))
            }
        }
        (BinOp::Rem, Value::U32(a), Value::U32(b)) => {
            if b == 0 {
                Err(RealizeError::DivideByZero { func: name.to_string() })
            } else {
                Ok(Value::U32(a % b))
            }
        }
        (BinOp::Min, Value::U32(a), Value::U32(b)) => Ok(Value::U32(a.min(b))),
        (BinOp::Max, Value::U32(a), Value::U32(b)) => Ok(Value::U32(a.max(b))),
        (BinOp::And, Value::U32(a), Value::U32(b)) => Ok(Value::U32(a & b)),
        (BinOp::Or, Value::U32(a), Value::U32(b)) => Ok(Value::U32(a | b)),
        (BinOp::Shl, Value::U32(a), Value::U32(b)) => Ok(Value::U32(a.wrapping_shl(b))),
        (BinOp::Shr, Value::U32(a), Value::U32(b)) => Ok(Value::U32(a.wrapping_shr(b))),

        (BinOp::Add, Value::U8(a), Value::U8(b)) => Ok(Value::U8(a.wrapping_add(b))),
        (BinOp::Sub, Value::U8(a), Value::U8(b)) => Ok(Value::U8(a.wrapping_sub(b))),
        (BinOp::Mul, Value::U8(a), Value::U8(b)) => Ok(Value::U8(a.wrapping_mul(b))),
        (BinOp::Div, Value::U8(a), Value::U8(b)) => {
            if b == 0 {
                Err(RealizeError::DivideByZero { func: name.to_string() })
            } else {
                Ok(Value::U8(a / b))
            }
        }
        (BinOp::Rem, Value::U8(a), Value::U8(b)) => {
            if b == 0 {
                Err(RealizeError::DivideByZero { func: name.to_string() })
            } else {
                Ok(Value::U8(a % b))
            }
        }
        (BinOp::Min, Value::U8(a), Value::U8(b)) => Ok(Value::U8(a.min(b))),
        (BinOp::Max, Value::U8(a), Value::U8(b)) => Ok(Value::U8(a.max(b))),
        (BinOp::And, Value::U8(a), Value::U8(b)) => Ok(Value::U8(a & b)),
        (BinOp::Or, Value::U8(a), Value::U8(b)) => Ok(Value::U8(a | b)),
        (BinOp::Shl, Value::U8(a), Value::U8(b)) => Ok(Value::U8(a.wrapping_shl(b as u32))),
        (BinOp::Shr, Value::U8(a), Value::U8(b)) => Ok(Value::U8(a.wrapping_shr(b as u32))),

        _ => Err(RealizeError::Type(format!(
            "{op:?} on {:?} operands in '{name}'",
            dt
        ))),
    }
}

fn value_lt(l: Value, r: Value) -> bool {
    match (l, r) {
        (Value::F32(a), Value::F32(b)) => a < b,
        (Value::I32(a), Value::I32(b)) => a < b,
        (Value::U32(a), Value::U32(b)) => a < b,
        (Value::U8(a), Value::U8(b)) => a < b,
        // Operands were cast to a common type already.
        _ => false,
    }
}

fn int_div(a: i32, b: i32, name: &str) -> Result<i32, RealizeError> {
    if b == 0 {
        Err(RealizeError::DivideByZero { func: name.to_string() })
    } else {
        Ok(a.wrapping_div(b))
    }
}

fn int_rem(a: i32, b: i32, name: &str) -> Result<i32, RealizeError> {
    if b == 0 {
        Err(RealizeError::DivideByZero { func: name.to_string() })
    } else {
        Ok(a.wrapping_rem(b))
    }
}

fn apply_unop(op: UnOp, v: Value) -> Value {
    match op {
        UnOp::Neg => match v {
            Value::F32(a) => Value::F32(-a),
            Value::I32(a) => Value::I32(a.wrapping_neg()),
            Value::U32(a) => Value::U32(a.wrapping_neg()),
            Value::U8(a) => Value::U8(a.wrapping_neg()),
        },
        UnOp::Exp => Value::F32(v.as_f32().exp()),
        UnOp::Sqrt => Value::F32(v.as_f32().sqrt()),
        UnOp::Powi(n) => Value::F32(powi_by_squaring(v.as_f32(), n)),
    }
}

/// Exponentiation by squaring. `powi_by_squaring(b, 256)` performs
/// exactly eight successive squarings of `b`.
fn powi_by_squaring(base: f32, mut n: u32) -> f32 {
    let mut result = 1.0f32;
    let mut b = base;
    while n > 0 {
        if n & 1 == 1 {
            result *= b;
        }
        n >>= 1;
        if n > 0 {
            b *= b;
        }
    }
    result
}
