// pipeline.rs -- planning and realization of function graphs.
//
// A Pipeline pairs a graph with the functions to materialize. Planning
// resolves element types and checks the graph once; realization fills
// caller-provided buffers. A failed realization poisons the pipeline
// so stale partial results cannot be read back as if they were valid.

use crate::buffer::{BufMut, BufRef};
use crate::expr::{BinOp, Expr, UnOp};
use crate::graph::{FuncBody, FuncId, Graph, SourceId};
use crate::value::DType;

#[derive(Debug)]
pub enum RealizeError {
    /// A previous realization failed; the pipeline must be rebuilt.
    Poisoned,
    /// The graph mixes element types in a way that has no meaning.
    Type(String),
    /// A source read by the graph has no buffer bound to it.
    UnboundSource(String),
    /// A bound buffer does not match its source declaration.
    BindMismatch(String),
    /// An output buffer does not match the planned function.
    OutputMismatch(String),
    /// A raw (non-clamped) source read left the buffer.
    OutOfBounds { source: String, coords: Vec<i64> },
    /// Integer division or remainder by zero during evaluation.
    DivideByZero { func: String },
}

impl std::fmt::Display for RealizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RealizeError::Poisoned => {
                write!(f, "pipeline poisoned by an earlier failure")
            }
            RealizeError::Type(msg) => write!(f, "type error: {msg}"),
            RealizeError::UnboundSource(name) => {
                write!(f, "source '{name}' has no bound buffer")
            }
            RealizeError::BindMismatch(msg) => write!(f, "binding mismatch: {msg}"),
            RealizeError::OutputMismatch(msg) => write!(f, "output mismatch: {msg}"),
            RealizeError::OutOfBounds { source, coords } => {
                write!(f, "read of source '{source}' at {coords:?} is out of bounds")
            }
            RealizeError::DivideByZero { func } => {
                write!(f, "integer division by zero while evaluating '{func}'")
            }
        }
    }
}

impl std::error::Error for RealizeError {}

/// Requested extents for one output function.
#[derive(Debug, Clone)]
pub struct BoundsHint {
    pub func: FuncId,
    pub extents: Vec<usize>,
}

impl BoundsHint {
    pub fn new(func: FuncId, extents: &[usize]) -> Self {
        Self {
            func,
            extents: extents.to_vec(),
        }
    }
}

/// Buffers bound to graph sources for one realization.
#[derive(Default)]
pub struct Bindings<'a> {
    entries: Vec<Option<BufRef<'a>>>,
}

impl<'a> Bindings<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, src: SourceId, buf: impl Into<BufRef<'a>>) -> &mut Self {
        if self.entries.len() <= src.0 {
            self.entries.resize_with(src.0 + 1, || None);
        }
        self.entries[src.0] = Some(buf.into());
        self
    }

    pub fn get(&self, src: SourceId) -> Option<&BufRef<'a>> {
        self.entries.get(src.0).and_then(|e| e.as_ref())
    }
}

/// A checked, type-resolved form of a graph ready to execute.
#[derive(Debug)]
pub struct ExecutablePlan {
    pub(crate) outputs: Vec<FuncId>,
    pub(crate) output_extents: Vec<Vec<usize>>,
    /// Element type per function id; `None` for unreachable functions.
    pub(crate) dtypes: Vec<Option<DType>>,
    pub(crate) sources: Vec<SourceId>,
}

impl ExecutablePlan {
    pub fn dtype_of(&self, func: FuncId) -> Option<DType> {
        self.dtypes.get(func.0).copied().flatten()
    }
}

/// An engine that can plan and realize graphs.
pub trait ExecutionBackend {
    fn plan(
        &self,
        graph: &Graph,
        outputs: &[FuncId],
        hints: &[BoundsHint],
    ) -> Result<ExecutablePlan, RealizeError>;

    fn realize(
        &self,
        graph: &Graph,
        plan: &ExecutablePlan,
        bindings: &Bindings<'_>,
        outputs: &mut [BufMut<'_>],
    ) -> Result<(), RealizeError>;

    /// Whether this backend runs on a device separate from host memory.
    fn has_accelerator(&self) -> bool;
}

pub struct Pipeline {
    graph: Graph,
    outputs: Vec<FuncId>,
    hints: Vec<BoundsHint>,
    plan: Option<ExecutablePlan>,
    poisoned: bool,
}

impl Pipeline {
    pub fn new(graph: Graph, outputs: Vec<FuncId>) -> Self {
        Self {
            graph,
            outputs,
            hints: Vec::new(),
            plan: None,
            poisoned: false,
        }
    }

    pub fn with_bounds(mut self, func: FuncId, extents: &[usize]) -> Self {
        self.hints.push(BoundsHint::new(func, extents));
        self.plan = None;
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn outputs(&self) -> &[FuncId] {
        &self.outputs
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Plans (once) and realizes every output into `bufs`, in the same
    /// order as the pipeline's output list.
    pub fn realize(
        &mut self,
        backend: &impl ExecutionBackend,
        bindings: &Bindings<'_>,
        bufs: &mut [BufMut<'_>],
    ) -> Result<(), RealizeError> {
        if self.poisoned {
            return Err(RealizeError::Poisoned);
        }
        if self.plan.is_none() {
            self.plan = Some(backend.plan(&self.graph, &self.outputs, &self.hints)?);
        }
        let plan = match &self.plan {
            Some(p) => p,
            None => return Err(RealizeError::Poisoned),
        };
        match backend.realize(&self.graph, plan, bindings, bufs) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.poisoned = true;
                Err(e)
            }
        }
    }
}

/// Resolves the element type of every function reachable from
/// `outputs`, and collects the sources the graph reads.
pub(crate) fn resolve_plan(
    graph: &Graph,
    outputs: &[FuncId],
    hints: &[BoundsHint],
) -> Result<ExecutablePlan, RealizeError> {
    let mut dtypes: Vec<Option<DType>> = vec![None; graph.num_funcs()];
    let mut sources: Vec<SourceId> = Vec::new();
    let mut seen_sources = vec![false; graph.num_sources()];

    // Callees always have smaller ids than callers, so one pass in id
    // order covers every dependency before its user. Reachability is
    // marked first.
    let mut reachable = vec![false; graph.num_funcs()];
    let mut stack: Vec<FuncId> = outputs.to_vec();
    while let Some(f) = stack.pop() {
        if reachable[f.0] {
            continue;
        }
        reachable[f.0] = true;
        let node = graph.func(f);
        match &node.body {
            FuncBody::Pure(e) => collect_deps(e, &mut stack, &mut sources, &mut seen_sources),
            FuncBody::Reduce { init, update, .. } => {
                collect_deps(init, &mut stack, &mut sources, &mut seen_sources);
                collect_deps(update, &mut stack, &mut sources, &mut seen_sources);
            }
        }
    }

    for id in 0..graph.num_funcs() {
        if !reachable[id] {
            continue;
        }
        let f = FuncId(id);
        let node = graph.func(f);
        let dt = match &node.body {
            FuncBody::Pure(e) => expr_dtype(graph, &dtypes, e, None, &node.name)?,
            FuncBody::Reduce { init, update, .. } => {
                let init_dt = expr_dtype(graph, &dtypes, init, None, &node.name)?;
                expr_dtype(graph, &dtypes, update, Some(init_dt), &node.name)?
            }
        };
        dtypes[id] = Some(dt);
    }

    let mut output_extents = Vec::with_capacity(outputs.len());
    for &out in outputs {
        let node = graph.func(out);
        let hint = hints.iter().find(|h| h.func == out);
        let extents = match hint {
            Some(h) => {
                if h.extents.len() != node.arity {
                    return Err(RealizeError::OutputMismatch(format!(
                        "bounds for '{}' have rank {}, function has arity {}",
                        node.name,
                        h.extents.len(),
                        node.arity
                    )));
                }
                h.extents.clone()
            }
            None if node.arity == 0 => Vec::new(),
            None => {
                return Err(RealizeError::OutputMismatch(format!(
                    "output '{}' has no bounds",
                    node.name
                )))
            }
        };
        output_extents.push(extents);
    }

    Ok(ExecutablePlan {
        outputs: outputs.to_vec(),
        output_extents,
        dtypes,
        sources,
    })
}

fn collect_deps(
    e: &Expr,
    stack: &mut Vec<FuncId>,
    sources: &mut Vec<SourceId>,
    seen_sources: &mut [bool],
) {
    match e {
        Expr::Const(_) | Expr::Coord(_) | Expr::DomainCoord(_) | Expr::Accum => {}
        Expr::Read(src, args) => {
            if !seen_sources[src.0] {
                seen_sources[src.0] = true;
                sources.push(*src);
            }
            for a in args {
                collect_deps(a, stack, sources, seen_sources);
            }
        }
        Expr::Call(f, args) => {
            stack.push(*f);
            for a in args {
                collect_deps(a, stack, sources, seen_sources);
            }
        }
        Expr::Binary(_, lhs, rhs) => {
            collect_deps(lhs, stack, sources, seen_sources);
            collect_deps(rhs, stack, sources, seen_sources);
        }
        Expr::Unary(_, operand) => collect_deps(operand, stack, sources, seen_sources),
        Expr::Select(cond, if_true, if_false) => {
            collect_deps(cond, stack, sources, seen_sources);
            collect_deps(if_true, stack, sources, seen_sources);
            collect_deps(if_false, stack, sources, seen_sources);
        }
        Expr::Cast(_, operand) => collect_deps(operand, stack, sources, seen_sources),
    }
}

fn expr_dtype(
    graph: &Graph,
    dtypes: &[Option<DType>],
    e: &Expr,
    accum: Option<DType>,
    func_name: &str,
) -> Result<DType, RealizeError> {
    match e {
        Expr::Const(v) => Ok(v.dtype()),
        Expr::Coord(_) | Expr::DomainCoord(_) => Ok(DType::I32),
        Expr::Accum => accum.ok_or_else(|| {
            RealizeError::Type(format!("accumulator outside a reduction in '{func_name}'"))
        }),
        Expr::Read(src, args) => {
            for a in args {
                expr_dtype(graph, dtypes, a, accum, func_name)?;
            }
            Ok(graph.source(*src).dtype)
        }
        Expr::Call(f, args) => {
            for a in args {
                expr_dtype(graph, dtypes, a, accum, func_name)?;
            }
            dtypes.get(f.0).copied().flatten().ok_or_else(|| {
                RealizeError::Type(format!(
                    "call to unresolved function from '{func_name}'"
                ))
            })
        }
        Expr::Binary(op, lhs, rhs) => {
            let l = expr_dtype(graph, dtypes, lhs, accum, func_name)?;
            let r = expr_dtype(graph, dtypes, rhs, accum, func_name)?;
            match op {
                BinOp::Lt | BinOp::Gt => Ok(DType::I32),
                BinOp::And | BinOp::Or | BinOp::Shl | BinOp::Shr => {
                    if l == DType::F32 || r == DType::F32 {
                        Err(RealizeError::Type(format!(
                            "bitwise {op:?} on a float operand in '{func_name}'"
                        )))
                    } else {
                        Ok(l.promote(r))
                    }
                }
                BinOp::Pow => Ok(DType::F32),
                _ => Ok(l.promote(r)),
            }
        }
        Expr::Unary(op, operand) => {
            let d = expr_dtype(graph, dtypes, operand, accum, func_name)?;
            match op {
                UnOp::Neg => Ok(d),
                UnOp::Exp | UnOp::Sqrt | UnOp::Powi(_) => Ok(DType::F32),
            }
        }
        Expr::Select(cond, if_true, if_false) => {
            expr_dtype(graph, dtypes, cond, accum, func_name)?;
            let t = expr_dtype(graph, dtypes, if_true, accum, func_name)?;
            let f = expr_dtype(graph, dtypes, if_false, accum, func_name)?;
            Ok(t.promote(f))
        }
        Expr::Cast(dtype, operand) => {
            expr_dtype(graph, dtypes, operand, accum, func_name)?;
            Ok(*dtype)
        }
    }
}

/// Checks one realization's bindings and output buffers against the
/// plan. Backends call this before evaluating anything.
pub(crate) fn check_realization(
    graph: &Graph,
    plan: &ExecutablePlan,
    bindings: &Bindings<'_>,
    bufs: &[BufMut<'_>],
) -> Result<(), RealizeError> {
    for &src in &plan.sources {
        let decl = graph.source(src);
        let buf = bindings
            .get(src)
            .ok_or_else(|| RealizeError::UnboundSource(decl.name.clone()))?;
        if buf.dtype() != decl.dtype {
            return Err(RealizeError::BindMismatch(format!(
                "source '{}' declared {:?}, bound buffer is {:?}",
                decl.name,
                decl.dtype,
                buf.dtype()
            )));
        }
        if buf.shape() != decl.shape.as_slice() {
            return Err(RealizeError::BindMismatch(format!(
                "source '{}' declared shape {:?}, bound buffer has {:?}",
                decl.name,
                decl.shape,
                buf.shape()
            )));
        }
    }

    if bufs.len() != plan.outputs.len() {
        return Err(RealizeError::OutputMismatch(format!(
            "{} output buffers for {} planned outputs",
            bufs.len(),
            plan.outputs.len()
        )));
    }
    for ((buf, &func), extents) in bufs.iter().zip(&plan.outputs).zip(&plan.output_extents) {
        let node = graph.func(func);
        let dt = plan.dtype_of(func).ok_or_else(|| {
            RealizeError::Type(format!("output '{}' has no resolved type", node.name))
        })?;
        if buf.dtype() != dt {
            return Err(RealizeError::OutputMismatch(format!(
                "output '{}' computes {:?}, buffer is {:?}",
                node.name,
                dt,
                buf.dtype()
            )));
        }
        let shape = buf.shape();
        let want: &[usize] = extents;
        if node.arity == 0 {
            if !(shape.is_empty() || shape == [1]) {
                return Err(RealizeError::OutputMismatch(format!(
                    "scalar output '{}' needs a rank-0 buffer, got shape {:?}",
                    node.name, shape
                )));
            }
        } else if shape != want {
            return Err(RealizeError::OutputMismatch(format!(
                "output '{}' planned for {:?}, buffer has {:?}",
                node.name, want, shape
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use crate::expr::{lit, x, y};
    use crate::interp::HostBackend;

    #[test]
    fn plan_resolves_promoted_types() {
        let mut g = Graph::new();
        let a = g.define("a", 2, x() + y()).unwrap();
        let b = g.define("b", 2, a.at([x(), y()]) * lit(0.5f32)).unwrap();
        let plan = resolve_plan(&g, &[b], &[BoundsHint::new(b, &[4, 4])]).unwrap();
        assert_eq!(plan.dtype_of(a), Some(DType::I32));
        assert_eq!(plan.dtype_of(b), Some(DType::F32));
    }

    #[test]
    fn bitwise_on_float_is_rejected() {
        let mut g = Graph::new();
        let f = g.define("f", 2, lit(1.0f32) & lit(3u32)).unwrap();
        let err = resolve_plan(&g, &[f], &[BoundsHint::new(f, &[2, 2])]).unwrap_err();
        assert!(matches!(err, RealizeError::Type(_)));
    }

    #[test]
    fn missing_bounds_fail_planning() {
        let mut g = Graph::new();
        let f = g.define("f", 2, x()).unwrap();
        let err = resolve_plan(&g, &[f], &[]).unwrap_err();
        assert!(matches!(err, RealizeError::OutputMismatch(_)));
    }

    #[test]
    fn failed_realization_poisons_the_pipeline() {
        let mut g = Graph::new();
        let src = g.add_source("input", DType::F32, &[4, 4]);
        let f = g.define("f", 2, src.read([x(), y()])).unwrap();
        let mut pipe = Pipeline::new(g, vec![f]).with_bounds(f, &[4, 4]);
        let backend = HostBackend::new();

        // No binding for `input`.
        let bindings = Bindings::new();
        let mut out = Buffer::<f32>::new(&[4, 4]);
        let err = pipe
            .realize(&backend, &bindings, &mut [BufMut::from(&mut out)])
            .unwrap_err();
        assert!(matches!(err, RealizeError::UnboundSource(_)));

        // Even a corrected call is refused afterwards.
        let input = Buffer::<f32>::new(&[4, 4]);
        let mut bindings = Bindings::new();
        bindings.bind(src, &input);
        let err = pipe
            .realize(&backend, &bindings, &mut [BufMut::from(&mut out)])
            .unwrap_err();
        assert!(matches!(err, RealizeError::Poisoned));
    }
}
