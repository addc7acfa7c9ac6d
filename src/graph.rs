// graph.rs -- The function-node arena.
//
// A `Graph` owns two arenas: input source declarations (name, dtype,
// shape; the data arrives later through `Bindings`) and function
// nodes. A function node is a named, lazy, coordinate-indexed formula:
// either a direct expression, or an init+update accumulation over a
// `ReductionDomain`.
//
// Ids are append-only indices, so a node can only reference nodes and
// sources that already exist: forward and cyclic references are
// unrepresentable, and the arena order is already a valid topological
// schedule. Everything else that can go wrong structurally (dangling
// ids, wrong coordinate counts, domain/kernel shape mismatch, stray
// domain coordinates outside a reduction) is rejected here, at
// construction time.

use std::fmt;
use std::ops::Range;

use crate::expr::Expr;
use crate::value::DType;

/// Index of a function node in its `Graph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub(crate) usize);

/// Index of an input source declaration in its `Graph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub(crate) usize);

/// Declaration of an input buffer: the graph knows its name, element
/// type and shape; the data is bound per realize call.
#[derive(Debug, Clone)]
pub struct SourceDecl {
    pub name: String,
    pub dtype: DType,
    /// Extent per axis, axis 0 fastest-varying in memory.
    pub shape: Vec<usize>,
}

/// Fixed iteration window of a reduction: one half-open offset range
/// per axis. Accumulation iterates in row-major order, axis 0 fastest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReductionDomain {
    ranges: Vec<Range<i64>>,
}

impl ReductionDomain {
    pub fn new(ranges: Vec<Range<i64>>) -> Self {
        ReductionDomain { ranges }
    }

    /// Domain covering `0..extent` on each axis, the window of a
    /// kernel buffer with the given shape.
    pub fn of_extents(extents: &[usize]) -> Self {
        ReductionDomain {
            ranges: extents.iter().map(|&e| 0..e as i64).collect(),
        }
    }

    pub fn rank(&self) -> usize {
        self.ranges.len()
    }

    pub fn ranges(&self) -> &[Range<i64>] {
        &self.ranges
    }

    /// Number of points in the domain (0 if any axis is empty).
    pub fn len(&self) -> usize {
        self.ranges
            .iter()
            .map(|r| (r.end - r.start).max(0) as usize)
            .product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the domain exactly covers a kernel buffer of `shape`.
    pub fn matches_shape(&self, shape: &[usize]) -> bool {
        self.ranges.len() == shape.len()
            && self
                .ranges
                .iter()
                .zip(shape)
                .all(|(r, &e)| r.start == 0 && r.end == e as i64)
    }
}

/// Body of a function node.
#[derive(Debug, Clone)]
pub enum FuncBody {
    /// Direct formula over coordinates.
    Pure(Expr),
    /// Accumulation: start from `init`, then fold `update` over every
    /// domain point. `update` may reference `Accum` and the domain
    /// coordinates.
    Reduce {
        init: Expr,
        update: Expr,
        domain: ReductionDomain,
    },
}

/// A named lazy array-valued function. Immutable once built.
#[derive(Debug, Clone)]
pub struct FunctionNode {
    pub name: String,
    /// Number of output coordinates (0, 1 or 2).
    pub arity: usize,
    pub body: FuncBody,
}

/// Graph construction failure, fatal at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstructionError {
    /// Reference to a function id not (yet) in the arena.
    DanglingFunc { node: String, id: usize },
    /// Reference to a source id not in the arena.
    DanglingSource { node: String, id: usize },
    /// A call or read supplied the wrong number of coordinates.
    ArityMismatch {
        node: String,
        target: String,
        expected: usize,
        got: usize,
    },
    /// `Coord(axis)` beyond the node's own arity.
    CoordOutOfRange { node: String, axis: usize, arity: usize },
    /// Domain coordinate or accumulator used outside a reduction
    /// update, or beyond the domain rank.
    DomainMisuse { node: String, detail: String },
    /// A reduction domain does not match its kernel buffer's shape.
    DomainShapeMismatch {
        node: String,
        domain_rank: usize,
        kernel_shape: Vec<usize>,
    },
    /// Unsupported coordinate arity (only 0, 1 and 2 are in scope).
    UnsupportedArity { node: String, arity: usize },
}

impl fmt::Display for ConstructionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructionError::DanglingFunc { node, id } => {
                write!(f, "node '{node}' references unknown function id {id}")
            }
            ConstructionError::DanglingSource { node, id } => {
                write!(f, "node '{node}' references unknown source id {id}")
            }
            ConstructionError::ArityMismatch { node, target, expected, got } => write!(
                f,
                "node '{node}' calls '{target}' with {got} coordinates, expected {expected}"
            ),
            ConstructionError::CoordOutOfRange { node, axis, arity } => write!(
                f,
                "node '{node}' uses coordinate axis {axis} but has arity {arity}"
            ),
            ConstructionError::DomainMisuse { node, detail } => {
                write!(f, "node '{node}': {detail}")
            }
            ConstructionError::DomainShapeMismatch { node, domain_rank, kernel_shape } => write!(
                f,
                "node '{node}': reduction domain (rank {domain_rank}) does not cover \
                 kernel shape {kernel_shape:?}"
            ),
            ConstructionError::UnsupportedArity { node, arity } => {
                write!(f, "node '{node}': arity {arity} unsupported (max 2)")
            }
        }
    }
}

impl std::error::Error for ConstructionError {}

/// Arena of function nodes and source declarations.
#[derive(Debug, Default)]
pub struct Graph {
    funcs: Vec<FunctionNode>,
    sources: Vec<SourceDecl>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    /// Declare an input buffer slot.
    pub fn add_source(&mut self, name: &str, dtype: DType, shape: &[usize]) -> SourceId {
        self.sources.push(SourceDecl {
            name: name.to_string(),
            dtype,
            shape: shape.to_vec(),
        });
        SourceId(self.sources.len() - 1)
    }

    /// Define a function node with a direct formula.
    pub fn define(&mut self, name: &str, arity: usize, expr: Expr) -> Result<FuncId, ConstructionError> {
        if arity > 2 {
            return Err(ConstructionError::UnsupportedArity {
                node: name.to_string(),
                arity,
            });
        }
        self.validate_expr(name, &expr, arity, None)?;
        self.funcs.push(FunctionNode {
            name: name.to_string(),
            arity,
            body: FuncBody::Pure(expr),
        });
        Ok(FuncId(self.funcs.len() - 1))
    }

    /// Define a function node as an accumulation over `domain`.
    pub fn define_reduce(
        &mut self,
        name: &str,
        arity: usize,
        init: Expr,
        update: Expr,
        domain: ReductionDomain,
    ) -> Result<FuncId, ConstructionError> {
        if arity > 2 {
            return Err(ConstructionError::UnsupportedArity {
                node: name.to_string(),
                arity,
            });
        }
        self.validate_expr(name, &init, arity, None)?;
        self.validate_expr(name, &update, arity, Some(&domain))?;
        self.funcs.push(FunctionNode {
            name: name.to_string(),
            arity,
            body: FuncBody::Reduce { init, update, domain },
        });
        Ok(FuncId(self.funcs.len() - 1))
    }

    pub fn func(&self, id: FuncId) -> &FunctionNode {
        &self.funcs[id.0]
    }

    pub fn source(&self, id: SourceId) -> &SourceDecl {
        &self.sources[id.0]
    }

    pub fn num_funcs(&self) -> usize {
        self.funcs.len()
    }

    pub fn num_sources(&self) -> usize {
        self.sources.len()
    }

    /// Walk an expression, checking every structural rule against the
    /// arenas as they exist right now. `domain` is Some inside a
    /// reduction update, where `Accum` and domain coordinates are legal.
    fn validate_expr(
        &self,
        node: &str,
        expr: &Expr,
        arity: usize,
        domain: Option<&ReductionDomain>,
    ) -> Result<(), ConstructionError> {
        match expr {
            Expr::Const(_) => Ok(()),
            Expr::Coord(axis) => {
                if *axis >= arity {
                    return Err(ConstructionError::CoordOutOfRange {
                        node: node.to_string(),
                        axis: *axis,
                        arity,
                    });
                }
                Ok(())
            }
            Expr::DomainCoord(axis) => match domain {
                None => Err(ConstructionError::DomainMisuse {
                    node: node.to_string(),
                    detail: "domain coordinate outside a reduction update".to_string(),
                }),
                Some(d) if *axis >= d.rank() => Err(ConstructionError::DomainMisuse {
                    node: node.to_string(),
                    detail: format!("domain axis {axis} beyond domain rank {}", d.rank()),
                }),
                Some(_) => Ok(()),
            },
            Expr::Accum => {
                if domain.is_none() {
                    return Err(ConstructionError::DomainMisuse {
                        node: node.to_string(),
                        detail: "accumulator outside a reduction update".to_string(),
                    });
                }
                Ok(())
            }
            Expr::Read(src, coords) => {
                let decl = self.sources.get(src.0).ok_or_else(|| {
                    ConstructionError::DanglingSource {
                        node: node.to_string(),
                        id: src.0,
                    }
                })?;
                if coords.len() != decl.shape.len() {
                    return Err(ConstructionError::ArityMismatch {
                        node: node.to_string(),
                        target: decl.name.clone(),
                        expected: decl.shape.len(),
                        got: coords.len(),
                    });
                }
                for c in coords {
                    self.validate_expr(node, c, arity, domain)?;
                }
                Ok(())
            }
            Expr::Call(func, coords) => {
                let callee = self.funcs.get(func.0).ok_or_else(|| {
                    ConstructionError::DanglingFunc {
                        node: node.to_string(),
                        id: func.0,
                    }
                })?;
                if coords.len() != callee.arity {
                    return Err(ConstructionError::ArityMismatch {
                        node: node.to_string(),
                        target: callee.name.clone(),
                        expected: callee.arity,
                        got: coords.len(),
                    });
                }
                for c in coords {
                    self.validate_expr(node, c, arity, domain)?;
                }
                Ok(())
            }
            Expr::Binary(_, lhs, rhs) => {
                self.validate_expr(node, lhs, arity, domain)?;
                self.validate_expr(node, rhs, arity, domain)
            }
            Expr::Unary(_, inner) => self.validate_expr(node, inner, arity, domain),
            Expr::Select(c, t, e) => {
                self.validate_expr(node, c, arity, domain)?;
                self.validate_expr(node, t, arity, domain)?;
                self.validate_expr(node, e, arity, domain)
            }
            Expr::Cast(_, inner) => self.validate_expr(node, inner, arity, domain),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{acc, lit, rx, x, y, Expr};

    #[test]
    fn test_define_and_call() {
        let mut g = Graph::new();
        let a = g.define("a", 2, x() + y()).unwrap();
        let b = g.define("b", 2, Expr::Call(a, vec![x(), y()]) * 2).unwrap();
        assert_eq!(g.func(b).name, "b");
        assert_eq!(g.num_funcs(), 2);
    }

    #[test]
    fn test_dangling_func_rejected() {
        let mut g = Graph::new();
        let err = g
            .define("bad", 2, Expr::Call(FuncId(5), vec![x(), y()]))
            .unwrap_err();
        assert!(matches!(err, ConstructionError::DanglingFunc { id: 5, .. }));
    }

    #[test]
    fn test_call_arity_checked() {
        let mut g = Graph::new();
        let a = g.define("a", 2, x() + y()).unwrap();
        let err = g.define("bad", 2, Expr::Call(a, vec![x()])).unwrap_err();
        assert!(matches!(
            err,
            ConstructionError::ArityMismatch { expected: 2, got: 1, .. }
        ));
    }

    #[test]
    fn test_coord_out_of_range() {
        let mut g = Graph::new();
        let err = g.define("bad", 1, y()).unwrap_err();
        assert!(matches!(err, ConstructionError::CoordOutOfRange { axis: 1, arity: 1, .. }));
    }

    #[test]
    fn test_domain_coord_outside_reduce() {
        let mut g = Graph::new();
        let err = g.define("bad", 2, rx()).unwrap_err();
        assert!(matches!(err, ConstructionError::DomainMisuse { .. }));
    }

    #[test]
    fn test_accum_only_in_update() {
        let mut g = Graph::new();
        let dom = ReductionDomain::of_extents(&[3]);
        // Accumulator in the init expression is rejected.
        let err = g.define_reduce("bad", 1, acc(), lit(0i32), dom).unwrap_err();
        assert!(matches!(err, ConstructionError::DomainMisuse { .. }));
    }

    #[test]
    fn test_domain_len() {
        assert_eq!(ReductionDomain::of_extents(&[3, 3]).len(), 9);
        assert_eq!(ReductionDomain::of_extents(&[0]).len(), 0);
        assert!(ReductionDomain::of_extents(&[0]).is_empty());
        assert_eq!(ReductionDomain::of_extents(&[17, 17]).len(), 289);
    }

    #[test]
    fn test_domain_matches_shape() {
        let d = ReductionDomain::of_extents(&[13, 13]);
        assert!(d.matches_shape(&[13, 13]));
        assert!(!d.matches_shape(&[3, 3]));
        assert!(!d.matches_shape(&[13]));
    }
}
