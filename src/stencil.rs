// stencil.rs -- windowed convolution and decimation building blocks.
//
// The convolution window is forward: a k-wide kernel reads
// f(x + 0 .. x + k - 1), not a centered neighborhood. Callers that
// want centering shift the consumer's coordinates instead.

use crate::expr::{acc, lit, rx, ry, x, y};
use crate::graph::{ConstructionError, FuncId, Graph, ReductionDomain, SourceId};

/// Accumulate `f` against a kernel buffer over the kernel's whole
/// extent:
///
///   out(x, y) = sum over (i, j) of f(x + i, y + j) * kernel(i, j)
///
/// The sum starts from integer zero, so the result type follows the
/// promotion of the operands: integer kernels give integer sums, float
/// kernels give float sums.
pub fn stencil_conv(
    g: &mut Graph,
    name: &str,
    f: FuncId,
    kernel: SourceId,
) -> Result<FuncId, ConstructionError> {
    let shape = g.source(kernel).shape.clone();
    let domain = ReductionDomain::of_extents(&shape);
    stencil_conv_over(g, name, f, kernel, domain)
}

/// Like [`stencil_conv`] with a caller-supplied domain, which must
/// cover the kernel buffer exactly.
pub fn stencil_conv_over(
    g: &mut Graph,
    name: &str,
    f: FuncId,
    kernel: SourceId,
    domain: ReductionDomain,
) -> Result<FuncId, ConstructionError> {
    let shape = g.source(kernel).shape.clone();
    if domain.rank() != 2 || !domain.matches_shape(&shape) {
        return Err(ConstructionError::DomainShapeMismatch {
            node: name.to_string(),
            domain_rank: domain.rank(),
            kernel_shape: shape,
        });
    }
    g.define_reduce(
        name,
        2,
        lit(0i32),
        acc() + f.at([x() + rx(), y() + ry()]) * kernel.read([rx(), ry()]),
        domain,
    )
}

/// Keep every second sample along both axes.
pub fn decimate(g: &mut Graph, name: &str, f: FuncId) -> Result<FuncId, ConstructionError> {
    g.define(name, 2, f.at([2 * x(), 2 * y()]))
}
