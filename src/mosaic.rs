// mosaic.rs -- multiband blending of two images across a seam.
//
// Both inputs are decomposed into band-pass pyramids, every level is
// switched between the two by a selector predicate, and the result is
// collapsed back to full resolution. The default selector splits at
// half the BASE width on every level, so coarse levels (whose extents
// are smaller than the split) come entirely from the first image.

use crate::expr::{select, x, y, Expr};
use crate::graph::{ConstructionError, FuncId, Graph, SourceId};
use crate::pyramid::{gaussian_pyramid, laplacian_pyramid, reconstruct, Pyramid};

/// Switch two matched pyramids level by level. `selector(j)` builds
/// the condition for level `j`; where it is nonzero the blend takes
/// `a`, elsewhere `b`.
pub fn blend_pyramids(
    g: &mut Graph,
    name: &str,
    a: &Pyramid,
    b: &Pyramid,
    mut selector: impl FnMut(usize) -> Expr,
) -> Result<Pyramid, ConstructionError> {
    a.process_levels(g, |g, lvl, j| {
        g.define(
            &format!("{name}_blend{j}"),
            2,
            select(
                selector(j),
                lvl.at([x(), y()]),
                b.level(j).at([x(), y()]),
            ),
        )
    })
}

/// Full mosaic pipeline: pyramid both inputs, blend on a vertical seam
/// at half the base width, collapse.
pub fn mosaic(
    g: &mut Graph,
    name: &str,
    left: FuncId,
    right: FuncId,
    shape: (usize, usize),
    num_levels: usize,
    lowpass: SourceId,
) -> Result<FuncId, ConstructionError> {
    let ga = gaussian_pyramid(g, &format!("{name}_ga"), left, shape, num_levels, lowpass)?;
    let gb = gaussian_pyramid(g, &format!("{name}_gb"), right, shape, num_levels, lowpass)?;
    let la = laplacian_pyramid(g, &format!("{name}_la"), &ga)?;
    let lb = laplacian_pyramid(g, &format!("{name}_lb"), &gb)?;
    let half = (shape.0 / 2) as i32;
    let blended = blend_pyramids(g, name, &la, &lb, |_| x().lt(half))?;
    reconstruct(g, &format!("{name}_rec"), &blended)
}
