// corner.rs -- Shi-Tomasi corner response.
//
// Integer gradient and smoothing passes feed a float eigenvalue
// computation; the output is a 1/0 corner map. The gradient sums are
// divided by 6 and the smoothing sums by 16, both in integer
// arithmetic, matching the masks in `masks.rs`.

use crate::expr::{lit, select, x, y};
use crate::graph::{ConstructionError, FuncId, Graph, SourceId};
use crate::stencil::stencil_conv;

pub const DEFAULT_CORNER_THRESHOLD: f32 = 200.0;

/// Build the corner map for `f` (an integer-valued image accessor).
/// `grad_x` / `grad_y` are 3x3 integer gradient masks and `smooth` the
/// 3x3 binomial mask.
pub fn shi_tomasi(
    g: &mut Graph,
    name: &str,
    f: FuncId,
    grad_x: SourceId,
    grad_y: SourceId,
    smooth: SourceId,
    threshold: f32,
) -> Result<FuncId, ConstructionError> {
    let dxc = stencil_conv(g, &format!("{name}_dxc"), f, grad_x)?;
    let dx = g.define(&format!("{name}_dx"), 2, dxc.at([x(), y()]) / 6)?;
    let dyc = stencil_conv(g, &format!("{name}_dyc"), f, grad_y)?;
    let dy = g.define(&format!("{name}_dy"), 2, dyc.at([x(), y()]) / 6)?;

    // Structure tensor entries.
    let sx = g.define(
        &format!("{name}_sx"),
        2,
        dx.at([x(), y()]) * dx.at([x(), y()]),
    )?;
    let sy = g.define(
        &format!("{name}_sy"),
        2,
        dy.at([x(), y()]) * dy.at([x(), y()]),
    )?;
    let sxy = g.define(
        &format!("{name}_sxy"),
        2,
        dx.at([x(), y()]) * dy.at([x(), y()]),
    )?;

    let gxc = stencil_conv(g, &format!("{name}_gxc"), sx, smooth)?;
    let gx = g.define(&format!("{name}_gx"), 2, gxc.at([x(), y()]) / 16)?;
    let gyc = stencil_conv(g, &format!("{name}_gyc"), sy, smooth)?;
    let gy = g.define(&format!("{name}_gy"), 2, gyc.at([x(), y()]) / 16)?;
    let gxyc = stencil_conv(g, &format!("{name}_gxyc"), sxy, smooth)?;
    let gxy = g.define(&format!("{name}_gxy"), 2, gxyc.at([x(), y()]) / 16)?;

    // Eigenvalues of the smoothed tensor.
    let diff = gx.at([x(), y()]) - gy.at([x(), y()]);
    let interm = g.define(
        &format!("{name}_interm"),
        2,
        (diff.clone() * diff + 4.0f32 * (gxy.at([x(), y()]) * gxy.at([x(), y()]))).sqrt(),
    )?;
    let lambda1 = g.define(
        &format!("{name}_l1"),
        2,
        0.5f32 * (gx.at([x(), y()]) + gy.at([x(), y()]) + interm.at([x(), y()])),
    )?;
    let lambda2 = g.define(
        &format!("{name}_l2"),
        2,
        0.5f32 * (gx.at([x(), y()]) + gy.at([x(), y()]) - interm.at([x(), y()])),
    )?;
    g.define(
        name,
        2,
        select(
            lambda1.at([x(), y()]).min(lambda2.at([x(), y()])).gt(threshold),
            lit(1i32),
            lit(0i32),
        ),
    )
}
