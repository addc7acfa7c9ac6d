// enhance.rs -- sharpening, edge magnitude and gain/gamma kernels.

use crate::expr::{select, x, y};
use crate::graph::{ConstructionError, FuncId, Graph, SourceId};
use crate::stencil::stencil_conv;
use crate::value::DType;

/// Unsharp masking on a float image: subtract a binomial blur from a
/// doubled original, then rescale by the ratio against the input.
/// Zero-valued pixels produce NaN in the ratio, as the formula is
/// applied verbatim.
pub fn unsharp(
    g: &mut Graph,
    name: &str,
    f: FuncId,
    smooth: SourceId,
) -> Result<FuncId, ConstructionError> {
    let blur = stencil_conv(g, &format!("{name}_blur"), f, smooth)?;
    let gaus = g.define(&format!("{name}_gaus"), 2, blur.at([x(), y()]) / 16)?;
    let sharp = g.define(
        &format!("{name}_sharp"),
        2,
        2 * f.at([x(), y()]) - gaus.at([x(), y()]),
    )?;
    let ratio = g.define(
        &format!("{name}_ratio"),
        2,
        sharp.at([x(), y()]) / f.at([x(), y()]),
    )?;
    g.define(name, 2, ratio.at([x(), y()]) * f.at([x(), y()]))
}

/// Laplacian sharpening of a u8 image: a zero-sum float convolution,
/// re-biased to mid-gray, clamped and cast back to u8.
pub fn laplace_sharpen(
    g: &mut Graph,
    name: &str,
    f: FuncId,
    mask: SourceId,
) -> Result<FuncId, ConstructionError> {
    let conv = stencil_conv(g, &format!("{name}_conv"), f, mask)?;
    let v = conv.at([x(), y()]) + 128.0f32;
    let v = select(v.clone().gt(255.0f32), 255.0f32, v);
    let v = select(v.clone().lt(0.0f32), 0.0f32, v);
    g.define(name, 2, v.cast(DType::U8))
}

/// Prewitt gradient magnitude on a float image, clamped into
/// [0, 255].
pub fn prewitt(
    g: &mut Graph,
    name: &str,
    f: FuncId,
    grad_x: SourceId,
    grad_y: SourceId,
) -> Result<FuncId, ConstructionError> {
    let dxc = stencil_conv(g, &format!("{name}_dxc"), f, grad_x)?;
    let dx = g.define(&format!("{name}_dx"), 2, dxc.at([x(), y()]) / 6)?;
    let dyc = stencil_conv(g, &format!("{name}_dyc"), f, grad_y)?;
    let dy = g.define(&format!("{name}_dy"), 2, dyc.at([x(), y()]) / 6)?;

    let dxn = g.define(&format!("{name}_dxn"), 2, dx.at([x(), y()]) / 3.0f32)?;
    let dyn_ = g.define(&format!("{name}_dyn"), 2, dy.at([x(), y()]) / 3.0f32)?;
    let mag = g.define(
        &format!("{name}_mag"),
        2,
        (dxn.at([x(), y()]) * dxn.at([x(), y()]) + dyn_.at([x(), y()]) * dyn_.at([x(), y()]))
            .sqrt(),
    )?;
    let m = mag.at([x(), y()]);
    let m = select(m.clone().gt(255.0f32), 255.0f32, m);
    let m = select(m.clone().lt(0.0f32), 0.0f32, m);
    g.define(name, 2, m)
}

/// Gain and gamma correction behind a box average, replicated into
/// `copies` independent outputs for multi-output realization.
pub fn enhance(
    g: &mut Graph,
    name: &str,
    f: FuncId,
    avg_mask: SourceId,
    gain: i32,
    gamma: f32,
    copies: usize,
) -> Result<Vec<FuncId>, ConstructionError> {
    let mut outputs = Vec::with_capacity(copies);
    for n in 0..copies {
        let avg = stencil_conv(g, &format!("{name}_avg{n}"), f, avg_mask)?;
        outputs.push(g.define(
            &format!("{name}_{n}"),
            2,
            (avg.at([x(), y()]) * gain).pow(gamma),
        )?);
    }
    Ok(outputs)
}
