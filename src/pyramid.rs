// pyramid.rs -- Gaussian and Laplacian pyramids over function nodes.
//
// A pyramid is a ladder of function nodes plus the extents each level
// is meant to be realized at. Levels shrink by decimation, so level
// j + 1 has ceil(n / 2) samples per axis.

use crate::expr::{x, y};
use crate::graph::{ConstructionError, FuncId, Graph, SourceId};
use crate::stencil::{decimate, stencil_conv};

/// A ladder of same-typed function nodes, finest level first.
#[derive(Debug, Clone)]
pub struct Pyramid {
    levels: Vec<FuncId>,
    shapes: Vec<(usize, usize)>,
}

impl Pyramid {
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, j: usize) -> FuncId {
        self.levels[j]
    }

    pub fn shape(&self, j: usize) -> (usize, usize) {
        self.shapes[j]
    }

    pub fn levels(&self) -> &[FuncId] {
        &self.levels
    }

    /// Derive a new pyramid by mapping every level through `f`.
    pub fn process_levels(
        &self,
        g: &mut Graph,
        mut f: impl FnMut(&mut Graph, FuncId, usize) -> Result<FuncId, ConstructionError>,
    ) -> Result<Pyramid, ConstructionError> {
        let mut levels = Vec::with_capacity(self.levels.len());
        for (j, &lvl) in self.levels.iter().enumerate() {
            levels.push(f(g, lvl, j)?);
        }
        Ok(Pyramid {
            levels,
            shapes: self.shapes.clone(),
        })
    }
}

fn halve(n: usize) -> usize {
    (n + 1) / 2
}

/// Bilinear 2x upsampling, separable with weights 0.25 / 0.75:
///
///   upx(x, y) = 0.25 f(x/2 - 1 + 2 (x%2), y) + 0.75 f(x/2, y)
///
/// then the same along y. Adds two nodes, `{name}_x` and `{name}`.
pub fn upsample(g: &mut Graph, name: &str, f: FuncId) -> Result<FuncId, ConstructionError> {
    let upx = g.define(
        &format!("{name}_x"),
        2,
        0.25f32 * f.at([x() / 2 - 1 + 2 * (x() % 2), y()]) + 0.75f32 * f.at([x() / 2, y()]),
    )?;
    g.define(
        name,
        2,
        0.25f32 * upx.at([x(), y() / 2 - 1 + 2 * (y() % 2)]) + 0.75f32 * upx.at([x(), y() / 2]),
    )
}

/// Build a Gaussian pyramid: level 0 is `base` itself, every deeper
/// level is a low-pass convolution of its parent followed by 2x
/// decimation.
pub fn gaussian_pyramid(
    g: &mut Graph,
    name: &str,
    base: FuncId,
    base_shape: (usize, usize),
    num_levels: usize,
    lowpass: SourceId,
) -> Result<Pyramid, ConstructionError> {
    let mut levels = vec![base];
    let mut shapes = vec![base_shape];
    for j in 1..num_levels {
        let parent = levels[j - 1];
        let blur = stencil_conv(g, &format!("{name}_blur{j}"), parent, lowpass)?;
        let down = decimate(g, &format!("{name}_down{j}"), blur)?;
        let (w, h) = shapes[j - 1];
        levels.push(down);
        shapes.push((halve(w), halve(h)));
    }
    Ok(Pyramid { levels, shapes })
}

/// Band-pass ladder from a Gaussian pyramid: the coarsest level passes
/// through, every finer level becomes the difference against its
/// upsampled parent.
pub fn laplacian_pyramid(
    g: &mut Graph,
    name: &str,
    gauss: &Pyramid,
) -> Result<Pyramid, ConstructionError> {
    let top = gauss.num_levels() - 1;
    let mut levels = Vec::with_capacity(gauss.num_levels());
    for j in 0..top {
        let up = upsample(g, &format!("{name}_up{j}"), gauss.level(j + 1))?;
        levels.push(g.define(
            &format!("{name}_band{j}"),
            2,
            gauss.level(j).at([x(), y()]) - up.at([x(), y()]),
        )?);
    }
    levels.push(gauss.level(top));
    Ok(Pyramid {
        levels,
        shapes: gauss.shapes.clone(),
    })
}

/// Collapse a band-pass pyramid back to full resolution. Each step
/// upsamples the running image and blends in half of the band at that
/// level, so the collapse is deliberately soft rather than an exact
/// inverse.
pub fn reconstruct(g: &mut Graph, name: &str, pyr: &Pyramid) -> Result<FuncId, ConstructionError> {
    let top = pyr.num_levels() - 1;
    let mut out = pyr.level(top);
    for j in (0..top).rev() {
        let up = upsample(g, &format!("{name}_lift{j}"), out)?;
        out = g.define(
            &format!("{name}_sum{j}"),
            2,
            up.at([x(), y()]) + 0.5f32 * pyr.level(j).at([x(), y()]),
        )?;
    }
    Ok(out)
}
