// nightfilter.rs -- a-trous denoise cascade and scotopic tone mapping
// over packed RGBA (8 bits per channel, alpha high).

use crate::expr::{acc, lit, rx, ry, select, x, y, Expr};
use crate::graph::{ConstructionError, FuncId, Graph, ReductionDomain, SourceId};
use crate::value::DType;

fn channel(packed: Expr, shift: u32) -> Expr {
    if shift == 0 {
        packed & 0xffu32
    } else {
        (packed >> shift) & 0xffu32
    }
}

fn pack_rgba(r: Expr, g: Expr, b: Expr) -> Expr {
    r.cast(DType::U32)
        | (g.cast(DType::U32) << 8u32)
        | (b.cast(DType::U32) << 16u32)
        | (lit(255u32) << 24u32)
}

/// One a-trous stage: a normalized convolution against a dilated mask,
/// where each tap additionally carries a photometric weight derived
/// from its color distance to the pixel at the window origin.
///
/// The photometric falloff is `(1 + d^2/256)^256`, an exp approximation
/// evaluated by eight squarings, clamped down to 1.
pub fn atrous_stage(
    g: &mut Graph,
    name: &str,
    f: FuncId,
    mask: SourceId,
) -> Result<FuncId, ConstructionError> {
    let shape = g.source(mask).shape.clone();
    let domain = ReductionDomain::of_extents(&shape);

    let origin = f.at([x(), y()]);
    let r0 = channel(origin.clone(), 0) / 255.0f32;
    let g0 = channel(origin.clone(), 8) / 255.0f32;
    let b0 = channel(origin, 16) / 255.0f32;

    let tap = f.at([x() + rx(), y() + ry()]);
    let rp = channel(tap.clone(), 0) / 255.0f32;
    let gp = channel(tap.clone(), 8) / 255.0f32;
    let bp = channel(tap, 16) / 255.0f32;

    let rd = rp.clone() - r0;
    let gd = gp.clone() - g0;
    let bd = bp.clone() - b0;
    let dist = rd.clone() * rd + gd.clone() * gd + bd.clone() * bd;
    let xx = (1.0f32 + dist / 256.0f32).powi(256);
    let weight = select(xx.clone().gt(1.0f32), lit(1.0f32), xx);

    let m = mask.read([rx(), ry()]);
    let sum_weight = g.define_reduce(
        &format!("{name}_w"),
        2,
        lit(0.0f32),
        acc() + weight.clone() * m.clone(),
        domain.clone(),
    )?;
    let sum_r = g.define_reduce(
        &format!("{name}_r"),
        2,
        lit(0.0f32),
        acc() + rp * weight.clone() * m.clone(),
        domain.clone(),
    )?;
    let sum_g = g.define_reduce(
        &format!("{name}_g"),
        2,
        lit(0.0f32),
        acc() + gp * weight.clone() * m.clone(),
        domain.clone(),
    )?;
    let sum_b = g.define_reduce(
        &format!("{name}_b"),
        2,
        lit(0.0f32),
        acc() + bp * weight * m,
        domain,
    )?;

    let w = sum_weight.at([x(), y()]);
    let rout = sum_r.at([x(), y()]) * 255.0f32 / w.clone();
    let gout = sum_g.at([x(), y()]) * 255.0f32 / w.clone();
    let bout = sum_b.at([x(), y()]) * 255.0f32 / w;
    g.define(name, 2, pack_rgba(rout, gout, bout))
}

/// Chain a-trous stages, one per mask, each feeding the next.
pub fn atrous_cascade(
    g: &mut Graph,
    name: &str,
    input: FuncId,
    masks: &[SourceId],
) -> Result<FuncId, ConstructionError> {
    let mut cur = input;
    for (i, &m) in masks.iter().enumerate() {
        cur = atrous_stage(g, &format!("{name}_stage{i}"), cur, m)?;
    }
    Ok(cur)
}

/// Scotopic tone mapping: the packed color is pushed through an XYZ
/// conversion, a night-vision luminance estimate, and back to RGB.
/// The channel clamps feed the clamped red value back into green and
/// blue, so every output pixel is grayscale.
pub fn scoto(g: &mut Graph, name: &str, f: FuncId) -> Result<FuncId, ConstructionError> {
    let val = f.at([x(), y()]);
    let rin = channel(val.clone(), 0);
    let gin = channel(val.clone(), 8);
    let bin = channel(val, 16);

    let xc = 0.5149f32 * rin.clone() + 0.3244f32 * gin.clone() + 0.1607f32 * bin.clone();
    let yc = (0.2654f32 * rin.clone() + 0.6704f32 * gin.clone() + 0.0642f32 * bin.clone())
        / 3.0f32;
    let zc = 0.0248f32 * rin + 0.1248f32 * gin + 0.8504f32 * bin;
    let v = yc.clone() * (((yc.clone() + zc.clone()) / xc.clone() + 1.0f32) * 1.33f32 - 1.68f32);
    let w = xc.clone() + yc.clone() + zc;

    // Day/night mix; fully scotopic here.
    let s = 0.0f32;
    let x1 = (1.0f32 - s) * lit(0.25f32) + s * (xc / w.clone());
    let y1 = (1.0f32 - s) * lit(0.25f32) + s * (yc.clone() / w);
    let yy = v * 0.4468f32 * (1.0f32 - s) + s * yc;
    let xx = x1 * yy.clone() / y1.clone();
    let zz = xx.clone() / y1 - xx.clone() - yy.clone();

    let r = 2.562263f32 * xx.clone() + -1.166107f32 * yy.clone() + -0.396157f32 * zz.clone();
    let gc = -1.021558f32 * xx.clone() + 1.977828f32 * yy.clone() + 0.043730f32 * zz.clone();
    let b = 0.075196f32 * xx + -0.256248f32 * yy + 1.181053f32 * zz;

    let r = select(r.clone().gt(255.0f32), lit(255.0f32), r);
    let r = select(r.clone().lt(0.0f32), lit(0.0f32), r);
    let gc = select(gc.gt(255.0f32), lit(255.0f32), r.clone());
    let gc = select(gc.lt(0.0f32), lit(0.0f32), r.clone());
    let b = select(b.gt(255.0f32), lit(255.0f32), r.clone());
    let b = select(b.lt(0.0f32), lit(0.0f32), r.clone());

    g.define(name, 2, pack_rgba(r, gc, b))
}

/// Full night filter: the a-trous cascade followed by tone mapping.
pub fn night_filter(
    g: &mut Graph,
    name: &str,
    input: FuncId,
    masks: &[SourceId],
) -> Result<FuncId, ConstructionError> {
    let denoised = atrous_cascade(g, &format!("{name}_atrous"), input, masks)?;
    scoto(g, name, denoised)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::repeat_edge;
    use crate::buffer::{BufMut, Buffer};
    use crate::interp::HostBackend;
    use crate::masks::atrous_mask;
    use crate::pipeline::{Bindings, Pipeline};

    fn pack(r: u32, g: u32, b: u32) -> u32 {
        r | (g << 8) | (b << 16) | (255 << 24)
    }

    fn run_u32(g: Graph, f: FuncId, extents: &[usize], bindings: &Bindings<'_>) -> Buffer<u32> {
        let mut pipe = Pipeline::new(g, vec![f]).with_bounds(f, extents);
        let mut out = Buffer::<u32>::new(extents);
        pipe.realize(&HostBackend::new(), bindings, &mut [BufMut::from(&mut out)])
            .unwrap();
        out
    }

    #[test]
    fn atrous_stage_is_near_identity_on_a_uniform_image() {
        let mut g = Graph::new();
        let img = g.add_source("img", DType::U32, &[8, 8]);
        let mask = g.add_source("mask", DType::F32, &[3, 3]);
        let edged = repeat_edge(&mut g, img).unwrap();
        let out = atrous_stage(&mut g, "at", edged, mask).unwrap();

        let input = Buffer::<u32>::filled(&[8, 8], pack(10, 20, 30));
        let (m, _) = atrous_mask(1);
        let mask_buf = Buffer::<f32>::from_vec(&[3, 3], m);
        let mut bindings = Bindings::new();
        bindings.bind(img, &input);
        bindings.bind(mask, &mask_buf);

        let buf = run_u32(g, out, &[8, 8], &bindings);
        for &v in buf.as_slice() {
            let (r, gg, b) = (v & 0xff, (v >> 8) & 0xff, (v >> 16) & 0xff);
            assert!(r.abs_diff(10) <= 1, "r = {r}");
            assert!(gg.abs_diff(20) <= 1, "g = {gg}");
            assert!(b.abs_diff(30) <= 1, "b = {b}");
            assert_eq!(v >> 24, 255);
        }
    }

    #[test]
    fn cascade_chains_every_mask() {
        let mut g = Graph::new();
        let img = g.add_source("img", DType::U32, &[8, 8]);
        let spacings = [1usize, 2, 4, 8];
        let srcs: Vec<_> = spacings
            .iter()
            .map(|&s| {
                let (_, size) = atrous_mask(s);
                g.add_source(&format!("mask{size}"), DType::F32, &[size, size])
            })
            .collect();
        let edged = repeat_edge(&mut g, img).unwrap();
        let out = atrous_cascade(&mut g, "casc", edged, &srcs).unwrap();

        let input = Buffer::<u32>::filled(&[8, 8], pack(100, 100, 100));
        let mask_bufs: Vec<_> = spacings
            .iter()
            .map(|&s| {
                let (m, size) = atrous_mask(s);
                Buffer::<f32>::from_vec(&[size, size], m)
            })
            .collect();
        let mut bindings = Bindings::new();
        bindings.bind(img, &input);
        for (&src, buf) in srcs.iter().zip(&mask_bufs) {
            bindings.bind(src, buf);
        }

        let buf = run_u32(g, out, &[8, 8], &bindings);
        for &v in buf.as_slice() {
            // Four truncating repacks can each lose a unit.
            assert!((v & 0xff).abs_diff(100) <= 4);
        }
    }

    #[test]
    fn scoto_output_is_grayscale() {
        let mut g = Graph::new();
        let img = g.add_source("img", DType::U32, &[4, 4]);
        let edged = repeat_edge(&mut g, img).unwrap();
        let out = scoto(&mut g, "tone", edged).unwrap();

        let input = Buffer::<u32>::filled(&[4, 4], pack(120, 45, 210));
        let mut bindings = Bindings::new();
        bindings.bind(img, &input);

        let buf = run_u32(g, out, &[4, 4], &bindings);
        for &v in buf.as_slice() {
            let (r, gg, b) = (v & 0xff, (v >> 8) & 0xff, (v >> 16) & 0xff);
            assert_eq!(r, gg);
            assert_eq!(r, b);
            assert_eq!(v >> 24, 255);
        }
    }
}
