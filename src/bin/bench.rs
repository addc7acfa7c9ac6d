// bench.rs -- kernel timing driver.
//
// Runs every pipeline (or the subset named on the command line) over
// synthetic inputs and reports best-of wall times. Sizes are scaled
// for the host interpreter; the accelerator, when present, only
// carries the buffer-transfer legs.

use std::process::ExitCode;

use pyrite::benchmark::{best_of_ms, Executor};
use pyrite::boundary::repeat_edge;
use pyrite::buffer::{BufMut, Buffer, Elem};
use pyrite::graph::Graph;
use pyrite::masks;
use pyrite::pipeline::{Bindings, Pipeline};
use pyrite::value::DType;
use pyrite::{bilateral, corner, enhance, mosaic, nightfilter, pyramid, reduce, stencil};

const SAMPLES: usize = 10;

/// Deterministic 12-bit noise, standing in for the C library rand().
struct Noise(u64);

impl Noise {
    fn new(seed: u64) -> Self {
        Noise(seed.max(1))
    }

    fn next_u32(&mut self) -> u32 {
        let mut s = self.0;
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        self.0 = s;
        (s >> 32) as u32 & 0xfff
    }
}

fn noise_f32(n: usize, seed: u64) -> Vec<f32> {
    let mut rng = Noise::new(seed);
    (0..n).map(|_| rng.next_u32() as f32).collect()
}

fn noise_i32(n: usize, seed: u64) -> Vec<i32> {
    let mut rng = Noise::new(seed);
    (0..n).map(|_| rng.next_u32() as i32).collect()
}

fn noise_u32(n: usize, seed: u64) -> Vec<u32> {
    let mut rng = Noise::new(seed);
    (0..n).map(|_| rng.next_u32()).collect()
}

type KernelResult = Result<f64, Box<dyn std::error::Error>>;

/// Times one realize loop, carrying the output over the accelerator
/// when one is present.
fn time_pipeline<T>(
    ex: &Executor,
    pipe: &mut Pipeline,
    bindings: &Bindings<'_>,
    outs: &mut [Buffer<T>],
) -> KernelResult
where
    T: Elem,
    for<'b> &'b mut Buffer<T>: Into<BufMut<'b>>,
{
    let mut err = None;
    let ms = best_of_ms(SAMPLES, || {
        if err.is_some() {
            return;
        }
        let mut views: Vec<BufMut<'_>> = outs.iter_mut().map(|b| b.into()).collect();
        if let Err(e) = pipe.realize(ex.backend(), bindings, &mut views) {
            err = Some(e);
            return;
        }
        drop(views);
        if let Some(dev) = ex.device() {
            for out in outs.iter_mut() {
                if let Err(e) = out.to_device(dev) {
                    eprintln!("[pyrite] upload failed: {e}");
                    continue;
                }
                out.mark_device_written();
                if let Err(e) = out.to_host(dev) {
                    eprintln!("[pyrite] readback failed: {e}");
                }
            }
            ex.sync();
        }
    });
    match err {
        Some(e) => Err(e.into()),
        None => Ok(ms),
    }
}

fn bench_gaussian(ex: &Executor) -> KernelResult {
    const W: usize = 256;
    const H: usize = 256;
    let mut g = Graph::new();
    let img = g.add_source("input", DType::F32, &[W, H]);
    let mask = g.add_source("mask", DType::F32, &[3, 3]);
    let edged = repeat_edge(&mut g, img)?;
    let out = stencil::stencil_conv(&mut g, "gaussian", edged, mask)?;

    let input = Buffer::<f32>::from_vec(&[W, H], noise_f32(W * H, 11));
    let kernel = Buffer::<f32>::from_vec(&[3, 3], masks::GAUSS_LOWPASS_3X3.to_vec());
    let mut bindings = Bindings::new();
    bindings.bind(img, &input);
    bindings.bind(mask, &kernel);

    let mut pipe = Pipeline::new(g, vec![out]).with_bounds(out, &[W, H]);
    let mut bufs = [Buffer::<f32>::new(&[W, H])];
    time_pipeline(ex, &mut pipe, &bindings, &mut bufs)
}

fn bench_bilateral(ex: &Executor) -> KernelResult {
    const W: usize = 64;
    const H: usize = 64;
    let mut g = Graph::new();
    let img = g.add_source("input", DType::F32, &[W, H]);
    let mask = g.add_source("mask", DType::F32, &[13, 13]);
    let edged = repeat_edge(&mut g, img)?;
    let out = bilateral::bilateral(&mut g, "bilateral", edged, mask, 13.0)?;

    let input = Buffer::<f32>::from_vec(&[W, H], noise_f32(W * H, 23));
    let spatial = Buffer::<f32>::from_vec(&[13, 13], masks::bilateral_mask());
    let mut bindings = Bindings::new();
    bindings.bind(img, &input);
    bindings.bind(mask, &spatial);

    let mut pipe = Pipeline::new(g, vec![out]).with_bounds(out, &[W, H]);
    let mut bufs = [Buffer::<f32>::new(&[W, H])];
    time_pipeline(ex, &mut pipe, &bindings, &mut bufs)
}

fn bench_pyramid(ex: &Executor) -> KernelResult {
    const W: usize = 64;
    const H: usize = 64;
    const LEVELS: usize = 4;
    let mut g = Graph::new();
    let img = g.add_source("input", DType::F32, &[W, H]);
    let lowpass = g.add_source("lowpass", DType::F32, &[3, 3]);
    let spatial = g.add_source("spatial", DType::F32, &[13, 13]);
    let edged = repeat_edge(&mut g, img)?;

    let gauss = pyramid::gaussian_pyramid(&mut g, "gp", edged, (W, H), LEVELS, lowpass)?;
    let lap = pyramid::laplacian_pyramid(&mut g, "lp", &gauss)?;
    // Level 0 passes through; deeper bands are bilateral-filtered.
    let filtered = lap.process_levels(&mut g, |g, lvl, j| {
        if j == 0 {
            Ok(lvl)
        } else {
            bilateral::bilateral(g, &format!("bl{j}"), lvl, spatial, 13.0)
        }
    })?;
    let out = pyramid::reconstruct(&mut g, "rec", &filtered)?;

    let input = Buffer::<f32>::from_vec(&[W, H], noise_f32(W * H, 31));
    let lp = Buffer::<f32>::from_vec(&[3, 3], masks::GAUSS_LOWPASS_3X3.to_vec());
    let sp = Buffer::<f32>::from_vec(&[13, 13], masks::bilateral_mask());
    let mut bindings = Bindings::new();
    bindings.bind(img, &input);
    bindings.bind(lowpass, &lp);
    bindings.bind(spatial, &sp);

    let mut pipe = Pipeline::new(g, vec![out]).with_bounds(out, &[W, H]);
    let mut bufs = [Buffer::<f32>::new(&[W, H])];
    time_pipeline(ex, &mut pipe, &bindings, &mut bufs)
}

fn bench_mosaic(ex: &Executor) -> KernelResult {
    const W: usize = 64;
    const H: usize = 64;
    const LEVELS: usize = 4;
    let mut g = Graph::new();
    let left = g.add_source("left", DType::F32, &[W, H]);
    let right = g.add_source("right", DType::F32, &[W, H]);
    let lowpass = g.add_source("lowpass", DType::F32, &[3, 3]);
    let le = repeat_edge(&mut g, left)?;
    let re = repeat_edge(&mut g, right)?;
    let out = mosaic::mosaic(&mut g, "mosaic", le, re, (W, H), LEVELS, lowpass)?;

    let a = Buffer::<f32>::from_vec(&[W, H], noise_f32(W * H, 41));
    let b = Buffer::<f32>::from_vec(&[W, H], noise_f32(W * H, 43));
    let lp = Buffer::<f32>::from_vec(&[3, 3], masks::GAUSS_LOWPASS_3X3.to_vec());
    let mut bindings = Bindings::new();
    bindings.bind(left, &a);
    bindings.bind(right, &b);
    bindings.bind(lowpass, &lp);

    let mut pipe = Pipeline::new(g, vec![out]).with_bounds(out, &[W, H]);
    let mut bufs = [Buffer::<f32>::new(&[W, H])];
    time_pipeline(ex, &mut pipe, &bindings, &mut bufs)
}

fn bench_nightfilter(ex: &Executor) -> KernelResult {
    const W: usize = 48;
    const H: usize = 48;
    let mut g = Graph::new();
    let img = g.add_source("input", DType::U32, &[W, H]);
    let spacings = [1usize, 2, 4, 8];
    let mask_srcs: Vec<_> = spacings
        .iter()
        .map(|&s| {
            let (_, size) = masks::atrous_mask(s);
            g.add_source(&format!("mask{size}"), DType::F32, &[size, size])
        })
        .collect();
    let edged = repeat_edge(&mut g, img)?;
    let out = nightfilter::night_filter(&mut g, "night", edged, &mask_srcs)?;

    let input = Buffer::<u32>::from_vec(&[W, H], noise_u32(W * H, 53));
    let mask_bufs: Vec<_> = spacings
        .iter()
        .map(|&s| {
            let (m, size) = masks::atrous_mask(s);
            Buffer::<f32>::from_vec(&[size, size], m)
        })
        .collect();
    let mut bindings = Bindings::new();
    bindings.bind(img, &input);
    for (&src, buf) in mask_srcs.iter().zip(&mask_bufs) {
        bindings.bind(src, buf);
    }

    let mut pipe = Pipeline::new(g, vec![out]).with_bounds(out, &[W, H]);
    let mut bufs = [Buffer::<u32>::new(&[W, H])];
    time_pipeline(ex, &mut pipe, &bindings, &mut bufs)
}

fn bench_nightpipeline(ex: &Executor) -> KernelResult {
    const W: usize = 48;
    const H: usize = 48;
    const COPIES: usize = 4;
    let mut g = Graph::new();
    let img = g.add_source("input", DType::U32, &[W, H]);
    let mask = g.add_source("mask", DType::F32, &[3, 3]);
    let edged = repeat_edge(&mut g, img)?;
    let mut outs = Vec::with_capacity(COPIES);
    for n in 0..COPIES {
        let stage = nightfilter::atrous_stage(&mut g, &format!("stage{n}"), edged, mask)?;
        outs.push(nightfilter::scoto(&mut g, &format!("tone{n}"), stage)?);
    }

    let input = Buffer::<u32>::from_vec(&[W, H], noise_u32(W * H, 59));
    let (m, _) = masks::atrous_mask(1);
    let mask_buf = Buffer::<f32>::from_vec(&[3, 3], m);
    let mut bindings = Bindings::new();
    bindings.bind(img, &input);
    bindings.bind(mask, &mask_buf);

    let mut pipe = Pipeline::new(g, outs.clone());
    for &o in &outs {
        pipe = pipe.with_bounds(o, &[W, H]);
    }
    let mut bufs: Vec<Buffer<u32>> = (0..COPIES).map(|_| Buffer::new(&[W, H])).collect();
    time_pipeline(ex, &mut pipe, &bindings, &mut bufs)
}

fn bench_shitomasi(ex: &Executor) -> KernelResult {
    const W: usize = 128;
    const H: usize = 128;
    let mut g = Graph::new();
    let img = g.add_source("input", DType::I32, &[W, H]);
    let mx = g.add_source("grad_x", DType::I32, &[3, 3]);
    let my = g.add_source("grad_y", DType::I32, &[3, 3]);
    let mg = g.add_source("smooth", DType::I32, &[3, 3]);
    let edged = repeat_edge(&mut g, img)?;
    let out = corner::shi_tomasi(
        &mut g,
        "corners",
        edged,
        mx,
        my,
        mg,
        corner::DEFAULT_CORNER_THRESHOLD,
    )?;

    let input = Buffer::<i32>::from_vec(&[W, H], noise_i32(W * H, 61));
    let bx = Buffer::<i32>::from_vec(&[3, 3], masks::GRAD_X_3X3.to_vec());
    let by = Buffer::<i32>::from_vec(&[3, 3], masks::GRAD_Y_3X3.to_vec());
    let bg = Buffer::<i32>::from_vec(&[3, 3], masks::SMOOTH_3X3.to_vec());
    let mut bindings = Bindings::new();
    bindings.bind(img, &input);
    bindings.bind(mx, &bx);
    bindings.bind(my, &by);
    bindings.bind(mg, &bg);

    let mut pipe = Pipeline::new(g, vec![out]).with_bounds(out, &[W, H]);
    let mut bufs = [Buffer::<i32>::new(&[W, H])];
    time_pipeline(ex, &mut pipe, &bindings, &mut bufs)
}

fn bench_reduce(ex: &Executor) -> KernelResult {
    const N: usize = 65536;
    let mut g = Graph::new();
    let src = g.add_source("input", DType::I32, &[N]);
    let out = reduce::sum_all(&mut g, "total", src)?;

    let input = Buffer::<i32>::from_vec(&[N], noise_i32(N, 67));
    let mut bindings = Bindings::new();
    bindings.bind(src, &input);

    let mut pipe = Pipeline::new(g, vec![out]);
    let mut bufs = [Buffer::<i32>::new(&[])];
    time_pipeline(ex, &mut pipe, &bindings, &mut bufs)
}

fn bench_unsharp(ex: &Executor) -> KernelResult {
    const W: usize = 128;
    const H: usize = 128;
    let mut g = Graph::new();
    let img = g.add_source("input", DType::F32, &[W, H]);
    let mask = g.add_source("mask", DType::I32, &[3, 3]);
    let edged = repeat_edge(&mut g, img)?;
    let out = enhance::unsharp(&mut g, "unsharp", edged, mask)?;

    // Offset away from zero so the ratio never divides by zero.
    let data: Vec<f32> = noise_f32(W * H, 71).into_iter().map(|v| v + 1.0).collect();
    let input = Buffer::<f32>::from_vec(&[W, H], data);
    let smooth = Buffer::<i32>::from_vec(&[3, 3], masks::SMOOTH_3X3.to_vec());
    let mut bindings = Bindings::new();
    bindings.bind(img, &input);
    bindings.bind(mask, &smooth);

    let mut pipe = Pipeline::new(g, vec![out]).with_bounds(out, &[W, H]);
    let mut bufs = [Buffer::<f32>::new(&[W, H])];
    time_pipeline(ex, &mut pipe, &bindings, &mut bufs)
}

fn bench_laplace(ex: &Executor) -> KernelResult {
    const W: usize = 128;
    const H: usize = 128;
    let mut g = Graph::new();
    let img = g.add_source("input", DType::U8, &[W, H]);
    let mask = g.add_source("mask", DType::F32, &[5, 5]);
    let edged = repeat_edge(&mut g, img)?;
    let out = enhance::laplace_sharpen(&mut g, "laplace", edged, mask)?;

    let data: Vec<u8> = noise_u32(W * H, 73).into_iter().map(|v| v as u8).collect();
    let input = Buffer::<u8>::from_vec(&[W, H], data);
    let dog = Buffer::<f32>::from_vec(&[5, 5], masks::LAPLACE_5X5.to_vec());
    let mut bindings = Bindings::new();
    bindings.bind(img, &input);
    bindings.bind(mask, &dog);

    let mut pipe = Pipeline::new(g, vec![out]).with_bounds(out, &[W, H]);
    let mut bufs = [Buffer::<u8>::new(&[W, H])];
    time_pipeline(ex, &mut pipe, &bindings, &mut bufs)
}

fn bench_prewitt(ex: &Executor) -> KernelResult {
    const W: usize = 128;
    const H: usize = 128;
    let mut g = Graph::new();
    let img = g.add_source("input", DType::F32, &[W, H]);
    let mx = g.add_source("grad_x", DType::I32, &[3, 3]);
    let my = g.add_source("grad_y", DType::I32, &[3, 3]);
    let edged = repeat_edge(&mut g, img)?;
    let out = enhance::prewitt(&mut g, "prewitt", edged, mx, my)?;

    let input = Buffer::<f32>::from_vec(&[W, H], noise_f32(W * H, 79));
    let bx = Buffer::<i32>::from_vec(&[3, 3], masks::GRAD_X_3X3.to_vec());
    let by = Buffer::<i32>::from_vec(&[3, 3], masks::GRAD_Y_3X3.to_vec());
    let mut bindings = Bindings::new();
    bindings.bind(img, &input);
    bindings.bind(mx, &bx);
    bindings.bind(my, &by);

    let mut pipe = Pipeline::new(g, vec![out]).with_bounds(out, &[W, H]);
    let mut bufs = [Buffer::<f32>::new(&[W, H])];
    time_pipeline(ex, &mut pipe, &bindings, &mut bufs)
}

fn bench_enhance(ex: &Executor) -> KernelResult {
    const W: usize = 64;
    const H: usize = 64;
    const COPIES: usize = 10;
    let mut g = Graph::new();
    let img = g.add_source("input", DType::F32, &[W, H]);
    let mask = g.add_source("mask", DType::F32, &[3, 3]);
    let edged = repeat_edge(&mut g, img)?;
    let outs = enhance::enhance(&mut g, "enhance", edged, mask, 2, 0.6, COPIES)?;

    let input = Buffer::<f32>::from_vec(&[W, H], noise_f32(W * H, 83));
    let avg = Buffer::<f32>::from_vec(&[3, 3], masks::AVG_3X3.to_vec());
    let mut bindings = Bindings::new();
    bindings.bind(img, &input);
    bindings.bind(mask, &avg);

    let mut pipe = Pipeline::new(g, outs.clone());
    for &o in &outs {
        pipe = pipe.with_bounds(o, &[W, H]);
    }
    let mut bufs: Vec<Buffer<f32>> = (0..COPIES).map(|_| Buffer::new(&[W, H])).collect();
    time_pipeline(ex, &mut pipe, &bindings, &mut bufs)
}

const KERNELS: &[(&str, fn(&Executor) -> KernelResult)] = &[
    ("gaussian", bench_gaussian),
    ("bilateral", bench_bilateral),
    ("pyramid", bench_pyramid),
    ("mosaic", bench_mosaic),
    ("nightfilter", bench_nightfilter),
    ("nightpipeline", bench_nightpipeline),
    ("shitomasi", bench_shitomasi),
    ("reduce", bench_reduce),
    ("unsharp", bench_unsharp),
    ("laplace", bench_laplace),
    ("prewitt", bench_prewitt),
    ("enhance", bench_enhance),
];

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let selected: Vec<_> = if args.is_empty() {
        KERNELS.to_vec()
    } else {
        let mut picked = Vec::new();
        for name in &args {
            match KERNELS.iter().find(|(n, _)| n == name) {
                Some(k) => picked.push(*k),
                None => {
                    eprintln!("[pyrite] unknown kernel '{name}'");
                    eprintln!(
                        "[pyrite] available: {}",
                        KERNELS
                            .iter()
                            .map(|(n, _)| *n)
                            .collect::<Vec<_>>()
                            .join(" ")
                    );
                    return ExitCode::SUCCESS;
                }
            }
        }
        picked
    };

    let ex = Executor::new();
    for (name, run) in selected {
        match run(&ex) {
            Ok(ms) => println!("{name}: {ms:.3} ms"),
            Err(e) => eprintln!("[pyrite] {name} failed: {e}"),
        }
    }
    ExitCode::SUCCESS
}
