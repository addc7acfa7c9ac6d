// tests/test_pipelines.rs: end-to-end realization of the kernel graphs.

use pyrite::boundary::repeat_edge;
use pyrite::buffer::{BufMut, Buffer};
use pyrite::graph::Graph;
use pyrite::interp::HostBackend;
use pyrite::masks;
use pyrite::pipeline::{Bindings, Pipeline, RealizeError};
use pyrite::value::DType;
use pyrite::{corner, enhance, nightfilter, pyramid, reduce, stencil};

// ===== Convolution =====

#[test]
fn gaussian_blur_preserves_mean() {
    // The low-pass taps sum to one, so with clamped edges the image
    // mean should survive the blur up to edge effects.
    const W: usize = 32;
    const H: usize = 32;
    let mut g = Graph::new();
    let img = g.add_source("input", DType::F32, &[W, H]);
    let mask = g.add_source("mask", DType::F32, &[3, 3]);
    let edged = repeat_edge(&mut g, img).unwrap();
    let out = stencil::stencil_conv(&mut g, "blur", edged, mask).unwrap();

    let data: Vec<f32> = (0..W * H)
        .map(|i| ((i % W) * 7 + (i / W) * 13) as f32 % 256.0)
        .collect();
    let mean_before: f32 = data.iter().sum::<f32>() / (W * H) as f32;

    let input = Buffer::from_vec(&[W, H], data);
    let kernel = Buffer::from_vec(&[3, 3], masks::GAUSS_LOWPASS_3X3.to_vec());
    let mut bindings = Bindings::new();
    bindings.bind(img, &input);
    bindings.bind(mask, &kernel);

    let mut result = Buffer::<f32>::new(&[W, H]);
    let mut pipe = Pipeline::new(g, vec![out]).with_bounds(out, &[W, H]);
    pipe.realize(&HostBackend::new(), &bindings, &mut [BufMut::from(&mut result)])
        .unwrap();

    let mean_after: f32 = result.as_slice().iter().sum::<f32>() / (W * H) as f32;
    assert!(
        (mean_before - mean_after).abs() < 2.0,
        "mean shifted too much: {mean_before} -> {mean_after}"
    );
}

// ===== Enhancement =====

#[test]
fn unsharp_is_identity_on_constant() {
    // On a flat image the blurred copy equals the original, so the
    // sharpening ratio collapses to one.
    const W: usize = 16;
    const H: usize = 16;
    let mut g = Graph::new();
    let img = g.add_source("input", DType::F32, &[W, H]);
    let mask = g.add_source("mask", DType::I32, &[3, 3]);
    let edged = repeat_edge(&mut g, img).unwrap();
    let out = enhance::unsharp(&mut g, "unsharp", edged, mask).unwrap();

    let input = Buffer::filled(&[W, H], 8.0f32);
    let smooth = Buffer::from_vec(&[3, 3], masks::SMOOTH_3X3.to_vec());
    let mut bindings = Bindings::new();
    bindings.bind(img, &input);
    bindings.bind(mask, &smooth);

    let mut result = Buffer::<f32>::new(&[W, H]);
    let mut pipe = Pipeline::new(g, vec![out]).with_bounds(out, &[W, H]);
    pipe.realize(&HostBackend::new(), &bindings, &mut [BufMut::from(&mut result)])
        .unwrap();

    for &v in result.as_slice() {
        assert_eq!(v, 8.0);
    }
}

#[test]
fn prewitt_is_zero_on_flat_image() {
    const W: usize = 16;
    const H: usize = 16;
    let mut g = Graph::new();
    let img = g.add_source("input", DType::F32, &[W, H]);
    let mx = g.add_source("grad_x", DType::I32, &[3, 3]);
    let my = g.add_source("grad_y", DType::I32, &[3, 3]);
    let edged = repeat_edge(&mut g, img).unwrap();
    let out = enhance::prewitt(&mut g, "prewitt", edged, mx, my).unwrap();

    let input = Buffer::filled(&[W, H], 64.0f32);
    let bx = Buffer::from_vec(&[3, 3], masks::GRAD_X_3X3.to_vec());
    let by = Buffer::from_vec(&[3, 3], masks::GRAD_Y_3X3.to_vec());
    let mut bindings = Bindings::new();
    bindings.bind(img, &input);
    bindings.bind(mx, &bx);
    bindings.bind(my, &by);

    let mut result = Buffer::<f32>::new(&[W, H]);
    let mut pipe = Pipeline::new(g, vec![out]).with_bounds(out, &[W, H]);
    pipe.realize(&HostBackend::new(), &bindings, &mut [BufMut::from(&mut result)])
        .unwrap();

    for &v in result.as_slice() {
        assert_eq!(v, 0.0);
    }
}

#[test]
fn enhance_copies_agree() {
    const W: usize = 12;
    const H: usize = 12;
    let mut g = Graph::new();
    let img = g.add_source("input", DType::F32, &[W, H]);
    let mask = g.add_source("mask", DType::F32, &[3, 3]);
    let edged = repeat_edge(&mut g, img).unwrap();
    let outs = enhance::enhance(&mut g, "enhance", edged, mask, 2, 0.6, 3).unwrap();
    assert_eq!(outs.len(), 3);

    let data: Vec<f32> = (0..W * H).map(|i| (i % 97) as f32 + 1.0).collect();
    let input = Buffer::from_vec(&[W, H], data);
    let avg = Buffer::from_vec(&[3, 3], masks::AVG_3X3.to_vec());
    let mut bindings = Bindings::new();
    bindings.bind(img, &input);
    bindings.bind(mask, &avg);

    let mut pipe = Pipeline::new(g, outs.clone());
    for &o in &outs {
        pipe = pipe.with_bounds(o, &[W, H]);
    }
    let mut a = Buffer::<f32>::new(&[W, H]);
    let mut b = Buffer::<f32>::new(&[W, H]);
    let mut c = Buffer::<f32>::new(&[W, H]);
    pipe.realize(
        &HostBackend::new(),
        &bindings,
        &mut [
            BufMut::from(&mut a),
            BufMut::from(&mut b),
            BufMut::from(&mut c),
        ],
    )
    .unwrap();

    assert_eq!(a.as_slice(), b.as_slice());
    assert_eq!(b.as_slice(), c.as_slice());
}

// ===== Pyramids =====

#[test]
fn laplacian_reconstruction_tracks_a_checkerboard() {
    // Split into bands, recombine untouched. The recombination is not
    // an exact inverse, but on a coarse checkerboard it must stay
    // close to the input.
    const W: usize = 32;
    const H: usize = 32;
    const LEVELS: usize = 3;
    let mut g = Graph::new();
    let img = g.add_source("input", DType::F32, &[W, H]);
    let lowpass = g.add_source("lowpass", DType::F32, &[3, 3]);
    let edged = repeat_edge(&mut g, img).unwrap();
    let gauss = pyramid::gaussian_pyramid(&mut g, "gp", edged, (W, H), LEVELS, lowpass).unwrap();
    let lap = pyramid::laplacian_pyramid(&mut g, "lp", &gauss).unwrap();
    let out = pyramid::reconstruct(&mut g, "rec", &lap).unwrap();

    // 8x8 blocks of 0 / 255.
    let data: Vec<f32> = (0..W * H)
        .map(|i| {
            let bx = (i % W) / 8;
            let by = (i / W) / 8;
            if (bx + by) % 2 == 0 { 255.0 } else { 0.0 }
        })
        .collect();
    let input = Buffer::from_vec(&[W, H], data.clone());
    let lp = Buffer::from_vec(&[3, 3], masks::GAUSS_LOWPASS_3X3.to_vec());
    let mut bindings = Bindings::new();
    bindings.bind(img, &input);
    bindings.bind(lowpass, &lp);

    let mut result = Buffer::<f32>::new(&[W, H]);
    let mut pipe = Pipeline::new(g, vec![out]).with_bounds(out, &[W, H]);
    pipe.realize(&HostBackend::new(), &bindings, &mut [BufMut::from(&mut result)])
        .unwrap();

    let mse: f64 = result
        .as_slice()
        .iter()
        .zip(&data)
        .map(|(&o, &i)| (o as f64 - i as f64).powi(2))
        .sum::<f64>()
        / (W * H) as f64;
    let psnr = 10.0 * (255.0f64 * 255.0 / mse).log10();
    assert!(psnr > 8.0, "reconstruction too lossy: {psnr:.1} dB");
}

// ===== Night filter =====

#[test]
fn night_filter_output_is_opaque_grayscale() {
    // The tonemap ends by clamping the red channel and reusing the
    // clamped value for green and blue, so every output pixel is gray
    // with full alpha.
    const W: usize = 16;
    const H: usize = 16;
    let spacings = [1usize, 2, 4, 8];
    let mut g = Graph::new();
    let img = g.add_source("input", DType::U32, &[W, H]);
    let mask_srcs: Vec<_> = spacings
        .iter()
        .map(|&s| {
            let (_, size) = masks::atrous_mask(s);
            g.add_source(&format!("mask{size}"), DType::F32, &[size, size])
        })
        .collect();
    let edged = repeat_edge(&mut g, img).unwrap();
    let out = nightfilter::night_filter(&mut g, "night", edged, &mask_srcs).unwrap();

    let data: Vec<u32> = (0..W * H)
        .map(|i| {
            let r = (i * 31 % 256) as u32;
            let gc = (i * 57 % 256) as u32;
            let b = (i * 93 % 256) as u32;
            r | (gc << 8) | (b << 16) | (255 << 24)
        })
        .collect();
    let input = Buffer::from_vec(&[W, H], data);
    let mask_bufs: Vec<_> = spacings
        .iter()
        .map(|&s| {
            let (m, size) = masks::atrous_mask(s);
            Buffer::from_vec(&[size, size], m)
        })
        .collect();
    let mut bindings = Bindings::new();
    bindings.bind(img, &input);
    for (&src, buf) in mask_srcs.iter().zip(&mask_bufs) {
        bindings.bind(src, buf);
    }

    let mut result = Buffer::<u32>::new(&[W, H]);
    let mut pipe = Pipeline::new(g, vec![out]).with_bounds(out, &[W, H]);
    pipe.realize(&HostBackend::new(), &bindings, &mut [BufMut::from(&mut result)])
        .unwrap();

    for &px in result.as_slice() {
        let r = px & 0xff;
        let gc = (px >> 8) & 0xff;
        let b = (px >> 16) & 0xff;
        let a = (px >> 24) & 0xff;
        assert_eq!(a, 255, "alpha must be opaque");
        assert_eq!(r, gc, "red and green diverge: {px:#010x}");
        assert_eq!(gc, b, "green and blue diverge: {px:#010x}");
    }
}

// ===== Corners =====

#[test]
fn corner_response_is_binary() {
    const W: usize = 32;
    const H: usize = 32;
    let mut g = Graph::new();
    let img = g.add_source("input", DType::I32, &[W, H]);
    let mx = g.add_source("grad_x", DType::I32, &[3, 3]);
    let my = g.add_source("grad_y", DType::I32, &[3, 3]);
    let mg = g.add_source("smooth", DType::I32, &[3, 3]);
    let edged = repeat_edge(&mut g, img).unwrap();
    let out = corner::shi_tomasi(
        &mut g,
        "corners",
        edged,
        mx,
        my,
        mg,
        corner::DEFAULT_CORNER_THRESHOLD,
    )
    .unwrap();

    // Bright block on a dark field.
    let mut data = vec![0i32; W * H];
    for y in 8..24 {
        for x in 8..24 {
            data[x + y * W] = 4095;
        }
    }
    let input = Buffer::from_vec(&[W, H], data);
    let bx = Buffer::from_vec(&[3, 3], masks::GRAD_X_3X3.to_vec());
    let by = Buffer::from_vec(&[3, 3], masks::GRAD_Y_3X3.to_vec());
    let bg = Buffer::from_vec(&[3, 3], masks::SMOOTH_3X3.to_vec());
    let mut bindings = Bindings::new();
    bindings.bind(img, &input);
    bindings.bind(mx, &bx);
    bindings.bind(my, &by);
    bindings.bind(mg, &bg);

    let mut result = Buffer::<i32>::new(&[W, H]);
    let mut pipe = Pipeline::new(g, vec![out]).with_bounds(out, &[W, H]);
    pipe.realize(&HostBackend::new(), &bindings, &mut [BufMut::from(&mut result)])
        .unwrap();

    let mut hits = 0;
    for &v in result.as_slice() {
        assert!(v == 0 || v == 1, "response must be 0 or 1, got {v}");
        hits += v;
    }
    assert!(hits > 0, "block corners should fire the detector");
}

// ===== Reduction =====

#[test]
fn full_sum_matches_host_fold() {
    const N: usize = 4096;
    let mut g = Graph::new();
    let src = g.add_source("input", DType::I32, &[N]);
    let out = reduce::sum_all(&mut g, "total", src).unwrap();

    let data: Vec<i32> = (0..N)
        .map(|i| (i as i32).wrapping_mul(2654435761u32 as i32) ^ 0xfff)
        .collect();
    let expected = data.iter().fold(0i32, |a, &v| a.wrapping_add(v));

    let input = Buffer::from_vec(&[N], data);
    let mut bindings = Bindings::new();
    bindings.bind(src, &input);

    let mut result = Buffer::<i32>::new(&[]);
    let mut pipe = Pipeline::new(g, vec![out]);
    pipe.realize(&HostBackend::new(), &bindings, &mut [BufMut::from(&mut result)])
        .unwrap();

    assert_eq!(result.as_slice()[0], expected);
}

// ===== Error paths =====

#[test]
fn missing_binding_poisons_the_pipeline() {
    let mut g = Graph::new();
    let img = g.add_source("input", DType::F32, &[4, 4]);
    let mask = g.add_source("mask", DType::F32, &[3, 3]);
    let edged = repeat_edge(&mut g, img).unwrap();
    let out = stencil::stencil_conv(&mut g, "blur", edged, mask).unwrap();

    let input = Buffer::filled(&[4, 4], 1.0f32);
    let mut bindings = Bindings::new();
    bindings.bind(img, &input);
    // mask deliberately left unbound

    let mut result = Buffer::<f32>::new(&[4, 4]);
    let mut pipe = Pipeline::new(g, vec![out]).with_bounds(out, &[4, 4]);
    let backend = HostBackend::new();

    let err = pipe
        .realize(&backend, &bindings, &mut [BufMut::from(&mut result)])
        .unwrap_err();
    assert!(matches!(err, RealizeError::UnboundSource(_)), "got {err:?}");

    let err = pipe
        .realize(&backend, &bindings, &mut [BufMut::from(&mut result)])
        .unwrap_err();
    assert!(matches!(err, RealizeError::Poisoned), "got {err:?}");
}

#[test]
fn wrong_output_shape_is_rejected() {
    let mut g = Graph::new();
    let img = g.add_source("input", DType::F32, &[4, 4]);
    let mask = g.add_source("mask", DType::F32, &[3, 3]);
    let edged = repeat_edge(&mut g, img).unwrap();
    let out = stencil::stencil_conv(&mut g, "blur", edged, mask).unwrap();

    let input = Buffer::filled(&[4, 4], 1.0f32);
    let kernel = Buffer::from_vec(&[3, 3], masks::GAUSS_LOWPASS_3X3.to_vec());
    let mut bindings = Bindings::new();
    bindings.bind(img, &input);
    bindings.bind(mask, &kernel);

    // 8x8 buffer for a 4x4 plan.
    let mut result = Buffer::<f32>::new(&[8, 8]);
    let mut pipe = Pipeline::new(g, vec![out]).with_bounds(out, &[4, 4]);
    let err = pipe
        .realize(&HostBackend::new(), &bindings, &mut [BufMut::from(&mut result)])
        .unwrap_err();
    assert!(matches!(err, RealizeError::OutputMismatch(_)), "got {err:?}");
}
