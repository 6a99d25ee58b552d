//! Properties of the encoding and data-consistency operators

mod common;

use num_complex::Complex32;
use qsm_unroll::cplx::real_inner;
use qsm_unroll::operators::encoding::{adjoint, forward};
use qsm_unroll::utils::gradient::{divergence, gradient, GradientField};
use qsm_unroll::{
    CoilMaps, CoilShape, ComplexImage, EncodingOperator, ExecutionContext, FlipPattern, ImageShape, KspaceCentering,
    NormalOperator, ReconError, Regularizer, SamplingMask,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use common::{phantom, random_coil_data, random_image, relative_error, two_coil_maps};

#[test]
fn adjointness_holds_for_random_inputs() {
    let mut rng = StdRng::seed_from_u64(42);
    let ctx = ExecutionContext::global();
    let shape = CoilShape::new(2, 4, 3, 10, 8);
    let csm = random_coil_data(&mut rng, shape);
    let mask_values: Vec<f32> = (0..80).map(|_| if rng.gen::<f32>() < 0.4 { 1.0 } else { 0.0 }).collect();
    let mask = SamplingMask::new(1, 10, 8, mask_values).unwrap();
    let flip = FlipPattern::checkerboard(3, 10, 8);

    for centering in [KspaceCentering::None, KspaceCentering::RowsAndCols] {
        let op = EncodingOperator::new(&csm, &mask, Some(&flip), centering).unwrap();
        let x = random_image(&mut rng, op.image_shape());
        let y = random_coil_data(&mut rng, shape);

        let lhs = real_inner(op.forward(&ctx, &x).unwrap().data(), y.data());
        let rhs = real_inner(x.data(), op.adjoint(&ctx, &y).unwrap().data());
        assert!(
            (lhs - rhs).abs() <= 1e-4 * lhs.abs().max(rhs.abs()).max(1.0),
            "<Ax, y> = {}, <x, A'y> = {}",
            lhs,
            rhs
        );
    }
}

#[test]
fn full_sampling_round_trip_recovers_image() {
    let ctx = ExecutionContext::sequential();
    let csm = two_coil_maps(2, 8, 8);
    let mask = SamplingMask::full(1, 8, 8);
    let flip = FlipPattern::checkerboard(2, 8, 8);
    let x = phantom(ImageShape::new(1, 2, 8, 8));

    let y = forward(&ctx, &x, &csm, &mask, Some(&flip)).unwrap();
    let back = adjoint(&ctx, &y, &csm, &mask, Some(&flip)).unwrap();
    assert!(relative_error(&back, &x) < 1e-5);
}

#[test]
fn two_coil_single_echo_scenario() {
    // coil 0 unit, coil 1 linear phase ramp, energy normalized, 8x8, fully sampled
    let ctx = ExecutionContext::sequential();
    let csm = two_coil_maps(1, 8, 8);
    let energy = csm.coil_energy();
    assert!(energy.iter().all(|&e| (e - 1.0).abs() < 1e-5));

    let mask = SamplingMask::full(1, 8, 8);
    let op = EncodingOperator::new(&csm, &mask, None, KspaceCentering::None).unwrap();
    let x = phantom(ImageShape::new(1, 1, 8, 8));

    let recovered = op.normal(&ctx, &x).unwrap();
    assert!(relative_error(&recovered, &x) < 1e-5);
}

#[test]
fn zero_mask_gives_zero_image() {
    let mut rng = StdRng::seed_from_u64(3);
    let ctx = ExecutionContext::sequential();
    let csm = random_coil_data(&mut rng, CoilShape::new(1, 3, 2, 6, 6));
    let mask = SamplingMask::empty(2, 6, 6);
    let op = EncodingOperator::new(&csm, &mask, None, KspaceCentering::Rows).unwrap();
    let x = random_image(&mut rng, op.image_shape());

    let out = op.normal(&ctx, &x).unwrap();
    assert!(out.data().iter().all(|z| *z == Complex32::new(0.0, 0.0)));
}

#[test]
fn gradient_divergence_adjointness() {
    let mut rng = StdRng::seed_from_u64(17);
    let shape = ImageShape::new(2, 3, 7, 9);
    let x = random_image(&mut rng, shape);
    let mut d = GradientField::zeros(shape);
    for z in d.dx.iter_mut().chain(d.dy.iter_mut()) {
        *z = Complex32::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
    }

    let lhs = gradient(&x).inner(&d);
    let rhs = x.inner(&divergence(&d));
    assert!((lhs - rhs).abs() < 1e-3, "{} vs {}", lhs, rhs);
}

#[test]
fn zero_lambda_normal_operator_equals_ata() {
    let mut rng = StdRng::seed_from_u64(5);
    let ctx = ExecutionContext::sequential();
    let csm = random_coil_data(&mut rng, CoilShape::new(1, 2, 2, 6, 4));
    let mask = SamplingMask::new(2, 6, 4, (0..48).map(|i| ((i / 4) % 2) as f32).collect()).unwrap();
    let op = EncodingOperator::new(&csm, &mask, None, KspaceCentering::None).unwrap();
    let x = random_image(&mut rng, op.image_shape());
    let ata = adjoint(&ctx, &forward(&ctx, &x, &csm, &mask, None).unwrap(), &csm, &mask, None).unwrap();

    for reg in [Regularizer::Identity, Regularizer::TvL2, Regularizer::TvL1] {
        let n = NormalOperator::new(&op, 0.0, reg).apply(&ctx, &x).unwrap();
        assert!(relative_error(&n, &ata) < 1e-6, "{:?}", reg);
    }
}

#[test]
fn normal_operator_is_positive_for_linear_regularizers() {
    let mut rng = StdRng::seed_from_u64(8);
    let ctx = ExecutionContext::sequential();
    let csm = random_coil_data(&mut rng, CoilShape::new(1, 2, 1, 6, 6));
    let mask = SamplingMask::full(1, 6, 6);
    let op = EncodingOperator::new(&csm, &mask, None, KspaceCentering::None).unwrap();

    for reg in [Regularizer::Identity, Regularizer::TvL2] {
        let n = NormalOperator::new(&op, 0.5, reg);
        let x = random_image(&mut rng, op.image_shape());
        assert!(x.inner(&n.apply(&ctx, &x).unwrap()) > 0.0);
    }
}

#[test]
fn reference_phase_alignment_keeps_the_normal_operator() {
    // AᴴA only depends on Σ_c |S_c|², so a common phase rotation leaves it unchanged
    let mut rng = StdRng::seed_from_u64(23);
    let ctx = ExecutionContext::sequential();
    let csm: CoilMaps = random_coil_data(&mut rng, CoilShape::new(1, 3, 1, 4, 4));
    let mut aligned = csm.clone();
    aligned.align_reference_phase(0).unwrap();
    assert!(aligned.plane(0, 0, 0).iter().all(|z| z.im.abs() < 1e-5 && z.re >= 0.0));

    let mask = SamplingMask::full(1, 4, 4);
    let x: ComplexImage = random_image(&mut rng, ImageShape::new(1, 1, 4, 4));
    let a = EncodingOperator::new(&csm, &mask, None, KspaceCentering::None).unwrap().normal(&ctx, &x).unwrap();
    let b = EncodingOperator::new(&aligned, &mask, None, KspaceCentering::None).unwrap().normal(&ctx, &x).unwrap();
    assert!(relative_error(&a, &b) < 1e-4);
    assert!(aligned.align_reference_phase(5).is_err());
}

#[test]
fn shape_errors_are_reported() {
    let ctx = ExecutionContext::sequential();
    let csm = two_coil_maps(1, 8, 8);
    let mask = SamplingMask::full(1, 8, 8);
    let wrong_flip = FlipPattern::checkerboard(2, 8, 8);
    assert!(matches!(
        EncodingOperator::new(&csm, &mask, Some(&wrong_flip), KspaceCentering::None),
        Err(ReconError::ShapeMismatch { .. })
    ));

    let op = EncodingOperator::new(&csm, &mask, None, KspaceCentering::None).unwrap();
    let wrong_kspace = qsm_unroll::KSpace::zeros(CoilShape::new(1, 3, 1, 8, 8));
    assert!(op.adjoint(&ctx, &wrong_kspace).is_err());
}
