#[allow(dead_code)]
mod common;

use ddm_core::consts::DISPLAY_PERCENTILE;
use ddm_core::ddm::spectrum::{fftshift, percentile};
use ddm_core::ddm::{display_ceiling, pair_start_indices, spectrum_diff, time_averaged};
use ddm_core::error::DdmError;
use ddm_core::io::cache::FrameCache;
use ddm_core::io::source::ArraySource;
use ndarray::Array2;

use common::*;

// ---------------------------------------------------------------------------
// Spectral difference
// ---------------------------------------------------------------------------

#[test]
fn test_identical_frames_give_zero_spectrum() {
    let f = random_frames(8, 8, 1, 4).remove(0);
    let s = spectrum_diff(&f, &f).unwrap();
    assert!(s.iter().all(|&v| v == 0.0));
}

#[test]
fn test_constant_offset_lands_in_dc() {
    let a = Array2::<f32>::zeros((4, 6));
    let b = Array2::<f32>::from_elem((4, 6), 2.0);
    let s = spectrum_diff(&a, &b).unwrap();
    // |sum of 24 cells of 2|² = 48²
    assert!((s[[0, 0]] - 2304.0).abs() < 1e-9);
    let rest: f64 = s.iter().sum::<f64>() - s[[0, 0]];
    assert!(rest.abs() < 1e-9);
}

#[test]
fn test_single_cosine_peaks_at_its_frequency() {
    let (h, w) = (8usize, 16usize);
    let a = Array2::<f32>::zeros((h, w));
    let b = Array2::from_shape_fn((h, w), |(_, c)| {
        (2.0 * std::f32::consts::PI * 3.0 * c as f32 / w as f32).cos()
    });
    let s = spectrum_diff(&a, &b).unwrap();
    // A cosine splits between +3 and -3 along the row axis: (h·w/2)² each.
    let expected = ((h * w) as f64 / 2.0).powi(2);
    assert!((s[[0, 3]] - expected).abs() / expected < 1e-5);
    assert!((s[[0, w - 3]] - expected).abs() / expected < 1e-5);
    assert!(s[[1, 3]] < 1e-6 * expected);
}

#[test]
fn test_spectrum_is_symmetric_in_argument_order() {
    let frames = random_frames(6, 10, 2, 8);
    let ab = spectrum_diff(&frames[0], &frames[1]).unwrap();
    let ba = spectrum_diff(&frames[1], &frames[0]).unwrap();
    for (x, y) in ab.iter().zip(ba.iter()) {
        assert!((x - y).abs() <= 1e-9 * x.abs().max(1.0));
    }
}

#[test]
fn test_spectrum_shape_mismatch() {
    let a = Array2::<f32>::zeros((4, 4));
    let b = Array2::<f32>::zeros((4, 5));
    assert!(matches!(
        spectrum_diff(&a, &b),
        Err(DdmError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_fftshift_and_display_ceiling() {
    let mut s = Array2::<f64>::zeros((4, 4));
    s[[0, 0]] = 1.0;
    let shifted = fftshift(&s);
    assert_eq!(shifted[[2, 2]], 1.0);

    let ramp = Array2::from_shape_fn((10, 10), |(r, c)| (r * 10 + c) as f64);
    assert_eq!(percentile(&ramp, 50.0), Some(49.5));
    let ceiling = display_ceiling(&ramp, DISPLAY_PERCENTILE).unwrap();
    assert!((ceiling - 98.01).abs() < 1e-9);
}

// ---------------------------------------------------------------------------
// Pair selection
// ---------------------------------------------------------------------------

#[test]
fn test_pair_starts_evenly_spaced() {
    // 100 frames, lag 10: increment 9.0, starts 0, 9, ..., 81
    let starts = pair_start_indices(100, 10, 10).unwrap();
    assert_eq!(starts, vec![0, 9, 18, 27, 36, 45, 54, 63, 72, 81]);
}

#[test]
fn test_pair_starts_fractional_increment_floors() {
    // 10 frames, lag 3: increment 7/4 = 1.75
    let starts = pair_start_indices(10, 3, 4).unwrap();
    assert_eq!(starts, vec![0, 1, 3, 5]);
}

#[test]
fn test_more_couples_than_pairs_uses_all() {
    let starts = pair_start_indices(20, 15, 300).unwrap();
    assert_eq!(starts, vec![0, 1, 2, 3, 4]);
    for n in 2..40 {
        for dt in 1..n {
            for max in [1, 3, 10, 1000] {
                let starts = pair_start_indices(n, dt, max).unwrap();
                assert!(!starts.is_empty());
                assert!(starts.len() <= max);
                assert!(starts.iter().all(|&t| t + dt < n), "n={n} dt={dt} max={max}");
                assert!(starts.windows(2).all(|w| w[0] < w[1]));
            }
        }
    }
}

#[test]
fn test_degenerate_lags() {
    assert!(matches!(
        pair_start_indices(10, 0, 5),
        Err(DdmError::DegenerateLag { lag: 0, .. })
    ));
    assert!(matches!(
        pair_start_indices(10, 10, 5),
        Err(DdmError::DegenerateLag { lag: 10, frame_count: 10 })
    ));
    assert!(matches!(
        pair_start_indices(10, 2, 0),
        Err(DdmError::InvalidConfig(_))
    ));
}

// ---------------------------------------------------------------------------
// Time averaging
// ---------------------------------------------------------------------------

#[test]
fn test_time_average_cache_equals_source() {
    let frames = random_frames(8, 8, 30, 21);
    let source = ArraySource::new(frames, 10.0).unwrap();
    let cache = FrameCache::build(&source).unwrap();

    for dt in [1, 4, 17, 29] {
        let direct = time_averaged(&source, dt, 10).unwrap();
        let cached = time_averaged(&cache, dt, 10).unwrap();
        assert_eq!(direct, cached, "lag {dt}");
    }
}

#[test]
fn test_time_average_is_mean_of_pair_spectra() {
    let frames = random_frames(4, 4, 6, 5);
    let source = ArraySource::new(frames.clone(), 1.0).unwrap();

    // 6 frames, lag 2, up to 300 couples: starts 0..4
    let avg = time_averaged(&source, 2, 300).unwrap();
    let mut expected = Array2::<f64>::zeros((4, 4));
    for t in 0..4 {
        expected += &spectrum_diff(&frames[t], &frames[t + 2]).unwrap();
    }
    expected /= 4.0;
    for (a, e) in avg.iter().zip(expected.iter()) {
        assert!((a - e).abs() <= 1e-9 * e.abs().max(1.0));
    }
}

#[test]
fn test_time_average_skips_missing_frames() {
    let frames = random_frames(4, 4, 5, 6);
    let gappy = ArraySource::with_gaps(
        vec![
            Some(frames[0].clone()),
            None,
            Some(frames[2].clone()),
            Some(frames[3].clone()),
            Some(frames[4].clone()),
        ],
        1.0,
    )
    .unwrap();

    // Lag 1 pairs: (0,1) and (1,2) lack frame 1; (2,3) and (3,4) remain.
    let avg = time_averaged(&gappy, 1, 100).unwrap();
    let mut expected = spectrum_diff(&frames[2], &frames[3]).unwrap();
    expected += &spectrum_diff(&frames[3], &frames[4]).unwrap();
    expected /= 2.0;
    for (a, e) in avg.iter().zip(expected.iter()) {
        assert!((a - e).abs() <= 1e-9 * e.abs().max(1.0));
    }
}

#[test]
fn test_time_average_without_valid_pairs() {
    let frames = random_frames(2, 2, 3, 6);
    let gappy =
        ArraySource::with_gaps(vec![Some(frames[0].clone()), None, None], 1.0).unwrap();
    assert!(matches!(
        time_averaged(&gappy, 1, 10),
        Err(DdmError::NoValidPairs { lag: 1 })
    ));
}
