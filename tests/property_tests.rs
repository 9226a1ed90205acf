//! Property-based tests for the partitioned matrix profile engine.
//!
//! Integer-valued series with a power-of-two window keep every dot product
//! exact on both the bootstrap and the recurrence path, so results can be
//! compared bit for bit across partition layouts.

use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use stump_rs::algorithms::common::sliding_dot_product_fft;
use stump_rs::{
    CursorPhase, JoinMode, MatrixProfile, MatrixProfileConfig, MatrixProfileEngine,
};

fn integer_series(len: usize, max: i32, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(0..=max) as f64).collect()
}

fn noisy_series(len: usize, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..len)
        .map(|i| (i as f64 * 0.17).sin() * 3.0 + rng.gen_range(-0.5..0.5))
        .collect()
}

fn run(ts: &[f64], q: Option<&[f64]>, config: MatrixProfileConfig) -> MatrixProfile {
    MatrixProfileEngine::new(ts, q, config).unwrap().run().unwrap()
}

/// Every row's exclusion-masked distance profile, from one sequential cursor.
fn all_row_profiles(engine: &MatrixProfileEngine<'_>) -> Vec<Vec<f64>> {
    let mut cursor = engine.row_cursor(0..engine.n_rows()).unwrap();
    let mut rows = Vec::with_capacity(engine.n_rows());
    while cursor.advance().unwrap().is_some() {
        rows.push(cursor.distance_profile().to_vec());
    }
    assert_eq!(cursor.phase(), CursorPhase::Exhausted);
    rows
}

/// Plain z-normalized Euclidean distance with the default constant conventions.
fn brute_force_distance(a: &[f64], b: &[f64]) -> f64 {
    let m = a.len() as f64;
    let stats = |s: &[f64]| {
        let mu = s.iter().sum::<f64>() / m;
        let sd = (s.iter().map(|x| (x - mu).powi(2)).sum::<f64>() / m).sqrt();
        (mu, sd)
    };
    let (mu_a, sd_a) = stats(a);
    let (mu_b, sd_b) = stats(b);
    let const_a = a.iter().all(|&x| x == a[0]);
    let const_b = b.iter().all(|&x| x == b[0]);
    match (const_a, const_b) {
        (true, true) => 0.0,
        (true, false) | (false, true) => (2.0 * m).sqrt(),
        _ => a
            .iter()
            .zip(b)
            .map(|(x, y)| ((x - mu_a) / sd_a - (y - mu_b) / sd_b).powi(2))
            .sum::<f64>()
            .sqrt(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    // Property: the partition layout never changes the result, ties included
    #[test]
    fn prop_partition_invariance(
        seed in any::<u64>(),
        len in 12usize..160,
        max in 1i32..6,
        log_m in 2u32..4,
        workers in 2usize..12,
    ) {
        let m = 1usize << log_m;
        prop_assume!(len >= m);
        let ts = integer_series(len, max, seed);

        let single = run(&ts, None, MatrixProfileConfig::new(m).with_num_workers(1));
        let two = run(&ts, None, MatrixProfileConfig::new(m).with_num_workers(2));
        let many = run(&ts, None, MatrixProfileConfig::new(m).with_num_workers(workers));

        prop_assert_eq!(&single, &two);
        prop_assert_eq!(&single, &many);
    }

    // Property: merging partials in any order gives the same profile
    #[test]
    fn prop_merge_order_invariance(
        seed in any::<u64>(),
        len in 20usize..120,
        split_a in 0.0f64..1.0,
        split_b in 0.0f64..1.0,
    ) {
        let m = 4;
        let ts = integer_series(len, 3, seed);
        let engine = MatrixProfileEngine::new(&ts, None, MatrixProfileConfig::new(m)).unwrap();
        let rows = engine.n_rows();
        let mut cuts = [
            (split_a * rows as f64) as usize,
            (split_b * rows as f64) as usize,
        ];
        cuts.sort_unstable();

        let ranges = [0..cuts[0], cuts[0]..cuts[1], cuts[1]..rows];
        let partials: Vec<_> = ranges
            .iter()
            .map(|r| engine.compute_partition(r.clone()).unwrap())
            .collect();

        let mut forward = partials[0].clone();
        forward.merge(&partials[1]).unwrap();
        forward.merge(&partials[2]).unwrap();

        let mut backward = partials[2].clone();
        backward.merge(&partials[0]).unwrap();
        backward.merge(&partials[1]).unwrap();

        let a = engine.finish(forward).unwrap();
        let b = engine.finish(backward).unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(&a, &engine.run().unwrap());
    }

    // Property: exact ties resolve to the lowest row index
    #[test]
    fn prop_ties_resolve_to_lowest_row(
        seed in any::<u64>(),
        len in 12usize..80,
        workers in 1usize..6,
    ) {
        let m = 4;
        let ts = integer_series(len, 2, seed);
        let engine = MatrixProfileEngine::new(
            &ts,
            None,
            MatrixProfileConfig::new(m).with_num_workers(workers),
        )
        .unwrap();
        let rows = all_row_profiles(&engine);
        let mp = engine.run().unwrap();

        for j in 0..mp.len() {
            let best = rows.iter().map(|r| r[j]).fold(f64::INFINITY, f64::min);
            let expected = if best.is_finite() {
                rows.iter().position(|r| r[j] == best)
            } else {
                None
            };
            prop_assert_eq!(mp.index[j], expected, "column {}", j);
            prop_assert_eq!(mp.distance[j], best);
        }
    }

    // Property: the FFT bootstrap and the O(1) recurrence agree on every row,
    // dot products to 1e-9 relative and distances to 1e-7 relative
    #[test]
    fn prop_recurrence_matches_fft(
        seed in any::<u64>(),
        len in 30usize..200,
        m in 6usize..20,
    ) {
        prop_assume!(len >= m);
        let ts = noisy_series(len, seed);
        let engine = MatrixProfileEngine::new(&ts, None, MatrixProfileConfig::new(m)).unwrap();
        let norms: Vec<f64> = ts
            .windows(m)
            .map(|w| w.iter().map(|x| x * x).sum::<f64>().sqrt())
            .collect();

        let mut cursor = engine.row_cursor(0..engine.n_rows()).unwrap();
        while let Some(i) = cursor.advance().unwrap() {
            let qt_fft = sliding_dot_product_fft(&ts[i..i + m], &ts).unwrap();
            for (j, (&a, &b)) in cursor.dot_products().iter().zip(&qt_fft).enumerate() {
                let tol = 1e-9 * (norms[i] * norms[j] + 1.0);
                prop_assert!((a - b).abs() <= tol, "qt ({}, {}): {} vs {}", i, j, a, b);
            }

            let reference = engine.distance_profile(i).unwrap();
            for (j, (&a, &b)) in cursor.distance_profile().iter().zip(&reference).enumerate() {
                if a.is_infinite() || b.is_infinite() {
                    prop_assert_eq!(a, b, "exclusion mismatch at ({}, {})", i, j);
                } else if a > 0.1 && b > 0.1 {
                    prop_assert!((a - b).abs() <= 1e-7 * b, "({}, {}): {} vs {}", i, j, a, b);
                } else {
                    prop_assert!((a - b).abs() <= 1e-6, "({}, {}): {} vs {}", i, j, a, b);
                }
            }
        }
        prop_assert_eq!(cursor.phase(), CursorPhase::Exhausted);
    }

    // Property: every reported neighbor is outside the exclusion zone and
    // matches a brute-force scan
    #[test]
    fn prop_matches_brute_force(
        seed in any::<u64>(),
        len in 20usize..90,
        m in 3usize..12,
        factor in 0.0f64..1.5,
    ) {
        prop_assume!(len >= m);
        let ts = noisy_series(len, seed);
        let config = MatrixProfileConfig::new(m).with_exclusion_zone_factor(factor);
        let mp = run(&ts, None, config);
        let zone = mp.exclusion_zone.unwrap();
        let n_subs = len - m + 1;

        for j in 0..n_subs {
            let best = (0..n_subs)
                .filter(|&i| i.abs_diff(j) > zone)
                .map(|i| brute_force_distance(&ts[i..i + m], &ts[j..j + m]))
                .fold(f64::INFINITY, f64::min);
            match mp.index[j] {
                Some(i) => {
                    prop_assert!(i.abs_diff(j) > zone);
                    prop_assert!((mp.distance[j] - best).abs() < 1e-6);
                }
                None => prop_assert!(best.is_infinite()),
            }
        }
    }

    // Property: an AB-join reports one neighbor per query subsequence
    #[test]
    fn prop_ab_join_shape(
        seed in any::<u64>(),
        len_t in 16usize..100,
        len_q in 16usize..100,
        m in 4usize..16,
    ) {
        let t = noisy_series(len_t, seed);
        let q = noisy_series(len_q, seed.wrapping_add(1));
        let config = MatrixProfileConfig::new(m).with_join_mode(JoinMode::AbJoin);
        let mp = run(&t, Some(q.as_slice()), config);

        prop_assert_eq!(mp.len(), len_q - m + 1);
        for j in 0..mp.len() {
            let i = mp.index[j].unwrap();
            prop_assert!(i < len_t - m + 1);
            let d = brute_force_distance(&t[i..i + m], &q[j..j + m]);
            prop_assert!((mp.distance[j] - d).abs() < 1e-6);
        }
    }
}
