//! Basic matrix profile computation with stump-rs.
//!
//! Computes the z-normalized Euclidean self-join matrix profile of a noisy
//! sine wave with an injected anomaly, then reports the top motif pair and
//! the top discord.
//!
//! Run with: cargo run --release --example basic_matrix_profile

use stump_rs::{compute_matrix_profile, MatrixProfileConfig};

fn main() -> stump_rs::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let n = 2_000;
    let m = 50; // subsequence length

    let mut ts: Vec<f64> = (0..n)
        .map(|i| {
            let t = i as f64;
            let base = (t * std::f64::consts::TAU / 100.0).sin();
            let noise = ((t * 7.3).sin() * (t * 13.7).cos()) * 0.05;
            base + noise
        })
        .collect();
    // A short burst that appears nowhere else
    for (k, v) in ts[1_200..1_230].iter_mut().enumerate() {
        *v += 0.8 * (k as f64 * 0.9).sin();
    }

    let config = MatrixProfileConfig::new(m).with_diagnostics(true);
    let mp = compute_matrix_profile(&ts, None, &config)?;

    println!("Time series length: {n}");
    println!("Subsequence length: {m}");
    println!("Exclusion zone:     {:?}", mp.exclusion_zone);
    println!("Matrix profile length: {}", mp.len());

    if let Some(motif) = mp.motif_index() {
        println!("\nBest matching pair:");
        println!("  Subsequence at index {motif}");
        println!("  Nearest neighbor at index {:?}", mp.index[motif]);
        println!("  Distance: {:.6}", mp.distance[motif]);
    }

    if let Some(discord) = mp.discord_index() {
        println!("\nMost anomalous subsequence:");
        println!("  Index: {discord}");
        println!("  Distance: {:.6}", mp.distance[discord]);
    }

    if let Some(diagnostics) = mp.diagnostics {
        println!("\nDiagnostics: {diagnostics:?}");
    }
    Ok(())
}
