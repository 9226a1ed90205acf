//! AB-join: comparing two time series.
//!
//! For each subsequence of the query series, finds its nearest neighbor in
//! the reference series. Shared patterns show up as low distances.
//!
//! Run with: cargo run --release --example ab_join

use stump_rs::{compute_matrix_profile, MatrixProfileConfig};

fn main() -> stump_rs::Result<()> {
    let m = 30;

    // Reference series: sine wave with two embedded Gaussian pulses
    let reference: Vec<f64> = (0..400)
        .map(|i| {
            let t = i as f64;
            let mut val = (t * std::f64::consts::TAU / 80.0).sin() * 0.5;
            for center in [100.0, 300.0] {
                val += 2.0 * (-(t - center).powi(2) / 50.0).exp();
            }
            val
        })
        .collect();

    // Query series: different base signal with one matching pulse at 150
    let query: Vec<f64> = (0..300)
        .map(|i| {
            let t = i as f64;
            (t * std::f64::consts::TAU / 60.0).cos() * 0.5
                + 2.0 * (-(t - 150.0).powi(2) / 50.0).exp()
        })
        .collect();

    let mp = compute_matrix_profile(&reference, Some(query.as_slice()), &MatrixProfileConfig::new(m))?;

    println!("Reference length: {}", reference.len());
    println!("Query length:     {}", query.len());
    println!("Profile length:   {}", mp.len());

    if let Some(best) = mp.motif_index() {
        println!("\nBest shared pattern:");
        println!("  Query subsequence at {best}");
        println!("  Reference subsequence at {:?}", mp.index[best]);
        println!("  Distance: {:.6}", mp.distance[best]);
    }

    // The pulse in the query is centered at 150; its window starts near 135
    let window = 135;
    println!(
        "\nQuery window {window} -> reference {:?} (distance {:.4})",
        mp.index[window], mp.distance[window]
    );
    Ok(())
}
