//! Driving the engine partition by partition.
//!
//! Each partition could run on a different machine: the engine only needs
//! the row range, and the resulting partial profiles merge in any order.
//! Cancellation is shown at the end.
//!
//! Run with: cargo run --release --example partitioned

use stump_rs::{CancelHandle, Error, MatrixProfileConfig, MatrixProfileEngine};

fn main() -> stump_rs::Result<()> {
    let ts: Vec<f64> = (0..5_000)
        .map(|i| {
            let t = i as f64;
            (t * 0.05).sin() + 0.3 * (t * 0.31).cos()
        })
        .collect();

    let config = MatrixProfileConfig::new(64).with_num_workers(4);
    let engine = MatrixProfileEngine::new(&ts, None, config)?;

    let ranges = engine.partitions();
    println!("{} rows split into {} partitions:", engine.n_rows(), ranges.len());
    for r in &ranges {
        println!("  {:>5}..{:<5}", r.start, r.end);
    }

    // Compute back to front, then merge
    let mut partials = Vec::with_capacity(ranges.len());
    for r in ranges.into_iter().rev() {
        partials.push(engine.compute_partition(r)?);
    }
    let mut merged = partials.remove(0);
    for p in &partials {
        merged.merge(p)?;
    }
    let mp = engine.finish(merged)?;

    let full = engine.run()?;
    let identical = mp.index == full.index;
    println!("\nMerged partitions match a single run: {identical}");

    // Step through the first rows of a partition by hand
    let mut cursor = engine.row_cursor(100..103)?;
    while let Some(row) = cursor.advance()? {
        let nearest = cursor
            .distance_profile()
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        println!("row {row}: phase {:?}, nearest {nearest:.4}", cursor.phase());
    }

    let cancel = CancelHandle::new();
    cancel.cancel();
    match engine.run_with_cancel(&cancel) {
        Err(Error::Cancelled) => println!("\nCancelled run returned no partial result"),
        other => println!("\nUnexpected: {other:?}"),
    }
    Ok(())
}
