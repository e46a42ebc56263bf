//! Latency monitoring example.
//!
//! Simulates a request handler that slowly degrades and watches its
//! latency percentiles over a trailing 500ms window:
//! - Recording one latency sample per simulated request
//! - Keeping a labeled baseline series next to the live one
//! - Querying every series at once and reading per-series results
//!
//! Run with: cargo run --example latency_monitor

use event_metrics::{
    Aggregation, DEFAULT_PERCENTILES, LabelFilter, LabelSet, MetricsDatabase, QueryOutput,
};
use std::thread;
use std::time::{Duration, Instant};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Latency Monitor Example ===\n");

    let db = MetricsDatabase::open_temporary()?;

    // A fixed baseline sample so the wildcard query spans two series.
    db.observe("latency", 2.0, [("test", "1")])?;

    for step in (0..200).step_by(25) {
        let pause = Duration::from_millis(step * 10);
        let start = Instant::now();
        thread::sleep(pause);
        let elapsed = start.elapsed().as_secs_f64();

        db.observe("latency", elapsed, LabelSet::null())?;
        println!("request slept {pause:?}, took {elapsed:.3}s");

        let output = db
            .query("latency")?
            .from_timedelta(Duration::from_millis(500))
            .to_percentiles(&DEFAULT_PERCENTILES)?;
        match output {
            QueryOutput::Single(values) => println!("  p50/p90/p95/p99: {values:?}"),
            QueryOutput::Batch(series) => {
                for entry in series {
                    println!("  {:<16} p50/p90/p95/p99: {:?}", entry.labels, entry.result);
                }
            }
        }
    }

    let live = db.query_with("latency", LabelFilter::Null)?;
    println!(
        "\nslowest request: {:?}",
        live.to_scalar(Aggregation::Max)?.single().flatten()
    );
    println!(
        "requests seen: {:?}",
        live.to_scalar(Aggregation::Count)?.single().flatten()
    );

    Ok(())
}
