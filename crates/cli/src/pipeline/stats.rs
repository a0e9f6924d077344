//! Run statistics.

use std::time::Duration;

use observability::DeliveryStatsAggregator;

/// Statistics from one replay run
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// Non-empty input lines read
    pub lines_read: u64,

    /// Lines skipped as malformed
    pub parse_errors: u64,

    /// `emits` calls issued (one per run of same-tag lines)
    pub batches: u64,

    /// Events accepted by an output
    pub events_routed: u64,

    /// Events whose tag had no route
    pub route_misses: u64,

    /// Events in calls an output rejected
    pub events_rejected: u64,

    /// Outputs whose teardown reported an error
    pub teardown_failures: usize,

    /// Total duration of the run
    pub duration: Duration,

    /// Per-output delivery statistics, collected after teardown
    pub delivery: DeliveryStatsAggregator,
}

impl RunStats {
    /// Events per second accepted by outputs
    pub fn events_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.events_routed as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Run Statistics ===\n");
        println!("Input");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Lines read: {}", self.lines_read);
        println!("   ├─ Malformed lines: {}", self.parse_errors);
        println!("   ├─ Batches: {}", self.batches);
        println!("   ├─ Events routed: {}", self.events_routed);
        println!("   ├─ Events without route: {}", self.route_misses);
        println!("   ├─ Events rejected: {}", self.events_rejected);
        println!("   └─ Events/s: {:.2}", self.events_per_sec());

        if self.teardown_failures > 0 {
            println!("\nTeardown failures: {}", self.teardown_failures);
        }

        println!("\n{}", self.delivery.summary());
    }
}
