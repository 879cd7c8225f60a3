//! Post-run aggregation and rendering.

use serde::Serialize;

use crate::config::Config;
use crate::recorder::LatencyRecorder;

/// One row of the cumulative latency distribution: `percent` of all requests
/// completed within `millis` milliseconds.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PercentileRow {
    pub percent: f64,
    pub millis: u64,
}

/// Final aggregation of a completed run.
#[derive(Debug, Serialize)]
pub struct Report {
    pub title: String,
    pub finished: usize,
    pub elapsed_secs: f64,
    pub concurrency: usize,
    pub payload_size: usize,
    pub keep_alive: bool,
    /// Cumulative distribution at millisecond granularity. Bucket boundaries
    /// are determined by the data, not a fixed grid, which gives finer
    /// resolution where most of the mass concentrates. The final row is
    /// always exactly 100% at the maximum observed latency.
    pub table: Vec<PercentileRow>,
    pub requests_per_second: f64,
}

impl Report {
    pub fn from_run(title: impl Into<String>, cfg: &Config, recorder: &LatencyRecorder) -> Self {
        let finished = recorder.finished();
        let elapsed_secs = recorder.elapsed().as_secs_f64();

        let mut sorted = recorder.samples().to_vec();
        sorted.sort_unstable();

        let mut table = Vec::new();
        let mut cur_millis = 0u64;
        for (i, &micros) in sorted.iter().enumerate() {
            let millis = micros / 1_000;
            if millis != cur_millis || i == finished - 1 {
                cur_millis = millis;
                table.push(PercentileRow {
                    percent: (i + 1) as f64 * 100.0 / finished as f64,
                    millis,
                });
            }
        }

        Self {
            title: title.into(),
            finished,
            elapsed_secs,
            concurrency: cfg.concurrency,
            payload_size: cfg.payload_size,
            keep_alive: cfg.keep_alive,
            table,
            requests_per_second: finished as f64 / elapsed_secs.max(1e-3),
        }
    }

    /// Render the report to stdout; `quiet` reduces it to the single
    /// requests-per-second line.
    #[allow(clippy::print_stdout)]
    pub fn print(&self, quiet: bool) {
        if quiet {
            println!(
                "{}: {:.2} requests per second",
                self.title, self.requests_per_second
            );
            return;
        }

        println!("====== {} ======", self.title);
        println!(
            "  {} requests completed in {:.2} seconds",
            self.finished, self.elapsed_secs
        );
        println!("  {} parallel clients", self.concurrency);
        println!("  {} bytes payload", self.payload_size);
        println!("  keep alive: {}", self.keep_alive as u8);
        println!();
        for row in &self.table {
            println!("{:.2}% <= {} milliseconds", row.percent, row.millis);
        }
        println!("{:.2} requests per second", self.requests_per_second);
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder_with(samples: &[u64]) -> LatencyRecorder {
        let mut rec = LatencyRecorder::with_budget(samples.len());
        for (i, &s) in samples.iter().enumerate() {
            rec.record(i, s);
        }
        rec.finish();
        rec
    }

    #[test]
    fn table_is_monotonic_and_ends_at_100_percent() {
        let cfg = Config::default();
        // Unsorted on purpose; the report sorts.
        let rec = recorder_with(&[4_200, 900, 1_300, 950, 12_700, 1_100]);
        let report = Report::from_run("GET", &cfg, &rec);

        let mut last_percent = 0.0;
        let mut last_millis = 0;
        for row in &report.table {
            assert!(row.percent >= last_percent);
            assert!(row.millis >= last_millis);
            last_percent = row.percent;
            last_millis = row.millis;
        }

        let last = report.table.last().expect("non-empty table");
        assert_eq!(last.percent, 100.0);
        // Maximum observed latency was 12.7 ms.
        assert_eq!(last.millis, 12);
    }

    #[test]
    fn one_sample_yields_one_full_row() {
        let cfg = Config {
            concurrency: 1,
            requests: 1,
            ..Config::default()
        };
        let rec = recorder_with(&[750]);
        let report = Report::from_run("PING", &cfg, &rec);

        assert_eq!(report.finished, 1);
        assert_eq!(report.table.len(), 1);
        assert_eq!(report.table[0].percent, 100.0);
        assert_eq!(report.table[0].millis, 0);
        assert!(report.requests_per_second > 0.0);
    }

    #[test]
    fn same_bucket_collapses_to_one_row() {
        let cfg = Config::default();
        let rec = recorder_with(&[100, 200, 300, 400]);
        let report = Report::from_run("INCR", &cfg, &rec);

        // All samples are sub-millisecond: a single 100% row at 0 ms.
        assert_eq!(report.table.len(), 1);
        assert_eq!(report.table[0].percent, 100.0);
        assert_eq!(report.table[0].millis, 0);
    }

    #[test]
    fn report_serializes_to_json() {
        let cfg = Config::default();
        let rec = recorder_with(&[1_500]);
        let report = Report::from_run("SET", &cfg, &rec);

        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["title"], "SET");
        assert_eq!(json["finished"], 1);
        assert_eq!(json["table"][0]["millis"], 1);
    }
}
