//! Append-only latency store for one run.
//!
//! Single-threaded by design: every write happens on the event-loop thread,
//! so no synchronization is needed. The sample storage is sized to the full
//! request budget up front to avoid reallocation under load.

use std::time::{Duration, Instant};

/// Per-request latencies (microseconds) plus run timing.
#[derive(Debug)]
pub struct LatencyRecorder {
    samples: Vec<u64>,
    started: Instant,
    elapsed: Option<Duration>,
}

impl LatencyRecorder {
    /// Pre-allocate storage for `budget` samples.
    pub fn with_budget(budget: usize) -> Self {
        Self {
            samples: Vec::with_capacity(budget),
            started: Instant::now(),
            elapsed: None,
        }
    }

    /// (Re)capture the run start. Called once ramp-up is done so connection
    /// setup does not count towards elapsed time.
    pub fn start_clock(&mut self) {
        self.started = Instant::now();
    }

    /// Record the latency for the request completing at `index`.
    ///
    /// Called at most once per index, in completion order, from the single
    /// event-loop thread.
    pub fn record(&mut self, index: usize, micros: u64) {
        debug_assert_eq!(index, self.samples.len(), "completion order violated");
        self.samples.push(micros);
    }

    /// Freeze the elapsed duration at run completion.
    pub fn finish(&mut self) {
        if self.elapsed.is_none() {
            self.elapsed = Some(self.started.elapsed());
        }
    }

    /// Number of recorded samples, i.e. the finished-counter.
    pub fn finished(&self) -> usize {
        self.samples.len()
    }

    pub fn samples(&self) -> &[u64] {
        &self.samples
    }

    /// Elapsed run time: frozen at `finish`, live before that.
    pub fn elapsed(&self) -> Duration {
        self.elapsed.unwrap_or_else(|| self.started.elapsed())
    }

    /// Requests per second so far; used by the periodic progress tick.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64().max(1e-3);
        self.finished() as f64 / secs
    }
}
