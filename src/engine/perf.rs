//! Named-event performance accounting.
//!
//! Each stage records wall-clock durations for the events it owns
//! ("capture", "upscale", "temporal_blend", ...). Aggregation keeps
//! last/min/max/total/count per event, enough for the periodic summary
//! log without retaining per-sample history.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tracing::info;

/// Aggregated statistics for one named event.
#[derive(Clone, Copy, Debug)]
pub struct EventStats {
    pub last: Duration,
    pub min: Duration,
    pub max: Duration,
    pub total: Duration,
    pub count: u64,
}

impl EventStats {
    fn record(&mut self, sample: Duration) {
        self.last = sample;
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);
        self.total += sample;
        self.count += 1;
    }

    pub fn average(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total / self.count as u32
        }
    }
}

/// Thread-safe collector of per-event timing statistics.
#[derive(Debug, Default)]
pub struct PerfTimer {
    events: Mutex<HashMap<String, EventStats>>,
}

impl PerfTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one duration sample into the named event's aggregate.
    pub fn record(&self, name: &str, sample: Duration) {
        let mut events = self.events.lock().unwrap();
        match events.get_mut(name) {
            Some(stats) => stats.record(sample),
            None => {
                events.insert(
                    name.to_owned(),
                    EventStats {
                        last: sample,
                        min: sample,
                        max: sample,
                        total: sample,
                        count: 1,
                    },
                );
            }
        }
    }

    /// Time a closure and attribute the elapsed wall-clock to `name`.
    pub fn time<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        let start = std::time::Instant::now();
        let out = f();
        self.record(name, start.elapsed());
        out
    }

    /// Snapshot of one event's aggregate, if it has been recorded.
    pub fn stats(&self, name: &str) -> Option<EventStats> {
        self.events.lock().unwrap().get(name).copied()
    }

    /// Snapshot of every event, sorted by name for stable output.
    pub fn summaries(&self) -> Vec<(String, EventStats)> {
        let events = self.events.lock().unwrap();
        let mut out: Vec<_> = events.iter().map(|(k, v)| (k.clone(), *v)).collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Log one line per event with avg/min/max/count.
    pub fn report(&self) {
        for (name, stats) in self.summaries() {
            info!(
                event = %name,
                avg_ms = format!("{:.3}", stats.average().as_secs_f64() * 1e3),
                min_ms = format!("{:.3}", stats.min.as_secs_f64() * 1e3),
                max_ms = format!("{:.3}", stats.max.as_secs_f64() * 1e3),
                count = stats.count,
                "Perf summary"
            );
        }
    }

    /// Discard all aggregates.
    pub fn reset(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_track_min_max_and_average() {
        let perf = PerfTimer::new();
        perf.record("blend", Duration::from_millis(10));
        perf.record("blend", Duration::from_millis(30));
        perf.record("blend", Duration::from_millis(20));

        let stats = perf.stats("blend").unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.last, Duration::from_millis(20));
        assert_eq!(stats.min, Duration::from_millis(10));
        assert_eq!(stats.max, Duration::from_millis(30));
        assert_eq!(stats.average(), Duration::from_millis(20));
    }

    #[test]
    fn events_are_independent() {
        let perf = PerfTimer::new();
        perf.record("capture", Duration::from_millis(1));
        perf.record("upscale", Duration::from_millis(5));

        assert_eq!(perf.stats("capture").unwrap().count, 1);
        assert_eq!(perf.stats("upscale").unwrap().count, 1);
        assert!(perf.stats("display").is_none());

        let names: Vec<_> = perf.summaries().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["capture".to_string(), "upscale".to_string()]);
    }

    #[test]
    fn reset_clears_everything() {
        let perf = PerfTimer::new();
        perf.record("x", Duration::from_millis(1));
        perf.reset();
        assert!(perf.stats("x").is_none());
        assert!(perf.summaries().is_empty());
    }

    #[test]
    fn time_closure_records_and_returns() {
        let perf = PerfTimer::new();
        let value = perf.time("work", || 7);
        assert_eq!(value, 7);
        assert_eq!(perf.stats("work").unwrap().count, 1);
    }
}
