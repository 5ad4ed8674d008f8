use crate::utils::LassoError;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::OpenOptions,
    io::Write,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

/// Running totals for one named solver step.
///
/// Steps run once per outer iteration, so only aggregates are kept; the
/// tracker's memory does not grow with the iteration count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StepStats {
    /// Summed duration in milliseconds
    pub total_ms: f64,
    /// Longest single run in milliseconds
    pub max_ms: f64,
    /// Number of runs
    pub count: usize,
}

impl StepStats {
    pub fn average_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms / self.count as f64
        }
    }
}

/// A record of one solve along the lambda path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathTimingRecord {
    /// Penalty strength of this solve
    pub lambda: f64,
    /// Outer iterations used
    pub iterations: usize,
    /// Whether the stopping rule was met before the iteration cap
    pub converged: bool,
    /// Wall-clock duration of the solve in milliseconds
    pub duration_ms: f64,
    /// Unix timestamp when the solve was recorded
    pub timestamp: u64,
}

/// Performance tracking for the ADMM and coordinate descent engines.
///
/// `TimingTracker` aggregates step timings inside each solve, keyed by
/// step name, and keeps one record per lambda value. It provides summary
/// statistics and CSV export.
///
/// This is used internally by the solvers and the path driver to track
/// timing information automatically.
#[derive(Debug, Default)]
pub struct TimingTracker {
    steps: BTreeMap<&'static str, StepStats>,
    path_timings: Vec<PathTimingRecord>,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl TimingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_step(&mut self, step_name: &'static str, duration: Duration) {
        let ms = duration.as_secs_f64() * 1000.0;
        let stats = self.steps.entry(step_name).or_default();
        stats.total_ms += ms;
        stats.max_ms = stats.max_ms.max(ms);
        stats.count += 1;
    }

    pub fn record_path_step(
        &mut self,
        lambda: f64,
        iterations: usize,
        converged: bool,
        duration: Duration,
    ) {
        self.path_timings.push(PathTimingRecord {
            lambda,
            iterations,
            converged,
            duration_ms: duration.as_secs_f64() * 1000.0,
            timestamp: unix_now(),
        });
    }

    /// Aggregates per step name, in name order.
    pub fn step_statistics(&self) -> &BTreeMap<&'static str, StepStats> {
        &self.steps
    }

    pub fn path_timings(&self) -> &[PathTimingRecord] {
        &self.path_timings
    }

    pub fn write_step_timings_to_csv(&self, filename: &str) -> Result<(), LassoError> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(filename)?;

        writeln!(file, "step_name,count,total_ms,avg_ms,max_ms")?;
        for (name, stats) in &self.steps {
            writeln!(
                file,
                "{},{},{:.3},{:.3},{:.3}",
                name,
                stats.count,
                stats.total_ms,
                stats.average_ms(),
                stats.max_ms
            )?;
        }

        Ok(())
    }

    pub fn write_path_timings_to_csv(&self, filename: &str) -> Result<(), LassoError> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(filename)?;

        writeln!(file, "lambda,iterations,converged,duration_ms,timestamp")?;
        for record in &self.path_timings {
            writeln!(
                file,
                "{:e},{},{},{:.3},{}",
                record.lambda,
                record.iterations,
                record.converged,
                record.duration_ms,
                record.timestamp
            )?;
        }

        Ok(())
    }

    /// Exports both tables, appending "_steps.csv" and "_path.csv" to the
    /// common prefix.
    pub fn export_all(&self, filename_prefix: &str) -> Result<(), LassoError> {
        let step_filename = format!("{}_steps.csv", filename_prefix);
        let path_filename = format!("{}_path.csv", filename_prefix);

        self.write_step_timings_to_csv(&step_filename)?;
        self.write_path_timings_to_csv(&path_filename)?;

        log::info!("[Timing] exported step timings to {}", step_filename);
        log::info!("[Timing] exported path timings to {}", path_filename);
        Ok(())
    }

    /// Formats the step statistics and the per-lambda records.
    pub fn summary(&self) -> String {
        let mut out = String::from("=== Step Timing Summary ===\n");
        for (step, stats) in &self.steps {
            out.push_str(&format!(
                "{}: avg={:.3}ms, max={:.3}ms, count={}\n",
                step,
                stats.average_ms(),
                stats.max_ms,
                stats.count
            ));
        }

        out.push_str("\n=== Lambda Path Summary ===\n");
        for record in &self.path_timings {
            out.push_str(&format!(
                "lambda={:.6e}: iterations={}, converged={}, {:.2}ms\n",
                record.lambda, record.iterations, record.converged, record.duration_ms
            ));
        }
        out
    }
}

/// Runs `f`, recording its wall-clock duration under `name`.
pub fn time_fn<F, R>(tracker: &mut TimingTracker, name: &'static str, f: F) -> R
where
    F: FnOnce() -> R,
{
    let start = Instant::now();
    let result = f();
    tracker.record_step(name, start.elapsed());
    result
}
