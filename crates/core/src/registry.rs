//! Backend selection and benchmarking
//!
//! An [`Engine`] owns the choice of collision search backend. It starts
//! from an architecture default, [`Engine::select`] upgrades that to the
//! most specialized backend the CPU supports, and [`Engine::benchmark`]
//! measures every usable backend and keeps the fastest.

use core::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::alphabet::Alphabet;
use crate::backend::Backend;
use crate::params::{BENCH_BITS, BENCH_ITERATIONS, BENCH_PROJECTIONS, BLOCK_SIZE, COUNTER_WIDTH};
use crate::primitives::{SHA1_IV, final_block, leading_zero_bits, sha1_digest};

/// Benchmark input; the last [`COUNTER_WIDTH`] bytes are the counter region
const BENCH_MESSAGE: &[u8] = b"1:22:040404:foo::0123456789abcdef:00000000000";

/// Quick-rate input, searched at a target it will never reach
const RATE_MESSAGE: &[u8] = b"1:32:040404:foo@fnord.gov::0123456789abcdef:00000000";
const RATE_BITS: u32 = 64;
const RATE_START_ITERATIONS: u64 = 256;

/// Shortest sample the doubling loop accepts
const RATE_MIN_SAMPLE: Duration = Duration::from_millis(10);
/// Upper bound on time spent in [`Engine::quick_rate`]
const RATE_MAX_SAMPLE: Duration = Duration::from_millis(500);
/// Clock ticks coarser than this use the fixed-duration loop
const COARSE_TICK: Duration = Duration::from_millis(1);

/// Minting context holding the selected backend
#[derive(Debug, Clone)]
pub struct Engine {
    selected: Backend,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Create an engine with [`select`](Self::select) already applied.
    pub fn new() -> Self {
        let mut engine = Self {
            selected: architecture_default(),
        };
        engine.select();
        engine
    }

    /// Engine pinned to `backend`, or `None` if it cannot run here.
    pub fn with_backend(backend: Backend) -> Option<Self> {
        backend.probe().then_some(Self { selected: backend })
    }

    pub fn selected(&self) -> Backend {
        self.selected
    }

    /// Every registered backend with its probe result, in registration order
    pub fn backends() -> impl Iterator<Item = (Backend, bool)> {
        Backend::ALL.into_iter().map(|b| (b, b.probe()))
    }

    /// Pick a backend without measuring anything: the architecture default,
    /// raised to the highest-registered specialized backend that probes.
    pub fn select(&mut self) -> Backend {
        self.selected = architecture_default();
        for backend in &Backend::ALL[Backend::FIRST_SPECIALIZED..] {
            if backend.probe() {
                self.selected = *backend;
            }
        }
        debug!(backend = self.selected.name(), "selected backend");
        self.selected
    }

    /// Time every usable backend on a fixed `target_bits` search and keep
    /// the fastest one that passes reverification.
    pub fn benchmark(&mut self, target_bits: u32) -> BenchmarkReport {
        let default = self.selected;
        let mut entries = Vec::with_capacity(Backend::ALL.len());

        for backend in Backend::ALL {
            let outcome = if backend.probe() {
                run_benchmark(backend, target_bits)
            } else {
                BenchOutcome::Unavailable
            };

            match &outcome {
                BenchOutcome::Unavailable => debug!(backend = backend.name(), "not available"),
                BenchOutcome::Measured { rate, .. } => {
                    debug!(backend = backend.name(), rate, "measured")
                }
                failed => warn!(backend = backend.name(), "skipped: {}", failed),
            }

            entries.push(BenchEntry { backend, outcome });
        }

        let best = entries
            .iter()
            .filter_map(|e| e.rate().map(|r| (e.backend, r)))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((backend, rate)) => {
                self.selected = backend;
                info!(backend = backend.name(), rate, "fastest backend");
            }
            None => warn!("no backend passed the benchmark, keeping {}", default.name()),
        }

        BenchmarkReport {
            entries,
            default,
            best: best.map(|(b, _)| b),
            peak_rate: best.map_or(0.0, |(_, r)| r),
            verbosity: 1,
        }
    }

    /// [`benchmark`](Self::benchmark) at the standard target
    pub fn benchmark_default(&mut self) -> BenchmarkReport {
        self.benchmark(BENCH_BITS)
    }

    /// Rough hashes per second of the selected backend.
    ///
    /// Finishes within about half a second. Returns 1 if the measurement
    /// run stumbles on an actual collision, which makes it meaningless.
    pub fn quick_rate(&self) -> u64 {
        let backend = self.selected;
        sample_rate(clock_resolution(), |iterations| {
            let mut block = final_block(RATE_MESSAGE, RATE_MESSAGE.len());
            backend.search(RATE_BITS, &mut block, &SHA1_IV, RATE_MESSAGE.len(), iterations)
                >= RATE_BITS
        })
    }
}

/// Candidates per second of `run`, which searches the given number of
/// candidates and reports whether it hit a collision.
///
/// A `tick` coarser than [`COARSE_TICK`] runs fixed batches over eight
/// ticks; a finer one doubles the batch until a single run is long enough
/// to time. Returns 1 if `run` ever reports a hit.
fn sample_rate(tick: Duration, mut run: impl FnMut(u64) -> bool) -> u64 {
    if tick > COARSE_TICK {
        let window = tick * 8;
        let start = Instant::now();
        let mut total = 0u64;
        loop {
            if run(RATE_START_ITERATIONS) {
                warn!("found a collision while measuring rate");
                return 1;
            }
            total += RATE_START_ITERATIONS;
            let taken = start.elapsed();
            if taken >= window || taken >= RATE_MAX_SAMPLE {
                return (total as f64 / taken.as_secs_f64()) as u64;
            }
        }
    }

    let min_sample = (tick * 16).max(RATE_MIN_SAMPLE);
    let started = Instant::now();
    let mut iterations = RATE_START_ITERATIONS;
    loop {
        let begin = Instant::now();
        if run(iterations) {
            warn!("found a collision while measuring rate");
            return 1;
        }
        let elapsed = begin.elapsed();

        if elapsed >= min_sample || started.elapsed() >= RATE_MAX_SAMPLE {
            return (iterations as f64 / elapsed.as_secs_f64().max(f64::EPSILON)) as u64;
        }
        iterations = iterations.saturating_mul(2);
    }
}

#[cfg(target_arch = "x86")]
fn architecture_default() -> Backend {
    Backend::PortableCompact
}

#[cfg(not(target_arch = "x86"))]
fn architecture_default() -> Backend {
    Backend::PortableStandard
}

/// Smallest observable step of the monotonic clock
fn clock_resolution() -> Duration {
    let mut begin = Instant::now();
    let mut end = Instant::now();
    while end == begin {
        end = Instant::now();
    }
    begin = end;
    while end == begin {
        end = Instant::now();
    }
    end - begin
}

fn run_benchmark(backend: Backend, target_bits: u32) -> BenchOutcome {
    let tail = BENCH_MESSAGE.len();
    let mut block = final_block(BENCH_MESSAGE, tail);

    let start = Instant::now();
    let reported = backend.search(target_bits, &mut block, &SHA1_IV, tail, BENCH_ITERATIONS);
    let elapsed = start.elapsed();

    assess_benchmark(backend.alphabet(), target_bits, reported, &block, elapsed)
}

/// Reverify a committed benchmark block and read its iteration count back.
fn assess_benchmark(
    alphabet: Alphabet,
    target_bits: u32,
    reported: u32,
    block: &[u8; BLOCK_SIZE],
    elapsed: Duration,
) -> BenchOutcome {
    let tail = BENCH_MESSAGE.len();
    let verified = leading_zero_bits(&sha1_digest(&block[..tail]));
    let marker_intact = block[tail] == 0x80;
    let solution = String::from_utf8_lossy(&block[..tail]).into_owned();

    if reported != verified || reported < target_bits || !marker_intact {
        return BenchOutcome::Failed(BenchFailure::Integrity {
            requested: target_bits,
            reported,
            verified,
            marker_intact,
            solution,
        });
    }

    let Some(iterations) = alphabet.decode(&block[tail - COUNTER_WIDTH..tail]) else {
        return BenchOutcome::Failed(BenchFailure::UnparsableCounter { solution });
    };

    BenchOutcome::Measured {
        rate: iterations as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
        iterations,
        elapsed,
        solution,
    }
}

/// Why a backend was left out of the comparison
#[derive(Debug, Clone, PartialEq)]
pub enum BenchFailure {
    /// The reference hash disagrees with the backend
    Integrity {
        requested: u32,
        reported: u32,
        verified: u32,
        marker_intact: bool,
        solution: String,
    },
    /// The committed counter is not in the backend's alphabet
    UnparsableCounter { solution: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum BenchOutcome {
    Unavailable,
    Failed(BenchFailure),
    Measured {
        rate: f64,
        iterations: u64,
        elapsed: Duration,
        solution: String,
    },
}

impl fmt::Display for BenchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchOutcome::Unavailable => write!(f, "not available on this machine"),
            BenchOutcome::Failed(BenchFailure::Integrity {
                requested,
                reported,
                verified,
                marker_intact,
                ..
            }) => {
                write!(
                    f,
                    "wanted {} bits, reported {} bits, got {} bits",
                    requested, reported, verified
                )?;
                if !marker_intact {
                    write!(f, ", end-of-block marker damaged")?;
                }
                Ok(())
            }
            BenchOutcome::Failed(BenchFailure::UnparsableCounter { solution }) => {
                write!(f, "unable to parse iteration count from {:?}", solution)
            }
            BenchOutcome::Measured { rate, .. } => write!(f, "{:.0} hashes/sec", rate),
        }
    }
}

/// One benchmarked backend
#[derive(Debug, Clone, PartialEq)]
pub struct BenchEntry {
    pub backend: Backend,
    pub outcome: BenchOutcome,
}

impl BenchEntry {
    pub fn rate(&self) -> Option<f64> {
        match self.outcome {
            BenchOutcome::Measured { rate, .. } => Some(rate),
            _ => None,
        }
    }
}

/// Result of [`Engine::benchmark`], rendered through `Display`
#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    pub entries: Vec<BenchEntry>,
    /// Backend that was selected before benchmarking
    pub default: Backend,
    pub best: Option<Backend>,
    pub peak_rate: f64,
    verbosity: u8,
}

impl BenchmarkReport {
    /// Detail level for `Display`: 1 lists rates, 2 adds unavailable
    /// backends and projections, 3 adds solutions and timings.
    pub fn verbosity(mut self, level: u8) -> Self {
        self.verbosity = level;
        self
    }

    /// Projected average seconds to mint each of [`BENCH_PROJECTIONS`]
    pub fn projections(&self) -> Vec<(u32, f64)> {
        if self.peak_rate <= 0.0 {
            return Vec::new();
        }
        BENCH_PROJECTIONS
            .iter()
            .map(|bits| (*bits, 2f64.powi(*bits as i32) / self.peak_rate))
            .collect()
    }
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    Rate  Name (* machine default)")?;

        for entry in &self.entries {
            let name = entry.backend.name();
            match &entry.outcome {
                BenchOutcome::Unavailable => {
                    if self.verbosity >= 2 {
                        writeln!(f, "   ---    {}  (Not available on this machine)", name)?;
                    }
                }
                BenchOutcome::Failed(failure) => {
                    writeln!(f, "  ERROR   {}", name)?;
                    writeln!(f, "    {}", entry.outcome)?;
                    if self.verbosity >= 3 {
                        let solution = match failure {
                            BenchFailure::Integrity { solution, .. } => solution,
                            BenchFailure::UnparsableCounter { solution } => solution,
                        };
                        writeln!(f, "    \"{}\"", solution)?;
                    }
                }
                BenchOutcome::Measured {
                    rate,
                    iterations,
                    elapsed,
                    solution,
                } => {
                    let marker = if entry.backend == self.default { '*' } else { ' ' };
                    writeln!(f, "{:9} {} {}", *rate as u64, name, marker)?;
                    if self.verbosity >= 3 {
                        writeln!(f, "    Solution:   {}", solution)?;
                        writeln!(f, "    Iterations: {}", iterations)?;
                        writeln!(f, "    Time taken: {:.3}", elapsed.as_secs_f64())?;
                    }
                }
            }
        }

        if let Some(best) = self.best {
            writeln!(
                f,
                "Best backend: {} ({} hashes/sec)",
                best.name(),
                self.peak_rate as u64
            )?;
        }

        if self.verbosity >= 2 && self.best.is_some() {
            writeln!(f, "Projected average times to mint:")?;
            for (bits, seconds) in self.projections() {
                writeln!(f, "{:3} bits: {}", bits, format_projection(seconds))?;
            }
        }

        Ok(())
    }
}

/// Seconds with a friendlier unit appended once the magnitude calls for it
pub fn format_projection(seconds: f64) -> String {
    let base = format!("{:9.3} seconds", seconds);
    if seconds > 200_000.0 {
        format!("{} ({:.1} days)", base, seconds / 86_400.0)
    } else if seconds > 5_000.0 {
        format!("{} ({:.1} hours)", base, seconds / 3_600.0)
    } else if seconds > 100.0 {
        format!("{} ({:.1} minutes)", base, seconds / 60.0)
    } else if seconds < 0.005 {
        format!("{} ({:.1} microseconds)", base, seconds * 1_000_000.0)
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_prefers_last_probing_backend() {
        let mut engine = Engine::new();
        let selected = engine.select();
        let expected = Backend::ALL[Backend::FIRST_SPECIALIZED..]
            .iter()
            .rev()
            .find(|b| b.probe())
            .copied()
            .unwrap_or_else(architecture_default);
        assert_eq!(selected, expected);
        assert_eq!(engine.selected(), expected);
    }

    #[test]
    fn test_with_backend_requires_probe() {
        let engine = Engine::with_backend(Backend::PortableCompact).unwrap();
        assert_eq!(engine.selected(), Backend::PortableCompact);
        if !Backend::Sse2.probe() {
            assert!(Engine::with_backend(Backend::Sse2).is_none());
        }
    }

    #[test]
    fn test_benchmark_picks_measured_backend() {
        let mut engine = Engine::new();
        let report = engine.benchmark(12);

        assert_eq!(report.entries.len(), Backend::ALL.len());
        for entry in &report.entries {
            if entry.backend.probe() {
                assert!(
                    matches!(entry.outcome, BenchOutcome::Measured { .. }),
                    "{}: {}",
                    entry.backend.name(),
                    entry.outcome
                );
            } else {
                assert_eq!(entry.outcome, BenchOutcome::Unavailable);
            }
        }

        let best = report.best.unwrap();
        assert_eq!(engine.selected(), best);
        let fastest = report
            .entries
            .iter()
            .filter_map(BenchEntry::rate)
            .fold(0.0f64, f64::max);
        assert_eq!(report.peak_rate, fastest);
    }

    #[test]
    fn test_report_rendering() {
        let mut engine = Engine::new();
        let report = engine.benchmark(10).verbosity(2);
        let text = report.to_string();
        assert!(text.starts_with("    Rate  Name (* machine default)"));
        assert!(text.contains("Best backend:"));
        assert!(text.contains("Projected average times to mint:"));
        assert!(text.contains(" 30 bits:"));
        assert_eq!(report.projections().len(), BENCH_PROJECTIONS.len());
    }

    #[test]
    fn test_format_projection_units() {
        assert!(format_projection(0.001).ends_with("(1000.0 microseconds)"));
        assert_eq!(format_projection(1.0), "    1.000 seconds");
        assert!(format_projection(600.0).ends_with("(10.0 minutes)"));
        assert!(format_projection(7_200.0).ends_with("(2.0 hours)"));
        assert!(format_projection(864_000.0).ends_with("(10.0 days)"));
    }

    fn solved_bench_block(bits: u32) -> ([u8; BLOCK_SIZE], u32) {
        let tail = BENCH_MESSAGE.len();
        let mut block = final_block(BENCH_MESSAGE, tail);
        let reported =
            Backend::PortableStandard.search(bits, &mut block, &SHA1_IV, tail, BENCH_ITERATIONS);
        (block, reported)
    }

    #[test]
    fn test_assess_accepts_honest_block() {
        let (block, reported) = solved_bench_block(8);
        let outcome = assess_benchmark(
            Alphabet::Base64,
            8,
            reported,
            &block,
            Duration::from_millis(4),
        );
        assert!(matches!(outcome, BenchOutcome::Measured { .. }), "{}", outcome);
    }

    #[test]
    fn test_assess_rejects_overstated_bits() {
        let (block, reported) = solved_bench_block(8);
        let outcome = assess_benchmark(Alphabet::Base64, 8, reported + 1, &block, Duration::ZERO);
        match outcome {
            BenchOutcome::Failed(BenchFailure::Integrity {
                reported: claimed,
                verified,
                marker_intact,
                ..
            }) => {
                assert_eq!(claimed, reported + 1);
                assert_eq!(verified, reported);
                assert!(marker_intact);
            }
            other => panic!("unexpected outcome: {}", other),
        }
    }

    #[test]
    fn test_assess_rejects_damaged_marker() {
        let (mut block, reported) = solved_bench_block(8);
        block[BENCH_MESSAGE.len()] = 0;
        let outcome = assess_benchmark(Alphabet::Base64, 8, reported, &block, Duration::ZERO);
        assert!(matches!(
            outcome,
            BenchOutcome::Failed(BenchFailure::Integrity {
                marker_intact: false,
                ..
            })
        ));
        assert!(outcome.to_string().ends_with("end-of-block marker damaged"));
    }

    #[test]
    fn test_assess_rejects_foreign_counter() {
        let tail = BENCH_MESSAGE.len();
        let (mut block, _) = solved_bench_block(8);
        block[tail - 1] = b'!';
        let verified = leading_zero_bits(&sha1_digest(&block[..tail]));

        let outcome = assess_benchmark(Alphabet::Base64, 0, verified, &block, Duration::ZERO);
        assert!(matches!(
            outcome,
            BenchOutcome::Failed(BenchFailure::UnparsableCounter { .. })
        ));
        assert!(outcome.to_string().starts_with("unable to parse iteration count"));
    }

    #[test]
    fn test_sample_rate_coarse_clock() {
        let tick = Duration::from_millis(5);
        let start = Instant::now();
        let mut calls = 0u64;
        let rate = sample_rate(tick, |n| {
            assert_eq!(n, RATE_START_ITERATIONS);
            calls += 1;
            std::thread::sleep(Duration::from_millis(1));
            false
        });
        let taken = start.elapsed();

        assert!(rate > 0);
        assert!(calls >= 1);
        assert!(taken >= tick * 8);
        assert!(taken < Duration::from_secs(2));
    }

    #[test]
    fn test_sample_rate_fine_clock_doubles() {
        let mut seen = Vec::new();
        let rate = sample_rate(Duration::from_micros(1), |n| {
            seen.push(n);
            std::thread::sleep(Duration::from_micros(n * 20));
            false
        });

        assert!(rate > 0);
        assert_eq!(seen[0], RATE_START_ITERATIONS);
        for pair in seen.windows(2) {
            assert_eq!(pair[1], pair[0] * 2);
        }
    }

    #[test]
    fn test_sample_rate_collision_is_degenerate() {
        assert_eq!(sample_rate(Duration::from_millis(5), |_| true), 1);
        assert_eq!(sample_rate(Duration::from_micros(1), |_| true), 1);
    }

    #[test]
    fn test_quick_rate_is_positive() {
        let engine = Engine::new();
        let start = Instant::now();
        assert!(engine.quick_rate() > 1);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
