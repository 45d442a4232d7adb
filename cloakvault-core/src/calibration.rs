//! PBKDF2 timing calibration.
//!
//! Upper layers drive a security/latency slider from a prediction of how
//! long a PBKDF2-HMAC-SHA256 derivation takes at a given iteration count.
//! The prediction comes from an ordinary-least-squares fit of the linear
//! model `T(n) = α + β·n`, where α captures fixed overhead and β the
//! marginal cost per iteration.
//!
//! Measurements are taken at four logarithmically spaced calibration points
//! with three repetitions each, using the per-point median to reject
//! outliers, after one warm-up pass. The fitted model is cached
//! process-wide; the first caller pays the calibration cost (a few seconds),
//! later callers read the cache.

use std::sync::RwLock;
use std::time::Instant;

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

/// Iteration counts measured during calibration.
///
/// Logarithmically distributed: the low point captures fixed overhead, the
/// high points validate linear scaling.
pub const CALIBRATION_POINTS: [u32; 4] = [5_000, 50_000, 250_000, 1_000_000];

/// Repetitions per calibration point; the median rejects outliers.
const CALIBRATION_REPETITIONS: usize = 3;

/// Derived key size in bytes, matching the keyslot envelope key.
const DERIVED_KEY_LEN: usize = 32;

/// Entropy of an 8-character mixed-alphanumeric password: `log2(62^8)`.
const ENTROPY_8_CHAR_MIXED: f64 = 52.56;

/// Guess rate of a modern consumer GPU, in attempts per second.
const GUESSES_PER_SEC_CONSUMER_GPU: f64 = 100_000.0;

/// Guess rate of a supercomputer-class attacker, in attempts per second.
const GUESSES_PER_SEC_SUPERCOMPUTER: f64 = 1e9;

/// Process-wide cached model. Lazily installed under the write lock; the
/// lock acquisition orders the installing writer before every later reader.
static MODEL: RwLock<Option<TimingModel>> = RwLock::new(None);

/// Suggested iteration counts for the security slider.
pub mod presets {
    /// ~50 ms per unlock; low security.
    pub const FAST: u32 = 50_000;
    /// ~100 ms per unlock; the keyslot envelope default.
    pub const STANDARD: u32 = 100_000;
    /// ~500 ms per unlock.
    pub const HIGH: u32 = 500_000;
    /// ~1 s per unlock.
    pub const VERY_HIGH: u32 = 1_000_000;
    /// ~5 s per unlock.
    pub const MAXIMUM: u32 = 5_000_000;
}

/// Linear timing model `T(n) = α + β·n` fitted by ordinary least squares.
#[derive(Debug, Clone, Copy)]
pub struct TimingModel {
    /// Fixed overhead in milliseconds.
    alpha: f64,
    /// Milliseconds per iteration.
    beta: f64,
}

impl TimingModel {
    /// Fits the model to `(iterations, millis)` observations.
    ///
    /// Standard OLS: `β = Σ(xᵢ−x̄)(yᵢ−ȳ) / Σ(xᵢ−x̄)²`, `α = ȳ − β·x̄`.
    /// Degenerate inputs (fewer than two distinct x values) fall back to a
    /// constant model.
    #[must_use]
    pub fn fit(observations: &[(u32, f64)]) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let n = observations.len() as f64;
        if observations.is_empty() {
            return Self {
                alpha: 0.0,
                beta: 0.0,
            };
        }

        let x_mean = observations.iter().map(|&(x, _)| f64::from(x)).sum::<f64>() / n;
        let y_mean = observations.iter().map(|&(_, y)| y).sum::<f64>() / n;

        let mut sum_xy = 0.0;
        let mut sum_xx = 0.0;
        for &(x, y) in observations {
            let x_dev = f64::from(x) - x_mean;
            sum_xy += x_dev * (y - y_mean);
            sum_xx += x_dev * x_dev;
        }

        if sum_xx == 0.0 {
            return Self {
                alpha: y_mean,
                beta: 0.0,
            };
        }

        let beta = sum_xy / sum_xx;
        Self {
            alpha: y_mean - beta * x_mean,
            beta,
        }
    }

    /// Predicts the derivation time for an iteration count, in milliseconds.
    ///
    /// Clamped to be non-negative; monotonically non-decreasing whenever
    /// β ≥ 0, which holds for any real measurement.
    #[must_use]
    pub fn predict(&self, iterations: u32) -> u64 {
        let millis = self.beta.mul_add(f64::from(iterations), self.alpha).max(0.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            millis.round() as u64
        }
    }
}

/// Descriptive security level for an iteration count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityLevel {
    /// Below 50 000 iterations.
    Low,
    /// 50 000 to 99 999 iterations.
    Standard,
    /// 100 000 to 499 999 iterations.
    High,
    /// 500 000 to 999 999 iterations.
    VeryHigh,
    /// 1 000 000 iterations and above.
    Maximum,
}

impl SecurityLevel {
    /// Returns the display label for this level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Standard => "Standard",
            Self::High => "High",
            Self::VeryHigh => "Very High",
            Self::Maximum => "Maximum",
        }
    }
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies an iteration count into a security level.
#[must_use]
pub const fn security_level(iterations: u32) -> SecurityLevel {
    match iterations {
        0..=49_999 => SecurityLevel::Low,
        50_000..=99_999 => SecurityLevel::Standard,
        100_000..=499_999 => SecurityLevel::High,
        500_000..=999_999 => SecurityLevel::VeryHigh,
        _ => SecurityLevel::Maximum,
    }
}

/// Runs one PBKDF2-HMAC-SHA256 derivation and returns its wall-clock cost in
/// milliseconds.
#[must_use]
pub fn benchmark_iterations(iterations: u32) -> f64 {
    let salt = [0u8; 32];
    let mut derived = [0u8; DERIVED_KEY_LEN];

    let start = Instant::now();
    pbkdf2_hmac::<Sha256>(b"benchmark", &salt, iterations, &mut derived);
    let elapsed = start.elapsed();

    elapsed.as_secs_f64() * 1000.0
}

/// Measures all calibration points and fits the model.
fn calibrate() -> TimingModel {
    // Warm-up pass: first derivations pay cache and allocator setup costs
    // that would skew the fit.
    for &iterations in &CALIBRATION_POINTS {
        let _ = benchmark_iterations(iterations);
    }

    let mut observations = Vec::with_capacity(CALIBRATION_POINTS.len());
    for &iterations in &CALIBRATION_POINTS {
        let mut samples = [0.0f64; CALIBRATION_REPETITIONS];
        for sample in &mut samples {
            *sample = benchmark_iterations(iterations);
        }
        samples.sort_by(f64::total_cmp);
        observations.push((iterations, samples[CALIBRATION_REPETITIONS / 2]));
    }

    TimingModel::fit(&observations)
}

/// Estimates the wall-clock time of a derivation at `iterations`, in
/// milliseconds.
///
/// The first call calibrates and caches the model process-wide; subsequent
/// calls only read the cache. Thread-safe.
///
/// # Panics
///
/// Panics if the calibration lock is poisoned.
#[must_use]
pub fn estimate_derivation_time(iterations: u32) -> u64 {
    if let Some(model) = *MODEL.read().expect("calibration lock poisoned") {
        return model.predict(iterations);
    }

    let mut slot = MODEL.write().expect("calibration lock poisoned");
    // Another thread may have calibrated while we waited for the lock.
    let model = slot.get_or_insert_with(calibrate);
    model.predict(iterations)
}

/// Discards the cached model so the next estimate recalibrates.
///
/// # Panics
///
/// Panics if the calibration lock is poisoned.
pub fn recalibrate() {
    *MODEL.write().expect("calibration lock poisoned") = None;
}

/// Estimates the seconds needed to brute-force a password of
/// `entropy_bits` entropy when each guess costs one derivation at
/// `iterations` and the attacker can issue `guesses_per_sec` guesses.
///
/// The expected cost is half the keyspace. The attacker's effective rate is
/// capped by the per-guess derivation time.
#[must_use]
pub fn estimate_brute_force_secs(iterations: u32, entropy_bits: f64, guesses_per_sec: f64) -> f64 {
    let expected_guesses = 2f64.powf(entropy_bits) / 2.0;
    #[allow(clippy::cast_precision_loss)]
    let secs_per_guess = estimate_derivation_time(iterations) as f64 / 1000.0;
    let effective_rate = if secs_per_guess > 0.0 {
        guesses_per_sec.min(1.0 / secs_per_guess)
    } else {
        guesses_per_sec
    };
    expected_guesses / effective_rate
}

/// Worst-case time for a consumer GPU to brute-force an 8-character mixed
/// password, as a human-readable string.
#[must_use]
pub fn simple_password_crack_time(iterations: u32) -> String {
    format_duration(estimate_brute_force_secs(
        iterations,
        ENTROPY_8_CHAR_MIXED,
        GUESSES_PER_SEC_CONSUMER_GPU,
    ))
}

/// Same estimate against a supercomputer-class attacker.
#[must_use]
pub fn supercomputer_crack_time(iterations: u32) -> String {
    format_duration(estimate_brute_force_secs(
        iterations,
        ENTROPY_8_CHAR_MIXED,
        GUESSES_PER_SEC_SUPERCOMPUTER,
    ))
}

/// One-line summary of what an iteration count means for the user.
#[must_use]
pub fn describe_iterations(iterations: u32) -> String {
    format!(
        "Unlock time: ~{}ms | Brute-force resistance (8-char password): {}",
        estimate_derivation_time(iterations),
        simple_password_crack_time(iterations)
    )
}

/// Diagnostic description of the fitted model. Triggers calibration if it
/// has not run yet.
///
/// # Panics
///
/// Panics if the calibration lock is poisoned.
#[must_use]
pub fn calibration_info() -> String {
    let _ = estimate_derivation_time(presets::STANDARD);
    let model = MODEL
        .read()
        .expect("calibration lock poisoned")
        .expect("model installed by the estimate above");
    format!(
        "Timing model: T(n) = {:.4} + {:.8}*n ms (calibrated at {:?} iterations, OLS fit)",
        model.alpha, model.beta, CALIBRATION_POINTS
    )
}

/// Formats a duration in seconds into a human-readable magnitude.
#[must_use]
pub fn format_duration(seconds: f64) -> String {
    const MINUTE: f64 = 60.0;
    const HOUR: f64 = 3600.0;
    const DAY: f64 = 86_400.0;
    const YEAR: f64 = 31_536_000.0;

    if seconds < 0.001 {
        "< 1 millisecond".to_string()
    } else if seconds < 1.0 {
        format!("{:.0} milliseconds", seconds * 1000.0)
    } else if seconds < MINUTE {
        format!("{seconds:.1} seconds")
    } else if seconds < HOUR {
        format!("{:.1} minutes", seconds / MINUTE)
    } else if seconds < DAY {
        format!("{:.1} hours", seconds / HOUR)
    } else if seconds < YEAR {
        format!("{:.1} days", seconds / DAY)
    } else if seconds < YEAR * 1e3 {
        format!("{:.1} years", seconds / YEAR)
    } else if seconds < YEAR * 1e6 {
        format!("{:.1} thousand years", seconds / (YEAR * 1e3))
    } else if seconds < YEAR * 1e9 {
        format!("{:.1} million years", seconds / (YEAR * 1e6))
    } else {
        format!("{:.1} billion years", seconds / (YEAR * 1e9))
    }
}
