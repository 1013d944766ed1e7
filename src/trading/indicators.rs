//! Price-series indicators used by the signal engine.

/// Exponential moving average over `values`, seeded with the simple
/// average of the first `period` samples.
///
/// Returns a vector aligned with the input: index `period - 1` holds
/// the SMA seed, later indices follow the recurrence
/// `ema[i] = value[i] * a + ema[i-1] * (1 - a)` with `a = 2/(period+1)`.
/// Indices before the seed are zero and must not be read. Returns an
/// empty vector when there are fewer than `period` samples.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = vec![0.0; values.len()];

    let seed: f64 = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = seed;

    for i in period..values.len() {
        out[i] = values[i] * alpha + out[i - 1] * (1.0 - alpha);
    }

    out
}

/// Outcome of comparing the latest two fast/medium EMA samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossover {
    Bullish,
    Bearish,
}

/// Detect a fast/medium EMA crossover between the previous and current
/// samples.
pub fn detect_crossover(
    fast_current: f64,
    medium_current: f64,
    fast_prev: f64,
    medium_prev: f64,
) -> Option<Crossover> {
    if fast_prev <= medium_prev && fast_current > medium_current {
        return Some(Crossover::Bullish);
    }
    if fast_prev >= medium_prev && fast_current < medium_current {
        return Some(Crossover::Bearish);
    }
    None
}

/// Most recent swing low: the last point that is the minimum within a
/// symmetric `lookback` window. Falls back to the minimum of the
/// trailing `lookback` window when the series is too short or no local
/// minimum exists. The fallback is a heuristic, not true
/// local-extremum semantics.
pub fn swing_low(lows: &[f64], lookback: usize) -> f64 {
    swing_extremum(lows, lookback, f64::min, |a, b| a <= b)
}

/// Most recent swing high, mirroring [`swing_low`].
pub fn swing_high(highs: &[f64], lookback: usize) -> f64 {
    swing_extremum(highs, lookback, f64::max, |a, b| a >= b)
}

fn swing_extremum(
    values: &[f64],
    lookback: usize,
    fold: fn(f64, f64) -> f64,
    beats: fn(f64, f64) -> bool,
) -> f64 {
    let trailing_extremum = |window: &[f64]| window.iter().copied().fold(window[0], fold);

    if values.len() < lookback * 2 + 1 {
        if values.len() >= lookback {
            return trailing_extremum(&values[values.len() - lookback..]);
        }
        return trailing_extremum(values);
    }

    let mut last_swing = None;
    for i in lookback..values.len() - lookback {
        let window = &values[i - lookback..=i + lookback];
        if window.iter().all(|&v| beats(values[i], v)) {
            last_swing = Some(values[i]);
        }
    }

    last_swing.unwrap_or_else(|| trailing_extremum(&values[values.len() - lookback..]))
}

/// Ratio of the latest volume to the trailing 20-sample average
/// (or the whole series when shorter). Returns 1.0 when the average
/// is zero.
pub fn volume_ratio(volumes: &[f64]) -> f64 {
    if volumes.is_empty() {
        return 1.0;
    }

    let window = if volumes.len() >= 20 {
        &volumes[volumes.len() - 20..]
    } else {
        volumes
    };
    let avg = window.iter().sum::<f64>() / window.len() as f64;

    if avg > 0.0 {
        volumes[volumes.len() - 1] / avg
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ema_seed_is_sma() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let out = ema(&values, 3);

        assert_eq!(out.len(), 5);
        assert!((out[2] - 2.0).abs() < 1e-12); // (1+2+3)/3

        // ema[3] = 4 * 0.5 + 2 * 0.5
        assert!((out[3] - 3.0).abs() < 1e-12);
        // ema[4] = 5 * 0.5 + 3 * 0.5
        assert!((out[4] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_ema_insufficient_data() {
        assert!(ema(&[1.0, 2.0], 3).is_empty());
        assert!(ema(&[], 3).is_empty());
    }

    #[test]
    fn test_crossover_detection() {
        assert_eq!(
            detect_crossover(10.2, 10.0, 9.9, 10.0),
            Some(Crossover::Bullish)
        );
        assert_eq!(
            detect_crossover(9.8, 10.0, 10.1, 10.0),
            Some(Crossover::Bearish)
        );
        // Fast stays above medium: no cross
        assert_eq!(detect_crossover(10.2, 10.0, 10.1, 10.0), None);
        // Fast stays below medium: no cross
        assert_eq!(detect_crossover(9.8, 10.0, 9.9, 10.0), None);
    }

    #[test]
    fn test_crossover_from_equality_counts() {
        assert_eq!(
            detect_crossover(10.1, 10.0, 10.0, 10.0),
            Some(Crossover::Bullish)
        );
        assert_eq!(
            detect_crossover(9.9, 10.0, 10.0, 10.0),
            Some(Crossover::Bearish)
        );
    }

    #[test]
    fn test_swing_low_local_minimum() {
        // V shape: local minimum of 1.0 at index 4 within lookback 2
        let lows = vec![5.0, 4.0, 3.0, 2.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(swing_low(&lows, 2), 1.0);
    }

    #[test]
    fn test_swing_low_takes_most_recent() {
        let lows = vec![
            5.0, 4.0, 1.0, 4.0, 5.0, // swing at 1.0
            5.0, 4.0, 2.0, 4.0, 5.0, // later swing at 2.0
            5.0, 5.0,
        ];
        assert_eq!(swing_low(&lows, 2), 2.0);
    }

    #[test]
    fn test_swing_low_fallback_short_series() {
        // Too short for a symmetric window: trailing minimum
        let lows = vec![3.0, 1.5, 2.0];
        assert_eq!(swing_low(&lows, 2), 1.5);
    }

    #[test]
    fn test_swing_high_local_maximum() {
        let highs = vec![1.0, 2.0, 3.0, 4.0, 5.0, 4.0, 3.0, 2.0, 1.0];
        assert_eq!(swing_high(&highs, 2), 5.0);
    }

    #[test]
    fn test_swing_monotonic_series_uses_fallback() {
        // Strictly increasing lows have no local minimum
        let lows: Vec<f64> = (0..30).map(|i| i as f64).collect();
        assert_eq!(swing_low(&lows, 5), 25.0);
    }

    #[test]
    fn test_volume_ratio() {
        let mut volumes = vec![100.0; 19];
        volumes.push(150.0);
        // avg = (19*100 + 150)/20 = 102.5
        let ratio = volume_ratio(&volumes);
        assert!((ratio - 150.0 / 102.5).abs() < 1e-12);
    }

    #[test]
    fn test_volume_ratio_zero_average() {
        assert_eq!(volume_ratio(&[0.0, 0.0, 0.0]), 1.0);
        assert_eq!(volume_ratio(&[]), 1.0);
    }
}
