//! Smoothed close, rate of change, and a z-score of the latest rate of change
//! over a bar sequence. Exploratory signal only; deterministic for a given input.

use crate::types::{Bar, DerivedStats};

pub fn derive(bars: &[Bar], smooth_window: usize) -> DerivedStats {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    if closes.is_empty() {
        return DerivedStats {
            current: None,
            smoothed: None,
            roc: None,
            roc_z_score: None,
            bars_used: 0,
        };
    }

    let smoothed = smoothed_series(&closes, smooth_window);
    let roc = roc_series(&closes);
    let z = roc_z_score(&roc);

    DerivedStats {
        current: closes.last().copied(),
        smoothed: smoothed.last().copied(),
        roc: roc.last().copied(),
        roc_z_score: Some(z),
        bars_used: bars.len(),
    }
}

/// Trailing mean over up to `window` closes ending at each index.
pub fn smoothed_series(closes: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..closes.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            mean(&closes[start..=i])
        })
        .collect()
}

/// `roc[0] = 0`; a zero previous close also yields 0.
pub fn roc_series(closes: &[f64]) -> Vec<f64> {
    let mut roc = Vec::with_capacity(closes.len());
    if closes.is_empty() {
        return roc;
    }
    roc.push(0.0);
    for pair in closes.windows(2) {
        let (prev, cur) = (pair[0], pair[1]);
        roc.push(if prev == 0.0 { 0.0 } else { (cur - prev) / prev });
    }
    roc
}

/// Z-score of the last element against the whole sequence, using the sample
/// standard deviation. Zero when the deviation is zero or n < 2.
pub fn roc_z_score(roc: &[f64]) -> f64 {
    let sd = sample_std(roc);
    match roc.last() {
        Some(&last) if sd != 0.0 => (last - mean(roc)) / sd,
        _ => 0.0,
    }
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn sample_std(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let ss: f64 = xs.iter().map(|x| (x - m).powi(2)).sum();
    (ss / (xs.len() - 1) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar { time: i as i64 * 900, open: c, high: c, low: c, close: c })
            .collect()
    }

    #[test]
    fn roc_for_ten_twenty_ten() {
        let roc = roc_series(&[10.0, 20.0, 10.0]);
        assert_eq!(roc, vec![0.0, 1.0, -0.5]);
    }

    #[test]
    fn z_score_uses_sample_std() {
        let stats = derive(&bars(&[10.0, 20.0, 10.0]), 3);
        // roc = [0, 1, -0.5]; mean = 1/6
        let m: f64 = 1.0 / 6.0;
        let var = ((0.0 - m).powi(2) + (1.0 - m).powi(2) + (-0.5 - m).powi(2)) / 2.0;
        let expected = (-0.5 - m) / var.sqrt();
        let z = stats.roc_z_score.unwrap();
        assert!((z - expected).abs() < 1e-12, "z={z} expected={expected}");
        assert_eq!(stats.roc, Some(-0.5));
        assert_eq!(stats.current, Some(10.0));
        assert_eq!(stats.bars_used, 3);
        let smoothed = stats.smoothed.unwrap();
        assert!((smoothed - 40.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn smoothing_window_shrinks_at_start() {
        let s = smoothed_series(&[3.0, 6.0, 9.0, 12.0], 3);
        assert_eq!(s, vec![3.0, 4.5, 6.0, 9.0]);
    }

    #[test]
    fn zero_previous_close_gives_zero_roc() {
        assert_eq!(roc_series(&[0.0, 50.0, 100.0]), vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn flat_series_has_zero_z_score() {
        let stats = derive(&bars(&[40.0, 40.0, 40.0, 40.0]), 3);
        assert_eq!(stats.roc_z_score, Some(0.0));
    }

    #[test]
    fn single_bar() {
        let stats = derive(&bars(&[55.0]), 3);
        assert_eq!(stats.current, Some(55.0));
        assert_eq!(stats.smoothed, Some(55.0));
        assert_eq!(stats.roc, Some(0.0));
        assert_eq!(stats.roc_z_score, Some(0.0));
        assert_eq!(stats.bars_used, 1);
    }

    #[test]
    fn empty_bars_report_absent_values() {
        let stats = derive(&[], 3);
        assert_eq!(stats.current, None);
        assert_eq!(stats.smoothed, None);
        assert_eq!(stats.roc, None);
        assert_eq!(stats.roc_z_score, None);
        assert_eq!(stats.bars_used, 0);
    }

    #[test]
    fn reproducible_for_same_input() {
        let input = bars(&[12.5, 13.0, 11.75, 14.2, 14.2, 9.9]);
        assert_eq!(derive(&input, 3), derive(&input, 3));
    }
}
