//! Fixed-resolution bucketing of raw `(ts_ms, value)` points into OHLC bars.

use std::collections::BTreeMap;

use crate::types::Bar;

/// Bucket time-ordered points into bars of `resolution_minutes`.
///
/// Input order is a precondition: within a bucket, `open` is the first point
/// seen and `close` the last, by position in `points`. Bars come out in
/// ascending bucket order. With a non-positive resolution every point is its
/// own flat bar. Oversized resolutions saturate into one bucket spanning all
/// representable time.
pub fn aggregate(points: &[(i64, f64)], resolution_minutes: i64) -> Vec<Bar> {
    if resolution_minutes <= 0 || points.is_empty() {
        return points
            .iter()
            .map(|&(ts, v)| Bar {
                time: ms_to_secs(ts),
                open: v,
                high: v,
                low: v,
                close: v,
            })
            .collect();
    }

    let bucket_ms = resolution_minutes.saturating_mul(60_000);
    // bucket start ms → bar with `time` still in ms until emit
    let mut buckets: BTreeMap<i64, Bar> = BTreeMap::new();
    for &(ts, v) in points {
        let key = ts.div_euclid(bucket_ms).saturating_mul(bucket_ms);
        buckets
            .entry(key)
            .and_modify(|bar| {
                bar.high = bar.high.max(v);
                bar.low = bar.low.min(v);
                bar.close = v;
            })
            .or_insert(Bar {
                time: key,
                open: v,
                high: v,
                low: v,
                close: v,
            });
    }

    buckets
        .into_values()
        .map(|bar| Bar {
            time: ms_to_secs(bar.time),
            ..bar
        })
        .collect()
}

fn ms_to_secs(ms: i64) -> i64 {
    ms.div_euclid(1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(time: i64, v: f64) -> Bar {
        Bar { time, open: v, high: v, low: v, close: v }
    }

    #[test]
    fn one_minute_buckets() {
        let points = [(0, 10.0), (30_000, 20.0), (65_000, 15.0)];
        let bars = aggregate(&points, 1);
        assert_eq!(
            bars,
            vec![
                Bar { time: 0, open: 10.0, high: 20.0, low: 10.0, close: 20.0 },
                flat(60, 15.0),
            ]
        );
    }

    #[test]
    fn open_is_first_and_close_is_last_by_arrival() {
        let points = [(1_000, 50.0), (2_000, 70.0), (3_000, 40.0), (4_000, 55.0)];
        let bars = aggregate(&points, 5);
        assert_eq!(bars.len(), 1);
        let bar = bars[0];
        assert_eq!(bar.open, 50.0);
        assert_eq!(bar.high, 70.0);
        assert_eq!(bar.low, 40.0);
        assert_eq!(bar.close, 55.0);
    }

    #[test]
    fn buckets_emitted_in_ascending_time_even_if_gapped() {
        let points = [(0, 1.0), (10 * 60_000, 2.0), (3 * 60_000 + 1, 3.0)];
        let bars = aggregate(&points, 1);
        let times: Vec<i64> = bars.iter().map(|b| b.time).collect();
        assert_eq!(times, vec![0, 180, 600]);
    }

    #[test]
    fn non_positive_resolution_gives_one_bar_per_point() {
        let points = [(1_999, 10.0), (2_500, 12.0)];
        for res in [0, -5] {
            let bars = aggregate(&points, res);
            assert_eq!(bars, vec![flat(1, 10.0), flat(2, 12.0)]);
        }
    }

    #[test]
    fn huge_resolution_collapses_into_one_bar() {
        let points = [(0, 1.0), (1_700_000_000_000, 3.0)];
        for resolution in [1 << 59, i64::MAX / 1000, i64::MAX] {
            let bars = aggregate(&points, resolution);
            assert_eq!(bars, vec![Bar { time: 0, open: 1.0, high: 3.0, low: 1.0, close: 3.0 }]);
        }
        let bars = aggregate(&[(-5_000, 2.0)], i64::MAX);
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 2.0);
    }

    #[test]
    fn empty_input_gives_no_bars() {
        assert!(aggregate(&[], 1).is_empty());
        assert!(aggregate(&[], 0).is_empty());
    }

    #[test]
    fn time_is_truncated_to_whole_seconds() {
        let bars = aggregate(&[(59_999, 5.0)], 0);
        assert_eq!(bars[0].time, 59);
        // 15-minute bucket start for a point 16 minutes in
        let bars = aggregate(&[(16 * 60_000 + 999, 5.0)], 15);
        assert_eq!(bars[0].time, 15 * 60);
    }
}
