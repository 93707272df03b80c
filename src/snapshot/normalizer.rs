use crate::types::{FetchedOdds, SnapshotRow, Source};

/// Build a snapshot row from one fetch result. Pure: the same inputs always
/// give the same row.
pub fn normalize(
    symbol: &str,
    source: Source,
    market_key: &str,
    odds: &FetchedOdds,
    ts: i64,
) -> SnapshotRow {
    SnapshotRow {
        ts,
        symbol: symbol.to_uppercase(),
        source,
        market_key: market_key.to_string(),
        question: odds.question.clone().unwrap_or_default(),
        yes: clamp_prob(odds.yes),
        no: clamp_prob(odds.no),
        volume: finite(odds.volume),
        liquidity: finite(odds.liquidity),
    }
}

/// Non-finite → 0, otherwise clamped into [0, 1].
pub fn clamp_prob(p: f64) -> f64 {
    if !p.is_finite() {
        return 0.0;
    }
    p.clamp(0.0, 1.0)
}

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn odds(yes: f64, no: f64) -> FetchedOdds {
        FetchedOdds {
            yes,
            no,
            question: Some("Q".to_string()),
            volume: None,
            liquidity: None,
        }
    }

    #[test]
    fn clamps_yes_and_no() {
        let row = normalize("SPX", Source::Polymarket, "slug", &odds(1.5, -0.2), 0);
        assert_eq!(row.yes, 1.0);
        assert_eq!(row.no, 0.0);
    }

    #[test]
    fn non_finite_probabilities_become_zero() {
        let row = normalize("SPX", Source::Kalshi, "T", &odds(f64::NAN, f64::INFINITY), 0);
        assert_eq!(row.yes, 0.0);
        assert_eq!(row.no, 0.0);
        assert_eq!(clamp_prob(f64::NEG_INFINITY), 0.0);
    }

    #[test]
    fn clamp_is_bounded_and_idempotent() {
        for p in [-3.0, -0.0, 0.0, 0.25, 1.0, 1.0001, 42.0, f64::NAN, f64::INFINITY, f64::MIN] {
            let c = clamp_prob(p);
            assert!((0.0..=1.0).contains(&c), "clamp({p}) = {c}");
            assert_eq!(clamp_prob(c), c);
        }
    }

    #[test]
    fn keeps_finite_volume_and_liquidity() {
        let mut o = odds(0.6, 0.4);
        o.volume = Some(1000.0);
        o.liquidity = Some(500.0);
        let row = normalize("SPX", Source::Polymarket, "slug", &o, 0);
        assert_eq!(row.volume, Some(1000.0));
        assert_eq!(row.liquidity, Some(500.0));
    }

    #[test]
    fn drops_missing_or_non_finite_volume_and_liquidity() {
        let row = normalize("SPX", Source::Polymarket, "slug", &odds(0.5, 0.5), 0);
        assert_eq!(row.volume, None);
        assert_eq!(row.liquidity, None);

        let mut o = odds(0.5, 0.5);
        o.volume = Some(f64::NAN);
        o.liquidity = Some(f64::NEG_INFINITY);
        let row = normalize("SPX", Source::Polymarket, "slug", &o, 0);
        assert_eq!(row.volume, None);
        assert_eq!(row.liquidity, None);
    }

    #[test]
    fn uppercases_symbol_and_defaults_question() {
        let mut o = odds(0.5, 0.5);
        o.question = None;
        let row = normalize("spx", Source::Polymarket, "slug", &o, 1234);
        assert_eq!(row.symbol, "SPX");
        assert_eq!(row.question, "");
        assert_eq!(row.ts, 1234);
        assert_eq!(row.market_key, "slug");
    }
}
