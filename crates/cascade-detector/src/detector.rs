use cascade_core::{CascadeEvent, Direction};
use numeric_kit::{annualize_vol_per_minute, window_threshold};

use crate::types::{DetectorParams, LiquidationEvent, PricePoint, Side};

struct LogReturn {
    timestamp_ms: i64,
    value: f64,
}

/// Linear-interpolated price at `t`, via binary search for the bracketing
/// pair of sorted points. `None` if `t` falls outside the series.
fn interpolate_price(prices: &[PricePoint], t: i64) -> Option<f64> {
    if prices.is_empty() || t < prices[0].timestamp_ms || t > prices.last().unwrap().timestamp_ms {
        return None;
    }
    let idx = prices.partition_point(|p| p.timestamp_ms <= t);
    if idx == 0 {
        return Some(prices[0].price);
    }
    if idx >= prices.len() {
        return Some(prices.last().unwrap().price);
    }
    let lo = &prices[idx - 1];
    let hi = &prices[idx];
    if lo.timestamp_ms == t {
        return Some(lo.price);
    }
    Some(numeric_kit::lerp(
        t as f64,
        lo.timestamp_ms as f64,
        lo.price,
        hi.timestamp_ms as f64,
        hi.price,
    ))
}

fn consecutive_log_returns(prices: &[PricePoint]) -> Vec<LogReturn> {
    prices
        .windows(2)
        .filter_map(|w| {
            if w[0].price <= 0.0 || w[1].price <= 0.0 {
                return None;
            }
            Some(LogReturn {
                timestamp_ms: w[1].timestamp_ms,
                value: (w[1].price / w[0].price).ln(),
            })
        })
        .collect()
}

/// Trailing per-minute volatility (stddev of log returns) ending at `t`
/// over `lookback_min`. `None` if fewer than 30 observations fall in range.
fn trailing_volatility(returns: &[LogReturn], t: i64, lookback_min: i64) -> Option<f64> {
    let since = t - lookback_min * 60_000;
    let window: Vec<f64> = returns
        .iter()
        .filter(|r| r.timestamp_ms > since && r.timestamp_ms <= t)
        .map(|r| r.value)
        .collect();
    if window.len() < 30 {
        return None;
    }
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    Some(variance.max(0.0).sqrt())
}

fn quantile_of_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let p = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = p.floor() as usize;
    let hi = p.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = p - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

/// Sum of long/short liquidation volume in `[start_ms, end_ms)`, located by
/// binary search over the sorted event series.
fn liquidation_sums(events: &[LiquidationEvent], start_ms: i64, end_ms: i64) -> (f64, f64) {
    let lo = events.partition_point(|e| e.timestamp_ms < start_ms);
    let hi = events.partition_point(|e| e.timestamp_ms < end_ms);
    let mut long_vol = 0.0;
    let mut short_vol = 0.0;
    for e in &events[lo..hi] {
        match e.side {
            Side::Long => long_vol += e.size_usd,
            Side::Short => short_vol += e.size_usd,
        }
    }
    (long_vol, short_vol)
}

/// Liquidation-volume threshold a window must clear to be considered a
/// cascade candidate: the 95th percentile of historical per-window totals
/// over the lookback, floored at `min_liq_usd`, falling back to
/// `min_liq_usd` outright when fewer than 10 historical buckets exist.
fn liquidation_threshold(events: &[LiquidationEvent], t: i64, params: &DetectorParams) -> f64 {
    let lookback_ms = params.vol_lookback_min * 60_000;
    let window_ms = params.window_min * 60_000;
    let since = t - lookback_ms;

    let mut bucket_totals = Vec::new();
    let mut bucket_start = since;
    while bucket_start < t {
        let bucket_end = (bucket_start + window_ms).min(t);
        let (long_vol, short_vol) = liquidation_sums(events, bucket_start, bucket_end);
        bucket_totals.push(long_vol + short_vol);
        bucket_start += window_ms;
    }

    if bucket_totals.len() < 10 {
        return params.min_liq_usd;
    }
    bucket_totals.sort_by(|a, b| a.total_cmp(b));
    quantile_of_sorted(&bucket_totals, params.liq_percentile).max(params.min_liq_usd)
}

struct Candidate {
    start_ms: i64,
    end_ms: i64,
    direction: Direction,
    liquidation_volume_usd: f64,
}

/// Detect cascade events from sorted price and liquidation series (§4.4).
/// Returns no events if `liquidations` is empty: cascades are never
/// fabricated from price action alone.
pub fn detect_cascades(
    symbol: &str,
    prices: &[PricePoint],
    liquidations: &[LiquidationEvent],
    params: &DetectorParams,
) -> Vec<CascadeEvent> {
    if liquidations.is_empty() || prices.len() < 2 {
        return Vec::new();
    }

    let mut prices = prices.to_vec();
    prices.sort_by_key(|p| p.timestamp_ms);
    let mut liquidations = liquidations.to_vec();
    for e in &mut liquidations {
        e.size_usd = numeric_kit::finite_or(e.size_usd, 0.0).max(0.0);
    }
    liquidations.sort_by_key(|e| e.timestamp_ms);

    let returns = consecutive_log_returns(&prices);

    let window_ms = params.window_min * 60_000;
    let step_ms = params.step_min.max(1) * 60_000;
    let first = prices.first().unwrap().timestamp_ms;
    let last = prices.last().unwrap().timestamp_ms;

    let mut candidates: Vec<Candidate> = Vec::new();
    let mut t = first;
    while t + window_ms <= last {
        if let Some(candidate) = evaluate_window(t, window_ms, &prices, &returns, &liquidations, params) {
            candidates.push(candidate);
        }
        t += step_ms;
    }

    let events = merge_candidates(symbol, candidates, &prices);
    tracing::debug!(
        symbol = %symbol,
        windows_scanned = (last - first) / step_ms.max(1),
        events_found = events.len(),
        "cascade detection sweep complete"
    );
    events
}

fn evaluate_window(
    t: i64,
    window_ms: i64,
    prices: &[PricePoint],
    returns: &[LogReturn],
    liquidations: &[LiquidationEvent],
    params: &DetectorParams,
) -> Option<Candidate> {
    let p_start = interpolate_price(prices, t)?;
    let p_end = interpolate_price(prices, t + window_ms)?;
    if p_start == 0.0 {
        return None;
    }
    let delta_p = (p_end - p_start) / p_start;

    let sigma_per_minute = trailing_volatility(returns, t, params.vol_lookback_min)?;
    let sigma_ann = annualize_vol_per_minute(sigma_per_minute);
    let threshold = window_threshold(sigma_ann, params.window_min as f64, params.sigma_multiplier);

    if delta_p.abs() < threshold {
        return None;
    }

    let (long_vol, short_vol) = liquidation_sums(liquidations, t, t + window_ms);
    let total = long_vol + short_vol;
    if total == 0.0 {
        return None;
    }

    let liq_threshold = liquidation_threshold(liquidations, t, params);
    if total < liq_threshold {
        return None;
    }

    if long_vol.max(short_vol) / total < params.dominance_ratio {
        return None;
    }

    let direction = if long_vol > short_vol {
        Direction::LongSqueeze
    } else {
        Direction::ShortSqueeze
    };

    Some(Candidate {
        start_ms: t,
        end_ms: t + window_ms,
        direction,
        liquidation_volume_usd: total,
    })
}

/// Merge overlapping or adjacent same-direction candidates, recomputing
/// `price_change_pct` and `liquidation_volume_usd` over the merged span.
fn merge_candidates(symbol: &str, mut candidates: Vec<Candidate>, prices: &[PricePoint]) -> Vec<CascadeEvent> {
    candidates.sort_by_key(|c| c.start_ms);

    let mut merged: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if let Some(last) = merged.last_mut() {
            if last.direction == candidate.direction && candidate.start_ms <= last.end_ms {
                last.end_ms = last.end_ms.max(candidate.end_ms);
                last.liquidation_volume_usd += candidate.liquidation_volume_usd;
                continue;
            }
        }
        merged.push(candidate);
    }

    merged
        .into_iter()
        .filter_map(|c| {
            let p_start = interpolate_price(prices, c.start_ms)?;
            let p_end = interpolate_price(prices, c.end_ms)?;
            if p_start == 0.0 {
                return None;
            }
            Some(CascadeEvent {
                symbol: symbol.to_string(),
                direction: c.direction,
                start_time_ms: c.start_ms,
                end_time_ms: c.end_ms,
                price_change_pct: (p_end - p_start) / p_start * 100.0,
                liquidation_volume_usd: c.liquidation_volume_usd,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_prices(n: i64, price: f64) -> Vec<PricePoint> {
        (0..n)
            .map(|i| PricePoint {
                timestamp_ms: i * 60_000,
                price,
            })
            .collect()
    }

    #[test]
    fn no_liquidation_feed_means_no_events() {
        let prices = flat_prices(100, 100.0);
        let events = detect_cascades("BTC-PERP", &prices, &[], &DetectorParams::default());
        assert!(events.is_empty());
    }

    #[test]
    fn interpolate_price_matches_known_points() {
        let prices = vec![
            PricePoint { timestamp_ms: 0, price: 100.0 },
            PricePoint { timestamp_ms: 60_000, price: 110.0 },
        ];
        assert_eq!(interpolate_price(&prices, 0), Some(100.0));
        assert_eq!(interpolate_price(&prices, 60_000), Some(110.0));
        assert_eq!(interpolate_price(&prices, 30_000), Some(105.0));
        assert_eq!(interpolate_price(&prices, 90_000), None);
    }

    #[test]
    fn detects_sharp_drop_with_dominant_long_liquidations() {
        // Build ~2 days of calm 1-minute prices, then a 6% drop over 5 minutes
        // with dominant long liquidations inside the drop window.
        let mut prices = Vec::new();
        let mut seed = 7u64;
        let mut price = 100.0;
        for i in 0..2880 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            let noise = (((seed >> 40) % 21) as f64 - 10.0) / 10_000.0; // +-0.1%
            price *= 1.0 + noise;
            prices.push(PricePoint {
                timestamp_ms: i * 60_000,
                price,
            });
        }
        let drop_start = 2880 * 60_000;
        let pre_drop_price = price;
        for i in 0..6 {
            price *= 1.0 - 0.01;
            prices.push(PricePoint {
                timestamp_ms: drop_start + i * 60_000,
                price,
            });
        }
        assert!((price - pre_drop_price) / pre_drop_price < -0.05);

        let mut liquidations = Vec::new();
        // Quiet background liquidations for the bucket history.
        for i in 0..2880 {
            if i % 30 == 0 {
                liquidations.push(LiquidationEvent {
                    timestamp_ms: i * 60_000,
                    side: Side::Long,
                    size_usd: 10_000.0,
                });
            }
        }
        // Dominant long liquidation burst during the drop.
        liquidations.push(LiquidationEvent {
            timestamp_ms: drop_start + 60_000,
            side: Side::Long,
            size_usd: 4_500_000.0,
        });
        liquidations.push(LiquidationEvent {
            timestamp_ms: drop_start + 2 * 60_000,
            side: Side::Short,
            size_usd: 200_000.0,
        });

        let events = detect_cascades("BTC-PERP", &prices, &liquidations, &DetectorParams::default());
        assert!(!events.is_empty());
        let event = &events[0];
        assert_eq!(event.direction, Direction::LongSqueeze);
        assert!(event.price_change_pct < 0.0);
        assert!(event.liquidation_volume_usd >= 4_500_000.0);
    }

    #[test]
    fn non_finite_liquidation_size_does_not_panic() {
        let prices = flat_prices(100, 100.0);
        let liquidations = vec![
            LiquidationEvent { timestamp_ms: 0, side: Side::Long, size_usd: f64::NAN },
            LiquidationEvent { timestamp_ms: 60_000, side: Side::Short, size_usd: f64::INFINITY },
            LiquidationEvent { timestamp_ms: 120_000, side: Side::Long, size_usd: 50_000.0 },
        ];
        let events = detect_cascades("BTC-PERP", &prices, &liquidations, &DetectorParams::default());
        assert!(events.is_empty());
    }

    #[test]
    fn deterministic_on_unsorted_input() {
        let mut prices = flat_prices(50, 100.0);
        prices.reverse();
        let mut liquidations = vec![
            LiquidationEvent { timestamp_ms: 60_000, side: Side::Long, size_usd: 200_000.0 },
            LiquidationEvent { timestamp_ms: 0, side: Side::Long, size_usd: 150_000.0 },
        ];
        let a = detect_cascades("BTC-PERP", &prices, &liquidations, &DetectorParams::default());
        liquidations.reverse();
        let b = detect_cascades("BTC-PERP", &prices, &liquidations, &DetectorParams::default());
        assert_eq!(a.len(), b.len());
    }
}
