use async_trait::async_trait;

use crate::error::CascadeError;
use crate::types::{CascadeEvent, Direction, RiskAssessment};

/// Persistence port for risk scores. Idempotent upsert by `(time, symbol)`
/// (§6); implementations own their own storage engine and migrations.
#[async_trait]
pub trait RiskScoreStore: Send + Sync {
    async fn upsert(&self, assessment: &RiskAssessment) -> Result<(), CascadeError>;

    /// Page through assessments for `symbol` in `[since_ms, until_ms]`,
    /// ordered by `timestamp_ms` ascending, at most `limit` rows. The
    /// backtest driver uses this to stream without materializing the full
    /// range (§4.5, §9).
    async fn page(
        &self,
        symbol: &str,
        since_ms: i64,
        until_ms: i64,
        limit: usize,
    ) -> Result<Vec<RiskAssessment>, CascadeError>;
}

/// Persistence port for cascade ground-truth events. Idempotent upsert by
/// `(symbol, direction, start_time_ms)` (§6).
#[async_trait]
pub trait CascadeEventStore: Send + Sync {
    async fn upsert(&self, event: &CascadeEvent) -> Result<(), CascadeError>;

    /// All events for `symbol` whose window overlaps `[since_ms, until_ms]`,
    /// ordered by `start_time_ms` ascending.
    async fn load(
        &self,
        symbol: &str,
        since_ms: i64,
        until_ms: i64,
    ) -> Result<Vec<CascadeEvent>, CascadeError>;
}

/// In-memory implementations for tests and local demos. Not suitable for
/// production multi-process deployments.
pub mod memory {
    use std::collections::HashMap;
    use std::sync::RwLock;

    use async_trait::async_trait;

    use super::*;

    #[derive(Debug, Default)]
    pub struct InMemoryRiskScoreStore {
        // keyed by symbol, each Vec kept sorted by timestamp_ms
        rows: RwLock<HashMap<String, Vec<RiskAssessment>>>,
    }

    impl InMemoryRiskScoreStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl RiskScoreStore for InMemoryRiskScoreStore {
        async fn upsert(&self, assessment: &RiskAssessment) -> Result<(), CascadeError> {
            let mut rows = self.rows.write().map_err(|_| {
                CascadeError::Storage("risk score store lock poisoned".into())
            })?;
            let symbol_rows = rows.entry(assessment.symbol.clone()).or_default();
            match symbol_rows
                .iter()
                .position(|a| a.timestamp_ms == assessment.timestamp_ms)
            {
                Some(idx) => symbol_rows[idx] = assessment.clone(),
                None => {
                    let idx = symbol_rows
                        .partition_point(|a| a.timestamp_ms < assessment.timestamp_ms);
                    symbol_rows.insert(idx, assessment.clone());
                }
            }
            Ok(())
        }

        async fn page(
            &self,
            symbol: &str,
            since_ms: i64,
            until_ms: i64,
            limit: usize,
        ) -> Result<Vec<RiskAssessment>, CascadeError> {
            let rows = self.rows.read().map_err(|_| {
                CascadeError::Storage("risk score store lock poisoned".into())
            })?;
            let page = rows
                .get(symbol)
                .map(|v| {
                    v.iter()
                        .filter(|a| a.timestamp_ms >= since_ms && a.timestamp_ms <= until_ms)
                        .take(limit)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            Ok(page)
        }
    }

    #[derive(Debug, Default)]
    pub struct InMemoryCascadeEventStore {
        rows: RwLock<HashMap<(String, Direction, i64), CascadeEvent>>,
    }

    impl InMemoryCascadeEventStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl CascadeEventStore for InMemoryCascadeEventStore {
        async fn upsert(&self, event: &CascadeEvent) -> Result<(), CascadeError> {
            let mut rows = self.rows.write().map_err(|_| {
                CascadeError::Storage("cascade event store lock poisoned".into())
            })?;
            rows.insert(
                (event.symbol.clone(), event.direction, event.start_time_ms),
                event.clone(),
            );
            Ok(())
        }

        async fn load(
            &self,
            symbol: &str,
            since_ms: i64,
            until_ms: i64,
        ) -> Result<Vec<CascadeEvent>, CascadeError> {
            let rows = self.rows.read().map_err(|_| {
                CascadeError::Storage("cascade event store lock poisoned".into())
            })?;
            let mut out: Vec<CascadeEvent> = rows
                .values()
                .filter(|e| {
                    e.symbol == symbol && e.start_time_ms <= until_ms && e.end_time_ms >= since_ms
                })
                .cloned()
                .collect();
            out.sort_by_key(|e| e.start_time_ms);
            Ok(out)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::types::RiskLevel;

        fn assessment(symbol: &str, ts: i64, score: i32) -> RiskAssessment {
            RiskAssessment {
                symbol: symbol.to_string(),
                timestamp_ms: ts,
                risk_score: score,
                risk_level: RiskLevel::Low,
                confidence: 0.1,
                factors: vec![],
                prediction: None,
            }
        }

        #[tokio::test]
        async fn upsert_is_idempotent_by_time_and_symbol() {
            let store = InMemoryRiskScoreStore::new();
            store.upsert(&assessment("BTC-PERP", 1_000, 10)).await.unwrap();
            store.upsert(&assessment("BTC-PERP", 1_000, 20)).await.unwrap();
            let page = store.page("BTC-PERP", 0, 2_000, 10).await.unwrap();
            assert_eq!(page.len(), 1);
            assert_eq!(page[0].risk_score, 20);
        }

        #[tokio::test]
        async fn page_respects_time_range_and_limit() {
            let store = InMemoryRiskScoreStore::new();
            for i in 0..10 {
                store
                    .upsert(&assessment("BTC-PERP", i * 60_000, i as i32))
                    .await
                    .unwrap();
            }
            let page = store.page("BTC-PERP", 0, 300_000, 3).await.unwrap();
            assert_eq!(page.len(), 3);
            assert_eq!(page[0].timestamp_ms, 0);
        }

        #[tokio::test]
        async fn cascade_event_upsert_is_idempotent_by_identity_key() {
            let store = InMemoryCascadeEventStore::new();
            let event = CascadeEvent {
                symbol: "BTC-PERP".into(),
                direction: Direction::LongSqueeze,
                start_time_ms: 1_000,
                end_time_ms: 5_000,
                price_change_pct: -6.0,
                liquidation_volume_usd: 5_000_000.0,
            };
            store.upsert(&event).await.unwrap();
            let mut updated = event.clone();
            updated.end_time_ms = 6_000;
            store.upsert(&updated).await.unwrap();
            let loaded = store.load("BTC-PERP", 0, 10_000).await.unwrap();
            assert_eq!(loaded.len(), 1);
            assert_eq!(loaded[0].end_time_ms, 6_000);
        }
    }
}
