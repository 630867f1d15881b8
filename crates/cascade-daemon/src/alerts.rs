use cascade_core::{Alert, AlertEntry, RiskAssessment, RiskLevel};
use tokio::sync::broadcast;

/// Broadcasts an [`Alert`] whenever any assessment in a batch is
/// `elevated`/`high`/`critical` (§6 "Outputs produced").
#[derive(Clone)]
pub struct AlertBroadcaster {
    sender: broadcast::Sender<Alert>,
}

impl AlertBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.sender.subscribe()
    }

    /// Groups alertable assessments by level and sends one `Alert` per
    /// level present in the batch. Returns the number of alerts sent.
    pub fn publish(&self, assessments: &[RiskAssessment]) -> usize {
        let mut by_level: Vec<(RiskLevel, Vec<AlertEntry>)> = Vec::new();
        for a in assessments.iter().filter(|a| a.risk_level.is_alertable()) {
            let entry = AlertEntry {
                symbol: a.symbol.clone(),
                risk_score: a.risk_score,
                risk_level: a.risk_level,
                prediction: a.prediction.clone(),
            };
            match by_level.iter_mut().find(|(level, _)| *level == a.risk_level) {
                Some((_, entries)) => entries.push(entry),
                None => by_level.push((a.risk_level, vec![entry])),
            }
        }

        let mut sent = 0;
        for (level, symbols) in by_level {
            // A send error just means there are no subscribers right now.
            if self.sender.send(Alert { level, symbols }).is_ok() {
                sent += 1;
            }
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use cascade_core::{Direction, Prediction, TimeWindow};

    use super::*;

    fn assessment(symbol: &str, level: RiskLevel) -> RiskAssessment {
        RiskAssessment {
            symbol: symbol.to_string(),
            timestamp_ms: 0,
            risk_score: 70,
            risk_level: level,
            confidence: 0.8,
            factors: vec![],
            prediction: Some(Prediction {
                direction: Direction::LongSqueeze,
                probability: 0.7,
                estimated_impact_usd: 1_000_000.0,
                time_window: TimeWindow::OneToFourHours,
                trigger_price: 49_000.0,
                trigger_distance_pct: 2.0,
            }),
        }
    }

    #[test]
    fn low_risk_assessments_are_not_alertable() {
        let bus = AlertBroadcaster::new(16);
        let mut rx = bus.subscribe();
        let sent = bus.publish(&[assessment("BTC-PERP", RiskLevel::Low)]);
        assert_eq!(sent, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn groups_alertable_assessments_by_level() {
        let bus = AlertBroadcaster::new(16);
        let mut rx = bus.subscribe();
        let sent = bus.publish(&[
            assessment("BTC-PERP", RiskLevel::Critical),
            assessment("ETH-PERP", RiskLevel::Critical),
            assessment("SOL-PERP", RiskLevel::High),
        ]);
        assert_eq!(sent, 2);
        let first = rx.try_recv().unwrap();
        assert_eq!(first.symbols.len(), 2);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.symbols.len(), 1);
    }
}
