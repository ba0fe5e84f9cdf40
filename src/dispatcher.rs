//! Fan-out of alert texts to an endpoint's subscribers

use crate::gateway::SmsSender;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one notify call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
    /// Network-level failures, logged but not treated as delivery errors
    pub transport_errors: usize,
}

pub struct AlertDispatcher {
    sender: Arc<dyn SmsSender>,
}

impl AlertDispatcher {
    pub fn new(sender: Arc<dyn SmsSender>) -> Self {
        Self { sender }
    }

    /// Send `text` to every subscriber. Failures are reported per phone and never abort the batch.
    pub async fn notify(&self, subscribers: &[String], text: &str) -> DispatchReport {
        let mut report = DispatchReport::default();

        for phone in subscribers {
            match self.sender.send_text(phone, text).await {
                Ok(_) => report.delivered += 1,
                Err(e) if e.is_network() => {
                    debug!("Transport error sending SMS to {}: {}", phone, e);
                    report.transport_errors += 1;
                }
                Err(e) => {
                    warn!("SMS message error for {}: {}", phone, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Alert dispatched to {}/{} subscribers ({} failed, {} transport errors)",
            report.delivered,
            subscribers.len(),
            report.failed,
            report.transport_errors
        );

        report
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::errors::GatewayError;
    use crate::gateway::SendReceipt;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// Sender recording every message; phones listed in `failures` get the mapped error
    #[derive(Default)]
    pub(crate) struct RecordingSender {
        pub sent: Mutex<Vec<(String, String)>>,
        pub failures: HashMap<String, i64>,
        pub network_failures: Vec<String>,
    }

    async fn network_error() -> GatewayError {
        let err = reqwest::Client::new()
            .get("http://127.0.0.1:1/")
            .send()
            .await
            .unwrap_err();
        GatewayError::Network(err)
    }

    #[async_trait]
    impl SmsSender for RecordingSender {
        async fn send_text(&self, phone: &str, text: &str) -> Result<SendReceipt, GatewayError> {
            self.sent.lock().await.push((phone.to_string(), text.to_string()));

            if self.network_failures.iter().any(|p| p == phone) {
                return Err(network_error().await);
            }
            if let Some(code) = self.failures.get(phone) {
                return Err(GatewayError::from_code(*code).unwrap());
            }

            Ok(SendReceipt {
                raw_sms: 1,
                credits: 100.0,
                data: Value::Null,
            })
        }
    }

    fn phones(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[tokio::test]
    async fn test_notify_all_subscribers() {
        let sender = Arc::new(RecordingSender::default());
        let dispatcher = AlertDispatcher::new(sender.clone());

        let report = dispatcher
            .notify(&phones(&["79990000001", "79990000002"]), "Сайт example.test доступен.")
            .await;

        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(sender.sent.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_remaining_subscribers() {
        let mut failures = HashMap::new();
        failures.insert("79990000001".to_string(), 36);
        let sender = Arc::new(RecordingSender {
            failures,
            ..Default::default()
        });
        let dispatcher = AlertDispatcher::new(sender.clone());

        let report = dispatcher
            .notify(&phones(&["79990000001", "79990000002", "79990000003"]), "down")
            .await;

        assert_eq!(
            report,
            DispatchReport {
                delivered: 2,
                failed: 1,
                transport_errors: 0
            }
        );
        assert_eq!(sender.sent.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn test_network_errors_are_swallowed() {
        let sender = Arc::new(RecordingSender {
            network_failures: vec!["79990000002".to_string()],
            ..Default::default()
        });
        let dispatcher = AlertDispatcher::new(sender);

        let report = dispatcher
            .notify(&phones(&["79990000001", "79990000002"]), "down")
            .await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.transport_errors, 1);
    }
}
