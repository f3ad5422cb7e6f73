// Outbound delivery. The Broadcaster decides who gets what; the Notifier
// only knows how to push one message to one recipient.

use crate::format;
use crate::models::{Subscriber, TradeIdea};
use crate::quality::QualityRating;
use crate::tracker::ClosedIdea;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: i64, text: &str) -> crate::Result<()>;
}

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Bot-API delivery of Markdown messages
pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(TELEGRAM_API_BASE, token)
    }

    pub fn with_base_url(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, recipient: i64, text: &str) -> crate::Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "chat_id": recipient,
                "text": text,
                "parse_mode": "Markdown",
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("telegram returned {status}").into());
        }

        let body: TelegramResponse = response.json().await?;
        if !body.ok {
            let reason = body.description.unwrap_or_else(|| "unknown".to_string());
            return Err(format!("telegram rejected message: {reason}").into());
        }

        Ok(())
    }
}

/// Stand-in when no bot token is configured; messages go to the log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, recipient: i64, text: &str) -> crate::Result<()> {
        info!(recipient, "would send:\n{}", text);
        Ok(())
    }
}

/// Fans a message out to every subscriber it concerns. Delivery failures
/// are per-recipient: one blocked chat never stops the rest.
pub struct Broadcaster {
    notifier: Arc<dyn Notifier>,
}

impl Broadcaster {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Send a fresh signal to every subscriber who opted into the symbol,
    /// with position sizing from their own deposit and risk settings.
    /// Returns how many messages went out.
    pub async fn broadcast_signal(
        &self,
        idea: &TradeIdea,
        rating: &QualityRating,
        subscribers: &[Subscriber],
    ) -> usize {
        let mut sent = 0;
        for subscriber in subscribers {
            if !subscriber.wants(&idea.symbol) {
                continue;
            }
            let size = format::position_size(
                subscriber.deposit,
                subscriber.risk_per_trade,
                idea.entry,
                idea.stop,
            );
            let text = format::format_signal(idea, rating, size);
            match self.notifier.notify(subscriber.user_id, &text).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!(user_id = subscriber.user_id, error = %e, "delivery failed");
                }
            }
        }
        sent
    }

    /// Tell everyone who followed a symbol how the idea ended
    pub async fn broadcast_close(&self, closed: &ClosedIdea, subscribers: &[Subscriber]) -> usize {
        let text = format::format_close(closed);
        let mut sent = 0;
        for subscriber in subscribers {
            if !subscriber.wants(&closed.idea.symbol) {
                continue;
            }
            match self.notifier.notify(subscriber.user_id, &text).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!(user_id = subscriber.user_id, error = %e, "delivery failed");
                }
            }
        }
        sent
    }

    /// One-off message to a single user
    pub async fn send_direct(&self, user_id: i64, text: &str) {
        if let Err(e) = self.notifier.notify(user_id, text).await {
            warn!(user_id, error = %e, "delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Side;
    use crate::quality::rate_idea;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_telegram_send() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/botTEST_TOKEN/sendMessage")
            .with_status(200)
            .with_body(r#"{"ok": true}"#)
            .create_async()
            .await;

        let notifier = TelegramNotifier::with_base_url(server.url(), "TEST_TOKEN");
        notifier.notify(42, "hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_telegram_rejection_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/botTEST_TOKEN/sendMessage")
            .with_status(200)
            .with_body(r#"{"ok": false, "description": "Forbidden: bot was blocked"}"#)
            .create_async()
            .await;

        let notifier = TelegramNotifier::with_base_url(server.url(), "TEST_TOKEN");
        let err = notifier.notify(42, "hello").await.unwrap_err();
        assert!(err.to_string().contains("blocked"));
    }

    /// Records recipients; fails for one designated user
    struct RecordingNotifier {
        sent_to: Mutex<Vec<i64>>,
        fail_for: Option<i64>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, recipient: i64, _text: &str) -> crate::Result<()> {
            if self.fail_for == Some(recipient) {
                return Err("blocked".into());
            }
            self.sent_to.lock().unwrap().push(recipient);
            Ok(())
        }
    }

    fn subscriber(user_id: i64, pairs: &str) -> Subscriber {
        Subscriber {
            user_id,
            username: None,
            status: "PREMIUM".to_string(),
            subscribed_until: None,
            selected_pairs: pairs.to_string(),
            deposit: 1000.0,
            risk_per_trade: 2.0,
        }
    }

    #[tokio::test]
    async fn test_broadcast_filters_by_pair() {
        let recorder = Arc::new(RecordingNotifier {
            sent_to: Mutex::new(Vec::new()),
            fail_for: None,
        });
        let broadcaster = Broadcaster::new(recorder.clone());

        let idea = TradeIdea::new("BTC/USDT", Side::Long, 100.0, 98.5, vec![103.0], "test");
        let rating = rate_idea(&idea, None);
        let subs = vec![
            subscriber(1, "BTC/USDT,ETH/USDT"),
            subscriber(2, "SOL/USDT"),
            subscriber(3, "BTC/USDT"),
        ];

        let sent = broadcaster.broadcast_signal(&idea, &rating, &subs).await;
        assert_eq!(sent, 2);
        assert_eq!(*recorder.sent_to.lock().unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_one_blocked_chat_does_not_stop_the_rest() {
        let recorder = Arc::new(RecordingNotifier {
            sent_to: Mutex::new(Vec::new()),
            fail_for: Some(1),
        });
        let broadcaster = Broadcaster::new(recorder.clone());

        let idea = TradeIdea::new("BTC/USDT", Side::Long, 100.0, 98.5, vec![103.0], "test");
        let rating = rate_idea(&idea, None);
        let subs = vec![subscriber(1, "BTC/USDT"), subscriber(2, "BTC/USDT")];

        let sent = broadcaster.broadcast_signal(&idea, &rating, &subs).await;
        assert_eq!(sent, 1);
        assert_eq!(*recorder.sent_to.lock().unwrap(), vec![2]);
    }
}
