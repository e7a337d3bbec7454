//! Delivery of accepted listings to Telegram chats, with bounded retry.

use crate::area;
use crate::config::Subscriber;
use crate::listing::Listing;
use serde_json::json;
use std::future::Future;
use tokio::time::Duration;
use tracing::{debug, warn};

const DELIMITER_MESSAGE: &str = "------------------------------";

/// Transport failures, split the way the transport itself classifies them.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Worth another attempt: network failure, rate limiting, server error.
    #[error("retryable transport failure: {0}")]
    Retryable(String),
    /// The payload was rejected; repeating the call cannot succeed.
    #[error("terminal transport failure: {0}")]
    Terminal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Retry bound exceeded on a retryable failure. Operator-visible; the
    /// (listing, subscriber) pair stays unmarked so the next cycle retries.
    #[error("gave up after {attempts} attempts: {reason}")]
    RetriesExhausted { attempts: u32, reason: String },
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TransportError>;
    async fn send_photo_album(&self, chat_id: i64, photo_urls: &[String])
        -> Result<(), TransportError>;
}

/// Telegram Bot API over plain HTTP calls.
pub struct Telegram {
    client: reqwest::Client,
    token: String,
}

impl Telegram {
    pub fn new(token: impl Into<String>) -> Telegram {
        Telegram {
            client: reqwest::Client::new(),
            token: token.into(),
        }
    }

    async fn call(&self, method: &str, payload: serde_json::Value) -> Result<(), TransportError> {
        let url = format!("https://api.telegram.org/bot{}/{method}", self.token);
        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TransportError::Retryable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Err(TransportError::Retryable(format!("{method}: {status}: {body}")))
        } else {
            Err(TransportError::Terminal(format!("{method}: {status}: {body}")))
        }
    }
}

#[async_trait::async_trait]
impl Transport for Telegram {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        self.call(
            "sendMessage",
            json!({ "chat_id": chat_id, "text": text, "parse_mode": "HTML" }),
        )
        .await
    }

    async fn send_photo_album(
        &self,
        chat_id: i64,
        photo_urls: &[String],
    ) -> Result<(), TransportError> {
        let media: Vec<_> = photo_urls
            .iter()
            .map(|url| json!({ "type": "photo", "media": url }))
            .collect();
        self.call("sendMediaGroup", json!({ "chat_id": chat_id, "media": media }))
            .await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

enum Attempted {
    Sent,
    Abandoned,
}

pub struct DeliveryClient {
    transport: Box<dyn Transport>,
    retry: RetryPolicy,
    max_photos: usize,
}

impl DeliveryClient {
    pub fn new(transport: Box<dyn Transport>, retry: RetryPolicy, max_photos: usize) -> DeliveryClient {
        DeliveryClient {
            transport,
            retry,
            max_photos,
        }
    }

    /// Send one listing to one subscriber: delimiter, capped photo album,
    /// then the caption message. A terminal transport failure abandons the
    /// delivery and counts as completed; only retry exhaustion is an error.
    pub async fn send(&self, subscriber: &Subscriber, listing: &Listing) -> Result<(), DeliveryError> {
        let (photos, truncated) = photo_batch(listing, self.max_photos);
        let text = caption(listing, truncated);
        let chat_id = subscriber.chat_id;

        debug!(listing = %listing.id, subscriber = %subscriber.id, photos = photos.len(), "sending");

        let sent = self
            .with_retry(|| self.transport.send_message(chat_id, DELIMITER_MESSAGE))
            .await?;
        if matches!(sent, Attempted::Abandoned) {
            return Ok(());
        }
        if !photos.is_empty() {
            let sent = self
                .with_retry(|| self.transport.send_photo_album(chat_id, &photos))
                .await?;
            if matches!(sent, Attempted::Abandoned) {
                return Ok(());
            }
        }
        self.with_retry(|| self.transport.send_message(chat_id, &text))
            .await?;
        Ok(())
    }

    async fn with_retry<F, Fut>(&self, mut call: F) -> Result<Attempted, DeliveryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), TransportError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(()) => return Ok(Attempted::Sent),
                Err(TransportError::Terminal(reason)) => {
                    warn!(%reason, "transport rejected the payload, abandoning delivery");
                    return Ok(Attempted::Abandoned);
                }
                Err(TransportError::Retryable(reason)) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(DeliveryError::RetriesExhausted {
                            attempts: attempt,
                            reason,
                        });
                    }
                    warn!(%reason, attempt, "retryable transport failure, backing off");
                    tokio::time::sleep(self.retry.backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Floor plan first, then page-order photos, capped at `max_photos`.
fn photo_batch(listing: &Listing, max_photos: usize) -> (Vec<String>, bool) {
    let mut batch: Vec<String> = listing
        .floor_plan_url
        .iter()
        .chain(listing.photos.iter())
        .cloned()
        .collect();
    let truncated = batch.len() > max_photos;
    batch.truncate(max_photos);
    (batch, truncated)
}

fn caption(listing: &Listing, truncated: bool) -> String {
    let mut lines = Vec::new();
    match listing.price {
        Some(price) => lines.push(price.to_string()),
        None => lines.push("price unknown".to_string()),
    }
    lines.push(listing.link.clone());
    lines.push(listing.address.display.clone());
    lines.push(listing.address.maps_link());
    lines.push(format!("area: {}", area::format_area(listing.area_sqm)));
    if !listing.tag.is_empty() {
        lines.push(format!("<b>tag:</b> {}", listing.tag));
    }
    if truncated {
        lines.push("(more photos available)".to_string());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::{Address, ListingId, RentPrice};
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn listing(photos: usize) -> Listing {
        Listing {
            id: ListingId(60395544),
            link: "https://www.zoopla.co.uk/to-rent/details/60395544/".to_string(),
            price: Some(RentPrice {
                pounds_per_month: 2500,
            }),
            address: Address::new("1 Example Street, London"),
            floor_plan_url: Some("https://lc.zoocdn.com/plan.jpg".to_string()),
            photos: (0..photos)
                .map(|i| format!("https://lc.zoocdn.com/photo-{i}.jpg"))
                .collect(),
            area_sqm: Some(32.5),
            tag: "Angel".to_string(),
        }
    }

    fn subscriber() -> Subscriber {
        Subscriber {
            id: "borys".to_string(),
            chat_id: 24273498,
            tags: HashSet::from(["Angel".to_string()]),
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Duration::ZERO,
        }
    }

    #[derive(Default)]
    struct Recorder {
        messages: Arc<Mutex<Vec<String>>>,
        albums: Arc<Mutex<Vec<Vec<String>>>>,
    }

    #[async_trait::async_trait]
    impl Transport for Recorder {
        async fn send_message(&self, _chat_id: i64, text: &str) -> Result<(), TransportError> {
            self.messages.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn send_photo_album(
            &self,
            _chat_id: i64,
            photo_urls: &[String],
        ) -> Result<(), TransportError> {
            self.albums.lock().unwrap().push(photo_urls.to_vec());
            Ok(())
        }
    }

    /// Fails every call with the configured error kind, `failures` times.
    struct Flaky {
        failures: AtomicU32,
        terminal: bool,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32, terminal: bool) -> Flaky {
            Flaky {
                failures: AtomicU32::new(failures),
                terminal,
                calls: AtomicU32::new(0),
            }
        }

        fn fail(&self) -> Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures.load(Ordering::SeqCst);
            if left == 0 {
                return Ok(());
            }
            self.failures.store(left - 1, Ordering::SeqCst);
            if self.terminal {
                Err(TransportError::Terminal("payload rejected".to_string()))
            } else {
                Err(TransportError::Retryable("timed out".to_string()))
            }
        }
    }

    #[async_trait::async_trait]
    impl Transport for Arc<Flaky> {
        async fn send_message(&self, _chat_id: i64, _text: &str) -> Result<(), TransportError> {
            self.fail()
        }

        async fn send_photo_album(
            &self,
            _chat_id: i64,
            _photo_urls: &[String],
        ) -> Result<(), TransportError> {
            self.fail()
        }
    }

    #[tokio::test]
    async fn sends_delimiter_album_and_caption() {
        let recorder = Recorder::default();
        let messages = recorder.messages.clone();
        let albums = recorder.albums.clone();
        let client = DeliveryClient::new(Box::new(recorder), policy(5), 9);

        client.send(&subscriber(), &listing(3)).await.unwrap();

        let albums = albums.lock().unwrap();
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].len(), 4);
        assert_eq!(albums[0][0], "https://lc.zoocdn.com/plan.jpg");

        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], DELIMITER_MESSAGE);
        let caption = &messages[1];
        assert!(caption.contains("£2500 pcm"));
        assert!(caption.contains("https://www.zoopla.co.uk/to-rent/details/60395544/"));
        assert!(caption.contains("1 Example Street, London"));
        assert!(caption.contains("https://www.google.com/maps/search/1+Example+Street%2C+London"));
        assert!(caption.contains("area: 32.500 sq. m."));
        assert!(caption.contains("<b>tag:</b> Angel"));
        assert!(!caption.contains("more photos available"));
    }

    #[tokio::test]
    async fn photo_batch_is_capped_and_noted() {
        let recorder = Recorder::default();
        let messages = recorder.messages.clone();
        let albums = recorder.albums.clone();
        let client = DeliveryClient::new(Box::new(recorder), policy(5), 9);

        client.send(&subscriber(), &listing(12)).await.unwrap();

        let albums = albums.lock().unwrap();
        assert_eq!(albums[0].len(), 9);
        // floor plan survives the cap
        assert_eq!(albums[0][0], "https://lc.zoocdn.com/plan.jpg");
        assert!(messages.lock().unwrap()[1].contains("(more photos available)"));
    }

    #[tokio::test]
    async fn retryable_failures_are_retried_until_success() {
        let flaky = Arc::new(Flaky::new(2, false));
        let client = DeliveryClient::new(Box::new(flaky.clone()), policy(5), 9);

        client.send(&subscriber(), &listing(1)).await.unwrap();

        // two failed delimiter attempts, then delimiter + album + caption
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn retry_exhaustion_is_a_delivery_error() {
        let flaky = Arc::new(Flaky::new(u32::MAX, false));
        let client = DeliveryClient::new(Box::new(flaky.clone()), policy(3), 9);

        let err = client.send(&subscriber(), &listing(1)).await.unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::RetriesExhausted { attempts: 3, .. }
        ));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_failure_abandons_without_retries() {
        let flaky = Arc::new(Flaky::new(u32::MAX, true));
        let client = DeliveryClient::new(Box::new(flaky.clone()), policy(5), 9);

        // abandoning is a completed (non-)delivery, not an error
        client.send(&subscriber(), &listing(1)).await.unwrap();
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn caption_handles_unknown_price_and_area() {
        let mut l = listing(0);
        l.price = None;
        l.area_sqm = None;
        let text = caption(&l, false);
        assert!(text.contains("price unknown"));
        assert!(text.contains("area: ???"));
    }
}
