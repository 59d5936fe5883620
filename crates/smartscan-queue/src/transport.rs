// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Transport trait and delivery type.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use smartscan_core::QueueMessage;
use smartscan_core::error::{Result, SmartScanError};

use crate::integrity::verify_hash;

/// A message handed out by a transport and not yet completed.
///
/// The message stays locked to this receiver until [`MessageTransport::complete`]
/// is called with it.  If the lock expires first, the transport may hand the
/// message to another receiver.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Transport-assigned message id.
    pub id: i64,
    /// Channel the message was received from.
    pub channel: String,
    /// Lock token proving this receiver owns the delivery.
    pub lock_token: String,
    /// Raw payload.  `None` when the sender stored no body.
    pub payload: Option<Vec<u8>>,
    /// SHA-256 of the payload recorded at send time.
    pub payload_hash: Option<String>,
    /// When the message was sent.
    pub enqueued_at: DateTime<Utc>,
}

impl Delivery {
    /// The payload as a [`QueueMessage`], checked against its recorded hash.
    ///
    /// Fails when there is no payload, the payload is empty, or the bytes do
    /// not match the fingerprint taken at send time.
    pub fn verified_message(&self) -> Result<QueueMessage> {
        let payload = match &self.payload {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => return Err(SmartScanError::Queue(format!("message {} has no payload", self.id))),
        };
        if let Some(expected) = &self.payload_hash {
            verify_hash(payload, expected)?;
        }
        Ok(QueueMessage::new(payload.clone()))
    }
}

/// Publish/subscribe transport with named channels.
///
/// Delivery is at-least-once: a received message that is never completed
/// becomes visible again after the transport's lock duration.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Create the channel if it does not exist yet.
    async fn ensure_channel(&self, channel: &str) -> Result<()>;

    /// Append a message to a channel.
    async fn send(&self, channel: &str, message: QueueMessage) -> Result<()>;

    /// Wait up to `wait` for the oldest available message on `channel`.
    ///
    /// Returns `Ok(None)` if nothing arrived in time.
    async fn receive(&self, channel: &str, wait: Duration) -> Result<Option<Delivery>>;

    /// Acknowledge a delivery, removing it from the channel for good.
    async fn complete(&self, delivery: &Delivery) -> Result<()>;

    /// Release the transport.  Later calls fail.
    async fn close(&self) -> Result<()>;
}

/// Blanket implementation so `Arc<dyn MessageTransport>` can be used directly.
#[async_trait]
impl<T: MessageTransport + ?Sized> MessageTransport for Arc<T> {
    async fn ensure_channel(&self, channel: &str) -> Result<()> {
        (**self).ensure_channel(channel).await
    }

    async fn send(&self, channel: &str, message: QueueMessage) -> Result<()> {
        (**self).send(channel, message).await
    }

    async fn receive(&self, channel: &str, wait: Duration) -> Result<Option<Delivery>> {
        (**self).receive(channel, wait).await
    }

    async fn complete(&self, delivery: &Delivery) -> Result<()> {
        (**self).complete(delivery).await
    }

    async fn close(&self) -> Result<()> {
        (**self).close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::hash_bytes;

    fn delivery(payload: Option<&[u8]>, hash: Option<String>) -> Delivery {
        Delivery {
            id: 7,
            channel: "pdfQueue".into(),
            lock_token: "token".into(),
            payload: payload.map(|p| p.to_vec()),
            payload_hash: hash,
            enqueued_at: Utc::now(),
        }
    }

    #[test]
    fn verified_message_accepts_matching_hash() {
        let d = delivery(Some(b"%PDF"), Some(hash_bytes(b"%PDF")));
        assert_eq!(d.verified_message().expect("verified").payload, b"%PDF");
    }

    #[test]
    fn verified_message_accepts_missing_hash() {
        let d = delivery(Some(b"%PDF"), None);
        assert!(d.verified_message().is_ok());
    }

    #[test]
    fn verified_message_rejects_missing_or_empty_payload() {
        assert!(delivery(None, None).verified_message().is_err());
        assert!(delivery(Some(b""), None).verified_message().is_err());
    }

    #[test]
    fn verified_message_rejects_tampered_payload() {
        let d = delivery(Some(b"%PDF-tampered"), Some(hash_bytes(b"%PDF")));
        assert!(matches!(
            d.verified_message(),
            Err(SmartScanError::IntegrityMismatch { .. })
        ));
    }
}
