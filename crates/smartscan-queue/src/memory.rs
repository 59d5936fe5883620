// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-process transport with the same peek-lock semantics as the SQLite one,
// minus durability and lock expiry.  Used by tests and single-process runs.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use smartscan_core::QueueMessage;
use smartscan_core::error::{Result, SmartScanError};
use uuid::Uuid;

use crate::integrity::hash_bytes;
use crate::transport::{Delivery, MessageTransport};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Default)]
struct Channels {
    /// Visible messages per channel, oldest first.
    queued: HashMap<String, VecDeque<Delivery>>,
    /// Received but not yet completed, keyed by message id.
    locked: HashMap<i64, Delivery>,
}

/// Transport held entirely in memory.
#[derive(Default)]
pub struct MemoryTransport {
    channels: Mutex<Channels>,
    next_id: AtomicI64,
    closed: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a raw delivery, bypassing `send`.  Lets callers model
    /// messages with a missing body or a wrong fingerprint.
    pub fn inject(
        &self,
        channel: &str,
        payload: Option<Vec<u8>>,
        payload_hash: Option<String>,
    ) -> Result<()> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut channels = self.lock()?;
        let queue = channels
            .queued
            .get_mut(channel)
            .ok_or_else(|| SmartScanError::UnknownChannel(channel.to_owned()))?;
        queue.push_back(Delivery {
            id,
            channel: channel.to_owned(),
            lock_token: String::new(),
            payload,
            payload_hash,
            enqueued_at: Utc::now(),
        });
        Ok(())
    }

    /// Messages waiting on a channel (not counting locked ones).
    pub fn pending(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .map(|c| c.queued.get(channel).map_or(0, VecDeque::len))
            .unwrap_or(0)
    }

    /// Messages received but not yet completed.
    pub fn in_flight(&self) -> usize {
        self.channels.lock().map(|c| c.locked.len()).unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Channels>> {
        if self.is_closed() {
            return Err(SmartScanError::Queue("transport is closed".into()));
        }
        self.channels
            .lock()
            .map_err(|_| SmartScanError::Queue("channel lock poisoned".into()))
    }

    fn try_claim(&self, channel: &str) -> Result<Option<Delivery>> {
        let mut channels = self.lock()?;
        let queue = channels
            .queued
            .get_mut(channel)
            .ok_or_else(|| SmartScanError::UnknownChannel(channel.to_owned()))?;

        let Some(mut delivery) = queue.pop_front() else {
            return Ok(None);
        };
        delivery.lock_token = Uuid::new_v4().to_string();
        channels.locked.insert(delivery.id, delivery.clone());
        Ok(Some(delivery))
    }
}

#[async_trait]
impl MessageTransport for MemoryTransport {
    async fn ensure_channel(&self, channel: &str) -> Result<()> {
        self.lock()?.queued.entry(channel.to_owned()).or_default();
        Ok(())
    }

    async fn send(&self, channel: &str, message: QueueMessage) -> Result<()> {
        let hash = hash_bytes(&message.payload);
        self.inject(channel, Some(message.payload), Some(hash))
    }

    async fn receive(&self, channel: &str, wait: Duration) -> Result<Option<Delivery>> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(delivery) = self.try_claim(channel)? {
                return Ok(Some(delivery));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn complete(&self, delivery: &Delivery) -> Result<()> {
        let mut channels = self.lock()?;
        let owned = channels
            .locked
            .get(&delivery.id)
            .is_some_and(|held| held.lock_token == delivery.lock_token);
        if !owned {
            return Err(SmartScanError::Queue(format!(
                "message {} is no longer locked by this receiver",
                delivery.id
            )));
        }
        channels.locked.remove(&delivery.id);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
