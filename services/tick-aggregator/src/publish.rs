//! Publishing of push messages
//!
//! Publishing is fire-and-forget: the aggregator's worker never waits on
//! subscribers. [`BroadcastPublisher`] fans each channel out through a
//! tokio broadcast channel; slow receivers lag and lose the oldest
//! messages rather than stalling the worker.

use std::sync::{Mutex, PoisonError};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::trace;

use crate::channel::Channel;
use crate::messages::PushMessage;

/// Outbound transport capability.
pub trait Publisher: Send + Sync {
    fn publish(&self, channel: &Channel, message: PushMessage);
}

/// Per-channel broadcast fan-out.
pub struct BroadcastPublisher {
    channels: DashMap<Channel, broadcast::Sender<PushMessage>>,
    capacity: usize,
}

impl BroadcastPublisher {
    /// `capacity` is the per-channel buffer each receiver may lag behind.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, channel: &Channel) -> broadcast::Receiver<PushMessage> {
        self.channels
            .entry(channel.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Live receivers on `channel`.
    pub fn receiver_count(&self, channel: &Channel) -> usize {
        self.channels
            .get(channel)
            .map_or(0, |tx| tx.receiver_count())
    }
}

impl Publisher for BroadcastPublisher {
    fn publish(&self, channel: &Channel, message: PushMessage) {
        let Some(tx) = self.channels.get(channel) else {
            trace!(%channel, "No subscribers, dropping message");
            return;
        };
        if tx.send(message).is_err() {
            trace!(%channel, "All subscribers gone, dropping message");
        }
    }
}

/// Publisher that records every call, in order.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(Channel, PushMessage)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(Channel, PushMessage)> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, channel: &Channel, message: PushMessage) {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((channel.clone(), message));
    }
}
