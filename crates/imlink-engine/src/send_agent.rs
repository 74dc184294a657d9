use std::time::Instant;

use bytes::Bytes;
use imlink_proto::MessageType;

use crate::config::{deadline, ResendConfig};

/// A framed message handed to the [`SendAgent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingFrame {
    pub seq: String,
    pub message_type: MessageType,
    pub frame: Bytes,
}

/// Result of a send that did not exhaust the retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to a connected channel.
    Written,
    /// Parked; it will be retried after the resend interval.
    Deferred,
}

/// A send whose retry budget ran out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub seq: String,
    pub message_type: MessageType,
    pub attempts: u32,
}

/// Writes frames now if it can, otherwise retries them on a timer.
///
/// The retry counter is shared by every send. It grows by one per deferral and is only
/// reset when a send exhausts it, so a burst of sends during an outage draws on one
/// budget.
#[derive(Debug)]
pub struct SendAgent {
    config: ResendConfig,
    attempts: u32,
    scheduled: Vec<(Instant, OutgoingFrame)>,
}

impl SendAgent {
    pub fn new(config: ResendConfig) -> Self {
        Self {
            config,
            attempts: 0,
            scheduled: Vec::new(),
        }
    }

    /// Try to write `item`.
    ///
    /// `write` returns true if the frame went out on a connected channel.
    pub fn submit<W>(
        &mut self,
        item: OutgoingFrame,
        now: Instant,
        mut write: W,
    ) -> Result<SendOutcome, DeliveryFailure>
    where
        W: FnMut(&Bytes) -> bool,
    {
        if write(&item.frame) {
            tracing::debug!(seq = %item.seq, msg_type = %item.message_type, "frame written");
            return Ok(SendOutcome::Written);
        }

        if self.attempts >= self.config.max_attempts {
            let attempts = self.attempts;
            self.attempts = 0;
            return Err(DeliveryFailure {
                seq: item.seq,
                message_type: item.message_type,
                attempts,
            });
        }

        self.attempts += 1;
        tracing::debug!(
            seq = %item.seq,
            attempt = self.attempts,
            delay = ?self.config.interval,
            "channel unavailable, send deferred"
        );
        self.scheduled.push((deadline(now, self.config.interval), item));
        Ok(SendOutcome::Deferred)
    }

    /// Current value of the shared retry counter.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Number of frames waiting for a retry.
    pub fn pending(&self) -> usize {
        self.scheduled.len()
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        self.scheduled.iter().map(|(at, _)| *at).min()
    }

    /// Retry every frame whose delay has elapsed, oldest deadline first.
    pub fn handle_timeout<W>(&mut self, now: Instant, mut write: W) -> Vec<DeliveryFailure>
    where
        W: FnMut(&Bytes) -> bool,
    {
        let (mut due, later): (Vec<_>, Vec<_>) = std::mem::take(&mut self.scheduled)
            .into_iter()
            .partition(|(at, _)| *at <= now);
        self.scheduled = later;
        due.sort_by_key(|(at, _)| *at);

        due.into_iter()
            .filter_map(|(_, item)| self.submit(item, now, &mut write).err())
            .collect()
    }
}
