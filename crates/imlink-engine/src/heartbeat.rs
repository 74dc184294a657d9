use std::time::Instant;

use crate::config::{deadline, HeartbeatConfig};

/// What the engine should do for a heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatTick {
    /// Send a HEART_BEAT probe. The probe is already counted as outstanding.
    Probe,
    /// `timeout_threshold` probes went unanswered; the monitor has stopped itself.
    Expired { unanswered: u32 },
}

/// Counts outstanding probes and decides when the channel is dead.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    health_point: u32,
    next_tick: Option<Instant>,
}

impl HeartbeatMonitor {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            health_point: 0,
            next_tick: None,
        }
    }

    /// Start probing every interval. Does nothing if already running.
    pub fn start(&mut self, now: Instant) {
        if self.next_tick.is_none() {
            self.next_tick = Some(deadline(now, self.config.interval));
        }
    }

    /// Stop probing and forget outstanding probes.
    pub fn stop(&mut self) {
        self.next_tick = None;
        self.health_point = 0;
    }

    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    pub fn health_point(&self) -> u32 {
        self.health_point
    }

    /// A HEART_BEAT reply arrived.
    pub fn on_reply(&mut self) {
        self.health_point = self.health_point.saturating_sub(1);
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        self.next_tick
    }

    /// Run the tick if it is due.
    pub fn handle_timeout(&mut self, now: Instant) -> Option<HeartbeatTick> {
        self.next_tick.filter(|deadline| *deadline <= now)?;

        if self.health_point >= self.config.timeout_threshold {
            let unanswered = self.health_point;
            self.stop();
            return Some(HeartbeatTick::Expired { unanswered });
        }

        self.health_point += 1;
        self.next_tick = Some(deadline(now, self.config.interval));
        Some(HeartbeatTick::Probe)
    }
}
