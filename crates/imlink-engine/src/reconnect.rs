use std::time::Instant;

use crate::config::{deadline, ReconnectConfig};

/// Repeating reconnect timer.
///
/// The scheduler only decides *when* to try; the engine decides whether an attempt is
/// needed, based on its connection state at that moment.
#[derive(Debug)]
pub struct ReconnectScheduler {
    config: ReconnectConfig,
    next_tick: Option<Instant>,
}

impl ReconnectScheduler {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            next_tick: None,
        }
    }

    /// Start ticking every interval. Does nothing if already running.
    pub fn start(&mut self, now: Instant) {
        if self.next_tick.is_none() {
            tracing::debug!(interval = ?self.config.interval, "reconnect scheduled");
            self.next_tick = Some(deadline(now, self.config.interval));
        }
    }

    pub fn stop(&mut self) {
        self.next_tick = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        self.next_tick
    }

    /// True if a tick is due; the next one is scheduled an interval from `now`.
    pub fn handle_timeout(&mut self, now: Instant) -> bool {
        match self.next_tick {
            Some(due) if due <= now => {
                self.next_tick = Some(deadline(now, self.config.interval));
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn ticks_every_interval_until_stopped() {
        let t0 = Instant::now();
        let mut rc = ReconnectScheduler::new(ReconnectConfig {
            interval: Duration::from_secs(5),
        });
        assert!(!rc.handle_timeout(t0));

        rc.start(t0);
        rc.start(t0 + Duration::from_secs(2));
        assert!(!rc.handle_timeout(t0 + Duration::from_secs(4)));
        assert!(rc.handle_timeout(t0 + Duration::from_secs(5)));
        assert_eq!(rc.poll_timeout(), Some(t0 + Duration::from_secs(10)));
        assert!(rc.handle_timeout(t0 + Duration::from_secs(10)));

        rc.stop();
        assert!(!rc.is_running());
        assert!(!rc.handle_timeout(t0 + Duration::from_secs(60)));
    }
}
