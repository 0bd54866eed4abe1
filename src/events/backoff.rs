use std::time::Duration;

use rand::Rng;

/// Capped exponential backoff with equal jitter: each delay is drawn from
/// `[base / 2, base]` where `base` doubles after every failure.
#[derive(Clone, Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    base: Option<Duration>,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            base: None,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let base = match self.base {
            None => self.initial,
            Some(previous) => previous.saturating_mul(2).min(self.max),
        };
        self.base = Some(base);

        let ceiling = base.as_millis() as u64;
        let millis = rand::thread_rng().gen_range(ceiling / 2..=ceiling);

        Duration::from_millis(millis)
    }

    pub fn reset(&mut self) {
        self.base = None;
    }

    pub fn current_base(&self) -> Option<Duration> {
        self.base
    }
}
