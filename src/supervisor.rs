//! Restart supervisor - reruns the bot's polling loop after a crash,
//! backing off exponentially.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use tracing::{error, info, warn};

/// First delay after a crash.
const BASE_DELAY: Duration = Duration::from_secs(1);
/// Delay cap.
const MAX_DELAY: Duration = Duration::from_secs(60);
/// A run that stayed up this long resets the backoff.
const HEALTHY_RUN: Duration = Duration::from_secs(60);

/// Exponential backoff: 1s, 2s, 4s, ... capped at 60s.
pub struct Backoff {
    delay: Duration,
}

impl Backoff {
    pub fn new() -> Self {
        Self { delay: BASE_DELAY }
    }

    /// Return the current delay and double it for next time.
    pub fn next(&mut self) -> Duration {
        let delay = self.delay;
        self.delay = (self.delay * 2).min(MAX_DELAY);
        delay
    }

    pub fn reset(&mut self) {
        self.delay = BASE_DELAY;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `run` until it returns cleanly, restarting on error with backoff.
pub async fn supervise<F, Fut, E>(mut run: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let mut backoff = Backoff::new();
    loop {
        let started = Instant::now();
        match run().await {
            Ok(()) => {
                info!("Bot stopped cleanly");
                return;
            }
            Err(e) => error!("Bot run failed: {e}"),
        }

        if started.elapsed() >= HEALTHY_RUN {
            backoff.reset();
        }
        let delay = backoff.next();
        warn!("Restarting in {:?}", delay);
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let mut backoff = Backoff::new();
        assert_eq!(backoff.next(), Duration::from_secs(1));
        assert_eq!(backoff.next(), Duration::from_secs(2));
        assert_eq!(backoff.next(), Duration::from_secs(4));
        assert_eq!(backoff.next(), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_caps_at_max() {
        let mut backoff = Backoff::new();
        for _ in 0..20 {
            backoff.next();
        }
        assert_eq!(backoff.next(), MAX_DELAY);
        assert_eq!(backoff.next(), MAX_DELAY);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new();
        backoff.next();
        backoff.next();
        backoff.reset();
        assert_eq!(backoff.next(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervise_retries_until_clean_exit() {
        let mut attempts = 0;
        supervise(|| {
            attempts += 1;
            let result = if attempts < 3 { Err("boom") } else { Ok(()) };
            async move { result }
        })
        .await;
        assert_eq!(attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervise_resets_backoff_after_healthy_run() {
        let mut starts = Vec::new();
        let mut attempts = 0;
        supervise(|| {
            attempts += 1;
            starts.push(Instant::now());
            let attempt = attempts;
            async move {
                match attempt {
                    // Stays up past the healthy-run threshold before crashing
                    1 | 3 => {
                        tokio::time::advance(HEALTHY_RUN + Duration::from_secs(1)).await;
                        Err("boom")
                    }
                    2 => Err("boom"),
                    _ => Ok(()),
                }
            }
        })
        .await;

        assert_eq!(attempts, 4);
        let uptime = HEALTHY_RUN + Duration::from_secs(1);
        // Run 1 was healthy, so the first delay is the 1s base
        assert_eq!(starts[1] - (starts[0] + uptime), Duration::from_secs(1));
        // Run 2 crashed instantly: delay doubles to 2s
        assert_eq!(starts[2] - starts[1], Duration::from_secs(2));
        // Run 3 was healthy again: backoff is back to the 1s base
        assert_eq!(starts[3] - (starts[2] + uptime), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervise_returns_on_immediate_success() {
        let mut attempts = 0;
        supervise(|| {
            attempts += 1;
            async { Ok::<(), &str>(()) }
        })
        .await;
        assert_eq!(attempts, 1);
    }
}
