//! ---
//! c2_section: "01-core-functionality"
//! c2_subsection: "module"
//! c2_type: "source"
//! c2_scope: "code"
//! c2_description: "Runtime helpers shared by the node and ground station."
//! c2_version: "v0.0.0-prealpha"
//! c2_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Async rate limiter pacing a loop at a fixed period.
///
/// The first tick completes immediately. Ticks missed because the loop body overran
/// (a blocking scan, for instance) are not replayed in a burst.
#[derive(Debug)]
pub struct RateLimiter {
    interval: tokio::time::Interval,
}

impl RateLimiter {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    pub async fn tick(&mut self) -> Instant {
        self.interval.tick().await
    }
}

/// Named set of spawned tasks joined together at shutdown.
#[derive(Debug, Default)]
pub struct TaskGroup {
    tasks: Vec<(&'static str, JoinHandle<Result<()>>)>,
}

impl TaskGroup {
    pub fn spawn<F>(&mut self, name: &'static str, fut: F)
    where
        F: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        debug!(task = name, "spawning task");
        self.tasks.push((name, tokio::spawn(fut)));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Await every task in spawn order, returning the first failure.
    pub async fn join(self) -> Result<()> {
        for (name, task) in self.tasks {
            task.await
                .map_err(|err| anyhow::anyhow!("task {name} join failure: {err}"))??;
            debug!(task = name, "task finished");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn rate_limiter_paces_ticks() {
        let mut limiter = RateLimiter::new(Duration::from_secs(1));
        let first = limiter.tick().await;
        let second = limiter.tick().await;
        assert_eq!(second - first, Duration::from_secs(1));
        assert_eq!(limiter.period(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limiter_does_not_burst_after_overrun() {
        let mut limiter = RateLimiter::new(Duration::from_secs(1));
        limiter.tick().await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        let overrun_at = Instant::now();
        limiter.tick().await;
        assert_eq!(Instant::now(), overrun_at, "late tick fires immediately");

        limiter.tick().await;
        assert_eq!(Instant::now() - overrun_at, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn task_group_propagates_failures() {
        let mut group = TaskGroup::default();
        group.spawn("ok", async { Ok(()) });
        group.spawn("broken", async { Err(anyhow::anyhow!("boom")) });
        assert_eq!(group.len(), 2);
        let err = group.join().await.expect_err("failure surfaces");
        assert!(err.to_string().contains("boom"));
    }
}
