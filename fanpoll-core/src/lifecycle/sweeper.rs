//! Background task that applies due transitions

use super::LifecycleScheduler;
use crate::locks::EntityLocks;
use std::sync::Arc;
use std::time::Duration;

/// Runs [`LifecycleScheduler::sweep_due`] on a fixed interval and prunes
/// idle entity locks. The task is aborted when the sweeper is dropped.
pub struct Sweeper {
    task: tokio::task::JoinHandle<()>,
    interval: Duration,
}

impl Sweeper {
    /// Must be called from within a tokio runtime
    pub fn spawn(
        scheduler: LifecycleScheduler,
        clock: Arc<dyn super::Clock>,
        locks: Arc<EntityLocks>,
        interval: Duration,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            // the first tick completes immediately; the platform already swept on open
            interval_timer.tick().await;
            loop {
                interval_timer.tick().await;

                if let Err(e) = scheduler.sweep_due(clock.now()).await {
                    log::error!("Lifecycle sweep failed: {}", e);
                }

                let pruned = locks.prune_idle();
                if pruned > 0 {
                    log::debug!("Pruned {} idle entity lock(s)", pruned);
                }
            }
        });

        log::info!("Lifecycle sweeper started (every {:?})", interval);
        Self { task, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::NewProject;
    use crate::testing::Fixture;
    use chrono::Duration as ChronoDuration;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_fires_due_transitions() {
        let fx = Fixture::new();
        let creator = fx.creator("Nina").await;
        let project = fx
            .lifecycle()
            .create_project(
                &creator.id,
                NewProject {
                    title: "Tour poster".into(),
                    description: "Vote".into(),
                    time_count: 1,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let sweeper = Sweeper::spawn(
            fx.lifecycle(),
            fx.clock.clone(),
            fx.ctx.locks.clone(),
            Duration::from_secs(60),
        );
        fx.clock.advance(ChronoDuration::days(1));

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_secs(61)).await;
            if fx.reload_project(&project.id).await.in_progress {
                break;
            }
        }
        assert!(fx.reload_project(&project.id).await.in_progress);
        assert!(sweeper.is_running());
    }

    #[tokio::test]
    async fn test_drop_stops_task() {
        let fx = Fixture::new();
        let sweeper =
            Sweeper::spawn(fx.lifecycle(), fx.clock.clone(), fx.ctx.locks.clone(), Duration::from_secs(1));
        assert_eq!(sweeper.interval(), Duration::from_secs(1));
        assert!(sweeper.is_running());
        drop(sweeper);
    }
}
