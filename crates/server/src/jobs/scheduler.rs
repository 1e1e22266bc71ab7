// crates/server/src/jobs/scheduler.rs
//! Periodic refresh loops.
//!
//! Each loop ticks on its own interval and, per tick, enqueues a fixed list of
//! tasks for the worker. Loops end when the worker's channel closes.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use dropstats_core::{ConfigKey, ConfigProvider, MatrixKind, MatrixStore, Server};

use super::types::RefreshTask;
use super::worker::RefreshHandle;
use crate::config::{ServerConfig, DEFAULT_TREND_INTERVAL_MS, DEFAULT_TREND_RANGE_MS};

pub const CURRENT_MATRIX_LOOP: &str = "current_matrix";
pub const TREND_LOOP: &str = "trend";

const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Spawn the current-matrix and trend loops.
///
/// The refresh period comes from `matrixRefreshInterval` (seconds) when set,
/// else from the process config. Trend shape comes from `trendInterval` /
/// `trendRange` (milliseconds) with one-day buckets over 60 days otherwise.
pub async fn spawn_all(
    config_provider: &Arc<dyn ConfigProvider>,
    handle: RefreshHandle,
    config: &ServerConfig,
) -> Vec<JoinHandle<()>> {
    let refresh_period = match config_provider.get_i64(ConfigKey::MatrixRefreshInterval).await {
        Some(secs) if secs > 0 => Duration::from_secs(secs as u64),
        _ => {
            debug!(
                key = ConfigKey::MatrixRefreshInterval.as_str(),
                "Config key missing, using process refresh interval"
            );
            config.refresh_interval
        }
    };
    let interval = positive_or(
        config_provider.get_i64(ConfigKey::TrendInterval).await,
        DEFAULT_TREND_INTERVAL_MS,
    );
    let range = positive_or(config_provider.get_i64(ConfigKey::TrendRange).await, DEFAULT_TREND_RANGE_MS);

    let current_tasks = Server::ALL.iter().map(|s| RefreshTask::CurrentMatrix(*s)).collect();
    let trend_tasks = Server::ALL
        .iter()
        .map(|s| RefreshTask::Trend {
            server: *s,
            interval,
            range,
        })
        .collect();

    vec![
        spawn_loop(
            handle.clone(),
            CURRENT_MATRIX_LOOP,
            refresh_period,
            config.refresh_delay,
            current_tasks,
        ),
        spawn_loop(
            handle,
            TREND_LOOP,
            config.trend_refresh_interval,
            config.refresh_delay,
            trend_tasks,
        ),
    ]
}

fn positive_or(value: Option<i64>, default: i64) -> i64 {
    value.filter(|v| *v > 0).unwrap_or(default)
}

/// Enqueue `tasks` after `initial_delay`, then once per `period`.
pub fn spawn_loop(
    handle: RefreshHandle,
    loop_name: &'static str,
    period: Duration,
    initial_delay: Duration,
    tasks: Vec<RefreshTask>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = period.max(MIN_PERIOD);
        info!(loop_name, period = ?period, initial_delay = ?initial_delay, "Starting refresh loop");

        let mut ticker = time::interval_at(Instant::now() + initial_delay, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            debug!(loop_name, tasks = tasks.len(), "Refresh tick");
            for task in &tasks {
                if !handle.enqueue(task.clone()).await {
                    info!(loop_name, "Refresh worker gone, stopping loop");
                    return;
                }
            }
        }
    })
}

/// Queue a past-matrix computation for every server whose past cache is empty.
///
/// Returns the servers that were queued.
pub async fn seed_past_matrices(store: &Arc<dyn MatrixStore>, handle: &RefreshHandle) -> Vec<Server> {
    let mut seeded = Vec::new();
    for server in Server::ALL {
        match store.load(MatrixKind::Regular, server, true).await {
            Ok(rows) if !rows.is_empty() => continue,
            Ok(_) => {
                if handle.enqueue(RefreshTask::PastMatrix(server)).await {
                    seeded.push(server);
                }
            }
            Err(err) => error!(server = %server, error = %err, "Failed to read past matrix cache"),
        }
    }
    if !seeded.is_empty() {
        info!(servers = ?seeded, "Past matrix cache empty, computing");
    }
    seeded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::state::RefreshState;
    use dropstats_core::{DropMatrixElement, MemoryMatrixStore, StaticConfig, TimeRange};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use tokio::sync::mpsc;

    fn handle(capacity: usize) -> (RefreshHandle, mpsc::Receiver<RefreshTask>) {
        let (tx, rx) = mpsc::channel(capacity);
        (RefreshHandle::from_parts(tx, Arc::new(RefreshState::new())), rx)
    }

    fn server_config(refresh: u64, delay: u64, trend: u64) -> ServerConfig {
        ServerConfig {
            db_path: PathBuf::from("unused.db"),
            refresh_interval: Duration::from_secs(refresh),
            refresh_delay: Duration::from_secs(delay),
            trend_refresh_interval: Duration::from_secs(trend),
            query_timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_waits_initial_delay_then_ticks_per_period() {
        let (handle, mut rx) = handle(8);
        let join = spawn_loop(
            handle,
            "test",
            Duration::from_secs(60),
            Duration::from_secs(10),
            vec![RefreshTask::CurrentMatrix(Server::Cn)],
        );

        time::sleep(Duration::from_secs(9)).await;
        assert!(rx.try_recv().is_err());

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rx.try_recv().unwrap(), RefreshTask::CurrentMatrix(Server::Cn));
        assert!(rx.try_recv().is_err());

        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(rx.try_recv().unwrap(), RefreshTask::CurrentMatrix(Server::Cn));

        drop(rx);
        time::sleep(Duration::from_secs(60)).await;
        join.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_all_fans_out_per_server() {
        let (handle, mut rx) = handle(16);
        let provider: Arc<dyn ConfigProvider> = Arc::new(
            StaticConfig::new()
                .with(ConfigKey::MatrixRefreshInterval, 120)
                .with(ConfigKey::TrendInterval, 1000),
        );
        let joins = spawn_all(&provider, handle, &server_config(3600, 0, 86_400)).await;

        time::sleep(Duration::from_millis(10)).await;
        let mut first_tick = Vec::new();
        while let Ok(task) = rx.try_recv() {
            first_tick.push(task);
        }
        assert_eq!(first_tick.len(), 2 * Server::ALL.len());
        assert!(first_tick.contains(&RefreshTask::CurrentMatrix(Server::Kr)));
        assert!(first_tick.contains(&RefreshTask::Trend {
            server: Server::Jp,
            interval: 1000,
            range: DEFAULT_TREND_RANGE_MS,
        }));

        // Configured 120s period wins over the 3600s process default.
        time::sleep(Duration::from_secs(120)).await;
        let mut second_tick = Vec::new();
        while let Ok(task) = rx.try_recv() {
            second_tick.push(task);
        }
        assert_eq!(
            second_tick,
            Server::ALL.iter().map(|s| RefreshTask::CurrentMatrix(*s)).collect::<Vec<_>>()
        );

        for join in joins {
            join.abort();
        }
    }

    #[tokio::test]
    async fn test_seed_only_empty_past_caches() {
        let memory = MemoryMatrixStore::new();
        memory
            .replace(
                MatrixKind::Regular,
                Server::Cn,
                true,
                vec![DropMatrixElement::new("main_01-07", "30012", 1, 2, &TimeRange::bounded(0, 10), 10)],
            )
            .await
            .unwrap();
        let store: Arc<dyn MatrixStore> = Arc::new(memory);
        let (handle, mut rx) = handle(8);

        let seeded = seed_past_matrices(&store, &handle).await;
        assert_eq!(seeded, vec![Server::Us, Server::Jp, Server::Kr]);
        assert_eq!(rx.try_recv().unwrap(), RefreshTask::PastMatrix(Server::Us));
        assert_eq!(handle.state().snapshot().queued, 3);
    }
}
