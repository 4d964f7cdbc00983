use crate::metric_set::MetricSet;
use futures::future::join_all;
use ldap_stats_exporter::StatsSink;
use std::{
    sync::Arc,
    time::Duration,
};
use strum::Display;
use tokio::{
    sync::{
        mpsc,
        watch,
    },
    time::Instant,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SchedulerState {
    Idle,
    Collecting,
    Sleeping,
    Stopped,
}

/// A replacement for everything the scheduler collects. Applied between
/// ticks only.
pub struct Reconfiguration {
    pub metric_sets: Vec<MetricSet>,
    pub period: Duration,
    pub parallel: bool,
}

pub struct Scheduler {
    metric_sets: Vec<MetricSet>,
    period: Duration,
    parallel: bool,
    sink: Arc<dyn StatsSink>,
    state: watch::Sender<SchedulerState>,
}

impl Scheduler {
    pub fn new(metric_sets: Vec<MetricSet>, period: Duration, sink: Arc<dyn StatsSink>) -> Self {
        Self {
            metric_sets,
            period,
            parallel: false,
            sink,
            state: watch::Sender::new(SchedulerState::Idle),
        }
    }

    /// Collect the servers of a tick concurrently instead of one after
    /// another.
    pub fn with_parallel_collection(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    pub fn metric_sets(&self) -> &[MetricSet] {
        &self.metric_sets
    }

    fn set_state(&self, state: SchedulerState) {
        trace!(%state, "scheduler state");
        self.state.send_replace(state);
    }

    fn apply(&mut self, reconfiguration: Reconfiguration) {
        info!(
            servers = reconfiguration.metric_sets.len(),
            period = ?reconfiguration.period,
            "applying new configuration"
        );
        self.metric_sets = reconfiguration.metric_sets;
        self.period = reconfiguration.period;
        self.parallel = reconfiguration.parallel;
    }

    /// Collects every metric set once.
    pub async fn tick(&self) {
        let sink = self.sink.as_ref();
        if self.parallel {
            join_all(self.metric_sets.iter().map(|set| set.collect(sink))).await;
        } else {
            for set in &self.metric_sets {
                set.collect(sink).await;
            }
        }
    }

    /// Ticks every period until `token` is cancelled.
    ///
    /// Cancellation and reconfigurations are only observed while sleeping,
    /// a tick that has started always completes.
    pub async fn run(mut self, token: CancellationToken, mut updates: mpsc::Receiver<Reconfiguration>) {
        let mut updates_open = true;
        loop {
            let started = Instant::now();
            self.set_state(SchedulerState::Collecting);
            debug!(servers = self.metric_sets.len(), "tick started");
            self.tick().await;
            debug!(elapsed = ?started.elapsed(), "tick finished");

            self.set_state(SchedulerState::Sleeping);
            loop {
                let deadline = started + self.period;
                tokio::select! {
                    _ = token.cancelled() => {
                        self.set_state(SchedulerState::Stopped);
                        info!("scheduler stopped");
                        return;
                    }
                    _ = tokio::time::sleep_until(deadline) => break,
                    update = updates.recv(), if updates_open => match update {
                        Some(reconfiguration) => self.apply(reconfiguration),
                        None => updates_open = false,
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        registry::ServerIdentity,
        statistic::{
            CompiledStatistic,
            Statistic,
        },
        testing::{
            MemoryDirectory,
            RecordingSink,
        },
    };
    use ldap_stats_config::{
        AggregationKind,
        ConnectionConfig,
    };
    use pretty_assertions::assert_eq;

    const PERIOD: Duration = Duration::from_secs(5);

    fn metric_set(database: &str, directory: MemoryDirectory) -> MetricSet {
        MetricSet::new(
            ServerIdentity {
                database: database.to_string(),
                connection: ConnectionConfig {
                    server_uri: "ldap://localhost".to_string(),
                    user_dn: None,
                    user_password: None,
                    start_tls: false,
                    timeout: None,
                },
            },
            Arc::new(directory.with("cn=Monitor", "x", &["1"])),
            vec![Statistic::new(CompiledStatistic {
                distinguished_name: "cn=Monitor".to_string(),
                metric_name: "x".to_string(),
                attribute: "x".to_string(),
                unit: "1".to_string(),
                description: String::new(),
                aggregation: AggregationKind::LastValue,
            })],
        )
    }

    fn offsets(sink: &RecordingSink, start: Instant) -> Vec<u64> {
        sink.commits()
            .iter()
            .map(|commit| commit.at.duration_since(start).as_secs())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_every_period() {
        let sink = Arc::new(RecordingSink::default());
        let scheduler = Scheduler::new(vec![metric_set("db1", MemoryDirectory::default())], PERIOD, sink.clone());
        let token = CancellationToken::new();
        let (_updates, receiver) = mpsc::channel(1);
        let start = Instant::now();

        let task = tokio::spawn(scheduler.run(token.clone(), receiver));
        tokio::time::sleep(Duration::from_secs(12)).await;
        token.cancel();
        task.await.unwrap();

        assert_eq!(offsets(&sink, start), vec![0, 5, 10]);
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_for_the_rest_of_the_period() {
        let sink = Arc::new(RecordingSink::default());
        let slow = MemoryDirectory::default().slow(Duration::from_secs(3));
        let scheduler = Scheduler::new(vec![metric_set("db1", slow)], PERIOD, sink.clone());
        let token = CancellationToken::new();
        let (_updates, receiver) = mpsc::channel(1);
        let start = Instant::now();

        let task = tokio::spawn(scheduler.run(token.clone(), receiver));
        tokio::time::sleep(Duration::from_secs(9)).await;
        token.cancel();
        task.await.unwrap();

        assert_eq!(offsets(&sink, start), vec![3, 8]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_waits_for_the_running_tick() {
        let sink = Arc::new(RecordingSink::default());
        let slow = MemoryDirectory::default().slow(Duration::from_secs(3));
        let scheduler = Scheduler::new(vec![metric_set("db1", slow)], PERIOD, sink.clone());
        let mut state = scheduler.subscribe();
        let token = CancellationToken::new();
        let (_updates, receiver) = mpsc::channel(1);

        let task = tokio::spawn(scheduler.run(token.clone(), receiver));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*state.borrow_and_update(), SchedulerState::Collecting);

        token.cancel();
        task.await.unwrap();

        assert_eq!(sink.commits().len(), 1);
        assert_eq!(*state.borrow(), SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_collection_commits_once_per_server() {
        let sink = Arc::new(RecordingSink::default());
        let sets = vec![
            metric_set("db1", MemoryDirectory::default().slow(Duration::from_secs(2))),
            metric_set("db2", MemoryDirectory::default().slow(Duration::from_secs(2))),
        ];
        let scheduler = Scheduler::new(sets, PERIOD, sink.clone()).with_parallel_collection(true);
        let start = Instant::now();

        scheduler.tick().await;

        let commits = sink.commits();
        assert_eq!(offsets(&sink, start), vec![2, 2]);
        let mut databases = commits
            .iter()
            .filter_map(|commit| commit.tags.get("database").map(str::to_string))
            .collect::<Vec<_>>();
        databases.sort();
        assert_eq!(databases, vec!["db1".to_string(), "db2".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn reconfiguration_applies_between_ticks() {
        let sink = Arc::new(RecordingSink::default());
        let scheduler = Scheduler::new(vec![metric_set("db1", MemoryDirectory::default())], PERIOD, sink.clone());
        let token = CancellationToken::new();
        let (updates, receiver) = mpsc::channel(1);

        let task = tokio::spawn(scheduler.run(token.clone(), receiver));
        tokio::time::sleep(Duration::from_secs(1)).await;
        updates
            .send(Reconfiguration {
                metric_sets: vec![metric_set("db2", MemoryDirectory::default())],
                period: PERIOD,
                parallel: false,
            })
            .await
            .unwrap_or_else(|_| panic!("scheduler stopped"));
        tokio::time::sleep(Duration::from_secs(5)).await;
        token.cancel();
        task.await.unwrap();

        let databases = sink
            .commits()
            .iter()
            .filter_map(|commit| commit.tags.get("database").map(str::to_string))
            .collect::<Vec<_>>();
        assert_eq!(databases, vec!["db1".to_string(), "db2".to_string()]);
    }
}
