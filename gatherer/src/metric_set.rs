use crate::{
    registry::{
        ConnectionHandle,
        ServerIdentity,
    },
    statistic::{
        Statistic,
        DATABASE_TAG,
    },
};
use ldap_stats_exporter::{
    StatsSink,
    Tags,
};

/// The statistics of one server, collected together once per tick.
pub struct MetricSet {
    identity: ServerIdentity,
    connection: ConnectionHandle,
    statistics: Vec<Statistic>,
}

impl MetricSet {
    pub fn new(identity: ServerIdentity, connection: ConnectionHandle, statistics: Vec<Statistic>) -> Self {
        Self {
            identity,
            connection,
            statistics,
        }
    }

    pub fn database(&self) -> &str {
        &self.identity.database
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    pub fn statistics(&self) -> &[Statistic] {
        &self.statistics
    }

    pub fn tags(&self) -> Tags {
        Tags::default().with(DATABASE_TAG, self.identity.database.as_str())
    }

    /// Collects every statistic into one batch and commits it once.
    /// Returns the number of recorded measurements.
    pub async fn collect(&self, sink: &dyn StatsSink) -> usize {
        let mut batch = sink.new_batch();
        for statistic in &self.statistics {
            if let Err(err) = statistic.collect(self.connection.as_ref(), &mut batch).await {
                warn!(database = self.identity.database, "{err}");
            }
        }

        let recorded = batch.len();
        sink.commit(batch, &self.tags());
        debug!(
            database = self.identity.database,
            recorded,
            total = self.statistics.len(),
            "committed batch"
        );
        recorded
    }
}

impl std::fmt::Debug for MetricSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricSet")
            .field("database", &self.identity.database)
            .field("statistics", &self.statistics)
            .finish()
    }
}
