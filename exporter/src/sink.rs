use crate::{
    error::ExportError,
    measurement::{
        MeasurementBatch,
        Tags,
    },
};
use ldap_stats_config::AggregationKind;

/// A named metric definition: how the observations of the measure with the
/// same name are combined and which batch tags become dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub name: String,
    pub description: String,
    pub unit: String,
    pub tag_keys: Vec<String>,
    pub aggregation: AggregationKind,
}

/// Where collected measurements go.
pub trait StatsSink: Send + Sync {
    /// Registers every view, or none of them when one is rejected.
    /// Registering an identical view again is a no-op.
    fn register_views(&self, views: Vec<View>) -> Result<(), ExportError>;

    fn new_batch(&self) -> MeasurementBatch {
        MeasurementBatch::default()
    }

    /// Applies every measurement of `batch`, tagged with `tags`, as one
    /// atomic update.
    fn commit(&self, batch: MeasurementBatch, tags: &Tags);
}
