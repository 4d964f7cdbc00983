use crate::{
    directory::DirectoryClient,
    CollectError,
};
use ldap_stats_config::AggregationKind;
use ldap_stats_exporter::{
    MeasurementBatch,
    View,
};

/// Tag key under which every measurement carries its server name.
pub const DATABASE_TAG: &str = "database";

/// A metric bound to one attribute of one directory object.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatistic {
    pub distinguished_name: String,
    pub metric_name: String,
    pub attribute: String,
    pub unit: String,
    pub description: String,
    pub aggregation: AggregationKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statistic {
    compiled: CompiledStatistic,
}

impl Statistic {
    pub fn new(compiled: CompiledStatistic) -> Self {
        Self { compiled }
    }

    pub fn compiled(&self) -> &CompiledStatistic {
        &self.compiled
    }

    pub fn metric_name(&self) -> &str {
        &self.compiled.metric_name
    }

    pub fn view(&self) -> View {
        View {
            name: self.compiled.metric_name.clone(),
            description: self.compiled.description.clone(),
            unit: self.compiled.unit.clone(),
            tag_keys: vec![DATABASE_TAG.to_string()],
            aggregation: self.compiled.aggregation,
        }
    }

    /// Reads the attribute and stages its first value into `batch`.
    ///
    /// No value leaves the batch untouched. A value that does not parse as
    /// a float is an error for this statistic only.
    pub async fn collect(&self, client: &dyn DirectoryClient, batch: &mut MeasurementBatch) -> Result<(), CollectError> {
        let CompiledStatistic {
            distinguished_name: dn,
            metric_name,
            attribute,
            ..
        } = &self.compiled;

        let values = client.query_attribute(dn, attribute).await;
        let Some(first) = values.as_ref().and_then(|values| values.first()) else {
            warn!(metric = metric_name, dn, attribute, "no value");
            return Ok(());
        };

        let value = first
            .as_text()
            .and_then(|text| text.trim().parse::<f64>().ok())
            .ok_or_else(|| CollectError::NotNumeric {
                metric: metric_name.clone(),
                attribute: attribute.clone(),
                value: first.to_string(),
            })?;

        debug!(metric = metric_name, value, "collected");
        batch.record_float(metric_name.clone(), value);
        Ok(())
    }
}
