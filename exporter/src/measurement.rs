use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub measure: String,
    pub value: f64,
}

/// Observations staged during one collection cycle. Nothing reaches a sink
/// until the batch is committed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MeasurementBatch {
    measurements: Vec<Measurement>,
}

impl MeasurementBatch {
    pub fn record_float(&mut self, measure: impl Into<String>, value: f64) {
        self.measurements.push(Measurement {
            measure: measure.into(),
            value,
        });
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Measurement> {
        self.measurements.iter()
    }
}

impl IntoIterator for MeasurementBatch {
    type Item = Measurement;
    type IntoIter = std::vec::IntoIter<Measurement>;

    fn into_iter(self) -> Self::IntoIter {
        self.measurements.into_iter()
    }
}

/// Tag key/value pairs applied to a whole batch, ordered by key.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Only the tags whose key is in `keys`.
    pub fn restricted_to(&self, keys: &[String]) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(key, _)| keys.contains(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }
}
