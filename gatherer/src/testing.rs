//! In-memory collaborators shared by the unit tests.

use crate::directory::{
    AttributeValue,
    DirectoryClient,
};
use ldap_stats_exporter::{
    ExportError,
    MeasurementBatch,
    StatsSink,
    Tags,
    View,
};
use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::Mutex,
    time::Duration,
};
use tokio::time::Instant;

#[derive(Default)]
pub(crate) struct MemoryDirectory {
    entries: HashMap<(String, String), Vec<AttributeValue>>,
    delay: Option<Duration>,
}

impl MemoryDirectory {
    pub(crate) fn with(mut self, dn: &str, attribute: &str, values: &[&str]) -> Self {
        self.entries.insert(
            (dn.to_string(), attribute.to_string()),
            values.iter().map(|value| AttributeValue::from(*value)).collect(),
        );
        self
    }

    /// Every query takes `delay`.
    pub(crate) fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl DirectoryClient for MemoryDirectory {
    fn query_attribute<'a>(
        &'a self,
        dn: &'a str,
        attribute: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<Vec<AttributeValue>>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.entries.get(&(dn.to_string(), attribute.to_string())).cloned()
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Commit {
    pub(crate) tags: Tags,
    pub(crate) measurements: Vec<(String, f64)>,
    pub(crate) at: Instant,
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    pub(crate) views: Mutex<Vec<View>>,
    pub(crate) commits: Mutex<Vec<Commit>>,
}

impl RecordingSink {
    pub(crate) fn commits(&self) -> Vec<Commit> {
        self.commits.lock().unwrap().clone()
    }

    pub(crate) fn view_names(&self) -> Vec<String> {
        self.views.lock().unwrap().iter().map(|view| view.name.clone()).collect()
    }
}

impl StatsSink for RecordingSink {
    fn register_views(&self, views: Vec<View>) -> Result<(), ExportError> {
        self.views.lock().unwrap().extend(views);
        Ok(())
    }

    fn commit(&self, batch: MeasurementBatch, tags: &Tags) {
        self.commits.lock().unwrap().push(Commit {
            tags: tags.clone(),
            measurements: batch.into_iter().map(|m| (m.measure, m.value)).collect(),
            at: Instant::now(),
        });
    }
}
