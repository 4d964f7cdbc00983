use crate::{
    error::ExportError,
    measurement::{
        MeasurementBatch,
        Tags,
    },
    prometheus::{
        check_unique,
        Family,
    },
    sink::{
        StatsSink,
        View,
    },
};
use ldap_stats_config::AggregationKind;
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};

/// In-memory aggregating sink read by the exporters.
///
/// Every view is mirrored into a Prometheus metric family, so views whose
/// exported names collide are refused at registration.
#[derive(Clone, Default)]
pub struct ViewStore {
    inner: Arc<Mutex<BTreeMap<String, ViewData>>>,
}

struct ViewData {
    view: View,
    family: Family,
    rows: BTreeMap<Tags, f64>,
}

impl std::fmt::Debug for ViewStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.lock().keys()).finish()
    }
}

/// The aggregated state of one view at the time of
/// [`ViewStore::snapshot`].
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSnapshot {
    pub view: View,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub tags: Tags,
    pub value: f64,
}

impl ViewStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, ViewData>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Views ordered by name.
    pub fn snapshot(&self) -> Vec<ViewSnapshot> {
        self.lock()
            .values()
            .map(|data| ViewSnapshot {
                view: data.view.clone(),
                rows: data
                    .rows
                    .iter()
                    .map(|(tags, value)| Row {
                        tags: tags.clone(),
                        value: *value,
                    })
                    .collect(),
            })
            .collect()
    }

    pub fn views(&self) -> Vec<View> {
        self.lock().values().map(|data| data.view.clone()).collect()
    }

    pub(crate) fn families(&self) -> Vec<Family> {
        self.lock().values().map(|data| data.family.clone()).collect()
    }

    /// Drops every view not named in `keep`, e.g. after a reload removed
    /// metrics from the configuration.
    pub fn retain_views(&self, keep: &[String]) {
        self.lock().retain(|name, _| {
            let retained = keep.contains(name);
            if !retained {
                debug!(view = name, "dropping view");
            }
            retained
        });
    }
}

impl StatsSink for ViewStore {
    fn register_views(&self, views: Vec<View>) -> Result<(), ExportError> {
        let mut registered = self.lock();

        let mut pending = Vec::new();
        for view in views {
            if registered.get(&view.name).is_some_and(|existing| existing.view == view) {
                continue;
            }
            let family = Family::new(&view).map_err(|source| ExportError::View {
                view: view.name.clone(),
                source,
            })?;
            pending.push(ViewData::new(view, family));
        }

        let kept = registered
            .values()
            .filter(|data| !pending.iter().any(|new| new.view.name == data.view.name));
        check_unique(
            kept.chain(pending.iter())
                .map(|data| (data.view.name.as_str(), &data.family)),
        )?;

        for data in pending {
            if registered.contains_key(&data.view.name) {
                warn!(view = data.view.name, "view definition changed, discarding its data");
            } else {
                debug!(view = data.view.name, aggregation = %data.view.aggregation, "registered view");
            }
            registered.insert(data.view.name.clone(), data);
        }
        Ok(())
    }

    fn commit(&self, batch: MeasurementBatch, tags: &Tags) {
        let mut views = self.lock();
        for measurement in batch {
            let Some(data) = views.get_mut(&measurement.measure) else {
                warn!(measure = measurement.measure, "no view registered for measure, dropping it");
                continue;
            };
            let row_tags = tags.restricted_to(&data.view.tag_keys);
            let label_values = data
                .view
                .tag_keys
                .iter()
                .map(|key| row_tags.get(key).unwrap_or_default())
                .collect::<Vec<_>>();

            let row = data.rows.entry(row_tags.clone()).or_insert(0.0);
            *row = match data.view.aggregation {
                AggregationKind::LastValue => measurement.value,
                AggregationKind::Sum => *row + measurement.value,
                AggregationKind::Count => *row + 1.0,
            };
            if let Err(err) = data.family.set(&label_values, *row) {
                warn!(view = data.view.name, "failed to update the exported series: {err}");
            }
        }
    }
}

impl ViewData {
    fn new(view: View, family: Family) -> Self {
        Self {
            view,
            family,
            rows: BTreeMap::new(),
        }
    }
}
