//! Push exporter for the Cloud Monitoring (Stackdriver) `timeSeries` API.

use crate::{
    error::ExportError,
    store::{
        ViewSnapshot,
        ViewStore,
    },
};
use chrono::{
    DateTime,
    Utc,
};
use ldap_stats_config::{
    AggregationKind,
    StackdriverOptions,
};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    time::Duration,
};
use tokio_util::sync::CancellationToken;

pub const PUSH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_ENDPOINT: &str = "https://monitoring.googleapis.com";
/// The API accepts at most this many time series per request.
const MAX_SERIES_PER_REQUEST: usize = 200;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTimeSeriesRequest {
    pub time_series: Vec<TimeSeries>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeries {
    pub metric: Metric,
    pub resource: Resource,
    pub metric_kind: &'static str,
    pub value_type: &'static str,
    pub unit: String,
    pub points: Vec<Point>,
}

#[derive(Debug, Serialize)]
pub struct Metric {
    #[serde(rename = "type")]
    pub metric_type: String,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub resource_type: &'static str,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct Point {
    pub interval: Interval,
    pub value: TypedValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Interval {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedValue {
    pub double_value: f64,
}

pub struct StackdriverExporter {
    client: reqwest::Client,
    options: StackdriverOptions,
    store: ViewStore,
    started: DateTime<Utc>,
}

impl StackdriverExporter {
    pub fn new(options: StackdriverOptions, store: ViewStore) -> Result<Self, ExportError> {
        let client = reqwest::Client::builder()
            .timeout(PUSH_INTERVAL)
            .build()
            .map_err(ExportError::Client)?;
        Ok(Self {
            client,
            options,
            store,
            started: Utc::now(),
        })
    }

    pub fn url(&self) -> String {
        let endpoint = self.options.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        format!(
            "{}/v3/projects/{}/timeSeries",
            endpoint.trim_end_matches('/'),
            self.options.project_id
        )
    }

    /// Converts the store's current state into request bodies.
    pub fn requests(&self, now: DateTime<Utc>) -> Vec<CreateTimeSeriesRequest> {
        let series = time_series(&self.options, &self.store.snapshot(), self.started, now);
        let mut requests = Vec::new();
        let mut series = series.into_iter().peekable();
        while series.peek().is_some() {
            requests.push(CreateTimeSeriesRequest {
                time_series: series.by_ref().take(MAX_SERIES_PER_REQUEST).collect(),
            });
        }
        requests
    }

    pub async fn push(&self) -> Result<(), ExportError> {
        let url = self.url();
        for request in self.requests(Utc::now()) {
            let mut builder = self.client.post(&url).json(&request);
            if let Some(token) = &self.options.access_token {
                builder = builder.bearer_auth(token);
            }
            let response = builder.send().await.map_err(|source| ExportError::Push {
                url: url.clone(),
                source,
            })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ExportError::Rejected { url, status, body });
            }
            debug!(count = request.time_series.len(), "pushed time series");
        }
        Ok(())
    }

    pub async fn run(self, token: CancellationToken) {
        info!(url = self.url(), interval = ?PUSH_INTERVAL, "pushing metrics to Stackdriver");
        let mut interval = tokio::time::interval(PUSH_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately and the store is still empty.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(err) = self.push().await {
                        warn!("Stackdriver push failed, retrying with the next push: {err}");
                    }
                }
            }
        }
        debug!("Stackdriver exporter stopped");
    }
}

fn time_series(
    options: &StackdriverOptions,
    snapshots: &[ViewSnapshot],
    started: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Vec<TimeSeries> {
    let prefix = options.metric_prefix.trim_end_matches('/');
    let resource_labels = BTreeMap::from([("project_id".to_string(), options.project_id.clone())]);

    snapshots
        .iter()
        .flat_map(|snapshot| {
            let (metric_kind, start_time) = match snapshot.view.aggregation {
                AggregationKind::LastValue => ("GAUGE", None),
                AggregationKind::Sum | AggregationKind::Count => ("CUMULATIVE", Some(started)),
            };
            let resource_labels = resource_labels.clone();
            snapshot.rows.iter().map(move |row| TimeSeries {
                metric: Metric {
                    metric_type: format!("{prefix}/{}", snapshot.view.name),
                    labels: row
                        .tags
                        .iter()
                        .map(|(key, value)| (key.to_string(), value.to_string()))
                        .collect(),
                },
                resource: Resource {
                    resource_type: "global",
                    labels: resource_labels.clone(),
                },
                metric_kind,
                value_type: "DOUBLE",
                unit: snapshot.view.unit.clone(),
                points: vec![Point {
                    interval: Interval {
                        start_time,
                        end_time: now,
                    },
                    value: TypedValue {
                        double_value: row.value,
                    },
                }],
            })
        })
        .collect()
}
