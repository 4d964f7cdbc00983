//! The stats backend: the [`StatsSink`] contract, an in-memory aggregating
//! implementation and the exporters that publish its contents.

#[macro_use]
extern crate tracing;

mod error;
mod measurement;
pub mod prometheus;
mod sink;
pub mod stackdriver;
mod store;

pub use error::ExportError;
use ldap_stats_config::ExporterConfig;
pub use measurement::{
    Measurement,
    MeasurementBatch,
    Tags,
};
use prometheus::PrometheusExporter;
pub use sink::{
    StatsSink,
    View,
};
use stackdriver::StackdriverExporter;
pub use store::{
    Row,
    ViewSnapshot,
    ViewStore,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The running exporters of one configuration.
pub struct Exporters {
    configs: Vec<ExporterConfig>,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Exporters {
    /// Starts one task per configured exporter under a child of `parent`.
    ///
    /// Endpoints are bound before anything is spawned so that a bad address
    /// fails startup.
    pub async fn start(
        configs: &[ExporterConfig],
        store: &ViewStore,
        parent: &CancellationToken,
    ) -> Result<Self, ExportError> {
        let token = parent.child_token();
        let mut prometheus = Vec::new();
        let mut stackdriver = Vec::new();
        for config in configs {
            match config {
                ExporterConfig::Prometheus(options) => {
                    prometheus.push(PrometheusExporter::bind(options, store.clone()).await?);
                }
                ExporterConfig::Stackdriver(options) => {
                    stackdriver.push(StackdriverExporter::new(options.clone(), store.clone())?);
                }
            }
        }
        if configs.is_empty() {
            warn!("no exporters configured, collected metrics are not published");
        }

        let mut tasks = Vec::with_capacity(configs.len());
        for exporter in prometheus {
            let token = token.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(err) = exporter.serve(token).await {
                    error!("{err}");
                }
            }));
        }
        for exporter in stackdriver {
            tasks.push(tokio::spawn(exporter.run(token.clone())));
        }

        Ok(Self {
            configs: configs.to_vec(),
            token,
            tasks,
        })
    }

    /// No exporters at all.
    pub fn stopped(parent: &CancellationToken) -> Self {
        Self {
            configs: Vec::new(),
            token: parent.child_token(),
            tasks: Vec::new(),
        }
    }

    pub fn configs(&self) -> &[ExporterConfig] {
        &self.configs
    }

    /// Cancels every exporter and waits for the tasks to finish.
    pub async fn stop(self) {
        self.token.cancel();
        for task in self.tasks {
            if let Err(err) = task.await {
                error!("exporter task failed: {err}");
            }
        }
    }
}
