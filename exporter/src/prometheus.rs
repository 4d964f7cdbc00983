//! Pull endpoint in the Prometheus text exposition format.

use crate::{
    error::ExportError,
    sink::View,
    store::ViewStore,
};
use axum::{
    extract::State,
    http::{
        header,
        StatusCode,
    },
    response::{
        IntoResponse,
        Response,
    },
    routing::get,
    Router,
};
use ldap_stats_config::{
    AggregationKind,
    PrometheusOptions,
};
use prometheus::{
    core::Collector,
    CounterVec,
    GaugeVec,
    Opts,
    Registry,
    TextEncoder,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// The Prometheus metric family backing one view: a gauge for last-value
/// views, a counter for sums and counts.
#[derive(Clone)]
pub(crate) enum Family {
    Gauge(GaugeVec),
    Counter(CounterVec),
}

impl Family {
    pub(crate) fn new(view: &View) -> prometheus::Result<Self> {
        let help = if view.description.is_empty() {
            view.name.as_str()
        } else {
            view.description.as_str()
        };
        let opts = Opts::new(metric_name(&view.name), help);
        let labels = view.tag_keys.iter().map(|key| label_name(key)).collect::<Vec<_>>();
        let labels = labels.iter().map(String::as_str).collect::<Vec<_>>();

        Ok(match view.aggregation {
            AggregationKind::LastValue => Self::Gauge(GaugeVec::new(opts, &labels)?),
            AggregationKind::Sum | AggregationKind::Count => Self::Counter(CounterVec::new(opts, &labels)?),
        })
    }

    pub(crate) fn collector(&self) -> Box<dyn Collector> {
        match self {
            Self::Gauge(vec) => Box::new(vec.clone()),
            Self::Counter(vec) => Box::new(vec.clone()),
        }
    }

    /// Sets the series of `label_values` to the aggregated `value`. A counter
    /// whose aggregate went down is reset first.
    pub(crate) fn set(&self, label_values: &[&str], value: f64) -> prometheus::Result<()> {
        match self {
            Self::Gauge(vec) => vec.get_metric_with_label_values(label_values)?.set(value),
            Self::Counter(vec) => {
                let counter = vec.get_metric_with_label_values(label_values)?;
                if value < counter.get() {
                    counter.reset();
                }
                counter.inc_by((value - counter.get()).max(0.0));
            }
        }
        Ok(())
    }
}

/// Fails if two families share an exported name.
pub(crate) fn check_unique<'a>(families: impl IntoIterator<Item = (&'a str, &'a Family)>) -> Result<(), ExportError> {
    let registry = Registry::new();
    for (view, family) in families {
        registry
            .register(family.collector())
            .map_err(|source| ExportError::View {
                view: view.to_string(),
                source,
            })?;
    }
    Ok(())
}

#[derive(Clone)]
struct MetricsState {
    store: ViewStore,
    namespace: Option<String>,
}

impl MetricsState {
    fn encode(&self) -> prometheus::Result<String> {
        let registry = Registry::new_custom(self.namespace.clone(), None)?;
        for family in self.store.families() {
            registry.register(family.collector())?;
        }

        let mut body = String::new();
        TextEncoder::new().encode_utf8(&registry.gather(), &mut body)?;
        Ok(body)
    }
}

pub fn create_router(store: ViewStore, namespace: &str) -> Router {
    let namespace = metric_name(namespace);
    let state = MetricsState {
        store,
        namespace: (!namespace.is_empty()).then_some(namespace),
    };

    Router::new()
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn metrics(State(state): State<MetricsState>) -> Response {
    match state.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(err) => {
            error!("Failed to encode metrics: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn healthz() -> &'static str {
    "OK"
}

/// A bound endpoint. Binding happens at startup so an unavailable port is
/// a startup error rather than a failed background task.
pub struct PrometheusExporter {
    listener: TcpListener,
    router: Router,
}

impl PrometheusExporter {
    pub async fn bind(options: &PrometheusOptions, store: ViewStore) -> Result<Self, ExportError> {
        let address = SocketAddr::new(options.address, options.port);
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| ExportError::Bind { address, source })?;
        Ok(Self {
            listener,
            router: create_router(store, &options.namespace),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ExportError> {
        self.listener.local_addr().map_err(ExportError::Serve)
    }

    pub async fn serve(self, token: CancellationToken) -> Result<(), ExportError> {
        if let Ok(address) = self.listener.local_addr() {
            info!(%address, "serving Prometheus metrics");
        }
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
            .map_err(ExportError::Serve)
    }
}

/// Replaces every character Prometheus does not allow in a metric name.
pub fn metric_name(name: &str) -> String {
    sanitize(name, |c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn label_name(key: &str) -> String {
    sanitize(key, |c| c.is_ascii_alphanumeric() || c == '_')
}

fn sanitize(raw: &str, allowed: impl Fn(char) -> bool) -> String {
    let mut sanitized: String = raw.chars().map(|c| if allowed(c) { c } else { '_' }).collect();
    if sanitized.starts_with(|c: char| c.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }
    sanitized
}
