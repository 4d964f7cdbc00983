use std::net::SocketAddr;

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("Failed to bind the Prometheus endpoint to {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("View '{view}' cannot be exported: {source}")]
    View {
        view: String,
        #[source]
        source: prometheus::Error,
    },
    #[error("The Prometheus endpoint stopped unexpectedly: {0}")]
    Serve(#[source] std::io::Error),
    #[error("Failed to build the Stackdriver HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("Pushing time series to {url} failed: {source}")]
    Push {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} rejected the time series with status {status}: {body}")]
    Rejected {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },
}
