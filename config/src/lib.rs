//! Configuration for the LDAP statistics collector.
//!
//! The file is read into a [`ConfigNode`] tree and rewritten by an ordered
//! [`TransformPipeline`]. The typed [`Settings`] are read from the rewritten
//! tree, and the statistics compiler consumes the per-server object trees.

#[macro_use]
extern crate tracing;

mod aggregation;
mod error;
mod load;
pub mod node;
pub mod passes;
mod pipeline;
mod settings;

pub use aggregation::AggregationKind;
pub use error::ConfigError;
pub use load::read_config_file;
pub use node::{
    ConfigNode,
    Mapping,
};
pub use pipeline::{
    ConfigTransformer,
    TransformPipeline,
};
pub use settings::{
    ConnectionConfig,
    ExporterConfig,
    LogConfig,
    LogFormat,
    PrometheusOptions,
    ServerConfig,
    Settings,
    StackdriverOptions,
    DEFAULT_PERIOD,
};

/// Reads `path` and applies the standard passes.
pub fn load(path: impl AsRef<std::path::Path>) -> Result<(ConfigNode, Settings), ConfigError> {
    let tree = TransformPipeline::standard().run(read_config_file(path)?)?;
    let settings = Settings::from_tree(&tree)?;
    Ok((tree, settings))
}
