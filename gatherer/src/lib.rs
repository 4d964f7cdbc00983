//! Periodic collection of directory attributes as metrics.
//!
//! A transformed configuration tree is compiled into one [`MetricSet`] per
//! server. The [`Scheduler`] collects every set once per period and commits
//! one tagged batch per server to a [`StatsSink`](ldap_stats_exporter::StatsSink).

#[macro_use]
extern crate tracing;

mod compiler;
mod directory;
mod error;
mod interpolation;
mod ldap;
mod metric_set;
mod registry;
mod scheduler;
mod statistic;
#[cfg(test)]
mod testing;

pub use compiler::MetricTreeCompiler;
pub use directory::{
    AttributeValue,
    DirectoryClient,
};
pub use error::{
    CollectError,
    CompileError,
};
pub use interpolation::resolve_name_interpolation;
pub use ldap::LdapClient;
use ldap_stats_config::{
    ConfigNode,
    ConfigTransformer as _,
    Settings,
};
use ldap_stats_exporter::StatsSink;
pub use metric_set::MetricSet;
pub use registry::{
    ConnectionHandle,
    Connector,
    LdapConnector,
    ServerIdentity,
    ServerRegistry,
};
pub use scheduler::{
    Reconfiguration,
    Scheduler,
    SchedulerState,
};
pub use statistic::{
    CompiledStatistic,
    Statistic,
    DATABASE_TAG,
};

/// Expands placeholder metric names if enabled and compiles the result.
///
/// Every server entry is validated before the first one is registered.
/// `tree` must already have been through the standard passes.
pub async fn compile_configuration(
    tree: ConfigNode,
    registry: &ServerRegistry,
    sink: &dyn StatsSink,
) -> Result<Vec<MetricSet>, CompileError> {
    let settings = Settings::from_tree(&tree)?;
    let identities = settings
        .ldap_servers
        .iter()
        .enumerate()
        .map(|(index, server)| ServerIdentity::from_config(index, server))
        .collect::<Result<Vec<_>, _>>()?;

    let tree = if settings.interpolate_metric_names {
        let interpolation = resolve_name_interpolation(&tree, &identities, registry).await?;
        interpolation.transform(tree)?
    } else {
        tree
    };

    MetricTreeCompiler::new(registry, sink).compile(&tree)
}
