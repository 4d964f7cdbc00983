use ldap_stats_config::ConfigError;
use ldap_stats_exporter::ExportError;

/// Configuration errors found while compiling the metric tree. Any of these
/// aborts startup, or a reload, before collection begins.
#[derive(thiserror::Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Server entry #{index} has neither a database name nor a connection")]
    UnnamedServer { index: usize },
    #[error("Server '{database}' has no connection parameters")]
    MissingConnection { database: String },
    #[error("Metric '{metric}' is declared more than once for server '{database}'")]
    DuplicateMetric { database: String, metric: String },
    #[error("Server '{database}' chooses the unknown statistic '{metric}'")]
    UnknownChosenStatistic { database: String, metric: String },
    #[error("Metric '{metric}' has the unknown aggregation '{value}', expected one of: {expected}")]
    UnknownAggregation {
        metric: String,
        value: String,
        expected: String,
    },
    #[error(transparent)]
    View { source: ExportError },
    #[error("Metric '{metric}' is defined differently for servers '{first}' and '{second}'")]
    ConflictingView {
        metric: String,
        first: String,
        second: String,
    },
}

/// A soft error while collecting one statistic. It is logged and the rest
/// of the batch is collected.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum CollectError {
    #[error("Value '{value}' of attribute '{attribute}' for metric '{metric}' is not a number")]
    NotNumeric {
        metric: String,
        attribute: String,
        value: String,
    },
}
