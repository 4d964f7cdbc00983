use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Configuration file {path} is not valid YAML: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yml::Error,
    },
    #[error("The configuration must be a mapping at the top level")]
    NotAMapping,
    #[error("Invalid configuration: {0}")]
    Invalid(#[source] serde_yml::Error),
    #[error("Server '{database}' has an invalid server URI '{uri}': {source}")]
    InvalidUri {
        database: String,
        uri: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Invalid period '{value}': {reason}")]
    Period { value: String, reason: String },
    #[error("Node at '{path}' declares attribute '{attribute}' but no object with an rdn encloses it")]
    AttributeWithoutObject { path: String, attribute: String },
    #[error("Metric '{metric}' uses placeholder '{placeholder}' which could not be resolved")]
    UnresolvedPlaceholder { metric: String, placeholder: String },
    #[error("Metric '{metric}' contains an unterminated placeholder")]
    UnterminatedPlaceholder { metric: String },
}
