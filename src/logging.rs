use color_eyre::Result;
use eyre::Context as _;
use ldap_stats_config::{
    LogConfig,
    LogFormat,
};
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// The filter directives for `config`; `RUST_LOG` overrides them.
fn directives(config: &LogConfig) -> &str {
    config.filter.as_deref().unwrap_or(&config.level)
}

pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        EnvFilter::try_from_default_env().wrap_err("Invalid RUST_LOG filter")?
    } else {
        EnvFilter::try_new(directives(config))
            .wrap_err_with(|| format!("Invalid log filter '{}'", directives(config)))?
    };

    let (full, compact) = match config.format {
        LogFormat::Full => (Some(fmt::layer().with_ansi(config.ansi)), None),
        LogFormat::Compact => (None, Some(fmt::layer().compact().with_ansi(config.ansi))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(full)
        .with(compact)
        .with(tracing_error::ErrorLayer::default())
        .try_init()
        .wrap_err("Failed to initialize logging")
}
