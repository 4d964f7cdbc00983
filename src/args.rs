use clap::Parser;
use std::path::PathBuf;

/// Polls LDAP servers and publishes selected attributes as metrics.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file. Send SIGHUP to reload it.
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,
}
