use clap::Parser;
use color_eyre::Result;
use ldap_stats::{
    init_errors,
    App,
    Args,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_errors()?;
    App::new(Args::parse())?.run().await
}
