//! The configuration rewrite passes, in the order the pipeline runs them.

mod distinguished_name;
mod interpolation;
mod key_case;
mod metric_name;
mod replicate;
mod reserved_keys;

pub use distinguished_name::DistinguishedNames;
pub use interpolation::{
    Lookup,
    NameInterpolation,
    DATABASE_PLACEHOLDER,
};
pub use key_case::KeyNormalization;
pub use metric_name::MetricNames;
pub use replicate::ReplicatePerServer;
pub use reserved_keys::ReservedKeyDisambiguation;

/// Names the per-server object trees in error paths.
fn tree_label(database: Option<&str>) -> String {
    match database {
        Some(database) => format!("ldap_servers[{database}]/object"),
        None => "object".to_string(),
    }
}

fn join_path(label: &str, path: &str) -> String {
    if path.is_empty() {
        label.to_string()
    } else {
        format!("{label}/{path}")
    }
}
