use crate::{
    registry::{
        ServerIdentity,
        ServerRegistry,
    },
    CompileError,
};
use ldap_stats_config::{
    passes::NameInterpolation,
    ConfigNode,
};
use std::collections::HashMap;

/// Reads every value the metric name placeholders of `tree` refer to and
/// builds the interpolation pass from them.
///
/// Only servers with at least one lookup are registered. Lookups on servers
/// missing from `identities` or without a value are left out; the pass then
/// rejects the placeholder.
pub async fn resolve_name_interpolation(
    tree: &ConfigNode,
    identities: &[ServerIdentity],
    registry: &ServerRegistry,
) -> Result<NameInterpolation, CompileError> {
    let mut values = HashMap::new();
    for lookup in NameInterpolation::lookups(tree)? {
        let Some(identity) = identities.iter().find(|identity| identity.database == lookup.database) else {
            warn!(database = lookup.database, "metric name refers to an unknown server");
            continue;
        };
        let connection = registry.get_or_create(identity);
        let value = connection
            .query_attribute(&lookup.dn, &lookup.attribute)
            .await
            .and_then(|values| values.into_iter().next());
        match value {
            Some(value) => {
                debug!(
                    database = lookup.database,
                    dn = lookup.dn,
                    attribute = lookup.attribute,
                    %value,
                    "resolved metric name placeholder"
                );
                values.insert(lookup, value.to_string());
            }
            None => warn!(
                database = lookup.database,
                dn = lookup.dn,
                attribute = lookup.attribute,
                "no value for metric name placeholder"
            ),
        }
    }
    Ok(NameInterpolation::new(values))
}
