use crate::{
    node::{
        keys,
        server_database,
    },
    ConfigError,
    ConfigNode,
    ConfigTransformer,
};

/// Gives every server its own deep copy of the shared top-level `object`
/// tree. Servers that declare their own `object` keep it.
///
/// Later passes annotate the per-server trees, so no structure may be shared
/// between servers.
pub struct ReplicatePerServer;

impl ConfigTransformer for ReplicatePerServer {
    fn name(&self) -> &'static str {
        "replicate-per-server"
    }

    fn transform(&self, mut tree: ConfigNode) -> Result<ConfigNode, ConfigError> {
        let root = tree.as_mapping_mut().ok_or(ConfigError::NotAMapping)?;
        let Some(shared) = root.get(keys::OBJECT).cloned() else {
            return Ok(tree);
        };

        if let Some(ConfigNode::Sequence(servers)) = root.get_mut(keys::LDAP_SERVERS) {
            for server in servers.iter_mut().filter_map(ConfigNode::as_mapping_mut) {
                let database = server_database(server).unwrap_or_default();
                if server.contains_key(keys::OBJECT) {
                    debug!(database, "server declares its own object tree");
                    continue;
                }
                server.insert(keys::OBJECT.into(), shared.clone());
            }
        }

        Ok(tree)
    }
}
