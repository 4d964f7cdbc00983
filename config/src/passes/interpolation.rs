use crate::{
    node::{
        keys,
        mappings,
        server_database,
        server_entries,
        walk_mut,
        NodeExt as _,
    },
    ConfigError,
    ConfigNode,
    ConfigTransformer,
};
use std::collections::{
    BTreeSet,
    HashMap,
};

/// `${database}` always expands to the server's logical name.
pub const DATABASE_PLACEHOLDER: &str = "database";

/// One directory read needed to expand a placeholder: `attribute` of the
/// object at `dn` on server `database`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Lookup {
    pub database: String,
    pub dn: String,
    pub attribute: String,
}

/// Expands `${...}` placeholders in computed metric names.
///
/// `${database}` becomes the server name, any other `${attr}` the first
/// value of `attr` on the node's own DN. The values are resolved ahead of
/// time, see [`NameInterpolation::lookups`], so the pass itself is pure.
#[derive(Debug, Default)]
pub struct NameInterpolation {
    values: HashMap<Lookup, String>,
}

enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

fn segments(name: &str) -> Option<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut rest = name;
    while let Some(start) = rest.find("${") {
        if start > 0 {
            segments.push(Segment::Literal(&rest[..start]));
        }
        let after = &rest[start + 2..];
        let end = after.find('}')?;
        segments.push(Segment::Placeholder(after[..end].trim()));
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    Some(segments)
}

impl NameInterpolation {
    pub fn new(values: HashMap<Lookup, String>) -> Self {
        Self { values }
    }

    /// Every directory read the placeholders of `tree` need, deduplicated.
    pub fn lookups(tree: &ConfigNode) -> Result<Vec<Lookup>, ConfigError> {
        let mut lookups = BTreeSet::new();
        for server in server_entries(tree) {
            let (Some(database), Some(object)) = (server_database(server), server.get(keys::OBJECT)) else {
                continue;
            };
            for node in mappings(object) {
                let Some(metric_name) = node.str_field(keys::METRIC_NAME) else {
                    continue;
                };
                let segments = segments(metric_name).ok_or_else(|| ConfigError::UnterminatedPlaceholder {
                    metric: metric_name.to_string(),
                })?;
                let dn = node.str_field(keys::COMPUTED_DN).unwrap_or_default();
                for segment in segments {
                    if let Segment::Placeholder(attribute) = segment {
                        if attribute != DATABASE_PLACEHOLDER && !attribute.is_empty() {
                            lookups.insert(Lookup {
                                database: database.clone(),
                                dn: dn.to_string(),
                                attribute: attribute.to_string(),
                            });
                        }
                    }
                }
            }
        }
        Ok(lookups.into_iter().collect())
    }

    fn expand(&self, metric_name: &str, database: &str, dn: &str) -> Result<String, ConfigError> {
        let segments = segments(metric_name).ok_or_else(|| ConfigError::UnterminatedPlaceholder {
            metric: metric_name.to_string(),
        })?;

        let mut expanded = String::with_capacity(metric_name.len());
        for segment in segments {
            match segment {
                Segment::Literal(text) => expanded.push_str(text),
                Segment::Placeholder(DATABASE_PLACEHOLDER) => expanded.push_str(database),
                Segment::Placeholder(attribute) => {
                    let lookup = Lookup {
                        database: database.to_string(),
                        dn: dn.to_string(),
                        attribute: attribute.to_string(),
                    };
                    let value = self
                        .values
                        .get(&lookup)
                        .ok_or_else(|| ConfigError::UnresolvedPlaceholder {
                            metric: metric_name.to_string(),
                            placeholder: attribute.to_string(),
                        })?;
                    expanded.push_str(value);
                }
            }
        }
        Ok(expanded)
    }
}

impl ConfigTransformer for NameInterpolation {
    fn name(&self) -> &'static str {
        "name-interpolation"
    }

    fn transform(&self, mut tree: ConfigNode) -> Result<ConfigNode, ConfigError> {
        let root = tree.as_mapping_mut().ok_or(ConfigError::NotAMapping)?;
        let Some(ConfigNode::Sequence(servers)) = root.get_mut(keys::LDAP_SERVERS) else {
            return Ok(tree);
        };

        for server in servers.iter_mut().filter_map(ConfigNode::as_mapping_mut) {
            let Some(database) = server_database(server) else {
                continue;
            };
            let Some(object) = server.get_mut(keys::OBJECT) else {
                continue;
            };
            walk_mut(object, (), |node, _, _| {
                let Some(metric_name) = node.str_field(keys::METRIC_NAME).filter(|name| name.contains("${")) else {
                    return Ok(());
                };
                let dn = node.str_field(keys::COMPUTED_DN).unwrap_or_default();
                let expanded = self.expand(metric_name, &database, dn)?;
                trace!(database, metric_name = expanded, "expanded metric name");
                node.insert(keys::METRIC_NAME.into(), expanded.into());
                Ok(())
            })?;
        }

        Ok(tree)
    }
}
