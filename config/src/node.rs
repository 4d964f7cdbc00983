//! The configuration tree.
//!
//! A [`ConfigNode`] is the YAML value read from the configuration file. YAML
//! mappings keep insertion order, which keeps logs and compiled metric order
//! stable, but sibling order carries no meaning.

use crate::ConfigError;
pub use serde_yml::{
    Mapping,
    Value as ConfigNode,
};

/// Structural key names after key normalization.
pub mod keys {
    pub const RDN: &str = "rdn";
    pub const NAME: &str = "name";
    pub const ATTRIBUTE: &str = "attribute";
    pub const UNIT: &str = "unit";
    pub const DESCRIPTION: &str = "description";
    pub const AGGREGATION: &str = "aggregation";
    pub const OBJECT: &str = "object";
    pub const METRIC: &str = "metric";
    pub const CHILDREN: &str = "children";
    pub const COMPUTED_DN: &str = "computed_dn";
    pub const METRIC_NAME: &str = "metric_name";

    pub const LDAP_SERVERS: &str = "ldap_servers";
    pub const DATABASE: &str = "database";
    pub const CONNECTION: &str = "connection";
    pub const SERVER_URI: &str = "server_uri";
    pub const DN_ROOT: &str = "dn_root";

    /// Keys a user-chosen child name must not shadow.
    pub const RESERVED: &[&str] = &[
        RDN,
        NAME,
        ATTRIBUTE,
        UNIT,
        DESCRIPTION,
        AGGREGATION,
        OBJECT,
        METRIC,
        CHILDREN,
        COMPUTED_DN,
        METRIC_NAME,
    ];
}

/// Field accessors shared by the transformation passes and the compiler.
pub trait NodeExt {
    /// The string value stored under `key`, if it is a string.
    fn str_field(&self, key: &str) -> Option<&str>;

    /// Whether `key` holds a non-empty string.
    fn declares(&self, key: &str) -> bool {
        self.str_field(key).is_some_and(|value| !value.is_empty())
    }

    /// Nodes declaring `rdn` or `attribute` describe something to query.
    fn is_queryable(&self) -> bool {
        self.declares(keys::RDN) || self.declares(keys::ATTRIBUTE)
    }
}

impl NodeExt for Mapping {
    fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ConfigNode::as_str)
    }
}

/// Renders a mapping key as a string. Numeric and boolean keys are allowed
/// so that `1:` or `true:` can name an object.
pub fn key_name(key: &ConfigNode) -> Option<String> {
    match key {
        ConfigNode::String(name) => Some(name.clone()),
        ConfigNode::Number(number) => Some(number.to_string()),
        ConfigNode::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// The logical server name of an `ldap_servers` entry: `database`, falling
/// back to the connection URI.
pub fn server_database(server: &Mapping) -> Option<String> {
    if let Some(database) = server.str_field(keys::DATABASE).filter(|name| !name.is_empty()) {
        return Some(database.to_string());
    }
    server
        .get(keys::CONNECTION)
        .and_then(ConfigNode::as_mapping)
        .and_then(|connection| connection.str_field(keys::SERVER_URI))
        .map(str::to_string)
}

/// Pre-order iterator over every mapping below a node, driven by an explicit
/// work list.
pub struct Mappings<'a> {
    stack: Vec<&'a ConfigNode>,
}

impl<'a> Iterator for Mappings<'a> {
    type Item = &'a Mapping;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            match node {
                ConfigNode::Mapping(mapping) => {
                    let children = mapping
                        .iter()
                        .map(|(_, child)| child)
                        .filter(|child| child.is_mapping() || child.is_sequence())
                        .collect::<Vec<_>>();
                    self.stack.extend(children.into_iter().rev());
                    return Some(mapping);
                }
                ConfigNode::Sequence(items) => self.stack.extend(items.iter().rev()),
                _ => {}
            }
        }
        None
    }
}

/// Every mapping in `root`, parents before children.
pub fn mappings(root: &ConfigNode) -> Mappings<'_> {
    Mappings { stack: vec![root] }
}

/// The `ldap_servers` entries of a configuration tree.
pub fn server_entries(tree: &ConfigNode) -> impl Iterator<Item = &Mapping> {
    tree.get(keys::LDAP_SERVERS)
        .and_then(ConfigNode::as_sequence)
        .into_iter()
        .flatten()
        .filter_map(ConfigNode::as_mapping)
}

/// Where the walker currently is.
#[derive(Debug)]
pub(crate) struct Position<'p> {
    /// The key this node is nested under. Sequence items inherit the key of
    /// their sequence.
    pub key: Option<&'p str>,
    /// `/`-joined keys from the walk root, for error messages.
    pub path: &'p str,
}

struct Frame<'a, C> {
    node: &'a mut ConfigNode,
    key: Option<String>,
    path: String,
    ctx: C,
}

/// Depth-first pre-order walk over every mapping below `root`, without
/// recursion.
///
/// `visit` sees each mapping before its children and returns the context its
/// children inherit. Sequences are transparent: their items get the
/// sequence's own context and key.
pub(crate) fn walk_mut<C, F>(root: &mut ConfigNode, ctx: C, mut visit: F) -> Result<(), ConfigError>
where
    C: Clone,
    F: FnMut(&mut Mapping, &Position<'_>, &C) -> Result<C, ConfigError>,
{
    let mut stack = vec![Frame {
        node: root,
        key: None,
        path: String::new(),
        ctx,
    }];

    while let Some(Frame { node, key, path, ctx }) = stack.pop() {
        match node {
            ConfigNode::Mapping(mapping) => {
                let position = Position {
                    key: key.as_deref(),
                    path: &path,
                };
                let child_ctx = visit(mapping, &position, &ctx)?;

                let children = mapping
                    .iter_mut()
                    .filter(|(_, child)| child.is_mapping() || child.is_sequence())
                    .collect::<Vec<_>>();
                for (child_key, child) in children.into_iter().rev() {
                    let child_key = key_name(child_key);
                    let child_path = match (&child_key, path.is_empty()) {
                        (Some(child_key), true) => child_key.clone(),
                        (Some(child_key), false) => format!("{path}/{child_key}"),
                        (None, _) => path.clone(),
                    };
                    stack.push(Frame {
                        node: child,
                        key: child_key,
                        path: child_path,
                        ctx: child_ctx.clone(),
                    });
                }
            }
            ConfigNode::Sequence(items) => {
                for (index, item) in items.iter_mut().enumerate().rev() {
                    stack.push(Frame {
                        node: item,
                        key: key.clone(),
                        path: format!("{path}[{index}]"),
                        ctx: ctx.clone(),
                    });
                }
            }
            _ => {}
        }
    }

    Ok(())
}

/// Applies `f` to the `object` tree of every `ldap_servers` entry and to the
/// shared top-level `object`, if present.
pub(crate) fn for_each_object_tree<F>(tree: &mut ConfigNode, mut f: F) -> Result<(), ConfigError>
where
    F: FnMut(&mut ConfigNode, Option<&str>) -> Result<(), ConfigError>,
{
    let Some(root) = tree.as_mapping_mut() else {
        return Err(ConfigError::NotAMapping);
    };

    if let Some(object) = root.get_mut(keys::OBJECT) {
        f(object, None)?;
    }

    if let Some(ConfigNode::Sequence(servers)) = root.get_mut(keys::LDAP_SERVERS) {
        for server in servers.iter_mut() {
            let Some(server) = server.as_mapping_mut() else {
                continue;
            };
            let database = server_database(server);
            if let Some(object) = server.get_mut(keys::OBJECT) {
                f(object, database.as_deref())?;
            }
        }
    }

    Ok(())
}
