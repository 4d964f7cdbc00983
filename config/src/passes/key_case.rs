use crate::{
    node::{
        keys,
        walk_mut,
    },
    ConfigError,
    ConfigNode,
    ConfigTransformer,
    Mapping,
};

/// Rewrites `camelCase` keys to `snake_case`, at every depth. Values are left
/// untouched, so `attribute: monitorCounter` keeps its casing, and so are the
/// user-chosen child names under a node's `object` and `metric`, which
/// metric names and `chosenStatistics` refer to.
#[derive(Debug, Default)]
pub struct KeyNormalization;

impl KeyNormalization {
    pub fn new() -> Self {
        Self
    }

    fn normalize(&self, key: ConfigNode) -> ConfigNode {
        match key {
            ConfigNode::String(key) => ConfigNode::String(snake_case(&key)),
            other => other,
        }
    }
}

/// Only a lower-to-upper transition starts a new word, so `dc=example` and
/// `conns2` survive unchanged.
fn snake_case(key: &str) -> String {
    let mut snake = String::with_capacity(key.len() + 4);
    let mut previous_lower = false;
    for c in key.chars() {
        if c.is_uppercase() && previous_lower {
            snake.push('_');
        }
        previous_lower = c.is_lowercase();
        snake.extend(c.to_lowercase());
    }
    snake
}

/// What the keys of a mapping are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Settings,
    Node,
    ChildNames,
}

impl Role {
    fn of(parent: Role, key: Option<&str>) -> Self {
        match (parent, key) {
            (Role::ChildNames, _) => Role::Node,
            (Role::Settings, Some(keys::OBJECT)) => Role::Node,
            (Role::Settings, _) => Role::Settings,
            (Role::Node, Some(keys::OBJECT | keys::METRIC)) => Role::ChildNames,
            (Role::Node, _) => Role::Node,
        }
    }
}

impl ConfigTransformer for KeyNormalization {
    fn name(&self) -> &'static str {
        "key-normalization"
    }

    fn transform(&self, mut tree: ConfigNode) -> Result<ConfigNode, ConfigError> {
        walk_mut(&mut tree, Role::Settings, |mapping, position, parent| {
            let role = Role::of(*parent, position.key);
            if role == Role::ChildNames {
                return Ok(role);
            }

            let mut normalized = Mapping::new();
            for (key, value) in std::mem::take(mapping) {
                let key = self.normalize(key);
                if normalized.contains_key(&key) {
                    warn!(
                        path = position.path,
                        key = ?key,
                        "two keys normalize to the same name, the later one wins"
                    );
                }
                normalized.insert(key, value);
            }
            *mapping = normalized;
            Ok(role)
        })?;
        Ok(tree)
    }
}
