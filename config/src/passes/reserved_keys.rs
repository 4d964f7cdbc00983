use super::{
    join_path,
    tree_label,
};
use crate::{
    node::{
        for_each_object_tree,
        key_name,
        keys,
        walk_mut,
    },
    ConfigError,
    ConfigNode,
    ConfigTransformer,
    Mapping,
};
use std::collections::HashSet;

/// Renames child objects and metrics whose key collides with a structural
/// key, e.g. an object called `children` or a metric called `description`.
///
/// Each colliding child moves to its own `childN` slot and, unless it already
/// has an explicit `name`, keeps its original key as `name` so the derived
/// metric name does not change.
pub struct ReservedKeyDisambiguation;

impl ConfigTransformer for ReservedKeyDisambiguation {
    fn name(&self) -> &'static str {
        "reserved-key-disambiguation"
    }

    fn transform(&self, mut tree: ConfigNode) -> Result<ConfigNode, ConfigError> {
        for_each_object_tree(&mut tree, |object, database| {
            let label = tree_label(database);
            walk_mut(object, (), |node, position, _| {
                for slot in [keys::OBJECT, keys::METRIC] {
                    if let Some(ConfigNode::Mapping(children)) = node.get_mut(slot) {
                        let level = join_path(&label, &join_path(position.path, slot));
                        disambiguate(children, &level);
                    }
                }
                Ok(())
            })
        })?;
        Ok(tree)
    }
}

fn disambiguate(children: &mut Mapping, level: &str) {
    let names = children.iter().filter_map(|(key, _)| key_name(key)).collect::<Vec<_>>();
    let collisions = names
        .iter()
        .filter(|name| keys::RESERVED.contains(&name.as_str()))
        .collect::<Vec<_>>();
    if collisions.is_empty() {
        return;
    }
    if collisions.len() > 1 {
        warn!(level, ?collisions, "several child names collide with reserved keys");
    }

    let taken = names.iter().map(String::as_str).collect::<HashSet<_>>();
    let mut next_slot = 1usize;
    let mut renamed = Mapping::new();
    for (key, mut child) in std::mem::take(children) {
        let reserved = key
            .as_str()
            .filter(|name| keys::RESERVED.contains(name))
            .map(str::to_string);
        let Some(original) = reserved else {
            renamed.insert(key, child);
            continue;
        };

        let slot = loop {
            let candidate = format!("child{next_slot}");
            next_slot += 1;
            if !taken.contains(candidate.as_str()) {
                break candidate;
            }
        };
        if let Some(node) = child.as_mapping_mut() {
            if !node.contains_key(keys::NAME) {
                node.insert(keys::NAME.into(), original.clone().into());
            }
        }
        debug!(level, original, slot, "renamed child that shadows a reserved key");
        renamed.insert(slot.into(), child);
    }
    *children = renamed;
}
