use super::{
    join_path,
    tree_label,
};
use crate::{
    node::{
        for_each_object_tree,
        keys,
        walk_mut,
        NodeExt as _,
    },
    ConfigError,
    ConfigNode,
    ConfigTransformer,
};

/// Computes `computed_dn` for every node that declares `rdn` or `attribute`.
///
/// A node's DN is its `rdn` followed by the DN of the nearest enclosing node
/// that has one. Attribute-only nodes query the DN they inherit. The walk is
/// seeded with the top-level `dn_root`, if any.
pub struct DistinguishedNames;

#[derive(Clone)]
struct Suffix {
    dn: String,
    /// Whether an `rdn` was declared on the path so far.
    anchored: bool,
}

impl ConfigTransformer for DistinguishedNames {
    fn name(&self) -> &'static str {
        "distinguished-names"
    }

    fn transform(&self, mut tree: ConfigNode) -> Result<ConfigNode, ConfigError> {
        let dn_root = tree
            .get(keys::DN_ROOT)
            .and_then(ConfigNode::as_str)
            .unwrap_or_default()
            .to_string();

        for_each_object_tree(&mut tree, |object, database| {
            let label = tree_label(database);
            let root = Suffix {
                dn: dn_root.clone(),
                anchored: false,
            };
            walk_mut(object, root, |node, position, parent| {
                if !node.is_queryable() {
                    return Ok(parent.clone());
                }

                let own = match node.str_field(keys::RDN).filter(|rdn| !rdn.is_empty()) {
                    Some(rdn) => Suffix {
                        dn: join_dn(rdn, &parent.dn),
                        anchored: true,
                    },
                    None if !parent.anchored && !dn_root.is_empty() => {
                        return Err(ConfigError::AttributeWithoutObject {
                            path: join_path(&label, position.path),
                            attribute: node.str_field(keys::ATTRIBUTE).unwrap_or_default().to_string(),
                        });
                    }
                    None => parent.clone(),
                };
                node.insert(keys::COMPUTED_DN.into(), own.dn.clone().into());
                Ok(own)
            })
        })?;

        Ok(tree)
    }
}

fn join_dn(rdn: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        rdn.to_string()
    } else {
        format!("{rdn},{suffix}")
    }
}
