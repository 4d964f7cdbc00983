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

const SEPARATOR: char = '/';

/// Computes `metric_name` for every node that declares `rdn` or `attribute`.
///
/// The name is the `/`-joined path of the enclosing named nodes plus the
/// node's own name: its `name` field, else the key it is nested under. The
/// top-level object has no key, so without a `name` it contributes nothing.
pub struct MetricNames;

impl ConfigTransformer for MetricNames {
    fn name(&self) -> &'static str {
        "metric-names"
    }

    fn transform(&self, mut tree: ConfigNode) -> Result<ConfigNode, ConfigError> {
        for_each_object_tree(&mut tree, |object, _| {
            walk_mut(object, String::new(), |node, position, prefix| {
                if !node.is_queryable() {
                    return Ok(prefix.clone());
                }

                let own = node
                    .str_field(keys::NAME)
                    .or(position.key)
                    .unwrap_or_default();
                let metric_name = join_name(prefix, own);
                node.insert(keys::METRIC_NAME.into(), metric_name.clone().into());
                Ok(metric_name)
            })
        })?;
        Ok(tree)
    }
}

fn join_name(prefix: &str, own: &str) -> String {
    match (prefix.is_empty(), own.is_empty()) {
        (true, _) => own.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}{SEPARATOR}{own}"),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(yaml: &str) -> ConfigNode {
        MetricNames.transform(serde_yml::from_str(yaml).unwrap()).unwrap()
    }

    #[test]
    fn top_level_object_contributes_no_prefix() {
        let tree = run("object: { rdn: 'dc=example,dc=com', metric: { conns: { attribute: currentconnections, unit: '1' } } }");
        assert_eq!(tree["object"]["metric_name"].as_str(), Some(""));
        assert_eq!(tree["object"]["metric"]["conns"]["metric_name"].as_str(), Some("conns"));
    }

    #[test]
    fn names_follow_the_object_path() {
        let tree = run(
            r#"
            ldap_servers:
              - database: db1
                object:
                  rdn: cn=Monitor
                  object:
                    operations:
                      rdn: cn=Operations
                      object:
                        bind:
                          rdn: cn=Bind
                          name: binds
                          metric:
                            completed: { attribute: monitorOpCompleted, unit: "1" }
            "#,
        );

        let operations = &tree["ldap_servers"][0]["object"]["object"]["operations"];
        assert_eq!(operations["metric_name"].as_str(), Some("operations"));
        assert_eq!(
            operations["object"]["bind"]["metric"]["completed"]["metric_name"].as_str(),
            Some("operations/binds/completed")
        );
    }

    #[test]
    fn renaming_a_parent_only_changes_the_prefix() {
        let leaf_name = |parent: &str| {
            let tree = run(&format!(
                "object: {{ object: {{ {parent}: {{ rdn: cn=X, metric: {{ hits: {{ attribute: a, unit: '1' }} }} }} }} }}"
            ));
            tree["object"]["object"][parent]["metric"]["hits"]["metric_name"]
                .as_str()
                .unwrap()
                .to_string()
        };

        assert_eq!(leaf_name("first"), "first/hits");
        assert_eq!(leaf_name("second"), "second/hits");
    }

    #[test]
    fn structural_nodes_pass_the_prefix_through() {
        let tree = run(
            r#"
            object:
              object:
                group:
                  description: no rdn here
                  metric:
                    total: { attribute: a, unit: "1" }
            "#,
        );
        let group = &tree["object"]["object"]["group"];
        assert!(group.get("metric_name").is_none());
        assert_eq!(group["metric"]["total"]["metric_name"].as_str(), Some("total"));
    }
}
