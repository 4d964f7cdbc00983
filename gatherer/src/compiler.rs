use crate::{
    metric_set::MetricSet,
    registry::{
        ServerIdentity,
        ServerRegistry,
    },
    statistic::{
        CompiledStatistic,
        Statistic,
    },
    CompileError,
};
use ldap_stats_config::{
    node::{
        key_name,
        keys,
        mappings,
        NodeExt as _,
    },
    AggregationKind,
    ConfigNode,
    Mapping,
    Settings,
};
use ldap_stats_exporter::{
    StatsSink,
    View,
};
use std::{
    collections::{
        HashMap,
        HashSet,
    },
    str::FromStr as _,
};
use strum::IntoEnumIterator as _;

/// Turns a fully transformed configuration tree into one [`MetricSet`] per
/// server, in configuration order.
///
/// Everything is validated, and the views are registered all at once, before
/// the first connection is registered. A rejected configuration leaves the
/// registry and the sink as they were.
pub struct MetricTreeCompiler<'a> {
    registry: &'a ServerRegistry,
    sink: &'a dyn StatsSink,
}

impl<'a> MetricTreeCompiler<'a> {
    pub fn new(registry: &'a ServerRegistry, sink: &'a dyn StatsSink) -> Self {
        Self { registry, sink }
    }

    pub fn compile(&self, tree: &ConfigNode) -> Result<Vec<MetricSet>, CompileError> {
        let settings = Settings::from_tree(tree)?;

        let mut servers = Vec::with_capacity(settings.ldap_servers.len());
        let mut views: HashMap<String, (String, View)> = HashMap::new();
        for (index, server) in settings.ldap_servers.iter().enumerate() {
            let identity = ServerIdentity::from_config(index, server)?;
            let statistics = flatten(&identity.database, server.object.as_ref())?;
            let statistics = choose(&identity.database, server.chosen_statistics.as_deref(), statistics)?;

            for statistic in &statistics {
                let view = statistic.view();
                match views.get(&view.name) {
                    Some((first, existing)) if existing != &view => {
                        return Err(CompileError::ConflictingView {
                            metric: view.name,
                            first: first.clone(),
                            second: identity.database.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        views.insert(view.name.clone(), (identity.database.clone(), view));
                    }
                }
            }
            servers.push((identity, statistics));
        }

        let mut views = views.into_values().map(|(_, view)| view).collect::<Vec<_>>();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        self.sink
            .register_views(views)
            .map_err(|source| CompileError::View { source })?;

        let metric_sets = servers
            .into_iter()
            .map(|(identity, statistics)| {
                let connection = self.registry.get_or_create(&identity);
                MetricSet::new(identity, connection, statistics)
            })
            .collect::<Vec<_>>();

        info!(
            servers = metric_sets.len(),
            statistics = metric_sets.iter().map(|set| set.statistics().len()).sum::<usize>(),
            "compiled metric tree"
        );
        Ok(metric_sets)
    }
}

/// Every statistic of one server object tree in pre-order.
fn flatten(database: &str, object: Option<&ConfigNode>) -> Result<Vec<Statistic>, CompileError> {
    let mut seen = HashSet::new();
    let mut statistics = Vec::new();
    for node in object.into_iter().flat_map(mappings) {
        let Some(compiled) = compile_node(node)? else {
            continue;
        };
        if !seen.insert(compiled.metric_name.clone()) {
            return Err(CompileError::DuplicateMetric {
                database: database.to_string(),
                metric: compiled.metric_name,
            });
        }
        trace!(database, metric = compiled.metric_name, dn = compiled.distinguished_name, "statistic");
        statistics.push(Statistic::new(compiled));
    }
    Ok(statistics)
}

/// Nodes lacking any of the four binding fields are structural.
fn compile_node(node: &Mapping) -> Result<Option<CompiledStatistic>, CompileError> {
    let non_empty = |key| node.str_field(key).filter(|value| !value.is_empty());
    let (Some(dn), Some(metric_name), Some(attribute), Some(unit)) = (
        node.str_field(keys::COMPUTED_DN),
        non_empty(keys::METRIC_NAME),
        non_empty(keys::ATTRIBUTE),
        node.get(keys::UNIT).and_then(key_name),
    ) else {
        return Ok(None);
    };

    let aggregation = match node.get(keys::AGGREGATION).and_then(key_name) {
        None => AggregationKind::default(),
        Some(value) => AggregationKind::from_str(&value).map_err(|_| CompileError::UnknownAggregation {
            metric: metric_name.to_string(),
            value,
            expected: AggregationKind::iter()
                .map(|kind| kind.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })?,
    };

    Ok(Some(CompiledStatistic {
        distinguished_name: dn.to_string(),
        metric_name: metric_name.to_string(),
        attribute: attribute.to_string(),
        unit,
        description: node.str_field(keys::DESCRIPTION).unwrap_or_default().to_string(),
        aggregation,
    }))
}

fn choose(database: &str, chosen: Option<&[String]>, statistics: Vec<Statistic>) -> Result<Vec<Statistic>, CompileError> {
    let Some(chosen) = chosen else {
        return Ok(statistics);
    };
    if let Some(unknown) = chosen
        .iter()
        .find(|name| !statistics.iter().any(|statistic| statistic.metric_name() == name.as_str()))
    {
        return Err(CompileError::UnknownChosenStatistic {
            database: database.to_string(),
            metric: unknown.clone(),
        });
    }
    Ok(statistics
        .into_iter()
        .filter(|statistic| chosen.iter().any(|name| name == statistic.metric_name()))
        .collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::RecordingSink;
    use ldap_stats_config::TransformPipeline;
    use ldap_stats_exporter::ViewStore;
    use pretty_assertions::assert_eq;

    fn tree(yaml: &str) -> ConfigNode {
        TransformPipeline::standard().run(serde_yml::from_str(yaml).unwrap()).unwrap()
    }

    fn compile(yaml: &str) -> (Result<Vec<MetricSet>, CompileError>, ServerRegistry, RecordingSink) {
        let registry = ServerRegistry::default();
        let sink = RecordingSink::default();
        let result = MetricTreeCompiler::new(&registry, &sink).compile(&tree(yaml));
        (result, registry, sink)
    }

    const MONITOR: &str = r#"
        ldapServers:
          - database: db1
            connection: { serverUri: "ldap://localhost:389" }
        object:
          rdn: cn=Monitor
          object:
            connections:
              rdn: cn=Connections
              object:
                current:
                  rdn: cn=Current
                  metric:
                    count: { attribute: monitorCounter, unit: "1", description: Open connections }
                total:
                  rdn: cn=Total
                  metric:
                    count: { attribute: monitorCounter, unit: "1", aggregation: sum }
            structural:
              description: no rdn, no attribute
    "#;

    #[test]
    fn flattens_the_tree_in_order() {
        let (result, registry, sink) = compile(MONITOR);
        let sets = result.unwrap();

        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].database(), "db1");
        let compiled = sets[0].statistics().iter().map(|s| s.compiled().clone()).collect::<Vec<_>>();
        assert_eq!(
            compiled,
            vec![
                CompiledStatistic {
                    distinguished_name: "cn=Current,cn=Connections,cn=Monitor".to_string(),
                    metric_name: "connections/current/count".to_string(),
                    attribute: "monitorCounter".to_string(),
                    unit: "1".to_string(),
                    description: "Open connections".to_string(),
                    aggregation: AggregationKind::LastValue,
                },
                CompiledStatistic {
                    distinguished_name: "cn=Total,cn=Connections,cn=Monitor".to_string(),
                    metric_name: "connections/total/count".to_string(),
                    attribute: "monitorCounter".to_string(),
                    unit: "1".to_string(),
                    description: String::new(),
                    aggregation: AggregationKind::Sum,
                },
            ]
        );
        assert_eq!(
            sink.view_names(),
            vec!["connections/current/count".to_string(), "connections/total/count".to_string()]
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn numeric_units_are_accepted() {
        let (result, ..) = compile(
            r#"
            ldapServers: [{ database: db1, connection: { serverUri: "ldap://localhost" } }]
            object: { rdn: cn=Monitor, metric: { threads: { attribute: monitoredInfo, unit: 1 } } }
            "#,
        );
        assert_eq!(result.unwrap()[0].statistics()[0].compiled().unit, "1");
    }

    #[test]
    fn duplicate_metric_names_are_rejected() {
        let (result, registry, sink) = compile(
            r#"
            ldapServers: [{ database: db1, connection: { serverUri: "ldap://localhost" } }]
            object:
              rdn: cn=Monitor
              object:
                a: { rdn: cn=A, name: same, metric: { x: { attribute: x, unit: "1" } } }
                b: { rdn: cn=B, name: same, metric: { x: { attribute: x, unit: "1" } } }
            "#,
        );

        match result {
            Err(CompileError::DuplicateMetric { database, metric }) => {
                assert_eq!(database, "db1");
                assert_eq!(metric, "same/x");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(registry.is_empty());
        assert!(sink.view_names().is_empty());
    }

    #[test]
    fn missing_connection_is_rejected() {
        let (result, ..) = compile("ldapServers: [{ database: db1 }]");
        assert!(matches!(result, Err(CompileError::MissingConnection { database }) if database == "db1"));
    }

    #[test]
    fn chosen_statistics_filter_the_set() {
        let (result, ..) = compile(&MONITOR.replace(
            r#"connection: { serverUri: "ldap://localhost:389" }"#,
            r#"connection: { serverUri: "ldap://localhost:389" }
            chosenStatistics: [connections/total/count]"#,
        ));
        let sets = result.unwrap();
        let names = sets[0].statistics().iter().map(|s| s.metric_name().to_string()).collect::<Vec<_>>();
        assert_eq!(names, vec!["connections/total/count".to_string()]);
    }

    #[test]
    fn chosen_statistics_match_camel_case_metric_keys() {
        let (result, ..) = compile(
            r#"
            ldapServers:
              - database: db1
                connection: { serverUri: "ldap://localhost" }
                chosenStatistics: [currentConnections]
            object:
              rdn: cn=Monitor
              metric:
                currentConnections: { attribute: monitorCounter, unit: "1" }
                totalConnections: { attribute: monitorCounter, unit: "1" }
            "#,
        );
        let sets = result.unwrap();
        let names = sets[0].statistics().iter().map(|s| s.metric_name().to_string()).collect::<Vec<_>>();
        assert_eq!(names, vec!["currentConnections".to_string()]);
    }

    #[test]
    fn unknown_chosen_statistic_is_rejected() {
        let (result, ..) = compile(&MONITOR.replace(
            r#"connection: { serverUri: "ldap://localhost:389" }"#,
            r#"connection: { serverUri: "ldap://localhost:389" }
            chosenStatistics: [nope]"#,
        ));
        assert!(matches!(result, Err(CompileError::UnknownChosenStatistic { metric, .. }) if metric == "nope"));
    }

    #[test]
    fn unknown_aggregation_is_rejected() {
        let (result, ..) = compile(&MONITOR.replace("aggregation: sum", "aggregation: average"));
        match result {
            Err(CompileError::UnknownAggregation { value, expected, .. }) => {
                assert_eq!(value, "average");
                assert_eq!(expected, "last_value, sum, count");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn views_the_sink_rejects_fail_the_compilation() {
        let registry = ServerRegistry::default();
        let store = ViewStore::new();
        let result = MetricTreeCompiler::new(&registry, &store).compile(&tree(
            r#"
            ldapServers: [{ database: db1, connection: { serverUri: "ldap://localhost" } }]
            object:
              rdn: cn=Monitor
              metric:
                ops.total: { attribute: a, unit: "1" }
                ops_total: { attribute: b, unit: "1" }
            "#,
        ));

        assert!(matches!(result, Err(CompileError::View { .. })), "{result:?}");
        assert!(registry.is_empty());
        assert!(store.views().is_empty());
    }

    #[test]
    fn conflicting_definitions_across_servers_are_rejected() {
        let (result, ..) = compile(
            r#"
            ldapServers:
              - database: db1
                connection: { serverUri: "ldap://a" }
                object: { rdn: cn=Monitor, metric: { x: { attribute: x, unit: "1" } } }
              - database: db2
                connection: { serverUri: "ldap://b" }
                object: { rdn: cn=Monitor, metric: { x: { attribute: x, unit: "ms" } } }
            "#,
        );
        assert!(matches!(
            result,
            Err(CompileError::ConflictingView { metric, first, second })
                if metric == "x" && first == "db1" && second == "db2"
        ));
    }
}
