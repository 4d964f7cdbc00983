//! Typed view of a normalized configuration tree.
//!
//! Keys are the `snake_case` names produced by key normalization; the file
//! itself may use `ldapServers`, `serverUri` and so on. The per-server
//! `object` trees stay untyped [`ConfigNode`]s for the compiler.

use crate::{
    ConfigError,
    ConfigNode,
};
use serde::{
    de::Error as _,
    Deserialize,
    Deserializer,
};
use std::{
    net::IpAddr,
    time::Duration,
};
use strum::{
    Display,
    EnumString,
};

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub ldap_servers: Vec<ServerConfig>,
    #[serde(default)]
    pub exporters: Vec<ExporterConfig>,
    #[serde(default = "default_period", deserialize_with = "deserialize_period")]
    pub period: Duration,
    #[serde(default)]
    pub dn_root: String,
    #[serde(default = "default_true")]
    pub interpolate_metric_names: bool,
    #[serde(default)]
    pub parallel_collection: bool,
    #[serde(default)]
    pub log_config: Option<LogConfig>,
}

impl Settings {
    pub fn from_tree(tree: &ConfigNode) -> Result<Self, ConfigError> {
        let settings: Self = serde_yml::from_value(tree.clone()).map_err(ConfigError::Invalid)?;

        if settings.period.is_zero() {
            return Err(ConfigError::Period {
                value: "0".to_string(),
                reason: "the collection period must be positive".to_string(),
            });
        }
        for server in &settings.ldap_servers {
            if let Some(connection) = &server.connection {
                url::Url::parse(&connection.server_uri).map_err(|source| ConfigError::InvalidUri {
                    database: server.database().unwrap_or_default().to_string(),
                    uri: connection.server_uri.clone(),
                    source,
                })?;
            }
        }

        Ok(settings)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub connection: Option<ConnectionConfig>,
    /// Restricts the server to these metric names. All metrics when absent.
    #[serde(default)]
    pub chosen_statistics: Option<Vec<String>>,
    #[serde(default)]
    pub object: Option<ConfigNode>,
}

impl ServerConfig {
    /// The logical server name; the server URI if no `database` is given.
    pub fn database(&self) -> Option<&str> {
        self.database
            .as_deref()
            .filter(|database| !database.is_empty())
            .or_else(|| self.connection.as_ref().map(|c| c.server_uri.as_str()))
    }
}

#[derive(Clone, PartialEq, Deserialize)]
pub struct ConnectionConfig {
    pub server_uri: String,
    #[serde(default)]
    pub user_dn: Option<String>,
    #[serde(default)]
    pub user_password: Option<String>,
    #[serde(default)]
    pub start_tls: bool,
    /// Network timeout. Zero or negative values (such as `-1`) disable it.
    #[serde(default, deserialize_with = "deserialize_timeout")]
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("server_uri", &self.server_uri)
            .field("user_dn", &self.user_dn)
            .field("user_password", &self.user_password.as_ref().map(|_| "<redacted>"))
            .field("start_tls", &self.start_tls)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "name", content = "options")]
pub enum ExporterConfig {
    Prometheus(PrometheusOptions),
    Stackdriver(StackdriverOptions),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PrometheusOptions {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_address")]
    pub address: IpAddr,
}

impl Default for PrometheusOptions {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            port: default_port(),
            address: default_address(),
        }
    }
}

#[derive(Clone, PartialEq, Deserialize)]
pub struct StackdriverOptions {
    pub project_id: String,
    /// API base URL, `https://monitoring.googleapis.com` when absent.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_metric_prefix")]
    pub metric_prefix: String,
}

impl std::fmt::Debug for StackdriverOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackdriverOptions")
            .field("project_id", &self.project_id)
            .field("endpoint", &self.endpoint)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("metric_prefix", &self.metric_prefix)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// `EnvFilter` directives, e.g. `ldap_stats=debug,ldap3=warn`. Takes
    /// precedence over `level`.
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_true")]
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            filter: None,
            format: LogFormat::default(),
            ansi: true,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, Display, EnumString, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
}

fn default_period() -> Duration {
    DEFAULT_PERIOD
}

fn default_true() -> bool {
    true
}

fn default_namespace() -> String {
    "openldap".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_address() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_metric_prefix() -> String {
    "custom.googleapis.com/openldap".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Seconds {
    Whole(u64),
    Fractional(f64),
    Text(String),
}

fn deserialize_period<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    match Seconds::deserialize(deserializer)? {
        Seconds::Whole(seconds) => Ok(Duration::from_secs(seconds)),
        Seconds::Fractional(seconds) => Duration::try_from_secs_f64(seconds)
            .map_err(|_| D::Error::custom(format!("invalid period '{seconds}': expected a positive number of seconds"))),
        Seconds::Text(text) => humantime::parse_duration(&text)
            .map_err(|error| D::Error::custom(format!("invalid period '{text}': {error}"))),
    }
}

fn deserialize_timeout<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
    let Some(seconds) = Option::<f64>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if seconds <= 0.0 {
        return Ok(None);
    }
    Duration::try_from_secs_f64(seconds)
        .map(Some)
        .map_err(|_| D::Error::custom(format!("invalid timeout '{seconds}'")))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::TransformPipeline;
    use pretty_assertions::assert_eq;

    fn settings(yaml: &str) -> Result<Settings, ConfigError> {
        let tree = TransformPipeline::standard().run(serde_yml::from_str(yaml).unwrap())?;
        Settings::from_tree(&tree)
    }

    #[test]
    fn camel_case_file_with_defaults() {
        let settings = settings(
            r#"
            ldapServers:
              - database: db1
                connection:
                  serverUri: ldap://localhost:389
                  userDn: cn=admin,dc=example,dc=com
                  userPassword: secret
                  startTls: true
                  timeout: -1
                chosenStatistics: [conns]
            exporters:
              - name: Prometheus
                options: { port: 9100 }
            "#,
        )
        .unwrap();

        assert_eq!(settings.period, DEFAULT_PERIOD);
        assert!(settings.interpolate_metric_names);
        assert!(!settings.parallel_collection);

        let server = &settings.ldap_servers[0];
        assert_eq!(server.database(), Some("db1"));
        assert_eq!(server.chosen_statistics.as_deref(), Some(&["conns".to_string()][..]));
        let connection = server.connection.as_ref().unwrap();
        assert!(connection.start_tls);
        assert_eq!(connection.timeout, None);
        assert!(!format!("{connection:?}").contains("secret"));

        assert_eq!(
            settings.exporters,
            vec![ExporterConfig::Prometheus(PrometheusOptions {
                port: 9100,
                ..PrometheusOptions::default()
            })]
        );
    }

    #[test]
    fn period_accepts_seconds_and_humantime() {
        assert_eq!(settings("period: 30").unwrap().period, Duration::from_secs(30));
        assert_eq!(settings("period: 1.5").unwrap().period, Duration::from_millis(1500));
        assert_eq!(settings("period: 2m").unwrap().period, Duration::from_secs(120));
        assert!(matches!(settings("period: 0"), Err(ConfigError::Period { .. })));
        assert!(settings("period: soon").is_err());
    }

    #[test]
    fn unknown_exporter_is_rejected() {
        let error = settings("exporters: [{ name: Graphite, options: {} }]").unwrap_err();
        assert!(error.to_string().contains("Invalid configuration"), "{error}");
    }

    #[test]
    fn prometheus_options_have_defaults() {
        let settings = settings("exporters: [{ name: Prometheus, options: {} }]").unwrap();
        assert_eq!(settings.exporters, vec![ExporterConfig::Prometheus(PrometheusOptions::default())]);
    }

    #[test]
    fn stackdriver_options() {
        let settings = settings(
            "exporters: [{ name: Stackdriver, options: { projectId: my-project, accessToken: t0k3n } }]",
        )
        .unwrap();
        let ExporterConfig::Stackdriver(options) = &settings.exporters[0] else {
            panic!("expected a Stackdriver exporter");
        };
        assert_eq!(options.project_id, "my-project");
        assert_eq!(options.metric_prefix, "custom.googleapis.com/openldap");
        assert!(!format!("{options:?}").contains("t0k3n"));
    }

    #[test]
    fn database_defaults_to_server_uri() {
        let settings = settings("ldapServers: [{ connection: { serverUri: 'ldap://ldap.example.com' } }]").unwrap();
        assert_eq!(settings.ldap_servers[0].database(), Some("ldap://ldap.example.com"));
    }

    #[test]
    fn invalid_server_uri_is_rejected() {
        let error = settings("ldapServers: [{ database: db1, connection: { serverUri: 'not a uri' } }]").unwrap_err();
        assert!(matches!(error, ConfigError::InvalidUri { database, .. } if database == "db1"));
    }

    #[test]
    fn log_config() {
        let settings = settings("logConfig: { level: debug, format: compact, ansi: false }").unwrap();
        assert_eq!(
            settings.log_config,
            Some(LogConfig {
                level: "debug".to_string(),
                filter: None,
                format: LogFormat::Compact,
                ansi: false,
            })
        );
    }
}
