//! [`DirectoryClient`] backed by an `ldap3` connection.

use crate::directory::{
    AttributeValue,
    DirectoryClient,
};
use ldap3::{
    Ldap,
    LdapConnAsync,
    LdapConnSettings,
    LdapError,
    Scope,
    SearchEntry,
};
use ldap_stats_config::ConnectionConfig;
use std::{
    future::Future,
    pin::Pin,
};
use tokio::sync::Mutex;

const FILTER: &str = "(objectClass=*)";
/// `noSuchObject`
const NO_SUCH_OBJECT: u32 = 32;

/// A lazily established, reconnecting connection to one server.
///
/// The connection is opened and bound on the first query. Any protocol or
/// network error drops it, the next query reconnects.
pub struct LdapClient {
    database: String,
    connection: ConnectionConfig,
    ldap: Mutex<Option<Ldap>>,
}

impl LdapClient {
    pub fn new(database: impl Into<String>, connection: ConnectionConfig) -> Self {
        Self {
            database: database.into(),
            connection,
            ldap: Mutex::new(None),
        }
    }

    async fn connect(&self) -> Result<Ldap, LdapError> {
        let mut settings = LdapConnSettings::new().set_starttls(self.connection.start_tls);
        if let Some(timeout) = self.connection.timeout {
            settings = settings.set_conn_timeout(timeout);
        }

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.connection.server_uri).await?;
        let database = self.database.clone();
        tokio::spawn(async move {
            if let Err(err) = conn.drive().await {
                warn!(database, "LDAP connection closed: {err}");
            }
        });

        if let Some(user_dn) = &self.connection.user_dn {
            if let Some(timeout) = self.connection.timeout {
                ldap.with_timeout(timeout);
            }
            let password = self.connection.user_password.as_deref().unwrap_or_default();
            ldap.simple_bind(user_dn, password).await?.success()?;
        }

        info!(
            database = self.database,
            uri = self.connection.server_uri,
            start_tls = self.connection.start_tls,
            "connected to LDAP server"
        );
        Ok(ldap)
    }

    async fn handle(&self) -> Result<Ldap, LdapError> {
        let mut slot = self.ldap.lock().await;
        if let Some(ldap) = slot.as_ref() {
            return Ok(ldap.clone());
        }
        let ldap = self.connect().await?;
        *slot = Some(ldap.clone());
        Ok(ldap)
    }

    async fn search(&self, dn: &str, attribute: &str) -> Result<Option<Vec<AttributeValue>>, LdapError> {
        let mut ldap = self.handle().await?;
        if let Some(timeout) = self.connection.timeout {
            ldap.with_timeout(timeout);
        }

        let result = ldap.search(dn, Scope::Base, FILTER, vec![attribute]).await?;
        if result.1.rc == NO_SUCH_OBJECT {
            debug!(database = self.database, dn, "object not found");
            return Ok(None);
        }
        let (entries, _) = result.success()?;

        Ok(entries
            .into_iter()
            .next()
            .map(SearchEntry::construct)
            .and_then(|entry| attribute_values(entry, attribute)))
    }
}

/// Attribute names are case-insensitive.
fn attribute_values(entry: SearchEntry, attribute: &str) -> Option<Vec<AttributeValue>> {
    let text = entry
        .attrs
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
        .map(|(_, values)| values.into_iter().map(AttributeValue::Text).collect::<Vec<_>>());
    if text.is_some() {
        return text;
    }
    entry
        .bin_attrs
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
        .map(|(_, values)| values.into_iter().map(AttributeValue::Binary).collect())
}

impl DirectoryClient for LdapClient {
    fn query_attribute<'a>(
        &'a self,
        dn: &'a str,
        attribute: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<Vec<AttributeValue>>> + Send + 'a>> {
        Box::pin(async move {
            match self.search(dn, attribute).await {
                Ok(values) => values,
                Err(err) => {
                    warn!(database = self.database, dn, attribute, "LDAP query failed: {err}");
                    *self.ldap.lock().await = None;
                    None
                }
            }
        })
    }
}
