use crate::{
    directory::DirectoryClient,
    ldap::LdapClient,
    CompileError,
};
use ldap_stats_config::{
    ConnectionConfig,
    ServerConfig,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        PoisonError,
    },
};

pub type ConnectionHandle = Arc<dyn DirectoryClient>;

/// A logical server name with the parameters used to reach it.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerIdentity {
    pub database: String,
    pub connection: ConnectionConfig,
}

impl ServerIdentity {
    pub fn from_config(index: usize, server: &ServerConfig) -> Result<Self, CompileError> {
        let database = server
            .database()
            .ok_or(CompileError::UnnamedServer { index })?
            .to_string();
        let connection = server
            .connection
            .clone()
            .ok_or_else(|| CompileError::MissingConnection {
                database: database.clone(),
            })?;
        Ok(Self { database, connection })
    }
}

/// Creates the client for a newly registered server.
pub trait Connector: Send + Sync {
    fn connect(&self, identity: &ServerIdentity) -> ConnectionHandle;
}

pub struct LdapConnector;

impl Connector for LdapConnector {
    fn connect(&self, identity: &ServerIdentity) -> ConnectionHandle {
        Arc::new(LdapClient::new(identity.database.clone(), identity.connection.clone()))
    }
}

struct Registered {
    identity: ServerIdentity,
    handle: ConnectionHandle,
}

/// Holds exactly one connection per logical server name.
///
/// Clients connect lazily, so registering never performs I/O and the lock
/// is never held across a network call.
pub struct ServerRegistry {
    connector: Box<dyn Connector>,
    servers: Mutex<HashMap<String, Registered>>,
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new(LdapConnector)
    }
}

impl ServerRegistry {
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            servers: Mutex::new(HashMap::new()),
        }
    }

    /// The connection registered under `identity.database`, created on first
    /// use. Later identities with the same name but other parameters get the
    /// first connection.
    pub fn get_or_create(&self, identity: &ServerIdentity) -> ConnectionHandle {
        let mut servers = self.servers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(registered) = servers.get(&identity.database) {
            if registered.identity.connection != identity.connection {
                warn!(
                    database = identity.database,
                    "server already registered with other connection parameters, keeping the first"
                );
            }
            return registered.handle.clone();
        }

        info!(database = identity.database, uri = identity.connection.server_uri, "registered server");
        let handle = self.connector.connect(identity);
        servers.insert(
            identity.database.clone(),
            Registered {
                identity: identity.clone(),
                handle: handle.clone(),
            },
        );
        handle
    }

    pub fn get(&self, database: &str) -> Option<ConnectionHandle> {
        self.servers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(database)
            .map(|registered| registered.handle.clone())
    }

    pub fn len(&self) -> usize {
        self.servers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
