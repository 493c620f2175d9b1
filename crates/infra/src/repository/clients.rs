use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use atelier_clients::Client;
use atelier_core::{AggregateRoot, ClientId, ExpectedVersion};

use super::{RepositoryError, check_version};

/// Client directory storage. E-mail addresses are unique.
pub trait ClientRepository: Send + Sync {
    fn insert(&self, client: Client) -> Result<(), RepositoryError>;

    /// Replace a stored client whose version still equals `expected`.
    fn update(&self, client: Client, expected: ExpectedVersion) -> Result<(), RepositoryError>;

    fn get(&self, id: ClientId) -> Result<Option<Client>, RepositoryError>;

    /// Lookup by normalised e-mail.
    fn find_by_email(&self, email: &str) -> Result<Option<Client>, RepositoryError>;

    fn list(&self) -> Result<Vec<Client>, RepositoryError>;
}

impl<R> ClientRepository for Arc<R>
where
    R: ClientRepository + ?Sized,
{
    fn insert(&self, client: Client) -> Result<(), RepositoryError> {
        (**self).insert(client)
    }

    fn update(&self, client: Client, expected: ExpectedVersion) -> Result<(), RepositoryError> {
        (**self).update(client, expected)
    }

    fn get(&self, id: ClientId) -> Result<Option<Client>, RepositoryError> {
        (**self).get(id)
    }

    fn find_by_email(&self, email: &str) -> Result<Option<Client>, RepositoryError> {
        (**self).find_by_email(email)
    }

    fn list(&self) -> Result<Vec<Client>, RepositoryError> {
        (**self).list()
    }
}

#[derive(Debug, Default)]
struct ClientTable {
    rows: HashMap<ClientId, Client>,
    by_email: HashMap<String, ClientId>,
}

/// In-memory client directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryClientRepository {
    inner: RwLock<ClientTable>,
}

impl InMemoryClientRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClientRepository for InMemoryClientRepository {
    fn insert(&self, client: Client) -> Result<(), RepositoryError> {
        let mut table = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;
        let id = client.id_typed();
        let email = client.email().to_string();

        if table.rows.contains_key(&id) {
            return Err(RepositoryError::Duplicate {
                what: "client id",
                key: id.to_string(),
            });
        }
        if table.by_email.contains_key(&email) {
            return Err(RepositoryError::Duplicate {
                what: "client e-mail",
                key: email,
            });
        }

        table.by_email.insert(email, id);
        table.rows.insert(id, client);
        Ok(())
    }

    fn update(&self, client: Client, expected: ExpectedVersion) -> Result<(), RepositoryError> {
        let mut table = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;
        let id = client.id_typed();

        let stored = table
            .rows
            .get(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("client {id}")))?;
        check_version("client", expected, stored.version())?;

        let previous_email = stored.email().to_string();
        let email = client.email().to_string();
        if email != previous_email {
            if table.by_email.contains_key(&email) {
                return Err(RepositoryError::Duplicate {
                    what: "client e-mail",
                    key: email,
                });
            }
            table.by_email.remove(&previous_email);
            table.by_email.insert(email, id);
        }

        table.rows.insert(id, client);
        Ok(())
    }

    fn get(&self, id: ClientId) -> Result<Option<Client>, RepositoryError> {
        let table = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(table.rows.get(&id).cloned())
    }

    fn find_by_email(&self, email: &str) -> Result<Option<Client>, RepositoryError> {
        let table = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(table
            .by_email
            .get(email)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    fn list(&self) -> Result<Vec<Client>, RepositoryError> {
        let table = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        let mut clients: Vec<Client> = table.rows.values().cloned().collect();
        clients.sort_by_key(|c| c.id_typed());
        Ok(clients)
    }
}
