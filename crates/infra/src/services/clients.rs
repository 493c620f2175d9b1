use std::collections::BTreeSet;

use chrono::Utc;

use atelier_auth::{AccessScope, Caller, OwnerFilter, Permission};
use atelier_clients::{
    AssignShops, Client, ClientCommand, ClientProfile, ClientRole, RegisterClient, SetPricingTier,
    VerifyClient, normalize_email,
};
use atelier_core::{Aggregate, AggregateRoot, ClientId, DomainError, ExpectedVersion};
use atelier_pricing::Tier;

use super::{ServiceContext, ServiceResult};

const AGGREGATE_TYPE: &str = "clients.client";

/// Client directory operations.
#[derive(Debug, Clone)]
pub struct ClientService {
    ctx: ServiceContext,
}

impl ClientService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Public self-registration: an unverified shop at `Tier1`.
    pub fn register_client(&self, profile: ClientProfile) -> ServiceResult<Client> {
        let client = self.register(profile, ClientRole::default(), false)?;
        tracing::info!(client_id = %client.id_typed(), "shop registered, awaiting verification");
        Ok(client)
    }

    /// Admin-created accounts are verified on creation.
    pub fn create_client(
        &self,
        caller: &Caller,
        profile: ClientProfile,
        role: ClientRole,
    ) -> ServiceResult<Client> {
        AccessScope::new(caller).require(&Permission::CLIENTS_CREATE)?;
        if let Some(shops) = role.assigned_shops() {
            self.ensure_shops(shops)?;
        }

        let client = self.register(profile, role, true)?;
        tracing::info!(
            client_id = %client.id_typed(),
            role = client.role().label(),
            created_by = %caller.id,
            "client created"
        );
        Ok(client)
    }

    pub fn verify_client(&self, caller: &Caller, client_id: ClientId) -> ServiceResult<Client> {
        AccessScope::new(caller).require(&Permission::CLIENTS_VERIFY)?;
        self.mutate(client_id, |id| {
            ClientCommand::VerifyClient(VerifyClient {
                client_id: id,
                occurred_at: Utc::now(),
            })
        })
    }

    pub fn set_pricing_tier(
        &self,
        caller: &Caller,
        client_id: ClientId,
        tier: Tier,
    ) -> ServiceResult<Client> {
        AccessScope::new(caller).require(&Permission::CLIENTS_TIER)?;
        self.mutate(client_id, |id| {
            ClientCommand::SetPricingTier(SetPricingTier {
                client_id: id,
                tier,
                occurred_at: Utc::now(),
            })
        })
    }

    /// Replace a manager's assigned shops. Each shop must exist and be a shop.
    pub fn assign_shops(
        &self,
        caller: &Caller,
        manager_id: ClientId,
        shops: BTreeSet<ClientId>,
    ) -> ServiceResult<Client> {
        AccessScope::new(caller).require(&Permission::CLIENTS_ASSIGN)?;
        self.ensure_shops(&shops)?;
        self.mutate(manager_id, |id| {
            ClientCommand::AssignShops(AssignShops {
                client_id: id,
                shops: shops.clone(),
                occurred_at: Utc::now(),
            })
        })
    }

    /// A caller can read its own account and any account in its scope.
    pub fn get_client(&self, caller: &Caller, client_id: ClientId) -> ServiceResult<Client> {
        let client = self.load(client_id)?;
        if client_id != caller.id {
            AccessScope::new(caller).ensure_can_view(client_id)?;
        }
        tracing::debug!(%client_id, "client read");
        Ok(client)
    }

    pub fn list_clients(&self, caller: &Caller) -> ServiceResult<Vec<Client>> {
        let filter = AccessScope::new(caller).visible_owners();
        let clients = self
            .ctx
            .clients
            .list()?
            .into_iter()
            .filter(|c| c.id_typed() == caller.id || filter.allows(c.id_typed()))
            .collect::<Vec<_>>();
        tracing::debug!(
            caller = %caller.id,
            unrestricted = matches!(filter, OwnerFilter::All),
            count = clients.len(),
            "clients listed"
        );
        Ok(clients)
    }

    fn register(&self, profile: ClientProfile, role: ClientRole, verified: bool) -> ServiceResult<Client> {
        let email = normalize_email(&profile.email)?;
        if self.ctx.clients.find_by_email(&email)?.is_some() {
            return Err(DomainError::conflict(format!("e-mail {email} is already registered")).into());
        }

        let client_id = ClientId::new();
        let mut client = Client::empty(client_id);
        let events = client.execute(&ClientCommand::RegisterClient(RegisterClient {
            client_id,
            profile,
            role,
            verified,
            occurred_at: Utc::now(),
        }))?;

        // The repository re-checks e-mail uniqueness under its write lock.
        self.ctx.clients.insert(client.clone())?;
        self.ctx.publish(client_id, client_id, AGGREGATE_TYPE, 0, &events);
        Ok(client)
    }

    fn mutate(
        &self,
        client_id: ClientId,
        command: impl FnOnce(ClientId) -> ClientCommand,
    ) -> ServiceResult<Client> {
        let mut client = self.load(client_id)?;
        let base_version = client.version();

        let events = client.execute(&command(client_id))?;
        if events.is_empty() {
            return Ok(client);
        }

        self.ctx
            .clients
            .update(client.clone(), ExpectedVersion::Exact(base_version))?;
        self.ctx
            .publish(client_id, client_id, AGGREGATE_TYPE, base_version, &events);
        tracing::info!(%client_id, version = client.version(), "client updated");
        Ok(client)
    }

    fn load(&self, client_id: ClientId) -> ServiceResult<Client> {
        self.ctx
            .clients
            .get(client_id)?
            .ok_or_else(|| DomainError::not_found(format!("client {client_id}")).into())
    }

    fn ensure_shops(&self, shops: &BTreeSet<ClientId>) -> ServiceResult<()> {
        for shop_id in shops {
            let shop = self.load(*shop_id)?;
            if !shop.role().is_shop() {
                return Err(DomainError::validation(format!(
                    "client {shop_id} is a {}, only shops can be assigned",
                    shop.role().label()
                ))
                .into());
            }
        }
        Ok(())
    }
}
