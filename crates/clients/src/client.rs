use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{Aggregate, AggregateRoot, ClientId, DomainError, DomainResult};
use atelier_events::Event;
use atelier_pricing::Tier;

/// Account role. Each variant carries only the fields meaningful to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ClientRole {
    /// A retail shop, priced with its own tier.
    Shop { tier: Tier },
    /// Regional manager acting for a fixed set of shops. Never priced.
    Manager { assigned_shops: BTreeSet<ClientId> },
    /// Workshop staff.
    Admin,
}

impl ClientRole {
    pub fn shop(tier: Tier) -> Self {
        ClientRole::Shop { tier }
    }

    pub fn manager(shops: impl IntoIterator<Item = ClientId>) -> Self {
        ClientRole::Manager {
            assigned_shops: shops.into_iter().collect(),
        }
    }

    pub fn is_shop(&self) -> bool {
        matches!(self, ClientRole::Shop { .. })
    }

    pub fn is_manager(&self) -> bool {
        matches!(self, ClientRole::Manager { .. })
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }

    /// Pricing tier; only shops have one.
    pub fn tier(&self) -> Option<Tier> {
        match self {
            ClientRole::Shop { tier } => Some(*tier),
            _ => None,
        }
    }

    pub fn assigned_shops(&self) -> Option<&BTreeSet<ClientId>> {
        match self {
            ClientRole::Manager { assigned_shops } => Some(assigned_shops),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ClientRole::Shop { .. } => "shop",
            ClientRole::Manager { .. } => "manager",
            ClientRole::Admin => "admin",
        }
    }
}

impl Default for ClientRole {
    fn default() -> Self {
        ClientRole::shop(Tier::default())
    }
}

/// Identity fields supplied at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientProfile {
    pub name: String,
    pub tax_id: String,
    pub email: String,
}

impl ClientProfile {
    pub fn new(name: impl Into<String>, tax_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tax_id: tax_id.into(),
            email: email.into(),
        }
    }

    /// Trim every field, canonicalise e-mail and tax ID, reject blanks.
    pub fn normalized(&self) -> DomainResult<Self> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("client name cannot be empty"));
        }

        let tax_id: String = self
            .tax_id
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();
        if tax_id.is_empty() {
            return Err(DomainError::validation("tax ID cannot be empty"));
        }

        Ok(Self {
            name: name.to_string(),
            tax_id,
            email: normalize_email(&self.email)?,
        })
    }
}

/// Canonical e-mail form used for uniqueness checks: trimmed, lower-case.
pub fn normalize_email(raw: &str) -> DomainResult<String> {
    let email = raw.trim().to_lowercase();

    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if !valid {
        return Err(DomainError::validation(format!("invalid e-mail address '{}'", raw.trim())));
    }
    Ok(email)
}

/// Aggregate root: Client (a shop, manager or admin account).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    id: ClientId,
    profile: Option<ClientProfile>,
    role: ClientRole,
    verified: bool,
    registered_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Client {
    /// Create an empty, not-yet-registered aggregate instance.
    pub fn empty(id: ClientId) -> Self {
        Self {
            id,
            profile: None,
            role: ClientRole::default(),
            verified: false,
            registered_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ClientId {
        self.id
    }

    pub fn profile(&self) -> Option<&ClientProfile> {
        self.profile.as_ref()
    }

    pub fn name(&self) -> &str {
        self.profile.as_ref().map(|p| p.name.as_str()).unwrap_or_default()
    }

    pub fn email(&self) -> &str {
        self.profile.as_ref().map(|p| p.email.as_str()).unwrap_or_default()
    }

    pub fn tax_id(&self) -> &str {
        self.profile.as_ref().map(|p| p.tax_id.as_str()).unwrap_or_default()
    }

    pub fn role(&self) -> &ClientRole {
        &self.role
    }

    pub fn tier(&self) -> Option<Tier> {
        self.role.tier()
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        self.registered_at
    }

    pub fn is_registered(&self) -> bool {
        self.created
    }

    /// Whether orders may be placed for this account.
    pub fn can_receive_orders(&self) -> bool {
        self.created && self.verified && self.role.is_shop()
    }
}

impl AggregateRoot for Client {
    type Id = ClientId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterClient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterClient {
    pub client_id: ClientId,
    pub profile: ClientProfile,
    pub role: ClientRole,
    /// Self-registered shops start unverified.
    pub verified: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VerifyClient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyClient {
    pub client_id: ClientId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetPricingTier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPricingTier {
    pub client_id: ClientId,
    pub tier: Tier,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AssignShops (replaces the whole assignment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignShops {
    pub client_id: ClientId,
    pub shops: BTreeSet<ClientId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientCommand {
    RegisterClient(RegisterClient),
    VerifyClient(VerifyClient),
    SetPricingTier(SetPricingTier),
    AssignShops(AssignShops),
}

/// Event: ClientRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRegistered {
    pub client_id: ClientId,
    pub profile: ClientProfile,
    pub role: ClientRole,
    pub verified: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ClientVerified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientVerified {
    pub client_id: ClientId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PricingTierChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTierChanged {
    pub client_id: ClientId,
    pub from: Tier,
    pub to: Tier,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShopsAssigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopsAssigned {
    pub client_id: ClientId,
    pub shops: BTreeSet<ClientId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientEvent {
    ClientRegistered(ClientRegistered),
    ClientVerified(ClientVerified),
    PricingTierChanged(PricingTierChanged),
    ShopsAssigned(ShopsAssigned),
}

impl Event for ClientEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::ClientRegistered(_) => "clients.client.registered",
            ClientEvent::ClientVerified(_) => "clients.client.verified",
            ClientEvent::PricingTierChanged(_) => "clients.client.tier_changed",
            ClientEvent::ShopsAssigned(_) => "clients.client.shops_assigned",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ClientEvent::ClientRegistered(e) => e.occurred_at,
            ClientEvent::ClientVerified(e) => e.occurred_at,
            ClientEvent::PricingTierChanged(e) => e.occurred_at,
            ClientEvent::ShopsAssigned(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Client {
    type Command = ClientCommand;
    type Event = ClientEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ClientEvent::ClientRegistered(e) => {
                self.id = e.client_id;
                self.profile = Some(e.profile.clone());
                self.role = e.role.clone();
                self.verified = e.verified;
                self.registered_at = Some(e.occurred_at);
                self.created = true;
            }
            ClientEvent::ClientVerified(_) => {
                self.verified = true;
            }
            ClientEvent::PricingTierChanged(e) => {
                self.role = ClientRole::shop(e.to);
            }
            ClientEvent::ShopsAssigned(e) => {
                self.role = ClientRole::Manager {
                    assigned_shops: e.shops.clone(),
                };
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ClientCommand::RegisterClient(cmd) => self.handle_register(cmd),
            ClientCommand::VerifyClient(cmd) => self.handle_verify(cmd),
            ClientCommand::SetPricingTier(cmd) => self.handle_set_tier(cmd),
            ClientCommand::AssignShops(cmd) => self.handle_assign(cmd),
        }
    }
}

impl Client {
    fn ensure_registered(&self, client_id: ClientId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("client {client_id}")));
        }
        if self.id != client_id {
            return Err(DomainError::invariant("client_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterClient) -> Result<Vec<ClientEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("client already exists"));
        }

        let profile = cmd.profile.normalized()?;

        if let ClientRole::Manager { assigned_shops } = &cmd.role {
            if assigned_shops.contains(&cmd.client_id) {
                return Err(DomainError::validation("a manager cannot be assigned to itself"));
            }
        }

        Ok(vec![ClientEvent::ClientRegistered(ClientRegistered {
            client_id: cmd.client_id,
            profile,
            role: cmd.role.clone(),
            verified: cmd.verified,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_verify(&self, cmd: &VerifyClient) -> Result<Vec<ClientEvent>, DomainError> {
        self.ensure_registered(cmd.client_id)?;

        if self.verified {
            return Ok(vec![]);
        }

        Ok(vec![ClientEvent::ClientVerified(ClientVerified {
            client_id: cmd.client_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_tier(&self, cmd: &SetPricingTier) -> Result<Vec<ClientEvent>, DomainError> {
        self.ensure_registered(cmd.client_id)?;

        let current = self.role.tier().ok_or_else(|| {
            DomainError::validation(format!(
                "only shops carry a pricing tier (client is a {})",
                self.role.label()
            ))
        })?;

        if current == cmd.tier {
            return Ok(vec![]);
        }

        Ok(vec![ClientEvent::PricingTierChanged(PricingTierChanged {
            client_id: cmd.client_id,
            from: current,
            to: cmd.tier,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign(&self, cmd: &AssignShops) -> Result<Vec<ClientEvent>, DomainError> {
        self.ensure_registered(cmd.client_id)?;

        let current = self.role.assigned_shops().ok_or_else(|| {
            DomainError::validation(format!(
                "only managers have assigned shops (client is a {})",
                self.role.label()
            ))
        })?;

        if cmd.shops.contains(&cmd.client_id) {
            return Err(DomainError::validation("a manager cannot be assigned to itself"));
        }

        if *current == cmd.shops {
            return Ok(vec![]);
        }

        Ok(vec![ClientEvent::ShopsAssigned(ShopsAssigned {
            client_id: cmd.client_id,
            shops: cmd.shops.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
