//! Client directory: shop, manager and admin accounts.
//!
//! This crate contains the account aggregate and its role model, implemented
//! purely as deterministic domain logic (no IO, no storage).

pub mod client;

pub use client::{
    AssignShops, Client, ClientCommand, ClientEvent, ClientProfile, ClientRegistered, ClientRole,
    ClientVerified, PricingTierChanged, RegisterClient, SetPricingTier, ShopsAssigned,
    VerifyClient, normalize_email,
};
