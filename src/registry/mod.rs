//! Endpoint registry subsystem.
//!
//! # Data Flow
//! ```text
//! GatewayConfig.appservices
//!     → Registry::from_config (ID/token checks, two lookup tables)
//!     → Arc<Registry> shared read-only with every handler
//!
//! HTTP transaction ──hs token──→ by_inbound  ─┐
//!                                             ├→ Endpoint → ConnectionSlot → Connection
//! websocket upgrade ──as token──→ by_outbound ─┘
//! ```
//!
//! # Design Decisions
//! - Tables are built once and never mutated, so lookups take no locks
//! - Inbound and outbound tokens live in separate tables; a token is only
//!   ever valid for the table it was configured in
//! - Duplicate IDs or duplicate tokens within a table are fatal at startup

pub mod connection;
pub mod endpoint;
pub mod slot;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::AppServiceConfig;

pub use connection::{Connection, ConnectionId};
pub use endpoint::{DeliveryError, Endpoint};
pub use slot::{Accepted, ConnectionSlot};

/// Errors building the registry from configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("appservice #{0} doesn't have an ID")]
    MissingId(usize),

    #[error("appservice {id} doesn't have the {token} token set")]
    MissingToken { id: String, token: &'static str },

    #[error("appservice ID {0} is configured more than once")]
    DuplicateId(String),

    #[error("appservice {id} reuses the {token} token of another appservice")]
    DuplicateToken { id: String, token: &'static str },
}

/// Immutable lookup tables from credentials to endpoints.
#[derive(Debug, Default)]
pub struct Registry {
    endpoints: Vec<Arc<Endpoint>>,
    by_inbound: HashMap<String, Arc<Endpoint>>,
    by_outbound: HashMap<String, Arc<Endpoint>>,
}

impl Registry {
    /// Build the registry, failing on the first invalid appservice.
    pub fn from_config(appservices: &[AppServiceConfig]) -> Result<Self, RegistryError> {
        let mut registry = Self::default();
        let mut ids = HashSet::new();

        for (i, az) in appservices.iter().enumerate() {
            if az.id.is_empty() {
                return Err(RegistryError::MissingId(i + 1));
            }
            if az.outbound_token.is_empty() {
                return Err(RegistryError::MissingToken { id: az.id.clone(), token: "AS" });
            }
            if az.inbound_token.is_empty() {
                return Err(RegistryError::MissingToken { id: az.id.clone(), token: "HS" });
            }
            if !ids.insert(az.id.as_str()) {
                return Err(RegistryError::DuplicateId(az.id.clone()));
            }
            if registry.by_inbound.contains_key(&az.inbound_token) {
                return Err(RegistryError::DuplicateToken { id: az.id.clone(), token: "HS" });
            }
            if registry.by_outbound.contains_key(&az.outbound_token) {
                return Err(RegistryError::DuplicateToken { id: az.id.clone(), token: "AS" });
            }

            let endpoint = Arc::new(Endpoint::new(
                az.id.clone(),
                az.inbound_token.clone(),
                az.outbound_token.clone(),
            ));
            registry.by_inbound.insert(az.inbound_token.clone(), endpoint.clone());
            registry.by_outbound.insert(az.outbound_token.clone(), endpoint.clone());
            registry.endpoints.push(endpoint);
        }

        tracing::info!(endpoints = registry.endpoints.len(), "Endpoint registry built");
        Ok(registry)
    }

    /// Find the endpoint a homeserver transaction token belongs to.
    pub fn lookup_by_inbound_token(&self, token: &str) -> Option<&Arc<Endpoint>> {
        self.by_inbound.get(token)
    }

    /// Find the endpoint a websocket token belongs to.
    pub fn lookup_by_outbound_token(&self, token: &str) -> Option<&Arc<Endpoint>> {
        self.by_outbound.get(token)
    }

    /// All endpoints, in configuration order.
    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    /// Send every bound websocket the shutting-down close frame.
    pub async fn disconnect_all(&self, close_timeout: Duration) {
        futures_util::future::join_all(
            self.endpoints
                .iter()
                .map(|endpoint| endpoint.disconnect_for_shutdown(close_timeout)),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn az(id: &str, outbound: &str, inbound: &str) -> AppServiceConfig {
        AppServiceConfig {
            id: id.into(),
            outbound_token: outbound.into(),
            inbound_token: inbound.into(),
        }
    }

    #[test]
    fn lookups_use_disjoint_tables() {
        let registry = Registry::from_config(&[az("a", "as-a", "hs-a"), az("b", "as-b", "hs-b")]).unwrap();

        assert_eq!(registry.lookup_by_inbound_token("hs-a").unwrap().id(), "a");
        assert_eq!(registry.lookup_by_outbound_token("as-b").unwrap().id(), "b");
        assert!(registry.lookup_by_inbound_token("as-a").is_none());
        assert!(registry.lookup_by_outbound_token("hs-a").is_none());
        assert!(registry.lookup_by_inbound_token("").is_none());
        assert_eq!(registry.endpoints().len(), 2);
    }

    #[test]
    fn both_tables_share_one_endpoint() {
        let registry = Registry::from_config(&[az("a", "as-a", "hs-a")]).unwrap();
        let by_hs = registry.lookup_by_inbound_token("hs-a").unwrap();
        let by_as = registry.lookup_by_outbound_token("as-a").unwrap();
        assert!(Arc::ptr_eq(by_hs, by_as));
    }

    #[test]
    fn rejects_missing_fields() {
        assert_eq!(
            Registry::from_config(&[az("", "as", "hs")]).unwrap_err(),
            RegistryError::MissingId(1)
        );
        assert_eq!(
            Registry::from_config(&[az("a", "", "hs")]).unwrap_err(),
            RegistryError::MissingToken { id: "a".into(), token: "AS" }
        );
        assert_eq!(
            Registry::from_config(&[az("a", "as", "")]).unwrap_err(),
            RegistryError::MissingToken { id: "a".into(), token: "HS" }
        );
    }

    #[test]
    fn rejects_duplicates() {
        assert_eq!(
            Registry::from_config(&[az("a", "as-1", "hs-1"), az("a", "as-2", "hs-2")]).unwrap_err(),
            RegistryError::DuplicateId("a".into())
        );
        assert_eq!(
            Registry::from_config(&[az("a", "as-1", "hs"), az("b", "as-2", "hs")]).unwrap_err(),
            RegistryError::DuplicateToken { id: "b".into(), token: "HS" }
        );
        assert_eq!(
            Registry::from_config(&[az("a", "as", "hs-1"), az("b", "as", "hs-2")]).unwrap_err(),
            RegistryError::DuplicateToken { id: "b".into(), token: "AS" }
        );
    }

    #[test]
    fn same_token_in_both_tables_is_allowed() {
        let registry = Registry::from_config(&[az("a", "shared", "shared")]).unwrap();
        assert!(registry.lookup_by_inbound_token("shared").is_some());
        assert!(registry.lookup_by_outbound_token("shared").is_some());
    }
}
