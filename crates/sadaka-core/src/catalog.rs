//! Payment Catalog
//!
//! Read-only mapping from destinations to allowed methods and recipient
//! accounts. The catalog is validated once when loaded and then shared as an
//! `Arc<PaymentCatalog>` by everything that needs it.

use sadaka_types::{
    AccountDetails, MethodInfo, PaymentDestination, PaymentMethod, Result, SadakaError,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

const BUILTIN_CATALOG: &str = include_str!("builtin_catalog.json");

/// Catalog configuration as loaded from a file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub destinations: Vec<PaymentDestination>,
}

impl CatalogConfig {
    /// Parse a JSON catalog document
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SadakaError::InvalidCatalog {
            reason: e.to_string(),
        })
    }
}

/// Validated destination catalog
#[derive(Debug, Clone)]
pub struct PaymentCatalog {
    destinations: Vec<PaymentDestination>,
    index: HashMap<String, usize>,
}

impl PaymentCatalog {
    /// Validate a configuration and build the catalog
    pub fn from_config(config: CatalogConfig) -> Result<Self> {
        let mut index = HashMap::with_capacity(config.destinations.len());

        for (position, destination) in config.destinations.iter().enumerate() {
            validate_destination(destination)?;
            if index.insert(destination.name.clone(), position).is_some() {
                return Err(invalid(format!("duplicate destination {}", destination.name)));
            }
        }

        Ok(Self {
            destinations: config.destinations,
            index,
        })
    }

    /// The congregation's standard destinations
    pub fn builtin() -> Result<Self> {
        Self::from_config(CatalogConfig::from_json(BUILTIN_CATALOG)?)
    }

    /// All destinations in configured order
    pub fn list_destinations(&self) -> &[PaymentDestination] {
        &self.destinations
    }

    /// Look up a destination by name
    pub fn destination(&self, name: &str) -> Result<&PaymentDestination> {
        self.index
            .get(name.trim())
            .map(|&position| &self.destinations[position])
            .ok_or_else(|| SadakaError::DestinationNotFound {
                destination: name.to_string(),
            })
    }

    /// Methods offered by a destination, default first
    pub fn list_methods(&self, name: &str) -> Result<Vec<MethodInfo>> {
        let destination = self.destination(name)?;

        let default = destination.default_method;
        let mut methods = vec![MethodInfo::describe(default, true)];
        methods.extend(
            destination
                .methods
                .iter()
                .filter(|&&method| method != default)
                .map(|&method| MethodInfo::describe(method, false)),
        );
        Ok(methods)
    }

    /// Recipient account for a destination and method
    pub fn resolve_account(&self, name: &str, method: PaymentMethod) -> Result<&AccountDetails> {
        let destination = self.destination(name)?;

        if !destination.allows(method) {
            return Err(SadakaError::UnsupportedMethod {
                destination: destination.name.clone(),
                method: method.to_string(),
            });
        }

        destination
            .accounts
            .get(&method)
            .ok_or_else(|| SadakaError::AccountNotConfigured {
                destination: destination.name.clone(),
                method: method.to_string(),
            })
    }
}

fn validate_destination(destination: &PaymentDestination) -> Result<()> {
    let name = &destination.name;
    if name.trim().is_empty() {
        return Err(invalid("destination name must not be blank"));
    }
    if name.trim() != name {
        return Err(invalid(format!("destination name {name:?} has surrounding whitespace")));
    }
    if destination.methods.is_empty() {
        return Err(invalid(format!("{name} allows no payment methods")));
    }

    let mut seen = HashSet::new();
    for method in &destination.methods {
        if !seen.insert(method) {
            return Err(invalid(format!("{name} lists {method} more than once")));
        }
        if !destination.accounts.contains_key(method) {
            return Err(invalid(format!("{name} allows {method} but has no account for it")));
        }
    }

    if !destination.allows(destination.default_method) {
        return Err(invalid(format!(
            "{name} defaults to {} which is not an allowed method",
            destination.default_method
        )));
    }

    for (method, account) in &destination.accounts {
        if account.method() != *method {
            return Err(invalid(format!(
                "{name} has {} account details under {method}",
                account.method()
            )));
        }
    }

    Ok(())
}

fn invalid(reason: impl Into<String>) -> SadakaError {
    SadakaError::InvalidCatalog {
        reason: reason.into(),
    }
}
