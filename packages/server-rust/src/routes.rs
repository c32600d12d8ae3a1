//! Route translation between public service aliases and origin names.
//!
//! A routed service is only ever published under its aliases. Requests are
//! normalized to origin names before anything else sees them, and replies are
//! expanded back to one entry per alias on the way out.

use std::collections::{BTreeMap, BTreeSet};

use discovery_core::messages::Route;
use discovery_core::{Content, ReplyContent};

/// Rejection reasons for a route table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("route '{route}' is claimed by both '{first}' and '{second}'")]
    DuplicateRoute {
        route: String,
        first: String,
        second: String,
    },
    #[error("route '{route}' shadows a routed service of the same name")]
    RouteShadowsService { route: String },
    #[error("service and route names must not be empty")]
    EmptyName,
}

/// Bidirectional alias table. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    to_routes: BTreeMap<String, Vec<String>>,
    to_origin: BTreeMap<String, String>,
}

impl RouteTable {
    /// Builds a table from configuration.
    ///
    /// Entries naming the same service are merged.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] if a name is empty, an alias maps to two
    /// origins, or an alias equals another routed service's origin name.
    pub fn new(routes: &[Route]) -> Result<Self, ConfigurationError> {
        let mut to_routes: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut to_origin: BTreeMap<String, String> = BTreeMap::new();

        for route in routes {
            if route.service.is_empty() {
                return Err(ConfigurationError::EmptyName);
            }
            for alias in &route.routes {
                if alias.is_empty() {
                    return Err(ConfigurationError::EmptyName);
                }
                if let Some(first) = to_origin.get(alias) {
                    if first != &route.service {
                        return Err(ConfigurationError::DuplicateRoute {
                            route: alias.clone(),
                            first: first.clone(),
                            second: route.service.clone(),
                        });
                    }
                }
                to_origin.insert(alias.clone(), route.service.clone());
                to_routes
                    .entry(route.service.clone())
                    .or_default()
                    .insert(alias.clone());
            }
        }

        if let Some((alias, _)) = to_origin
            .iter()
            .find(|(alias, origin)| alias != origin && to_routes.contains_key(*alias))
        {
            return Err(ConfigurationError::RouteShadowsService {
                route: alias.clone(),
            });
        }

        Ok(Self {
            to_routes: to_routes
                .into_iter()
                .map(|(origin, aliases)| (origin, aliases.into_iter().collect()))
                .collect(),
            to_origin,
        })
    }

    /// Origin name for `alias`, if it is one.
    #[must_use]
    pub fn origin(&self, alias: &str) -> Option<&str> {
        self.to_origin.get(alias).map(String::as_str)
    }

    /// Aliases published for `origin`; empty when the service is not routed.
    #[must_use]
    pub fn aliases(&self, origin: &str) -> &[String] {
        self.to_routes.get(origin).map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_routes.is_empty()
    }

    /// Replaces aliases in `content` with their origin names.
    #[must_use]
    pub fn normalize_request(&self, content: &Content) -> Content {
        if self.is_empty() {
            return content.clone();
        }
        content.map_services(|name| self.origin(name).unwrap_or(name.as_str()).to_string())
    }

    /// Expands every routed origin in `content` into one entry per alias.
    #[must_use]
    pub fn normalize_reply(&self, content: &ReplyContent) -> ReplyContent {
        if self.is_empty() {
            return content.clone();
        }
        content.flat_map_services(|service| match self.to_routes.get(&service.name) {
            Some(aliases) => aliases
                .iter()
                .map(|a| service.renamed(a.as_str()))
                .collect::<Vec<_>>(),
            None => vec![service.clone()],
        })
    }

    /// The table in configuration form.
    #[must_use]
    pub fn routes(&self) -> Vec<Route> {
        self.to_routes
            .iter()
            .map(|(service, aliases)| Route::new(service.as_str(), aliases.iter().cloned()))
            .collect()
    }
}
