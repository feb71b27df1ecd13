//! Router directory: which relay serves which address.
//!
//! The core only needs a mapping `address → endpoint` plus the list of
//! endpoints to poll. Deployments can back it however they like — the
//! implementations here cover a fixed endpoint list and a JSON network
//! map with hex-prefix ranges; richer discovery (DNS, chain-backed
//! directories) plugs in through the same trait.

use std::path::Path;

use courier_proto::Address;
use serde::Deserialize;

/// Resolves routing endpoints for peer addresses.
pub trait RouterDirectory: Send + Sync {
    /// Endpoint of the router holding `address`'s mailbox, if known.
    fn router_for(&self, address: &Address) -> Option<String>;

    /// Every endpoint a peer should poll for its own mailbox.
    fn endpoints(&self) -> Vec<String>;
}

/// Fixed endpoint list. Every address maps to the first endpoint; all
/// endpoints are polled.
#[derive(Debug, Clone)]
pub struct StaticDirectory {
    endpoints: Vec<String>,
}

impl StaticDirectory {
    /// Directory over a fixed endpoint list.
    #[must_use]
    pub fn new(endpoints: Vec<String>) -> Self {
        Self { endpoints }
    }

    /// Single-router directory — the common deployment.
    #[must_use]
    pub fn single(endpoint: impl Into<String>) -> Self {
        Self { endpoints: vec![endpoint.into()] }
    }
}

impl RouterDirectory for StaticDirectory {
    fn router_for(&self, _address: &Address) -> Option<String> {
        self.endpoints.first().cloned()
    }

    fn endpoints(&self) -> Vec<String> {
        self.endpoints.clone()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct MapHost {
    address: String,
    #[serde(default)]
    #[allow(dead_code)]
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct MapRange {
    prefix: String,
    hosts: Vec<MapHost>,
}

/// A JSON network map assigning router hosts to hex-prefix ranges of
/// the address space, with fallback initial points.
///
/// Document shape:
///
/// ```json
/// {
///   "name": "MainNet",
///   "timestamp": 1700000000,
///   "initial_points": ["router-a:8084"],
///   "ranges": [
///     { "prefix": "0a", "hosts": [{ "address": "router-b:8084", "name": "b" }] }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkMap {
    /// Human-readable network name.
    #[serde(default)]
    pub name: String,
    /// Publication timestamp of the map.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    initial_points: Vec<String>,
    #[serde(default)]
    ranges: Vec<MapRange>,
}

impl NetworkMap {
    /// Parse a map from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Load a map from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes).map_err(std::io::Error::other)
    }
}

impl RouterDirectory for NetworkMap {
    fn router_for(&self, address: &Address) -> Option<String> {
        let hex_address = hex::encode(address);

        let best = self
            .ranges
            .iter()
            .filter(|range| hex_address.starts_with(&range.prefix.to_lowercase()))
            .max_by_key(|range| range.prefix.len());

        if let Some(range) = best {
            if let Some(host) = range.hosts.first() {
                return Some(host.address.clone());
            }
        }

        self.initial_points.first().cloned()
    }

    fn endpoints(&self) -> Vec<String> {
        let mut endpoints: Vec<String> = self
            .initial_points
            .iter()
            .cloned()
            .chain(self.ranges.iter().flat_map(|r| r.hosts.iter().map(|h| h.address.clone())))
            .collect();
        endpoints.sort();
        endpoints.dedup();
        endpoints
    }
}
