//! Operator inventory of brokers, keyed by host identity.

use std::{
    collections::{BTreeMap, btree_map},
    fmt,
    num::NonZeroU16,
    path::Path,
};

use serde::{
    Deserialize, Deserializer,
    de::{self, Visitor},
};
use tracing::debug;

use crate::error::{Error, Result};

/// Per-host port override.
///
/// The inventory treats a port as "set" only when it is present *and* truthy. An explicit `0`, `null`, `""` or
/// `false` means the same as leaving the key out: both fall back to the default broker port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PortOverride {
    /// The `port` key is missing.
    #[default]
    Absent,

    /// The `port` key is present but falsy (`null`, zero or negative, `""`, `false`).
    Unset,

    /// A positive port.
    Port(NonZeroU16),
}

impl PortOverride {
    /// Returns the overriding port, if the override is truthy.
    pub fn port(&self) -> Option<u16> {
        match self {
            Self::Port(p) => Some(p.get()),
            Self::Absent | Self::Unset => None,
        }
    }
}

impl From<u16> for PortOverride {
    fn from(port: u16) -> Self {
        NonZeroU16::new(port).map_or(Self::Unset, Self::Port)
    }
}

impl From<Option<u16>> for PortOverride {
    fn from(port: Option<u16>) -> Self {
        port.map_or(Self::Absent, Self::from)
    }
}

impl<'de> Deserialize<'de> for PortOverride {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(PortOverrideVisitor)
    }
}

struct PortOverrideVisitor;

impl<'de> Visitor<'de> for PortOverrideVisitor {
    type Value = PortOverride;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a port number, a numeric string, or a falsy value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(PortOverride::Unset)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(PortOverride::Unset)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        if v {
            Err(E::invalid_value(de::Unexpected::Bool(v), &self))
        } else {
            Ok(PortOverride::Unset)
        }
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        if v <= 0 {
            return Ok(PortOverride::Unset);
        }
        self.visit_u64(v as u64)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        let port = u16::try_from(v)
            .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))?;
        Ok(PortOverride::from(port))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        if v <= 0.0 {
            Ok(PortOverride::Unset)
        } else {
            Err(E::invalid_value(de::Unexpected::Float(v), &self))
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        let v = v.trim();
        if v.is_empty() {
            return Ok(PortOverride::Unset);
        }
        let port = v
            .parse::<i64>()
            .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))?;
        self.visit_i64(port)
    }
}

/// Broker settings that are scoped to one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct HostOverride {
    /// The broker ID. Has no default.
    pub id: i32,

    /// The broker port, if it differs from the default.
    #[serde(default)]
    pub port: PortOverride,
}

impl HostOverride {
    /// Override that only sets the broker ID.
    pub fn new(id: i32) -> Self {
        Self {
            id,
            port: PortOverride::Absent,
        }
    }

    pub fn with_port(mut self, port: impl Into<PortOverride>) -> Self {
        self.port = port.into();
        self
    }
}

/// Mapping from host identity to [`HostOverride`].
///
/// Every host that runs a broker must have an entry under its own identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct BrokerRegistry {
    hosts: BTreeMap<String, HostOverride>,
}

impl BrokerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON inventory such as `{"kafka1": {"id": 1, "port": 9093}, "kafka2": {"id": 2}}`.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let registry: Self = serde_json::from_str(s).map_err(Error::Inventory)?;
        debug!(hosts = registry.len(), "parsed broker inventory");
        Ok(registry)
    }

    /// Read and parse a JSON inventory file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json_str(&s)
    }

    /// Adds or replaces the entry for `host`, returning the previous one.
    pub fn insert(&mut self, host: impl Into<String>, entry: HostOverride) -> Option<HostOverride> {
        self.hosts.insert(host.into(), entry)
    }

    pub fn get(&self, host: &str) -> Option<&HostOverride> {
        self.hosts.get(host)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Iterates over hosts in lexicographic order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, HostOverride> {
        self.hosts.iter()
    }

    /// Broker IDs that are claimed by more than one host, with the hosts claiming them.
    ///
    /// Resolution does not call this; duplicate IDs have to be rejected by whoever assembles the inventory.
    pub fn duplicate_broker_ids(&self) -> BTreeMap<i32, Vec<String>> {
        crate::validation::duplicate_broker_ids(self.iter().map(|(host, o)| (host.as_str(), o.id)))
    }
}

impl<S: Into<String>> FromIterator<(S, HostOverride)> for BrokerRegistry {
    fn from_iter<I: IntoIterator<Item = (S, HostOverride)>>(iter: I) -> Self {
        Self {
            hosts: iter.into_iter().map(|(h, o)| (h.into(), o)).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a BrokerRegistry {
    type Item = (&'a String, &'a HostOverride);
    type IntoIter = btree_map::Iter<'a, String, HostOverride>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
