//! Resolution of one host's broker configuration.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use tracing::{debug, error};

use crate::{
    config::BrokerDefaults,
    error::{Error, Result},
    registry::{BrokerRegistry, PortOverride},
    resource::ServiceState,
};

/// Concrete broker configuration for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBrokerConfig {
    /// Host identity the configuration was resolved for.
    pub host: String,

    /// `broker.id`
    pub broker_id: i32,

    /// `port`
    pub port: u16,

    /// Desired run-state of the broker service.
    pub service_state: ServiceState,

    /// Cluster-wide settings, copied from the defaults bundle.
    pub settings: BrokerDefaults,
}

impl ResolvedBrokerConfig {
    /// Zookeeper connect string: the ensemble joined by `,`, followed by the chroot if one is set.
    pub fn zookeeper_connect(&self) -> String {
        let mut connect = self.settings.zookeeper_hosts.join(",");
        if let Some(chroot) = self.settings.zookeeper_chroot.as_deref()
            && !chroot.is_empty()
        {
            if !chroot.starts_with('/') {
                connect.push('/');
            }
            connect.push_str(chroot);
        }
        connect
    }

    /// Log directories in configured order, each listed once.
    pub fn log_dirs(&self) -> Vec<&Path> {
        let mut seen = HashSet::with_capacity(self.settings.log_dirs.len());
        self.settings
            .log_dirs
            .iter()
            .map(PathBuf::as_path)
            .filter(|dir| seen.insert(*dir))
            .collect()
    }

    pub fn server_properties_path(&self) -> PathBuf {
        self.settings.kafka_config_dir.join("server.properties")
    }

    pub fn log4j_properties_path(&self) -> PathBuf {
        self.settings.kafka_config_dir.join("log4j.properties")
    }
}

/// Resolve the broker configuration of `host`.
///
/// Only the broker ID and port are looked up per host; every other setting comes from `defaults`. A host without
/// a registry entry is an error, there is no fallback since the broker ID has no default.
pub fn resolve(
    host: &str,
    registry: &BrokerRegistry,
    defaults: &BrokerDefaults,
) -> Result<ResolvedBrokerConfig> {
    let Some(entry) = registry.get(host) else {
        let e = Error::missing_host(host);
        error!(e=%e, host, "cannot resolve broker configuration");
        return Err(e);
    };

    let port = match entry.port {
        PortOverride::Port(p) => p.get(),
        PortOverride::Absent | PortOverride::Unset => defaults.default_port,
    };

    let service_state = if defaults.enabled {
        ServiceState::Running
    } else {
        ServiceState::Stopped
    };

    debug!(
        host,
        broker_id = entry.id,
        port,
        port_override = ?entry.port,
        ?service_state,
        "resolved broker configuration",
    );

    Ok(ResolvedBrokerConfig {
        host: host.to_owned(),
        broker_id: entry.id,
        port,
        service_state,
        settings: defaults.clone(),
    })
}
