//! Declaration of the resources that install, configure and run a broker.

use std::{collections::BTreeSet, path::PathBuf};

use tracing::{debug, info};

use crate::{
    config::BrokerDefaults,
    error::Result,
    registry::BrokerRegistry,
    resolver::{ResolvedBrokerConfig, resolve},
    resource::{
        DirectorySpec, FileSpec, Resource, ResourceGraph, ResourceKind, ServiceSpec, ServiceState,
    },
    template::{TemplateContext, TemplateKind, TemplateRenderer, Templates},
};

/// Name of the directory-set resource holding the broker's log directories.
pub const LOG_DIRS_RESOURCE: &str = "kafka-log-dirs";

const CONFIG_FILE_OWNER: &str = "root";
const CONFIG_FILE_MODE: u32 = 0o644;

/// Declare the resources for one resolved broker.
///
/// The graph always holds the default env file, `server.properties`, `log4j.properties`, the log directories and
/// the broker service, which requires the other four. The service does not depend on file *changes*: a new
/// configuration is picked up on the next restart, which is left to the operator.
///
/// Render errors are returned as-is. Settings that place two files at the same path fail with
/// [`Error::ConflictingResource`](crate::Error::ConflictingResource).
pub fn emit(config: &ResolvedBrokerConfig, renderer: &dyn TemplateRenderer) -> Result<ResourceGraph> {
    let settings = &config.settings;
    let ctx = TemplateContext::from_config(config)?;

    let config_file = |kind: TemplateKind, path: PathBuf| -> Result<Resource> {
        let content = renderer.render(kind, &ctx)?;
        Ok(Resource::new(ResourceKind::File(FileSpec {
            path,
            content,
            owner: CONFIG_FILE_OWNER.to_owned(),
            group: CONFIG_FILE_OWNER.to_owned(),
            mode: CONFIG_FILE_MODE,
        })))
    };

    // all files are rendered before anything is declared
    let default_env = config_file(TemplateKind::DefaultEnv, settings.default_env_file.clone())?;
    let server_properties =
        config_file(TemplateKind::ServerProperties, config.server_properties_path())?;
    let log4j_properties =
        config_file(TemplateKind::Log4jProperties, config.log4j_properties_path())?;

    let log_dirs = Resource::new(ResourceKind::Directories(DirectorySpec {
        name: LOG_DIRS_RESOURCE.to_owned(),
        paths: config.log_dirs().into_iter().map(PathBuf::from).collect::<BTreeSet<_>>(),
        owner: settings.user.clone(),
        group: settings.group.clone(),
        mode: settings.log_dir_mode,
    }));

    let mut graph = ResourceGraph::new();
    let requires = [
        graph.declare(default_env)?,
        graph.declare(server_properties)?,
        graph.declare(log_dirs)?,
        graph.declare(log4j_properties)?,
    ];

    let service = Resource::new(ResourceKind::Service(ServiceSpec {
        name: settings.service_name.clone(),
        ensure: config.service_state,
        enable: config.service_state == ServiceState::Running,
    }))
    .requiring(requires);
    let service = graph.declare(service)?;

    debug!(
        host = config.host.as_str(),
        %service,
        resources = graph.len(),
        "declared broker resources",
    );

    Ok(graph)
}

/// Resolved configuration and resource declarations for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub config: ResolvedBrokerConfig,
    pub resources: ResourceGraph,
}

/// Builder for [`Manifest`].
pub struct ManifestBuilder {
    registry: BrokerRegistry,
    defaults: BrokerDefaults,
    renderer: Box<dyn TemplateRenderer>,
}

impl ManifestBuilder {
    /// Create a new [`ManifestBuilder`] with the broker inventory, default settings and the built-in templates.
    pub fn new(registry: BrokerRegistry) -> Self {
        Self {
            registry,
            defaults: BrokerDefaults::default(),
            renderer: Box::new(Templates::default()),
        }
    }

    /// Use cluster-wide settings other than the defaults.
    pub fn defaults(mut self, defaults: BrokerDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Render the configuration files with something other than the built-in templates.
    pub fn renderer(mut self, renderer: impl TemplateRenderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    /// Build the [`Manifest`] for `host`.
    ///
    /// Fails without declaring anything if `host` is not in the inventory.
    pub fn build(&self, host: &str) -> Result<Manifest> {
        let config = resolve(host, &self.registry, &self.defaults)?;
        let resources = emit(&config, self.renderer.as_ref())?;

        info!(
            host,
            broker_id = config.broker_id,
            port = config.port,
            service_state = %config.service_state,
            "built broker manifest",
        );

        Ok(Manifest { config, resources })
    }
}

impl std::fmt::Debug for ManifestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestBuilder")
            .field("registry", &self.registry)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}
