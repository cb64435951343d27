//! Per-host Kafka broker configuration.
//!
//! Given the identity of a host, an inventory of brokers and a bundle of cluster-wide defaults, this crate resolves
//! the broker's configuration and declares the resources that run it: the default env file, `server.properties`,
//! `log4j.properties`, the log directories and the `kafka` service. Applying those declarations to the host is up
//! to the caller.
//!
//! ```
//! use kafka_broker_config::{BrokerRegistry, ManifestBuilder};
//!
//! let registry = BrokerRegistry::from_json_str(r#"{"hostA": {"id": 1, "port": 12345}, "hostB": {"id": 2}}"#)?;
//! let manifest = ManifestBuilder::new(registry).build("hostB")?;
//!
//! assert_eq!(manifest.config.broker_id, 2);
//! assert_eq!(manifest.config.port, 9092);
//! assert_eq!(manifest.resources.len(), 5);
//! # Ok::<(), kafka_broker_config::Error>(())
//! ```
#![deny(
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    rust_2018_idioms,
    unsafe_code
)]
#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]
mod build_info;
pub mod config;
pub mod error;
pub mod manifest;
pub mod registry;
pub mod resolver;
pub mod resource;
pub mod template;
mod validation;

pub use config::BrokerDefaults;
pub use error::{Error, Result};
pub use manifest::{Manifest, ManifestBuilder, emit};
pub use registry::{BrokerRegistry, HostOverride, PortOverride};
pub use resolver::{ResolvedBrokerConfig, resolve};
pub use resource::{ResourceGraph, ServiceState};
pub use template::{RenderError, TemplateRenderer, Templates};
