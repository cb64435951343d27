use std::path::PathBuf;

use thiserror::Error;

use crate::{resource::ResourceId, template::RenderError};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("No broker configuration for host \"{host}\" in the registry")]
    MissingHostConfig { host: String },

    #[error("Template error: {0}")]
    TemplateRender(#[from] RenderError),

    #[error("Invalid broker inventory: {0}")]
    Inventory(#[source] serde_json::Error),

    #[error("Invalid broker defaults: {0}")]
    Config(#[source] serde_json::Error),

    #[error("Resource {id} is declared more than once")]
    ConflictingResource { id: ResourceId },

    #[error("{id} requires undeclared resource {requirement}")]
    UndeclaredRequirement {
        id: ResourceId,
        requirement: ResourceId,
    },

    #[error("Cannot read \"{}\": {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn missing_host(host: impl Into<String>) -> Self {
        Self::MissingHostConfig { host: host.into() }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
