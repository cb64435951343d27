//! Desired-state resource declarations.
//!
//! Nothing in here touches the host. A [`ResourceGraph`] is handed to whatever applies it; that applier diffs each
//! resource against the host and walks the graph in [`ResourceGraph::apply_order`].

use std::{
    collections::{BTreeSet, HashSet},
    fmt::{Display, Formatter},
    path::PathBuf,
};

use crate::error::{Error, Result};

/// Desired run-state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    Running,
    Stopped,
}

impl Display for ServiceState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// Identifies a resource within a graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceId {
    File(PathBuf),

    /// A named set of directories.
    Directories(String),

    Service(String),
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "File[{}]", path.display()),
            Self::Directories(name) => write!(f, "Directories[{name}]"),
            Self::Service(name) => write!(f, "Service[{name}]"),
        }
    }
}

/// A regular file with fixed content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpec {
    pub path: PathBuf,
    pub content: String,
    pub owner: String,
    pub group: String,
    pub mode: u32,
}

/// A set of directories that must exist with the given ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySpec {
    pub name: String,
    pub paths: BTreeSet<PathBuf>,
    pub owner: String,
    pub group: String,
    pub mode: u32,
}

/// A system service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    pub ensure: ServiceState,

    /// Whether the service starts on boot.
    pub enable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    File(FileSpec),
    Directories(DirectorySpec),
    Service(ServiceSpec),
}

/// One declared resource and the resources it must be applied after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub kind: ResourceKind,
    pub requires: Vec<ResourceId>,
}

impl Resource {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            requires: vec![],
        }
    }

    pub fn requiring(mut self, requires: impl IntoIterator<Item = ResourceId>) -> Self {
        self.requires.extend(requires);
        self
    }

    pub fn id(&self) -> ResourceId {
        match &self.kind {
            ResourceKind::File(f) => ResourceId::File(f.path.clone()),
            ResourceKind::Directories(d) => ResourceId::Directories(d.name.clone()),
            ResourceKind::Service(s) => ResourceId::Service(s.name.clone()),
        }
    }

    pub fn as_file(&self) -> Option<&FileSpec> {
        match &self.kind {
            ResourceKind::File(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_directories(&self) -> Option<&DirectorySpec> {
        match &self.kind {
            ResourceKind::Directories(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_service(&self) -> Option<&ServiceSpec> {
        match &self.kind {
            ResourceKind::Service(s) => Some(s),
            _ => None,
        }
    }
}

/// Declared resources in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceGraph {
    resources: Vec<Resource>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource.
    ///
    /// Fails if a resource with the same ID was already declared or if one of its requirements was not. Requirements
    /// have to be declared first, which keeps the graph acyclic. A failed declaration leaves the graph unchanged.
    pub fn declare(&mut self, resource: Resource) -> Result<ResourceId> {
        let id = resource.id();
        if self.get(&id).is_some() {
            return Err(Error::ConflictingResource { id });
        }
        if let Some(req) = resource.requires.iter().find(|req| self.get(req).is_none()) {
            return Err(Error::UndeclaredRequirement {
                requirement: req.clone(),
                id,
            });
        }
        self.resources.push(resource);
        Ok(id)
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.iter().find(|r| &r.id() == id)
    }

    /// Direct requirements of `id`, empty if it is unknown.
    pub fn requires(&self, id: &ResourceId) -> &[ResourceId] {
        self.get(id).map(|r| r.requires.as_slice()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Resource> {
        self.resources.iter()
    }

    /// Resources without requirements.
    pub fn leaves(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(|r| r.requires.is_empty())
    }

    /// Resources ordered so that every resource comes after everything it requires.
    ///
    /// Ties keep declaration order, so the result is stable for equal graphs.
    pub fn apply_order(&self) -> Vec<&Resource> {
        let mut done: HashSet<ResourceId> = HashSet::with_capacity(self.resources.len());
        let mut order = Vec::with_capacity(self.resources.len());

        while order.len() < self.resources.len() {
            let before = order.len();
            for r in &self.resources {
                let id = r.id();
                if done.contains(&id) {
                    continue;
                }
                if r.requires.iter().all(|req| done.contains(req)) {
                    done.insert(id);
                    order.push(r);
                }
            }
            // `declare` only admits requirements that already exist
            assert!(order.len() > before, "cycle in resource graph");
        }

        order
    }
}

impl<'a> IntoIterator for &'a ResourceGraph {
    type Item = &'a Resource;
    type IntoIter = std::slice::Iter<'a, Resource>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
