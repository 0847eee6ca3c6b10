//! Locator resolution: where forwarders and functions live.

use crate::error::{RendererError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sfc_types::{PathId, RenderedServicePath, ServiceFunction, ServiceFunctionForwarder};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Looks up forwarder and function definitions for a path.
#[async_trait]
pub trait LocatorResolver: Send + Sync {
    async fn forwarder(&self, name: &str, path: PathId) -> Result<ServiceFunctionForwarder>;

    async fn function(&self, name: &str, path: PathId) -> Result<ServiceFunction>;
}

/// Static topology, loadable from JSON.
///
/// ```json
/// {
///   "forwarders": [{ "name": "sff1", "node": "openflow:1", "dpls": [...] }],
///   "functions": [{ "name": "fw1", "type": "firewall", "locator": {...} }]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub forwarders: Vec<ServiceFunctionForwarder>,
    #[serde(default)]
    pub functions: Vec<ServiceFunction>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_forwarder(mut self, forwarder: ServiceFunctionForwarder) -> Self {
        self.forwarders.push(forwarder);
        self
    }

    pub fn with_function(mut self, function: ServiceFunction) -> Self {
        self.functions.push(function);
        self
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let topology: Self = serde_json::from_str(content)?;
        topology.validate()?;
        Ok(topology)
    }

    pub fn validate(&self) -> Result<()> {
        for forwarder in &self.forwarders {
            forwarder.validate()?;
        }
        Ok(())
    }
}

#[async_trait]
impl LocatorResolver for Topology {
    async fn forwarder(&self, name: &str, _path: PathId) -> Result<ServiceFunctionForwarder> {
        self.forwarders
            .iter()
            .find(|f| f.name == name)
            .cloned()
            .ok_or_else(|| RendererError::forwarder_not_found(name))
    }

    async fn function(&self, name: &str, _path: PathId) -> Result<ServiceFunction> {
        self.functions
            .iter()
            .find(|f| f.name == name)
            .cloned()
            .ok_or_else(|| RendererError::function_not_found(name))
    }
}

/// Definitions of everything one path touches, fetched once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPath {
    forwarders: BTreeMap<String, ServiceFunctionForwarder>,
    functions: BTreeMap<String, ServiceFunction>,
}

impl ResolvedPath {
    pub fn new(
        forwarders: impl IntoIterator<Item = ServiceFunctionForwarder>,
        functions: impl IntoIterator<Item = ServiceFunction>,
    ) -> Self {
        Self {
            forwarders: forwarders.into_iter().map(|f| (f.name.clone(), f)).collect(),
            functions: functions.into_iter().map(|f| (f.name.clone(), f)).collect(),
        }
    }

    /// Fetches every forwarder and function named by the path's hops.
    pub async fn resolve(
        resolver: &dyn LocatorResolver,
        rsp: &RenderedServicePath,
    ) -> Result<Self> {
        let mut resolved = Self::default();
        for hop in &rsp.hops {
            if !resolved.forwarders.contains_key(&hop.forwarder) {
                let forwarder = resolver.forwarder(&hop.forwarder, rsp.path_id).await?;
                resolved.forwarders.insert(hop.forwarder.clone(), forwarder);
            }
            if !resolved.functions.contains_key(&hop.function) {
                let function = resolver.function(&hop.function, rsp.path_id).await?;
                resolved.functions.insert(hop.function.clone(), function);
            }
        }
        Ok(resolved)
    }

    pub fn forwarders(&self) -> &BTreeMap<String, ServiceFunctionForwarder> {
        &self.forwarders
    }

    pub fn forwarder(&self, name: &str) -> Result<&ServiceFunctionForwarder> {
        self.forwarders
            .get(name)
            .ok_or_else(|| RendererError::forwarder_not_found(name))
    }

    pub fn function(&self, name: &str) -> Result<&ServiceFunction> {
        self.functions
            .get(name)
            .ok_or_else(|| RendererError::function_not_found(name))
    }

    pub fn forwarder_mut(&mut self, name: &str) -> Option<&mut ServiceFunctionForwarder> {
        self.forwarders.get_mut(name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut ServiceFunction> {
        self.functions.get_mut(name)
    }
}
