use crate::HubOptions;
use uconnect::error::RegistryError;
use uconnect::rpc::{MethodDescriptor, MethodRegistry, ServiceDefinition};

/// A set of services served on one WebSocket path.
///
/// Hubs are filled before they are handed to the server; once serving, the
/// method table is shared read-only by every connection.
#[derive(Debug, Default)]
pub struct RpcHub {
    options: HubOptions,
    registry: MethodRegistry,
}

impl RpcHub {
    pub fn new(options: HubOptions) -> Self {
        Self {
            options,
            registry: MethodRegistry::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.options.path
    }

    pub fn options(&self) -> &HubOptions {
        &self.options
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    pub fn add_service(&mut self, service: ServiceDefinition) -> Result<(), RegistryError> {
        self.registry.add_service(service)
    }

    /// Builder-style [`add_service`](Self::add_service).
    pub fn with_service(mut self, service: ServiceDefinition) -> Result<Self, RegistryError> {
        self.registry.add_service(service)?;
        Ok(self)
    }

    pub fn register_method(&mut self, descriptor: MethodDescriptor) -> Result<(), RegistryError> {
        self.registry.register_method(descriptor)
    }

    pub fn remove_service(&mut self, name: &str) -> Result<usize, RegistryError> {
        self.registry.remove_service(name)
    }

    pub(crate) fn into_parts(self) -> (HubOptions, MethodRegistry) {
        (self.options, self.registry)
    }
}
