use super::{MethodDescriptor, ServiceDefinition};
use crate::error::RegistryError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Table of every method a hub serves, keyed by `Service.Method`.
///
/// Mutation takes `&mut self`; once the registry is shared with connections
/// (behind an `Arc`) it is read-only.
#[derive(Debug, Default)]
pub struct MethodRegistry {
    methods: HashMap<String, Arc<MethodDescriptor>>,
    services: HashMap<String, Vec<String>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every method of `service`, or none of them.
    pub fn add_service(&mut self, service: ServiceDefinition) -> Result<(), RegistryError> {
        if self.services.contains_key(service.name()) {
            return Err(RegistryError::DuplicateService(service.name().to_owned()));
        }

        let mut seen = HashSet::new();
        for descriptor in service.methods() {
            let full_name = descriptor.full_name();
            if self.methods.contains_key(full_name) || !seen.insert(full_name) {
                return Err(RegistryError::DuplicateMethod(full_name.to_owned()));
            }
        }

        let (name, methods) = service.into_parts();
        let mut names = Vec::with_capacity(methods.len());
        for descriptor in methods {
            names.push(descriptor.full_name().to_owned());
            self.methods
                .insert(descriptor.full_name().to_owned(), Arc::new(descriptor));
        }
        tracing::debug!("Registered service {} with {} methods", name, names.len());
        self.services.insert(name, names);

        Ok(())
    }

    pub fn register_method(&mut self, descriptor: MethodDescriptor) -> Result<(), RegistryError> {
        let full_name = descriptor.full_name().to_owned();
        if self.methods.contains_key(&full_name) {
            return Err(RegistryError::DuplicateMethod(full_name));
        }

        self.services
            .entry(descriptor.service().to_owned())
            .or_default()
            .push(full_name.clone());
        self.methods.insert(full_name, Arc::new(descriptor));

        Ok(())
    }

    /// Removes every method of a service. Returns how many were removed.
    pub fn remove_service(&mut self, name: &str) -> Result<usize, RegistryError> {
        let names = self
            .services
            .remove(name)
            .ok_or_else(|| RegistryError::ServiceNotFound(name.to_owned()))?;
        for full_name in &names {
            self.methods.remove(full_name);
        }
        Ok(names.len())
    }

    pub fn get(&self, full_name: &str) -> Option<&Arc<MethodDescriptor>> {
        self.methods.get(full_name)
    }

    pub fn has_method(&self, full_name: &str) -> bool {
        self.methods.contains_key(full_name)
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
