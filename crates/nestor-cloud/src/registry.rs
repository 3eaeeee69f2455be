//! Resource registry
//!
//! Maps logical ids to the provider-assigned attributes of reconciled
//! resources. Owned by a single provisioning run.

use crate::error::{CloudError, Result};
use crate::resource::{AttributeName, Attributes, LogicalResourceId, RegisteredResource, ResourceKind};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Default, Clone)]
pub struct ResourceRegistry {
    resources: BTreeMap<LogicalResourceId, RegisteredResource>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one attribute. Re-registering an attribute overwrites it, but
    /// an id can never change kind.
    pub fn register(
        &mut self,
        id: &LogicalResourceId,
        kind: ResourceKind,
        attribute: AttributeName,
        value: impl Into<String>,
    ) -> Result<()> {
        let value = value.into();
        debug!(id = %id, kind = %kind, attribute = %attribute, value = %value, "registering attribute");

        let entry = self
            .resources
            .entry(id.clone())
            .or_insert_with(|| RegisteredResource {
                id: id.clone(),
                kind,
                attributes: Attributes::new(),
            });

        if entry.kind != kind {
            return Err(CloudError::KindConflict {
                id: id.clone(),
                existing: entry.kind,
                requested: kind,
            });
        }

        entry.attributes.insert(attribute, value);
        Ok(())
    }

    pub fn register_all(
        &mut self,
        id: &LogicalResourceId,
        kind: ResourceKind,
        attributes: &Attributes,
    ) -> Result<()> {
        if let Some(existing) = self.resources.get(id) {
            if existing.kind != kind {
                return Err(CloudError::KindConflict {
                    id: id.clone(),
                    existing: existing.kind,
                    requested: kind,
                });
            }
        }
        for (attribute, value) in attributes {
            self.register(id, kind, *attribute, value.clone())?;
        }
        Ok(())
    }

    pub fn lookup(&self, id: &LogicalResourceId) -> Option<&RegisteredResource> {
        self.resources.get(id)
    }

    pub fn get_attribute(&self, id: &LogicalResourceId, attribute: AttributeName) -> Option<&str> {
        self.lookup(id).and_then(|resource| resource.attribute(attribute))
    }

    pub fn contains(&self, id: &LogicalResourceId) -> bool {
        self.resources.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredResource> {
        self.resources.values()
    }
}
