//! Validator registry and the pipeline that runs it.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::cache::DecisionCache;
use super::rules::{HandleLinksValidator, HandleValidator, TossValidator};
use super::{Decision, PackageRequirement, ValidationKey, ValidationRejected, ValidationRequest, Validator};
use crate::config::NodeConfig;
use crate::directory::HANDLE_TAG;
use crate::store::StoreError;
use crate::types::{EntryHash, EntryType};

/// Registry of validators keyed by entry type or link tag.
///
/// Built once at node startup; lookups never change afterwards.
#[derive(Clone, Default)]
pub struct ValidationRegistry {
    entries: BTreeMap<EntryType, Arc<dyn Validator>>,
    tags: BTreeMap<String, Arc<dyn Validator>>,
    /// Reject writes whose key has no registered validator.
    strict: bool,
}

impl ValidationRegistry {
    /// Create an empty registry.
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            ..Self::default()
        }
    }

    /// Create the registry for this application's entry types and tags.
    pub fn with_defaults(config: &NodeConfig) -> Self {
        let mut registry = Self::new(config.strict_validation);
        registry.register_entry(EntryType::Handle, HandleValidator);
        registry.register_entry(EntryType::Toss, TossValidator);
        registry.register_entry(EntryType::Anchor, super::AcceptAll);
        registry.register_entry(EntryType::Links, super::AcceptAll);
        registry.register_tag(
            HANDLE_TAG,
            HandleLinksValidator::new(config.collection_root.clone()),
        );
        registry
    }

    /// Register the validator for an entry type, replacing any previous one.
    pub fn register_entry(&mut self, entry_type: EntryType, validator: impl Validator + 'static) {
        self.entries.insert(entry_type, Arc::new(validator));
    }

    /// Register the validator for a link tag, replacing any previous one.
    pub fn register_tag(&mut self, tag: impl Into<String>, validator: impl Validator + 'static) {
        self.tags.insert(tag.into(), Arc::new(validator));
    }

    /// Resolve the validator for a key.
    pub fn resolve(&self, key: &ValidationKey) -> Option<&dyn Validator> {
        match key {
            ValidationKey::Entry(t) => self.entries.get(t).map(|v| v.as_ref()),
            ValidationKey::LinkTag(tag) => self.tags.get(tag).map(|v| v.as_ref()),
        }
    }

    /// Package requirement declared for a key.
    pub fn requirement(&self, key: &ValidationKey) -> PackageRequirement {
        self.resolve(key)
            .map(|v| v.package_requirement())
            .unwrap_or_default()
    }

    /// All registered keys, in canonical order.
    pub fn keys(&self) -> Vec<ValidationKey> {
        self.entries
            .keys()
            .map(|t| ValidationKey::Entry(*t))
            .chain(self.tags.keys().map(|t| ValidationKey::LinkTag(t.clone())))
            .collect()
    }

    /// Whether unknown keys are rejected.
    pub fn is_strict(&self) -> bool {
        self.strict
    }
}

impl std::fmt::Debug for ValidationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationRegistry")
            .field("keys", &self.keys())
            .field("strict", &self.strict)
            .finish()
    }
}

/// Runs validators for one node.
#[derive(Debug, Clone)]
pub struct ValidationPipeline {
    registry: ValidationRegistry,
    cache: DecisionCache,
}

impl ValidationPipeline {
    /// Create a pipeline.
    pub fn new(registry: ValidationRegistry, cache: DecisionCache) -> Self {
        Self { registry, cache }
    }

    /// The registry in use.
    pub fn registry(&self) -> &ValidationRegistry {
        &self.registry
    }

    /// The decision cache in use.
    pub fn cache(&self) -> &DecisionCache {
        &self.cache
    }

    /// Validate one write.
    ///
    /// `header_hash` identifies the commit for caching; `entry_hash` is
    /// reported on rejection. A package that does not match the header is an
    /// error, not a decision, and is not cached.
    pub fn check(
        &self,
        header_hash: &EntryHash,
        entry_hash: &EntryHash,
        request: &ValidationRequest<'_>,
    ) -> Result<(), StoreError> {
        let key = request.key;

        let decision = match self.cache.get(header_hash, key) {
            Some(decision) => {
                debug!(key = %key, hash = %entry_hash, "validation decision from cache");
                decision
            }
            None => {
                let decision = self.decide(request)?;
                self.cache.put(header_hash, key, decision.clone());
                decision
            }
        };

        match decision {
            Decision::Accept => {
                debug!(key = %key, hash = %entry_hash, "validation accepted");
                Ok(())
            }
            Decision::Reject(reason) => {
                info!(key = %key, hash = %entry_hash, reason = %reason, "validation rejected");
                Err(ValidationRejected {
                    key: key.clone(),
                    hash: entry_hash.clone(),
                    reason,
                }
                .into())
            }
        }
    }

    fn decide(&self, request: &ValidationRequest<'_>) -> Result<Decision, StoreError> {
        let Some(validator) = self.registry.resolve(request.key) else {
            return Ok(if self.registry.strict {
                Decision::reject(format!("no validator registered for {}", request.key))
            } else {
                Decision::Accept
            });
        };

        request
            .package
            .verify_for(request.header, &validator.package_requirement())
            .map_err(StoreError::InvalidPackage)?;

        if request.author() != Some(&request.header.author) {
            return Ok(Decision::reject("first source is not the header author"));
        }

        Ok(validator.validate(request))
    }
}
