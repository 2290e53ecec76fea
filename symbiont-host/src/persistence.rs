//! Shared persistence metadata, merged across plugin boundaries.
//!
//! The host owns a single [`PersistenceUnit`]; plugins contribute entity
//! types to it but never own it. A contribution is scanned under the
//! plugin's *own* loader namespace (the host cannot see plugin types),
//! then the unit's metadata is rebuilt in full. Rebuilds are
//! build-then-swap: a failed rebuild leaves the unit exactly as it was.
//! A mutex serializes rebuilds; concurrent merge requests queue.
//!
//! When a contributing plugin stops, its contribution is marked stale and
//! dropped from the next rebuild; the types stay visible until then.
//! Callers that need an immediate rebuild use `retract_contributions`.

use crate::error::HostError;
use crate::loader::ModuleLoader;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// A field of a persisted entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityField {
    pub name: String,
    pub field_type: String,
    #[serde(default)]
    pub indexed: bool,
}

impl EntityField {
    pub fn new(name: &str, field_type: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: field_type.to_string(),
            indexed: false,
        }
    }

    pub fn indexed(name: &str, field_type: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: field_type.to_string(),
            indexed: true,
        }
    }
}

/// One persisted entity type contributed by the host or a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// Fully qualified type name, e.g. `demo.shelf.model.Book`.
    pub type_name: String,
    /// Short entity name, unique across the whole persistence unit.
    pub entity_name: String,
    #[serde(default)]
    pub fields: Vec<EntityField>,
}

impl EntityDescriptor {
    pub fn new(type_name: &str, entity_name: &str, fields: Vec<EntityField>) -> Self {
        Self {
            type_name: type_name.to_string(),
            entity_name: entity_name.to_string(),
            fields,
        }
    }
}

/// Fully derived metadata of the shared persistence unit.
#[derive(Debug, Clone, Default)]
pub struct PersistenceMetadata {
    /// Entity name → descriptor.
    pub entities: BTreeMap<String, EntityDescriptor>,
    /// Bumped on every successful rebuild.
    pub revision: u64,
}

#[derive(Debug, Clone)]
struct Contribution {
    plugin_id: String,
    packages: Vec<String>,
    entities: Vec<EntityDescriptor>,
    stale: bool,
}

struct UnitState {
    base: Vec<EntityDescriptor>,
    contributions: Vec<Contribution>,
    metadata: PersistenceMetadata,
}

/// The host-owned shared persistence unit.
pub struct PersistenceUnit {
    state: Mutex<UnitState>,
}

impl PersistenceUnit {
    /// Builds the unit from the host's own entity types.
    pub fn new(base: Vec<EntityDescriptor>) -> Result<Self, HostError> {
        let metadata = derive_metadata(&base, &[], 1)?;
        Ok(Self {
            state: Mutex::new(UnitState {
                base,
                contributions: Vec::new(),
                metadata,
            }),
        })
    }

    /// Merges a plugin's model packages into the unit and rebuilds.
    ///
    /// Scanning runs against the plugin's own namespace. Returns the
    /// number of entity types merged. On rebuild failure the unit keeps
    /// its pre-merge state and the error must fail the plugin bootstrap.
    pub fn merge_model(
        &self,
        loader: &ModuleLoader,
        packages: &[&str],
    ) -> Result<usize, HostError> {
        let plugin_id = loader.plugin_id().to_string();
        let entities: Vec<EntityDescriptor> = packages
            .iter()
            .flat_map(|pkg| loader.own_types_in_package(pkg))
            .filter_map(|t| t.entity.clone())
            .collect();
        let merged = entities.len();
        if merged == 0 {
            debug!(plugin_id = %plugin_id, ?packages, "no entity types found in model packages");
        }

        let mut state = self.state.lock().expect("persistence unit lock poisoned");
        let candidate = Contribution {
            plugin_id: plugin_id.clone(),
            packages: packages.iter().map(|p| p.to_string()).collect(),
            entities,
            stale: false,
        };

        // build-then-swap: derive against current + candidate before
        // touching the live state
        let mut contributions: Vec<&Contribution> =
            state.contributions.iter().filter(|c| !c.stale).collect();
        contributions.push(&candidate);
        let metadata = derive_metadata(
            &state.base,
            &contributions,
            state.metadata.revision + 1,
        )?;

        state.contributions.push(candidate);
        state.metadata = metadata;
        info!(
            plugin_id = %plugin_id,
            entities = merged,
            revision = state.metadata.revision,
            "persistence metadata rebuilt"
        );
        Ok(merged)
    }

    /// Marks a plugin's contributions stale. The entity types remain in
    /// the current metadata until the next rebuild; the warning names
    /// them so the gap is visible.
    pub fn mark_stale(&self, plugin_id: &str) -> Vec<String> {
        let mut state = self.state.lock().expect("persistence unit lock poisoned");
        let mut stale_entities = Vec::new();
        for contribution in state
            .contributions
            .iter_mut()
            .filter(|c| c.plugin_id == plugin_id && !c.stale)
        {
            contribution.stale = true;
            stale_entities.extend(contribution.entities.iter().map(|e| e.entity_name.clone()));
        }
        if !stale_entities.is_empty() {
            warn!(
                plugin_id = %plugin_id,
                entities = ?stale_entities,
                "persistence contributions are stale; excluded from subsequent rebuilds"
            );
        }
        stale_entities
    }

    /// Drops a plugin's contributions and rebuilds immediately.
    pub fn retract_contributions(&self, plugin_id: &str) -> Result<(), HostError> {
        let mut state = self.state.lock().expect("persistence unit lock poisoned");
        let before = state.contributions.len();
        let kept: Vec<Contribution> = state
            .contributions
            .iter()
            .filter(|c| c.plugin_id != plugin_id)
            .cloned()
            .collect();
        if kept.len() == before {
            return Ok(());
        }

        let live: Vec<&Contribution> = kept.iter().filter(|c| !c.stale).collect();
        let metadata = derive_metadata(&state.base, &live, state.metadata.revision + 1)?;
        state.contributions = kept;
        state.metadata = metadata;
        info!(plugin_id = %plugin_id, revision = state.metadata.revision, "persistence contributions retracted");
        Ok(())
    }

    pub fn metadata(&self) -> PersistenceMetadata {
        self.state
            .lock()
            .expect("persistence unit lock poisoned")
            .metadata
            .clone()
    }

    pub fn revision(&self) -> u64 {
        self.state
            .lock()
            .expect("persistence unit lock poisoned")
            .metadata
            .revision
    }

    pub fn contains_entity(&self, entity_name: &str) -> bool {
        self.state
            .lock()
            .expect("persistence unit lock poisoned")
            .metadata
            .entities
            .contains_key(entity_name)
    }

    /// Model packages contributed by a plugin (diagnostics).
    pub fn contributed_packages(&self, plugin_id: &str) -> Vec<String> {
        self.state
            .lock()
            .expect("persistence unit lock poisoned")
            .contributions
            .iter()
            .filter(|c| c.plugin_id == plugin_id)
            .flat_map(|c| c.packages.iter().cloned())
            .collect()
    }
}

/// Full re-derivation of the unit metadata. Fails on duplicate entity
/// names across contributors, leaving the caller's state untouched.
fn derive_metadata(
    base: &[EntityDescriptor],
    contributions: &[&Contribution],
    revision: u64,
) -> Result<PersistenceMetadata, HostError> {
    let mut entities: BTreeMap<String, EntityDescriptor> = BTreeMap::new();
    for descriptor in base {
        if entities
            .insert(descriptor.entity_name.clone(), descriptor.clone())
            .is_some()
        {
            return Err(HostError::PersistenceRebuild(format!(
                "duplicate entity '{}' in host model",
                descriptor.entity_name
            )));
        }
    }
    for contribution in contributions {
        for descriptor in &contribution.entities {
            if entities
                .insert(descriptor.entity_name.clone(), descriptor.clone())
                .is_some()
            {
                return Err(HostError::PersistenceRebuild(format!(
                    "duplicate entity '{}' contributed by plugin '{}'",
                    descriptor.entity_name, contribution.plugin_id
                )));
            }
        }
    }
    Ok(PersistenceMetadata { entities, revision })
}
