//! Addon registration and the per-run active addon set

use std::sync::Arc;

use crate::addon::{Addon, AddonContext, AddonScratch, HookContext, SettingValues};
use crate::collector::ObjectGraph;
use crate::config::RunConfig;
use crate::errors::{Result, SweepError};
use crate::heap::{Handle, Heap};

/// Owner key of the built-in catch-all addon
pub const DEFAULT_OWNER: &str = "graphsweep";

#[derive(Debug, Clone)]
struct RegistryEntry {
    owner: String,
    addon: Arc<Addon>,
}

/// Process-lifetime addon registry
///
/// Keyed by owner: registering again under the same owner replaces the
/// previous addon in place. The default owner's addon always sits first,
/// which makes it the catch-all.
#[derive(Debug, Clone, Default)]
pub struct AddonRegistry {
    entries: Vec<RegistryEntry>,
}

impl AddonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, owner: &str, addon: Addon) {
        let addon = Arc::new(addon);
        if let Some(entry) = self.entries.iter_mut().find(|e| e.owner == owner) {
            tracing::warn!(
                owner = owner,
                addon = addon.id(),
                replaced = entry.addon.id(),
                "Owner already registered an addon; replacing it"
            );
            entry.addon = addon;
            return;
        }

        tracing::debug!(owner = owner, addon = addon.id(), "Registered addon");
        let entry = RegistryEntry {
            owner: owner.to_string(),
            addon,
        };
        if owner == DEFAULT_OWNER {
            self.entries.insert(0, entry);
        } else {
            self.entries.push(entry);
        }
    }

    /// Remove the addon registered by `owner`
    pub fn unregister(&mut self, owner: &str) -> Option<Arc<Addon>> {
        match self.entries.iter().position(|e| e.owner == owner) {
            Some(index) => Some(self.entries.remove(index).addon),
            None => {
                tracing::warn!(owner = owner, "No addon registered for owner");
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Addons in evaluation order, with their owners
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Addon>)> {
        self.entries.iter().map(|e| (e.owner.as_str(), &e.addon))
    }

    pub fn get(&self, addon_id: &str) -> Option<&Arc<Addon>> {
        self.entries
            .iter()
            .find(|e| e.addon.id() == addon_id)
            .map(|e| &e.addon)
    }
}

/// An addon enabled for the current run, with its resolved settings
#[derive(Debug)]
pub struct ActiveAddon {
    pub owner: String,
    pub addon: Arc<Addon>,
    pub settings: SettingValues,
    pub scratch: AddonScratch,
}

/// Enabled addons of one run, in evaluation order
///
/// Settings and enablement are read once when the set is resolved; the set
/// owns every addon's scratch state for the run.
#[derive(Debug, Default)]
pub struct AddonSet {
    active: Vec<ActiveAddon>,
    catch_all: Option<usize>,
}

impl AddonSet {
    /// Snapshot the registry under a run configuration
    ///
    /// # Errors
    ///
    /// Returns `UnknownSetting` or `SettingTypeMismatch` when a configured
    /// override does not fit the addon's declared settings.
    pub fn resolve(registry: &AddonRegistry, config: &RunConfig) -> Result<Self> {
        for id in config.addons.keys() {
            if registry.get(id).is_none() {
                tracing::warn!(addon = id.as_str(), "Configuration names an unregistered addon");
            }
        }

        let mut active = Vec::new();
        let mut catch_all = None;
        for (owner, addon) in registry.iter() {
            let addon_config = config.addons.get(addon.id());
            if addon_config.is_some_and(|c| !c.enabled) {
                tracing::info!(addon = addon.id(), "Addon disabled for this run");
                continue;
            }
            let settings = match addon_config {
                Some(c) => addon.resolve_settings(&c.settings)?,
                None => addon.resolve_settings(&Default::default())?,
            };
            if owner == DEFAULT_OWNER {
                catch_all = Some(active.len());
            }
            active.push(ActiveAddon {
                owner: owner.to_string(),
                addon: Arc::clone(addon),
                settings,
                scratch: AddonScratch::default(),
            });
        }

        Ok(Self { active, catch_all })
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ActiveAddon> {
        self.active.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActiveAddon> {
        self.active.iter()
    }

    /// Id of the addon at `index`, or `"<none>"`
    pub fn id_of(&self, index: usize) -> &str {
        self.active
            .get(index)
            .map(|a| a.addon.id())
            .unwrap_or("<none>")
    }

    pub fn index_of(&self, addon_id: &str) -> Option<usize> {
        self.active.iter().position(|a| a.addon.id() == addon_id)
    }

    /// Index of the catch-all addon, if it is enabled
    pub fn catch_all(&self) -> Option<usize> {
        self.catch_all
    }

    /// Predicate context for the addon at `index`
    pub fn context<'a>(
        &'a self,
        index: usize,
        heap: &'a Heap,
        graph: &'a ObjectGraph,
    ) -> Option<AddonContext<'a>> {
        self.active.get(index).map(|a| AddonContext {
            heap,
            graph,
            settings: &a.settings,
            scratch: &a.scratch,
        })
    }

    /// First addon, in evaluation order, that marks `object` removable
    pub fn removable_owner(&self, heap: &Heap, graph: &ObjectGraph, object: Handle) -> Option<usize> {
        (0..self.active.len()).find(|&i| {
            self.context(i, heap, graph)
                .is_some_and(|ctx| self.active[i].addon.is_removable(&ctx, object))
        })
    }

    /// First addon that vetoes removal of `object` as essential
    pub fn essential_veto(&self, heap: &Heap, graph: &ObjectGraph, object: Handle) -> Option<usize> {
        (0..self.active.len()).find(|&i| {
            self.context(i, heap, graph)
                .is_some_and(|ctx| self.active[i].addon.is_essential(&ctx, object))
        })
    }

    /// First addon with authority over `namespace`
    pub fn authority_for(&self, namespace: &str) -> Option<usize> {
        self.active
            .iter()
            .position(|a| a.addon.has_authority(namespace))
    }

    /// Run every addon's pre-clean hooks; returns the ids of addons that failed
    pub fn run_pre_clean(&mut self, heap: &mut Heap) -> Vec<String> {
        self.run_hooks(heap, |addon, ctx| addon.run_pre_clean(ctx))
    }

    /// Run every addon's post-clean hooks, then drop all scratch state
    pub fn run_post_clean(&mut self, heap: &mut Heap) -> Vec<String> {
        let failed = self.run_hooks(heap, |addon, ctx| addon.run_post_clean(ctx));
        for active in &mut self.active {
            active.scratch.clear();
        }
        failed
    }

    /// Run the wipe hooks of one addon
    ///
    /// # Errors
    ///
    /// Returns `AddonNotFound` if the addon is not active in this run.
    pub fn run_wipe(&mut self, addon_id: &str, heap: &mut Heap) -> Result<bool> {
        let active = self
            .active
            .iter_mut()
            .find(|a| a.addon.id() == addon_id)
            .ok_or_else(|| SweepError::AddonNotFound {
                addon_id: addon_id.to_string(),
            })?;
        let mut ctx = HookContext {
            heap: &mut *heap,
            settings: &active.settings,
            scratch: &mut active.scratch,
        };
        Ok(active.addon.run_wipe(&mut ctx))
    }

    fn run_hooks(
        &mut self,
        heap: &mut Heap,
        run: impl Fn(&Addon, &mut HookContext<'_>) -> bool,
    ) -> Vec<String> {
        let mut failed = Vec::new();
        for active in &mut self.active {
            let mut ctx = HookContext {
                heap: &mut *heap,
                settings: &active.settings,
                scratch: &mut active.scratch,
            };
            if !run(active.addon.as_ref(), &mut ctx) {
                failed.push(active.addon.id().to_string());
            }
        }
        failed
    }
}
