//! Addon contract: pluggable removability rules
//!
//! An [`Addon`] bundles ordered hook lists (removable, essential,
//! dependencies, remove-child handlers, run hooks) with typed settings and
//! the namespace patterns it has authority over. Hooks run in registration
//! order. Addons are process-lifetime; anything a hook needs to remember
//! during a run goes in the run-scoped [`AddonScratch`].

pub mod pattern;
pub mod registry;
pub mod settings;

pub use pattern::NamespacePattern;
pub use registry::{AddonRegistry, AddonSet, ActiveAddon, DEFAULT_OWNER};
pub use settings::{SettingDef, SettingKind, SettingValue, SettingValues};

use std::collections::BTreeMap;
use std::fmt;

use crate::ancestry::AncestryChain;
use crate::collector::ObjectGraph;
use crate::errors::Result;
use crate::heap::{Handle, Heap};

/// Run-scoped scratch slots owned by one addon
///
/// Populated by pre-clean hooks, read by predicates, cleared when the run
/// ends whichever way it ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddonScratch {
    slots: BTreeMap<String, Vec<Handle>>,
}

impl AddonScratch {
    pub fn set(&mut self, key: impl Into<String>, handles: Vec<Handle>) {
        self.slots.insert(key.into(), handles);
    }

    pub fn get(&self, key: &str) -> &[Handle] {
        self.slots.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn first(&self, key: &str) -> Option<Handle> {
        self.get(key).first().copied()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Read-only view handed to predicate and dependency hooks
#[derive(Clone, Copy)]
pub struct AddonContext<'a> {
    pub heap: &'a Heap,
    pub graph: &'a ObjectGraph,
    pub settings: &'a SettingValues,
    pub scratch: &'a AddonScratch,
}

/// Mutable view handed to pre-clean, post-clean and wipe hooks
pub struct HookContext<'a> {
    pub heap: &'a mut Heap,
    pub settings: &'a SettingValues,
    pub scratch: &'a mut AddonScratch,
}

pub type PredicateHook = Box<dyn Fn(&AddonContext<'_>, Handle) -> bool + Send + Sync>;
pub type DependencyHook = Box<dyn Fn(&AddonContext<'_>, Handle) -> Vec<Handle> + Send + Sync>;
pub type CanRemoveHook = Box<dyn Fn(&AddonContext<'_>, &AncestryChain) -> bool + Send + Sync>;
pub type DoRemoveHook = Box<dyn Fn(&mut Heap, &ObjectGraph, &AncestryChain) -> bool + Send + Sync>;
pub type RunHook = Box<dyn Fn(&mut HookContext<'_>) -> bool + Send + Sync>;

/// Dry-run / do pair for detaching a chain's child from its parent
pub struct RemoveChildHandler {
    can: CanRemoveHook,
    apply: DoRemoveHook,
}

/// A registered capability bundle
pub struct Addon {
    id: String,
    name: String,
    settings: Vec<SettingDef>,
    authority: Vec<NamespacePattern>,
    pre_clean: Vec<RunHook>,
    post_clean: Vec<RunHook>,
    removable: Vec<PredicateHook>,
    essential: Vec<PredicateHook>,
    dependencies: Vec<DependencyHook>,
    remove_child: Vec<RemoveChildHandler>,
    wipe: Vec<RunHook>,
}

impl Addon {
    pub fn builder(id: &str, name: &str) -> AddonBuilder {
        AddonBuilder {
            addon: Addon {
                id: id.to_string(),
                name: name.to_string(),
                settings: Vec::new(),
                authority: Vec::new(),
                pre_clean: Vec::new(),
                post_clean: Vec::new(),
                removable: Vec::new(),
                essential: Vec::new(),
                dependencies: Vec::new(),
                remove_child: Vec::new(),
                wipe: Vec::new(),
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared settings, sorted by display order
    pub fn settings(&self) -> Vec<&SettingDef> {
        let mut defs: Vec<&SettingDef> = self.settings.iter().collect();
        defs.sort_by_key(|d| d.order);
        defs
    }

    pub fn setting_defs(&self) -> &[SettingDef] {
        &self.settings
    }

    pub fn authority(&self) -> &[NamespacePattern] {
        &self.authority
    }

    /// Whether this addon may approve removals from `namespace`
    pub fn has_authority(&self, namespace: &str) -> bool {
        self.authority.iter().any(|p| p.matches(namespace))
    }

    pub fn is_removable(&self, ctx: &AddonContext<'_>, object: Handle) -> bool {
        self.removable.iter().any(|hook| hook(ctx, object))
    }

    pub fn is_essential(&self, ctx: &AddonContext<'_>, object: Handle) -> bool {
        self.essential.iter().any(|hook| hook(ctx, object))
    }

    /// Union of every dependency hook's output, first occurrence order
    pub fn dependencies(&self, ctx: &AddonContext<'_>, object: Handle) -> Vec<Handle> {
        let mut out: Vec<Handle> = Vec::new();
        for hook in &self.dependencies {
            for dep in hook(ctx, object) {
                if !out.contains(&dep) {
                    out.push(dep);
                }
            }
        }
        out
    }

    pub fn has_remove_child_handlers(&self) -> bool {
        !self.remove_child.is_empty()
    }

    /// Index of the first handler whose dry-run approves the chain
    pub fn approving_handler(&self, ctx: &AddonContext<'_>, chain: &AncestryChain) -> Option<usize> {
        self.remove_child.iter().position(|h| (h.can)(ctx, chain))
    }

    /// Run the `do` half of a handler previously approved by [`Self::approving_handler`]
    pub fn apply_handler(
        &self,
        index: usize,
        heap: &mut Heap,
        graph: &ObjectGraph,
        chain: &AncestryChain,
    ) -> bool {
        self.remove_child
            .get(index)
            .is_some_and(|h| (h.apply)(heap, graph, chain))
    }

    pub fn has_wipe(&self) -> bool {
        !self.wipe.is_empty()
    }

    /// Every pre-clean hook runs; true when all succeed
    pub fn run_pre_clean(&self, ctx: &mut HookContext<'_>) -> bool {
        run_all(&self.pre_clean, ctx)
    }

    pub fn run_post_clean(&self, ctx: &mut HookContext<'_>) -> bool {
        run_all(&self.post_clean, ctx)
    }

    pub fn run_wipe(&self, ctx: &mut HookContext<'_>) -> bool {
        run_all(&self.wipe, ctx)
    }

    /// Resolve this addon's settings against configured overrides
    ///
    /// # Errors
    ///
    /// See [`SettingValues::resolve`].
    pub fn resolve_settings(
        &self,
        overrides: &BTreeMap<String, SettingValue>,
    ) -> Result<SettingValues> {
        SettingValues::resolve(&self.id, &self.settings, overrides)
    }
}

fn run_all(hooks: &[RunHook], ctx: &mut HookContext<'_>) -> bool {
    hooks.iter().fold(true, |ok, hook| hook(ctx) && ok)
}

impl fmt::Debug for Addon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Addon")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("authority", &self.authority)
            .field("removable", &self.removable.len())
            .field("essential", &self.essential.len())
            .field("dependencies", &self.dependencies.len())
            .field("remove_child", &self.remove_child.len())
            .field("wipe", &self.wipe.len())
            .finish()
    }
}

/// Builder for [`Addon`]
pub struct AddonBuilder {
    addon: Addon,
}

impl AddonBuilder {
    pub fn setting(mut self, def: SettingDef) -> Self {
        self.addon.settings.push(def);
        self
    }

    /// Claim authority over namespaces matching `glob`
    ///
    /// # Errors
    ///
    /// Returns `InvalidPattern` if the glob does not compile.
    pub fn authority(mut self, glob: &str) -> Result<Self> {
        self.addon.authority.push(NamespacePattern::new(glob)?);
        Ok(self)
    }

    pub fn on_pre_clean(
        mut self,
        hook: impl Fn(&mut HookContext<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.addon.pre_clean.push(Box::new(hook));
        self
    }

    pub fn on_post_clean(
        mut self,
        hook: impl Fn(&mut HookContext<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.addon.post_clean.push(Box::new(hook));
        self
    }

    pub fn removable(
        mut self,
        hook: impl Fn(&AddonContext<'_>, Handle) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.addon.removable.push(Box::new(hook));
        self
    }

    pub fn essential(
        mut self,
        hook: impl Fn(&AddonContext<'_>, Handle) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.addon.essential.push(Box::new(hook));
        self
    }

    pub fn dependencies(
        mut self,
        hook: impl Fn(&AddonContext<'_>, Handle) -> Vec<Handle> + Send + Sync + 'static,
    ) -> Self {
        self.addon.dependencies.push(Box::new(hook));
        self
    }

    pub fn remove_child(
        mut self,
        can: impl Fn(&AddonContext<'_>, &AncestryChain) -> bool + Send + Sync + 'static,
        apply: impl Fn(&mut Heap, &ObjectGraph, &AncestryChain) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.addon.remove_child.push(RemoveChildHandler {
            can: Box::new(can),
            apply: Box::new(apply),
        });
        self
    }

    pub fn on_wipe(
        mut self,
        hook: impl Fn(&mut HookContext<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.addon.wipe.push(Box::new(hook));
        self
    }

    pub fn build(self) -> Addon {
        self.addon
    }
}
