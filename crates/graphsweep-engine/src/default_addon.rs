//! Built-in catch-all addon
//!
//! Registered under the default owner, so it is evaluated first and decides
//! edges nobody else has authority over (outside compatibility mode). Its
//! removal rules come from the run configuration:
//!
//! - detached objects: a configured activity flag is false and every anchor
//!   field is null
//! - abandoned objects: the only remaining parent is a registry container
//!   held by a named owner object
//!
//! The root object is always essential.

use std::sync::Arc;

use graphsweep_core::addon::{AddonContext, HookContext, SettingDef, DEFAULT_OWNER};
use graphsweep_core::config::{AbandonedRule, DefaultAddonRules, DetachedRule};
use graphsweep_core::{Addon, AddonRegistry, Handle, Heap, Value};

/// Setting ids and metadata of the default addon
pub struct DefaultAddon;

impl DefaultAddon {
    pub const ID: &'static str = "graphsweep";
    pub const NAME: &'static str = "Graph Sweep";
    pub const REMOVE_DETACHED: &'static str = "remove_detached";
    pub const REMOVE_ABANDONED: &'static str = "remove_abandoned";

    /// Build the addon for a set of rules
    pub fn build(rules: &DefaultAddonRules) -> Addon {
        let detached = Arc::new(rules.detached.clone());
        let abandoned = Arc::new(rules.abandoned.clone());

        let mut builder = Addon::builder(Self::ID, Self::NAME)
            .setting(
                SettingDef::bool(
                    Self::REMOVE_DETACHED,
                    "Remove Detached Objects",
                    "Objects that are inactive and no longer anchored anywhere. Usually spawned by other addons.",
                    true,
                )
                .with_order(0),
            )
            .setting(
                SettingDef::bool(
                    Self::REMOVE_ABANDONED,
                    "Remove Abandoned Objects",
                    "Objects kept alive only by a registry container after everything else dropped them.",
                    true,
                )
                .with_order(1),
            )
            .essential(|ctx, object| ctx.heap.root() == Some(object));

        let pre_rules = Arc::clone(&abandoned);
        builder = builder
            .on_pre_clean(move |ctx| {
                cache_containers(ctx, &pre_rules);
                true
            })
            .on_post_clean(|ctx| {
                ctx.scratch.clear();
                true
            });

        builder = builder.removable(move |ctx, object| {
            ctx.settings.flag(Self::REMOVE_DETACHED, true)
                && detached.iter().any(|rule| is_detached(ctx.heap, rule, object))
        });
        builder = builder.removable(move |ctx, object| {
            ctx.settings.flag(Self::REMOVE_ABANDONED, true)
                && abandoned
                    .iter()
                    .enumerate()
                    .any(|(index, rule)| is_abandoned(ctx, index, rule, object))
        });

        builder.build()
    }
}

/// Register the default addon under the default owner
pub fn register_default_addon(registry: &mut AddonRegistry, rules: &DefaultAddonRules) {
    registry.register(DEFAULT_OWNER, DefaultAddon::build(rules));
}

fn container_slot(index: usize) -> String {
    format!("abandoned.{}", index)
}

fn cache_containers(ctx: &mut HookContext<'_>, rules: &[AbandonedRule]) {
    if !ctx.settings.flag(DefaultAddon::REMOVE_ABANDONED, true) {
        return;
    }
    for (index, rule) in rules.iter().enumerate() {
        match registry_container(ctx.heap, rule) {
            Some(container) => ctx.scratch.set(container_slot(index), vec![container]),
            None => tracing::warn!(
                owner = rule.owner.as_str(),
                field = rule.container_field.as_str(),
                type_name = rule.type_name.as_str(),
                "Registry container not found; abandoned-object rule disabled for this run"
            ),
        }
    }
}

fn registry_container(heap: &Heap, rule: &AbandonedRule) -> Option<Handle> {
    let owner = heap.lookup_named(&rule.owner)?;
    heap.get(owner)
        .ok()?
        .field(&rule.container_field)
        .and_then(Value::as_handle)
}

fn is_detached(heap: &Heap, rule: &DetachedRule, object: Handle) -> bool {
    if heap.type_name(object) != Some(rule.type_name.as_str()) {
        return false;
    }
    let Ok(obj) = heap.get(object) else {
        return false;
    };
    obj.field(&rule.active_field).and_then(Value::as_bool) == Some(false)
        && rule
            .anchor_fields
            .iter()
            .all(|name| obj.field(name).map_or(true, Value::is_null))
}

fn is_abandoned(ctx: &AddonContext<'_>, index: usize, rule: &AbandonedRule, object: Handle) -> bool {
    if ctx.heap.type_name(object) != Some(rule.type_name.as_str()) {
        return false;
    }
    let Some(container) = ctx.scratch.first(&container_slot(index)) else {
        return false;
    };
    let parents = ctx.graph.parents(object);
    parents.len() == 1 && parents.contains(&container)
}
