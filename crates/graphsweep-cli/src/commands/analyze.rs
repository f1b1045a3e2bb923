//! Analyze command: collect and resolve, read-only

use std::collections::BTreeMap;
use std::error::Error;

use clap::Args;
use graphsweep_core::addon::AddonSet;
use graphsweep_core::{
    DependencyResolver, DescriptorRegistry, GraphCollector, Heap, NamespacePattern, ObjectGraph,
    Resolution, RunConfig, SweepError,
};
use serde_json::json;

use super::input::{default_registry, Format, InputArgs, Inputs};

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,
}

pub fn execute(args: AnalyzeArgs) -> Result<(), Box<dyn Error>> {
    let Inputs {
        mut heap,
        descriptors,
        config,
    } = args.input.load()?;
    let registry = default_registry(&config);
    let mut addons = AddonSet::resolve(&registry, &config)?;
    let wrappers = config.wrapper_patterns()?;

    let failed = addons.run_pre_clean(&mut heap);
    if !failed.is_empty() {
        let _ = addons.run_post_clean(&mut heap);
        return Err(hook_failed("PreClean", failed));
    }
    let analysis = analyze(&heap, &descriptors, &addons, &wrappers, &config);
    let failed = addons.run_post_clean(&mut heap);
    let (graph, resolution) = analysis?;
    if !failed.is_empty() {
        return Err(hook_failed("PostClean", failed));
    }

    let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
    for &object in resolution.removable() {
        *by_type.entry(heap.type_name(object).unwrap_or("?")).or_default() += 1;
    }
    let by_addon = resolution.counts_by_addon(&addons);

    match args.format {
        Format::Text => {
            println!(
                "Objects: {} ({} containers)",
                graph.objects().len(),
                graph.containers().len()
            );
            println!("Removable: {}", resolution.len());
            for (addon, count) in &by_addon {
                println!("  by {}: {}", addon, count);
            }
            for (type_name, count) in &by_type {
                println!("  {}: {}", type_name, count);
            }
            println!("Failed: {}", resolution.failed().len());
            println!("Blocked: {}", resolution.blocked().len());
            for &(object, ancestor) in resolution.blocked() {
                println!(
                    "  {} ({}) under {} ({})",
                    object,
                    heap.type_name(object).unwrap_or("?"),
                    ancestor,
                    heap.type_name(ancestor).unwrap_or("?")
                );
            }
        }
        Format::Json => {
            let blocked: Vec<_> = resolution
                .blocked()
                .iter()
                .map(|(object, ancestor)| json!({ "object": object, "ancestor": ancestor }))
                .collect();
            let output = json!({
                "objects": graph.objects().len(),
                "containers": graph.containers().len(),
                "removable": resolution.removable(),
                "by_addon": by_addon,
                "by_type": by_type,
                "failed": resolution.failed(),
                "blocked": blocked,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn analyze(
    heap: &Heap,
    descriptors: &DescriptorRegistry,
    addons: &AddonSet,
    wrappers: &[NamespacePattern],
    config: &RunConfig,
) -> graphsweep_core::Result<(ObjectGraph, Resolution)> {
    let graph = GraphCollector::collect(heap, descriptors)?;
    let resolution = DependencyResolver::new(
        heap,
        &graph,
        descriptors,
        addons,
        wrappers,
        config.compatibility_mode,
    )
    .resolve();
    Ok((graph, resolution))
}

fn hook_failed(hook: &str, addons: Vec<String>) -> Box<dyn Error> {
    SweepError::HookFailed {
        hook: hook.to_string(),
        addons,
    }
    .into()
}
