//! Loading of world, descriptor and configuration files

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};
use graphsweep_core::descriptor::DescriptorSpec;
use graphsweep_core::{AddonRegistry, DescriptorRegistry, Heap, RunConfig};
use graphsweep_engine::register_default_addon;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// World heap as JSON; a snapshot document works too
    #[arg(long)]
    pub world: PathBuf,

    /// Type descriptors, TOML when the extension is .toml, JSON otherwise
    #[arg(long)]
    pub descriptors: PathBuf,

    /// Run configuration (TOML); defaults apply when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Block removals nobody has authority over
    #[arg(long)]
    pub compat: bool,
}

pub struct Inputs {
    pub heap: Heap,
    pub descriptors: DescriptorRegistry,
    pub config: RunConfig,
}

impl InputArgs {
    pub fn load(&self) -> Result<Inputs, Box<dyn Error>> {
        let heap: Heap = serde_json::from_str(&read(&self.world)?)
            .map_err(|e| format!("{} is not a world file: {}", self.world.display(), e))?;

        let text = read(&self.descriptors)?;
        let spec = match self.descriptors.extension().and_then(|e| e.to_str()) {
            Some("toml") => DescriptorSpec::from_toml_str(&text)?,
            _ => DescriptorSpec::from_json_str(&text)?,
        };

        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };
        if self.compat {
            config.compatibility_mode = true;
        }

        Ok(Inputs {
            heap,
            descriptors: DescriptorRegistry::from_spec(&spec),
            config,
        })
    }
}

/// Registry holding the built-in addon configured by `config`
pub fn default_registry(config: &RunConfig) -> AddonRegistry {
    let mut registry = AddonRegistry::new();
    register_default_addon(&mut registry, &config.default_addon);
    registry
}

fn read(path: &Path) -> Result<String, Box<dyn Error>> {
    fs::read_to_string(path).map_err(|e| format!("Cannot read {}: {}", path.display(), e).into())
}
