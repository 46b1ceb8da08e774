//! Default filesystem-backed port implementations.

use crate::ports::{InputSource, PlanSource, WritePort};
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use kitty_types::input::KittyInput;
use kitty_types::plan::KittyPlan;
use tracing::debug;

/// Reads a `kitty.input.v1` JSON document from disk.
#[derive(Debug, Clone)]
pub struct FsInputSource {
    pub path: Utf8PathBuf,
}

impl FsInputSource {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }
}

impl InputSource for FsInputSource {
    fn load_input(&self) -> anyhow::Result<KittyInput> {
        let raw = fs::read_to_string(&self.path)?;
        let input: KittyInput =
            serde_json::from_str(&raw).with_context(|| format!("parse {}", self.path))?;
        if let Some(schema) = &input.schema
            && schema != kitty_types::schema::KITTY_INPUT_V1
        {
            anyhow::bail!("{}: unsupported schema `{}`", self.path, schema);
        }
        debug!(
            path = self.path.as_str(),
            people = input.people.len(),
            gifts = input.gifts.len(),
            "loaded input"
        );
        Ok(input)
    }
}

/// In-memory input for embedding and testing.
#[derive(Debug, Clone)]
pub struct InMemoryInputSource {
    input: KittyInput,
}

impl InMemoryInputSource {
    pub fn new(input: KittyInput) -> Self {
        Self { input }
    }
}

impl InputSource for InMemoryInputSource {
    fn load_input(&self) -> anyhow::Result<KittyInput> {
        Ok(self.input.clone())
    }
}

/// Reads a `plan.json` artifact from disk.
#[derive(Debug, Clone)]
pub struct FsPlanSource {
    pub path: Utf8PathBuf,
}

impl FsPlanSource {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }
}

impl PlanSource for FsPlanSource {
    fn load_plan(&self) -> anyhow::Result<KittyPlan> {
        let raw = fs::read_to_string(&self.path)?;
        let plan: KittyPlan =
            serde_json::from_str(&raw).with_context(|| format!("parse {}", self.path))?;
        if plan.schema != kitty_types::schema::KITTY_PLAN_V1 {
            anyhow::bail!("{}: unsupported schema `{}`", self.path, plan.schema);
        }
        Ok(plan)
    }
}

/// Filesystem write operations.
#[derive(Debug, Clone, Default)]
pub struct FsWritePort;

impl WritePort for FsWritePort {
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create parent dir for {}", path))?;
        }
        fs::write(path, contents).with_context(|| format!("write {}", path))
    }

    fn create_dir_all(&self, path: &Utf8Path) -> anyhow::Result<()> {
        fs::create_dir_all(path).with_context(|| format!("create_dir_all {}", path))
    }
}
