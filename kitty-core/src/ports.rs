//! Port traits abstracting all I/O away from the pipeline.

use camino::Utf8Path;
use kitty_types::input::KittyInput;
use kitty_types::plan::KittyPlan;

/// Source of the group's input document.
pub trait InputSource {
    fn load_input(&self) -> anyhow::Result<KittyInput>;
}

/// Source of a previously written plan, for `check`.
pub trait PlanSource {
    fn load_plan(&self) -> anyhow::Result<KittyPlan>;
}

/// File-system write operations.
pub trait WritePort {
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()>;
    fn create_dir_all(&self, path: &Utf8Path) -> anyhow::Result<()>;
}
