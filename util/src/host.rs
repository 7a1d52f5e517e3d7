//! Host platform utility functions

use std::path::PathBuf;

/// Name of the environment variable pointing at the root of the software tree.
pub const SW_ROOT_ENV_VAR: &str = "GRIDMAP_SW_ROOT";

/// Get the root directory of the software, as given by the `GRIDMAP_SW_ROOT` environment
/// variable.
///
/// The `params` and `sessions` directories are resolved relative to this path.
pub fn get_sw_root() -> Result<PathBuf, std::env::VarError> {
    std::env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}
