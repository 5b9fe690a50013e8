//! Host platform (linux for example) utility functions

use std::path::PathBuf;

/// Name of the environment variable holding the software root directory.
pub const SW_ROOT_ENV: &str = "KIOSK_HAL_SW_ROOT";

/// Retrieve uname information.
pub fn get_uname() -> std::io::Result<uname::Info> {
    uname::uname()
}

/// Get the software root directory, which contains the `params` and `sessions` directories.
pub fn get_sw_root() -> Result<PathBuf, std::env::VarError> {
    std::env::var(SW_ROOT_ENV).map(PathBuf::from)
}
