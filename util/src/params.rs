//! Parameter file loading.
//!
//! Parameter files are TOML documents stored in the `params` directory beneath the software root
//! (see [`crate::host::get_sw_root`]).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::fs::read_to_string;
use std::path::PathBuf;
use thiserror::Error;
use toml;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("The software root environment variable (KIOSK_HAL_SW_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot load the parmeter file {0:?}: {1}")]
    FileLoadError(PathBuf, std::io::Error),

    #[error("Cannot read the parameter file: {0}")]
    DeserialiseError(toml::de::Error),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Full path of a parameter file given its path relative to the `params` directory.
pub fn param_file_path(param_file_path: &str) -> Result<PathBuf, LoadError> {
    let mut path = crate::host::get_sw_root().map_err(|_| LoadError::SwRootNotSet)?;
    path.push("params");
    path.push(param_file_path);
    Ok(path)
}

/// Load a parameter file
///
/// The file path is relative to the `params` directory under the software root.
pub fn load<P>(param_file_path: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    let path = self::param_file_path(param_file_path)?;

    let params_str = match read_to_string(&path) {
        Ok(s) => s,
        Err(e) => return Err(LoadError::FileLoadError(path, e)),
    };

    parse(params_str.as_str())
}

/// Parse parameters from a TOML string.
pub fn parse<P>(params_str: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    toml::from_str(params_str).map_err(LoadError::DeserialiseError)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    struct Timing {
        pause_ms: u64,
        #[serde(default)]
        retries: u32,
    }

    #[test]
    fn test_parse() {
        let t: Timing = parse("pause_ms = 20").unwrap();
        assert_eq!(t.pause_ms, 20);
        assert_eq!(t.retries, 0);

        match parse::<Timing>("pause_ms = \"slow\"") {
            Err(LoadError::DeserialiseError(_)) => (),
            other => panic!("Expected a deserialise error, got {:?}", other),
        }
    }
}
