use std::collections::HashMap;
use std::env;
use std::sync::OnceLock;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use tracing::info;

use crate::collective::TaskPlacement;
use crate::error::{Error, Result};

const ENV_PIPELINE_SPLIT: &str = "FLOWRELAY_PIPELINE_SPLIT";
const ENV_PLACEMENT_OBJECT: &str = "FLOWRELAY_PLACEMENT_OBJECT";

/// Returns the process-wide collective settings, loading them from the
/// environment on first use.
pub fn config() -> &'static Settings {
    static CONF: OnceLock<Settings> = OnceLock::new();
    CONF.get_or_init(|| match Settings::load(env::vars().collect()) {
        Ok(v) => v,
        Err(e) => {
            panic!("Failed to load configuration: {:?}", e);
        }
    })
}

/// Collective-communication settings handed down by the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// Split the relay chain into two half-chains, both rooted at the
    /// broadcast root, to halve the worst-case relay depth.
    pub pipeline_split: bool,
}

impl Settings {
    /// Loads settings from the given environment variables. Taking the
    /// variables as a map keeps the process environment out of tests.
    pub fn load(env_vars: HashMap<String, String>) -> Result<Self> {
        let pipeline_split = match env_vars.get(ENV_PIPELINE_SPLIT) {
            Some(value) => value.parse().map_err(|e| {
                Error::Config(format!(
                    "Failed to parse {ENV_PIPELINE_SPLIT}='{value}': {e:?}"
                ))
            })?,
            None => false,
        };
        Ok(Settings { pipeline_split })
    }
}

/// Loads the placement object published by the assignment subsystem: a
/// base64-encoded JSON mapping of supervisors to workers to tasks, plus the
/// root task location.
pub fn load_placement(env_vars: HashMap<String, String>) -> Result<TaskPlacement> {
    let encoded = env_vars.get(ENV_PLACEMENT_OBJECT).ok_or_else(|| {
        Error::Config(format!(
            "Environment variable {ENV_PLACEMENT_OBJECT} is not set"
        ))
    })?;

    let decoded = BASE64_STANDARD.decode(encoded.as_bytes()).map_err(|e| {
        Error::Config(format!(
            "Failed to base64 decode value of environment variable '{ENV_PLACEMENT_OBJECT}': {e:?}"
        ))
    })?;

    let placement: TaskPlacement = serde_json::from_slice(&decoded)
        .map_err(|e| Error::Config(format!("Failed to parse placement object: {e:?}")))?;

    info!("Loaded placement object: {:?}", placement);
    Ok(placement)
}
