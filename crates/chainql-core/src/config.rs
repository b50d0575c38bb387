//! Runtime configuration.
//!
//! ```toml
//! chain_id = 0
//! debug = false
//! frame_capacity = 4096
//!
//! [external_chains.payments]
//! rid = "a1b2c3..."
//! height = 1200
//! ```

use crate::{
    chain::{ConfigHeights, ExternalChainSpec, InitError},
    error::InternalError,
    interp::frame::DEFAULT_FRAME_CAPACITY,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};

///
/// RuntimeConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Database id of the local chain; tables are prefixed `c<chain_id>.`.
    pub chain_id: i64,

    /// Log every generated statement through the executor's debug channel.
    pub debug: bool,

    /// Variable slots available to one interpreted frame.
    pub frame_capacity: usize,

    pub external_chains: BTreeMap<String, ExternalChainConfig>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            chain_id: 0,
            debug: false,
            frame_capacity: DEFAULT_FRAME_CAPACITY,
            external_chains: BTreeMap::new(),
        }
    }
}

///
/// ExternalChainConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExternalChainConfig {
    /// Blockchain RID, hex encoded.
    pub rid: String,

    /// Pinned height; when absent the chain's current height is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
}

impl RuntimeConfig {
    pub fn from_toml_str(src: &str) -> Result<Self, InternalError> {
        toml::from_str(src).map_err(|err| config_error(format!("failed to parse TOML: {err}")))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, InternalError> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path).map_err(|err| {
            config_error(format!("failed to read {}: {err}", path.display()))
        })?;

        Self::from_toml_str(&src)
    }

    pub fn to_toml_string(&self) -> Result<String, InternalError> {
        toml::to_string(self).map_err(|err| config_error(format!("failed to write TOML: {err}")))
    }

    /// Declared external chains with decoded RIDs, in name order.
    pub fn external_specs(&self) -> Result<Vec<ExternalChainSpec>, InternalError> {
        self.external_chains
            .iter()
            .map(|(name, chain)| {
                let rid = hex::decode(&chain.rid).map_err(|err| {
                    config_error(format!("external chain '{name}': invalid RID: {err}"))
                })?;

                Ok(ExternalChainSpec::new(name.clone(), rid))
            })
            .collect()
    }

    /// Heights pinned by configuration.
    #[must_use]
    pub fn config_heights(&self) -> ConfigHeights {
        let heights = self
            .external_chains
            .iter()
            .filter_map(|(name, chain)| chain.height.map(|h| (name.clone(), h)))
            .collect();

        ConfigHeights::new(heights)
    }
}

fn config_error(message: String) -> InternalError {
    InitError::Config { message }.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
chain_id = 7
debug = true

[external_chains.payments]
rid = "0a0b"
height = 120

[external_chains.registry]
rid = "ff"
"#;

    #[test]
    fn parses_and_round_trips() {
        let config = RuntimeConfig::from_toml_str(SAMPLE).expect("parse");

        assert_eq!(config.chain_id, 7);
        assert!(config.debug);
        assert_eq!(config.frame_capacity, DEFAULT_FRAME_CAPACITY);
        assert_eq!(config.external_chains["payments"].height, Some(120));
        assert_eq!(config.external_chains["registry"].height, None);

        let written = config.to_toml_string().expect("write");
        let reparsed = RuntimeConfig::from_toml_str(&written).expect("reparse");
        assert_eq!(reparsed, config);
    }

    #[test]
    fn external_specs_decode_rids() {
        let config = RuntimeConfig::from_toml_str(SAMPLE).expect("parse");
        let specs = config.external_specs().expect("specs");

        assert_eq!(
            specs,
            vec![
                ExternalChainSpec::new("payments", vec![0x0a, 0x0b]),
                ExternalChainSpec::new("registry", vec![0xff]),
            ]
        );
    }

    #[test]
    fn bad_rid_is_a_config_error() {
        let config =
            RuntimeConfig::from_toml_str("[external_chains.x]\nrid = \"zz\"\n").expect("parse");
        let err = config.external_specs().unwrap_err();

        assert_eq!(err.code(), "config_invalid");
        assert_eq!(err.class, crate::error::ErrorClass::Initialization);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = RuntimeConfig::from_toml_str("chain = 1\n").unwrap_err();

        assert_eq!(err.origin, crate::error::ErrorOrigin::Config);
    }
}
