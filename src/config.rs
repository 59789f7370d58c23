// src/config.rs
//! Service configuration.
//!
//! Sources, later ones overriding earlier ones:
//! 1. built-in defaults
//! 2. `passport.toml` in the working directory, if present
//! 3. `PASSPORT_*` environment variables (e.g. `PASSPORT_RPC_URL`)

use std::path::PathBuf;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use ethers::types::Address;
use ethers::utils::hex;
use serde::Deserialize;

use crate::blockchain::ledger_client::DEFAULT_SMT_DEPTH;
use crate::services::registration::RegistrationSettings;
use crate::zkp::circuit_inputs::bigint::{DEFAULT_LIMB_BITS, MAX_LIMB_BITS};
use crate::zkp::circuit_inputs::NumericFormat;

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub rpc_url: String,
    pub relayer_url: String,
    pub prover_url: String,
    pub registration_contract: String,
    pub certificates_smt_contract: String,
    pub state_keeper_contract: String,
    /// Directory of DER trust anchors extracted from the master list.
    pub master_list_dir: PathBuf,
    pub trust_anchor_version: String,
    /// Hex root the ledger currently accepts.
    pub published_trust_root: Option<String>,
    pub listen_addr: String,
    pub smt_depth: usize,
    pub limb_bits: usize,
    pub numeric_format: NumericFormat,
    pub verifying_key_path: Option<PathBuf>,
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("rpc_url", "http://127.0.0.1:8545")?
        .set_default(
            "relayer_url",
            "http://127.0.0.1:8000/integrations/registration-relayer/v1/register",
        )?
        .set_default("prover_url", "http://127.0.0.1:8001")?
        .set_default("registration_contract", ZERO_ADDRESS)?
        .set_default("certificates_smt_contract", ZERO_ADDRESS)?
        .set_default("state_keeper_contract", ZERO_ADDRESS)?
        .set_default("master_list_dir", "master_list")?
        .set_default("trust_anchor_version", "local")?
        .set_default("listen_addr", "127.0.0.1:3000")?
        .set_default("smt_depth", DEFAULT_SMT_DEPTH as i64)?
        .set_default("limb_bits", DEFAULT_LIMB_BITS as i64)?
        .set_default("numeric_format", "decimal")
}

fn parse_address(field: &str, value: &str) -> Result<Address, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Message(format!("{} is not an address: {}", field, value)))
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let settings: Self = defaults()?
            .add_source(File::with_name("passport").required(false))
            .add_source(Environment::with_prefix("PASSPORT"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects circuit parameters the input builders cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limb_bits == 0 || self.limb_bits > MAX_LIMB_BITS {
            return Err(ConfigError::Message(format!(
                "limb_bits must be in 1..={}, got {}",
                MAX_LIMB_BITS, self.limb_bits
            )));
        }
        if self.smt_depth == 0 {
            return Err(ConfigError::Message("smt_depth must be positive".to_string()));
        }
        Ok(())
    }

    pub fn published_root(&self) -> Result<Option<[u8; 32]>, ConfigError> {
        let Some(encoded) = &self.published_trust_root else {
            return Ok(None);
        };
        let bytes = hex::decode(encoded.trim_start_matches("0x"))
            .map_err(|e| ConfigError::Message(format!("published_trust_root: {}", e)))?;
        let root: [u8; 32] = bytes.try_into().map_err(|_| {
            ConfigError::Message("published_trust_root must be 32 bytes".to_string())
        })?;
        Ok(Some(root))
    }

    pub fn registration_settings(&self) -> Result<RegistrationSettings, ConfigError> {
        self.validate()?;
        Ok(RegistrationSettings {
            registration_contract: parse_address(
                "registration_contract",
                &self.registration_contract,
            )?,
            certificates_smt_contract: parse_address(
                "certificates_smt_contract",
                &self.certificates_smt_contract,
            )?,
            state_keeper_contract: parse_address(
                "state_keeper_contract",
                &self.state_keeper_contract,
            )?,
            published_trust_root: self.published_root()?,
            smt_depth: self.smt_depth,
            limb_bits: self.limb_bits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn test_defaults() {
        let settings: Settings = defaults().unwrap().build().unwrap().try_deserialize().unwrap();
        assert_eq!(settings.listen_addr, "127.0.0.1:3000");
        assert_eq!(settings.smt_depth, 80);
        assert_eq!(settings.limb_bits, 120);
        assert_eq!(settings.numeric_format, NumericFormat::Decimal);
        assert!(settings.published_root().unwrap().is_none());
        assert!(settings.verifying_key_path.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_unusable_circuit_parameters_are_rejected() {
        let load = |key: &str, value: i64| -> Settings {
            defaults()
                .unwrap()
                .set_override(key, value)
                .unwrap()
                .build()
                .unwrap()
                .try_deserialize()
                .unwrap()
        };
        assert!(load("limb_bits", 0).validate().is_err());
        assert!(load("limb_bits", 254).validate().is_err());
        assert!(load("limb_bits", 253).validate().is_ok());
        assert!(load("smt_depth", 0).validate().is_err());
        assert!(load("limb_bits", 0).registration_settings().is_err());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let toml = r#"
            smt_depth = 64
            numeric_format = "hex"
            registration_contract = "0x00000000000000000000000000000000000000aa"
            published_trust_root = "0x0101010101010101010101010101010101010101010101010101010101010101"
        "#;
        let settings: Settings = defaults()
            .unwrap()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(settings.numeric_format, NumericFormat::Hex);

        let registration = settings.registration_settings().unwrap();
        assert_eq!(registration.smt_depth, 64);
        assert_eq!(registration.registration_contract, Address::from_low_u64_be(0xaa));
        assert_eq!(registration.published_trust_root, Some([1u8; 32]));
    }

    #[test]
    fn test_bad_values_are_reported() {
        let settings: Settings = defaults()
            .unwrap()
            .set_override("state_keeper_contract", "not-an-address")
            .unwrap()
            .set_override("published_trust_root", "0x1234")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert!(settings.published_root().is_err());
        assert!(settings.registration_settings().is_err());
    }
}
