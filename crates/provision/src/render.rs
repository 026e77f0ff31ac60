//! Keep client config rendering.
//!
//! The template is a TOML document; computed values are assigned at dotted
//! paths and the result is serialized back to TOML.

use std::path::{Path, PathBuf};

use anyhow::Context;
use toml::{Table, Value};

use crate::{
    account::OperatorIdentity,
    artifacts::KeepContracts,
    config::{ProvisionConfig, display_url},
    error::{ProvisionError, Result},
    fs::FsHandler,
};

/// Keys that the client parses as integers wherever they appear.
pub const INTEGER_KEYS: [&str; 2] = ["Port", "Seed"];

/// Ordered assignments of values to dotted paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Substitutions(Vec<(String, Value)>);

impl Substitutions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push((path.into(), value.into()));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(path, value)| (path.as_str(), value))
    }

    /// Values computed for this run: endpoints, operator account, contract
    /// addresses and client networking.
    pub fn for_client(
        config: &ProvisionConfig,
        operator: &OperatorIdentity,
        contracts: &KeepContracts,
    ) -> Result<Self> {
        let invalid = |e: anyhow::Error| ProvisionError::Config(format!("{:#}", e));
        let ws_url = config.ethereum.ws_url().map_err(invalid)?;
        let rpc_url = config.ethereum.rpc_url().map_err(invalid)?;

        let keyfile = operator.keyfile.as_ref().unwrap_or(&config.paths.keyfile);

        let mut substitutions = Self::new()
            .set("ethereum.URL", display_url(&ws_url))
            .set("ethereum.URLRPC", display_url(&rpc_url))
            .set("ethereum.account.Address", operator.address.to_string())
            .set("ethereum.account.KeyFile", keyfile.display().to_string())
            .set(
                "ethereum.ContractAddresses.KeepRandomBeaconOperator",
                contracts.beacon_operator.address.to_string(),
            )
            .set(
                "ethereum.ContractAddresses.KeepRandomBeaconService",
                contracts.beacon_service.address.to_string(),
            )
            .set(
                "ethereum.ContractAddresses.TokenStaking",
                contracts.token_staking.address.to_string(),
            )
            .set("LibP2P.Port", i64::from(config.network.port))
            .set("Storage.DataDir", config.network.data_dir.display().to_string());

        if !config.network.peers.is_empty() {
            substitutions = substitutions.set("LibP2P.Peers", config.network.peers.clone());
        }

        Ok(substitutions)
    }
}

/// A parsed client config template.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigRenderer {
    document: Table,
}

impl ConfigRenderer {
    /// Parse a template from TOML text.
    pub fn parse(template: &str) -> anyhow::Result<Self> {
        let document = template
            .parse::<Table>()
            .context("Failed to parse config template as TOML")?;
        Ok(Self { document })
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let template_error = |source| ProvisionError::TemplateReadFailed {
            path: path.to_path_buf(),
            source,
        };

        let content = FsHandler::read_to_string(path).await.map_err(template_error)?;
        Self::parse(&content).map_err(template_error)
    }

    /// Assign every substitution, creating intermediate tables as needed.
    pub fn apply(&mut self, substitutions: &Substitutions) -> anyhow::Result<()> {
        for (path, value) in substitutions.iter() {
            set_path(&mut self.document, path, value.clone())?;
        }
        Ok(())
    }

    /// Serialize the document, with [`INTEGER_KEYS`] forced to integers.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut document = self.document.clone();
        normalize_integers(&mut document)?;
        toml::to_string(&document).context("Failed to serialize client config")
    }

    /// Render and write the document to `path`.
    pub async fn write_to(&self, path: &Path) -> Result<()> {
        let config_error = |source| ProvisionError::ConfigWriteFailed {
            path: PathBuf::from(path),
            source,
        };

        let rendered = self.render().map_err(config_error)?;
        FsHandler::write_file(path, rendered.as_bytes())
            .await
            .map_err(config_error)?;

        tracing::info!(path = %path.display(), "Client config written");
        Ok(())
    }
}

fn set_path(document: &mut Table, path: &str, value: Value) -> anyhow::Result<()> {
    let mut keys = path.split('.').collect::<Vec<_>>();
    let Some(leaf) = keys.pop().filter(|key| !key.is_empty()) else {
        anyhow::bail!("Invalid config path '{}'", path);
    };

    let mut table = document;
    for key in keys {
        let entry = table
            .entry(key.to_string())
            .or_insert(Value::Table(Table::new()));
        table = match entry {
            Value::Table(inner) => inner,
            other => anyhow::bail!(
                "Cannot set '{}': '{}' is a {}, not a table",
                path,
                key,
                other.type_str()
            ),
        };
    }

    table.insert(leaf.to_string(), value);
    Ok(())
}

fn normalize_integers(table: &mut Table) -> anyhow::Result<()> {
    for (key, value) in table.iter_mut() {
        if INTEGER_KEYS.contains(&key.as_str()) {
            if let Value::Float(float) = value {
                *value = Value::Integer(float_to_integer(key, *float)?);
            }
        }
        normalize_value(value)?;
    }
    Ok(())
}

fn normalize_value(value: &mut Value) -> anyhow::Result<()> {
    match value {
        Value::Table(table) => normalize_integers(table),
        Value::Array(items) => items.iter_mut().try_for_each(normalize_value),
        _ => Ok(()),
    }
}

fn float_to_integer(key: &str, value: f64) -> anyhow::Result<i64> {
    let rounded = value.round();
    // i64::MAX is not representable as f64; the bound is exclusive.
    if !rounded.is_finite() || rounded < i64::MIN as f64 || rounded >= i64::MAX as f64 {
        anyhow::bail!("{} = {} cannot be written as an integer", key, value);
    }
    Ok(rounded as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = r#"
[ethereum]
URL = ""
URLRPC = ""

[ethereum.account]
KeyFile = ""

[LibP2P]
Port = 3919.0

[Storage]
DataDir = ""
"#;

    #[test]
    fn test_port_renders_as_integer() {
        let renderer = ConfigRenderer::parse(TEMPLATE).unwrap();

        let rendered = renderer.render().unwrap();

        assert!(rendered.contains("Port = 3919\n"), "{}", rendered);
        assert!(!rendered.contains("3919.0"));
    }

    #[test]
    fn test_nested_seed_renders_as_integer() {
        let renderer = ConfigRenderer::parse(
            "[[groups]]\nSeed = 42.0\n\n[metrics]\nRatio = 0.5\n",
        )
        .unwrap();

        let rendered = renderer.render().unwrap();

        assert!(rendered.contains("Seed = 42\n"), "{}", rendered);
        assert!(rendered.contains("Ratio = 0.5"));
    }

    #[test]
    fn test_integer_keys_are_rounded() {
        let renderer = ConfigRenderer::parse("Port = 3918.6\n").unwrap();

        assert_eq!(renderer.render().unwrap(), "Port = 3919\n");
    }

    #[test]
    fn test_non_finite_port_rejected() {
        let renderer = ConfigRenderer::parse("Port = inf\n").unwrap();

        assert!(renderer.render().is_err());
    }

    #[test]
    fn test_apply_creates_nested_tables() {
        let mut renderer = ConfigRenderer::parse(TEMPLATE).unwrap();
        let substitutions = Substitutions::new()
            .set("ethereum.URL", "ws://node:8546")
            .set("ethereum.ContractAddresses.TokenStaking", "0xabc")
            .set("LibP2P.Port", 27001i64)
            .set("LibP2P.Peers", vec!["/ip4/1.2.3.4/tcp/3919".to_string()]);

        renderer.apply(&substitutions).unwrap();
        let rendered: Table = renderer.render().unwrap().parse().unwrap();

        assert_eq!(rendered["ethereum"]["URL"].as_str(), Some("ws://node:8546"));
        assert_eq!(
            rendered["ethereum"]["ContractAddresses"]["TokenStaking"].as_str(),
            Some("0xabc")
        );
        assert_eq!(rendered["LibP2P"]["Port"].as_integer(), Some(27001));
        assert_eq!(rendered["LibP2P"]["Peers"][0].as_str(), Some("/ip4/1.2.3.4/tcp/3919"));
        // Untouched template values survive.
        assert_eq!(rendered["ethereum"]["URLRPC"].as_str(), Some(""));
    }

    #[test]
    fn test_apply_through_scalar_fails() {
        let mut renderer = ConfigRenderer::parse("ethereum = \"node\"\n").unwrap();

        let result = renderer.apply(&Substitutions::new().set("ethereum.URL", "ws://node"));

        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_template() {
        assert!(ConfigRenderer::parse("[ethereum\nURL = 1").is_err());
    }
}
