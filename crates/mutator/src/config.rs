//! Mutator configuration
//!
//! TLS and listener settings come from flags; Spot credentials and the
//! cluster identity come from `SPOTINST_*` environment variables.

use anyhow::{bail, ensure, Context, Result};
use clap::Parser;
use mutator_lib::suggestion::{OceanConfig, DEFAULT_OCEAN_BASE_URL};
use mutator_lib::ClusterIdentity;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line flags
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ocean-rs-mutator",
    version,
    about = "Mutating admission webhook that right-sizes Deployment resource requests"
)]
pub struct Args {
    /// File containing the x509 certificate for HTTPS (CA cert, if any, concatenated after server cert)
    #[arg(long = "tls-cert-file", env = "TLS_CERT_FILE")]
    pub tls_cert_file: PathBuf,

    /// File containing the x509 private key matching --tls-cert-file
    #[arg(long = "tls-private-key-file", env = "TLS_PRIVATE_KEY_FILE")]
    pub tls_private_key_file: PathBuf,

    /// Address of the HTTPS admission listener
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:443")]
    pub listen_addr: SocketAddr,

    /// Port of the plain-HTTP health/metrics API
    #[arg(long, env = "API_PORT", default_value_t = 8080)]
    pub api_port: u16,
}

/// Spot API settings
#[derive(Debug, Clone, Deserialize)]
pub struct SpotinstSettings {
    /// SPOTINST_TOKEN
    #[serde(default)]
    pub token: Option<String>,

    /// SPOTINST_ACCOUNT
    #[serde(default)]
    pub account: Option<String>,

    /// SPOTINST_BASE_URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// SPOTINST_CONTROLLER_ID
    #[serde(default)]
    pub controller_id: String,

    /// SPOTINST_REQUEST_TIMEOUT_SECS
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_OCEAN_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl SpotinstSettings {
    /// Load from `SPOTINST_*` environment variables
    pub fn load() -> Result<Self> {
        Self::from_env(config::Environment::with_prefix("SPOTINST"))
    }

    fn from_env(source: config::Environment) -> Result<Self> {
        config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to read SPOTINST_* environment")?
            .try_deserialize()
            .context("Invalid SPOTINST_* configuration")
    }

    pub fn cluster_identity(&self) -> ClusterIdentity {
        ClusterIdentity(self.controller_id.clone())
    }

    pub fn ocean_config(&self) -> OceanConfig {
        OceanConfig {
            base_url: self.base_url.clone(),
            token: self.token.clone(),
            account: self.account.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

/// Complete startup configuration, validated once
#[derive(Debug, Clone)]
pub struct MutatorConfig {
    pub tls_cert_file: PathBuf,
    pub tls_private_key_file: PathBuf,
    pub listen_addr: SocketAddr,
    pub api_port: u16,
    pub spotinst: SpotinstSettings,
}

impl MutatorConfig {
    /// Parse flags and environment; any problem is fatal
    pub fn load() -> Result<Self> {
        Self::from_parts(Args::parse(), SpotinstSettings::load()?)
    }

    pub fn from_parts(args: Args, spotinst: SpotinstSettings) -> Result<Self> {
        let config = Self {
            tls_cert_file: args.tls_cert_file,
            tls_private_key_file: args.tls_private_key_file,
            listen_addr: args.listen_addr,
            api_port: args.api_port,
            spotinst,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.spotinst.controller_id.trim().is_empty() {
            bail!("SPOTINST_CONTROLLER_ID must be set to the Ocean controller cluster id");
        }
        ensure!(
            self.tls_cert_file.is_file(),
            "TLS certificate {} does not exist",
            self.tls_cert_file.display()
        );
        ensure!(
            self.tls_private_key_file.is_file(),
            "TLS private key {} does not exist",
            self.tls_private_key_file.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> config::Environment {
        let map: config::Map<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::with_prefix("SPOTINST").source(Some(map))
    }

    fn args(cert: &NamedTempFile, key: &NamedTempFile) -> Args {
        Args::parse_from([
            "ocean-rs-mutator",
            "--tls-cert-file",
            cert.path().to_str().unwrap(),
            "--tls-private-key-file",
            key.path().to_str().unwrap(),
        ])
    }

    #[test]
    fn test_spotinst_defaults() {
        let settings = SpotinstSettings::from_env(env(&[])).unwrap();
        assert_eq!(settings.base_url, DEFAULT_OCEAN_BASE_URL);
        assert_eq!(settings.request_timeout_secs, 10);
        assert!(settings.token.is_none());
        assert!(settings.controller_id.is_empty());
    }

    #[test]
    fn test_spotinst_from_environment() {
        let settings = SpotinstSettings::from_env(env(&[
            ("SPOTINST_TOKEN", "tok"),
            ("SPOTINST_ACCOUNT", "act-1"),
            ("SPOTINST_BASE_URL", "https://spot.internal"),
            ("SPOTINST_CONTROLLER_ID", "prod-cluster"),
        ]))
        .unwrap();

        assert_eq!(settings.cluster_identity().as_str(), "prod-cluster");
        let ocean = settings.ocean_config();
        assert_eq!(ocean.base_url, "https://spot.internal");
        assert_eq!(ocean.token.as_deref(), Some("tok"));
        assert_eq!(ocean.account.as_deref(), Some("act-1"));
    }

    #[test]
    fn test_flag_defaults() {
        let cert = NamedTempFile::new().unwrap();
        let key = NamedTempFile::new().unwrap();
        let args = args(&cert, &key);

        assert_eq!(args.listen_addr, "0.0.0.0:443".parse().unwrap());
        assert_eq!(args.api_port, 8080);
    }

    #[test]
    fn test_missing_controller_id_is_fatal() {
        let cert = NamedTempFile::new().unwrap();
        let key = NamedTempFile::new().unwrap();
        let settings = SpotinstSettings::from_env(env(&[])).unwrap();

        let err = MutatorConfig::from_parts(args(&cert, &key), settings).unwrap_err();
        assert!(err.to_string().contains("SPOTINST_CONTROLLER_ID"));
    }

    #[test]
    fn test_missing_certificate_is_fatal() {
        let key = NamedTempFile::new().unwrap();
        let settings =
            SpotinstSettings::from_env(env(&[("SPOTINST_CONTROLLER_ID", "prod")])).unwrap();
        let args = Args::parse_from([
            "ocean-rs-mutator",
            "--tls-cert-file",
            "/nonexistent/tls.crt",
            "--tls-private-key-file",
            key.path().to_str().unwrap(),
        ]);

        let err = MutatorConfig::from_parts(args, settings).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/tls.crt"));
    }

    #[test]
    fn test_valid_configuration() {
        let cert = NamedTempFile::new().unwrap();
        let key = NamedTempFile::new().unwrap();
        let settings =
            SpotinstSettings::from_env(env(&[("SPOTINST_CONTROLLER_ID", "prod")])).unwrap();

        let config = MutatorConfig::from_parts(args(&cert, &key), settings).unwrap();
        assert_eq!(config.spotinst.controller_id, "prod");
    }
}
