//! Client configuration: the JSON config file naming the worker fleet, plus
//! the environment variables selecting logging, selector and preprocessor
//! behavior.

use std::env;
use std::fs;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use log::LevelFilter;

use crate::crypto::PublicKey;
use crate::errors::*;
use crate::DEFAULT_CXX;
use crate::DEFAULT_LISTEN_PORT;

use super::includes::IncludeScanner;
use super::preprocess::{LocalPreprocessor, Preprocessor};
use super::remote_preprocess::RemotePreprocessor;
use super::select::{RandomSelector, RemoteSelector, StatusSelector};
use super::{Power, Remote};

#[derive(Debug, Deserialize)]
pub struct ConfigRemote {
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "PublicKey", default)]
    pub public_key: Option<String>,
    #[serde(rename = "Powers", default)]
    pub powers: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfigFile {
    #[serde(rename = "Remotes")]
    pub remotes: Vec<ConfigRemote>,
}

impl ConfigRemote {
    pub fn to_remote(&self) -> Result<Remote> {
        let public_key = match self.public_key {
            Some(ref hex_key) if !hex_key.is_empty() => Some(
                PublicKey::from_hex(hex_key)
                    .chain_err(|| format!("invalid remote {}", self.address))?,
            ),
            _ => None,
        };
        let powers = if self.powers.is_empty() {
            vec![Power::Compile]
        } else {
            self.powers
                .iter()
                .filter_map(|power| match power.as_str() {
                    "compile" => Some(Power::Compile),
                    "preprocess" => Some(Power::Preprocess),
                    other => {
                        warn!("unknown power: {}", other);
                        None
                    }
                })
                .collect()
        };
        let address = if self.address.contains(':') {
            self.address.clone()
        } else {
            format!("{}:{}", self.address, DEFAULT_LISTEN_PORT)
        };
        Ok(Remote {
            address,
            public_key,
            powers,
        })
    }
}

fn config_file_path() -> Result<PathBuf> {
    match env::var("XCDISTCC_CONFIGFILE") {
        Ok(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => {
            let home = env::var("HOME").chain_err(|| "failed to get user home directory")?;
            Ok(PathBuf::from(home).join(".xcdistcc").join("config.json"))
        }
    }
}

pub fn load_config_file() -> Result<ConfigFile> {
    let path = config_file_path()?;
    let raw = fs::read(&path)
        .chain_err(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_slice(&raw).chain_err(|| "failed to parse config")
}

/// Logging is off unless `XCDISTCC_VERBOSE` is set: the client sits inside
/// build-driver output and must stay silent by default.
pub fn init_logging() -> Result<()> {
    let verbose = env::var("XCDISTCC_VERBOSE")
        .map(|value| !value.is_empty())
        .unwrap_or(false);
    let mut builder = env_logger::Builder::new();
    builder.filter_level(if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Off
    });
    if verbose {
        if let Ok(path) = env::var("XCDISTCC_LOGPATH") {
            if !path.is_empty() {
                let file = File::create(&path)
                    .chain_err(|| "failed to open log file path")?;
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
        }
    }
    builder.init();
    Ok(())
}

pub struct Config {
    pub remotes: Vec<Remote>,
    pub selector: Arc<dyn RemoteSelector>,
    pub preprocessor: Box<dyn Preprocessor>,
}

pub fn load() -> Result<Config> {
    let config_file = load_config_file()?;
    let remotes = config_file
        .remotes
        .iter()
        .map(|remote| remote.to_remote())
        .collect::<Result<Vec<Remote>>>()
        .chain_err(|| "invalid remote")?;

    let selector: Arc<dyn RemoteSelector> =
        match env::var("XCDISTCC_REMOTESELECTOR").as_deref() {
            Ok("random") => Arc::new(RandomSelector::new(remotes.clone())),
            _ => Arc::new(StatusSelector::new(remotes.clone())),
        };

    let preprocessor: Box<dyn Preprocessor> =
        match env::var("XCDISTCC_PREPROCESSOR").as_deref() {
            Ok("includefinder") => Box::new(IncludeScanner::new()),
            Ok("remote") => Box::new(RemotePreprocessor::new(
                selector.clone(),
                Box::new(LocalPreprocessor::new(DEFAULT_CXX.to_string())),
            )),
            _ => Box::new(LocalPreprocessor::new(DEFAULT_CXX.to_string())),
        };

    Ok(Config {
        remotes,
        selector,
        preprocessor,
    })
}
