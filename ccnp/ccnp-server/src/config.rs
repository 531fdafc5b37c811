// Copyright (c) 2023 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

use std::{
    env,
    path::{Path, PathBuf},
};

use config::{Config, File};
use evidence::{ccel::CcelPaths, ccel::DigestEncoding, DeviceNodes};
use log::{debug, info};
use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_EVENTLOG_CACHE_DIR: &str = "/run/ccnp-eventlog/";
pub const DEFAULT_EVENTLOG_CACHE_FILE: &str = "eventlog.log";

/// Environment variable naming the config file when `--config` is not given.
pub const CONFIG_PATH_ENV: &str = "CCNP_CONFIG_PATH";

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct CcnpConfig {
    /// Directory the served event log document is written to.
    pub eventlog_cache_dir: PathBuf,

    pub eventlog_cache_file: String,

    /// Rendering of the record digests in the event log document.
    #[serde(default)]
    pub digest_encoding: DigestEncoding,

    #[serde(default)]
    pub ccel: CcelPaths,

    #[serde(default)]
    pub devices: DeviceNodes,
}

impl Default for CcnpConfig {
    fn default() -> Self {
        Self {
            eventlog_cache_dir: DEFAULT_EVENTLOG_CACHE_DIR.into(),
            eventlog_cache_file: DEFAULT_EVENTLOG_CACHE_FILE.into(),
            digest_encoding: DigestEncoding::default(),
            ccel: CcelPaths::default(),
            devices: DeviceNodes::default(),
        }
    }
}

impl CcnpConfig {
    pub fn new(config_path: Option<String>) -> Result<Self> {
        let config_path = config_path.or_else(|| {
            let env_path = env::var(CONFIG_PATH_ENV).ok()?;
            debug!("Read CCNP's config path from env: {env_path}");
            Some(env_path)
        });

        match config_path {
            Some(path) => {
                info!("Use configuration file {path}");
                if !Path::new(&path).exists() {
                    return Err(Error::ConfigNotFound(path));
                }

                Self::from_file(&path)
            }
            None => {
                info!("No config path specified, use a default config.");
                Ok(Self::default())
            }
        }
    }

    /// Load `CcnpConfig` from a configuration file. Supported formats are all formats supported by the
    /// `config` crate.
    fn from_file(config_path: &str) -> Result<Self> {
        let c = Config::builder()
            .set_default("eventlog_cache_dir", DEFAULT_EVENTLOG_CACHE_DIR)?
            .set_default("eventlog_cache_file", DEFAULT_EVENTLOG_CACHE_FILE)?
            .add_source(File::with_name(config_path))
            .build()?;

        Ok(c.try_deserialize()?)
    }

    /// Where the event log document is cached.
    pub fn eventlog_cache_path(&self) -> PathBuf {
        self.eventlog_cache_dir.join(&self.eventlog_cache_file)
    }
}
