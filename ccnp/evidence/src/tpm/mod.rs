// Copyright (c) 2023 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

//! TPM backend. Only discovery and locating the firmware event log are
//! supported, reading PCRs and parsing the TPM log are not.

use std::io::ErrorKind;
use std::path::PathBuf;

use log::{debug, warn};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::{TeeDevice, TeeKind, TeeResource};

pub const TPM_DEVICE_NODE: &str = "/dev/tpm0";
pub const TPM_EVENTLOG_PATH: &str = "/sys/kernel/security/tpm0/binary_bios_measurements";

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct TpmNodes {
    pub device: PathBuf,
    pub eventlog: PathBuf,
}

impl Default for TpmNodes {
    fn default() -> Self {
        Self {
            device: TPM_DEVICE_NODE.into(),
            eventlog: TPM_EVENTLOG_PATH.into(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TpmResource {
    nodes: TpmNodes,
}

impl TpmResource {
    pub fn new(nodes: TpmNodes) -> Self {
        Self { nodes }
    }

    /// PCR `index` of the TPM behind `device`.
    pub fn get_measurement(&self, device: &TeeDevice, index: i32) -> Result<String> {
        warn!("TPM PCR {index} requested from {}", device.path.display());
        Err(Error::NotImplemented("TPM measurement"))
    }

    /// Checks that the TPM firmware event log is present and not empty.
    /// Parsing it is not supported yet, so a readable log yields
    /// [`Error::NotImplemented`].
    pub fn get_eventlog(&self, start: usize, count: usize) -> Result<String> {
        let path = &self.nodes.eventlog;
        let data = std::fs::read(path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => Error::EventLogNotFound(path.display().to_string()),
            _ => Error::Io {
                path: path.display().to_string(),
                source,
            },
        })?;
        if data.is_empty() {
            return Err(Error::EventLogNotFound(path.display().to_string()));
        }

        debug!(
            "TPM event log {}: {} bytes, window {start}+{count}",
            path.display(),
            data.len()
        );
        Err(Error::NotImplemented("TPM event log parsing"))
    }
}

impl TeeResource for TpmResource {
    fn tee_type(&self) -> &'static str {
        "TPM"
    }

    fn handles(&self, kind: TeeKind) -> bool {
        kind == TeeKind::Tpm
    }

    fn find_device_available(&self) -> Result<TeeDevice> {
        if !self.nodes.device.exists() {
            return Err(Error::DeviceNotFound);
        }

        Ok(TeeDevice {
            path: self.nodes.device.clone(),
            kind: TeeKind::Tpm,
        })
    }

    fn get_report(&self, device: &TeeDevice, _report_data: &[u8]) -> Result<String> {
        warn!("TPM quote requested from {}", device.path.display());
        Err(Error::NotImplemented("TPM report"))
    }
}
