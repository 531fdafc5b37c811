// Copyright (c) 2023 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

//! Confidential computing evidence of the guest: the CCEL event log, TD
//! reports and RTMRs, behind one interface per TEE backend.

use std::path::PathBuf;

use log::debug;
use serde::Deserialize;

pub mod ccel;
pub mod error;
pub mod sev;
pub mod sgx;
pub mod tdx;
pub mod tpm;

pub use error::{Error, Result};

use sev::{SevNodes, SevResource};
use sgx::{SgxNodes, SgxResource};
use tdx::{TdxGeneration, TdxNodes, TdxResource};
use tpm::{TpmNodes, TpmResource};

/// The backend a discovered device node belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeeKind {
    Tdx(TdxGeneration),
    Sev,
    Sgx,
    Tpm,
}

/// A device node found by discovery, tagged with its backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TeeDevice {
    pub path: PathBuf,
    pub kind: TeeKind,
}

pub trait TeeResource {
    /// Name of the backend, for logging.
    fn tee_type(&self) -> &'static str;

    /// Whether devices of `kind` are served by this backend.
    fn handles(&self, kind: TeeKind) -> bool;

    /// Looks for a usable device node of this backend.
    fn find_device_available(&self) -> Result<TeeDevice>;

    /// Asks `device` for a report bound to `report_data`, returned base64
    /// encoded.
    fn get_report(&self, device: &TeeDevice, report_data: &[u8]) -> Result<String>;
}

/// Device nodes of every backend.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceNodes {
    pub tdx: TdxNodes,
    pub sev: SevNodes,
    pub sgx: SgxNodes,
    pub tpm: TpmNodes,
}

#[derive(Clone, Debug)]
pub enum TeeBackend {
    Tdx(TdxResource),
    Sev(SevResource),
    Sgx(SgxResource),
    Tpm(TpmResource),
}

impl TeeBackend {
    fn resource(&self) -> &dyn TeeResource {
        match self {
            TeeBackend::Tdx(tdx) => tdx,
            TeeBackend::Sev(sev) => sev,
            TeeBackend::Sgx(sgx) => sgx,
            TeeBackend::Tpm(tpm) => tpm,
        }
    }
}

impl TeeResource for TeeBackend {
    fn tee_type(&self) -> &'static str {
        self.resource().tee_type()
    }

    fn handles(&self, kind: TeeKind) -> bool {
        self.resource().handles(kind)
    }

    fn find_device_available(&self) -> Result<TeeDevice> {
        self.resource().find_device_available()
    }

    fn get_report(&self, device: &TeeDevice, report_data: &[u8]) -> Result<String> {
        self.resource().get_report(device, report_data)
    }
}

/// Tries its backends in order and serves reports from whichever one owns
/// the discovered device.
#[derive(Clone, Debug)]
pub struct BaseTeeResource {
    backends: Vec<TeeBackend>,
}

impl BaseTeeResource {
    /// TDX first, then SEV.
    pub fn new(nodes: &DeviceNodes) -> Self {
        Self::with_backends(vec![
            TeeBackend::Tdx(TdxResource::new(nodes.tdx.clone())),
            TeeBackend::Sev(SevResource::new(nodes.sev.clone())),
        ])
    }

    pub fn with_backends(backends: Vec<TeeBackend>) -> Self {
        Self { backends }
    }
}

impl Default for BaseTeeResource {
    fn default() -> Self {
        Self::new(&DeviceNodes::default())
    }
}

impl TeeResource for BaseTeeResource {
    fn tee_type(&self) -> &'static str {
        "Base"
    }

    fn handles(&self, kind: TeeKind) -> bool {
        self.backends.iter().any(|backend| backend.handles(kind))
    }

    /// A backend without a device lets the next one try, any other failure
    /// (such as a deprecated TDX node) is returned right away.
    fn find_device_available(&self) -> Result<TeeDevice> {
        for backend in &self.backends {
            match backend.find_device_available() {
                Ok(device) => return Ok(device),
                Err(Error::DeviceNotFound) => {
                    debug!("no {} device found", backend.tee_type());
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::DeviceNotFound)
    }

    fn get_report(&self, device: &TeeDevice, report_data: &[u8]) -> Result<String> {
        self.backends
            .iter()
            .find(|backend| backend.handles(device.kind))
            .ok_or(Error::DeviceNotFound)?
            .get_report(device, report_data)
    }
}
