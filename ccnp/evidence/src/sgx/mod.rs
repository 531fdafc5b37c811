// Copyright (c) 2023 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

use std::path::PathBuf;

use log::warn;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::{TeeDevice, TeeKind, TeeResource};

pub const SGX_DEVICE_NODE: &str = "/dev/sgx";

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SgxNodes {
    pub device: PathBuf,
}

impl Default for SgxNodes {
    fn default() -> Self {
        Self {
            device: SGX_DEVICE_NODE.into(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SgxResource {
    nodes: SgxNodes,
}

impl SgxResource {
    pub fn new(nodes: SgxNodes) -> Self {
        Self { nodes }
    }
}

impl TeeResource for SgxResource {
    fn tee_type(&self) -> &'static str {
        "SGX"
    }

    fn handles(&self, kind: TeeKind) -> bool {
        kind == TeeKind::Sgx
    }

    fn find_device_available(&self) -> Result<TeeDevice> {
        if !self.nodes.device.exists() {
            return Err(Error::DeviceNotFound);
        }

        Ok(TeeDevice {
            path: self.nodes.device.clone(),
            kind: TeeKind::Sgx,
        })
    }

    fn get_report(&self, device: &TeeDevice, _report_data: &[u8]) -> Result<String> {
        warn!("SGX report requested from {}", device.path.display());
        Err(Error::NotImplemented("SGX report"))
    }
}
