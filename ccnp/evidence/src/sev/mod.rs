// Copyright (c) 2023 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

use std::path::PathBuf;

use log::{debug, warn};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::{TeeDevice, TeeKind, TeeResource};

pub const SEV_GUEST_DEVICE_NODE: &str = "/dev/sev-guest";
pub const SEV_DEVICE_NODE: &str = "/dev/sev";

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SevNodes {
    pub guest: PathBuf,
    pub legacy: PathBuf,
}

impl Default for SevNodes {
    fn default() -> Self {
        Self {
            guest: SEV_GUEST_DEVICE_NODE.into(),
            legacy: SEV_DEVICE_NODE.into(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SevResource {
    nodes: SevNodes,
}

impl SevResource {
    pub fn new(nodes: SevNodes) -> Self {
        Self { nodes }
    }
}

impl TeeResource for SevResource {
    fn tee_type(&self) -> &'static str {
        "SEV"
    }

    fn handles(&self, kind: TeeKind) -> bool {
        kind == TeeKind::Sev
    }

    fn find_device_available(&self) -> Result<TeeDevice> {
        let path = [&self.nodes.guest, &self.nodes.legacy]
            .into_iter()
            .find(|path| path.exists())
            .ok_or(Error::DeviceNotFound)?;
        debug!("found SEV device node {}", path.display());

        Ok(TeeDevice {
            path: path.clone(),
            kind: TeeKind::Sev,
        })
    }

    fn get_report(&self, device: &TeeDevice, _report_data: &[u8]) -> Result<String> {
        warn!("SEV report requested from {}", device.path.display());
        Err(Error::NotImplemented("SEV report"))
    }
}
