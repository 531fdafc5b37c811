// Copyright (c) 2023 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

//! TDX guest driver bridge: device discovery, TD reports and RTMRs.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use log::{debug, warn};
use serde::Deserialize;
use strum::Display;

use crate::error::{Error, Result};
use crate::{TeeDevice, TeeKind, TeeResource};

#[cfg(feature = "tdx-ioctl")]
mod ioctl;
pub mod report;

/// Length of the user supplied report data.
pub const REPORT_DATA_SIZE: usize = 64;

pub const TDX_DEPRECATED_DEVICE_NODE: &str = "/dev/tdx-attest";
pub const TDX_1_0_DEVICE_NODE: &str = "/dev/tdx-guest";
pub const TDX_1_5_DEVICE_NODE: &str = "/dev/tdx_guest";

/// Guest driver interface behind a TDX device node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum TdxGeneration {
    #[strum(serialize = "deprecated")]
    Deprecated,

    #[strum(serialize = "v1.0")]
    V1_0,

    #[strum(serialize = "v1.5")]
    V1_5,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct TdxNodes {
    pub deprecated: PathBuf,
    pub v1_0: PathBuf,
    pub v1_5: PathBuf,
}

impl Default for TdxNodes {
    fn default() -> Self {
        Self {
            deprecated: TDX_DEPRECATED_DEVICE_NODE.into(),
            v1_0: TDX_1_0_DEVICE_NODE.into(),
            v1_5: TDX_1_5_DEVICE_NODE.into(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TdxResource {
    nodes: TdxNodes,
}

impl TdxResource {
    pub fn new(nodes: TdxNodes) -> Self {
        Self { nodes }
    }

    /// Fetches a fresh TD report and returns RTMR `index` of it, base64
    /// encoded. The index is checked before the device is touched.
    pub fn get_rtmr(&self, device: &TeeDevice, report_data: &[u8], index: i32) -> Result<String> {
        report::rtmr_offset(index)?;

        let td_report = STANDARD
            .decode(self.get_report(device, report_data)?)
            .map_err(Error::InvalidReportEncoding)?;
        let rtmr = report::extract_rtmr(&td_report, index)?;

        Ok(STANDARD.encode(rtmr))
    }
}

impl TeeResource for TdxResource {
    fn tee_type(&self) -> &'static str {
        "TDX"
    }

    fn handles(&self, kind: TeeKind) -> bool {
        matches!(kind, TeeKind::Tdx(_))
    }

    /// The deprecated node is checked first and refused, so that guests still
    /// running the old driver get told to upgrade rather than silently
    /// falling back.
    fn find_device_available(&self) -> Result<TeeDevice> {
        if self.nodes.deprecated.exists() {
            let path = self.nodes.deprecated.display().to_string();
            warn!("deprecated TDX device node {path} found");
            return Err(Error::DeprecatedDevice(path));
        }

        let candidates = [
            (&self.nodes.v1_0, TdxGeneration::V1_0),
            (&self.nodes.v1_5, TdxGeneration::V1_5),
        ];
        for (path, generation) in candidates {
            if path.exists() {
                debug!("found TDX {generation} device node {}", path.display());
                return Ok(TeeDevice {
                    path: path.clone(),
                    kind: TeeKind::Tdx(generation),
                });
            }
        }

        Err(Error::DeviceNotFound)
    }

    fn get_report(&self, device: &TeeDevice, report_data: &[u8]) -> Result<String> {
        let report_data = pad_report_data(report_data)?;

        let generation = match device.kind {
            TeeKind::Tdx(TdxGeneration::Deprecated) => {
                return Err(Error::DeprecatedDevice(device.path.display().to_string()))
            }
            TeeKind::Tdx(generation) => generation,
            _ => return Err(Error::DeviceNotFound),
        };

        let td_report = request_report(&device.path, generation, &report_data)?;
        Ok(STANDARD.encode(td_report))
    }
}

/// Right pads `report_data` with zeros to [`REPORT_DATA_SIZE`].
fn pad_report_data(report_data: &[u8]) -> Result<[u8; REPORT_DATA_SIZE]> {
    if report_data.len() > REPORT_DATA_SIZE {
        return Err(Error::ReportDataTooLong(report_data.len()));
    }

    let mut padded = [0; REPORT_DATA_SIZE];
    padded[..report_data.len()].copy_from_slice(report_data);
    Ok(padded)
}

#[allow(unused_variables, unused_mut)]
fn request_report(
    path: &Path,
    generation: TdxGeneration,
    report_data: &[u8; REPORT_DATA_SIZE],
) -> Result<Vec<u8>> {
    let mut device = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| Error::DeviceOpenFailure {
            path: path.display().to_string(),
            source,
        })?;

    cfg_if::cfg_if! {
        if #[cfg(feature = "tdx-ioctl")] {
            let td_report = match generation {
                TdxGeneration::V1_0 => ioctl::get_report_v1_0(&mut device, report_data),
                _ => ioctl::get_report_v1_5(&mut device, report_data),
            }
            .map_err(|source| Error::ReportIoctlFailure {
                path: path.display().to_string(),
                source,
            })?;
            debug!("got TD report through the {generation} driver");

            Ok(td_report.to_vec())
        } else {
            Err(Error::NotImplemented("TDX report without ioctl support"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    fn nodes(dir: &TempDir) -> TdxNodes {
        TdxNodes {
            deprecated: dir.path().join("tdx-attest"),
            v1_0: dir.path().join("tdx-guest"),
            v1_5: dir.path().join("tdx_guest"),
        }
    }

    fn touch(path: &Path) {
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn default_nodes() {
        let nodes = TdxNodes::default();
        assert_eq!(nodes.deprecated, Path::new("/dev/tdx-attest"));
        assert_eq!(nodes.v1_0, Path::new("/dev/tdx-guest"));
        assert_eq!(nodes.v1_5, Path::new("/dev/tdx_guest"));
    }

    #[rstest]
    #[case(true, false, TdxGeneration::V1_0)]
    #[case(false, true, TdxGeneration::V1_5)]
    #[case(true, true, TdxGeneration::V1_0)]
    fn discovery_order(
        #[case] v1_0: bool,
        #[case] v1_5: bool,
        #[case] expected: TdxGeneration,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let nodes = nodes(&dir);
        if v1_0 {
            touch(&nodes.v1_0);
        }
        if v1_5 {
            touch(&nodes.v1_5);
        }
        let resource = TdxResource::new(nodes);

        let device = resource.find_device_available().unwrap();
        assert_eq!(device.kind, TeeKind::Tdx(expected));
        assert!(device.path.starts_with(dir.path()));
    }

    #[cfg(not(feature = "tdx-ioctl"))]
    #[test]
    fn report_without_ioctl_support() {
        let dir = tempfile::tempdir().unwrap();
        let nodes = nodes(&dir);
        touch(&nodes.v1_5);

        assert!(matches!(
            request_report(&nodes.v1_5, TdxGeneration::V1_5, &[0; REPORT_DATA_SIZE]),
            Err(Error::NotImplemented(_))
        ));
    }

    #[test]
    fn deprecated_only() {
        let dir = tempfile::tempdir().unwrap();
        let nodes = nodes(&dir);
        touch(&nodes.deprecated);

        assert!(matches!(
            TdxResource::new(nodes).find_device_available(),
            Err(Error::DeprecatedDevice(_))
        ));
    }

    #[test]
    fn deprecated_wins_over_current_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let nodes = nodes(&dir);
        touch(&nodes.deprecated);
        touch(&nodes.v1_5);

        assert!(matches!(
            TdxResource::new(nodes).find_device_available(),
            Err(Error::DeprecatedDevice(_))
        ));
    }

    #[test]
    fn no_device() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            TdxResource::new(nodes(&dir)).find_device_available(),
            Err(Error::DeviceNotFound)
        ));
    }

    #[test]
    fn pad_short_report_data() {
        assert_eq!(pad_report_data(b"").unwrap(), [0; REPORT_DATA_SIZE]);
        assert_eq!(pad_report_data(&[7; REPORT_DATA_SIZE]).unwrap(), [7; REPORT_DATA_SIZE]);

        let padded = pad_report_data(b"abc").unwrap();
        assert_eq!(&padded[..3], b"abc");
        assert!(padded[3..].iter().all(|b| *b == 0));
    }

    #[test]
    fn report_data_too_long_before_device_io() {
        let device = TeeDevice {
            path: PathBuf::from("/nonexistent/tdx_guest"),
            kind: TeeKind::Tdx(TdxGeneration::V1_5),
        };

        let result = TdxResource::default().get_report(&device, &[0; REPORT_DATA_SIZE + 1]);
        assert!(matches!(result, Err(Error::ReportDataTooLong(65))));
    }

    #[test]
    fn missing_device_node() {
        let dir = tempfile::tempdir().unwrap();
        let device = TeeDevice {
            path: dir.path().join("tdx_guest"),
            kind: TeeKind::Tdx(TdxGeneration::V1_5),
        };

        let result = TdxResource::default().get_report(&device, b"nonce");
        assert!(matches!(result, Err(Error::DeviceOpenFailure { .. })));
    }

    #[cfg(feature = "tdx-ioctl")]
    #[rstest]
    #[case(TdxGeneration::V1_0)]
    #[case(TdxGeneration::V1_5)]
    fn ioctl_on_regular_file(#[case] generation: TdxGeneration) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tdx_guest");
        touch(&path);
        let device = TeeDevice {
            path,
            kind: TeeKind::Tdx(generation),
        };

        let result = TdxResource::default().get_report(&device, b"nonce");
        assert!(matches!(result, Err(Error::ReportIoctlFailure { .. })));
    }

    #[rstest]
    #[case(-1)]
    #[case(4)]
    fn rtmr_index_checked_before_device_io(#[case] index: i32) {
        let device = TeeDevice {
            path: PathBuf::from("/nonexistent/tdx_guest"),
            kind: TeeKind::Tdx(TdxGeneration::V1_5),
        };

        let result = TdxResource::default().get_rtmr(&device, b"", index);
        assert!(matches!(result, Err(Error::InvalidRtmrIndex(i)) if i == index));
    }

    #[test]
    fn deprecated_device_refused_on_report() {
        let device = TeeDevice {
            path: PathBuf::from(TDX_DEPRECATED_DEVICE_NODE),
            kind: TeeKind::Tdx(TdxGeneration::Deprecated),
        };

        let result = TdxResource::default().get_report(&device, b"");
        assert!(matches!(result, Err(Error::DeprecatedDevice(_))));
    }

    #[test]
    fn foreign_device_refused() {
        let device = TeeDevice {
            path: PathBuf::from("/dev/sev-guest"),
            kind: TeeKind::Sev,
        };

        let result = TdxResource::default().get_report(&device, b"");
        assert!(matches!(result, Err(Error::DeviceNotFound)));
    }

    #[ignore]
    #[test]
    fn get_report_from_hardware() {
        let resource = TdxResource::default();
        let device = resource.find_device_available().unwrap();

        let td_report = STANDARD
            .decode(resource.get_report(&device, b"ccnp").unwrap())
            .unwrap();
        let decoded = report::TdReport::decode(&td_report).unwrap();
        assert_eq!(decoded.report_mac.report_type.type_, 0x81);
        assert_eq!(&decoded.report_mac.report_data[..4], b"ccnp");
    }

    #[ignore]
    #[test]
    fn get_rtmr_from_hardware() {
        let resource = TdxResource::default();
        let device = resource.find_device_available().unwrap();

        for index in 0..report::RTMR_COUNT as i32 {
            let rtmr = STANDARD
                .decode(resource.get_rtmr(&device, b"", index).unwrap())
                .unwrap();
            assert_eq!(rtmr.len(), report::RTMR_SIZE);
        }
    }
}
