// Copyright (c) 2023 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

//! Event log and measurement requests, as handed over by the RPC layer.

use evidence::{
    ccel,
    tdx::{report::rtmr_offset, TdxResource},
    tpm::TpmResource,
    BaseTeeResource, TeeResource,
};
use log::{debug, info};
use strum::Display;

use crate::config::CcnpConfig;
use crate::error::{Error, Result};

/// Whose evidence is asked for. Container level (SaaS) evidence is not
/// collected yet and yields empty replies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum Level {
    #[strum(serialize = "SAAS")]
    Saas,

    #[strum(serialize = "PAAS")]
    Paas,
}

impl TryFrom<i32> for Level {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Level::Saas),
            1 => Ok(Level::Paas),
            _ => Err(Error::InvalidRequest(format!("unknown level {value}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum EventlogCategory {
    #[strum(serialize = "TDX_EVENTLOG")]
    TdxEventlog,

    #[strum(serialize = "TPM_EVENTLOG")]
    TpmEventlog,
}

impl TryFrom<i32> for EventlogCategory {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(EventlogCategory::TdxEventlog),
            1 => Ok(EventlogCategory::TpmEventlog),
            _ => Err(Error::InvalidRequest(format!(
                "unknown eventlog category {value}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum MeasurementCategory {
    #[strum(serialize = "TEE_REPORT")]
    TeeReport,

    #[strum(serialize = "TDX_RTMR")]
    TdxRtmr,

    #[strum(serialize = "TPM")]
    Tpm,
}

impl TryFrom<i32> for MeasurementCategory {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(MeasurementCategory::TeeReport),
            1 => Ok(MeasurementCategory::TdxRtmr),
            2 => Ok(MeasurementCategory::Tpm),
            _ => Err(Error::InvalidRequest(format!(
                "unknown measurement category {value}"
            ))),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GetEventlogRequest {
    pub eventlog_level: i32,
    pub eventlog_category: i32,
    pub start_position: i32,
    pub count: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GetEventlogReply {
    /// Path of the file holding the event log document.
    pub eventlog_data_loc: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GetMeasurementRequest {
    pub measurement_type: i32,
    pub measurement_category: i32,
    pub report_data: String,
    pub register_index: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GetMeasurementReply {
    /// Base64 encoded measurement.
    pub measurement: String,
}

fn non_negative(name: &str, value: i32) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| Error::InvalidRequest(format!("negative {name} {value}")))
}

pub struct EvidenceService {
    config: CcnpConfig,
}

impl EvidenceService {
    pub fn new(config: CcnpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CcnpConfig {
        &self.config
    }

    /// Serves the event log document, caching it on disk. The reply points
    /// at the cache file, which is rewritten on every request.
    pub async fn get_eventlog(&self, req: &GetEventlogRequest) -> Result<GetEventlogReply> {
        let start = non_negative("start position", req.start_position)?;
        let count = non_negative("count", req.count)?;

        let level = Level::try_from(req.eventlog_level)?;
        info!("get eventlog: level {level}, start {start}, count {count}");
        let eventlog = match level {
            Level::Saas => {
                debug!("container level eventlog is not collected");
                String::new()
            }
            Level::Paas => self.paas_eventlog(req.eventlog_category, start, count)?,
        };

        let path = self.config.eventlog_cache_path();
        let cache_write_error = |source: std::io::Error| Error::CacheWrite {
            path: path.display().to_string(),
            source,
        };
        tokio::fs::create_dir_all(&self.config.eventlog_cache_dir)
            .await
            .map_err(cache_write_error)?;
        tokio::fs::write(&path, eventlog)
            .await
            .map_err(cache_write_error)?;

        Ok(GetEventlogReply {
            eventlog_data_loc: path.display().to_string(),
        })
    }

    fn paas_eventlog(&self, category: i32, start: usize, count: usize) -> Result<String> {
        let eventlog = match EventlogCategory::try_from(category)? {
            EventlogCategory::TdxEventlog => ccel::locate(&self.config.ccel)?
                .decode()?
                .window(start, count)?
                .to_json(self.config.digest_encoding)?,
            EventlogCategory::TpmEventlog => {
                TpmResource::new(self.config.devices.tpm.clone()).get_eventlog(start, count)?
            }
        };

        Ok(eventlog)
    }

    pub async fn get_measurement(&self, req: &GetMeasurementRequest) -> Result<GetMeasurementReply> {
        let register_index = non_negative("register index", req.register_index)?;

        let level = Level::try_from(req.measurement_type)?;
        info!("get measurement: type {level}, register {register_index}");
        let measurement = match level {
            Level::Saas => {
                debug!("container level measurement is not collected");
                String::new()
            }
            Level::Paas => self.paas_measurement(req)?,
        };

        Ok(GetMeasurementReply { measurement })
    }

    fn paas_measurement(&self, req: &GetMeasurementRequest) -> Result<String> {
        let devices = &self.config.devices;
        let report_data = req.report_data.as_bytes();

        let measurement = match MeasurementCategory::try_from(req.measurement_category)? {
            MeasurementCategory::TeeReport => {
                let base = BaseTeeResource::new(devices);
                let device = base.find_device_available()?;
                base.get_report(&device, report_data)?
            }
            MeasurementCategory::TdxRtmr => {
                rtmr_offset(req.register_index)?;
                let tdx = TdxResource::new(devices.tdx.clone());
                let device = tdx.find_device_available()?;
                tdx.get_rtmr(&device, report_data, req.register_index)?
            }
            MeasurementCategory::Tpm => {
                let tpm = TpmResource::new(devices.tpm.clone());
                let device = tpm.find_device_available()?;
                tpm.get_measurement(&device, req.register_index)?
            }
        };

        Ok(measurement)
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use evidence::{
        ccel::CcelPaths, sev::SevNodes, sgx::SgxNodes, tdx::TdxNodes, tpm::TpmNodes, DeviceNodes,
    };
    use rstest::rstest;
    use serde_json::Value;
    use tempfile::TempDir;

    use super::*;

    const SHA384: u16 = 0xc;

    fn ccel_table(lasa: u64) -> Vec<u8> {
        let mut table = b"CCEL".to_vec();
        table.extend_from_slice(&56u32.to_le_bytes());
        table.resize(40, 0);
        table.extend_from_slice(&0x10000u64.to_le_bytes());
        table.extend_from_slice(&lasa.to_le_bytes());
        table
    }

    /// SpecID header declaring SHA384 followed by `count` events and the end marker.
    fn ccel_data(count: u8) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&3u32.to_le_bytes());
        data.extend_from_slice(&[0; 4 + 20 + 24]);
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&SHA384.to_le_bytes());
        data.extend_from_slice(&48u16.to_le_bytes());
        data.push(0);

        for i in 0..count {
            data.extend_from_slice(&(u32::from(i % 4) + 1).to_le_bytes());
            data.extend_from_slice(&0x8000_0001u32.to_le_bytes());
            data.extend_from_slice(&1u32.to_le_bytes());
            data.extend_from_slice(&SHA384.to_le_bytes());
            data.extend_from_slice(&[i; 48]);
            data.extend_from_slice(&3u32.to_le_bytes());
            data.extend_from_slice(&[i; 3]);
        }

        data.extend_from_slice(&u32::MAX.to_le_bytes());
        data
    }

    fn write(path: &Path, content: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// A config whose every path lives under `dir`.
    fn config(dir: &TempDir) -> CcnpConfig {
        let root = dir.path();
        CcnpConfig {
            eventlog_cache_dir: root.join("run/ccnp-eventlog"),
            ccel: CcelPaths {
                table: root.join("sys/CCEL"),
                table_mount: root.join("run/CCEL"),
                data: root.join("sys/data/CCEL"),
                data_mount: root.join("run/data/CCEL"),
            },
            devices: DeviceNodes {
                tdx: TdxNodes {
                    deprecated: root.join("dev/tdx-attest"),
                    v1_0: root.join("dev/tdx-guest"),
                    v1_5: root.join("dev/tdx_guest"),
                },
                sev: SevNodes {
                    guest: root.join("dev/sev-guest"),
                    legacy: root.join("dev/sev"),
                },
                sgx: SgxNodes {
                    device: root.join("dev/sgx"),
                },
                tpm: TpmNodes {
                    device: root.join("dev/tpm0"),
                    eventlog: root.join("sys/binary_bios_measurements"),
                },
            },
            ..Default::default()
        }
    }

    fn service_with_ccel(dir: &TempDir, count: u8) -> EvidenceService {
        let config = config(dir);
        write(&config.ccel.table, &ccel_table(0x7fbd0000));
        write(&config.ccel.data, &ccel_data(count));
        EvidenceService::new(config)
    }

    fn eventlog_request(start: i32, count: i32) -> GetEventlogRequest {
        GetEventlogRequest {
            eventlog_level: 1,
            eventlog_category: 0,
            start_position: start,
            count,
        }
    }

    #[rstest]
    #[case(0, Level::Saas)]
    #[case(1, Level::Paas)]
    fn level_from_wire(#[case] value: i32, #[case] expected: Level) {
        assert_eq!(Level::try_from(value).unwrap(), expected);
    }

    #[rstest]
    #[case(2)]
    #[case(-1)]
    fn unknown_wire_values(#[case] value: i32) {
        assert!(matches!(Level::try_from(value), Err(Error::InvalidRequest(_))));
        assert!(matches!(
            EventlogCategory::try_from(value),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[rstest]
    #[case(0, MeasurementCategory::TeeReport)]
    #[case(1, MeasurementCategory::TdxRtmr)]
    #[case(2, MeasurementCategory::Tpm)]
    fn measurement_category_from_wire(#[case] value: i32, #[case] expected: MeasurementCategory) {
        assert_eq!(MeasurementCategory::try_from(value).unwrap(), expected);
    }

    #[rstest]
    #[case(3)]
    #[case(-1)]
    #[case(i32::MAX)]
    fn unknown_measurement_category(#[case] value: i32) {
        assert!(matches!(
            MeasurementCategory::try_from(value),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn tdx_eventlog_written_to_cache() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_ccel(&dir, 5);

        let reply = service.get_eventlog(&eventlog_request(1, 2)).await.unwrap();
        assert_eq!(
            Path::new(&reply.eventlog_data_loc),
            service.config().eventlog_cache_path()
        );

        let document: Value =
            serde_json::from_slice(&fs::read(&reply.eventlog_data_loc).unwrap()).unwrap();
        assert_eq!(document["Header"]["Address"], 0x7fbd0000u64);
        let records = document["EventLogs"].as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["Rtmr"], 1);
        assert_eq!(records[1]["Rtmr"], 2);
    }

    #[tokio::test]
    async fn zero_count_returns_whole_log() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_ccel(&dir, 5);

        let reply = service.get_eventlog(&eventlog_request(0, 0)).await.unwrap();
        let document: Value =
            serde_json::from_slice(&fs::read(reply.eventlog_data_loc).unwrap()).unwrap();
        assert_eq!(document["EventLogs"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn hex_digests_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&dir);
        config.digest_encoding = ccel::DigestEncoding::Hex;
        write(&config.ccel.table, &ccel_table(0));
        write(&config.ccel.data, &ccel_data(2));
        let service = EvidenceService::new(config);

        let reply = service.get_eventlog(&eventlog_request(0, 1)).await.unwrap();
        let document: Value =
            serde_json::from_slice(&fs::read(reply.eventlog_data_loc).unwrap()).unwrap();
        assert_eq!(document["EventLogs"][0]["Digests"][0], "00".repeat(48));
    }

    #[rstest]
    #[case(0, 5)]
    #[case(4, 1)]
    #[case(100, 0)]
    #[tokio::test]
    async fn window_out_of_range(#[case] start: i32, #[case] count: i32) {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_ccel(&dir, 5);

        let res = service.get_eventlog(&eventlog_request(start, count)).await;
        assert!(matches!(
            res,
            Err(Error::Evidence(evidence::Error::WindowOutOfRange { .. }))
        ));
    }

    #[rstest]
    #[case(-1, 0)]
    #[case(0, -1)]
    #[tokio::test]
    async fn negative_window(#[case] start: i32, #[case] count: i32) {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_ccel(&dir, 5);

        let res = service.get_eventlog(&eventlog_request(start, count)).await;
        assert!(matches!(res, Err(Error::InvalidRequest(_))));
        assert!(!service.config().eventlog_cache_path().exists());
    }

    #[tokio::test]
    async fn invalid_eventlog_request() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_ccel(&dir, 1);

        let mut req = eventlog_request(0, 0);
        req.eventlog_level = 7;
        assert!(matches!(
            service.get_eventlog(&req).await,
            Err(Error::InvalidRequest(_))
        ));

        let mut req = eventlog_request(0, 0);
        req.eventlog_category = 7;
        assert!(matches!(
            service.get_eventlog(&req).await,
            Err(Error::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn saas_eventlog_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let service = EvidenceService::new(config(&dir));

        let reply = service
            .get_eventlog(&GetEventlogRequest::default())
            .await
            .unwrap();
        assert_eq!(fs::read(reply.eventlog_data_loc).unwrap(), b"");
    }

    #[tokio::test]
    async fn missing_ccel() {
        let dir = tempfile::tempdir().unwrap();
        let service = EvidenceService::new(config(&dir));

        let res = service.get_eventlog(&eventlog_request(0, 0)).await;
        assert!(matches!(
            res,
            Err(Error::Evidence(evidence::Error::TableNotFound))
        ));
    }

    #[tokio::test]
    async fn tpm_eventlog() {
        let dir = tempfile::tempdir().unwrap();
        let service = EvidenceService::new(config(&dir));
        let mut req = eventlog_request(0, 0);
        req.eventlog_category = 1;

        assert!(matches!(
            service.get_eventlog(&req).await,
            Err(Error::Evidence(evidence::Error::EventLogNotFound(_)))
        ));

        write(&service.config().devices.tpm.eventlog, &[0; 16]);
        assert!(matches!(
            service.get_eventlog(&req).await,
            Err(Error::Evidence(evidence::Error::NotImplemented(_)))
        ));
    }

    fn measurement_request(category: i32, register_index: i32) -> GetMeasurementRequest {
        GetMeasurementRequest {
            measurement_type: 1,
            measurement_category: category,
            report_data: String::new(),
            register_index,
        }
    }

    #[tokio::test]
    async fn saas_measurement_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let service = EvidenceService::new(config(&dir));

        let reply = service
            .get_measurement(&GetMeasurementRequest::default())
            .await
            .unwrap();
        assert_eq!(reply.measurement, "");
    }

    #[rstest]
    #[case(GetMeasurementRequest { measurement_type: 3, ..Default::default() })]
    #[case(measurement_request(3, 0))]
    #[case(measurement_request(1, -1))]
    #[tokio::test]
    async fn invalid_measurement_request(#[case] req: GetMeasurementRequest) {
        let dir = tempfile::tempdir().unwrap();
        let service = EvidenceService::new(config(&dir));

        assert!(matches!(
            service.get_measurement(&req).await,
            Err(Error::InvalidRequest(_))
        ));
    }

    #[rstest]
    #[case(measurement_request(0, 0))]
    #[case(measurement_request(1, 0))]
    #[case(measurement_request(2, 0))]
    #[tokio::test]
    async fn measurement_without_device(#[case] req: GetMeasurementRequest) {
        let dir = tempfile::tempdir().unwrap();
        let service = EvidenceService::new(config(&dir));

        assert!(matches!(
            service.get_measurement(&req).await,
            Err(Error::Evidence(evidence::Error::DeviceNotFound))
        ));
    }

    #[tokio::test]
    async fn rtmr_index_checked_first() {
        let dir = tempfile::tempdir().unwrap();
        let service = EvidenceService::new(config(&dir));

        assert!(matches!(
            service.get_measurement(&measurement_request(1, 5)).await,
            Err(Error::Evidence(evidence::Error::InvalidRtmrIndex(5)))
        ));
    }

    #[tokio::test]
    async fn report_data_too_long() {
        let dir = tempfile::tempdir().unwrap();
        let service = EvidenceService::new(config(&dir));
        write(&service.config().devices.tdx.v1_5, b"");

        let mut req = measurement_request(0, 0);
        req.report_data = "x".repeat(65);
        assert!(matches!(
            service.get_measurement(&req).await,
            Err(Error::Evidence(evidence::Error::ReportDataTooLong(65)))
        ));
    }

    #[tokio::test]
    async fn deprecated_tdx_device() {
        let dir = tempfile::tempdir().unwrap();
        let service = EvidenceService::new(config(&dir));
        write(&service.config().devices.tdx.deprecated, b"");

        assert!(matches!(
            service.get_measurement(&measurement_request(0, 0)).await,
            Err(Error::Evidence(evidence::Error::DeprecatedDevice(_)))
        ));
    }

    #[tokio::test]
    async fn tpm_measurement_not_implemented() {
        let dir = tempfile::tempdir().unwrap();
        let service = EvidenceService::new(config(&dir));
        write(&service.config().devices.tpm.device, b"");

        assert!(matches!(
            service.get_measurement(&measurement_request(2, 0)).await,
            Err(Error::Evidence(evidence::Error::NotImplemented(_)))
        ));
    }
}
