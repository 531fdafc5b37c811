// Copyright (c) 2023 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("CCEL table not found")]
    TableNotFound,

    #[error("CCEL table with invalid data: {0}")]
    InvalidTable(String),

    #[error("failed to read CCEL table attribute `{0}`")]
    AttributeReadFailure(&'static str),

    #[error("truncated record: need {needed} bytes at offset {offset}, only {len} available")]
    TruncatedRecord {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("event log does not start with a SpecID (EV_NO_ACTION) header")]
    MissingSpecIdHeader,

    #[error("digest algorithm {0:#06x} is not declared in the SpecID header")]
    UnknownDigestAlgorithm(u16),

    #[error("invalid window: start {start} + count {count} exceeds event log length {total}")]
    WindowOutOfRange {
        start: usize,
        count: usize,
        total: usize,
    },

    #[error("serialize event log failed")]
    Serialize(#[source] serde_json::Error),

    #[error("event log not found at {0}")]
    EventLogNotFound(String),

    #[error("no applicable TEE device found")]
    DeviceNotFound,

    #[error("deprecated device node {0} found, please upgrade to a v1.0 or v1.5 guest driver")]
    DeprecatedDevice(String),

    #[error("report data with invalid length {0}, must be no more than 64 bytes")]
    ReportDataTooLong(usize),

    #[error("invalid RTMR index {0} used")]
    InvalidRtmrIndex(i32),

    #[error("malformed TD report: {0} bytes, expected 1024")]
    MalformedReport(usize),

    #[error("invalid base64 encoded report")]
    InvalidReportEncoding(#[source] base64::DecodeError),

    #[error("failed to open device {path}")]
    DeviceOpenFailure {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to get TD report from {path}")]
    ReportIoctlFailure {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
