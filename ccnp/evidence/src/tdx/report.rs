// Copyright (c) 2024 Microsoft Corporation
// Copyright (c) 2024 Alibaba Cloud
// Copyright (c) 2023 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

use scroll::{Pread, LE};
use serde::Serialize;

use crate::error::{Error, Result};

/// Size of TDREPORT_STRUCT.
pub const TD_REPORT_SIZE: usize = 1024;

/// Number of runtime measurement registers in TDINFO_STRUCT.
pub const RTMR_COUNT: usize = 4;

/// Size of one runtime measurement register.
pub const RTMR_SIZE: usize = 48;

/// Offsets of RTMR0 to RTMR3 inside TDREPORT_STRUCT.
pub const RTMR_OFFSETS: [usize; RTMR_COUNT] = [0x2d0, 0x300, 0x330, 0x360];

/// Offset of TDINFO_STRUCT inside TDREPORT_STRUCT.
pub const TD_INFO_OFFSET: usize = 512;

/// Offset of MRTD inside TDREPORT_STRUCT.
pub const MRTD_OFFSET: usize = TD_INFO_OFFSET + 16;

/// Offset of REPORTDATA inside TDREPORT_STRUCT.
pub const REPORT_DATA_OFFSET: usize = 128;

/// Offset of TEE_TCB_INFO inside TDREPORT_STRUCT.
pub const TEE_TCB_INFO_OFFSET: usize = 256;

#[repr(C)]
#[derive(Clone, Debug, Pread, Serialize)]
/// Type header of TDREPORT_STRUCT.
pub struct TdTransportType {
    /// Type of the TDREPORT (0 - SGX, 81 - TDX, rest are reserved).
    #[serde(rename = "type")]
    pub type_: u8,

    /// Subtype of the TDREPORT (Default value is 0).
    pub sub_type: u8,

    /// TDREPORT version (Default value is 0).
    pub version: u8,

    /// Added for future extension.
    #[serde(skip)]
    pub reserved: u8,
}

#[repr(C)]
#[derive(Clone, Debug, Pread, Serialize)]
/// REPORTMACSTRUCT: report data, MAC and TEE hashes.
pub struct ReportMac {
    pub report_type: TdTransportType,

    #[serde(skip)]
    pub reserved1: [u8; 12],

    /// CPU security version.
    #[serde(with = "hex::serde")]
    pub cpu_svn: [u8; 16],

    /// SHA384 hash of TEE_TCB_INFO.
    #[serde(with = "hex::serde")]
    pub tee_tcb_info_hash: [u8; 48],

    /// SHA384 hash of TDINFO_STRUCT.
    #[serde(with = "hex::serde")]
    pub tee_info_hash: [u8; 48],

    /// User defined data passed in TDG.MR.REPORT request.
    #[serde(with = "hex::serde")]
    pub report_data: [u8; 64],

    #[serde(skip)]
    pub reserved2: [u8; 32],

    #[serde(with = "hex::serde")]
    pub mac: [u8; 32],
}

#[repr(C)]
#[derive(Clone, Debug, Pread, Serialize)]
/// TEE_TCB_INFO: measurements of the TDX module.
pub struct TeeTcbInfo {
    #[serde(with = "hex::serde")]
    pub valid: [u8; 8],

    #[serde(with = "hex::serde")]
    pub tee_tcb_svn: [u8; 16],

    /// Measurement of the SEAM module.
    #[serde(with = "hex::serde")]
    pub mrseam: [u8; 48],

    /// Measurement of the SEAM module signer.
    #[serde(with = "hex::serde")]
    pub mrsigner_seam: [u8; 48],

    #[serde(with = "hex::serde")]
    pub attributes: [u8; 8],

    #[serde(skip)]
    pub reserved: [u8; 111],
}

#[repr(C)]
#[derive(Clone, Debug, Pread, Serialize)]
/// TDINFO_STRUCT: TD measurements and configuration.
pub struct TdInfo {
    /// TD attributes (debug, sept_ve_disable, ...).
    #[serde(with = "hex::serde")]
    pub attributes: [u8; 8],

    /// Extended features allowed mask.
    #[serde(with = "hex::serde")]
    pub xfam: [u8; 8],

    /// Build time measurement register.
    #[serde(with = "hex::serde")]
    pub mrtd: [u8; 48],

    /// Software-defined ID for non-owner-defined configuration of the guest.
    #[serde(with = "hex::serde")]
    pub mrconfigid: [u8; 48],

    /// Software-defined ID for the guest owner.
    #[serde(with = "hex::serde")]
    pub mrowner: [u8; 48],

    /// Software-defined ID for owner-defined configuration of the guest.
    #[serde(with = "hex::serde")]
    pub mrownerconfig: [u8; 48],

    /// RTMR0 to RTMR3.
    #[serde(with = "hex::serde")]
    pub rtmr: [u8; 192],

    #[serde(skip)]
    pub reserved: [u8; 112],
}

#[repr(C)]
#[derive(Clone, Debug, Pread, Serialize)]
/// Output of TDCALL[TDG.MR.REPORT].
pub struct TdReport {
    /// MAC protected header of size 256 bytes.
    pub report_mac: ReportMac,

    /// Additional attestable elements in the TCB are not reflected in the report_mac.
    pub tee_tcb_info: TeeTcbInfo,

    #[serde(skip)]
    pub reserved: [u8; 17],

    /// Measurements and configuration data of size 512 bytes.
    pub tdinfo: TdInfo,
}

/// Validates an RTMR index and returns its offset inside the report.
pub fn rtmr_offset(index: i32) -> Result<usize> {
    usize::try_from(index)
        .ok()
        .and_then(|index| RTMR_OFFSETS.get(index).copied())
        .ok_or(Error::InvalidRtmrIndex(index))
}

/// Slices RTMR `index` out of a raw TD report.
pub fn extract_rtmr(report: &[u8], index: i32) -> Result<&[u8]> {
    let offset = rtmr_offset(index)?;
    if report.len() != TD_REPORT_SIZE {
        return Err(Error::MalformedReport(report.len()));
    }

    Ok(&report[offset..offset + RTMR_SIZE])
}

impl TdReport {
    /// Reinterprets a raw 1024 byte report. Nothing but the length is checked.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() != TD_REPORT_SIZE {
            return Err(Error::MalformedReport(raw.len()));
        }

        raw.pread_with::<TdReport>(0, LE)
            .map_err(|_| Error::MalformedReport(raw.len()))
    }

    pub fn rtmr(&self, index: i32) -> Result<&[u8]> {
        let index = usize::try_from(index)
            .ok()
            .filter(|index| *index < RTMR_COUNT)
            .ok_or(Error::InvalidRtmrIndex(index))?;

        Ok(&self.tdinfo.rtmr[index * RTMR_SIZE..(index + 1) * RTMR_SIZE])
    }
}
