// Copyright (c) 2023 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

//! Request layouts of the two TDX guest driver generations.
//!
//! The v1.0 driver (`/dev/tdx-guest`) takes a descriptor pointing at separate
//! report data and report buffers. The v1.5 driver (`/dev/tdx_guest`, merged
//! upstream) takes one contiguous `[report_data | report]` buffer and fills
//! the report in place. Both use `_IOWR('T', 1, ...)`, the size encoded in
//! the request number being what tells them apart.

use std::fs::File;

use iocuddle::{Group, Ioctl, WriteRead};

use super::report::TD_REPORT_SIZE;
use super::REPORT_DATA_SIZE;

/// `struct tdx_report_req` of the v1.0 driver.
#[repr(C)]
#[allow(dead_code)]
pub struct TdxReportReqV10 {
    /// Subtype of TD report, always 0.
    subtype: u8,

    /// User address of the report data buffer.
    reportdata: u64,

    /// Length of the report data buffer.
    rpd_len: u32,

    /// User address of the TD report buffer.
    tdreport: u64,

    /// Length of the TD report buffer.
    tdr_len: u32,
}

/// `struct tdx_report_req` of the v1.5 driver.
#[repr(C)]
pub struct TdxReportReq0 {
    report_data: [u8; REPORT_DATA_SIZE],
    td_report: [u8; TD_REPORT_SIZE],
}

const TDX: Group = Group::new(b'T');

/// TDX_CMD_GET_REPORT = _IOWR('T', 0x01, __u64) in arch/x86/include/uapi/asm/tdx.h
const TDX_CMD_GET_REPORT: Ioctl<WriteRead, &u64> = unsafe { TDX.write_read(0x1) };

/// The v1.0 request number encodes a `__u64` but the driver reads a
/// `struct tdx_report_req` through the argument.
const TDX_CMD_GET_REPORT_V1_0: Ioctl<WriteRead, &TdxReportReqV10> =
    unsafe { TDX_CMD_GET_REPORT.lie() };

/// TDX_CMD_GET_REPORT0 = _IOWR('T', 1, struct tdx_report_req) in include/uapi/linux/tdx-guest.h
const TDX_CMD_GET_REPORT0_V1_5: Ioctl<WriteRead, &TdxReportReq0> = unsafe { TDX.write_read(0x1) };

/// Asks a v1.0 driver for a TD report.
pub fn get_report_v1_0(
    device: &mut File,
    report_data: &[u8; REPORT_DATA_SIZE],
) -> std::io::Result<[u8; TD_REPORT_SIZE]> {
    let mut td_report = [0u8; TD_REPORT_SIZE];
    let mut request = TdxReportReqV10 {
        subtype: 0,
        reportdata: report_data.as_ptr() as u64,
        rpd_len: REPORT_DATA_SIZE as u32,
        tdreport: td_report.as_mut_ptr() as u64,
        tdr_len: TD_REPORT_SIZE as u32,
    };

    TDX_CMD_GET_REPORT_V1_0.ioctl(device, &mut request)?;

    Ok(td_report)
}

/// Asks a v1.5 driver for a TD report.
pub fn get_report_v1_5(
    device: &mut File,
    report_data: &[u8; REPORT_DATA_SIZE],
) -> std::io::Result<[u8; TD_REPORT_SIZE]> {
    let mut request = TdxReportReq0 {
        report_data: *report_data,
        td_report: [0; TD_REPORT_SIZE],
    };

    TDX_CMD_GET_REPORT0_V1_5.ioctl(device, &mut request)?;

    Ok(request.td_report)
}
