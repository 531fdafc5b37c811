// Copyright (c) 2023 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

//! Locates the ACPI CCEL table and the event log blob it describes.
//!
//! The files are looked up first under the container mount and then under
//! the host sysfs path, independently for the table and the data blob.

use std::path::{Path, PathBuf};

use log::debug;
use scroll::{Pread, LE};
use serde::Deserialize;

use crate::error::{Error, Result};

pub mod eventlog;
pub mod window;

pub use eventlog::{decode, DecodedEventLog, DigestSizeTable, EventLogHeader, EventLogRecord};
pub use window::{DigestEncoding, EventLogDocument, EventLogWindow};

pub const CCEL_TABLE_PATH: &str = "/sys/firmware/acpi/tables/CCEL";
pub const CCEL_DATA_PATH: &str = "/sys/firmware/acpi/tables/data/CCEL";

pub const CCEL_TABLE_MOUNT_PATH: &str = "/run/firmware/acpi/tables/CCEL";
pub const CCEL_DATA_MOUNT_PATH: &str = "/run/firmware/acpi/tables/data/CCEL";

/// Signature of CCEL's ACPI Description Header
const CCEL_SIGNATURE: &[u8] = b"CCEL";

/// Size of the CCEL table: the ACPI description header, CC type and subtype,
/// a reserved word, then LAML and LASA.
const CCEL_TABLE_MIN_LEN: usize = 56;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct CcelPaths {
    pub table: PathBuf,
    pub table_mount: PathBuf,
    pub data: PathBuf,
    pub data_mount: PathBuf,
}

impl Default for CcelPaths {
    fn default() -> Self {
        Self {
            table: CCEL_TABLE_PATH.into(),
            table_mount: CCEL_TABLE_MOUNT_PATH.into(),
            data: CCEL_DATA_PATH.into(),
            data_mount: CCEL_DATA_MOUNT_PATH.into(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Pread)]
struct EfiAcpiDescriptionHeader {
    signature: u32,
    length: u32,
    revision: u8,
    checksum: u8,
    oem_id: [u8; 6],
    oem_table_id: u64,
    oem_revision: u32,
    creator_id: u32,
    creator_revision: u32,
}

#[repr(C)]
#[derive(Debug, Pread)]
struct CcelAcpiTable {
    header: EfiAcpiDescriptionHeader,
    cc_type: u8,
    cc_subtype: u8,
    reserved: u16,
    laml: u64,
    lasa: u64,
}

/// The validated CCEL table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CcelTable {
    pub raw: Vec<u8>,

    /// Log area minimum length (LAML).
    pub log_area_length: u64,

    /// Log area start address (LASA).
    pub log_area_address: u64,
}

impl CcelTable {
    pub fn parse(raw: Vec<u8>) -> Result<Self> {
        if raw.get(..CCEL_SIGNATURE.len()) != Some(CCEL_SIGNATURE) {
            return Err(Error::InvalidTable("wrong CCEL signature".into()));
        }

        if raw.len() < CCEL_TABLE_MIN_LEN {
            return Err(Error::InvalidTable(format!(
                "{} bytes, shorter than {CCEL_TABLE_MIN_LEN}",
                raw.len()
            )));
        }

        let table = raw
            .pread_with::<CcelAcpiTable>(0, LE)
            .map_err(|_| Error::AttributeReadFailure("CCEL ACPI description"))?;
        debug!(
            "CCEL table: revision {}, cc type {}, LAML {:#x}, LASA {:#x}",
            table.header.revision, table.cc_type, table.laml, table.lasa
        );

        Ok(Self {
            raw,
            log_area_length: table.laml,
            log_area_address: table.lasa,
        })
    }
}

/// The CCEL table together with the event log blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ccel {
    pub table: CcelTable,
    pub data: Vec<u8>,
}

impl Ccel {
    pub fn decode(&self) -> Result<DecodedEventLog> {
        Ok(eventlog::decode(&self.data)?.with_address(self.table.log_area_address))
    }
}

fn first_existing<'a>(candidates: &[&'a Path]) -> Option<&'a Path> {
    candidates.iter().copied().find(|path| path.exists())
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Finds, reads and validates the CCEL table and its data blob.
pub fn locate(paths: &CcelPaths) -> Result<Ccel> {
    let table_path = first_existing(&[paths.table_mount.as_path(), paths.table.as_path()])
        .ok_or(Error::TableNotFound)?;
    debug!("reading CCEL table from {}", table_path.display());
    let table = CcelTable::parse(read(table_path)?)?;

    let data_path = first_existing(&[paths.data_mount.as_path(), paths.data.as_path()])
        .ok_or(Error::TableNotFound)?;
    debug!("reading CCEL data from {}", data_path.display());
    let data = read(data_path)?;
    if data.is_empty() {
        return Err(Error::TableNotFound);
    }

    Ok(Ccel { table, data })
}
