// Copyright (c) 2023 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

//! Decoder for the TCG formatted event log carried in the CCEL data blob.
//!
//! The log starts with a SpecID header (an `EV_NO_ACTION` record in the legacy
//! SHA1 layout) which declares the digest algorithms in use, followed by
//! crypto-agile event records and terminated by a `0xFFFFFFFF` index field.
//!
//! A log whose first record is not `EV_NO_ACTION` is rejected with
//! [`Error::MissingSpecIdHeader`]: without the header the digest sizes of the
//! following records are unknown, so nothing after it can be decoded.
//! `EV_NO_ACTION` records found after the header (e.g. the StartupLocality
//! event) use the crypto-agile layout and are decoded as regular events,
//! never re-parsed as a second SpecID header.

use std::collections::BTreeMap;

use log::debug;
use serde::Serialize;
use serde_with::{base64::Base64, serde_as};

use crate::error::{Error, Result};

/// Event type of the SpecID header record.
pub const EV_NO_ACTION: u32 = 0x3;

/// Index field value marking the end of the log.
pub const END_OF_LOG: u32 = 0xFFFF_FFFF;

/// Rest of the legacy SHA1 digest and the event size (20 bytes), then the
/// signature, platform class, spec version and uintn size (24 bytes), all
/// between the basic info and the algorithm count of the SpecID header.
const SPEC_ID_SKIPPED_LEN: usize = 20 + 24;

/// Bounds checked little-endian reader. `pos` is an absolute offset into
/// `data`; every read validates `pos + size <= data.len()` before slicing.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn take(&mut self, size: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(size)
            .filter(|end| *end <= self.data.len())
            .ok_or(Error::TruncatedRecord {
                offset: self.pos,
                needed: size,
                len: self.data.len(),
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads the register index, event type and digest count shared by the
    /// header and the event records. The stored register index is the raw
    /// value minus one.
    fn read_basic_info(&mut self) -> Result<(u32, u32, u32)> {
        let rtmr_index = self.read_u32()?.wrapping_sub(1);
        let event_type = self.read_u32()?;
        let digest_count = self.read_u32()?;
        Ok((rtmr_index, event_type, digest_count))
    }
}

/// Maps a TCG algorithm id to the length of its digest in bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DigestSizeTable(BTreeMap<u16, u16>);

impl DigestSizeTable {
    pub fn get(&self, algorithm_id: u16) -> Option<u16> {
        self.0.get(&algorithm_id).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.0.iter().map(|(alg, size)| (*alg, *size))
    }

    fn decode(reader: &mut Reader) -> Result<Self> {
        let algorithm_count = reader.read_u32()?;
        let mut table = BTreeMap::new();
        for _ in 0..algorithm_count {
            let algorithm_id = reader.read_u16()?;
            let digest_size = reader.read_u16()?;
            table.insert(algorithm_id, digest_size);
        }

        Ok(Self(table))
    }
}

impl FromIterator<(u16, u16)> for DigestSizeTable {
    fn from_iter<I: IntoIterator<Item = (u16, u16)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The SpecID header, first record of the log.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EventLogHeader {
    /// Physical address of the log area, when known from the CCEL table.
    #[serde(rename = "Address")]
    pub address: u64,

    /// Bytes spanned by the header, vendor info included.
    #[serde(rename = "Length")]
    pub length: usize,

    #[serde(rename = "HeaderData")]
    #[serde_as(as = "Base64")]
    pub raw_bytes: Vec<u8>,

    #[serde(rename = "Rtmr")]
    pub rtmr_index: u32,

    #[serde(rename = "Etype")]
    pub event_type: u32,

    #[serde(rename = "DigestCount")]
    pub digest_count: u32,

    #[serde(rename = "DigestSizes")]
    pub digest_sizes: DigestSizeTable,
}

impl EventLogHeader {
    fn decode(data: &[u8], start: usize) -> Result<Self> {
        let mut reader = Reader::new(data, start);
        let (rtmr_index, event_type, digest_count) = reader.read_basic_info()?;
        reader.take(SPEC_ID_SKIPPED_LEN)?;

        let digest_sizes = DigestSizeTable::decode(&mut reader)?;

        let vendor_info_size = reader.read_u8()?;
        reader.take(vendor_info_size as usize)?;

        let length = reader.pos - start;
        Ok(Self {
            address: 0,
            length,
            raw_bytes: data[start..reader.pos].to_vec(),
            rtmr_index,
            event_type,
            digest_count,
            digest_sizes,
        })
    }
}

/// One measured event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventLogRecord {
    /// Register the event is bound to, raw value minus one.
    pub rtmr_index: u32,
    pub event_type: u32,
    pub digest_count: u32,
    /// One digest per algorithm present, in record order.
    pub digests: Vec<Vec<u8>>,
    /// Algorithm of the last digest processed, 0 when there is none.
    pub algorithm_id: u16,
    pub event_size: u32,
    pub event_data: Vec<u8>,
    /// Bytes spanned by the record in the source buffer.
    pub byte_length: usize,
    /// The verbatim record slice.
    pub raw_bytes: Vec<u8>,
}

impl EventLogRecord {
    fn decode(data: &[u8], start: usize, digest_sizes: &DigestSizeTable) -> Result<Self> {
        let mut reader = Reader::new(data, start);
        let (rtmr_index, event_type, digest_count) = reader.read_basic_info()?;

        let mut digests = Vec::new();
        let mut algorithm_id = 0;
        for _ in 0..digest_count {
            algorithm_id = reader.read_u16()?;
            let digest_size = digest_sizes
                .get(algorithm_id)
                .ok_or(Error::UnknownDigestAlgorithm(algorithm_id))?;
            digests.push(reader.take(digest_size as usize)?.to_vec());
        }

        let event_size = reader.read_u32()?;
        let event_data = reader.take(event_size as usize)?.to_vec();

        Ok(Self {
            rtmr_index,
            event_type,
            digest_count,
            digests,
            algorithm_id,
            event_size,
            event_data,
            byte_length: reader.pos - start,
            raw_bytes: data[start..reader.pos].to_vec(),
        })
    }
}

/// A decoded log: the SpecID header and the events in file order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedEventLog {
    pub header: EventLogHeader,
    pub records: Vec<EventLogRecord>,
}

impl DecodedEventLog {
    /// Number of event records, neither the header nor the end marker included.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn with_address(mut self, address: u64) -> Self {
        self.header.address = address;
        self
    }
}

/// Decodes the raw CCEL data blob.
///
/// Scanning stops at the end marker or at the end of the buffer, whichever
/// comes first. Register indexes outside of the RTMR range are kept as is.
pub fn decode(data: &[u8]) -> Result<DecodedEventLog> {
    let mut header: Option<EventLogHeader> = None;
    let mut records = Vec::new();
    let mut start = 0;

    while start < data.len() {
        let mut reader = Reader::new(data, start);
        if reader.read_u32()? == END_OF_LOG {
            break;
        }
        let event_type = reader.read_u32()?;

        match &header {
            None => {
                if event_type != EV_NO_ACTION {
                    debug!("first event log record has type {event_type:#x}, not EV_NO_ACTION");
                    return Err(Error::MissingSpecIdHeader);
                }

                let spec_id = EventLogHeader::decode(data, start)?;
                start += spec_id.length;
                header = Some(spec_id);
            }
            Some(spec_id) => {
                let record = EventLogRecord::decode(data, start, &spec_id.digest_sizes)?;
                start += record.byte_length;
                records.push(record);
            }
        }
    }

    let header = header.ok_or(Error::MissingSpecIdHeader)?;
    debug!(
        "decoded event log: {} algorithm(s), {} record(s)",
        header.digest_sizes.len(),
        records.len()
    );

    Ok(DecodedEventLog { header, records })
}
