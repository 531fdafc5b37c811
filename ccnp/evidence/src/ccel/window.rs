// Copyright (c) 2023 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use strum::{Display, EnumString};

use super::eventlog::{DecodedEventLog, EventLogHeader, EventLogRecord};
use crate::error::{Error, Result};

/// How record digests are rendered in the serialized document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DigestEncoding {
    /// Decimal byte values between brackets, e.g. `[222 173 190 239]`. This
    /// is what existing clients of the event log document parse.
    #[default]
    ByteArray,

    /// Lowercase hex string.
    Hex,
}

impl DigestEncoding {
    pub fn render(&self, digest: &[u8]) -> String {
        match self {
            DigestEncoding::ByteArray => {
                let bytes: Vec<String> = digest.iter().map(u8::to_string).collect();
                format!("[{}]", bytes.join(" "))
            }
            DigestEncoding::Hex => hex::encode(digest),
        }
    }
}

/// A view over the header and a contiguous run of records of a decoded log.
#[derive(Debug)]
pub struct EventLogWindow<'a> {
    header: &'a EventLogHeader,
    records: &'a [EventLogRecord],
}

impl DecodedEventLog {
    /// Selects `count` records beginning at `start`.
    ///
    /// A `count` of zero means no window: the whole log is returned as long
    /// as `start` does not lie past the last record plus the header.
    /// Otherwise `start + count` must be strictly smaller than the number of
    /// records, so a window ending exactly at the last record is rejected.
    pub fn window(&self, start: usize, count: usize) -> Result<EventLogWindow<'_>> {
        let total = self.record_count();
        if count == 0 {
            if start > total {
                return Err(Error::WindowOutOfRange {
                    start,
                    count,
                    total,
                });
            }

            return Ok(EventLogWindow {
                header: &self.header,
                records: &self.records,
            });
        }

        let end = start.checked_add(count).filter(|end| *end < total).ok_or(
            Error::WindowOutOfRange {
                start,
                count,
                total,
            },
        )?;

        Ok(EventLogWindow {
            header: &self.header,
            records: &self.records[start..end],
        })
    }
}

impl<'a> EventLogWindow<'a> {
    pub fn header(&self) -> &'a EventLogHeader {
        self.header
    }

    pub fn records(&self) -> &'a [EventLogRecord] {
        self.records
    }

    pub fn to_document(&self, encoding: DigestEncoding) -> EventLogDocument<'a> {
        EventLogDocument {
            header: self.header,
            event_logs: self
                .records
                .iter()
                .map(|record| RecordView::new(record, encoding))
                .collect(),
        }
    }

    pub fn to_json(&self, encoding: DigestEncoding) -> Result<String> {
        serde_json::to_string(&self.to_document(encoding)).map_err(Error::Serialize)
    }
}

/// Serializable form of a window, with the field names existing SDK clients
/// expect.
#[derive(Debug, Serialize)]
pub struct EventLogDocument<'a> {
    #[serde(rename = "Header")]
    header: &'a EventLogHeader,

    #[serde(rename = "EventLogs")]
    event_logs: Vec<RecordView<'a>>,
}

#[serde_as]
#[derive(Debug, Serialize)]
struct RecordView<'a> {
    #[serde(rename = "Rtmr")]
    rtmr_index: u32,

    #[serde(rename = "Etype")]
    event_type: u32,

    #[serde(rename = "DigestCount")]
    digest_count: u32,

    #[serde(rename = "Digests")]
    digests: Vec<String>,

    #[serde(rename = "Data")]
    #[serde_as(as = "Base64")]
    raw_bytes: &'a [u8],

    #[serde(rename = "Event")]
    #[serde_as(as = "Base64")]
    event_data: &'a [u8],

    #[serde(rename = "Length")]
    byte_length: usize,

    #[serde(rename = "EventSize")]
    event_size: u32,

    #[serde(rename = "AlgorithmId")]
    algorithm_id: u16,
}

impl<'a> RecordView<'a> {
    fn new(record: &'a EventLogRecord, encoding: DigestEncoding) -> Self {
        Self {
            rtmr_index: record.rtmr_index,
            event_type: record.event_type,
            digest_count: record.digest_count,
            digests: record.digests.iter().map(|d| encoding.render(d)).collect(),
            raw_bytes: &record.raw_bytes,
            event_data: &record.event_data,
            byte_length: record.byte_length,
            event_size: record.event_size,
            algorithm_id: record.algorithm_id,
        }
    }
}
