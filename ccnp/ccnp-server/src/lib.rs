// Copyright (c) 2023 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

//! Request handling of the CCNP event log and measurement services.

pub mod config;
pub mod error;
pub mod service;

pub use self::config::CcnpConfig;
pub use error::{Error, Result};
pub use service::EvidenceService;
