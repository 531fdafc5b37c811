// Copyright (c) 2023 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid Request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Evidence(#[from] evidence::Error),

    #[error("failed to write event log to {path}")]
    CacheWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {0} not found")]
    ConfigNotFound(String),

    #[error("invalid config")]
    Config(#[from] ::config::ConfigError),
}
