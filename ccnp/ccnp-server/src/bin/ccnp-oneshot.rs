// Copyright (c) 2023 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

//! This is a one-shot version of the CCNP evidence services

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use ccnp_server::{
    service::{GetEventlogRequest, GetMeasurementRequest},
    CcnpConfig, EvidenceService,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use evidence::tdx::report::TdReport;

#[derive(Parser)]
#[command(name = "ccnp_oneshot")]
#[command(bin_name = "ccnp_oneshot")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    operation: Operation,

    /// CCNP's config path
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Operation {
    /// Write the windowed event log document to the cache file
    Eventlog(EventlogArgs),

    /// Get a TEE report of the first device found
    Report(ReportArgs),

    /// Get one TDX runtime measurement register
    Rtmr(RtmrArgs),

    /// Get one TPM PCR
    Tpm(TpmArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum EventlogCategory {
    Tdx,
    Tpm,
}

#[derive(Args)]
struct EventlogArgs {
    #[arg(long, value_enum, default_value = "tdx")]
    category: EventlogCategory,

    /// Index of the first record
    #[arg(short, long, default_value = "0")]
    start: i32,

    /// Number of records, 0 for all of them
    #[arg(short, long, default_value = "0")]
    count: i32,
}

#[derive(Args)]
struct ReportArgs {
    /// Report data, at most 64 bytes
    #[arg(short, long, default_value = "")]
    data: String,

    /// Print the decoded TD report instead of the base64 blob
    #[arg(long)]
    decode: bool,
}

#[derive(Args)]
struct RtmrArgs {
    #[arg(short, long)]
    index: i32,

    #[arg(short, long, default_value = "")]
    data: String,
}

#[derive(Args)]
struct TpmArgs {
    #[arg(short, long)]
    index: i32,
}

const PAAS: i32 = 1;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let args = Cli::parse();
    let config = CcnpConfig::new(args.config).context("failed to initialize ccnp config")?;
    let service = EvidenceService::new(config);

    match args.operation {
        Operation::Eventlog(op_args) => {
            let req = GetEventlogRequest {
                eventlog_level: PAAS,
                eventlog_category: match op_args.category {
                    EventlogCategory::Tdx => 0,
                    EventlogCategory::Tpm => 1,
                },
                start_position: op_args.start,
                count: op_args.count,
            };
            let reply = service
                .get_eventlog(&req)
                .await
                .context("get eventlog failed")?;
            println!("{}", reply.eventlog_data_loc);
        }
        Operation::Report(op_args) => {
            let reply = service
                .get_measurement(&measurement_request(0, op_args.data, 0))
                .await
                .context("get TEE report failed")?;
            if op_args.decode {
                let raw = STANDARD
                    .decode(&reply.measurement)
                    .context("invalid base64 report")?;
                let report = TdReport::decode(&raw).context("decode TD report failed")?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", reply.measurement);
            }
        }
        Operation::Rtmr(op_args) => {
            let reply = service
                .get_measurement(&measurement_request(1, op_args.data, op_args.index))
                .await
                .context("get RTMR failed")?;
            println!("{}", reply.measurement);
        }
        Operation::Tpm(op_args) => {
            let reply = service
                .get_measurement(&measurement_request(2, String::new(), op_args.index))
                .await
                .context("get TPM measurement failed")?;
            println!("{}", reply.measurement);
        }
    }

    Ok(())
}

fn measurement_request(category: i32, report_data: String, index: i32) -> GetMeasurementRequest {
    GetMeasurementRequest {
        measurement_type: PAAS,
        measurement_category: category,
        report_data,
        register_index: index,
    }
}
