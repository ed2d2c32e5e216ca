// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Main application entry point for `krd`, the KR auto-negotiation and link
//! training supervisor.

use std::sync::Arc;

use slog::debug;
use slog::error;
use slog::info;
use structopt::StructOpt;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;

use aal::KrOps;
use asic::chaos;
use asic::stub::StubHandle;

use crate::cli::KrCommand;
use crate::config::Config;
use crate::poller::KrPoller;
use crate::supervisor::KrSupervisor;

mod admin;
mod cli;
mod config;
mod history;
mod irq;
mod poller;
mod session;
mod status;
mod supervisor;
mod types;

#[derive(Debug, Default, StructOpt)]
#[structopt(name = "krd", about = "KR aneg and link training supervisor")]
pub(crate) struct Opt {
    #[structopt(
        long,
        about = "send log data to the named file rather than stdout"
    )]
    log_file: Option<String>,

    #[structopt(
        long,
        short = "l",
        about = "log format",
        help = "format logs for 'human' or 'json' consumption"
    )]
    log_format: Option<common::logging::LogFormat>,

    #[structopt(
        long,
        help = "TOML file describing the emulated board and its faults"
    )]
    board_config: Option<String>,

    #[structopt(long, help = "milliseconds between supervisor ticks")]
    poll_interval_ms: Option<u64>,

    #[structopt(long, help = "number of entries kept in each history log")]
    history_depth: Option<usize>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::from_args();
    let config = config::build_config(&opt)?;

    let log =
        common::logging::init("krd", &config.log_file, config.log_format)?;
    info!(log, "krd config: {config:#?}");

    let stub = StubHandle::new(&log, &config.board)?;
    match &config.chaos {
        Some(chaos) => {
            info!(log, "injecting faults into the emulated board");
            let hdl = chaos::Handle::new(&log, chaos, stub);
            run(&log, hdl, &config).await
        }
        None => run(&log, stub, &config).await,
    }
}

// Execute one operator command line, printing its output.
fn handle_line<H: KrOps>(sup: &KrSupervisor<H>, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    match KrCommand::parse_line(line) {
        Ok(cmd) => {
            debug!(sup.log, "operator command"; "cmd" => ?cmd);
            match cmd.execute(sup) {
                Ok(text) => print!("{text}"),
                Err(e) => println!("kr: {e}"),
            }
        }
        Err(e) => println!("{}", e.message),
    }
}

async fn run<H>(
    log: &slog::Logger,
    hdl: H,
    config: &Config,
) -> anyhow::Result<()>
where
    H: KrOps + Send + Sync + 'static,
{
    let sup = Arc::new(KrSupervisor::new(log, hdl, config.history_depth));
    let poller = KrPoller::new();
    let task = poller.run(sup.clone(), config.poll_interval)?;
    info!(log, "kr supervisor running";
        "ports" => sup.ports().len(),
        "interval" => ?config.poll_interval);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&sup, &line),
                Ok(None) => {
                    info!(log, "operator input closed");
                    break;
                }
                Err(e) => {
                    error!(log, "failed to read operator input"; "error" => %e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!(log, "interrupted");
                break;
            }
        }
    }

    poller.quit();
    task.await?;
    info!(log, "exiting");
    Ok(())
}
