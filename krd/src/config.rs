// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Configuration for `krd`.

use std::time::Duration;

use serde::Deserialize;

use common::logging::LogFormat;

use crate::history::KR_HIST_NUM;
use crate::types::KrError;
use crate::types::KrResult;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The run-time settings of the daemon.
#[derive(Debug)]
pub struct Config {
    /// If set, where the log should be written.  If not set, the log goes to
    /// stdout.
    pub log_file: Option<String>,

    /// Output log info in unstructured text or json?
    pub log_format: LogFormat,

    /// Time between supervisor ticks
    pub poll_interval: Duration,

    /// Capacity of each history log
    pub history_depth: usize,

    /// The emulated board
    pub board: asic::stub::AsicConfig,

    /// Fault injection on top of the board, if any
    pub chaos: Option<asic::chaos::AsicConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_file: None,
            log_format: LogFormat::Human,
            poll_interval: DEFAULT_POLL_INTERVAL,
            history_depth: KR_HIST_NUM,
            board: asic::stub::AsicConfig::default(),
            chaos: None,
        }
    }
}

/// Layout of the TOML board file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BoardFile {
    board: Option<asic::stub::AsicConfig>,
    chaos: Option<asic::chaos::AsicConfig>,
}

fn update_from_board_file(txt: &str, config: &mut Config) -> KrResult<()> {
    let file: BoardFile =
        toml::from_str(txt).map_err(|e| KrError::Other(e.to_string()))?;
    if let Some(board) = file.board {
        config.board = board;
    }
    config.chaos = file.chaos;
    Ok(())
}

// Use the command-line arguments to update the run-time config.
fn update_from_cli(opts: &crate::Opt, config: &mut Config) -> KrResult<()> {
    if let Some(log_file) = &opts.log_file {
        config.log_file = Some(log_file.to_string());
    }

    if let Some(log_format) = opts.log_format {
        config.log_format = log_format;
    }

    if let Some(path) = &opts.board_config {
        let txt = std::fs::read_to_string(path)?;
        update_from_board_file(&txt, config)?;
    }

    if let Some(ms) = opts.poll_interval_ms {
        if ms == 0 {
            return Err(KrError::Invalid(
                "poll interval must be at least 1ms".to_string(),
            ));
        }
        config.poll_interval = Duration::from_millis(ms);
    }

    if let Some(depth) = opts.history_depth {
        if depth == 0 {
            return Err(KrError::Invalid(
                "history depth must be nonzero".to_string(),
            ));
        }
        config.history_depth = depth;
    }

    Ok(())
}

/// Build the run-time config from the defaults, overridden by anything given
/// on the command line.
pub(crate) fn build_config(opts: &crate::Opt) -> KrResult<Config> {
    let mut config = Config::default();
    update_from_cli(opts, &mut config)?;
    Ok(config)
}
