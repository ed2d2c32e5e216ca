// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Operator commands.  Each returns the text shown to the operator; failures
//! on individual ports are reported in that text rather than as errors.

use std::fmt::Write;
use std::sync::Arc;
use std::sync::Mutex;

use slog::error;
use slog::info;
use slog::warn;
use structopt::StructOpt;

use aal::KrConf;
use aal::KrFec;
use aal::KrOps;
use common::ports::PortNo;

use crate::irq::IrqDump;
use crate::session::KrSession;
use crate::status;
use crate::status::PortStatus;
use crate::supervisor::KrSupervisor;
use crate::types::KrError;
use crate::types::KrResult;

/// Options for enabling or disabling KR on a set of ports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, StructOpt)]
pub struct AnegOptions {
    #[structopt(long)]
    pub disable: bool,
    #[structopt(long)]
    pub adv_1g: bool,
    #[structopt(long)]
    pub adv_2g5: bool,
    #[structopt(long)]
    pub adv_5g: bool,
    #[structopt(long)]
    pub adv_10g: bool,
    #[structopt(long)]
    pub adv_25g: bool,
    #[structopt(long)]
    pub training: bool,
    #[structopt(long)]
    pub no_remote: bool,
    /// Advertise every speed and FEC, and train
    #[structopt(long)]
    pub all: bool,
    #[structopt(long)]
    pub r_fec: bool,
    #[structopt(long)]
    pub rs_fec: bool,
    #[structopt(long)]
    pub next_page: bool,
}

impl AnegOptions {
    /// The KR configuration these options ask for, starting from what the
    /// port currently has.  25G is only advertised on 25G capable ports.
    pub fn build_conf(&self, current: &KrConf, capability_25g: bool) -> KrConf {
        let mut conf = *current;
        conf.aneg.enable = !self.disable;
        conf.train.enable = self.training || self.all;
        conf.train.no_remote = self.no_remote;
        conf.aneg.adv_1g = self.adv_1g || self.all;
        conf.aneg.adv_2g5 = self.adv_2g5 || self.all;
        conf.aneg.adv_5g = self.adv_5g || self.all;
        conf.aneg.adv_10g = self.adv_10g || self.all;
        if capability_25g {
            conf.aneg.adv_25g = self.adv_25g || self.all;
        }
        conf.aneg.fec_ability = true;
        conf.aneg.r_fec_request = self.r_fec || self.all;
        conf.aneg.rs_fec_request = self.rs_fec || self.all;
        conf.aneg.next_page = self.next_page;
        conf
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, StructOpt)]
pub struct StatusOptions {
    /// Show the training histories
    #[structopt(long)]
    pub history: bool,
    /// Show the interrupt histories
    #[structopt(long)]
    pub irq: bool,
    /// Include hold steps in the training histories, and the board-wide
    /// interrupt history
    #[structopt(long)]
    pub all: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, StructOpt)]
pub struct DebugOptions {
    /// Toggle stop_training
    #[structopt(long)]
    pub stop: bool,
    /// Set the interrupt dump level
    #[structopt(long)]
    pub irq: bool,
    /// Toggle aneg state machine tracing
    #[structopt(long)]
    pub state_machine: bool,
    #[structopt(long)]
    pub all: bool,
    #[structopt(long)]
    pub disable: bool,
    /// Stop the supervisor on every port until KR is next set
    #[structopt(long)]
    pub halt: bool,
}

fn enabled(v: bool) -> &'static str {
    if v {
        "enabled"
    } else {
        "disabled"
    }
}

impl<H: KrOps> KrSupervisor<H> {
    /// All board ports, in order
    pub fn ports(&self) -> Vec<PortNo> {
        self.sessions.iter().map(|(port, _)| *port).collect()
    }

    // The sessions of the selected 10G capable ports.  Naming a port that
    // isn't on the board is an error; ports without KR are passed over.
    fn kr_sessions(
        &self,
        ports: &[PortNo],
    ) -> KrResult<Vec<(PortNo, Arc<Mutex<KrSession>>)>> {
        if let Some(port) = ports
            .iter()
            .find(|port| self.sessions.get(**port).is_err())
        {
            return Err(KrError::NoSuchPort(*port));
        }
        Ok(self
            .sessions
            .select(ports)
            .into_iter()
            .filter(|(_, session)| session.lock().unwrap().capability_10g())
            .collect())
    }

    // The KR config of `port`, if it can be read and has aneg enabled.
    fn active_conf(&self, port: PortNo) -> Option<KrConf> {
        self.hdl
            .kr_conf_get(port)
            .ok()
            .filter(|conf| conf.aneg.enable)
    }

    /// Apply a new KR configuration to each port.  The port's supervision
    /// state starts over, and any global halt is lifted.
    pub fn kr_set(
        &self,
        ports: &[PortNo],
        opts: &AnegOptions,
    ) -> KrResult<String> {
        let mut out = String::new();
        let sessions = self.kr_sessions(ports)?;
        self.debug.lock().unwrap().halted = false;

        for (port, session) in sessions {
            let current = match self.hdl.kr_conf_get(port) {
                Ok(conf) => conf,
                Err(e) => {
                    warn!(self.log, "failed to read kr conf";
                        "port" => port,
                        "error" => %e);
                    continue;
                }
            };

            let mut session = session.lock().unwrap();
            session.check_block_lock = false;
            session.gen1_wait = false;
            session.stop_training = false;
            session.reset_training();
            if port == 0 {
                self.global.lock().unwrap().reset();
            }

            if let Err(e) = self.hdl.kr_fec_set(port, &KrFec::none()) {
                warn!(self.log, "failed to clear fec";
                    "port" => port,
                    "error" => %e);
            }

            let conf = opts.build_conf(&current, session.capability_25g());
            match self.hdl.kr_conf_set(port, &conf) {
                Ok(()) => info!(self.log, "kr conf set";
                    "port" => port,
                    "aneg" => conf.aneg.enable,
                    "training" => conf.train.enable),
                Err(e) => {
                    error!(self.log, "failed to set kr conf";
                        "port" => port,
                        "error" => %e);
                    writeln!(out, "KR set failed for port {port}")?;
                }
            }
        }
        Ok(out)
    }

    /// Whether aneg and training are enabled on each port.
    pub fn kr_show(&self, ports: &[PortNo]) -> KrResult<String> {
        let mut out = String::new();
        for (port, _) in self.kr_sessions(ports)? {
            let Ok(conf) = self.hdl.kr_conf_get(port) else {
                continue;
            };
            let state = |v| if v { "Enabled" } else { "Disabled" };
            writeln!(out, "Port: {port}")?;
            writeln!(out, "  KR aneg: {}", state(conf.aneg.enable))?;
            writeln!(out, "  KR training: {}", state(conf.train.enable))?;
        }
        Ok(out)
    }

    /// KR status of each port with aneg enabled, or its histories.
    pub fn kr_status(
        &self,
        ports: &[PortNo],
        opts: &StatusOptions,
    ) -> KrResult<String> {
        let mut out = String::new();
        let sessions: Vec<_> = self
            .kr_sessions(ports)?
            .into_iter()
            .filter_map(|(port, session)| {
                self.active_conf(port).map(|conf| (port, conf, session))
            })
            .collect();

        if opts.history {
            for (port, _, session) in &sessions {
                let session = session.lock().unwrap();
                let hist = &session.training.ld_history;
                if !hist.is_empty() {
                    writeln!(out)?;
                    out.push_str(&status::ld_table(*port, hist, opts.all)?);
                }
            }
            for (port, _, session) in &sessions {
                let session = session.lock().unwrap();
                let hist = &session.training.lp_history;
                if !hist.is_empty() {
                    writeln!(out)?;
                    out.push_str(&status::lp_table(*port, hist, opts.all)?);
                }
            }
            return Ok(out);
        }

        if opts.irq {
            for (port, _, session) in &sessions {
                let session = session.lock().unwrap();
                let hist = &session.training.irq_history;
                if !hist.is_empty() {
                    writeln!(out)?;
                    out.push_str(&status::irq_table(*port, hist)?);
                }
            }
            if opts.all {
                let global = self.global.lock().unwrap();
                if !global.entries.is_empty() {
                    writeln!(out)?;
                    out.push_str(&status::global_irq_table(&global.entries)?);
                }
            }
            return Ok(out);
        }

        for (port, conf, session) in &sessions {
            let port = *port;
            let status = match self.hdl.kr_status_get(port) {
                Ok(status) => status,
                Err(e) => {
                    warn!(self.log, "failed to read kr status";
                        "port" => port,
                        "error" => %e);
                    writeln!(out, "Port:{port} Could not read kr status")?;
                    continue;
                }
            };
            let session = session.lock().unwrap();
            // Fall back to the state recorded by the last poll.
            let state = match self.hdl.kr_state_get(port) {
                Ok(state) => state,
                Err(e) => {
                    warn!(self.log, "failed to read kr state";
                        "port" => port,
                        "error" => %e);
                    writeln!(out, "Port:{port} Could not read kr state")?;
                    session.training.state.clone()
                }
            };
            let view = PortStatus {
                port,
                conf,
                status: &status,
                state: &state,
                training_time: session.training.time_last_distance_complete,
            };
            out.push_str(&view.render()?);
        }
        Ok(out)
    }

    /// Change the debug controls.  The interrupt dump level and the halt
    /// are board-wide; the rest apply to each selected port.
    pub fn kr_debug(
        &self,
        ports: &[PortNo],
        opts: &DebugOptions,
    ) -> KrResult<String> {
        let mut out = String::new();
        let sessions = self.kr_sessions(ports)?;

        let level = opts.irq.then(|| {
            if opts.all {
                IrqDump::All
            } else if opts.disable {
                IrqDump::Off
            } else {
                IrqDump::Aneg
            }
        });
        {
            let mut debug = self.debug.lock().unwrap();
            if let Some(level) = level {
                debug.irq_dump = level;
            }
            if opts.halt {
                debug.halted = true;
            }
        }
        if opts.halt {
            info!(self.log, "kr supervisor halted");
            writeln!(out, "KR supervisor halted")?;
        }

        for (port, session) in sessions {
            let mut session = session.lock().unwrap();
            match level {
                Some(IrqDump::Off) => {
                    writeln!(out, "Port {port}: IRQ debug disabled")?
                }
                Some(level) => {
                    writeln!(out, "Port {port}: IRQ {level} debug enabled")?
                }
                None => {}
            }
            if opts.state_machine {
                session.aneg_sm_debug = !session.aneg_sm_debug;
                writeln!(
                    out,
                    "Port {port}: Aneg State machine debug {}",
                    enabled(session.aneg_sm_debug)
                )?;
            }
            if opts.stop {
                session.stop_training = !session.stop_training;
                writeln!(
                    out,
                    "Port {port}: Stop aneg {}",
                    enabled(session.stop_training)
                )?;
            }
        }
        Ok(out)
    }

    /// Select the FEC used by each port.  Nothing is changed if RS-FEC is
    /// requested and any of the ports is not 25G capable.
    pub fn kr_fec(
        &self,
        ports: &[PortNo],
        r_fec: bool,
        rs_fec: bool,
    ) -> KrResult<String> {
        let fec = KrFec::new(r_fec, rs_fec)
            .map_err(|e| KrError::Invalid(e.to_string()))?;
        let sessions = self.kr_sessions(ports)?;
        if fec.rs_fec()
            && sessions
                .iter()
                .any(|(_, s)| !s.lock().unwrap().capability_25g())
        {
            return Err(KrError::Invalid(
                "RS-FEC only supported on 25G ports".to_string(),
            ));
        }

        let mut out = String::new();
        for (port, _) in sessions {
            if let Err(e) = self.hdl.kr_fec_set(port, &fec) {
                error!(self.log, "failed to set kr fec";
                    "port" => port,
                    "error" => %e);
                writeln!(out, "Port {port}: Failure during kr fec set")?;
                continue;
            }
            if fec.r_fec() {
                writeln!(out, "Port {port}: Enabled R-FEC")?;
            } else if fec.rs_fec() {
                writeln!(out, "Port {port}: Enabled RS-FEC")?;
            } else {
                writeln!(out, "Port {port}: Disabled FEC")?;
            }
        }
        Ok(out)
    }
}
