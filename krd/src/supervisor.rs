// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The fast-poll supervisor.  Each tick walks every port with KR aneg
//! enabled, classifies its pending interrupts, and reacts by reconfiguring
//! the port's speed, interface and FEC before acknowledging them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use slog::debug;
use slog::error;
use slog::info;
use slog::o;
use slog::warn;
use slog::Logger;

use aal::AnegSmState;
use aal::KrConf;
use aal::KrFec;
use aal::KrIrq;
use aal::KrOps;
use aal::KrStatus;
use aal::PortCap;
use aal::PortConf;
use aal::TrainState;
use common::ports::PortNo;
use common::ports::PortSpeed;

use crate::history::GlobalIrqEntry;
use crate::history::History;
use crate::history::IrqEntry;
use crate::history::LdEntry;
use crate::history::LpEntry;
use crate::irq::IrqDump;
use crate::irq::KrEvents;
use crate::irq::RateChange;
use crate::session::KrSession;
use crate::session::KrTimer;
use crate::types::KrError;
use crate::types::KrResult;

/// The set of KR sessions on the board.  Each session has its own Mutex, so
/// the poll tick and operator commands contend on one port at a time.
pub struct SessionMap(BTreeMap<PortNo, Arc<Mutex<KrSession>>>);

impl SessionMap {
    pub fn new() -> Self {
        SessionMap(BTreeMap::new())
    }

    pub fn insert(&mut self, session: KrSession) {
        self.0
            .insert(session.port(), Arc::new(Mutex::new(session)));
    }

    pub fn get(&self, port: PortNo) -> KrResult<Arc<Mutex<KrSession>>> {
        self.0.get(&port).cloned().ok_or(KrError::NoSuchPort(port))
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&PortNo, &Arc<Mutex<KrSession>>)> {
        self.0.iter()
    }

    /// The sessions for those of `ports` that exist on the board, in port
    /// order
    pub fn select(
        &self,
        ports: &[PortNo],
    ) -> Vec<(PortNo, Arc<Mutex<KrSession>>)> {
        self.0
            .iter()
            .filter(|(port, _)| ports.contains(port))
            .map(|(port, session)| (*port, session.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl Default for SessionMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Board-wide debug controls set by the operator.
#[derive(Clone, Copy, Debug, Default)]
pub struct DebugControls {
    pub irq_dump: IrqDump,
    /// While set, the poll tick does nothing
    pub halted: bool,
}

/// The interrupt log shared by all ports.  Its timer follows port 0's aneg
/// timer.
#[derive(Debug)]
pub struct GlobalIrqHistory {
    pub timer: KrTimer,
    pub entries: History<GlobalIrqEntry>,
}

impl GlobalIrqHistory {
    pub fn new(history_depth: usize) -> Self {
        GlobalIrqHistory {
            timer: KrTimer::start(),
            entries: History::with_capacity(history_depth),
        }
    }

    pub fn reset(&mut self) {
        self.timer.restart();
        self.entries.clear();
    }
}

pub struct KrSupervisor<H: KrOps> {
    pub log: Logger,
    pub(crate) hdl: H,
    pub(crate) sessions: SessionMap,
    pub(crate) debug: Mutex<DebugControls>,
    pub(crate) global: Mutex<GlobalIrqHistory>,
}

impl<H: KrOps> KrSupervisor<H> {
    /// Build a session for every board port, recording its capabilities.
    pub fn new(log: &Logger, hdl: H, history_depth: usize) -> Self {
        let log = log.new(o!("unit" => "kr-supervisor"));
        let mut sessions = SessionMap::new();
        for port in 0..hdl.port_count() {
            let cap = hdl.port_cap_get(port).unwrap_or_else(|e| {
                error!(log, "failed to read port capabilities";
                    "port" => port,
                    "error" => %e);
                PortCap::default()
            });
            sessions.insert(KrSession::new(port, cap, history_depth));
        }
        info!(log, "supervising {} ports", sessions.len());

        KrSupervisor {
            log,
            hdl,
            sessions,
            debug: Mutex::new(DebugControls::default()),
            global: Mutex::new(GlobalIrqHistory::new(history_depth)),
        }
    }

    /// The chip driver being supervised
    pub fn hdl(&self) -> &H {
        &self.hdl
    }

    pub fn session(&self, port: PortNo) -> KrResult<Arc<Mutex<KrSession>>> {
        self.sessions.get(port)
    }

    /// One fast-poll tick.  Failures are logged and never stop the tick; a
    /// failure on one port has no effect on the others.
    pub fn poll(&self) {
        if self.debug.lock().unwrap().halted {
            return;
        }

        for (port, session) in self.sessions.iter() {
            let conf = match self.hdl.kr_conf_get(*port) {
                Ok(conf) if conf.aneg.enable => conf,
                Ok(_) => continue,
                Err(e) => {
                    debug!(self.log, "failed to read kr conf";
                        "port" => port,
                        "error" => %e);
                    continue;
                }
            };
            let mut session = session.lock().unwrap();
            self.poll_port(&conf, &mut session);
        }
    }

    fn poll_port(&self, conf: &KrConf, session: &mut KrSession) {
        let log = &self.log;
        let port = session.port();

        match self.hdl.kr_status_get(port) {
            Ok(status) => self.trace_aneg_sm(session, &status),
            Err(e) => error!(log, "failed to read kr status";
                "port" => port,
                "error" => %e),
        }

        let irq = match self.hdl.kr_irq_get(port) {
            Ok(irq) if !irq.is_empty() => irq,
            Ok(_) => return,
            Err(e) => {
                error!(log, "failed to read kr irq";
                    "port" => port,
                    "error" => %e);
                return;
            }
        };
        let events = KrEvents::from(irq);

        if events.an_good {
            session.gen1_wait = true;
        }
        if events.gen1_done {
            session.gen1_wait = false;
        }

        if events.xmit_disable {
            session.training.aneg_timer.restart();
            if port == 0 {
                self.global.lock().unwrap().timer.restart();
            }
        }
        if events.train_start {
            session.training.train_timer.restart();
        }

        let irq_dump = self.debug.lock().unwrap().irq_dump;
        if let Some(line) = irq_dump.dump(irq) {
            info!(log, "Port {port} (IRQ): {line} ({} ms)",
                session.training.aneg_timer.elapsed_ms());
        }

        if session.stop_training {
            self.record_irq(session, irq);
            return;
        }

        let mut pconf = match self.hdl.port_conf_get(port) {
            Ok(pconf) => Some(pconf),
            Err(e) => {
                error!(log, "failed to read port conf";
                    "port" => port,
                    "error" => %e);
                None
            }
        };

        if irq.has_rate() && !session.gen1_wait {
            session.check_block_lock = false;
            match self.hdl.kr_status_get(port) {
                Ok(status) if status.aneg.request_fec_change => {
                    self.apply_requested_fec(port, &status)
                }
                Ok(_) => {}
                Err(e) => error!(log, "failed to read kr status";
                    "port" => port,
                    "error" => %e),
            }

            match events.rate {
                RateChange::Rate(rate) => {
                    if let Some(pconf) = pconf.as_mut() {
                        self.set_speed(session, pconf, rate.speed(), "Aneg");
                        info!(log, "Port:{port} - Aneg speed is {} ({} ms) - Done",
                            pconf.speed,
                            session.training.aneg_timer.elapsed_ms());
                    }
                }
                RateChange::Invalid(code) => {
                    error!(log, "KR speed not supported";
                        "port" => port,
                        "rate" => code);
                }
                RateChange::None => {}
            }
        }

        if events.rate_detect {
            info!(log, "Port:{port} - Rate detect ({} ms)",
                session.training.aneg_timer.elapsed_ms());
            let speed = session.advance_parallel_speed(&conf.aneg);
            if let Some(pconf) = pconf.as_mut() {
                self.set_speed(session, pconf, speed, "Rate detect");
            }
        }

        if events.max_wait_done {
            warn!(log, "max wait timer expired"; "port" => port);
        }

        if let Err(e) = self.hdl.kr_irq_apply(port, irq) {
            error!(log, "failed to apply kr irq";
                "port" => port,
                "error" => %e);
        }

        match self.hdl.kr_state_get(port) {
            Ok(state) => session.training.state = state,
            Err(e) => error!(log, "failed to read kr state";
                "port" => port,
                "error" => %e),
        }

        self.record_training(session, &events, irq);

        let training = &mut session.training;
        if events.training_done
            && training.state.current_state == TrainState::SendData
        {
            let elapsed = training.train_timer.elapsed_ms();
            training.time_last_distance_complete = Some(elapsed);
            info!(log, "Port:{port} - Training completed ({elapsed} ms)");
        }

        if events.an_good {
            let speed = pconf
                .map(|p| p.speed.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            info!(log, "Port:{port} - AN_GOOD ({speed}) ({} ms)",
                training.aneg_timer.elapsed_ms());
        }
    }

    // Log aneg state machine transitions for ports being debugged.
    fn trace_aneg_sm(&self, session: &mut KrSession, status: &KrStatus) {
        if !session.aneg_sm_debug || status.aneg.sm == session.aneg_sm_last_state
        {
            return;
        }
        let port = session.port();
        let name = match AnegSmState::try_from(status.aneg.sm) {
            Ok(state) => state.to_string(),
            Err(e) => {
                error!(self.log, "unknown aneg state";
                    "port" => port,
                    "error" => %e);
                "?".to_string()
            }
        };
        info!(self.log, "Port:{port} - Aneg SM: {name} Hist:{:x} ({} ms)",
            status.aneg.hist,
            session.training.aneg_timer.elapsed_ms());
        session.aneg_sm_last_state = status.aneg.sm;
    }

    fn apply_requested_fec(&self, port: PortNo, status: &KrStatus) {
        let (r_fec, rs_fec) =
            (status.aneg.r_fec_enable, status.aneg.rs_fec_enable);
        let fec = match KrFec::new(r_fec, rs_fec) {
            Ok(fec) => fec,
            Err(e) => {
                error!(self.log, "rejecting partner FEC request";
                    "port" => port,
                    "error" => %e);
                return;
            }
        };
        info!(self.log, "Port:{port} - R-FEC {} RS-FEC:{}", r_fec, rs_fec);
        if let Err(e) = self.hdl.kr_fec_set(port, &fec) {
            error!(self.log, "failed to set kr fec";
                "port" => port,
                "error" => %e);
        }
    }

    // Move the port to `speed` unless it is already there.  `pconf` tracks
    // what the port is configured for.
    fn set_speed(
        &self,
        session: &KrSession,
        pconf: &mut PortConf,
        speed: PortSpeed,
        reason: &str,
    ) {
        if pconf.speed == speed {
            return;
        }
        let port = session.port();
        let new = PortConf::for_speed(speed);
        info!(self.log, "Port:{port} - {reason} speed is {speed} ({} ms) - Set",
            session.training.aneg_timer.elapsed_ms();
            "if_type" => %new.if_type);
        match self.hdl.port_conf_set(port, &new) {
            Ok(()) => *pconf = new,
            Err(e) => error!(self.log, "failed to set port conf";
                "port" => port,
                "error" => %e),
        }
    }

    fn record_irq(&self, session: &mut KrSession, irq: KrIrq) {
        let time = session.training.aneg_timer.elapsed_ms();
        session.training.irq_history.record(IrqEntry { time, irq });

        let mut global = self.global.lock().unwrap();
        let time = global.timer.elapsed_ms();
        global.entries.record(GlobalIrqEntry {
            time,
            irq,
            port: session.port(),
        });
    }

    fn record_training(
        &self,
        session: &mut KrSession,
        events: &KrEvents,
        irq: KrIrq,
    ) {
        self.record_irq(session, irq);

        let training = &mut session.training;
        if !training.state.training_started {
            return;
        }
        let time = training.train_timer.elapsed_ms();
        if events.coef_update {
            training.ld_history.record(LdEntry {
                time,
                res: training.state.tr_res,
            });
        }
        training.lp_history.record(LpEntry {
            time,
            ber_coef_frm: training.state.ber_coef_frm,
            ber_stage: training.state.ber_training_stage,
            irq,
        });
    }
}
