// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! An emulated KR chip driver, used when running without hardware and as the
//! backbone of the supervisor's scenario tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;
use slog::debug;
use slog::o;
use slog::Logger;

use aal::AsicError;
use aal::AsicResult;
use aal::KrConf;
use aal::KrFec;
use aal::KrIrq;
use aal::KrOps;
use aal::KrState;
use aal::KrStatus;
use aal::PortCap;
use aal::PortConf;
use common::ports::PortNo;

mod ports;
pub use ports::*;

const DEFAULT_PORT_COUNT: usize = 8;

/// Board description for the emulated chip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AsicConfig {
    /// Capabilities of each board port, indexed by port number
    pub ports: Vec<PortCap>,
    /// Emulate a link partner answering every negotiation
    pub partner: bool,
}

impl Default for AsicConfig {
    // Half of the board is 25G capable, the rest tops out at 10G.  The last
    // port has no KR support at all.
    fn default() -> Self {
        let ports = (0..DEFAULT_PORT_COUNT)
            .map(|idx| PortCap {
                fdx_10g: idx + 1 < DEFAULT_PORT_COUNT,
                fdx_25g: idx < DEFAULT_PORT_COUNT / 2,
            })
            .collect();
        AsicConfig {
            ports,
            partner: true,
        }
    }
}

impl AsicConfig {
    /// A board of `count` ports sharing the same capabilities
    pub fn uniform(count: usize, cap: PortCap) -> Self {
        AsicConfig {
            ports: vec![cap; count],
            partner: true,
        }
    }
}

pub struct StubHandle {
    log: Logger,
    partner: bool,
    ports: Mutex<BTreeMap<PortNo, StubPort>>,
}

impl StubHandle {
    pub fn new(log: &Logger, config: &AsicConfig) -> AsicResult<Self> {
        let mut ports = BTreeMap::new();
        for (idx, cap) in config.ports.iter().enumerate() {
            let port = PortNo::try_from(idx).map_err(|_| {
                AsicError::InvalidArg(format!(
                    "board has too many ports: {}",
                    config.ports.len()
                ))
            })?;
            ports.insert(port, StubPort::new(*cap));
        }

        Ok(StubHandle {
            log: log.new(o!("unit" => "kr-stub")),
            partner: config.partner,
            ports: Mutex::new(ports),
        })
    }

    /// Run `f` against the emulated state of `port`
    pub fn with_port<T>(
        &self,
        port: PortNo,
        f: impl FnOnce(&mut StubPort) -> T,
    ) -> AsicResult<T> {
        let mut ports = self.ports.lock().unwrap();
        Ok(f(get_port_mut(&mut ports, port)?))
    }

    /// Queue an interrupt to be returned by a later `kr_irq_get`
    pub fn inject_irq(&self, port: PortNo, irq: KrIrq) -> AsicResult<()> {
        debug!(self.log, "inject irq"; "port" => port, "irq" => ?irq);
        self.with_port(port, |p| p.pending_irqs.push_back(irq))
    }

    /// The most recent interrupts acknowledged on `port`, oldest first
    pub fn acked_irqs(&self, port: PortNo) -> AsicResult<Vec<KrIrq>> {
        self.with_port(port, |p| p.acked_irqs.iter().copied().collect())
    }

    /// Number of speed/interface reconfigurations applied to `port`
    pub fn port_conf_set_count(&self, port: PortNo) -> AsicResult<usize> {
        self.with_port(port, |p| p.port_conf_set_cnt)
    }
}

impl KrOps for StubHandle {
    fn port_count(&self) -> PortNo {
        let ports = self.ports.lock().unwrap();
        // The count was validated to fit when the board was built.
        ports.len() as PortNo
    }

    fn port_cap_get(&self, port: PortNo) -> AsicResult<PortCap> {
        let ports = self.ports.lock().unwrap();
        Ok(get_port(&ports, port)?.cap)
    }

    fn kr_conf_get(&self, port: PortNo) -> AsicResult<KrConf> {
        let ports = self.ports.lock().unwrap();
        Ok(get_port(&ports, port)?.kr_conf)
    }

    fn kr_conf_set(&self, port: PortNo, conf: &KrConf) -> AsicResult<()> {
        debug!(self.log, "kr conf set"; "port" => port, "conf" => ?conf);
        let partner = self.partner;
        self.with_port(port, |p| p.set_kr_conf(conf, partner))
    }

    fn kr_status_get(&self, port: PortNo) -> AsicResult<KrStatus> {
        let ports = self.ports.lock().unwrap();
        Ok(get_port(&ports, port)?.status)
    }

    fn kr_state_get(&self, port: PortNo) -> AsicResult<KrState> {
        let ports = self.ports.lock().unwrap();
        Ok(get_port(&ports, port)?.state.clone())
    }

    fn kr_fec_set(&self, port: PortNo, fec: &KrFec) -> AsicResult<()> {
        self.with_port(port, |p| p.set_fec(fec))?
    }

    fn kr_irq_get(&self, port: PortNo) -> AsicResult<KrIrq> {
        self.with_port(port, |p| p.next_irq())
    }

    fn kr_irq_apply(&self, port: PortNo, irq: KrIrq) -> AsicResult<()> {
        self.with_port(port, |p| p.ack_irq(irq))
    }

    fn port_conf_get(&self, port: PortNo) -> AsicResult<PortConf> {
        let ports = self.ports.lock().unwrap();
        Ok(get_port(&ports, port)?.port_conf)
    }

    fn port_conf_set(&self, port: PortNo, conf: &PortConf) -> AsicResult<()> {
        debug!(self.log, "port conf set";
            "port" => port,
            "speed" => %conf.speed,
            "if_type" => %conf.if_type);
        self.with_port(port, |p| {
            p.port_conf = *conf;
            p.port_conf_set_cnt += 1;
        })
    }
}
