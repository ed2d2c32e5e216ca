// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::collections::BTreeMap;
use std::collections::VecDeque;

use aal::AsicError;
use aal::AsicResult;
use aal::KrConf;
use aal::KrFec;
use aal::KrIrq;
use aal::KrState;
use aal::KrStatus;
use aal::PortCap;
use aal::PortConf;
use common::ports::PortNo;
use common::ports::PortSpeed;

use crate::faux_fsm;

/// Acknowledged interrupts kept per port.  Older ones are only counted.
pub const ACKED_IRQ_LIMIT: usize = 256;

/// Emulated chip state of a single board port.
#[derive(Debug)]
pub struct StubPort {
    pub cap: PortCap,
    pub kr_conf: KrConf,
    pub status: KrStatus,
    pub state: KrState,
    pub fec: KrFec,
    pub port_conf: PortConf,
    /// Interrupts waiting to be returned by `kr_irq_get`
    pub pending_irqs: VecDeque<KrIrq>,
    /// The most recent interrupts acknowledged through `kr_irq_apply`,
    /// oldest first
    pub acked_irqs: VecDeque<KrIrq>,
    /// Number of interrupts ever acknowledged
    pub acked_irq_cnt: usize,
    /// Number of times the port's speed/interface was reconfigured
    pub port_conf_set_cnt: usize,
}

impl StubPort {
    pub fn new(cap: PortCap) -> Self {
        StubPort {
            cap,
            kr_conf: KrConf::default(),
            status: KrStatus::default(),
            state: KrState::default(),
            fec: KrFec::none(),
            port_conf: PortConf::for_speed(PortSpeed::Speed10G),
            pending_irqs: VecDeque::new(),
            acked_irqs: VecDeque::new(),
            acked_irq_cnt: 0,
            port_conf_set_cnt: 0,
        }
    }

    /// Apply a new KR configuration.  Disabling aneg drops whatever
    /// negotiation was in flight.  If `partner` is set, enabling aneg queues
    /// the emulated partner's interrupt sequence.
    pub fn set_kr_conf(&mut self, conf: &KrConf, partner: bool) {
        self.kr_conf = *conf;
        self.pending_irqs.clear();
        self.status = KrStatus::default();
        self.state = KrState::default();
        if conf.aneg.enable && partner {
            self.pending_irqs
                .extend(faux_fsm::negotiation(conf, &self.cap));
        }
    }

    /// Pop the next pending interrupt, advancing the emulated hardware state
    /// as it fires.
    pub fn next_irq(&mut self) -> KrIrq {
        if !self.kr_conf.aneg.enable {
            return KrIrq::empty();
        }
        match self.pending_irqs.pop_front() {
            Some(irq) => {
                faux_fsm::observe(irq, &mut self.status, &mut self.state);
                irq
            }
            None => KrIrq::empty(),
        }
    }

    pub fn ack_irq(&mut self, irq: KrIrq) {
        if self.acked_irqs.len() >= ACKED_IRQ_LIMIT {
            self.acked_irqs.pop_front();
        }
        self.acked_irqs.push_back(irq);
        self.acked_irq_cnt += 1;
    }

    pub fn set_fec(&mut self, fec: &KrFec) -> AsicResult<()> {
        if fec.rs_fec() && !self.cap.fdx_25g {
            return Err(AsicError::InvalidArg(
                "RS-FEC requires a 25G capable port".to_string(),
            ));
        }
        self.fec = *fec;
        self.status.fec.r_fec_enable = fec.r_fec();
        self.status.fec.rs_fec_enable = fec.rs_fec();
        Ok(())
    }
}

fn no_port(port: PortNo) -> AsicError {
    AsicError::Missing(format!("no such port: {port}"))
}

pub fn get_port(
    port_state: &BTreeMap<PortNo, StubPort>,
    port: PortNo,
) -> AsicResult<&StubPort> {
    port_state.get(&port).ok_or_else(|| no_port(port))
}

pub fn get_port_mut(
    port_state: &mut BTreeMap<PortNo, StubPort>,
    port: PortNo,
) -> AsicResult<&mut StubPort> {
    port_state.get_mut(&port).ok_or_else(|| no_port(port))
}
