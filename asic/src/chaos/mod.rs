// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use rand::random;
use serde::{Deserialize, Serialize};
use slog::Logger;

use aal::{
    AsicResult, KrConf, KrFec, KrIrq, KrOps, KrState, KrStatus, PortCap,
    PortConf,
};
use common::ports::PortNo;

use crate::stub::StubHandle;

/// Chaos that happens according to a probability.
#[derive(Default, Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Chaos {
    /// A probability between 0.0 and 1.0
    pub value: f64,
}

impl Chaos {
    /// Create a new chaos value.
    pub fn new(value: f64) -> Self {
        let mut c = Self::default();
        c.set(value);
        c
    }

    /// Set the chaos value, clamped to the range [0.0, 1.0].
    pub fn set(&mut self, value: f64) {
        self.value = value.clamp(0.0, 1.0);
    }

    /// Get the underlying chaos value.
    pub fn get(&self) -> f64 {
        self.value
    }

    /// Return a chaos error according to the underlying probability value.
    pub fn unfurled(&self, log: &Logger, message: &str) -> AsicResult<()> {
        if self.value >= random() {
            slog::error!(log, "chaos error: {}", message);
            return Err(aal::AsicError::Synthetic(message.into()));
        }
        Ok(())
    }
}

/// The chaos ASIC config contains chaos values for each fallible KR chip
/// operation.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AsicConfig {
    pub port_cap_get: Chaos,
    pub kr_conf_get: Chaos,
    pub kr_conf_set: Chaos,
    pub kr_status_get: Chaos,
    pub kr_state_get: Chaos,
    pub kr_fec_set: Chaos,
    pub kr_irq_get: Chaos,
    pub kr_irq_apply: Chaos,
    pub port_conf_get: Chaos,
    pub port_conf_set: Chaos,
}

impl AsicConfig {
    /// The uniform chaos config applies a uniform underlying probability to each
    /// chaos value.
    pub fn uniform(v: f64) -> Self {
        Self {
            port_cap_get: Chaos::new(v),
            kr_conf_get: Chaos::new(v),
            kr_conf_set: Chaos::new(v),
            kr_status_get: Chaos::new(v),
            kr_state_get: Chaos::new(v),
            kr_fec_set: Chaos::new(v),
            kr_irq_get: Chaos::new(v),
            kr_irq_apply: Chaos::new(v),
            port_conf_get: Chaos::new(v),
            port_conf_set: Chaos::new(v),
        }
    }

    /// The poll chaos config applies a uniform underlying probability to the
    /// interrupt and status operations used on every tick.  All other
    /// operations never fail.
    pub fn uniform_poll(v: f64) -> Self {
        Self {
            kr_status_get: Chaos::new(v),
            kr_state_get: Chaos::new(v),
            kr_irq_get: Chaos::new(v),
            kr_irq_apply: Chaos::new(v),
            ..Default::default()
        }
    }
}

/// A handle for a chaos asic: the emulated chip with faults injected ahead
/// of each operation.
pub struct Handle {
    inner: StubHandle,
    config: AsicConfig,
    log: Logger,
}

impl Handle {
    /// Wrap an emulated chip with the provided logger and config.
    pub fn new(log: &Logger, config: &AsicConfig, inner: StubHandle) -> Self {
        Handle {
            inner,
            config: config.clone(),
            log: log.new(slog::o!("unit" => "kr-chaos")),
        }
    }

    /// The emulated chip underneath, which never fails spuriously
    pub fn stub(&self) -> &StubHandle {
        &self.inner
    }
}

/// A convenience macro for unfurling chaos. The $name should be a regular
/// `Chaos` member of [`AsicConfig`]. The `handle` is a [`Handle`] object.
macro_rules! unfurl {
    ($handle:ident, $name:ident) => {
        $handle
            .config
            .$name
            .unfurled(&$handle.log, stringify!($name))?
    };
}

impl KrOps for Handle {
    fn port_count(&self) -> PortNo {
        self.inner.port_count()
    }

    fn port_cap_get(&self, port: PortNo) -> AsicResult<PortCap> {
        unfurl!(self, port_cap_get);
        self.inner.port_cap_get(port)
    }

    fn kr_conf_get(&self, port: PortNo) -> AsicResult<KrConf> {
        unfurl!(self, kr_conf_get);
        self.inner.kr_conf_get(port)
    }

    fn kr_conf_set(&self, port: PortNo, conf: &KrConf) -> AsicResult<()> {
        unfurl!(self, kr_conf_set);
        self.inner.kr_conf_set(port, conf)
    }

    fn kr_status_get(&self, port: PortNo) -> AsicResult<KrStatus> {
        unfurl!(self, kr_status_get);
        self.inner.kr_status_get(port)
    }

    fn kr_state_get(&self, port: PortNo) -> AsicResult<KrState> {
        unfurl!(self, kr_state_get);
        self.inner.kr_state_get(port)
    }

    fn kr_fec_set(&self, port: PortNo, fec: &KrFec) -> AsicResult<()> {
        unfurl!(self, kr_fec_set);
        self.inner.kr_fec_set(port, fec)
    }

    fn kr_irq_get(&self, port: PortNo) -> AsicResult<KrIrq> {
        unfurl!(self, kr_irq_get);
        self.inner.kr_irq_get(port)
    }

    fn kr_irq_apply(&self, port: PortNo, irq: KrIrq) -> AsicResult<()> {
        unfurl!(self, kr_irq_apply);
        self.inner.kr_irq_apply(port, irq)
    }

    fn port_conf_get(&self, port: PortNo) -> AsicResult<PortConf> {
        unfurl!(self, port_conf_get);
        self.inner.port_conf_get(port)
    }

    fn port_conf_set(&self, port: PortNo, conf: &PortConf) -> AsicResult<()> {
        unfurl!(self, port_conf_set);
        self.inner.port_conf_set(port, conf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slog::Drain;

    fn test_log() -> Logger {
        let dec =
            slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
        let drain = slog_term::FullFormat::new(dec).build().fuse();
        Logger::root(drain, slog::o!())
    }

    fn handle(config: &AsicConfig) -> Handle {
        let log = test_log();
        let stub = StubHandle::new(&log, &crate::stub::AsicConfig::default())
            .unwrap();
        Handle::new(&log, config, stub)
    }

    #[test]
    fn test_chaos_clamped() {
        assert_eq!(Chaos::new(1.5).get(), 1.0);
        assert_eq!(Chaos::new(-0.5).get(), 0.0);
    }

    #[test]
    fn test_certain_chaos_fails() {
        let hdl = handle(&AsicConfig::uniform(1.0));
        assert!(matches!(
            hdl.kr_irq_get(0),
            Err(aal::AsicError::Synthetic(msg)) if msg == "kr_irq_get"
        ));
        assert!(hdl.port_conf_set(0, &PortConf::default()).is_err());
        // The board itself is still reachable.
        assert_eq!(hdl.port_count(), 8);
        assert_eq!(hdl.stub().port_conf_set_count(0).unwrap(), 0);
    }

    #[test]
    fn test_poll_chaos_spares_config() {
        let hdl = handle(&AsicConfig::uniform_poll(1.0));
        assert!(hdl.kr_status_get(1).is_err());
        assert!(hdl.kr_conf_set(1, &KrConf::default()).is_ok());
        assert!(hdl.kr_conf_get(1).is_ok());
    }
}
