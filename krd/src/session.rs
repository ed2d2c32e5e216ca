// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Per-port KR supervision state.

use std::time::Instant;

use aal::KrAnegConf;
use aal::KrState;
use aal::PortCap;
use common::ports::PortNo;
use common::ports::PortSpeed;

use crate::history::History;
use crate::history::IrqEntry;
use crate::history::LdEntry;
use crate::history::LpEntry;

/// Elapsed-time baseline for history entries.
#[derive(Clone, Copy, Debug)]
pub struct KrTimer(Instant);

impl KrTimer {
    pub fn start() -> Self {
        KrTimer(Instant::now())
    }

    pub fn restart(&mut self) {
        self.0 = Instant::now();
    }

    /// Milliseconds since the timer was last (re)started
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.0.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for KrTimer {
    fn default() -> Self {
        Self::start()
    }
}

/// Parallel detection tries these speeds in turn.
const PARALLEL_ORDER: [PortSpeed; 4] = [
    PortSpeed::Speed10G,
    PortSpeed::Speed5G,
    PortSpeed::Speed2G5,
    PortSpeed::Speed1G,
];

/// State that is thrown away whenever the port is re-enabled.
#[derive(Debug)]
pub struct KrTraining {
    pub aneg_timer: KrTimer,
    pub train_timer: KrTimer,
    /// Training time of the last completed training, in ms
    pub time_last_distance_complete: Option<u64>,
    /// Most recent internal training state read from the chip
    pub state: KrState,
    pub irq_history: History<IrqEntry>,
    pub ld_history: History<LdEntry>,
    pub lp_history: History<LpEntry>,
}

impl KrTraining {
    pub fn new(history_depth: usize) -> Self {
        KrTraining {
            aneg_timer: KrTimer::start(),
            train_timer: KrTimer::start(),
            time_last_distance_complete: None,
            state: KrState::default(),
            irq_history: History::with_capacity(history_depth),
            ld_history: History::with_capacity(history_depth),
            lp_history: History::with_capacity(history_depth),
        }
    }
}

/// Supervision state of a single KR-capable port.
#[derive(Debug)]
pub struct KrSession {
    port: PortNo,
    capability_10g: bool,
    capability_25g: bool,
    history_depth: usize,

    /// Stop reacting to events; interrupts are still recorded
    pub stop_training: bool,
    /// Log each aneg state machine transition
    pub aneg_sm_debug: bool,
    pub aneg_sm_last_state: u32,
    /// Set between AN_GOOD and GEN1_DONE; rate changes are ignored meanwhile
    pub gen1_wait: bool,
    pub check_block_lock: bool,
    pub next_parallel_speed: PortSpeed,
    pub training: KrTraining,
}

impl KrSession {
    pub fn new(port: PortNo, cap: PortCap, history_depth: usize) -> Self {
        KrSession {
            port,
            capability_10g: cap.fdx_10g,
            capability_25g: cap.fdx_25g,
            history_depth,
            stop_training: false,
            aneg_sm_debug: false,
            aneg_sm_last_state: 0,
            gen1_wait: false,
            check_block_lock: false,
            next_parallel_speed: PortSpeed::Speed10G,
            training: KrTraining::new(history_depth),
        }
    }

    pub fn port(&self) -> PortNo {
        self.port
    }

    pub fn capability_10g(&self) -> bool {
        self.capability_10g
    }

    pub fn capability_25g(&self) -> bool {
        self.capability_25g
    }

    /// Drop the histories, timers and training state.
    pub fn reset_training(&mut self) {
        self.training = KrTraining::new(self.history_depth);
    }

    /// Pick the speed for the next parallel-detect attempt and advance the
    /// cursor past it.  Speeds that are not advertised are skipped.  1G is
    /// tried whether advertised or not, and always sends the cursor back to
    /// 10G.
    pub fn advance_parallel_speed(&mut self, aneg: &KrAnegConf) -> PortSpeed {
        let start = PARALLEL_ORDER
            .iter()
            .position(|s| *s == self.next_parallel_speed)
            .unwrap_or(0);
        let advertised = |speed: PortSpeed| match speed {
            PortSpeed::Speed10G => aneg.adv_10g,
            PortSpeed::Speed5G => aneg.adv_5g,
            PortSpeed::Speed2G5 => aneg.adv_2g5,
            _ => true,
        };

        let (idx, speed) = (start..PARALLEL_ORDER.len())
            .map(|idx| (idx, PARALLEL_ORDER[idx]))
            .find(|(_, speed)| advertised(*speed))
            .unwrap_or((PARALLEL_ORDER.len() - 1, PortSpeed::Speed1G));
        self.next_parallel_speed =
            PARALLEL_ORDER[(idx + 1) % PARALLEL_ORDER.len()];
        speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aal::KrIrq;

    fn session() -> KrSession {
        let cap = PortCap {
            fdx_10g: true,
            fdx_25g: false,
        };
        KrSession::new(3, cap, 16)
    }

    #[test]
    fn test_parallel_round_robin() {
        let mut s = session();
        let aneg = KrAnegConf {
            adv_10g: true,
            adv_5g: true,
            adv_1g: true,
            ..Default::default()
        };
        let seen: Vec<PortSpeed> =
            (0..7).map(|_| s.advance_parallel_speed(&aneg)).collect();
        assert_eq!(
            seen,
            vec![
                PortSpeed::Speed10G,
                PortSpeed::Speed5G,
                PortSpeed::Speed1G,
                PortSpeed::Speed10G,
                PortSpeed::Speed5G,
                PortSpeed::Speed1G,
                PortSpeed::Speed10G,
            ]
        );
    }

    #[test]
    fn test_parallel_nothing_advertised() {
        let mut s = session();
        let aneg = KrAnegConf::default();
        assert_eq!(s.advance_parallel_speed(&aneg), PortSpeed::Speed1G);
        assert_eq!(s.next_parallel_speed, PortSpeed::Speed10G);
        assert_eq!(s.advance_parallel_speed(&aneg), PortSpeed::Speed1G);
    }

    #[test]
    fn test_parallel_2g5_only() {
        let mut s = session();
        let aneg = KrAnegConf {
            adv_2g5: true,
            ..Default::default()
        };
        assert_eq!(s.advance_parallel_speed(&aneg), PortSpeed::Speed2G5);
        assert_eq!(s.advance_parallel_speed(&aneg), PortSpeed::Speed1G);
        assert_eq!(s.advance_parallel_speed(&aneg), PortSpeed::Speed2G5);
    }

    #[test]
    fn test_reset_keeps_config() {
        let mut s = session();
        s.aneg_sm_debug = true;
        s.training.time_last_distance_complete = Some(40);
        s.training.irq_history.record(IrqEntry {
            time: 1,
            irq: KrIrq::TRAIN,
        });
        s.reset_training();
        assert!(s.training.irq_history.is_empty());
        assert_eq!(s.training.irq_history.capacity(), 16);
        assert_eq!(s.training.time_last_distance_complete, None);
        assert!(s.aneg_sm_debug);
        assert!(s.capability_10g() && !s.capability_25g());
        assert_eq!(s.port(), 3);
    }

    #[test]
    fn test_timer_restart() {
        let mut timer = KrTimer::start();
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(timer.elapsed_ms() >= 20);
        timer.restart();
        assert!(timer.elapsed_ms() < 20);
    }
}
