// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use aal::AnegSmState;
use aal::BerStage;
use aal::KrConf;
use aal::KrIrq;
use aal::KrRate;
use aal::KrState;
use aal::KrStatus;
use aal::KrTap;
use aal::PortCap;
use aal::TrainState;

/// Coefficient-update steps sent while training each tap: one increment and
/// one hold.
const STEPS_PER_TAP: usize = 2;

// Coefficient update actions, as carried in the per-tap fields of a
// coefficient update frame.
const COEF_INCR: u32 = 1;
const COEF_HOLD: u32 = 0;

// Status report value acknowledging an update.
const STS_UPDATED: u32 = 1;
const STS_RX_READY: u32 = 1 << 15;

/// Emulated ports have no real link partner underneath them.  We emulate a
/// partner that always agrees: once aneg is enabled it produces the interrupt
/// sequence of a clean negotiation, resolving to the highest advertised rate
/// the port supports, or to parallel detection if nothing is advertised.
pub(crate) fn negotiation(conf: &KrConf, cap: &PortCap) -> Vec<KrIrq> {
    let mut irqs = vec![KrIrq::AN_XMIT_DISABLE];
    if conf.train.enable {
        irqs.push(KrIrq::TRAIN);
        for _ in 0..STEPS_PER_TAP * 3 {
            irqs.push(KrIrq::LPCVALID);
        }
        irqs.push(KrIrq::WT_DONE);
    }
    irqs.push(KrIrq::AN_GOOD | KrIrq::CMPL_ACK);
    irqs.push(KrIrq::GEN1_DONE);
    match resolved_rate(conf, cap) {
        Some(rate) => irqs.push(KrIrq::from_bits_retain(rate.code())),
        None => irqs.push(KrIrq::RATE_DET),
    }
    irqs
}

fn resolved_rate(conf: &KrConf, cap: &PortCap) -> Option<KrRate> {
    let aneg = &conf.aneg;
    if aneg.adv_25g && cap.fdx_25g {
        Some(KrRate::Kr25G)
    } else if aneg.adv_10g {
        Some(KrRate::Kr10G)
    } else if aneg.adv_5g {
        Some(KrRate::Kr5G)
    } else if aneg.adv_2g5 {
        Some(KrRate::Kx2G5)
    } else if aneg.adv_1g {
        Some(KrRate::Kx1G)
    } else {
        None
    }
}

fn tap_shift(tap: KrTap) -> u32 {
    match tap {
        KrTap::Cm1 => 0,
        KrTap::C0 => 2,
        KrTap::Cp1 => 4,
    }
}

fn next_tap(tap: KrTap) -> KrTap {
    match tap {
        KrTap::Cm1 => KrTap::Cp1,
        KrTap::Cp1 | KrTap::C0 => KrTap::C0,
    }
}

// One coefficient update from the partner: increment the current tap, then
// hold it and move on to the next one.
fn training_step(state: &mut KrState) {
    let tap = state.current_tap;
    let shift = tap_shift(tap);
    let last_action = (state.tr_res.coef >> shift) & 0x3;
    let action = if last_action == COEF_INCR {
        COEF_HOLD
    } else {
        COEF_INCR
    };

    state.current_state = TrainState::TrainLocal;
    state.tr_res.coef = action << shift;
    state.tr_res.status = STS_UPDATED << shift;
    state.ber_coef_frm = state.tr_res.coef;
    if action == COEF_INCR {
        state.ber_training_stage = BerStage::CalculateBer;
        match tap {
            KrTap::Cm1 => state.tr_res.cm1 += 1,
            KrTap::C0 => state.tr_res.c0 += 1,
            KrTap::Cp1 => state.tr_res.cp1 += 1,
        }
        let slot = tap.index();
        state.lp_tap_max_cnt[slot] += 1;
        state.ber_cnt[slot].push(0);
        state.eye_height[slot].push(12 + state.lp_tap_max_cnt[slot]);
    } else {
        state.ber_training_stage = BerStage::MoveToMidMark;
        state.lp_tap_end_cnt[tap.index()] += 1;
        state.current_tap = next_tap(tap);
    }
}

/// Advance the emulated status and training state as the hardware would
/// when raising `irq`.
pub(crate) fn observe(irq: KrIrq, status: &mut KrStatus, state: &mut KrState) {
    if irq.contains(KrIrq::AN_XMIT_DISABLE) {
        *status = KrStatus::default();
        *state = KrState::default();
        status.aneg.sm = u32::from(AnegSmState::XmitDisable);
    }
    if irq.contains(KrIrq::TRAIN) {
        state.training_started = true;
        state.signal_detect = true;
        state.current_state = TrainState::SendTraining;
        status.aneg.sm = u32::from(AnegSmState::Train);
    }
    if irq.contains(KrIrq::LPCVALID) && state.training_started {
        training_step(state);
    }
    if irq.contains(KrIrq::WT_DONE) {
        state.current_state = TrainState::SendData;
        state.ber_training_stage = BerStage::LocalRxTrained;
        state.local_rx_ready = true;
        state.remote_rx_ready = true;
        state.tr_res.status |= STS_RX_READY;
        status.train.complete = true;
        status.train.cm_ob_tap_result = state.tr_res.cm1;
        status.train.c0_ob_tap_result = state.tr_res.c0;
        status.train.cp_ob_tap_result = state.tr_res.cp1;
    }
    if irq.contains(KrIrq::AN_GOOD) {
        status.aneg.complete = true;
        status.aneg.sm = u32::from(AnegSmState::AnGood);
    }
    if let Ok(Some(rate)) = KrRate::from_irq(irq) {
        status.aneg.speed_req = rate.speed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ports::PortSpeed;

    fn all_conf() -> KrConf {
        let mut conf = KrConf::default();
        conf.aneg.enable = true;
        conf.aneg.adv_10g = true;
        conf.aneg.adv_25g = true;
        conf.train.enable = true;
        conf
    }

    #[test]
    fn test_rate_limited_by_capability() {
        let conf = all_conf();
        let only_10g = PortCap {
            fdx_10g: true,
            fdx_25g: false,
        };
        let irqs = negotiation(&conf, &only_10g);
        let last = irqs.last().copied().unwrap();
        assert_eq!(KrRate::from_irq(last).unwrap(), Some(KrRate::Kr10G));
    }

    #[test]
    fn test_parallel_detect_without_adverts() {
        let mut conf = KrConf::default();
        conf.aneg.enable = true;
        let irqs = negotiation(&conf, &PortCap::default());
        assert!(!irqs.contains(&KrIrq::TRAIN));
        assert_eq!(irqs.last().copied(), Some(KrIrq::RATE_DET));
    }

    #[test]
    fn test_training_reaches_send_data() {
        let cap = PortCap {
            fdx_10g: true,
            fdx_25g: true,
        };
        let mut status = KrStatus::default();
        let mut state = KrState::default();
        for irq in negotiation(&all_conf(), &cap) {
            observe(irq, &mut status, &mut state);
        }
        assert_eq!(state.current_state, TrainState::SendData);
        assert_eq!(state.current_tap, KrTap::C0);
        assert_eq!(state.lp_tap_max_cnt, [1, 1, 1]);
        assert!(status.aneg.complete);
        assert!(status.train.complete);
        assert_eq!(status.aneg.speed_req, PortSpeed::Speed25G);
    }
}
