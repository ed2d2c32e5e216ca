// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Records exchanged with the KR chip driver.

use std::convert::TryFrom;
use std::fmt;

use bitflags::bitflags;

use crate::AsicError;
use crate::AsicResult;
use common::ports::PortSpeed;

bitflags! {
    /// The per-port KR interrupt bit-vector.  The low four bits are not a
    /// flag but the aneg rate code, see [`KrRate`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct KrIrq: u32 {
        const ACTV = 1 << 31;
        const LPSVALID = 1 << 30;
        const LPCVALID = 1 << 29;
        const WT_DONE = 1 << 28;
        const MW_DONE = 1 << 27;
        const BER_BUSY_0 = 1 << 26;
        const BER_BUSY_1 = 1 << 25;
        const REM_RDY_0 = 1 << 24;
        const REM_RDY_1 = 1 << 23;
        const FRLOCK_0 = 1 << 22;
        const FRLOCK_1 = 1 << 21;
        const DME_VIOL_0 = 1 << 20;
        const DME_VIOL_1 = 1 << 19;
        const AN_XMIT_DISABLE = 1 << 18;
        const TRAIN = 1 << 17;
        const RATE_DET = 1 << 16;
        const CMPL_ACK = 1 << 15;
        const AN_GOOD = 1 << 14;
        const LINK_FAIL = 1 << 13;
        const ABD_FAIL = 1 << 12;
        const ACK_FAIL = 1 << 11;
        const NP_FAIL = 1 << 10;
        const NP_RX = 1 << 9;
        const INCP_LINK = 1 << 8;
        const GEN0_DONE = 1 << 7;
        const GEN1_DONE = 1 << 6;
        const AN_RATE = 0xf;
    }
}

impl KrIrq {
    /// The raw aneg rate code carried in the low four bits
    pub fn rate_code(&self) -> u32 {
        self.bits() & KrIrq::AN_RATE.bits()
    }

    /// True if the hardware reported a rate change
    pub fn has_rate(&self) -> bool {
        self.intersects(KrIrq::AN_RATE)
    }
}

/// Link rates the aneg block can resolve to.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, strum::EnumIter, strum::IntoStaticStr,
)]
pub enum KrRate {
    #[strum(serialize = "25G-KR")]
    Kr25G,
    #[strum(serialize = "25G-KR-S")]
    Kr25GS,
    #[strum(serialize = "10G-KR")]
    Kr10G,
    #[strum(serialize = "10G-KX4")]
    Kx4_10G,
    #[strum(serialize = "5G-KR")]
    Kr5G,
    #[strum(serialize = "2.5G-KX")]
    Kx2G5,
    #[strum(serialize = "1G-KX")]
    Kx1G,
}

impl KrRate {
    /// Decode the rate in an interrupt vector.  A zero code means "No Change"
    /// and yields `None`.
    pub fn from_irq(irq: KrIrq) -> AsicResult<Option<KrRate>> {
        match irq.rate_code() {
            0 => Ok(None),
            code => KrRate::try_from(code).map(Some),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            KrRate::Kr25G => 7,
            KrRate::Kr25GS => 8,
            KrRate::Kr10G => 9,
            KrRate::Kx4_10G => 10,
            KrRate::Kr5G => 11,
            KrRate::Kx2G5 => 12,
            KrRate::Kx1G => 13,
        }
    }

    /// The port speed this rate runs at
    pub fn speed(&self) -> PortSpeed {
        match self {
            KrRate::Kr25G | KrRate::Kr25GS => PortSpeed::Speed25G,
            KrRate::Kr10G | KrRate::Kx4_10G => PortSpeed::Speed10G,
            KrRate::Kr5G => PortSpeed::Speed5G,
            KrRate::Kx2G5 => PortSpeed::Speed2G5,
            KrRate::Kx1G => PortSpeed::Speed1G,
        }
    }
}

impl TryFrom<u32> for KrRate {
    type Error = AsicError;

    fn try_from(code: u32) -> AsicResult<Self> {
        match code {
            7 => Ok(KrRate::Kr25G),
            8 => Ok(KrRate::Kr25GS),
            9 => Ok(KrRate::Kr10G),
            10 => Ok(KrRate::Kx4_10G),
            11 => Ok(KrRate::Kr5G),
            12 => Ok(KrRate::Kx2G5),
            13 => Ok(KrRate::Kx1G),
            x => Err(AsicError::InvalidKrRate(x)),
        }
    }
}

impl fmt::Display for KrRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.into();
        write!(f, "{name}")
    }
}

/// States of the hardware aneg state machine, as reported in `KrStatus`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, strum::EnumIter, strum::IntoStaticStr,
)]
pub enum AnegSmState {
    #[strum(serialize = "AN_ENABLE")]
    AnEnable = 0,
    #[strum(serialize = "XMI_DISABLE")]
    XmitDisable = 1,
    #[strum(serialize = "ABILITY_DET")]
    AbilityDetect = 2,
    #[strum(serialize = "ACK_DET")]
    AckDetect = 3,
    #[strum(serialize = "COMPLETE_ACK")]
    CompleteAck = 4,
    #[strum(serialize = "TRAIN")]
    Train = 5,
    #[strum(serialize = "AN_GOOD_CHK")]
    AnGoodCheck = 6,
    #[strum(serialize = "AN_GOOD")]
    AnGood = 7,
    #[strum(serialize = "RATE_DET")]
    RateDetect = 8,
    #[strum(serialize = "LINK_STAT_CHK")]
    LinkStatusCheck = 11,
    #[strum(serialize = "PARLL_DET_FAULT")]
    ParallelDetectFault = 12,
    #[strum(serialize = "WAIT_RATE_DONE")]
    WaitRateDone = 13,
    #[strum(serialize = "NXTPG_WAIT")]
    NextPageWait = 14,
}

impl TryFrom<u32> for AnegSmState {
    type Error = AsicError;

    fn try_from(state: u32) -> AsicResult<Self> {
        match state {
            0 => Ok(AnegSmState::AnEnable),
            1 => Ok(AnegSmState::XmitDisable),
            2 => Ok(AnegSmState::AbilityDetect),
            3 => Ok(AnegSmState::AckDetect),
            4 => Ok(AnegSmState::CompleteAck),
            5 => Ok(AnegSmState::Train),
            6 => Ok(AnegSmState::AnGoodCheck),
            7 => Ok(AnegSmState::AnGood),
            8 => Ok(AnegSmState::RateDetect),
            11 => Ok(AnegSmState::LinkStatusCheck),
            12 => Ok(AnegSmState::ParallelDetectFault),
            13 => Ok(AnegSmState::WaitRateDone),
            14 => Ok(AnegSmState::NextPageWait),
            x => Err(AsicError::InvalidFsmState(x)),
        }
    }
}

impl From<AnegSmState> for u32 {
    fn from(state: AnegSmState) -> Self {
        state as u32
    }
}

impl fmt::Display for AnegSmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.into();
        write!(f, "{name}")
    }
}

/// Link-training states driven by the hardware.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
pub enum TrainState {
    #[default]
    #[strum(serialize = "INITIALIZE")]
    Initialize,
    #[strum(serialize = "SEND_TRAINING")]
    SendTraining,
    #[strum(serialize = "TRAIN_LOCAL")]
    TrainLocal,
    #[strum(serialize = "TRAIN_REMOTE")]
    TrainRemote,
    #[strum(serialize = "SEND_DATA")]
    SendData,
    #[strum(serialize = "TRAINING_FAILURE")]
    TrainingFailure,
    #[strum(serialize = "LINK_READY")]
    LinkReady,
}

impl fmt::Display for TrainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.into();
        write!(f, "{name}")
    }
}

/// Sub-stages of the BER-driven local receiver training.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
pub enum BerStage {
    #[default]
    #[strum(serialize = "GO_TO_MIN")]
    GoToMin,
    #[strum(serialize = "CALCULATE_BER")]
    CalculateBer,
    #[strum(serialize = "MOVE_TO_MID_MARK")]
    MoveToMidMark,
    #[strum(serialize = "LOCAL_RX_TRAINED")]
    LocalRxTrained,
}

impl fmt::Display for BerStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.into();
        write!(f, "{name}")
    }
}

/// Transmit equalizer taps, in the order they are trained.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
pub enum KrTap {
    #[default]
    #[strum(serialize = "CM1")]
    Cm1,
    #[strum(serialize = "CP1")]
    Cp1,
    #[strum(serialize = "C0")]
    C0,
}

impl KrTap {
    /// Slot of this tap in the per-tap arrays of `KrState`, which are laid
    /// out CM1, C0, CP1.
    pub fn index(&self) -> usize {
        match self {
            KrTap::Cm1 => 0,
            KrTap::C0 => 1,
            KrTap::Cp1 => 2,
        }
    }
}

impl fmt::Display for KrTap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.into();
        write!(f, "{name}")
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct KrAnegConf {
    pub enable: bool,
    pub adv_1g: bool,
    pub adv_2g5: bool,
    pub adv_5g: bool,
    pub adv_10g: bool,
    pub adv_25g: bool,
    pub fec_ability: bool,
    pub r_fec_request: bool,
    pub rs_fec_request: bool,
    pub next_page: bool,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct KrTrainConf {
    pub enable: bool,
    /// Train the local receiver only
    pub no_remote: bool,
}

/// KR configuration of a port.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct KrConf {
    pub aneg: KrAnegConf,
    pub train: KrTrainConf,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct KrAnegStatus {
    pub complete: bool,
    /// Raw aneg state machine value, see [`AnegSmState`]
    pub sm: u32,
    /// Raw aneg history register
    pub hist: u32,
    pub speed_req: PortSpeed,
    /// The link partner asked for a FEC change
    pub request_fec_change: bool,
    pub r_fec_enable: bool,
    pub rs_fec_enable: bool,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct KrFecStatus {
    pub r_fec_enable: bool,
    pub rs_fec_enable: bool,
    pub corrected_block_cnt: u32,
    pub uncorrected_block_cnt: u32,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct KrTrainStatus {
    pub complete: bool,
    pub cm_ob_tap_result: u32,
    pub c0_ob_tap_result: u32,
    pub cp_ob_tap_result: u32,
}

/// Externally visible KR status of a port.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct KrStatus {
    pub aneg: KrAnegStatus,
    pub fec: KrFecStatus,
    pub train: KrTrainStatus,
}

/// Result of the most recent local-device training step: the raw coefficient
/// update and status report frames exchanged, and the resulting taps.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct KrTrainingResult {
    pub coef: u32,
    pub status: u32,
    pub cm1: u32,
    pub c0: u32,
    pub cp1: u32,
}

/// Internal training state of a port.  The per-tap arrays are indexed by
/// [`KrTap::index`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct KrState {
    pub current_state: TrainState,
    pub ber_training_stage: BerStage,
    pub current_tap: KrTap,
    pub training_started: bool,
    pub remote_rx_ready: bool,
    pub local_rx_ready: bool,
    pub dme_viol_handled: bool,
    pub ber_busy: bool,
    pub tap_max_reached: bool,
    pub signal_detect: bool,
    pub decr_cnt: u32,
    /// Raw coefficient frame of the current BER step
    pub ber_coef_frm: u32,
    pub lp_tap_max_cnt: [u32; 3],
    pub lp_tap_end_cnt: [u32; 3],
    pub ber_cnt: [Vec<u32>; 3],
    pub eye_height: [Vec<u32>; 3],
    pub tr_res: KrTrainingResult,
}

/// FEC selection for a port.  R-FEC and RS-FEC are mutually exclusive, so a
/// value with both enabled cannot be built.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct KrFec {
    r_fec: bool,
    rs_fec: bool,
}

impl KrFec {
    /// Both FECs off
    pub fn none() -> Self {
        KrFec::default()
    }

    pub fn new(r_fec: bool, rs_fec: bool) -> AsicResult<Self> {
        if r_fec && rs_fec {
            return Err(AsicError::InvalidArg(
                "R-FEC and RS-FEC cannot both be enabled".to_string(),
            ));
        }
        Ok(KrFec { r_fec, rs_fec })
    }

    pub fn r_fec(&self) -> bool {
        self.r_fec
    }

    pub fn rs_fec(&self) -> bool {
        self.rs_fec
    }
}
