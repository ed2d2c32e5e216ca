// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Classification and naming of KR interrupt vectors.

use std::fmt;

use aal::AsicError;
use aal::KrIrq;
use aal::KrRate;

/// Display names of the single-bit interrupt flags.
const IRQ_NAMES: [(KrIrq, &str); 26] = [
    (KrIrq::ACTV, "KR_ACTV"),
    (KrIrq::LPSVALID, "KR_LPS"),
    (KrIrq::LPCVALID, "KR_LPC"),
    (KrIrq::WT_DONE, "WT_DONE"),
    (KrIrq::MW_DONE, "MW_DONE"),
    (KrIrq::BER_BUSY_0, "BER_BUSY0"),
    (KrIrq::BER_BUSY_1, "BER_BUSY1"),
    (KrIrq::REM_RDY_0, "REM_RDY0"),
    (KrIrq::REM_RDY_1, "REM_RDY1"),
    (KrIrq::FRLOCK_0, "FRLOCK0"),
    (KrIrq::FRLOCK_1, "FRLOCK1"),
    (KrIrq::DME_VIOL_0, "DME_VIOL0"),
    (KrIrq::DME_VIOL_1, "DME_VIOL1"),
    (KrIrq::AN_XMIT_DISABLE, "AN_XM_DIS"),
    (KrIrq::TRAIN, "TRAIN"),
    (KrIrq::RATE_DET, "RATE_DET"),
    (KrIrq::CMPL_ACK, "CMPL_ACK"),
    (KrIrq::AN_GOOD, "AN_GOOD"),
    (KrIrq::LINK_FAIL, "LINK_FAIL"),
    (KrIrq::ABD_FAIL, "ABD_FAIL"),
    (KrIrq::ACK_FAIL, "ACK_FAIL"),
    (KrIrq::NP_FAIL, "NP_FAIL"),
    (KrIrq::NP_RX, "NP_RX"),
    (KrIrq::INCP_LINK, "INCP_LINK"),
    (KrIrq::GEN0_DONE, "GEN0_DONE"),
    (KrIrq::GEN1_DONE, "GEN1_DONE"),
];

// The lowest named bit; everything below it is the rate code.
const FIRST_FLAG_BIT: u32 = 4;

// Bits shown in history tables, which stop short of KR_ACTV.
const HISTORY_BIT_LIMIT: u32 = 31;

/// Name of a single interrupt flag.
pub fn irq_name(flag: KrIrq) -> &'static str {
    if flag.is_empty() {
        return "";
    }
    IRQ_NAMES
        .iter()
        .find(|(f, _)| *f == flag)
        .map(|(_, name)| *name)
        .unwrap_or("ILLEGAL")
}

/// Name of an aneg rate code.
pub fn rate_name(code: u32) -> &'static str {
    match code {
        0 => "No Change",
        code => match KrRate::try_from(code) {
            Ok(rate) => rate.into(),
            Err(_) => "other",
        },
    }
}

// Names of the flags set in `irq` from bit 4 up to, but not including,
// `limit`, followed by the rate name if a rate is present.
fn describe_bits(irq: KrIrq, limit: u32) -> String {
    let mut names: Vec<&str> = (FIRST_FLAG_BIT..limit)
        .map(|bit| KrIrq::from_bits_retain(1 << bit))
        .filter(|flag| irq.contains(*flag))
        .map(irq_name)
        .collect();
    if irq.has_rate() {
        names.push(rate_name(irq.rate_code()));
    }
    names.join(" ")
}

/// Human-readable decomposition of an interrupt vector, as shown in the
/// history tables.
pub fn describe(irq: KrIrq) -> String {
    describe_bits(irq, HISTORY_BIT_LIMIT)
}

/// How much of each interrupt vector is logged as it is observed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IrqDump {
    #[default]
    Off,
    /// Negotiation bits only
    Aneg,
    /// Negotiation and training bits
    All,
}

impl IrqDump {
    fn limit(&self) -> u32 {
        match self {
            IrqDump::Off => 0,
            IrqDump::Aneg => 20,
            IrqDump::All => 30,
        }
    }

    /// The dump line for `irq`, or `None` if no bit selected by this level
    /// is set.
    pub fn dump(&self, irq: KrIrq) -> Option<String> {
        let limit = self.limit();
        let selected = (FIRST_FLAG_BIT..limit)
            .any(|bit| irq.contains(KrIrq::from_bits_retain(1 << bit)));
        selected.then(|| describe_bits(irq, limit))
    }
}

impl fmt::Display for IrqDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrqDump::Off => write!(f, "off"),
            IrqDump::Aneg => write!(f, "aneg"),
            IrqDump::All => write!(f, "all"),
        }
    }
}

/// What the rate field of an interrupt vector asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateChange {
    None,
    Rate(KrRate),
    /// A nonzero code that matches no known rate
    Invalid(u32),
}

/// The events in an interrupt vector that the supervisor reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KrEvents {
    pub xmit_disable: bool,
    pub train_start: bool,
    pub an_good: bool,
    pub gen1_done: bool,
    pub rate_detect: bool,
    pub max_wait_done: bool,
    pub training_done: bool,
    pub coef_update: bool,
    pub rate: RateChange,
}

impl From<KrIrq> for KrEvents {
    fn from(irq: KrIrq) -> Self {
        let rate = match KrRate::from_irq(irq) {
            Ok(None) => RateChange::None,
            Ok(Some(rate)) => RateChange::Rate(rate),
            Err(AsicError::InvalidKrRate(code)) => RateChange::Invalid(code),
            Err(_) => RateChange::Invalid(irq.rate_code()),
        };
        KrEvents {
            xmit_disable: irq.contains(KrIrq::AN_XMIT_DISABLE),
            train_start: irq.contains(KrIrq::TRAIN),
            an_good: irq.contains(KrIrq::AN_GOOD),
            gen1_done: irq.contains(KrIrq::GEN1_DONE),
            rate_detect: irq.contains(KrIrq::RATE_DET),
            max_wait_done: irq.contains(KrIrq::MW_DONE),
            training_done: irq.contains(KrIrq::WT_DONE),
            coef_update: irq.contains(KrIrq::LPCVALID),
            rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(irq_name(KrIrq::AN_XMIT_DISABLE), "AN_XM_DIS");
        assert_eq!(irq_name(KrIrq::empty()), "");
        assert_eq!(irq_name(KrIrq::from_bits_retain(1 << 5)), "ILLEGAL");
        assert_eq!(rate_name(0), "No Change");
        assert_eq!(rate_name(9), "10G-KR");
        assert_eq!(rate_name(3), "other");
    }

    #[test]
    fn test_describe() {
        let irq = KrIrq::TRAIN | KrIrq::AN_GOOD | KrIrq::from_bits_retain(7);
        assert_eq!(describe(irq), "AN_GOOD TRAIN 25G-KR");
        // KR_ACTV is never shown.
        assert_eq!(describe(KrIrq::ACTV), "");
        assert_eq!(describe(KrIrq::LPSVALID), "KR_LPS");
    }

    #[test]
    fn test_dump_levels() {
        let training = KrIrq::LPCVALID;
        assert_eq!(IrqDump::Off.dump(KrIrq::AN_GOOD), None);
        assert_eq!(IrqDump::Aneg.dump(training), None);
        assert_eq!(IrqDump::All.dump(training), Some("KR_LPC".to_string()));

        // Rate bits alone never trigger a dump line.
        assert_eq!(IrqDump::All.dump(KrIrq::from_bits_retain(9)), None);
        assert_eq!(
            IrqDump::Aneg.dump(KrIrq::AN_GOOD | KrIrq::from_bits_retain(9)),
            Some("AN_GOOD 10G-KR".to_string())
        );
    }

    #[test]
    fn test_events() {
        let events =
            KrEvents::from(KrIrq::AN_GOOD | KrIrq::GEN1_DONE | KrIrq::TRAIN);
        assert!(events.an_good && events.gen1_done && events.train_start);
        assert!(!events.rate_detect);
        assert_eq!(events.rate, RateChange::None);

        let events = KrEvents::from(KrIrq::from_bits_retain(11));
        assert_eq!(events.rate, RateChange::Rate(KrRate::Kr5G));
        let events = KrEvents::from(KrIrq::from_bits_retain(2));
        assert_eq!(events.rate, RateChange::Invalid(2));
    }
}
