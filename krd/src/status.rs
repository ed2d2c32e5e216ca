// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Text rendering of KR status and histories.  Nothing here touches a
//! session or the chip.

use std::fmt::Write as _;
use std::io::Write;

use tabwriter::TabWriter;

use aal::KrConf;
use aal::KrState;
use aal::KrStatus;
use aal::KrTap;
use common::ports::PortNo;

use crate::history::GlobalIrqEntry;
use crate::history::History;
use crate::history::IrqEntry;
use crate::history::LdEntry;
use crate::history::LpEntry;
use crate::irq;
use crate::types::KrError;
use crate::types::KrResult;

const TAP_MAGNITUDE: u32 = 0x3f;
const TAP_SIGN: u32 = 0x40;

const FRM_PRESET: u32 = 1 << 13;
const FRM_INIT: u32 = 1 << 12;
const FRM_RX_READY: u32 = 1 << 15;

/// If `value` has any bit outside of `mask` it is taken to be negative, and
/// its two's complement magnitude within `mask` is returned.
pub fn tap_result(value: u32, mask: u32) -> u32 {
    if value & !mask != 0 {
        (!value).wrapping_add(1) & mask
    } else {
        value
    }
}

/// Decode a 7-bit sign-and-magnitude tap value.
pub fn decode_tap(value: u32) -> i32 {
    if value & TAP_SIGN != 0 {
        -(tap_result(value, TAP_MAGNITUDE) as i32)
    } else {
        (value & TAP_MAGNITUDE) as i32
    }
}

/// Render a 7-bit tap as its sign and magnitude, followed by the raw value.
pub fn format_tap(value: u32) -> String {
    let sign = if value & TAP_SIGN != 0 { "-" } else { "+" };
    format!("{sign}{} ({value})", tap_result(value, TAP_MAGNITUDE))
}

// The taps addressed by a coefficient update or status report frame, and
// the 2-bit field of the last one named.
fn frame_taps(frm: u32) -> (Vec<&'static str>, u32) {
    let mut taps = Vec::new();
    let mut action = 0;
    for (shift, tap) in [(0, KrTap::Cm1), (2, KrTap::C0), (4, KrTap::Cp1)] {
        let field = (frm >> shift) & 0x3;
        if field != 0 {
            taps.push(tap.into());
            action = field;
        }
    }
    if frm & TAP_MAGNITUDE == 0 {
        taps.push("ANY");
    }
    (taps, action)
}

/// Decode a coefficient update frame into the taps it addresses and the
/// requested action.
pub fn coef_frame_text(frm: u32) -> (String, &'static str) {
    if frm & FRM_PRESET != 0 {
        return ("PRESET".to_string(), "PRESET");
    }
    if frm & FRM_INIT != 0 {
        return ("INIT".to_string(), "INIT");
    }
    let (taps, action) = frame_taps(frm);
    let action = match action {
        1 => "INCR",
        2 => "DECR",
        _ => "HOLD",
    };
    (taps.join(" "), action)
}

/// Decode a status report frame into the taps it reports on and their
/// update status.
pub fn status_frame_text(frm: u32) -> (String, &'static str) {
    let (mut taps, action) = frame_taps(frm);
    if frm & FRM_RX_READY != 0 {
        taps.insert(0, "RX READY");
    }
    let action = match action {
        1 => "UPDATED",
        2 => "MIN",
        3 => "MAX",
        _ => "NOT_UPDATED",
    };
    (taps.join(" "), action)
}

fn yes_no(v: bool) -> &'static str {
    if v {
        "Yes"
    } else {
        "No"
    }
}

fn enabled(v: bool) -> &'static str {
    if v {
        "Enabled"
    } else {
        "Disabled"
    }
}

fn truth(v: bool) -> &'static str {
    if v {
        "TRUE"
    } else {
        "FALSE"
    }
}

fn counts(values: &[u32]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Everything shown by the status of a single port.
pub struct PortStatus<'a> {
    pub port: PortNo,
    pub conf: &'a KrConf,
    pub status: &'a KrStatus,
    pub state: &'a KrState,
    /// Duration of the last completed training
    pub training_time: Option<u64>,
}

impl PortStatus<'_> {
    pub fn render(&self) -> KrResult<String> {
        let mut out = String::new();
        self.render_into(&mut out)?;
        Ok(out)
    }

    fn render_into(&self, out: &mut String) -> std::fmt::Result {
        let sts = self.status;
        writeln!(out, "Port {}", self.port)?;
        writeln!(out, "  ANEG completed    : {}", yes_no(sts.aneg.complete))?;
        writeln!(out, "  Speed             : {}", sts.aneg.speed_req)?;
        writeln!(
            out,
            "  R-FEC (CL-74)     : {}",
            enabled(sts.fec.r_fec_enable)
        )?;
        writeln!(
            out,
            "  RS-FEC (CL-108)   : {}",
            enabled(sts.fec.rs_fec_enable)
        )?;
        if sts.fec.r_fec_enable || sts.fec.rs_fec_enable {
            writeln!(
                out,
                "  Corrected blocks  : {}",
                sts.fec.corrected_block_cnt
            )?;
            writeln!(
                out,
                "  Uncorrected blocks: {}",
                sts.fec.uncorrected_block_cnt
            )?;
        }
        if !self.conf.train.enable {
            return writeln!(out, "  Training          : Disabled");
        }

        let krs = self.state;
        let [cm1, c0, cp1] =
            [KrTap::Cm1, KrTap::C0, KrTap::Cp1].map(|t| t.index());
        writeln!(out, "  This device training details:")?;
        writeln!(
            out,
            "  BER STAGE         : {} (GO_TO_MIN->CAL_CBER->MOVE_TO_MID->LOCAL_RX_TRAINED)",
            krs.ber_training_stage
        )?;
        writeln!(
            out,
            "  CURRENT TAP       : {} (CM1->CP1->C0)",
            krs.current_tap
        )?;
        writeln!(
            out,
            "  TRAINING_STATE    : {} (INIT->SEND_TRAIN->TRAIN_LOC->TRAIN_REM->LINK_READY->SEND_DATA)",
            krs.current_state
        )?;
        writeln!(out, "  TRAINING_STARTED  : {}", truth(krs.training_started))?;
        writeln!(out, "  REMOTE_RX_READY   : {}", truth(krs.remote_rx_ready))?;
        writeln!(out, "  LOCAL_RX_READY    : {}", truth(krs.local_rx_ready))?;
        writeln!(out, "  DME_VIOL_HANDLED  : {}", truth(krs.dme_viol_handled))?;
        writeln!(out, "  BER_BUSY          : {}", truth(krs.ber_busy))?;
        writeln!(out, "  TAP_MAX_REACHED   : {}", truth(krs.tap_max_reached))?;
        writeln!(out, "  SIGNAL_DETECT     : {}", truth(krs.signal_detect))?;
        writeln!(out, "  DECR_CNT          : {}", krs.decr_cnt)?;
        for (label, slot) in [("CM1", cm1), ("C0 ", c0), ("CP1", cp1)] {
            writeln!(
                out,
                "  LP {label} MAX/END    : {}/{}",
                krs.lp_tap_max_cnt[slot], krs.lp_tap_end_cnt[slot]
            )?;
        }
        for (label, slot) in [("CM1", cm1), ("C0 ", c0), ("CP1", cp1)] {
            writeln!(
                out,
                "  BER_COUNT {label}     : {}",
                counts(&krs.ber_cnt[slot])
            )?;
        }
        for (label, slot) in [("CM1", cm1), ("C0 ", c0), ("CP1", cp1)] {
            writeln!(
                out,
                "  EYE HEIGHT {label}    : {}",
                counts(&krs.eye_height[slot])
            )?;
        }
        let ok = krs.current_state == aal::TrainState::SendData;
        writeln!(
            out,
            "  TRAINING STATUS   : {}",
            if ok { "OK" } else { "Failed" }
        )?;

        writeln!(out, "  Remote device training details:")?;
        writeln!(
            out,
            "  LD CM (tap_dly)   : {}",
            format_tap(sts.train.cm_ob_tap_result)
        )?;
        writeln!(
            out,
            "  LD C0 (amplitude) : {}",
            format_tap(sts.train.c0_ob_tap_result)
        )?;
        writeln!(
            out,
            "  LD CP (tap_adv)   : {}",
            format_tap(sts.train.cp_ob_tap_result)
        )?;
        match self.training_time {
            Some(ms) => writeln!(out, "  TRAINING TIME     : {ms} ms"),
            None => writeln!(out, "  TRAINING TIME     : -"),
        }
    }
}

fn finish(tw: TabWriter<Vec<u8>>) -> KrResult<String> {
    let buf = tw
        .into_inner()
        .map_err(|e| KrError::Other(format!("failed to flush table: {e}")))?;
    String::from_utf8(buf)
        .map_err(|e| KrError::Other(format!("table is not utf8: {e}")))
}

/// The interrupt history of one port: index, aneg ms and the decoded irq.
pub fn irq_table(port: PortNo, hist: &History<IrqEntry>) -> KrResult<String> {
    let mut tw = TabWriter::new(Vec::new());
    writeln!(tw, "Port {port}:")?;
    writeln!(tw, "\tms\tKR IRQs")?;
    for (idx, entry) in hist.iter().enumerate() {
        writeln!(tw, "{idx}\t{}\t{}", entry.time, irq::describe(entry.irq))?;
    }
    finish(tw)
}

/// The interrupt history shared by all ports, in arrival order.
pub fn global_irq_table(hist: &History<GlobalIrqEntry>) -> KrResult<String> {
    let mut tw = TabWriter::new(Vec::new());
    writeln!(tw, "All ports:")?;
    writeln!(tw, "\tport\tms\tKR IRQs")?;
    for (idx, entry) in hist.iter().enumerate() {
        writeln!(
            tw,
            "{idx}\t{}\t{}\t{}",
            entry.port,
            entry.time,
            irq::describe(entry.irq)
        )?;
    }
    finish(tw)
}

/// The local device training history.  Updates that hold every tap are
/// skipped unless `all` is set; skipped rows keep their index.
pub fn ld_table(
    port: PortNo,
    hist: &History<LdEntry>,
    all: bool,
) -> KrResult<String> {
    let mut tw = TabWriter::new(Vec::new());
    writeln!(tw, "Port {port}:")?;
    writeln!(tw, "\tTAP\tCMD\tCM1\tAmpl\tCP1\tStatus\tTime (ms)")?;
    for (idx, entry) in hist.iter().enumerate() {
        if !all && entry.res.coef == 0 {
            continue;
        }
        let (tap, cmd) = coef_frame_text(entry.res.coef);
        let (_, sts) = status_frame_text(entry.res.status);
        writeln!(
            tw,
            "{idx}\t{tap}\t{cmd}\t{}\t{}\t{}\t{sts}\t{}",
            entry.res.cm1, entry.res.c0, entry.res.cp1, entry.time
        )?;
    }
    finish(tw)
}

/// The link partner training history, with the interrupts seen at each
/// step.  Hold steps are skipped unless `all` is set.
pub fn lp_table(
    port: PortNo,
    hist: &History<LpEntry>,
    all: bool,
) -> KrResult<String> {
    let mut tw = TabWriter::new(Vec::new());
    writeln!(tw, "Port {port}:")?;
    writeln!(tw, "\tTAP\tCMD\tBER state\tms\tIRQs")?;
    for (idx, entry) in hist.iter().enumerate() {
        if !all && entry.ber_coef_frm == 0 {
            continue;
        }
        let (tap, cmd) = coef_frame_text(entry.ber_coef_frm);
        writeln!(
            tw,
            "{idx}\t{tap}\t{cmd}\t{}\t{}\t{}",
            entry.ber_stage,
            entry.time,
            irq::describe(entry.irq)
        )?;
    }
    finish(tw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aal::BerStage;
    use aal::KrIrq;
    use aal::KrTrainingResult;
    use aal::TrainState;
    use common::ports::PortSpeed;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tap_round_trip() {
        for n in -63i32..=63 {
            let raw = (n as u32) & 0x7f;
            assert_eq!(decode_tap(raw), n, "raw {raw:#x}");
        }
        for mask in [0x3f, 0x7f, 0xff] {
            for v in 1..=mask {
                assert_eq!(tap_result(v, mask), v);
                let negated = (!v).wrapping_add(1);
                assert_eq!(tap_result(negated, mask), v & mask);
            }
        }
    }

    #[test]
    fn test_format_tap() {
        assert_eq!(format_tap(5), "+5 (5)");
        assert_eq!(format_tap(0x7b), "-5 (123)");
        assert_eq!(format_tap(0), "+0 (0)");
        // Bit 6 marks a two's complement value in the low six bits.
        assert_eq!(decode_tap(0x41), -63);
        assert_eq!(decode_tap(0x7f), -1);
        assert_eq!(format_tap(0x41), "-63 (65)");
    }

    #[test]
    fn test_coef_frames() {
        assert_eq!(coef_frame_text(FRM_PRESET | 1).1, "PRESET");
        assert_eq!(coef_frame_text(FRM_INIT), ("INIT".to_string(), "INIT"));
        assert_eq!(coef_frame_text(0x1), ("CM1".to_string(), "INCR"));
        assert_eq!(coef_frame_text(0x8), ("C0".to_string(), "DECR"));
        assert_eq!(coef_frame_text(0x0), ("ANY".to_string(), "HOLD"));
        // The action of the last tap named wins.
        assert_eq!(coef_frame_text(0x21), ("CM1 CP1".to_string(), "DECR"));
    }

    #[test]
    fn test_status_frames() {
        assert_eq!(
            status_frame_text(FRM_RX_READY | 0x10),
            ("RX READY CP1".to_string(), "UPDATED")
        );
        assert_eq!(status_frame_text(0x3), ("CM1".to_string(), "MAX"));
        assert_eq!(status_frame_text(0x8), ("C0".to_string(), "MIN"));
        assert_eq!(status_frame_text(0), ("ANY".to_string(), "NOT_UPDATED"));
    }

    #[test]
    fn test_port_status_untrained() -> anyhow::Result<()> {
        let conf = KrConf::default();
        let mut status = KrStatus::default();
        status.aneg.complete = true;
        status.aneg.speed_req = PortSpeed::Speed25G;
        status.fec.rs_fec_enable = true;
        status.fec.corrected_block_cnt = 12;
        let state = KrState::default();
        let view = PortStatus {
            port: 1,
            conf: &conf,
            status: &status,
            state: &state,
            training_time: None,
        };
        assert_eq!(
            view.render()?,
            "Port 1\n\
             \x20 ANEG completed    : Yes\n\
             \x20 Speed             : 25G\n\
             \x20 R-FEC (CL-74)     : Disabled\n\
             \x20 RS-FEC (CL-108)   : Enabled\n\
             \x20 Corrected blocks  : 12\n\
             \x20 Uncorrected blocks: 0\n\
             \x20 Training          : Disabled\n"
        );
        Ok(())
    }

    #[test]
    fn test_port_status_trained() -> anyhow::Result<()> {
        let mut conf = KrConf::default();
        conf.train.enable = true;
        let mut status = KrStatus::default();
        status.train.cm_ob_tap_result = 0x7e;
        status.train.c0_ob_tap_result = 20;
        let state = KrState {
            current_state: TrainState::SendData,
            ber_training_stage: BerStage::LocalRxTrained,
            current_tap: KrTap::C0,
            training_started: true,
            lp_tap_max_cnt: [1, 2, 3],
            lp_tap_end_cnt: [4, 5, 6],
            ber_cnt: [vec![0, 1], vec![], vec![7]],
            eye_height: [vec![13], vec![], vec![]],
            ..Default::default()
        };
        let view = PortStatus {
            port: 4,
            conf: &conf,
            status: &status,
            state: &state,
            training_time: Some(312),
        };
        let text = view.render()?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[5], "  This device training details:");
        assert_eq!(
            lines[6],
            "  BER STAGE         : LOCAL_RX_TRAINED (GO_TO_MIN->CAL_CBER->MOVE_TO_MID->LOCAL_RX_TRAINED)"
        );
        assert_eq!(lines[7], "  CURRENT TAP       : C0 (CM1->CP1->C0)");
        assert_eq!(lines[9], "  TRAINING_STARTED  : TRUE");
        assert_eq!(lines[15], "  SIGNAL_DETECT     : FALSE");
        assert_eq!(lines[17], "  LP CM1 MAX/END    : 1/4");
        assert_eq!(lines[18], "  LP C0  MAX/END    : 2/5");
        assert_eq!(lines[19], "  LP CP1 MAX/END    : 3/6");
        assert_eq!(lines[20], "  BER_COUNT CM1     : 0 1");
        assert_eq!(lines[22], "  BER_COUNT CP1     : 7");
        assert_eq!(lines[23], "  EYE HEIGHT CM1    : 13");
        assert_eq!(lines[26], "  TRAINING STATUS   : OK");
        assert_eq!(lines[28], "  LD CM (tap_dly)   : -2 (126)");
        assert_eq!(lines[29], "  LD C0 (amplitude) : +20 (20)");
        assert_eq!(lines[31], "  TRAINING TIME     : 312 ms");
        assert_eq!(lines.len(), 32);
        Ok(())
    }

    fn ld(time: u64, coef: u32) -> LdEntry {
        LdEntry {
            time,
            res: KrTrainingResult {
                coef,
                status: 1,
                cm1: 2,
                c0: 0,
                cp1: 0,
            },
        }
    }

    #[test]
    fn test_ld_table_skips_holds() -> anyhow::Result<()> {
        let mut hist = History::with_capacity(8);
        hist.record(ld(3, 1));
        hist.record(ld(5, 0));
        hist.record(ld(9, 1));

        let table = ld_table(0, &hist, false)?;
        let rows: Vec<Vec<&str>> = table
            .lines()
            .skip(2)
            .map(|l| l.split_whitespace().collect())
            .collect();
        assert_eq!(
            rows,
            vec![
                vec!["0", "CM1", "INCR", "2", "0", "0", "UPDATED", "3"],
                vec!["2", "CM1", "INCR", "2", "0", "0", "UPDATED", "9"],
            ]
        );

        let table = ld_table(0, &hist, true)?;
        assert_eq!(table.lines().count(), 5);
        assert!(table.lines().nth(3).unwrap().contains("HOLD"));
        Ok(())
    }

    #[test]
    fn test_lp_and_irq_tables() -> anyhow::Result<()> {
        let mut lp = History::with_capacity(8);
        lp.record(LpEntry {
            time: 4,
            ber_coef_frm: 0x10,
            ber_stage: BerStage::CalculateBer,
            irq: KrIrq::LPCVALID | KrIrq::from_bits_retain(9),
        });
        let table = lp_table(2, &lp, false)?;
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "Port 2:");
        assert_eq!(
            lines[2].split_whitespace().collect::<Vec<_>>(),
            vec!["0", "CP1", "INCR", "CALCULATE_BER", "4", "KR_LPC", "10G-KR"]
        );

        let mut irqs = History::with_capacity(8);
        irqs.record(IrqEntry {
            time: 0,
            irq: KrIrq::AN_XMIT_DISABLE,
        });
        irqs.record(IrqEntry {
            time: 17,
            irq: KrIrq::AN_GOOD | KrIrq::CMPL_ACK,
        });
        let table = irq_table(2, &irqs)?;
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[1].split_whitespace().collect::<Vec<_>>(), vec![
            "ms", "KR", "IRQs"
        ]);
        assert_eq!(
            lines[3].split_whitespace().collect::<Vec<_>>(),
            vec!["1", "17", "AN_GOOD", "CMPL_ACK"]
        );

        let mut global = History::with_capacity(8);
        global.record(GlobalIrqEntry {
            time: 8,
            irq: KrIrq::TRAIN,
            port: 5,
        });
        let table = global_irq_table(&global)?;
        assert_eq!(
            table.lines().nth(2).unwrap().split_whitespace().collect::<Vec<_>>(),
            vec!["0", "5", "8", "TRAIN"]
        );
        Ok(())
    }
}
