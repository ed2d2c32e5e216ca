// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Bounded event logs kept for postmortem debugging of a negotiation.

use aal::BerStage;
use aal::KrIrq;
use aal::KrTrainingResult;
use common::ports::PortNo;

/// Default number of entries each history can hold.
pub const KR_HIST_NUM: usize = 2000;

/// An append-only log with a fixed capacity.  Once full, new entries are
/// dropped so the start of a negotiation is never lost; the log only empties
/// when it is cleared.
#[derive(Clone, Debug)]
pub struct History<T> {
    entries: Vec<T>,
    capacity: usize,
}

impl<T> History<T> {
    pub fn new() -> Self {
        Self::with_capacity(KR_HIST_NUM)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        History {
            entries: Vec::new(),
            capacity,
        }
    }

    /// Append `entry`, returning `false` if the log was full and the entry
    /// was dropped.
    pub fn record(&mut self, entry: T) -> bool {
        if self.is_full() {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// An interrupt observed on a port, timed against its aneg timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IrqEntry {
    pub time: u64,
    pub irq: KrIrq,
}

/// An interrupt observed anywhere on the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GlobalIrqEntry {
    pub time: u64,
    pub irq: KrIrq,
    pub port: PortNo,
}

/// A local-device training step: the result latched when the partner sent a
/// new coefficient update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LdEntry {
    pub time: u64,
    pub res: KrTrainingResult,
}

/// A link-partner training step as seen by the BER training logic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LpEntry {
    pub time: u64,
    pub ber_coef_frm: u32,
    pub ber_stage: BerStage,
    pub irq: KrIrq,
}
