// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Emulated KR chip drivers.  `stub` models the chip and a cooperative link
//! partner, `chaos` wraps it to fail operations at random.

// Neither backend has real aneg hardware underneath.  They share a faux
// partner that walks each port through a clean negotiation.
mod faux_fsm;

pub mod chaos;
pub mod stub;
