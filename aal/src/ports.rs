// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use common::ports::PortSpeed;

/// Serdes interface type used for a port.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub enum PortInterface {
    /// Single-lane serdes mode used at 2.5G and below
    #[default]
    Serdes,
    /// SFI mode used above 2.5G
    Sfi,
}

impl PortInterface {
    /// The interface type a port must use to run at `speed`
    pub fn for_speed(speed: PortSpeed) -> Self {
        if speed > PortSpeed::Speed2G5 {
            PortInterface::Sfi
        } else {
            PortInterface::Serdes
        }
    }
}

impl fmt::Display for PortInterface {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PortInterface::Serdes => write!(f, "SERDES"),
            PortInterface::Sfi => write!(f, "SFI"),
        }
    }
}

/// The subset of a port's configuration the KR supervisor manages.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PortConf {
    pub speed: PortSpeed,
    pub if_type: PortInterface,
}

impl PortConf {
    /// Configuration for running a port at `speed`, with the matching
    /// interface type
    pub fn for_speed(speed: PortSpeed) -> Self {
        PortConf {
            speed,
            if_type: PortInterface::for_speed(speed),
        }
    }
}

/// Static board capabilities of a port.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PortCap {
    /// Port supports 10G full duplex, and with it KR aneg
    pub fdx_10g: bool,
    /// Port supports 25G full duplex
    pub fdx_25g: bool,
}
