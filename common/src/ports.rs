// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

/// Physical port index on the board, starting at 0.
pub type PortNo = u16;

/// Speeds a KR-capable port can be configured for.  The ordering follows the
/// line rate.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    strum::EnumIter,
)]
pub enum PortSpeed {
    #[serde(rename = "1G")]
    Speed1G,
    #[serde(rename = "2.5G")]
    Speed2G5,
    #[serde(rename = "5G")]
    Speed5G,
    #[default]
    #[serde(rename = "10G")]
    Speed10G,
    #[serde(rename = "25G")]
    Speed25G,
}

impl fmt::Display for PortSpeed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            PortSpeed::Speed1G => "1G",
            PortSpeed::Speed2G5 => "2.5G",
            PortSpeed::Speed5G => "5G",
            PortSpeed::Speed10G => "10G",
            PortSpeed::Speed25G => "25G",
        };
        write!(f, "{s}")
    }
}

impl FromStr for PortSpeed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "1G" => Ok(PortSpeed::Speed1G),
            "2.5G" | "2G5" => Ok(PortSpeed::Speed2G5),
            "5G" => Ok(PortSpeed::Speed5G),
            "10G" => Ok(PortSpeed::Speed10G),
            "25G" => Ok(PortSpeed::Speed25G),
            _ => Err(format!("invalid port speed: {s}")),
        }
    }
}
