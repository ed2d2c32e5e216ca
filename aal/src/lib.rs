// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use thiserror::Error;

use common::ports::PortNo;

mod kr;
pub use kr::*;

mod ports;
pub use ports::*;

/// A specialized Result type for ASIC operations
pub type AsicResult<T> = Result<T, AsicError>;

/// Error type conveying additional information about ASIC errors
#[derive(Error, Debug)]
pub enum AsicError {
    /// An argument passed to the ASIC layer is invalid or inappropriate.  This
    /// indicates misbehavior from the caller.
    #[error("Invalid argument: {}", .0)]
    InvalidArg(String),
    /// Found a numeric state that doesn't match a known aneg state machine
    /// state
    #[error("Invalid FSM state: {}",.0)]
    InvalidFsmState(u32),
    /// Found a nonzero aneg rate code that doesn't match a known KR rate
    #[error("Invalid KR rate code: {}",.0)]
    InvalidKrRate(u32),
    /// An error derived from a purposely triggered synthetic fault for testing
    /// purposes.
    #[error("Synthetic ASIC error: {}", .0)]
    Synthetic(String),
    /// The caller named a port or other resource that is not present.
    #[error("Missing: {}", .0)]
    Missing(String),
}

/// The `KrOps` trait contains the chip-driver and board operations needed to
/// supervise KR auto-negotiation and link training.  All ports are identified
/// by their board index.
pub trait KrOps {
    /// Number of physical ports on the board
    fn port_count(&self) -> PortNo;

    /// Static capabilities of a board port
    fn port_cap_get(&self, port: PortNo) -> AsicResult<PortCap>;

    /// Fetch the KR aneg/training configuration currently applied to a port
    fn kr_conf_get(&self, port: PortNo) -> AsicResult<KrConf>;

    /// Apply a KR aneg/training configuration.  Disabling aneg tears down any
    /// negotiation in flight.
    fn kr_conf_set(&self, port: PortNo, conf: &KrConf) -> AsicResult<()>;

    /// Read the externally visible KR status of a port
    fn kr_status_get(&self, port: PortNo) -> AsicResult<KrStatus>;

    /// Read the internal training state record of a port
    fn kr_state_get(&self, port: PortNo) -> AsicResult<KrState>;

    /// Enable or disable R-FEC / RS-FEC on a port
    fn kr_fec_set(&self, port: PortNo, fec: &KrFec) -> AsicResult<()>;

    /// Fetch the pending KR interrupt bits of a port
    fn kr_irq_get(&self, port: PortNo) -> AsicResult<KrIrq>;

    /// Acknowledge interrupt bits previously returned by `kr_irq_get`, letting
    /// the hardware state machines advance
    fn kr_irq_apply(&self, port: PortNo, irq: KrIrq) -> AsicResult<()>;

    /// Fetch the speed and interface type a port is configured for
    fn port_conf_get(&self, port: PortNo) -> AsicResult<PortConf>;

    /// Reconfigure the speed and interface type of a port
    fn port_conf_set(&self, port: PortNo, conf: &PortConf) -> AsicResult<()>;
}
