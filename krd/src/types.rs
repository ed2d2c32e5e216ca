// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! General types used throughout krd.

use std::convert;

use aal::AsicError;
use common::ports::PortNo;

pub type KrResult<T> = Result<T, KrError>;

#[derive(Debug, thiserror::Error)]
pub enum KrError {
    #[error("I/O error: {0:?}")]
    Io(std::io::Error),
    #[error("ASIC error: {0}")]
    Switch(AsicError),
    #[error("Invalid argument: {0}")]
    Invalid(String),
    #[error("Port {0} does not exist")]
    NoSuchPort(PortNo),
    #[error("Error: {0}")]
    Other(String),
}

impl convert::From<std::io::Error> for KrError {
    fn from(err: std::io::Error) -> Self {
        KrError::Io(err)
    }
}

impl convert::From<AsicError> for KrError {
    fn from(err: AsicError) -> Self {
        KrError::Switch(err)
    }
}

impl convert::From<std::fmt::Error> for KrError {
    fn from(err: std::fmt::Error) -> Self {
        KrError::Other(format!("formatting failed: {err}"))
    }
}
