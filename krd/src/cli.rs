// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Parsing and dispatch of the operator's `kr` command lines.

use std::str::FromStr;

use anyhow::bail;
use anyhow::Context;
use structopt::StructOpt;

use aal::KrOps;
use common::ports::PortNo;

use crate::admin::AnegOptions;
use crate::admin::DebugOptions;
use crate::admin::StatusOptions;
use crate::supervisor::KrSupervisor;
use crate::types::KrResult;

/// A set of ports: either "all", or a comma-separated list of port numbers
/// and ranges such as "0,2-4".
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PortList {
    All,
    Ports(Vec<PortNo>),
}

impl PortList {
    pub fn resolve(&self, board: Vec<PortNo>) -> Vec<PortNo> {
        match self {
            PortList::All => board,
            PortList::Ports(ports) => ports.clone(),
        }
    }
}

fn parse_port(s: &str) -> anyhow::Result<PortNo> {
    s.trim()
        .parse()
        .with_context(|| format!("invalid port number: {s:?}"))
}

impl FromStr for PortList {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(PortList::All);
        }

        let mut ports = Vec::new();
        for part in s.split(',') {
            match part.split_once('-') {
                Some((lo, hi)) => {
                    let (lo, hi) = (parse_port(lo)?, parse_port(hi)?);
                    if lo > hi {
                        bail!("invalid port range: {part:?}");
                    }
                    ports.extend(lo..=hi);
                }
                None => ports.push(parse_port(part)?),
            }
        }
        ports.sort_unstable();
        ports.dedup();
        Ok(PortList::Ports(ports))
    }
}

#[derive(Debug, StructOpt)]
#[structopt(name = "kr", about = "KR auto-negotiation and link training")]
pub enum KrCommand {
    /// Enable or disable KR on ports, restarting their negotiation.
    Set {
        ports: PortList,
        #[structopt(flatten)]
        opts: AnegOptions,
    },
    /// Show whether aneg and training are enabled.
    Show { ports: PortList },
    /// Show KR status, or the interrupt and training histories.
    Status {
        ports: PortList,
        #[structopt(flatten)]
        opts: StatusOptions,
    },
    /// Change debug logging and supervision controls.
    Debug {
        ports: PortList,
        #[structopt(flatten)]
        opts: DebugOptions,
    },
    /// Select R-FEC, RS-FEC or no FEC.
    Fec {
        ports: PortList,
        #[structopt(long)]
        r_fec: bool,
        #[structopt(long)]
        rs_fec: bool,
    },
}

impl KrCommand {
    /// Parse one operator command line, e.g. "set 0-3 --all".
    pub fn parse_line(line: &str) -> Result<Self, structopt::clap::Error> {
        KrCommand::from_iter_safe(
            std::iter::once("kr").chain(line.split_whitespace()),
        )
    }

    /// Run the command, returning the text to show the operator.
    pub fn execute<H: KrOps>(&self, sup: &KrSupervisor<H>) -> KrResult<String> {
        match self {
            KrCommand::Set { ports, opts } => {
                sup.kr_set(&ports.resolve(sup.ports()), opts)
            }
            KrCommand::Show { ports } => sup.kr_show(&ports.resolve(sup.ports())),
            KrCommand::Status { ports, opts } => {
                sup.kr_status(&ports.resolve(sup.ports()), opts)
            }
            KrCommand::Debug { ports, opts } => {
                sup.kr_debug(&ports.resolve(sup.ports()), opts)
            }
            KrCommand::Fec {
                ports,
                r_fec,
                rs_fec,
            } => sup.kr_fec(&ports.resolve(sup.ports()), *r_fec, *rs_fec),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::tests::stub_supervisor;
    use crate::types::KrError;

    #[test]
    fn test_port_lists() -> anyhow::Result<()> {
        assert_eq!("ALL".parse::<PortList>()?, PortList::All);
        assert_eq!("3".parse::<PortList>()?, PortList::Ports(vec![3]));
        assert_eq!(
            "4,0,2-3,3".parse::<PortList>()?,
            PortList::Ports(vec![0, 2, 3, 4])
        );
        assert!("3-1".parse::<PortList>().is_err());
        assert!("1,,2".parse::<PortList>().is_err());
        assert!("x".parse::<PortList>().is_err());
        assert!("70000".parse::<PortList>().is_err());

        let board = vec![0, 1, 2];
        assert_eq!(PortList::All.resolve(board.clone()), board);
        assert_eq!(PortList::Ports(vec![1]).resolve(board), vec![1]);
        Ok(())
    }

    #[test]
    fn test_parse_lines() -> anyhow::Result<()> {
        match KrCommand::parse_line("set 0-1 --adv-10g --training --no-remote")? {
            KrCommand::Set { ports, opts } => {
                assert_eq!(ports, PortList::Ports(vec![0, 1]));
                assert!(opts.adv_10g && opts.training && opts.no_remote);
                assert!(!opts.all && !opts.disable);
            }
            cmd => panic!("unexpected command: {cmd:?}"),
        }
        match KrCommand::parse_line("debug all --irq --state-machine")? {
            KrCommand::Debug { ports, opts } => {
                assert_eq!(ports, PortList::All);
                assert!(opts.irq && opts.state_machine && !opts.halt);
            }
            cmd => panic!("unexpected command: {cmd:?}"),
        }
        assert!(matches!(
            KrCommand::parse_line("fec 2 --rs-fec")?,
            KrCommand::Fec {
                r_fec: false,
                rs_fec: true,
                ..
            }
        ));
        assert!(KrCommand::parse_line("set").is_err());
        assert!(KrCommand::parse_line("set 1 --bogus").is_err());
        assert!(KrCommand::parse_line("reboot 1").is_err());
        Ok(())
    }

    #[test]
    fn test_execute() -> anyhow::Result<()> {
        let sup = stub_supervisor(4, 16);
        let run = |line: &str| KrCommand::parse_line(line).unwrap().execute(&sup);

        assert_eq!(run("set 3 --all")?, "");
        assert_eq!(
            run("show 3")?,
            "Port: 3\n  KR aneg: Enabled\n  KR training: Enabled\n"
        );
        assert_eq!(run("show all")?.matches("Port:").count(), 4);
        assert_eq!(run("fec 3 --r-fec")?, "Port 3: Enabled R-FEC\n");
        assert!(matches!(run("fec 3 --r-fec --rs-fec"), Err(KrError::Invalid(_))));
        assert!(matches!(run("show 9"), Err(KrError::NoSuchPort(9))));
        assert!(run("status 3")?.starts_with("Port 3\n"));
        Ok(())
    }
}
