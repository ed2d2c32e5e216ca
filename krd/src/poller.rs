// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use slog::debug;
use slog::o;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use aal::KrOps;

use crate::supervisor::KrSupervisor;
use crate::types::KrError;
use crate::types::KrResult;

pub enum PollTrigger {
    Timeout,
    Quit,
}

/// Drives the supervisor's fast-poll tick from a tokio task.
pub struct KrPoller {
    tx: mpsc::UnboundedSender<PollTrigger>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<PollTrigger>>>,
}

impl KrPoller {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        KrPoller {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Start ticking every `interval`.  A poller can only be run once.
    pub fn run<H>(
        &self,
        sup: Arc<KrSupervisor<H>>,
        interval: Duration,
    ) -> KrResult<JoinHandle<()>>
    where
        H: KrOps + Send + Sync + 'static,
    {
        let rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| KrError::Other("poller is already running".into()))?;
        Ok(tokio::task::spawn(poller_task(sup, rx, interval)))
    }

    pub fn quit(&self) {
        _ = self.tx.send(PollTrigger::Quit);
    }
}

impl Default for KrPoller {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_for_trigger(
    rx: &mut mpsc::UnboundedReceiver<PollTrigger>,
    timeout: Instant,
) -> PollTrigger {
    tokio::task::yield_now().await;
    let now = Instant::now();
    let delay = if timeout <= now {
        return PollTrigger::Timeout;
    } else {
        timeout - now
    };

    tokio::select! {
        // A dropped sender means nobody is left to ask us to stop.
        trigger = rx.recv() => trigger.unwrap_or(PollTrigger::Quit),
        _ = tokio::time::sleep(delay) => PollTrigger::Timeout,
    }
}

async fn poller_task<H: KrOps>(
    sup: Arc<KrSupervisor<H>>,
    mut rx: mpsc::UnboundedReceiver<PollTrigger>,
    interval: Duration,
) {
    let log = sup.log.new(o!("unit" => "kr-poller"));
    let mut next_poll = Instant::now();

    loop {
        if Instant::now() >= next_poll {
            sup.poll();
            next_poll = Instant::now() + interval;
        }
        match wait_for_trigger(&mut rx, next_poll).await {
            PollTrigger::Timeout => {}
            PollTrigger::Quit => {
                debug!(log, "quit");
                break;
            }
        }
    }
}
