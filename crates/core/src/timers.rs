//! Purpose-keyed timers feeding the controller inbox.
//!
//! At most one timer exists per [`TimerKind`]; starting a timer of a kind
//! first aborts the previous one.

use crate::controller::ControllerInput;
use std::{collections::HashMap, time::Duration};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    KeepAlive,
    ReminderPoll,
    DelayPoll,
    Reconnect,
}

#[derive(Debug, Default)]
pub struct Timers {
    slots: HashMap<TimerKind, JoinHandle<()>>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `ControllerInput::Tick(kind)` every `period`, first tick after one period.
    pub fn start_interval(
        &mut self,
        kind: TimerKind,
        period: Duration,
        tx: mpsc::Sender<ControllerInput>,
    ) {
        self.cancel(kind);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(ControllerInput::Tick(kind)).await.is_err() {
                    break;
                }
            }
        });
        self.slots.insert(kind, handle);
    }

    /// Sends `input` once after `delay`.
    pub fn start_once(
        &mut self,
        kind: TimerKind,
        delay: Duration,
        input: ControllerInput,
        tx: mpsc::Sender<ControllerInput>,
    ) {
        self.cancel(kind);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(input).await;
        });
        self.slots.insert(kind, handle);
    }

    /// Returns whether a timer of this kind was present.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        match self.slots.remove(&kind) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.slots.drain() {
            handle.abort();
        }
    }

    pub fn is_active(&self, kind: TimerKind) -> bool {
        self.slots
            .get(&kind)
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn active_count(&self) -> usize {
        self.slots.values().filter(|h| !h.is_finished()).count()
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
