//! Global single-flight execution gate
//!
//! One run holds the slot at a time; everyone else waits in FIFO order of
//! submission. Submission ([`ExecutionGate::enqueue`]) is synchronous, so
//! queue order is exactly the order in which runs were requested.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::{oneshot, watch};

use devdeck_core::prelude::*;

/// Read-only view of the gate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GateSnapshot {
    /// Alias of the run holding the slot
    pub active: Option<String>,
    /// Aliases waiting, next first
    pub waiting: Vec<String>,
}

impl GateSnapshot {
    pub fn is_idle(&self) -> bool {
        self.active.is_none() && self.waiting.is_empty()
    }

    pub fn queue_len(&self) -> usize {
        self.waiting.len()
    }
}

#[derive(Debug)]
enum SlotStatus {
    Idle,
    Running { ticket: u64, alias: String },
}

#[derive(Debug)]
struct Waiter {
    ticket: u64,
    alias: String,
    wake: oneshot::Sender<()>,
}

#[derive(Debug)]
struct SlotState {
    status: SlotStatus,
    queue: VecDeque<Waiter>,
    next_ticket: u64,
}

impl SlotState {
    fn snapshot(&self) -> GateSnapshot {
        GateSnapshot {
            active: match &self.status {
                SlotStatus::Idle => None,
                SlotStatus::Running { alias, .. } => Some(alias.clone()),
            },
            waiting: self.queue.iter().map(|w| w.alias.clone()).collect(),
        }
    }

    fn is_running(&self, ticket: u64) -> bool {
        matches!(self.status, SlotStatus::Running { ticket: t, .. } if t == ticket)
    }

    /// Hand the slot to the next waiter that is still listening
    fn advance(&mut self) {
        self.status = SlotStatus::Idle;
        while let Some(waiter) = self.queue.pop_front() {
            self.status = SlotStatus::Running {
                ticket: waiter.ticket,
                alias: waiter.alias,
            };
            if waiter.wake.send(()).is_ok() {
                return;
            }
            self.status = SlotStatus::Idle;
        }
    }
}

/// FIFO gate with a single permit
#[derive(Debug, Clone)]
pub struct ExecutionGate {
    state: Arc<Mutex<SlotState>>,
    snapshot_tx: Arc<watch::Sender<GateSnapshot>>,
}

impl Default for ExecutionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionGate {
    pub fn new() -> Self {
        let (snapshot_tx, _) = watch::channel(GateSnapshot::default());
        Self {
            state: Arc::new(Mutex::new(SlotState {
                status: SlotStatus::Idle,
                queue: VecDeque::new(),
                next_ticket: 0,
            })),
            snapshot_tx: Arc::new(snapshot_tx),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &SlotState) {
        self.snapshot_tx.send_replace(state.snapshot());
    }

    /// Take a place in line
    ///
    /// The ticket is granted immediately when the gate is idle; otherwise
    /// [`GateTicket::acquire`] waits for every earlier ticket to finish.
    pub fn enqueue(&self, alias: &str) -> GateTicket {
        let mut state = self.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        let wake_rx = if matches!(state.status, SlotStatus::Idle) && state.queue.is_empty() {
            state.status = SlotStatus::Running {
                ticket,
                alias: alias.to_string(),
            };
            None
        } else {
            let (wake, wake_rx) = oneshot::channel();
            state.queue.push_back(Waiter {
                ticket,
                alias: alias.to_string(),
                wake,
            });
            debug!("'{}' queued behind {} run(s)", alias, state.queue.len());
            Some(wake_rx)
        };
        self.publish(&state);

        GateTicket {
            gate: self.clone(),
            ticket,
            wake_rx,
            consumed: false,
        }
    }

    pub fn snapshot(&self) -> GateSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<GateSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Give up a ticket that never became a permit
    fn abandon(&self, ticket: u64) {
        let mut state = self.lock();
        if let Some(pos) = state.queue.iter().position(|w| w.ticket == ticket) {
            state.queue.remove(pos);
        } else if state.is_running(ticket) {
            // Granted while the acquire future was being dropped
            state.advance();
        } else {
            return;
        }
        self.publish(&state);
    }

    fn release(&self, ticket: u64) {
        let mut state = self.lock();
        if !state.is_running(ticket) {
            return;
        }
        state.advance();
        self.publish(&state);
    }
}

/// A place in line; dropping it leaves the queue
#[derive(Debug)]
pub struct GateTicket {
    gate: ExecutionGate,
    ticket: u64,
    wake_rx: Option<oneshot::Receiver<()>>,
    consumed: bool,
}

impl GateTicket {
    /// Wait for the slot
    ///
    /// Cancel-safe: dropping the future gives the place (or the slot) up.
    pub async fn acquire(mut self) -> GatePermit {
        if let Some(wake_rx) = self.wake_rx.take() {
            // The sender is only dropped unfired when the waiter was removed,
            // which cannot happen while this ticket is alive.
            let _ = wake_rx.await;
        }
        self.consumed = true;
        GatePermit {
            gate: self.gate.clone(),
            ticket: self.ticket,
        }
    }
}

impl Drop for GateTicket {
    fn drop(&mut self) {
        if !self.consumed {
            self.gate.abandon(self.ticket);
        }
    }
}

/// Exclusive right to execute; dropping it wakes the next waiter
#[derive(Debug)]
pub struct GatePermit {
    gate: ExecutionGate,
    ticket: u64,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.release(self.ticket);
    }
}
