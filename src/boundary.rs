//! # Invocation Boundary (C10)
//!
//! Bridges a parent agent's delegation into a child [`crate::executor::Executor`] run: owns
//! the interrupt-manager session lifecycle, forwards the child's activity events into the
//! parent's stream, and provides the soft-interrupt rendezvous (spec §4.10, §9).

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::activity::{ActivityReceiver, ActivitySink};
use crate::error::{Error, Result};
use crate::interrupt::{self, MAX_NESTING_DEPTH};

/// Owns one child agent's interrupt-manager session. `start_agent_session` runs in
/// [`InvocationBoundary::enter`]; `end_agent_session` always runs in `Drop`, so every return
/// or unwind path pops exactly the frame it pushed (spec §8 invariant 3).
pub struct InvocationBoundary {
    _private: (),
}

impl InvocationBoundary {
    /// Enter a new child invocation. Rejects recursive self-delegation past
    /// [`MAX_NESTING_DEPTH`] (spec §9 open question, decision recorded in DESIGN.md) before
    /// pushing a frame.
    pub fn enter() -> Result<Self> {
        if interrupt::depth() >= MAX_NESTING_DEPTH {
            return Err(Error::config(format!(
                "nesting depth limit ({MAX_NESTING_DEPTH}) exceeded; refusing further delegation"
            )));
        }
        interrupt::start_agent_session();
        Ok(Self { _private: () })
    }
}

impl Drop for InvocationBoundary {
    fn drop(&mut self) {
        interrupt::end_agent_session();
    }
}

/// Forward every event from `child_rx` into `parent_sink` until the child's sender is
/// dropped (the run has ended). Spawned as a background task for the duration of a child
/// run; the handle may be awaited to ensure forwarding has drained before the boundary exits.
pub fn forward_activity(mut child_rx: ActivityReceiver, parent_sink: ActivitySink) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = child_rx.recv().await {
            parent_sink.emit(event);
        }
    })
}

/// The UI-facing half of the soft-interrupt rendezvous: resolves the child's pending
/// `AWAITING_SOFT_INTERRUPT_INPUT` wait with either operator text (continue) or nothing
/// (abort). Consuming `self` enforces "resolved at most once".
pub struct SoftInterruptResolver {
    tx: oneshot::Sender<Option<String>>,
}

impl SoftInterruptResolver {
    pub fn resolve(self, operator_text: Option<String>) {
        let _ = self.tx.send(operator_text);
    }
}

/// The executor-facing half: awaited only after a `SingleInterrupt` is observed. Because the
/// underlying channel buffers one value, a UI that already called
/// [`SoftInterruptResolver::resolve`] before the executor starts waiting (the "pre-emptive"
/// case from spec §9) is handled transparently — `await_operator_text` returns immediately.
pub struct SoftInterruptRendezvous {
    rx: oneshot::Receiver<Option<String>>,
}

impl SoftInterruptRendezvous {
    /// Await the operator's decision. A dropped resolver (UI gone) is treated the same as an
    /// explicit abort: `None`.
    pub async fn await_operator_text(self) -> Option<String> {
        self.rx.await.unwrap_or(None)
    }
}

/// Construct a fresh rendezvous pair for one `AWAITING_SOFT_INTERRUPT_INPUT` episode.
pub fn soft_interrupt_channel() -> (SoftInterruptResolver, SoftInterruptRendezvous) {
    let (tx, rx) = oneshot::channel();
    (SoftInterruptResolver { tx }, SoftInterruptRendezvous { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityEvent;
    use crate::interrupt::test_support::serial;

    #[test]
    fn enter_and_drop_restore_depth() {
        let _g = serial();
        while interrupt::depth() > 0 {
            interrupt::end_agent_session();
        }
        let depth_before = interrupt::depth();
        {
            let _boundary = InvocationBoundary::enter().unwrap();
            assert_eq!(interrupt::depth(), depth_before + 1);
        }
        assert_eq!(interrupt::depth(), depth_before);
    }

    #[test]
    fn enter_rejects_past_nesting_cap() {
        let _g = serial();
        while interrupt::depth() > 0 {
            interrupt::end_agent_session();
        }
        let mut boundaries = Vec::new();
        for _ in 0..MAX_NESTING_DEPTH {
            boundaries.push(InvocationBoundary::enter().unwrap());
        }
        assert!(InvocationBoundary::enter().is_err());
        drop(boundaries);
    }

    #[tokio::test]
    async fn pre_emptive_resolve_is_observed_without_blocking() {
        let (resolver, rendezvous) = soft_interrupt_channel();
        resolver.resolve(Some("focus on tests instead".to_string()));
        let text = rendezvous.await_operator_text().await;
        assert_eq!(text.as_deref(), Some("focus on tests instead"));
    }

    #[tokio::test]
    async fn dropped_resolver_is_treated_as_abort() {
        let (resolver, rendezvous) = soft_interrupt_channel();
        drop(resolver);
        assert_eq!(rendezvous.await_operator_text().await, None);
    }

    #[tokio::test]
    async fn activity_forwards_from_child_to_parent() {
        let (child_sink, child_rx) = crate::activity::channel();
        let (parent_sink, mut parent_rx) = crate::activity::channel();
        let handle = forward_activity(child_rx, parent_sink);

        child_sink.emit(ActivityEvent::user_message("child", "hi"));
        drop(child_sink);
        handle.await.unwrap();

        let event = parent_rx.recv().await.unwrap();
        assert_eq!(event.agent_name, "child");
    }
}
