//! # Interrupt Manager (C1)
//!
//! A process-wide LIFO stack of per-agent interrupt contexts. The *innermost* active agent
//! frame is the only one that ever receives an operator cancellation (spec §4.2): a parent
//! suspended while its child runs is untouched by the operator's interrupt key until the
//! child's frame has been popped.
//!
//! Modeled as a module-level singleton rather than passed explicitly down the call chain,
//! the way spec §9 suggests for languages where a single addressable delivery point is
//! convenient. The stack is guarded by a `std::sync::Mutex`; correctness does not depend on
//! the lock (the single cooperative driver per process already serializes frame
//! transitions — see spec §5), it is only there so the type is `Sync` for the singleton.

use std::sync::{Mutex, OnceLock};

use log::debug;
use tokio_util::sync::CancellationToken;

/// Whether an interrupt should be treated as a redirection (soft) or a termination (hard).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptKind {
    /// First interrupt in a turn: cancel the current stream/tool, but let the agent loop
    /// treat it as an operator redirection rather than a termination.
    SingleInterrupt,
    /// Second interrupt within the same turn (or an explicit hard abort): the agent
    /// terminates with `Aborted`.
    DoubleInterrupt,
}

struct InterruptContext {
    controller: Option<CancellationToken>,
    is_hard: bool,
}

impl InterruptContext {
    fn fresh() -> Self {
        Self {
            controller: None,
            is_hard: false,
        }
    }
}

fn stack() -> &'static Mutex<Vec<InterruptContext>> {
    static STACK: OnceLock<Mutex<Vec<InterruptContext>>> = OnceLock::new();
    STACK.get_or_init(|| Mutex::new(Vec::new()))
}

/// Push a fresh interrupt frame for a newly-started agent invocation.
pub fn start_agent_session() {
    let mut stack = stack().lock().expect("interrupt stack poisoned");
    stack.push(InterruptContext::fresh());
    debug!("interrupt manager: pushed frame, depth={}", stack.len());
}

/// Pop the innermost frame. Must be called exactly once per `start_agent_session`, on
/// every exit path (return or throw) — see [`crate::boundary::InvocationBoundary`].
pub fn end_agent_session() {
    let mut stack = stack().lock().expect("interrupt stack poisoned");
    stack.pop();
    debug!("interrupt manager: popped frame, depth={}", stack.len());
}

/// Replace the current frame's cancellation handle for the turn about to start, and reset
/// its hardness flag (a new turn starts soft until the operator says otherwise).
pub fn set_current_turn_controller(handle: CancellationToken) {
    let mut stack = stack().lock().expect("interrupt stack poisoned");
    if let Some(frame) = stack.last_mut() {
        frame.controller = Some(handle);
        frame.is_hard = false;
    }
}

/// Set the hardness of the *next* cancellation on the current frame. Must be called before
/// [`abort_current`] so classification is race-free (spec §4.2, §9): the host's operator-key
/// dispatcher is expected to serialize "count this press" and "set hardness" as one step.
pub fn set_hard_abort(hard: bool) {
    let mut stack = stack().lock().expect("interrupt stack poisoned");
    if let Some(frame) = stack.last_mut() {
        frame.is_hard = hard;
    }
}

/// Inspect whether the current frame's next cancellation is hard.
pub fn is_current_interrupt_hard() -> bool {
    let stack = stack().lock().expect("interrupt stack poisoned");
    stack.last().map(|f| f.is_hard).unwrap_or(false)
}

/// Cancel the current frame's turn handle. Returns `None` if there is no active frame or no
/// controller has been installed yet (nothing to cancel).
pub fn abort_current() -> Option<InterruptKind> {
    let stack = stack().lock().expect("interrupt stack poisoned");
    let frame = stack.last()?;
    let controller = frame.controller.clone()?;
    let kind = if frame.is_hard {
        InterruptKind::DoubleInterrupt
    } else {
        InterruptKind::SingleInterrupt
    };
    debug!("interrupt manager: abort_current classified as {:?}", kind);
    controller.cancel();
    Some(kind)
}

/// Current stack depth, used by [`crate::boundary::InvocationBoundary`] to cap recursive
/// self-delegation (spec §9 open question; capped at [`MAX_NESTING_DEPTH`]).
pub fn depth() -> usize {
    stack().lock().expect("interrupt stack poisoned").len()
}

/// Reference cap on nested agent delegation (spec §9 open question decision, see DESIGN.md).
pub const MAX_NESTING_DEPTH: usize = 4;


#[cfg(test)]
mod tests {
    use super::*;
    use serial_test_helper::serial;

    // Guard module-level singleton tests from running concurrently with each other; the
    // crate's own test binary is the only consumer of this process, but cargo may still run
    // test functions on multiple threads within it.
    mod serial_test_helper {
        pub use crate::interrupt::test_support::serial;
    }

    fn reset() {
        while stack().lock().expect("interrupt stack poisoned").pop().is_some() {}
    }

    #[test]
    fn push_pop_restores_depth() {
        let _guard = serial();
        reset();
        assert_eq!(depth(), 0);
        start_agent_session();
        start_agent_session();
        assert_eq!(depth(), 2);
        end_agent_session();
        end_agent_session();
        assert_eq!(depth(), 0);
    }

    #[test]
    fn single_interrupt_is_classified_soft_by_default() {
        let _guard = serial();
        reset();
        start_agent_session();
        set_current_turn_controller(CancellationToken::new());
        let kind = abort_current();
        assert_eq!(kind, Some(InterruptKind::SingleInterrupt));
        end_agent_session();
    }

    #[test]
    fn hard_flag_escalates_classification() {
        let _guard = serial();
        reset();
        start_agent_session();
        set_current_turn_controller(CancellationToken::new());
        set_hard_abort(true);
        assert!(is_current_interrupt_hard());
        let kind = abort_current();
        assert_eq!(kind, Some(InterruptKind::DoubleInterrupt));
        end_agent_session();
    }

    #[test]
    fn only_innermost_frame_is_cancelled() {
        let _guard = serial();
        reset();
        start_agent_session(); // parent
        let parent_token = CancellationToken::new();
        set_current_turn_controller(parent_token.clone());

        start_agent_session(); // child
        let child_token = CancellationToken::new();
        set_current_turn_controller(child_token.clone());

        abort_current();

        assert!(child_token.is_cancelled());
        assert!(!parent_token.is_cancelled());

        end_agent_session();
        end_agent_session();
    }

    #[test]
    fn new_turn_resets_hardness() {
        let _guard = serial();
        reset();
        start_agent_session();
        set_current_turn_controller(CancellationToken::new());
        set_hard_abort(true);
        assert!(is_current_interrupt_hard());

        set_current_turn_controller(CancellationToken::new());
        assert!(!is_current_interrupt_hard());
        end_agent_session();
    }

    #[test]
    fn abort_with_no_controller_returns_none() {
        let _guard = serial();
        reset();
        start_agent_session();
        assert_eq!(abort_current(), None);
        end_agent_session();
    }
}
