//! Fault injection hooks.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Fault applied to one List call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFault {
    /// Serve normally.
    None,
    /// Fail the stream before sending anything.
    Fail,
    /// Accept the call and never send anything.
    Stall,
}

/// Injects failures into the resource server.
///
/// Faults are opt-in and explicit; no resource name has special meaning
/// unless configured with [`FaultInjector::abort_on_name`].
pub struct FaultInjector {
    unavailable: AtomicBool,
    fail_lists: AtomicU32,
    stall_lists: AtomicU32,
    abort_name: RwLock<Option<String>>,
    watch_abort: Mutex<CancellationToken>,
}

impl FaultInjector {
    /// Creates an injector with no faults armed.
    pub fn new() -> Self {
        Self {
            unavailable: AtomicBool::new(false),
            fail_lists: AtomicU32::new(0),
            stall_lists: AtomicU32::new(0),
            abort_name: RwLock::new(None),
            watch_abort: Mutex::new(CancellationToken::new()),
        }
    }

    /// Makes new calls fail with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        info!(unavailable, "fault injection: availability changed");
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns true if new calls are refused.
    pub fn is_unavailable(&self) -> bool {
        self.unavailable.load(Ordering::SeqCst)
    }

    /// Fails the next `count` List calls.
    pub fn fail_next_lists(&self, count: u32) {
        self.fail_lists.store(count, Ordering::SeqCst);
    }

    /// Stalls the next `count` List calls.
    pub fn stall_next_lists(&self, count: u32) {
        self.stall_lists.store(count, Ordering::SeqCst);
    }

    /// Consumes one armed List fault, if any. Failures take precedence.
    pub fn take_list_fault(&self) -> ListFault {
        if take_one(&self.fail_lists) {
            ListFault::Fail
        } else if take_one(&self.stall_lists) {
            ListFault::Stall
        } else {
            ListFault::None
        }
    }

    /// Aborts every currently open Watch with a fault.
    pub fn abort_watches(&self) {
        let previous = std::mem::replace(&mut *self.watch_abort.lock(), CancellationToken::new());
        info!("fault injection: aborting open watches");
        previous.cancel();
    }

    /// Returns the token an open Watch listens on.
    pub fn watch_abort_token(&self) -> CancellationToken {
        self.watch_abort.lock().clone()
    }

    /// Aborts any stream about to deliver a resource with this name.
    pub fn abort_on_name(&self, name: Option<String>) {
        *self.abort_name.write() = name;
    }

    /// Returns true if delivering a resource named `name` must abort.
    pub fn should_abort(&self, name: &str) -> bool {
        self.abort_name.read().as_deref() == Some(name)
    }

    /// Disarms every fault.
    pub fn clear(&self) {
        self.set_unavailable(false);
        self.fail_next_lists(0);
        self.stall_next_lists(0);
        self.abort_on_name(None);
    }
}

impl Default for FaultInjector {
    fn default() -> Self {
        Self::new()
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_faults_are_consumed() {
        let faults = FaultInjector::new();
        faults.fail_next_lists(1);
        faults.stall_next_lists(2);

        assert_eq!(faults.take_list_fault(), ListFault::Fail);
        assert_eq!(faults.take_list_fault(), ListFault::Stall);
        assert_eq!(faults.take_list_fault(), ListFault::Stall);
        assert_eq!(faults.take_list_fault(), ListFault::None);
    }

    #[test]
    fn abort_watches_cancels_only_existing_tokens() {
        let faults = FaultInjector::new();
        let open = faults.watch_abort_token();

        faults.abort_watches();
        assert!(open.is_cancelled());
        assert!(!faults.watch_abort_token().is_cancelled());
    }

    #[test]
    fn abort_on_name() {
        let faults = FaultInjector::new();
        assert!(!faults.should_abort("vpc1"));

        faults.abort_on_name(Some("vpc1".into()));
        assert!(faults.should_abort("vpc1"));
        assert!(!faults.should_abort("vpc2"));

        faults.clear();
        assert!(!faults.should_abort("vpc1"));
    }

    #[test]
    fn availability() {
        let faults = FaultInjector::new();
        assert!(!faults.is_unavailable());
        faults.set_unavailable(true);
        assert!(faults.is_unavailable());
    }
}
