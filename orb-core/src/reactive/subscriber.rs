//! Subscriber identity and subscription handles.
//!
//! Every handler registered on a [`Notifier`](super::Notifier) gets a
//! [`SubscriberId`] and is represented to its owner by a [`Subscription`].
//! The subscription is the disposer: dropping it or calling
//! [`Subscription::dispose`] removes the handler.

use std::cell::Cell;
use std::fmt;
use std::rc::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a notifier subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// IDs are process-wide, so two notifiers never hand out the same one.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Something a subscription can be detached from.
///
/// Implemented by the notifier internals so that `Subscription` does not need
/// to carry the notifier's payload type.
pub(crate) trait Detach {
    fn detach(&self, id: SubscriberId);
}

/// Handle to a registered notifier handler.
///
/// Dropping the handle unsubscribes. Use [`forget`](Subscription::forget) to
/// keep the handler registered for as long as the notifier lives.
#[must_use = "dropping a Subscription immediately unsubscribes its handler"]
pub struct Subscription {
    id: SubscriberId,
    notifier: Weak<dyn Detach>,
    /// Cleared once disposed or forgotten.
    armed: Cell<bool>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, notifier: Weak<dyn Detach>) -> Self {
        Self {
            id,
            notifier,
            armed: Cell::new(true),
        }
    }

    /// The ID of the subscribed handler.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Whether the handler is still registered through this handle.
    pub fn is_active(&self) -> bool {
        self.armed.get() && self.notifier.strong_count() > 0
    }

    /// Remove the handler. Calling this more than once is a no-op.
    ///
    /// Safe to call from inside a broadcast of the same notifier: the
    /// in-flight broadcast keeps delivering to the other handlers.
    pub fn dispose(&self) {
        if !self.armed.replace(false) {
            return;
        }
        if let Some(notifier) = self.notifier.upgrade() {
            notifier.detach(self.id);
        }
    }

    /// Keep the handler registered without holding on to this handle.
    pub fn forget(self) {
        self.armed.set(false);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        detached: RefCell<Vec<SubscriberId>>,
    }

    impl Detach for Recorder {
        fn detach(&self, id: SubscriberId) {
            self.detached.borrow_mut().push(id);
        }
    }

    fn subscription_on(recorder: &Rc<Recorder>) -> Subscription {
        let weak: Weak<dyn Detach> = Rc::downgrade(&(recorder.clone() as Rc<dyn Detach>));
        Subscription::new(SubscriberId::new(), weak)
    }

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn dispose_is_idempotent() {
        let recorder = Rc::new(Recorder::default());
        let sub = subscription_on(&recorder);
        let id = sub.id();

        sub.dispose();
        sub.dispose();
        drop(sub);

        assert_eq!(*recorder.detached.borrow(), vec![id]);
    }

    #[test]
    fn drop_disposes() {
        let recorder = Rc::new(Recorder::default());
        let sub = subscription_on(&recorder);
        assert!(sub.is_active());

        drop(sub);
        assert_eq!(recorder.detached.borrow().len(), 1);
    }

    #[test]
    fn forget_keeps_handler() {
        let recorder = Rc::new(Recorder::default());
        subscription_on(&recorder).forget();
        assert!(recorder.detached.borrow().is_empty());
    }

    #[test]
    fn inactive_once_notifier_is_gone() {
        let recorder = Rc::new(Recorder::default());
        let sub = subscription_on(&recorder);
        drop(recorder);

        assert!(!sub.is_active());
        sub.dispose();
    }
}
