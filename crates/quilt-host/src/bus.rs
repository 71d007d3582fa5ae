//! Cross-context message delivery capability.
//!
//! Two browsing contexts (the editor and a detached settings panel) share no
//! memory; the only thing that moves between them is a string payload on a
//! broadcast channel. [`MessageBus`] is that seam. [`LoopbackBus`] links two
//! endpoints inside one process for tests and embedded settings UIs:
//! messages queue in the peer's inbox and are delivered when the receiving
//! side pumps, which models the asynchronous delivery of a real channel.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

/// One endpoint of a cross-context message channel.
pub trait MessageBus {
    /// Posts a message towards the peer context. Delivery is asynchronous;
    /// the peer sees the message on its next pump.
    fn post(&self, message: &str);

    /// Registers a handler invoked for every delivered message, in
    /// registration order.
    fn on_message(&self, handler: Box<dyn FnMut(&str)>);
}

/// In-process [`MessageBus`] pair with explicitly pumped delivery.
///
/// # Example
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use quilt_host::bus::{LoopbackBus, MessageBus};
///
/// let (a, b) = LoopbackBus::pair();
/// let received = Rc::new(RefCell::new(Vec::new()));
/// let sink = Rc::clone(&received);
/// b.on_message(Box::new(move |message| {
///     sink.borrow_mut().push(message.to_owned());
/// }));
///
/// a.post("hello");
/// assert!(received.borrow().is_empty());
/// b.pump();
/// assert_eq!(received.borrow().as_slice(), ["hello".to_owned()]);
/// ```
#[derive(Default)]
pub struct LoopbackBus {
    peer: RefCell<Weak<LoopbackBus>>,
    inbox: RefCell<VecDeque<String>>,
    handlers: RefCell<Vec<Box<dyn FnMut(&str)>>>,
}

impl LoopbackBus {
    /// Creates two linked endpoints. Messages posted on one are delivered on
    /// the other.
    #[must_use]
    pub fn pair() -> (Rc<Self>, Rc<Self>) {
        let a = Rc::new(Self::default());
        let b = Rc::new(Self::default());
        *a.peer.borrow_mut() = Rc::downgrade(&b);
        *b.peer.borrow_mut() = Rc::downgrade(&a);
        (a, b)
    }

    /// Delivers all queued messages to this endpoint's handlers and returns
    /// how many were delivered.
    ///
    /// Handlers must not pump the same endpoint re-entrantly; messages they
    /// post are queued for the next pump.
    pub fn pump(&self) -> usize {
        let queued: Vec<String> = self.inbox.borrow_mut().drain(..).collect();
        if queued.is_empty() {
            return 0;
        }
        // Take the handler list so a handler registering another handler
        // does not trip the RefCell; new handlers see later pumps only.
        let mut handlers = self.handlers.take();
        for message in &queued {
            for handler in &mut handlers {
                handler(message);
            }
        }
        let added = self.handlers.take();
        handlers.extend(added);
        self.handlers.replace(handlers);
        queued.len()
    }

    /// Returns how many messages are waiting to be pumped.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inbox.borrow().len()
    }
}

impl MessageBus for LoopbackBus {
    fn post(&self, message: &str) {
        if let Some(peer) = self.peer.borrow().upgrade() {
            peer.inbox.borrow_mut().push_back(message.to_owned());
        }
    }

    fn on_message(&self, handler: Box<dyn FnMut(&str)>) {
        self.handlers.borrow_mut().push(handler);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn collector(bus: &LoopbackBus) -> Rc<RefCell<Vec<String>>> {
        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&received);
        bus.on_message(Box::new(move |message| {
            sink.borrow_mut().push(message.to_owned());
        }));
        received
    }

    #[test]
    fn delivery_waits_for_pump() {
        let (a, b) = LoopbackBus::pair();
        let received = collector(&b);
        a.post("one");
        a.post("two");
        assert_eq!(b.queued(), 2);
        assert!(received.borrow().is_empty());
        assert_eq!(b.pump(), 2);
        assert_eq!(
            received.borrow().as_slice(),
            ["one".to_owned(), "two".to_owned()]
        );
        assert_eq!(b.pump(), 0);
    }

    #[test]
    fn both_directions_are_independent() {
        let (a, b) = LoopbackBus::pair();
        let at_a = collector(&a);
        let at_b = collector(&b);
        a.post("to b");
        b.post("to a");
        a.pump();
        b.pump();
        assert_eq!(at_a.borrow().as_slice(), ["to a".to_owned()]);
        assert_eq!(at_b.borrow().as_slice(), ["to b".to_owned()]);
    }

    #[test]
    fn replies_from_handlers_queue_for_next_pump() {
        let (a, b) = LoopbackBus::pair();
        let replier = Rc::clone(&b);
        b.on_message(Box::new(move |_| replier.post("ack")));
        let received = collector(&a);
        a.post("ping");
        b.pump();
        assert!(received.borrow().is_empty());
        a.pump();
        assert_eq!(received.borrow().as_slice(), ["ack".to_owned()]);
    }

    #[test]
    fn post_without_peer_is_dropped() {
        let bus = LoopbackBus::default();
        bus.post("nowhere");
        assert_eq!(bus.pump(), 0);
    }
}
