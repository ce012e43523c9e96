//! Component-lifecycle notifications.
//!
//! A [`Signal`] holds an ordered list of listener closures and calls every one of them
//! whenever [`Signal::publish`] runs. [`Sink`] is the handle client code uses to
//! connect or disconnect a listener without holding the signal itself — this is what lets
//! a group wire up its maintenance callbacks on a storage it does not own.
//!
//! Listener closures are plain boxed `FnMut`, which in this port stands in for what the
//! source represents as a tagged union of "free function pointer" vs. "context pointer
//! plus trampoline": a free function and a capturing closure both coerce into the same
//! `Box<dyn FnMut(Args)>`, so there is no second variant to keep in sync.

use std::cell::RefCell;
use std::rc::Rc;

type Delegate<Args> = Box<dyn FnMut(Args)>;

struct Connection<Args> {
    id: u64,
    delegate: Delegate<Args>,
}

struct Inner<Args> {
    connections: Vec<Connection<Args>>,
    next_id: u64,
}

impl<Args> Default for Inner<Args> {
    fn default() -> Self {
        Self {
            connections: Vec::new(),
            next_id: 0,
        }
    }
}

/// An ordered, publishable list of listener closures.
///
/// Cloning a `Signal` clones the handle, not the listener list: all clones observe the
/// same connections, which is what lets [`Signal::sink`] be called repeatedly (once per
/// interested group) while [`Signal::publish`] is driven from the owning storage.
pub struct Signal<Args> {
    inner: Rc<RefCell<Inner<Args>>>,
}

impl<Args> Clone for Signal<Args> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<Args> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: Copy> Signal<Args> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner::default())),
        }
    }

    /// A [`Sink`] for connecting/disconnecting listeners on this signal.
    pub fn sink(&self) -> Sink<Args> {
        Sink {
            inner: Rc::clone(&self.inner),
        }
    }

    /// Invoke every connected listener, in connection order, with a copy of `args`.
    ///
    /// # Panics
    /// Panics if called re-entrantly from within one of its own listeners: a listener
    /// that tries to publish the same signal again while it is already publishing would
    /// observe (and could corrupt) a half-iterated connection list.
    pub fn publish(&self, args: Args) {
        let mut inner = self
            .inner
            .try_borrow_mut()
            .expect("signal published re-entrantly from within one of its own listeners");
        for connection in inner.connections.iter_mut() {
            (connection.delegate)(args);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A connect/disconnect handle for a [`Signal`], the only way client code touches one.
pub struct Sink<Args> {
    inner: Rc<RefCell<Inner<Args>>>,
}

impl<Args> Clone for Sink<Args> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// An opaque handle identifying one connected listener, for later disconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionId(u64);

impl<Args: 'static> Sink<Args> {
    /// Connect a listener at the end of the list.
    pub fn connect<F>(&self, listener: F) -> ConnectionId
    where
        F: FnMut(Args) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.connections.push(Connection {
            id,
            delegate: Box::new(listener),
        });
        ConnectionId(id)
    }

    /// Connect a listener immediately before an existing connection.
    ///
    /// # Panics
    /// Panics if `before` does not name a currently-connected listener.
    pub fn connect_before<F>(&self, before: ConnectionId, listener: F) -> ConnectionId
    where
        F: FnMut(Args) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let position = inner
            .connections
            .iter()
            .position(|c| c.id == before.0)
            .expect("connect_before target is not connected to this signal");
        let id = inner.next_id;
        inner.next_id += 1;
        inner.connections.insert(
            position,
            Connection {
                id,
                delegate: Box::new(listener),
            },
        );
        ConnectionId(id)
    }

    /// Disconnect a listener. No-op if it is already disconnected.
    pub fn disconnect(&self, id: ConnectionId) {
        let mut inner = self.inner.borrow_mut();
        inner.connections.retain(|c| c.id != id.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn publish_invokes_listeners_in_connection_order() {
        // Given
        let signal: Signal<i32> = Signal::new();
        let sink = signal.sink();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let seen_a = Rc::clone(&seen);
        sink.connect(move |v| seen_a.borrow_mut().push(("a", v)));
        let seen_b = Rc::clone(&seen);
        sink.connect(move |v| seen_b.borrow_mut().push(("b", v)));

        // When
        signal.publish(7);

        // Then
        assert_eq!(*seen.borrow(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn connect_before_inserts_ahead_of_target() {
        let signal: Signal<i32> = Signal::new();
        let sink = signal.sink();
        let order = Rc::new(RefCell::new(Vec::new()));

        let order_b = Rc::clone(&order);
        let b = sink.connect(move |_| order_b.borrow_mut().push("b"));
        let order_a = Rc::clone(&order);
        sink.connect_before(b, move |_| order_a.borrow_mut().push("a"));

        signal.publish(0);

        assert_eq!(*order.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn disconnect_stops_future_notifications() {
        let signal: Signal<i32> = Signal::new();
        let sink = signal.sink();
        let count = Rc::new(Cell::new(0));

        let count_inner = Rc::clone(&count);
        let id = sink.connect(move |_| count_inner.set(count_inner.get() + 1));

        signal.publish(0);
        sink.disconnect(id);
        signal.publish(0);

        assert_eq!(count.get(), 1);
    }

    #[test]
    fn disconnecting_twice_is_a_no_op() {
        let signal: Signal<i32> = Signal::new();
        let sink = signal.sink();
        let id = sink.connect(|_| {});

        sink.disconnect(id);
        sink.disconnect(id); // must not panic
        assert!(signal.is_empty());
    }

    #[test]
    #[should_panic(expected = "re-entrantly")]
    fn republishing_from_within_a_listener_panics() {
        let signal: Signal<i32> = Signal::new();
        let sink = signal.sink();
        let inner_signal = signal.clone();
        sink.connect(move |v| inner_signal.publish(v));

        signal.publish(1);
    }
}
