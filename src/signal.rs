//! Multicast notification primitives for the task lifecycle.
//!
//! - [`Signal`]: an ordered list of subscribers invoked synchronously on
//!   [`Signal::send`].
//! - [`Trigger`]: the set of signals fired unconditionally when a task
//!   finishes an invocation, whatever the outcome.
//! - [`Gate`]: a one-shot event a successor task blocks on until its
//!   predecessor completes; consuming the wait resets the gate.

use std::sync::{Arc, Condvar, Mutex};

type Subscriber<T> = Box<dyn Fn(&T) + Send + Sync>;

/// An ordered multicast notification.
///
/// `send` invokes every subscriber synchronously, in subscription order, on
/// the calling thread. Subscribers are not isolated from each other: a
/// panicking subscriber unwinds into the caller of `send`.
pub struct Signal<T> {
    receivers: Mutex<Vec<Subscriber<T>>>,
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self {
            receivers: Mutex::new(Vec::new()),
        }
    }

    /// A signal pre-wired to a single subscriber.
    pub fn from_fn(func: impl Fn(&T) + Send + Sync + 'static) -> Self {
        let signal = Self::new();
        signal.connect(func);
        signal
    }

    pub fn connect(&self, func: impl Fn(&T) + Send + Sync + 'static) {
        self.receivers
            .lock()
            .expect("signal subscriber list poisoned")
            .push(Box::new(func));
    }

    pub fn send(&self, value: &T) {
        let receivers = self
            .receivers
            .lock()
            .expect("signal subscriber list poisoned");
        for receiver in receivers.iter() {
            receiver(value);
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.receivers
            .lock()
            .expect("signal subscriber list poisoned")
            .len()
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("receivers", &self.receiver_count())
            .finish()
    }
}

/// The unconditional completion fan-out of a task.
///
/// Signals fire in registration order during the task's finalization phase,
/// regardless of whether the invocation succeeded, failed, or was skipped.
#[derive(Debug, Default)]
pub struct Trigger {
    signals: Mutex<Vec<Arc<Signal<()>>>>,
}

impl Trigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, signal: Arc<Signal<()>>) {
        self.signals
            .lock()
            .expect("trigger signal list poisoned")
            .push(signal);
    }

    pub fn fire(&self) {
        let signals = self.signals.lock().expect("trigger signal list poisoned");
        for signal in signals.iter() {
            signal.send(&());
        }
    }

    pub fn len(&self) -> usize {
        self.signals
            .lock()
            .expect("trigger signal list poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A one-shot gate.
///
/// `wait` blocks the calling thread until the gate is set, then resets it,
/// so one `set` releases exactly one waiter per cycle and the gate can be
/// reused when the predecessor runs again.
#[derive(Debug, Default)]
pub struct Gate {
    set: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        let mut set = self.set.lock().expect("gate poisoned");
        *set = true;
        self.cond.notify_all();
    }

    /// Block until the gate fires, then consume it.
    pub fn wait(&self) {
        let mut set = self.set.lock().expect("gate poisoned");
        while !*set {
            set = self.cond.wait(set).expect("gate poisoned");
        }
        *set = false;
    }

    pub fn is_set(&self) -> bool {
        *self.set.lock().expect("gate poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn signal_invokes_subscribers_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let signal = Signal::new();
        for i in 0..3 {
            let order = order.clone();
            signal.connect(move |_: &()| order.lock().unwrap().push(i));
        }
        signal.send(&());
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn signal_passes_value_to_every_subscriber() {
        let total = Arc::new(AtomicUsize::new(0));
        let signal = Signal::new();
        for _ in 0..2 {
            let total = total.clone();
            signal.connect(move |v: &usize| {
                total.fetch_add(*v, Ordering::SeqCst);
            });
        }
        signal.send(&21);
        assert_eq!(total.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn trigger_fires_all_signals_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let trigger = Trigger::new();
        for i in 0..3 {
            let order = order.clone();
            trigger.add(Arc::new(Signal::from_fn(move |_| {
                order.lock().unwrap().push(i)
            })));
        }
        trigger.fire();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn gate_wait_consumes_the_set() {
        let gate = Gate::new();
        gate.set();
        assert!(gate.is_set());
        gate.wait();
        assert!(!gate.is_set());
    }

    #[test]
    fn gate_releases_blocked_waiter() {
        let gate = Arc::new(Gate::new());
        let waiter = {
            let gate = gate.clone();
            std::thread::spawn(move || gate.wait())
        };
        std::thread::sleep(Duration::from_millis(20));
        gate.set();
        waiter.join().unwrap();
        assert!(!gate.is_set());
    }
}
