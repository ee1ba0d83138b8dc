//! Correlation of outbound calls with their eventual replies.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

use crate::error::{Error, ErrorKind, Result};
use crate::message::{Message, Serial};

/// A continuation invoked by the dispatcher when a pending call completes.
type Callback = Box<dyn FnOnce(Result<Message>) + Send + 'static>;

enum PendingState {
    /// No terminal state reached yet. An optional continuation is invoked
    /// on completion instead of parking a waiter.
    Waiting(Option<Callback>),
    /// The reply arrived. `None` once a waiter has taken it.
    Completed(Option<Message>),
    Cancelled,
    TimedOut,
    Disconnected,
    /// The frame write failed after the entry was registered.
    Failed(io::ErrorKind),
}

impl PendingState {
    fn is_terminal(&self) -> bool {
        !matches!(self, PendingState::Waiting(..))
    }
}

struct PendingEntry {
    serial: Serial,
    deadline: Option<Instant>,
    state: Mutex<PendingState>,
    cond: Condvar,
}

impl PendingEntry {
    /// Move the entry to a terminal state, waking waiters and running the
    /// completion callback.
    ///
    /// A second terminal transition is a no-op; per the exactly-once rule it
    /// is logged and otherwise ignored.
    fn finish(&self, state: PendingState) -> bool {
        let mut guard = self.state.lock().unwrap();

        if guard.is_terminal() {
            tracing::warn!(serial = self.serial.get(), "pending call completed twice");
            return false;
        }

        let callback = match &mut *guard {
            PendingState::Waiting(callback) => callback.take(),
            _ => None,
        };

        if let Some(callback) = callback {
            let result = match state {
                PendingState::Completed(Some(message)) => Ok(message),
                PendingState::Cancelled => Err(Error::new(ErrorKind::Cancelled)),
                PendingState::TimedOut => Err(Error::new(ErrorKind::TimedOut)),
                PendingState::Disconnected => Err(Error::new(ErrorKind::Disconnected)),
                PendingState::Failed(kind) => Err(Error::from(io::Error::from(kind))),
                _ => Err(Error::new(ErrorKind::Cancelled)),
            };

            *guard = PendingState::Completed(None);
            drop(guard);
            callback(result);
        } else {
            *guard = state;
            drop(guard);
        }

        self.cond.notify_all();
        true
    }
}

type EntryMap = Mutex<HashMap<u32, Arc<PendingEntry>>>;

/// The registry binding outbound call serials to their eventual replies.
pub(crate) struct PendingCalls {
    entries: Arc<EntryMap>,
}

impl PendingCalls {
    pub(crate) fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a pending entry for `serial` and return the caller's handle
    /// to it.
    pub(crate) fn insert(&self, serial: Serial, timeout: Option<Duration>) -> PendingCall {
        let entry = Arc::new(PendingEntry {
            serial,
            deadline: timeout.map(|timeout| Instant::now() + timeout),
            state: Mutex::new(PendingState::Waiting(None)),
            cond: Condvar::new(),
        });

        self.entries
            .lock()
            .unwrap()
            .insert(serial.get(), entry.clone());

        PendingCall {
            entry,
            entries: Arc::downgrade(&self.entries),
        }
    }

    fn remove(&self, serial: Serial) -> Option<Arc<PendingEntry>> {
        self.entries.lock().unwrap().remove(&serial.get())
    }

    /// Deliver a reply to the entry registered for `serial`.
    ///
    /// Returns `false` if no such entry exists, in which case the caller
    /// drops the reply.
    pub(crate) fn complete(&self, serial: Serial, message: Message) -> bool {
        let Some(entry) = self.remove(serial) else {
            return false;
        };

        entry.finish(PendingState::Completed(Some(message)));
        true
    }

    /// Cancel the entry registered for `serial`, waking its waiters.
    pub(crate) fn cancel(&self, serial: Serial) {
        if let Some(entry) = self.remove(serial) {
            entry.finish(PendingState::Cancelled);
        }
    }

    /// Fail the entry registered for `serial` after a post-registration
    /// write error.
    pub(crate) fn fail(&self, serial: Serial, kind: io::ErrorKind) {
        if let Some(entry) = self.remove(serial) {
            entry.finish(PendingState::Failed(kind));
        }
    }

    /// Move every registered entry to `Disconnected`, waking all waiters.
    pub(crate) fn disconnect_all(&self) {
        let entries = std::mem::take(&mut *self.entries.lock().unwrap());

        for entry in entries.into_values() {
            entry.finish(PendingState::Disconnected);
        }
    }

    /// Time out every entry whose deadline has passed and return the
    /// earliest deadline still outstanding.
    pub(crate) fn sweep(&self, now: Instant) -> Option<Instant> {
        let mut expired = Vec::new();
        let mut earliest = None;

        {
            let mut entries = self.entries.lock().unwrap();

            entries.retain(|_, entry| match entry.deadline {
                Some(deadline) if deadline <= now => {
                    expired.push(entry.clone());
                    false
                }
                Some(deadline) => {
                    earliest = Some(match earliest {
                        Some(earliest) if earliest < deadline => earliest,
                        _ => deadline,
                    });
                    true
                }
                None => true,
            });
        }

        for entry in expired {
            tracing::debug!(serial = entry.serial.get(), "pending call timed out");
            entry.finish(PendingState::TimedOut);
        }

        earliest
    }

    /// Test if an entry is registered for `serial`.
    pub(crate) fn contains(&self, serial: Serial) -> bool {
        self.entries.lock().unwrap().contains_key(&serial.get())
    }

    /// The number of registered entries.
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

/// A handle to an outbound call awaiting its reply.
///
/// The handle deregisters its entry when dropped, so an abandoned call
/// cannot leak a registry slot. Obtained from
/// [`Connection::send_with_reply`].
///
/// [`Connection::send_with_reply`]: crate::Connection::send_with_reply
pub struct PendingCall {
    entry: Arc<PendingEntry>,
    entries: Weak<EntryMap>,
}

impl PendingCall {
    /// The serial of the call this handle is waiting on.
    pub fn serial(&self) -> Serial {
        self.entry.serial
    }

    /// Construct a handle that is already cancelled.
    ///
    /// Used for sends that were skipped, such as invalidated messages.
    pub(crate) fn cancelled(serial: Serial) -> Self {
        Self {
            entry: Arc::new(PendingEntry {
                serial,
                deadline: None,
                state: Mutex::new(PendingState::Cancelled),
                cond: Condvar::new(),
            }),
            entries: Weak::new(),
        }
    }

    /// Block until the call completes, or until `timeout` passes.
    ///
    /// Returns the reply message, which is either a method return or an
    /// error reply; the peer decides. A wait that runs out of time moves
    /// the entry to the timed-out state, so a late reply is dropped rather
    /// than delivered to nobody.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<Message> {
        let deadline = match (timeout, self.entry.deadline) {
            (Some(timeout), Some(deadline)) => Some(deadline.min(Instant::now() + timeout)),
            (Some(timeout), None) => Some(Instant::now() + timeout),
            (None, deadline) => deadline,
        };

        let mut guard = self.entry.state.lock().unwrap();

        loop {
            match &mut *guard {
                PendingState::Waiting(..) => {}
                state => return take_terminal(state),
            }

            match deadline {
                Some(deadline) => {
                    let now = Instant::now();

                    if now >= deadline {
                        drop(guard);
                        self.expire();
                        return Err(Error::new(ErrorKind::TimedOut));
                    }

                    let (next, _) = self
                        .entry
                        .cond
                        .wait_timeout(guard, deadline - now)
                        .unwrap();
                    guard = next;
                }
                None => {
                    guard = self.entry.cond.wait(guard).unwrap();
                }
            }
        }
    }

    /// Take the reply if the call has already completed, without blocking.
    ///
    /// Returns `Ok(None)` while the call is still in flight.
    pub fn try_wait(&self) -> Result<Option<Message>> {
        let mut guard = self.entry.state.lock().unwrap();

        match &mut *guard {
            PendingState::Waiting(..) => Ok(None),
            state => take_terminal(state).map(Some),
        }
    }

    /// Install a continuation invoked by the dispatch thread when the call
    /// reaches a terminal state.
    ///
    /// If the call already completed, the continuation runs immediately on
    /// the calling thread.
    pub fn on_completion<F>(&self, callback: F)
    where
        F: FnOnce(Result<Message>) + Send + 'static,
    {
        let mut guard = self.entry.state.lock().unwrap();

        match &mut *guard {
            PendingState::Waiting(slot) => {
                *slot = Some(Box::new(callback));
            }
            state => {
                let result = take_terminal(state);
                drop(guard);
                callback(result);
            }
        }
    }

    /// Park the calling thread until the call reaches a terminal state or
    /// `timeout` passes, whichever comes first, without expiring the entry.
    ///
    /// Returns whether the call is terminal.
    pub(crate) fn park(&self, timeout: Duration) -> bool {
        let guard = self.entry.state.lock().unwrap();

        if guard.is_terminal() {
            return true;
        }

        let (guard, _) = self.entry.cond.wait_timeout(guard, timeout).unwrap();
        guard.is_terminal()
    }

    /// Cancel the call, waking any waiter with `Cancelled`.
    pub fn cancel(&self) {
        self.deregister();
        self.entry.finish(PendingState::Cancelled);
    }

    /// Test if the call has reached a terminal state.
    pub fn is_complete(&self) -> bool {
        self.entry.state.lock().unwrap().is_terminal()
    }

    fn expire(&self) {
        self.deregister();
        self.entry.finish(PendingState::TimedOut);
    }

    fn deregister(&self) {
        if let Some(entries) = self.entries.upgrade() {
            entries.lock().unwrap().remove(&self.entry.serial.get());
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if !self.entry.state.lock().unwrap().is_terminal() {
            self.deregister();
            self.entry.finish(PendingState::Cancelled);
        }
    }
}

impl fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall")
            .field("serial", &self.entry.serial)
            .finish()
    }
}

fn take_terminal(state: &mut PendingState) -> Result<Message> {
    match state {
        PendingState::Completed(message) => match message.take() {
            Some(message) => Ok(message),
            None => Err(Error::new(ErrorKind::Cancelled)),
        },
        PendingState::Cancelled => Err(Error::new(ErrorKind::Cancelled)),
        PendingState::TimedOut => Err(Error::new(ErrorKind::TimedOut)),
        PendingState::Disconnected => Err(Error::new(ErrorKind::Disconnected)),
        PendingState::Failed(kind) => Err(Error::from(io::Error::from(*kind))),
        PendingState::Waiting(..) => unreachable!("terminal state expected"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::{Message, ObjectPath, Serial};

    fn serial(n: u32) -> Serial {
        Serial::from_u32(n).unwrap()
    }

    fn reply_to(n: u32) -> Message {
        Message::method_call(ObjectPath::new_const(b"/o"), "M")
            .with_serial(serial(n))
            .method_return()
            .unwrap()
    }

    #[test]
    fn complete_wakes_waiter() {
        let pending = PendingCalls::new();
        let call = pending.insert(serial(42), None);

        assert!(pending.contains(serial(42)));
        assert!(pending.complete(serial(42), reply_to(42)));
        assert!(!pending.contains(serial(42)));

        let reply = call.wait(None).unwrap();
        assert_eq!(reply.reply_serial(), Some(serial(42)));
    }

    #[test]
    fn complete_is_exactly_once() {
        let pending = PendingCalls::new();
        let call = pending.insert(serial(1), None);

        assert!(pending.complete(serial(1), reply_to(1)));
        // The entry is gone, so a second completion finds nothing.
        assert!(!pending.complete(serial(1), reply_to(1)));

        call.wait(None).unwrap();
    }

    #[test]
    fn cancel_wakes_waiter() {
        let pending = PendingCalls::new();
        let call = pending.insert(serial(2), None);

        pending.cancel(serial(2));
        assert!(call.wait(None).unwrap_err().is_cancelled());
    }

    #[test]
    fn wait_timeout_expires_entry() {
        let pending = PendingCalls::new();
        let call = pending.insert(serial(3), None);

        let err = call.wait(Some(Duration::from_millis(10))).unwrap_err();
        assert!(err.is_timed_out());
        assert!(!pending.contains(serial(3)));
    }

    #[test]
    fn sweep_times_out_expired_entries() {
        let pending = PendingCalls::new();
        let call = pending.insert(serial(4), Some(Duration::from_millis(1)));
        let _other = pending.insert(serial(5), Some(Duration::from_secs(3600)));

        std::thread::sleep(Duration::from_millis(5));
        let earliest = pending.sweep(Instant::now());

        assert!(earliest.is_some());
        assert!(!pending.contains(serial(4)));
        assert!(pending.contains(serial(5)));
        assert!(call.wait(None).unwrap_err().is_timed_out());
    }

    #[test]
    fn disconnect_fails_all() {
        let pending = PendingCalls::new();
        let a = pending.insert(serial(6), None);
        let b = pending.insert(serial(7), None);

        pending.disconnect_all();

        assert!(a.wait(None).unwrap_err().is_disconnected());
        assert!(b.wait(None).unwrap_err().is_disconnected());
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn callback_runs_on_completion() {
        let pending = PendingCalls::new();
        let call = pending.insert(serial(8), None);

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        call.on_completion(move |result| {
            assert!(result.is_ok());
            flag.store(true, Ordering::SeqCst);
        });

        assert!(!ran.load(Ordering::SeqCst));
        pending.complete(serial(8), reply_to(8));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn drop_deregisters() {
        let pending = PendingCalls::new();
        let call = pending.insert(serial(9), None);

        assert!(pending.contains(serial(9)));
        drop(call);
        assert!(!pending.contains(serial(9)));
    }

    #[test]
    fn blocking_wait_across_threads() {
        let pending = Arc::new(PendingCalls::new());
        let call = pending.insert(serial(10), None);

        let completer = {
            let pending = pending.clone();

            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                pending.complete(serial(10), reply_to(10));
            })
        };

        let reply = call.wait(Some(Duration::from_secs(5))).unwrap();
        assert_eq!(reply.reply_serial(), Some(serial(10)));
        completer.join().unwrap();
    }
}
