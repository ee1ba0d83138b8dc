use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::Connection;

/// How often the dispatch thread wakes to sweep timeouts and check for
/// shutdown when the bus is quiet.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A standalone dispatch thread driving [`Connection::read_and_dispatch`].
///
/// With a dispatcher running, application threads can use
/// [`Connection::send_blocking`] and [`PendingCall::wait`] freely; inbound
/// calls and signals are routed on the dispatch thread.
///
/// [`PendingCall::wait`]: crate::PendingCall::wait
///
/// The thread stops when the dispatcher is dropped or the connection
/// closes.
pub struct Dispatcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawn a dispatch thread for the given connection.
    pub fn start(connection: Connection) -> Self {
        let stop = Arc::new(AtomicBool::new(false));

        // A finite read timeout keeps the loop responsive to stop requests
        // and pending-call deadlines on a quiet bus.
        let _ = connection.set_read_timeout(Some(POLL_INTERVAL));

        let handle = {
            let stop = stop.clone();

            std::thread::Builder::new()
                .name("dbus-dispatch".into())
                .spawn(move || {
                    while !stop.load(Ordering::SeqCst) && connection.is_connected() {
                        match connection.read_and_dispatch(Some(16)) {
                            Ok(_) => {}
                            Err(error) if error.is_disconnected() => break,
                            Err(error) => {
                                tracing::error!("dispatch thread stopping: {error}");
                                break;
                            }
                        }
                    }
                })
                .expect("failed to spawn dispatch thread")
        };

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop the dispatch thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
