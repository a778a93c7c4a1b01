//! The single message pull loop and its fan-out.
//!
//! The host-side dispatch queue is strictly single-consumer, so one
//! [`Dispatcher`] worker per connection owns the raw pull and demultiplexes
//! every inbound message to the subscriber subsystems. Routing is a direct
//! function call into the managers — they share the address space and their
//! own locks, so no channel sits between the puller and the stores.
//!
//! The worker wakes on a fixed tick, drains the queue until the empty-pull
//! sentinel, then sleeps until the next tick. Messages are routed strictly
//! in arrival order, so neither manager can starve the other. The stop
//! signal is checked at every tick boundary and between inner-loop
//! iterations; an in-flight message is never abandoned mid-parse.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::channel::ErrorChannel;
use crate::client::SimClient;
use crate::managers::events::EventManager;
use crate::managers::variables::VariableManager;
use crate::protocol::Message;
use crate::FlightdeckError;

/// Interval between queue drains.
///
/// ~20 wakes per second: short enough that event callbacks feel real-time,
/// long enough that an idle queue costs negligible CPU. A tuning knob, not a
/// measured optimum.
pub const DISPATCH_TICK: Duration = Duration::from_millis(50);

/// Routes parsed messages to their subscriber subsystem.
///
/// Exposed separately from the worker thread so message flows can be driven
/// synchronously with hand-built buffers.
pub struct Router {
    client: Arc<dyn SimClient>,
    variables: VariableManager,
    events: EventManager,
    errors: Arc<ErrorChannel>,
}

impl Router {
    pub fn new(
        client: Arc<dyn SimClient>,
        variables: VariableManager,
        events: EventManager,
    ) -> Self {
        Self { client, variables, events, errors: Arc::new(ErrorChannel::new()) }
    }

    /// Channel of routing-level errors: malformed messages, host exceptions,
    /// and the quit notice.
    pub fn errors(&self) -> Arc<ErrorChannel> {
        Arc::clone(&self.errors)
    }

    /// Route one inbound buffer by its message-kind code.
    pub fn route(&self, buffer: &[u8]) {
        match Message::parse(buffer) {
            Ok(Message::SimObjectData(sample)) => self.variables.apply_sample(&sample),
            Ok(Message::Event(record)) => self.events.deliver(record),
            Ok(Message::Exception(exception)) => {
                warn!(
                    code = exception.code,
                    send_id = exception.send_id,
                    "host exception"
                );
                self.errors.publish(FlightdeckError::SimException {
                    code: exception.code,
                    send_id: exception.send_id,
                    index: exception.index,
                });
            }
            Ok(Message::Open(confirmation)) => {
                debug!(application = %confirmation.application_name, "open confirmed by host");
            }
            Ok(Message::Quit) => {
                debug!("host announced quit; marking connection lost");
                self.client.mark_disconnected();
                self.errors.publish(FlightdeckError::Disconnected);
            }
            Ok(Message::SystemState(state)) => {
                // Informational; nothing subscribes to raw system states.
                trace!(request_id = state.request_id, "system state response");
            }
            Ok(Message::Unknown(kind)) => {
                trace!(kind, "unhandled message kind ignored");
            }
            Err(err) => self.errors.publish(err),
        }
    }
}

/// The background worker owning the raw pull for one connection.
///
/// While a dispatcher is running, nothing else may call
/// [`pull_raw_message`](SimClient::pull_raw_message) on the same connection.
pub struct Dispatcher {
    stop: Mutex<Option<mpsc::Sender<()>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    running: Arc<AtomicBool>,
    errors: Arc<ErrorChannel>,
}

impl Dispatcher {
    /// Spawn the worker thread for a connection and its managers.
    pub fn spawn(
        client: Arc<dyn SimClient>,
        variables: VariableManager,
        events: EventManager,
    ) -> Self {
        let router = Router::new(Arc::clone(&client), variables, events);
        let errors = router.errors();
        let running = Arc::new(AtomicBool::new(true));

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let worker_running = Arc::clone(&running);
        let worker_errors = Arc::clone(&errors);
        let worker = thread::Builder::new()
            .name("flightdeck-dispatch".to_string())
            .spawn(move || {
                dispatch_loop(client, router, stop_rx, worker_errors);
                worker_running.store(false, Ordering::SeqCst);
                debug!("dispatch worker ended");
            })
            .expect("failed to spawn dispatch worker");

        Self {
            stop: Mutex::new(Some(stop_tx)),
            worker: Mutex::new(Some(worker)),
            running,
            errors,
        }
    }

    /// Whether the worker thread is alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Channel of routing-level errors.
    pub fn errors(&self) -> Arc<ErrorChannel> {
        Arc::clone(&self.errors)
    }

    /// Signal the worker and wait for it to acknowledge. Idempotent; returns
    /// once the worker has exited. Never interrupts a message mid-parse.
    pub fn stop(&self) {
        // Dropping the sender wakes the worker's next stop check.
        drop(self.stop.lock().expect("dispatcher stop lock poisoned").take());
        if let Some(worker) = self.worker.lock().expect("dispatcher worker lock poisoned").take()
        {
            if worker.join().is_err() {
                warn!("dispatch worker panicked before join");
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Signal without joining; the worker observes the dropped sender at
        // its next tick and winds down on its own.
        drop(self.stop.lock().expect("dispatcher stop lock poisoned").take());
    }
}

fn dispatch_loop(
    client: Arc<dyn SimClient>,
    router: Router,
    stop_rx: mpsc::Receiver<()>,
    errors: Arc<ErrorChannel>,
) {
    debug!("dispatch worker started");
    'ticks: loop {
        // Sleep until the next tick; a send or a dropped sender stops us.
        match stop_rx.recv_timeout(DISPATCH_TICK) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break 'ticks,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }

        // Drain everything the host queued since the last tick.
        loop {
            match stop_rx.try_recv() {
                Ok(()) | Err(mpsc::TryRecvError::Disconnected) => break 'ticks,
                Err(mpsc::TryRecvError::Empty) => {}
            }

            match client.pull_raw_message() {
                Ok(Some(buffer)) => router.route(&buffer),
                Ok(None) => break, // queue idle until the next tick
                Err(err) if err.is_state_error() => {
                    // Connection closed or lost underneath us; the worker has
                    // nothing left to pull.
                    debug!(error = %err, "connection gone; dispatch worker exiting");
                    break 'ticks;
                }
                Err(err) => {
                    errors.publish(err);
                    break;
                }
            }
        }
    }
}
