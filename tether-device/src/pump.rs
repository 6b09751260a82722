use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace};

use super::config::PumpConfig;
use super::error::PumpError;
use super::message::Message;
use super::state::{ConnectionState, Effect, Event, Lifecycle, transition};
use super::transport::{
    EventCallback, Protocol, StatusChange, StatusChangeReason, StatusListener, Transport,
};

/// Drives the logical connection of one device over a transport.
///
/// While connected, two background tasks periodically flush queued
/// messages and receive cloud-to-device messages. The tasks are stopped
/// when the link drops and recreated when it comes back.
///
/// The pump is cheap to clone, all clones share the same connection.
#[derive(Clone)]
pub struct ConnectionPump {
    inner: Arc<PumpInner>,
}

struct PumpInner {
    transport: Arc<dyn Transport>,
    runtime: Handle,
    shared: Mutex<Shared>,
    // serializes open and close
    lifecycle_guard: tokio::sync::Mutex<()>,
    listener: Mutex<Option<StatusListener>>,
}

struct Shared {
    lifecycle: Lifecycle,
    config: PumpConfig,
    send_task: Option<JoinHandle<()>>,
    receive_task: Option<JoinHandle<()>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // the guarded state is always left consistent, so a poisoned lock
    // is still safe to use
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run `work` forever, waiting `period` between the end of one run
/// and the start of the next
fn spawn_periodic<F, Fut>(runtime: &Handle, period: Duration, work: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    runtime.spawn(async move {
        loop {
            work().await;
            tokio::time::sleep(period).await;
        }
    })
}

impl Shared {
    fn start_send(&mut self, runtime: &Handle, transport: &Arc<dyn Transport>) {
        let transport = Arc::clone(transport);
        let task = spawn_periodic(runtime, self.config.send_period, move || {
            let transport = Arc::clone(&transport);
            async move { transport.send_messages().await }
        });
        if let Some(stale) = self.send_task.replace(task) {
            stale.abort();
        }
    }

    fn start_receive(&mut self, runtime: &Handle, transport: &Arc<dyn Transport>) {
        let transport = Arc::clone(transport);
        let task = spawn_periodic(runtime, self.config.receive_period, move || {
            let transport = Arc::clone(&transport);
            async move { transport.handle_messages().await }
        });
        if let Some(stale) = self.receive_task.replace(task) {
            stale.abort();
        }
    }

    fn cancel_tasks(&mut self) {
        if let Some(task) = self.send_task.take() {
            task.abort();
        }
        if let Some(task) = self.receive_task.take() {
            task.abort();
        }
    }
}

impl PumpInner {
    /// Apply a lifecycle event and carry out its effects.
    ///
    /// Returns true if the transport needs to be closed. That is left to
    /// the caller as it cannot happen under the lock.
    fn apply(&self, event: Event) -> bool {
        let mut shared = lock(&self.shared);
        let previous = shared.lifecycle;
        let (next, effects) = transition(previous, event);
        shared.lifecycle = next;

        if previous.state != next.state {
            debug!(from = %previous.state, to = %next.state, "connection state changed");
        } else if effects.is_empty() {
            trace!(?event, state = %previous.state, "nothing to do");
        }

        let mut close_transport = false;
        for effect in effects {
            match effect {
                Effect::CancelTasks => shared.cancel_tasks(),
                Effect::StartTasks => {
                    shared.start_send(&self.runtime, &self.transport);
                    shared.start_receive(&self.runtime, &self.transport);
                }
                Effect::CloseTransport => close_transport = true,
            }
        }
        close_transport
    }

    fn on_status_changed(&self, change: StatusChange) {
        trace!(
            status = %change.status,
            reason = ?change.reason,
            cause = ?change.cause,
            "transport status changed"
        );
        self.apply(Event::StatusChanged(change.status));

        let listener = lock(&self.listener).clone();
        if let Some(listener) = listener {
            listener(change);
        }
    }
}

impl Drop for PumpInner {
    fn drop(&mut self) {
        self.shared
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel_tasks();
    }
}

impl ConnectionPump {
    /// Create a pump using the default cadences for the transport protocol.
    ///
    /// Must be called from within a tokio runtime, which is the one the
    /// periodic tasks will run on.
    pub fn new(transport: Arc<dyn Transport>) -> Result<Self, PumpError> {
        let config = PumpConfig::for_protocol(transport.protocol());
        Self::with_config(transport, config)
    }

    pub fn with_config(
        transport: Arc<dyn Transport>,
        config: PumpConfig,
    ) -> Result<Self, PumpError> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|err| PumpError::Configuration(format!("no async runtime: {err}")))?;

        let inner = Arc::new(PumpInner {
            transport,
            runtime,
            shared: Mutex::new(Shared {
                lifecycle: Lifecycle::default(),
                config,
                send_task: None,
                receive_task: None,
            }),
            lifecycle_guard: tokio::sync::Mutex::new(()),
            listener: Mutex::new(None),
        });

        // the transport must not keep the pump alive
        let weak: Weak<PumpInner> = Arc::downgrade(&inner);
        inner
            .transport
            .set_status_listener(Arc::new(move |change: StatusChange| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_status_changed(change);
                }
            }));

        Ok(Self { inner })
    }

    /// Open the transport and start pumping messages.
    ///
    /// Opening a pump that is already open does nothing.
    #[instrument(name = "open", skip(self), fields(protocol = %self.protocol()), err)]
    pub async fn open(&self, reconnecting: bool) -> Result<(), PumpError> {
        let _guard = self.inner.lifecycle_guard.lock().await;
        if self.is_open() {
            debug!("already open");
            return Ok(());
        }

        self.inner.apply(Event::OpenRequested);
        match self.inner.transport.open(reconnecting).await {
            Ok(()) => {
                self.inner.apply(Event::OpenSucceeded);
                Ok(())
            }
            Err(err) => {
                self.inner.apply(Event::OpenFailed);
                Err(PumpError::TransportOpen(err))
            }
        }
    }

    /// Stop pumping and close the transport.
    ///
    /// Running tasks are aborted rather than drained. Closing a closed
    /// pump does nothing.
    #[instrument(name = "close", skip(self), fields(protocol = %self.protocol()))]
    pub async fn close(&self) {
        let _guard = self.inner.lifecycle_guard.lock().await;
        if self.inner.apply(Event::CloseRequested) {
            self.inner
                .transport
                .close(StatusChangeReason::ClientClose, None)
                .await;
            debug!("transport closed");
        }
    }

    /// True while connected or while the transport is trying to recover
    /// a dropped link
    pub fn is_open(&self) -> bool {
        lock(&self.inner.shared).lifecycle.is_open()
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.inner.shared).lifecycle.state
    }

    pub fn protocol(&self) -> Protocol {
        self.inner.transport.protocol()
    }

    /// Queue a message for delivery on the next send tick.
    ///
    /// The message is tagged with `connection_device_id` so a single
    /// connection can carry messages for several devices.
    pub fn send_async(
        &self,
        message: Option<Message>,
        callback: Option<EventCallback>,
        connection_device_id: Option<String>,
    ) -> Result<(), PumpError> {
        let mut message = message
            .ok_or_else(|| PumpError::InvalidArgument("message cannot be empty".into()))?;
        if !self.is_open() {
            return Err(PumpError::NotOpen);
        }

        message.set_connection_device_id(connection_device_id.clone());
        trace!(message_id = message.message_id(), "queueing message");
        self.inner
            .transport
            .add_message(message, callback, connection_device_id);
        Ok(())
    }

    pub fn send_period(&self) -> Duration {
        lock(&self.inner.shared).config.send_period
    }

    pub fn receive_period(&self) -> Duration {
        lock(&self.inner.shared).config.receive_period
    }

    /// Change how often queued messages are flushed.
    ///
    /// A running send task is restarted at the new cadence.
    pub fn set_send_period_ms(&self, period_ms: i64) -> Result<(), PumpError> {
        let period = positive_period(period_ms, "send")?;
        let mut shared = lock(&self.inner.shared);
        shared.config.send_period = period;
        if shared.send_task.is_some() {
            debug!(period_ms, "rescheduling send task");
            shared.start_send(&self.inner.runtime, &self.inner.transport);
        }
        Ok(())
    }

    /// Change how often the transport is asked for incoming messages.
    ///
    /// A running receive task is restarted at the new cadence.
    pub fn set_receive_period_ms(&self, period_ms: i64) -> Result<(), PumpError> {
        let period = positive_period(period_ms, "receive")?;
        let mut shared = lock(&self.inner.shared);
        shared.config.receive_period = period;
        if shared.receive_task.is_some() {
            debug!(period_ms, "rescheduling receive task");
            shared.start_receive(&self.inner.runtime, &self.inner.transport);
        }
        Ok(())
    }

    /// Apply a connection status change.
    ///
    /// Transports report through the listener installed at construction,
    /// which ends up here. May be called from any thread.
    pub fn on_status_changed(&self, change: StatusChange) {
        self.inner.on_status_changed(change);
    }

    /// Observe every connection status change after the pump applied it
    pub fn set_status_listener(&self, listener: StatusListener) {
        *lock(&self.inner.listener) = Some(listener);
    }
}

fn positive_period(period_ms: i64, name: &str) -> Result<Duration, PumpError> {
    if period_ms <= 0 {
        return Err(PumpError::InvalidArgument(format!(
            "{name} period must be greater than zero, got {period_ms}"
        )));
    }
    Ok(Duration::from_millis(period_ms as u64))
}
