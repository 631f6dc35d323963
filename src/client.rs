use crate::cache::{ObserverId, SharedCache};
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{Result, RioError};
use crate::protocol::Command;
use crate::subscription::StateReceiver;
use crate::types::{ConnectionState, EntityId, SourceId, ZoneId};
use crate::zone::{Source, Zone};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Client for a Russound controller speaking the RIO protocol
///
/// `RussoundClient` is cheap to clone; clones share one connection, one
/// state cache and one set of observers. Commands from any number of tasks
/// are queued and sent to the device one at a time.
///
/// Variable reads are answered from the local cache when the zone or
/// source is watched and the device has reported the variable; otherwise
/// they go to the device.
#[derive(Clone)]
pub struct RussoundClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    cache: SharedCache,
    state: Arc<watch::Sender<ConnectionState>>,
    connection: Mutex<Option<Connection>>,
}

impl RussoundClient {
    /// Create a disconnected client
    pub fn new(config: ClientConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(ClientInner {
                cache: SharedCache::new(config.event_capacity.max(1)),
                config,
                state: Arc::new(state),
                connection: Mutex::new(None),
            }),
        }
    }

    /// Create a client and connect it
    ///
    /// # Example
    ///
    /// ```no_run
    /// use russound_rio::{ClientConfig, RussoundClient, ZoneId};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let client = RussoundClient::open(ClientConfig::new("192.168.1.50")).await?;
    ///     client.watch_zone(ZoneId::new(1)).await?;
    ///     let volume = client.get_zone_variable(ZoneId::new(1), "volume").await?;
    ///     println!("Volume: {:?}", volume);
    ///     client.close().await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn open(config: ClientConfig) -> Result<Self> {
        let client = Self::new(config);
        client.connect().await?;
        Ok(client)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    fn lock_connection(&self) -> MutexGuard<'_, Option<Connection>> {
        self.inner
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ========== Connection lifecycle ==========

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Receiver that observes every connection state change
    ///
    /// The state moves to `Closed` when the connection ends, including when
    /// the device hangs up or the I/O task fails.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Open the TCP connection and start processing
    ///
    /// Allowed from `Disconnected` and `Closed`. Watched zones, watched
    /// sources and cached values are kept from any earlier connection;
    /// call `watch_*` again if the device needs to be re-subscribed.
    pub async fn connect(&self) -> Result<()> {
        self.inner.config.validate()?;

        let mut refused = None;
        self.inner.state.send_if_modified(|state| {
            if state.can_connect() {
                *state = ConnectionState::Connecting;
                true
            } else {
                refused = Some(*state);
                false
            }
        });
        if let Some(state) = refused {
            return Err(RioError::InvalidState(state));
        }

        // Reap a connection that ended on its own
        let stale = self.lock_connection().take();
        if let Some(stale) = stale {
            if let Err(e) = stale.shutdown().await {
                tracing::debug!("Previous connection ended with: {}", e);
            }
        }

        let config = &self.inner.config;
        let opened = Connection::open(
            &config.address(),
            config.connect_timeout(),
            config.response_timeout(),
            self.inner.cache.clone(),
            self.inner.state.clone(),
        )
        .await;

        match opened {
            Ok(connection) => {
                *self.lock_connection() = Some(connection);
                self.inner.state.send_if_modified(|state| {
                    if *state == ConnectionState::Connecting {
                        *state = ConnectionState::Running;
                        true
                    } else {
                        false
                    }
                });
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to connect to {}: {}", config.address(), e);
                self.inner.state.send_replace(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Stop the connection and wait for the I/O task to finish
    ///
    /// Commands still queued or awaiting a response fail with
    /// `ConnectionClosed`. If the connection had already failed, the error
    /// that ended it is returned. Closing a client that is not connected
    /// does nothing. A `connect()` still in progress cannot be cancelled;
    /// closing then fails with `InvalidState(Connecting)`.
    pub async fn close(&self) -> Result<()> {
        let mut connecting = false;
        self.inner.state.send_if_modified(|state| match *state {
            ConnectionState::Running => {
                *state = ConnectionState::Closing;
                true
            }
            ConnectionState::Connecting => {
                connecting = true;
                false
            }
            _ => false,
        });
        if connecting {
            return Err(RioError::InvalidState(ConnectionState::Connecting));
        }

        let connection = self.lock_connection().take();
        let Some(connection) = connection else {
            return Ok(());
        };

        tracing::info!("Closing connection to {}", self.inner.config.address());
        let result = connection.shutdown().await;
        self.inner.state.send_replace(ConnectionState::Closed);
        result
    }

    /// Send a raw command and wait for the response
    async fn send(&self, command: Command) -> Result<Option<String>> {
        command.validate()?;

        let commands = {
            let connection = self.lock_connection();
            match connection.as_ref() {
                Some(connection)
                    if self.state() == ConnectionState::Running && !connection.is_finished() =>
                {
                    connection.commands()
                }
                _ => return Err(RioError::NotConnected),
            }
        };
        commands.send(command.to_string()).await
    }

    // ========== Entity-generic operations ==========

    pub(crate) async fn get_variable(
        &self,
        entity: EntityId,
        variable: &str,
    ) -> Result<Option<String>> {
        if let Some(value) = self.inner.cache.read_cached(entity, variable) {
            return Ok(Some(value));
        }
        self.send(Command::get(entity, variable)).await
    }

    pub(crate) fn get_cached_variable(&self, entity: EntityId, variable: &str) -> Option<String> {
        self.inner.cache.read_cached(entity, variable)
    }

    pub(crate) async fn set_variable(
        &self,
        entity: EntityId,
        variable: &str,
        value: &str,
    ) -> Result<()> {
        self.send(Command::set(entity, variable, value)).await?;
        Ok(())
    }

    pub(crate) async fn watch(&self, entity: EntityId) -> Result<()> {
        self.send(Command::watch(entity, true)).await?;
        self.inner.cache.mark_watched(entity);
        Ok(())
    }

    pub(crate) async fn unwatch(&self, entity: EntityId) -> Result<()> {
        // Reads miss from here on even if the device rejects the command
        self.inner.cache.unmark_watched(entity);
        self.send(Command::watch(entity, false)).await?;
        Ok(())
    }

    pub(crate) async fn send_event<I, A>(&self, entity: EntityId, name: &str, args: I) -> Result<()>
    where
        I: IntoIterator<Item = A>,
        A: ToString,
    {
        self.send(Command::event(entity, name, args)).await?;
        Ok(())
    }

    // ========== Zones ==========

    /// Handle bound to one zone
    pub fn zone(&self, zone: ZoneId) -> Zone {
        Zone::new(self.clone(), zone)
    }

    /// Read a zone variable, from the cache when possible
    ///
    /// Resolves to `None` if the device acknowledged the request without
    /// returning a value.
    pub async fn get_zone_variable(&self, zone: ZoneId, variable: &str) -> Result<Option<String>> {
        self.get_variable(zone.into(), variable).await
    }

    /// Read a zone variable from the cache only
    pub fn get_cached_zone_variable(&self, zone: ZoneId, variable: &str) -> Option<String> {
        self.get_cached_variable(zone.into(), variable)
    }

    /// Set a zone variable
    ///
    /// The cache is not written; it picks up the new value when the device
    /// reports it.
    pub async fn set_zone_variable(&self, zone: ZoneId, variable: &str, value: &str) -> Result<()> {
        self.set_variable(zone.into(), variable, value).await
    }

    /// Ask the device to push changes for a zone and make its variables
    /// readable from the cache
    pub async fn watch_zone(&self, zone: ZoneId) -> Result<()> {
        self.watch(zone.into()).await
    }

    pub async fn unwatch_zone(&self, zone: ZoneId) -> Result<()> {
        self.unwatch(zone.into()).await
    }

    /// Send an event such as `KeyPress Volume 40` to a zone
    pub async fn send_zone_event<I, A>(&self, zone: ZoneId, event: &str, args: I) -> Result<()>
    where
        I: IntoIterator<Item = A>,
        A: ToString,
    {
        self.send_event(zone.into(), event, args).await
    }

    pub fn watched_zones(&self) -> Vec<ZoneId> {
        self.inner.cache.watched_zones()
    }

    /// Everything the device has reported for a zone, watched or not
    pub fn zone_state(&self, zone: ZoneId) -> HashMap<String, String> {
        self.inner.cache.snapshot(zone.into())
    }

    /// Register a callback for updates to one zone, or to every zone when
    /// `zone` is `None`
    ///
    /// Callbacks run on the connection's I/O task, so they must not block.
    /// Callbacks for a specific zone run before wildcard callbacks.
    pub fn add_zone_observer<F>(&self, zone: Option<ZoneId>, callback: F) -> ObserverId
    where
        F: Fn(ZoneId, &str, &str) + Send + Sync + 'static,
    {
        self.inner.cache.add_zone_observer(zone, Arc::new(callback))
    }

    /// Returns `false` if no such observer was registered under `zone`
    pub fn remove_zone_observer(&self, zone: Option<ZoneId>, id: ObserverId) -> bool {
        self.inner.cache.remove_zone_observer(zone, id)
    }

    // ========== Sources ==========

    /// Handle bound to one source
    pub fn source(&self, source: SourceId) -> Source {
        Source::new(self.clone(), source)
    }

    pub async fn get_source_variable(
        &self,
        source: SourceId,
        variable: &str,
    ) -> Result<Option<String>> {
        self.get_variable(source.into(), variable).await
    }

    pub fn get_cached_source_variable(&self, source: SourceId, variable: &str) -> Option<String> {
        self.get_cached_variable(source.into(), variable)
    }

    pub async fn set_source_variable(
        &self,
        source: SourceId,
        variable: &str,
        value: &str,
    ) -> Result<()> {
        self.set_variable(source.into(), variable, value).await
    }

    pub async fn watch_source(&self, source: SourceId) -> Result<()> {
        self.watch(source.into()).await
    }

    pub async fn unwatch_source(&self, source: SourceId) -> Result<()> {
        self.unwatch(source.into()).await
    }

    pub async fn send_source_event<I, A>(&self, source: SourceId, event: &str, args: I) -> Result<()>
    where
        I: IntoIterator<Item = A>,
        A: ToString,
    {
        self.send_event(source.into(), event, args).await
    }

    pub fn watched_sources(&self) -> Vec<SourceId> {
        self.inner.cache.watched_sources()
    }

    pub fn source_state(&self, source: SourceId) -> HashMap<String, String> {
        self.inner.cache.snapshot(source.into())
    }

    /// Register a callback for updates to one source, or to every source
    /// when `source` is `None`
    pub fn add_source_observer<F>(&self, source: Option<SourceId>, callback: F) -> ObserverId
    where
        F: Fn(SourceId, &str, &str) + Send + Sync + 'static,
    {
        self.inner.cache.add_source_observer(source, Arc::new(callback))
    }

    /// Returns `false` if no such observer was registered under `source`
    pub fn remove_source_observer(&self, source: Option<SourceId>, id: ObserverId) -> bool {
        self.inner.cache.remove_source_observer(source, id)
    }

    // ========== Subscriptions ==========

    /// Stream of every cache update, zones and sources alike
    ///
    /// # Example
    ///
    /// ```no_run
    /// use russound_rio::{ClientConfig, RussoundClient, ZoneId};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let client = RussoundClient::open(ClientConfig::new("192.168.1.50")).await?;
    ///     let mut rx = client.subscribe();
    ///     client.watch_zone(ZoneId::new(1)).await?;
    ///
    ///     while let Ok(update) = rx.recv().await {
    ///         println!("State update: {:?}", update);
    ///     }
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> StateReceiver {
        StateReceiver::new(self.inner.cache.subscribe())
    }
}
