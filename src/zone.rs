use crate::client::RussoundClient;
use crate::error::Result;
use crate::types::{SourceId, ZoneId};

/// Interface for controlling one zone
///
/// A `Zone` is a [`RussoundClient`] bound to a [`ZoneId`]. It is cheap to
/// clone and shares the client's connection and cache.
#[derive(Clone)]
pub struct Zone {
    client: RussoundClient,
    id: ZoneId,
}

impl Zone {
    pub(crate) fn new(client: RussoundClient, id: ZoneId) -> Self {
        Self { client, id }
    }

    pub fn id(&self) -> ZoneId {
        self.id
    }

    /// Read a variable, from the cache when the zone is watched
    pub async fn get(&self, variable: &str) -> Result<Option<String>> {
        self.client.get_zone_variable(self.id, variable).await
    }

    /// Read a variable from the cache only
    pub fn cached(&self, variable: &str) -> Option<String> {
        self.client.get_cached_zone_variable(self.id, variable)
    }

    pub async fn set(&self, variable: &str, value: &str) -> Result<()> {
        self.client.set_zone_variable(self.id, variable, value).await
    }

    pub async fn watch(&self) -> Result<()> {
        self.client.watch_zone(self.id).await
    }

    pub async fn unwatch(&self) -> Result<()> {
        self.client.unwatch_zone(self.id).await
    }

    /// Send an event to the zone
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use russound_rio::{ClientConfig, RussoundClient, ZoneId};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = RussoundClient::open(ClientConfig::new("192.168.1.50")).await?;
    /// let zone = client.zone(ZoneId::new(1));
    /// zone.event("KeyPress", ["Volume", "40"]).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn event<I, A>(&self, name: &str, args: I) -> Result<()>
    where
        I: IntoIterator<Item = A>,
        A: ToString,
    {
        self.client.send_zone_event(self.id, name, args).await
    }

    // ========== Common variables ==========

    pub async fn name(&self) -> Result<Option<String>> {
        self.get("name").await
    }

    /// Current volume (0 to 50 on most controllers)
    pub async fn volume(&self) -> Result<Option<u8>> {
        Ok(self.get("volume").await?.and_then(|v| v.trim().parse().ok()))
    }

    /// Set the volume through a `KeyPress Volume <level>` event
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use russound_rio::{ClientConfig, RussoundClient, ZoneId};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = RussoundClient::open(ClientConfig::new("192.168.1.50")).await?;
    /// client.zone(ZoneId::new(1)).set_volume(25).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn set_volume(&self, volume: u8) -> Result<()> {
        self.event("KeyPress", ["Volume".to_string(), volume.to_string()])
            .await
    }

    /// Source currently selected in the zone
    pub async fn current_source(&self) -> Result<Option<SourceId>> {
        Ok(self
            .get("currentSource")
            .await?
            .and_then(|v| v.trim().parse().ok())
            .map(SourceId::new))
    }
}

/// Interface for one source
#[derive(Clone)]
pub struct Source {
    client: RussoundClient,
    id: SourceId,
}

impl Source {
    pub(crate) fn new(client: RussoundClient, id: SourceId) -> Self {
        Self { client, id }
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub async fn get(&self, variable: &str) -> Result<Option<String>> {
        self.client.get_source_variable(self.id, variable).await
    }

    pub fn cached(&self, variable: &str) -> Option<String> {
        self.client.get_cached_source_variable(self.id, variable)
    }

    pub async fn set(&self, variable: &str, value: &str) -> Result<()> {
        self.client.set_source_variable(self.id, variable, value).await
    }

    pub async fn watch(&self) -> Result<()> {
        self.client.watch_source(self.id).await
    }

    pub async fn unwatch(&self) -> Result<()> {
        self.client.unwatch_source(self.id).await
    }

    pub async fn event<I, A>(&self, name: &str, args: I) -> Result<()>
    where
        I: IntoIterator<Item = A>,
        A: ToString,
    {
        self.client.send_source_event(self.id, name, args).await
    }

    pub async fn name(&self) -> Result<Option<String>> {
        self.get("name").await
    }
}
