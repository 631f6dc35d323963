//! Enumeration of the zones and sources a controller actually has
//!
//! RIO has no listing command, so enumeration probes every address within
//! the configured bounds with `WATCH ... ON` and keeps the ones the device
//! accepts. Found entities stay watched, which also fills the cache with the
//! state the device pushes for them.

use crate::client::RussoundClient;
use crate::error::{Result, RioError};
use crate::types::{EntityId, SourceId, ZoneId};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

/// A zone found by [`RussoundClient::enumerate_zones`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredZone {
    pub id: ZoneId,
    /// Name configured on the controller; empty if the device did not report one
    pub name: String,
}

/// A source found by [`RussoundClient::enumerate_sources`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredSource {
    pub id: SourceId,
    pub name: String,
}

impl RussoundClient {
    /// List the zones the controller accepts a watch for
    ///
    /// Probes controllers `1..=max_controllers` and zones `1..=max_zones`
    /// from the client configuration. Results are ordered by controller,
    /// then zone.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use russound_rio::{ClientConfig, RussoundClient};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let client = RussoundClient::open(ClientConfig::new("192.168.1.50")).await?;
    ///     for zone in client.enumerate_zones().await? {
    ///         println!("{}: {}", zone.id, zone.name);
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub async fn enumerate_zones(&self) -> Result<Vec<DiscoveredZone>> {
        let config = self.config();
        let candidates: Vec<ZoneId> = (1..=config.max_controllers)
            .flat_map(|controller| {
                (1..=config.max_zones).map(move |zone| ZoneId::with_controller(zone, controller))
            })
            .collect();

        tracing::info!("Probing {} zone address(es)", candidates.len());
        let probes = candidates
            .iter()
            .map(|zone| async move { self.probe(EntityId::Zone(*zone)).await });
        let results = join_all(probes).await;

        let mut zones = Vec::new();
        for (zone, result) in candidates.into_iter().zip(results) {
            if let Some(name) = result? {
                tracing::info!("Found zone {}: {}", zone, name);
                zones.push(DiscoveredZone { id: zone, name });
            }
        }

        tracing::info!("Found {} zone(s)", zones.len());
        Ok(zones)
    }

    /// List the sources the controller accepts a watch for
    ///
    /// Probes sources `1..=max_sources` from the client configuration.
    pub async fn enumerate_sources(&self) -> Result<Vec<DiscoveredSource>> {
        let candidates: Vec<SourceId> = (1..=self.config().max_sources).map(SourceId::new).collect();

        tracing::info!("Probing {} source address(es)", candidates.len());
        let probes = candidates
            .iter()
            .map(|source| async move { self.probe(EntityId::Source(*source)).await });
        let results = join_all(probes).await;

        let mut sources = Vec::new();
        for (source, result) in candidates.into_iter().zip(results) {
            if let Some(name) = result? {
                tracing::info!("Found source {}: {}", source, name);
                sources.push(DiscoveredSource { id: source, name });
            }
        }

        tracing::info!("Found {} source(s)", sources.len());
        Ok(sources)
    }

    /// Watch one address; `Ok(None)` if the device rejects it
    async fn probe(&self, entity: EntityId) -> Result<Option<String>> {
        match self.watch(entity).await {
            Ok(()) => {}
            Err(RioError::Command(message)) => {
                tracing::debug!("No entity at {}: {}", entity.device_str(), message);
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        let name = match self.get_variable(entity, "name").await {
            Ok(name) => name.unwrap_or_default(),
            Err(RioError::Command(message)) => {
                tracing::warn!("Failed to read name of {}: {}", entity.device_str(), message);
                String::new()
            }
            Err(e) => return Err(e),
        };
        Ok(Some(name))
    }
}
