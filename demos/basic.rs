//! Connect to a controller, list its zones and sources, and poke zone 1.
//!
//! Usage: cargo run --example basic -- <host> [port]

use russound_rio::{ClientConfig, RussoundClient, ZoneId, DEFAULT_PORT};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("russound_rio=debug")
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().ok_or("usage: basic <host> [port]")?;
    let port = match args.next() {
        Some(port) => port.parse()?,
        None => DEFAULT_PORT,
    };

    let client = RussoundClient::open(ClientConfig::new(host).with_port(port)).await?;

    println!("Determining valid zones");
    for zone in client.enumerate_zones().await? {
        println!("{}: {}", zone.id, zone.name);
    }
    for source in client.enumerate_sources().await? {
        println!("{}: {}", source.id, source.name);
    }

    client.add_zone_observer(Some(ZoneId::new(1)), |zone, variable, value| {
        println!("{} changed: {} = {}", zone, variable, value);
    });

    let zone = client.zone(ZoneId::new(1));
    zone.watch().await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    zone.set_volume(40).await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    println!("Volume: {:?}", zone.volume().await?);

    if let Some(source) = zone.current_source().await? {
        let name = client.source(source).name().await?;
        println!("Zone 1 source name: {}", name.unwrap_or_default());
    }

    client.close().await?;
    println!("Done");
    Ok(())
}
