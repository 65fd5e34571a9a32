//! # Butterfly-map CLI
//!
//! Command-line interface for the butterfly-map library.
//! Lays a merchant file out on a headless map and prints the resulting markers,
//! which is handy for checking a merchant feed before shipping it to the app.

use std::path::PathBuf;

use anyhow::{Context, Result};
use butterfly_map::{HeadlessEngine, MapConfig, MapEvent, MapViewController};
use clap::Parser;
use log::error;
use serde::Serialize;

/// Command-line interface for butterfly-map
#[derive(Parser)]
#[command(name = "butterfly-map")]
#[command(about = "Place merchants on a headless map and print the marker set")]
#[command(long_about = "Reads a JSON array of merchants and places them on a map:
  butterfly-map merchants.json                      # Centered on Paris
  butterfly-map merchants.json --lat 50.85 --lon 4.35
  butterfly-map - --json < merchants.json           # Read stdin, print JSON

Merchant records look like:
  {\"name\": \"Chez Paul\", \"latitude\": 48.86, \"longitude\": 2.36,
   \"availableBaskets\": 3, \"price\": 5.5}")]
#[command(version = env!("BUTTERFLY_VERSION"))]
struct Cli {
    /// Merchant file, or "-" for stdin
    input: String,

    /// Map center latitude
    #[arg(long, default_value_t = 48.85, allow_negative_numbers = true)]
    lat: f64,

    /// Map center longitude
    #[arg(long, default_value_t = 2.35, allow_negative_numbers = true)]
    lon: f64,

    /// Initial zoom level
    #[arg(long, default_value_t = 12.0)]
    zoom: f64,

    /// Print the marker set as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// One line of output
#[derive(Debug, Serialize)]
struct MarkerSummary {
    id: String,
    name: String,
    latitude: f64,
    longitude: f64,
    available_baskets: u32,
    price: String,
}

/// Container the headless map is created in
const CONTAINER_ID: &str = "map";

fn main() {
    let cli = Cli::parse();

    // Initialize logging to stderr
    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stderr)
        .init();

    if let Err(e) = run(&cli) {
        error!("❌ Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    if cli.verbose {
        eprintln!("🦋 Butterfly-map v{} starting...", env!("BUTTERFLY_VERSION"));
    }

    let json = read_input(&cli.input)?;
    let markers = place(&json, cli.lat, cli.lon, cli.zoom)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&markers)?);
    } else {
        for m in &markers {
            println!(
                "{:<24} {:>9.5} {:>10.5} {:>3} basket(s) {:>8}",
                m.name, m.latitude, m.longitude, m.available_baskets, m.price
            );
        }
        eprintln!("📍 Placed {} merchant(s)", markers.len());
    }
    Ok(())
}

/// Read the merchant JSON from a file or stdin
fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        std::io::read_to_string(std::io::stdin()).context("Failed to read merchants from stdin")
    } else {
        let path = PathBuf::from(input);
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read merchants from {}", path.display()))
    }
}

/// Run the merchants through a headless map and summarize the markers
fn place(json: &str, lat: f64, lon: f64, zoom: f64) -> Result<Vec<MarkerSummary>> {
    let config = MapConfig::from_env();
    let currency = config.currency_symbol.clone();
    let mut controller =
        MapViewController::with_config(HeadlessEngine::with_containers([CONTAINER_ID]), config);

    let handle = controller.initialize(CONTAINER_ID, lat, lon, zoom)?;
    controller.handle_event(MapEvent::Loaded(handle))?;
    controller.add_merchants(json)?;

    let summaries = controller
        .markers()
        .iter()
        .map(|p| MarkerSummary {
            id: p.marker.id.clone(),
            name: p.marker.display.name.clone(),
            latitude: p.marker.position.lat,
            longitude: p.marker.position.lng,
            available_baskets: p.marker.display.available_baskets,
            price: format!("{} {}", p.marker.display.price_text(), currency),
        })
        .collect();

    controller.teardown();
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_preserves_order() {
        let json = r#"[
            {"name":"B","latitude":48.87,"longitude":2.37,"availableBaskets":1,"price":3},
            {"name":"A","latitude":48.86,"longitude":2.36,"availableBaskets":3,"price":5.5}
        ]"#;
        let markers = place(json, 48.85, 2.35, 12.0).unwrap();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].name, "B");
        assert_eq!(markers[1].price, "5.50 €");
    }

    #[test]
    fn test_place_rejects_bad_center() {
        assert!(place("[]", 95.0, 0.0, 12.0).is_err());
    }

    #[test]
    fn test_place_rejects_malformed_input() {
        let err = place("not json", 48.85, 2.35, 12.0).unwrap_err();
        assert!(err.to_string().contains("Malformed merchant input"));
    }
}
