//! tracker simulation for LoRaTrack

use anyhow::{Context, Result};
use colored::Colorize;
use loratrack_core::Configuration;
use loratrack_sim::scenarios::{self, ScenarioReport};
use loratrack_sim::SimulationPresets;

fn print_report(report: &ScenarioReport) {
    println!("Beacons: {}", report.beacons);
    println!(
        "Radio: {} delivered, {} lost",
        report.delivered.to_string().green(),
        report.dropped.to_string().red()
    );
    println!("Forwarded from phone: {}", report.forwarded_from_phone);
    println!("Mirrored to phone: {}", report.phone_packets.len());
    for packet in report.phone_packets.iter().take(3) {
        println!("  {}", packet.dimmed());
    }
    println!("Nearby ({} slots):", scenarios::nearby_capacity());
    for line in &report.nearby {
        println!("  {}", line);
    }
    if report.shutdown_requested {
        println!("{}", "Battery exhausted, shutdown requested".bright_red());
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();
    // airtime and pacing run on virtual time
    tokio::time::pause();

    let config = match std::env::args().nth(1) {
        Some(path) => Configuration::load(&path).with_context(|| format!("loading {}", path))?,
        None => Configuration::default(),
    };

    println!("{}", "LoRaTrack Simulation".bright_blue().bold());
    println!("{}", "====================".bright_blue());

    let presets = vec![
        ("Short range (SF7)", SimulationPresets::short_range()),
        ("Long range (SF12)", SimulationPresets::long_range()),
        ("Congested channel", SimulationPresets::congested()),
    ];

    for (seed, (name, conditions)) in presets.into_iter().enumerate() {
        println!("{}", format!("\n>>> Drive: {}", name).bright_green().bold());
        println!("Bitrate: {} bps", conditions.bitrate_bps);
        println!("Packet Loss: {}%", (conditions.packet_loss * 100.0) as u32);
        let report = scenarios::drive(config.clone(), conditions, 240, seed as u64).await?;
        print_report(&report);
        println!("{}", "-".repeat(50));
    }

    println!("{}", "\n>>> Parked weather station".bright_yellow().bold());
    let report = scenarios::parked_weather_station(SimulationPresets::long_range(), 60, 42).await?;
    print_report(&report);

    println!("\n{}", "All simulations complete!".bright_green().bold());
    Ok(())
}
