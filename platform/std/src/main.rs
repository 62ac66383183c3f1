mod file_store;

use std::io::BufRead;
use std::path::PathBuf;

use aquarium_controller::control_loop::{control_loop_task, LoopChannels};
use aquarium_controller::simulation::{simulated_tank_task, TankModel};
use aquarium_controller::storage::run_persistence;
use aquarium_controller::{Command, LoopConfig, CO2_LOOP, TEMPERATURE_LOOP};
use clap::Parser;
use embassy_executor::Spawner;
use embassy_time::{Duration, Ticker, Timer};
use file_store::FileStore;
use log::*;

#[derive(Parser, Debug)]
#[clap(about = "Aquarium PID loops against a simulated tank")]
struct Args {
    /// Water temperature target (°C)
    #[clap(long, default_value_t = 25.0)]
    target: f32,

    /// Temperature that trips the emergency stop (°C)
    #[clap(long, default_value_t = 30.0)]
    safety_max: f32,

    /// Room temperature the tank starts at (°C)
    #[clap(long, default_value_t = 20.0)]
    ambient: f32,

    /// pH target of the CO2 loop
    #[clap(long, default_value_t = 6.8)]
    ph_target: f32,

    /// pH reported by the fixed pH probe
    #[clap(long, default_value_t = 7.0)]
    ph: f32,

    /// JSON file overriding the temperature loop configuration
    #[clap(long)]
    config: Option<PathBuf>,

    /// Directory holding the saved PID parameters
    #[clap(long, default_value = "pid-store")]
    store: PathBuf,

    /// Seconds between telemetry lines
    #[clap(long, default_value_t = 5)]
    telemetry_secs: u64,
}

fn temperature_config(args: &Args) -> LoopConfig {
    let preset = LoopConfig::temperature(args.target, args.safety_max);
    let Some(path) = &args.config else {
        return preset;
    };
    match std::fs::read(path) {
        Ok(bytes) => match LoopConfig::from_json(&bytes) {
            Ok(config) => config,
            Err(e) => {
                error!("Invalid configuration {}: {}", path.display(), e);
                preset
            }
        },
        Err(e) => {
            error!("Cannot read {}: {}", path.display(), e);
            preset
        }
    }
}

#[embassy_executor::task(pool_size = 2)]
async fn persistence_task(channels: &'static LoopChannels, dir: PathBuf) -> ! {
    let mut store = FileStore::new(dir);
    run_persistence(&mut store, &channels.persist).await
}

#[embassy_executor::task]
async fn ph_probe_task(ph: f32, period: Duration) -> ! {
    let mut ticker = Ticker::every(period);
    loop {
        CO2_LOOP.measurements.signal(ph);
        ticker.next().await;
    }
}

#[embassy_executor::task(pool_size = 2)]
async fn telemetry_task(name: &'static str, channels: &'static LoopChannels, every: Duration) {
    let Some(mut state) = channels.state.receiver() else {
        error!("No state receiver left for {}", name);
        return;
    };
    loop {
        let snapshot = state.changed().await;
        match snapshot.to_json() {
            Ok(json) => info!("{}: {}", name, json),
            Err(_) => warn!("{}: snapshot did not fit the JSON buffer", name),
        }
        Timer::after(every).await;
    }
}

/// Operator commands as JSON lines on stdin, e.g. `{"SetTarget":26.0}`.
/// A `co2 ` prefix sends the command to the CO2 loop.
fn spawn_command_reader() {
    std::thread::spawn(|| {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let (channels, json) = match line.strip_prefix("co2 ") {
                Some(rest) => (&CO2_LOOP, rest),
                None => (&TEMPERATURE_LOOP, line.as_str()),
            };
            match Command::from_json(json) {
                Ok(command) => {
                    if channels.commands.try_send(command).is_err() {
                        warn!("Command queue full, dropped {:?}", command);
                    }
                }
                Err(e) => warn!("Unknown command '{}': {}", json.trim(), e),
            }
        }
    });
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_nanos()
        .init();

    let args = Args::parse();
    let temperature = temperature_config(&args);
    let co2 = LoopConfig::co2(args.ph_target, args.ph_target - 0.8);
    let period = temperature.period();
    let telemetry = Duration::from_secs(args.telemetry_secs);

    let mut store = FileStore::new(args.store.clone());
    let temperature_stored = store.mirror(temperature.namespace.as_str());
    let co2_stored = store.mirror(co2.namespace.as_str());

    let tank = TankModel::new(args.ambient);

    spawner.spawn(persistence_task(&TEMPERATURE_LOOP, args.store.clone())).unwrap();
    spawner.spawn(persistence_task(&CO2_LOOP, args.store.clone())).unwrap();

    spawner.spawn(simulated_tank_task(&TEMPERATURE_LOOP, tank, period)).unwrap();
    spawner.spawn(ph_probe_task(args.ph, co2.period())).unwrap();

    spawner.spawn(control_loop_task(temperature, &TEMPERATURE_LOOP, temperature_stored)).unwrap();
    spawner.spawn(control_loop_task(co2, &CO2_LOOP, co2_stored)).unwrap();

    spawner.spawn(telemetry_task("temperature", &TEMPERATURE_LOOP, telemetry)).unwrap();
    spawner.spawn(telemetry_task("co2", &CO2_LOOP, telemetry)).unwrap();

    spawn_command_reader();
}
