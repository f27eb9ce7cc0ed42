mod cli;
mod ui;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, ensure};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use fieldtrack::Dispatcher;
use fieldtrack::clock::SystemClock;
use fieldtrack::config::FieldtrackConfig;
use fieldtrack::lifecycle::{
    CompletionEvidence, DeliveryStatus, Domain, Status, TransitionEdge, TransitionOptions,
    TransitionTable, WorkOrder,
};
use fieldtrack::repository::InMemoryWorkOrderStore;
use fieldtrack::telemetry::{DistanceMode, PositionSample, SimulatedPositionSource};
use ui::TrackingProgress;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => FieldtrackConfig::load_from(path)?,
        None => FieldtrackConfig::load()?,
    };
    init_tracing(&config, cli.verbose);

    match cli.command {
        Command::Demo { json } => run_demo(&config, json).await?,
        Command::Table { domain } => print_table(&config, domain.into()),
        Command::Distance {
            lat1,
            lon1,
            lat2,
            lon2,
            legacy,
        } => {
            for (lat, lon) in [(lat1, lon1), (lat2, lon2)] {
                ensure!(
                    lat.abs() <= 90.0 && lon.abs() <= 180.0,
                    "coordinate out of range: {lat}, {lon}"
                );
            }
            let mode = if legacy {
                DistanceMode::LegacyPlanar
            } else {
                DistanceMode::Haversine
            };
            let km = mode.distance_km(
                &PositionSample::at(lat1, lon1, 0),
                &PositionSample::at(lat2, lon2, 0),
            );
            println!("{km:.3} km ({mode:?})");
        }
    }
    Ok(())
}

// RUST_LOG wins over the config file; --verbose wins over both.
fn init_tracing(config: &FieldtrackConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_table(config: &FieldtrackConfig, domain: Domain) {
    let table = TransitionTable::new(config.lifecycle.repair_policy);
    match domain {
        Domain::Delivery => println!("delivery"),
        Domain::Repair => println!("repair ({:?} policy)", table.repair_policy()),
    }
    for (from, to, edge) in table.edges(domain) {
        match edge {
            TransitionEdge::Move => println!("  {from} -> {to}"),
            TransitionEdge::Reopen => println!("  {from} -> {to}  (reopen)"),
        }
    }
}

const DEMO_ROUTE_LEN: i64 = 12;

// A short drive down Av. Paulista, one fix every 15 s. One fix has no speed.
fn demo_route() -> Vec<PositionSample> {
    (0..DEMO_ROUTE_LEN)
        .map(|i| {
            let sample = PositionSample::at(
                -23.5614 + 0.0009 * i as f64,
                -46.6559 + 0.0011 * i as f64,
                1_700_000_000_000 + 15_000 * i,
            )
            .with_accuracy(8.0);
            if i == 5 {
                sample
            } else {
                sample.with_speed(6.0 + (i % 4) as f64 * 2.0)
            }
        })
        .collect()
}

async fn run_demo(config: &FieldtrackConfig, json: bool) -> Result<()> {
    let store = Arc::new(InMemoryWorkOrderStore::new());
    store.insert(WorkOrder::new("DLV-1001", Domain::Delivery)).await?;
    store.insert(WorkOrder::new("DLV-1002", Domain::Delivery)).await?;
    let source =
        SimulatedPositionSource::route(demo_route()).with_interval(Duration::from_millis(120));
    let dispatcher = Dispatcher::new(store, Arc::new(source), Arc::new(SystemClock), config);

    // Lifecycle: completion needs evidence, a finished delivery only reopens.
    let steps: Vec<(Status, TransitionOptions)> = vec![
        (DeliveryStatus::Assigned.into(), TransitionOptions::by("dispatch")),
        (DeliveryStatus::Completed.into(), TransitionOptions::by("driver-7")),
        (
            DeliveryStatus::Completed.into(),
            TransitionOptions::by("driver-7")
                .with_evidence(CompletionEvidence::photos(["photo-311"])),
        ),
        (DeliveryStatus::InTransit.into(), TransitionOptions::by("driver-7")),
        (
            DeliveryStatus::Assigned.into(),
            TransitionOptions::by("dispatch").with_note("customer asked for redelivery"),
        ),
    ];
    let progress = TrackingProgress::start("DLV-1001");
    for (target, opts) in steps {
        match dispatcher.request_transition("DLV-1001", target, opts).await {
            Ok(done) => {
                if let Some(entry) = &done.entry {
                    progress.transition(entry);
                }
            }
            Err(failure) => progress.rejected(target, &failure.error.to_string()),
        }
    }
    progress.finish();
    let history = dispatcher.status_history("DLV-1001").await?;

    // Tracking: a second delivery driven through the simulated route.
    for (target, actor) in [
        (DeliveryStatus::Assigned, "dispatch"),
        (DeliveryStatus::InTransit, "driver-3"),
    ] {
        dispatcher
            .request_transition("DLV-1002", target.into(), TransitionOptions::by(actor))
            .await?;
    }
    let grant = dispatcher.acquire_permission().await?;
    dispatcher.start_tracking("DLV-1002", None, &grant).await?;

    let progress = TrackingProgress::start("DLV-1002");
    if let Some(mut reader) = dispatcher.telemetry_reader("DLV-1002").await {
        let drive = async {
            loop {
                let summary = reader.current();
                progress.update(&summary);
                if summary.sample_count >= DEMO_ROUTE_LEN as u64
                    || reader.changed().await.is_none()
                {
                    break;
                }
            }
        };
        if tokio::time::timeout(Duration::from_secs(10), drive).await.is_err() {
            progress.warn("route did not finish in time, completing anyway");
        }
    }
    let done = dispatcher
        .request_transition(
            "DLV-1002",
            DeliveryStatus::Completed.into(),
            TransitionOptions::by("driver-3")
                .with_evidence(CompletionEvidence::photos(["photo-907", "photo-908"])),
        )
        .await?;
    if let Some(e) = &done.telemetry_error {
        progress.warn(&format!("telemetry not archived: {e}"));
    }
    progress.finish();
    let summary = dispatcher.telemetry("DLV-1002").await?;
    info!(
        work_order_id = %done.work_order.id,
        version = done.work_order.version,
        "demo finished"
    );

    if json {
        ui::print_json(&history);
        ui::print_json(&summary);
    } else {
        ui::print_history("DLV-1001", &history);
        ui::print_history("DLV-1002", &dispatcher.status_history("DLV-1002").await?);
        ui::print_summary(&summary);
    }
    Ok(())
}
