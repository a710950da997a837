//! Roam Node - CLI for the roaming adapter
//!
//! Runs a roaming adapter against a logging partner, fed by a simulated
//! charging pool whose EVSEs change status, report meter values and finish
//! charging sessions.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults
//! roam-node --name hubject
//!
//! # Faster cycles, more EVSEs, run for a minute
//! roam-node --name hubject --evse-count 8 \
//!     --data-every-ms 5000 --status-every-ms 500 --cdr-every-ms 3000 --run-secs 60
//!
//! # Read adapter settings from a JSON file
//! roam-node --config adapter.json
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use roam_adapter::{
    AdapterConfig, AdapterEvent, BoxError, CdrSnapshot, DataAndStatusSnapshot,
    FastStatusSnapshot, FlushCycle, FlushExecutor, FlushReport, IncludeFilters, RoamingAdapter,
};
use roam_core::{
    ChargeDetailRecord, ChargingPool, ChargingPoolId, ChargingStation, ChargingStationId,
    ChargingStationOperator, ChargingStationOperatorId, EnergyStatus, Evse, EvseAdminStatusType,
    EvseId, EvseStatusType, PropertyUpdateInfo, StatusUpdate, Timestamped, TransmissionType,
    Warning,
};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Roaming adapter demo node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Adapter identifier
    #[arg(short, long, default_value = "roam-node")]
    name: String,

    /// JSON file with adapter settings (overrides the period flags)
    #[arg(short, long)]
    config: Option<String>,

    /// Number of simulated EVSEs
    #[arg(long, default_value = "4")]
    evse_count: u32,

    /// Data+status flush period in milliseconds
    #[arg(long, default_value = "31000")]
    data_every_ms: u64,

    /// Fast status flush period in milliseconds
    #[arg(long, default_value = "3000")]
    status_every_ms: u64,

    /// Charge detail record flush period in milliseconds
    #[arg(long, default_value = "15000")]
    cdr_every_ms: u64,

    /// How long to simulate before draining and stopping
    #[arg(long, default_value = "40")]
    run_secs: u64,

    /// Interval between simulated changes in milliseconds
    #[arg(long, default_value = "250")]
    tick_ms: u64,

    /// Simulated partner latency per flush in milliseconds
    #[arg(long, default_value = "120")]
    latency_ms: u64,

    /// Probability that a simulated flush fails
    #[arg(long, default_value = "0.05")]
    fail_rate: f64,

    /// Seed for the simulation (random when omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Do not push entity data
    #[arg(long)]
    no_push_data: bool,

    /// Do not push EVSE status
    #[arg(long)]
    no_push_status: bool,

    /// Do not send charge detail records
    #[arg(long)]
    no_cdrs: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Setup logging
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Build configuration
    let mut config = match &args.config {
        Some(path) => AdapterConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => AdapterConfig::new(&args.name, "Simulated roaming partner").with_flush_periods(
            Duration::from_millis(args.data_every_ms),
            Duration::from_millis(args.status_every_ms),
            Duration::from_millis(args.cdr_every_ms),
        ),
    };
    if args.no_push_data {
        config = config.without_push_data();
    }
    if args.no_push_status {
        config = config.without_push_status();
    }
    if args.no_cdrs {
        config = config.without_charge_detail_records();
    }

    // Print banner
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║           Roam Node - Roaming Partner Synchronization        ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Adapter:  {:<50} ║", truncate(&config.id, 50));
    println!("║  Partner:  {:<50} ║", truncate(&config.name, 50));
    println!("║  Data:     {:<50} ║", format!("every {:?}", config.data_flush_every));
    println!("║  Status:   {:<50} ║", format!("every {:?}", config.status_flush_every));
    println!("║  CDRs:     {:<50} ║", format!("every {:?}", config.cdr_flush_every));
    println!("║  EVSEs:    {:<50} ║", args.evse_count);
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let executor = Arc::new(LoggingExecutor {
        latency: Duration::from_millis(args.latency_ms),
        fail_rate: args.fail_rate.clamp(0.0, 1.0),
    });
    let adapter = Arc::new(RoamingAdapter::new(config, IncludeFilters::new(), executor)?);

    let printer = tokio::spawn(print_events(adapter.subscribe()));
    adapter.start()?;

    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut station = SimulatedStation::new(args.evse_count, rng)?;
    station.publish(&adapter).await;

    info!("Simulating for {}s...", args.run_secs);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(args.run_secs);
    let mut ticker = tokio::time::interval(Duration::from_millis(args.tick_ms.max(1)));
    while tokio::time::Instant::now() < deadline {
        ticker.tick().await;
        station.step(&adapter).await?;
    }

    info!("Draining queues: {:?}", adapter.pending());
    for cycle in FlushCycle::ALL {
        let outcome = adapter.flush_now(cycle).await;
        info!("Final {} flush: {:?}", cycle, outcome);
    }

    adapter.shutdown().await;
    printer.abort();

    Ok(())
}

// ============================================================================
// Partner
// ============================================================================

/// Stand-in partner that logs every batch it receives
struct LoggingExecutor {
    latency: Duration,
    fail_rate: f64,
}

impl LoggingExecutor {
    async fn deliver(&self, what: &str, run_id: u64, items: usize) -> Result<FlushReport, BoxError> {
        tokio::time::sleep(self.latency).await;

        if rand::random::<f64>() < self.fail_rate {
            return Err(format!("partner timed out on {} batch #{}", what, run_id).into());
        }

        info!("Partner accepted {} batch #{}: {} items", what, run_id, items);
        Ok(FlushReport::ok())
    }
}

#[async_trait]
impl FlushExecutor for LoggingExecutor {
    async fn flush_data_and_status(
        &self,
        snapshot: DataAndStatusSnapshot,
    ) -> Result<FlushReport, BoxError> {
        debug!(
            "Data batch: {} EVSEs added, {} updated, {} removed, {} delayed status",
            snapshot.evses.added.len(),
            snapshot.evses.updated.len(),
            snapshot.evses.removed.len(),
            snapshot.evses.delayed_status.len()
        );
        self.deliver("data", snapshot.run_id, snapshot.len()).await
    }

    async fn flush_fast_status(&self, snapshot: FastStatusSnapshot) -> Result<FlushReport, BoxError> {
        for update in &snapshot.evses.status {
            debug!(
                "EVSE {}: {:?} -> {:?}",
                update.id(),
                update.old_status().value,
                update.new_status().value
            );
        }
        self.deliver("status", snapshot.run_id, snapshot.len()).await
    }

    async fn flush_charge_detail_records(
        &self,
        snapshot: CdrSnapshot,
    ) -> Result<FlushReport, BoxError> {
        let mut report = self
            .deliver("charge detail record", snapshot.run_id, snapshot.len())
            .await?;

        for cdr in snapshot.records.iter().filter(|cdr| cdr.energy_kwh < 1.0) {
            report = report.with_warning(Warning::new(format!(
                "session {} billed only {:.2} kWh",
                cdr.session_id, cdr.energy_kwh
            )));
        }
        Ok(report)
    }
}

async fn print_events(mut events: tokio::sync::broadcast::Receiver<AdapterEvent>) {
    loop {
        match events.recv().await {
            Ok(AdapterEvent::FlushStarted { cycle, run_id, .. }) => {
                debug!("[{}] flush #{} started", cycle, run_id);
            }
            Ok(AdapterEvent::FlushFinished {
                cycle,
                run_id,
                items,
                duration,
                ..
            }) => {
                info!("[{}] flush #{} finished: {} items in {:?}", cycle, run_id, items, duration);
            }
            Ok(AdapterEvent::Exception {
                cycle,
                run_id,
                message,
                ..
            }) => {
                warn!("[{}] flush #{} failed: {}", cycle, run_id, message);
            }
            Ok(AdapterEvent::Warnings {
                method, warnings, ..
            }) => {
                for warning in warnings {
                    warn!("{}: {}", method, warning);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event printer lagged, {} events skipped", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

// ============================================================================
// Simulated charging pool
// ============================================================================

const STATUS_CHOICES: [EvseStatusType; 5] = [
    EvseStatusType::Available,
    EvseStatusType::Charging,
    EvseStatusType::Reserved,
    EvseStatusType::Blocked,
    EvseStatusType::Faulted,
];

struct SimulatedEvse {
    evse: Evse,
    session: Option<(u32, chrono::DateTime<chrono::Utc>)>,
    energy_kwh: f64,
}

struct SimulatedStation {
    operator: ChargingStationOperator,
    pool: ChargingPool,
    station: ChargingStation,
    evses: Vec<SimulatedEvse>,
    sessions: u32,
    rng: StdRng,
}

impl SimulatedStation {
    fn new(evse_count: u32, rng: StdRng) -> Result<Self, Box<dyn std::error::Error>> {
        let operator_id = ChargingStationOperatorId::new("DE*EKK")?;
        let pool_id = ChargingPoolId::new("DE*EKK*P001")?;
        let station_id = ChargingStationId::new("DE*EKK*S001")?;

        let mut station = ChargingStation::new(station_id.clone(), pool_id.clone(), "Depot North");
        let mut evses = Vec::new();
        for i in 1..=evse_count.max(1) {
            let id = EvseId::new(format!("DE*EKK*E001*{}", i))?;
            station = station.with_evse(id.clone());
            evses.push(SimulatedEvse {
                evse: Evse::new(id, station_id.clone())
                    .with_description(format!("Connector {}", i))
                    .with_status(EvseStatusType::Available),
                session: None,
                energy_kwh: 0.0,
            });
        }

        Ok(Self {
            operator: ChargingStationOperator::new(operator_id.clone(), "Elektrokombinacija"),
            pool: ChargingPool::new(pool_id, operator_id, "Depot").with_address("Industrijska 12"),
            station,
            evses,
            sessions: 0,
            rng,
        })
    }

    /// Announce every entity to the partner
    async fn publish(&self, adapter: &RoamingAdapter) {
        let tx = TransmissionType::Enqueue;
        adapter.add(self.operator.clone(), tx, None).await;
        adapter.add(self.pool.clone(), tx, None).await;
        adapter.add(self.station.clone(), tx, None).await;
        for sim in &self.evses {
            adapter.add(sim.evse.clone(), tx, None).await;
        }
        info!(
            "Published operator {}, pool {}, station {} with {} EVSEs",
            self.operator.id,
            self.pool.id,
            self.station.id,
            self.evses.len()
        );
    }

    /// Produce one random change
    async fn step(&mut self, adapter: &RoamingAdapter) -> Result<(), Box<dyn std::error::Error>> {
        let index = self.rng.gen_range(0..self.evses.len());
        let roll: f64 = self.rng.gen();

        if roll < 0.03 {
            self.flip_admin_status(adapter, index).await;
        } else if roll < 0.06 {
            self.change_max_power(adapter, index).await?;
        } else if roll < 0.25 {
            self.report_energy(adapter, index).await;
        } else {
            self.change_status(adapter, index).await;
        }
        Ok(())
    }

    async fn change_status(&mut self, adapter: &RoamingAdapter, index: usize) {
        let new = STATUS_CHOICES[self.rng.gen_range(0..STATUS_CHOICES.len())];
        let sim = &mut self.evses[index];
        let previous = sim.evse.status.clone();
        let old = previous.value;
        if old == new {
            return;
        }

        sim.evse.status = Timestamped::now(new);
        let now = sim.evse.status.timestamp;
        let finished = match (old, new) {
            (_, EvseStatusType::Charging) => {
                self.sessions += 1;
                sim.session = Some((self.sessions, now));
                sim.energy_kwh = 0.0;
                None
            }
            (EvseStatusType::Charging, _) => sim.session.take().map(|(session, started)| {
                ChargeDetailRecord::new(
                    sim.evse.id.clone(),
                    format!("session-{}", session),
                    started,
                    now,
                    sim.energy_kwh,
                )
            }),
            _ => None,
        };

        let update = StatusUpdate::new(sim.evse.id.clone(), previous, sim.evse.status.clone());
        let result = adapter
            .update_status::<Evse>(update, TransmissionType::Enqueue, None)
            .await;
        debug!("EVSE {} {:?} -> {:?}: {}", sim.evse.id, old, new, result.outcome);

        if let Some(cdr) = finished {
            let result = adapter
                .send_charge_detail_records(vec![cdr], TransmissionType::Enqueue, None)
                .await;
            debug!("Charge detail record: {}", result.outcome);
        }
    }

    async fn report_energy(&mut self, adapter: &RoamingAdapter, index: usize) {
        let sim = &mut self.evses[index];
        if sim.session.is_none() {
            return;
        }

        let power_kw = self.rng.gen_range(3.0..sim.evse.max_power_kw.max(3.1));
        let before = EnergyStatus {
            power_kw,
            energy_kwh: sim.energy_kwh,
            soc_percent: None,
        };
        sim.energy_kwh += power_kw / 60.0;
        let after = EnergyStatus {
            energy_kwh: sim.energy_kwh,
            ..before
        };

        adapter
            .update_energy_status(
                StatusUpdate::new(sim.evse.id.clone(), Timestamped::now(before), Timestamped::now(after)),
                TransmissionType::Enqueue,
                None,
            )
            .await;
    }

    async fn flip_admin_status(&mut self, adapter: &RoamingAdapter, index: usize) {
        let sim = &mut self.evses[index];
        let previous = sim.evse.admin_status.clone();
        let new = if previous.value == EvseAdminStatusType::Operational {
            EvseAdminStatusType::OutOfService
        } else {
            EvseAdminStatusType::Operational
        };
        sim.evse.admin_status = Timestamped::now(new);

        info!("EVSE {} admin status {:?} -> {:?}", sim.evse.id, previous.value, new);
        adapter
            .update_admin_status::<Evse>(
                StatusUpdate::new(sim.evse.id.clone(), previous, sim.evse.admin_status.clone()),
                TransmissionType::Enqueue,
                None,
            )
            .await;
    }

    async fn change_max_power(
        &mut self,
        adapter: &RoamingAdapter,
        index: usize,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let sim = &mut self.evses[index];
        let old = sim.evse.max_power_kw;
        let new = if old > 22.0 { 22.0 } else { 150.0 };
        sim.evse.max_power_kw = new;

        let info = PropertyUpdateInfo::new("max_power_kw", Some(json!(old)), Some(json!(new)))?
            .with_data_source("simulation");
        let result = adapter
            .update(sim.evse.clone(), info, TransmissionType::Direct, None)
            .await;
        info!("EVSE {} max power {} -> {} kW: {}", sim.evse.id, old, new, result.outcome);
        Ok(())
    }
}

/// Truncate string with ellipsis
fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len - 3])
    }
}
