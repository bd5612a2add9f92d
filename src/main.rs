//! Demo driver: a periodic probe, a zero-delay event chain and a second
//! thread injecting commands, all on one scheduler.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use eventcore::config::{load_config, SchedulerConfig};
use eventcore::error::BoxError;
use eventcore::event::EventHandle;
use eventcore::observer::{HookResult, SchedulerObserver};
use eventcore::store::{BucketStore, HeapStore};
use eventcore::timer::PeriodicTimeout;
use eventcore::{CallableResult, Scheduler, SimTime};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StoreKind {
    Bucket,
    Heap,
}

#[derive(Parser, Debug)]
#[command(name = "eventcore")]
#[command(about = "Run a small discrete-event workload and print a summary")]
struct Args {
    /// TOML scheduler configuration.
    #[arg(long)]
    config: Option<String>,
    /// Simulated seconds to run for; overrides `stop_at` from the config.
    #[arg(long)]
    until: Option<f64>,
    /// Probe period in simulated milliseconds.
    #[arg(long, default_value_t = 250)]
    probe_ms: u64,
    /// Length of the zero-delay event chain started at the origin.
    #[arg(long, default_value_t = 16)]
    chain: u32,
    /// Commands injected from a second thread.
    #[arg(long, default_value_t = 8)]
    commands: u64,
    #[arg(long, value_enum, default_value_t = StoreKind::Bucket)]
    store: StoreKind,
}

/// Counts what the engine reports while the demo runs.
#[derive(Default)]
struct Summary {
    processed: u64,
    instants: u64,
    canceled: u64,
}

impl SchedulerObserver for Summary {
    fn on_process_one_event(&mut self, _event: &EventHandle) -> HookResult {
        self.processed += 1;
        Ok(())
    }
    fn on_new_sim_time(&mut self, _time: SimTime) -> HookResult {
        self.instants += 1;
        Ok(())
    }
    fn on_cancel_event(&mut self, _event: &EventHandle) -> HookResult {
        self.canceled += 1;
        Ok(())
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

const DEFAULT_RUN_SECS: f64 = 10.0;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run() {
        tracing::error!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), BoxError> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path);
            load_config(path)?
        }
        None => SchedulerConfig::default(),
    };
    if args.until.is_some() {
        config.stop_at = args.until;
    }
    // The probe never runs dry, so something has to end the run.
    if config.stop_at.is_none() {
        config.stop_at = Some(DEFAULT_RUN_SECS);
    }
    config.validate()?;

    let mut sched = match args.store {
        StoreKind::Bucket => Scheduler::from_config_with_store(&config, BucketStore::new()),
        StoreKind::Heap => Scheduler::from_config_with_store(&config, HeapStore::new()),
    };
    let summary = sched.add_observer(Box::new(Summary::default()));

    // ── Periodic probe ────────────────────────────────────────
    let samples = Rc::new(Cell::new(0u64));
    let probe = PeriodicTimeout::new();
    let counter = Rc::clone(&samples);
    probe.start_periodic_timeout(
        &mut sched,
        Duration::from_millis(args.probe_ms),
        Duration::ZERO,
        move |s| {
            counter.set(counter.get() + 1);
            tracing::debug!(at = %s.time(), "probe sample");
            Ok(())
        },
    )?;

    // ── Zero-delay chain ──────────────────────────────────────
    let links = Rc::new(Cell::new(0u32));
    if args.chain > 0 {
        let links = Rc::clone(&links);
        sched.schedule_now(move |s| chain_link(s, links, args.chain));
    }

    // ── Cross-thread producer ─────────────────────────────────
    let delivered = Arc::new(AtomicU64::new(0));
    let sender = sched.command_sender();
    let injected = Arc::clone(&delivered);
    let count = args.commands;
    let producer = thread::spawn(move || {
        for n in 0..count {
            let injected = Arc::clone(&injected);
            sender.queue_command(move |s| {
                s.schedule_now(move |s| {
                    injected.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(command = n, at = %s.time(), "injected event ran");
                    Ok(())
                });
                Ok(())
            });
            thread::sleep(Duration::from_millis(1));
        }
    });

    let processed = sched.start()?;
    if producer.join().is_err() {
        return Err("command producer thread panicked".into());
    }
    // Late commands still drain while the run is stopped; their events land
    // in the stopping instant.
    loop {
        let progressed = sched.process_one_event()?;
        if !progressed && sched.pending_commands() == 0 {
            break;
        }
    }

    let stats = sched
        .observer::<Summary>(summary)
        .ok_or("summary observer missing")?;

    println!("═══════════════════════════════════════════════════════");
    println!("  eventcore: discrete-event scheduler demo");
    println!("═══════════════════════════════════════════════════════");
    println!("  Store:            {}", sched.store_name());
    println!("  Final time:       {}", sched.time());
    println!("  Events processed: {} ({} reported)", processed, stats.processed);
    println!("  Instants visited: {}", stats.instants);
    println!("  Events canceled:  {}", stats.canceled);
    println!("  Probe samples:    {}", samples.get());
    println!("  Chain links:      {}", links.get());
    println!(
        "  Commands:         {}/{} delivered",
        delivered.load(Ordering::Relaxed),
        args.commands
    );
    println!("  Still queued:     {}", sched.size());
    println!("  Run state:        {:?}", sched.state());

    let failures = sched.take_observer_failures();
    if !failures.is_empty() {
        tracing::warn!(count = failures.len(), "observer hooks failed during the run");
    }
    Ok(())
}

fn chain_link(s: &mut Scheduler, links: Rc<Cell<u32>>, remaining: u32) -> CallableResult {
    links.set(links.get() + 1);
    if remaining > 1 {
        s.schedule_now(move |s| chain_link(s, links, remaining - 1));
    }
    Ok(())
}
