mod client;
mod config;
mod world;

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow, ensure};
use clap::Parser;
use netprop::{SnapshotConfig, SnapshotManager, SnapshotRef};

use client::{Client, ClientReport};
use config::SimConfig;
use world::World;

#[derive(Parser)]
#[command(name = "netprop-sim")]
#[command(about = "Drives the snapshot manager with a scripted world and delta-consuming clients")]
struct Args {
    #[arg(short, long, default_value_t = 600)]
    ticks: u32,

    #[arg(long, default_value_t = 60)]
    tick_rate: u32,

    #[arg(long, help = "Sleep between ticks instead of running flat out")]
    realtime: bool,

    #[arg(short, long, default_value_t = 64)]
    entities: usize,

    #[arg(short, long, default_value_t = 4)]
    clients: usize,

    #[arg(long, help = "Compress packed entities of at least this many bytes")]
    compress_threshold: Option<usize>,

    #[arg(long, default_value_t = 128, help = "Decompressed entities kept in the decode cache")]
    cache_size: usize,

    #[arg(long, default_value_t = 30, help = "Verify client state every N snapshots (0 disables)")]
    verify_interval: u32,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    ensure!(args.entities > 0, "need at least one entity");
    ensure!(args.tick_rate > 0, "tick rate must be positive");

    let config = SimConfig {
        ticks: args.ticks,
        tick_rate: args.tick_rate,
        realtime: args.realtime,
        entities: args.entities,
        clients: args.clients,
        verify_interval: args.verify_interval,
        snapshot: SnapshotConfig {
            max_entities: args.entities,
            decode_cache_size: args.cache_size,
            compress_threshold_bytes: args.compress_threshold,
            ..Default::default()
        },
        ..Default::default()
    };

    run(config)
}

fn run(config: SimConfig) -> Result<()> {
    let registry = Arc::new(world::registry()?);
    for table in registry.iter() {
        if let Some(name) = table.name() {
            let schema = registry.flattened(name)?;
            log::info!(
                "table {name}: {} props, signature {:08x}",
                schema.len(),
                schema.signature()
            );
        }
    }

    let manager = SnapshotManager::new(config.snapshot.clone());
    let mut world = World::new(config.entities, config.tick_rate);

    let mut senders = Vec::with_capacity(config.clients);
    let mut handles = Vec::with_capacity(config.clients);
    for id in 0..config.clients {
        let (tx, rx) = mpsc::channel::<SnapshotRef>();
        let client = Client::new(id, manager.clone(), registry.clone(), config.verify_interval)?;
        let handle = thread::Builder::new()
            .name(format!("client-{id}"))
            .spawn(move || client.run(rx))?;
        senders.push(tx);
        handles.push(handle);
    }

    log::info!(
        "simulating {} ticks with {} entities and {} clients",
        config.ticks,
        config.entities,
        config.clients
    );

    let tick_duration = Duration::from_secs_f64(1.0 / f64::from(config.tick_rate));
    let started = Instant::now();
    let mut failed_packs = 0u64;

    for tick in 1..=config.ticks {
        let tick_start = Instant::now();
        world.simulate(tick);

        let mut builder = manager.create_snapshot(tick);
        for (entity, actor) in world.actors().iter().enumerate() {
            let schema = registry.flattened(actor.kind().table_name())?;
            let values = actor.values(schema)?;
            if let Err(e) =
                manager.pack_entity(&mut builder, entity, schema, &values, actor.last_changed())
            {
                failed_packs += 1;
                log::warn!("tick {tick}: entity {entity} left out of snapshot: {e}");
            }
        }

        let snapshot = manager.publish(builder);
        senders.retain(|tx| tx.send(snapshot.clone()).is_ok());
        drop(snapshot);

        if config.stats_interval > 0 && tick % config.stats_interval == 0 {
            let stats = manager.stats();
            log::info!(
                "tick {tick}: {} live snapshots, {} encoded, {} reused, cache {}/{} hits",
                stats.live_snapshots,
                stats.encoded,
                stats.reused,
                stats.cache.hits,
                stats.cache.hits + stats.cache.misses
            );
        }

        if config.realtime
            && let Some(remaining) = tick_duration.checked_sub(tick_start.elapsed())
        {
            thread::sleep(remaining);
        }
    }
    drop(senders);

    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        let report = handle
            .join()
            .map_err(|_| anyhow!("client thread panicked"))??;
        reports.push(report);
    }

    summarize(&manager, &reports, failed_packs, started.elapsed());
    ensure!(
        reports.iter().all(|report| report.mismatches == 0),
        "client state diverged from the server"
    );
    Ok(())
}

fn summarize(
    manager: &SnapshotManager,
    reports: &[ClientReport],
    failed_packs: u64,
    elapsed: Duration,
) {
    for report in reports {
        let ratio = if report.full_bytes > 0 {
            report.delta_bytes as f64 / report.full_bytes as f64 * 100.0
        } else {
            0.0
        };
        log::info!(
            "client {}: {} snapshots, {} props, {} delta bytes ({ratio:.1}% of full), {} mismatches",
            report.client,
            report.snapshots,
            report.props,
            report.delta_bytes,
            report.mismatches
        );
    }

    let stats = manager.stats();
    log::info!(
        "done in {:.2?}: {} snapshots deleted, {} still live, {} encoded, {} reused, {} failed",
        elapsed,
        stats.deleted_snapshots,
        stats.live_snapshots,
        stats.encoded,
        stats.reused,
        failed_packs
    );
}
