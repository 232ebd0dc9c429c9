//! Headless AOI tick loop
//!
//! This binary:
//! 1. Loads a [`SimConfig`] (JSON file from `AOI_SIM_CONFIG`, then env overrides)
//! 2. Spawns deterministic circular walkers into one [`Space`]; every n-th
//!    walker watches its surroundings
//! 3. Moves every walker each tick and delivers the resulting enter/leave
//!    events through a [`MapRegistry`]
//!
//! Runs for `TICKS` ticks (0 = until Ctrl-C) at `TARGET_TPS`.

mod config;
mod walker;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rgb_aoi::{AoiEvent, AoiEventKind, EntityId};
use rgb_aoi_dispatch::{MapRegistry, Space, TickStats};
use tracing::{debug, info, warn};

use crate::config::SimConfig;
use crate::walker::Walker;

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rgb_aoi_sim=info".parse()?)
                .add_directive("rgb_aoi_dispatch=info".parse()?),
        )
        .init();

    let config = SimConfig::load()?;
    info!(?config, "Starting AOI simulation");

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;
    }

    let mut space = Space::new(0, config.aoi.clone())?;
    space.dispatcher().observe(AoiEventKind::Entered, |event: &AoiEvent| {
        debug!(watcher = %event.watcher, observed = %event.observed, "entered aoi");
    });
    space.dispatcher().observe(AoiEventKind::Left, |event: &AoiEvent| {
        debug!(watcher = %event.watcher, observed = %event.observed, "left aoi");
    });

    let mut registry = MapRegistry::new();
    let walkers: Vec<Walker> = (0..config.entity_count)
        .map(|i| Walker::new(i, config.world_size))
        .collect();

    for walker in &walkers {
        space.spawn(walker.entity, walker.position(0))?;
    }
    let mut watchers = Vec::new();
    for walker in walkers.iter().step_by(config.watcher_every as usize) {
        registry.register(walker.entity);
        space.watch_default(walker.entity)?;
        watchers.push(walker.entity);
    }
    info!(
        entities = walkers.len(),
        watchers = watchers.len(),
        "Spawned walkers"
    );

    let target_delta = config.tick_budget()?;
    let mut window = TickStats::default();
    let mut slow_ticks = 0_u64;

    while running.load(Ordering::SeqCst) {
        let start = Instant::now();
        let tick = space.tick_count() + 1;

        for walker in &walkers {
            space.move_entity(walker.entity, walker.position(tick))?;
        }
        let stats = space.tick(&mut registry);
        accumulate(&mut window, stats);

        if tick.is_multiple_of(config.report_every) {
            report(&space, &mut registry, &watchers, window);
            window = TickStats::default();
        }

        if config.ticks > 0 && tick >= config.ticks {
            break;
        }

        let elapsed = start.elapsed();
        if elapsed < target_delta {
            std::thread::sleep(target_delta - elapsed);
        } else {
            slow_ticks += 1;
            warn!(tick, ?elapsed, "tick over budget");
        }
    }

    space.system().validate()?;
    info!(
        ticks = space.tick_count(),
        slow_ticks,
        dispatch = ?space.dispatcher().stats(),
        "Shutting down"
    );
    Ok(())
}

fn accumulate(window: &mut TickStats, stats: TickStats) {
    window.tick = stats.tick;
    window.entered += stats.entered;
    window.left += stats.left;
    window.delivered += stats.delivered;
    window.undelivered += stats.undelivered;
}

fn report(space: &Space, registry: &mut MapRegistry, watchers: &[EntityId], window: TickStats) {
    let mut received = 0;
    for &watcher in watchers {
        received += registry.take_inbox(watcher).len();
    }
    let total_aoi: usize = watchers.iter().map(|&w| space.aoi(w).len()).sum();
    let mean_aoi = total_aoi as f32 / watchers.len().max(1) as f32;

    info!(
        tick = window.tick,
        entered = window.entered,
        left = window.left,
        received,
        undelivered = window.undelivered,
        mean_aoi,
        "aoi traffic"
    );
}
