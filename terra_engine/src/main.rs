mod cli;

use std::fs;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use serde::Serialize;
use terra_engine::Territory;
use terra_formats::{write_zone, CodecTable, DirArchive};
use terra_registry::Registry;
use terra_tasks::TaskPool;

#[derive(Serialize)]
struct TerritorySummary {
    zone_count: usize,
    total_objects: usize,
    zones: Vec<ZoneSummary>,
}

#[derive(Serialize)]
struct ZoneSummary {
    name: String,
    object_count: usize,
    root_count: usize,
    district_flags: u32,
}

fn main() -> Result<()> {
    let args = cli::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let pool = Arc::new(match args.workers {
        Some(count) => TaskPool::with_workers(count)?,
        None => TaskPool::new()?,
    });
    if pool.worker_count() < 2 {
        bail!("territory loading needs at least 2 workers; pass --workers 2");
    }
    info!("task pool running {} workers", pool.worker_count());

    let registry = Arc::new(Registry::new());
    let archive = Arc::new(
        DirArchive::open(&args.archive)
            .with_context(|| format!("opening archive dir {}", args.archive.display()))?,
    );
    let territory = Territory::new(Arc::clone(&registry), archive);

    let load = territory.start_load(&pool)?;
    load.wait(None);
    if !territory.ready() {
        bail!(
            "territory load did not reach Ready (stage {:?})",
            territory.stage()
        );
    }

    let zones = territory.zones();
    let summary = TerritorySummary {
        zone_count: zones.len(),
        total_objects: zones.iter().map(|zone| zone.data.objects.len()).sum(),
        zones: zones
            .iter()
            .map(|zone| ZoneSummary {
                name: zone.name.clone(),
                object_count: zone.data.objects.len(),
                root_count: zone.data.roots.len(),
                district_flags: zone.data.district_flags,
            })
            .collect(),
    };
    info!(
        "loaded {} zones, {} objects",
        summary.zone_count, summary.total_objects
    );

    if let Some(dir) = &args.export {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating export dir {}", dir.display()))?;
        let table = CodecTable::new();
        for zone in &zones {
            let bytes = write_zone(&zone.data, &registry, &table)
                .with_context(|| format!("exporting zone {}", zone.name))?;
            let path = dir.join(&zone.name);
            fs::write(&path, bytes)
                .with_context(|| format!("writing {}", path.display()))?;
        }
        info!("exported {} zones to {}", zones.len(), dir.display());
    }

    if let Some(path) = &args.summary_json {
        let json = serde_json::to_string_pretty(&summary)?;
        fs::write(path, json)
            .with_context(|| format!("writing summary {}", path.display()))?;
        info!("wrote territory summary to {}", path.display());
    }

    Ok(())
}
