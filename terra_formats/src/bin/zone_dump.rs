use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use terra_formats::zone::HANDLE_NONE;
use terra_formats::{read_zone, CodecTable};
use terra_registry::Registry;

/// Prints the structure of a zone file as JSON.
#[derive(Parser, Debug)]
#[command(about = "Dump the object tree of a binary zone file", version)]
struct Args {
    /// Path to a .rfgzone_pc / .layer_pc file
    zone: PathBuf,

    /// Include every property value instead of just names
    #[arg(long)]
    properties: bool,
}

#[derive(Serialize)]
struct ZoneSummary {
    version: u32,
    object_count: usize,
    root_count: usize,
    district_hash: u32,
    district_flags: u32,
    has_relation_data: bool,
    objects: Vec<ObjectSummary>,
}

#[derive(Serialize)]
struct ObjectSummary {
    name: String,
    uid: u64,
    handle: u32,
    parent: Option<u32>,
    property_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    properties: Option<Vec<(String, String)>>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let bytes = fs::read(&args.zone)
        .with_context(|| format!("reading zone file {}", args.zone.display()))?;

    let registry = Registry::new();
    let table = CodecTable::new();
    let zone = read_zone(&bytes, &registry, &table)
        .with_context(|| format!("parsing {}", args.zone.display()))?;

    let mut objects = Vec::with_capacity(zone.objects.len());
    for (object, link) in zone.objects.iter().zip(&zone.links) {
        let props = registry.properties(*object)?;
        objects.push(ObjectSummary {
            name: registry.object_name(*object)?,
            uid: registry.object_uid(*object)?,
            handle: link.handle,
            parent: (link.parent != HANDLE_NONE).then_some(link.parent),
            property_names: props.iter().map(|(name, _)| name.clone()).collect(),
            properties: args.properties.then(|| {
                props
                    .iter()
                    .map(|(name, value)| (name.clone(), format!("{value:?}")))
                    .collect()
            }),
        });
    }

    let summary = ZoneSummary {
        version: zone.version,
        object_count: zone.objects.len(),
        root_count: zone.roots.len(),
        district_hash: zone.district_hash,
        district_flags: zone.district_flags,
        has_relation_data: zone.relation_data.is_some(),
        objects,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
