//! Name hashing used by the zone container.
//!
//! Property names and object classnames are stored on disk as 32-bit CRC
//! hashes (CRC-32/JAMCRC: reflected polynomial, no final inversion). The
//! routine lives here rather than behind a general-purpose crate because the
//! exact variant is a wire-format constant; the unit tests pin the values.

use std::collections::HashMap;
use std::sync::OnceLock;

const POLYNOMIAL: u32 = 0xEDB8_8320;

/// Hashes a property or classname the way the container does.
pub fn hash_name(name: &str) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in name.as_bytes() {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (POLYNOMIAL & mask);
        }
    }
    crc
}

/// Object classnames that appear in zone files. The on-disk object header
/// only carries the hash; this list lets the importer give registry objects
/// readable names.
pub const ZONE_CLASSNAMES: &[&str] = &[
    "obj_zone",
    "object_bounding_box",
    "object_dummy",
    "player_start",
    "trigger_region",
    "object_mover",
    "general_mover",
    "rfg_mover",
    "shape_cutter",
    "object_effect",
    "item",
    "weapon",
    "ladder",
    "obj_light",
    "cover_node",
    "navpoint",
    "multi_object_marker",
    "multi_object_flag",
    "object_action_node",
    "object_squad_spawn_node",
    "object_npc_spawn_node",
    "object_guard_node",
    "object_path_road",
    "object_vehicle_spawn_node",
    "object_delivery_node",
    "object_activity_spawn",
    "object_mission_start_node",
    "object_demolitions_master_node",
    "object_restricted_area",
    "object_safehouse",
    "object_convoy_end_point",
    "object_courier_end_point",
    "object_riding_shotgun_node",
    "object_upgrade_node",
    "object_ambient_behavior_region",
    "object_roadblock_node",
    "object_spawn_region",
    "obj_patrol",
    "navpoint_patrol",
    "constraint",
];

fn classname_index() -> &'static HashMap<u32, &'static str> {
    static INDEX: OnceLock<HashMap<u32, &'static str>> = OnceLock::new();
    INDEX.get_or_init(|| {
        ZONE_CLASSNAMES
            .iter()
            .map(|name| (hash_name(name), *name))
            .collect()
    })
}

/// Resolves a classname hash back to its string, when known.
pub fn classname_for_hash(hash: u32) -> Option<&'static str> {
    classname_index().get(&hash).copied()
}
