//! Name-driven property codec tables for the zone wire encoding.
//!
//! Each property record on disk is `u16 type tag, u16 payload size, u32
//! hashed name, payload`, padded to 4-byte alignment. A [`PropertyKind`]
//! describes one payload shape once — a label, the list of property names
//! known to use it, and a paired reader/writer — and [`CodecTable`] indexes
//! the kinds by name hash so import dispatch is a single map lookup instead
//! of a scan over every name list.

use std::collections::HashMap;
use std::io::Cursor;

use anyhow::{ensure, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use terra_registry::{ObjectHandle, Registry, Value};

use crate::hash::hash_name;
use crate::zone::ZoneError;

/// Wire type tags used by the container.
pub const TYPE_STRING: u16 = 4;
pub const TYPE_BOOL: u16 = 5;
pub const TYPE_DATA: u16 = 6;

/// Size of the fixed record header preceding each payload.
pub const RECORD_HEADER_SIZE: usize = 8;

/// Decodes one payload and sets the result on the target object.
pub type PropertyReader = fn(&[u8], &Registry, ObjectHandle, &str) -> Result<()>;

/// Encodes the named property back into payload bytes. `Ok(None)` means the
/// object simply doesn't carry the property.
pub type PropertyWriter = fn(&Registry, ObjectHandle, &str) -> Result<Option<Vec<u8>>>;

/// One payload shape shared by a set of property names.
pub struct PropertyKind {
    pub label: &'static str,
    pub tag: u16,
    pub names: &'static [&'static str],
    pub read: PropertyReader,
    pub write: PropertyWriter,
}

pub fn align4(len: usize) -> usize {
    (len + 3) & !3
}

/// Frames a payload as a full record, padding to 4-byte alignment. Fails if
/// the payload cannot be described by the u16 size field.
pub fn write_record(out: &mut Vec<u8>, tag: u16, name_hash: u32, payload: &[u8]) -> Result<()> {
    let size = u16::try_from(payload.len()).map_err(|_| ZoneError::PropertyTooLarge {
        hash: name_hash,
        len: payload.len(),
    })?;
    out.write_u16::<LittleEndian>(tag)?;
    out.write_u16::<LittleEndian>(size)?;
    out.write_u32::<LittleEndian>(name_hash)?;
    out.extend_from_slice(payload);
    while out.len() % 4 != 0 {
        out.push(0);
    }
    Ok(())
}

fn read_vec3(cursor: &mut Cursor<&[u8]>) -> Result<[f32; 3]> {
    Ok([
        cursor.read_f32::<LittleEndian>()?,
        cursor.read_f32::<LittleEndian>()?,
        cursor.read_f32::<LittleEndian>()?,
    ])
}

fn read_mat33(cursor: &mut Cursor<&[u8]>) -> Result<[[f32; 3]; 3]> {
    Ok([read_vec3(cursor)?, read_vec3(cursor)?, read_vec3(cursor)?])
}

fn push_vec3(out: &mut Vec<u8>, v: [f32; 3]) {
    for component in v {
        out.extend_from_slice(&component.to_le_bytes());
    }
}

fn push_mat33(out: &mut Vec<u8>, m: [[f32; 3]; 3]) {
    for row in m {
        push_vec3(out, row);
    }
}

fn string_read(payload: &[u8], registry: &Registry, object: ObjectHandle, name: &str) -> Result<()> {
    let end = payload
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(payload.len());
    let text = String::from_utf8_lossy(&payload[..end]).into_owned();
    registry.set_property(object, name, Value::String(text))?;
    Ok(())
}

fn string_write(registry: &Registry, object: ObjectHandle, name: &str) -> Result<Option<Vec<u8>>> {
    let Some(value) = registry.property(object, name)? else {
        return Ok(None);
    };
    let text = value.as_string()?;
    let mut payload = text.into_bytes();
    payload.push(0);
    Ok(Some(payload))
}

fn bool_read(payload: &[u8], registry: &Registry, object: ObjectHandle, name: &str) -> Result<()> {
    ensure!(payload.len() == 1, "bool payload is {} bytes", payload.len());
    registry.set_property(object, name, Value::Bool(payload[0] != 0))?;
    Ok(())
}

fn bool_write(registry: &Registry, object: ObjectHandle, name: &str) -> Result<Option<Vec<u8>>> {
    let Some(value) = registry.property(object, name)? else {
        return Ok(None);
    };
    Ok(Some(vec![u8::from(value.as_bool()?)]))
}

fn float_read(payload: &[u8], registry: &Registry, object: ObjectHandle, name: &str) -> Result<()> {
    ensure!(payload.len() == 4, "float payload is {} bytes", payload.len());
    let value = Cursor::new(payload).read_f32::<LittleEndian>()?;
    registry.set_property(object, name, Value::F32(value))?;
    Ok(())
}

fn float_write(registry: &Registry, object: ObjectHandle, name: &str) -> Result<Option<Vec<u8>>> {
    let Some(value) = registry.property(object, name)? else {
        return Ok(None);
    };
    Ok(Some(value.as_f32()?.to_le_bytes().to_vec()))
}

fn uint_read(payload: &[u8], registry: &Registry, object: ObjectHandle, name: &str) -> Result<()> {
    ensure!(payload.len() == 4, "uint payload is {} bytes", payload.len());
    let value = Cursor::new(payload).read_u32::<LittleEndian>()?;
    registry.set_property(object, name, Value::U32(value))?;
    Ok(())
}

fn uint_write(registry: &Registry, object: ObjectHandle, name: &str) -> Result<Option<Vec<u8>>> {
    let Some(value) = registry.property(object, name)? else {
        return Ok(None);
    };
    Ok(Some(value.as_u32()?.to_le_bytes().to_vec()))
}

fn vec3_read(payload: &[u8], registry: &Registry, object: ObjectHandle, name: &str) -> Result<()> {
    ensure!(payload.len() == 12, "vec3 payload is {} bytes", payload.len());
    let value = read_vec3(&mut Cursor::new(payload))?;
    registry.set_property(object, name, Value::Vec3(value))?;
    Ok(())
}

fn vec3_write(registry: &Registry, object: ObjectHandle, name: &str) -> Result<Option<Vec<u8>>> {
    let Some(value) = registry.property(object, name)? else {
        return Ok(None);
    };
    let mut payload = Vec::with_capacity(12);
    push_vec3(&mut payload, value.as_vec3()?);
    Ok(Some(payload))
}

fn mat33_read(payload: &[u8], registry: &Registry, object: ObjectHandle, name: &str) -> Result<()> {
    ensure!(payload.len() == 36, "mat33 payload is {} bytes", payload.len());
    let value = read_mat33(&mut Cursor::new(payload))?;
    registry.set_property(object, name, Value::Mat33(value))?;
    Ok(())
}

fn mat33_write(registry: &Registry, object: ObjectHandle, name: &str) -> Result<Option<Vec<u8>>> {
    let Some(value) = registry.property(object, name)? else {
        return Ok(None);
    };
    let mut payload = Vec::with_capacity(36);
    push_mat33(&mut payload, value.as_mat33()?);
    Ok(Some(payload))
}

fn bbox_read(payload: &[u8], registry: &Registry, object: ObjectHandle, name: &str) -> Result<()> {
    ensure!(
        payload.len() == 24,
        "bounding box payload is {} bytes",
        payload.len()
    );
    let mut cursor = Cursor::new(payload);
    let min = read_vec3(&mut cursor)?;
    let max = read_vec3(&mut cursor)?;
    registry.set_property(object, name, Value::BoundingBox { min, max })?;
    Ok(())
}

fn bbox_write(registry: &Registry, object: ObjectHandle, name: &str) -> Result<Option<Vec<u8>>> {
    let Some(value) = registry.property(object, name)? else {
        return Ok(None);
    };
    let (min, max) = value.as_bounding_box()?;
    let mut payload = Vec::with_capacity(24);
    push_vec3(&mut payload, min);
    push_vec3(&mut payload, max);
    Ok(Some(payload))
}

fn op_read(payload: &[u8], registry: &Registry, object: ObjectHandle, name: &str) -> Result<()> {
    ensure!(payload.len() == 48, "op payload is {} bytes", payload.len());
    let mut cursor = Cursor::new(payload);
    let position = read_vec3(&mut cursor)?;
    let orient = read_mat33(&mut cursor)?;
    registry.set_property(object, name, Value::Op { position, orient })?;
    Ok(())
}

fn op_write(registry: &Registry, object: ObjectHandle, name: &str) -> Result<Option<Vec<u8>>> {
    let Some(value) = registry.property(object, name)? else {
        return Ok(None);
    };
    let (position, orient) = value.as_op()?;
    let mut payload = Vec::with_capacity(48);
    push_vec3(&mut payload, position);
    push_mat33(&mut payload, orient);
    Ok(Some(payload))
}

fn fixed_bytes_read(
    expected: usize,
    payload: &[u8],
    registry: &Registry,
    object: ObjectHandle,
    name: &str,
) -> Result<()> {
    ensure!(
        payload.len() == expected,
        "{name} payload is {} bytes, expected {expected}",
        payload.len()
    );
    registry.set_property(object, name, Value::Bytes(payload.to_vec()))?;
    Ok(())
}

fn bytes_write(registry: &Registry, object: ObjectHandle, name: &str) -> Result<Option<Vec<u8>>> {
    let Some(value) = registry.property(object, name)? else {
        return Ok(None);
    };
    Ok(Some(value.as_bytes()?))
}

fn road_spline_read(payload: &[u8], registry: &Registry, object: ObjectHandle, name: &str) -> Result<()> {
    // 16-byte header followed by a variable point list.
    ensure!(
        payload.len() >= 16,
        "road spline payload is {} bytes, header needs 16",
        payload.len()
    );
    registry.set_property(object, name, Value::Bytes(payload.to_vec()))?;
    Ok(())
}

fn cover_node_read(payload: &[u8], registry: &Registry, object: ObjectHandle, name: &str) -> Result<()> {
    fixed_bytes_read(16, payload, registry, object, name)
}

fn navpoint_read(payload: &[u8], registry: &Registry, object: ObjectHandle, name: &str) -> Result<()> {
    fixed_bytes_read(28, payload, registry, object, name)
}

fn constraint_read(payload: &[u8], registry: &Registry, object: ObjectHandle, name: &str) -> Result<()> {
    fixed_bytes_read(156, payload, registry, object, name)
}

fn opaque_read(payload: &[u8], registry: &Registry, object: ObjectHandle, name: &str) -> Result<()> {
    registry.set_property(object, name, Value::Bytes(payload.to_vec()))?;
    Ok(())
}

/// Every payload shape the container uses, with the property names known to
/// carry it. The name lists are game data and deliberately open-ended; names
/// absent from every list are preserved opaquely by the importer.
pub static KINDS: &[PropertyKind] = &[
    PropertyKind {
        label: "string",
        tag: TYPE_STRING,
        names: &[
            "district",
            "terrain_file_name",
            "ambient_spawn",
            "mp_team",
            "item_type",
            "dummy_type",
            "weapon_type",
            "region_kill_type",
            "delayed_spawn_regions",
            "animation_type",
            "activity_type",
            "raid_type",
            "courier_type",
            "spawn_set",
            "chunk_name",
            "props",
            "building_type",
            "gameplay_props",
            "team",
            "vehicle_type",
            "effect_type",
            "sound_alr",
            "sound",
            "visual",
            "behavior",
            "roadblock_type",
            "door_type",
            "marker_type",
            "backpack_type",
            "convoy_type",
            "home_district",
            "area_defense",
            "default_orders",
            "squad_def",
            "spawn_manner",
            "demolitions_master_type",
            "pos",
        ],
        read: string_read,
        write: string_write,
    },
    PropertyKind {
        label: "bool",
        tag: TYPE_BOOL,
        names: &[
            "respawn",
            "respawns",
            "checkpoint_respawn",
            "initial_spawn",
            "activity_respawn",
            "special_npc",
            "safehouse_vip",
            "special_vehicle",
            "hands_off_raid_squad",
            "radio_operator",
            "squad_leader",
            "marauder_raid",
            "dead_body",
            "looping_patrol",
            "defensive_combat",
            "hotspot",
            "isolated_riding",
            "riding_shotgun",
            "upgrade_done",
            "ignore_living_world",
            "disabled",
            "vehicle_only",
            "no_reassignment",
            "start_node",
            "mission_info",
            "one_of_many",
            "plume_on_death",
            "invulnerable",
            "fade_out",
            "climbable",
            "emergency_vehicle_only",
        ],
        read: bool_read,
        write: bool_write,
    },
    PropertyKind {
        label: "float",
        tag: TYPE_DATA,
        names: &[
            "wind_min_speed",
            "wind_max_speed",
            "spawn_prob",
            "night_spawn_prob",
            "angle_left",
            "angle_right",
            "rotation_limit",
            "game_destroyed_pct",
            "outer_radius",
            "atten_range",
            "aspect",
            "hotspot_size",
            "hotspot_falloff_size",
        ],
        read: float_read,
        write: float_write,
    },
    PropertyKind {
        label: "uint",
        tag: TYPE_DATA,
        names: &[
            "gm_flags",
            "dest_checksum",
            "uid",
            "next",
            "prev",
            "mtype",
            "group_id",
            "ladder_rungs",
            "min_ambush_squads",
            "max_ambush_squads",
            "host_index",
            "child_index",
            "child_alt_hk_body_index",
            "host_handle",
            "child_handle",
            "path_road_flags",
            "patrol_start",
            "yellow_num_points",
            "yellow_num_triangles",
            "warning_num_points",
            "warning_num_triangles",
            "pair_number",
            "group",
            "priority",
            "num_backpacks",
            "light_flags",
        ],
        read: uint_read,
        write: uint_write,
    },
    PropertyKind {
        label: "vec3",
        tag: TYPE_DATA,
        names: &["just_pos", "min_clip", "max_clip", "clr_orig"],
        read: vec3_read,
        write: vec3_write,
    },
    PropertyKind {
        label: "mat33",
        tag: TYPE_DATA,
        names: &["nav_orient"],
        read: mat33_read,
        write: mat33_write,
    },
    PropertyKind {
        label: "bounding_box",
        tag: TYPE_DATA,
        names: &["bb", "world_bb"],
        read: bbox_read,
        write: bbox_write,
    },
    PropertyKind {
        label: "op",
        tag: TYPE_DATA,
        names: &["op"],
        read: op_read,
        write: op_write,
    },
    PropertyKind {
        label: "district_flags",
        tag: TYPE_DATA,
        names: &["district_flags"],
        read: uint_read,
        write: uint_write,
    },
    PropertyKind {
        label: "road_spline",
        tag: TYPE_DATA,
        names: &["road_spline_header"],
        read: road_spline_read,
        write: bytes_write,
    },
    PropertyKind {
        label: "cover_node",
        tag: TYPE_DATA,
        names: &["covernode_data"],
        read: cover_node_read,
        write: bytes_write,
    },
    PropertyKind {
        label: "navpoint",
        tag: TYPE_DATA,
        names: &["navpoint_data"],
        read: navpoint_read,
        write: bytes_write,
    },
    PropertyKind {
        label: "constraint_template",
        tag: TYPE_DATA,
        names: &["template"],
        read: constraint_read,
        write: bytes_write,
    },
    PropertyKind {
        label: "buffer",
        tag: TYPE_DATA,
        names: &[
            "yellow_points",
            "yellow_triangles",
            "warning_points",
            "warning_triangles",
            "spline_points",
            "path_road_data",
            "obb",
        ],
        read: opaque_read,
        write: bytes_write,
    },
];

/// Hash-keyed dispatch over [`KINDS`], built once per importer/exporter run.
pub struct CodecTable {
    by_hash: HashMap<u32, (&'static str, &'static PropertyKind)>,
    by_name: HashMap<&'static str, &'static PropertyKind>,
}

impl CodecTable {
    pub fn new() -> Self {
        let mut by_hash = HashMap::new();
        let mut by_name = HashMap::new();
        for kind in KINDS {
            for name in kind.names {
                by_hash.entry(hash_name(name)).or_insert((*name, kind));
                by_name.entry(*name).or_insert(kind);
            }
        }
        CodecTable { by_hash, by_name }
    }

    pub fn by_hash(&self, hash: u32) -> Option<(&'static str, &'static PropertyKind)> {
        self.by_hash.get(&hash).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<&'static PropertyKind> {
        self.by_name.get(name).copied()
    }
}

impl Default for CodecTable {
    fn default() -> Self {
        CodecTable::new()
    }
}

/// One decoded record header plus its payload slice.
pub struct RawRecord<'a> {
    pub tag: u16,
    pub name_hash: u32,
    pub payload: &'a [u8],
}

/// Reads the record starting at `offset`, returning it and the 4-byte-aligned
/// offset of the next record.
pub fn read_record(block: &[u8], offset: usize) -> Result<(RawRecord<'_>, usize)> {
    ensure!(
        offset + RECORD_HEADER_SIZE <= block.len(),
        "property block truncated at record header (offset {offset} of {})",
        block.len()
    );
    let mut cursor = Cursor::new(&block[offset..offset + RECORD_HEADER_SIZE]);
    let tag = cursor.read_u16::<LittleEndian>()?;
    let size = cursor.read_u16::<LittleEndian>()? as usize;
    let name_hash = cursor.read_u32::<LittleEndian>()?;
    let payload_start = offset + RECORD_HEADER_SIZE;
    ensure!(
        payload_start + size <= block.len(),
        "property payload for hash {name_hash:#010x} truncated"
    );
    let payload = &block[payload_start..payload_start + size];
    Ok((
        RawRecord {
            tag,
            name_hash,
            payload,
        },
        align4(payload_start + size),
    ))
}

/// Name given to a preserved record whose hash matches no codec table entry.
pub fn unsupported_property_name(hash: u32) -> String {
    format!("unsupported_{hash:08x}")
}

/// Re-encodes an unrecognised record verbatim so export can reproduce it.
pub fn encode_unsupported(record: &RawRecord<'_>) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(RECORD_HEADER_SIZE + record.payload.len());
    bytes.extend_from_slice(&record.tag.to_le_bytes());
    bytes.extend_from_slice(&(record.payload.len() as u16).to_le_bytes());
    bytes.extend_from_slice(&record.name_hash.to_le_bytes());
    bytes.extend_from_slice(record.payload);
    bytes
}

/// Splits a preserved record back into its framing for re-export.
pub fn decode_unsupported(bytes: &[u8]) -> Result<RawRecord<'_>> {
    ensure!(
        bytes.len() >= RECORD_HEADER_SIZE,
        "preserved record shorter than its header"
    );
    let mut cursor = Cursor::new(&bytes[..RECORD_HEADER_SIZE]);
    let tag = cursor.read_u16::<LittleEndian>()?;
    let size = cursor.read_u16::<LittleEndian>()? as usize;
    let name_hash = cursor.read_u32::<LittleEndian>()?;
    ensure!(
        bytes.len() == RECORD_HEADER_SIZE + size,
        "preserved record size field disagrees with stored payload"
    );
    Ok(RawRecord {
        tag,
        name_hash,
        payload: &bytes[RECORD_HEADER_SIZE..],
    })
}

/// Applies one parsed record to the target object. Unknown names are kept as
/// opaque passthrough properties; a known name with a malformed payload is
/// dropped with a warning so one bad field doesn't sink the object.
pub fn apply_record(
    table: &CodecTable,
    record: &RawRecord<'_>,
    registry: &Registry,
    object: ObjectHandle,
) -> Result<()> {
    match table.by_hash(record.name_hash) {
        Some((name, kind)) => {
            if kind.tag != record.tag {
                eprintln!(
                    "[terra_formats] warning: property {name:?} has wire tag {} but kind {} expects {}; preserving raw bytes",
                    record.tag, kind.label, kind.tag
                );
                registry.append_property(
                    object,
                    &unsupported_property_name(record.name_hash),
                    Value::Bytes(encode_unsupported(record)),
                )?;
                return Ok(());
            }
            if let Err(err) = (kind.read)(record.payload, registry, object, name) {
                eprintln!(
                    "[terra_formats] warning: dropping property {name:?}: {err:#}"
                );
            }
        }
        None => {
            registry.append_property(
                object,
                &unsupported_property_name(record.name_hash),
                Value::Bytes(encode_unsupported(record)),
            )?;
        }
    }
    Ok(())
}

/// Encodes one named property into `out` as a framed record. Returns `false`
/// when the property was skipped (absent, or no writer exists for the name).
pub fn encode_property(
    table: &CodecTable,
    registry: &Registry,
    object: ObjectHandle,
    name: &str,
    value: &Value,
    out: &mut Vec<u8>,
) -> Result<bool> {
    if name.starts_with("unsupported_") {
        let bytes = value.as_bytes().context("preserved record payload")?;
        let record = decode_unsupported(&bytes)?;
        write_record(out, record.tag, record.name_hash, record.payload)?;
        return Ok(true);
    }
    let Some(kind) = table.by_name(name) else {
        eprintln!("[terra_formats] warning: no writer for property {name:?}; skipping");
        return Ok(false);
    };
    match (kind.write)(registry, object, name)? {
        Some(payload) => {
            write_record(out, kind.tag, hash_name(name), &payload)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_padded_to_four_bytes() {
        let mut out = Vec::new();
        write_record(&mut out, TYPE_BOOL, hash_name("respawn"), &[1]).unwrap();
        assert_eq!(out.len(), 12);
        assert_eq!(&out[9..], &[0, 0, 0]);

        let (record, next) = read_record(&out, 0).unwrap();
        assert_eq!(record.tag, TYPE_BOOL);
        assert_eq!(record.name_hash, hash_name("respawn"));
        assert_eq!(record.payload, &[1]);
        assert_eq!(next, 12);
    }

    #[test]
    fn oversized_payload_is_refused() {
        let mut out = Vec::new();
        let payload = vec![0u8; u16::MAX as usize + 1];
        let err = write_record(&mut out, TYPE_DATA, 7, &payload).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ZoneError>(),
            Some(ZoneError::PropertyTooLarge { .. })
        ));
    }

    #[test]
    fn known_names_round_trip_through_the_table() {
        let table = CodecTable::new();
        let registry = Registry::new();
        let object = registry.create_object("obj_zone", "zone_object");

        let mut payload = b"tutorial_terrain".to_vec();
        payload.push(0);
        let record = RawRecord {
            tag: TYPE_STRING,
            name_hash: hash_name("terrain_file_name"),
            payload: &payload,
        };
        apply_record(&table, &record, &registry, object).unwrap();
        assert_eq!(
            registry.property(object, "terrain_file_name").unwrap(),
            Some(Value::String("tutorial_terrain".into()))
        );

        let mut out = Vec::new();
        let value = registry
            .property(object, "terrain_file_name")
            .unwrap()
            .unwrap();
        assert!(encode_property(&table, &registry, object, "terrain_file_name", &value, &mut out).unwrap());
        let (reread, _) = read_record(&out, 0).unwrap();
        assert_eq!(reread.payload, &payload[..]);
    }

    #[test]
    fn unknown_hash_is_preserved_opaquely() {
        let table = CodecTable::new();
        let registry = Registry::new();
        let object = registry.create_object("obj_zone", "zone_object");

        let payload = [9u8, 8, 7];
        let record = RawRecord {
            tag: TYPE_DATA,
            name_hash: 0x0BAD_F00D,
            payload: &payload,
        };
        apply_record(&table, &record, &registry, object).unwrap();

        let name = unsupported_property_name(0x0BAD_F00D);
        let stored = registry.property(object, &name).unwrap().unwrap();
        let mut out = Vec::new();
        assert!(encode_property(&table, &registry, object, &name, &stored, &mut out).unwrap());
        let (reread, _) = read_record(&out, 0).unwrap();
        assert_eq!(reread.tag, TYPE_DATA);
        assert_eq!(reread.name_hash, 0x0BAD_F00D);
        assert_eq!(reread.payload, &payload);
    }

    #[test]
    fn malformed_known_payload_is_dropped_not_fatal() {
        let table = CodecTable::new();
        let registry = Registry::new();
        let object = registry.create_object("obj_zone", "zone_object");
        let record = RawRecord {
            tag: TYPE_DATA,
            name_hash: hash_name("op"),
            payload: &[0u8; 4], // op needs 48 bytes
        };
        apply_record(&table, &record, &registry, object).unwrap();
        assert!(!registry.has_property(object, "op").unwrap());
    }

    #[test]
    fn fixed_struct_sizes_are_enforced() {
        let table = CodecTable::new();
        let registry = Registry::new();
        let object = registry.create_object("constraint", "zone_object");
        let good = vec![0u8; 156];
        let record = RawRecord {
            tag: TYPE_DATA,
            name_hash: hash_name("template"),
            payload: &good,
        };
        apply_record(&table, &record, &registry, object).unwrap();
        assert!(registry.has_property(object, "template").unwrap());

        let short = vec![0u8; 100];
        let record = RawRecord {
            tag: TYPE_DATA,
            name_hash: hash_name("template"),
            payload: &short,
        };
        let other = registry.create_object("constraint", "zone_object");
        apply_record(&table, &record, &registry, other).unwrap();
        assert!(!registry.has_property(other, "template").unwrap());
    }
}
