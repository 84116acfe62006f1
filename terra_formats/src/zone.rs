//! Reader and writer for the binary zone container.
//!
//! Layout: `"ZONE"` magic, u32 version, u32 object count, u32 handle count,
//! u32 district hash, u32 district flags, then 87,368 bytes of relation data
//! iff `(district_flags & 5) == 0`, then the object records. Each object is a
//! fixed 56-byte header followed by its encoded property block.
//!
//! Parent/sibling/child links are raw integer handles from the source game's
//! own numbering on disk. Import resolves them into registry handles and
//! rebuilds ordered child lists; export re-derives fresh integer handles from
//! the current object ordering, since registry handles are not stable across
//! an edit session.

use std::collections::HashMap;
use std::io::Cursor;

use anyhow::{Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use terra_registry::{ObjectHandle, Registry, Value};
use thiserror::Error;

use crate::hash::{classname_for_hash, hash_name};
use crate::properties::{apply_record, encode_property, read_record, CodecTable};

pub const ZONE_MAGIC: &[u8; 4] = b"ZONE";
pub const ZONE_VERSION: u32 = 36;
pub const ZONE_HEADER_SIZE: usize = 24;
pub const OBJECT_HEADER_SIZE: usize = 56;
pub const RELATION_DATA_SIZE: usize = 87_368;
/// Terminates parent/sibling/child chains on disk.
pub const HANDLE_NONE: u32 = 0xFFFF_FFFF;

/// Properties mirrored from the object header at import time. They round-trip
/// through the registry but are emitted in the header, not the property block.
const HEADER_PROPERTIES: &[&str] = &["classname_hash", "flags", "num", "bmin", "bmax"];

/// Format-level invariant violations. Anything here aborts the surrounding
/// zone; parse problems inside a single property are handled (and logged) in
/// the codec tables instead.
#[derive(Debug, Error)]
pub enum ZoneError {
    #[error("zone file missing ZONE magic")]
    BadMagic,
    #[error("unsupported zone version {0}")]
    UnsupportedVersion(u32),
    #[error("zone truncated while reading {0}")]
    Truncated(&'static str),
    #[error("property payload for name hash {hash:#010x} is {len} bytes, exceeds u16 range")]
    PropertyTooLarge { hash: u32, len: usize },
    #[error("object {index}: {field} of {value} exceeds u16 range")]
    BlockSizeOverflow {
        index: usize,
        field: &'static str,
        value: usize,
    },
    #[error("relation data block must be {RELATION_DATA_SIZE} bytes, got {0}")]
    RelationDataSize(usize),
}

/// Raw link handles for one object, in on-disk order. Kept for diagnostics
/// and for callers that need to inspect the original chain structure.
#[derive(Debug, Clone, Copy)]
pub struct ZoneLinks {
    pub handle: u32,
    pub parent: u32,
    pub sibling: u32,
    pub child: u32,
}

/// One imported (or to-be-exported) zone: registry objects plus the header
/// fields that must survive a round trip.
#[derive(Debug, Clone)]
pub struct ZoneData {
    pub version: u32,
    pub handle_count: u32,
    pub district_hash: u32,
    pub district_flags: u32,
    /// Present iff `(district_flags & 5) == 0`; preserved verbatim.
    pub relation_data: Option<Vec<u8>>,
    /// All objects in on-disk order (import) or emission order (export).
    pub objects: Vec<ObjectHandle>,
    /// Objects whose on-disk parent was the sentinel.
    pub roots: Vec<ObjectHandle>,
    pub links: Vec<ZoneLinks>,
}

impl ZoneData {
    /// Builds a zone description around existing registry objects, e.g. for
    /// exporting a hand-assembled hierarchy.
    pub fn from_objects(objects: Vec<ObjectHandle>, district_hash: u32, district_flags: u32) -> Self {
        ZoneData {
            version: ZONE_VERSION,
            handle_count: objects.len() as u32,
            district_hash,
            district_flags,
            relation_data: None,
            roots: Vec::new(),
            links: Vec::new(),
            objects,
        }
    }
}

pub fn has_relation_data(district_flags: u32) -> bool {
    district_flags & 5 == 0
}

/// Walks the raw sibling chain starting at object `start` (an index into
/// `zone.objects`), including `start` itself. Stops at the sentinel, a
/// dangling handle, or after more steps than the zone has objects.
pub fn sibling_chain(zone: &ZoneData, start: usize) -> Vec<usize> {
    let by_handle: HashMap<u32, usize> = zone
        .links
        .iter()
        .enumerate()
        .map(|(index, link)| (link.handle, index))
        .collect();
    let mut chain = Vec::new();
    let mut current = Some(start);
    while let Some(index) = current {
        if chain.len() > zone.links.len() {
            break;
        }
        chain.push(index);
        let sibling = zone.links[index].sibling;
        current = if sibling == HANDLE_NONE {
            None
        } else {
            by_handle.get(&sibling).copied()
        };
    }
    chain
}

struct RawObjectHeader {
    classname_hash: u32,
    handle: u32,
    bmin: [f32; 3],
    bmax: [f32; 3],
    flags: u16,
    block_size: u16,
    parent: u32,
    sibling: u32,
    child: u32,
    num: u32,
    prop_count: u16,
    prop_block_size: u16,
}

fn read_object_header(bytes: &[u8]) -> Result<RawObjectHeader> {
    let mut cursor = Cursor::new(bytes);
    let classname_hash = cursor.read_u32::<LittleEndian>()?;
    let handle = cursor.read_u32::<LittleEndian>()?;
    let mut bmin = [0f32; 3];
    let mut bmax = [0f32; 3];
    for v in &mut bmin {
        *v = cursor.read_f32::<LittleEndian>()?;
    }
    for v in &mut bmax {
        *v = cursor.read_f32::<LittleEndian>()?;
    }
    let flags = cursor.read_u16::<LittleEndian>()?;
    let block_size = cursor.read_u16::<LittleEndian>()?;
    let parent = cursor.read_u32::<LittleEndian>()?;
    let sibling = cursor.read_u32::<LittleEndian>()?;
    let child = cursor.read_u32::<LittleEndian>()?;
    let num = cursor.read_u32::<LittleEndian>()?;
    let prop_count = cursor.read_u16::<LittleEndian>()?;
    let prop_block_size = cursor.read_u16::<LittleEndian>()?;
    Ok(RawObjectHeader {
        classname_hash,
        handle,
        bmin,
        bmax,
        flags,
        block_size,
        parent,
        sibling,
        child,
        num,
        prop_count,
        prop_block_size,
    })
}

/// Parses a zone file into registry objects and resolves the link handles.
pub fn read_zone(bytes: &[u8], registry: &Registry, table: &CodecTable) -> Result<ZoneData> {
    if bytes.len() < ZONE_HEADER_SIZE {
        return Err(ZoneError::Truncated("zone header").into());
    }
    if &bytes[0..4] != ZONE_MAGIC {
        return Err(ZoneError::BadMagic.into());
    }
    let mut cursor = Cursor::new(&bytes[4..ZONE_HEADER_SIZE]);
    let version = cursor.read_u32::<LittleEndian>()?;
    if version != ZONE_VERSION {
        return Err(ZoneError::UnsupportedVersion(version).into());
    }
    let object_count = cursor.read_u32::<LittleEndian>()? as usize;
    let handle_count = cursor.read_u32::<LittleEndian>()?;
    let district_hash = cursor.read_u32::<LittleEndian>()?;
    let district_flags = cursor.read_u32::<LittleEndian>()?;

    let mut offset = ZONE_HEADER_SIZE;
    let relation_data = if has_relation_data(district_flags) {
        if bytes.len() < offset + RELATION_DATA_SIZE {
            return Err(ZoneError::Truncated("relation data").into());
        }
        let block = bytes[offset..offset + RELATION_DATA_SIZE].to_vec();
        offset += RELATION_DATA_SIZE;
        Some(block)
    } else {
        None
    };

    let mut objects = Vec::with_capacity(object_count);
    let mut links = Vec::with_capacity(object_count);
    for index in 0..object_count {
        if bytes.len() < offset + OBJECT_HEADER_SIZE {
            return Err(ZoneError::Truncated("object header").into());
        }
        let header = read_object_header(&bytes[offset..offset + OBJECT_HEADER_SIZE])
            .with_context(|| format!("object {index} header"))?;
        offset += OBJECT_HEADER_SIZE;

        let expected = OBJECT_HEADER_SIZE + header.prop_block_size as usize;
        if header.block_size as usize != expected {
            eprintln!(
                "[terra_formats] warning: object {index} block size {} disagrees with header+properties {}",
                header.block_size, expected
            );
        }

        if bytes.len() < offset + header.prop_block_size as usize {
            return Err(ZoneError::Truncated("property block").into());
        }
        let block = &bytes[offset..offset + header.prop_block_size as usize];
        offset += header.prop_block_size as usize;

        let name = classname_for_hash(header.classname_hash).unwrap_or("zone_object");
        let object = registry.create_object(name, "zone_object");
        registry.set_property(object, "classname_hash", Value::U32(header.classname_hash))?;
        registry.set_property(object, "flags", Value::U16(header.flags))?;
        registry.set_property(object, "num", Value::U32(header.num))?;
        registry.set_property(object, "bmin", Value::Vec3(header.bmin))?;
        registry.set_property(object, "bmax", Value::Vec3(header.bmax))?;

        let mut position = 0usize;
        for _ in 0..header.prop_count {
            let (record, next) = read_record(block, position)
                .with_context(|| format!("object {index} property block"))?;
            apply_record(table, &record, registry, object)?;
            position = next;
        }

        objects.push(object);
        links.push(ZoneLinks {
            handle: header.handle,
            parent: header.parent,
            sibling: header.sibling,
            child: header.child,
        });
    }

    // Resolve raw integer handles to registry handles. Duplicate on-disk
    // handles keep the first occurrence, matching first-match semantics
    // elsewhere.
    let mut by_handle: HashMap<u32, usize> = HashMap::with_capacity(links.len());
    for (index, link) in links.iter().enumerate() {
        if by_handle.contains_key(&link.handle) {
            eprintln!(
                "[terra_formats] warning: duplicate object handle {:#010x} in zone; keeping first",
                link.handle
            );
        } else {
            by_handle.insert(link.handle, index);
        }
    }

    let mut roots = Vec::new();
    for (index, link) in links.iter().enumerate() {
        if link.parent == HANDLE_NONE {
            roots.push(objects[index]);
        }
        // Ordered children come from walking this object's child handle and
        // then the sibling chain. Bounded by the object count so a corrupt
        // cycle cannot spin forever.
        let mut current = link.child;
        let mut steps = 0usize;
        while current != HANDLE_NONE {
            steps += 1;
            if steps > links.len() {
                eprintln!(
                    "[terra_formats] warning: object {index} child chain exceeds object count; cycle suspected, truncating"
                );
                break;
            }
            let Some(&child_index) = by_handle.get(&current) else {
                eprintln!(
                    "[terra_formats] warning: object {index} references unknown child handle {current:#010x}"
                );
                break;
            };
            registry.add_child(objects[index], objects[child_index])?;
            current = links[child_index].sibling;
        }
    }

    Ok(ZoneData {
        version,
        handle_count,
        district_hash,
        district_flags,
        relation_data,
        objects,
        roots,
        links,
    })
}

fn header_u32(registry: &Registry, object: ObjectHandle, name: &str, fallback: u32) -> Result<u32> {
    match registry.property(object, name)? {
        Some(value) => Ok(value.as_u32()?),
        None => Ok(fallback),
    }
}

fn header_u16(registry: &Registry, object: ObjectHandle, name: &str) -> Result<u16> {
    match registry.property(object, name)? {
        Some(value) => Ok(value.as_u16()?),
        None => Ok(0),
    }
}

fn header_vec3(registry: &Registry, object: ObjectHandle, name: &str) -> Result<[f32; 3]> {
    match registry.property(object, name)? {
        Some(value) => Ok(value.as_vec3()?),
        None => Ok([0.0; 3]),
    }
}

/// Serialises a zone back to the wire layout. Fresh integer handles are
/// derived from the current object ordering; sibling chains are rebuilt from
/// the in-memory child lists. Any u16 size field that would overflow fails
/// the whole zone rather than truncating.
pub fn write_zone(zone: &ZoneData, registry: &Registry, table: &CodecTable) -> Result<Vec<u8>> {
    let mut handle_of: HashMap<ObjectHandle, u32> = HashMap::with_capacity(zone.objects.len());
    for (index, object) in zone.objects.iter().enumerate() {
        handle_of.insert(*object, index as u32);
    }

    let mut out = Vec::new();
    out.extend_from_slice(ZONE_MAGIC);
    out.write_u32::<LittleEndian>(zone.version)?;
    out.write_u32::<LittleEndian>(zone.objects.len() as u32)?;
    out.write_u32::<LittleEndian>(zone.handle_count)?;
    out.write_u32::<LittleEndian>(zone.district_hash)?;
    out.write_u32::<LittleEndian>(zone.district_flags)?;

    if has_relation_data(zone.district_flags) {
        match &zone.relation_data {
            Some(block) => {
                if block.len() != RELATION_DATA_SIZE {
                    return Err(ZoneError::RelationDataSize(block.len()).into());
                }
                out.extend_from_slice(block);
            }
            // Synthesised zones get a zero-filled placeholder block.
            None => out.extend_from_slice(&vec![0u8; RELATION_DATA_SIZE]),
        }
    }

    for (index, object) in zone.objects.iter().enumerate() {
        let object = *object;

        let parent = registry.parent(object)?;
        let parent_handle = handle_of.get(&parent).copied().unwrap_or(HANDLE_NONE);

        // In-memory child lists may reference objects outside this zone after
        // an edit session; those are silently excluded from the chain.
        let children: Vec<u32> = registry
            .sub_objects(object)?
            .iter()
            .filter_map(|child| handle_of.get(child).copied())
            .collect();
        let child_handle = children.first().copied().unwrap_or(HANDLE_NONE);

        let sibling_handle = if parent_handle == HANDLE_NONE {
            HANDLE_NONE
        } else {
            let siblings: Vec<u32> = registry
                .sub_objects(parent)?
                .iter()
                .filter_map(|entry| handle_of.get(entry).copied())
                .collect();
            let own = index as u32;
            siblings
                .iter()
                .position(|&h| h == own)
                .and_then(|pos| siblings.get(pos + 1))
                .copied()
                .unwrap_or(HANDLE_NONE)
        };

        let mut block = Vec::new();
        let mut prop_count = 0usize;
        for (name, value) in registry.properties(object)? {
            if HEADER_PROPERTIES.contains(&name.as_str()) {
                continue;
            }
            if encode_property(table, registry, object, &name, &value, &mut block)? {
                prop_count += 1;
            }
        }

        if prop_count > u16::MAX as usize {
            return Err(ZoneError::BlockSizeOverflow {
                index,
                field: "property count",
                value: prop_count,
            }
            .into());
        }
        if block.len() > u16::MAX as usize {
            return Err(ZoneError::BlockSizeOverflow {
                index,
                field: "property block size",
                value: block.len(),
            }
            .into());
        }
        let block_size = OBJECT_HEADER_SIZE + block.len();
        if block_size > u16::MAX as usize {
            return Err(ZoneError::BlockSizeOverflow {
                index,
                field: "object block size",
                value: block_size,
            }
            .into());
        }

        let name = registry.object_name(object)?;
        let classname_hash = header_u32(registry, object, "classname_hash", hash_name(&name))?;
        let flags = header_u16(registry, object, "flags")?;
        let num = header_u32(registry, object, "num", 0)?;
        let bmin = header_vec3(registry, object, "bmin")?;
        let bmax = header_vec3(registry, object, "bmax")?;

        out.write_u32::<LittleEndian>(classname_hash)?;
        out.write_u32::<LittleEndian>(index as u32)?;
        for v in bmin {
            out.write_f32::<LittleEndian>(v)?;
        }
        for v in bmax {
            out.write_f32::<LittleEndian>(v)?;
        }
        out.write_u16::<LittleEndian>(flags)?;
        out.write_u16::<LittleEndian>(block_size as u16)?;
        out.write_u32::<LittleEndian>(parent_handle)?;
        out.write_u32::<LittleEndian>(sibling_handle)?;
        out.write_u32::<LittleEndian>(child_handle)?;
        out.write_u32::<LittleEndian>(num)?;
        out.write_u16::<LittleEndian>(prop_count as u16)?;
        out.write_u16::<LittleEndian>(block.len() as u16)?;
        out.extend_from_slice(&block);
    }

    Ok(out)
}
