//! In-memory store for schema-less game entities.
//!
//! A [`Registry`] owns every object, property, and binary buffer produced by
//! the importers. There is deliberately no global instance; whoever needs the
//! registry receives a reference (usually behind an `Arc`) so multiple
//! territories and tests can coexist in one process.
//!
//! Storage is an arena of slots addressed by `(index, generation)` handles.
//! Slots are never removed in the current model, but every access still
//! validates the generation so a future deletion path can invalidate handles
//! without changing the API.

mod handle;
mod value;

pub use handle::{BufferHandle, ObjectHandle, PropertyHandle};
pub use value::Value;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::warn;
use thiserror::Error;

/// UID value that no live object ever carries.
pub const INVALID_UID: u64 = u64::MAX;

/// Error conditions surfaced by registry accessors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no object with uid {0}")]
    MissingObject(u64),
    #[error("operation on invalid handle")]
    InvalidHandle,
    #[error("stale handle: held generation {held}, slot generation {current}")]
    StaleHandle { held: u32, current: u32 },
    #[error("property index {index} out of range for object uid {uid}")]
    MissingProperty { uid: u64, index: usize },
    #[error("value is {found}, expected {expected}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("operation on invalid or stale buffer handle")]
    MissingBuffer,
}

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug)]
struct ObjectRecord {
    uid: u64,
    name: String,
    type_tag: String,
    parent: ObjectHandle,
    properties: Vec<(String, Value)>,
    children: Vec<ObjectHandle>,
}

#[derive(Debug)]
struct ObjectSlot {
    generation: u32,
    record: ObjectRecord,
}

#[derive(Debug)]
struct BufferSlot {
    generation: u32,
    name: String,
    bytes: Arc<[u8]>,
}

#[derive(Debug, Default)]
struct State {
    slots: Vec<ObjectSlot>,
    uid_index: HashMap<u64, u32>,
    buffers: Vec<BufferSlot>,
    next_uid: u64,
}

/// Entity/property/buffer store with stable generation-checked handles.
#[derive(Debug, Default)]
pub struct Registry {
    state: Mutex<State>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // Lock poisoning only happens after a panic elsewhere; the arena
        // itself stays structurally valid, so keep serving it.
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn record<'a>(state: &'a State, handle: ObjectHandle) -> Result<&'a ObjectRecord> {
        if !handle.is_valid() {
            return Err(RegistryError::InvalidHandle);
        }
        let slot = state
            .slots
            .get(handle.index as usize)
            .ok_or(RegistryError::InvalidHandle)?;
        if slot.generation != handle.generation {
            return Err(RegistryError::StaleHandle {
                held: handle.generation,
                current: slot.generation,
            });
        }
        Ok(&slot.record)
    }

    fn record_mut<'a>(state: &'a mut State, handle: ObjectHandle) -> Result<&'a mut ObjectRecord> {
        if !handle.is_valid() {
            return Err(RegistryError::InvalidHandle);
        }
        let slot = state
            .slots
            .get_mut(handle.index as usize)
            .ok_or(RegistryError::InvalidHandle)?;
        if slot.generation != handle.generation {
            return Err(RegistryError::StaleHandle {
                held: handle.generation,
                current: slot.generation,
            });
        }
        Ok(&mut slot.record)
    }

    /// Allocates the next UID and stores a fresh object. The lock is scoped to
    /// this insertion; the returned handle is immediately usable from any
    /// thread.
    pub fn create_object(&self, name: &str, type_tag: &str) -> ObjectHandle {
        let mut state = self.state();
        let uid = state.next_uid;
        state.next_uid += 1;
        let index = state.slots.len() as u32;
        state.slots.push(ObjectSlot {
            generation: 1,
            record: ObjectRecord {
                uid,
                name: name.to_string(),
                type_tag: type_tag.to_string(),
                parent: ObjectHandle::INVALID,
                properties: Vec::new(),
                children: Vec::new(),
            },
        });
        state.uid_index.insert(uid, index);
        ObjectHandle {
            index,
            generation: 1,
        }
    }

    pub fn object_count(&self) -> usize {
        self.state().slots.len()
    }

    pub fn object_exists(&self, uid: u64) -> bool {
        self.state().uid_index.contains_key(&uid)
    }

    pub fn object_by_uid(&self, uid: u64) -> Result<ObjectHandle> {
        let state = self.state();
        let index = *state
            .uid_index
            .get(&uid)
            .ok_or(RegistryError::MissingObject(uid))?;
        let generation = state.slots[index as usize].generation;
        Ok(ObjectHandle { index, generation })
    }

    pub fn object_uid(&self, handle: ObjectHandle) -> Result<u64> {
        let state = self.state();
        Ok(Self::record(&state, handle)?.uid)
    }

    pub fn object_name(&self, handle: ObjectHandle) -> Result<String> {
        let state = self.state();
        Ok(Self::record(&state, handle)?.name.clone())
    }

    pub fn object_type_tag(&self, handle: ObjectHandle) -> Result<String> {
        let state = self.state();
        Ok(Self::record(&state, handle)?.type_tag.clone())
    }

    /// Parent handle, or [`ObjectHandle::INVALID`] for a root object.
    pub fn parent(&self, handle: ObjectHandle) -> Result<ObjectHandle> {
        let state = self.state();
        Ok(Self::record(&state, handle)?.parent)
    }

    /// Links `child` under `parent`: appends to the ordered child list and
    /// updates the child's parent link.
    pub fn add_child(&self, parent: ObjectHandle, child: ObjectHandle) -> Result<()> {
        let mut state = self.state();
        Self::record(&state, parent)?;
        Self::record(&state, child)?;
        Self::record_mut(&mut state, parent)?.children.push(child);
        Self::record_mut(&mut state, child)?.parent = parent;
        Ok(())
    }

    /// Re-parents `child`: removes it from any previous parent's child list,
    /// then appends it under `parent`. Passing [`ObjectHandle::INVALID`] as
    /// the parent detaches the child into a root.
    pub fn set_parent(&self, child: ObjectHandle, parent: ObjectHandle) -> Result<()> {
        let mut state = self.state();
        Self::record(&state, child)?;
        if parent.is_valid() {
            Self::record(&state, parent)?;
        }
        let old = Self::record(&state, child)?.parent;
        if old.is_valid() {
            if let Ok(record) = Self::record_mut(&mut state, old) {
                record.children.retain(|&entry| entry != child);
            }
        }
        if parent.is_valid() {
            Self::record_mut(&mut state, parent)?.children.push(child);
        }
        Self::record_mut(&mut state, child)?.parent = parent;
        Ok(())
    }

    /// Ordered child references for hierarchy traversal.
    pub fn sub_objects(&self, handle: ObjectHandle) -> Result<Vec<ObjectHandle>> {
        let state = self.state();
        Ok(Self::record(&state, handle)?.children.clone())
    }

    /// Sets a property by name with get-or-create semantics: the first
    /// property with this name is updated, otherwise a new one is appended.
    pub fn set_property(&self, handle: ObjectHandle, name: &str, value: Value) -> Result<PropertyHandle> {
        let mut state = self.state();
        let record = Self::record_mut(&mut state, handle)?;
        if let Some(index) = record.properties.iter().position(|(n, _)| n == name) {
            record.properties[index].1 = value;
            return Ok(PropertyHandle {
                object: handle,
                index,
            });
        }
        record.properties.push((name.to_string(), value));
        Ok(PropertyHandle {
            object: handle,
            index: record.properties.len() - 1,
        })
    }

    /// Appends a property without the get-or-create check. Inserting a second
    /// property under an existing name is a schema anomaly: lookups stay
    /// first-match, so the duplicate is unreachable by name. Logged, not
    /// rejected, to match the historical behavior.
    pub fn append_property(&self, handle: ObjectHandle, name: &str, value: Value) -> Result<PropertyHandle> {
        let mut state = self.state();
        let record = Self::record_mut(&mut state, handle)?;
        if record.properties.iter().any(|(n, _)| n == name) {
            warn!(
                "duplicate property name {name:?} appended to object uid {}; lookups resolve the first entry",
                record.uid
            );
        }
        record.properties.push((name.to_string(), value));
        Ok(PropertyHandle {
            object: handle,
            index: record.properties.len() - 1,
        })
    }

    /// First property with this name, if present.
    pub fn property(&self, handle: ObjectHandle, name: &str) -> Result<Option<Value>> {
        let state = self.state();
        let record = Self::record(&state, handle)?;
        Ok(record
            .properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone()))
    }

    /// Checks presence without creating anything.
    pub fn has_property(&self, handle: ObjectHandle, name: &str) -> Result<bool> {
        let state = self.state();
        let record = Self::record(&state, handle)?;
        Ok(record.properties.iter().any(|(n, _)| n == name))
    }

    /// Get-or-create handle to the named property. A created property starts
    /// as an empty opaque payload until the first `set_property_at`.
    pub fn property_handle(&self, handle: ObjectHandle, name: &str) -> Result<PropertyHandle> {
        let mut state = self.state();
        let record = Self::record_mut(&mut state, handle)?;
        if let Some(index) = record.properties.iter().position(|(n, _)| n == name) {
            return Ok(PropertyHandle {
                object: handle,
                index,
            });
        }
        record
            .properties
            .push((name.to_string(), Value::Bytes(Vec::new())));
        Ok(PropertyHandle {
            object: handle,
            index: record.properties.len() - 1,
        })
    }

    pub fn property_at(&self, prop: PropertyHandle) -> Result<(String, Value)> {
        let state = self.state();
        let record = Self::record(&state, prop.object)?;
        record
            .properties
            .get(prop.index)
            .cloned()
            .ok_or(RegistryError::MissingProperty {
                uid: record.uid,
                index: prop.index,
            })
    }

    pub fn set_property_at(&self, prop: PropertyHandle, value: Value) -> Result<()> {
        let mut state = self.state();
        let record = Self::record_mut(&mut state, prop.object)?;
        let uid = record.uid;
        let slot = record
            .properties
            .get_mut(prop.index)
            .ok_or(RegistryError::MissingProperty {
                uid,
                index: prop.index,
            })?;
        slot.1 = value;
        Ok(())
    }

    /// Ordered snapshot of every property on the object.
    pub fn properties(&self, handle: ObjectHandle) -> Result<Vec<(String, Value)>> {
        let state = self.state();
        Ok(Self::record(&state, handle)?.properties.clone())
    }

    /// Stores a named binary blob outside the property tables so large
    /// payloads (vertex data, raw pixels) don't bloat the objects.
    pub fn create_buffer(&self, name: &str, bytes: Vec<u8>) -> BufferHandle {
        let mut state = self.state();
        let index = state.buffers.len() as u32;
        state.buffers.push(BufferSlot {
            generation: 1,
            name: name.to_string(),
            bytes: Arc::from(bytes.into_boxed_slice()),
        });
        BufferHandle {
            index,
            generation: 1,
        }
    }

    pub fn buffer_bytes(&self, handle: BufferHandle) -> Result<Arc<[u8]>> {
        let state = self.state();
        let slot = state
            .buffers
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(RegistryError::MissingBuffer)?;
        Ok(Arc::clone(&slot.bytes))
    }

    pub fn buffer_name(&self, handle: BufferHandle) -> Result<String> {
        let state = self.state();
        let slot = state
            .buffers
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(RegistryError::MissingBuffer)?;
        Ok(slot.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uids_are_monotonic_and_unique() {
        let registry = Registry::new();
        let mut last = None;
        for _ in 0..64 {
            let handle = registry.create_object("thing", "test");
            let uid = registry.object_uid(handle).unwrap();
            if let Some(previous) = last {
                assert!(uid > previous, "uid {uid} not greater than {previous}");
            }
            last = Some(uid);
        }
    }

    #[test]
    fn exists_is_false_for_unissued_uids() {
        let registry = Registry::new();
        let handle = registry.create_object("only", "test");
        let uid = registry.object_uid(handle).unwrap();
        assert!(registry.object_exists(uid));
        assert!(!registry.object_exists(uid + 1));
        assert!(!registry.object_exists(INVALID_UID));
        assert!(matches!(
            registry.object_by_uid(uid + 1),
            Err(RegistryError::MissingObject(_))
        ));
    }

    #[test]
    fn invalid_and_stale_handles_error() {
        let registry = Registry::new();
        registry.create_object("a", "test");
        assert!(matches!(
            registry.object_name(ObjectHandle::INVALID),
            Err(RegistryError::InvalidHandle)
        ));
        let stale = ObjectHandle {
            index: 0,
            generation: 99,
        };
        assert!(matches!(
            registry.object_name(stale),
            Err(RegistryError::StaleHandle { .. })
        ));
        let out_of_range = ObjectHandle {
            index: 40,
            generation: 1,
        };
        assert!(matches!(
            registry.object_name(out_of_range),
            Err(RegistryError::InvalidHandle)
        ));
    }

    #[test]
    fn set_property_updates_first_match() {
        let registry = Registry::new();
        let obj = registry.create_object("box", "test");
        registry.set_property(obj, "flags", Value::U32(1)).unwrap();
        registry.set_property(obj, "flags", Value::U32(2)).unwrap();
        assert_eq!(registry.properties(obj).unwrap().len(), 1);
        assert_eq!(
            registry.property(obj, "flags").unwrap().unwrap(),
            Value::U32(2)
        );
    }

    #[test]
    fn duplicate_append_keeps_first_match_lookup() {
        let registry = Registry::new();
        let obj = registry.create_object("box", "test");
        registry.append_property(obj, "name", Value::String("first".into())).unwrap();
        registry.append_property(obj, "name", Value::String("second".into())).unwrap();
        assert_eq!(registry.properties(obj).unwrap().len(), 2);
        assert_eq!(
            registry.property(obj, "name").unwrap().unwrap(),
            Value::String("first".into())
        );
    }

    #[test]
    fn property_handle_is_get_or_create() {
        let registry = Registry::new();
        let obj = registry.create_object("box", "test");
        assert!(!registry.has_property(obj, "op").unwrap());
        let prop = registry.property_handle(obj, "op").unwrap();
        assert!(registry.has_property(obj, "op").unwrap());
        registry
            .set_property_at(
                prop,
                Value::Op {
                    position: [1.0, 2.0, 3.0],
                    orient: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
                },
            )
            .unwrap();
        let again = registry.property_handle(obj, "op").unwrap();
        assert_eq!(prop, again);
        let (name, value) = registry.property_at(again).unwrap();
        assert_eq!(name, "op");
        assert_eq!(value.as_op().unwrap().0, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn children_are_ordered_and_parent_links_update() {
        let registry = Registry::new();
        let parent = registry.create_object("parent", "test");
        let a = registry.create_object("a", "test");
        let b = registry.create_object("b", "test");
        registry.add_child(parent, a).unwrap();
        registry.add_child(parent, b).unwrap();
        assert_eq!(registry.sub_objects(parent).unwrap(), vec![a, b]);
        assert_eq!(registry.parent(a).unwrap(), parent);
        assert_eq!(registry.parent(parent).unwrap(), ObjectHandle::INVALID);
    }

    #[test]
    fn set_parent_moves_and_detaches() {
        let registry = Registry::new();
        let first = registry.create_object("first", "test");
        let second = registry.create_object("second", "test");
        let child = registry.create_object("child", "test");
        registry.add_child(first, child).unwrap();

        registry.set_parent(child, second).unwrap();
        assert!(registry.sub_objects(first).unwrap().is_empty());
        assert_eq!(registry.sub_objects(second).unwrap(), vec![child]);
        assert_eq!(registry.parent(child).unwrap(), second);

        registry.set_parent(child, ObjectHandle::INVALID).unwrap();
        assert!(registry.sub_objects(second).unwrap().is_empty());
        assert_eq!(registry.parent(child).unwrap(), ObjectHandle::INVALID);
    }

    #[test]
    fn buffers_round_trip() {
        let registry = Registry::new();
        let buffer = registry.create_buffer("terrain.cterrain_pc", vec![1, 2, 3]);
        assert_eq!(&registry.buffer_bytes(buffer).unwrap()[..], &[1, 2, 3]);
        assert_eq!(registry.buffer_name(buffer).unwrap(), "terrain.cterrain_pc");
        let bogus = BufferHandle {
            index: 9,
            generation: 1,
        };
        assert!(matches!(
            registry.buffer_bytes(bogus),
            Err(RegistryError::MissingBuffer)
        ));
    }
}
