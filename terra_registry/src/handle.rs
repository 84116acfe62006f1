/// Non-owning reference to an object slot. The pair is validated against the
/// slot's current generation on every access, so a handle kept across future
/// slot reuse fails loudly instead of reading someone else's object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl ObjectHandle {
    /// Sentinel that never matches a live slot (generations start at 1).
    pub const INVALID: ObjectHandle = ObjectHandle {
        index: u32::MAX,
        generation: 0,
    };

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

/// An [`ObjectHandle`] plus the index of one property in the owning object's
/// ordered property list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyHandle {
    pub object: ObjectHandle,
    pub index: usize,
}

/// Handle to a registry-owned binary blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}
