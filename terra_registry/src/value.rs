use crate::handle::{BufferHandle, ObjectHandle};
use crate::RegistryError;

/// Tagged union over every property payload the registry can hold.
///
/// List-shaped data is a `Value` like everything else (`ObjectList`,
/// `StringList`) rather than a separate container type, which keeps the
/// schema uniform; callers must know which property names carry lists.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    String(String),
    Vec3([f32; 3]),
    Mat33([[f32; 3]; 3]),
    BoundingBox { min: [f32; 3], max: [f32; 3] },
    Op { position: [f32; 3], orient: [[f32; 3]; 3] },
    /// Opaque payload kept inline; used for unclassified wire records.
    Bytes(Vec<u8>),
    Buffer(BufferHandle),
    Object(ObjectHandle),
    ObjectList(Vec<ObjectHandle>),
    StringList(Vec<String>),
}

macro_rules! accessor {
    ($fn_name:ident, $variant:ident, $ty:ty, $label:expr) => {
        pub fn $fn_name(&self) -> Result<$ty, RegistryError> {
            match self {
                Value::$variant(v) => Ok(v.clone()),
                other => Err(RegistryError::TypeMismatch {
                    expected: $label,
                    found: other.kind(),
                }),
            }
        }
    };
}

impl Value {
    /// Human-readable tag used in diagnostics and mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::String(_) => "string",
            Value::Vec3(_) => "vec3",
            Value::Mat33(_) => "mat33",
            Value::BoundingBox { .. } => "bounding_box",
            Value::Op { .. } => "op",
            Value::Bytes(_) => "bytes",
            Value::Buffer(_) => "buffer",
            Value::Object(_) => "object",
            Value::ObjectList(_) => "object_list",
            Value::StringList(_) => "string_list",
        }
    }

    accessor!(as_bool, Bool, bool, "bool");
    accessor!(as_i8, I8, i8, "i8");
    accessor!(as_i16, I16, i16, "i16");
    accessor!(as_i32, I32, i32, "i32");
    accessor!(as_i64, I64, i64, "i64");
    accessor!(as_u8, U8, u8, "u8");
    accessor!(as_u16, U16, u16, "u16");
    accessor!(as_u32, U32, u32, "u32");
    accessor!(as_u64, U64, u64, "u64");
    accessor!(as_f32, F32, f32, "f32");
    accessor!(as_string, String, String, "string");
    accessor!(as_vec3, Vec3, [f32; 3], "vec3");
    accessor!(as_mat33, Mat33, [[f32; 3]; 3], "mat33");
    accessor!(as_bytes, Bytes, Vec<u8>, "bytes");
    accessor!(as_buffer, Buffer, BufferHandle, "buffer");
    accessor!(as_object, Object, ObjectHandle, "object");
    accessor!(as_object_list, ObjectList, Vec<ObjectHandle>, "object_list");
    accessor!(as_string_list, StringList, Vec<String>, "string_list");

    pub fn as_bounding_box(&self) -> Result<([f32; 3], [f32; 3]), RegistryError> {
        match self {
            Value::BoundingBox { min, max } => Ok((*min, *max)),
            other => Err(RegistryError::TypeMismatch {
                expected: "bounding_box",
                found: other.kind(),
            }),
        }
    }

    pub fn as_op(&self) -> Result<([f32; 3], [[f32; 3]; 3]), RegistryError> {
        match self {
            Value::Op { position, orient } => Ok((*position, *orient)),
            other => Err(RegistryError::TypeMismatch {
                expected: "op",
                found: other.kind(),
            }),
        }
    }
}
