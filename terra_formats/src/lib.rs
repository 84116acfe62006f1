pub mod archive;
pub mod hash;
pub mod properties;
pub mod zone;

pub use archive::{ArchiveSource, DirArchive};
pub use properties::CodecTable;
pub use zone::{read_zone, write_zone, ZoneData, ZoneError};
