//! Sector geometry constants.
//!
//! The engine addresses backing devices in 512-byte sectors and maps them in
//! aligned cache lines of a configurable number of sectors.

/// Size of one device sector in bytes.
pub const SECTOR_SIZE: u64 = 512;

/// Log2 of [`SECTOR_SIZE`]; byte offsets shift right by this to get sectors.
pub const SECTOR_SHIFT: u32 = 9;

/// Maximum number of sectors a cache line may span.
///
/// Per-sector valid and dirty state is kept in one 64-bit mask per concern,
/// so a line can cover at most 64 sectors. Enforced by config validation.
pub const MAX_LINE_SECTORS: u8 = 64;
