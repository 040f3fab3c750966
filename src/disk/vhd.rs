//! Fixed VHD footer encoding
//!
//! A fixed VHD is the raw disk image followed by one 512-byte footer.
//! All multi-byte fields are big-endian.

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

pub const FOOTER_SIZE: usize = 512;

const COOKIE: &[u8; 8] = b"conectix";
const FEATURES_RESERVED: u32 = 0x0000_0002;
const FORMAT_VERSION: u32 = 0x0001_0000;
const FIXED_DATA_OFFSET: u64 = u64::MAX;
const CREATOR_APPLICATION: &[u8; 4] = b"bdsk";
const CREATOR_VERSION: u32 = 0x000a_0000;
const CREATOR_HOST_OS: &[u8; 4] = b"Wi2k";
const DISK_TYPE_FIXED: u32 = 2;
const CHECKSUM_OFFSET: usize = 64;
const RESERVED_SIZE: usize = 427;

/// Cylinder/head/sector geometry as stored in the footer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub cylinders: u16,
    pub heads: u8,
    pub sectors_per_track: u8,
}

impl Geometry {
    /// CHS geometry for a disk of `size` bytes, per the VHD format
    pub fn for_size(size: u64) -> Self {
        let mut total_sectors = size / 512;
        if total_sectors > 65535 * 16 * 255 {
            total_sectors = 65535 * 16 * 255;
        }

        let (sectors_per_track, heads, cylinder_times_heads) = if total_sectors >= 65535 * 16 * 63
        {
            (255, 16, total_sectors / 255)
        } else {
            let mut sectors_per_track = 17;
            let mut cylinder_times_heads = total_sectors / sectors_per_track;
            let mut heads = ((cylinder_times_heads + 1023) / 1024).max(4);

            if cylinder_times_heads >= heads * 1024 || heads > 16 {
                sectors_per_track = 31;
                heads = 16;
                cylinder_times_heads = total_sectors / sectors_per_track;
            }
            if cylinder_times_heads >= heads * 1024 {
                sectors_per_track = 63;
                heads = 16;
                cylinder_times_heads = total_sectors / sectors_per_track;
            }
            (sectors_per_track, heads, cylinder_times_heads)
        };

        Self {
            cylinders: (cylinder_times_heads / heads) as u16,
            heads: heads as u8,
            sectors_per_track: sectors_per_track as u8,
        }
    }
}

/// Footer of a fixed-size VHD
#[derive(Debug, Clone)]
pub struct VhdFooter {
    size: u64,
    created: DateTime<Utc>,
    unique_id: Uuid,
}

impl VhdFooter {
    /// Footer for a new disk of `size` bytes, stamped now with a random id
    pub fn fixed(size: u64) -> Self {
        Self::with_identity(size, Utc::now(), Uuid::new_v4())
    }

    pub fn with_identity(size: u64, created: DateTime<Utc>, unique_id: Uuid) -> Self {
        Self {
            size,
            created,
            unique_id,
        }
    }

    /// Seconds since 2000-01-01 00:00:00 UTC, saturating to the field width
    fn timestamp(&self) -> u32 {
        let epoch = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).single();
        epoch
            .map(|epoch| (self.created - epoch).num_seconds())
            .map(|secs| secs.clamp(0, i64::from(u32::MAX)) as u32)
            .unwrap_or(0)
    }

    pub fn encode(&self) -> Vec<u8> {
        let geometry = Geometry::for_size(self.size);
        let mut buf = BytesMut::with_capacity(FOOTER_SIZE);

        buf.put_slice(COOKIE);
        buf.put_u32(FEATURES_RESERVED);
        buf.put_u32(FORMAT_VERSION);
        buf.put_u64(FIXED_DATA_OFFSET);
        buf.put_u32(self.timestamp());
        buf.put_slice(CREATOR_APPLICATION);
        buf.put_u32(CREATOR_VERSION);
        buf.put_slice(CREATOR_HOST_OS);
        buf.put_u64(self.size);
        buf.put_u64(self.size);
        buf.put_u16(geometry.cylinders);
        buf.put_u8(geometry.heads);
        buf.put_u8(geometry.sectors_per_track);
        buf.put_u32(DISK_TYPE_FIXED);
        buf.put_u32(0);
        buf.put_slice(self.unique_id.as_bytes());
        buf.put_u8(0);
        buf.put_bytes(0, RESERVED_SIZE);

        let checksum = checksum(&buf);
        buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&checksum.to_be_bytes());
        buf.to_vec()
    }
}

/// One's complement of the byte sum, checksum field taken as zero
fn checksum(footer: &[u8]) -> u32 {
    let sum = footer
        .iter()
        .enumerate()
        .filter(|(i, _)| !(CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4).contains(i))
        .fold(0u32, |acc, (_, b)| acc.wrapping_add(u32::from(*b)));
    !sum
}
