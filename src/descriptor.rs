//! Volume descriptors, signing certificate and license slots.
//!
//! These structures live inside the content header at fixed offsets and
//! mix byte orders field by field, so every codec sets the cursor mode
//! explicitly rather than trusting the caller's.

use crate::constants::{console_type_flags, ConsoleType};
use crate::error::{Result, StfsError};
use crate::io::{ByteCursor, Endian};

/// STFS volume descriptor (36 bytes).
///
/// Carries the file table location, the digest of the top hash table and
/// the allocation counters. The block separation byte encodes the tree
/// shape in bit 0 and the top table's primary/backup selector in bit 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StfsVolumeDescriptor {
    pub size: u8,
    pub reserved: u8,
    pub block_separation: u8,
    pub file_table_block_count: u16,
    pub file_table_block_num: u32,
    pub top_hash_table_hash: [u8; 0x14],
    pub allocated_block_count: u32,
    pub unallocated_block_count: u32,
}

impl Default for StfsVolumeDescriptor {
    fn default() -> Self {
        StfsVolumeDescriptor {
            size: 0x24,
            reserved: 0,
            block_separation: 0,
            file_table_block_count: 0,
            file_table_block_num: 0,
            top_hash_table_hash: [0u8; 0x14],
            allocated_block_count: 0,
            unallocated_block_count: 0,
        }
    }
}

impl StfsVolumeDescriptor {
    pub fn read_at(io: &mut ByteCursor, address: u64) -> Result<Self> {
        io.seek(address);
        io.set_endian(Endian::Big);

        let size = io.read_u8()?;
        let reserved = io.read_u8()?;
        let block_separation = io.read_u8()?;

        io.set_endian(Endian::Little);
        let file_table_block_count = io.read_u16()?;
        let file_table_block_num = io.read_u24()?;

        let mut top_hash_table_hash = [0u8; 0x14];
        io.read_exact(&mut top_hash_table_hash)?;

        io.set_endian(Endian::Big);
        let allocated_block_count = io.read_u32()?;
        let unallocated_block_count = io.read_u32()?;

        Ok(StfsVolumeDescriptor {
            size,
            reserved,
            block_separation,
            file_table_block_count,
            file_table_block_num,
            top_hash_table_hash,
            allocated_block_count,
            unallocated_block_count,
        })
    }

    pub fn write_at(&self, io: &mut ByteCursor, address: u64) -> Result<()> {
        io.seek(address);
        io.set_endian(Endian::Big);

        io.write_u8(self.size)?;
        io.write_u8(self.reserved)?;
        io.write_u8(self.block_separation)?;

        io.set_endian(Endian::Little);
        io.write_u16(self.file_table_block_count)?;
        io.write_u24(self.file_table_block_num)?;

        io.write_bytes(&self.top_hash_table_hash)?;

        io.set_endian(Endian::Big);
        io.write_u32(self.allocated_block_count)?;
        io.write_u32(self.unallocated_block_count)?;
        Ok(())
    }
}

/// SVOD volume descriptor, read-only pass-through for non-STFS packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvodVolumeDescriptor {
    pub size: u8,
    pub block_cache_element_count: u8,
    pub worker_thread_processor: u8,
    pub worker_thread_priority: u8,
    pub root_hash: [u8; 0x14],
    pub flags: u8,
    pub data_block_count: u32,
    pub data_block_offset: u32,
    pub reserved: [u8; 5],
}

impl SvodVolumeDescriptor {
    pub fn read_at(io: &mut ByteCursor, address: u64) -> Result<Self> {
        io.seek(address);
        io.set_endian(Endian::Big);

        let size = io.read_u8()?;
        let block_cache_element_count = io.read_u8()?;
        let worker_thread_processor = io.read_u8()?;
        let worker_thread_priority = io.read_u8()?;

        let mut root_hash = [0u8; 0x14];
        io.read_exact(&mut root_hash)?;

        let flags = io.read_u8()?;
        let data_block_count = io.read_u24_as(Endian::Little)?;
        let data_block_offset = io.read_u24_as(Endian::Little)?;

        let mut reserved = [0u8; 5];
        io.read_exact(&mut reserved)?;

        Ok(SvodVolumeDescriptor {
            size,
            block_cache_element_count,
            worker_thread_processor,
            worker_thread_priority,
            root_hash,
            flags,
            data_block_count,
            data_block_offset,
            reserved,
        })
    }

    pub fn write_at(&self, io: &mut ByteCursor, address: u64) -> Result<()> {
        io.seek(address);
        io.set_endian(Endian::Big);

        io.write_u8(self.size)?;
        io.write_u8(self.block_cache_element_count)?;
        io.write_u8(self.worker_thread_processor)?;
        io.write_u8(self.worker_thread_priority)?;
        io.write_bytes(&self.root_hash)?;
        io.write_u8(self.flags)?;
        io.write_u24_as(self.data_block_count, Endian::Little)?;
        io.write_u24_as(self.data_block_offset, Endian::Little)?;
        io.write_bytes(&self.reserved)?;
        Ok(())
    }
}

/// Console signing certificate (0x1B8 bytes), present in CON packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub public_key_certificate_size: u16,
    pub owner_console_id: [u8; 5],
    pub owner_console_part_number: String,
    pub owner_console_type: ConsoleType,
    pub console_type_flags: u32,
    pub date_generation: String,
    pub public_exponent: u32,
    pub public_modulus: Vec<u8>,
    pub certificate_signature: Vec<u8>,
    pub signature: Vec<u8>,
}

impl Default for Certificate {
    fn default() -> Self {
        Certificate {
            public_key_certificate_size: 0x1A8,
            owner_console_id: [0u8; 5],
            owner_console_part_number: String::new(),
            owner_console_type: ConsoleType::Retail,
            console_type_flags: 0,
            date_generation: String::new(),
            public_exponent: 0,
            public_modulus: vec![0u8; 0x80],
            certificate_signature: vec![0u8; 0x100],
            signature: vec![0u8; 0x10],
        }
    }
}

impl Certificate {
    pub fn read_at(io: &mut ByteCursor, address: u64) -> Result<Self> {
        io.seek(address);
        io.set_endian(Endian::Big);

        let public_key_certificate_size = io.read_u16()?;

        let mut owner_console_id = [0u8; 5];
        io.read_exact(&mut owner_console_id)?;

        let owner_console_part_number = io.read_fixed_string(0x11)?;

        let packed = io.read_u32()?;
        let owner_console_type = ConsoleType::from_u32(packed & 3)?;
        let console_type_flags = packed & 0xFFFF_FFFC;

        let date_generation = io.read_fixed_string(0x8)?;

        let public_exponent = io.read_u32()?;
        let public_modulus = io.read_bytes(0x80)?;
        let certificate_signature = io.read_bytes(0x100)?;
        let signature = io.read_bytes(0x10)?;

        Ok(Certificate {
            public_key_certificate_size,
            owner_console_id,
            owner_console_part_number,
            owner_console_type,
            console_type_flags,
            date_generation,
            public_exponent,
            public_modulus,
            certificate_signature,
            signature,
        })
    }

    pub fn write_at(&self, io: &mut ByteCursor, address: u64) -> Result<()> {
        io.seek(address);
        io.set_endian(Endian::Big);

        io.write_u16(self.public_key_certificate_size)?;
        io.write_bytes(&self.owner_console_id)?;
        io.write_fixed_string(&self.owner_console_part_number, 0x11)?;
        io.write_u32(self.console_type_flags | self.owner_console_type as u32)?;
        io.write_fixed_string(&self.date_generation, 0x8)?;
        io.write_u32(self.public_exponent)?;
        io.write_bytes(&self.public_modulus)?;
        io.write_bytes(&self.certificate_signature)?;
        io.write_bytes(&self.signature)?;
        Ok(())
    }

    pub fn is_test_kit(&self) -> bool {
        self.console_type_flags & console_type_flags::TEST_KIT != 0
    }

    pub fn is_recovery_generated(&self) -> bool {
        self.console_type_flags & console_type_flags::RECOVERY_GENERATED != 0
    }
}

/// One of the 16 license slots at the top of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LicenseEntry {
    pub license_type: u16,
    pub data: u64,
    pub bits: u32,
    pub flags: u32,
}

impl LicenseEntry {
    /// Read one slot, validating the type against the known set.
    pub fn read(io: &mut ByteCursor, slot: usize) -> Result<Self> {
        io.set_endian(Endian::Big);
        let packed = io.read_u64()?;
        let license_type = (packed >> 48) as u16;
        let data = packed & 0xFFFF_FFFF_FFFF;

        if crate::constants::LicenseType::from_u16(license_type).is_none() {
            return Err(StfsError::InvalidLicenseType { license_type, slot });
        }

        let bits = io.read_u32()?;
        let flags = io.read_u32()?;

        Ok(LicenseEntry {
            license_type,
            data,
            bits,
            flags,
        })
    }

    pub fn write(&self, io: &mut ByteCursor) -> Result<()> {
        io.set_endian(Endian::Big);
        io.write_u64(((self.license_type as u64) << 48) | (self.data & 0xFFFF_FFFF_FFFF))?;
        io.write_u32(self.bits)?;
        io.write_u32(self.flags)?;
        Ok(())
    }
}
