//! The package engine: parsing, file extraction and injection, block
//! allocation and rehashing.
//!
//! All mutation happens against the in-memory buffer; callers persist the
//! result with [`StfsPackage::save_to`] or [`StfsPackage::into_bytes`].
//! Writes keep the hash tree's chain pointers and allocation status
//! current as they go, but digests are only recomputed by an explicit
//! [`StfsPackage::rehash`].

use std::collections::HashMap;
use std::path::Path;

use sha1::{Digest, Sha1};
use tracing::{debug, info};

use crate::constants::{
    block_status, ConsoleType, ContentType, FileSystem, Level, Magic, Sex, BLOCK_CHAIN_END,
    BLOCK_SIZE, DATA_BLOCKS_PER_HASH_LEVEL, ENTRIES_PER_FILE_TABLE_BLOCK, FILE_ENTRY_SIZE,
    HASH_ENTRY_SIZE, MAX_NAME_LEN,
};
use crate::descriptor::StfsVolumeDescriptor;
use crate::error::{Result, StfsError};
use crate::header::{self, ContentHeader, HeaderSigner, PEC_HEADER_SIZE};
use crate::hashtree::{HashEntry, HashTable, TreeGeometry};
use crate::io::{ByteCursor, Endian};
use crate::listing::{entry_flags, StfsFileEntry, StfsFileListing};

/// Flags accepted when opening or creating a package.
pub mod package_flags {
    /// The buffer holds a PEC (profile embedded content) package.
    pub const PEC: u32 = 1;
    /// Initialize a blank package in the buffer before parsing.
    pub const CREATE: u32 = 2;
    /// With `CREATE`: build a female package (no backup hash tables).
    pub const FEMALE: u32 = 4;
}

/// Callback fed the rough completion percentage of a long transfer.
pub type ProgressFn<'a> = &'a mut dyn FnMut(u32);

/// How chain writers obtain their next block: reuse the existing chain
/// until it ends, then switch to fresh allocations for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AllocMode {
    Reusing,
    AlwaysAllocating,
}

fn report(progress: &mut Option<ProgressFn>, percent: u32) {
    if let Some(f) = progress.as_mut() {
        f(percent.min(100));
    }
}

fn report_blocks(progress: &mut Option<ProgressFn>, done: u32, total: u32) {
    if let Some(f) = progress.as_mut() {
        let percent = (done as u64 * 100 / total.max(1) as u64) as u32;
        f(percent.min(100));
    }
}

fn sha1_digest(data: &[u8]) -> [u8; 0x14] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// An open STFS package.
pub struct StfsPackage {
    pub metadata: ContentHeader,
    io: ByteCursor,
    flags: u32,
    geometry: TreeGeometry,
    top_level: Level,
    top_table: HashTable,
    /// Most recently fetched level-1 table, reused while walking blocks
    /// covered by the same table.
    cached_table: Option<HashTable>,
    tables_per_level: [u32; 3],
    listing: StfsFileListing,
}

impl StfsPackage {
    /// Parse a package from a byte buffer.
    pub fn from_bytes(buf: Vec<u8>, flags: u32) -> Result<Self> {
        let mut io = ByteCursor::new(buf);
        if flags & package_flags::CREATE != 0 {
            Self::stamp_new_package(&mut io, flags)?;
        }
        Self::parse(io, flags)
    }

    /// Initialize a blank package in memory.
    pub fn create(flags: u32) -> Result<Self> {
        Self::from_bytes(Vec::new(), flags | package_flags::CREATE)
    }

    /// Load a package from disk.
    pub fn open<P: AsRef<Path>>(path: P, flags: u32) -> Result<Self> {
        Self::parse(ByteCursor::from_file(path)?, flags)
    }

    /// Write the current buffer out to disk.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.io.save_to(path)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.io.as_slice()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.io.into_inner()
    }

    pub fn is_pec(&self) -> bool {
        self.flags & package_flags::PEC != 0
    }

    pub fn sex(&self) -> Sex {
        self.geometry.sex
    }

    pub fn volume_descriptor(&self) -> &StfsVolumeDescriptor {
        &self.metadata.stfs_volume_descriptor
    }

    /// The directory tree, optionally re-read from the file table first.
    pub fn file_listing(&mut self, force_update: bool) -> Result<&StfsFileListing> {
        if force_update {
            self.read_file_listing()?;
        }
        Ok(&self.listing)
    }

    /// Stamp the minimum parseable structure into a fresh buffer: magic,
    /// console type, header sizing, a one-block volume descriptor and the
    /// hash entry covering the empty file table.
    fn stamp_new_package(io: &mut ByteCursor, flags: u32) -> Result<()> {
        let pec = flags & package_flags::PEC != 0;
        let female = flags & package_flags::FEMALE != 0;

        // PEC headers are always one page; the reader fixes their size
        let header_size: u32 = match (pec, female) {
            (true, _) => PEC_HEADER_SIZE,
            (false, true) => 0xB000,
            (false, false) => 0xA000,
        };
        // header pages + hash table span + file table block + one slack page
        let pages = (header_size >> 12) as usize + if female { 1 } else { 2 } + 2;
        let target = pages * BLOCK_SIZE;
        if io.len() < target {
            io.extend(target - io.len());
        }

        let descriptor = StfsVolumeDescriptor {
            block_separation: female as u8,
            file_table_block_count: 1,
            file_table_block_num: 0,
            allocated_block_count: 1,
            ..Default::default()
        };

        io.set_endian(Endian::Big);
        if pec {
            io.seek(0x18);
            io.write_u32(ConsoleType::Retail as u32)?;
            descriptor.write_at(io, header::PEC_VOLUME_DESCRIPTOR)?;
        } else {
            io.seek(0);
            io.write_u32(Magic::Con as u32)?;
            io.seek(0x1C);
            io.write_u32(ConsoleType::Retail as u32)?;
            io.seek(0x340);
            io.write_u32(header_size)?;
            io.write_u32(ContentType::SavedGame as u32)?;
            io.write_u32(2)?;
            descriptor.write_at(io, header::VOLUME_DESCRIPTOR)?;
        }

        // hash entry for the file table block
        let first = ((header_size as u64) + 0xFFF) & 0xF_FFFF_F000;
        io.seek(first + 0x14);
        io.write_u8(block_status::ALLOCATED)?;
        io.write_u24_as(BLOCK_CHAIN_END, Endian::Big)?;

        info!(header_size, pec, female, "initialized blank package");
        Ok(())
    }

    fn parse(mut io: ByteCursor, flags: u32) -> Result<Self> {
        let is_pec = flags & package_flags::PEC != 0;
        let metadata = ContentHeader::read(&mut io, is_pec)?;
        if metadata.file_system != FileSystem::Stfs {
            return Err(StfsError::NotStfs(metadata.file_system as u32));
        }

        let descriptor = &metadata.stfs_volume_descriptor;
        let sex = Sex::from_block_separation(descriptor.block_separation);
        let geometry = TreeGeometry::new(sex, metadata.header_size);
        let allocated = descriptor.allocated_block_count;
        let tables_per_level = TreeGeometry::tables_per_level(allocated);
        let top_level = TreeGeometry::top_level(allocated)?;

        let mut package = StfsPackage {
            metadata,
            io,
            flags,
            geometry,
            top_level,
            top_table: HashTable {
                level: top_level,
                true_block_number: 0,
                entry_count: 0,
                entries: Vec::new(),
                address: 0,
            },
            cached_table: None,
            tables_per_level,
            listing: StfsFileListing::root(),
        };
        package.read_top_table()?;
        package.read_file_listing()?;

        debug!(
            allocated,
            level = ?package.top_level,
            sex = ?package.geometry.sex,
            "parsed package"
        );
        Ok(package)
    }

    /// (Re)read the top hash table. Its address depends on the descriptor's
    /// primary/backup selector bit.
    fn read_top_table(&mut self) -> Result<()> {
        let descriptor = &self.metadata.stfs_volume_descriptor;
        let true_block = self.geometry.backing_block_for_level(0, self.top_level);
        let address = ((true_block as u64) << 12)
            + self.geometry.first_hash_table_address
            + (((descriptor.block_separation & 2) as u64) << 0xB);
        let entry_count = TreeGeometry::top_table_entry_count(descriptor.allocated_block_count)?;

        self.io.seek(address);
        let mut entries = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            entries.push(HashEntry::read(&mut self.io)?);
        }
        self.top_table = HashTable {
            level: self.top_level,
            true_block_number: true_block,
            entry_count,
            entries,
            address,
        };
        Ok(())
    }

    /// Walk the file table chain and rebuild the directory tree.
    fn read_file_listing(&mut self) -> Result<()> {
        let mut flat: Vec<StfsFileEntry> = Vec::new();
        let table_block_count = self.metadata.stfs_volume_descriptor.file_table_block_count as u32;
        let mut block = self.metadata.stfs_volume_descriptor.file_table_block_num;

        for x in 0..table_block_count {
            let table_address = self.geometry.block_to_address(block)?;
            for i in 0..ENTRIES_PER_FILE_TABLE_BLOCK as u64 {
                let record_address = table_address + i * FILE_ENTRY_SIZE;
                self.io.seek(record_address);
                self.io.set_endian(Endian::Big);

                let name = self.io.read_fixed_string(MAX_NAME_LEN)?;
                let packed_len = self.io.read_u8()?;
                // a zero length marks a deleted record, an empty name the
                // end of the table
                if packed_len & 0x3F == 0 {
                    continue;
                }
                if name.is_empty() {
                    break;
                }

                let blocks_for_file = self.io.read_u24_as(Endian::Little)?;
                self.io.seek(record_address + 0x2F);
                let starting_block_num = self.io.read_u24_as(Endian::Little)?;
                let path_indicator = self.io.read_u16()?;
                let file_size = self.io.read_u32()?;
                let created_time_stamp = self.io.read_u32()?;
                let access_time_stamp = self.io.read_u32()?;

                flat.push(StfsFileEntry {
                    entry_index: (x * 0x40 + i as u32) as u16,
                    name,
                    name_len: packed_len & 0x3F,
                    flags: packed_len >> 6,
                    blocks_for_file,
                    starting_block_num,
                    path_indicator,
                    file_size,
                    created_time_stamp,
                    access_time_stamp,
                    file_entry_address: record_address,
                });
            }
            if x + 1 < table_block_count {
                block = self.block_hash_entry(block)?.next_block;
            }
        }

        let mut root = StfsFileListing::root();
        Self::add_to_listing(&flat, &mut root);
        self.listing = root;
        Ok(())
    }

    fn add_to_listing(flat: &[StfsFileEntry], out: &mut StfsFileListing) {
        for entry in flat {
            if entry.path_indicator != out.folder.entry_index {
                continue;
            }
            if !entry.is_directory() {
                out.file_entries.push(entry.clone());
            } else if entry.entry_index != out.folder.entry_index {
                out.folder_entries.push(StfsFileListing {
                    folder: entry.clone(),
                    file_entries: Vec::new(),
                    folder_entries: Vec::new(),
                });
            }
        }
        for sub in &mut out.folder_entries {
            Self::add_to_listing(flat, sub);
        }
    }

    fn split_path(path: &str) -> Vec<&str> {
        path.split('\\').filter(|s| !s.is_empty()).collect()
    }

    pub fn file_exists(&self, path: &str) -> bool {
        self.listing
            .find_entry(&Self::split_path(path), false)
            .is_some()
    }

    pub fn file_entry(&self, path: &str) -> Result<StfsFileEntry> {
        self.listing
            .find_entry(&Self::split_path(path), false)
            .cloned()
            .ok_or_else(|| StfsError::PathNotFound(path.to_string()))
    }

    /// First dword of a file, 0 for files shorter than 4 bytes.
    pub fn file_magic(&mut self, path: &str) -> Result<u32> {
        let entry = self.file_entry(path)?;
        if entry.file_size < 4 {
            return Ok(0);
        }
        let address = self.geometry.block_to_address(entry.starting_block_num)?;
        self.io.seek(address);
        self.io.set_endian(Endian::Big);
        self.io.read_u32()
    }

    /// Absolute byte address of the hash entry covering `block_num` in the
    /// current copy of its level-0 table.
    pub fn hash_address_of_block(&mut self, block_num: u32) -> Result<u64> {
        if block_num >= self.metadata.stfs_volume_descriptor.allocated_block_count {
            return Err(StfsError::InvalidBlockNumber(block_num));
        }

        let mut hash_address = ((self.geometry.level0_backing_block(block_num) as u64) << 12)
            + self.geometry.first_hash_table_address
            + ((block_num % 0xAA) as u64) * HASH_ENTRY_SIZE;

        match self.top_level {
            Level::Zero => {
                let separation = self.metadata.stfs_volume_descriptor.block_separation;
                hash_address += ((separation & 2) as u64) << 0xB;
            }
            Level::One => {
                let status = self
                    .top_table
                    .entries
                    .get((block_num / 0xAA) as usize)
                    .map_or(0, |e| e.status);
                hash_address += ((status & 0x40) as u64) << 6;
            }
            Level::Two => {
                let level1_status = self
                    .top_table
                    .entries
                    .get((block_num / 0x70E4) as usize)
                    .map_or(0, |e| e.status);
                let level1_address = ((self.geometry.level1_backing_block(block_num) as u64)
                    << 12)
                    + self.geometry.first_hash_table_address
                    + (((level1_status & 0x40) as u64) << 6)
                    + ((block_num % 0xAA) as u64) * HASH_ENTRY_SIZE;
                self.io.seek(level1_address + 0x14);
                let status = self.io.read_u8()?;
                hash_address += ((status & 0x40) as u64) << 6;
            }
        }
        Ok(hash_address)
    }

    /// The level-0 hash entry covering `block_num`.
    pub fn block_hash_entry(&mut self, block_num: u32) -> Result<HashEntry> {
        let address = self.hash_address_of_block(block_num)?;
        self.io.seek(address);
        HashEntry::read(&mut self.io)
    }

    /// Point `block_num`'s chain at `next_block`, mirroring the change in
    /// the in-memory top table when it is the level-0 table.
    pub fn set_next_block(&mut self, block_num: u32, next_block: u32) -> Result<()> {
        let address = self.hash_address_of_block(block_num)?;
        self.io.seek(address + 0x15);
        self.io.write_u24_as(next_block, Endian::Big)?;
        if self.top_level == Level::Zero {
            if let Some(entry) = self.top_table.entries.get_mut(block_num as usize) {
                entry.next_block = next_block;
            }
        }
        Ok(())
    }

    /// Absolute byte address of the current copy of hash table `index` at
    /// `level`, consulting the parent table's selector bit below the top.
    fn hash_table_address(&mut self, index: u32, level: Level) -> Result<u64> {
        let base = self.geometry.base_hash_table_address(index, level);
        if level == self.top_table.level {
            let separation = self.metadata.stfs_volume_descriptor.block_separation;
            return Ok(base + (((separation & 2) as u64) << 0xB));
        }
        let parent_entry_address = self.table_hash_address(index, level)?;
        self.io.seek(parent_entry_address + 0x14);
        let status = self.io.read_u8()?;
        Ok(base + (((status & 0x40) as u64) << 6))
    }

    /// Absolute byte address of the parent hash entry covering table
    /// `index` at `level`.
    fn table_hash_address(&mut self, index: u32, level: Level) -> Result<u64> {
        if level >= self.top_table.level {
            return Err(StfsError::InvalidLevel(level.index() as u8));
        }
        let parent = match level {
            Level::Zero => Level::One,
            _ => Level::Two,
        };
        let mut base = self.geometry.base_hash_table_address(index / 0xAA, parent);
        if parent == self.top_level {
            let separation = self.metadata.stfs_volume_descriptor.block_separation;
            base += ((separation & 2) as u64) << 0xB;
        } else {
            let status = self
                .top_table
                .entries
                .get((index / 0xAA) as usize)
                .map_or(0, |e| e.status);
            base += ((status & 0x40) as u64) << 6;
        }
        Ok(base + ((index % 0xAA) as u64) * HASH_ENTRY_SIZE)
    }

    /// Fetch hash table `index` at `level`, resolving which copy is current
    /// through the parent table.
    pub fn level_n_hash_table(&mut self, index: u32, level: Level) -> Result<HashTable> {
        if level > self.top_level {
            return Err(StfsError::InvalidLevel(level.index() as u8));
        }
        if level == self.top_level {
            return Ok(self.top_table.clone());
        }

        let allocated = self.metadata.stfs_volume_descriptor.allocated_block_count;
        let true_block = self
            .geometry
            .backing_block_for_level(index * DATA_BLOCKS_PER_HASH_LEVEL[level.index()], level);
        let mut address = ((true_block as u64) << 12) + self.geometry.first_hash_table_address;

        let entry_count;
        if level.index() + 1 == self.top_level.index() {
            let status = self
                .top_table
                .entries
                .get(index as usize)
                .map_or(0, |e| e.status);
            address += ((status & 0x40) as u64) << 6;

            entry_count = if index + 1 == self.tables_per_level[level.index()] {
                let remainder = if level == Level::Zero {
                    allocated % 0xAA
                } else {
                    self.tables_per_level[level.index() - 1] % 0xAA
                };
                if remainder == 0 {
                    0xAA
                } else {
                    remainder
                }
            } else {
                0xAA
            };
        } else {
            // level zero under a three-level tree: go through the level-1
            // table, keeping the last one fetched around
            let parent_block = self.geometry.level1_backing_block(index * 0xAA);
            let needs_fetch = self
                .cached_table
                .as_ref()
                .map_or(true, |t| t.true_block_number != parent_block);
            if needs_fetch {
                let parent = self.level_n_hash_table(index / 0xAA, Level::One)?;
                self.cached_table = Some(parent);
            }
            let status = self
                .cached_table
                .as_ref()
                .and_then(|t| t.entries.get((index % 0xAA) as usize))
                .map_or(0, |e| e.status);
            address += ((status & 0x40) as u64) << 6;

            entry_count = if index + 1 == self.tables_per_level[0] {
                let remainder = allocated % 0xAA;
                if remainder == 0 {
                    0xAA
                } else {
                    remainder
                }
            } else {
                0xAA
            };
        }

        self.io.seek(address);
        let mut entries = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            entries.push(HashEntry::read(&mut self.io)?);
        }
        Ok(HashTable {
            level,
            true_block_number: true_block,
            entry_count,
            entries,
            address,
        })
    }

    /// Allocate the next data block, growing the buffer and the hash tree
    /// as needed. Returns the new block number.
    fn allocate_block(&mut self) -> Result<u32> {
        self.cached_table = None;

        self.metadata.stfs_volume_descriptor.allocated_block_count += 1;
        let allocated = self.metadata.stfs_volume_descriptor.allocated_block_count;

        let mut growth = BLOCK_SIZE;
        let recalculated = TreeGeometry::tables_per_level(allocated);
        for i in (0..3).rev() {
            if recalculated[i] == self.tables_per_level[i] {
                continue;
            }
            // a new table at this level occupies one span of pages
            growth += ((self.geometry.sex.shift() as usize) + 1) * BLOCK_SIZE;
            self.tables_per_level[i] = recalculated[i];

            if i + 1 == self.top_level.index() {
                // the top table gains an entry covering the new child table
                self.top_table.entry_count += 1;
                self.top_table.entries.push(HashEntry::default());
                let entry_address = self.top_table.address
                    + ((self.tables_per_level[i] - 1) as u64) * HASH_ENTRY_SIZE;
                self.io.seek(entry_address + 0x15);
                self.io.write_u24_as(BLOCK_CHAIN_END, Endian::Big)?;
            }
        }
        self.io.extend(growth);

        let new_top = TreeGeometry::top_level(allocated)?;
        if new_top != self.top_level {
            // promote: the old top table becomes the first child of the new
            // one, and its selector bit moves into the new table's entry
            let separation = self.metadata.stfs_volume_descriptor.block_separation;
            let block_offset = separation & 2;
            self.metadata.stfs_volume_descriptor.block_separation = separation & 0xFD;

            self.top_level = new_top;
            self.top_table.level = new_top;
            let address = self.hash_table_address(0, new_top)?;

            let first_entry = HashEntry {
                status: block_offset << 5,
                ..HashEntry::default()
            };
            self.top_table = HashTable {
                level: new_top,
                true_block_number: self.geometry.backing_block_for_level(0, new_top),
                entry_count: 2,
                entries: vec![first_entry, HashEntry::default()],
                address,
            };
            self.io.seek(address + 0x14);
            self.io.write_u8(self.top_table.entries[0].status)?;

            info!(allocated, level = ?new_top, "hash tree promoted");
        }

        let new_block = allocated - 1;
        let hash_address = self.hash_address_of_block(new_block)?;
        self.io.seek(hash_address + 0x14);
        self.io.write_u8(block_status::ALLOCATED)?;
        self.io.write_u24_as(BLOCK_CHAIN_END, Endian::Big)?;

        if self.top_level == Level::Zero {
            self.top_table.entry_count += 1;
            self.top_table.entries.push(HashEntry {
                status: block_status::ALLOCATED,
                next_block: BLOCK_CHAIN_END,
                ..HashEntry::default()
            });
        }

        self.metadata.write_volume_descriptor(&mut self.io)?;
        Ok(new_block)
    }

    /// Follow an existing chain, switching to fresh allocations once it
    /// runs out.
    fn advance_chain(&mut self, block: u32, mode: &mut AllocMode) -> Result<u32> {
        if *mode == AllocMode::Reusing {
            let next = self.block_hash_entry(block)?.next_block;
            if next != BLOCK_CHAIN_END {
                return Ok(next);
            }
            *mode = AllocMode::AlwaysAllocating;
        }
        let next = self.allocate_block()?;
        self.set_next_block(block, next)?;
        Ok(next)
    }

    /// Read `length` bytes from the start of a data block.
    pub fn extract_block(&mut self, block_num: u32, length: usize) -> Result<Vec<u8>> {
        if block_num >= self.metadata.stfs_volume_descriptor.allocated_block_count {
            return Err(StfsError::InvalidBlockNumber(block_num));
        }
        let address = self.geometry.block_to_address(block_num)?;
        self.io.seek(address);
        self.io.read_bytes(length)
    }

    /// Extract a file's contents by path.
    pub fn extract_file(&mut self, path: &str, progress: Option<ProgressFn>) -> Result<Vec<u8>> {
        let entry = self.file_entry(path)?;
        self.extract_entry(&entry, progress)
    }

    /// Extract a file's contents. Consecutively laid out files are read in
    /// long runs that hop over the interleaved hash tables; fragmented
    /// files follow the block chain.
    pub fn extract_entry(
        &mut self,
        entry: &StfsFileEntry,
        mut progress: Option<ProgressFn>,
    ) -> Result<Vec<u8>> {
        let file_size = entry.file_size as usize;
        let mut out = Vec::with_capacity(file_size);
        if file_size == 0 {
            report(&mut progress, 100);
            return Ok(out);
        }

        if entry.has_consecutive_blocks() {
            let start_address = self.geometry.block_to_address(entry.starting_block_num)?;
            self.io.seek(start_address);

            // blocks before the next hash table interrupts the run
            let run_blocks = self.geometry.level0_backing_block(entry.starting_block_num)
                + self.geometry.block_step[0]
                - ((start_address - self.geometry.first_hash_table_address) >> 12) as u32;

            if entry.blocks_for_file <= run_blocks {
                out.extend_from_slice(&self.io.read_bytes(file_size)?);
                report(&mut progress, 100);
                return Ok(out);
            }

            out.extend_from_slice(&self.io.read_bytes((run_blocks as usize) << 12)?);
            let mut done = run_blocks;
            report_blocks(&mut progress, done, entry.blocks_for_file);

            let mut remaining = file_size - ((run_blocks as usize) << 12);
            while remaining >= 0xAA000 {
                let position = self.io.position();
                let skip = self.geometry.hash_table_skip_size(position);
                self.io.seek(position + skip);
                out.extend_from_slice(&self.io.read_bytes(0xAA000)?);
                remaining -= 0xAA000;
                done += 0xAA;
                report_blocks(&mut progress, done, entry.blocks_for_file);
            }
            if remaining != 0 {
                let position = self.io.position();
                let skip = self.geometry.hash_table_skip_size(position);
                self.io.seek(position + skip);
                out.extend_from_slice(&self.io.read_bytes(remaining)?);
            }
            report(&mut progress, 100);
        } else {
            let full_blocks = file_size / BLOCK_SIZE;
            let remainder = file_size % BLOCK_SIZE;
            let mut block = entry.starting_block_num;
            for i in 0..full_blocks {
                out.extend_from_slice(&self.extract_block(block, BLOCK_SIZE)?);
                block = self.block_hash_entry(block)?.next_block;
                report_blocks(&mut progress, (i + 1) as u32, entry.blocks_for_file);
            }
            if remainder != 0 {
                out.extend_from_slice(&self.extract_block(block, remainder)?);
            }
            report(&mut progress, 100);
        }
        Ok(out)
    }

    /// Next unused placeholder index for a record that has not been written
    /// to the file table yet.
    fn next_entry_index(&self) -> u16 {
        let (folders, files) = self.listing.flatten();
        folders
            .iter()
            .chain(files.iter())
            .filter(|e| e.entry_index != 0xFFFF)
            .map(|e| e.entry_index)
            .max()
            .map_or(0, |m| m + 1)
    }

    /// Add a new file to the package.
    pub fn inject_file(
        &mut self,
        data: &[u8],
        path: &str,
        mut progress: Option<ProgressFn>,
    ) -> Result<StfsFileEntry> {
        if self.file_exists(path) {
            return Err(StfsError::AlreadyExists(path.to_string()));
        }
        let segments = Self::split_path(path);
        let (file_name, folder_segments) = segments
            .split_last()
            .ok_or_else(|| StfsError::PathNotFound(path.to_string()))?;
        if file_name.len() > MAX_NAME_LEN {
            return Err(StfsError::NameTooLong((*file_name).to_string()));
        }
        let folder_index = self
            .listing
            .find_folder(folder_segments)
            .ok_or_else(|| StfsError::FolderNotFound(path.to_string()))?
            .folder
            .entry_index;

        let now = chrono::Utc::now().timestamp() as u32;
        let mut entry = StfsFileEntry {
            entry_index: self.next_entry_index(),
            name: (*file_name).to_string(),
            name_len: file_name.len() as u8,
            flags: entry_flags::CONSECUTIVE_BLOCKS,
            blocks_for_file: ((data.len() as u64 + 0xFFF) >> 12) as u32,
            starting_block_num: BLOCK_CHAIN_END,
            path_indicator: folder_index,
            file_size: data.len() as u32,
            created_time_stamp: now,
            access_time_stamp: now,
            file_entry_address: 0,
        };

        let mut previous = BLOCK_CHAIN_END;
        let mut offset = 0usize;
        let mut done = 0u32;
        while data.len() - offset >= BLOCK_SIZE {
            let block = self.allocate_block()?;
            if entry.starting_block_num == BLOCK_CHAIN_END {
                entry.starting_block_num = block;
            }
            if previous != BLOCK_CHAIN_END {
                self.set_next_block(previous, block)?;
            }
            previous = block;

            let address = self.geometry.block_to_address(block)?;
            self.io.seek(address);
            self.io.write_bytes(&data[offset..offset + BLOCK_SIZE])?;
            offset += BLOCK_SIZE;
            done += 1;
            report_blocks(&mut progress, done, entry.blocks_for_file);
        }
        if offset < data.len() {
            let block = self.allocate_block()?;
            if entry.starting_block_num == BLOCK_CHAIN_END {
                entry.starting_block_num = block;
            }
            if previous != BLOCK_CHAIN_END {
                self.set_next_block(previous, block)?;
            }
            previous = block;

            let address = self.geometry.block_to_address(block)?;
            self.io.seek(address);
            self.io.write_bytes(&data[offset..])?;
        }
        if previous != BLOCK_CHAIN_END {
            self.set_next_block(previous, BLOCK_CHAIN_END)?;
        }

        self.listing
            .find_folder_mut(folder_segments)
            .ok_or_else(|| StfsError::FolderNotFound(path.to_string()))?
            .file_entries
            .push(entry);
        self.write_file_listing()?;
        report(&mut progress, 100);

        debug!(path, size = data.len(), "injected file");
        self.file_entry(path)
    }

    /// Overwrite a file's contents, reusing its existing chain and
    /// allocating extra blocks only once it runs out.
    pub fn replace_file(
        &mut self,
        data: &[u8],
        path: &str,
        mut progress: Option<ProgressFn>,
    ) -> Result<StfsFileEntry> {
        let mut entry = self.file_entry(path)?;
        let file_size = data.len();
        entry.file_size = file_size as u32;
        entry.blocks_for_file = ((file_size as u64 + 0xFFF) >> 12) as u32;
        // the reused chain is not guaranteed consecutive anymore
        entry.flags &= entry_flags::FOLDER;

        let mut block = entry.starting_block_num;
        let mut mode = AllocMode::Reusing;
        if block == BLOCK_CHAIN_END && file_size > 0 {
            block = self.allocate_block()?;
            entry.starting_block_num = block;
            mode = AllocMode::AlwaysAllocating;
        }

        let full_blocks = file_size / BLOCK_SIZE;
        let remainder = file_size % BLOCK_SIZE;
        let mut first = true;
        for i in 0..full_blocks {
            if first {
                first = false;
            } else {
                block = self.advance_chain(block, &mut mode)?;
            }
            let address = self.geometry.block_to_address(block)?;
            self.io.seek(address);
            self.io
                .write_bytes(&data[i * BLOCK_SIZE..(i + 1) * BLOCK_SIZE])?;
            report_blocks(&mut progress, (i + 1) as u32, entry.blocks_for_file);
        }
        if remainder != 0 {
            if !first {
                block = self.advance_chain(block, &mut mode)?;
            }
            let address = self.geometry.block_to_address(block)?;
            self.io.seek(address);
            self.io.write_bytes(&data[full_blocks * BLOCK_SIZE..])?;
        }
        if block != BLOCK_CHAIN_END {
            self.set_next_block(block, BLOCK_CHAIN_END)?;
        }

        self.update_entry(path, entry)?;
        if self.top_level == Level::Zero {
            self.read_top_table()?;
        }
        report(&mut progress, 100);

        debug!(path, size = file_size, "replaced file");
        self.file_entry(path)
    }

    /// Rewrite one record both in the tree and on disk.
    fn update_entry(&mut self, path: &str, entry: StfsFileEntry) -> Result<()> {
        let segments = Self::split_path(path);
        let address = entry.file_entry_address;
        {
            let slot = self
                .listing
                .find_entry_mut(&segments, false)
                .ok_or_else(|| StfsError::PathNotFound(path.to_string()))?;
            *slot = entry.clone();
        }
        self.io.seek(address);
        self.write_file_entry_at_cursor(&entry)
    }

    /// Rename a file or folder in place.
    pub fn rename_file(&mut self, new_name: &str, path: &str) -> Result<()> {
        if new_name.is_empty() || new_name.len() > MAX_NAME_LEN {
            return Err(StfsError::NameTooLong(new_name.to_string()));
        }
        let segments = Self::split_path(path);
        let updated = {
            let entry = self
                .listing
                .find_entry_mut(&segments, true)
                .ok_or_else(|| StfsError::PathNotFound(path.to_string()))?;
            entry.name = new_name.to_string();
            entry.name_len = new_name.len() as u8;
            entry.clone()
        };
        self.io.seek(updated.file_entry_address);
        self.write_file_entry_at_cursor(&updated)
    }

    /// Remove a file's record from the table. Its blocks stay allocated;
    /// the space is not reclaimed.
    pub fn delete_file(&mut self, path: &str) -> Result<()> {
        let segments = Self::split_path(path);
        let (name, folder_segments) = segments
            .split_last()
            .ok_or_else(|| StfsError::PathNotFound(path.to_string()))?;
        {
            let folder = self
                .listing
                .find_folder_mut(folder_segments)
                .ok_or_else(|| StfsError::FolderNotFound(path.to_string()))?;
            let before = folder.file_entries.len();
            folder.file_entries.retain(|e| e.name != *name);
            if folder.file_entries.len() == before {
                return Err(StfsError::PathNotFound(path.to_string()));
            }
        }
        debug!(path, "deleted file");
        self.write_file_listing()
    }

    /// Add an empty folder record.
    pub fn create_folder(&mut self, path: &str) -> Result<()> {
        let segments = Self::split_path(path);
        let (name, parent_segments) = segments
            .split_last()
            .ok_or_else(|| StfsError::FolderNotFound(path.to_string()))?;
        if name.len() > MAX_NAME_LEN {
            return Err(StfsError::NameTooLong((*name).to_string()));
        }
        if self.listing.find_entry(&segments, true).is_some() {
            return Err(StfsError::AlreadyExists(path.to_string()));
        }

        let entry_index = self.next_entry_index();
        let now = chrono::Utc::now().timestamp() as u32;
        let parent = self
            .listing
            .find_folder_mut(parent_segments)
            .ok_or_else(|| StfsError::FolderNotFound(path.to_string()))?;
        let folder = StfsFileEntry {
            entry_index,
            name: (*name).to_string(),
            name_len: name.len() as u8,
            flags: entry_flags::FOLDER,
            blocks_for_file: 0,
            starting_block_num: 0,
            path_indicator: parent.folder.entry_index,
            file_size: 0,
            created_time_stamp: now,
            access_time_stamp: now,
            file_entry_address: 0,
        };
        parent.folder_entries.push(StfsFileListing {
            folder,
            file_entries: Vec::new(),
            folder_entries: Vec::new(),
        });
        self.write_file_listing()
    }

    /// Serialize the directory tree back into the file table: folders
    /// first, then files, with parent indices remapped to the new record
    /// positions.
    fn write_file_listing(&mut self) -> Result<()> {
        let (mut folders, mut files) = self.listing.flatten();
        // the synthetic root has no record
        folders.remove(0);

        let mut index_map: HashMap<u16, u16> = HashMap::new();
        index_map.insert(0xFFFF, 0xFFFF);
        for (position, folder) in folders.iter().enumerate() {
            index_map.insert(folder.entry_index, position as u16);
        }
        for folder in &mut folders {
            folder.path_indicator = *index_map.get(&folder.path_indicator).unwrap_or(&0xFFFF);
        }
        for file in &mut files {
            file.path_indicator = *index_map.get(&file.path_indicator).unwrap_or(&0xFFFF);
        }

        let total = folders.len() + files.len();
        let mut block = self.metadata.stfs_volume_descriptor.file_table_block_num;
        let mut table_address = self.geometry.block_to_address(block)?;
        let mut mode = AllocMode::Reusing;

        for (i, entry) in folders.iter().chain(files.iter()).enumerate() {
            if i > 0 && i % ENTRIES_PER_FILE_TABLE_BLOCK == 0 {
                block = self.advance_chain(block, &mut mode)?;
                table_address = self.geometry.block_to_address(block)?;
            }
            self.io
                .seek(table_address + ((i % ENTRIES_PER_FILE_TABLE_BLOCK) as u64) * FILE_ENTRY_SIZE);
            self.write_file_entry_at_cursor(entry)?;
        }

        // zero out the rest of the final table block
        let used = total % ENTRIES_PER_FILE_TABLE_BLOCK;
        if used > 0 || total == 0 {
            let padding = vec![0u8; (ENTRIES_PER_FILE_TABLE_BLOCK - used) * FILE_ENTRY_SIZE as usize];
            self.io
                .seek(table_address + (used as u64) * FILE_ENTRY_SIZE);
            self.io.write_bytes(&padding)?;
        }

        let mut table_block_count = (total / ENTRIES_PER_FILE_TABLE_BLOCK + 1) as u16;
        if total % ENTRIES_PER_FILE_TABLE_BLOCK == 0 && total != 0 {
            table_block_count -= 1;
        }
        self.metadata.stfs_volume_descriptor.file_table_block_count = table_block_count;
        self.metadata.write_volume_descriptor(&mut self.io)?;

        if self.top_level == Level::Zero {
            self.read_top_table()?;
        }
        self.read_file_listing()
    }

    /// Write one record at the current cursor position.
    fn write_file_entry_at_cursor(&mut self, entry: &StfsFileEntry) -> Result<()> {
        if entry.name.len() > MAX_NAME_LEN {
            return Err(StfsError::NameTooLong(entry.name.clone()));
        }
        self.io.set_endian(Endian::Big);
        self.io.write_fixed_string(&entry.name, MAX_NAME_LEN)?;
        self.io
            .write_u8((entry.name.len() as u8 & 0x3F) | (entry.flags << 6))?;
        // the block count is stored twice
        self.io
            .write_u24_as(entry.blocks_for_file, Endian::Little)?;
        self.io
            .write_u24_as(entry.blocks_for_file, Endian::Little)?;
        self.io
            .write_u24_as(entry.starting_block_num, Endian::Little)?;
        self.io.write_u16(entry.path_indicator)?;
        self.io.write_u32(entry.file_size)?;
        self.io.write_u32(entry.created_time_stamp)?;
        self.io.write_u32(entry.access_time_stamp)?;
        Ok(())
    }

    fn hash_data_block(&mut self, block_num: u32) -> Result<[u8; 0x14]> {
        let address = self.geometry.block_to_address(block_num)?;
        self.io.seek(address);
        let data = self.io.read_bytes(BLOCK_SIZE)?;
        Ok(sha1_digest(&data))
    }

    /// Recompute every digest in the hash tree bottom-up, then the header
    /// hash over the metadata region.
    pub fn rehash(&mut self) -> Result<()> {
        let allocated = self.metadata.stfs_volume_descriptor.allocated_block_count;

        match self.top_level {
            Level::Zero => {
                for i in 0..self.top_table.entry_count {
                    let digest = self.hash_data_block(i)?;
                    self.top_table.entries[i as usize].block_hash = digest;
                }
            }
            Level::One => {
                for i in 0..self.top_table.entry_count {
                    let mut level0 = self.level_n_hash_table(i, Level::Zero)?;
                    for x in 0..level0.entry_count {
                        let digest = self.hash_data_block(i * 0xAA + x)?;
                        level0.entries[x as usize].block_hash = digest;
                    }
                    let image = level0.build_image();
                    self.io.seek(level0.address);
                    self.io.write_bytes(&image)?;
                    self.top_table.entries[i as usize].block_hash = sha1_digest(&image);
                }
            }
            Level::Two => {
                for i in 0..self.top_table.entry_count {
                    let mut level1 = self.level_n_hash_table(i, Level::One)?;
                    let mut blocks_hashed = 0u32;
                    for x in 0..level1.entry_count {
                        let mut level0 = self.level_n_hash_table(i * 0xAA + x, Level::Zero)?;
                        for y in 0..level0.entry_count {
                            let digest = self.hash_data_block(i * 0x70E4 + x * 0xAA + y)?;
                            level0.entries[y as usize].block_hash = digest;
                        }
                        blocks_hashed += level0.entry_count;
                        let image = level0.build_image();
                        self.io.seek(level0.address);
                        self.io.write_bytes(&image)?;
                        level1.entries[x as usize].block_hash = sha1_digest(&image);
                    }
                    let mut image = level1.build_image();
                    image[0xFF0..0xFF4].copy_from_slice(&blocks_hashed.to_le_bytes());
                    self.io.seek(level1.address);
                    self.io.write_bytes(&image)?;
                    self.top_table.entries[i as usize].block_hash = sha1_digest(&image);
                }
            }
        }

        let mut image = self.top_table.build_image();
        if self.top_level != Level::Zero {
            // upper level tables carry the covered block count
            image[0xFF0..0xFF4].copy_from_slice(&allocated.to_le_bytes());
        }
        self.metadata.stfs_volume_descriptor.top_hash_table_hash = sha1_digest(&image);
        self.io.seek(self.top_table.address);
        self.io.write_bytes(&image)?;
        self.metadata.write_volume_descriptor(&mut self.io)?;

        self.metadata.header_hash = self.compute_header_hash()?;
        self.metadata.write_metadata(&mut self.io)?;

        debug!(allocated, content_id = %self.metadata.content_id(), "rehashed");
        Ok(())
    }

    /// Digest of the metadata region between the hashed-region start and
    /// the first hash table.
    fn compute_header_hash(&mut self) -> Result<[u8; 0x14]> {
        let start = self.metadata.hashed_region_start();
        let length = (self.geometry.first_hash_table_address - start) as usize;
        self.io.seek(start);
        let region = self.io.read_bytes(length)?;
        Ok(sha1_digest(&region))
    }

    /// Recompute the header hash and re-sign it through `signer`.
    pub fn resign(&mut self, signer: &dyn HeaderSigner) -> Result<()> {
        let digest = self.compute_header_hash()?;
        self.metadata.resign(&mut self.io, digest, signer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len)
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
            .collect()
    }

    #[test]
    fn test_create_parses_empty() {
        let package = StfsPackage::create(0).unwrap();
        assert_eq!(package.sex(), Sex::Male);
        assert_eq!(package.volume_descriptor().allocated_block_count, 1);
        assert_eq!(package.volume_descriptor().file_table_block_count, 1);
        assert!(!package.file_exists("anything"));
        assert_eq!(package.listing.entry_count(), 0);
    }

    #[test]
    fn test_inject_and_extract() {
        let mut package = StfsPackage::create(0).unwrap();
        let data = pattern(0x1800, 7);
        let entry = package.inject_file(&data, "save.dat", None).unwrap();
        assert_eq!(entry.file_size, 0x1800);
        assert_eq!(entry.blocks_for_file, 2);
        assert!(entry.has_consecutive_blocks());
        assert!(package.file_exists("save.dat"));

        let back = package.extract_file("save.dat", None).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_inject_block_boundary_sizes() {
        let mut package = StfsPackage::create(0).unwrap();
        for (i, size) in [1usize, 0xFFF, 0x1000, 0x1001].iter().enumerate() {
            let name = format!("file{i}.bin");
            let data = pattern(*size, i as u8);
            package.inject_file(&data, &name, None).unwrap();
            assert_eq!(package.extract_file(&name, None).unwrap(), data);
        }
        // earlier files stay intact
        assert_eq!(
            package.extract_file("file0.bin", None).unwrap(),
            pattern(1, 0)
        );
    }

    #[test]
    fn test_inject_empty_file() {
        let mut package = StfsPackage::create(0).unwrap();
        let entry = package.inject_file(&[], "empty.bin", None).unwrap();
        assert_eq!(entry.file_size, 0);
        assert_eq!(entry.starting_block_num, BLOCK_CHAIN_END);
        assert_eq!(package.extract_file("empty.bin", None).unwrap(), vec![]);
    }

    #[test]
    fn test_inject_rejects_duplicates_and_long_names() {
        let mut package = StfsPackage::create(0).unwrap();
        package.inject_file(b"x", "a.bin", None).unwrap();
        assert!(matches!(
            package.inject_file(b"y", "a.bin", None),
            Err(StfsError::AlreadyExists(_))
        ));
        let long = "n".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(
            package.inject_file(b"y", &long, None),
            Err(StfsError::NameTooLong(_))
        ));
        assert!(matches!(
            package.inject_file(b"y", "Missing\\a.bin", None),
            Err(StfsError::FolderNotFound(_))
        ));
    }

    #[test]
    fn test_folders() {
        let mut package = StfsPackage::create(0).unwrap();
        package.create_folder("Saves").unwrap();
        package.create_folder("Saves\\Career").unwrap();
        let data = pattern(0x500, 3);
        package
            .inject_file(&data, "Saves\\Career\\slot0.sav", None)
            .unwrap();

        assert!(package.file_exists("Saves\\Career\\slot0.sav"));
        assert!(!package.file_exists("Saves\\slot0.sav"));
        assert_eq!(
            package
                .extract_file("Saves\\Career\\slot0.sav", None)
                .unwrap(),
            data
        );

        // folder records survive a listing round trip
        let listing = package.file_listing(true).unwrap();
        let career = listing.find_folder(&["Saves", "Career"]).unwrap();
        assert_eq!(career.file_entries.len(), 1);
        assert!(career.folder.is_directory());

        assert!(matches!(
            package.create_folder("Saves"),
            Err(StfsError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_rename() {
        let mut package = StfsPackage::create(0).unwrap();
        let data = pattern(0x123, 1);
        package.inject_file(&data, "old.bin", None).unwrap();
        package.rename_file("new.bin", "old.bin").unwrap();
        package.file_listing(true).unwrap();

        assert!(!package.file_exists("old.bin"));
        assert_eq!(package.extract_file("new.bin", None).unwrap(), data);
    }

    #[test]
    fn test_replace_grow_and_shrink() {
        let mut package = StfsPackage::create(0).unwrap();
        package
            .inject_file(&pattern(0x1800, 1), "a.bin", None)
            .unwrap();

        let bigger = pattern(0x3456, 2);
        let entry = package.replace_file(&bigger, "a.bin", None).unwrap();
        assert_eq!(entry.file_size, 0x3456);
        assert!(!entry.has_consecutive_blocks());
        assert_eq!(package.extract_file("a.bin", None).unwrap(), bigger);

        let smaller = pattern(0x10, 3);
        package.replace_file(&smaller, "a.bin", None).unwrap();
        assert_eq!(package.extract_file("a.bin", None).unwrap(), smaller);
    }

    #[test]
    fn test_replace_empty_file() {
        let mut package = StfsPackage::create(0).unwrap();
        package.inject_file(&[], "empty.bin", None).unwrap();
        let data = pattern(0x800, 9);
        package.replace_file(&data, "empty.bin", None).unwrap();
        assert_eq!(package.extract_file("empty.bin", None).unwrap(), data);
    }

    #[test]
    fn test_delete() {
        let mut package = StfsPackage::create(0).unwrap();
        package.inject_file(&pattern(0x100, 1), "a.bin", None).unwrap();
        package.inject_file(&pattern(0x200, 2), "b.bin", None).unwrap();
        package.delete_file("a.bin").unwrap();

        assert!(!package.file_exists("a.bin"));
        assert_eq!(
            package.extract_file("b.bin", None).unwrap(),
            pattern(0x200, 2)
        );
        assert!(matches!(
            package.delete_file("a.bin"),
            Err(StfsError::PathNotFound(_))
        ));
    }

    #[test]
    fn test_rehash_is_idempotent_and_hashes_data() {
        let mut package = StfsPackage::create(0).unwrap();
        let data = pattern(0x1800, 5);
        package.inject_file(&data, "a.bin", None).unwrap();

        package.rehash().unwrap();
        let top_hash = package.volume_descriptor().top_hash_table_hash;
        let header_hash = package.metadata.header_hash;

        // the first data block's digest is the plain sha1 of its contents
        let mut block = data[..0x1000].to_vec();
        block.resize(0x1000, 0);
        assert_eq!(package.top_table.entries[1].block_hash, sha1_digest(&block));

        package.rehash().unwrap();
        assert_eq!(package.volume_descriptor().top_hash_table_hash, top_hash);
        assert_eq!(package.metadata.header_hash, header_hash);
        assert_eq!(package.metadata.content_id(), hex::encode_upper(header_hash));
    }

    #[test]
    fn test_file_magic() {
        let mut package = StfsPackage::create(0).unwrap();
        package
            .inject_file(&[0x50, 0x4B, 0x03, 0x04, 0xAA], "archive.zip", None)
            .unwrap();
        package.inject_file(&[1, 2], "tiny.bin", None).unwrap();

        assert_eq!(package.file_magic("archive.zip").unwrap(), 0x504B0304);
        assert_eq!(package.file_magic("tiny.bin").unwrap(), 0);
        assert!(matches!(
            package.file_magic("missing.bin"),
            Err(StfsError::PathNotFound(_))
        ));
    }

    #[test]
    fn test_female_package() {
        let mut package = StfsPackage::create(package_flags::FEMALE).unwrap();
        assert_eq!(package.sex(), Sex::Female);

        let data = pattern(0x2345, 8);
        package.inject_file(&data, "a.bin", None).unwrap();
        package.rehash().unwrap();
        assert_eq!(package.extract_file("a.bin", None).unwrap(), data);

        let reopened = StfsPackage::from_bytes(package.into_bytes(), 0).unwrap();
        assert_eq!(reopened.sex(), Sex::Female);
    }

    #[test]
    fn test_pec_package() {
        let mut package = StfsPackage::create(package_flags::PEC).unwrap();
        assert!(package.is_pec());
        assert_eq!(package.metadata.header_size, PEC_HEADER_SIZE);

        let data = pattern(0x900, 4);
        package.inject_file(&data, "account", None).unwrap();
        package.rehash().unwrap();
        assert_eq!(package.extract_file("account", None).unwrap(), data);

        let mut reopened =
            StfsPackage::from_bytes(package.into_bytes(), package_flags::PEC).unwrap();
        assert_eq!(reopened.extract_file("account", None).unwrap(), data);
        assert_eq!(reopened.metadata.hashed_region_start(), 0x23C);
    }

    #[test]
    fn test_reopen_round_trip() {
        let mut package = StfsPackage::create(0).unwrap();
        let data = pattern(0x4242, 6);
        package.inject_file(&data, "a.bin", None).unwrap();
        package.rehash().unwrap();

        let mut reopened = StfsPackage::from_bytes(package.into_bytes(), 0).unwrap();
        assert!(reopened.file_exists("a.bin"));
        assert_eq!(reopened.extract_file("a.bin", None).unwrap(), data);
    }

    #[test]
    fn test_progress_reaches_completion() {
        let mut package = StfsPackage::create(0).unwrap();
        let data = pattern(0x3000, 2);

        let mut last = 0u32;
        {
            let mut callback = |p: u32| last = p;
            package
                .inject_file(&data, "a.bin", Some(&mut callback))
                .unwrap();
        }
        assert_eq!(last, 100);

        let mut seen = Vec::new();
        {
            let mut callback = |p: u32| seen.push(p);
            package.extract_file("a.bin", Some(&mut callback)).unwrap();
        }
        assert_eq!(seen.last(), Some(&100));
    }
}
