//! Hash tree entries, tables and the block addressing arithmetic.
//!
//! Data blocks are numbered 0..allocated and interleave on disk with the
//! hash tables that cover them: one level-0 table per 0xAA data blocks,
//! one level-1 table per 0x70E4, one level-2 table per 0x4AF768. Male
//! packages store each table twice (primary + backup), so every table
//! span and skip doubles via `1 << sex`. All of the arithmetic here is
//! pure; the table reads and writes live in the package engine.

use crate::constants::{Level, Sex, BLOCK_CHAIN_END, DATA_BLOCKS_PER_HASH_LEVEL, HASH_ENTRY_SIZE};
use crate::error::{Result, StfsError};
use crate::io::{ByteCursor, Endian};

/// One 0x18-byte hash table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashEntry {
    pub block_hash: [u8; 0x14],
    pub status: u8,
    pub next_block: u32,
}

impl Default for HashEntry {
    fn default() -> Self {
        HashEntry {
            block_hash: [0u8; 0x14],
            status: 0,
            next_block: 0,
        }
    }
}

impl HashEntry {
    pub fn read(io: &mut ByteCursor) -> Result<Self> {
        let mut block_hash = [0u8; 0x14];
        io.read_exact(&mut block_hash)?;
        let status = io.read_u8()?;
        let next_block = io.read_u24_as(Endian::Big)?;
        Ok(HashEntry {
            block_hash,
            status,
            next_block,
        })
    }

    pub fn is_allocated(&self) -> bool {
        self.status & 0x80 != 0
    }

    /// Bit 0x40 selects which copy of the child table is current on male
    /// packages (it doubles as the previously-allocated status bit on
    /// level zero).
    pub fn uses_backup_table(&self) -> bool {
        self.status & 0x40 != 0
    }

    pub fn terminates_chain(&self) -> bool {
        self.next_block == BLOCK_CHAIN_END
    }
}

/// An in-memory hash table: up to 0xAA entries backing one 4KB page.
#[derive(Debug, Clone)]
pub struct HashTable {
    pub level: Level,
    /// Backing block number of the table page (not a data block number).
    pub true_block_number: u32,
    pub entry_count: u32,
    pub entries: Vec<HashEntry>,
    /// Absolute byte address of the current copy of this table.
    pub address: u64,
}

impl HashTable {
    /// Serialize the table to the 4KB page image that gets hashed and
    /// written back. Entry layout is digest, status, 24-bit next block.
    pub fn build_image(&self) -> [u8; 0x1000] {
        let mut image = [0u8; 0x1000];
        for (i, entry) in self.entries.iter().enumerate().take(0xAA) {
            let off = i * HASH_ENTRY_SIZE as usize;
            image[off..off + 0x14].copy_from_slice(&entry.block_hash);
            image[off + 0x14] = entry.status;
            image[off + 0x15] = (entry.next_block >> 16) as u8;
            image[off + 0x16] = (entry.next_block >> 8) as u8;
            image[off + 0x17] = entry.next_block as u8;
        }
        image
    }
}

/// Pure block addressing arithmetic for one package.
#[derive(Debug, Clone, Copy)]
pub struct TreeGeometry {
    pub sex: Sex,
    /// Backing-block strides: distance to the next level-0 table and the
    /// next level-1 table.
    pub block_step: [u32; 2],
    /// Backing block number of the (single) level-2 table. The first
    /// level-1 table sits immediately after it, which pins it at the
    /// level-1 stride.
    pub level2_block: u32,
    /// Byte offset of the first hash table: header size rounded up to a
    /// 4KB boundary.
    pub first_hash_table_address: u64,
}

impl TreeGeometry {
    pub fn new(sex: Sex, header_size: u32) -> Self {
        let block_step = match sex {
            Sex::Female => [0xAB, 0x718F],
            Sex::Male => [0xAC, 0x723A],
        };
        let geometry = TreeGeometry {
            sex,
            block_step,
            level2_block: block_step[1],
            first_hash_table_address: ((header_size as u64) + 0xFFF) & 0xF_FFFF_F000,
        };
        debug_assert_eq!(
            geometry.level1_backing_block(0x70E4),
            geometry.level2_block + (1 << sex.shift())
        );
        geometry
    }

    fn shift(&self) -> u32 {
        self.sex.shift()
    }

    /// Backing block number of the level-0 hash table covering `block_num`.
    pub fn level0_backing_block(&self, block_num: u32) -> u32 {
        if block_num < 0xAA {
            return 0;
        }
        let mut num = (block_num / 0xAA) * self.block_step[0];
        num += ((block_num / 0x70E4) + 1) << self.shift();
        if block_num / 0x70E4 == 0 {
            num
        } else {
            num + (1 << self.shift())
        }
    }

    /// Backing block number of the level-1 hash table covering `block_num`.
    pub fn level1_backing_block(&self, block_num: u32) -> u32 {
        if block_num < 0x70E4 {
            self.block_step[0]
        } else {
            (1 << self.shift()) + (block_num / 0x70E4) * self.block_step[1]
        }
    }

    pub fn backing_block_for_level(&self, block_num: u32, level: Level) -> u32 {
        match level {
            Level::Zero => self.level0_backing_block(block_num),
            Level::One => self.level1_backing_block(block_num),
            Level::Two => self.level2_block,
        }
    }

    /// Backing block number of data block `block_num`, accounting for all
    /// hash table pages interleaved before it.
    pub fn backing_data_block(&self, block_num: u32) -> u32 {
        let shift = self.shift();
        let mut num = (((block_num + 0xAA) / 0xAA) << shift) + block_num;
        if block_num >= 0xAA {
            num += ((block_num + 0x70E4) / 0x70E4) << shift;
            if block_num >= 0x70E4 {
                num += 1 << shift;
            }
        }
        num
    }

    /// Absolute byte address of data block `block_num`.
    pub fn block_to_address(&self, block_num: u32) -> Result<u64> {
        if block_num >= BLOCK_CHAIN_END {
            return Err(StfsError::InvalidBlockNumber(block_num));
        }
        Ok(((self.backing_data_block(block_num) as u64) << 12) + self.first_hash_table_address)
    }

    /// Base byte address (primary copy) of hash table `index` at `level`.
    pub fn base_hash_table_address(&self, index: u32, level: Level) -> u64 {
        let data_block = index * DATA_BLOCKS_PER_HASH_LEVEL[level.index()];
        ((self.backing_block_for_level(data_block, level) as u64) << 12)
            + self.first_hash_table_address
    }

    /// Bytes of hash table pages to skip when streaming data past the
    /// table that starts at `table_address`.
    pub fn hash_table_skip_size(&self, table_address: u64) -> u64 {
        let shift = self.shift();
        let true_block = ((table_address - self.first_hash_table_address) >> 12) as u32;

        // first table on disk is preceded by nothing but itself
        if true_block == 0 {
            return 0x1000 << shift;
        }
        // the level-2 table has the first level-1 table right behind it
        if true_block == self.block_step[1] {
            return 0x3000 << shift;
        }

        let mut adjusted = true_block;
        if adjusted > self.block_step[1] {
            adjusted -= self.block_step[1] + (1 << shift);
        }
        if adjusted == self.block_step[0] || adjusted % self.block_step[1] == 0 {
            0x2000 << shift
        } else {
            0x1000 << shift
        }
    }

    /// Number of hash tables per level for `allocated` data blocks.
    pub fn tables_per_level(allocated: u32) -> [u32; 3] {
        let mut tables = [0u32; 3];
        tables[0] = allocated / 0xAA + if allocated % 0xAA != 0 { 1 } else { 0 };
        tables[1] = tables[0] / 0xAA
            + if tables[0] % 0xAA != 0 && allocated > 0xAA {
                1
            } else {
                0
            };
        tables[2] = tables[1] / 0xAA
            + if tables[1] % 0xAA != 0 && allocated > 0x70E4 {
                1
            } else {
                0
            };
        tables
    }

    /// Highest hash tree level needed for `allocated` data blocks.
    pub fn top_level(allocated: u32) -> Result<Level> {
        if allocated <= 0xAA {
            Ok(Level::Zero)
        } else if allocated <= 0x70E4 {
            Ok(Level::One)
        } else if allocated <= 0x4A_F768 {
            Ok(Level::Two)
        } else {
            Err(StfsError::InvalidAllocationCount(allocated))
        }
    }

    /// Entries in the top hash table for `allocated` data blocks. Each top
    /// table entry covers one child table (or one data block at level zero).
    pub fn top_table_entry_count(allocated: u32) -> Result<u32> {
        let top = Self::top_level(allocated)?;
        let blocks_per_entry = [1u32, 0xAA, 0x70E4][top.index()];
        let mut count = allocated / blocks_per_entry;
        if allocated > 0x70E4 && allocated % 0x70E4 != 0 {
            count += 1;
        } else if allocated > 0xAA && allocated % 0xAA != 0 {
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn male() -> TreeGeometry {
        TreeGeometry::new(Sex::Male, 0xA000)
    }

    fn female() -> TreeGeometry {
        TreeGeometry::new(Sex::Female, 0xB000)
    }

    #[test]
    fn test_level0_backing_blocks() {
        let g = male();
        assert_eq!(g.level0_backing_block(0), 0);
        assert_eq!(g.level0_backing_block(0xA9), 0);
        assert_eq!(g.level0_backing_block(0xAA), 0xAC + 2);
        assert_eq!(g.level0_backing_block(0x154), 2 * 0xAC + 2);

        let g = female();
        assert_eq!(g.level0_backing_block(0xAA), 0xAB + 1);
        assert_eq!(g.level0_backing_block(0x154), 2 * 0xAB + 1);
    }

    #[test]
    fn test_level1_backing_blocks() {
        let g = male();
        assert_eq!(g.level1_backing_block(0), 0xAC);
        assert_eq!(g.level1_backing_block(0x70E3), 0xAC);
        assert_eq!(g.level1_backing_block(0x70E4), 0x723A + 2);

        let g = female();
        assert_eq!(g.level1_backing_block(0x70E4), 0x718F + 1);
    }

    #[test]
    fn test_level2_table_follows_first_level1_table() {
        // the level-1 table covering the second group sits one table span
        // after the level-2 table
        for g in [male(), female()] {
            assert_eq!(
                g.level1_backing_block(0x70E4),
                g.level2_block + (1 << g.sex.shift())
            );
        }
    }

    #[test]
    fn test_backing_data_blocks() {
        let g = male();
        // first group: two level-0 table pages precede the data
        assert_eq!(g.backing_data_block(0), 2);
        assert_eq!(g.backing_data_block(1), 3);
        assert_eq!(g.backing_data_block(0xA9), 0xAB);
        // crossing into the second group adds the level-1 table and the
        // next level-0 table
        assert_eq!(g.backing_data_block(0xAA), 0xAA + 2 + 2 + 2);

        let g = female();
        assert_eq!(g.backing_data_block(0), 1);
        assert_eq!(g.backing_data_block(0xAA), 0xAA + 1 + 1 + 1);
    }

    #[test]
    fn test_block_to_address() {
        let g = male();
        assert_eq!(g.block_to_address(0).unwrap(), 0xA000 + 0x2000);
        assert_eq!(g.block_to_address(1).unwrap(), 0xA000 + 0x3000);
        assert!(matches!(
            g.block_to_address(0xFFFFFF),
            Err(StfsError::InvalidBlockNumber(0xFFFFFF))
        ));
    }

    #[test]
    fn test_hash_table_skip_sizes() {
        let g = male();
        let first = g.first_hash_table_address;
        // table 0
        assert_eq!(g.hash_table_skip_size(first), 0x2000);
        // level-1 table after the first group
        assert_eq!(
            g.hash_table_skip_size(first + ((0xAC as u64) << 12)),
            0x4000
        );

        let g = female();
        let first = g.first_hash_table_address;
        assert_eq!(g.hash_table_skip_size(first), 0x1000);
        assert_eq!(
            g.hash_table_skip_size(first + ((0xAB as u64) << 12)),
            0x2000
        );
    }

    #[test]
    fn test_tables_per_level() {
        assert_eq!(TreeGeometry::tables_per_level(1), [1, 0, 0]);
        assert_eq!(TreeGeometry::tables_per_level(0xAA), [1, 0, 0]);
        assert_eq!(TreeGeometry::tables_per_level(0xAB), [2, 1, 0]);
        assert_eq!(TreeGeometry::tables_per_level(0x70E4), [0xAA, 1, 0]);
        assert_eq!(TreeGeometry::tables_per_level(0x70E5), [0xAB, 2, 1]);
    }

    #[test]
    fn test_top_level_boundaries() {
        assert_eq!(TreeGeometry::top_level(1).unwrap(), Level::Zero);
        assert_eq!(TreeGeometry::top_level(0xAA).unwrap(), Level::Zero);
        assert_eq!(TreeGeometry::top_level(0xAB).unwrap(), Level::One);
        assert_eq!(TreeGeometry::top_level(0x70E4).unwrap(), Level::One);
        assert_eq!(TreeGeometry::top_level(0x70E5).unwrap(), Level::Two);
        assert_eq!(TreeGeometry::top_level(0x4AF768).unwrap(), Level::Two);
        assert!(matches!(
            TreeGeometry::top_level(0x4AF769),
            Err(StfsError::InvalidAllocationCount(_))
        ));
    }

    #[test]
    fn test_top_table_entry_count() {
        assert_eq!(TreeGeometry::top_table_entry_count(1).unwrap(), 1);
        assert_eq!(TreeGeometry::top_table_entry_count(0xAA).unwrap(), 0xAA);
        assert_eq!(TreeGeometry::top_table_entry_count(0xAB).unwrap(), 2);
        assert_eq!(TreeGeometry::top_table_entry_count(0x154).unwrap(), 2);
        assert_eq!(TreeGeometry::top_table_entry_count(0x155).unwrap(), 3);
    }

    #[test]
    fn test_hash_table_image_layout() {
        let mut table = HashTable {
            level: Level::Zero,
            true_block_number: 0,
            entry_count: 1,
            entries: vec![HashEntry {
                block_hash: [0x11; 0x14],
                status: 0x80,
                next_block: 0xABCDEF,
            }],
            address: 0,
        };
        table.entries.push(HashEntry::default());

        let image = table.build_image();
        assert_eq!(&image[..0x14], &[0x11; 0x14]);
        assert_eq!(image[0x14], 0x80);
        assert_eq!(&image[0x15..0x18], &[0xAB, 0xCD, 0xEF]);
        assert_eq!(&image[0x18..0x30], &[0u8; 0x18]);
    }

    proptest! {
        #[test]
        fn prop_block_addresses_strictly_increase(b in 0u32..0x80000) {
            for g in [male(), female()] {
                let a0 = g.block_to_address(b).unwrap();
                let a1 = g.block_to_address(b + 1).unwrap();
                prop_assert!(a1 > a0);
                prop_assert_eq!(a0 & 0xFFF, 0);
            }
        }

        #[test]
        fn prop_data_never_lands_on_a_hash_table(b in 0u32..0x80000) {
            for g in [male(), female()] {
                let backing = g.backing_data_block(b);
                let l0 = g.level0_backing_block(b);
                let span = 1u32 << g.sex.shift();
                prop_assert!(backing >= l0 + span);
            }
        }
    }
}
