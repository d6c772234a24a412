//! File table records and the in-memory directory tree.

use crate::constants::BLOCK_CHAIN_END;

/// Flag bits packed above the name length in a file table record.
pub mod entry_flags {
    /// The entry's blocks are laid out back to back on disk.
    pub const CONSECUTIVE_BLOCKS: u8 = 1;
    /// The entry is a directory.
    pub const FOLDER: u8 = 2;
}

/// One 0x40-byte file table record.
///
/// On disk the name length and the flags share a byte: the low six bits
/// hold the length, the top two bits hold `entry_flags`. Both halves are
/// unpacked at parse time and repacked on write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StfsFileEntry {
    /// Position of this record in the flattened file table.
    pub entry_index: u16,
    pub name: String,
    pub name_len: u8,
    pub flags: u8,
    pub blocks_for_file: u32,
    pub starting_block_num: u32,
    /// Entry index of the parent folder, 0xFFFF for the root.
    pub path_indicator: u16,
    pub file_size: u32,
    pub created_time_stamp: u32,
    pub access_time_stamp: u32,
    /// Absolute byte address of this record in the package.
    pub file_entry_address: u64,
}

impl Default for StfsFileEntry {
    fn default() -> Self {
        StfsFileEntry {
            entry_index: 0,
            name: String::new(),
            name_len: 0,
            flags: 0,
            blocks_for_file: 0,
            starting_block_num: BLOCK_CHAIN_END,
            path_indicator: 0xFFFF,
            file_size: 0,
            created_time_stamp: 0,
            access_time_stamp: 0,
            file_entry_address: 0,
        }
    }
}

impl StfsFileEntry {
    pub fn is_directory(&self) -> bool {
        self.flags & entry_flags::FOLDER != 0
    }

    pub fn has_consecutive_blocks(&self) -> bool {
        self.flags & entry_flags::CONSECUTIVE_BLOCKS != 0
    }

    /// Name length byte with the flag bits packed back on top.
    pub fn packed_name_len(&self) -> u8 {
        (self.name_len & 0x3F) | (self.flags << 6)
    }
}

/// A directory and its contents.
#[derive(Debug, Clone, Default)]
pub struct StfsFileListing {
    pub folder: StfsFileEntry,
    pub file_entries: Vec<StfsFileEntry>,
    pub folder_entries: Vec<StfsFileListing>,
}

impl StfsFileListing {
    /// The synthetic root directory. It has no record in the file table;
    /// entries at the top level carry its 0xFFFF index as their parent.
    pub fn root() -> Self {
        StfsFileListing {
            folder: StfsFileEntry {
                entry_index: 0xFFFF,
                name: "Root".into(),
                path_indicator: 0xFFFF,
                ..Default::default()
            },
            file_entries: Vec::new(),
            folder_entries: Vec::new(),
        }
    }

    /// Find the sub-listing for a folder path, `segments` being the path
    /// split on backslashes.
    pub fn find_folder(&self, segments: &[&str]) -> Option<&StfsFileListing> {
        let Some((first, rest)) = segments.split_first() else {
            return Some(self);
        };
        if first.is_empty() {
            return Some(self);
        }
        self.folder_entries
            .iter()
            .find(|f| f.folder.name == *first)
            .and_then(|f| f.find_folder(rest))
    }

    pub fn find_folder_mut(&mut self, segments: &[&str]) -> Option<&mut StfsFileListing> {
        let Some((first, rest)) = segments.split_first() else {
            return Some(self);
        };
        if first.is_empty() {
            return Some(self);
        }
        self.folder_entries
            .iter_mut()
            .find(|f| f.folder.name == *first)
            .and_then(|f| f.find_folder_mut(rest))
    }

    /// Find a file (or, with `check_folders`, a folder) entry by path.
    pub fn find_entry(&self, segments: &[&str], check_folders: bool) -> Option<&StfsFileEntry> {
        let (first, rest) = segments.split_first()?;
        if rest.is_empty() {
            if let Some(file) = self.file_entries.iter().find(|e| e.name == *first) {
                return Some(file);
            }
            if check_folders {
                return self
                    .folder_entries
                    .iter()
                    .find(|f| f.folder.name == *first)
                    .map(|f| &f.folder);
            }
            return None;
        }
        self.folder_entries
            .iter()
            .find(|f| f.folder.name == *first)
            .and_then(|f| f.find_entry(rest, check_folders))
    }

    pub fn find_entry_mut(
        &mut self,
        segments: &[&str],
        check_folders: bool,
    ) -> Option<&mut StfsFileEntry> {
        let (first, rest) = segments.split_first()?;
        if rest.is_empty() {
            if self.file_entries.iter().any(|e| e.name == *first) {
                return self.file_entries.iter_mut().find(|e| e.name == *first);
            }
            if check_folders {
                return self
                    .folder_entries
                    .iter_mut()
                    .find(|f| f.folder.name == *first)
                    .map(|f| &mut f.folder);
            }
            return None;
        }
        self.folder_entries
            .iter_mut()
            .find(|f| f.folder.name == *first)
            .and_then(|f| f.find_entry_mut(rest, check_folders))
    }

    /// Flatten into write order: all folders first (depth-first, parents
    /// before children), then all files.
    pub fn flatten(&self) -> (Vec<StfsFileEntry>, Vec<StfsFileEntry>) {
        let mut folders = Vec::new();
        let mut files = Vec::new();
        self.flatten_into(&mut folders, &mut files);
        (folders, files)
    }

    fn flatten_into(&self, folders: &mut Vec<StfsFileEntry>, files: &mut Vec<StfsFileEntry>) {
        folders.push(self.folder.clone());
        files.extend(self.file_entries.iter().cloned());
        for sub in &self.folder_entries {
            sub.flatten_into(folders, files);
        }
    }

    /// Total number of records the table must hold (the synthetic root is
    /// not written).
    pub fn entry_count(&self) -> usize {
        let (folders, files) = self.flatten();
        folders.len() - 1 + files.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> StfsFileListing {
        let mut root = StfsFileListing::root();
        root.file_entries.push(StfsFileEntry {
            entry_index: 0,
            name: "root.bin".into(),
            name_len: 8,
            ..Default::default()
        });

        let mut save = StfsFileListing::root();
        save.folder = StfsFileEntry {
            entry_index: 1,
            name: "Save".into(),
            name_len: 4,
            flags: entry_flags::FOLDER,
            path_indicator: 0xFFFF,
            ..Default::default()
        };
        save.file_entries.push(StfsFileEntry {
            entry_index: 2,
            name: "profile.dat".into(),
            name_len: 11,
            path_indicator: 1,
            ..Default::default()
        });
        root.folder_entries.push(save);
        root
    }

    #[test]
    fn test_packed_name_len() {
        let entry = StfsFileEntry {
            name_len: 11,
            flags: entry_flags::CONSECUTIVE_BLOCKS,
            ..Default::default()
        };
        assert_eq!(entry.packed_name_len(), 11 | 0x40);
        assert!(entry.has_consecutive_blocks());
        assert!(!entry.is_directory());

        let folder = StfsFileEntry {
            name_len: 4,
            flags: entry_flags::FOLDER,
            ..Default::default()
        };
        assert_eq!(folder.packed_name_len(), 4 | 0x80);
        assert!(folder.is_directory());
    }

    #[test]
    fn test_find_entry_by_path() {
        let tree = sample_tree();
        assert!(tree.find_entry(&["root.bin"], false).is_some());
        assert!(tree.find_entry(&["Save", "profile.dat"], false).is_some());
        assert!(tree.find_entry(&["Save", "missing.dat"], false).is_none());
        assert!(tree.find_entry(&["Save"], false).is_none());
        assert!(tree.find_entry(&["Save"], true).is_some());
    }

    #[test]
    fn test_find_folder() {
        let tree = sample_tree();
        assert!(tree.find_folder(&[]).is_some());
        assert_eq!(
            tree.find_folder(&["Save"]).unwrap().folder.entry_index,
            1
        );
        assert!(tree.find_folder(&["Other"]).is_none());
    }

    #[test]
    fn test_flatten_order_and_count() {
        let tree = sample_tree();
        let (folders, files) = tree.flatten();
        assert_eq!(folders[0].name, "Root");
        assert_eq!(folders[1].name, "Save");
        assert_eq!(files.len(), 2);
        assert_eq!(tree.entry_count(), 3);
    }
}
