//! Format constants, magic values and small enums.

use crate::error::{Result, StfsError};

/// Every block, hash table page and file table page is 4KB.
pub const BLOCK_SIZE: usize = 0x1000;

/// Size of one hash table entry (0x14 digest + status + next block).
pub const HASH_ENTRY_SIZE: u64 = 0x18;

/// Size of one file table record.
pub const FILE_ENTRY_SIZE: u64 = 0x40;

/// File table records per 4KB block.
pub const ENTRIES_PER_FILE_TABLE_BLOCK: usize = 0x40;

/// Longest allowed entry name, in bytes.
pub const MAX_NAME_LEN: usize = 0x28;

/// 24-bit all-ones pattern marking the end of a block chain.
pub const BLOCK_CHAIN_END: u32 = 0xFF_FFFF;

/// Data blocks covered by one hash table at each tree level.
pub const DATA_BLOCKS_PER_HASH_LEVEL: [u32; 3] = [0xAA, 0x70E4, 0x4A_F768];

/// Package signature magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Magic {
    /// Console-signed (certificate + console signature).
    Con = 0x434F_4E20,
    /// Microsoft strong-signed.
    Live = 0x4C49_5645,
    /// Microsoft strong-signed (system content).
    Pirs = 0x5049_5253,
}

impl Magic {
    pub fn from_u32(v: u32) -> Result<Magic> {
        match v {
            0x434F_4E20 => Ok(Magic::Con),
            0x4C49_5645 => Ok(Magic::Live),
            0x5049_5253 => Ok(Magic::Pirs),
            other => Err(StfsError::InvalidSignatureType(other)),
        }
    }
}

/// Hash tree shape. Male packages keep a backup copy of every hash table,
/// doubling the pages each table occupies; female packages store one copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Female = 0,
    Male = 1,
}

impl Sex {
    /// Derived from the descriptor's block separation byte.
    pub fn from_block_separation(block_separation: u8) -> Sex {
        if (!block_separation) & 1 == 1 {
            Sex::Male
        } else {
            Sex::Female
        }
    }

    /// Shift amount used throughout the addressing arithmetic:
    /// table spans are `1 << shift` blocks.
    pub fn shift(self) -> u32 {
        self as u32
    }
}

/// Hash tree level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Zero = 0,
    One = 1,
    Two = 2,
}

impl Level {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Console type carried in the signing certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleType {
    DevKit = 1,
    Retail = 2,
}

impl ConsoleType {
    pub fn from_u32(v: u32) -> Result<ConsoleType> {
        match v {
            1 => Ok(ConsoleType::DevKit),
            2 => Ok(ConsoleType::Retail),
            other => Err(StfsError::InvalidConsoleType(other)),
        }
    }
}

/// Extra certificate console flags packed above the console type.
pub mod console_type_flags {
    pub const TEST_KIT: u32 = 0x4000_0000;
    pub const RECOVERY_GENERATED: u32 = 0x8000_0000;
}

/// File system carried by the package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSystem {
    Stfs = 0,
    Svod = 1,
}

impl FileSystem {
    pub fn from_u32(v: u32) -> Result<FileSystem> {
        match v {
            0 => Ok(FileSystem::Stfs),
            1 => Ok(FileSystem::Svod),
            other => Err(StfsError::UnsupportedFileSystem(other)),
        }
    }
}

/// Status byte of a level-zero hash entry.
pub mod block_status {
    pub const UNALLOCATED: u8 = 0;
    pub const PREVIOUSLY_ALLOCATED: u8 = 0x40;
    pub const ALLOCATED: u8 = 0x80;
    pub const NEWLY_ALLOCATED: u8 = 0xC0;
}

/// License slot types accepted in the header's license table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseType {
    Unused = 0x0000,
    Unrestricted = 0xFFFF,
    ConsoleProfileLicense = 0x0009,
    WindowsProfileLicense = 0x0003,
    ConsoleLicense = 0xF000,
    MediaFlags = 0xE000,
    KeyVaultPrivileges = 0xD000,
    HyperVisorFlags = 0xC000,
    UserPrivileges = 0xB000,
}

impl LicenseType {
    pub fn from_u16(v: u16) -> Option<LicenseType> {
        match v {
            0x0000 => Some(LicenseType::Unused),
            0xFFFF => Some(LicenseType::Unrestricted),
            0x0009 => Some(LicenseType::ConsoleProfileLicense),
            0x0003 => Some(LicenseType::WindowsProfileLicense),
            0xF000 => Some(LicenseType::ConsoleLicense),
            0xE000 => Some(LicenseType::MediaFlags),
            0xD000 => Some(LicenseType::KeyVaultPrivileges),
            0xC000 => Some(LicenseType::HyperVisorFlags),
            0xB000 => Some(LicenseType::UserPrivileges),
            _ => None,
        }
    }
}

/// Content category stamped in the header. The raw value is preserved on
/// write; the enum is used for trailer dispatch and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    ArcadeGame = 0xD0000,
    AvatarAssetPack = 0x8000,
    AvatarItem = 0x9000,
    CacheFile = 0x40000,
    CommunityGame = 0x200_0000,
    GameDemo = 0x80000,
    GameOnDemand = 0x7000,
    GamerPicture = 0x20000,
    GamerTitle = 0xA0000,
    GameTrailer = 0xC0000,
    GameVideo = 0x40_0000,
    InstalledGame = 0x4000,
    Installer = 0xB0000,
    IptvPauseBuffer = 0x2000,
    LicenseStore = 0xF0000,
    MarketPlaceContent = 2,
    Movie = 0x10_0000,
    MusicVideo = 0x30_0000,
    PodcastVideo = 0x50_0000,
    Profile = 0x10000,
    Publisher = 3,
    SavedGame = 1,
    StorageDownload = 0x50000,
    Theme = 0x30000,
    Video = 0x20_0000,
    ViralVideo = 0x60_0000,
    XboxDownload = 0x70000,
    XboxOriginalGame = 0x5000,
    XboxSavedGame = 0x60000,
    Xbox360Title = 0x1000,
    Xna = 0xE0000,
}

impl ContentType {
    pub fn from_u32(v: u32) -> Option<ContentType> {
        Some(match v {
            0xD0000 => ContentType::ArcadeGame,
            0x8000 => ContentType::AvatarAssetPack,
            0x9000 => ContentType::AvatarItem,
            0x40000 => ContentType::CacheFile,
            0x200_0000 => ContentType::CommunityGame,
            0x80000 => ContentType::GameDemo,
            0x7000 => ContentType::GameOnDemand,
            0x20000 => ContentType::GamerPicture,
            0xA0000 => ContentType::GamerTitle,
            0xC0000 => ContentType::GameTrailer,
            0x40_0000 => ContentType::GameVideo,
            0x4000 => ContentType::InstalledGame,
            0xB0000 => ContentType::Installer,
            0x2000 => ContentType::IptvPauseBuffer,
            0xF0000 => ContentType::LicenseStore,
            2 => ContentType::MarketPlaceContent,
            0x10_0000 => ContentType::Movie,
            0x30_0000 => ContentType::MusicVideo,
            0x50_0000 => ContentType::PodcastVideo,
            0x10000 => ContentType::Profile,
            3 => ContentType::Publisher,
            1 => ContentType::SavedGame,
            0x50000 => ContentType::StorageDownload,
            0x30000 => ContentType::Theme,
            0x20_0000 => ContentType::Video,
            0x60_0000 => ContentType::ViralVideo,
            0x70000 => ContentType::XboxDownload,
            0x5000 => ContentType::XboxOriginalGame,
            0x60000 => ContentType::XboxSavedGame,
            0x1000 => ContentType::Xbox360Title,
            0xE0000 => ContentType::Xna,
            _ => return None,
        })
    }
}
