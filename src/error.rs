use thiserror::Error;

#[derive(Error, Debug)]
pub enum StfsError {
    #[error("Invalid signature magic: 0x{0:08X} (expected CON, LIVE or PIRS)")]
    InvalidSignatureType(u32),

    #[error("Invalid license type 0x{license_type:04X} in slot {slot}")]
    InvalidLicenseType { license_type: u16, slot: usize },

    #[error("Invalid console type: {0} (expected DevKit or Retail)")]
    InvalidConsoleType(u32),

    #[error("Unsupported file system: {0}")]
    UnsupportedFileSystem(u32),

    #[error("Package is not STFS (file system {0:?})")]
    NotStfs(u32),

    #[error("Invalid avatar skeleton version: {0}")]
    InvalidSkeletonVersion(u8),

    #[error("Invalid allocated block count: {0}")]
    InvalidAllocationCount(u32),

    #[error("Invalid block number: 0x{0:X}")]
    InvalidBlockNumber(u32),

    #[error("Invalid hash tree level: {0}")]
    InvalidLevel(u8),

    #[error("File name too long: {0:?} (limit is 0x28 bytes)")]
    NameTooLong(String),

    #[error("Path not found in package: {0}")]
    PathNotFound(String),

    #[error("Folder not found in package: {0}")]
    FolderNotFound(String),

    #[error("Entry already exists in package: {0}")]
    AlreadyExists(String),

    #[error("Invalid multi-byte read size: {0}")]
    MultiByteSize(usize),

    #[error("Unexpected end of buffer at offset 0x{offset:X} (wanted {wanted} bytes)")]
    UnexpectedEof { offset: usize, wanted: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StfsError>;
