//! STFS (Secure Transacted File System) package reader and writer.
//!
//! STFS is the container format Xbox 360 consoles use for saved games,
//! profiles, downloadable content and other signed packages (the `CON `,
//! `LIVE` and `PIRS` files). A package is a content header followed by
//! 4KB data blocks interleaved with a multi-level SHA-1 hash tree that
//! both chains the blocks into files and attests their contents.
//!
//! ## Features
//!
//! - **Full header codec** for CON/LIVE/PIRS and PEC packages, including
//!   certificates, license tables and the avatar/video trailers
//! - **Block addressing arithmetic** for both hash tree shapes (with and
//!   without backup tables)
//! - **File table parsing** into a directory tree, plus injection,
//!   replacement, renaming and deletion of entries
//! - **Block allocation** that grows the buffer and promotes the hash
//!   tree as packages cross the 0xAA and 0x70E4 block boundaries
//! - **Rehashing** of the whole tree and the header digest
//!
//! ## Modules
//!
//! - [`error`] - Error type for all package operations
//! - [`io`] - Endian-aware cursor over the package buffer
//! - [`constants`] - Format constants and small enums
//! - [`descriptor`] - Volume descriptors, certificate and license slots
//! - [`header`] - Content header codec
//! - [`hashtree`] - Hash entries, tables and addressing arithmetic
//! - [`listing`] - File table records and the directory tree
//! - [`package`] - The package engine
//!
//! ## Example
//!
//! ```rust,no_run
//! use stfs::{StfsPackage, Result};
//!
//! fn main() -> Result<()> {
//!     let mut package = StfsPackage::open("savegame.con", 0)?;
//!     println!("{}", package.metadata.display_name);
//!
//!     let save = package.extract_file("Save\\slot0.sav", None)?;
//!     package.inject_file(&save, "Save\\slot1.sav", None)?;
//!     package.rehash()?;
//!     package.save_to("savegame.con")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ Content header                              │
//! │  - Magic: CON /LIVE/PIRS                    │
//! │  - Certificate or package signature         │
//! │  - Licenses, metadata, volume descriptor    │
//! ├─────────────────────────────────────────────┤
//! │ Hash tables + data blocks (4KB each)        │
//! │  - One level-0 table per 0xAA data blocks   │
//! │  - Level-1 / level-2 tables as needed       │
//! │  - File table blocks chained like any file  │
//! └─────────────────────────────────────────────┘
//! ```

pub mod constants;
pub mod descriptor;
pub mod error;
pub mod hashtree;
pub mod header;
pub mod io;
pub mod listing;
pub mod package;

// Re-export commonly used types
pub use constants::{
    ConsoleType, ContentType, FileSystem, Level, LicenseType, Magic, Sex, BLOCK_SIZE,
};
pub use descriptor::{Certificate, LicenseEntry, StfsVolumeDescriptor};
pub use error::{Result, StfsError};
pub use header::{ContentHeader, HeaderSigner};
pub use hashtree::{HashEntry, HashTable, TreeGeometry};
pub use io::{ByteCursor, Endian};
pub use listing::{StfsFileEntry, StfsFileListing};
pub use package::{package_flags, ProgressFn, StfsPackage};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
