//! Content header codec.
//!
//! The header occupies everything before the first hash table. Two
//! variants exist: the full CON/LIVE/PIRS header and the stripped PEC
//! (profile embedded content) header, which starts directly with the
//! certificate and keeps its volume descriptor at 0x244.

use crate::constants::{ContentType, FileSystem, Magic};
use crate::descriptor::{Certificate, LicenseEntry, StfsVolumeDescriptor, SvodVolumeDescriptor};
use crate::error::{Result, StfsError};
use crate::io::{ByteCursor, Endian};

// full header offsets
const LICENSES: u64 = 0x22C;
pub(crate) const VOLUME_DESCRIPTOR: u64 = 0x379;
const DATA_FILE_COUNT: u64 = 0x39D;
const TYPE_TRAILER: u64 = 0x3D9;
const DEVICE_ID: u64 = 0x3FD;
const DESCRIPTION: u64 = 0xD11;
const PUBLISHER: u64 = 0x1611;
const TITLE: u64 = 0x1691;
const TRANSFER_FLAG: u64 = 0x1711;
const TITLE_THUMBNAIL: u64 = 0x571A;

// PEC offsets
const PEC_HEADER_HASH: u64 = 0x1B8;
pub(crate) const PEC_VOLUME_DESCRIPTOR: u64 = 0x244;
const PEC_PROFILE_ID: u64 = 0x26C;
pub(crate) const PEC_HEADER_SIZE: u32 = 0x1000;

/// Supplies the RSA signature for a console-signed header. The engine
/// hands over the freshly computed header digest; implementations own the
/// private key material.
pub trait HeaderSigner {
    fn sign(&self, header_digest: &[u8; 0x14]) -> Result<Vec<u8>>;
}

/// Avatar item trailer at 0x3D9.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarAssetData {
    pub sub_category: u32,
    pub colorizable: u32,
    pub guid: [u8; 0x10],
    pub skeleton_version: u8,
}

/// Video trailer at 0x3D9.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoData {
    pub series_id: [u8; 0x10],
    pub season_id: [u8; 0x10],
    pub season_number: u16,
    pub episode_number: u16,
}

/// Parsed package header.
#[derive(Debug, Clone)]
pub struct ContentHeader {
    pub is_pec: bool,
    pub magic: Magic,
    /// Present for CON packages.
    pub certificate: Option<Certificate>,
    /// Present for LIVE/PIRS packages (0x100 bytes).
    pub package_signature: Option<Vec<u8>>,

    pub license_data: Vec<LicenseEntry>,
    /// SHA-1 of the header region, doubles as the content id.
    pub header_hash: [u8; 0x14],
    pub header_size: u32,
    /// Raw content type value; `content_type()` maps it to the enum.
    pub content_type: u32,
    pub meta_data_version: u32,
    pub content_size: u64,
    pub media_id: u32,
    pub version: u32,
    pub base_version: u32,
    pub title_id: u32,
    pub platform: u8,
    pub executable_type: u8,
    pub disc_number: u8,
    pub disc_in_set: u8,
    pub savegame_id: u32,
    pub console_id: [u8; 5],
    pub profile_id: [u8; 8],

    pub file_system: FileSystem,
    pub stfs_volume_descriptor: StfsVolumeDescriptor,
    pub svod_volume_descriptor: Option<SvodVolumeDescriptor>,

    pub data_file_count: u32,
    pub data_file_combined_size: u64,

    pub avatar_asset_data: Option<AvatarAssetData>,
    pub video_data: Option<VideoData>,

    pub device_id: [u8; 0x14],
    pub display_name: String,
    pub display_description: String,
    pub publisher_name: String,
    pub title_name: String,
    pub transfer_flag: u8,
    pub thumbnail_image: Vec<u8>,
    pub title_thumbnail_image: Vec<u8>,

    /// PEC only.
    pub enabled: bool,
}

impl ContentHeader {
    /// Parse a header from the start of `io`.
    pub fn read(io: &mut ByteCursor, is_pec: bool) -> Result<Self> {
        if is_pec {
            Self::read_pec(io)
        } else {
            Self::read_full(io)
        }
    }

    fn read_full(io: &mut ByteCursor) -> Result<Self> {
        io.seek(0);
        io.set_endian(Endian::Big);

        let magic = Magic::from_u32(io.read_u32()?)?;
        let mut certificate = None;
        let mut package_signature = None;
        match magic {
            Magic::Con => certificate = Some(Certificate::read_at(io, 4)?),
            Magic::Live | Magic::Pirs => {
                io.seek(4);
                package_signature = Some(io.read_bytes(0x100)?);
            }
        }

        io.seek(LICENSES);
        let mut license_data = Vec::with_capacity(0x10);
        for slot in 0..0x10 {
            license_data.push(LicenseEntry::read(io, slot)?);
        }

        // cursor is now at 0x32C
        let mut header_hash = [0u8; 0x14];
        io.read_exact(&mut header_hash)?;
        let header_size = io.read_u32()?;
        let content_type = io.read_u32()?;
        let meta_data_version = io.read_u32()?;
        let content_size = io.read_u64()?;
        let media_id = io.read_u32()?;
        let version = io.read_u32()?;
        let base_version = io.read_u32()?;
        let title_id = io.read_u32()?;
        let platform = io.read_u8()?;
        let executable_type = io.read_u8()?;
        let disc_number = io.read_u8()?;
        let disc_in_set = io.read_u8()?;
        let savegame_id = io.read_u32()?;
        let mut console_id = [0u8; 5];
        io.read_exact(&mut console_id)?;
        let mut profile_id = [0u8; 8];
        io.read_exact(&mut profile_id)?;

        io.seek(DATA_FILE_COUNT + 0xC);
        let file_system = FileSystem::from_u32(io.read_u32()?)?;

        let mut stfs_volume_descriptor = StfsVolumeDescriptor::default();
        let mut svod_volume_descriptor = None;
        match file_system {
            FileSystem::Stfs => {
                stfs_volume_descriptor = StfsVolumeDescriptor::read_at(io, VOLUME_DESCRIPTOR)?;
            }
            FileSystem::Svod => {
                svod_volume_descriptor =
                    Some(SvodVolumeDescriptor::read_at(io, VOLUME_DESCRIPTOR)?);
            }
        }

        io.seek(DATA_FILE_COUNT);
        io.set_endian(Endian::Big);
        let data_file_count = io.read_u32()?;
        let data_file_combined_size = io.read_u64()?;

        let mut avatar_asset_data = None;
        let mut video_data = None;
        match ContentType::from_u32(content_type) {
            Some(ContentType::AvatarItem) => {
                io.seek(TYPE_TRAILER);
                io.set_endian(Endian::Little);
                let sub_category = io.read_u32()?;
                let colorizable = io.read_u32()?;
                io.set_endian(Endian::Big);
                let mut guid = [0u8; 0x10];
                io.read_exact(&mut guid)?;
                let skeleton_version = io.read_u8()?;
                if !(1..=3).contains(&skeleton_version) {
                    return Err(StfsError::InvalidSkeletonVersion(skeleton_version));
                }
                avatar_asset_data = Some(AvatarAssetData {
                    sub_category,
                    colorizable,
                    guid,
                    skeleton_version,
                });
            }
            Some(ContentType::Video) => {
                io.seek(TYPE_TRAILER);
                let mut series_id = [0u8; 0x10];
                io.read_exact(&mut series_id)?;
                let mut season_id = [0u8; 0x10];
                io.read_exact(&mut season_id)?;
                let season_number = io.read_u16()?;
                let episode_number = io.read_u16()?;
                video_data = Some(VideoData {
                    series_id,
                    season_id,
                    season_number,
                    episode_number,
                });
            }
            _ => {}
        }

        io.seek(DEVICE_ID);
        io.set_endian(Endian::Big);
        let mut device_id = [0u8; 0x14];
        io.read_exact(&mut device_id)?;

        let display_name = io.read_fixed_utf16(0x80)?;
        io.seek(DESCRIPTION);
        let display_description = io.read_fixed_utf16(0x80)?;
        io.seek(PUBLISHER);
        let publisher_name = io.read_fixed_utf16(0x40)?;
        io.seek(TITLE);
        let title_name = io.read_fixed_utf16(0x40)?;

        io.seek(TRANSFER_FLAG);
        let transfer_flag = io.read_u8()?;
        let thumbnail_image_size = io.read_u32()? as usize;
        let title_thumbnail_image_size = io.read_u32()? as usize;

        let thumbnail_image = io.read_bytes(thumbnail_image_size)?;
        io.seek(TITLE_THUMBNAIL);
        let title_thumbnail_image = io.read_bytes(title_thumbnail_image_size)?;

        Ok(ContentHeader {
            is_pec: false,
            magic,
            certificate,
            package_signature,
            license_data,
            header_hash,
            header_size,
            content_type,
            meta_data_version,
            content_size,
            media_id,
            version,
            base_version,
            title_id,
            platform,
            executable_type,
            disc_number,
            disc_in_set,
            savegame_id,
            console_id,
            profile_id,
            file_system,
            stfs_volume_descriptor,
            svod_volume_descriptor,
            data_file_count,
            data_file_combined_size,
            avatar_asset_data,
            video_data,
            device_id,
            display_name,
            display_description,
            publisher_name,
            title_name,
            transfer_flag,
            thumbnail_image,
            title_thumbnail_image,
            enabled: false,
        })
    }

    fn read_pec(io: &mut ByteCursor) -> Result<Self> {
        let certificate = Certificate::read_at(io, 0)?;

        io.seek(PEC_HEADER_HASH);
        let mut header_hash = [0u8; 0x14];
        io.read_exact(&mut header_hash)?;

        let stfs_volume_descriptor =
            StfsVolumeDescriptor::read_at(io, PEC_VOLUME_DESCRIPTOR)?;

        io.seek(PEC_PROFILE_ID);
        let mut profile_id = [0u8; 8];
        io.read_exact(&mut profile_id)?;
        let enabled = io.read_u8()? >= 1;
        let mut console_id = [0u8; 5];
        io.read_exact(&mut console_id)?;

        Ok(ContentHeader {
            is_pec: true,
            magic: Magic::Con,
            certificate: Some(certificate),
            package_signature: None,
            license_data: Vec::new(),
            header_hash,
            header_size: PEC_HEADER_SIZE,
            content_type: 0,
            meta_data_version: 0,
            content_size: 0,
            media_id: 0,
            version: 0,
            base_version: 0,
            title_id: 0,
            platform: 0,
            executable_type: 0,
            disc_number: 0,
            disc_in_set: 0,
            savegame_id: 0,
            console_id,
            profile_id,
            file_system: FileSystem::Stfs,
            stfs_volume_descriptor,
            svod_volume_descriptor: None,
            data_file_count: 0,
            data_file_combined_size: 0,
            avatar_asset_data: None,
            video_data: None,
            device_id: [0u8; 0x14],
            display_name: String::new(),
            display_description: String::new(),
            publisher_name: String::new(),
            title_name: String::new(),
            transfer_flag: 0,
            thumbnail_image: Vec::new(),
            title_thumbnail_image: Vec::new(),
            enabled,
        })
    }

    /// Mapped content category, if the raw value is a known one.
    pub fn content_type(&self) -> Option<ContentType> {
        ContentType::from_u32(self.content_type)
    }

    /// Hex form of the header hash.
    pub fn content_id(&self) -> String {
        hex::encode_upper(self.header_hash)
    }

    /// Byte offset where the header hash digest starts covering.
    pub fn hashed_region_start(&self) -> u64 {
        if self.is_pec {
            0x23C
        } else {
            0x344
        }
    }

    /// Byte offset of the stored header hash.
    pub fn header_hash_address(&self) -> u64 {
        if self.is_pec {
            PEC_HEADER_HASH
        } else {
            0x32C
        }
    }

    /// Write just the volume descriptor back.
    pub fn write_volume_descriptor(&self, io: &mut ByteCursor) -> Result<()> {
        let address = if self.is_pec {
            PEC_VOLUME_DESCRIPTOR
        } else {
            VOLUME_DESCRIPTOR
        };
        match self.file_system {
            FileSystem::Stfs => self.stfs_volume_descriptor.write_at(io, address),
            FileSystem::Svod => match &self.svod_volume_descriptor {
                Some(desc) => desc.write_at(io, VOLUME_DESCRIPTOR),
                None => Ok(()),
            },
        }
    }

    /// Write the whole header back into `io`.
    pub fn write_metadata(&self, io: &mut ByteCursor) -> Result<()> {
        if self.is_pec {
            self.write_pec(io)
        } else {
            self.write_full(io)
        }
    }

    fn write_full(&self, io: &mut ByteCursor) -> Result<()> {
        io.seek(0);
        io.set_endian(Endian::Big);
        io.write_u32(self.magic as u32)?;

        match self.magic {
            Magic::Con => {
                if let Some(cert) = &self.certificate {
                    cert.write_at(io, 4)?;
                }
            }
            Magic::Live | Magic::Pirs => {
                if let Some(sig) = &self.package_signature {
                    io.seek(4);
                    io.write_bytes(sig)?;
                }
            }
        }

        io.seek(LICENSES);
        for license in &self.license_data {
            license.write(io)?;
        }

        io.seek(0x32C);
        io.set_endian(Endian::Big);
        io.write_bytes(&self.header_hash)?;
        io.write_u32(self.header_size)?;
        io.write_u32(self.content_type)?;
        io.write_u32(self.meta_data_version)?;
        io.write_u64(self.content_size)?;
        io.write_u32(self.media_id)?;
        io.write_u32(self.version)?;
        io.write_u32(self.base_version)?;
        io.write_u32(self.title_id)?;
        io.write_u8(self.platform)?;
        io.write_u8(self.executable_type)?;
        io.write_u8(self.disc_number)?;
        io.write_u8(self.disc_in_set)?;
        io.write_u32(self.savegame_id)?;
        io.write_bytes(&self.console_id)?;
        io.write_bytes(&self.profile_id)?;

        self.write_volume_descriptor(io)?;

        io.seek(DATA_FILE_COUNT);
        io.set_endian(Endian::Big);
        io.write_u32(self.data_file_count)?;
        io.write_u64(self.data_file_combined_size)?;
        io.write_u32(self.file_system as u32)?;

        match (&self.avatar_asset_data, &self.video_data) {
            (Some(avatar), _) => {
                io.seek(TYPE_TRAILER);
                io.set_endian(Endian::Little);
                io.write_u32(avatar.sub_category)?;
                io.write_u32(avatar.colorizable)?;
                io.set_endian(Endian::Big);
                io.write_bytes(&avatar.guid)?;
                io.write_u8(avatar.skeleton_version)?;
            }
            (_, Some(video)) => {
                io.seek(TYPE_TRAILER);
                io.set_endian(Endian::Big);
                io.write_bytes(&video.series_id)?;
                io.write_bytes(&video.season_id)?;
                io.write_u16(video.season_number)?;
                io.write_u16(video.episode_number)?;
            }
            _ => {}
        }

        io.seek(DEVICE_ID);
        io.set_endian(Endian::Big);
        io.write_bytes(&self.device_id)?;
        io.write_fixed_utf16(&self.display_name, 0x80)?;
        io.seek(DESCRIPTION);
        io.write_fixed_utf16(&self.display_description, 0x80)?;
        io.seek(PUBLISHER);
        io.write_fixed_utf16(&self.publisher_name, 0x40)?;
        io.seek(TITLE);
        io.write_fixed_utf16(&self.title_name, 0x40)?;

        io.seek(TRANSFER_FLAG);
        io.write_u8(self.transfer_flag)?;
        io.write_u32(self.thumbnail_image.len() as u32)?;
        io.write_u32(self.title_thumbnail_image.len() as u32)?;
        io.write_bytes(&self.thumbnail_image)?;
        io.seek(TITLE_THUMBNAIL);
        io.write_bytes(&self.title_thumbnail_image)?;
        Ok(())
    }

    fn write_pec(&self, io: &mut ByteCursor) -> Result<()> {
        if let Some(cert) = &self.certificate {
            cert.write_at(io, 0)?;
        }

        io.seek(PEC_HEADER_HASH);
        io.write_bytes(&self.header_hash)?;

        self.stfs_volume_descriptor
            .write_at(io, PEC_VOLUME_DESCRIPTOR)?;

        io.seek(PEC_PROFILE_ID);
        io.write_bytes(&self.profile_id)?;
        io.write_u8(if self.enabled { 1 } else { 0 })?;
        io.write_bytes(&self.console_id)?;
        Ok(())
    }

    /// Re-sign a console-signed header: store the supplied digest and the
    /// signature the signer derives from it.
    pub fn resign(
        &mut self,
        io: &mut ByteCursor,
        digest: [u8; 0x14],
        signer: &dyn HeaderSigner,
    ) -> Result<()> {
        self.header_hash = digest;
        if let Some(cert) = self.certificate.as_mut() {
            let signature = signer.sign(&digest)?;
            cert.certificate_signature = signature;
        }
        self.write_metadata(io)
    }
}
