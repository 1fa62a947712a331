//! TDX firmware metadata decoder.
//!
//! Locates the TDX metadata table embedded near the end of an OVMF-style
//! firmware image by walking a backward-linked GUID table rooted at a fixed
//! 48-byte footer, then parses the fixed-size metadata header and section
//! records it points to.

use super::error::MeasureError;
use super::guid::uuid_to_bytes;

/// Footer GUID that must occupy the last 16 bytes of the firmware image.
const FOOTER_GUID: &str = "96b582de-1fb2-45f7-baea-a366c55a082d";

/// GUID of the table entry that points at the TDX metadata table header.
const METADATA_OFFSET_GUID: &str = "e47a6535-984a-4798-865e-4685a7bf8ec2";

/// GUID of the TDX metadata table header itself.
const METADATA_TABLE_GUID: &str = "e9eaf9f3-168e-44d5-a8eb-7f4d8738f6ae";

/// ASCII signature of the metadata table header.
const METADATA_SIGNATURE: &[u8; 4] = b"TDVF";

/// Supported metadata table version.
const METADATA_VERSION: u32 = 1;

/// Size in bytes of the trailing footer block.
const FOOTER_SIZE: usize = 48;

/// Size in bytes of one section record in the metadata table.
const SECTION_RECORD_SIZE: usize = 32;

/// The fixed 9-entry section-type table indexed by `sectionType`.
const SECTION_TYPES: [&str; 9] = [
    "BFV",
    "CFV",
    "TD_HOB",
    "TempMem",
    "PermMem",
    "Payload",
    "PayloadParam",
    "TD_INFO",
    "TD_PARAMS",
];

/// One region of firmware and its placement in guest memory.
#[derive(Debug, Clone)]
pub struct TdxMetadataSection {
    pub raw_offset: u32,
    pub raw_size: u32,
    pub mem_base: u64,
    pub mem_size: u64,
    pub section_type: &'static str,
    pub extend_mr: bool,
}

/// The original firmware byte image plus its ordered list of metadata
/// sections. Immutable after parse.
#[derive(Debug, Clone)]
pub struct TdFirmware {
    pub bytes: Vec<u8>,
    pub sections: Vec<TdxMetadataSection>,
}

impl TdFirmware {
    /// The single `TD_HOB` section this firmware must contain.
    pub fn hob_section(&self) -> Option<&TdxMetadataSection> {
        self.sections.iter().find(|s| s.section_type == "TD_HOB")
    }
}

fn require(cond: bool, msg: impl Into<String>) -> Result<(), MeasureError> {
    if cond {
        Ok(())
    } else {
        Err(MeasureError::FirmwareDecode(msg.into()))
    }
}

/// Parse the TDX metadata table out of a firmware image.
pub fn parse_firmware(bytes: &[u8]) -> Result<TdFirmware, MeasureError> {
    require(
        bytes.len() >= FOOTER_SIZE + 2,
        "firmware image shorter than the minimum footer size",
    )?;
    let len = bytes.len();

    let footer_guid = &bytes[len - 16..len];
    require(
        footer_guid == uuid_to_bytes(FOOTER_GUID),
        "firmware footer GUID mismatch",
    )?;

    let table_len = u16::from_le_bytes([bytes[len - 50], bytes[len - 49]]) as usize;
    // The GUID table area sits immediately before the 2-byte length field,
    // which itself sits immediately before the 48-byte footer.
    let table_area_end = len - FOOTER_SIZE - 2;
    require(
        table_len <= table_area_end,
        "GUID table length exceeds firmware image size",
    )?;
    let table_area_start = table_area_end - table_len;

    let target_offset_guid = uuid_to_bytes(METADATA_OFFSET_GUID);
    let mut cursor = table_area_end;
    let mut header_offset: Option<usize> = None;

    while cursor > table_area_start {
        require(
            cursor >= table_area_start + 18,
            "truncated GUID table entry",
        )?;
        let guid_end = cursor;
        let guid_start = guid_end - 16;
        let len_end = guid_start;
        let len_start = len_end - 2;
        let entry_len = u16::from_le_bytes([bytes[len_start], bytes[len_end - 1]]) as usize;
        require(entry_len >= 18, "GUID table entry shorter than its trailer")?;
        require(entry_len <= guid_end - table_area_start, "GUID table entry length out of bounds")?;
        let entry_start = guid_end - entry_len;

        if &bytes[guid_start..guid_end] == &target_offset_guid[..] {
            require(len_start >= entry_start + 4, "missing metadata-offset field")?;
            let raw_offset = u32::from_le_bytes([
                bytes[len_start - 4],
                bytes[len_start - 3],
                bytes[len_start - 2],
                bytes[len_start - 1],
            ]) as usize;
            require(raw_offset >= 16, "metadata offset-from-EOF underflows the 16-byte slack")?;
            let offset_from_eof = raw_offset - 16;
            require(offset_from_eof <= len, "metadata offset-from-EOF exceeds image size")?;
            header_offset = Some(len - offset_from_eof);
            break;
        }

        cursor = entry_start;
    }

    let header_offset = header_offset.ok_or_else(|| {
        MeasureError::FirmwareDecode("metadata-offset GUID entry not found".into())
    })?;

    require(
        header_offset + 16 + 4 + 4 + 4 + 4 <= len,
        "metadata header extends past end of firmware image",
    )?;

    let header_guid = &bytes[header_offset..header_offset + 16];
    require(
        header_guid == uuid_to_bytes(METADATA_TABLE_GUID),
        "metadata table header GUID mismatch",
    )?;
    let mut off = header_offset + 16;

    let signature = &bytes[off..off + 4];
    require(signature == METADATA_SIGNATURE, "metadata table signature mismatch")?;
    off += 4;

    let _length = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
    off += 4;

    let version = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
    require(version == METADATA_VERSION, format!("unsupported metadata version {version}"))?;
    off += 4;

    let count = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap()) as usize;
    off += 4;

    require(
        off + count * SECTION_RECORD_SIZE <= len,
        "metadata section records extend past end of firmware image",
    )?;

    let mut sections = Vec::with_capacity(count);
    for i in 0..count {
        let rec = &bytes[off + i * SECTION_RECORD_SIZE..off + (i + 1) * SECTION_RECORD_SIZE];
        let raw_offset = u32::from_le_bytes(rec[0..4].try_into().unwrap());
        let raw_size = u32::from_le_bytes(rec[4..8].try_into().unwrap());
        let mem_base = u64::from_le_bytes(rec[8..16].try_into().unwrap());
        let mem_size = u64::from_le_bytes(rec[16..24].try_into().unwrap());
        let section_type_idx = u32::from_le_bytes(rec[24..28].try_into().unwrap()) as usize;
        let attributes = u32::from_le_bytes(rec[28..32].try_into().unwrap());

        let section_type = *SECTION_TYPES
            .get(section_type_idx)
            .ok_or_else(|| MeasureError::FirmwareDecode(format!("unknown section type index {section_type_idx}")))?;

        sections.push(TdxMetadataSection {
            raw_offset,
            raw_size,
            mem_base,
            mem_size,
            section_type,
            extend_mr: attributes & 1 != 0,
        });
    }

    Ok(TdFirmware {
        bytes: bytes.to_vec(),
        sections,
    })
}
