//! TD Hand-Off Block builder.
//!
//! Builds the byte buffer the HOB event hashes: a PHIT header followed by
//! one resource-descriptor HOB per contiguous physical-memory range
//! (reserved or general system memory), terminated by an END HOB that is
//! written but excluded from the hash preimage.

use super::error::MeasureError;
use super::firmware::TdxMetadataSection;

const PHIT_HEADER_SIZE: usize = 56;
const RESOURCE_DESCRIPTOR_SIZE: usize = 48;
const END_HOB_SIZE: usize = 8;

const HOB_TYPE_HANDOFF: u16 = 0x0001;
const HOB_TYPE_RESOURCE_DESCRIPTOR: u16 = 0x0003;
const HOB_TYPE_END_OF_HOB_LIST: u16 = 0xffff;

const HOB_VERSION: u32 = 0x0009;

const RESOURCE_TYPE_SYSTEM_MEMORY: u32 = 0x0000_0007;
const RESOURCE_TYPE_RESERVED: u32 = 0x0000_0000;
const RESOURCE_ATTRIBUTE: u32 = 0x0000_0007;

#[derive(Clone, Copy)]
struct Range {
    start: u64,
    end: u64,
    resource_type: u32,
}

fn write_resource_descriptor(buf: &mut Vec<u8>, range: &Range) {
    // Header (type, length) is 4 bytes; the 20 zeroed bytes that follow
    // cover the Reserved field and Owner GUID of the real UEFI
    // EFI_HOB_RESOURCE_DESCRIPTOR structure, bringing the record to exactly
    // 48 bytes, matching the declared HobLength.
    buf.extend_from_slice(&HOB_TYPE_RESOURCE_DESCRIPTOR.to_le_bytes());
    buf.extend_from_slice(&(RESOURCE_DESCRIPTOR_SIZE as u16).to_le_bytes());
    buf.extend_from_slice(&[0u8; 20]);
    buf.extend_from_slice(&range.resource_type.to_le_bytes());
    buf.extend_from_slice(&RESOURCE_ATTRIBUTE.to_le_bytes());
    buf.extend_from_slice(&range.start.to_le_bytes());
    buf.extend_from_slice(&(range.end - range.start).to_le_bytes());
}

/// Build the HOB hash preimage (the buffer up to, but excluding, the END
/// HOB) for the given metadata sections and total guest memory size.
pub fn build_hob_preimage(
    sections: &[TdxMetadataSection],
    total_memory_bytes: u64,
) -> Result<Vec<u8>, MeasureError> {
    let hob_section = sections
        .iter()
        .find(|s| s.section_type == "TD_HOB")
        .ok_or_else(|| MeasureError::Hob("no TD_HOB section in firmware metadata".into()))?;

    let mut reserved: Vec<(u64, u64)> = sections
        .iter()
        .filter(|s| s.section_type == "TD_HOB" || s.section_type == "TempMem")
        .map(|s| (s.mem_base, s.mem_base + s.mem_size))
        .collect();
    reserved.sort_by_key(|r| r.0);

    for w in reserved.windows(2) {
        if w[1].0 < w[0].1 {
            return Err(MeasureError::Hob(format!(
                "reserved ranges overlap: [{:#x},{:#x}) and [{:#x},{:#x})",
                w[0].0, w[0].1, w[1].0, w[1].1
            )));
        }
    }

    let mut ranges = Vec::new();
    let mut cursor = 0u64;
    for (start, end) in &reserved {
        if *start > cursor {
            ranges.push(Range {
                start: cursor,
                end: *start,
                resource_type: RESOURCE_TYPE_SYSTEM_MEMORY,
            });
        }
        ranges.push(Range {
            start: *start,
            end: *end,
            resource_type: RESOURCE_TYPE_RESERVED,
        });
        cursor = (*end).max(cursor);
    }
    if cursor < total_memory_bytes {
        ranges.push(Range {
            start: cursor,
            end: total_memory_bytes,
            resource_type: RESOURCE_TYPE_SYSTEM_MEMORY,
        });
    }

    let mut buf = Vec::with_capacity(PHIT_HEADER_SIZE + ranges.len() * RESOURCE_DESCRIPTOR_SIZE);
    buf.extend_from_slice(&HOB_TYPE_HANDOFF.to_le_bytes());
    buf.extend_from_slice(&(PHIT_HEADER_SIZE as u16).to_le_bytes());
    buf.extend_from_slice(&[0u8; 4]);
    buf.extend_from_slice(&HOB_VERSION.to_le_bytes());
    buf.extend_from_slice(&[0u8; 36]);
    debug_assert_eq!(buf.len(), PHIT_HEADER_SIZE);

    for range in &ranges {
        write_resource_descriptor(&mut buf, range);
    }

    let preimage_len = buf.len();
    let end_of_hob_list_addr = hob_section.mem_base + (preimage_len + END_HOB_SIZE) as u64;
    buf[48..56].copy_from_slice(&end_of_hob_list_addr.to_le_bytes());

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(section_type: &'static str, mem_base: u64, mem_size: u64) -> TdxMetadataSection {
        TdxMetadataSection {
            raw_offset: 0,
            raw_size: 0,
            mem_base,
            mem_size,
            section_type,
            extend_mr: false,
        }
    }

    #[test]
    fn missing_td_hob_is_an_error() {
        let sections = vec![section("BFV", 0, 0x1000)];
        assert!(matches!(
            build_hob_preimage(&sections, 0x10000),
            Err(MeasureError::Hob(_))
        ));
    }

    #[test]
    fn coverage_is_contiguous_and_exhaustive() {
        let sections = vec![
            section("TD_HOB", 0x1000, 0x1000),
            section("TempMem", 0x10000, 0x2000),
        ];
        let total_memory = 0x20000u64;
        let preimage = build_hob_preimage(&sections, total_memory).unwrap();

        // header (56) + 4 resource descriptors (48 each): gap, TD_HOB,
        // gap, TempMem, gap.
        assert_eq!(preimage.len(), PHIT_HEADER_SIZE + 5 * RESOURCE_DESCRIPTOR_SIZE);

        let mut covered = 0u64;
        let mut offset = PHIT_HEADER_SIZE;
        let mut last_end = 0u64;
        while offset < preimage.len() {
            let start = u64::from_le_bytes(preimage[offset + 32..offset + 40].try_into().unwrap());
            let len = u64::from_le_bytes(preimage[offset + 40..offset + 48].try_into().unwrap());
            assert_eq!(start, last_end, "ranges must be contiguous");
            covered += len;
            last_end = start + len;
            offset += RESOURCE_DESCRIPTOR_SIZE;
        }
        assert_eq!(covered, total_memory);
        assert_eq!(last_end, total_memory);
    }

    #[test]
    fn end_hob_excluded_from_preimage() {
        let sections = vec![section("TD_HOB", 0, 0x1000)];
        let preimage = build_hob_preimage(&sections, 0x1000).unwrap();
        // header + one reserved descriptor exactly covering all memory.
        assert_eq!(preimage.len(), PHIT_HEADER_SIZE + RESOURCE_DESCRIPTOR_SIZE);
    }
}
