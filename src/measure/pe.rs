//! PE/COFF parser and Authenticode-style measurement preimage.
//!
//! Parses just enough of a PE image (DOS/COFF/optional headers, section
//! table) to reproduce the OVMF PE/COFF measurement procedure: the same
//! byte ranges an Authenticode signature would cover, excluding the
//! Checksum field and the Certificate Directory.

use super::error::MeasureError;

const DOS_HEADER_SIZE: usize = 0x40;
const COFF_HEADER_SIZE: usize = 20;
const SECTION_HEADER_SIZE: usize = 40;
const PE32_MAGIC: u16 = 0x10b;
const PE32_PLUS_MAGIC: u16 = 0x20b;
const PE32_OPT_HEADER_SIZE: usize = 96;
const PE32_PLUS_OPT_HEADER_SIZE: usize = 112;
const DATA_DIRECTORY_ENTRY_SIZE: usize = 8;
const CERT_DIRECTORY_INDEX: usize = 4;

/// One section of a parsed PE image.
#[derive(Debug, Clone)]
pub struct PeSection {
    pub name: String,
    /// Bytes `[pointerToRawData, pointerToRawData + min(virtualSize, sizeOfRawData))`.
    pub body: Vec<u8>,
    /// Bytes `[pointerToRawData, pointerToRawData + sizeOfRawData)`.
    pub raw_body: Vec<u8>,
    pointer_to_raw_data: u32,
}

/// A parsed PE/COFF image.
#[derive(Debug, Clone)]
pub struct PortableExecutable {
    pub optional_header_offset: usize,
    pub optional_header_size: usize,
    pub size_of_headers: usize,
    pub number_of_rva_and_sizes: usize,
    pub sections: Vec<PeSection>,
    image_size: usize,
}

impl PortableExecutable {
    /// Byte offset and body of a named section (null-trimmed, e.g. `.linux`),
    /// used to detect and unpack Unified Kernel Images.
    pub fn section_body(&self, name: &str) -> Option<&[u8]> {
        self.sections
            .iter()
            .find(|s| s.name.trim_end_matches('\0') == name.trim_end_matches('\0'))
            .map(|s| s.body.as_slice())
    }
}

fn err(msg: impl Into<String>) -> MeasureError {
    MeasureError::PeDecode(msg.into())
}

/// Parse a PE/COFF image from raw bytes.
pub fn parse_pe(bytes: &[u8]) -> Result<PortableExecutable, MeasureError> {
    if bytes.len() < DOS_HEADER_SIZE + 4 {
        return Err(err("image too small for DOS header"));
    }
    if &bytes[0..2] != b"MZ" {
        return Err(err("missing DOS signature"));
    }

    let e_lfanew = u32::from_le_bytes(bytes[0x3c..0x40].try_into().unwrap()) as usize;
    if e_lfanew + 4 + COFF_HEADER_SIZE > bytes.len() {
        return Err(err("PE header offset exceeds file size"));
    }
    if &bytes[e_lfanew..e_lfanew + 4] != b"PE\0\0" {
        return Err(err("missing PE signature"));
    }

    let coff_offset = e_lfanew + 4;
    let number_of_sections =
        u16::from_le_bytes(bytes[coff_offset + 2..coff_offset + 4].try_into().unwrap()) as usize;
    let size_of_optional_header =
        u16::from_le_bytes(bytes[coff_offset + 16..coff_offset + 18].try_into().unwrap()) as usize;

    let optional_header_offset = coff_offset + COFF_HEADER_SIZE;
    if optional_header_offset + 2 > bytes.len() {
        return Err(err("optional header offset exceeds file size"));
    }

    let magic = u16::from_le_bytes(
        bytes[optional_header_offset..optional_header_offset + 2]
            .try_into()
            .unwrap(),
    );
    let fixed_optional_header_size = match magic {
        PE32_MAGIC => PE32_OPT_HEADER_SIZE,
        PE32_PLUS_MAGIC => PE32_PLUS_OPT_HEADER_SIZE,
        other => return Err(err(format!("unknown optional header magic {other:#x}"))),
    };

    if optional_header_offset + fixed_optional_header_size > bytes.len() {
        return Err(err("optional header extends past end of file"));
    }

    let size_of_headers = u32::from_le_bytes(
        bytes[optional_header_offset + 60..optional_header_offset + 64]
            .try_into()
            .unwrap(),
    ) as usize;
    let number_of_rva_and_sizes = u32::from_le_bytes(
        bytes[optional_header_offset + fixed_optional_header_size - 4
            ..optional_header_offset + fixed_optional_header_size]
            .try_into()
            .unwrap(),
    ) as usize;

    if size_of_headers > bytes.len() {
        return Err(err("sizeOfHeaders exceeds file size"));
    }

    let section_table_offset = optional_header_offset + size_of_optional_header;
    if section_table_offset + number_of_sections * SECTION_HEADER_SIZE > bytes.len() {
        return Err(err("section table extends past end of file"));
    }

    let mut sections = Vec::with_capacity(number_of_sections);
    for i in 0..number_of_sections {
        let rec = &bytes[section_table_offset + i * SECTION_HEADER_SIZE
            ..section_table_offset + (i + 1) * SECTION_HEADER_SIZE];
        let name = String::from_utf8_lossy(&rec[0..8])
            .trim_end_matches('\0')
            .to_string();
        let virtual_size = u32::from_le_bytes(rec[8..12].try_into().unwrap()) as usize;
        let size_of_raw_data = u32::from_le_bytes(rec[16..20].try_into().unwrap()) as usize;
        let pointer_to_raw_data = u32::from_le_bytes(rec[20..24].try_into().unwrap());

        let raw_start = pointer_to_raw_data as usize;
        let raw_end = raw_start
            .checked_add(size_of_raw_data)
            .ok_or_else(|| err("section raw data size overflows"))?;
        if raw_end > bytes.len() {
            return Err(err(format!(
                "section {name:?} raw data [{raw_start:#x},{raw_end:#x}) exceeds file size"
            )));
        }
        let raw_body = bytes[raw_start..raw_end].to_vec();
        let body_len = virtual_size.min(size_of_raw_data);
        let body = bytes[raw_start..raw_start + body_len].to_vec();

        sections.push(PeSection {
            name,
            body,
            raw_body,
            pointer_to_raw_data,
        });
    }

    Ok(PortableExecutable {
        optional_header_offset,
        optional_header_size: fixed_optional_header_size,
        size_of_headers,
        number_of_rva_and_sizes,
        sections,
        image_size: bytes.len(),
    })
}

/// Build the Authenticode-style measurement preimage for a parsed PE image.
pub fn authenticode_preimage(pe: &PortableExecutable, bytes: &[u8]) -> Result<Vec<u8>, MeasureError> {
    let checksum_offset = pe.optional_header_offset + 0x40;
    let cert_dir_entry_offset =
        pe.optional_header_offset + pe.optional_header_size + CERT_DIRECTORY_INDEX * DATA_DIRECTORY_ENTRY_SIZE;
    let has_cert_dir_entry = pe.number_of_rva_and_sizes > CERT_DIRECTORY_INDEX
        && cert_dir_entry_offset + DATA_DIRECTORY_ENTRY_SIZE <= pe.size_of_headers;

    let mut preimage = Vec::new();
    preimage.extend_from_slice(&bytes[0..checksum_offset]);

    if has_cert_dir_entry {
        preimage.extend_from_slice(&bytes[checksum_offset + 4..cert_dir_entry_offset]);
        preimage.extend_from_slice(&bytes[cert_dir_entry_offset + 8..pe.size_of_headers]);
    } else {
        preimage.extend_from_slice(&bytes[checksum_offset + 4..pe.size_of_headers]);
    }

    let mut ordered_sections: Vec<&PeSection> = pe
        .sections
        .iter()
        .filter(|s| !s.raw_body.is_empty())
        .collect();
    ordered_sections.sort_by_key(|s| s.pointer_to_raw_data);

    let mut raw_bytes_total = 0usize;
    for section in &ordered_sections {
        preimage.extend_from_slice(&section.raw_body);
        raw_bytes_total += section.raw_body.len();
    }

    let sum_of_bytes_hashed = pe.size_of_headers + raw_bytes_total;

    let cert_size = if has_cert_dir_entry {
        u32::from_le_bytes(
            bytes[cert_dir_entry_offset + 4..cert_dir_entry_offset + 8]
                .try_into()
                .unwrap(),
        ) as usize
    } else {
        0
    };

    if pe.image_size < sum_of_bytes_hashed + cert_size {
        return Err(err(format!(
            "image size {:#x} smaller than sumOfBytesHashed ({:#x}) + certSize ({:#x})",
            pe.image_size, sum_of_bytes_hashed, cert_size
        )));
    }

    if pe.image_size > sum_of_bytes_hashed {
        preimage.extend_from_slice(&bytes[sum_of_bytes_hashed..pe.image_size - cert_size]);
    }

    Ok(preimage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::util::sha384;

    /// Build a minimal, valid PE32 image with the given sections (each a
    /// `(name, raw_body)` pair written contiguously after the headers).
    fn synthetic_pe(sections: &[(&str, &[u8])]) -> Vec<u8> {
        let num_sections = sections.len() as u16;
        let size_of_optional_header = PE32_OPT_HEADER_SIZE as u16;
        let section_table_offset = 0x40 + 4 + COFF_HEADER_SIZE + size_of_optional_header as usize;
        let headers_end = section_table_offset + sections.len() * SECTION_HEADER_SIZE;
        let size_of_headers = ((headers_end + 0x1ff) / 0x200) * 0x200;

        let mut raw_offsets = Vec::new();
        let mut cursor = size_of_headers;
        for (_, body) in sections {
            raw_offsets.push(cursor);
            cursor += body.len();
        }
        let image_size = cursor;

        let mut buf = vec![0u8; image_size];
        buf[0..2].copy_from_slice(b"MZ");
        let e_lfanew = 0x40u32;
        buf[0x3c..0x40].copy_from_slice(&e_lfanew.to_le_bytes());
        buf[0x40..0x44].copy_from_slice(b"PE\0\0");

        let coff_offset = 0x44;
        buf[coff_offset..coff_offset + 2].copy_from_slice(&0x8664u16.to_le_bytes()); // Machine
        buf[coff_offset + 2..coff_offset + 4].copy_from_slice(&num_sections.to_le_bytes());
        buf[coff_offset + 16..coff_offset + 18].copy_from_slice(&size_of_optional_header.to_le_bytes());

        let opt_offset = coff_offset + COFF_HEADER_SIZE;
        buf[opt_offset..opt_offset + 2].copy_from_slice(&PE32_MAGIC.to_le_bytes());
        buf[opt_offset + 60..opt_offset + 64].copy_from_slice(&(size_of_headers as u32).to_le_bytes());
        buf[opt_offset + 92..opt_offset + 96].copy_from_slice(&0u32.to_le_bytes()); // NumberOfRvaAndSizes = 0

        for (i, (name, body)) in sections.iter().enumerate() {
            let rec_offset = section_table_offset + i * SECTION_HEADER_SIZE;
            let mut name_bytes = [0u8; 8];
            let n = name.as_bytes();
            name_bytes[..n.len().min(8)].copy_from_slice(&n[..n.len().min(8)]);
            buf[rec_offset..rec_offset + 8].copy_from_slice(&name_bytes);
            buf[rec_offset + 8..rec_offset + 12].copy_from_slice(&(body.len() as u32).to_le_bytes()); // VirtualSize
            buf[rec_offset + 16..rec_offset + 20].copy_from_slice(&(body.len() as u32).to_le_bytes()); // SizeOfRawData
            buf[rec_offset + 20..rec_offset + 24]
                .copy_from_slice(&(raw_offsets[i] as u32).to_le_bytes()); // PointerToRawData

            buf[raw_offsets[i]..raw_offsets[i] + body.len()].copy_from_slice(body);
        }

        buf
    }

    #[test]
    fn parses_minimal_pe() {
        let image = synthetic_pe(&[(".text", &[0xaa; 16])]);
        let pe = parse_pe(&image).unwrap();
        assert_eq!(pe.sections.len(), 1);
        assert_eq!(pe.sections[0].name, ".text");
        assert_eq!(pe.sections[0].raw_body, vec![0xaa; 16]);
    }

    #[test]
    fn preimage_excludes_checksum_field() {
        let image = synthetic_pe(&[(".text", &[0x11; 32])]);
        let pe = parse_pe(&image).unwrap();
        let checksum_offset = pe.optional_header_offset + 0x40;

        // Corrupt the checksum field; the preimage must be unaffected.
        let mut corrupted = image.clone();
        corrupted[checksum_offset..checksum_offset + 4].copy_from_slice(&[0xff; 4]);

        let p1 = authenticode_preimage(&pe, &image).unwrap();
        let p2 = authenticode_preimage(&pe, &corrupted).unwrap();
        assert_eq!(p1, p2);
        assert_eq!(sha384(&p1), sha384(&p2));
    }

    #[test]
    fn section_body_lookup() {
        let image = synthetic_pe(&[(".linux", &[1, 2, 3]), (".initrd", &[4, 5])]);
        let pe = parse_pe(&image).unwrap();
        assert_eq!(pe.section_body(".linux"), Some(&[1u8, 2, 3][..]));
        assert_eq!(pe.section_body(".initrd"), Some(&[4u8, 5][..]));
        assert_eq!(pe.section_body(".missing"), None);
    }

    #[test]
    fn rejects_bad_dos_signature() {
        let mut image = synthetic_pe(&[(".text", &[0; 8])]);
        image[0] = b'X';
        assert!(parse_pe(&image).is_err());
    }
}
