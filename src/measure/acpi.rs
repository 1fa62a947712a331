//! ACPI blob parser and QEMU `etc/table-loader`/`etc/acpi/rsdp` preimage
//! serializers.
//!
//! Parses an already-assembled ACPI blob (as a host would hand to the
//! hypervisor) and reproduces the fixed command stream QEMU's firmware
//! loader protocol would emit to place and checksum those tables in guest
//! memory.

const COMMAND_SIZE: usize = 128;
const FILENAME_FIELD_SIZE: usize = 56;
const TABLE_LOADER_TOTAL_SIZE: usize = 4096;

const ZONE_HIGH: u8 = 1;
const ZONE_FSEG: u8 = 2;

const RSDP_FILE: &str = "etc/acpi/rsdp";
const TABLES_FILE: &str = "etc/acpi/tables";

/// A table discovered in the ACPI blob.
#[derive(Debug, Clone)]
pub struct AcpiTable {
    pub signature: [u8; 4],
    pub offset: usize,
    pub length: usize,
}

impl AcpiTable {
    pub fn signature_str(&self) -> &str {
        std::str::from_utf8(&self.signature).unwrap_or("????")
    }
}

/// Walk an ACPI blob from offset 0, recording each table's signature,
/// offset, and length, stopping at EOF or a run of four NUL bytes.
pub fn parse_acpi_tables(blob: &[u8]) -> Vec<AcpiTable> {
    let mut tables = Vec::new();
    let mut offset = 0usize;

    while offset + 8 <= blob.len() {
        let signature: [u8; 4] = blob[offset..offset + 4].try_into().unwrap();
        if signature == [0, 0, 0, 0] {
            break;
        }
        let length = u32::from_le_bytes(blob[offset + 4..offset + 8].try_into().unwrap()) as usize;
        if length == 0 {
            break;
        }
        tables.push(AcpiTable {
            signature,
            offset,
            length,
        });
        offset += length;
    }

    tables
}

fn write_filename(buf: &mut [u8; COMMAND_SIZE], at: usize, name: &str) {
    let bytes = name.as_bytes();
    assert!(bytes.len() <= FILENAME_FIELD_SIZE, "filename too long: {name}");
    buf[at..at + bytes.len()].copy_from_slice(bytes);
}

fn allocate(filename: &str, align: u32, zone: u8) -> [u8; COMMAND_SIZE] {
    let mut buf = [0u8; COMMAND_SIZE];
    buf[0..4].copy_from_slice(&1u32.to_le_bytes());
    write_filename(&mut buf, 4, filename);
    buf[60..64].copy_from_slice(&align.to_le_bytes());
    buf[64] = zone;
    buf
}

fn add_pointer(dest_file: &str, src_file: &str, dest_offset: u32, size: u8) -> [u8; COMMAND_SIZE] {
    let mut buf = [0u8; COMMAND_SIZE];
    buf[0..4].copy_from_slice(&2u32.to_le_bytes());
    write_filename(&mut buf, 4, dest_file);
    write_filename(&mut buf, 60, src_file);
    buf[116..120].copy_from_slice(&dest_offset.to_le_bytes());
    buf[120] = size;
    buf
}

fn add_checksum(filename: &str, checksum_byte: u32, start: u32, length: u32) -> [u8; COMMAND_SIZE] {
    let mut buf = [0u8; COMMAND_SIZE];
    buf[0..4].copy_from_slice(&3u32.to_le_bytes());
    write_filename(&mut buf, 4, filename);
    buf[60..64].copy_from_slice(&checksum_byte.to_le_bytes());
    buf[64..68].copy_from_slice(&start.to_le_bytes());
    buf[68..72].copy_from_slice(&length.to_le_bytes());
    buf
}

/// Build the `etc/acpi/rsdp` preimage: a 20-byte RSDP pointing at the first
/// discovered `RSDT` table (or address 0 if there is none).
pub fn build_rsdp_preimage(tables: &[AcpiTable]) -> [u8; 20] {
    let rsdt_addr = tables
        .iter()
        .find(|t| t.signature_str() == "RSDT")
        .map(|t| t.offset as u32)
        .unwrap_or(0);

    let mut buf = [0u8; 20];
    buf[0..8].copy_from_slice(b"RSD PTR ");
    buf[8] = 0; // checksum slot
    buf[9..15].copy_from_slice(b"BOCHS ");
    buf[15] = 0;
    buf[16..20].copy_from_slice(&rsdt_addr.to_le_bytes());
    buf
}

/// Build the `etc/table-loader` command stream, zero-padded to 4096 bytes.
pub fn build_table_loader_preimage(tables: &[AcpiTable]) -> Vec<u8> {
    let mut commands: Vec<[u8; COMMAND_SIZE]> = Vec::new();

    commands.push(allocate(RSDP_FILE, 16, ZONE_FSEG));
    commands.push(allocate(TABLES_FILE, 64, ZONE_HIGH));

    for table in tables {
        match table.signature_str() {
            "FACP" => {
                commands.push(add_pointer(TABLES_FILE, TABLES_FILE, (table.offset + 36) as u32, 4));
                commands.push(add_pointer(TABLES_FILE, TABLES_FILE, (table.offset + 40) as u32, 4));
                commands.push(add_pointer(TABLES_FILE, TABLES_FILE, (table.offset + 140) as u32, 8));
            }
            "RSDT" => {
                commands.push(add_pointer(TABLES_FILE, TABLES_FILE, (table.offset + 36) as u32, 4));
                commands.push(add_pointer(TABLES_FILE, TABLES_FILE, (table.offset + 40) as u32, 4));
                commands.push(add_pointer(TABLES_FILE, TABLES_FILE, (table.offset + 44) as u32, 4));
                commands.push(add_pointer(TABLES_FILE, TABLES_FILE, (table.offset + 48) as u32, 4));
            }
            _ => {}
        }

        if table.signature_str() != "FACS" {
            commands.push(add_checksum(
                TABLES_FILE,
                (table.offset + 9) as u32,
                table.offset as u32,
                table.length as u32,
            ));
        }
    }

    commands.push(add_pointer(RSDP_FILE, TABLES_FILE, 16, 4));
    commands.push(add_checksum(RSDP_FILE, 8, 0, 20));

    let mut preimage = Vec::with_capacity(TABLE_LOADER_TOTAL_SIZE);
    for cmd in &commands {
        preimage.extend_from_slice(cmd);
    }
    assert!(preimage.len() <= TABLE_LOADER_TOTAL_SIZE, "table-loader command stream overflowed 4096 bytes");
    preimage.resize(TABLE_LOADER_TOTAL_SIZE, 0);
    preimage
}
