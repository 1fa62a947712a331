//! RTMR event-log generator.
//!
//! Orchestrates every other decoder/encoder in this crate (HOB, ACPI,
//! PE/COFF, kernel patching, GUID/UTF-16LE codecs) to produce the fixed,
//! ordered list of measured events a TDX guest's firmware would log during
//! an honest boot.

use std::collections::HashMap;

use super::acpi::{build_rsdp_preimage, build_table_loader_preimage, parse_acpi_tables};
use super::error::MeasureError;
use super::firmware::TdFirmware;
use super::guid::uuid_to_bytes;
use super::hob::build_hob_preimage;
use super::kernel::patch_kernel_header;
use super::pe::{authenticode_preimage, parse_pe};
use super::util::{sha384, utf16le};

const SECURE_BOOT_VARIABLE_GUID: &str = "8be4df61-93ca-11d2-aa0d-00e098032b8c";
const IMAGE_SECURITY_DATABASE_GUID: &str = "d719b2cb-3d3a-4596-a3bc-dad00e67656f";

/// `(variable name, owning GUID)` pairs, in fixed emission order.
const EMPTY_VARIABLES: [(&str, &str); 5] = [
    ("SecureBoot", SECURE_BOOT_VARIABLE_GUID),
    ("PK", SECURE_BOOT_VARIABLE_GUID),
    ("KEK", SECURE_BOOT_VARIABLE_GUID),
    ("db", IMAGE_SECURITY_DATABASE_GUID),
    ("dbx", IMAGE_SECURITY_DATABASE_GUID),
];

/// Hardware, firmware, and software inputs to a reproduction run.
pub struct TrustDomain {
    pub total_memory_bytes: u64,
    pub acpi_tables: Vec<u8>,
    pub firmware: TdFirmware,
    pub kernel: Vec<u8>,
    pub initrd: Option<Vec<u8>>,
    pub cmdline: Option<String>,
}

/// One entry in the reproduced event log.
#[derive(Debug, Clone)]
pub struct TdEvent {
    pub name: &'static str,
    pub event_type: &'static str,
    pub register: u8,
    pub metadata: HashMap<String, String>,
    pub digest: [u8; 48],
}

fn event(
    name: &'static str,
    event_type: &'static str,
    register: u8,
    metadata: HashMap<String, String>,
    preimage: &[u8],
) -> TdEvent {
    TdEvent {
        name,
        event_type,
        register,
        metadata,
        digest: sha384(preimage),
    }
}

fn no_metadata() -> HashMap<String, String> {
    HashMap::new()
}

fn file_metadata(file_name: &str) -> HashMap<String, String> {
    let mut m = HashMap::new();
    m.insert("fileName".to_string(), file_name.to_string());
    m
}

/// Preimage for an empty EFI variable event: `guid || nameLen(u64 LE) ||
/// zeros(8) || utf16le(name)`.
fn empty_variable_preimage(name: &str, guid: &str) -> Vec<u8> {
    let name_units = name.encode_utf16().count() as u64;
    let mut preimage = Vec::new();
    preimage.extend_from_slice(&uuid_to_bytes(guid));
    preimage.extend_from_slice(&name_units.to_le_bytes());
    preimage.extend_from_slice(&[0u8; 8]);
    preimage.extend_from_slice(&utf16le(name));
    preimage
}

/// The canonical `UiApp` boot-option byte block.
fn ui_app_boot_option() -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&[0x09, 0x01, 0x00, 0x00, 0x2C, 0x00]);
    buf.extend_from_slice(&utf16le("UiApp\0"));
    buf.extend_from_slice(&[0x04, 0x07, 0x14, 0x00]);
    buf.extend_from_slice(&uuid_to_bytes("7cb8bdc9-f8eb-4f34-aaea-3ee4af6516a1"));
    buf.extend_from_slice(&[0x04, 0x06, 0x14, 0x00]);
    buf.extend_from_slice(&uuid_to_bytes("462caa21-7614-4503-836e-8ab6f4662331"));
    buf.extend_from_slice(&[0x7F, 0xFF, 0x04, 0x00]);
    buf
}

fn action_event(name: &'static str, register: u8, text: &str) -> TdEvent {
    event(name, "EV_EFI_ACTION", register, no_metadata(), text.as_bytes())
}

/// Produce the fixed, ordered event list for a reproduction run. Mutates
/// `td.kernel` in place (the kernel-header patch must run
/// before the kernel bytes are hashed).
pub fn generate_events(td: &mut TrustDomain) -> Result<Vec<TdEvent>, MeasureError> {
    let mut events = Vec::new();

    let hob_preimage = build_hob_preimage(&td.firmware.sections, td.total_memory_bytes)?;
    events.push(event(
        "HOB",
        "EV_EFI_HANDOFF_TABLES2",
        0,
        no_metadata(),
        &hob_preimage,
    ));

    for section in &td.firmware.sections {
        if section.section_type != "CFV" {
            continue;
        }
        let start = section.raw_offset as usize;
        let end = start + section.raw_size as usize;
        let blob = td
            .firmware
            .bytes
            .get(start..end)
            .ok_or_else(|| MeasureError::FirmwareDecode("CFV section extends past firmware image".into()))?;
        events.push(event(
            "CFV blob",
            "EV_EFI_PLATFORM_FIRMWARE_BLOB2",
            0,
            no_metadata(),
            blob,
        ));
    }

    for (name, guid) in EMPTY_VARIABLES {
        events.push(event(
            name,
            "EV_EFI_VARIABLE_DRIVER_CONFIG",
            0,
            no_metadata(),
            &empty_variable_preimage(name, guid),
        ));
    }

    events.push(event("Separator", "EV_SEPARATOR", 0, no_metadata(), &[0u8; 4]));

    let acpi_tables = parse_acpi_tables(&td.acpi_tables);
    let table_loader_preimage = build_table_loader_preimage(&acpi_tables);
    events.push(event(
        "QEMU ACPI table loader",
        "EV_PLATFORM_CONFIG_FLAGS",
        0,
        file_metadata("etc/table-loader"),
        &table_loader_preimage,
    ));

    let rsdp_preimage = build_rsdp_preimage(&acpi_tables);
    events.push(event(
        "RSDP",
        "EV_PLATFORM_CONFIG_FLAGS",
        0,
        file_metadata("etc/acpi/rsdp"),
        &rsdp_preimage,
    ));

    events.push(event(
        "ACPI tables",
        "EV_PLATFORM_CONFIG_FLAGS",
        0,
        file_metadata("etc/acpi/tables"),
        &td.acpi_tables,
    ));

    patch_kernel_header(
        &mut td.kernel,
        td.total_memory_bytes,
        td.cmdline.as_deref().unwrap_or(""),
        td.initrd.as_deref(),
    )?;

    let kernel_pe = parse_pe(&td.kernel)?;
    let is_uki = kernel_pe.section_body(".linux").is_some();
    let kernel_name = if is_uki {
        "Linux unified kernel image"
    } else {
        "Linux kernel"
    };
    events.push(event(
        kernel_name,
        "EV_EFI_BOOT_SERVICES_APPLICATION",
        1,
        no_metadata(),
        &authenticode_preimage(&kernel_pe, &td.kernel)?,
    ));

    events.push(event("BootOrder", "EV_EFI_VARIABLE_BOOT", 0, no_metadata(), &[0u8; 2]));
    events.push(event(
        "Boot0000",
        "EV_EFI_VARIABLE_BOOT",
        0,
        no_metadata(),
        &ui_app_boot_option(),
    ));

    events.push(action_event(
        "EFI action",
        1,
        "Calling EFI Application from Boot Option",
    ));
    events.push(event("Separator", "EV_SEPARATOR", 0, no_metadata(), &[0u8; 4]));

    if is_uki {
        let linux_body = kernel_pe
            .section_body(".linux")
            .ok_or_else(|| MeasureError::PeDecode("UKI missing .linux section body".into()))?
            .to_vec();
        let linux_pe = parse_pe(&linux_body)?;
        events.push(event(
            "Linux kernel",
            "EV_EFI_BOOT_SERVICES_APPLICATION",
            1,
            no_metadata(),
            &authenticode_preimage(&linux_pe, &linux_body)?,
        ));
    }

    let (initrd, cmdline): (Option<Vec<u8>>, Option<String>) = if is_uki {
        let initrd = kernel_pe.section_body(".initrd").map(|b| b.to_vec());
        let cmdline = kernel_pe
            .section_body(".cmdline")
            .map(|b| String::from_utf8_lossy(b).trim_end_matches('\0').to_string());
        (initrd, cmdline)
    } else {
        let cmdline = td.cmdline.clone().map(|c| {
            if td.initrd.is_some() {
                format!("{c} initrd=initrd")
            } else {
                c
            }
        });
        (td.initrd.clone(), cmdline)
    };

    if let Some(cmdline) = &cmdline {
        let preimage = utf16le(&format!("{cmdline}\0"));
        events.push(event("cmdline", "EV_EVENT_TAG", 2, no_metadata(), &preimage));
    }

    if let Some(initrd) = &initrd {
        events.push(event("initrd", "EV_EVENT_TAG", 2, no_metadata(), initrd));
    }

    events.push(action_event("EFI action", 1, "Exit Boot Services Invocation"));
    events.push(action_event(
        "EFI action",
        1,
        "Exit Boot Services Returned with Success",
    ));

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_variable_matches_s1() {
        // SecureBoot, 10 UTF-16 code units, under the security-database
        // owner GUID; preimage is guid(16) || len(8) || zeros(8) ||
        // utf16le(name) (10 * 2 = 20 bytes), 52 bytes total.
        let preimage = empty_variable_preimage("SecureBoot", SECURE_BOOT_VARIABLE_GUID);
        assert_eq!(preimage.len(), 52);
        assert_eq!(u64::from_le_bytes(preimage[16..24].try_into().unwrap()), 10);
        assert_eq!(&preimage[0..16], &uuid_to_bytes(SECURE_BOOT_VARIABLE_GUID));
        assert_eq!(&preimage[24..32], &[0u8; 8]);
        assert_eq!(&preimage[32..52], &utf16le("SecureBoot")[..]);
    }

    #[test]
    fn separator_digest_matches_s2() {
        let digest = sha384(&[0u8; 4]);
        let ev = event("Separator", "EV_SEPARATOR", 0, no_metadata(), &[0u8; 4]);
        assert_eq!(ev.digest, digest);
    }

    #[test]
    fn action_digests_match_s3() {
        let ev1 = action_event("EFI action", 1, "Calling EFI Application from Boot Option");
        let ev2 = action_event("EFI action", 1, "Exit Boot Services Invocation");
        let ev3 = action_event("EFI action", 1, "Exit Boot Services Returned with Success");
        assert_eq!(
            ev1.digest,
            sha384(b"Calling EFI Application from Boot Option")
        );
        assert_eq!(ev2.digest, sha384(b"Exit Boot Services Invocation"));
        assert_eq!(
            ev3.digest,
            sha384(b"Exit Boot Services Returned with Success")
        );
    }

    #[test]
    fn ui_app_block_has_expected_prefix_and_length() {
        let block = ui_app_boot_option();
        assert_eq!(&block[0..6], &[0x09, 0x01, 0x00, 0x00, 0x2C, 0x00]);
        // 6 + utf16le("UiApp\0") (12 bytes) + 4 + 16 + 4 + 16 + 4 = 62
        assert_eq!(block.len(), 6 + 12 + 4 + 16 + 4 + 16 + 4);
    }
}
