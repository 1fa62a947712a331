//! TDX launch measurement reproduction.
//!
//! Reproduces, off-platform and deterministically, the two classes of
//! cryptographic measurements an Intel TDX virtual-machine launch produces:
//! the MRTD (build-time measurement of firmware pages) and the four RTMR
//! registers together with the event log firmware would emit during boot.
//! A caller supplies the same inputs the host would hand the hypervisor,
//! firmware image, hardware configuration, and software payload, and gets
//! back the 48-byte digests an honest QEMU/OVMF launch would produce.
//!
//! # Example
//!
//! ```ignore
//! let firmware = measure::parse_firmware(&ovmf_bytes)?;
//! let mrtd = measure::reproduce_mrtd(&firmware);
//!
//! let td = measure::TrustDomain {
//!     total_memory_bytes: 1024 * 1024 * 1024,
//!     acpi_tables,
//!     firmware,
//!     kernel,
//!     initrd: Some(initrd),
//!     cmdline: Some("console=ttyS0".to_string()),
//! };
//! let state = measure::reproduce_rtmr(td)?;
//! ```

mod acpi;
mod error;
mod eventlog;
mod firmware;
mod guid;
mod hob;
mod kernel;
mod mrtd;
mod pe;
mod rtmr;
mod util;

pub use error::MeasureError;
pub use eventlog::{TdEvent, TrustDomain};
pub use firmware::{TdFirmware, TdxMetadataSection};
pub use guid::{bytes_to_uuid, uuid_to_bytes, Guid};
pub use mrtd::reproduce_mrtd;
pub use rtmr::RtmrState;
pub use util::bytes_to_hex;

/// Fixed GUIDs and magic values the firmware and ACPI/event-log encoders
/// are keyed on. Collected here the way boot-layout constants are collected
/// in a dedicated module, for callers that want to recognize or construct
/// these values without depending on the private decoder internals.
pub mod layout {
    /// Footer GUID required at the last 16 bytes of a TDX firmware image.
    pub const FOOTER_GUID: &str = "96b582de-1fb2-45f7-baea-a366c55a082d";
    /// GUID of the table entry pointing at the TDX metadata table header.
    pub const METADATA_OFFSET_GUID: &str = "e47a6535-984a-4798-865e-4685a7bf8ec2";
    /// GUID of the TDX metadata table header itself.
    pub const METADATA_TABLE_GUID: &str = "e9eaf9f3-168e-44d5-a8eb-7f4d8738f6ae";
    /// ASCII signature of the metadata table header.
    pub const METADATA_SIGNATURE: &str = "TDVF";
}

/// Parse the TDX metadata table out of a firmware image.
pub fn parse_firmware(bytes: &[u8]) -> Result<TdFirmware, MeasureError> {
    firmware::parse_firmware(bytes)
}

/// Reproduce the four RTMR registers and the event log that produced them
/// for a given trust domain. Mutates `td.kernel` in place.
pub fn reproduce_rtmr(mut td: TrustDomain) -> Result<RtmrState, MeasureError> {
    let events = eventlog::generate_events(&mut td)?;
    Ok(rtmr::fold_rtmrs(events))
}
