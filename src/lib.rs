//! Deterministic, off-platform reproduction of Intel TDX MRTD/RTMR launch
//! measurements.
//!
//! Given the same inputs a host would supply to a TDX-enabled hypervisor,
//! a firmware image, hardware configuration, and software payload, this
//! crate reproduces the exact 48-byte digests an honest QEMU/OVMF launch
//! would carry in its attestation quote, without access to real TDX
//! hardware.

pub mod measure;

pub use measure::{
    bytes_to_hex, bytes_to_uuid, parse_firmware, reproduce_mrtd, reproduce_rtmr, uuid_to_bytes,
    MeasureError, RtmrState, TdEvent, TdFirmware, TdxMetadataSection, TrustDomain,
};
