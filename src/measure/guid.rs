//! Mixed-endian UEFI GUID codec.
//!
//! UEFI GUIDs are stored on disk in a layout that does not match the
//! canonical `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` string order: the first
//! three fields are little-endian, the fourth is big-endian, and the final
//! six bytes are a big-endian byte string. Treated here as a bespoke 16-byte
//! codec rather than wrapped in a general-purpose UUID crate, per the wire
//! contract this format is part of.

/// A 16-byte mixed-endian UEFI GUID.
pub type Guid = [u8; 16];

/// Encode a canonical UUID string (`xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`)
/// into its 16-byte mixed-endian wire form.
///
/// Layout: `u32 LE | u16 LE | u16 LE | u16 BE | 6 bytes BE`.
pub fn uuid_to_bytes(uuid: &str) -> Guid {
    let hex: String = uuid.chars().filter(|c| *c != '-').collect();
    assert_eq!(hex.len(), 32, "malformed UUID string: {uuid}");

    let mut raw = [0u8; 16];
    for i in 0..16 {
        raw[i] = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).expect("invalid hex in UUID");
    }

    let mut out = [0u8; 16];
    // data1: u32, stored LE.
    out[0] = raw[3];
    out[1] = raw[2];
    out[2] = raw[1];
    out[3] = raw[0];
    // data2: u16, stored LE.
    out[4] = raw[5];
    out[5] = raw[4];
    // data3: u16, stored LE.
    out[6] = raw[7];
    out[7] = raw[6];
    // data4: u16, stored BE (byte order unchanged from canonical string).
    out[8] = raw[8];
    out[9] = raw[9];
    // data5: 6 bytes, stored BE (byte order unchanged).
    out[10..16].copy_from_slice(&raw[10..16]);
    out
}

/// Decode a 16-byte mixed-endian wire GUID back into its canonical UUID
/// string form. Inverse of [`uuid_to_bytes`].
pub fn bytes_to_uuid(bytes: &Guid) -> String {
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[3], bytes[2], bytes[1], bytes[0],
        bytes[5], bytes[4],
        bytes[7], bytes[6],
        bytes[8], bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_canonical_guids() {
        let guids = [
            "96b582de-1fb2-45f7-baea-a366c55a082d",
            "e47a6535-984a-4798-865e-4685a7bf8ec2",
            "e9eaf9f3-168e-44d5-a8eb-7f4d8738f6ae",
            "8be4df61-93ca-11d2-aa0d-00e098032b8c",
            "d719b2cb-3d3a-4596-a3bc-dad00e67656f",
            "7cb8bdc9-f8eb-4f34-aaea-3ee4af6516a1",
            "462caa21-7614-4503-836e-8ab6f4662331",
        ];
        for guid in guids {
            let bytes = uuid_to_bytes(guid);
            assert_eq!(bytes_to_uuid(&bytes), guid);
        }
    }

    #[test]
    fn known_mixed_endian_layout() {
        // 96b582de-1fb2-45f7-baea-a366c55a082d
        let bytes = uuid_to_bytes("96b582de-1fb2-45f7-baea-a366c55a082d");
        assert_eq!(&bytes[0..4], &[0xde, 0x82, 0xb5, 0x96]);
        assert_eq!(&bytes[4..6], &[0xb2, 0x1f]);
        assert_eq!(&bytes[6..8], &[0xf7, 0x45]);
        assert_eq!(&bytes[8..10], &[0xba, 0xea]);
        assert_eq!(&bytes[10..16], &[0xa3, 0x66, 0xc5, 0x5a, 0x08, 0x2d]);
    }
}
