//! QEMU kernel boot-protocol header patcher.
//!
//! Mirrors QEMU's `x86_load_linux`: mutates the Linux boot-protocol header
//! fields that depend on guest RAM size and command-line placement, in
//! place, on a uniquely-owned kernel buffer.

use super::error::MeasureError;

const BOOT_MAGIC: u32 = 0x5372_6448; // "HdrS"
const SETUP_MAGIC_OFFSET: usize = 0x202;
const PROTOCOL_VERSION_OFFSET: usize = 0x206;
const LOADFLAGS_OFFSET: usize = 0x211;

const LOADFLAGS_LOADED_HIGH: u8 = 0xB0;
const LOADFLAGS_CAN_USE_HEAP: u8 = 0x80;

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn write_u16(buf: &mut [u8], at: usize, v: u16) {
    buf[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

fn write_u32(buf: &mut [u8], at: usize, v: u32) {
    buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

fn boot_protocol(kernel: &[u8]) -> u16 {
    if kernel.len() < SETUP_MAGIC_OFFSET + 4 {
        return 0;
    }
    if read_u32(kernel, SETUP_MAGIC_OFFSET) != BOOT_MAGIC {
        return 0;
    }
    if kernel.len() < PROTOCOL_VERSION_OFFSET + 2 {
        return 0;
    }
    read_u16(kernel, PROTOCOL_VERSION_OFFSET)
}

/// Patch a kernel image's boot-protocol header in place, matching QEMU's
/// `x86_load_linux`. `cmdline` and `initrd` are the final payload the guest
/// will see (already resolved by the caller).
pub fn patch_kernel_header(
    kernel: &mut [u8],
    total_memory_bytes: u64,
    cmdline: &str,
    initrd: Option<&[u8]>,
) -> Result<(), MeasureError> {
    let protocol = boot_protocol(kernel);

    let cmdline_size = (cmdline.len() as u64 + 16) & !15u64;
    let lowmem: u64 = if total_memory_bytes >= 0xB000_0000 {
        0x8000_0000
    } else {
        0xB000_0000
    };
    let below_4g_mem_size = total_memory_bytes.min(lowmem);

    let (real_addr, cmdline_addr): (u32, u32) =
        if protocol < 0x202 || kernel.get(LOADFLAGS_OFFSET).copied().unwrap_or(0) & 1 == 0 {
            (0x9_0000, 0x9_A000 - cmdline_size as u32)
        } else {
            (0x1_0000, 0x2_0000)
        };

    let mut initrd_max: u64 = if protocol >= 0x20c && kernel.len() > 0x237 && read_u16(kernel, 0x236) & 2 != 0 {
        0xFFFF_FFFF
    } else if protocol >= 0x203 && kernel.len() >= 0x230 {
        read_u32(kernel, 0x22C) as u64
    } else {
        0x37FF_FFFF
    };
    initrd_max = initrd_max.min(below_4g_mem_size.saturating_sub(0x28000).saturating_sub(1));

    if protocol >= 0x202 {
        write_u32(kernel, 0x228, cmdline_addr);
    } else {
        write_u16(kernel, 0x20, 0xA33F);
        write_u16(kernel, 0x22, (cmdline_addr - real_addr) as u16);
    }

    if protocol >= 0x200 {
        kernel[0x210] = LOADFLAGS_LOADED_HIGH;
    }

    if protocol >= 0x201 {
        kernel[LOADFLAGS_OFFSET] |= LOADFLAGS_CAN_USE_HEAP;
        write_u16(kernel, 0x224, (cmdline_addr - real_addr - 0x200) as u16);
    }

    if let Some(initrd) = initrd {
        if protocol < 0x200 {
            return Err(MeasureError::KernelPatch(
                "initrd present but boot protocol predates 2.00".into(),
            ));
        }
        let initrd_len = initrd.len() as u64;
        if initrd_len >= initrd_max {
            return Err(MeasureError::KernelPatch(format!(
                "initrd size {initrd_len:#x} exceeds maximum {initrd_max:#x}"
            )));
        }
        let initrd_addr = (initrd_max - initrd_len) & !4095u64;
        write_u32(kernel, 0x218, initrd_addr as u32);
        write_u32(kernel, 0x21C, initrd_len as u32);
    }

    Ok(())
}
