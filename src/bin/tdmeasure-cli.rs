//! Command-line front end for TDX measurement reproduction.

use clap::Parser;
use std::fs;
use std::process::ExitCode;

use tdmeasure::{bytes_to_hex, parse_firmware, reproduce_mrtd, reproduce_rtmr, TrustDomain};

#[derive(Parser, Debug)]
#[command(name = "tdmeasure-cli")]
#[command(about = "Reproduce Intel TDX MRTD/RTMR launch measurements off-platform")]
struct Args {
    /// Path to the TDX firmware image (e.g. OVMF.fd)
    #[arg(short, long)]
    firmware: String,

    /// Path to the raw ACPI table blob
    #[arg(short, long)]
    acpi: String,

    /// Path to the kernel image (bzImage or UKI)
    #[arg(short, long)]
    kernel: String,

    /// Path to the initrd image, if any
    #[arg(short, long)]
    initrd: Option<String>,

    /// Kernel command line override
    #[arg(short, long)]
    cmdline: Option<String>,

    /// Total guest memory in megabytes
    #[arg(short, long, default_value = "1024")]
    memory: u64,

    /// Skip RTMR/event-log reproduction and print only the MRTD digest
    #[arg(long)]
    mrtd_only: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("[CLI] error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("[CLI] firmware: {}", args.firmware);
    let firmware_bytes = fs::read(&args.firmware)?;
    let firmware = parse_firmware(&firmware_bytes)?;
    eprintln!("[Measure] parsed {} metadata sections", firmware.sections.len());

    let mrtd = reproduce_mrtd(&firmware);
    println!("MRTD  {}", bytes_to_hex(&mrtd));

    if args.mrtd_only {
        return Ok(());
    }

    eprintln!("[CLI] acpi: {}", args.acpi);
    let acpi_tables = fs::read(&args.acpi)?;

    eprintln!("[CLI] kernel: {}", args.kernel);
    let kernel = fs::read(&args.kernel)?;

    let initrd = args
        .initrd
        .as_ref()
        .map(|path| {
            eprintln!("[CLI] initrd: {path}");
            fs::read(path)
        })
        .transpose()?;

    let td = TrustDomain {
        total_memory_bytes: args.memory * 1024 * 1024,
        acpi_tables,
        firmware,
        kernel,
        initrd,
        cmdline: args.cmdline,
    };

    let state = reproduce_rtmr(td)?;
    eprintln!("[Measure] folded {} events", state.events.len());

    for (i, register) in state.registers.iter().enumerate() {
        println!("RTMR{i} {}", bytes_to_hex(register));
    }

    for event in &state.events {
        println!(
            "  [{}] {} ({}) {}",
            event.register,
            event.name,
            event.event_type,
            bytes_to_hex(&event.digest)
        );
    }

    Ok(())
}
