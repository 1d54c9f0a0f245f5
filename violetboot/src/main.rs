use anyhow::{Result, anyhow};
use bytesize::ByteSize;
use clap::{Parser, Subcommand};
use console::style;
use dialoguer::{Confirm, Select, theme::ColorfulTheme};
use indicatif::{ProgressBar, ProgressStyle};
use log::{LevelFilter, warn};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use violetboot_core::{BlockDevice, ErrorKind, FlashConfig, FlashEvent, Phase, Session};

#[derive(Parser)]
#[command(name = "violetboot")]
#[command(about = "Flash bootable images onto removable drives", version)]
struct Cli {
    /// Print debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an image to a removable device
    Write {
        /// Image file to write (.iso or .img)
        #[arg(required = true)]
        image: PathBuf,

        /// Target device; prompts for one if omitted
        #[arg(short, long)]
        device: Option<PathBuf>,

        /// Skip write verification
        #[arg(short = 'n', long = "no-verify")]
        no_verify: bool,

        /// Chunk size in MiB for reading, writing and verifying
        #[arg(short, long, env = "VIOLETBOOT_CHUNK_MIB", default_value_t = 16)]
        chunk_size: usize,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// List available removable devices
    List,
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

/// Presents an interactive menu for the user to select a device.
fn select_device(devices: &[BlockDevice], prompt: &str) -> Result<BlockDevice> {
    if devices.is_empty() {
        return Err(anyhow!("No removable devices found."));
    }

    let items: Vec<String> = devices.iter().map(|d| d.to_string()).collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .items(&items)
        .default(0)
        .interact()?;

    Ok(devices[selection].clone())
}

/// Presents a final "Yes/No" confirmation to the user.
fn confirm_operation(prompt: &str) -> Result<bool> {
    let confirmation = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()?;

    Ok(confirmation)
}

#[cfg(unix)]
fn warn_if_not_root() {
    // SAFETY: geteuid has no preconditions and cannot fail.
    if unsafe { libc::geteuid() } != 0 {
        warn!("Not running as root; opening the device will likely fail.");
    }
}

#[cfg(not(unix))]
fn warn_if_not_root() {}

/// Finds `path` among the devices the picker would offer.
fn listed_device<'a>(devices: &'a [BlockDevice], path: &Path) -> Option<&'a BlockDevice> {
    devices.iter().find(|d| d.path == path)
}

fn warn_if_not_listed(path: &Path) {
    warn!(
        "{} is not a listed removable device; it may be a fixed or system disk.",
        path.display()
    );
}

fn phase_bar(len: u64, prefix: &'static str, color: &str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_prefix(prefix);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{prefix:12}} [{{elapsed_precise}}] [{{bar:40.{color}/black}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}})"
            ))
            .unwrap()
            .progress_chars("■ "),
    );
    bar
}

fn write(
    image: PathBuf,
    device: Option<PathBuf>,
    no_verify: bool,
    chunk_mib: usize,
    yes: bool,
) -> Result<()> {
    warn_if_not_root();

    let config = FlashConfig::new()
        .chunk_size(chunk_mib.saturating_mul(1024 * 1024))
        .verify(!no_verify);

    let (device_path, label) = match device {
        Some(path) => {
            let devices = violetboot_core::list_removable_devices();
            match listed_device(&devices, &path) {
                Some(device) => (path, device.display_label.clone()),
                None => {
                    warn_if_not_listed(&path);
                    let label = path.display().to_string();
                    (path, label)
                }
            }
        }
        None => {
            let devices = violetboot_core::list_removable_devices();
            let device = select_device(&devices, "Select the target device to WRITE to")?;
            (device.path.clone(), device.display_label)
        }
    };

    let session = Session::new(&image, &device_path, config)?;
    let image_len = session.source().size_bytes;

    println!(
        "{} This will erase all data on '{}'.",
        style("WARNING:").red().bold(),
        label,
    );
    println!("  Device: {}", style(device_path.display()).cyan());
    println!("  Image:  {}", style(image.display()).cyan());
    println!();

    if !yes && !confirm_operation("Are you sure you want to proceed?")? {
        println!("Write operation cancelled.");
        return Ok(());
    }

    println!();

    let write_pb = phase_bar(image_len, "Writing", "green");
    let verify_pb = if no_verify {
        ProgressBar::hidden()
    } else {
        phase_bar(image_len, "Verifying", "magenta")
    };

    let (tx, rx) = mpsc::channel();
    let worker = thread::spawn(move || session.with_events(tx).run());

    for event in rx {
        match event {
            FlashEvent::Status(Phase::Writing) => write_pb.reset_elapsed(),
            FlashEvent::Status(Phase::Verifying) => {
                write_pb.finish_with_message("Write complete.");
                verify_pb.reset_elapsed();
            }
            FlashEvent::Status(_) => {}
            FlashEvent::Progress(p) if p.phase == Phase::Writing => {
                write_pb.set_position(p.bytes_done)
            }
            FlashEvent::Progress(p) => verify_pb.set_position(p.bytes_done),
        }
    }

    let result = worker
        .join()
        .map_err(|_| anyhow!("Flash worker panicked"))?;

    match result {
        Ok(report) => {
            if report.verified {
                verify_pb.finish_with_message("Verification successful.");
            } else {
                write_pb.finish_with_message("Write complete (verification skipped).");
            }
            println!(
                "\n✨ Successfully flashed {} with {} in {:.1}s.",
                style(device_path.display()).cyan(),
                style(image.display()).cyan(),
                report.elapsed.as_secs_f64(),
            );
            if let Some(hash) = report.source_hash {
                println!("  SHA-256: {hash}");
            }
            Ok(())
        }
        Err(e) => {
            write_pb.abandon();
            verify_pb.abandon();
            let (headline, detail) = match e.kind() {
                ErrorKind::HashMismatch => (
                    "Verification failed.",
                    "The data on the device does not match the image.",
                ),
                ErrorKind::ReadIo => (
                    "Read-back failed.",
                    "The device could not be read back; it may have been removed.",
                ),
                _ => (
                    "Write failed.",
                    "The device may be unusable until it is written again.",
                ),
            };
            println!("\n❌ {} {detail}", style(headline).red().bold());
            Err(e.into())
        }
    }
}

fn list() {
    let devices = violetboot_core::list_removable_devices();
    if devices.is_empty() {
        println!("No removable devices found.");
        return;
    }

    println!("Found {} removable devices:", devices.len());
    println!(
        "\n  {:<14} {:<25} {:<10} {}",
        "DEVICE", "MODEL", "SIZE", "BUS"
    );
    println!("  {:-<14} {:-<25} {:-<10} {:-<6}", "", "", "", "");
    for device in devices {
        println!("{}", list_row(&device));
    }
}

fn list_row(device: &BlockDevice) -> String {
    format!(
        "  {:<14} {:<25} {:<10} {}",
        device.path.display(),
        device.model.as_deref().unwrap_or("USB"),
        ByteSize(device.size_bytes).to_string(),
        device.transport
    )
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Write {
            image,
            device,
            no_verify,
            chunk_size,
            yes,
        } => write(image, device, no_verify, chunk_size, yes)?,
        Commands::List => list(),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use violetboot_core::Transport;

    #[test]
    fn explicit_paths_are_matched_against_the_listing() {
        let devices = [BlockDevice::new(
            PathBuf::from("/dev/sdb"),
            "sdb".into(),
            None,
            8_000_000_000,
            Transport::Usb,
        )];
        assert!(listed_device(&devices, Path::new("/dev/sdb")).is_some());
        assert!(listed_device(&devices, Path::new("/dev/sda")).is_none());
        assert!(listed_device(&[], Path::new("/dev/sdb")).is_none());
    }

    #[test]
    fn list_rows_use_the_same_units_as_the_picker() {
        let device = BlockDevice::new(
            PathBuf::from("/dev/sdb"),
            "sdb".into(),
            Some("Cruzer Blade".into()),
            16_000_000_000,
            Transport::Usb,
        );
        let row = list_row(&device);
        assert!(row.contains("16.0 GB"));
        assert!(device.display_label.contains("16.0 GB"));
        assert!(row.trim_end().ends_with("usb"));
    }
}
