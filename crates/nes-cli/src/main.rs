//! NES CLI - Headless runner for the NES emulator core

use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::info;
use nes_core::controller::{
    BUTTON_A, BUTTON_B, BUTTON_DOWN, BUTTON_LEFT, BUTTON_RIGHT, BUTTON_SELECT, BUTTON_START,
    BUTTON_UP,
};
use nes_core::ppu::{SCREEN_HEIGHT, SCREEN_WIDTH};
use nes_core::{NesConfig, NesError, NesSystem};
use thiserror::Error;

/// NES Emulator CLI
#[derive(Parser, Debug)]
#[command(name = "nes-cli")]
#[command(about = "Run an iNES ROM headless for a number of frames", long_about = None)]
struct Args {
    /// Path to the iNES ROM file (.nes, or a .zip holding one)
    #[arg(short, long)]
    rom: PathBuf,

    /// Number of frames to run
    #[arg(short, long, default_value = "60")]
    frames: u64,

    /// Dump CPU state after execution
    #[arg(short = 'c', long)]
    dump_cpu: bool,

    /// Dump PPU state after execution
    #[arg(short = 'p', long)]
    dump_ppu: bool,

    /// Buttons held on controller 1, e.g. "start,right" or "0x88"
    #[arg(short, long, value_parser = parse_buttons, default_value = "0")]
    buttons: u8,

    /// Audio sample rate in Hz
    #[arg(long, default_value_t = NesConfig::default().sample_rate)]
    sample_rate: u32,

    /// Write the last frame to this PNG file
    #[arg(short, long)]
    screenshot: Option<PathBuf>,
}

/// Errors that stop the runner
#[derive(Debug, Error)]
enum CliError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("bad zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("no .nes file in zip archive")]
    NoNesEntry,
    #[error(transparent)]
    Nes(#[from] NesError),
    #[error("failed to write screenshot: {0}")]
    Png(#[from] png::EncodingError),
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), CliError> {
    let rom_data = load_rom_file(&args.rom)?;

    let config = NesConfig {
        sample_rate: args.sample_rate,
        ..NesConfig::default()
    };
    let cartridge = nes_core::Cartridge::from_rom(&rom_data).map_err(NesError::from)?;
    let mut system = NesSystem::with_config(cartridge, config)?;
    system.set_controller(args.buttons);

    info!("running {} frames", args.frames);
    let audio_samples = run_frames(&mut system, args.frames)?;
    info!(
        "completed {} frames, {} audio samples",
        system.frame_count(),
        audio_samples
    );

    if args.dump_cpu {
        dump_cpu_state(&system);
    }

    if args.dump_ppu {
        dump_ppu_state(&system);
    }

    if let Some(path) = &args.screenshot {
        write_screenshot(path, system.frame_buffer())?;
        info!("wrote {}", path.display());
    }

    Ok(())
}

/// Run `frames` frames, draining audio after each one; returns the sample total
fn run_frames(system: &mut NesSystem, frames: u64) -> Result<usize, NesError> {
    let mut samples = 0;
    for _ in 0..frames {
        system.run_frame()?;
        samples += system.audio_samples().len();
        system.clear_audio_samples();
    }
    Ok(samples)
}

/// Read a ROM, unpacking it from a zip archive when the extension says so
fn load_rom_file(path: &Path) -> Result<Vec<u8>, CliError> {
    let io_error = |source| CliError::Io {
        path: path.to_path_buf(),
        source,
    };

    let is_zip = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
    if is_zip {
        let file = File::open(path).map_err(io_error)?;
        extract_nes(file)
    } else {
        fs::read(path).map_err(io_error)
    }
}

/// First `.nes` entry of a zip archive
fn extract_nes<R: Read + Seek>(reader: R) -> Result<Vec<u8>, CliError> {
    let mut archive = zip::ZipArchive::new(reader)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if !entry.name().to_ascii_lowercase().ends_with(".nes") {
            continue;
        }
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data).map_err(|source| CliError::Io {
            path: PathBuf::from(entry.name()),
            source,
        })?;
        info!("extracted {} ({} bytes)", entry.name(), data.len());
        return Ok(data);
    }
    Err(CliError::NoNesEntry)
}

/// Button list ("a,start") or a raw byte ("0x09", "9")
fn parse_buttons(s: &str) -> Result<u8, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u8::from_str_radix(hex, 16).map_err(|e| e.to_string());
    }
    if let Ok(value) = s.parse::<u8>() {
        return Ok(value);
    }

    s.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .try_fold(0u8, |buttons, name| {
            let bit = match name.to_ascii_lowercase().as_str() {
                "a" => BUTTON_A,
                "b" => BUTTON_B,
                "select" => BUTTON_SELECT,
                "start" => BUTTON_START,
                "up" => BUTTON_UP,
                "down" => BUTTON_DOWN,
                "left" => BUTTON_LEFT,
                "right" => BUTTON_RIGHT,
                other => return Err(format!("unknown button '{other}'")),
            };
            Ok(buttons | bit)
        })
}

fn frame_to_rgb(frame: &[u32]) -> Vec<u8> {
    frame
        .iter()
        .flat_map(|&px| [(px >> 16) as u8, (px >> 8) as u8, px as u8])
        .collect()
}

fn write_screenshot(path: &Path, frame: &[u32]) -> Result<(), CliError> {
    let file = File::create(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut encoder = png::Encoder::new(
        BufWriter::new(file),
        SCREEN_WIDTH as u32,
        SCREEN_HEIGHT as u32,
    );
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&frame_to_rgb(frame))?;
    Ok(())
}

fn dump_cpu_state(system: &NesSystem) {
    let cpu = system.cpu();
    let regs = cpu.registers();
    let status = cpu.status();

    println!("\nCPU State:");
    println!("  A:    ${:02X}", regs.a);
    println!("  X:    ${:02X}", regs.x);
    println!("  Y:    ${:02X}", regs.y);
    println!("  PC:   ${:04X}", regs.pc);
    println!("  SP:   ${:02X}", regs.sp);
    println!("  P:    ${:02X} ({})", cpu.p_register(), status);
    println!("  Cycles: {}", cpu.total_cycles());
}

fn dump_ppu_state(system: &NesSystem) {
    let ppu = system.ppu();

    println!("\nPPU State:");
    println!("  Scanline: {}", ppu.scanline());
    println!("  Dot: {}", ppu.dot());
    println!("  VBLANK: {}", ppu.status().vblank());
    println!("  CTRL: ${:02X}", ppu.control().bits());
    println!("  MASK: ${:02X}", ppu.mask().bits());
    println!("  V: ${:04X}  T: ${:04X}", ppu.vram_address(), ppu.temp_address());
    println!("  Odd frame: {}", ppu.odd_frame());
}
