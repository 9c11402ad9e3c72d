//! Patmos Simulator CLI.
//!
//! Loads a TOML configuration and a flat binary image, runs the
//! simulation loop until the program halts or a fatal error occurs, and
//! prints the statistics report. The process exit code is the simulated
//! program's exit code.

use clap::Parser;
use std::io::Write;
use std::{fs, process};

use patmos_sim::config::Config;
use patmos_sim::sim::{build_simulator, loader, DebugFmt};

/// Command-line arguments for the Patmos simulator.
#[derive(Parser, Debug)]
#[command(author, version, about = "Patmos Cycle-Accurate Simulator")]
struct Args {
    /// TOML configuration file; built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<String>,

    /// Flat binary image, loaded at address 0.
    #[arg(short, long)]
    file: String,

    /// Entry address (hex accepted with an 0x prefix).
    #[arg(short, long, default_value = "0x4")]
    entry: String,

    /// Symbol file of `<hex-address> <name>` lines.
    #[arg(short, long)]
    symbols: Option<String>,

    /// Debug format: short, default, trace, instructions, blocks, stack,
    /// all.
    #[arg(short, long, default_value = "none")]
    debug: String,

    /// Maximum number of cycles to simulate.
    #[arg(long)]
    max_cycles: Option<u64>,

    /// Print the statistics report after the run.
    #[arg(long)]
    stats: bool,
}

fn parse_address(s: &str) -> u32 {
    let s = s.trim_start_matches("0x");
    u32::from_str_radix(s, 16).unwrap_or(4)
}

fn main() {
    let args = Args::parse();

    let config: Config = match &args.config {
        Some(path) => {
            let content = fs::read_to_string(path).expect("Failed to read config");
            toml::from_str(&content).expect("Failed to parse config")
        }
        None => Config::default(),
    };

    let mut sim = build_simulator(&config);

    let image = loader::load_binary(&args.file).expect("Failed to read binary");
    loader::load_sections(sim.memory.as_mut(), &[(0, &image)]).expect("Failed to load image");

    if let Some(path) = &args.symbols {
        let content = fs::read_to_string(path).expect("Failed to read symbols");
        sim.symbols.parse(&content);
    }

    let entry = parse_address(&args.entry);
    let max_cycles = args.max_cycles.unwrap_or(config.general.max_cycles);
    let debug_fmt = if config.general.trace_instructions {
        DebugFmt::Instructions
    } else {
        DebugFmt::parse(&args.debug)
    };

    let mut out = std::io::stdout();
    let result = sim.run(entry, max_cycles, debug_fmt, &mut out);

    if args.stats {
        let _ = sim.print_stats(&mut out);
    }
    let _ = out.flush();

    match result {
        Ok(()) => {
            eprintln!("[!] Cycle limit reached at cycle {}", sim.cycle);
        }
        Err(fatal) => match fatal.exit_code() {
            Some(code) => {
                println!("\n[*] Exiting with code {}", code);
                process::exit(code as i32);
            }
            None => {
                eprintln!("\n[!] FATAL: {}", fatal);
                let _ = sim.print_registers(DebugFmt::Default, &mut std::io::stderr());
                process::exit(1);
            }
        },
    }
}
