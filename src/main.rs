use clap::{Parser, Subcommand};
use pktframe::capture::Capture;
use pktframe::packet::{Endian, Limits, DEFAULT_MAX_CAPLEN};
use pktframe::pcap::{ReaderOptions, RecordSummary, DEFAULT_FILL_SIZE};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pktframe", about = "Inspect and rewrite pcap captures")]
struct Cli {
    /// Largest capture length accepted before a record is treated as corrupt
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_CAPLEN)]
    max_caplen: u32,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the file header
    Info {
        input: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// One line per record
    List {
        input: PathBuf,
        /// Show the first bytes of each payload in hex
        #[arg(long)]
        hex: bool,
    },
    /// Print dotted-path fields (e.g. IPv4.src) for every dissected record
    Get {
        input: PathBuf,
        #[arg(required = true, num_args = 1..)]
        paths: Vec<String>,
    },
    /// Decode every record and report how the capture ends
    Scan {
        input: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write a copy of the capture in the given byte order
    Rewrite {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// big or little
        #[arg(short, long, default_value = "little")]
        endian: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let options = ReaderOptions {
        fill_size: DEFAULT_FILL_SIZE,
        limits:    Limits { max_caplen: cli.max_caplen },
    };

    match cli.command {

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, json } => {
            let cap  = Capture::open_with(&input, options)?;
            let info = cap.info()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
                return Ok(());
            }
            println!("── pcap capture ─────────────────────────────────────────");
            println!("  Path           {}", info.path.display());
            println!("  Size           {} B", info.file_size);
            println!("  Byte order     {}", info.byte_order.name());
            println!("  Version        {}.{}", info.header.version_major, info.header.version_minor);
            println!("  Timezone       {}", info.header.thiszone);
            println!("  Sigfigs        {}", info.header.sigfigs);
            println!("  Snaplen        {}", info.header.snaplen);
            println!("  Link type      {}", info.header.linktype);
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, hex } => {
            let mut cap = Capture::open_with(&input, options)?;
            println!("{:>6} {:>10} {:<28} {:>7} {:>7}", "#", "Offset", "Timestamp", "Caplen", "Len");
            let mut index = 0u64;
            while let Some(rec) = cap.reader().next_record() {
                let Some(s) = RecordSummary::from_record(&rec) else { break };
                let preview = if hex {
                    let data = rec.bytes("data").unwrap_or(&[]);
                    format!("  {}", hex::encode(&data[..data.len().min(16)]))
                } else {
                    String::new()
                };
                println!("{:>6} {:>10} {:<28} {:>7} {:>7}{}",
                    index, s.offset, format_timestamp(&s), s.caplen, s.len, preview);
                index += 1;
            }
            report_stop(&cap);
        }

        // ── Get ──────────────────────────────────────────────────────────────
        Commands::Get { input, paths } => {
            let mut cap = Capture::open_with(&input, options)?;
            while let Some(rec) = cap.reader().dissect(None) {
                let id = rec.int("id").unwrap_or(0);
                for path in &paths {
                    match rec.print(path) {
                        Some(line) => println!("[{id}] {line}"),
                        None       => println!("[{id}] {path} = <absent>"),
                    }
                }
            }
            report_stop(&cap);
        }

        // ── Scan ─────────────────────────────────────────────────────────────
        Commands::Scan { input, json } => {
            let mut cap = Capture::open_with(&input, options)?;
            let report  = cap.scan()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.summary());
            }
        }

        // ── Rewrite ──────────────────────────────────────────────────────────
        Commands::Rewrite { input, output, endian } => {
            let endian = parse_endian(&endian);
            let mut cap = Capture::open_with(&input, options)?;
            let n = cap.rewrite(&output, endian)?;
            println!("Wrote {n} record(s), {}-endian → {}", endian.name(), output.display());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn format_timestamp(s: &RecordSummary) -> String {
    s.timestamp()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
        .unwrap_or_else(|| format!("{}.{:06}", s.ts_sec, s.ts_usec))
}

fn report_stop(cap: &Capture) {
    if let Some(reason) = cap.stop_reason().filter(|e| !e.is_exhausted()) {
        eprintln!("stopped early: {reason}");
    }
}

fn parse_endian(s: &str) -> Endian {
    Endian::from_name(s).unwrap_or_else(|| {
        eprintln!("Unknown byte order '{}', defaulting to little", s);
        Endian::Little
    })
}
