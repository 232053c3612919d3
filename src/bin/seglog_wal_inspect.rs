use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use clap::Parser;

use seglog::{Wal, WalError, WalObserver};

const EXIT_OK: i32 = 0;
const EXIT_TAIL_DAMAGE: i32 = 10;
const EXIT_FATAL: i32 = 20;

#[derive(Parser)]
#[command(name = "seglog-wal-inspect", about = "Inspect a seglog WAL directory")]
struct Cli {
    /// Path to the WAL directory
    dir: PathBuf,

    /// Only report entries with an index at or above this value
    #[arg(long, default_value_t = 0)]
    start: u64,

    /// Print every entry's index and payload size
    #[arg(long)]
    entries: bool,
}

/// Observer that reports lifecycle events on the terminal and counts
/// corruption so the exit code can reflect it.
struct InspectObserver {
    corruption_events: Arc<AtomicUsize>,
}

impl WalObserver for InspectObserver {
    fn on_open(&self, dir: &Path, segments: usize) {
        println!("directory: {}", dir.display());
        println!("segments: {}", segments);
    }

    fn on_corruption(&self, error: &WalError) {
        self.corruption_events.fetch_add(1, Ordering::Relaxed);
        eprintln!("corruption: {}", error);
    }
}

fn main() {
    let cli = Cli::parse();

    let corruption_events = Arc::new(AtomicUsize::new(0));
    let observer = InspectObserver {
        corruption_events: corruption_events.clone(),
    };

    let wal = match Wal::open_with_observer(&cli.dir, Box::new(observer)) {
        Ok(wal) => wal,
        Err(e) => {
            eprintln!("ERROR: failed to open {}: {}", cli.dir.display(), e);
            process::exit(EXIT_FATAL);
        }
    };

    let entries = match wal.read_all(cli.start) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("ERROR: replay failed: {}", e);
            process::exit(EXIT_FATAL);
        }
    };

    let payload_bytes: u64 = entries.iter().map(|e| e.payload.len() as u64).sum();
    println!("entries: {}", entries.len());
    if let (Some(first), Some(last)) = (entries.first(), entries.last()) {
        println!("index range: {}..={}", first.index, last.index);
    }
    println!("payload bytes: {}", payload_bytes);

    if cli.entries {
        for entry in &entries {
            println!("  {:>20}  {} bytes", entry.index, entry.payload.len());
        }
    }

    let _ = wal.close();
    if corruption_events.load(Ordering::Relaxed) > 0 {
        process::exit(EXIT_TAIL_DAMAGE);
    }
    process::exit(EXIT_OK);
}
