use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "memview")]
#[command(about = "Signature scanning and memory inspection tools")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a module dump for a wildcard byte signature
    Scan {
        /// File holding the module's code bytes
        module: PathBuf,

        /// Signature text, e.g. "48 8B 0D *?? ?? ?? ??*"
        pattern: String,

        /// Virtual address the dump was captured at
        #[arg(short, long, default_value = "0")]
        base: String,
    },

    /// Display file bytes in hexdump format
    Hexdump {
        module: PathBuf,

        /// Byte offset into the file
        #[arg(short, long, default_value = "0")]
        offset: String,

        /// Number of bytes to display
        #[arg(short, long, default_value_t = 256)]
        size: usize,

        /// Show the ASCII column
        #[arg(short, long)]
        ascii: bool,
    },

    /// Validate a JSON signature catalog
    Signatures {
        path: PathBuf,

        /// Check a single entry by name
        #[arg(short, long)]
        name: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("memview=info".parse()?))
        .init();

    let args = Args::parse();

    match args.command {
        Command::Scan {
            module,
            pattern,
            base,
        } => commands::scan::run(&module, &pattern, &base),
        Command::Hexdump {
            module,
            offset,
            size,
            ascii,
        } => commands::hexdump::run(&module, &offset, size, ascii),
        Command::Signatures { path, name } => commands::signatures::run(&path, name.as_deref()),
    }
}
