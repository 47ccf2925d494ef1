//! Scan command implementation.

use std::fs;
use std::path::Path;

use anyhow::Result;
use memview::{compile, scan, Section};
use tracing::info;

use super::hex_utils::parse_hex_address;

/// Run the scan command
pub fn run(module: &Path, pattern: &str, base: &str) -> Result<()> {
    let base = parse_hex_address(base)?;
    let data = fs::read(module)?;
    info!("Loaded {} bytes from {:?}", data.len(), module);

    let signature = compile(pattern)?;
    let sections = [Section::new(".text", base, data)];
    let matches = scan(&signature, &sections);

    if matches.is_empty() {
        println!("No matches.");
        return Ok(());
    }

    println!("{} match(es) for \"{}\":", matches.len(), signature.text());
    for m in &matches {
        print!("  0x{:X}", m.address);
        for (i, capture) in m.captures.iter().enumerate() {
            print!("  [{}] {}", i, capture);
            if let Some(target) = m.displacement_target(&signature, i) {
                print!(" -> 0x{:X}", target);
            }
        }
        println!();
    }

    Ok(())
}
