//! Hexdump command implementation.
//!
//! Displays file bytes in traditional hexdump format, useful for eyeballing
//! structure layouts in module dumps.
//!
//! # Output Format
//!
//! ```text
//! 0x000: 48 65 6C 6C 6F 20 57 6F  72 6C 64 00 00 00 00 00  |Hello World.....|
//! ```

use std::fs;
use std::path::Path;

use anyhow::Result;

use super::hex_utils::parse_hex_address;

/// Run the hexdump command
pub fn run(module: &Path, offset: &str, size: usize, ascii: bool) -> Result<()> {
    let offset = parse_hex_address(offset)? as usize;
    let data = fs::read(module)?;
    if offset >= data.len() {
        anyhow::bail!(
            "offset 0x{:X} past end of {} byte file",
            offset,
            data.len()
        );
    }
    let bytes = &data[offset..data.len().min(offset + size)];

    println!("Hexdump at 0x{:X} ({} bytes):", offset, bytes.len());
    println!();

    for (i, chunk) in bytes.chunks(16).enumerate() {
        print!("0x{:03X}: ", i * 16);

        for (j, byte) in chunk.iter().enumerate() {
            if j == 8 {
                print!(" ");
            }
            print!("{:02X} ", byte);
        }

        if chunk.len() < 16 {
            for j in chunk.len()..16 {
                if j == 8 {
                    print!(" ");
                }
                print!("   ");
            }
        }

        if ascii {
            print!(" |");
            for byte in chunk {
                if *byte >= 0x20 && *byte < 0x7F {
                    print!("{}", *byte as char);
                } else {
                    print!(".");
                }
            }
            for _ in chunk.len()..16 {
                print!(" ");
            }
            print!("|");
        }

        println!();
    }

    Ok(())
}
