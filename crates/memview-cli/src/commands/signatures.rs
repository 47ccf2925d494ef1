//! Signature catalog validation.

use std::path::Path;

use anyhow::Result;
use memview::load_signatures;

/// Run the signatures command
pub fn run(path: &Path, name: Option<&str>) -> Result<()> {
    let set = load_signatures(path)?;
    println!("Catalog version {} ({} entries)", set.version, set.entries.len());

    if let Some(name) = name {
        let entry = set
            .entry(name)
            .ok_or_else(|| anyhow::anyhow!("no entry named '{}'", name))?;
        let signature = entry.compile()?;
        println!(
            "{}: {} bytes, {} capture group(s)",
            entry.name,
            signature.len(),
            signature.groups().len()
        );
        return Ok(());
    }

    let mut bad = 0;
    for entry in &set.entries {
        match entry.compile() {
            Ok(signature) => println!(
                "  ok   {} ({} bytes, {} group(s))",
                entry.name,
                signature.len(),
                signature.groups().len()
            ),
            Err(e) => {
                bad += 1;
                println!("  FAIL {}: {}", entry.name, e);
            }
        }
    }
    if bad > 0 {
        anyhow::bail!("{} entries failed to compile", bad);
    }

    Ok(())
}
