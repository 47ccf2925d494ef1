//! Section scanning: run a compiled signature over module code bytes.

use memchr::memchr;
use tracing::debug;

use crate::error::Result;
use crate::pattern::signature::{Signature, SignatureEntry};

/// A mapped module section: raw bytes plus the virtual address they were
/// mapped at.
#[derive(Debug, Clone)]
pub struct Section {
    name: String,
    virtual_base: u64,
    data: Vec<u8>,
}

impl Section {
    pub fn new(name: impl Into<String>, virtual_base: u64, data: Vec<u8>) -> Self {
        Section {
            name: name.into(),
            virtual_base,
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn virtual_base(&self) -> u64 {
        self.virtual_base
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Only the conventional code section is scanned.
    pub fn is_code(&self) -> bool {
        self.name == ".text"
    }
}

/// One signature hit: the virtual address of the first matched byte plus the
/// capture values in signature order, each resolved as a little-endian
/// signed integer of the group's width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    pub address: u64,
    pub captures: Vec<i64>,
}

impl PatternMatch {
    /// Resolve capture `group` as a relative displacement: the address just
    /// past the group's closing marker plus the captured value.
    pub fn displacement_target(&self, signature: &Signature, group: usize) -> Option<u64> {
        let g = signature.groups().get(group)?;
        let disp = *self.captures.get(group)?;
        Some((self.address + g.offset as u64).wrapping_add_signed(disp))
    }
}

impl SignatureEntry {
    /// Compile this entry, scan the code sections, and resolve each match's
    /// configured capture group as a displacement, with the entry's addend
    /// applied. Matches whose group cannot be resolved are dropped.
    pub fn resolve(&self, sections: &[Section]) -> Result<Vec<u64>> {
        let signature = self.compile()?;
        Ok(scan(&signature, sections)
            .iter()
            .filter_map(|m| m.displacement_target(&signature, self.group))
            .map(|target| target.wrapping_add_signed(self.addend))
            .collect())
    }
}

/// Find every non-overlapping match of `signature` in the code sections.
/// Zero matches is a valid result.
pub fn scan(signature: &Signature, sections: &[Section]) -> Vec<PatternMatch> {
    let mut matches = Vec::new();
    for section in sections.iter().filter(|s| s.is_code()) {
        scan_section(signature, section, &mut matches);
    }
    debug!(
        signature = signature.text(),
        matches = matches.len(),
        "signature scan complete"
    );
    matches
}

fn scan_section(signature: &Signature, section: &Section, out: &mut Vec<PatternMatch>) {
    let tokens = signature.tokens();
    let data = section.data();
    if tokens.is_empty() || data.len() < tokens.len() {
        return;
    }

    // First literal byte, used as a memchr anchor. All-wildcard signatures
    // fall back to a plain walk.
    let anchor = tokens
        .iter()
        .enumerate()
        .find_map(|(i, t)| t.map(|b| (i, b)));

    let last = data.len() - tokens.len();
    let mut pos = 0;
    while pos <= last {
        let candidate = match anchor {
            Some((idx, byte)) => match memchr(byte, &data[pos + idx..]) {
                Some(found) => pos + found,
                None => return,
            },
            None => pos,
        };
        if candidate > last {
            return;
        }
        if matches_at(tokens, &data[candidate..]) {
            out.push(PatternMatch {
                address: section.virtual_base() + candidate as u64,
                captures: resolve_captures(signature, &data[candidate..candidate + tokens.len()]),
            });
            // Non-overlapping: resume past the whole match.
            pos = candidate + tokens.len();
        } else {
            pos = candidate + 1;
        }
    }
}

fn matches_at(tokens: &[Option<u8>], window: &[u8]) -> bool {
    tokens
        .iter()
        .zip(window)
        .all(|(token, byte)| match token {
            Some(value) => value == byte,
            None => true,
        })
}

fn resolve_captures(signature: &Signature, window: &[u8]) -> Vec<i64> {
    signature
        .groups()
        .iter()
        .map(|group| {
            let bytes = &window[group.start..group.start + group.len];
            let mut buf = [0u8; 8];
            buf[..bytes.len()].copy_from_slice(bytes);
            let raw = u64::from_le_bytes(buf);
            // Sign-extend from the group's width.
            let shift = 64 - group.len as u32 * 8;
            ((raw << shift) as i64) >> shift
        })
        .collect()
}
