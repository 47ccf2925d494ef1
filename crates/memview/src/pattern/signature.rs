//! Wildcard byte signatures: text grammar, compiler, and the JSON catalog
//! format.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// A labeled run of captured bytes inside a compiled signature.
///
/// `offset` is the byte position immediately after the group's closing
/// marker, so `match_address + offset` is the natural next-instruction
/// coordinate for relative-displacement resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureGroup {
    pub start: usize,
    pub len: usize,
    pub offset: usize,
}

/// A compiled signature: one matcher slot per byte plus the capture groups
/// in signature order.
#[derive(Debug, Clone)]
pub struct Signature {
    tokens: Vec<Option<u8>>,
    groups: Vec<CaptureGroup>,
    text: String,
}

impl Signature {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub(crate) fn tokens(&self) -> &[Option<u8>] {
        &self.tokens
    }

    pub fn groups(&self) -> &[CaptureGroup] {
        &self.groups
    }

    /// The source text this signature was compiled from.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Compile signature text into a byte matcher.
///
/// Grammar: whitespace-separated tokens. `AA` matches that byte, `?` or `??`
/// matches any byte, and `*` toggles capture mode (standalone, or attached
/// as a token prefix/suffix). Every byte inside capture mode is matched
/// unconstrained and reported as part of the group's span. A group still
/// open at the end of the signature closes there.
pub fn compile(text: &str) -> Result<Signature> {
    let mut tokens: Vec<Option<u8>> = Vec::new();
    let mut groups: Vec<CaptureGroup> = Vec::new();
    let mut open: Option<usize> = None;

    fn close(
        open: &mut Option<usize>,
        groups: &mut Vec<CaptureGroup>,
        end: usize,
        index: usize,
    ) -> Result<()> {
        let start = open.take().ok_or_else(|| Error::SignatureFormat {
            index,
            message: "unbalanced capture marker".to_string(),
        })?;
        let len = end - start;
        if len == 0 {
            return Err(Error::SignatureFormat {
                index,
                message: "empty capture group".to_string(),
            });
        }
        if len > 8 {
            return Err(Error::SignatureFormat {
                index,
                message: format!("capture group of {len} bytes exceeds 8"),
            });
        }
        groups.push(CaptureGroup {
            start,
            len,
            offset: end,
        });
        Ok(())
    }

    let mut index = 0;
    for raw in text.split_whitespace() {
        if raw == "*" {
            match open {
                Some(_) => close(&mut open, &mut groups, tokens.len(), index)?,
                None => open = Some(tokens.len()),
            }
            index += 1;
            continue;
        }

        let (leading, rest) = match raw.strip_prefix('*') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let (trailing, core) = match rest.strip_suffix('*') {
            Some(core) => (true, core),
            None => (false, rest),
        };
        if core.contains('*') || core.is_empty() {
            return Err(Error::SignatureFormat {
                index,
                message: format!("malformed token '{raw}'"),
            });
        }

        if leading {
            if open.is_some() {
                return Err(Error::SignatureFormat {
                    index,
                    message: "capture group opened twice".to_string(),
                });
            }
            open = Some(tokens.len());
        }

        if core == "?" || core == "??" {
            tokens.push(None);
        } else {
            let value = u8::from_str_radix(core, 16).map_err(|e| Error::SignatureFormat {
                index,
                message: format!("invalid byte token '{core}': {e}"),
            })?;
            // Captured bytes are unconstrained; the literal only documents
            // the expected encoding.
            tokens.push(if open.is_some() { None } else { Some(value) });
        }

        if trailing {
            close(&mut open, &mut groups, tokens.len(), index)?;
        }
        index += 1;
    }

    if open.is_some() {
        close(&mut open, &mut groups, tokens.len(), index)?;
    }
    if tokens.is_empty() {
        return Err(Error::SignatureFormat {
            index: 0,
            message: "empty signature".to_string(),
        });
    }

    Ok(Signature {
        tokens,
        groups,
        text: text.to_string(),
    })
}

/// One named signature in a catalog. `group` selects which capture group
/// carries the displacement; `addend` is applied after resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureEntry {
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub group: usize,
    #[serde(default)]
    pub addend: i64,
}

impl SignatureEntry {
    pub fn compile(&self) -> Result<Signature> {
        compile(&self.pattern)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureSet {
    pub version: String,
    pub entries: Vec<SignatureEntry>,
}

impl SignatureSet {
    pub fn entry(&self, name: &str) -> Option<&SignatureEntry> {
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
    }
}

pub fn load_signatures<P: AsRef<Path>>(path: P) -> Result<SignatureSet> {
    let content = fs::read_to_string(&path)?;
    let data = serde_json::from_str(&content)?;
    Ok(data)
}

pub fn save_signatures<P: AsRef<Path>>(path: P, signatures: &SignatureSet) -> Result<()> {
    let content = serde_json::to_string_pretty(signatures)?;
    fs::write(path, content)?;
    Ok(())
}
