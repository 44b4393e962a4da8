//! Text/binary classification.
//!
//! Known text extensions are trusted outright; anything else is decided by
//! sniffing a bounded prefix of the file.

use std::io::Read;
use std::path::Path;

use tracing::debug;

/// Bytes read when sniffing an unknown file.
const SNIFF_LEN: usize = 8192;

/// Extensions whose media type is `text/*`.
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "py", "pyi", "js", "mjs", "cjs", "html", "htm", "css", "csv",
    "tsv", "xml", "ics", "vtt", "c", "h", "cc", "cpp", "hpp", "java", "rs", "go", "rb", "pl",
    "tcl", "etx", "sgml", "sgm", "srt", "vcf",
];

/// Whether a file should be treated as text.
///
/// Unreadable files are binary.
pub fn is_text_file(path: &Path) -> bool {
    if has_text_extension(path) {
        return true;
    }
    match sniff(path) {
        Ok(prefix) => looks_like_text(&prefix),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "could not sniff file");
            false
        }
    }
}

fn has_text_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn sniff(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = std::fs::File::open(path)?;
    let mut prefix = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut prefix)?;
    Ok(prefix)
}

/// A prefix is text when it has no NUL byte and decodes as UTF-8.
///
/// A multi-byte character cut off by the prefix bound does not count as
/// a decoding failure.
pub fn looks_like_text(prefix: &[u8]) -> bool {
    if prefix.contains(&0) {
        return false;
    }
    match std::str::from_utf8(prefix) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}
