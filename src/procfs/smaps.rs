//! Parser for `/proc/<pid>/smaps` memory-map reports.
//!
//! A report is a sequence of blocks. Each block starts with a header line describing one
//! mapping, followed by detail lines:
//!
//! ```text
//! 55d0c3a4e000-55d0c3a70000 r--p 00000000 fd:01 1835029                    /usr/bin/nginx
//! Size:                136 kB
//! KernelPageSize:        4 kB
//! Rss:                 136 kB
//! Pss:                  68 kB
//! ...
//! VmFlags: rd mr mw me dw sd
//! ```
//!
//! [`SmapsReader`] turns such a report into a lazy sequence of [`MemoryMapping`]
//! records. All recognized values are in `kB` and converted to bytes; labels that are
//! not recognized (`VmFlags`, `THPeligible`, `ProtectionKey`, ...) are ignored.
//!
//! See <https://docs.kernel.org/filesystems/proc.html> for the field descriptions.

use std::collections::HashMap;
use std::io::BufRead;
use std::iter::FusedIterator;
use std::num::ParseIntError;
use std::sync::LazyLock;

/// One mapping from a memory-map report. All sizes are in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemoryMapping {
    /// Backing path; empty for anonymous mappings.
    pub path: String,
    pub size_bytes: u64,
    pub kernel_page_size_bytes: u64,
    pub mmu_page_size_bytes: u64,
    pub rss_bytes: u64,
    pub pss_bytes: u64,
    pub pss_dirty_bytes: u64,
    pub shared_clean_bytes: u64,
    pub shared_dirty_bytes: u64,
    pub private_clean_bytes: u64,
    pub private_dirty_bytes: u64,
    pub referenced_bytes: u64,
    pub anonymous_bytes: u64,
    pub lazy_free_bytes: u64,
    pub anon_huge_pages_bytes: u64,
    pub shmem_pmd_mapped_bytes: u64,
    pub shared_hugetlb_bytes: u64,
    pub private_hugetlb_bytes: u64,
    pub swap_bytes: u64,
    pub swap_pss_bytes: u64,
    pub locked_bytes: u64,
}

impl MemoryMapping {
    fn anonymous_or(path: &str) -> Self {
        Self {
            path: path.to_owned(),
            ..Self::default()
        }
    }

    /// Folds another mapping of the same backing path into this one.
    ///
    /// Sizes are summed; page sizes are properties of the mapping rather than amounts,
    /// so the larger one is kept.
    pub fn merge(&mut self, other: &MemoryMapping) {
        self.size_bytes += other.size_bytes;
        self.kernel_page_size_bytes = self.kernel_page_size_bytes.max(other.kernel_page_size_bytes);
        self.mmu_page_size_bytes = self.mmu_page_size_bytes.max(other.mmu_page_size_bytes);
        self.rss_bytes += other.rss_bytes;
        self.pss_bytes += other.pss_bytes;
        self.pss_dirty_bytes += other.pss_dirty_bytes;
        self.shared_clean_bytes += other.shared_clean_bytes;
        self.shared_dirty_bytes += other.shared_dirty_bytes;
        self.private_clean_bytes += other.private_clean_bytes;
        self.private_dirty_bytes += other.private_dirty_bytes;
        self.referenced_bytes += other.referenced_bytes;
        self.anonymous_bytes += other.anonymous_bytes;
        self.lazy_free_bytes += other.lazy_free_bytes;
        self.anon_huge_pages_bytes += other.anon_huge_pages_bytes;
        self.shmem_pmd_mapped_bytes += other.shmem_pmd_mapped_bytes;
        self.shared_hugetlb_bytes += other.shared_hugetlb_bytes;
        self.private_hugetlb_bytes += other.private_hugetlb_bytes;
        self.swap_bytes += other.swap_bytes;
        self.swap_pss_bytes += other.swap_pss_bytes;
        self.locked_bytes += other.locked_bytes;
    }
}

type Setter = fn(&mut MemoryMapping, u64);

static SETTERS: LazyLock<HashMap<&'static str, Setter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, Setter> = HashMap::with_capacity(20);

    m.insert("Size", |m, v| m.size_bytes = v);
    m.insert("KernelPageSize", |m, v| m.kernel_page_size_bytes = v);
    m.insert("MMUPageSize", |m, v| m.mmu_page_size_bytes = v);
    m.insert("Rss", |m, v| m.rss_bytes = v);
    m.insert("Pss", |m, v| m.pss_bytes = v);
    m.insert("Pss_Dirty", |m, v| m.pss_dirty_bytes = v);
    m.insert("Shared_Clean", |m, v| m.shared_clean_bytes = v);
    m.insert("Shared_Dirty", |m, v| m.shared_dirty_bytes = v);
    m.insert("Private_Clean", |m, v| m.private_clean_bytes = v);
    m.insert("Private_Dirty", |m, v| m.private_dirty_bytes = v);
    m.insert("Referenced", |m, v| m.referenced_bytes = v);
    m.insert("Anonymous", |m, v| m.anonymous_bytes = v);
    m.insert("LazyFree", |m, v| m.lazy_free_bytes = v);
    m.insert("AnonHugePages", |m, v| m.anon_huge_pages_bytes = v);
    m.insert("ShmemPmdMapped", |m, v| m.shmem_pmd_mapped_bytes = v);
    m.insert("Shared_Hugetlb", |m, v| m.shared_hugetlb_bytes = v);
    m.insert("Private_Hugetlb", |m, v| m.private_hugetlb_bytes = v);
    m.insert("Swap", |m, v| m.swap_bytes = v);
    m.insert("SwapPss", |m, v| m.swap_pss_bytes = v);
    m.insert("Locked", |m, v| m.locked_bytes = v);

    m
});

#[derive(Debug, thiserror::Error)]
pub enum SmapsParseError {
    #[error("detail line {line} appears before any mapping header")]
    MissingHeader { line: usize },

    #[error("malformed mapping header at line {line}: '{content}'")]
    MalformedHeader { line: usize, content: String },

    #[error("malformed line {line}: '{content}'")]
    MalformedLine { line: usize, content: String },

    #[error("invalid value for '{label}' at line {line}: '{value}': {source}")]
    InvalidValue {
        label: String,
        value: String,
        line: usize,
        #[source]
        source: ParseIntError,
    },

    #[error("missing unit for '{label}' at line {line}")]
    MissingUnit { label: String, line: usize },

    #[error("unknown unit '{unit}' for '{label}' at line {line}")]
    UnknownUnit {
        label: String,
        unit: String,
        line: usize,
    },
}

impl From<SmapsParseError> for std::io::Error {
    fn from(err: SmapsParseError) -> Self {
        std::io::Error::new(std::io::ErrorKind::InvalidData, err)
    }
}

/// A lazy, single-pass iterator over the mappings of one memory-map report.
///
/// Backing paths are arbitrary bytes; invalid UTF-8 in a path is replaced with
/// `U+FFFD` rather than failing the report.
///
/// A mapping is yielded as soon as the header of the next mapping, or the end of the
/// input, is read. The first error (I/O or [`SmapsParseError`] wrapped in an
/// [`std::io::Error`] of kind `InvalidData`) is yielded once and ends the iteration.
///
/// # Example
///
/// ```
/// use container_resource_exporter::procfs::SmapsReader;
///
/// let report = "\
/// 7f0000000000-7f0000021000 rw-p 00000000 00:00 0
/// Rss:                  40 kB
/// ";
/// let mappings: Vec<_> = SmapsReader::new(report.as_bytes())
///     .collect::<std::io::Result<_>>()
///     .unwrap();
/// assert_eq!(mappings[0].rss_bytes, 40 * 1024);
/// assert_eq!(mappings[0].path, "");
/// ```
#[derive(Debug)]
pub struct SmapsReader<R> {
    reader: R,
    line: Vec<u8>,
    lineno: usize,
    pending: Option<MemoryMapping>,
    done: bool,
}

impl<R: BufRead> SmapsReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::with_capacity(256),
            lineno: 0,
            pending: None,
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for SmapsReader<R> {
    type Item = std::io::Result<MemoryMapping>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.line.clear();
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => {
                    self.done = true;
                    return self.pending.take().map(Ok);
                }
                Ok(_) => {}
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
            self.lineno += 1;

            let line = String::from_utf8_lossy(&self.line);
            match parse_line(&line, self.lineno, &mut self.pending) {
                Ok(Some(finished)) => return Some(Ok(finished)),
                Ok(None) => {}
                Err(err) => {
                    self.done = true;
                    return Some(Err(err.into()));
                }
            }
        }
    }
}

impl<R: BufRead> FusedIterator for SmapsReader<R> {}

/// Applies one line to the mapping being built.
///
/// Returns the previous mapping once a new header starts.
fn parse_line(
    line: &str,
    lineno: usize,
    pending: &mut Option<MemoryMapping>,
) -> Result<Option<MemoryMapping>, SmapsParseError> {
    let line = line.trim_end_matches(['\n', '\r']);
    if line.trim().is_empty() {
        return Ok(None);
    }

    if starts_with_address_range(line) {
        let path = parse_header_path(line).ok_or_else(|| SmapsParseError::MalformedHeader {
            line: lineno,
            content: line.to_owned(),
        })?;
        return Ok(pending.replace(MemoryMapping::anonymous_or(path)));
    }

    let Some(mapping) = pending.as_mut() else {
        return Err(SmapsParseError::MissingHeader { line: lineno });
    };
    let Some((label, rest)) = line.split_once(':') else {
        return Err(SmapsParseError::MalformedLine {
            line: lineno,
            content: line.to_owned(),
        });
    };
    let label = label.trim();
    let Some(setter) = SETTERS.get(label) else {
        return Ok(None);
    };

    let mut parts = rest.split_whitespace();
    let value = parts.next().unwrap_or_default();
    let kilobytes = value
        .parse::<u64>()
        .map_err(|source| SmapsParseError::InvalidValue {
            label: label.to_owned(),
            value: value.to_owned(),
            line: lineno,
            source,
        })?;
    match parts.next() {
        Some("kB") => setter(mapping, kilobytes.saturating_mul(1024)),
        Some(unit) => {
            return Err(SmapsParseError::UnknownUnit {
                label: label.to_owned(),
                unit: unit.to_owned(),
                line: lineno,
            });
        }
        None => {
            return Err(SmapsParseError::MissingUnit {
                label: label.to_owned(),
                line: lineno,
            });
        }
    }

    Ok(None)
}

/// Returns `true` if the line starts with a `<hex>-<hex>` address range.
fn starts_with_address_range(line: &str) -> bool {
    let first = line.split_whitespace().next().unwrap_or_default();
    match first.split_once('-') {
        Some((start, end)) => is_hex(start) && is_hex(end),
        None => false,
    }
}

#[inline]
fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Extracts the backing path of a header line, which may contain spaces.
///
/// Header layout: `<range> <perms> <offset> <dev> <inode> [path]`. Returns `None` if one
/// of the five leading fields is missing.
fn parse_header_path(line: &str) -> Option<&str> {
    let mut rest = line;
    for _ in 0..5 {
        rest = rest.trim_start();
        if rest.is_empty() {
            return None;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        rest = &rest[end..];
    }
    Some(rest.trim())
}
