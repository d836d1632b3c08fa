//! Bounded process names, padding-tolerant comparison and bucket hashing.
//!
//! Process names are held in a fixed-width, zero-padded buffer, the same
//! width the kernel uses for `comm`. Two names are considered the same when
//! they agree on their shared prefix and the longer one only carries padding
//! (NUL or a trailing line terminator) beyond it. Every name comparison in the
//! store and in the command grammar goes through [`compare_padded`].

use std::cmp::Ordering;
use std::fmt;

/// Width of the name buffer, terminator included.
pub const NAME_CAPACITY: usize = 16;

/// Maximum number of meaningful bytes in a [`ProcessName`].
pub const NAME_MAX_LEN: usize = NAME_CAPACITY - 1;

/// Modulus of the polynomial name hash.
pub const HASH_MODULUS: u64 = 1_000_000_007;

/// Number of leading bytes that contribute to the hash.
const HASH_WINDOW: usize = 16;

/// Result of a padded comparison.
///
/// `Unequal` is returned when the shared prefix matches but the longer input
/// carries non-padding bytes past it. It carries no direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddedOrdering {
    Equal,
    Less,
    Greater,
    Unequal,
}

impl PaddedOrdering {
    pub fn is_equal(self) -> bool {
        self == PaddedOrdering::Equal
    }
}

/// Bytes treated as padding past the end of a name.
#[inline]
pub fn is_padding(byte: u8) -> bool {
    matches!(byte, b'\0' | b'\n' | b'\r')
}

/// Cuts a byte string at its first NUL, like `strlen` would.
#[inline]
fn until_nul(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}

/// Compares two bounded strings, tolerating trailing padding on the longer one.
pub fn compare_padded(lhs: &[u8], rhs: &[u8]) -> PaddedOrdering {
    let lhs = until_nul(lhs);
    let rhs = until_nul(rhs);
    let shared = lhs.len().min(rhs.len());

    match lhs[..shared].cmp(&rhs[..shared]) {
        Ordering::Less => return PaddedOrdering::Less,
        Ordering::Greater => return PaddedOrdering::Greater,
        Ordering::Equal => {}
    }

    let longer = if lhs.len() >= rhs.len() { lhs } else { rhs };
    if longer[shared..].iter().all(|&b| is_padding(b)) {
        PaddedOrdering::Equal
    } else {
        PaddedOrdering::Unequal
    }
}

/// Base-256 polynomial hash over the first 16 meaningful bytes of a name.
///
/// Trailing padding bytes do not contribute, so padded-equal names always
/// land in the same bucket.
pub fn name_hash(name: &[u8]) -> u64 {
    let window = until_nul(&name[..name.len().min(HASH_WINDOW)]);
    let meaningful = match window.iter().rposition(|&b| !is_padding(b)) {
        Some(last) => &window[..=last],
        None => &[],
    };

    let mut sum = 0u64;
    let mut base = 1u64;
    for &byte in meaningful {
        sum = (sum + base * u64::from(byte)) % HASH_MODULUS;
        base = (base * 256) % HASH_MODULUS;
    }
    sum
}

/// Bucket a name is placed in for a table of `bucket_count` buckets.
pub fn bucket_index(name: &[u8], bucket_count: usize) -> usize {
    debug_assert!(bucket_count > 0);
    (name_hash(name) % bucket_count as u64) as usize
}

/// Process name stored in a fixed-width, zero-padded buffer.
///
/// Deliberately has no `PartialEq`: use [`ProcessName::matches`].
#[derive(Clone, Copy, Default)]
pub struct ProcessName {
    bytes: [u8; NAME_CAPACITY],
}

impl ProcessName {
    /// Builds a name from raw bytes, truncated to [`NAME_MAX_LEN`].
    ///
    /// The buffer starts zeroed, so no bytes from a previous name survive.
    pub fn new(raw: &[u8]) -> Self {
        let mut bytes = [0u8; NAME_CAPACITY];
        let raw = until_nul(raw);
        let len = raw.len().min(NAME_MAX_LEN);
        bytes[..len].copy_from_slice(&raw[..len]);
        Self { bytes }
    }

    /// Meaningful bytes, up to the first NUL.
    pub fn as_bytes(&self) -> &[u8] {
        until_nul(&self.bytes)
    }

    /// Full padded buffer.
    pub fn padded(&self) -> &[u8; NAME_CAPACITY] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes[0] == 0
    }

    pub fn compare(&self, other: &[u8]) -> PaddedOrdering {
        compare_padded(&self.bytes, other)
    }

    /// Padded equality against another name.
    pub fn matches(&self, other: &ProcessName) -> bool {
        compare_padded(&self.bytes, &other.bytes).is_equal()
    }

    pub fn hash(&self) -> u64 {
        name_hash(&self.bytes)
    }

    pub fn bucket(&self, bucket_count: usize) -> usize {
        bucket_index(&self.bytes, bucket_count)
    }
}

impl From<&str> for ProcessName {
    fn from(s: &str) -> Self {
        ProcessName::new(s.as_bytes())
    }
}

impl fmt::Display for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

impl fmt::Debug for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessName({:?})", String::from_utf8_lossy(self.as_bytes()))
    }
}
