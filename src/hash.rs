//! Line hashing and block relocation.
//!
//! After unrelated edits shift a document's line numbers, a previously
//! parsed equation or callout can be re-anchored by matching its line-hash
//! sequence against the freshly hashed document, without a full
//! re-parse-and-tag-match. The hash is a fast order-sensitive 32-bit
//! FNV-1a variant; collisions are a correctness risk the caller accepts.

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 16_777_619;

/// Hashes one line of raw text, folding in four bytes at a time and then
/// the remainder.
pub fn line_hash(line: &str) -> u32 {
    let bytes = line.as_bytes();
    let mut hash = FNV_OFFSET;
    let mut chunks = bytes.chunks_exact(4);
    for chunk in &mut chunks {
        let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        hash ^= word;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    for &byte in chunks.remainder() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Hashes every line of a document in order.
pub fn hash_lines(text: &str) -> Vec<u32> {
    text.lines().map(line_hash).collect()
}

/// Finds the first occurrence of `needle` as a contiguous subsequence of
/// `haystack` in O(n + m) via Knuth-Morris-Pratt. Empty needles match at 0.
pub fn locate(needle: &[u32], haystack: &[u32]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }

    // Failure function: longest proper prefix of needle[..=i] that is also
    // a suffix.
    let mut failure = vec![0usize; needle.len()];
    let mut k = 0;
    for i in 1..needle.len() {
        while k > 0 && needle[k] != needle[i] {
            k = failure[k - 1];
        }
        if needle[k] == needle[i] {
            k += 1;
        }
        failure[i] = k;
    }

    let mut matched = 0;
    for (offset, &hash) in haystack.iter().enumerate() {
        while matched > 0 && needle[matched] != hash {
            matched = failure[matched - 1];
        }
        if needle[matched] == hash {
            matched += 1;
        }
        if matched == needle.len() {
            return Some(offset + 1 - needle.len());
        }
    }
    None
}

/// The recorded hash sequence of a known block, anchored at the line offset
/// it occupied when recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockFingerprint {
    pub line_offset: usize,
    pub hashes: Vec<u32>,
}

impl BlockFingerprint {
    /// Records the fingerprint of `text`'s lines `start..=end` (zero-based,
    /// inclusive, clamped to the document).
    pub fn record(text: &str, start: usize, end: usize) -> BlockFingerprint {
        let hashes = text
            .lines()
            .skip(start)
            .take(end.saturating_sub(start) + 1)
            .map(line_hash)
            .collect();
        BlockFingerprint {
            line_offset: start,
            hashes,
        }
    }

    /// Locates the block's new starting line inside `new_text`, or `None`
    /// if the exact line sequence no longer occurs.
    pub fn relocate(&self, new_text: &str) -> Option<usize> {
        locate(&self.hashes, &hash_lines(new_text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_order_sensitive() {
        assert_ne!(line_hash("ab"), line_hash("ba"));
        assert_ne!(line_hash("x = 1"), line_hash("x = 2"));
        assert_eq!(line_hash("same"), line_hash("same"));
    }

    #[test]
    fn test_remainder_bytes_contribute() {
        // Lengths 4 and 5 share a full chunk; the tail byte must matter.
        assert_ne!(line_hash("abcd"), line_hash("abcde"));
    }

    #[test]
    fn test_locate_finds_first_occurrence() {
        let haystack = [1, 2, 3, 2, 3, 4];
        assert_eq!(locate(&[2, 3], &haystack), Some(1));
        assert_eq!(locate(&[2, 3, 4], &haystack), Some(3));
        assert_eq!(locate(&[9], &haystack), None);
        assert_eq!(locate(&[], &haystack), Some(0));
    }

    #[test]
    fn test_locate_with_repeating_prefix() {
        // Exercises the failure-function fallback.
        let haystack = [1, 1, 1, 2, 1, 1, 2];
        assert_eq!(locate(&[1, 1, 2], &haystack), Some(1));
        assert_eq!(locate(&[1, 1, 1, 2], &haystack), Some(0));
    }

    /// Test: a block is found at its shifted position after edits above it.
    #[test]
    fn test_relocate_after_unrelated_edit() {
        let before = "intro\n$$\nE = mc^2\n$$\noutro";
        let fingerprint = BlockFingerprint::record(before, 1, 3);
        assert_eq!(fingerprint.line_offset, 1);

        let after = "intro\nnew paragraph\nmore text\n$$\nE = mc^2\n$$\noutro";
        assert_eq!(fingerprint.relocate(after), Some(3));
    }

    #[test]
    fn test_relocate_missing_block() {
        let before = "$$\nx\n$$";
        let fingerprint = BlockFingerprint::record(before, 0, 2);
        assert_eq!(fingerprint.relocate("completely different"), None);
    }
}
