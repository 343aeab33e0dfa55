//! Prefix-compression arithmetic: comparison, common-prefix computation,
//! and separator minimization.
//!
//! These are pure functions over `&[u8]`; the ancestor-walk that finds a
//! page's *bracket keys* (`find_common_prefix` in the original C) needs
//! cache access and lives in [`crate::tree::mutate`] instead.

use std::cmp::Ordering;

/// Unequal-length `memcmp`: the shorter string compares less when it is a
/// strict byte-prefix of the longer one; otherwise ordinary lexicographic
/// order decides. This is exactly `<[u8] as Ord>::cmp`, spelled out as its
/// own function because every comparison in this crate — prefix-relative
/// or not — must agree with it.
pub fn memncmp(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

/// Longest common byte sequence of `min` and `max`. Empty if either input
/// is empty (a page bordering the start or end of the keyspace has no
/// prefix to share with its missing bracket).
pub fn common_prefix(min: &[u8], max: &[u8]) -> Vec<u8> {
    if min.is_empty() || max.is_empty() {
        return Vec::new();
    }
    let n = min.iter().zip(max.iter()).take_while(|(a, b)| a == b).count();
    max[..n].to_vec()
}

/// Reassemble a page-relative suffix into its absolute key.
pub fn expand(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + suffix.len());
    out.extend_from_slice(prefix);
    out.extend_from_slice(suffix);
    out
}

/// Strip `prefix_len` leading bytes that are implied by a page's prefix.
/// `key` must be at least `prefix_len` bytes (callers only call this with
/// keys already known to carry the page's prefix).
pub fn remove_prefix(key: &[u8], prefix_len: usize) -> &[u8] {
    &key[prefix_len..]
}

/// Compare a full query key against a node's prefix-relative stored suffix.
///
/// `page_prefix` is the page's effective prefix (the common prefix shared
/// by every key under it); `node_suffix` is what's actually stored on the
/// page. If `query` is shorter than the
/// prefix it cannot reach any key stored under this prefix, so it always
/// compares less.
pub fn bt_cmp_query(query: &[u8], page_prefix: &[u8], node_suffix: &[u8]) -> Ordering {
    if query.len() < page_prefix.len() {
        return match memncmp(query, &page_prefix[..query.len()]) {
            Ordering::Equal => Ordering::Less,
            other => other,
        };
    }
    memncmp(&query[page_prefix.len()..], node_suffix)
}

/// Bayer–Unterauer separator minimization: given the last key of the left
/// half (`min`, absolute or prefix-relative as long as `sep` shares the
/// same frame) and a candidate separator `sep` known to already compare
/// greater than `min`, return the shortest prefix of `sep` that still
/// compares strictly greater than `min`.
pub fn reduce_separator(min: &[u8], sep: &[u8]) -> Vec<u8> {
    let n = min
        .iter()
        .zip(sep.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let take = (n + 1).min(sep.len());
    sep[..take].to_vec()
}
