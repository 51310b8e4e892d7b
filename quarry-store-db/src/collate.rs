use std::cmp::Ordering;

/// Compares two cleaned absolute paths, ordering the path separator
/// below every other byte.
///
/// Plain string order would sort `/r.d` before `/r/x`, interleaving
/// the children of `/r` with its siblings. With the separator lowest,
/// a directory's subtree sorts as one contiguous block, which is
/// exactly the order archive serialization needs.
pub fn collate_paths(a: &str, b: &str) -> Ordering {
    for (x, y) in a.bytes().zip(b.bytes()) {
        match (x == b'/', y == b'/') {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {
                if x != y {
                    return x.cmp(&y);
                }
            }
        }
    }
    a.len().cmp(&b.len())
}
