//! Pure path resolution: filesystem paths to (bucket, key) addresses.
//!
//! The first segment of a path names the bucket, the rest joins into the
//! object key. Parsing is total: any string maps to exactly one of mount
//! root, bucket root, or object position.

pub const SEPARATOR: char = '/';

/// Positional class of a parsed path. Exactly one holds per path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    MountRoot,
    BucketRoot,
    Object,
}

/// Resolved address of a path inside the store. Built fresh on every call,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub position: Position,
    pub bucket: String,
    pub key: String,
    pub original_path: String,
}

impl Address {
    pub fn is_mount_root(&self) -> bool {
        self.position == Position::MountRoot
    }

    pub fn is_bucket_root(&self) -> bool {
        self.position == Position::BucketRoot
    }
}

/// Split into cleaned segments: empty and `.` segments vanish, `..` pops.
fn clean_segments(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    for segment in path.split(SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }
    segments
}

/// Parse a path into its [`Address`]. Total: there is no failure mode.
pub fn parse(path: &str) -> Address {
    let segments = clean_segments(path);
    match segments.split_first() {
        None => Address {
            position: Position::MountRoot,
            bucket: String::new(),
            key: String::new(),
            original_path: path.to_string(),
        },
        Some((bucket, rest)) => {
            let key = rest.join("/");
            Address {
                position: if key.is_empty() {
                    Position::BucketRoot
                } else {
                    Position::Object
                },
                bucket: (*bucket).to_string(),
                key,
                original_path: path.to_string(),
            }
        }
    }
}

/// First non-empty segment of a path.
pub fn most_parent_path(path: &str) -> &str {
    path.split(SEPARATOR)
        .find(|segment| !segment.is_empty())
        .unwrap_or("")
}

/// First segment of `path` after a leading `prefix`; empty when `prefix`
/// does not lead `path`.
pub fn next_parent_path<'a>(path: &'a str, prefix: &str) -> &'a str {
    match path.strip_prefix(prefix) {
        Some(rest) => most_parent_path(rest),
        None => "",
    }
}

/// Every ancestor prefix of a key, from the empty bucket-root prefix down
/// to the key itself. Drives cache invalidation fan-out.
pub fn dir_combination(key_path: &str) -> Vec<String> {
    let mut prefixes = vec![String::new()];
    let mut acc = String::new();
    for segment in key_path.split(SEPARATOR).filter(|s| !s.is_empty()) {
        if !acc.is_empty() {
            acc.push(SEPARATOR);
        }
        acc.push_str(segment);
        prefixes.push(acc.clone());
    }
    prefixes
}

/// True iff some key has `dest_path` as a segment-aligned prefix: equality
/// component by component, up to and including the whole of `dest_path`.
/// A bare string prefix is not enough — `aaa/11` must not pass against
/// `aaa/111/ccc`.
pub fn can_access<S: AsRef<str>>(keys: &[S], dest_path: &str) -> bool {
    let dest: Vec<&str> = dest_path
        .split(SEPARATOR)
        .filter(|s| !s.is_empty())
        .collect();
    if dest.is_empty() {
        return false;
    }
    keys.iter().any(|key| {
        let segments: Vec<&str> = key
            .as_ref()
            .split(SEPARATOR)
            .filter(|s| !s.is_empty())
            .collect();
        segments.len() >= dest.len() && segments[..dest.len()] == dest[..]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_positions() {
        let root = parse("");
        assert!(root.is_mount_root());
        assert_eq!(root.bucket, "");
        assert_eq!(root.key, "");

        assert!(parse(".").is_mount_root());

        let bucket = parse("mybucket");
        assert!(bucket.is_bucket_root());
        assert_eq!(bucket.bucket, "mybucket");
        assert_eq!(bucket.key, "");

        let object = parse("mybucket/a/b.txt");
        assert_eq!(object.position, Position::Object);
        assert_eq!(object.bucket, "mybucket");
        assert_eq!(object.key, "a/b.txt");
    }

    #[test]
    fn test_parse_cleans_redundant_segments() {
        let addr = parse("b//x/./y/../z");
        assert_eq!(addr.bucket, "b");
        assert_eq!(addr.key, "x/z");
    }

    #[test]
    fn test_parse_is_idempotent() {
        for path in ["", ".", "b", "b/k", "b/a/b/c.txt", "//b//k/"] {
            let first = parse(path);
            let second = parse(&first.original_path);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_most_parent_path() {
        assert_eq!(most_parent_path("/a1/a2/a3/a4.txt"), "a1");
        assert_eq!(most_parent_path("a1/a2"), "a1");
        assert_eq!(most_parent_path(""), "");
    }

    #[test]
    fn test_next_parent_path() {
        assert_eq!(next_parent_path("/a1/a2/a3/a4.txt", "/a1"), "a2");
        assert_eq!(next_parent_path("a/b/c", "a"), "b");
        assert_eq!(next_parent_path("a/b/c", "x"), "");
    }

    #[test]
    fn test_dir_combination() {
        assert_eq!(
            dir_combination("a/b/c"),
            vec!["".to_string(), "a".into(), "a/b".into(), "a/b/c".into()]
        );
        assert_eq!(dir_combination(""), vec!["".to_string()]);
    }

    #[test]
    fn test_can_access_requires_segment_alignment() {
        let keys = ["aaa/111/ccc", "aaa/222/ccc"];
        assert!(can_access(&keys, "aaa/111"));
        assert!(!can_access(&keys, "aaa/11"));
        assert!(!can_access(&["aaa/111/ccc"], "aaa/111/ddd"));
        assert!(can_access(&["aaa/111/ccc"], "aaa/111/ccc"));
        assert!(can_access(&["aaa/111/"], "aaa/111"));
    }
}
