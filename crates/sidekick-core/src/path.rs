//! Registration key decomposition
//!
//! Splits a registration key into the directory segments between the keep
//! root and the leaf. Every segment produced here gets its TTL re-armed on
//! each refresh tick, so no ancestor directory expires while the leaf is
//! still alive.
//!
//! ```text
//! key       /app/group/sub/instance-1
//! keep root /app/
//!
//! segments  /app/group/                 (dir)
//!           /app/group/sub/             (dir)
//!           /app/group/sub/instance-1   (leaf)
//! ```

/// Path separator of the registry namespace
pub const SEPARATOR: char = '/';

/// One directory or leaf entry below the keep root
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathSegment {
    /// Accumulated absolute path of the entry
    pub path: String,
    /// Directory entries end with the separator; the leaf does not
    pub is_dir: bool,
}

impl PathSegment {
    fn new(path: String) -> Self {
        let is_dir = path.ends_with(SEPARATOR);
        Self { path, is_dir }
    }
}

/// Result of decomposing a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decomposition {
    /// The keep root actually used, always ending with the separator
    pub keep_root: String,
    /// Segments from the outermost directory down to the leaf
    pub segments: Vec<PathSegment>,
    /// True when the requested keep root was not an ancestor of the key and
    /// the namespace root was used instead
    pub fallback: bool,
}

impl Decomposition {
    /// The leaf segment, if any
    pub fn leaf(&self) -> Option<&PathSegment> {
        self.segments.last().filter(|segment| !segment.is_dir)
    }

    /// Only the directory segments
    pub fn directories(&self) -> impl Iterator<Item = &PathSegment> {
        self.segments.iter().filter(|segment| segment.is_dir)
    }
}

/// Derive the keep root for `full_key`
///
/// An empty `keep_root` means the parent directory of the key. The result
/// always ends with the separator.
pub fn resolve_keep_root(full_key: &str, keep_root: &str) -> String {
    let mut root = if keep_root.is_empty() {
        match full_key.rfind(SEPARATOR) {
            Some(idx) => full_key[..idx].to_string(),
            None => String::new(),
        }
    } else {
        keep_root.to_string()
    };

    if !root.ends_with(SEPARATOR) {
        root.push(SEPARATOR);
    }
    root
}

/// Decompose `full_key` into the segments between `keep_root` and the leaf
///
/// If `full_key` does not start with the (normalized) keep root, the
/// namespace root `/` is used as the boundary and every directory of the
/// key is produced.
///
/// Pure and cheap: callers re-derive it on every refresh tick.
pub fn decompose(full_key: &str, keep_root: &str) -> Decomposition {
    let requested = resolve_keep_root(full_key, keep_root);

    let (root, remainder, fallback) = match full_key.strip_prefix(requested.as_str()) {
        Some(rest) => (requested, rest, false),
        None => {
            let rest = full_key.strip_prefix(SEPARATOR).unwrap_or(full_key);
            (SEPARATOR.to_string(), rest, true)
        }
    };

    let mut current = root.clone();
    let segments = remainder
        .split_inclusive(SEPARATOR)
        .map(|piece| {
            current.push_str(piece);
            PathSegment::new(current.clone())
        })
        .collect();

    Decomposition {
        keep_root: root,
        segments,
        fallback,
    }
}
