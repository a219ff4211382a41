//! Immutable snapshot of the watched file plus its derived search structures.
//!
//! A snapshot is built once from raw bytes and never mutated after it is
//! published. Structures only some algorithms need (the sorted view, the
//! trie, the inverted index) are built lazily behind a once-guard, so
//! concurrent first readers collapse to a single build.

use memmap2::Mmap;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Trie (built on demand, cached on the snapshot)
// ---------------------------------------------------------------------------

/// Character trie over the snapshot's lines. A query matches only when the
/// walk ends on a node that closes a stored line.
#[derive(Default)]
pub struct TrieNode {
    children: HashMap<char, TrieNode>,
    terminal: bool,
}

impl TrieNode {
    fn insert(&mut self, line: &str) {
        let mut node = self;
        for ch in line.chars() {
            node = node.children.entry(ch).or_default();
        }
        node.terminal = true;
    }

    /// Walk the trie along `query`; prefixes of longer lines do not match.
    pub fn contains_line(&self, query: &str) -> bool {
        let mut node = self;
        for ch in query.chars() {
            match node.children.get(&ch) {
                Some(next) => node = next,
                None => return false,
            }
        }
        node.terminal
    }
}

// ---------------------------------------------------------------------------
// Inverted index (built on demand, cached on the snapshot)
// ---------------------------------------------------------------------------

/// Whitespace-token index mapping each token to the lines it occurs in.
/// Token hits are candidates only; callers verify whole-line equality.
pub struct InvertedIndex {
    postings: HashMap<String, Vec<usize>>,
}

impl InvertedIndex {
    fn build(lines: &[String]) -> Self {
        let mut postings: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, line) in lines.iter().enumerate() {
            for token in line.split_whitespace() {
                let entry = postings.entry(token.to_string()).or_default();
                if entry.last() != Some(&i) {
                    entry.push(i);
                }
            }
        }
        Self { postings }
    }

    /// Indices of the lines containing `token`; empty for unknown tokens.
    pub fn lines_with(&self, token: &str) -> &[usize] {
        self.postings.get(token).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// An immutable, self-consistent view of the watched file.
pub struct Snapshot {
    /// Trimmed lines in file order. Blank lines are dropped: the empty
    /// string is never a line and never a member.
    pub lines: Vec<String>,
    /// Set view of `lines` for O(1) average membership.
    pub members: HashSet<String>,
    sorted: OnceLock<Vec<String>>,
    trie: OnceLock<TrieNode>,
    inverted: OnceLock<InvertedIndex>,
}

impl Snapshot {
    /// Build a snapshot from raw file bytes (UTF-8 expected, decoded
    /// lossily). Empty input yields an empty snapshot, which matches
    /// nothing.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let raw = String::from_utf8_lossy(bytes);
        let lines: Vec<String> = raw
            .split('\n')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        let members = lines.iter().cloned().collect();
        Self {
            lines,
            members,
            sorted: OnceLock::new(),
            trie: OnceLock::new(),
            inverted: OnceLock::new(),
        }
    }

    /// Read `path` through a read-only memory map and build a snapshot.
    /// The map lives only for the duration of the read; the snapshot owns
    /// heap copies of everything it serves.
    pub fn load(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(Self::from_bytes(&[]));
        }
        // SAFETY: the map is read-only and dropped before this returns.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self::from_bytes(&map))
    }

    /// Whole-line membership against the set view.
    pub fn contains(&self, query: &str) -> bool {
        self.members.contains(query)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Ascending lexical view of `lines`, built on first use.
    pub fn sorted(&self) -> &[String] {
        self.sorted.get_or_init(|| {
            let mut view = self.lines.clone();
            view.sort_unstable();
            view
        })
    }

    /// Character trie over `lines`, built on first use.
    pub fn trie(&self) -> &TrieNode {
        self.trie.get_or_init(|| {
            let mut root = TrieNode::default();
            for line in &self.lines {
                root.insert(line);
            }
            root
        })
    }

    /// Token index over `lines`, built on first use.
    pub fn inverted(&self) -> &InvertedIndex {
        self.inverted.get_or_init(|| InvertedIndex::build(&self.lines))
    }
}
