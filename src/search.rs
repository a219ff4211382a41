//! The algorithm catalogue: named membership predicates over a [`Snapshot`].
//!
//! Every predicate answers the same question — does the query equal some
//! line of the snapshot — and must agree with the member set for every
//! input. The ordered variants consult the snapshot's lazily built sorted
//! view; `trie` and `inverted_index` consult their own cached structures.
//! Predicates are pure: no I/O, no hidden state.

use crate::snapshot::Snapshot;
use std::cmp::Ordering;
use thiserror::Error;

/// A pure whole-line membership test.
pub type Predicate = fn(&Snapshot, &str) -> bool;

#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("catalogue descriptor does not list the 'default' algorithm")]
    MissingDefault,
    #[error("catalogue descriptor names unknown algorithm '{0}'")]
    Unknown(String),
}

// ---------------------------------------------------------------------------
// Catalogue
// ---------------------------------------------------------------------------

/// Named family of predicates. The descriptor order defines the index used
/// by the metrics sink.
pub struct Catalogue {
    names: Vec<String>,
    predicates: Vec<Predicate>,
    default_index: usize,
}

impl Catalogue {
    /// Build a catalogue in descriptor order, validating that every name
    /// resolves to a compiled-in predicate and that `default` is present.
    pub fn new(names: Vec<String>) -> Result<Self, CatalogueError> {
        let mut predicates = Vec::with_capacity(names.len());
        for name in &names {
            predicates
                .push(predicate_for(name).ok_or_else(|| CatalogueError::Unknown(name.clone()))?);
        }
        let default_index = names
            .iter()
            .position(|n| n == "default")
            .ok_or(CatalogueError::MissingDefault)?;
        Ok(Self { names, predicates, default_index })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name_of(&self, index: usize) -> &str {
        &self.names[index]
    }

    /// Index of `name`, falling back to `default` for unknown names.
    pub fn resolve(&self, name: &str) -> usize {
        self.names.iter().position(|n| n == name).unwrap_or(self.default_index)
    }

    /// Index for a request, applying the fallback rule: an empty query or
    /// an unknown algorithm name selects the default predicate.
    pub fn select(&self, algorithm: &str, query: &str) -> usize {
        if query.trim().is_empty() {
            return self.default_index;
        }
        self.resolve(algorithm)
    }

    /// Run the predicate at `index`. The query is stripped of surrounding
    /// whitespace first; stored lines were stripped at snapshot build time.
    pub fn execute(&self, index: usize, snapshot: &Snapshot, query: &str) -> bool {
        (self.predicates[index])(snapshot, query.trim())
    }
}

/// Compiled predicate for a catalogue name.
pub fn predicate_for(name: &str) -> Option<Predicate> {
    Some(match name {
        "default" => default_search,
        "hash_table" => hash_table_search,
        "linear" => linear_search,
        "binary" => binary_search,
        "jump" => jump_search,
        "ternary" => ternary_search,
        "exponential" => exponential_search,
        "interpolation" => interpolation_search,
        "fibonacci" => fibonacci_search,
        "tim" => tim_search,
        "shell" => shell_search,
        "trie" => trie_search,
        "inverted_index" => inverted_index_search,
        "graph" => graph_search,
        _ => return None,
    })
}

// ---------------------------------------------------------------------------
// Set-backed predicates
// ---------------------------------------------------------------------------

/// Set membership against the snapshot's member set.
fn default_search(snapshot: &Snapshot, query: &str) -> bool {
    snapshot.contains(query)
}

/// Same lookup as `default`; addressable separately so the metrics sink
/// buckets it on its own index.
fn hash_table_search(snapshot: &Snapshot, query: &str) -> bool {
    snapshot.members.contains(query)
}

/// Scan the lines in file order for an exact match.
fn linear_search(snapshot: &Snapshot, query: &str) -> bool {
    snapshot.lines.iter().any(|line| line == query)
}

// ---------------------------------------------------------------------------
// Ordered-view predicates
// ---------------------------------------------------------------------------

/// Iterative binary search over the sorted view.
fn binary_search(snapshot: &Snapshot, query: &str) -> bool {
    let sorted = snapshot.sorted();
    let (mut left, mut right) = (0isize, sorted.len() as isize - 1);
    while left <= right {
        let mid = ((left + right) / 2) as usize;
        match sorted[mid].as_str().cmp(query) {
            Ordering::Equal => return true,
            Ordering::Less => left = mid as isize + 1,
            Ordering::Greater => right = mid as isize - 1,
        }
    }
    false
}

/// Binary search restricted to `[left, right]` of a sorted slice.
fn binary_between(sorted: &[String], query: &str, left: usize, right: usize) -> bool {
    let (mut left, mut right) = (left as isize, right as isize);
    while left <= right {
        let mid = ((left + right) / 2) as usize;
        match sorted[mid].as_str().cmp(query) {
            Ordering::Equal => return true,
            Ordering::Less => left = mid as isize + 1,
            Ordering::Greater => right = mid as isize - 1,
        }
    }
    false
}

/// Jump search: probe every ⌊√n⌋-th element, then scan the block.
fn jump_search(snapshot: &Snapshot, query: &str) -> bool {
    let sorted = snapshot.sorted();
    let n = sorted.len();
    if n == 0 {
        return false;
    }
    let step = ((n as f64).sqrt().floor() as usize).max(1);
    let mut prev = 0;
    let mut bound = step;
    while sorted[bound.min(n) - 1].as_str() < query {
        prev = bound;
        bound += step;
        if prev >= n {
            return false;
        }
    }
    sorted[prev..bound.min(n)].iter().any(|line| line == query)
}

/// Recursive three-way partition over the sorted view.
fn ternary_search(snapshot: &Snapshot, query: &str) -> bool {
    let sorted = snapshot.sorted();
    ternary_between(sorted, query, 0, sorted.len() as isize - 1)
}

fn ternary_between(sorted: &[String], query: &str, left: isize, right: isize) -> bool {
    if left > right {
        return false;
    }
    let third = (right - left) / 3;
    let mid1 = left + third;
    let mid2 = right - third;

    if sorted[mid1 as usize] == query || sorted[mid2 as usize] == query {
        return true;
    }
    if query < sorted[mid1 as usize].as_str() {
        ternary_between(sorted, query, left, mid1 - 1)
    } else if query > sorted[mid2 as usize].as_str() {
        ternary_between(sorted, query, mid2 + 1, right)
    } else {
        ternary_between(sorted, query, mid1 + 1, mid2 - 1)
    }
}

/// Exponential search: double the bound until it passes the query, then
/// binary search within the final range.
fn exponential_search(snapshot: &Snapshot, query: &str) -> bool {
    let sorted = snapshot.sorted();
    if sorted.is_empty() {
        return false;
    }
    if sorted[0] == query {
        return true;
    }
    let mut bound = 1;
    while bound < sorted.len() && sorted[bound].as_str() <= query {
        bound *= 2;
    }
    binary_between(sorted, query, bound / 2, bound.min(sorted.len() - 1))
}

/// Interpolation search: probe positions estimated from the numeric prefix
/// of the keys. Queries without a numeric prefix reduce to binary search.
fn interpolation_search(snapshot: &Snapshot, query: &str) -> bool {
    let sorted = snapshot.sorted();
    if sorted.is_empty() {
        return false;
    }
    let Some(query_key) = numeric_prefix(query) else {
        return binary_search(snapshot, query);
    };

    let (mut left, mut right) = (0usize, sorted.len() - 1);
    while left <= right {
        let pos = interpolate(sorted, query_key, left, right);
        match sorted[pos].as_str().cmp(query) {
            Ordering::Equal => return true,
            Ordering::Less => left = pos + 1,
            Ordering::Greater => {
                if pos == 0 {
                    return false;
                }
                right = pos - 1;
            }
        }
    }
    false
}

/// Probe index within `[left, right]`, proportional to where the query's
/// numeric key falls between the bounds' keys; midpoint when the bounds
/// carry no usable keys. The result always stays inside the range, so the
/// caller's narrowing terminates.
fn interpolate(sorted: &[String], query_key: u64, left: usize, right: usize) -> usize {
    match (numeric_prefix(&sorted[left]), numeric_prefix(&sorted[right])) {
        (Some(low), Some(high)) if high > low => {
            let clamped = query_key.clamp(low, high);
            let span = (right - left) as u128;
            left + ((u128::from(clamped - low) * span) / u128::from(high - low)) as usize
        }
        _ => left + (right - left) / 2,
    }
}

/// Leading decimal digits of `s` as a u64; `None` when absent or overlong.
fn numeric_prefix(s: &str) -> Option<u64> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    s[..end].parse().ok()
}

/// Fibonacci search: narrow the range by Fibonacci-number offsets.
fn fibonacci_search(snapshot: &Snapshot, query: &str) -> bool {
    let sorted = snapshot.sorted();
    let n = sorted.len();
    if n == 0 {
        return false;
    }

    // Smallest Fibonacci number >= n, tracking its two predecessors.
    let (mut fib2, mut fib1) = (0usize, 1usize);
    let mut fib = fib2 + fib1;
    while fib < n {
        fib2 = fib1;
        fib1 = fib;
        fib = fib2 + fib1;
    }

    let mut offset: isize = -1;
    while fib > 1 {
        let probe = (offset + fib2 as isize).min(n as isize - 1).max(0) as usize;
        match sorted[probe].as_str().cmp(query) {
            Ordering::Less => {
                fib = fib1;
                fib1 = fib2;
                fib2 = fib - fib1;
                offset = probe as isize;
            }
            Ordering::Greater => {
                fib = fib2;
                fib1 -= fib2;
                fib2 = fib - fib1;
            }
            Ordering::Equal => return true,
        }
    }

    fib1 == 1 && offset + 1 < n as isize && sorted[(offset + 1) as usize] == query
}

/// The sort is already done and cached on the snapshot; what remains of a
/// sort-then-search is the binary probe.
fn tim_search(snapshot: &Snapshot, query: &str) -> bool {
    let sorted = snapshot.sorted();
    if sorted.is_empty() {
        return false;
    }
    binary_between(sorted, query, 0, sorted.len() - 1)
}

/// Linear scan over the sorted view, stopping once past the query's rank.
/// Result-equivalent to shell-sorting a copy and scanning it.
fn shell_search(snapshot: &Snapshot, query: &str) -> bool {
    for line in snapshot.sorted() {
        match line.as_str().cmp(query) {
            Ordering::Equal => return true,
            Ordering::Greater => return false,
            Ordering::Less => {}
        }
    }
    false
}

/// Exponential-search variant over the sorted lines, presence only.
fn graph_search(snapshot: &Snapshot, query: &str) -> bool {
    let sorted = snapshot.sorted();
    if sorted.is_empty() {
        return false;
    }
    let mut bound = 1;
    while bound < sorted.len() && sorted[bound].as_str() <= query {
        bound *= 2;
    }
    binary_between(sorted, query, bound / 2, bound.min(sorted.len() - 1))
}

// ---------------------------------------------------------------------------
// Structure-backed predicates
// ---------------------------------------------------------------------------

/// Character walk through the snapshot's trie.
fn trie_search(snapshot: &Snapshot, query: &str) -> bool {
    snapshot.trie().contains_line(query)
}

/// Token-index lookup: the query's first token selects candidate lines,
/// each verified by whole-line equality so lines containing whitespace
/// still honour the membership contract.
fn inverted_index_search(snapshot: &Snapshot, query: &str) -> bool {
    let Some(first_token) = query.split_whitespace().next() else {
        return false;
    };
    snapshot
        .inverted()
        .lines_with(first_token)
        .iter()
        .any(|&i| snapshot.lines[i] == query)
}
