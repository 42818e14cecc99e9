//! Connected-component clustering of candidate segments.
//!
//! Segments are linked when their angular similarity is at or above the
//! threshold. Each connected component with two or more members becomes a
//! numbered cluster; isolated segments are pooled into one singletons bucket.
//! Numbering is dense, starts at 0, and follows the order of each
//! component's smallest segment id, so identical input always yields
//! identical labels.

use crate::core::config::ThresholdKind;
use crate::core::error::Result;
use crate::indexing::corpus::CorpusIndex;
use crate::search::metric::pairwise_upper;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Display label for a bucket. Numbered clusters sort before singletons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClusterLabel {
    Numbered(usize),
    Singletons,
}

impl fmt::Display for ClusterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterLabel::Numbered(n) => write!(f, "{}", n),
            ClusterLabel::Singletons => f.write_str("Singletons"),
        }
    }
}

/// A clustered segment with its number of within-threshold neighbours
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterMember {
    pub id: String,
    pub degree: usize,
}

/// Buckets of clustered segments, ordered for display
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterAssignment {
    buckets: BTreeMap<ClusterLabel, Vec<ClusterMember>>,
}

impl ClusterAssignment {
    /// Buckets in display order: numbered clusters ascending, singletons last
    pub fn iter(&self) -> impl Iterator<Item = (ClusterLabel, &[ClusterMember])> {
        self.buckets.iter().map(|(label, members)| (*label, members.as_slice()))
    }

    pub fn get(&self, label: ClusterLabel) -> Option<&[ClusterMember]> {
        self.buckets.get(&label).map(Vec::as_slice)
    }

    /// Segments that have no neighbour within the threshold
    pub fn singletons(&self) -> &[ClusterMember] {
        self.get(ClusterLabel::Singletons).unwrap_or(&[])
    }

    /// Number of numbered (multi-member) clusters
    pub fn cluster_count(&self) -> usize {
        self.buckets
            .keys()
            .filter(|label| matches!(label, ClusterLabel::Numbered(_)))
            .count()
    }

    /// Number of buckets, including the singletons bucket if present
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Total number of clustered segments
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Bucket of every clustered segment, keyed by id
    pub fn labels(&self) -> HashMap<&str, ClusterLabel> {
        self.buckets
            .iter()
            .flat_map(|(label, members)| members.iter().map(move |m| (m.id.as_str(), *label)))
            .collect()
    }

    /// Every clustered segment id
    pub fn ids(&self) -> BTreeSet<String> {
        self.buckets
            .values()
            .flatten()
            .map(|m| m.id.clone())
            .collect()
    }
}

/// Partition `ids` into connected components under `threshold`
pub fn cluster(
    ids: &BTreeSet<String>,
    corpus: &CorpusIndex,
    threshold: f32,
) -> Result<ClusterAssignment> {
    let threshold = ThresholdKind::Cluster.validate(threshold)?;
    let rows = corpus.positions(ids)?;
    let n = rows.len();
    if n == 0 {
        return Ok(ClusterAssignment::default());
    }

    tracing::debug!(segments = n, "building pairwise similarity matrix");
    let upper = pairwise_upper(&rows, corpus);

    // Each upper-triangle edge counts toward both endpoints.
    let mut degrees = vec![0usize; n];
    let mut components = DisjointSet::new(n);
    for (i, row) in upper.iter().enumerate() {
        for (offset, &score) in row.iter().enumerate() {
            if score >= threshold {
                let j = i + 1 + offset;
                degrees[i] += 1;
                degrees[j] += 1;
                components.union(i, j);
            }
        }
    }

    // Component label = smallest member position; positions follow id order.
    let mut by_root: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..n {
        by_root.entry(components.find(i)).or_default().push(i);
    }

    let ordered_ids: Vec<&String> = ids.iter().collect();
    let member = |i: usize| ClusterMember {
        id: ordered_ids[i].clone(),
        degree: degrees[i],
    };

    let mut buckets: BTreeMap<ClusterLabel, Vec<ClusterMember>> = BTreeMap::new();
    let mut next_label = 0;
    for members in by_root.values() {
        if members.len() > 1 {
            buckets.insert(
                ClusterLabel::Numbered(next_label),
                members.iter().map(|&i| member(i)).collect(),
            );
            next_label += 1;
        } else {
            buckets
                .entry(ClusterLabel::Singletons)
                .or_default()
                .push(member(members[0]));
        }
    }

    let assignment = ClusterAssignment { buckets };
    tracing::info!(
        segments = n,
        clusters = assignment.cluster_count(),
        singletons = assignment.singletons().len(),
        threshold,
        "clustering complete"
    );
    Ok(assignment)
}

/// Union-find whose roots are always the smallest index in the set
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Path compression
        let mut node = i;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (low, high) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[high] = low;
        }
    }
}
