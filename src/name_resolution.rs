// 🧩 Name Resolution - Cluster noisy executive names into one identity
//
// Scraped filings spell the same CEO differently across years:
//   "Richard Brandsma" (x3) + "Rick Brandsma" (x1) → "Richard Brandsma"
//
// Two names are linked when they share the first OR the last token
// (case-insensitive). Clusters are the connected components of that graph,
// so A–B and B–C put A, B, C together even when A and C share nothing.

use crate::entities::Institution;
use crate::error::AnalysisIssue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

// ============================================================================
// NAME CLUSTER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameCluster {
    /// Distinct raw names in first-seen order
    pub members: Vec<String>,

    /// Most frequent member (first-seen on ties)
    pub canonical: String,
}

// ============================================================================
// RESOLUTION RESULT
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NameResolution {
    /// Partition of the distinct raw names
    pub clusters: Vec<NameCluster>,

    /// raw name → canonical name (identity for singletons)
    pub mapping: HashMap<String, String>,

    /// Frequency ties settled by first-seen order
    pub ambiguities: Vec<AnalysisIssue>,
}

impl NameResolution {
    /// Canonical replacement for a raw name; unknown names pass through
    pub fn canonical_for<'a>(&'a self, raw: &'a str) -> &'a str {
        self.mapping.get(raw).map(String::as_str).unwrap_or(raw)
    }

    /// Clusters that actually merged more than one spelling
    pub fn merged_clusters(&self) -> impl Iterator<Item = &NameCluster> {
        self.clusters.iter().filter(|c| c.members.len() > 1)
    }
}

// ============================================================================
// NAME RESOLVER
// ============================================================================

pub struct NameResolver;

impl NameResolver {
    pub fn new() -> Self {
        NameResolver
    }

    /// Resolve raw names for ONE institution.
    ///
    /// `observed` holds every occurrence (one per record, chronological), so
    /// occurrence counts and first-seen order both come from it.
    pub fn resolve(&self, observed: &[&str]) -> NameResolution {
        let mut distinct: Vec<&str> = Vec::new();
        let mut counts: HashMap<&str, usize> = HashMap::new();

        for &name in observed {
            let count = counts.entry(name).or_insert(0);
            if *count == 0 {
                distinct.push(name);
            }
            *count += 1;
        }

        // Nothing to cluster
        if distinct.len() <= 1 {
            return identity_resolution(&distinct);
        }

        let keys: Vec<Option<(String, String)>> = distinct.iter().map(|n| name_key(n)).collect();
        let adjacency = build_adjacency(&keys);

        let mut resolution = NameResolution::default();

        for group in connected_components(&adjacency) {
            let members: Vec<String> = group.iter().map(|&i| distinct[i].to_string()).collect();

            if group.len() == 1 {
                resolution.mapping.insert(members[0].clone(), members[0].clone());
                resolution.clusters.push(NameCluster {
                    canonical: members[0].clone(),
                    members,
                });
                continue;
            }

            // group is sorted by first-seen index: first name at the top count wins
            let top = group.iter().map(|&i| counts[distinct[i]]).max().unwrap_or(0);
            let tied: Vec<&str> = group
                .iter()
                .map(|&i| distinct[i])
                .filter(|n| counts[n] == top)
                .collect();
            let canonical = tied[0].to_string();

            if tied.len() > 1 {
                let issue = AnalysisIssue::ResolutionAmbiguity {
                    candidates: tied.iter().map(|s| s.to_string()).collect(),
                    count: top,
                    chosen: canonical.clone(),
                };
                info!(note = %issue, "name tie settled by first-seen order");
                resolution.ambiguities.push(issue);
            }

            for member in &members {
                resolution.mapping.insert(member.clone(), canonical.clone());
            }
            debug!(canonical = %canonical, size = members.len(), "merged executive names");

            resolution.clusters.push(NameCluster { members, canonical });
        }

        resolution
    }

    /// Resolve an institution's executive names and write the canonical name
    /// onto every record. Records are put in chronological order first so
    /// first-seen tie-breaks do not depend on input row order.
    pub fn resolve_institution(&self, institution: &mut Institution) -> NameResolution {
        institution.sort_chronologically();

        let observed: Vec<&str> = institution
            .records
            .iter()
            .map(|r| r.raw_executive_name.as_str())
            .collect();
        let resolution = self.resolve(&observed);

        for record in institution.records.iter_mut() {
            record.canonical_executive_name = resolution
                .canonical_for(&record.raw_executive_name)
                .to_string();
        }

        resolution
    }
}

impl Default for NameResolver {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// GRAPH HELPERS
// ============================================================================

/// (first token, last token), lowercased. None for names without tokens.
fn name_key(name: &str) -> Option<(String, String)> {
    let mut tokens = name.split_whitespace();
    let first = tokens.next()?.to_lowercase();
    let last = tokens.last().map(|t| t.to_lowercase()).unwrap_or_else(|| first.clone());
    Some((first, last))
}

fn build_adjacency(keys: &[Option<(String, String)>]) -> Vec<Vec<usize>> {
    let mut adjacency = vec![Vec::new(); keys.len()];

    for i in 0..keys.len() {
        let Some((f1, l1)) = &keys[i] else { continue };
        for j in (i + 1)..keys.len() {
            let Some((f2, l2)) = &keys[j] else { continue };
            if f1 == f2 || l1 == l2 {
                adjacency[i].push(j);
                adjacency[j].push(i);
            }
        }
    }

    adjacency
}

/// Stack-based traversal; each component is returned sorted by index
fn connected_components(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut visited = vec![false; adjacency.len()];
    let mut components = Vec::new();

    for start in 0..adjacency.len() {
        if visited[start] {
            continue;
        }

        let mut stack = vec![start];
        let mut group = Vec::new();

        while let Some(current) = stack.pop() {
            if visited[current] {
                continue;
            }
            visited[current] = true;
            group.push(current);
            stack.extend(adjacency[current].iter().copied().filter(|&n| !visited[n]));
        }

        group.sort_unstable();
        components.push(group);
    }

    components
}

fn identity_resolution(distinct: &[&str]) -> NameResolution {
    NameResolution {
        clusters: distinct
            .iter()
            .map(|n| NameCluster {
                members: vec![n.to_string()],
                canonical: n.to_string(),
            })
            .collect(),
        mapping: distinct.iter().map(|n| (n.to_string(), n.to_string())).collect(),
        ambiguities: Vec::new(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
