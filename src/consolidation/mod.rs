/// Duplicate grouping.
///
/// The catalogue carries many near-identical listings of the same product.
/// Records are linked when their normalized names are close or their
/// compositions overlap almost entirely, and linked records are merged
/// transitively into groups with union-find:
/// 1. Identical normalized names / ingredient sets are linked directly.
/// 2. Remaining candidates are compared pairwise within blocks (shared name
///    prefix, shared smallest ingredient key), blocks in parallel.
/// 3. Each group elects the record with the most populated fields.
///
/// Groups are built once per catalogue generation and never change after.

pub mod similarity;

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use rayon::prelude::*;

use crate::catalogue::{Catalogue, MedicineId};
use crate::config::DedupConfig;
use similarity::{composition_similarity, ingredient_keys, name_similarity, normalize_name};

/// A set of equivalent records and the one shown for all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    /// Ascending record ids
    pub members: Vec<MedicineId>,
    pub representative_id: MedicineId,
}

impl DuplicateGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: MedicineId) -> bool {
        self.members.binary_search(&id).is_ok()
    }
}

/// Disjoint-set forest with path halving and union by size.
struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        let (big, small) = if self.size[ra] >= self.size[rb] { (ra, rb) } else { (rb, ra) };
        self.parent[small] = big;
        self.size[big] += self.size[small];
    }
}

/// Partition of the catalogue into duplicate groups.
#[derive(Debug, Clone)]
pub struct DuplicateGroups {
    groups: Vec<DuplicateGroup>,
    /// record id → index into `groups`
    group_index: Vec<usize>,
}

impl DuplicateGroups {
    /// Every record in its own group.
    pub fn singletons(catalogue: &Catalogue) -> Self {
        let groups = (0..catalogue.len())
            .map(|id| DuplicateGroup {
                members: vec![id],
                representative_id: id,
            })
            .collect();
        DuplicateGroups {
            groups,
            group_index: (0..catalogue.len()).collect(),
        }
    }

    pub fn build(catalogue: &Catalogue, config: &DedupConfig) -> Self {
        if !config.enabled {
            tracing::info!("Duplicate grouping disabled; every record is its own group");
            return Self::singletons(catalogue);
        }
        let start = Instant::now();
        let n = catalogue.len();
        let names: Vec<String> = catalogue.iter().map(|r| normalize_name(&r.name)).collect();
        let keys: Vec<Vec<String>> = catalogue.iter().map(|r| ingredient_keys(&r.composition)).collect();

        let mut uf = UnionFind::new(n);

        // Exact matches: link each record to the first record with the same signature.
        // The first holder then stands in for the whole signature in block comparisons.
        let mut name_heads: BTreeMap<&str, MedicineId> = BTreeMap::new();
        let mut key_heads: BTreeMap<&[String], MedicineId> = BTreeMap::new();
        for id in 0..n {
            if !names[id].is_empty() {
                let head = *name_heads.entry(names[id].as_str()).or_insert(id);
                uf.union(head, id);
            }
            if !keys[id].is_empty() {
                let head = *key_heads.entry(keys[id].as_slice()).or_insert(id);
                uf.union(head, id);
            }
        }

        let mut name_blocks: BTreeMap<String, Vec<MedicineId>> = BTreeMap::new();
        for (name, &id) in &name_heads {
            let prefix: String = name.chars().take(config.block_prefix_len.max(1)).collect();
            name_blocks.entry(prefix).or_default().push(id);
        }
        let mut key_blocks: BTreeMap<&str, Vec<MedicineId>> = BTreeMap::new();
        for (signature, &id) in &key_heads {
            if let Some(smallest) = signature.first() {
                key_blocks.entry(smallest.as_str()).or_default().push(id);
            }
        }

        let name_edges: Vec<(MedicineId, MedicineId)> = name_blocks
            .par_iter()
            .flat_map_iter(|(_, block)| {
                block_pairs(block)
                    .filter(|&(a, b)| name_similarity(&names[a], &names[b]) > config.name_threshold)
                    .collect::<Vec<_>>()
            })
            .collect();
        let key_edges: Vec<(MedicineId, MedicineId)> = key_blocks
            .par_iter()
            .flat_map_iter(|(_, block)| {
                block_pairs(block)
                    .filter(|&(a, b)| composition_similarity(&keys[a], &keys[b]) > config.composition_threshold)
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut edges = name_edges;
        edges.extend(key_edges);
        edges.sort_unstable();
        for &(a, b) in &edges {
            uf.union(a, b);
        }

        let groups = Self::from_union_find(catalogue, &mut uf);
        tracing::info!(
            records = n,
            groups = groups.len(),
            multi_member = groups.multi_member_groups().count(),
            fuzzy_edges = edges.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Duplicate groups built"
        );
        groups
    }

    fn from_union_find(catalogue: &Catalogue, uf: &mut UnionFind) -> Self {
        let n = catalogue.len();
        let mut by_root: HashMap<usize, usize> = HashMap::new();
        let mut members: Vec<Vec<MedicineId>> = Vec::new();
        let mut group_index = vec![0; n];
        // Ascending ids: groups come out ordered by their smallest member.
        for id in 0..n {
            let root = uf.find(id);
            let gi = *by_root.entry(root).or_insert_with(|| {
                members.push(Vec::new());
                members.len() - 1
            });
            members[gi].push(id);
            group_index[id] = gi;
        }

        let groups = members
            .into_iter()
            .map(|members| {
                let representative_id = elect_representative(catalogue, &members);
                DuplicateGroup {
                    members,
                    representative_id,
                }
            })
            .collect();
        DuplicateGroups { groups, group_index }
    }

    pub fn representative_of(&self, id: MedicineId) -> Option<MedicineId> {
        self.group_of(id).map(|g| g.representative_id)
    }

    pub fn group_of(&self, id: MedicineId) -> Option<&DuplicateGroup> {
        self.group_index.get(id).and_then(|&gi| self.groups.get(gi))
    }

    pub fn groups(&self) -> &[DuplicateGroup] {
        &self.groups
    }

    pub fn multi_member_groups(&self) -> impl Iterator<Item = &DuplicateGroup> {
        self.groups.iter().filter(|g| g.len() > 1)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// All unordered pairs of a block, lower id first.
fn block_pairs(block: &[MedicineId]) -> impl Iterator<Item = (MedicineId, MedicineId)> + '_ {
    block
        .iter()
        .enumerate()
        .flat_map(move |(i, &a)| block[i + 1..].iter().map(move |&b| (a.min(b), a.max(b))))
}

/// Most populated record wins; ties go to the lowest id.
fn elect_representative(catalogue: &Catalogue, members: &[MedicineId]) -> MedicineId {
    let mut best = members[0];
    let mut best_score = catalogue.get(best).map_or(0, |r| r.completeness());
    for &id in &members[1..] {
        let score = catalogue.get(id).map_or(0, |r| r.completeness());
        if score > best_score {
            best = id;
            best_score = score;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::MedicineRecord;

    fn groups_for(records: Vec<MedicineRecord>) -> DuplicateGroups {
        let catalogue = Catalogue::from_records(records).unwrap();
        DuplicateGroups::build(&catalogue, &DedupConfig::default())
    }

    #[test]
    fn test_paracetamol_scenario() {
        let groups = groups_for(vec![
            MedicineRecord::new(0, "Paracetamol 500mg Tablet 10 tablets", "Paracetamol (500mg)", "strip", "10 tablets", "Generic"),
            MedicineRecord::new(0, "Paracetamol Tablet 500 mg", "Paracetamol (500mg)", "strip", "", "Generic"),
            MedicineRecord::new(0, "Crocin 650mg Tablet", "Paracetamol (650mg)", "strip", "15 tablets", "GSK"),
        ]);
        assert_eq!(groups.representative_of(0), groups.representative_of(1));
        assert_ne!(groups.representative_of(0), groups.representative_of(2));
        // record 0 has more populated fields than record 1
        assert_eq!(groups.representative_of(1), Some(0));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups.multi_member_groups().count(), 1);
    }

    #[test]
    fn test_every_record_in_exactly_one_group() {
        let groups = groups_for(vec![
            MedicineRecord::new(0, "Azee 500", "Azithromycin (500mg)", "strip", "3", "Cipla"),
            MedicineRecord::new(0, "Azee 500mg Tablet", "Azithromycin (500mg)", "strip", "3", "Cipla"),
            MedicineRecord::new(0, "Dolo 650", "Paracetamol (650mg)", "strip", "15", "Micro"),
            MedicineRecord::new(0, "Pan 40", "Pantoprazole (40mg)", "strip", "15", "Alkem"),
        ]);
        let mut seen: Vec<MedicineId> = groups.groups().iter().flat_map(|g| g.members.clone()).collect();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3]);
        for g in groups.groups() {
            assert!(g.contains(g.representative_id));
        }
    }

    #[test]
    fn test_fuzzy_name_link_is_transitive() {
        // normalized: "amoxyclav" ~ "amoxyclav d" ~ "amoxyclav dx"; blank compositions
        let groups = groups_for(vec![
            MedicineRecord::new(0, "Amoxyclav", "", "", "", ""),
            MedicineRecord::new(0, "Amoxyclav D", "", "", "", ""),
            MedicineRecord::new(0, "Amoxyclav DX", "", "", "", ""),
            MedicineRecord::new(0, "Amlodac", "", "", "", ""),
        ]);
        assert_eq!(groups.group_of(0), groups.group_of(2));
        assert_ne!(groups.group_of(0), groups.group_of(3));
    }

    #[test]
    fn test_names_in_different_prefix_blocks_are_not_compared() {
        // "augmentin" vs "aagmentin" is 0.89 similar but the 3-char prefixes differ
        let records = vec![
            MedicineRecord::new(0, "Augmentin 625", "", "", "", ""),
            MedicineRecord::new(0, "Aagmentin 625", "", "", "", ""),
        ];
        assert!(name_similarity("augmentin", "aagmentin") > 0.80);
        let groups = groups_for(records.clone());
        assert_eq!(groups.len(), 2);

        let catalogue = Catalogue::from_records(records).unwrap();
        let config = DedupConfig {
            block_prefix_len: 1,
            ..DedupConfig::default()
        };
        let groups = DuplicateGroups::build(&catalogue, &config);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups.representative_of(1), Some(0));
    }

    #[test]
    fn test_blank_names_do_not_chain() {
        let groups = groups_for(vec![
            MedicineRecord::new(0, "500 mg", "", "", "", ""),
            MedicineRecord::new(0, "250 mg tablet", "", "", "", ""),
        ]);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_composition_link_across_names() {
        let groups = groups_for(vec![
            MedicineRecord::new(0, "Calpol 500", "Paracetamol (500mg)", "", "", ""),
            MedicineRecord::new(0, "Pacimol 500", "Paracetamol (500 mg)", "", "", ""),
        ]);
        assert_eq!(groups.representative_of(1), Some(0));
    }

    #[test]
    fn test_disabled_gives_singletons() {
        let catalogue = Catalogue::from_records(vec![
            MedicineRecord::new(0, "Dolo 650", "Paracetamol (650mg)", "", "", ""),
            MedicineRecord::new(0, "Dolo 650", "Paracetamol (650mg)", "", "", ""),
        ])
        .unwrap();
        let config = DedupConfig {
            enabled: false,
            ..DedupConfig::default()
        };
        let groups = DuplicateGroups::build(&catalogue, &config);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups.representative_of(1), Some(1));
    }

    #[test]
    fn test_representative_tie_breaks_to_lowest_id() {
        let groups = groups_for(vec![
            MedicineRecord::new(0, "Shelcal 500", "Calcium (500mg)", "strip", "15", "Torrent"),
            MedicineRecord::new(0, "Shelcal 500 Tablet", "Calcium (500mg)", "strip", "15", "Torrent"),
        ]);
        assert_eq!(groups.representative_of(1), Some(0));
        assert_eq!(groups.representative_of(7), None);
    }

    #[test]
    fn test_union_find() {
        let mut uf = UnionFind::new(5);
        uf.union(0, 1);
        uf.union(3, 4);
        uf.union(1, 4);
        assert_eq!(uf.find(0), uf.find(3));
        assert_ne!(uf.find(0), uf.find(2));
    }
}
