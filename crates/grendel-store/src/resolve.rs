//! Node selector resolution against the inventory.
//!
//! Name expressions are expanded by [`NodeSet`] and filtered to existing
//! nodes. Tag expressions are evaluated on the tag posting lists: positive
//! terms intersect, negated terms subtract. When both are given the result is
//! their intersection.

use std::collections::BTreeSet;

use grendel_core::{CoreError, NodeSet, TagQuery, TagTerm};

use crate::error::Result;
use crate::Store;

/// Resolve a node selector to a sorted, deduplicated list of node names.
///
/// Blank expressions count as absent.
///
/// # Errors
///
/// Returns `StoreError::InvalidQuery` if both expressions are absent or one of
/// them fails to parse, or a database error.
pub fn resolve<S: Store + ?Sized>(
    store: &S,
    nodeset: Option<&str>,
    tags: Option<&str>,
) -> Result<Vec<String>> {
    let nodeset = nodeset.map(str::trim).filter(|s| !s.is_empty());
    let tags = tags.map(str::trim).filter(|s| !s.is_empty());
    if nodeset.is_none() && tags.is_none() {
        return Err(CoreError::InvalidQuery.into());
    }

    // Parse everything before touching the database.
    let nodeset = nodeset.map(NodeSet::parse).transpose()?;
    let tags = tags.map(TagQuery::parse).transpose()?;

    let mut candidates: Option<BTreeSet<String>> = None;

    if let Some(set) = nodeset {
        let mut existing = BTreeSet::new();
        for name in set.into_names() {
            if store.has_node(&name)? {
                existing.insert(name);
            }
        }
        candidates = Some(existing);
    }

    if let Some(query) = tags {
        let mut postings = Postings::new(store);

        for clause in query.clauses().iter().filter(|c| !c.negated) {
            let matched = postings.matching(&clause.term)?;
            candidates = Some(match candidates {
                Some(current) => current.intersection(&matched).cloned().collect(),
                None => matched,
            });
        }

        let mut current = match candidates {
            Some(current) => current,
            None => store.node_names()?,
        };
        for clause in query.clauses().iter().filter(|c| c.negated) {
            if current.is_empty() {
                break;
            }
            let matched = postings.matching(&clause.term)?;
            current.retain(|name| !matched.contains(name));
        }
        candidates = Some(current);
    }

    Ok(candidates.unwrap_or_default().into_iter().collect())
}

/// Posting list lookup with a lazily loaded tag vocabulary.
struct Postings<'a, S: Store + ?Sized> {
    store: &'a S,
    all_tags: Option<BTreeSet<String>>,
}

impl<'a, S: Store + ?Sized> Postings<'a, S> {
    fn new(store: &'a S) -> Self {
        Self {
            store,
            all_tags: None,
        }
    }

    /// Nodes carrying at least one tag matched by `term`.
    fn matching(&mut self, term: &TagTerm) -> Result<BTreeSet<String>> {
        if let TagTerm::Exact(tag) = term {
            return self.store.nodes_with_tag(tag);
        }

        if self.all_tags.is_none() {
            self.all_tags = Some(self.store.all_tags()?);
        }
        let mut names = BTreeSet::new();
        for tag in self.all_tags.iter().flatten().filter(|t| term.matches(t)) {
            names.extend(self.store.nodes_with_tag(tag)?);
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::types::Node;
    use crate::RocksStore;
    use tempfile::TempDir;

    fn seeded_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();

        let nodes = [
            ("cpn-d13-01", vec!["gpu", "rack=d13", "site:zone=east"]),
            ("cpn-d13-02", vec!["rack=d13", "retired"]),
            ("cpn-d13-03", vec!["rack=d13"]),
            ("cpn-d14-01", vec!["gpu", "rack=d14"]),
            ("srv1", vec![]),
        ];
        let nodes: Vec<Node> = nodes
            .into_iter()
            .map(|(name, tags)| {
                let mut node = Node::new(name);
                node.tags = tags.into_iter().map(String::from).collect();
                node
            })
            .collect();
        store.put_nodes(&nodes).unwrap();
        (store, dir)
    }

    #[test]
    fn requires_a_selector() {
        let (store, _dir) = seeded_store();
        assert!(matches!(
            resolve(&store, None, None),
            Err(StoreError::InvalidQuery(CoreError::InvalidQuery))
        ));
        assert!(matches!(
            resolve(&store, Some("  "), Some("")),
            Err(StoreError::InvalidQuery(CoreError::InvalidQuery))
        ));
    }

    #[test]
    fn invalid_expressions() {
        let (store, _dir) = seeded_store();
        assert!(matches!(
            resolve(&store, Some("cpn-[01-"), None),
            Err(StoreError::InvalidQuery(CoreError::InvalidNodeSet { .. }))
        ));
        assert!(matches!(
            resolve(&store, None, Some("!")),
            Err(StoreError::InvalidQuery(CoreError::InvalidTags { .. }))
        ));
        assert!(matches!(
            resolve(&store, None, Some(",")),
            Err(StoreError::InvalidQuery(CoreError::InvalidTags { .. }))
        ));
        assert!(matches!(
            resolve(&store, Some("srv1"), Some(" , ")),
            Err(StoreError::InvalidQuery(CoreError::InvalidTags { .. }))
        ));
    }

    #[test]
    fn names_drop_missing_and_sort() {
        let (store, _dir) = seeded_store();
        let names = resolve(&store, Some("srv1,cpn-d13-[03-01],cpn-d13-[01-05]"), None);
        // Descending range is rejected.
        assert!(names.is_err());

        let names = resolve(&store, Some("srv1,cpn-d13-[01-05]"), None).unwrap();
        assert_eq!(names, vec!["cpn-d13-01", "cpn-d13-02", "cpn-d13-03", "srv1"]);
    }

    #[test]
    fn tag_terms() {
        let (store, _dir) = seeded_store();

        assert_eq!(
            resolve(&store, None, Some("gpu")).unwrap(),
            vec!["cpn-d13-01", "cpn-d14-01"]
        );
        assert_eq!(
            resolve(&store, None, Some("rack=d13,!retired")).unwrap(),
            vec!["cpn-d13-01", "cpn-d13-03"]
        );
        assert_eq!(
            resolve(&store, None, Some("rack=")).unwrap().len(),
            4
        );
        assert_eq!(
            resolve(&store, None, Some("=d14")).unwrap(),
            vec!["cpn-d14-01"]
        );
        assert_eq!(
            resolve(&store, None, Some(":zone")).unwrap(),
            vec!["cpn-d13-01"]
        );
        assert_eq!(
            resolve(&store, None, Some("site:")).unwrap(),
            vec!["cpn-d13-01"]
        );
    }

    #[test]
    fn only_negations_start_from_everything() {
        let (store, _dir) = seeded_store();
        assert_eq!(
            resolve(&store, None, Some("!rack=")).unwrap(),
            vec!["srv1"]
        );
    }

    #[test]
    fn names_and_tags_intersect() {
        let (store, _dir) = seeded_store();
        assert_eq!(
            resolve(&store, Some("cpn-d13-[01-03]"), Some("gpu")).unwrap(),
            vec!["cpn-d13-01"]
        );
        assert!(resolve(&store, Some("srv1"), Some("gpu"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn resolve_is_idempotent() {
        let (store, _dir) = seeded_store();
        let first = resolve(&store, Some("cpn-[a,b],cpn-d1[3-4]-01"), Some("!retired")).unwrap();
        let second = resolve(&store, Some("cpn-[a,b],cpn-d1[3-4]-01"), Some("!retired")).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, vec!["cpn-d13-01", "cpn-d14-01"]);
    }
}
