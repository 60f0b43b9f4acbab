//! Node-set and tag expressions.
//!
//! A node set is written as a comma-separated list of names where each name
//! may carry bracketed ranges:
//!
//! ```text
//! cpn-d13-[01-04,10],srv-[a,b]-bmc
//! ```
//!
//! Tag expressions select nodes by their tags. Terms are ANDed:
//!
//! | term      | meaning                                         |
//! |-----------|-------------------------------------------------|
//! | `gpu`     | node has the tag `gpu`                          |
//! | `!gpu`    | node does not have the tag `gpu`                |
//! | `rack=`   | node has a tag starting with `rack=`            |
//! | `=d13`    | node has a tag ending with `=d13`               |
//! | `site:`   | node has a tag in the `site` namespace          |
//! | `:rack`   | node has a namespaced tag whose key is `rack`   |

use std::collections::BTreeSet;

use crate::error::{CoreError, Result};

/// Upper bound on the number of names a single expression may generate,
/// counting repeats.
pub const MAX_EXPANSION: usize = 65_536;

/// A parsed, expanded and deduplicated set of node names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSet {
    names: BTreeSet<String>,
}

impl NodeSet {
    /// Parse and expand a node-set expression.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidNodeSet` for unbalanced or nested brackets,
    /// empty or descending ranges, or expressions generating more than
    /// [`MAX_EXPANSION`] names. The limit is enforced while expanding.
    pub fn parse(expr: &str) -> Result<Self> {
        let mut names = BTreeSet::new();
        let mut budget = MAX_EXPANSION;
        for term in split_top_level(expr).map_err(|reason| invalid_set(expr, reason))? {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            let expanded = expand(term, budget).map_err(|reason| invalid_set(expr, reason))?;
            budget -= expanded.len();
            names.extend(expanded);
        }
        Ok(Self { names })
    }

    /// Consume the set, returning its names.
    #[must_use]
    pub fn into_names(self) -> BTreeSet<String> {
        self.names
    }
}

fn invalid_set(expr: &str, reason: impl Into<String>) -> CoreError {
    CoreError::InvalidNodeSet {
        expr: expr.to_string(),
        reason: reason.into(),
    }
}

/// Split on commas that are not inside brackets.
fn split_top_level(expr: &str) -> std::result::Result<Vec<&str>, String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;

    for (i, c) in expr.char_indices() {
        match c {
            '[' => {
                if depth > 0 {
                    return Err("nested brackets are not supported".to_string());
                }
                depth += 1;
            }
            ']' => {
                if depth == 0 {
                    return Err("unbalanced ']'".to_string());
                }
                depth -= 1;
            }
            ',' if depth == 0 => {
                parts.push(&expr[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err("unbalanced '['".to_string());
    }
    parts.push(&expr[start..]);
    Ok(parts)
}

fn too_many() -> String {
    format!("expands to more than {MAX_EXPANSION} names")
}

/// Expand every bracketed range in `term` as a cartesian product of at most
/// `limit` names.
fn expand(term: &str, limit: usize) -> std::result::Result<Vec<String>, String> {
    let Some(open) = term.find('[') else {
        if term.contains(']') {
            return Err("unbalanced ']'".to_string());
        }
        if limit == 0 {
            return Err(too_many());
        }
        return Ok(vec![term.to_string()]);
    };
    let close = term[open..]
        .find(']')
        .map(|i| open + i)
        .ok_or_else(|| "unbalanced '['".to_string())?;

    let prefix = &term[..open];
    let items = expand_range_body(&term[open + 1..close], limit)?;
    let suffixes = expand(&term[close + 1..], limit)?;

    if items.len().saturating_mul(suffixes.len()) > limit {
        return Err(too_many());
    }

    let mut out = Vec::with_capacity(items.len() * suffixes.len());
    for item in &items {
        for suffix in &suffixes {
            out.push(format!("{prefix}{item}{suffix}"));
        }
    }
    Ok(out)
}

/// Expand the inside of a bracket, e.g. `01-04,10`, to at most `limit` items.
fn expand_range_body(body: &str, limit: usize) -> std::result::Result<Vec<String>, String> {
    let mut out = Vec::new();
    for item in body.split(',') {
        let item = item.trim();
        if item.is_empty() {
            return Err("empty range item".to_string());
        }

        let numeric_range = item.split_once('-').filter(|(lo, hi)| {
            !lo.is_empty()
                && !hi.is_empty()
                && lo.bytes().all(|b| b.is_ascii_digit())
                && hi.bytes().all(|b| b.is_ascii_digit())
        });

        let Some((lo, hi)) = numeric_range else {
            if out.len() >= limit {
                return Err(too_many());
            }
            out.push(item.to_string());
            continue;
        };

        let start: u64 = lo.parse().map_err(|_| format!("bad range bound {lo:?}"))?;
        let end: u64 = hi.parse().map_err(|_| format!("bad range bound {hi:?}"))?;
        if end < start {
            return Err(format!("descending range {item:?}"));
        }
        let count = end - start + 1;
        if count > (limit - out.len()) as u64 {
            return Err(too_many());
        }

        let width = if lo.len() > 1 && lo.starts_with('0') {
            lo.len().max(hi.len())
        } else {
            0
        };
        out.extend((start..=end).map(|n| format!("{n:0width$}")));
    }
    Ok(out)
}

/// A single tag-matching term, without negation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagTerm {
    /// The tag must equal the string exactly.
    Exact(String),
    /// The tag must start with the string (`key=` or `namespace:`).
    Prefix(String),
    /// The tag must end with the string (`=value`).
    Suffix(String),
    /// The tag's key after its namespace must equal the string (`:key`).
    NamespacedKey(String),
}

impl TagTerm {
    fn parse(raw: &str) -> std::result::Result<Self, String> {
        if raw.len() > 1 && raw.ends_with('=') {
            Ok(Self::Prefix(raw.to_string()))
        } else if raw.len() > 1 && raw.starts_with('=') {
            Ok(Self::Suffix(raw.to_string()))
        } else if raw.len() > 1 && raw.ends_with(':') {
            Ok(Self::Prefix(raw.to_string()))
        } else if raw.len() > 1 && raw.starts_with(':') {
            Ok(Self::NamespacedKey(raw[1..].to_string()))
        } else if raw == "=" || raw == ":" {
            Err(format!("term {raw:?} matches nothing"))
        } else {
            Ok(Self::Exact(raw.to_string()))
        }
    }

    /// Returns true if `tag` satisfies this term.
    #[must_use]
    pub fn matches(&self, tag: &str) -> bool {
        match self {
            Self::Exact(s) => tag == s,
            Self::Prefix(p) => tag.starts_with(p.as_str()),
            Self::Suffix(s) => tag.ends_with(s.as_str()),
            Self::NamespacedKey(key) => tag.split_once(':').is_some_and(|(_, rest)| {
                rest == key
                    || rest
                        .strip_prefix(key.as_str())
                        .is_some_and(|after| after.starts_with('='))
            }),
        }
    }
}

/// A term plus its polarity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagClause {
    /// What the tag must look like.
    pub term: TagTerm,
    /// If set, no tag of the node may match `term`.
    pub negated: bool,
}

/// A conjunction of tag clauses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagQuery {
    clauses: Vec<TagClause>,
}

impl TagQuery {
    /// Parse a comma-separated tag expression.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidTags` for a bare `!`, `=` or `:` term, or
    /// an expression without any term.
    pub fn parse(expr: &str) -> Result<Self> {
        let mut clauses = Vec::new();
        for raw in expr.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let (negated, body) = match raw.strip_prefix('!') {
                Some(rest) => (true, rest.trim()),
                None => (false, raw),
            };
            if body.is_empty() {
                return Err(CoreError::InvalidTags {
                    expr: expr.to_string(),
                    reason: "negation without a tag".to_string(),
                });
            }
            let term = TagTerm::parse(body).map_err(|reason| CoreError::InvalidTags {
                expr: expr.to_string(),
                reason,
            })?;
            clauses.push(TagClause { term, negated });
        }
        if clauses.is_empty() {
            return Err(CoreError::InvalidTags {
                expr: expr.to_string(),
                reason: "no tag terms".to_string(),
            });
        }
        Ok(Self { clauses })
    }

    /// All clauses in the order they were written.
    #[must_use]
    pub fn clauses(&self) -> &[TagClause] {
        &self.clauses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(expr: &str) -> Vec<String> {
        NodeSet::parse(expr).unwrap().into_names().into_iter().collect()
    }

    #[test]
    fn plain_names_are_sorted_and_deduplicated() {
        assert_eq!(names("b,a,b"), vec!["a", "b"]);
    }

    #[test]
    fn padded_range() {
        assert_eq!(
            names("cpn-d13-[01-03]"),
            vec!["cpn-d13-01", "cpn-d13-02", "cpn-d13-03"]
        );
    }

    #[test]
    fn unpadded_range_and_list() {
        assert_eq!(names("n[9-10,1]"), vec!["n1", "n10", "n9"]);
    }

    #[test]
    fn cartesian_product() {
        assert_eq!(
            names("r[1-2]n[1-2]"),
            vec!["r1n1", "r1n2", "r2n1", "r2n2"]
        );
    }

    #[test]
    fn commas_inside_brackets_do_not_split() {
        assert_eq!(names("a[1,2],b"), vec!["a1", "a2", "b"]);
    }

    #[test]
    fn literal_bracket_items() {
        assert_eq!(names("srv-[a,b]-bmc"), vec!["srv-a-bmc", "srv-b-bmc"]);
    }

    #[test]
    fn rejects_bad_expressions() {
        for bad in ["a[1-2", "a]1", "a[[1]]", "a[]", "a[3-1]", "a[1-100000]"] {
            assert!(
                matches!(NodeSet::parse(bad), Err(CoreError::InvalidNodeSet { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn expansion_limit_counts_repeats() {
        let repeated = vec!["n[0-65000]"; 300].join(",");
        assert!(NodeSet::parse(&repeated).is_err());

        let in_one_bracket = format!("n[{}]", vec!["0-65000"; 300].join(","));
        assert!(NodeSet::parse(&in_one_bracket).is_err());

        let literals = format!("n[{}]", vec!["a"; MAX_EXPANSION + 1].join(","));
        assert!(NodeSet::parse(&literals).is_err());

        assert_eq!(NodeSet::parse("n[1-65536]").unwrap().into_names().len(), MAX_EXPANSION);
        assert!(NodeSet::parse("n[1-65536],extra").is_err());
    }

    #[test]
    fn empty_expression_is_empty_set() {
        assert!(NodeSet::parse(" , ").unwrap().into_names().is_empty());
    }

    #[test]
    fn tag_terms() {
        let tags = ["gpu", "rack=d13", "site:zone=east", "site:rack"];
        let query = |expr: &str| {
            TagQuery::parse(expr).unwrap().clauses().iter().all(|clause| {
                tags.iter().any(|tag| clause.term.matches(tag)) != clause.negated
            })
        };

        assert!(query("gpu"));
        assert!(!query("ib"));
        assert!(query("!ib"));
        assert!(!query("!gpu"));
        assert!(query("rack="));
        assert!(query("=d13"));
        assert!(query("=east"));
        assert!(query("site:"));
        assert!(query(":zone"));
        assert!(query(":rack"));
        assert!(!query(":zon"));
        assert!(query("gpu,rack=,!ib"));
        assert!(!query("gpu,ib"));
    }

    #[test]
    fn tag_query_rejects_bare_terms() {
        assert!(matches!(
            TagQuery::parse("gpu,!"),
            Err(CoreError::InvalidTags { .. })
        ));
        assert!(matches!(
            TagQuery::parse("="),
            Err(CoreError::InvalidTags { .. })
        ));
    }

    #[test]
    fn tag_query_needs_a_term() {
        for blank in ["", ",", " , ,"] {
            assert!(
                matches!(TagQuery::parse(blank), Err(CoreError::InvalidTags { .. })),
                "{blank:?} should be rejected"
            );
        }
    }
}
