use crate::taxonomy::Taxon;
use crate::{ObiError, Result};
use indexmap::IndexSet;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use tracing::debug;

/// Namespace used when a taxonomy does not name its identifiers.
pub const DEFAULT_CODE: &str = "taxon";

/// Rank given to nodes whose source declares none.
pub const NO_RANK: &str = "no rank";

/// `[code:]raw[ [name]][@rank]`
static TAXID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:([A-Za-z_][\w.-]*):)?([^\s\[@]+)\s*(?:\[[^\]]*\])?\s*(?:@.*)?$").unwrap()
});

/// One node of the tree.
#[derive(Debug, Clone)]
pub struct TaxNode {
    pub id: String,
    /// Index of the parent; the root is its own parent.
    pub parent: usize,
    pub rank: usize,
    pub scientific_name: Option<String>,
}

/// In-memory taxonomic tree with a single root.
///
/// Nodes are stored in insertion order and addressed by index; raw
/// identifiers and aliases resolve to those indices.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    name: String,
    code: String,
    nodes: Vec<TaxNode>,
    children: Vec<Vec<usize>>,
    index: FxHashMap<String, usize>,
    aliases: FxHashMap<String, usize>,
    ranks: IndexSet<String>,
    root: Option<usize>,
}

impl Taxonomy {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            nodes: Vec::new(),
            children: Vec::new(),
            index: FxHashMap::default(),
            aliases: FxHashMap::default(),
            ranks: IndexSet::new(),
            root: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace of the identifiers, as in `code:raw`.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ranks in order of first appearance.
    pub fn ranks(&self) -> impl Iterator<Item = &str> {
        self.ranks.iter().map(String::as_str)
    }

    pub fn rank_index(&self, rank: &str) -> Option<usize> {
        self.ranks.get_index_of(rank)
    }

    pub(crate) fn rank_name(&self, rank: usize) -> &str {
        self.ranks.get_index(rank).map(String::as_str).unwrap_or(NO_RANK)
    }

    pub(crate) fn node(&self, index: usize) -> &TaxNode {
        &self.nodes[index]
    }

    pub(crate) fn children_of(&self, index: usize) -> &[usize] {
        &self.children[index]
    }

    /// Inserts a node under `parent_id`, which must already be present
    /// unless `is_root` is set.
    ///
    /// A second root is refused. An identifier seen before is refused too,
    /// unless `allow_alias` is set, in which case the first node is kept and
    /// returned.
    pub fn add_taxon(
        &mut self,
        id: &str,
        parent_id: &str,
        rank: &str,
        is_root: bool,
        allow_alias: bool,
    ) -> Result<Taxon<'_>> {
        let id = self.normalize(id)?;
        if let Some(&existing) = self.index.get(&id).or_else(|| self.aliases.get(&id)) {
            if !allow_alias {
                return Err(ObiError::Taxonomy(format!("taxid {} is already defined", id)));
            }
            debug!("taxid {} defined twice, keeping the first node", id);
            return Ok(Taxon::new(self, existing));
        }

        let index = self.nodes.len();
        let parent = if is_root {
            if let Some(root) = self.root {
                return Err(ObiError::Taxonomy(format!(
                    "cannot add root {}: {} is already the root",
                    id, self.nodes[root].id
                )));
            }
            self.root = Some(index);
            index
        } else {
            let parent_id = self.normalize(parent_id)?;
            self.resolve(&parent_id)
                .ok_or_else(|| {
                    ObiError::Taxonomy(format!("parent {} of taxid {} is unknown", parent_id, id))
                })?
        };

        let (rank, _) = self.ranks.insert_full(rank.to_string());
        self.nodes.push(TaxNode {
            id: id.clone(),
            parent,
            rank,
            scientific_name: None,
        });
        self.children.push(Vec::new());
        if parent != index {
            self.children[parent].push(index);
        }
        self.index.insert(id, index);
        Ok(Taxon::new(self, index))
    }

    /// Makes `alias` resolve to the node of `id`.
    pub fn add_alias(&mut self, alias: &str, id: &str) -> Result<()> {
        let alias = self.normalize(alias)?;
        let id = self.normalize(id)?;
        let target = self
            .resolve(&id)
            .ok_or_else(|| {
                ObiError::Taxonomy(format!("alias {} targets unknown taxid {}", alias, id))
            })?;
        if self.index.contains_key(&alias) {
            return Err(ObiError::Taxonomy(format!("alias {} is already a taxid", alias)));
        }
        self.aliases.insert(alias, target);
        Ok(())
    }

    pub fn set_scientific_name(&mut self, id: &str, name: impl Into<String>) -> Result<()> {
        let id = self.normalize(id)?;
        let index = self
            .resolve(&id)
            .ok_or_else(|| ObiError::Taxonomy(format!("taxid {} is unknown", id)))?;
        self.nodes[index].scientific_name = Some(name.into());
        Ok(())
    }

    /// Extracts the raw identifier from `raw`, `code:raw` or the
    /// `code:raw [name]@rank` form produced by [`Taxon::string`].
    pub fn normalize(&self, id: &str) -> Result<String> {
        let captures = TAXID_PATTERN
            .captures(id)
            .ok_or_else(|| ObiError::Taxonomy(format!("malformed taxid `{}`", id)))?;
        if let Some(code) = captures.get(1) {
            if code.as_str() != self.code {
                return Err(ObiError::Taxonomy(format!(
                    "taxid {} does not belong to the {} taxonomy",
                    id, self.code
                )));
            }
        }
        Ok(captures[2].to_string())
    }

    fn resolve(&self, raw: &str) -> Option<usize> {
        self.index.get(raw).or_else(|| self.aliases.get(raw)).copied()
    }

    /// Looks a taxon up. The flag tells whether `id` was an alias.
    pub fn taxon(&self, id: &str) -> Result<(Taxon<'_>, bool)> {
        let raw = self.normalize(id)?;
        if let Some(&index) = self.index.get(&raw) {
            return Ok((Taxon::new(self, index), false));
        }
        match self.aliases.get(&raw) {
            Some(&index) => Ok((Taxon::new(self, index), true)),
            None => Err(ObiError::Taxonomy(format!("taxid {} is unknown", id))),
        }
    }

    pub fn root(&self) -> Option<Taxon<'_>> {
        self.root.map(|r| Taxon::new(self, r))
    }

    /// Every node of the tree, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Taxon<'_>> {
        (0..self.nodes.len()).map(move |i| Taxon::new(self, i))
    }

    /// Nodes having rank `rank`.
    pub fn taxa_at_rank(&self, rank: &str) -> Vec<Taxon<'_>> {
        let Some(r) = self.rank_index(rank) else {
            return Vec::new();
        };
        self.iter().filter(|t| t.node().rank == r).collect()
    }

    /// Depth-first walk of the subtree rooted at `taxon`, the root first.
    pub fn iter_subtree<'a>(&'a self, taxon: &Taxon<'a>) -> impl Iterator<Item = Taxon<'a>> + 'a {
        let mut stack = vec![taxon.index()];
        std::iter::from_fn(move || {
            let index = stack.pop()?;
            stack.extend(self.children[index].iter().rev());
            Some(Taxon::new(self, index))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::testing::sample;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_root() {
        let mut t = sample();
        let err = t.add_taxon("9", "9", NO_RANK, true, false).unwrap_err();
        assert!(matches!(err, ObiError::Taxonomy(_)));
    }

    #[test]
    fn test_unknown_parent() {
        let mut t = sample();
        assert!(t.add_taxon("9", "42", "species", false, false).is_err());
    }

    #[test]
    fn test_duplicates_and_aliases() {
        let mut t = sample();
        assert!(t.add_taxon("3", "2", "species", false, false).is_err());
        let kept = t.add_taxon("3", "5", "species", false, true).unwrap();
        assert_eq!(kept.parent().unwrap().id(), "2");
        assert_eq!(t.len(), 5);

        t.add_alias("33", "3").unwrap();
        let (taxon, alias) = t.taxon("33").unwrap();
        assert_eq!(taxon.id(), "3");
        assert!(alias);
        let (_, alias) = t.taxon("3").unwrap();
        assert!(!alias);
    }

    #[test]
    fn test_id_forms() {
        let t = sample();
        for form in ["2", "taxon:2", " taxon:2 [A]@genus", "2 [A]"] {
            assert_eq!(t.taxon(form).unwrap().0.id(), "2", "{}", form);
        }
        assert!(t.taxon("ncbi:2").is_err());
        assert!(t.taxon("42").is_err());
    }

    #[test]
    fn test_ranks_and_subtree() {
        let t = sample();
        let ranks: Vec<&str> = t.ranks().collect();
        assert_eq!(ranks, vec![NO_RANK, "genus", "species"]);
        assert_eq!(t.taxa_at_rank("species").len(), 2);

        let (a, _) = t.taxon("2").unwrap();
        let ids: Vec<&str> = t.iter_subtree(&a).map(|x| x.id()).collect();
        assert_eq!(ids, vec!["2", "3", "4"]);
        let root = t.root().unwrap();
        assert_eq!(t.iter_subtree(&root).count(), 5);
    }
}
