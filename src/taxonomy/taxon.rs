use crate::taxonomy::{TaxNode, Taxonomy, NO_RANK};
use std::fmt;

/// Cursor on one node of a [`Taxonomy`].
#[derive(Clone, Copy)]
pub struct Taxon<'a> {
    taxonomy: &'a Taxonomy,
    index: usize,
}

impl<'a> Taxon<'a> {
    pub(crate) fn new(taxonomy: &'a Taxonomy, index: usize) -> Self {
        Self { taxonomy, index }
    }

    pub fn taxonomy(&self) -> &'a Taxonomy {
        self.taxonomy
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn node(&self) -> &'a TaxNode {
        self.taxonomy.node(self.index)
    }

    /// Raw identifier, without the taxonomy code.
    pub fn id(&self) -> &'a str {
        &self.node().id
    }

    pub fn rank(&self) -> &'a str {
        self.taxonomy.rank_name(self.node().rank)
    }

    pub fn has_rank_defined(&self) -> bool {
        self.rank() != NO_RANK
    }

    pub fn scientific_name(&self) -> Option<&'a str> {
        self.node().scientific_name.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.node().parent == self.index
    }

    /// `None` at the root.
    pub fn parent(&self) -> Option<Taxon<'a>> {
        let parent = self.node().parent;
        (parent != self.index).then(|| Taxon::new(self.taxonomy, parent))
    }

    pub fn children(&self) -> impl Iterator<Item = Taxon<'a>> + 'a {
        let taxonomy = self.taxonomy;
        taxonomy.children_of(self.index).iter().map(move |&c| Taxon::new(taxonomy, c))
    }

    /// The node and its ancestors, from the node up to the root.
    pub fn lineage(&self) -> impl Iterator<Item = Taxon<'a>> {
        let mut next = Some(*self);
        std::iter::from_fn(move || {
            let current = next?;
            next = current.parent();
            Some(current)
        })
    }

    /// Ancestors from the root down to this node, both included.
    pub fn path(&self) -> Vec<Taxon<'a>> {
        let mut path: Vec<Taxon<'a>> = self.lineage().collect();
        path.reverse();
        path
    }

    /// Closest ancestor (or self) having rank `rank`.
    pub fn taxon_at_rank(&self, rank: &str) -> Option<Taxon<'a>> {
        let rank = self.taxonomy.rank_index(rank)?;
        self.lineage().find(|t| t.node().rank == rank)
    }

    /// True when `other` is this node or one of its ancestors.
    pub fn is_subclade_of(&self, other: &Taxon<'_>) -> bool {
        std::ptr::eq(self.taxonomy, other.taxonomy)
            && self.lineage().any(|t| t.index == other.index)
    }

    /// `code:raw [scientific name]@rank`
    pub fn string(&self) -> String {
        self.to_string()
    }
}

impl PartialEq for Taxon<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.taxonomy, other.taxonomy) && self.index == other.index
    }
}

impl Eq for Taxon<'_> {}

impl fmt::Display for Taxon<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.taxonomy.code(), self.id())?;
        if let Some(name) = self.scientific_name() {
            write!(f, " [{}]", name)?;
        }
        write!(f, "@{}", self.rank())
    }
}

impl fmt::Debug for Taxon<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Taxon({})", self)
    }
}

#[cfg(test)]
mod tests {
    use crate::taxonomy::testing::sample;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_navigation() {
        let t = sample();
        let (leaf, _) = t.taxon("3").unwrap();
        let ids: Vec<&str> = leaf.path().iter().map(|x| x.id()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(leaf.parent().unwrap().id(), "2");
        assert!(t.root().unwrap().parent().is_none());
        assert!(t.root().unwrap().is_root());
        assert_eq!(leaf.taxon_at_rank("genus").unwrap().id(), "2");
        assert_eq!(leaf.taxon_at_rank("species").unwrap().id(), "3");
        assert!(leaf.taxon_at_rank("family").is_none());
    }

    #[test]
    fn test_subclade() {
        let t = sample();
        let (leaf, _) = t.taxon("3").unwrap();
        let (a, _) = t.taxon("2").unwrap();
        let (b, _) = t.taxon("5").unwrap();
        assert!(leaf.is_subclade_of(&a));
        assert!(leaf.is_subclade_of(&leaf));
        assert!(leaf.is_subclade_of(&t.root().unwrap()));
        assert!(!leaf.is_subclade_of(&b));
        assert!(!a.is_subclade_of(&leaf));
    }

    #[test]
    fn test_string_round_trips() {
        let t = sample();
        let (a, _) = t.taxon("2").unwrap();
        assert_eq!(a.string(), "taxon:2 [A]@genus");
        assert_eq!(t.taxon(&a.string()).unwrap().0, a);
        let root = t.root().unwrap();
        assert_eq!(root.string(), "taxon:1@no rank");
        assert!(!root.has_rank_defined());
        assert!(a.has_rank_defined());
    }
}
