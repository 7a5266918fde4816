use crate::taxonomy::Taxon;
use rustc_hash::FxHashMap;

/// Outcome of a weighted LCA.
#[derive(Debug, Clone, Copy)]
pub struct LcaResult<'a> {
    /// Deepest ancestor gathering at least the threshold fraction of the
    /// weight; `None` when even the root does not.
    pub taxon: Option<Taxon<'a>>,
    /// Fraction of the input weight lying under `taxon`; 1.0 when no
    /// level was accepted.
    pub purity: f64,
    /// Sum of the input weights.
    pub weight: u64,
}

/// Weighted lowest common ancestor under a purity `threshold`.
///
/// Walks the paths down from the root level by level, keeping at each level
/// the heaviest ancestor while the cumulative fraction of the weight under it
/// stays at or above `threshold`. Taxa whose path ends above the current level
/// still count in the level total, so `purity` is always the fraction of the
/// input weight assigned to the answer's subtree.
pub fn weighted_lca<'a>(weights: &[(Taxon<'a>, u64)], threshold: f64) -> LcaResult<'a> {
    let total_weight: u64 = weights.iter().map(|(_, w)| w).sum();
    let mut surviving: Vec<(Vec<Taxon<'a>>, u64)> =
        weights.iter().map(|(t, w)| (t.path(), *w)).collect();

    let mut answer = None;
    let mut r_max = 1.0f64;
    let mut r_prev = 1.0f64;
    let mut level = 0usize;

    while r_max >= threshold {
        let mut sums: FxHashMap<usize, (Taxon<'a>, u64)> = FxHashMap::default();
        let mut total = 0u64;
        for (path, w) in &surviving {
            total += w;
            if let Some(ancestor) = path.get(level) {
                sums.entry(ancestor.index()).or_insert((*ancestor, 0)).1 += w;
            }
        }
        let best = sums
            .values()
            .copied()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.index().cmp(&a.0.index())));
        let Some((taxon_max, w_max)) = best else {
            break;
        };

        r_max = if total == 0 {
            0.0
        } else {
            r_max * w_max as f64 / total as f64
        };
        if r_max < threshold {
            break;
        }
        answer = Some(taxon_max);
        r_prev = r_max;
        surviving.retain(|(path, _)| path.get(level).map_or(false, |t| *t == taxon_max));
        level += 1;
    }

    LcaResult {
        taxon: answer,
        purity: r_prev,
        weight: total_weight,
    }
}
