use crate::bio::iupac::iupac_match;

/// Location of a primer in a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimerMatch {
    pub start: usize,
    /// One past the last matched residue.
    pub end: usize,
    pub errors: usize,
}

/// Finds `primer` anywhere in `sequence` with at most `max_errors` edits.
///
/// Semi-global alignment: the primer must be consumed entirely while the
/// sequence may be entered and left anywhere. Ambiguity codes on either
/// side match any nucleotide they stand for. On ties the leftmost end wins.
pub fn locate(primer: &[u8], sequence: &[u8], max_errors: usize) -> Option<PrimerMatch> {
    let m = primer.len();
    if m == 0 {
        return None;
    }
    // cost[j] / start[j] hold the current DP row over sequence positions
    let mut cost: Vec<usize> = vec![0; sequence.len() + 1];
    let mut start: Vec<usize> = (0..=sequence.len()).collect();
    let mut next_cost = vec![0usize; sequence.len() + 1];
    let mut next_start = vec![0usize; sequence.len() + 1];
    for (i, &p) in primer.iter().enumerate() {
        next_cost[0] = i + 1;
        next_start[0] = 0;
        for (j, &s) in sequence.iter().enumerate() {
            let diagonal = cost[j] + usize::from(!iupac_match(p, s));
            let up = cost[j + 1] + 1;
            let left = next_cost[j] + 1;
            let (c, origin) = if diagonal <= up && diagonal <= left {
                (diagonal, start[j])
            } else if up <= left {
                (up, start[j + 1])
            } else {
                (left, next_start[j])
            };
            next_cost[j + 1] = c;
            next_start[j + 1] = origin;
        }
        std::mem::swap(&mut cost, &mut next_cost);
        std::mem::swap(&mut start, &mut next_start);
    }
    let (end, &errors) = cost
        .iter()
        .enumerate()
        .skip(1)
        .min_by(|a, b| a.1.cmp(b.1).then(a.0.cmp(&b.0)))?;
    (errors <= max_errors && errors < m).then(|| PrimerMatch {
        start: start[end],
        end,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(b"acgt".as_slice(), b"ttacgttt".as_slice(), 0, Some((2, 6, 0)))]
    #[case(b"acgt".as_slice(), b"ttaggttt".as_slice(), 1, Some((2, 6, 1)))]
    #[case(b"acgt".as_slice(), b"ttaggttt".as_slice(), 0, None)]
    #[case(b"acggt".as_slice(), b"ttacgttt".as_slice(), 1, Some((2, 6, 1)))]
    #[case(b"rcgy".as_slice(), b"ttgcgcaa".as_slice(), 0, Some((2, 6, 0)))]
    #[case(b"acgt".as_slice(), b"acg".as_slice(), 1, Some((0, 3, 1)))]
    fn test_locate(
        #[case] primer: &[u8],
        #[case] sequence: &[u8],
        #[case] max_errors: usize,
        #[case] expected: Option<(usize, usize, usize)>,
    ) {
        let found = locate(primer, sequence, max_errors).map(|m| (m.start, m.end, m.errors));
        assert_eq!(found, expected);
    }

    #[test]
    fn test_empty_primer() {
        assert_eq!(locate(b"", b"acgt", 2), None);
    }
}
