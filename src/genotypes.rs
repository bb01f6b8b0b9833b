//! Enumeration of allele-specific copy number genotypes and their pedigree combinations
//!

use std::collections::BTreeMap;
use std::fmt;

use itertools::Itertools;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Allele-specific copy number state
///
/// For phased parental genotypes `a` is the allele count transmitted by the first parent and `b` the
/// count transmitted by the second parent.
///
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Genotype {
    pub a: u32,
    pub b: u32,
}

impl Genotype {
    pub fn new(a: u32, b: u32) -> Self {
        Self { a, b }
    }

    pub fn copy_number(&self) -> u32 {
        self.a + self.b
    }

    pub fn major_count(&self) -> u32 {
        std::cmp::max(self.a, self.b)
    }

    /// True if either allele count of self matches either allele count of other
    pub fn shares_allele_with(&self, other: &Genotype) -> bool {
        self.a == other.a || self.a == other.b || self.b == other.a || self.b == other.b
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.a, self.b)
    }
}

/// Map from each copy number in `0..copy_number_count` to its unphased genotypes
///
/// For copy number `cn` the list contains every `(a,b)` with `a + b == cn` and `a <= b`, in order of
/// increasing `a`.
///
pub fn generate_genotype_combinations(copy_number_count: u32) -> BTreeMap<u32, Vec<Genotype>> {
    let mut genotypes = BTreeMap::new();
    for cn in 0..copy_number_count {
        let cn_genotypes = (0..=cn / 2).map(|a| Genotype::new(a, cn - a)).collect();
        genotypes.insert(cn, cn_genotypes);
    }
    genotypes
}

/// Flat list of all phased genotypes for copy numbers in `0..copy_number_count`
///
pub fn generate_parental_genotypes(copy_number_count: u32) -> Vec<Genotype> {
    let mut genotypes = Vec::new();
    for cn in 0..copy_number_count {
        for a in 0..=cn {
            genotypes.push(Genotype::new(a, cn - a));
        }
    }
    genotypes
}

/// All ordered tuples of length `offspring_count` drawn from `genotypes`
///
/// Output size is `genotypes.len()^offspring_count`, ordered with the last offspring varying fastest.
///
pub fn generate_offspring_genotypes(
    genotypes: &[Genotype],
    offspring_count: usize,
) -> Vec<Vec<Genotype>> {
    if offspring_count == 0 {
        return vec![Vec::new()];
    }
    (0..offspring_count)
        .map(|_| genotypes.iter().cloned())
        .multi_cartesian_product()
        .collect()
}

/// Reduce the offspring genotype tuple list to at most `max_count` entries
///
/// Entries are selected uniformly without replacement. The relative order of retained tuples is
/// preserved so that the downstream maximum search keeps a stable enumeration order.
///
pub fn cap_offspring_genotypes<R: Rng>(
    offspring_genotypes: Vec<Vec<Genotype>>,
    max_count: usize,
    rng: &mut R,
) -> Vec<Vec<Genotype>> {
    if offspring_genotypes.len() <= max_count {
        return offspring_genotypes;
    }
    let mut keep = rand::seq::index::sample(rng, offspring_genotypes.len(), max_count).into_vec();
    keep.sort_unstable();
    let mut keep = keep.into_iter().peekable();
    offspring_genotypes
        .into_iter()
        .enumerate()
        .filter_map(|(index, x)| {
            if keep.peek() == Some(&index) {
                keep.next();
                Some(x)
            } else {
                None
            }
        })
        .collect()
}

/// Union of all k-combinations of copy number states `0..copy_number_count` for k in `1..=max_allele_number`
///
/// Combinations are unordered sets, listed by increasing k and then in lexicographic order.
///
pub fn generate_copy_number_combinations(
    copy_number_count: u32,
    max_allele_number: usize,
) -> Vec<Vec<u32>> {
    let mut combinations = Vec::new();
    for k in 1..=max_allele_number {
        combinations.extend((0..copy_number_count).combinations(k));
    }
    combinations
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_generate_genotype_combinations() {
        let genotypes = generate_genotype_combinations(6);
        assert_eq!(genotypes.len(), 6);
        for (&cn, cn_genotypes) in genotypes.iter() {
            assert_eq!(cn_genotypes.len() as u32, cn / 2 + 1);
            for gt in cn_genotypes {
                assert_eq!(gt.a + gt.b, cn);
                assert!(gt.a <= gt.b);
            }
        }
        assert_eq!(genotypes[&3], vec![Genotype::new(0, 3), Genotype::new(1, 2)]);
    }

    #[test]
    fn test_generate_parental_genotypes() {
        let genotypes = generate_parental_genotypes(3);
        assert_eq!(
            genotypes,
            vec![
                Genotype::new(0, 0),
                Genotype::new(0, 1),
                Genotype::new(1, 0),
                Genotype::new(0, 2),
                Genotype::new(1, 1),
                Genotype::new(2, 0),
            ]
        );
    }

    #[test]
    fn test_generate_offspring_genotypes() {
        let genotypes = generate_parental_genotypes(3);
        let offspring = generate_offspring_genotypes(&genotypes, 3);
        assert_eq!(offspring.len(), 6 * 6 * 6);
        assert!(offspring.iter().all(|x| x.len() == 3));
        assert_eq!(offspring[1], vec![genotypes[0], genotypes[0], genotypes[1]]);

        let unique = offspring.iter().collect::<BTreeSet<_>>();
        assert_eq!(unique.len(), offspring.len());
    }

    #[test]
    fn test_cap_offspring_genotypes() {
        let genotypes = generate_parental_genotypes(4);
        let offspring = generate_offspring_genotypes(&genotypes, 2);
        assert_eq!(offspring.len(), 100);

        let mut rng = StdRng::seed_from_u64(42);
        let capped = cap_offspring_genotypes(offspring.clone(), 30, &mut rng);
        assert_eq!(capped.len(), 30);
        let unique = capped.iter().collect::<BTreeSet<_>>();
        assert_eq!(unique.len(), 30);

        // Reproducible for a fixed seed:
        let mut rng = StdRng::seed_from_u64(42);
        let capped2 = cap_offspring_genotypes(offspring.clone(), 30, &mut rng);
        assert_eq!(capped, capped2);

        let mut rng = StdRng::seed_from_u64(42);
        let uncapped = cap_offspring_genotypes(offspring.clone(), 500, &mut rng);
        assert_eq!(uncapped, offspring);
    }

    #[test]
    fn test_generate_copy_number_combinations() {
        let combinations = generate_copy_number_combinations(5, 3);
        // 5 + 10 + 10
        assert_eq!(combinations.len(), 25);
        assert_eq!(combinations[0], vec![0]);
        assert_eq!(combinations[5], vec![0, 1]);
        assert!(combinations.contains(&vec![1, 2, 3]));
    }

    #[test]
    fn test_shares_allele_with() {
        let gt = Genotype::new(1, 2);
        assert!(gt.shares_allele_with(&Genotype::new(1, 2)));
        assert!(gt.shares_allele_with(&Genotype::new(0, 1)));
        assert!(gt.shares_allele_with(&Genotype::new(2, 2)));
        assert!(!gt.shares_allele_with(&Genotype::new(0, 3)));
        assert!(!Genotype::new(0, 0).shares_allele_with(&Genotype::new(1, 1)));
    }
}
