//! Chromosome encoding and variation operators for the repair search.
//!
//! A chromosome holds three parallel gene arrays over the N modification
//! points: an `active` flag, an operator index and an ingredient index.

use rand::prelude::*;

use crate::compute::program::ProgramModel;
use crate::schema::InitializationStrategy;

/// Decision vector of one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Chromosome {
    pub active: Vec<bool>,
    /// Index into the point's operator list.
    pub operator_index: Vec<usize>,
    /// Index into the point's ingredient list. Ignored for points without ingredients.
    pub ingredient_index: Vec<usize>,
}

impl Chromosome {
    /// All points inactive, all indices zero.
    pub fn empty(len: usize) -> Self {
        Self {
            active: vec![false; len],
            operator_index: vec![0; len],
            ingredient_index: vec![0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }

    pub fn active_points(&self) -> Vec<usize> {
        self.active
            .iter()
            .enumerate()
            .filter_map(|(i, &a)| a.then_some(i))
            .collect()
    }
}

/// Per-point gene bounds derived from the program model.
#[derive(Debug, Clone)]
pub struct SearchBounds {
    num_operators: Vec<usize>,
    num_ingredients: Vec<usize>,
    suspiciousness: Vec<f64>,
}

impl SearchBounds {
    pub fn from_model(model: &ProgramModel) -> Self {
        let points = model.points();
        Self {
            num_operators: points.iter().map(|p| p.num_operators()).collect(),
            num_ingredients: points.iter().map(|p| p.num_ingredients()).collect(),
            suspiciousness: points.iter().map(|p| p.suspiciousness).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.num_operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_operators.is_empty()
    }

    pub fn num_operators(&self, i: usize) -> usize {
        self.num_operators[i]
    }

    pub fn num_ingredients(&self, i: usize) -> usize {
        self.num_ingredients[i]
    }

    pub fn suspiciousness(&self, i: usize) -> f64 {
        self.suspiciousness[i]
    }
}

/// Random number generator wrapper for chromosome operations.
pub struct GenomeRng {
    rng: StdRng,
}

impl GenomeRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generate a random chromosome within bounds.
    pub fn random_chromosome(
        &mut self,
        bounds: &SearchBounds,
        strategy: InitializationStrategy,
        mu: f64,
    ) -> Chromosome {
        let n = bounds.len();
        let mut chromosome = Chromosome::empty(n);
        for i in 0..n {
            let p = match strategy {
                InitializationStrategy::Prior => (bounds.suspiciousness(i) * mu).clamp(0.0, 1.0),
                InitializationStrategy::Random => 0.5,
            };
            chromosome.active[i] = self.rng.gen_bool(p);
            chromosome.operator_index[i] = self.uniform_index(bounds.num_operators(i));
            chromosome.ingredient_index[i] = self.uniform_index(bounds.num_ingredients(i));
        }
        chromosome
    }

    fn uniform_index(&mut self, bound: usize) -> usize {
        if bound == 0 {
            0
        } else {
            self.rng.gen_range(0..bound)
        }
    }

    /// Single-point crossover applied to all three gene arrays at the same cut.
    pub fn crossover(
        &mut self,
        parent1: &Chromosome,
        parent2: &Chromosome,
    ) -> (Chromosome, Chromosome) {
        let n = parent1.len().min(parent2.len());
        if n < 2 {
            return (parent1.clone(), parent2.clone());
        }
        let cut = self.rng.gen_range(1..n);

        fn splice<T: Clone>(a: &[T], b: &[T], cut: usize) -> Vec<T> {
            a[..cut].iter().chain(&b[cut..]).cloned().collect()
        }

        let child = |a: &Chromosome, b: &Chromosome| Chromosome {
            active: splice(&a.active, &b.active, cut),
            operator_index: splice(&a.operator_index, &b.operator_index, cut),
            ingredient_index: splice(&a.ingredient_index, &b.ingredient_index, cut),
        };
        (child(parent1, parent2), child(parent2, parent1))
    }

    /// Per-gene mutation: bit flip for `active`, uniform reset for indices.
    pub fn mutate(&mut self, chromosome: &mut Chromosome, bounds: &SearchBounds, rate: f64) {
        let rate = rate.clamp(0.0, 1.0);
        for i in 0..chromosome.len() {
            if self.rng.gen_bool(rate) {
                chromosome.active[i] = !chromosome.active[i];
            }
            if bounds.num_operators(i) > 1 && self.rng.gen_bool(rate) {
                chromosome.operator_index[i] = self.uniform_index(bounds.num_operators(i));
            }
            if bounds.num_ingredients(i) > 1 && self.rng.gen_bool(rate) {
                chromosome.ingredient_index[i] = self.uniform_index(bounds.num_ingredients(i));
            }
        }
    }

    /// Uniform integer in `0..bound`.
    pub fn index(&mut self, bound: usize) -> usize {
        self.uniform_index(bound)
    }

    pub fn chance(&mut self, p: f64) -> bool {
        self.rng.gen_bool(p.clamp(0.0, 1.0))
    }
}

/// Fraction of points whose decoded edit differs between two chromosomes.
///
/// Inactive points are equal regardless of their index genes.
pub fn chromosome_distance(c1: &Chromosome, c2: &Chromosome) -> f64 {
    let n = c1.len().min(c2.len());
    if n == 0 {
        return 0.0;
    }
    let differing = (0..n)
        .filter(|&i| match (c1.active[i], c2.active[i]) {
            (false, false) => false,
            (true, true) => {
                c1.operator_index[i] != c2.operator_index[i]
                    || c1.ingredient_index[i] != c2.ingredient_index[i]
            }
            _ => true,
        })
        .count();
    differing as f64 / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Ingredient, Location, ModificationPoint};
    use proptest::prelude::*;

    fn bounds(n: usize) -> SearchBounds {
        let points: Vec<_> = (0..n)
            .map(|i| {
                let ingredients = (0..(i % 4) as u64)
                    .map(|id| Ingredient {
                        id,
                        source: format!("v = {id};"),
                    })
                    .collect();
                ModificationPoint::new(Location::new("A.java", i as u32 + 1), "s;")
                    .with_ingredients(ingredients)
                    .with_suspiciousness(1.0)
            })
            .collect();
        let mut rng = StdRng::seed_from_u64(0);
        SearchBounds::from_model(&ProgramModel::new(points, n, &mut rng).unwrap())
    }

    #[test]
    fn test_random_chromosome_respects_bounds() {
        let bounds = bounds(12);
        let mut rng = GenomeRng::new(42);
        for _ in 0..20 {
            let c = rng.random_chromosome(&bounds, InitializationStrategy::Random, 0.06);
            assert_eq!(c.len(), 12);
            for i in 0..c.len() {
                assert!(c.operator_index[i] < bounds.num_operators(i));
                assert!(
                    c.ingredient_index[i] < bounds.num_ingredients(i).max(1),
                    "ingredient gene out of range at {i}"
                );
            }
        }
    }

    #[test]
    fn test_prior_initialization_scales_with_mu() {
        let bounds = bounds(10);
        let mut rng = GenomeRng::new(7);
        let none = rng.random_chromosome(&bounds, InitializationStrategy::Prior, 0.0);
        assert_eq!(none.active_count(), 0);
        let all = rng.random_chromosome(&bounds, InitializationStrategy::Prior, 1.0);
        assert_eq!(all.active_count(), 10);
    }

    #[test]
    fn test_mutation_stays_in_bounds() {
        let bounds = bounds(8);
        let mut rng = GenomeRng::new(3);
        let mut c = rng.random_chromosome(&bounds, InitializationStrategy::Random, 0.0);
        let before = c.clone();
        rng.mutate(&mut c, &bounds, 1.0);
        assert!(c.active.iter().zip(&before.active).all(|(a, b)| a != b));
        for i in 0..c.len() {
            assert!(c.operator_index[i] < bounds.num_operators(i));
        }
    }

    #[test]
    fn test_distance() {
        let mut a = Chromosome::empty(4);
        let mut b = Chromosome::empty(4);
        b.operator_index[0] = 1;
        assert_eq!(chromosome_distance(&a, &b), 0.0);
        a.active[0] = true;
        assert_eq!(chromosome_distance(&a, &b), 0.25);
        b.active[0] = true;
        b.active[3] = true;
        assert_eq!(chromosome_distance(&a, &b), 0.5);
    }

    proptest! {
        #[test]
        fn prop_crossover_preserves_length_and_genes(seed in any::<u64>(), n in 1usize..30) {
            let bounds = bounds(n);
            let mut rng = GenomeRng::new(seed);
            let p1 = rng.random_chromosome(&bounds, InitializationStrategy::Random, 0.0);
            let p2 = rng.random_chromosome(&bounds, InitializationStrategy::Random, 0.0);
            let (c1, c2) = rng.crossover(&p1, &p2);
            prop_assert_eq!(c1.len(), n);
            prop_assert_eq!(c2.len(), n);
            for i in 0..n {
                // Each position keeps a gene from one of the parents, and the
                // children take complementary genes.
                let from_p1 = c1.active[i] == p1.active[i] && c2.active[i] == p2.active[i];
                let from_p2 = c1.active[i] == p2.active[i] && c2.active[i] == p1.active[i];
                prop_assert!(from_p1 || from_p2);
            }
        }
    }
}
