use unwrap::unwrap;

use crate::prob_utils::sanitize_prob;

/// Joint probability table over the copy number state of every pedigree member
///
/// The table has one axis per sample, each axis spanning all copy number states, so the table size is
/// `state_count^sample_count`. Axis order follows the order of `sample_names`.
///
pub struct CopyNumberDistribution {
    state_count: usize,
    sample_names: Vec<String>,
    values: Vec<f64>,
}

impl CopyNumberDistribution {
    pub fn new(state_count: usize, sample_names: &[&str]) -> Self {
        assert!(state_count > 0);
        let axis_count = sample_names.len() as u32;
        let size = unwrap!(
            state_count.checked_pow(axis_count),
            "Copy number distribution size overflow for {} samples",
            axis_count
        );
        Self {
            state_count,
            sample_names: sample_names.iter().map(|x| x.to_string()).collect(),
            values: vec![0.0; size],
        }
    }

    pub fn state_count(&self) -> usize {
        self.state_count
    }

    pub fn sample_count(&self) -> usize {
        self.sample_names.len()
    }

    fn flat_index(&self, indices: &[usize]) -> usize {
        assert_eq!(
            indices.len(),
            self.sample_names.len(),
            "Copy number distribution index has the wrong number of axes"
        );
        let mut flat = 0;
        for &index in indices {
            assert!(index < self.state_count);
            flat = flat * self.state_count + index;
        }
        flat
    }

    /// Inverse of flat_index, writing the result into `indices`
    fn expand_index(&self, mut flat: usize, indices: &mut [usize]) {
        for index in indices.iter_mut().rev() {
            *index = flat % self.state_count;
            flat /= self.state_count;
        }
    }

    fn axis(&self, sample_name: &str) -> usize {
        match self.sample_names.iter().position(|x| x == sample_name) {
            Some(x) => x,
            None => panic!("Sample '{sample_name}' is not part of the copy number distribution"),
        }
    }

    /// Set the joint probability at `indices`, with non-finite values stored as zero
    pub fn set_joint_probability(&mut self, probability: f64, indices: &[usize]) {
        let flat = self.flat_index(indices);
        self.values[flat] = sanitize_prob(probability).max(0.0);
    }

    /// Add to the joint probability at `indices`, with non-finite values treated as zero
    pub fn add_joint_probability(&mut self, probability: f64, indices: &[usize]) {
        let total = self.get_joint_probability(indices) + sanitize_prob(probability).max(0.0);
        self.set_joint_probability(total, indices);
    }

    pub fn get_joint_probability(&self, indices: &[usize]) -> f64 {
        self.values[self.flat_index(indices)]
    }

    /// Marginal (unnormalized) probability of each copy number state for one sample
    pub fn get_marginal_probability(&self, sample_name: &str) -> Vec<f64> {
        let axis = self.axis(sample_name);
        let mut marginal = vec![0.0; self.state_count];
        let mut indices = vec![0; self.sample_count()];
        for (flat, &value) in self.values.iter().enumerate() {
            if value == 0.0 {
                continue;
            }
            self.expand_index(flat, &mut indices);
            marginal[indices[axis]] += value;
        }
        marginal
    }

    /// Sum the probability of all joint states matching the given per-axis constraints
    ///
    /// `constraints` holds one optional required state for each sample axis; None leaves the axis free.
    ///
    pub fn get_constrained_mass(&self, constraints: &[Option<usize>]) -> f64 {
        assert_eq!(constraints.len(), self.sample_count());
        let mut indices = vec![0; self.sample_count()];
        let mut mass = 0.0;
        for (flat, &value) in self.values.iter().enumerate() {
            if value == 0.0 {
                continue;
            }
            self.expand_index(flat, &mut indices);
            if constraints
                .iter()
                .zip(indices.iter())
                .all(|(c, &i)| c.is_none_or(|c| c == i))
            {
                mass += value;
            }
        }
        mass
    }
}
