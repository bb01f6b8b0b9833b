//! Joint copy number and genotype calling over a two-parent pedigree
//!

use std::collections::BTreeMap;

use log::debug;
use rand::Rng;

use super::allele_evidence::get_use_cn_likelihood;
use super::qscore::estimate_qscores_with_pedigree_info;
use super::{SampleRecord, get_segment_cn_likelihoods, set_independent_genotype};
use crate::copy_number_distribution::CopyNumberDistribution;
use crate::copy_number_model::get_transition_matrix;
use crate::genotypes::{
    Genotype, cap_offspring_genotypes, generate_genotype_combinations, generate_offspring_genotypes,
    generate_parental_genotypes,
};
use crate::parameters::CallerParameters;
use crate::pedigree::PedigreeIndex;
use crate::prob_utils::sanitize_prob;
use crate::segment::SegmentCall;

/// Read-only data shared by all pedigree segment calling workers
///
pub struct PedigreeCaller<'a> {
    samples: &'a [SampleRecord],
    pedigree: &'a PedigreeIndex,
    params: &'a CallerParameters,
    sample_names: Vec<&'a str>,

    /// Allele transmission probabilities, indexed on `[parent_cn][transmitted_allele_count]`
    transition_matrix: Vec<Vec<f64>>,

    /// Phased genotype tuples for all children, in `pedigree.children` order
    offspring_genotypes: Vec<Vec<Genotype>>,

    /// Unphased genotypes for each copy number
    genotypes: BTreeMap<u32, Vec<Genotype>>,
}

/// Result of the joint copy number lattice search for one segment
pub struct PedigreeCnSolution {
    pub copy_numbers: Vec<u32>,
    pub likelihood: f64,
    pub distribution: CopyNumberDistribution,
}

impl<'a> PedigreeCaller<'a> {
    pub fn new<R: Rng>(
        samples: &'a [SampleRecord],
        pedigree: &'a PedigreeIndex,
        params: &'a CallerParameters,
        rng: &mut R,
    ) -> Self {
        let state_count = params.maximum_copy_number;
        let parental_genotypes = generate_parental_genotypes(state_count);
        let offspring_genotypes =
            generate_offspring_genotypes(&parental_genotypes, pedigree.children.len());
        let full_count = offspring_genotypes.len();
        let offspring_genotypes =
            cap_offspring_genotypes(offspring_genotypes, params.max_num_offspring_genotypes, rng);
        if offspring_genotypes.len() < full_count {
            debug!(
                "Offspring genotype combinations reduced from {} to {}",
                full_count,
                offspring_genotypes.len()
            );
        }

        Self {
            samples,
            pedigree,
            params,
            sample_names: samples.iter().map(|x| x.name.as_str()).collect(),
            transition_matrix: get_transition_matrix(state_count, params.denovo_rate),
            offspring_genotypes,
            genotypes: generate_genotype_combinations(state_count),
        }
    }

    /// Search the joint copy number lattice of the pedigree for the maximum likelihood assignment
    ///
    /// Parent copy numbers are enumerated first, followed by each offspring genotype tuple. Each joint
    /// likelihood is accumulated into the copy number distribution, and the first maximum in
    /// enumeration order is selected.
    ///
    /// # Arguments
    /// * `cn_likelihoods` - Coverage likelihood of each copy number for each sample, in sample order
    ///
    pub fn maximal_cn_likelihood_with_pedigree_info(
        &self,
        cn_likelihoods: &[Vec<f64>],
    ) -> PedigreeCnSolution {
        let state_count = self.params.maximum_copy_number as usize;
        let [parent1, parent2] = self.pedigree.parents;
        let children = &self.pedigree.children;
        let tm = &self.transition_matrix;

        let mut distribution = CopyNumberDistribution::new(state_count, &self.sample_names);
        let mut indices = vec![0; self.samples.len()];
        let mut best_indices = indices.clone();
        let mut best_likelihood = None;

        for cn1 in 0..state_count {
            indices[parent1] = cn1;
            for cn2 in 0..state_count {
                indices[parent2] = cn2;
                let parent_likelihood = cn_likelihoods[parent1][cn1] * cn_likelihoods[parent2][cn2];
                for offspring_gts in self.offspring_genotypes.iter() {
                    let mut likelihood = parent_likelihood;
                    for (&child_index, gt) in children.iter().zip(offspring_gts.iter()) {
                        let child_cn = gt.copy_number() as usize;
                        likelihood *= tm[cn1][gt.a as usize]
                            * tm[cn2][gt.b as usize]
                            * cn_likelihoods[child_index][child_cn];
                        indices[child_index] = child_cn;
                    }
                    let likelihood = sanitize_prob(likelihood);
                    distribution.add_joint_probability(likelihood, &indices);

                    if best_likelihood.is_none_or(|x| likelihood > x) {
                        best_likelihood = Some(likelihood);
                        best_indices.clone_from(&indices);
                    }
                }
            }
        }

        PedigreeCnSolution {
            copy_numbers: best_indices.into_iter().map(|x| x as u32).collect(),
            likelihood: best_likelihood.unwrap_or(0.0),
            distribution,
        }
    }

    fn get_gt_likelihood(&self, sample_index: usize, segment_index: usize, gt: &Genotype) -> f64 {
        let sample = &self.samples[sample_index];
        sample.model.get_current_gt_likelihood(
            sample.metrics.max_coverage,
            &sample.segments[segment_index].alleles,
            gt,
        )
    }

    /// Refine the fixed copy number calls of all pedigree members with the most likely pedigree-consistent genotypes
    ///
    /// A child genotype is consistent with the parents if it shares at least one allele count with either parent
    /// genotype. Children already carrying a de novo score are left out of the search.
    ///
    pub fn maximal_gt_likelihood_with_pedigree_info(
        &self,
        segment_index: usize,
        calls: &mut [SegmentCall],
    ) {
        let [parent1, parent2] = self.pedigree.parents;
        let get_gts = |sample_index: usize| &self.genotypes[&calls[sample_index].copy_number];

        let mut best_likelihood = 0.0;
        let mut best_gts: Option<Vec<(usize, usize)>> = None;

        for (gt1_index, gt1) in get_gts(parent1).iter().enumerate() {
            let gt1_likelihood = self.get_gt_likelihood(parent1, segment_index, gt1);
            for (gt2_index, gt2) in get_gts(parent2).iter().enumerate() {
                let mut likelihood =
                    gt1_likelihood * self.get_gt_likelihood(parent2, segment_index, gt2);
                let mut selected = vec![(parent1, gt1_index), (parent2, gt2_index)];

                for &child_index in self.pedigree.children.iter() {
                    if calls[child_index].denovo_qscore.is_some() {
                        continue;
                    }
                    let mut best_child: Option<(usize, f64)> = None;
                    for (gt_index, gt) in get_gts(child_index).iter().enumerate() {
                        if !(gt.shares_allele_with(gt1) || gt.shares_allele_with(gt2)) {
                            continue;
                        }
                        let child_likelihood = self.get_gt_likelihood(child_index, segment_index, gt);
                        if best_child.is_none_or(|(_, x)| child_likelihood > x) {
                            best_child = Some((gt_index, child_likelihood));
                        }
                    }
                    match best_child {
                        Some((gt_index, child_likelihood)) => {
                            likelihood *= child_likelihood;
                            selected.push((child_index, gt_index));
                        }
                        None => {
                            likelihood = 0.0;
                        }
                    }
                }

                let likelihood = sanitize_prob(likelihood);
                if likelihood > best_likelihood {
                    best_likelihood = likelihood;
                    best_gts = Some(selected);
                }
            }
        }

        let all_members = self
            .pedigree
            .parents
            .iter()
            .chain(self.pedigree.children.iter())
            .copied()
            .filter(|&x| calls[x].denovo_qscore.is_none())
            .collect::<Vec<_>>();

        match best_gts {
            Some(selected) => {
                for (sample_index, gt_index) in selected {
                    self.set_genotype(sample_index, segment_index, Some(gt_index), calls);
                }
            }
            None => {
                for sample_index in all_members {
                    self.set_genotype(sample_index, segment_index, None, calls);
                }
            }
        }
    }

    fn set_genotype(
        &self,
        sample_index: usize,
        segment_index: usize,
        gt_index: Option<usize>,
        calls: &mut [SegmentCall],
    ) {
        let call = &mut calls[sample_index];
        let genotypes = &self.genotypes[&call.copy_number];
        set_independent_genotype(
            &self.samples[sample_index],
            segment_index,
            genotypes,
            gt_index,
            call,
        );
    }

    /// Call copy number, genotype and quality scores for every pedigree member at one segment index
    ///
    pub fn call_segment(&self, segment_index: usize) -> Vec<SegmentCall> {
        let cn_likelihoods = get_segment_cn_likelihoods(self.samples, segment_index, self.params);
        let use_cn_likelihood = get_use_cn_likelihood(self.samples, segment_index, self.params);

        let solution = self.maximal_cn_likelihood_with_pedigree_info(&cn_likelihoods);
        if solution.likelihood <= 0.0 {
            debug!("No copy number assignment with non-zero likelihood at segment {segment_index}");
        }

        let mut calls = self
            .samples
            .iter()
            .zip(solution.copy_numbers.iter())
            .map(|(sample, &cn)| SegmentCall {
                copy_number: cn,
                denovo_qscore: sample.segments[segment_index].call.denovo_qscore,
                ..Default::default()
            })
            .collect::<Vec<_>>();

        if !use_cn_likelihood {
            self.maximal_gt_likelihood_with_pedigree_info(segment_index, &mut calls);
        }

        let expected_copy_numbers = self
            .samples
            .iter()
            .map(|x| {
                x.ploidy
                    .get_majority_expected_copy_number(&x.segments[segment_index])
            })
            .collect::<Vec<_>>();

        estimate_qscores_with_pedigree_info(
            self.samples,
            self.pedigree,
            &expected_copy_numbers,
            &solution.distribution,
            &mut calls,
            self.params,
        );
        calls
    }
}
