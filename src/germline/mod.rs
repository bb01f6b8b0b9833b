//! Germline copy number calling for a pedigree or a set of unrelated samples
//!

mod allele_evidence;
mod no_pedigree_caller;
mod pedigree_caller;
pub(crate) mod qscore;

use std::ops::Range;
use std::sync::mpsc::channel;

use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;

use self::no_pedigree_caller::NoPedigreeCaller;
use self::pedigree_caller::PedigreeCaller;
use crate::copy_number_model::CopyNumberModel;
use crate::expected_ploidy::PloidyInfo;
use crate::genotypes::Genotype;
use crate::parameters::CallerParameters;
use crate::pedigree::{KinshipRole, PedigreeIndex};
use crate::sample_metrics::SampleMetrics;
use crate::segment::{Segment, SegmentCall, assert_segments_aligned};

/// Maximum number of segment intervals processed in parallel
const MAX_SEGMENT_PARTITIONS: usize = 30;

/// All input data and models for one germline sample
///
pub struct SampleRecord {
    pub name: String,

    /// Role in the pedigree, or None when samples are called without a pedigree
    pub role: Option<KinshipRole>,

    pub segments: Vec<Segment>,
    pub metrics: SampleMetrics,
    pub ploidy: PloidyInfo,
    pub model: CopyNumberModel,
}

impl SampleRecord {
    pub fn new(
        name: &str,
        role: Option<KinshipRole>,
        segments: Vec<Segment>,
        ploidy: PloidyInfo,
        params: &CallerParameters,
    ) -> Self {
        let metrics = SampleMetrics::new(&segments, params.number_of_trimmed_bins);
        let model = CopyNumberModel::new(params.maximum_copy_number, &metrics);
        Self {
            name: name.to_string(),
            role,
            segments,
            metrics,
            ploidy,
            model,
        }
    }
}

/// Coverage likelihood of each copy number state for each sample at one segment
pub(crate) fn get_segment_cn_likelihoods(
    samples: &[SampleRecord],
    segment_index: usize,
    params: &CallerParameters,
) -> Vec<Vec<f64>> {
    samples
        .iter()
        .map(|x| {
            let coverage =
                x.segments[segment_index].truncated_median_count(params.number_of_trimmed_bins);
            x.model.get_cn_likelihood(coverage)
        })
        .collect()
}

/// Set major chromosome count of a call from the sample's allele evidence, without pedigree constraints
///
/// Calls with copy number 2 or less take the copy number as the major count. Calls without any allele
/// observations are left unset.
///
/// # Arguments
/// * `genotypes` - Candidate genotypes for the called copy number
/// * `gt_index` - If set, the genotype selected by a joint search, otherwise the individually best genotype is used
///
pub(crate) fn set_independent_genotype(
    sample: &SampleRecord,
    segment_index: usize,
    genotypes: &[Genotype],
    gt_index: Option<usize>,
    call: &mut SegmentCall,
) {
    let alleles = &sample.segments[segment_index].alleles;
    if alleles.is_empty() {
        call.major_chromosome_count = None;
        call.major_chromosome_count_score = None;
        return;
    }
    if call.copy_number <= 2 {
        call.major_chromosome_count = Some(call.copy_number);
        return;
    }
    let (score, selected) = sample.model.get_gt_likelihood_score(
        alleles,
        genotypes,
        gt_index,
        sample.metrics.max_coverage,
    );
    call.major_chromosome_count = Some(genotypes[selected].major_count());
    call.major_chromosome_count_score = Some(score);
}

/// Split `0..segment_count` into at most `partition_count` contiguous intervals of near-equal size
fn get_segment_partitions(segment_count: usize, partition_count: usize) -> Vec<Range<usize>> {
    let partition_count = partition_count.clamp(1, std::cmp::max(segment_count, 1));
    let base_size = segment_count / partition_count;
    let remainder = segment_count % partition_count;
    let mut partitions = Vec::with_capacity(partition_count);
    let mut begin = 0;
    for partition_index in 0..partition_count {
        let size = base_size + if partition_index < remainder { 1 } else { 0 };
        if size > 0 {
            partitions.push(begin..begin + size);
        }
        begin += size;
    }
    partitions
}

enum GermlineCaller<'a> {
    Pedigree(PedigreeCaller<'a>),
    NoPedigree(NoPedigreeCaller<'a>),
}

impl GermlineCaller<'_> {
    fn call_segment(&self, segment_index: usize) -> Vec<SegmentCall> {
        match self {
            GermlineCaller::Pedigree(x) => x.call_segment(segment_index),
            GermlineCaller::NoPedigree(x) => x.call_segment(segment_index),
        }
    }
}

/// Call copy number for all segments of all samples
///
/// Segment indices are partitioned into contiguous intervals processed in parallel on `thread_count` workers.
/// Calls are written back to the sample segments after all workers complete.
///
/// # Arguments
/// * `pedigree` - Sample role indices. If None all samples are called as unrelated
/// * `seed` - Seed for the random subsampling of large offspring genotype sets
///
pub fn call_germline_samples(
    samples: &mut [SampleRecord],
    pedigree: Option<&PedigreeIndex>,
    params: &CallerParameters,
    thread_count: usize,
    seed: u64,
) {
    let sample_names = samples.iter().map(|x| x.name.as_str()).collect::<Vec<_>>();
    assert_segments_aligned(&sample_names, samples.iter().map(|x| x.segments.as_slice()));

    let segment_count = samples.first().map(|x| x.segments.len()).unwrap_or(0);
    if segment_count == 0 {
        return;
    }

    let segment_calls = {
        let samples = &*samples;
        let mut rng = StdRng::seed_from_u64(seed);
        let caller = match pedigree {
            Some(pedigree) => {
                info!("Calling {} samples with pedigree", samples.len());
                GermlineCaller::Pedigree(PedigreeCaller::new(samples, pedigree, params, &mut rng))
            }
            None => {
                info!("Calling {} samples without pedigree", samples.len());
                GermlineCaller::NoPedigree(NoPedigreeCaller::new(samples, params))
            }
        };
        let caller = &caller;

        let partitions = get_segment_partitions(
            segment_count,
            std::cmp::min(thread_count, MAX_SEGMENT_PARTITIONS),
        );

        let worker_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(thread_count)
            .build()
            .unwrap();

        let (tx, rx) = channel();
        worker_pool.scope(move |scope| {
            for partition in partitions {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let calls = partition
                        .map(|segment_index| (segment_index, caller.call_segment(segment_index)))
                        .collect::<Vec<_>>();
                    tx.send(calls).unwrap();
                });
            }
        });
        rx.into_iter().flatten().collect::<Vec<_>>()
    };
    assert_eq!(segment_calls.len(), segment_count);

    for (segment_index, calls) in segment_calls {
        for (sample, call) in samples.iter_mut().zip(calls) {
            sample.segments[segment_index].call = call;
        }
    }
}
