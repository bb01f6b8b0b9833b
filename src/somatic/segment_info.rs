use crate::parameters::SomaticCallerParameters;
use crate::segment::{Segment, median};

/// MAF value of a segment with too few allele sites to estimate MAF
pub const UNUSABLE_MAF: f64 = -1.0;

/// Summary of one segment used for purity/ploidy modeling
///
#[derive(Clone, Debug)]
pub struct SegmentInfo {
    /// Index of the segment in the sample's full segment list
    pub segment_index: usize,

    /// Truncated median bin count
    pub coverage: f64,

    /// Median minor allele frequency, or `UNUSABLE_MAF`
    pub maf: f64,

    pub maf_site_count: usize,
    pub weight: f64,

    /// Cluster assignment, None for segments which were not clustered or were marked as outliers
    pub cluster_id: Option<usize>,
}

impl SegmentInfo {
    pub fn has_maf(&self) -> bool {
        self.maf >= 0.0
    }
}

/// Coverage and MAF of one segment, with MAF set to `UNUSABLE_MAF` if the segment has too few allele sites
pub fn get_segment_coverage_and_maf(segment: &Segment, params: &SomaticCallerParameters) -> (f64, f64) {
    let coverage = segment.truncated_median_count(params.number_of_trimmed_bins);
    let maf = if segment.alleles.len() >= params.min_maf_sites {
        segment.median_minor_allele_frequency().unwrap_or(UNUSABLE_MAF)
    } else {
        UNUSABLE_MAF
    };
    (coverage, maf)
}

/// Select and summarize all segments usable for purity/ploidy modeling
///
/// Short segments are removed, followed by any segment with coverage more than twice the median. Segment
/// weight is the segment length when there are many usable segments and the bin count otherwise, and is
/// reduced in proportion to the allele site count when the segment has few sites.
///
pub fn get_usable_segments(segments: &[Segment], params: &SomaticCallerParameters) -> Vec<SegmentInfo> {
    let mut infos = segments
        .iter()
        .enumerate()
        .filter(|(_, x)| x.length() >= params.min_usable_segment_length && x.bin_count() > 0)
        .map(|(segment_index, segment)| {
            let (coverage, maf) = get_segment_coverage_and_maf(segment, params);
            SegmentInfo {
                segment_index,
                coverage,
                maf,
                maf_site_count: segment.alleles.len(),
                weight: 0.0,
                cluster_id: None,
            }
        })
        .collect::<Vec<_>>();

    let median_coverage = median(&infos.iter().map(|x| x.coverage).collect::<Vec<_>>());
    infos.retain(|x| x.coverage <= 2.0 * median_coverage);

    let use_length_weight = infos.len() >= params.length_weight_segment_count;
    for info in infos.iter_mut() {
        let segment = &segments[info.segment_index];
        let mut weight = if use_length_weight {
            segment.length() as f64
        } else {
            segment.bin_count() as f64
        };
        if info.maf_site_count < params.full_weight_maf_sites {
            weight *= std::cmp::max(info.maf_site_count, 1) as f64
                / params.full_weight_maf_sites as f64;
        }
        info.weight = weight;
    }
    infos
}
