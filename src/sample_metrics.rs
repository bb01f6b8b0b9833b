use serde::Serialize;

use crate::segment::Segment;

/// Genome-wide coverage summary statistics for one sample
///
#[derive(Clone, Debug, Serialize)]
pub struct SampleMetrics {
    /// Mean bin depth over all segments
    pub mean_coverage: f64,

    /// Mean total allele depth over all heterozygous sites
    pub mean_maf_coverage: f64,

    /// Variance of the segment coverage estimates
    pub variance: f64,

    /// Variance of the per-segment mean allele depth
    pub maf_variance: f64,

    /// Upper bound on coverage values used to tabulate likelihoods
    pub max_coverage: usize,
}

/// Extra headroom added to the highest segment coverage to form `max_coverage`
const MAX_COVERAGE_PADDING: usize = 10;

fn mean(x: impl Iterator<Item = f64>) -> Option<f64> {
    let mut count = 0usize;
    let mut sum = 0.0;
    for v in x {
        count += 1;
        sum += v;
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Sample variance (n-1 denominator), 0 for fewer than 2 values
pub fn variance(x: &[f64]) -> f64 {
    if x.len() < 2 {
        return 0.0;
    }
    let m = x.iter().sum::<f64>() / x.len() as f64;
    x.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (x.len() - 1) as f64
}

impl SampleMetrics {
    /// Compute sample summary statistics from all of its segments
    ///
    /// # Arguments
    /// * `trimmed_bins` - Number of lowest and highest bins discarded from each segment's coverage estimate
    ///
    pub fn new(segments: &[Segment], trimmed_bins: usize) -> Self {
        let segment_coverage = segments
            .iter()
            .map(|x| x.truncated_median_count(trimmed_bins))
            .collect::<Vec<_>>();

        let mean_coverage =
            mean(segments.iter().flat_map(|x| x.counts.iter().map(|&c| c as f64))).unwrap_or(0.0);

        let mean_maf_coverage = mean(
            segments
                .iter()
                .flat_map(|x| x.alleles.sites.iter().map(|s| s.total_coverage() as f64)),
        )
        .unwrap_or(0.0);

        let segment_maf_coverage = segments
            .iter()
            .filter_map(|x| x.alleles.mean_total_coverage())
            .collect::<Vec<_>>();

        let max_segment_coverage = segment_coverage.iter().cloned().fold(0.0, f64::max);

        Self {
            mean_coverage,
            mean_maf_coverage,
            variance: variance(&segment_coverage),
            maf_variance: variance(&segment_maf_coverage),
            max_coverage: max_segment_coverage.round() as usize + MAX_COVERAGE_PADDING,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{Ballele, Balleles};

    #[test]
    fn test_sample_metrics() {
        let segments = vec![
            Segment::new(
                "chr1",
                0,
                1000,
                vec![10.0, 20.0, 30.0],
                Balleles::new(vec![Ballele::new(1, 5, 5), Ballele::new(2, 10, 10)]),
            ),
            Segment::new("chr1", 1000, 2000, vec![40.0, 40.0, 40.0], Balleles::default()),
        ];
        let metrics = SampleMetrics::new(&segments, 0);
        approx::assert_ulps_eq!(metrics.mean_coverage, 30.0, max_ulps = 4);
        approx::assert_ulps_eq!(metrics.mean_maf_coverage, 15.0, max_ulps = 4);
        approx::assert_ulps_eq!(metrics.variance, 200.0, max_ulps = 4);
        approx::assert_ulps_eq!(metrics.maf_variance, 0.0, max_ulps = 4);
        assert_eq!(metrics.max_coverage, 50);
    }

    #[test]
    fn test_variance() {
        approx::assert_ulps_eq!(variance(&[1.0, 2.0, 3.0, 4.0]), 5.0 / 3.0, max_ulps = 4);
        approx::assert_ulps_eq!(variance(&[1.0]), 0.0, max_ulps = 4);
    }
}
