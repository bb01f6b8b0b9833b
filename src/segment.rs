use std::fmt;

use serde::{Deserialize, Serialize};

/// Observed reference and alternate allele read counts at one heterozygous site
///
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Ballele {
    /// Zero-indexed position of the site
    pub position: i64,
    pub ref_count: u32,
    pub alt_count: u32,
}

impl Ballele {
    pub fn new(position: i64, ref_count: u32, alt_count: u32) -> Self {
        Self {
            position,
            ref_count,
            alt_count,
        }
    }

    pub fn total_coverage(&self) -> u32 {
        self.ref_count + self.alt_count
    }

    /// Minor allele frequency of the site, or None when the site has no coverage
    pub fn minor_allele_frequency(&self) -> Option<f64> {
        let total = self.total_coverage();
        if total == 0 {
            None
        } else {
            Some(std::cmp::min(self.ref_count, self.alt_count) as f64 / total as f64)
        }
    }
}

/// All allele observations within one segment
///
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Balleles {
    pub sites: Vec<Ballele>,
}

impl Balleles {
    pub fn new(sites: Vec<Ballele>) -> Self {
        Self { sites }
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn total_coverage(&self) -> Vec<u32> {
        self.sites.iter().map(|x| x.total_coverage()).collect()
    }

    /// Minor allele frequency for each site with non-zero coverage
    pub fn frequencies(&self) -> Vec<f64> {
        self.sites
            .iter()
            .filter_map(|x| x.minor_allele_frequency())
            .collect()
    }

    pub fn mean_total_coverage(&self) -> Option<f64> {
        if self.sites.is_empty() {
            None
        } else {
            let total = self.sites.iter().map(|x| x.total_coverage() as f64).sum::<f64>();
            Some(total / self.sites.len() as f64)
        }
    }
}

/// Copy number call and all associated scores for one segment in one sample
///
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct SegmentCall {
    pub copy_number: u32,

    /// Larger of the two allele-specific copy counts, only set when allele evidence was used
    pub major_chromosome_count: Option<u32>,

    pub major_chromosome_count_score: Option<f64>,

    pub qscore: f64,

    /// Only defined for pedigree probands with a candidate de novo copy number change
    pub denovo_qscore: Option<f64>,

    pub filter: Option<String>,

    pub model_distance: Option<f64>,
    pub runner_up_model_distance: Option<f64>,

    pub cluster_id: Option<i32>,
    pub is_heterogeneous: bool,
}

/// A genomic interval with all coverage and allele observations for one sample
///
/// Interval is zero-indexed, half-closed `[begin,end)`
///
#[derive(Clone, Deserialize, PartialEq, Serialize)]
pub struct Segment {
    pub chrom: String,
    pub begin: i64,
    pub end: i64,

    /// Read depth for each bin in the segment
    pub counts: Vec<f32>,

    #[serde(default)]
    pub alleles: Balleles,

    #[serde(default)]
    pub call: SegmentCall,
}

impl Segment {
    pub fn new(chrom: &str, begin: i64, end: i64, counts: Vec<f32>, alleles: Balleles) -> Self {
        Self {
            chrom: chrom.to_string(),
            begin,
            end,
            counts,
            alleles,
            call: SegmentCall::default(),
        }
    }

    pub fn length(&self) -> i64 {
        self.end - self.begin
    }

    pub fn bin_count(&self) -> usize {
        self.counts.len()
    }

    /// Median bin count after discarding `trimmed_bins` of the lowest and highest counts
    ///
    /// If too few bins remain after trimming, the untrimmed median is used.
    ///
    pub fn truncated_median_count(&self, trimmed_bins: usize) -> f64 {
        let mut counts = self.counts.iter().map(|&x| x as f64).collect::<Vec<_>>();
        counts.sort_by(|a, b| a.total_cmp(b));
        if counts.len() > 2 * trimmed_bins {
            median_of_sorted(&counts[trimmed_bins..counts.len() - trimmed_bins])
        } else {
            median_of_sorted(&counts)
        }
    }

    /// Median minor allele frequency over all sites with coverage
    pub fn median_minor_allele_frequency(&self) -> Option<f64> {
        let mut freqs = self.alleles.frequencies();
        if freqs.is_empty() {
            return None;
        }
        freqs.sort_by(|a, b| a.total_cmp(b));
        Some(median_of_sorted(&freqs))
    }

    /// Return true if the ranges intersect or are separated by no more than `max_gap` bases
    pub fn is_within_gap(&self, next: &Segment, max_gap: i64) -> bool {
        self.chrom == next.chrom && (next.begin - self.end) <= max_gap
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Segment: {}:{}-{} CN:{}",
            self.chrom, self.begin, self.end, self.call.copy_number
        )
    }
}

/// Median of values which are already sorted
///
/// Returns 0 for empty input
///
pub fn median_of_sorted(x: &[f64]) -> f64 {
    let len = x.len();
    if len == 0 {
        0.0
    } else if len % 2 == 1 {
        x[len / 2]
    } else {
        (x[len / 2 - 1] + x[len / 2]) / 2.0
    }
}

pub fn median(x: &[f64]) -> f64 {
    let mut x = x.to_vec();
    x.sort_by(|a, b| a.total_cmp(b));
    median_of_sorted(&x)
}

/// Check that segment lists from all samples describe the same genomic intervals
///
/// Any alignment failure is an input-integrity violation, so this panics instead of returning an error.
///
pub fn assert_segments_aligned<'a>(
    sample_names: &[&str],
    sample_segments: impl IntoIterator<Item = &'a [Segment]>,
) {
    let sample_segments = sample_segments.into_iter().collect::<Vec<_>>();
    assert_eq!(sample_names.len(), sample_segments.len());
    let Some(first) = sample_segments.first() else {
        return;
    };
    for (sample_index, segments) in sample_segments.iter().enumerate().skip(1) {
        assert_eq!(
            segments.len(),
            first.len(),
            "Segment count in sample '{}' ({}) does not match sample '{}' ({})",
            sample_names[sample_index],
            segments.len(),
            sample_names[0],
            first.len()
        );
        for (a, b) in first.iter().zip(segments.iter()) {
            assert!(
                a.chrom == b.chrom && a.begin == b.begin && a.end == b.end,
                "Segment {:?} in sample '{}' is not aligned with segment {:?} in sample '{}'",
                b,
                sample_names[sample_index],
                a,
                sample_names[0]
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_median_count() {
        let s = Segment::new(
            "chr1",
            0,
            1000,
            vec![1.0, 100.0, 10.0, 11.0, 12.0, 0.0],
            Balleles::default(),
        );
        approx::assert_ulps_eq!(s.truncated_median_count(1), 10.5, max_ulps = 4);
        approx::assert_ulps_eq!(s.truncated_median_count(2), 10.5, max_ulps = 4);
        approx::assert_ulps_eq!(s.truncated_median_count(0), 10.5, max_ulps = 4);

        let s = Segment::new("chr1", 0, 1000, vec![3.0, 1.0], Balleles::default());
        approx::assert_ulps_eq!(s.truncated_median_count(2), 2.0, max_ulps = 4);
    }

    #[test]
    fn test_debug_format() {
        let mut s = Segment::new("chr1", 100, 1000, vec![40.0], Balleles::default());
        s.call.copy_number = 3;
        assert_eq!(format!("{s:?}"), "Segment: chr1:100-1000 CN:3");
    }

    #[test]
    fn test_median_minor_allele_frequency() {
        let alleles = Balleles::new(vec![
            Ballele::new(10, 10, 30),
            Ballele::new(20, 20, 20),
            Ballele::new(30, 0, 0),
            Ballele::new(40, 30, 10),
        ]);
        let s = Segment::new("chr1", 0, 1000, vec![40.0], alleles);
        assert_eq!(s.alleles.frequencies().len(), 3);
        approx::assert_ulps_eq!(s.median_minor_allele_frequency().unwrap(), 0.25, max_ulps = 4);

        let s = Segment::new("chr1", 0, 1000, vec![40.0], Balleles::default());
        assert!(s.median_minor_allele_frequency().is_none());
    }

    #[test]
    #[should_panic]
    fn test_unaligned_segments() {
        let a = vec![Segment::new("chr1", 0, 100, vec![], Balleles::default())];
        let b = vec![Segment::new("chr1", 0, 200, vec![], Balleles::default())];
        assert_segments_aligned(&["a", "b"], [a.as_slice(), b.as_slice()]);
    }
}
