use serde::Serialize;

/// Tumor copy number and major chromosome count hypothesis for a segment
///
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentPloidy {
    pub copy_number: u32,
    pub major_chromosome_count: u32,

    /// Expected MAF of a pure tumor segment with this ploidy
    pub minor_allele_frequency: f64,
}

impl SegmentPloidy {
    pub fn new(copy_number: u32, major_chromosome_count: u32) -> Self {
        assert!(major_chromosome_count <= copy_number);
        let minor_allele_frequency = if copy_number == 0 {
            0.5
        } else {
            (copy_number - major_chromosome_count) as f64 / copy_number as f64
        };
        Self {
            copy_number,
            major_chromosome_count,
            minor_allele_frequency,
        }
    }

    pub fn minor_chromosome_count(&self) -> u32 {
        self.copy_number - self.major_chromosome_count
    }

    /// Expected coverage of the segment in a tumor/normal mixture
    pub fn mixed_coverage(&self, diploid_coverage: f64, purity: f64) -> f64 {
        diploid_coverage * ((1.0 - purity) + purity * self.copy_number as f64 / 2.0)
    }

    /// Expected MAF of the segment in a tumor/normal mixture
    ///
    /// Normal cells contribute one copy of each allele.
    ///
    pub fn mixed_minor_allele_frequency(&self, purity: f64) -> f64 {
        let numerator = (1.0 - purity) + purity * self.minor_chromosome_count() as f64;
        let denominator = 2.0 * (1.0 - purity) + purity * self.copy_number as f64;
        if denominator <= 0.0 {
            self.minor_allele_frequency
        } else {
            numerator / denominator
        }
    }

    pub fn mixed_point(&self, diploid_coverage: f64, purity: f64) -> ModelPoint {
        ModelPoint {
            coverage: self.mixed_coverage(diploid_coverage, purity),
            maf: self.mixed_minor_allele_frequency(purity),
        }
    }
}

/// Expected (coverage, MAF) of one segment ploidy under a given diploid coverage and purity
///
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ModelPoint {
    pub coverage: f64,
    pub maf: f64,
}

/// Enumerate all ploidy hypotheses up to and including `maximum_copy_number`
///
/// For each copy number, major chromosome counts run from the copy number down to the balanced count.
///
pub fn generate_segment_ploidies(maximum_copy_number: u32) -> Vec<SegmentPloidy> {
    let mut ploidies = Vec::new();
    for copy_number in 0..=maximum_copy_number {
        let min_major = copy_number.div_ceil(2);
        for major_chromosome_count in (min_major..=copy_number).rev() {
            ploidies.push(SegmentPloidy::new(copy_number, major_chromosome_count));
        }
    }
    ploidies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_segment_ploidies() {
        let ploidies = generate_segment_ploidies(4);
        let pairs = ploidies
            .iter()
            .map(|x| (x.copy_number, x.major_chromosome_count))
            .collect::<Vec<_>>();
        assert_eq!(
            pairs,
            vec![(0, 0), (1, 1), (2, 2), (2, 1), (3, 3), (3, 2), (4, 4), (4, 3), (4, 2)]
        );
        approx::assert_ulps_eq!(ploidies[0].minor_allele_frequency, 0.5, max_ulps = 4);
        approx::assert_ulps_eq!(ploidies[5].minor_allele_frequency, 1.0 / 3.0, max_ulps = 4);
    }

    #[test]
    fn test_mixture() {
        let ploidy = SegmentPloidy::new(1, 1);
        approx::assert_ulps_eq!(ploidy.mixed_coverage(50.0, 0.6), 35.0, max_ulps = 4);
        approx::assert_ulps_eq!(ploidy.mixed_minor_allele_frequency(0.6), 2.0 / 7.0, max_ulps = 4);

        let ploidy = SegmentPloidy::new(2, 1);
        approx::assert_ulps_eq!(ploidy.mixed_coverage(50.0, 0.6), 50.0, max_ulps = 4);
        approx::assert_ulps_eq!(ploidy.mixed_minor_allele_frequency(0.6), 0.5, max_ulps = 4);

        // Pure tumor matches the theoretical MAF:
        let ploidy = SegmentPloidy::new(3, 2);
        approx::assert_ulps_eq!(
            ploidy.mixed_minor_allele_frequency(1.0),
            ploidy.minor_allele_frequency,
            max_ulps = 4
        );
    }
}
