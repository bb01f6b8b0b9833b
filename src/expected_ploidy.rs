use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::segment::Segment;

pub const DEFAULT_EXPECTED_COPY_NUMBER: u32 = 2;

/// A region with a non-default reference copy number, such as the sex chromosomes of a male sample
///
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PloidyRegion {
    pub chrom: String,
    pub begin: i64,
    pub end: i64,
    pub ploidy: u32,
}

/// Expected copy number regions for one sample
///
/// Any position not covered by a region has the default expected copy number of 2.
///
#[derive(Clone, Debug, Default)]
pub struct PloidyInfo {
    /// Regions for each chromosome, sorted by begin position
    chrom_regions: BTreeMap<String, Vec<PloidyRegion>>,
}

impl PloidyInfo {
    pub fn new(regions: &[PloidyRegion]) -> Self {
        let mut chrom_regions: BTreeMap<String, Vec<PloidyRegion>> = BTreeMap::new();
        for region in regions {
            assert!(
                region.end > region.begin,
                "Invalid ploidy region {}:{}-{}",
                region.chrom,
                region.begin,
                region.end
            );
            chrom_regions
                .entry(region.chrom.clone())
                .or_default()
                .push(region.clone());
        }
        for regions in chrom_regions.values_mut() {
            regions.sort_by_key(|x| x.begin);
        }
        Self { chrom_regions }
    }

    /// Provide an expected copy number for the given target segment
    ///
    /// If the target overlaps multiple expected copy number regions, this routine will provide the
    /// one covering the majority of the segment, where the uncovered part of the segment counts
    /// towards the default copy number.
    ///
    pub fn get_majority_expected_copy_number(&self, target: &Segment) -> u32 {
        let Some(regions) = self.chrom_regions.get(&target.chrom) else {
            return DEFAULT_EXPECTED_COPY_NUMBER;
        };

        let mut cn_span: BTreeMap<u32, i64> = BTreeMap::new();
        let mut covered = 0;
        for region in regions.iter() {
            if region.begin >= target.end {
                break;
            }
            let span = std::cmp::min(region.end, target.end) - std::cmp::max(region.begin, target.begin);
            if span > 0 {
                *cn_span.entry(region.ploidy).or_insert(0) += span;
                covered += span;
            }
        }
        let uncovered = target.length() - covered;
        if uncovered > 0 {
            *cn_span.entry(DEFAULT_EXPECTED_COPY_NUMBER).or_insert(0) += uncovered;
        }

        let mut max_cn = DEFAULT_EXPECTED_COPY_NUMBER;
        let mut max_span = 0;
        for (&cn, &span) in cn_span.iter() {
            if span > max_span {
                max_cn = cn;
                max_span = span;
            }
        }
        max_cn
    }

    /// Expected copy number for each segment in order
    pub fn get_segment_expected_copy_numbers(&self, segments: &[Segment]) -> Vec<u32> {
        segments
            .iter()
            .map(|x| self.get_majority_expected_copy_number(x))
            .collect()
    }
}
