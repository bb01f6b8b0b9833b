//! Track stats for the whole run
//!

use std::fs::File;

use camino::Utf8Path;
use log::info;
use serde::Serialize;
use unwrap::unwrap;

use crate::globals::PROGRAM_VERSION;
use crate::segment::Segment;
use crate::somatic::SomaticModelSummary;

pub const RUN_STATS_FILENAME: &str = "run_stats.json";

#[derive(Default, Serialize)]
pub struct SampleCallStats {
    pub sample_name: String,
    pub segment_count: usize,

    /// Count of segments called at a copy number other than the expected copy number
    pub variant_segment_count: usize,

    pub filtered_segment_count: usize,
    pub denovo_segment_count: usize,
}

impl SampleCallStats {
    /// # Arguments
    /// * `expected_copy_numbers` - Expected copy number of each segment
    ///
    pub fn new(sample_name: &str, segments: &[Segment], expected_copy_numbers: &[u32]) -> Self {
        assert_eq!(segments.len(), expected_copy_numbers.len());
        let mut stats = Self {
            sample_name: sample_name.to_string(),
            segment_count: segments.len(),
            ..Default::default()
        };
        for (segment, &expected_cn) in segments.iter().zip(expected_copy_numbers) {
            if segment.call.copy_number != expected_cn {
                stats.variant_segment_count += 1;
            }
            if segment.call.filter.is_some() {
                stats.filtered_segment_count += 1;
            }
            if segment.call.denovo_qscore.is_some() {
                stats.denovo_segment_count += 1;
            }
        }
        stats
    }
}

#[derive(Serialize)]
pub struct GermlineRunStats {
    pub program_version: &'static str,
    pub pedigree_mode: bool,
    pub samples: Vec<SampleCallStats>,
    pub total_runtime_secs: f64,
}

#[derive(Serialize)]
pub struct SomaticRunStats {
    pub program_version: &'static str,
    pub sample: SampleCallStats,

    /// Selected purity/ploidy model, None if the sample could not be modeled
    pub model: Option<SomaticModelSummary>,

    pub modeling_error: Option<String>,
    pub total_runtime_secs: f64,
}

impl GermlineRunStats {
    pub fn new(pedigree_mode: bool, samples: Vec<SampleCallStats>, total_runtime_secs: f64) -> Self {
        Self {
            program_version: PROGRAM_VERSION,
            pedigree_mode,
            samples,
            total_runtime_secs,
        }
    }
}

impl SomaticRunStats {
    pub fn new(
        sample: SampleCallStats,
        model: Option<SomaticModelSummary>,
        modeling_error: Option<String>,
        total_runtime_secs: f64,
    ) -> Self {
        Self {
            program_version: PROGRAM_VERSION,
            sample,
            model,
            modeling_error,
            total_runtime_secs,
        }
    }
}

/// Write run_stats structure out in json format
pub fn write_run_stats<T: Serialize>(output_dir: &Utf8Path, run_stats: &T) {
    let filename = output_dir.join(RUN_STATS_FILENAME);

    info!("Writing run statistics to file: '{filename}'");

    let f = unwrap!(
        File::create(&filename),
        "Unable to create run statistics json file: '{filename}'"
    );

    serde_json::to_writer_pretty(&f, &run_stats).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Balleles;

    #[test]
    fn test_sample_call_stats() {
        let mut segments = (0..4)
            .map(|i| Segment::new("chr1", i * 100, (i + 1) * 100, Vec::new(), Balleles::default()))
            .collect::<Vec<_>>();
        for segment in segments.iter_mut() {
            segment.call.copy_number = 2;
        }
        segments[1].call.copy_number = 3;
        segments[1].call.denovo_qscore = Some(40.0);
        segments[2].call.filter = Some("q10".to_string());
        segments[3].call.copy_number = 1;

        let stats = SampleCallStats::new("a", &segments, &[2, 2, 2, 1]);
        assert_eq!(stats.segment_count, 4);
        assert_eq!(stats.variant_segment_count, 1);
        assert_eq!(stats.filtered_segment_count, 1);
        assert_eq!(stats.denovo_segment_count, 1);
    }
}
