//! Reading segment input files and writing per-sample call output
//!

use std::fs::File;
use std::io::BufReader;

use camino::{Utf8Path, Utf8PathBuf};
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, map_err_with};
use unwrap::unwrap;

use crate::expected_ploidy::PloidyRegion;
use crate::segment::{Segment, SegmentCall};
use crate::segment_merger::GenomeInterval;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GermlineSampleInput {
    pub name: String,
    pub segments: Vec<Segment>,

    #[serde(default)]
    pub ploidy_regions: Vec<PloidyRegion>,
}

/// Index-aligned segments for every sample to call together
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GermlineInput {
    pub samples: Vec<GermlineSampleInput>,

    /// True if all samples are from targeted enrichment sequencing
    #[serde(default)]
    pub is_enrichment: bool,

    /// Regions which calls may not be merged across in enrichment data, such as the gaps between targets
    #[serde(default)]
    pub excluded_intervals: Vec<GenomeInterval>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SomaticInput {
    pub sample_name: String,
    pub segments: Vec<Segment>,

    /// Coverage evenness score of the sample, if available
    #[serde(default)]
    pub evenness_score: Option<f64>,

    /// True if the sample is from targeted enrichment sequencing
    #[serde(default)]
    pub is_enrichment: bool,

    /// Regions which calls may not be merged across in enrichment data, such as the gaps between targets
    #[serde(default)]
    pub excluded_intervals: Vec<GenomeInterval>,

    #[serde(default)]
    pub ploidy_regions: Vec<PloidyRegion>,
}

/// Get the intervals which segment merging must not cross
///
/// Excluded intervals are only used for enrichment data, and are ignored with a warning otherwise.
///
pub fn get_merge_excluded_intervals(is_enrichment: bool, excluded_intervals: &[GenomeInterval]) -> &[GenomeInterval] {
    if is_enrichment {
        excluded_intervals
    } else {
        if !excluded_intervals.is_empty() {
            warn!(
                "Ignoring {} excluded intervals for input which is not enrichment data",
                excluded_intervals.len()
            );
        }
        &[]
    }
}

/// Read any json input structure from file
///
/// # Arguments
/// * `label` - Describes the file in error messages
///
pub fn read_json_input<T: DeserializeOwned>(filename: &Utf8Path, label: &str) -> SimpleResult<T> {
    info!("Reading {label} from file: '{filename}'");
    let file = map_err_with!(
        File::open(filename),
        format!("Unable to open {label} file: '{filename}'")
    )?;
    let reader = BufReader::new(file);
    let value = map_err_with!(
        serde_json::from_reader(reader),
        format!("Unable to parse {label} from json file: '{filename}'")
    )?;
    Ok(value)
}

#[derive(Serialize)]
struct SegmentCallRecord<'a> {
    chrom: &'a str,
    begin: i64,
    end: i64,

    #[serde(flatten)]
    call: Option<&'a SegmentCall>,
}

#[derive(Serialize)]
struct SampleCallOutput<'a> {
    sample_name: &'a str,
    segments: Vec<SegmentCallRecord<'a>>,
}

pub fn get_sample_calls_filename(output_dir: &Utf8Path, sample_name: &str) -> Utf8PathBuf {
    output_dir.join(format!("{sample_name}.calls.json"))
}

/// Write segment intervals and calls for one sample in json format
///
/// # Arguments
/// * `include_calls` - If false, only segment intervals are written
///
pub fn write_sample_calls(
    output_dir: &Utf8Path,
    sample_name: &str,
    segments: &[Segment],
    include_calls: bool,
) {
    let filename = get_sample_calls_filename(output_dir, sample_name);
    info!("Writing calls for sample '{sample_name}' to file: '{filename}'");

    let output = SampleCallOutput {
        sample_name,
        segments: segments
            .iter()
            .map(|x| SegmentCallRecord {
                chrom: &x.chrom,
                begin: x.begin,
                end: x.end,
                call: include_calls.then_some(&x.call),
            })
            .collect(),
    };

    let f = unwrap!(
        File::create(&filename),
        "Unable to create sample calls json file: '{filename}'"
    );
    serde_json::to_writer_pretty(&f, &output).unwrap();
}
