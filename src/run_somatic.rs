use std::error;

use camino::{Utf8Path, Utf8PathBuf};
use log::{error, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::cli;
use crate::errors::ModelingError;
use crate::expected_ploidy::PloidyInfo;
use crate::parameters::{SomaticCallerParameters, read_parameters};
use crate::run_stats::{SampleCallStats, SomaticRunStats, write_run_stats};
use crate::sample_io::{SomaticInput, get_merge_excluded_intervals, read_json_input, write_sample_calls};
use crate::segment::{Segment, SegmentCall};
use crate::segment_merger::{MergeSettings, merge_segments};
use crate::somatic::report::{JsonModelReporter, ModelReporter};
use crate::somatic::{KnownModelValues, SampleDataProperties, call_somatic_sample};

pub const NO_CALL_FILTER: &str = "NoCall";

fn get_model_debug_filename(output_dir: &Utf8Path, sample_name: &str) -> Utf8PathBuf {
    output_dir.join(format!("{sample_name}.model_debug.json"))
}

/// Replace every segment call with an unscored call at the expected copy number
///
fn set_no_calls(segments: &mut [Segment], expected_copy_numbers: &[u32]) {
    for (segment, &expected_cn) in segments.iter_mut().zip(expected_copy_numbers) {
        segment.call = SegmentCall {
            copy_number: expected_cn,
            filter: Some(NO_CALL_FILTER.to_string()),
            ..Default::default()
        };
    }
}

/// Get the segments to write, and whether to write their calls, when purity/ploidy modeling fails
///
/// In training mode every failure gives empty output. Otherwise, too few usable segments gives segments
/// without calls, and uncallable data gives no-calls at the expected copy number.
///
fn get_failed_modeling_output(
    err: &ModelingError,
    training_mode: bool,
    mut segments: Vec<Segment>,
    ploidy: &PloidyInfo,
) -> (Vec<Segment>, bool) {
    if training_mode {
        return (Vec::new(), true);
    }
    match err {
        ModelingError::NotEnoughUsableSegments { .. } => (segments, false),
        ModelingError::UncallableData(_) => {
            let expected_copy_numbers = ploidy.get_segment_expected_copy_numbers(&segments);
            set_no_calls(&mut segments, &expected_copy_numbers);
            (segments, true)
        }
    }
}

pub fn run_somatic(
    shared_settings: &cli::SharedSettings,
    settings: &cli::SomaticSettings,
) -> Result<(), Box<dyn error::Error>> {
    let start = std::time::Instant::now();

    let params = match &settings.parameters_filename {
        Some(filename) => read_parameters::<SomaticCallerParameters>(filename)?,
        None => SomaticCallerParameters::default(),
    };
    params.validate()?;

    let input = read_json_input::<SomaticInput>(&settings.input_filename, "somatic segment input")?;
    let sample_name = input.sample_name.as_str();
    let ploidy = PloidyInfo::new(&input.ploidy_regions);
    let mut segments = input.segments;

    let properties = SampleDataProperties {
        evenness_score: input.evenness_score,
        is_enrichment: input.is_enrichment,
    };
    let known = KnownModelValues {
        purity: settings.known_purity,
        ploidy: settings.known_ploidy,
    };
    let mut rng = StdRng::seed_from_u64(shared_settings.seed);
    let mut debug_reporter = settings.debug_model_output.then(JsonModelReporter::default);

    let result = call_somatic_sample(
        &mut segments,
        &properties,
        &known,
        &params,
        &mut rng,
        debug_reporter.as_mut().map(|x| x as &mut dyn ModelReporter),
    );

    if let Some(reporter) = debug_reporter {
        info!("Writing {} evaluated purity/ploidy models", reporter.model_count());
        reporter.write(&get_model_debug_filename(&settings.output_dir, sample_name));
    }

    let (segments, model, modeling_error, include_calls) = match result {
        Ok(summary) => {
            info!(
                "Selected model for sample '{sample_name}': purity {:.3} ploidy {:.3} diploid coverage {:.2}",
                summary.purity, summary.ploidy, summary.diploid_coverage
            );
            let merge_settings = MergeSettings {
                min_call_size: params.minimum_call_size,
                max_gap: params.max_merge_gap,
                excluded_intervals: get_merge_excluded_intervals(input.is_enrichment, &input.excluded_intervals),
            };
            let segments = merge_segments(segments, &merge_settings);
            (segments, Some(summary), None, true)
        }
        Err(err) => {
            if settings.training_mode {
                error!("Sample '{sample_name}' could not be modeled, writing empty call output: {err}");
            } else {
                warn!("Sample '{sample_name}' could not be modeled: {err}");
            }
            let (segments, include_calls) =
                get_failed_modeling_output(&err, settings.training_mode, segments, &ploidy);
            (segments, None, Some(err.to_string()), include_calls)
        }
    };

    write_sample_calls(&settings.output_dir, sample_name, &segments, include_calls);

    let expected_copy_numbers = ploidy.get_segment_expected_copy_numbers(&segments);
    let sample_stats = SampleCallStats::new(sample_name, &segments, &expected_copy_numbers);
    let run_stats = SomaticRunStats::new(
        sample_stats,
        model,
        modeling_error,
        start.elapsed().as_secs_f64(),
    );
    write_run_stats(&settings.output_dir, &run_stats);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_no_calls() {
        let mut segments = vec![
            Segment::new("chr1", 0, 1000, vec![10.0], Default::default()),
            Segment::new("chrX", 0, 1000, vec![10.0], Default::default()),
        ];
        segments[0].call.copy_number = 4;
        segments[0].call.qscore = 30.0;
        segments[0].call.major_chromosome_count = Some(3);

        set_no_calls(&mut segments, &[2, 1]);
        assert_eq!(segments[0].call.copy_number, 2);
        assert_eq!(segments[0].call.major_chromosome_count, None);
        assert_eq!(segments[0].call.filter.as_deref(), Some(NO_CALL_FILTER));
        approx::assert_ulps_eq!(segments[0].call.qscore, 0.0, max_ulps = 4);
        assert_eq!(segments[1].call.copy_number, 1);
    }

    fn get_failure_segments() -> Vec<Segment> {
        let mut segments = vec![
            Segment::new("chr1", 0, 1000, vec![10.0], Default::default()),
            Segment::new("chr2", 0, 1000, vec![10.0], Default::default()),
        ];
        for segment in segments.iter_mut() {
            segment.call.copy_number = 3;
        }
        segments
    }

    #[test]
    fn test_training_mode_failure_output() {
        let ploidy = PloidyInfo::new(&[]);
        for err in [
            ModelingError::NotEnoughUsableSegments { usable: 1, required: 3 },
            ModelingError::UncallableData("too many segments to cluster".to_string()),
        ] {
            let (segments, include_calls) =
                get_failed_modeling_output(&err, true, get_failure_segments(), &ploidy);
            assert!(segments.is_empty());
            assert!(include_calls);
        }
    }

    #[test]
    fn test_failure_output() {
        let ploidy = PloidyInfo::new(&[]);

        let err = ModelingError::NotEnoughUsableSegments { usable: 1, required: 3 };
        let (segments, include_calls) = get_failed_modeling_output(&err, false, get_failure_segments(), &ploidy);
        assert_eq!(segments.len(), 2);
        assert!(!include_calls);

        let err = ModelingError::UncallableData("too many segments to cluster".to_string());
        let (segments, include_calls) = get_failed_modeling_output(&err, false, get_failure_segments(), &ploidy);
        assert_eq!(segments.len(), 2);
        assert!(include_calls);
        assert_eq!(segments[0].call.copy_number, 2);
        assert_eq!(segments[1].call.filter.as_deref(), Some(NO_CALL_FILTER));
    }
}
