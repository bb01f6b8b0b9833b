use std::error;

use camino::Utf8Path;
use log::info;
use simple_error::bail;

use crate::cli;
use crate::expected_ploidy::PloidyInfo;
use crate::germline::{SampleRecord, call_germline_samples};
use crate::parameters::{CallerParameters, read_parameters};
use crate::pedigree::{KinshipRole, PedigreeIndex, read_pedigree_file};
use crate::run_stats::{GermlineRunStats, SampleCallStats, write_run_stats};
use crate::sample_io::{GermlineInput, get_merge_excluded_intervals, read_json_input, write_sample_calls};
use crate::segment_merger::{MergeSettings, merge_pedigree_segments, merge_segments};

/// Find the pedigree role of each input sample, in input sample order
///
fn get_sample_roles(
    sample_names: &[&str],
    pedigree_filename: &Utf8Path,
) -> Result<Vec<KinshipRole>, Box<dyn error::Error>> {
    let entries = read_pedigree_file(pedigree_filename)?;
    let mut roles = Vec::new();
    for &sample_name in sample_names {
        let Some(entry) = entries.iter().find(|x| x.sample_name == sample_name) else {
            bail!("Input sample '{sample_name}' is not found in pedigree file '{pedigree_filename}'");
        };
        roles.push(entry.role);
    }
    if entries.len() != sample_names.len() {
        bail!(
            "Pedigree file '{pedigree_filename}' lists {} samples, but {} input samples are provided",
            entries.len(),
            sample_names.len()
        );
    }
    Ok(roles)
}

pub fn run_germline(
    shared_settings: &cli::SharedSettings,
    settings: &cli::GermlineSettings,
) -> Result<(), Box<dyn error::Error>> {
    let start = std::time::Instant::now();

    let params = match &settings.parameters_filename {
        Some(filename) => read_parameters::<CallerParameters>(filename)?,
        None => CallerParameters::default(),
    };
    params.validate()?;

    let GermlineInput {
        samples: input_samples,
        is_enrichment,
        excluded_intervals,
    } = read_json_input(&settings.input_filename, "germline segment input")?;
    if input_samples.is_empty() {
        bail!("No samples found in germline input file '{}'", settings.input_filename);
    }

    let sample_names = input_samples.iter().map(|x| x.name.as_str()).collect::<Vec<_>>();
    let (roles, pedigree) = match &settings.pedigree_filename {
        Some(filename) => {
            let roles = get_sample_roles(&sample_names, filename)?;
            let pedigree = PedigreeIndex::new(&roles)?;
            (roles.into_iter().map(Some).collect::<Vec<_>>(), Some(pedigree))
        }
        None => (vec![None; sample_names.len()], None),
    };

    let mut samples = input_samples
        .into_iter()
        .zip(roles)
        .map(|(sample, role)| {
            let ploidy = PloidyInfo::new(&sample.ploidy_regions);
            SampleRecord::new(&sample.name, role, sample.segments, ploidy, &params)
        })
        .collect::<Vec<_>>();

    call_germline_samples(
        &mut samples,
        pedigree.as_ref(),
        &params,
        shared_settings.thread_count,
        shared_settings.seed,
    );

    let merge_settings = MergeSettings {
        min_call_size: params.minimum_call_size,
        max_gap: params.max_merge_gap,
        excluded_intervals: get_merge_excluded_intervals(is_enrichment, &excluded_intervals),
    };
    if pedigree.is_some() {
        let mut sample_segments = samples
            .iter_mut()
            .map(|x| std::mem::take(&mut x.segments))
            .collect::<Vec<_>>();
        merge_pedigree_segments(&mut sample_segments, &merge_settings);
        for (sample, segments) in samples.iter_mut().zip(sample_segments) {
            sample.segments = segments;
        }
    } else {
        for sample in samples.iter_mut() {
            let segments = std::mem::take(&mut sample.segments);
            sample.segments = merge_segments(segments, &merge_settings);
        }
    }

    let mut sample_stats = Vec::new();
    for sample in samples.iter() {
        write_sample_calls(&settings.output_dir, &sample.name, &sample.segments, true);
        let expected_copy_numbers = sample.ploidy.get_segment_expected_copy_numbers(&sample.segments);
        let stats = SampleCallStats::new(&sample.name, &sample.segments, &expected_copy_numbers);
        info!(
            "Sample '{}': {} merged segments, {} with variant copy number",
            sample.name, stats.segment_count, stats.variant_segment_count
        );
        sample_stats.push(stats);
    }

    let run_stats = GermlineRunStats::new(
        pedigree.is_some(),
        sample_stats,
        start.elapsed().as_secs_f64(),
    );
    write_run_stats(&settings.output_dir, &run_stats);
    Ok(())
}
