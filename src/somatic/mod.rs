//! Somatic copy number calling with joint tumor purity and ploidy estimation
//!

mod clustering;
mod density_clustering;
mod distance;
mod gaussian_mixture;
mod grid_search;
mod model;
mod ploidy_calls;
pub mod report;
mod segment_info;
mod segment_ploidy;

use log::info;
use rand::Rng;
use serde::Serialize;

pub use self::grid_search::KnownModelValues;
use self::report::ModelReporter;
use self::segment_ploidy::ModelPoint;
use crate::errors::ModelingError;
use crate::parameters::SomaticCallerParameters;
use crate::segment::{Segment, median};

/// Fewest usable segments which can support purity/ploidy modeling
const MIN_USABLE_SEGMENT_COUNT: usize = 3;

/// Selected purity/ploidy model and modeling statistics for one sample
///
#[derive(Clone, Debug, Serialize)]
pub struct SomaticModelSummary {
    pub purity: f64,
    pub diploid_coverage: f64,
    pub ploidy: f64,
    pub deviation: f64,
    pub precision_deviation: f64,
    pub accuracy_deviation: f64,
    pub percent_normal: f64,
    pub diploid_distance: f64,
    pub heterogeneity_index: f64,
    pub coverage_weighting_factor: f64,
    pub usable_segment_count: usize,
    pub cluster_count: usize,

    /// Center of each segment cluster in (coverage, MAF) space
    pub cluster_centers: Vec<ModelPoint>,

    pub adjusted_call_count: usize,
}

/// Sequencing properties of a tumor sample which change how it is modeled
#[derive(Clone, Debug, Default)]
pub struct SampleDataProperties {
    /// Coverage evenness of the sample, lower values reduce the weight of coverage relative to MAF
    pub evenness_score: Option<f64>,

    /// Targeted enrichment data is never clustered
    pub is_enrichment: bool,
}

/// Estimate tumor purity and ploidy, then call copy number on every segment of the sample
///
/// # Arguments
/// * `reporter` - Optional receiver for every evaluated model and the final segment clusters
///
pub fn call_somatic_sample<R: Rng>(
    segments: &mut [Segment],
    properties: &SampleDataProperties,
    known: &KnownModelValues,
    params: &SomaticCallerParameters,
    rng: &mut R,
    mut reporter: Option<&mut dyn ModelReporter>,
) -> Result<SomaticModelSummary, ModelingError> {
    let mut infos = segment_info::get_usable_segments(segments, params);
    if infos.len() < MIN_USABLE_SEGMENT_COUNT {
        return Err(ModelingError::NotEnoughUsableSegments {
            usable: infos.len(),
            required: MIN_USABLE_SEGMENT_COUNT,
        });
    }
    info!(
        "Modeling purity and ploidy from {} of {} segments",
        infos.len(),
        segments.len()
    );

    let median_coverage = median(&infos.iter().map(|x| x.coverage).collect::<Vec<_>>());
    let coverage_weighting_factor =
        distance::get_coverage_weighting_factor(properties.evenness_score, median_coverage, params);

    let ploidies = segment_ploidy::generate_segment_ploidies(params.maximum_copy_number);
    let use_clusters = clustering::should_cluster(&infos, properties.is_enrichment, params);
    let clusters = if use_clusters {
        clustering::cluster_segments(
            &mut infos,
            &ploidies,
            median_coverage,
            coverage_weighting_factor,
            params,
            rng,
        )?
    } else {
        clustering::SegmentClusters::default()
    };

    if let Some(reporter) = reporter.as_mut() {
        reporter.report_segments(&infos);
    }

    let context = model::ModelContext {
        segments: &infos,
        ploidies: &ploidies,
        coverage_weighting_factor,
        use_clusters,
        params,
    };
    let model = grid_search::search_coverage_purity_models(&context, known, reporter)?;

    let assignments = ploidy_calls::assign_ploidy_calls(segments, &model, &context);
    let adjusted_call_count =
        ploidy_calls::adjust_ploidy_calls(segments, &assignments, &model, &context);
    if adjusted_call_count > 0 {
        info!("Adjusted {adjusted_call_count} heterogeneous segment calls");
    }

    Ok(SomaticModelSummary {
        purity: model.purity,
        diploid_coverage: model.diploid_coverage,
        ploidy: model.ploidy,
        deviation: model.deviation,
        precision_deviation: model.precision_deviation,
        accuracy_deviation: model.accuracy_deviation,
        percent_normal: model.percent_normal,
        diploid_distance: model.diploid_distance,
        heterogeneity_index: model.heterogeneity_index,
        coverage_weighting_factor,
        usable_segment_count: infos.len(),
        cluster_count: clusters.cluster_count(),
        cluster_centers: clusters.centers,
        adjusted_call_count,
    })
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::report::JsonModelReporter;
    use super::*;
    use crate::segment::{Ballele, Balleles};

    fn get_segment(index: usize, coverage: f32, ref_count: u32, alt_count: u32) -> Segment {
        let begin = index as i64 * 100_000;
        let sites = (0..10)
            .map(|i| Ballele::new(begin + 1000 * i, ref_count, alt_count))
            .collect();
        Segment::new(
            "chr1",
            begin,
            begin + 100_000,
            vec![coverage; 10],
            Balleles::new(sites),
        )
    }

    /// Tumor at purity 0.6 and diploid coverage 50, with single copy loss on 30% of segments
    fn get_tumor_segments() -> Vec<Segment> {
        (0..50)
            .map(|i| {
                if i % 10 < 3 {
                    get_segment(i, 35.0, 10, 25)
                } else {
                    get_segment(i, 50.0, 25, 25)
                }
            })
            .collect()
    }

    #[test]
    fn test_call_somatic_sample() {
        let params = SomaticCallerParameters::default();
        let mut segments = get_tumor_segments();
        let mut rng = StdRng::seed_from_u64(0);
        let mut reporter = JsonModelReporter::default();
        let summary = call_somatic_sample(
            &mut segments,
            &SampleDataProperties::default(),
            &KnownModelValues::default(),
            &params,
            &mut rng,
            Some(&mut reporter),
        )
        .unwrap();

        approx::assert_abs_diff_eq!(summary.purity, 0.6, epsilon = 0.02);
        approx::assert_abs_diff_eq!(summary.diploid_coverage, 50.0, epsilon = 1.0);
        assert_eq!(summary.usable_segment_count, 50);
        assert_eq!(summary.cluster_count, 0);
        assert!(reporter.model_count() > 0);

        for (i, segment) in segments.iter().enumerate() {
            let expected_cn = if i % 10 < 3 { 1 } else { 2 };
            assert_eq!(segment.call.copy_number, expected_cn);
            assert_eq!(segment.call.major_chromosome_count, Some(1));
        }
    }

    #[test]
    fn test_known_purity() {
        let params = SomaticCallerParameters::default();
        let mut segments = get_tumor_segments();
        let mut rng = StdRng::seed_from_u64(0);
        let known = KnownModelValues {
            purity: Some(0.6),
            ploidy: None,
        };
        let summary =
            call_somatic_sample(&mut segments, &SampleDataProperties::default(), &known, &params, &mut rng, None).unwrap();
        approx::assert_ulps_eq!(summary.purity, 0.6, max_ulps = 4);
        approx::assert_abs_diff_eq!(summary.diploid_coverage, 50.0, epsilon = 1.0);
    }

    #[test]
    fn test_not_enough_usable_segments() {
        let params = SomaticCallerParameters::default();
        let mut segments = vec![get_segment(0, 50.0, 25, 25), get_segment(1, 50.0, 25, 25)];
        let mut rng = StdRng::seed_from_u64(0);
        let result = call_somatic_sample(
            &mut segments,
            &SampleDataProperties::default(),
            &KnownModelValues::default(),
            &params,
            &mut rng,
            None,
        );
        assert_eq!(
            result.unwrap_err(),
            ModelingError::NotEnoughUsableSegments {
                usable: 2,
                required: 3
            }
        );
    }

    #[test]
    fn test_clustering_memory_limit() {
        let params = SomaticCallerParameters {
            min_clustering_segments: 10,
            max_clustering_memory_bytes: 100,
            ..Default::default()
        };
        let mut segments = get_tumor_segments();
        let mut rng = StdRng::seed_from_u64(0);
        let result = call_somatic_sample(
            &mut segments,
            &SampleDataProperties::default(),
            &KnownModelValues::default(),
            &params,
            &mut rng,
            None,
        );
        assert!(matches!(result, Err(ModelingError::UncallableData(_))));
    }

    #[test]
    fn test_enrichment_data_is_not_clustered() {
        let params = SomaticCallerParameters {
            min_clustering_segments: 10,
            max_clustering_memory_bytes: 100,
            ..Default::default()
        };
        let properties = SampleDataProperties {
            evenness_score: None,
            is_enrichment: true,
        };
        let mut segments = get_tumor_segments();
        let mut rng = StdRng::seed_from_u64(0);
        let summary = call_somatic_sample(
            &mut segments,
            &properties,
            &KnownModelValues::default(),
            &params,
            &mut rng,
            None,
        )
        .unwrap();
        assert_eq!(summary.cluster_count, 0);
        approx::assert_abs_diff_eq!(summary.purity, 0.6, epsilon = 0.02);
    }
}
