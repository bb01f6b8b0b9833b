//! Model parameters for the germline and somatic callers
//!
//! Defaults are tuned for whole-genome data. Any subset of values can be overridden from a JSON
//! file given on the command line.
//!

use std::fs::File;
use std::io::BufReader;

use camino::Utf8Path;
use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail, map_err_with};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CallerParameters {
    /// Number of copy number states, copy numbers are called in `0..maximum_copy_number`
    pub maximum_copy_number: u32,

    /// Largest number of distinct copy numbers in a joint no-pedigree copy number combination
    pub max_allele_number: usize,

    /// Minimum allele site count per sample below which allele evidence is not used for a segment
    pub default_allele_count_threshold: usize,

    /// Segment length per allele site below which allele evidence is considered unreliable
    pub default_allele_density_threshold: f64,

    /// Allele site count per sample above which allele evidence is considered unreliable
    pub default_per_segment_allele_max_counts: usize,

    /// Maximum number of offspring genotype tuples enumerated per pedigree
    pub max_num_offspring_genotypes: usize,

    /// Minimum size of a merged copy number call
    pub minimum_call_size: i64,

    /// Maximum gap between segments which can be merged
    pub max_merge_gap: i64,

    /// Floor applied to every parent-to-offspring allele transmission probability
    pub denovo_rate: f64,

    pub max_qscore: f64,

    /// Samples with a copy number QScore below this value receive a `q<threshold>` filter
    pub quality_filter_threshold: f64,

    /// Number of lowest and highest bins trimmed from each segment coverage estimate
    pub number_of_trimmed_bins: usize,

    /// If true, all allele evidence gates decide whether allele evidence is skipped, instead of only
    /// the low allele count gate
    pub use_all_allele_gates: bool,
}

impl Default for CallerParameters {
    fn default() -> Self {
        Self {
            maximum_copy_number: 5,
            max_allele_number: 3,
            default_allele_count_threshold: 4,
            default_allele_density_threshold: 1000.0,
            default_per_segment_allele_max_counts: 100,
            max_num_offspring_genotypes: 500,
            minimum_call_size: 1000,
            max_merge_gap: 10_000,
            denovo_rate: 1e-5,
            max_qscore: 60.0,
            quality_filter_threshold: 10.0,
            number_of_trimmed_bins: 2,
            use_all_allele_gates: false,
        }
    }
}

impl CallerParameters {
    pub fn validate(&self) -> SimpleResult<()> {
        if self.maximum_copy_number < 3 {
            bail!("maximum_copy_number must be at least 3");
        }
        if self.max_allele_number == 0 {
            bail!("max_allele_number must be greater than 0");
        }
        if self.max_num_offspring_genotypes == 0 {
            bail!("max_num_offspring_genotypes must be greater than 0");
        }
        if !(0.0..1.0).contains(&self.denovo_rate) {
            bail!("denovo_rate must be in [0,1)");
        }
        if self.max_qscore <= 0.0 {
            bail!("max_qscore must be greater than 0");
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ClusteringMode {
    GaussianMixture,
    Density,
}

/// Logistic regression coefficients for the segment clonality score
///
/// The score is `sigmoid(intercept + sum(coefficient * feature))`.
///
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClonalityCoefficients {
    pub intercept: f64,
    pub best_model_distance: f64,
    pub cluster_entropy: f64,
    pub cluster_median_distance: f64,
    pub cluster_mean_distance: f64,
    pub cluster_distance_variance: f64,
    pub cluster_count: f64,
    pub model_deviation: f64,
}

impl Default for ClonalityCoefficients {
    fn default() -> Self {
        Self {
            intercept: -4.2,
            best_model_distance: 21.5,
            cluster_entropy: 0.9,
            cluster_median_distance: 18.3,
            cluster_mean_distance: 6.1,
            cluster_distance_variance: 35.0,
            cluster_count: 0.04,
            model_deviation: 9.7,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SomaticCallerParameters {
    /// Highest copy number represented in the tumor model
    pub maximum_copy_number: u32,

    pub max_qscore: f64,
    pub quality_filter_threshold: f64,

    /// Segments shorter than this are excluded from purity/ploidy modeling
    pub min_usable_segment_length: i64,

    /// Minimum number of allele sites required to estimate segment MAF
    pub min_maf_sites: usize,

    /// Segments with fewer allele sites than this are down-weighted proportionally
    pub full_weight_maf_sites: usize,

    /// Segment count at or above which segment length is used as the weight instead of bin count
    pub length_weight_segment_count: usize,

    pub number_of_trimmed_bins: usize,

    pub coverage_weighting: f64,
    pub coverage_weighting_with_maf_segmentation: f64,
    pub evenness_score_threshold: f64,
    pub min_evenness_score: f64,

    pub min_allowed_ploidy: f64,
    pub max_allowed_ploidy: f64,

    /// Models with deviation up to `best_deviation * deviation_factor` compete on composite score
    pub deviation_factor: f64,

    /// Minimum number of models competing on composite score
    pub min_composite_models: usize,

    pub percent_normal_weighting_factor: f64,
    pub cn2_weighting_factor: f64,
    pub deviation_score_weighting_factor: f64,
    pub diploid_distance_score_weighting_factor: f64,
    pub heterogeneity_score_weighting_factor: f64,

    /// Purity below which the copy number 2 score term is boosted
    pub low_purity_cutoff: f64,

    pub min_purity: f64,
    pub max_purity: f64,
    pub coarse_purity_step: f64,
    pub fine_purity_range: f64,

    pub min_diploid_coverage_factor: f64,
    pub max_diploid_coverage_factor: f64,
    pub coarse_coverage_steps: f64,
    pub fine_coverage_range: i64,

    /// Fraction of model mass above copy number 2 indicating whole genome doubling
    pub genome_doubling_fraction: f64,

    pub precision_weight: f64,
    pub accuracy_weight: f64,
    pub cluster_deviation_weight: f64,

    /// Clustering runs only with at least this many usable segments and MAF-informative segments
    pub min_clustering_segments: usize,

    pub clustering_mode: ClusteringMode,

    pub knn_neighbor_count: usize,
    pub knn_outlier_quantile: f64,

    pub gmm_min_clusters: usize,
    pub gmm_max_clusters: usize,
    pub gmm_coverage_weighting_multipliers: Vec<f64>,
    pub gmm_max_iterations: usize,
    pub gmm_tolerance: f64,

    pub density_neighbor_rate: f64,
    pub density_rho_cutoff: f64,
    pub density_max_centroid_cutoff: f64,
    pub density_min_centroid_cutoff: f64,
    pub density_centroid_cutoff_step: f64,
    pub density_default_centroid_cutoff: f64,
    pub max_cluster_count: usize,
    pub large_cluster_variance_cutoff: f64,
    pub large_cluster_max_share: f64,

    /// Clustering is refused if its working memory estimate exceeds this value
    pub max_clustering_memory_bytes: u64,

    /// Cluster distance to the nearest model point above which the cluster is heterogeneous
    pub heterogeneous_clusters_cutoff: f64,

    /// Fraction of heterogeneous clusters above which cluster deviation is blended into model deviation
    pub deviation_index_cutoff: f64,

    /// Clusters with segment assignment entropy above this are excluded from cluster deviation
    pub max_cluster_entropy: f64,

    /// Clusters with median segment distance above this multiple of the overall median are excluded
    pub outlier_cluster_distance_factor: f64,

    pub clonality_coefficients: ClonalityCoefficients,
    pub clonality_score_cutoff: f64,

    /// Relative difference between the two nearest model distances below which a call may be swapped
    pub adjust_distance_ratio: f64,
    pub adjust_min_purity: f64,

    pub minimum_call_size: i64,
    pub max_merge_gap: i64,
}

impl Default for SomaticCallerParameters {
    fn default() -> Self {
        Self {
            maximum_copy_number: 10,
            max_qscore: 60.0,
            quality_filter_threshold: 10.0,
            min_usable_segment_length: 5000,
            min_maf_sites: 5,
            full_weight_maf_sites: 10,
            length_weight_segment_count: 100,
            number_of_trimmed_bins: 2,
            coverage_weighting: 0.4,
            coverage_weighting_with_maf_segmentation: 0.15,
            evenness_score_threshold: 94.5,
            min_evenness_score: 85.0,
            min_allowed_ploidy: 1.2,
            max_allowed_ploidy: 5.5,
            deviation_factor: 1.05,
            min_composite_models: 5,
            percent_normal_weighting_factor: 0.3,
            cn2_weighting_factor: 0.35,
            deviation_score_weighting_factor: 0.25,
            diploid_distance_score_weighting_factor: 0.05,
            heterogeneity_score_weighting_factor: 0.05,
            low_purity_cutoff: 0.3,
            min_purity: 0.2,
            max_purity: 1.0,
            coarse_purity_step: 0.05,
            fine_purity_range: 0.1,
            min_diploid_coverage_factor: 0.4,
            max_diploid_coverage_factor: 1.5,
            coarse_coverage_steps: 50.0,
            fine_coverage_range: 5,
            genome_doubling_fraction: 0.8,
            precision_weight: 0.35,
            accuracy_weight: 0.35,
            cluster_deviation_weight: 0.3,
            min_clustering_segments: 100,
            clustering_mode: ClusteringMode::Density,
            knn_neighbor_count: 10,
            knn_outlier_quantile: 0.99,
            gmm_min_clusters: 4,
            gmm_max_clusters: 7,
            gmm_coverage_weighting_multipliers: vec![0.5, 1.0, 2.0],
            gmm_max_iterations: 200,
            gmm_tolerance: 1e-6,
            density_neighbor_rate: 0.02,
            density_rho_cutoff: 2.0,
            density_max_centroid_cutoff: 0.3,
            density_min_centroid_cutoff: 0.02,
            density_centroid_cutoff_step: 0.01,
            density_default_centroid_cutoff: 0.1,
            max_cluster_count: 9,
            large_cluster_variance_cutoff: 0.002,
            large_cluster_max_share: 0.2,
            max_clustering_memory_bytes: 8 * 1024 * 1024 * 1024,
            heterogeneous_clusters_cutoff: 0.05,
            deviation_index_cutoff: 0.2,
            max_cluster_entropy: 1.5,
            outlier_cluster_distance_factor: 5.0,
            clonality_coefficients: ClonalityCoefficients::default(),
            clonality_score_cutoff: 0.5,
            adjust_distance_ratio: 0.25,
            adjust_min_purity: 0.5,
            minimum_call_size: 10_000,
            max_merge_gap: 100_000,
        }
    }
}

impl SomaticCallerParameters {
    pub fn validate(&self) -> SimpleResult<()> {
        if self.maximum_copy_number < 2 {
            bail!("maximum_copy_number must be at least 2");
        }
        if !(0.0 < self.min_purity && self.min_purity <= self.max_purity && self.max_purity <= 1.0) {
            bail!("Purity range must satisfy 0 < min_purity <= max_purity <= 1");
        }
        if self.coarse_purity_step <= 0.0 || self.coarse_coverage_steps <= 0.0 {
            bail!("Grid search steps must be positive");
        }
        if self.min_allowed_ploidy > self.max_allowed_ploidy {
            bail!("min_allowed_ploidy must not exceed max_allowed_ploidy");
        }
        if self.gmm_min_clusters < 2 || self.gmm_min_clusters > self.gmm_max_clusters {
            bail!("GMM cluster count range is invalid");
        }
        if self.min_maf_sites == 0 {
            bail!("min_maf_sites must be greater than 0");
        }
        if self.density_centroid_cutoff_step <= 0.0 {
            bail!("density_centroid_cutoff_step must be positive");
        }
        Ok(())
    }
}

/// Read a parameter set from a JSON file, any value not present in the file keeps its default
pub fn read_parameters<T: DeserializeOwned>(filename: &Utf8Path) -> SimpleResult<T> {
    info!("Reading model parameters from file: '{filename}'");
    let file = map_err_with!(
        File::open(filename),
        format!("Unable to open parameters file: '{filename}'")
    )?;
    let reader = BufReader::new(file);
    let parameters = map_err_with!(
        serde_json::from_reader(reader),
        format!("Unable to parse parameters from json file: '{filename}'")
    )?;
    Ok(parameters)
}
