//! Coverage/purity model fit to the usable segments of one tumor sample
//!

use std::collections::BTreeMap;

use serde::Serialize;

use super::distance::get_distance;
use super::segment_info::{SegmentInfo, UNUSABLE_MAF};
use super::segment_ploidy::{ModelPoint, SegmentPloidy};
use crate::parameters::SomaticCallerParameters;
use crate::segment::median;

/// Fit statistics of one segment cluster against a model
///
#[derive(Clone, Debug, Serialize)]
pub struct ClusterSummary {
    pub cluster_id: usize,
    pub weight: f64,

    /// Distance from the cluster centroid to the nearest model point
    pub distance: f64,

    /// Entropy of the member segment ploidy assignments
    pub entropy: f64,

    pub is_outlier: bool,
    pub is_heterogeneous: bool,
}

/// Summary of all cluster fit statistics used by the clonality score
///
#[derive(Clone, Debug, Default, Serialize)]
pub struct ClusterStats {
    pub mean_entropy: f64,
    pub median_distance: f64,
    pub mean_distance: f64,
    pub distance_variance: f64,
    pub cluster_count: usize,
}

/// A (diploid coverage, purity) hypothesis and its fit to the sample
///
#[derive(Clone, Debug, Serialize)]
pub struct CoveragePurityModel {
    pub diploid_coverage: f64,
    pub purity: f64,

    /// Fraction of segment weight assigned to each copy number
    pub percent_cn: Vec<f64>,

    /// Weighted mean tumor copy number
    pub ploidy: f64,

    /// Fraction of segment weight assigned to balanced copy number 2
    pub percent_normal: f64,

    pub precision_deviation: f64,
    pub accuracy_deviation: f64,
    pub cluster_deviation: Option<f64>,
    pub deviation: f64,

    /// Weighted mean number of allele copy events separating segment calls from the diploid (or doubled) genome
    pub diploid_distance: f64,

    /// Weight fraction of heterogeneous clusters among all non-outlier clusters
    pub heterogeneity_index: f64,

    /// Smallest distance between any two distinct model points
    pub inter_model_distance: f64,

    pub clusters: Vec<ClusterSummary>,
    pub cluster_stats: ClusterStats,
}

impl CoveragePurityModel {
    pub fn percent_cn2(&self) -> f64 {
        self.percent_cn.get(2).copied().unwrap_or(0.0)
    }
}

/// Data shared by the evaluation of every model in the grid search
///
pub struct ModelContext<'a> {
    pub segments: &'a [SegmentInfo],
    pub ploidies: &'a [SegmentPloidy],
    pub coverage_weighting_factor: f64,

    /// True if segments carry cluster assignments
    pub use_clusters: bool,

    pub params: &'a SomaticCallerParameters,
}

impl ModelContext<'_> {
    pub fn get_model_points(&self, diploid_coverage: f64, purity: f64) -> Vec<ModelPoint> {
        self.ploidies
            .iter()
            .map(|x| x.mixed_point(diploid_coverage, purity))
            .collect()
    }

    fn point_distance(&self, coverage: f64, maf: f64, point: &ModelPoint) -> f64 {
        get_distance(
            coverage,
            maf,
            point.coverage,
            point.maf,
            self.coverage_weighting_factor,
        )
    }

    /// Index and distance of the nearest model point, ties resolve to the first point
    pub fn nearest_point(&self, coverage: f64, maf: f64, points: &[ModelPoint]) -> (usize, f64) {
        let mut best = (0, f64::INFINITY);
        for (point_index, point) in points.iter().enumerate() {
            let distance = self.point_distance(coverage, maf, point);
            if distance < best.1 {
                best = (point_index, distance);
            }
        }
        best
    }
}

fn weighted_centroid<'a>(members: impl Iterator<Item = &'a SegmentInfo> + Clone) -> (f64, f64) {
    let mut weight = 0.0;
    let mut coverage = 0.0;
    let mut maf_weight = 0.0;
    let mut maf = 0.0;
    for x in members {
        weight += x.weight;
        coverage += x.weight * x.coverage;
        if x.has_maf() {
            maf_weight += x.weight;
            maf += x.weight * x.maf;
        }
    }
    let coverage = if weight > 0.0 { coverage / weight } else { 0.0 };
    let maf = if maf_weight > 0.0 {
        maf / maf_weight
    } else {
        UNUSABLE_MAF
    };
    (coverage, maf)
}

fn entropy(weights: impl Iterator<Item = f64>) -> f64 {
    let weights = weights.collect::<Vec<_>>();
    let total = weights.iter().sum::<f64>();
    if total <= 0.0 {
        return 0.0;
    }
    weights
        .iter()
        .filter(|&&w| w > 0.0)
        .map(|&w| {
            let p = w / total;
            -p * p.ln()
        })
        .sum()
}

/// Major and minor allele counts of a segment ploidy assignment
///
/// Segments without MAF can't distinguish major chromosome counts, so they're treated as balanced.
///
fn get_allele_counts(ploidy: &SegmentPloidy, has_maf: bool) -> (u32, u32) {
    if has_maf {
        (ploidy.major_chromosome_count, ploidy.minor_chromosome_count())
    } else {
        let minor = ploidy.copy_number / 2;
        (ploidy.copy_number - minor, minor)
    }
}

fn get_inter_model_distance(context: &ModelContext, points: &[ModelPoint]) -> f64 {
    let mut min_distance = f64::INFINITY;
    for (i, p1) in points.iter().enumerate() {
        for p2 in points.iter().skip(i + 1) {
            let distance = context.point_distance(p1.coverage, p1.maf, p2);
            if distance > 0.0 && distance < min_distance {
                min_distance = distance;
            }
        }
    }
    if min_distance.is_finite() {
        min_distance
    } else {
        0.0
    }
}

/// Number of allele copy events between each assigned segment ploidy and the baseline genome, weighted by segment
///
/// The baseline is diploid (1,1), or doubled (2,2) when at least `genome_doubling_fraction` of the segment
/// weight is above copy number 2.
///
pub fn diploid_model_distance(
    context: &ModelContext,
    assignments: &[usize],
    percent_cn: &[f64],
) -> f64 {
    let above_cn2 = percent_cn.iter().skip(3).sum::<f64>();
    let (base_major, base_minor) = if above_cn2 >= context.params.genome_doubling_fraction {
        (2, 2)
    } else {
        (1, 1)
    };

    let mut total_weight = 0.0;
    let mut total_events = 0.0;
    for (segment, &ploidy_index) in context.segments.iter().zip(assignments) {
        let (major, minor) = get_allele_counts(&context.ploidies[ploidy_index], segment.has_maf());
        let events = major.abs_diff(base_major) + minor.abs_diff(base_minor);
        total_events += segment.weight * events as f64;
        total_weight += segment.weight;
    }
    if total_weight > 0.0 {
        total_events / total_weight
    } else {
        0.0
    }
}

fn get_cluster_summaries(
    context: &ModelContext,
    points: &[ModelPoint],
    assignments: &[usize],
) -> Vec<ClusterSummary> {
    let params = context.params;
    let mut cluster_members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (segment_index, segment) in context.segments.iter().enumerate() {
        if let Some(cluster_id) = segment.cluster_id {
            cluster_members.entry(cluster_id).or_default().push(segment_index);
        }
    }

    let mut clusters = cluster_members
        .iter()
        .map(|(&cluster_id, members)| {
            let member_infos = members.iter().map(|&x| &context.segments[x]);
            let (coverage, maf) = weighted_centroid(member_infos.clone());
            let (_, distance) = context.nearest_point(coverage, maf, points);

            let mut ploidy_weights: BTreeMap<usize, f64> = BTreeMap::new();
            for &x in members.iter() {
                *ploidy_weights.entry(assignments[x]).or_insert(0.0) += context.segments[x].weight;
            }

            ClusterSummary {
                cluster_id,
                weight: member_infos.map(|x| x.weight).sum(),
                distance,
                entropy: entropy(ploidy_weights.values().copied()),
                is_outlier: false,
                is_heterogeneous: false,
            }
        })
        .collect::<Vec<_>>();

    // Clusters on model points have near-zero distance, so the reference is floored at the heterogeneity cutoff
    let reference_distance = median(&clusters.iter().map(|x| x.distance).collect::<Vec<_>>())
        .max(params.heterogeneous_clusters_cutoff);
    for cluster in clusters.iter_mut() {
        cluster.is_outlier = cluster.entropy > params.max_cluster_entropy
            || cluster.distance > params.outlier_cluster_distance_factor * reference_distance;
        cluster.is_heterogeneous =
            !cluster.is_outlier && cluster.distance > params.heterogeneous_clusters_cutoff;
    }
    clusters
}

fn get_cluster_stats(clusters: &[ClusterSummary]) -> ClusterStats {
    if clusters.is_empty() {
        return ClusterStats::default();
    }
    let distances = clusters.iter().map(|x| x.distance).collect::<Vec<_>>();
    let count = clusters.len() as f64;
    let mean_distance = distances.iter().sum::<f64>() / count;
    let distance_variance = distances
        .iter()
        .map(|x| (x - mean_distance) * (x - mean_distance))
        .sum::<f64>()
        / count;
    ClusterStats {
        mean_entropy: clusters.iter().map(|x| x.entropy).sum::<f64>() / count,
        median_distance: median(&distances),
        mean_distance,
        distance_variance,
        cluster_count: clusters.len(),
    }
}

/// Evaluate the fit of a (diploid coverage, purity) hypothesis to the usable segments
///
/// Each segment is assigned to its nearest model point. Precision deviation is the weighted mean distance
/// from each segment to its assigned point, and accuracy deviation is the weighted mean distance from each
/// model point to the centroid of its assigned segments. When segments are clustered and the weight of
/// heterogeneous clusters exceeds `deviation_index_cutoff`, the cluster deviation is blended into the total.
///
pub fn model_deviation(
    context: &ModelContext,
    diploid_coverage: f64,
    purity: f64,
) -> CoveragePurityModel {
    let params = context.params;
    let points = context.get_model_points(diploid_coverage, purity);

    let mut assignments = Vec::with_capacity(context.segments.len());
    let mut total_weight = 0.0;
    let mut precision_sum = 0.0;
    for segment in context.segments.iter() {
        let (point_index, distance) = context.nearest_point(segment.coverage, segment.maf, &points);
        assignments.push(point_index);
        total_weight += segment.weight;
        precision_sum += segment.weight * distance;
    }
    let total_weight = if total_weight > 0.0 { total_weight } else { 1.0 };
    let precision_deviation = precision_sum / total_weight;

    let mut point_members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (segment_index, &point_index) in assignments.iter().enumerate() {
        point_members.entry(point_index).or_default().push(segment_index);
    }
    let mut accuracy_sum = 0.0;
    for (&point_index, members) in point_members.iter() {
        let member_infos = members.iter().map(|&x| &context.segments[x]);
        let (coverage, maf) = weighted_centroid(member_infos.clone());
        let point = &points[point_index];
        let point_weight = member_infos.map(|x| x.weight).sum::<f64>();
        accuracy_sum += point_weight * context.point_distance(coverage, maf, point);
    }
    let accuracy_deviation = accuracy_sum / total_weight;

    let max_cn = context
        .ploidies
        .iter()
        .map(|x| x.copy_number)
        .max()
        .unwrap_or(0) as usize;
    let mut percent_cn = vec![0.0; max_cn + 1];
    let mut percent_normal = 0.0;
    for (segment, &point_index) in context.segments.iter().zip(assignments.iter()) {
        let ploidy = &context.ploidies[point_index];
        percent_cn[ploidy.copy_number as usize] += segment.weight / total_weight;
        if get_allele_counts(ploidy, segment.has_maf()) == (1, 1) {
            percent_normal += segment.weight / total_weight;
        }
    }
    let ploidy = percent_cn
        .iter()
        .enumerate()
        .map(|(cn, p)| cn as f64 * p)
        .sum::<f64>();

    let diploid_distance = diploid_model_distance(context, &assignments, &percent_cn);

    let (clusters, cluster_deviation, heterogeneity_index) = if context.use_clusters {
        let clusters = get_cluster_summaries(context, &points, &assignments);
        let mut inlier_weight = 0.0;
        let mut inlier_distance = 0.0;
        let mut heterogeneous_weight = 0.0;
        for cluster in clusters.iter().filter(|x| !x.is_outlier) {
            inlier_weight += cluster.weight;
            inlier_distance += cluster.weight * cluster.distance;
            if cluster.is_heterogeneous {
                heterogeneous_weight += cluster.weight;
            }
        }
        if inlier_weight > 0.0 {
            (
                clusters,
                Some(inlier_distance / inlier_weight),
                heterogeneous_weight / inlier_weight,
            )
        } else {
            (clusters, None, 0.0)
        }
    } else {
        (Vec::new(), None, 0.0)
    };

    let deviation = match cluster_deviation {
        Some(cluster_deviation) if heterogeneity_index > params.deviation_index_cutoff => {
            params.precision_weight * precision_deviation
                + params.accuracy_weight * accuracy_deviation
                + params.cluster_deviation_weight * cluster_deviation
        }
        _ => 0.5 * precision_deviation + 0.5 * accuracy_deviation,
    };

    let cluster_stats = get_cluster_stats(&clusters);
    CoveragePurityModel {
        diploid_coverage,
        purity,
        percent_cn,
        ploidy,
        percent_normal,
        precision_deviation,
        accuracy_deviation,
        cluster_deviation,
        deviation,
        diploid_distance,
        heterogeneity_index,
        inter_model_distance: get_inter_model_distance(context, &points),
        clusters,
        cluster_stats,
    }
}
