//! Clustering of usable segments in (coverage, MAF) space
//!

use std::collections::BTreeMap;

use log::{debug, info};
use rand::Rng;

use super::density_clustering::DensityClustering;
use super::gaussian_mixture::{Point, fit_gaussian_mixture, point_distance, silhouette_score};
use super::segment_info::SegmentInfo;
use super::segment_ploidy::{ModelPoint, SegmentPloidy};
use crate::errors::ModelingError;
use crate::parameters::{ClusteringMode, SomaticCallerParameters};

/// True if enough segments are available to cluster
pub fn should_cluster(segments: &[SegmentInfo], is_enrichment: bool, params: &SomaticCallerParameters) -> bool {
    if is_enrichment {
        return false;
    }
    let maf_count = segments.iter().filter(|x| x.has_maf()).count();
    segments.len() >= params.min_clustering_segments && maf_count >= params.min_clustering_segments
}

/// Refuse to cluster if the pairwise distance matrix would exceed the configured memory limit
pub fn check_clustering_memory(
    point_count: usize,
    params: &SomaticCallerParameters,
) -> Result<(), ModelingError> {
    let pair_count = point_count as u64 * (point_count as u64).saturating_sub(1) / 2;
    let required_bytes = pair_count.saturating_mul(std::mem::size_of::<f64>() as u64);
    if required_bytes > params.max_clustering_memory_bytes {
        return Err(ModelingError::UncallableData(format!(
            "Clustering {point_count} segments requires {required_bytes} bytes, which exceeds the limit of {} bytes",
            params.max_clustering_memory_bytes
        )));
    }
    Ok(())
}

/// Sum of distances from each point to its `neighbor_count` nearest neighbors
fn get_knn_distance_sums(points: &[Point], neighbor_count: usize) -> Vec<f64> {
    points
        .iter()
        .enumerate()
        .map(|(i, x)| {
            let mut distances = points
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, y)| point_distance(x, y))
                .collect::<Vec<_>>();
            distances.sort_by(|a, b| a.total_cmp(b));
            distances.iter().take(neighbor_count).sum()
        })
        .collect()
}

/// Quantile of the kNN distance sums used as the outlier cutoff
fn get_knn_outlier_cutoff(distance_sums: &[f64], quantile: f64) -> f64 {
    if distance_sums.is_empty() {
        return 0.0;
    }
    let mut sorted = distance_sums.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let index = ((quantile * sorted.len() as f64).ceil() as usize)
        .saturating_sub(1)
        .min(sorted.len() - 1);
    sorted[index]
}

fn get_points(segments: &[&SegmentInfo], coverage_weighting_factor: f64) -> Vec<Point> {
    segments
        .iter()
        .map(|x| [x.coverage * coverage_weighting_factor, x.maf])
        .collect()
}

/// Starting component means for a GMM fit with `component_count` components
///
/// Model points are ranked by the number of points which they are nearest to, and the best supported
/// model points are used first. Any remaining means are taken from the point farthest from all existing means,
/// starting from a random point if no model point has support.
///
fn get_initial_means<R: Rng>(
    points: &[Point],
    model_points: &[Point],
    component_count: usize,
    rng: &mut R,
) -> Vec<Point> {
    let mut support = vec![0usize; model_points.len()];
    for x in points.iter() {
        let nearest = model_points
            .iter()
            .enumerate()
            .map(|(i, m)| (i, point_distance(x, m)))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((i, _)) = nearest {
            support[i] += 1;
        }
    }
    let mut ranked = (0..model_points.len())
        .filter(|&x| support[x] > 0)
        .collect::<Vec<_>>();
    ranked.sort_by(|&a, &b| support[b].cmp(&support[a]).then(a.cmp(&b)));

    let mut means = ranked
        .into_iter()
        .take(component_count)
        .map(|x| model_points[x])
        .collect::<Vec<_>>();
    if means.is_empty() && !points.is_empty() && component_count > 0 {
        means.push(points[rng.gen_range(0..points.len())]);
    }
    while means.len() < component_count {
        let farthest = points
            .iter()
            .map(|x| {
                let d = means.iter().map(|m| point_distance(x, m)).fold(f64::INFINITY, f64::min);
                (x, d)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1));
        match farthest {
            Some((x, d)) if d > 0.0 => means.push(*x),
            _ => break,
        }
    }
    means
}

/// Choose the GMM clustering with the best silhouette score over all coverage weightings and component counts
///
/// Returns the cluster label of each segment and the fitted component centers in (coverage, MAF) space
///
fn cluster_gaussian_mixture<R: Rng>(
    segments: &[&SegmentInfo],
    model_points: &[ModelPoint],
    coverage_weighting_factor: f64,
    params: &SomaticCallerParameters,
    rng: &mut R,
) -> (Vec<usize>, Vec<ModelPoint>) {
    let mut best: Option<(f64, Vec<usize>, Vec<ModelPoint>)> = None;
    for &multiplier in params.gmm_coverage_weighting_multipliers.iter() {
        let weight = coverage_weighting_factor * multiplier;
        let points = get_points(segments, weight);
        let scaled_model_points = model_points
            .iter()
            .map(|x| [x.coverage * weight, x.maf])
            .collect::<Vec<_>>();
        for component_count in params.gmm_min_clusters..=params.gmm_max_clusters {
            let initial_means = get_initial_means(&points, &scaled_model_points, component_count, rng);
            if initial_means.len() < component_count {
                continue;
            }
            let Some(gmm) =
                fit_gaussian_mixture(&points, &initial_means, params.gmm_max_iterations, params.gmm_tolerance)
            else {
                continue;
            };
            let labels = gmm.assign(&points);
            let Some(score) = silhouette_score(&points, &labels) else {
                continue;
            };
            debug!(
                "GMM clustering with coverage weighting multiplier {multiplier} and {component_count} components: silhouette {score:.4}"
            );
            if best.as_ref().is_none_or(|(s, _, _)| score > *s) {
                let centers = gmm
                    .components
                    .iter()
                    .map(|c| ModelPoint {
                        coverage: if weight > 0.0 { c.mean[0] / weight } else { 0.0 },
                        maf: c.mean[1],
                    })
                    .collect();
                best = Some((score, labels, centers));
            }
        }
    }
    match best {
        Some((_, labels, centers)) => (labels, centers),
        None => {
            let labels = vec![0; segments.len()];
            let centers = get_cluster_centers(segments, &labels);
            (labels, centers)
        }
    }
}

/// Mean (coverage, MAF) of the segments in each cluster
fn get_cluster_centers(segments: &[&SegmentInfo], labels: &[usize]) -> Vec<ModelPoint> {
    let cluster_count = labels.iter().max().map(|x| x + 1).unwrap_or(0);
    let mut sums = vec![(0.0, 0.0, 0usize); cluster_count];
    for (segment, &label) in segments.iter().zip(labels) {
        let sum = &mut sums[label];
        sum.0 += segment.coverage;
        sum.1 += segment.maf;
        sum.2 += 1;
    }
    sums.into_iter()
        .map(|(coverage, maf, count)| {
            let count = count.max(1) as f64;
            ModelPoint {
                coverage: coverage / count,
                maf: maf / count,
            }
        })
        .collect()
}

/// Select the density centroid cutoff from the cluster counts found over the cutoff sweep
///
/// The most frequent cluster count is used if it does not exceed `max_cluster_count`. Otherwise the second most
/// frequent count is used if it is within the limit and there are fewer than 4 distinct counts. Otherwise the
/// default cutoff is used. The chosen cutoff is the first (largest) cutoff producing the chosen count.
///
fn select_centroid_cutoff(sweep: &[(f64, usize)], params: &SomaticCallerParameters) -> f64 {
    // cluster count -> (frequency, first cutoff, first sweep position)
    let mut modes: BTreeMap<usize, (usize, f64, usize)> = BTreeMap::new();
    for (position, &(cutoff, count)) in sweep.iter().enumerate() {
        modes.entry(count).or_insert((0, cutoff, position)).0 += 1;
    }
    let mut modes = modes
        .into_iter()
        .map(|(count, (frequency, cutoff, position))| (count, frequency, cutoff, position))
        .collect::<Vec<_>>();
    modes.sort_by(|a, b| b.1.cmp(&a.1).then(a.3.cmp(&b.3)));

    let Some(&(count, _, cutoff, _)) = modes.first() else {
        return params.density_default_centroid_cutoff;
    };
    if count <= params.max_cluster_count {
        return cutoff;
    }
    if modes.len() < 4
        && let Some(&(count, _, cutoff, _)) = modes.get(1)
        && count <= params.max_cluster_count
    {
        return cutoff;
    }
    params.density_default_centroid_cutoff
}

fn get_centroid_cutoff_sweep(params: &SomaticCallerParameters) -> Vec<f64> {
    let mut cutoffs = Vec::new();
    let mut step_index = 0;
    loop {
        let cutoff =
            params.density_max_centroid_cutoff - step_index as f64 * params.density_centroid_cutoff_step;
        if cutoff < params.density_min_centroid_cutoff - 1e-9 {
            break;
        }
        cutoffs.push(cutoff);
        step_index += 1;
    }
    cutoffs
}

fn point_variance(points: &[Point]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let n = points.len() as f64;
    let mean = [
        points.iter().map(|x| x[0]).sum::<f64>() / n,
        points.iter().map(|x| x[1]).sum::<f64>() / n,
    ];
    points
        .iter()
        .map(|x| {
            let dx = x[0] - mean[0];
            let dy = x[1] - mean[1];
            dx * dx + dy * dy
        })
        .sum::<f64>()
        / n
}

fn cluster_density(
    segments: &[&SegmentInfo],
    coverage_weighting_factor: f64,
    params: &SomaticCallerParameters,
) -> Vec<usize> {
    let points = get_points(segments, coverage_weighting_factor);
    let density = DensityClustering::new(&points, params.density_neighbor_rate);

    let sweep = get_centroid_cutoff_sweep(params)
        .into_iter()
        .map(|cutoff| (cutoff, density.cluster(params.density_rho_cutoff, cutoff).1))
        .collect::<Vec<_>>();
    let centroid_cutoff = select_centroid_cutoff(&sweep, params);
    let (mut labels, cluster_count) = density.cluster(params.density_rho_cutoff, centroid_cutoff);
    debug!("Density clustering with centroid cutoff {centroid_cutoff:.2} found {cluster_count} clusters");

    // Split large high-variance clusters
    let mut next_cluster_id = cluster_count;
    for cluster_id in 0..cluster_count {
        let members = (0..labels.len())
            .filter(|&x| labels[x] == cluster_id)
            .collect::<Vec<_>>();
        let share = members.len() as f64 / labels.len() as f64;
        let member_points = members.iter().map(|&x| points[x]).collect::<Vec<_>>();
        if member_points.len() < 2
            || point_variance(&member_points) <= params.large_cluster_variance_cutoff
            || share >= params.large_cluster_max_share
        {
            continue;
        }
        let sub_density = DensityClustering::new(&member_points, params.density_neighbor_rate);
        let (sub_labels, sub_count) = sub_density.cluster(
            params.density_rho_cutoff,
            params.density_default_centroid_cutoff,
        );
        if sub_count < 2 {
            continue;
        }
        debug!("Splitting cluster {cluster_id} into {sub_count} clusters");
        for (&member, &sub_label) in members.iter().zip(sub_labels.iter()) {
            if sub_label > 0 {
                labels[member] = next_cluster_id + sub_label - 1;
            }
        }
        next_cluster_id += sub_count - 1;
    }
    labels
}

/// Segment clusters found in (coverage, MAF) space
#[derive(Clone, Debug, Default)]
pub struct SegmentClusters {
    /// Center of each cluster, indexed by cluster id
    pub centers: Vec<ModelPoint>,
}

impl SegmentClusters {
    pub fn cluster_count(&self) -> usize {
        self.centers.len()
    }
}

/// Model points used to start GMM fits, from every ploidy in a pure tumor with the given diploid coverage
fn get_seed_model_points(ploidies: &[SegmentPloidy], diploid_coverage: f64) -> Vec<ModelPoint> {
    ploidies
        .iter()
        .map(|x| x.mixed_point(diploid_coverage, 1.0))
        .collect()
}

/// Cluster the MAF-informative segments, and write each segment's cluster id
///
/// Segments without MAF and kNN outliers are left unclustered.
///
/// # Arguments
/// * `median_coverage` - Median usable segment coverage, taken as the diploid coverage of the GMM seed model points
///
pub fn cluster_segments<R: Rng>(
    segments: &mut [SegmentInfo],
    ploidies: &[SegmentPloidy],
    median_coverage: f64,
    coverage_weighting_factor: f64,
    params: &SomaticCallerParameters,
    rng: &mut R,
) -> Result<SegmentClusters, ModelingError> {
    let maf_indices = (0..segments.len())
        .filter(|&x| segments[x].has_maf())
        .collect::<Vec<_>>();
    check_clustering_memory(maf_indices.len(), params)?;

    let points = maf_indices
        .iter()
        .map(|&x| [segments[x].coverage * coverage_weighting_factor, segments[x].maf])
        .collect::<Vec<_>>();
    let distance_sums = get_knn_distance_sums(&points, params.knn_neighbor_count);
    let cutoff = get_knn_outlier_cutoff(&distance_sums, params.knn_outlier_quantile);
    let inlier_indices = maf_indices
        .iter()
        .zip(distance_sums.iter())
        .filter(|&(_, &d)| d <= cutoff)
        .map(|(&x, _)| x)
        .collect::<Vec<_>>();

    let (labels, mut centers) = {
        let inliers = inlier_indices.iter().map(|&x| &segments[x]).collect::<Vec<_>>();
        match params.clustering_mode {
            ClusteringMode::GaussianMixture => {
                let model_points = get_seed_model_points(ploidies, median_coverage);
                cluster_gaussian_mixture(&inliers, &model_points, coverage_weighting_factor, params, rng)
            }
            ClusteringMode::Density => {
                let labels = cluster_density(&inliers, coverage_weighting_factor, params);
                let centers = get_cluster_centers(&inliers, &labels);
                (labels, centers)
            }
        }
    };

    for segment in segments.iter_mut() {
        segment.cluster_id = None;
    }
    for (&segment_index, &label) in inlier_indices.iter().zip(labels.iter()) {
        segments[segment_index].cluster_id = Some(label);
    }

    let cluster_count = labels.iter().max().map(|x| x + 1).unwrap_or(0);
    centers.truncate(cluster_count);
    info!(
        "Clustered {} of {} usable segments into {cluster_count} clusters",
        inlier_indices.len(),
        segments.len()
    );
    Ok(SegmentClusters { centers })
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::somatic::segment_ploidy::generate_segment_ploidies;

    fn get_clustered_infos() -> Vec<SegmentInfo> {
        let centers = [(35.0, 0.29), (50.0, 0.48), (65.0, 0.38)];
        (0..150)
            .map(|segment_index| {
                let (coverage, maf) = centers[segment_index % 3];
                let jitter = (segment_index / 3 % 5) as f64 - 2.0;
                SegmentInfo {
                    segment_index,
                    coverage: coverage + jitter * 0.2,
                    maf: maf + jitter * 0.002,
                    maf_site_count: 20,
                    weight: 10.0,
                    cluster_id: None,
                }
            })
            .collect()
    }

    #[test]
    fn test_should_cluster() {
        let params = SomaticCallerParameters::default();
        let mut infos = get_clustered_infos();
        assert!(should_cluster(&infos, false, &params));
        assert!(!should_cluster(&infos, true, &params));
        for info in infos.iter_mut().take(60) {
            info.maf = -1.0;
        }
        assert!(!should_cluster(&infos, false, &params));
    }

    #[test]
    fn test_clustering_memory_guard() {
        let params = SomaticCallerParameters {
            max_clustering_memory_bytes: 1000,
            ..Default::default()
        };
        assert!(check_clustering_memory(10, &params).is_ok());
        assert!(matches!(
            check_clustering_memory(100, &params),
            Err(ModelingError::UncallableData(_))
        ));
    }

    #[test]
    fn test_knn_outlier_cutoff() {
        let sums = (1..=100).map(|x| x as f64).collect::<Vec<_>>();
        approx::assert_ulps_eq!(get_knn_outlier_cutoff(&sums, 0.99), 99.0, max_ulps = 4);
        approx::assert_ulps_eq!(get_knn_outlier_cutoff(&sums, 1.0), 100.0, max_ulps = 4);
    }

    #[test]
    fn test_select_centroid_cutoff() {
        let params = SomaticCallerParameters::default();
        let sweep = vec![(0.3, 2), (0.2, 3), (0.1, 3), (0.05, 12)];
        approx::assert_ulps_eq!(select_centroid_cutoff(&sweep, &params), 0.2, max_ulps = 4);

        // Most frequent count exceeds the limit, so fall back to the second mode:
        let sweep = vec![(0.3, 3), (0.2, 12), (0.1, 12)];
        approx::assert_ulps_eq!(select_centroid_cutoff(&sweep, &params), 0.3, max_ulps = 4);

        // Too many distinct modes, so use the default:
        let sweep = vec![(0.3, 3), (0.2, 12), (0.1, 12), (0.05, 14), (0.04, 15)];
        approx::assert_ulps_eq!(
            select_centroid_cutoff(&sweep, &params),
            params.density_default_centroid_cutoff,
            max_ulps = 4
        );
    }

    #[test]
    fn test_centroid_cutoff_sweep() {
        let params = SomaticCallerParameters::default();
        let sweep = get_centroid_cutoff_sweep(&params);
        assert_eq!(sweep.len(), 29);
        approx::assert_ulps_eq!(sweep[0], 0.3, max_ulps = 4);
        approx::assert_abs_diff_eq!(sweep[28], 0.02, epsilon = 1e-9);
    }

    #[test]
    fn test_density_cluster_segments() {
        let params = SomaticCallerParameters::default();
        let ploidies = generate_segment_ploidies(params.maximum_copy_number);
        let mut infos = get_clustered_infos();
        let mut rng = StdRng::seed_from_u64(0);
        let clusters = cluster_segments(&mut infos, &ploidies, 50.0, 0.008, &params, &mut rng).unwrap();
        assert_eq!(clusters.cluster_count(), 3);
        let clustered = infos.iter().filter(|x| x.cluster_id.is_some()).count();
        assert!(clustered >= 148);
        for x in infos.iter().filter(|x| x.cluster_id.is_some()) {
            let peer = infos
                .iter()
                .find(|y| y.cluster_id.is_some() && y.segment_index % 3 == x.segment_index % 3)
                .unwrap();
            assert_eq!(x.cluster_id, peer.cluster_id);
        }

        // Each center is the mean of its members
        for info in infos.iter().filter(|x| x.segment_index % 3 == 1) {
            if let Some(cluster_id) = info.cluster_id {
                let center = clusters.centers[cluster_id];
                approx::assert_abs_diff_eq!(center.coverage, 50.0, epsilon = 0.5);
                approx::assert_abs_diff_eq!(center.maf, 0.48, epsilon = 0.005);
            }
        }
    }

    #[test]
    fn test_gmm_cluster_segments() {
        let params = SomaticCallerParameters {
            clustering_mode: ClusteringMode::GaussianMixture,
            gmm_min_clusters: 2,
            gmm_max_clusters: 4,
            gmm_coverage_weighting_multipliers: vec![1.0],
            ..Default::default()
        };
        let ploidies = generate_segment_ploidies(params.maximum_copy_number);
        let mut infos = get_clustered_infos();
        let mut rng = StdRng::seed_from_u64(0);
        let clusters = cluster_segments(&mut infos, &ploidies, 50.0, 0.008, &params, &mut rng).unwrap();
        let cluster_count = clusters.cluster_count();
        assert!((2..=4).contains(&cluster_count));
        assert!(infos.iter().any(|x| x.cluster_id.is_some()));

        // Fitted component centers are kept for every occupied cluster
        for info in infos.iter() {
            if let Some(cluster_id) = info.cluster_id {
                let center = clusters.centers[cluster_id];
                assert!(center.coverage > 34.5 && center.coverage < 65.5);
                assert!(center.maf > 0.28 && center.maf < 0.49);
            }
        }
    }

    #[test]
    fn test_get_initial_means() {
        let points = vec![[0.0, 0.0], [0.1, 0.0], [1.0, 1.0]];
        let model_points = vec![[0.0, 0.05], [5.0, 5.0], [1.0, 0.9]];
        let mut rng = StdRng::seed_from_u64(0);

        assert_eq!(get_initial_means(&points, &model_points, 1, &mut rng), vec![[0.0, 0.05]]);
        assert_eq!(
            get_initial_means(&points, &model_points, 2, &mut rng),
            vec![[0.0, 0.05], [1.0, 0.9]]
        );

        // Unsupported model points are skipped, and the remaining mean is the farthest point
        assert_eq!(
            get_initial_means(&points, &model_points, 3, &mut rng),
            vec![[0.0, 0.05], [1.0, 0.9], [0.1, 0.0]]
        );

        let means = get_initial_means(&points, &[], 2, &mut rng);
        assert_eq!(means.len(), 2);
        assert_ne!(means[0], means[1]);
    }

    #[test]
    fn test_seed_model_points() {
        let ploidies = generate_segment_ploidies(2);
        let model_points = get_seed_model_points(&ploidies, 40.0);
        assert_eq!(model_points.len(), ploidies.len());
        let diploid = ploidies
            .iter()
            .position(|x| x.copy_number == 2 && x.major_chromosome_count == 1)
            .unwrap();
        approx::assert_ulps_eq!(model_points[diploid].coverage, 40.0, max_ulps = 4);
        approx::assert_ulps_eq!(model_points[diploid].maf, 0.5, max_ulps = 4);
    }
}
