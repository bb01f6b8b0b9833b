//! Density peak clustering
//!
//! Cluster centers are points with both high local density and large separation from any point of higher
//! density. Each remaining point joins the cluster of its nearest higher-density neighbor.
//!

use super::gaussian_mixture::Point;

/// Precomputed local density and separation for a point set
///
pub struct DensityClustering {
    point_count: usize,

    /// Condensed upper-triangle pairwise distance matrix
    distances: Vec<f64>,

    rho: Vec<f64>,
    delta: Vec<f64>,

    /// Nearest point with higher density, None for the highest density point
    nearest_higher: Vec<Option<usize>>,

    /// Point indices sorted by decreasing density
    order: Vec<usize>,
}

fn condensed_index(point_count: usize, i: usize, j: usize) -> usize {
    let (i, j) = if i < j { (i, j) } else { (j, i) };
    i * point_count - i * (i + 1) / 2 + (j - i - 1)
}

impl DensityClustering {
    /// # Arguments
    /// * `neighbor_rate` - Quantile of all pairwise distances used as the density kernel cutoff distance
    ///
    pub fn new(points: &[Point], neighbor_rate: f64) -> Self {
        let point_count = points.len();
        let mut distances = Vec::with_capacity(point_count * point_count.saturating_sub(1) / 2);
        for i in 0..point_count {
            for j in (i + 1)..point_count {
                let dx = points[i][0] - points[j][0];
                let dy = points[i][1] - points[j][1];
                distances.push((dx * dx + dy * dy).sqrt());
            }
        }

        let cutoff_distance = {
            let mut sorted = distances.clone();
            sorted.sort_by(|a, b| a.total_cmp(b));
            let index = ((neighbor_rate * sorted.len() as f64).round() as usize)
                .min(sorted.len().saturating_sub(1));
            let dc = sorted.get(index).copied().unwrap_or(0.0);
            if dc > 0.0 {
                dc
            } else {
                sorted.iter().copied().find(|&x| x > 0.0).unwrap_or(1.0)
            }
        };

        let mut dc = Self {
            point_count,
            distances,
            rho: vec![0.0; point_count],
            delta: vec![0.0; point_count],
            nearest_higher: vec![None; point_count],
            order: (0..point_count).collect(),
        };

        for i in 0..point_count {
            dc.rho[i] = (0..point_count)
                .filter(|&j| j != i)
                .map(|j| {
                    let r = dc.distance(i, j) / cutoff_distance;
                    (-r * r).exp()
                })
                .sum();
        }

        let rho = &dc.rho;
        dc.order.sort_by(|&a, &b| rho[b].total_cmp(&rho[a]));

        for (rank, &i) in dc.order.iter().enumerate() {
            if rank == 0 {
                dc.delta[i] = (0..point_count)
                    .filter(|&j| j != i)
                    .map(|j| dc.distance(i, j))
                    .fold(0.0, f64::max);
                continue;
            }
            let mut best = (dc.order[0], f64::INFINITY);
            for &j in dc.order[..rank].iter() {
                let d = dc.distance(i, j);
                if d < best.1 {
                    best = (j, d);
                }
            }
            dc.delta[i] = best.1;
            dc.nearest_higher[i] = Some(best.0);
        }
        dc
    }

    fn distance(&self, i: usize, j: usize) -> f64 {
        if i == j {
            0.0
        } else {
            self.distances[condensed_index(self.point_count, i, j)]
        }
    }

    /// Assign every point to a cluster
    ///
    /// Centroids are points with density of at least `rho_cutoff` and separation of at least
    /// `centroid_cutoff`. The highest density point is always a centroid. Cluster ids are assigned in
    /// order of decreasing centroid density.
    ///
    /// Returns a 2-tuple of (cluster id for each point, cluster count)
    ///
    pub fn cluster(&self, rho_cutoff: f64, centroid_cutoff: f64) -> (Vec<usize>, usize) {
        let mut labels = vec![0; self.point_count];
        let mut cluster_count = 0;
        for (rank, &i) in self.order.iter().enumerate() {
            let is_centroid =
                rank == 0 || (self.rho[i] >= rho_cutoff && self.delta[i] >= centroid_cutoff);
            if is_centroid {
                labels[i] = cluster_count;
                cluster_count += 1;
            } else if let Some(j) = self.nearest_higher[i] {
                labels[i] = labels[j];
            }
        }
        (labels, cluster_count)
    }
}
