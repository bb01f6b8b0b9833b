//! Two-dimensional Gaussian mixture fit by expectation maximization
//!

/// Diagonal variance floor added to each component covariance
const COVARIANCE_FLOOR: f64 = 1e-6;

pub type Point = [f64; 2];

/// 2x2 symmetric covariance matrix stored as `[xx, xy, yy]`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Covariance([f64; 3]);

impl Covariance {
    fn determinant(&self) -> f64 {
        let [xx, xy, yy] = self.0;
        xx * yy - xy * xy
    }

    fn density(&self, mean: &Point, x: &Point) -> f64 {
        let [xx, xy, yy] = self.0;
        let det = self.determinant();
        if det <= 0.0 {
            return 0.0;
        }
        let dx = x[0] - mean[0];
        let dy = x[1] - mean[1];
        let mahalanobis = (yy * dx * dx - 2.0 * xy * dx * dy + xx * dy * dy) / det;
        (-0.5 * mahalanobis).exp() / (2.0 * std::f64::consts::PI * det.sqrt())
    }
}

#[derive(Clone, Debug)]
pub struct GaussianComponent {
    pub weight: f64,
    pub mean: Point,
    pub covariance: Covariance,
}

#[derive(Clone, Debug)]
pub struct GaussianMixture {
    pub components: Vec<GaussianComponent>,
    pub log_likelihood: f64,
    pub iterations: usize,
}

impl GaussianMixture {
    /// Index of the component with the highest responsibility for each point
    pub fn assign(&self, points: &[Point]) -> Vec<usize> {
        points
            .iter()
            .map(|x| {
                let mut best = (0, f64::NEG_INFINITY);
                for (component_index, c) in self.components.iter().enumerate() {
                    let r = c.weight * c.covariance.density(&c.mean, x);
                    if r > best.1 {
                        best = (component_index, r);
                    }
                }
                best.0
            })
            .collect()
    }
}

fn get_weighted_covariance(points: &[Point], weights: &[f64], mean: &Point) -> Covariance {
    let total = weights.iter().sum::<f64>();
    let mut cov = [0.0; 3];
    if total > 0.0 {
        for (x, &w) in points.iter().zip(weights) {
            let dx = x[0] - mean[0];
            let dy = x[1] - mean[1];
            cov[0] += w * dx * dx;
            cov[1] += w * dx * dy;
            cov[2] += w * dy * dy;
        }
        for v in cov.iter_mut() {
            *v /= total;
        }
    }
    cov[0] += COVARIANCE_FLOOR;
    cov[2] += COVARIANCE_FLOOR;
    Covariance(cov)
}

fn get_weighted_mean(points: &[Point], weights: &[f64]) -> Point {
    let total = weights.iter().sum::<f64>();
    if total <= 0.0 {
        return [0.0, 0.0];
    }
    let mut mean = [0.0, 0.0];
    for (x, &w) in points.iter().zip(weights) {
        mean[0] += w * x[0];
        mean[1] += w * x[1];
    }
    [mean[0] / total, mean[1] / total]
}

/// Fit a mixture of full-covariance Gaussians to `points`, with one component started from each of `initial_means`
///
/// Each component starts with the covariance of the full point set. Iteration stops when the log likelihood
/// improves by less than `tolerance` or after `max_iterations`.
///
pub fn fit_gaussian_mixture(
    points: &[Point],
    initial_means: &[Point],
    max_iterations: usize,
    tolerance: f64,
) -> Option<GaussianMixture> {
    let n = points.len();
    let component_count = initial_means.len();
    if component_count == 0 || n < component_count {
        return None;
    }

    let uniform = vec![1.0; n];
    let global_mean = get_weighted_mean(points, &uniform);
    let global_covariance = get_weighted_covariance(points, &uniform, &global_mean);

    let mut components = initial_means
        .iter()
        .map(|&mean| GaussianComponent {
            weight: 1.0 / component_count as f64,
            mean,
            covariance: global_covariance,
        })
        .collect::<Vec<_>>();

    let mut responsibilities = vec![vec![0.0; n]; component_count];
    let mut log_likelihood = f64::NEG_INFINITY;
    let mut iterations = 0;
    while iterations < max_iterations {
        iterations += 1;

        // E-step
        let mut new_log_likelihood = 0.0;
        for (point_index, x) in points.iter().enumerate() {
            let mut total = 0.0;
            for (component_index, c) in components.iter().enumerate() {
                let r = c.weight * c.covariance.density(&c.mean, x);
                responsibilities[component_index][point_index] = r;
                total += r;
            }
            if total > 0.0 {
                for r in responsibilities.iter_mut() {
                    r[point_index] /= total;
                }
                new_log_likelihood += total.ln();
            } else {
                for r in responsibilities.iter_mut() {
                    r[point_index] = 1.0 / component_count as f64;
                }
                new_log_likelihood += f64::MIN_POSITIVE.ln();
            }
        }

        // M-step
        for (c, r) in components.iter_mut().zip(responsibilities.iter()) {
            let total = r.iter().sum::<f64>();
            c.weight = total / n as f64;
            if total > 0.0 {
                c.mean = get_weighted_mean(points, r);
                c.covariance = get_weighted_covariance(points, r, &c.mean);
            }
        }

        let converged = (new_log_likelihood - log_likelihood).abs() < tolerance;
        log_likelihood = new_log_likelihood;
        if converged {
            break;
        }
    }

    Some(GaussianMixture {
        components,
        log_likelihood,
        iterations,
    })
}

pub fn point_distance(a: &Point, b: &Point) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    (dx * dx + dy * dy).sqrt()
}

/// Mean silhouette coefficient of a clustering, in `[-1,1]`
///
/// Points in single-member clusters score 0. Returns None if there are fewer than 2 clusters.
///
pub fn silhouette_score(points: &[Point], labels: &[usize]) -> Option<f64> {
    assert_eq!(points.len(), labels.len());
    let cluster_count = labels.iter().max().map(|x| x + 1).unwrap_or(0);
    let mut cluster_sizes = vec![0usize; cluster_count];
    for &label in labels {
        cluster_sizes[label] += 1;
    }
    if cluster_sizes.iter().filter(|&&x| x > 0).count() < 2 {
        return None;
    }

    let mut total = 0.0;
    let mut distance_sums = vec![0.0; cluster_count];
    for (i, x) in points.iter().enumerate() {
        distance_sums.iter_mut().for_each(|v| *v = 0.0);
        for (j, y) in points.iter().enumerate() {
            if i != j {
                distance_sums[labels[j]] += point_distance(x, y);
            }
        }
        let own = labels[i];
        if cluster_sizes[own] <= 1 {
            continue;
        }
        let a = distance_sums[own] / (cluster_sizes[own] - 1) as f64;
        let b = (0..cluster_count)
            .filter(|&c| c != own && cluster_sizes[c] > 0)
            .map(|c| distance_sums[c] / cluster_sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }
    Some(total / points.len() as f64)
}
