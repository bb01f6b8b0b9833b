use std::iter::Sum;

use num::Float;

/// Replace non-finite likelihood values with zero
///
/// Likelihood products over many samples can overflow or produce NaN from degenerate input; these
/// states are treated as impossible rather than propagated.
///
pub fn sanitize_prob<F: Float>(p: F) -> F {
    if p.is_finite() { p } else { F::zero() }
}

/// Convert the probability of an incorrect call into a phred-scaled quality score, capped at `max_qscore`
///
/// An error probability of zero (or an infinite score) is reported as `max_qscore`.
///
pub fn capped_phred(error_prob: f64, max_qscore: f64) -> f64 {
    let q = -10.0 * error_prob.log10();
    if q.is_infinite() || q > max_qscore {
        max_qscore
    } else if q.is_nan() {
        0.0
    } else {
        q.max(0.0)
    }
}

/// Quality score of selecting `index` from an unnormalized likelihood distribution
///
/// Computed as the phred-scaled complement mass `(total - x[index]) / total`. Returns 0 if the
/// distribution has no mass.
///
pub fn get_selection_qscore(lhoods: &[f64], index: usize, max_qscore: f64) -> f64 {
    let total = lhoods.iter().sum::<f64>();
    if total.is_nan() || total <= 0.0 {
        return 0.0;
    }
    let complement = get_complement_prob(lhoods, index);
    capped_phred(complement / total, max_qscore)
}

/// Get the complement of pdf[index] from a prob distro
///
/// As pdf[index] approaches 1, computing the complement as 1 - pdf[index] starts to significantly
/// degrade precision. Instead the value is found by summing the rest of the pdf.
///
pub fn get_complement_prob<F: Float + Sum<F>>(pdf: &[F], index: usize) -> F {
    pdf.iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, p)| *p)
        .sum()
}

/// Index of the first maximum value
///
/// Ties resolve to the lowest index. Returns None for empty input.
///
pub fn first_max_index<F: Float>(x: &[F]) -> Option<usize> {
    let mut max_index = None;
    for (index, &v) in x.iter().enumerate() {
        match max_index {
            None => max_index = Some(index),
            Some(mi) => {
                if v > x[mi] {
                    max_index = Some(index);
                }
            }
        }
    }
    max_index
}

/// Logistic function
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
