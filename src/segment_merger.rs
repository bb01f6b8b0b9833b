//! Merge adjacent segments which share a copy number call
//!

use std::ops::Range;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::segment::{Balleles, Segment, SegmentCall};

/// A genomic interval which segments may not be merged across
///
/// Interval is zero-indexed, half-closed `[begin,end)`
///
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GenomeInterval {
    pub chrom: String,
    pub begin: i64,
    pub end: i64,
}

pub struct MergeSettings<'a> {
    /// Segments shorter than this between two segments with the same call are absorbed into their neighbors
    pub min_call_size: i64,

    /// Maximum distance between two segments which can be merged
    pub max_gap: i64,

    pub excluded_intervals: &'a [GenomeInterval],
}

fn is_same_call(a: &SegmentCall, b: &SegmentCall) -> bool {
    a.copy_number == b.copy_number && a.major_chromosome_count == b.major_chromosome_count
}

/// True if an excluded interval touches the span from the end of `left` to the start of `right`
fn is_junction_excluded(left: &Segment, right: &Segment, excluded_intervals: &[GenomeInterval]) -> bool {
    excluded_intervals
        .iter()
        .any(|x| x.chrom == left.chrom && x.begin <= right.begin && x.end >= left.end)
}

fn is_joinable(left: &Segment, right: &Segment, settings: &MergeSettings) -> bool {
    left.is_within_gap(right, settings.max_gap)
        && !is_junction_excluded(left, right, settings.excluded_intervals)
}

/// Find contiguous runs of segment indices to merge, where every sample must agree on each merge
///
fn get_merge_groups(samples: &[Vec<Segment>], settings: &MergeSettings) -> Vec<Range<usize>> {
    let segment_count = samples.first().map(|x| x.len()).unwrap_or(0);
    let all_samples = |f: &dyn Fn(&[Segment]) -> bool| samples.iter().all(|x| f(x.as_slice()));

    let mut groups = Vec::new();
    let mut begin = 0;
    while begin < segment_count {
        let mut end = begin + 1;
        loop {
            if end < segment_count
                && all_samples(&|s| {
                    is_same_call(&s[begin].call, &s[end].call) && is_joinable(&s[end - 1], &s[end], settings)
                })
            {
                end += 1;
                continue;
            }
            if end + 1 < segment_count
                && all_samples(&|s| {
                    s[end].length() < settings.min_call_size
                        && is_same_call(&s[begin].call, &s[end + 1].call)
                        && is_joinable(&s[end - 1], &s[end], settings)
                        && is_joinable(&s[end], &s[end + 1], settings)
                })
            {
                end += 2;
                continue;
            }
            break;
        }
        groups.push(begin..end);
        begin = end;
    }
    groups
}

fn weighted_mean(values: impl Iterator<Item = (f64, f64)>) -> Option<f64> {
    let mut total_weight = 0.0;
    let mut total = 0.0;
    for (value, weight) in values {
        total += value * weight;
        total_weight += weight;
    }
    if total_weight > 0.0 {
        Some(total / total_weight)
    } else {
        None
    }
}

/// Merge a run of segments into one, taking the call of the first segment
///
/// Scores are length-weighted means over the members sharing that call. Optional scores are averaged over the
/// members where they are present.
///
fn merge_group(members: &[Segment]) -> Segment {
    let first = &members[0];
    let last = &members[members.len() - 1];
    let supporting = members
        .iter()
        .filter(|x| is_same_call(&x.call, &first.call))
        .collect::<Vec<_>>();

    let optional_mean = |f: fn(&SegmentCall) -> Option<f64>| {
        weighted_mean(
            supporting
                .iter()
                .filter_map(|x| f(&x.call).map(|v| (v, x.length() as f64))),
        )
    };

    let mut call = first.call.clone();
    call.qscore = weighted_mean(supporting.iter().map(|x| (x.call.qscore, x.length() as f64)))
        .unwrap_or(first.call.qscore);
    call.denovo_qscore = optional_mean(|c| c.denovo_qscore);
    call.major_chromosome_count_score = optional_mean(|c| c.major_chromosome_count_score);
    call.model_distance = optional_mean(|c| c.model_distance);
    call.runner_up_model_distance = optional_mean(|c| c.runner_up_model_distance);
    call.filter = supporting
        .iter()
        .max_by_key(|x| x.length())
        .and_then(|x| x.call.filter.clone());
    if !members.iter().all(|x| x.call.cluster_id == first.call.cluster_id) {
        call.cluster_id = None;
    }
    call.is_heterogeneous = supporting.iter().any(|x| x.call.is_heterogeneous);

    Segment {
        chrom: first.chrom.clone(),
        begin: first.begin,
        end: last.end,
        counts: members.iter().flat_map(|x| x.counts.iter().copied()).collect(),
        alleles: Balleles::new(
            members
                .iter()
                .flat_map(|x| x.alleles.sites.iter().cloned())
                .collect(),
        ),
        call,
    }
}

/// Merge index-aligned segments from every sample until no further merge is possible
///
/// A merge at any segment index is only made if it is valid in every sample, so that the per-sample segment
/// lists stay index-aligned.
///
pub fn merge_pedigree_segments(samples: &mut [Vec<Segment>], settings: &MergeSettings) {
    let initial_count = samples.first().map(|x| x.len()).unwrap_or(0);
    loop {
        let segment_count = samples.first().map(|x| x.len()).unwrap_or(0);
        let groups = get_merge_groups(samples, settings);
        if groups.len() == segment_count {
            break;
        }
        for segments in samples.iter_mut() {
            let merged: Vec<Segment> = groups
                .iter()
                .map(|group| {
                    if group.len() == 1 {
                        segments[group.start].clone()
                    } else {
                        merge_group(&segments[group.clone()])
                    }
                })
                .collect();
            *segments = merged;
        }
    }
    debug!(
        "Merged {initial_count} segments into {}",
        samples.first().map(|x| x.len()).unwrap_or(0)
    );
}

/// Merge adjacent segments of a single sample which share a copy number call
///
pub fn merge_segments(segments: Vec<Segment>, settings: &MergeSettings) -> Vec<Segment> {
    let mut samples = vec![segments];
    merge_pedigree_segments(&mut samples, settings);
    samples.pop().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Ballele;

    fn get_segment(begin: i64, end: i64, copy_number: u32, qscore: f64) -> Segment {
        let mut segment = Segment::new(
            "chr1",
            begin,
            end,
            vec![10.0],
            Balleles::new(vec![Ballele::new(begin, 5, 5)]),
        );
        segment.call.copy_number = copy_number;
        segment.call.qscore = qscore;
        segment
    }

    fn get_settings(excluded_intervals: &[GenomeInterval]) -> MergeSettings<'_> {
        MergeSettings {
            min_call_size: 1000,
            max_gap: 100,
            excluded_intervals,
        }
    }

    #[test]
    fn test_merge_segments() {
        let segments = vec![
            get_segment(0, 1000, 2, 10.0),
            get_segment(1000, 4000, 2, 30.0),
            get_segment(4050, 6000, 3, 20.0),
            get_segment(7000, 9000, 3, 20.0),
        ];
        let merged = merge_segments(segments, &get_settings(&[]));
        assert_eq!(merged.len(), 3);
        assert_eq!((merged[0].begin, merged[0].end), (0, 4000));
        approx::assert_ulps_eq!(merged[0].call.qscore, 25.0, max_ulps = 4);
        assert_eq!(merged[0].counts.len(), 2);
        assert_eq!(merged[0].alleles.len(), 2);

        // Gap too large:
        assert_eq!((merged[1].begin, merged[1].end), (4050, 6000));
    }

    #[test]
    fn test_sandwiched_segment() {
        let segments = vec![
            get_segment(0, 5000, 2, 10.0),
            get_segment(5000, 5500, 1, 50.0),
            get_segment(5500, 10000, 2, 20.0),
        ];
        let merged = merge_segments(segments.clone(), &get_settings(&[]));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].call.copy_number, 2);
        approx::assert_abs_diff_eq!(merged[0].call.qscore, 14.736842105263158, epsilon = 1e-9);

        // A long middle segment is kept:
        let mut segments = segments;
        segments[1].end = 7000;
        segments[2].begin = 7000;
        assert_eq!(merge_segments(segments, &get_settings(&[])).len(), 3);
    }

    #[test]
    fn test_excluded_interval() {
        let segments = vec![get_segment(0, 1000, 2, 10.0), get_segment(1050, 4000, 2, 30.0)];
        let excluded = vec![GenomeInterval {
            chrom: "chr1".to_string(),
            begin: 1010,
            end: 1040,
        }];
        assert_eq!(merge_segments(segments.clone(), &get_settings(&excluded)).len(), 2);

        let elsewhere = vec![GenomeInterval {
            chrom: "chr2".to_string(),
            begin: 1010,
            end: 1040,
        }];
        assert_eq!(merge_segments(segments, &get_settings(&elsewhere)).len(), 1);
    }

    #[test]
    fn test_denovo_qscore_merge() {
        let mut segments = vec![
            get_segment(0, 1000, 3, 10.0),
            get_segment(1000, 3000, 3, 10.0),
            get_segment(3000, 4000, 3, 10.0),
        ];
        segments[0].call.denovo_qscore = Some(30.0);
        segments[1].call.denovo_qscore = Some(60.0);
        let merged = merge_segments(segments, &get_settings(&[]));
        assert_eq!(merged.len(), 1);
        approx::assert_ulps_eq!(merged[0].call.denovo_qscore.unwrap(), 50.0, max_ulps = 4);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let segments = vec![
            get_segment(0, 1000, 2, 10.0),
            get_segment(1000, 4000, 2, 30.0),
            get_segment(4000, 6000, 3, 20.0),
            get_segment(6000, 9000, 1, 20.0),
        ];
        let merged = merge_segments(segments, &get_settings(&[]));
        let remerged = merge_segments(merged.clone(), &get_settings(&[]));
        assert!(merged == remerged);
    }

    #[test]
    fn test_merge_pedigree_segments() {
        let sample1 = vec![
            get_segment(0, 1000, 2, 10.0),
            get_segment(1000, 4000, 2, 30.0),
            get_segment(4000, 6000, 2, 20.0),
        ];
        let mut sample2 = sample1.clone();
        sample2[2].call.copy_number = 3;
        let mut samples = vec![sample1, sample2];
        merge_pedigree_segments(&mut samples, &get_settings(&[]));
        assert_eq!(samples[0].len(), 2);
        assert_eq!(samples[1].len(), 2);
        assert_eq!(samples[0][1].begin, samples[1][1].begin);
    }
}
