//! Optional debug output of every evaluated purity/ploidy model and the final segment clusters
//!

use std::fs::File;

use camino::Utf8Path;
use log::info;
use serde::Serialize;
use unwrap::unwrap;

use super::model::CoveragePurityModel;
use super::segment_info::SegmentInfo;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SearchPass {
    Coarse,
    Fine,
}

/// Receiver for intermediate purity/ploidy modeling results
///
pub trait ModelReporter {
    fn report_model(&mut self, pass: SearchPass, model: &CoveragePurityModel);

    fn report_segments(&mut self, segments: &[SegmentInfo]);
}

#[derive(Serialize)]
struct ReportedModel {
    pass: SearchPass,
    diploid_coverage: f64,
    purity: f64,
    ploidy: f64,
    deviation: f64,
    precision_deviation: f64,
    accuracy_deviation: f64,
    cluster_deviation: Option<f64>,
    percent_normal: f64,
    diploid_distance: f64,
    heterogeneity_index: f64,
}

#[derive(Serialize)]
struct ReportedSegment {
    segment_index: usize,
    coverage: f64,
    maf: f64,
    weight: f64,
    cluster_id: Option<usize>,
}

/// Collects all reported models and segments for output as a single json file
///
#[derive(Default, Serialize)]
pub struct JsonModelReporter {
    models: Vec<ReportedModel>,
    segments: Vec<ReportedSegment>,
}

impl JsonModelReporter {
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    pub fn write(&self, filename: &Utf8Path) {
        info!("Writing purity/ploidy model debug output to file: '{filename}'");
        let f = unwrap!(
            File::create(filename),
            "Unable to create model debug json file: '{filename}'"
        );
        serde_json::to_writer_pretty(&f, self).unwrap();
    }
}

impl ModelReporter for JsonModelReporter {
    fn report_model(&mut self, pass: SearchPass, model: &CoveragePurityModel) {
        self.models.push(ReportedModel {
            pass,
            diploid_coverage: model.diploid_coverage,
            purity: model.purity,
            ploidy: model.ploidy,
            deviation: model.deviation,
            precision_deviation: model.precision_deviation,
            accuracy_deviation: model.accuracy_deviation,
            cluster_deviation: model.cluster_deviation,
            percent_normal: model.percent_normal,
            diploid_distance: model.diploid_distance,
            heterogeneity_index: model.heterogeneity_index,
        });
    }

    fn report_segments(&mut self, segments: &[SegmentInfo]) {
        self.segments = segments
            .iter()
            .map(|x| ReportedSegment {
                segment_index: x.segment_index,
                coverage: x.coverage,
                maf: x.maf,
                weight: x.weight,
                cluster_id: x.cluster_id,
            })
            .collect();
    }
}
