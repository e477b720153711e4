// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! JSON file formats: scene ground truth, detection results and evaluation
//! reports, plus the list files that pair them up for batch evaluation.

use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::ellipse::{DetectedEllipse, Ellipse, GroundTruthEllipse};
use crate::error::{BenchError, Result};
use crate::evaluator::MatchResult;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EllipseParameters {
    pub elps_x: f64,
    pub elps_y: f64,
    pub elps_width: f64,
    pub elps_height: f64,
    pub elps_angle: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PicCoordinates {
    pub row: u32,
    pub col: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthObject {
    pub elps_parameters: EllipseParameters,
    pub pic_coordinates: PicCoordinates,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneColors {
    pub bg_color: u8,
    pub elps_color: u8,
}

/// How a scene was rendered. Written by the generator; optional on read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blur_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<SceneColors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_std: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_of_collage: Option<u32>,
}

impl SceneMetadata {
    pub fn new(blur_size: u32, bg_color: u8, elps_color: u8, noise_std: f64,
               size_of_collage: u32) -> Self {
        SceneMetadata {
            blur_size: Some(blur_size),
            colors: Some(SceneColors { bg_color, elps_color }),
            noise_std: Some(noise_std),
            size_of_collage: Some(size_of_collage),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthRecord {
    #[serde(flatten)]
    pub metadata: SceneMetadata,
    #[serde(default)]
    pub objects: Vec<GroundTruthObject>,
}

impl GroundTruthRecord {
    pub fn new(truth: &[GroundTruthEllipse], metadata: SceneMetadata) -> Self {
        let objects = truth.iter().map(|gt| GroundTruthObject {
            elps_parameters: EllipseParameters {
                elps_x: gt.ellipse.center_x,
                elps_y: gt.ellipse.center_y,
                elps_width: gt.ellipse.width,
                elps_height: gt.ellipse.height,
                elps_angle: gt.ellipse.angle,
            },
            pic_coordinates: PicCoordinates { row: gt.grid_row, col: gt.grid_col },
        }).collect();
        GroundTruthRecord { metadata, objects }
    }

    pub fn ground_truth(&self) -> Vec<GroundTruthEllipse> {
        self.objects.iter().map(|o| {
            let p = &o.elps_parameters;
            GroundTruthEllipse {
                ellipse: Ellipse::new(p.elps_x, p.elps_y, p.elps_width, p.elps_height,
                                      p.elps_angle),
                grid_row: o.pic_coordinates.row,
                grid_col: o.pic_coordinates.col,
            }
        }).collect()
    }

    pub fn ellipses(&self) -> Vec<Ellipse> {
        self.ground_truth().into_iter().map(|gt| gt.ellipse).collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContourPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contour: Option<Vec<ContourPoint>>,
}

impl DetectedObject {
    pub fn ellipse(&self) -> Ellipse {
        Ellipse::new(self.x, self.y, self.width, self.height, self.angle)
    }
}

impl From<&DetectedEllipse> for DetectedObject {
    fn from(detection: &DetectedEllipse) -> Self {
        let e = &detection.ellipse;
        DetectedObject {
            x: e.center_x,
            y: e.center_y,
            width: e.width,
            height: e.height,
            angle: e.angle,
            contour: detection.boundary.as_ref().map(|points| {
                points.iter().map(|&[x, y]| ContourPoint { x, y }).collect()
            }),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    #[serde(default)]
    pub detected_objects: Vec<DetectedObject>,
}

impl DetectionRecord {
    pub fn new(detections: &[DetectedEllipse]) -> Self {
        DetectionRecord { detected_objects: detections.iter().map(DetectedObject::from).collect() }
    }

    pub fn ellipses(&self) -> Vec<Ellipse> {
        self.detected_objects.iter().map(DetectedObject::ellipse).collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub object_precision: f64,
    pub object_recall: f64,
}

impl From<&MatchResult> for Metrics {
    fn from(result: &MatchResult) -> Self {
        Metrics {
            true_positives: result.true_positives,
            false_positives: result.false_positives,
            false_negatives: result.false_negatives,
            object_precision: result.precision,
            object_recall: result.recall,
        }
    }
}

/// One evaluated file pair. `metrics` is null when the pair could not be
/// loaded, and `error` then says why.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub file: String,
    pub metrics: Option<Metrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub evaluations: Vec<Evaluation>,
}

/// Paths listed one per line. Surrounding whitespace is trimmed and blank
/// lines are skipped.
pub fn read_list_file(path: &Path) -> Result<Vec<PathBuf>> {
    let contents = fs::read_to_string(path)
        .map_err(|e| BenchError::from(e).in_file(path))?;
    Ok(parse_list(&contents))
}

fn parse_list(contents: &str) -> Vec<PathBuf> {
    contents.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect()
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = fs::File::open(path).map_err(|e| BenchError::from(e).in_file(path))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| BenchError::from(e).in_file(path))
}

/// Writes `value` as pretty-printed JSON, creating parent directories as
/// needed.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let write = || -> Result<()> {
        create_parent_dir(path)?;
        let mut writer = BufWriter::new(fs::File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    };
    write().map_err(|e| e.in_file(path))
}

pub fn create_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

// mod tests.
