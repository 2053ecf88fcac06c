//! JSON message shapes exchanged with the editing layer.

use serde::{Deserialize, Serialize};

use crate::error::{GeometryError, Result};
use crate::model::{Color, Contour, Slice, Structure};
use crate::operations::{Backend, BooleanOp, MarginParams};

use super::{JobKind, JobRequest, JobResponse};

const DEFAULT_COLOR: Color = Color { r: 255, g: 0, b: 0 };

/// Operator names accepted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireOperator {
    Union,
    Intersect,
    Subtract,
    Dilate,
    Erode,
}

/// A structure as flat `[x, y, z, ...]` contours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireStructure {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: Option<Color>,
    pub contours: Vec<Vec<f64>>,
}

impl WireStructure {
    /// # Errors
    ///
    /// Returns `GeometryError::InvalidInput` for a malformed contour.
    pub fn to_structure(&self) -> Result<Structure> {
        let mut structure = Structure::new(self.name.clone(), self.color.unwrap_or(DEFAULT_COLOR));
        for flat in &self.contours {
            structure.add_contour(Contour::from_flat(flat)?);
        }
        Ok(structure)
    }
}

/// `{ jobId, operator, backend, structureA, structureB?, margin? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRequest {
    pub job_id: String,
    pub operator: WireOperator,
    #[serde(default)]
    pub backend: Backend,
    pub structure_a: WireStructure,
    #[serde(default)]
    pub structure_b: Option<WireStructure>,
    #[serde(default)]
    pub margin: Option<MarginParams>,
    #[serde(default)]
    pub pixel_spacing: Option<[f64; 2]>,
}

impl WireRequest {
    /// Converts the message into a job with owned input snapshots.
    ///
    /// `erode` always shrinks and `dilate` always grows, whatever the sign
    /// of the supplied margin.
    ///
    /// # Errors
    ///
    /// Returns `GeometryError::InvalidInput` for malformed contours or a
    /// missing operand.
    pub fn into_job(self) -> Result<JobRequest> {
        let a = self.structure_a.to_structure()?;
        let kind = match self.operator {
            WireOperator::Union | WireOperator::Intersect | WireOperator::Subtract => {
                let op = match self.operator {
                    WireOperator::Union => BooleanOp::Union,
                    WireOperator::Intersect => BooleanOp::Intersect,
                    _ => BooleanOp::Subtract,
                };
                let b = self
                    .structure_b
                    .as_ref()
                    .ok_or_else(|| GeometryError::InvalidInput("structureB is required".into()))?
                    .to_structure()?;
                JobKind::Boolean {
                    op,
                    backend: self.backend,
                    a,
                    b,
                    pixel_spacing: self.pixel_spacing,
                }
            }
            WireOperator::Dilate | WireOperator::Erode => {
                let mut params = self
                    .margin
                    .ok_or_else(|| GeometryError::InvalidInput("margin is required".into()))?;
                let sign = if self.operator == WireOperator::Erode { -1.0 } else { 1.0 };
                let signed = |m: f64| m.abs() * sign;
                params.margin_value = signed(params.margin_value);
                params.margin_x = params.margin_x.map(signed);
                params.margin_y = params.margin_y.map(signed);
                params.margin_z = params.margin_z.map(signed);
                if params.pixel_spacing.is_none() {
                    params.pixel_spacing = self.pixel_spacing;
                }
                JobKind::Margin { structure: a, params }
            }
        };
        Ok(JobRequest {
            id: self.job_id,
            kind,
        })
    }
}

/// One result contour, tagged with its point count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireContour {
    pub points: Vec<f64>,
    pub number_of_points: usize,
    pub z: f64,
}

/// `{ jobId, ok: true, result }` or `{ jobId, ok: false, error }`.
///
/// `slicePositions` lists every slice the job covered, including those it
/// emptied, so the caller can clear them when merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireResponse {
    pub job_id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<WireContour>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice_positions: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobResponse {
    #[must_use]
    pub fn to_wire(&self) -> WireResponse {
        match &self.outcome {
            Ok(slices) => WireResponse {
                job_id: self.job_id.clone(),
                ok: true,
                result: Some(
                    slices
                        .iter()
                        .flat_map(Slice::contours)
                        .map(|c| WireContour {
                            points: c.to_flat(),
                            number_of_points: c.number_of_points(),
                            z: c.z,
                        })
                        .collect(),
                ),
                slice_positions: Some(slices.iter().map(|s| s.z).collect()),
                error: None,
            },
            Err(err) => WireResponse {
                job_id: self.job_id.clone(),
                ok: false,
                result: None,
                slice_positions: None,
                error: Some(err.to_string()),
            },
        }
    }
}
