//! Facial landmark regression with an `ONNX` model.

use crate::{
    constants::{LANDMARK_INPUT_SIZE, NUM_FACIAL_LANDMARKS},
    landmarks::LandmarkSet,
    pipeline::{Frame, LandmarkRegressor},
    Error, Result,
};
use ndarray::{Array4, CowArray};
use ort::{Environment, Session, Value};
use std::path::Path;
use std::sync::Arc;

/// Facial landmark regressor using `ONNX` Runtime.
///
/// Expects a `[1, 128, 128, 3]` RGB input scaled to `[0, 1]` and produces
/// 136 values: `x, y` pairs normalized to the crop.
pub struct OnnxLandmarkRegressor {
    session: Session,
}

impl OnnxLandmarkRegressor {
    /// Create a new landmark regressor from an `ONNX` model file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The ONNX model file cannot be loaded
    /// - The ONNX runtime environment cannot be created
    /// - The model has no inputs or outputs
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        log::info!("Initializing landmark regressor with model: {}", model_path.as_ref().display());
        let environment = Arc::new(
            Environment::builder()
                .with_name("landmark_regressor")
                .with_log_level(ort::LoggingLevel::Warning)
                .build()?,
        );

        let session = ort::SessionBuilder::new(&environment)?
            .with_optimization_level(ort::GraphOptimizationLevel::Level3)?
            .with_model_from_file(model_path)?;

        if session.inputs.is_empty() {
            return Err(Error::ModelError("Landmark model has no inputs".to_string()));
        }
        if session.outputs.is_empty() {
            return Err(Error::ModelOutputError("Landmark model has no outputs".to_string()));
        }

        Ok(Self { session })
    }

    /// Run forward pass through the model
    fn forward(&self, input: Array4<f32>) -> Result<Vec<f32>> {
        let cow_array = CowArray::from(input.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;

        let outputs = self.session.run(vec![input_tensor])?;
        let marks_output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| Error::ModelOutputError("No output from model".to_string()))?;

        let marks_tensor = marks_output.try_extract::<f32>()?;
        let marks_view = marks_tensor.view();
        Ok(marks_view.iter().copied().collect())
    }
}

impl LandmarkRegressor for OnnxLandmarkRegressor {
    fn regress(&mut self, face: &Frame) -> Result<LandmarkSet> {
        let input = preprocess(face)?;
        let values = self.forward(input)?;
        if values.len() < NUM_FACIAL_LANDMARKS * 2 {
            return Err(Error::ModelOutputError(format!(
                "Expected {} landmark values, got {}",
                NUM_FACIAL_LANDMARKS * 2,
                values.len()
            )));
        }
        LandmarkSet::from_flat(&values[..NUM_FACIAL_LANDMARKS * 2])
    }
}

/// NHWC float tensor of a 128×128 RGB crop
fn preprocess(face: &Frame) -> Result<Array4<f32>> {
    if face.dimensions() != (LANDMARK_INPUT_SIZE, LANDMARK_INPUT_SIZE) {
        return Err(Error::InvalidInput(format!(
            "Landmark input must be {LANDMARK_INPUT_SIZE}x{LANDMARK_INPUT_SIZE}, got {}x{}",
            face.width(),
            face.height()
        )));
    }
    let size = LANDMARK_INPUT_SIZE as usize;
    Ok(Array4::from_shape_fn((1, size, size, 3), |(_, row, col, ch)| {
        f32::from(face.get_pixel(col as u32, row as u32)[ch]) / 255.0
    }))
}
