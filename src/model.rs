use std::fs::File;
use std::io::Read;
use std::path::Path;

use image::imageops::FilterType;
use image::ImageError;
use tensorflow::{Graph, ImportGraphDefOptions, Session, SessionOptions, SessionRunArgs, Tensor};
use tracing::debug;

use crate::category::Category;
use crate::error::ServiceError;

/// Side length the model was trained on. Images are stretched to this square.
pub const IMAGE_SIZE: u32 = 256;
pub const CHANNELS: u64 = 3;
const NORM_SCALE: f32 = 1.0 / 255.0;

/// A single preprocessed image, laid out as `[1, 256, 256, 3]` row-major.
#[derive(Debug, Clone)]
pub struct InputBatch {
    values: Vec<f32>,
}

impl InputBatch {
    pub const SHAPE: [u64; 4] = [1, IMAGE_SIZE as u64, IMAGE_SIZE as u64, CHANNELS];

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub label: Category,
    pub confidence: f32,
}

pub trait ImageClassifier: Send + Sync {
    /// Returns one probability per category, in `Category::ALL` order.
    fn predict(&self, batch: &InputBatch) -> Result<Vec<f32>, ServiceError>;
}

/// Decodes the file at `path` by content and prepares it for inference.
pub fn preprocess_image(path: &Path) -> Result<InputBatch, ServiceError> {
    let img = image::io::Reader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(ImageError::IoError)?
        .decode()?;

    let rgb = img
        .resize_exact(IMAGE_SIZE, IMAGE_SIZE, FilterType::CatmullRom)
        .to_rgb8();

    let values = rgb
        .as_raw()
        .iter()
        .map(|&channel| channel as f32 * NORM_SCALE)
        .collect();

    Ok(InputBatch { values })
}

/// Runs the model once and picks the most probable category.
pub fn classify(
    classifier: &dyn ImageClassifier,
    batch: &InputBatch,
) -> Result<Classification, ServiceError> {
    let probabilities = classifier.predict(batch)?;
    if probabilities.len() != Category::COUNT {
        return Err(ServiceError::Inference(format!(
            "model returned {} scores, expected {}",
            probabilities.len(),
            Category::COUNT
        )));
    }

    let (index, &confidence) = probabilities
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .ok_or_else(|| ServiceError::Inference("model returned no scores".to_string()))?;

    let label = Category::from_index(index)
        .ok_or_else(|| ServiceError::Inference(format!("no category at index {}", index)))?;

    debug!("Classified as {} ({:.4})", label, confidence);
    Ok(Classification { label, confidence })
}

/// Frozen TensorFlow graph loaded once at startup.
pub struct Model {
    session: Session,
    graph: Graph,
    input_op: String,
    output_op: String,
}

impl Model {
    pub fn new(
        model_path: &Path,
        input_op: &str,
        output_op: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut graph = Graph::new();
        let mut model_file = File::open(model_path)?;
        let mut model_bytes = Vec::new();
        model_file.read_to_end(&mut model_bytes)?;

        graph.import_graph_def(&model_bytes, &ImportGraphDefOptions::new())?;

        for name in [input_op, output_op] {
            if graph.operation_by_name(name)?.is_none() {
                return Err(format!("Operation '{}' not found in graph", name).into());
            }
        }

        let session = Session::new(&SessionOptions::new(), &graph)?;

        Ok(Model {
            session,
            graph,
            input_op: input_op.to_string(),
            output_op: output_op.to_string(),
        })
    }
}

impl ImageClassifier for Model {
    fn predict(&self, batch: &InputBatch) -> Result<Vec<f32>, ServiceError> {
        let input_tensor = Tensor::new(&InputBatch::SHAPE).with_values(batch.values())?;

        let input_operation = self
            .graph
            .operation_by_name(&self.input_op)
            .map_err(tensorflow::Status::from)?
            .ok_or_else(|| {
                ServiceError::Inference(format!("Input operation '{}' not found", self.input_op))
            })?;
        let output_operation = self
            .graph
            .operation_by_name(&self.output_op)
            .map_err(tensorflow::Status::from)?
            .ok_or_else(|| {
                ServiceError::Inference(format!("Output operation '{}' not found", self.output_op))
            })?;

        let mut args = SessionRunArgs::new();
        args.add_feed(&input_operation, 0, &input_tensor);
        let output_token = args.request_fetch(&output_operation, 0);
        self.session.run(&mut args)?;

        let output_tensor: Tensor<f32> = args.fetch(output_token)?;
        Ok(output_tensor.to_vec())
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Returns the same scores for every image.
    pub struct FixedClassifier {
        pub scores: Vec<f32>,
    }

    impl FixedClassifier {
        pub fn predicting(label: Category, confidence: f32) -> Self {
            let rest = (1.0 - confidence) / (Category::COUNT - 1) as f32;
            let scores = Category::ALL
                .iter()
                .map(|&c| if c == label { confidence } else { rest })
                .collect();
            Self { scores }
        }
    }

    impl ImageClassifier for FixedClassifier {
        fn predict(&self, _batch: &InputBatch) -> Result<Vec<f32>, ServiceError> {
            Ok(self.scores.clone())
        }
    }

    pub fn write_png(path: &Path, width: u32, height: u32, color: [u8; 3]) {
        image::RgbImage::from_pixel(width, height, image::Rgb(color))
            .save(path)
            .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{write_png, FixedClassifier};
    use super::*;

    #[test]
    fn preprocess_stretches_to_model_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");
        write_png(&path, 640, 120, [255, 255, 255]);

        let batch = preprocess_image(&path).unwrap();

        assert_eq!(batch.values().len(), 256 * 256 * 3);
        assert!(batch.values().iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn preprocess_scales_into_unit_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("color.png");
        write_png(&path, 32, 32, [0, 51, 255]);

        let batch = preprocess_image(&path).unwrap();
        let first_pixel = &batch.values()[..3];

        assert!(first_pixel[0].abs() < 1e-6);
        assert!((first_pixel[1] - 0.2).abs() < 1e-6);
        assert!((first_pixel[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn preprocess_ignores_misleading_extension() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("source.png");
        write_png(&png, 8, 8, [10, 20, 30]);
        let jpg = dir.path().join("actually_png.jpg");
        std::fs::copy(&png, &jpg).unwrap();

        assert!(preprocess_image(&jpg).is_ok());
    }

    #[test]
    fn non_image_bytes_fail_to_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.png");
        std::fs::write(&path, b"definitely not an image").unwrap();

        assert!(matches!(
            preprocess_image(&path),
            Err(ServiceError::Decode(_))
        ));
    }

    #[test]
    fn classify_maps_argmax_to_category() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.png");
        write_png(&path, 4, 4, [0, 0, 0]);
        let batch = preprocess_image(&path).unwrap();

        let classifier = FixedClassifier {
            scores: vec![0.01, 0.02, 0.03, 0.04, 0.05, 0.7, 0.05, 0.05, 0.05],
        };
        let result = classify(&classifier, &batch).unwrap();

        assert_eq!(result.label, Category::Shoes);
        assert!((result.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn classify_rejects_wrong_score_count() {
        let batch = InputBatch { values: vec![0.0; 4] };
        let classifier = FixedClassifier {
            scores: vec![0.5, 0.5],
        };

        assert!(matches!(
            classify(&classifier, &batch),
            Err(ServiceError::Inference(_))
        ));
    }
}
