//! Crop and fertilizer classifiers.
//!
//! Both models are decision forests exported to JSON:
//!
//! ```json
//! { "kind": "crop", "features": ["N", "P", ...], "classes": ["rice", ...],
//!   "trees": [ { "nodes": [ { "feature": 0, "threshold": 50.0, "left": 1, "right": 2 },
//!                           { "value": [0.9, 0.1] }, { "value": [0.2, 0.8] } ] } ] }
//! ```
//!
//! A split sends `x[feature] <= threshold` left. Leaf class distributions are
//! summed across trees and the highest total wins (ties go to the earlier
//! class). Artifacts are loaded and validated once at startup; the loaded
//! `Predictor` is immutable and shared across requests.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::services::features::{Feature, FeatureVector};

/// Category code used for crop names and soil colors missing from the tables.
pub const UNKNOWN_CATEGORY_CODE: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Crop,
    Fertilizer,
}

impl ModelKind {
    pub fn artifact_file(self) -> &'static str {
        match self {
            ModelKind::Crop => "crop_recommendation.json",
            ModelKind::Fertilizer => "fertilizer.json",
        }
    }

    /// Input columns in the order the model was trained on.
    pub fn input_features(self) -> &'static [&'static str] {
        match self {
            ModelKind::Crop => &["N", "P", "K", "temperature", "humidity", "ph", "rainfall"],
            ModelKind::Fertilizer => &[
                "soil_color",
                "N",
                "P",
                "K",
                "ph",
                "rainfall",
                "temperature",
                "crop",
            ],
        }
    }
}

// --- Artifact format ---

#[derive(Debug, Deserialize)]
struct ForestArtifact {
    kind: ModelKind,
    features: Vec<String>,
    classes: Vec<String>,
    trees: Vec<Tree>,
}

#[derive(Debug, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

/// A validated decision-forest classifier.
#[derive(Debug)]
pub struct Classifier {
    kind: ModelKind,
    classes: Vec<String>,
    trees: Vec<Tree>,
}

impl Classifier {
    pub fn load(path: &Path, kind: ModelKind) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ModelUnavailable(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw, kind)
            .map_err(|e| AppError::ModelUnavailable(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(raw: &str, expected: ModelKind) -> Result<Self, AppError> {
        let artifact: ForestArtifact = serde_json::from_str(raw)
            .map_err(|e| AppError::ModelUnavailable(format!("malformed artifact: {}", e)))?;
        validate(&artifact, expected).map_err(AppError::ModelUnavailable)?;
        Ok(Self {
            kind: artifact.kind,
            classes: artifact.classes,
            trees: artifact.trees,
        })
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Classify one input row. `inputs` must follow `ModelKind::input_features`.
    pub fn predict(&self, inputs: &[f64]) -> Result<&str, AppError> {
        let expected = self.kind.input_features().len();
        if inputs.len() != expected {
            return Err(AppError::InternalError(format!(
                "feature length mismatch: got {}, expected {}",
                inputs.len(),
                expected
            )));
        }

        let mut totals = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            for (total, p) in totals.iter_mut().zip(tree.leaf_for(inputs)) {
                *total += p;
            }
        }

        let mut best = 0;
        for (i, total) in totals.iter().enumerate() {
            if *total > totals[best] {
                best = i;
            }
        }
        Ok(&self.classes[best])
    }
}

impl Tree {
    fn leaf_for(&self, inputs: &[f64]) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if inputs[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// Structural checks that make `Tree::leaf_for` total: child indices point
/// forward within the tree (so traversal terminates) and every leaf covers
/// every class.
fn validate(artifact: &ForestArtifact, expected: ModelKind) -> Result<(), String> {
    if artifact.kind != expected {
        return Err(format!(
            "expected a {:?} model, found {:?}",
            expected, artifact.kind
        ));
    }
    let wanted = expected.input_features();
    if artifact.features.len() != wanted.len()
        || artifact.features.iter().zip(wanted).any(|(a, b)| a != b)
    {
        return Err(format!(
            "feature order {:?} does not match {:?}",
            artifact.features, wanted
        ));
    }
    if artifact.classes.is_empty() {
        return Err("no classes".to_string());
    }
    if artifact.trees.is_empty() {
        return Err("no trees".to_string());
    }

    for (t, tree) in artifact.trees.iter().enumerate() {
        if tree.nodes.is_empty() {
            return Err(format!("tree {} has no nodes", t));
        }
        for (i, node) in tree.nodes.iter().enumerate() {
            match node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= wanted.len() {
                        return Err(format!("tree {} node {}: feature {} out of range", t, i, feature));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("tree {} node {}: non-finite threshold", t, i));
                    }
                    for child in [*left, *right] {
                        if child <= i || child >= tree.nodes.len() {
                            return Err(format!("tree {} node {}: bad child index {}", t, i, child));
                        }
                    }
                }
                Node::Leaf { value } => {
                    if value.len() != artifact.classes.len() {
                        return Err(format!(
                            "tree {} node {}: leaf has {} values for {} classes",
                            t,
                            i,
                            value.len(),
                            artifact.classes.len()
                        ));
                    }
                }
            }
        }
    }
    Ok(())
}

// --- Categorical encodings ---

/// Lookup tables for the fertilizer model's categorical inputs.
///
/// Keys are matched case-insensitively.
#[derive(Debug, Clone)]
pub struct CategoricalEncodings {
    crops: HashMap<String, u32>,
    soil_colors: HashMap<String, u32>,
}

#[derive(Deserialize)]
struct EncodingsFile {
    crops: HashMap<String, u32>,
    soil_colors: HashMap<String, u32>,
}

impl CategoricalEncodings {
    pub fn new(crops: HashMap<String, u32>, soil_colors: HashMap<String, u32>) -> Self {
        let lower = |m: HashMap<String, u32>| {
            m.into_iter()
                .map(|(k, v)| (k.trim().to_lowercase(), v))
                .collect()
        };
        Self {
            crops: lower(crops),
            soil_colors: lower(soil_colors),
        }
    }

    /// The tables the shipped fertilizer model was trained with.
    pub fn builtin() -> Self {
        let table = |pairs: &[(&str, u32)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<HashMap<_, _>>()
        };
        Self::new(
            table(&[
                ("Sugarcane", 1),
                ("Wheat", 2),
                ("Cotton", 3),
                ("Jowar", 4),
                ("Maize", 5),
                ("Rice", 6),
                ("Groundnut", 7),
                ("Tur", 8),
                ("Ginger", 9),
                ("Grapes", 10),
                ("Urad", 11),
                ("Moong", 12),
                ("Gram", 13),
                ("Turmeric", 14),
                ("Soybean", 15),
                ("Masoor", 16),
            ]),
            table(&[
                ("Black", 1),
                ("Red", 2),
                ("Medium Brown", 3),
                ("Dark Brown", 4),
                ("Light Brown", 5),
                ("Reddish Brown", 6),
            ]),
        )
    }

    /// Load from a JSON file `{ "crops": {...}, "soil_colors": {...} }`.
    /// A missing file falls back to the built-in tables.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            tracing::info!(
                "No encodings file at {}, using built-in tables",
                path.display()
            );
            return Ok(Self::builtin());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ModelUnavailable(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let file: EncodingsFile = serde_json::from_str(raw)
            .map_err(|e| AppError::ModelUnavailable(format!("malformed encodings: {}", e)))?;
        Ok(Self::new(file.crops, file.soil_colors))
    }

    pub fn crop_code(&self, name: Option<&str>) -> u32 {
        lookup(&self.crops, "crop", name)
    }

    pub fn soil_color_code(&self, color: Option<&str>) -> u32 {
        lookup(&self.soil_colors, "soil color", color)
    }
}

fn lookup(table: &HashMap<String, u32>, what: &str, value: Option<&str>) -> u32 {
    let Some(value) = value else {
        return UNKNOWN_CATEGORY_CODE;
    };
    match table.get(&value.trim().to_lowercase()) {
        Some(code) => *code,
        None => {
            tracing::warn!(
                "Unknown {} '{}', encoding as {}",
                what,
                value,
                UNKNOWN_CATEGORY_CODE
            );
            UNKNOWN_CATEGORY_CODE
        }
    }
}

// --- Predictor ---

/// Categorical context for a prediction: the land's soil color and the crop
/// currently planted on it.
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoricalContext<'a> {
    pub soil_color: Option<&'a str>,
    pub crop_name: Option<&'a str>,
}

/// Both classifiers plus the encodings they need, loaded once.
#[derive(Debug)]
pub struct Predictor {
    crop: Classifier,
    fertilizer: Classifier,
    encodings: CategoricalEncodings,
}

impl Predictor {
    pub fn new(
        crop: Classifier,
        fertilizer: Classifier,
        encodings: CategoricalEncodings,
    ) -> Result<Self, AppError> {
        if crop.kind() != ModelKind::Crop || fertilizer.kind() != ModelKind::Fertilizer {
            return Err(AppError::ModelUnavailable(
                "classifier kinds do not match their slots".to_string(),
            ));
        }
        Ok(Self {
            crop,
            fertilizer,
            encodings,
        })
    }

    /// Load both artifacts from `model_dir`.
    pub fn load(model_dir: &Path, encodings: CategoricalEncodings) -> Result<Self, AppError> {
        let crop = Classifier::load(&model_dir.join(ModelKind::Crop.artifact_file()), ModelKind::Crop)?;
        let fertilizer = Classifier::load(
            &model_dir.join(ModelKind::Fertilizer.artifact_file()),
            ModelKind::Fertilizer,
        )?;
        tracing::info!(
            "Loaded classifiers: crop ({} classes), fertilizer ({} classes)",
            crop.classes().len(),
            fertilizer.classes().len()
        );
        Self::new(crop, fertilizer, encodings)
    }

    pub fn classifier(&self, kind: ModelKind) -> &Classifier {
        match kind {
            ModelKind::Crop => &self.crop,
            ModelKind::Fertilizer => &self.fertilizer,
        }
    }

    /// Build the model input row. Soil nutrients are checked before climate
    /// fields so a plot with no usable reading reports that first.
    pub fn encode(
        &self,
        kind: ModelKind,
        features: &FeatureVector,
        ctx: CategoricalContext<'_>,
    ) -> Result<Vec<f64>, AppError> {
        for f in [Feature::Nitrogen, Feature::Phosphorus, Feature::Potassium, Feature::Ph] {
            features.require(f)?;
        }

        kind.input_features()
            .iter()
            .map(|name| match *name {
                "N" => features.require(Feature::Nitrogen),
                "P" => features.require(Feature::Phosphorus),
                "K" => features.require(Feature::Potassium),
                "ph" => features.require(Feature::Ph),
                "temperature" => features.require(Feature::Temperature),
                "humidity" => features.require(Feature::Humidity),
                "rainfall" => features.require(Feature::Rainfall),
                "soil_color" => Ok(self.encodings.soil_color_code(ctx.soil_color) as f64),
                "crop" => Ok(self.encodings.crop_code(ctx.crop_name) as f64),
                other => Err(AppError::InternalError(format!("unmapped feature {}", other))),
            })
            .collect()
    }

    pub fn predict(
        &self,
        kind: ModelKind,
        features: &FeatureVector,
        ctx: CategoricalContext<'_>,
    ) -> Result<String, AppError> {
        let inputs = self.encode(kind, features, ctx)?;
        let label = self.classifier(kind).predict(&inputs)?;
        tracing::debug!("{:?} model predicted '{}' for {:?}", kind, label, inputs);
        Ok(label.to_string())
    }
}
