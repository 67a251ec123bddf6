// Core data models for the Face Scan application

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Represents a single decoded image with RGB data
#[derive(Clone, Debug)]
pub struct Frame {
    /// Raw RGB pixel data (width * height * 3 bytes)
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl Frame {
    /// Creates a new Frame with the given parameters
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }
}

/// Where an image payload came from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageSource {
    File(PathBuf),
    Camera,
}

/// Encoded image bytes as selected or captured by the user
#[derive(Clone, Debug)]
pub struct ImagePayload {
    bytes: Arc<[u8]>,
    source: ImageSource,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, source: ImageSource) -> Self {
        Self {
            bytes: bytes.into(),
            source,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }
}

/// The fixed set of facial expressions, in enumeration order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Expression {
    Angry,
    Disgusted,
    Fearful,
    Happy,
    Neutral,
    Sad,
    Surprised,
}

impl Expression {
    pub const ALL: [Expression; 7] = [
        Expression::Angry,
        Expression::Disgusted,
        Expression::Fearful,
        Expression::Happy,
        Expression::Neutral,
        Expression::Sad,
        Expression::Surprised,
    ];

    /// Lowercase key used by the expression lookup
    pub fn key(self) -> &'static str {
        match self {
            Expression::Angry => "angry",
            Expression::Disgusted => "disgusted",
            Expression::Fearful => "fearful",
            Expression::Happy => "happy",
            Expression::Neutral => "neutral",
            Expression::Sad => "sad",
            Expression::Surprised => "surprised",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Expression {
    type Err = String;

    /// Accepts the canonical keys and the class names common in FER model cards.
    /// Contempt folds into disgusted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "angry" | "anger" => Ok(Expression::Angry),
            "disgusted" | "disgust" | "contempt" => Ok(Expression::Disgusted),
            "fearful" | "fear" | "scared" => Ok(Expression::Fearful),
            "happy" | "happiness" => Ok(Expression::Happy),
            "neutral" => Ok(Expression::Neutral),
            "sad" | "sadness" => Ok(Expression::Sad),
            "surprised" | "surprise" => Ok(Expression::Surprised),
            other => Err(format!("unknown expression class '{other}'")),
        }
    }
}

/// Probability per expression
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ExpressionDistribution {
    probabilities: [f32; 7],
}

impl ExpressionDistribution {
    /// Builds a distribution from `(expression, probability)` pairs.
    /// Repeated expressions accumulate.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Expression, f32)>,
    {
        let mut dist = Self::default();
        for (expression, probability) in pairs {
            dist.probabilities[expression.index()] += probability;
        }
        dist
    }

    pub fn get(&self, expression: Expression) -> f32 {
        self.probabilities[expression.index()]
    }

    /// Iterates in the fixed enumeration order
    pub fn iter(&self) -> impl Iterator<Item = (Expression, f32)> + '_ {
        Expression::ALL.iter().map(|&e| (e, self.get(e)))
    }

    pub fn total(&self) -> f32 {
        self.probabilities.iter().sum()
    }
}

/// A 2D landmark point in image pixel space
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned face box in image pixel space
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// One detected face
#[derive(Clone, Debug)]
pub struct DetectionResult {
    pub face: FaceBox,
    pub expressions: ExpressionDistribution,
    pub landmarks: Vec<Landmark>,
}

/// Display-ready mapping of the first detected face
#[derive(Clone, Debug, PartialEq)]
pub struct FaceAnalysis {
    /// Expression with the highest probability
    pub dominant: Expression,
    /// Display string for the dominant expression
    pub label: &'static str,
    /// Neutral probability relative to the whole distribution
    pub score: f32,
    pub expressions: ExpressionDistribution,
    pub landmarks: Vec<Landmark>,
    /// Size of the analyzed image, the coordinate space of `landmarks`
    pub image_size: (u32, u32),
    /// Number of faces found; only the first is analyzed
    pub faces_found: usize,
}

/// Outcome of analyzing one image
#[derive(Clone, Debug, PartialEq)]
pub enum Analysis {
    Face(FaceAnalysis),
    NoFaceFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distribution_iterates_in_fixed_order() {
        let dist = ExpressionDistribution::from_pairs([
            (Expression::Surprised, 0.5),
            (Expression::Angry, 0.5),
        ]);
        let order: Vec<Expression> = dist.iter().map(|(e, _)| e).collect();
        assert_eq!(order, Expression::ALL.to_vec());
    }

    #[test]
    fn contempt_folds_into_disgusted() {
        let contempt: Expression = "contempt".parse().unwrap();
        let disgust: Expression = "Disgust".parse().unwrap();
        let dist = ExpressionDistribution::from_pairs([(contempt, 0.25), (disgust, 0.5)]);
        assert_eq!(dist.get(Expression::Disgusted), 0.75);
    }

    #[test]
    fn unknown_class_is_rejected() {
        assert!("bored".parse::<Expression>().is_err());
    }
}
