// src/keyframe.rs
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Two keyframe times closer than this are the same sample.
pub const TIME_EPSILON: f64 = 1e-6;

// --- DATA STRUCTURES ---

/// Structured color, channels in 0..=255 and alpha in 0..=1.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    #[serde(default = "default_alpha")]
    pub a: f64,
}

fn default_alpha() -> f64 {
    1.0
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum KeyframeValue {
    Number(f64),
    Vector(Vec<f64>),
    Color(Rgba),
    Text(String),
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    Vector,
    Color,
    Text,
}

impl KeyframeValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            KeyframeValue::Number(_) => ValueKind::Number,
            KeyframeValue::Vector(_) => ValueKind::Vector,
            KeyframeValue::Color(_) => ValueKind::Color,
            KeyframeValue::Text(_) => ValueKind::Text,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            KeyframeValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Interpolation {
    #[default]
    Linear,
    #[serde(alias = "hold")]
    Step,
    EaseIn,
    EaseOut,
    EaseInOut,
}

impl Interpolation {
    /// Maps normalized progress in `[0, 1]` onto the blend fraction.
    pub fn ease(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Interpolation::Linear => t,
            Interpolation::Step => 0.0,
            Interpolation::EaseIn => t * t,
            Interpolation::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Interpolation::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Keyframe {
    pub time: f64,
    pub value: KeyframeValue,
    #[serde(
        default,
        rename = "interpolationType",
        alias = "interpolationKind"
    )]
    pub interpolation: Interpolation,
}

impl Keyframe {
    pub fn new(time: f64, value: KeyframeValue, interpolation: Interpolation) -> Self {
        Self {
            time,
            value,
            interpolation,
        }
    }

    pub fn number(time: f64, value: f64, interpolation: Interpolation) -> Self {
        Self::new(time, KeyframeValue::Number(value), interpolation)
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum KeyframeError {
    #[error("Keyframe time must be a non-negative number, got {0}")]
    InvalidTime(f64),
    #[error("Text keyframes must use step interpolation")]
    BlendUnsupported,
    #[error("Keyframe value kind {found:?} does not match track kind {expected:?}")]
    MixedValueKinds { expected: ValueKind, found: ValueKind },
    #[error("No keyframe at time {0}")]
    MissingTime(f64),
}

/// Ordered samples for one animatable property. Times are ascending and unique.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(try_from = "Vec<Keyframe>", into = "Vec<Keyframe>")]
pub struct KeyframeTrack {
    keyframes: Vec<Keyframe>,
}

// Loaded tracks go through the same ordering and kind checks as edits.
impl TryFrom<Vec<Keyframe>> for KeyframeTrack {
    type Error = KeyframeError;

    fn try_from(keyframes: Vec<Keyframe>) -> Result<Self, Self::Error> {
        Self::from_keyframes(keyframes)
    }
}

impl From<KeyframeTrack> for Vec<Keyframe> {
    fn from(track: KeyframeTrack) -> Self {
        track.keyframes
    }
}

impl KeyframeTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a track from unordered samples. Duplicate times keep the later sample.
    pub fn from_keyframes(keyframes: Vec<Keyframe>) -> Result<Self, KeyframeError> {
        let mut track = Self::new();
        for keyframe in keyframes {
            track.upsert(keyframe)?;
        }
        Ok(track)
    }

    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    pub fn value_kind(&self) -> Option<ValueKind> {
        self.keyframes.first().map(|k| k.value.kind())
    }

    pub fn find(&self, time: f64) -> Option<&Keyframe> {
        self.position(time).map(|i| &self.keyframes[i])
    }

    fn position(&self, time: f64) -> Option<usize> {
        self.keyframes
            .iter()
            .position(|k| (k.time - time).abs() < TIME_EPSILON)
    }

    fn check(&self, keyframe: &Keyframe, replacing: Option<usize>) -> Result<(), KeyframeError> {
        if !keyframe.time.is_finite() || keyframe.time < 0.0 {
            return Err(KeyframeError::InvalidTime(keyframe.time));
        }
        if keyframe.value.kind() == ValueKind::Text && keyframe.interpolation != Interpolation::Step
        {
            return Err(KeyframeError::BlendUnsupported);
        }
        // A lone sample being replaced can change the track's kind.
        let others = self
            .keyframes
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != replacing)
            .map(|(_, k)| k.value.kind())
            .next();
        if let Some(expected) = others {
            let found = keyframe.value.kind();
            if expected != found {
                return Err(KeyframeError::MixedValueKinds { expected, found });
            }
        }
        Ok(())
    }

    /// Inserts a sample, replacing any existing sample at the same time.
    pub fn upsert(&mut self, keyframe: Keyframe) -> Result<(), KeyframeError> {
        let existing = self.position(keyframe.time);
        self.check(&keyframe, existing)?;
        match existing {
            Some(i) => self.keyframes[i] = keyframe,
            None => {
                let at = self
                    .keyframes
                    .partition_point(|k| k.time < keyframe.time);
                self.keyframes.insert(at, keyframe);
            }
        }
        Ok(())
    }

    /// Replaces the sample at `keyframe.time`; fails if there is none.
    pub fn replace(&mut self, keyframe: Keyframe) -> Result<(), KeyframeError> {
        let i = self
            .position(keyframe.time)
            .ok_or(KeyframeError::MissingTime(keyframe.time))?;
        self.check(&keyframe, Some(i))?;
        self.keyframes[i] = keyframe;
        Ok(())
    }

    pub fn remove_at(&mut self, time: f64) -> Result<Keyframe, KeyframeError> {
        let i = self.position(time).ok_or(KeyframeError::MissingTime(time))?;
        Ok(self.keyframes.remove(i))
    }

    /// Evaluates the track at `time`, clamping outside the sampled range.
    ///
    /// Returns `None` for an empty track; callers fall back to the static value.
    pub fn evaluate(&self, time: f64) -> Option<KeyframeValue> {
        let first = self.keyframes.first()?;
        let last = self.keyframes.last()?;

        if time <= first.time {
            return Some(first.value.clone());
        }
        if time >= last.time {
            return Some(last.value.clone());
        }

        // Bracketing pair with a.time <= time < b.time
        let right = self.keyframes.partition_point(|k| k.time <= time);
        let a = &self.keyframes[right - 1];
        let b = &self.keyframes[right];

        let span = b.time - a.time;
        let progress = if span > 0.0 { (time - a.time) / span } else { 0.0 };
        let fraction = a.interpolation.ease(progress);

        Some(blend(&a.value, &b.value, fraction))
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Blends two values. Kinds that cannot blend hold the left value.
pub fn blend(a: &KeyframeValue, b: &KeyframeValue, fraction: f64) -> KeyframeValue {
    match (a, b) {
        (KeyframeValue::Number(x), KeyframeValue::Number(y)) => {
            KeyframeValue::Number(lerp(*x, *y, fraction))
        }
        (KeyframeValue::Color(x), KeyframeValue::Color(y)) => KeyframeValue::Color(Rgba {
            r: lerp(x.r, y.r, fraction),
            g: lerp(x.g, y.g, fraction),
            b: lerp(x.b, y.b, fraction),
            a: lerp(x.a, y.a, fraction),
        }),
        (KeyframeValue::Vector(x), KeyframeValue::Vector(y)) if x.len() == y.len() => {
            KeyframeValue::Vector(
                x.iter()
                    .zip(y.iter())
                    .map(|(p, q)| lerp(*p, *q, fraction))
                    .collect(),
            )
        }
        _ => a.clone(),
    }
}
