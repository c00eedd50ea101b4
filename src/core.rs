// Core traits and types shared by the environment, wrappers and control loop.

/// A small ordered key-value map attached to resets and steps.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Info {
    entries: Vec<(String, InfoValue)>,
}

impl Info {
    /// Create an empty Info map.
    pub fn new() -> Self { Self { entries: Vec::new() } }

    /// Insert or replace a key with the given value.
    pub fn insert<K: Into<String>>(&mut self, key: K, value: InfoValue) {
        let k = key.into();
        if let Some((_, v)) = self.entries.iter_mut().find(|(kk, _)| kk == &k) {
            *v = value;
        } else {
            self.entries.push((k, value));
        }
    }

    /// Get a reference to a value by key.
    pub fn get(&self, key: &str) -> Option<&InfoValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InfoValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn len(&self) -> usize { self.entries.len() }
}

/// Value types stored in an [`Info`] map.
#[derive(Clone, Debug, PartialEq)]
pub enum InfoValue {
    Bool(bool),
    I64(i64),
    F64(f64),
    Str(String),
}

impl InfoValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            InfoValue::F64(v) => Some(*v),
            InfoValue::I64(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            InfoValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<bool> for InfoValue { fn from(v: bool) -> Self { InfoValue::Bool(v) } }
impl From<i64> for InfoValue { fn from(v: i64) -> Self { InfoValue::I64(v) } }
impl From<u32> for InfoValue { fn from(v: u32) -> Self { InfoValue::I64(v as i64) } }
impl From<f64> for InfoValue { fn from(v: f64) -> Self { InfoValue::F64(v) } }
impl From<f32> for InfoValue { fn from(v: f32) -> Self { InfoValue::F64(v as f64) } }
impl From<&str> for InfoValue { fn from(v: &str) -> Self { InfoValue::Str(v.to_string()) } }
impl From<String> for InfoValue { fn from(v: String) -> Self { InfoValue::Str(v) } }

/// A frame returned by `Env::render`.
#[derive(Clone, Debug, PartialEq)]
pub enum RenderFrame {
    /// Textual representation of a frame (ASCII track, debug string).
    Text(String),
}

/// A step result from the environment.
#[derive(Clone, Debug, PartialEq)]
pub struct Step<Obs> {
    pub observation: Obs,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
    pub info: Info,
}

impl<Obs> Step<Obs> {
    pub fn new(observation: Obs, reward: f32, terminated: bool, truncated: bool, info: Info) -> Self {
        Self { observation, reward, terminated, truncated, info }
    }

    /// Whether the episode ended on this step, for either reason.
    pub fn done(&self) -> bool { self.terminated || self.truncated }
}

/// Errors surfaced by environments, decision providers and the control loop.
#[derive(thiserror::Error, Debug)]
pub enum GymError {
    #[error("Invalid action: {0}")]
    InvalidAction(String),
    #[error("Invalid observation: {0}")]
    InvalidObservation(String),
    #[error("Environment not ready: {0}")]
    NotReady(String),
    #[error("Sandbox body missing: {0}")]
    MissingBody(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias for results using GymError.
pub type Result<T> = std::result::Result<T, GymError>;

/// Environment lifecycle: initialize once, then alternate reset and step.
pub trait Env {
    type Obs;
    type Act;

    /// Validate external resources before the first episode.
    fn initialize(&mut self) -> Result<()> { Ok(()) }

    /// Read the current observation without side effects.
    fn observe(&self) -> Self::Obs;

    /// Reset the environment to an initial state.
    /// Implementations should re-seed internal RNGs when `seed` is provided.
    fn reset(&mut self, seed: Option<u64>) -> (Self::Obs, Info);

    /// Apply an action and advance the episode by one step.
    fn step(&mut self, action: Self::Act) -> Result<Step<Self::Obs>>;

    /// Render a frame of the current state, if supported.
    fn render(&self) -> Option<RenderFrame> { None }

    /// Close and release any external resources.
    fn close(&mut self) {}
}
