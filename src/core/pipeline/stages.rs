//! Built-in pipeline stages.

use crate::core::error::PipelineError;
use crate::core::pipeline::data_pipeline::Transformer;
use crate::core::values::{Record, RecordExt, Value};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::collections::{HashMap, VecDeque};

/// Keys a stage works on: the configured list (each required) or every numeric entry
#[derive(Debug, Clone, Default)]
pub struct KeySelection {
    keys: Option<Vec<String>>,
}

impl KeySelection {
    pub fn from_params(stage: &str, params: &Record) -> Result<Self, PipelineError> {
        let Some(value) = params.get("keys") else {
            return Ok(Self { keys: None });
        };
        let list = value
            .as_list()
            .ok_or_else(|| PipelineError::new(stage, "keys", "must be a list of names"))?;
        let keys = list
            .iter()
            .map(|k| {
                k.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| PipelineError::new(stage, "keys", "must be a list of names"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { keys: Some(keys) })
    }

    pub fn only(keys: &[&str]) -> Self {
        Self {
            keys: Some(keys.iter().map(|k| k.to_string()).collect()),
        }
    }

    /// Resolve against a payload; a configured key that is absent is an error
    fn resolve(&self, stage: &str, payload: &Record, accept_null: bool) -> Result<Vec<String>, PipelineError> {
        match &self.keys {
            Some(keys) => {
                for key in keys {
                    if !payload.contains_key(key) {
                        return Err(PipelineError::new(stage, key, "required key missing from payload"));
                    }
                }
                Ok(keys.clone())
            }
            None => Ok(payload
                .iter()
                .filter(|(_, v)| matches!(v, Value::Number(_)) || (accept_null && v.is_null()))
                .map(|(k, _)| k.clone())
                .collect()),
        }
    }
}

fn numeric(stage: &str, key: &str, value: Option<&Value>) -> Result<f64, PipelineError> {
    match value {
        Some(Value::Number(n)) => Ok(*n),
        Some(other) => Err(PipelineError::new(stage, key, format!("expected a number, found {}", other.kind()))),
        None => Err(PipelineError::new(stage, key, "required key missing from payload")),
    }
}

fn param_f64(stage: &str, params: &Record, key: &str, default: f64) -> Result<f64, PipelineError> {
    match params.get(key) {
        None => Ok(default),
        Some(v) => v
            .as_f64()
            .ok_or_else(|| PipelineError::new(stage, key, "parameter must be a number")),
    }
}

fn param_window(stage: &str, params: &Record, default: usize) -> Result<usize, PipelineError> {
    let window = param_f64(stage, params, "window", default as f64)?;
    if window < 1.0 || window.fract() != 0.0 {
        return Err(PipelineError::new(stage, "window", "must be a positive integer"));
    }
    Ok(window as usize)
}

/// Replaces missing or non-finite readings with the last good value or a default
pub struct Clean {
    keys: KeySelection,
    default: Option<f64>,
    last_good: HashMap<String, f64>,
}

impl Clean {
    pub const NAME: &'static str = "clean";

    pub fn new(keys: KeySelection, default: Option<f64>) -> Self {
        Self {
            keys,
            default,
            last_good: HashMap::new(),
        }
    }

    pub fn from_params(params: &Record) -> Result<Self, PipelineError> {
        let default = match params.get("default") {
            None => None,
            Some(v) => Some(
                v.as_f64()
                    .ok_or_else(|| PipelineError::new(Self::NAME, "default", "parameter must be a number"))?,
            ),
        };
        Ok(Self::new(KeySelection::from_params(Self::NAME, params)?, default))
    }
}

impl Transformer for Clean {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&mut self, mut payload: Record) -> Result<Record, PipelineError> {
        // Missing configured keys are filled from the default when there is one
        if let (Some(keys), Some(default)) = (&self.keys.keys, self.default) {
            for key in keys {
                payload.entry(key.clone()).or_insert(Value::Number(default));
            }
        }

        for key in self.keys.resolve(Self::NAME, &payload, true)? {
            let reading = payload.get(&key).and_then(|v| match v {
                Value::Number(n) if n.is_finite() => Some(*n),
                _ => None,
            });
            let cleaned = match reading {
                Some(n) => n,
                None => self
                    .last_good
                    .get(&key)
                    .copied()
                    .or(self.default)
                    .ok_or_else(|| PipelineError::new(Self::NAME, &key, "no valid reading and no default"))?,
            };
            self.last_good.insert(key.clone(), cleaned);
            payload.insert(key, Value::Number(cleaned));
        }
        Ok(payload)
    }

    fn reset(&mut self) {
        self.last_good.clear();
    }
}

/// Linear unit conversion `y = x * scale + offset`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conversion {
    pub scale: f64,
    pub offset: f64,
}

impl Conversion {
    pub fn named(name: &str) -> Option<Self> {
        let scale = match name {
            "m3s_to_ls" => 1000.0,
            "ls_to_m3s" => 0.001,
            "m_to_cm" => 100.0,
            "cm_to_m" => 0.01,
            "ft_to_m" => 0.3048,
            "m_to_ft" => 1.0 / 0.3048,
            "m3s_to_m3h" => 3600.0,
            "m3h_to_m3s" => 1.0 / 3600.0,
            _ => return None,
        };
        Some(Self { scale, offset: 0.0 })
    }

    pub fn apply(&self, x: f64) -> f64 {
        x * self.scale + self.offset
    }
}

pub struct UnitConvert {
    keys: KeySelection,
    default: Option<Conversion>,
    per_key: HashMap<String, Conversion>,
}

impl UnitConvert {
    pub const NAME: &'static str = "unit_convert";

    pub fn uniform(keys: KeySelection, conversion: Conversion) -> Self {
        Self {
            keys,
            default: Some(conversion),
            per_key: HashMap::new(),
        }
    }

    /// Params: either `conversions: {key: "m3s_to_ls" | {scale, offset}}` or
    /// `scale`/`offset` (optionally with `keys`)
    pub fn from_params(params: &Record) -> Result<Self, PipelineError> {
        if let Some(conversions) = params.get("conversions") {
            let map = conversions
                .as_record()
                .ok_or_else(|| PipelineError::new(Self::NAME, "conversions", "must be a map"))?;
            let mut per_key = HashMap::new();
            for (key, spec) in map {
                let conversion = match spec {
                    Value::Text(name) => Conversion::named(name).ok_or_else(|| {
                        PipelineError::new(Self::NAME, key, format!("unknown conversion '{}'", name))
                    })?,
                    Value::Map(m) => Conversion {
                        scale: param_f64(Self::NAME, m, "scale", 1.0)?,
                        offset: param_f64(Self::NAME, m, "offset", 0.0)?,
                    },
                    _ => return Err(PipelineError::new(Self::NAME, key, "conversion must be a name or {scale, offset}")),
                };
                per_key.insert(key.clone(), conversion);
            }
            let keys: Vec<&str> = per_key.keys().map(String::as_str).collect();
            return Ok(Self {
                keys: KeySelection::only(&keys),
                default: None,
                per_key,
            });
        }

        let conversion = match params.get_str("conversion") {
            Some(name) => Conversion::named(name).ok_or_else(|| {
                PipelineError::new(Self::NAME, "conversion", format!("unknown conversion '{}'", name))
            })?,
            None => Conversion {
                scale: param_f64(Self::NAME, params, "scale", 1.0)?,
                offset: param_f64(Self::NAME, params, "offset", 0.0)?,
            },
        };
        Ok(Self::uniform(KeySelection::from_params(Self::NAME, params)?, conversion))
    }
}

impl Transformer for UnitConvert {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&mut self, mut payload: Record) -> Result<Record, PipelineError> {
        for key in self.keys.resolve(Self::NAME, &payload, false)? {
            let conversion = match self.per_key.get(&key).copied().or(self.default) {
                Some(c) => c,
                None => continue,
            };
            let x = numeric(Self::NAME, &key, payload.get(&key))?;
            payload.insert(key, Value::Number(conversion.apply(x)));
        }
        Ok(payload)
    }
}

/// Rolling-window outlier filter
///
/// A reading further than `threshold` standard deviations from the window mean is replaced
/// by the mean and held back from the window. Once `min_samples` readings in a row have been
/// rejected the window is reseeded from them, so a sustained step is followed. The spread
/// used for the test never drops below `tolerance`.
pub struct OutlierRemove {
    keys: KeySelection,
    window: usize,
    threshold: f64,
    tolerance: f64,
    min_samples: usize,
    history: HashMap<String, VecDeque<f64>>,
    rejected: HashMap<String, Vec<f64>>,
}

impl OutlierRemove {
    pub const NAME: &'static str = "outlier_remove";
    pub const DEFAULT_TOLERANCE: f64 = 1e-6;

    pub fn new(keys: KeySelection, window: usize, threshold: f64) -> Self {
        Self {
            keys,
            window,
            threshold,
            tolerance: Self::DEFAULT_TOLERANCE,
            min_samples: 3.min(window),
            history: HashMap::new(),
            rejected: HashMap::new(),
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn from_params(params: &Record) -> Result<Self, PipelineError> {
        let window = param_window(Self::NAME, params, 10)?;
        let threshold = param_f64(Self::NAME, params, "threshold", 3.0)?;
        if threshold <= 0.0 {
            return Err(PipelineError::new(Self::NAME, "threshold", "must be positive"));
        }
        let tolerance = param_f64(Self::NAME, params, "tolerance", Self::DEFAULT_TOLERANCE)?;
        if tolerance < 0.0 {
            return Err(PipelineError::new(Self::NAME, "tolerance", "must not be negative"));
        }
        Ok(Self::new(KeySelection::from_params(Self::NAME, params)?, window, threshold).with_tolerance(tolerance))
    }
}

impl Transformer for OutlierRemove {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&mut self, mut payload: Record) -> Result<Record, PipelineError> {
        for key in self.keys.resolve(Self::NAME, &payload, false)? {
            let x = numeric(Self::NAME, &key, payload.get(&key))?;
            let history = self.history.entry(key.clone()).or_default();
            let rejected = self.rejected.entry(key.clone()).or_default();

            if history.len() >= self.min_samples {
                let n = history.len() as f64;
                let mean = history.iter().sum::<f64>() / n;
                let variance = history.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                let spread = variance.sqrt().max(self.tolerance);
                if (x - mean).abs() > self.threshold * spread {
                    rejected.push(x);
                    if rejected.len() < self.min_samples {
                        payload.insert(key, Value::Number(mean));
                        continue;
                    }
                    // Level shift: restart the window from the run of rejected readings
                    history.clear();
                    history.extend(rejected.drain(..));
                    continue;
                }
            }

            rejected.clear();
            history.push_back(x);
            if history.len() > self.window {
                history.pop_front();
            }
        }
        Ok(payload)
    }

    fn reset(&mut self) {
        self.history.clear();
        self.rejected.clear();
    }
}

/// Additive Gaussian noise; seed it for reproducible runs
pub struct Noise {
    keys: KeySelection,
    distribution: Normal<f64>,
    rng: StdRng,
}

impl Noise {
    pub const NAME: &'static str = "noise";

    pub fn new(keys: KeySelection, mean: f64, std_dev: f64, seed: Option<u64>) -> Result<Self, PipelineError> {
        let distribution = Normal::new(mean, std_dev)
            .map_err(|e| PipelineError::new(Self::NAME, "std_dev", e.to_string()))?;
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            keys,
            distribution,
            rng,
        })
    }

    pub fn from_params(params: &Record) -> Result<Self, PipelineError> {
        let std_dev = param_f64(Self::NAME, params, "std_dev", 0.0)?;
        let mean = param_f64(Self::NAME, params, "mean", 0.0)?;
        let seed = match params.get("seed") {
            None => None,
            Some(v) => {
                let raw = v
                    .as_f64()
                    .ok_or_else(|| PipelineError::new(Self::NAME, "seed", "parameter must be a number"))?;
                if raw < 0.0 || raw.fract() != 0.0 {
                    return Err(PipelineError::new(Self::NAME, "seed", "must be a non-negative integer"));
                }
                Some(raw as u64)
            }
        };
        Self::new(KeySelection::from_params(Self::NAME, params)?, mean, std_dev, seed)
    }
}

impl Transformer for Noise {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&mut self, mut payload: Record) -> Result<Record, PipelineError> {
        for key in self.keys.resolve(Self::NAME, &payload, false)? {
            let x = numeric(Self::NAME, &key, payload.get(&key))?;
            let noisy = x + self.distribution.sample(&mut self.rng);
            payload.insert(key, Value::Number(noisy));
        }
        Ok(payload)
    }
}

/// Clamp readings into `[min, max]`
pub struct Clip {
    keys: KeySelection,
    min: f64,
    max: f64,
}

impl Clip {
    pub const NAME: &'static str = "clip";

    pub fn from_params(params: &Record) -> Result<Self, PipelineError> {
        let min = param_f64(Self::NAME, params, "min", f64::NEG_INFINITY)?;
        let max = param_f64(Self::NAME, params, "max", f64::INFINITY)?;
        if min > max {
            return Err(PipelineError::new(Self::NAME, "min", "min exceeds max"));
        }
        Ok(Self {
            keys: KeySelection::from_params(Self::NAME, params)?,
            min,
            max,
        })
    }
}

impl Transformer for Clip {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&mut self, mut payload: Record) -> Result<Record, PipelineError> {
        for key in self.keys.resolve(Self::NAME, &payload, false)? {
            let x = numeric(Self::NAME, &key, payload.get(&key))?;
            payload.insert(key, Value::Number(x.clamp(self.min, self.max)));
        }
        Ok(payload)
    }
}

/// Trailing moving average over `window` readings
pub struct MovingAverage {
    keys: KeySelection,
    window: usize,
    history: HashMap<String, VecDeque<f64>>,
}

impl MovingAverage {
    pub const NAME: &'static str = "moving_average";

    pub fn from_params(params: &Record) -> Result<Self, PipelineError> {
        Ok(Self {
            keys: KeySelection::from_params(Self::NAME, params)?,
            window: param_window(Self::NAME, params, 5)?,
            history: HashMap::new(),
        })
    }
}

impl Transformer for MovingAverage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&mut self, mut payload: Record) -> Result<Record, PipelineError> {
        for key in self.keys.resolve(Self::NAME, &payload, false)? {
            let x = numeric(Self::NAME, &key, payload.get(&key))?;
            let history = self.history.entry(key.clone()).or_default();
            history.push_back(x);
            if history.len() > self.window {
                history.pop_front();
            }
            let mean = history.iter().sum::<f64>() / history.len() as f64;
            payload.insert(key, Value::Number(mean));
        }
        Ok(payload)
    }

    fn reset(&mut self) {
        self.history.clear();
    }
}
