//! Layer configuration.
//!
//! A [`LayerConfig`] declares the dimensions of a layer, how its weights are
//! initialised, and the default dropout rate used by
//! [`ReLu::begin_update_default`](crate::layers::ReLu::begin_update_default).
//! Configs can be written in code or read from JSON:
//!
//! ```json
//! {
//!   "n_in": 784,
//!   "n_out": 128,
//!   "init": "he_normal",
//!   "seed": 42,
//!   "drop": 0.25
//! }
//! ```
//!
//! Every config goes through [`briny`]'s `Validate` / `TrustedData` gate
//! before a layer is built from it.

use crate::error::{LayerError, Result};
use crate::tensors::{Ten64, Tensor};
use briny::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// How the weight matrix of a new layer is filled. Biases always start at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitScheme {
    Zeros,
    /// Uniform in `±sqrt(6 / (nI + nO))`.
    #[default]
    XavierUniform,
    /// Normal with standard deviation `sqrt(2 / nI)`.
    HeNormal,
}

impl InitScheme {
    /// Draws an `(n_out, n_in)` weight matrix.
    ///
    /// # Errors
    /// Returns [`LayerError::Config`] if the distribution cannot be built.
    pub fn weights<R: Rng + ?Sized>(self, n_in: usize, n_out: usize, rng: &mut R) -> Result<Ten64> {
        let len = n_in * n_out;
        let data = match self {
            Self::Zeros => vec![0.0; len],
            Self::XavierUniform => {
                let limit = (6.0 / (n_in + n_out) as f64).sqrt();
                (0..len).map(|_| rng.random_range(-limit..limit)).collect()
            }
            Self::HeNormal => {
                let normal = Normal::new(0.0, (2.0 / n_in as f64).sqrt())
                    .map_err(|e| LayerError::Config(e.to_string()))?;
                (0..len).map(|_| normal.sample(rng)).collect()
            }
        };
        Ok(Tensor::new(vec![n_out, n_in], data))
    }
}

/// Declared shape and initialisation of one dense layer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerConfig {
    /// Input width `nI`.
    pub n_in: usize,
    /// Output width `nO`.
    pub n_out: usize,
    #[serde(default)]
    pub init: InitScheme,
    /// Seed for weight initialisation; `None` draws from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Default dropout rate, in `[0, 1)`.
    #[serde(default)]
    pub drop: f64,
}

impl Validate for LayerConfig {
    fn validate(&self) -> core::result::Result<(), ValidationError> {
        if self.n_in == 0 || self.n_out == 0 {
            return Err(ValidationError);
        }
        if !(0.0..1.0).contains(&self.drop) {
            return Err(ValidationError);
        }
        Ok(())
    }
}

impl LayerConfig {
    /// A config with Xavier-uniform weights, no seed and no dropout.
    pub fn new(n_in: usize, n_out: usize) -> Self {
        Self {
            n_in,
            n_out,
            init: InitScheme::default(),
            seed: None,
            drop: 0.0,
        }
    }

    #[must_use]
    pub const fn with_init(mut self, init: InitScheme) -> Self {
        self.init = init;
        self
    }

    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub const fn with_drop(mut self, drop: f64) -> Self {
        self.drop = drop;
        self
    }

    /// Parses and validates a JSON config.
    ///
    /// # Errors
    /// [`LayerError::Json`] for malformed input, then the errors of
    /// [`LayerConfig::validated`].
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: Self = serde_json::from_str(json)?;
        raw.validated()
    }

    /// Runs the config through validation.
    ///
    /// # Errors
    /// [`LayerError::InvalidDropRate`] if `drop` is outside `[0, 1)`, and
    /// [`LayerError::Validation`] for zero-sized dimensions.
    pub fn validated(self) -> Result<Self> {
        crate::error::check_drop_rate(self.drop)?;
        let trusted = TrustedData::new(self)?;
        Ok(trusted.into_inner())
    }

    /// Draws the initial weight matrix for this config.
    ///
    /// # Errors
    /// See [`InitScheme::weights`].
    pub fn init_weights(&self) -> Result<Ten64> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        self.init.weights(self.n_in, self.n_out, &mut rng)
    }
}

/// Reads, parses and validates a JSON layer config from `path`.
///
/// # Errors
/// [`LayerError::Io`] if the file cannot be read, otherwise as
/// [`LayerConfig::from_json_str`].
pub fn load_config(path: impl AsRef<Path>) -> Result<LayerConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let config = LayerConfig::from_json_str(&contents)?;
    log::debug!("loaded layer config {config:?} from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_fields() {
        let cfg = LayerConfig::from_json_str(r#"{ "n_in": 3, "n_out": 2 }"#).unwrap();
        assert_eq!(cfg, LayerConfig::new(3, 2));
    }

    #[test]
    fn parses_every_field() {
        let cfg = LayerConfig::from_json_str(
            r#"{ "n_in": 4, "n_out": 5, "init": "he_normal", "seed": 9, "drop": 0.5 }"#,
        )
        .unwrap();
        assert_eq!(cfg.init, InitScheme::HeNormal);
        assert_eq!(cfg.seed, Some(9));
        assert_eq!(cfg.drop, 0.5);
    }

    #[test]
    fn rejects_zero_width() {
        let err = LayerConfig::new(0, 2).validated().unwrap_err();
        assert!(matches!(err, LayerError::Validation(_)));
    }

    #[test]
    fn rejects_drop_of_one() {
        let err = LayerConfig::new(2, 2).with_drop(1.0).validated().unwrap_err();
        assert!(matches!(err, LayerError::InvalidDropRate(d) if d == 1.0));
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = LayerConfig::from_json_str(r#"{ "n_in": 1, "n_out": 1, "bias": 3 }"#).unwrap_err();
        assert!(matches!(err, LayerError::Json(_)));
    }

    #[test]
    fn seeded_init_is_reproducible() {
        let cfg = LayerConfig::new(6, 4).with_seed(1);
        let a = cfg.init_weights().unwrap();
        let b = cfg.init_weights().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.shape, vec![4, 6]);

        let limit = (6.0f64 / 10.0).sqrt();
        assert!(a.data.iter().all(|w| w.abs() <= limit));
    }

    #[test]
    fn zeros_init() {
        let w = LayerConfig::new(2, 3)
            .with_init(InitScheme::Zeros)
            .init_weights()
            .unwrap();
        assert!(w.data.iter().all(|&x| x == 0.0));
    }
}
