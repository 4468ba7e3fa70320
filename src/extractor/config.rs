//! Extractor hyperparameter configuration
//!
//! The configuration arrives as a JSON mapping with the keys `height`, `width`,
//! `history_length` and `optimizer`. Keys are looked up one by one so that a
//! missing key is reported by its name rather than as a generic decode failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{ExtractorError, Result};
use super::network::{decoded_dims, encoded_dims, ENCODER_LAYERS};

/// Optimizer descriptor
///
/// Serialized with its `name` as the tag, which is the same shape the
/// configuration mapping uses:
///
/// ```json
/// { "name": "rmspropcentered", "lr": 0.00025, "decay": 0.95 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum OptimizerConfig {
    /// Centered RMSProp with explicit learning rate and decay
    #[serde(rename = "rmspropcentered")]
    RmsPropCentered { lr: f64, decay: f64 },

    /// Plain RMSProp with explicit learning rate and decay
    #[serde(rename = "rmsprop")]
    RmsProp { lr: f64, decay: f64 },

    /// Adam with library defaults
    #[serde(rename = "adam")]
    Adam,

    /// Adadelta with library defaults
    #[serde(rename = "adadelta")]
    Adadelta,
}

impl OptimizerConfig {
    /// Names accepted in the `optimizer.name` key
    pub const NAMES: [&'static str; 4] = ["rmspropcentered", "rmsprop", "adam", "adadelta"];

    /// Parse the `optimizer` mapping
    ///
    /// Fails with [`ExtractorError::UnknownOptimizer`] for any name outside
    /// [`Self::NAMES`].
    pub fn from_value(optimizer: &Value) -> Result<Self> {
        let name = lookup(optimizer, "name", "optimizer.name")?;
        let name = name.as_str().ok_or_else(|| ExtractorError::InvalidValue {
            key: "optimizer.name".to_string(),
            reason: format!("expected a string, got {name}"),
        })?;

        let config = match name {
            "rmspropcentered" => Self::RmsPropCentered {
                lr: f64_key(optimizer, "lr", "optimizer.lr")?,
                decay: f64_key(optimizer, "decay", "optimizer.decay")?,
            },
            "rmsprop" => Self::RmsProp {
                lr: f64_key(optimizer, "lr", "optimizer.lr")?,
                decay: f64_key(optimizer, "decay", "optimizer.decay")?,
            },
            "adam" => Self::Adam,
            "adadelta" => Self::Adadelta,
            other => return Err(ExtractorError::UnknownOptimizer(other.to_string())),
        };

        config.validate()?;
        Ok(config)
    }

    /// The configuration name of this optimizer
    pub fn name(&self) -> &'static str {
        match self {
            Self::RmsPropCentered { .. } => "rmspropcentered",
            Self::RmsProp { .. } => "rmsprop",
            Self::Adam => "adam",
            Self::Adadelta => "adadelta",
        }
    }

    fn validate(&self) -> Result<()> {
        if let Self::RmsPropCentered { lr, decay } | Self::RmsProp { lr, decay } = *self {
            if !(lr > 0.0) {
                return Err(ExtractorError::InvalidValue {
                    key: "optimizer.lr".to_string(),
                    reason: format!("must be positive, got {lr}"),
                });
            }
            if !(0.0..1.0).contains(&decay) {
                return Err(ExtractorError::InvalidValue {
                    key: "optimizer.decay".to_string(),
                    reason: format!("must be in [0, 1), got {decay}"),
                });
            }
        }
        Ok(())
    }
}

/// Hyperparameters of one extractor, fixed for its lifetime
///
/// # Example
///
/// ```rust
/// use deep_fqi_extractor::extractor::{ExtractorConfig, OptimizerConfig};
/// use serde_json::json;
///
/// let config = ExtractorConfig::from_value(&json!({
///     "height": 84,
///     "width": 84,
///     "history_length": 4,
///     "optimizer": { "name": "adam" },
/// }))
/// .unwrap();
///
/// assert_eq!(config.optimizer, OptimizerConfig::Adam);
/// assert_eq!(config.latent_dim().unwrap(), 400);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Frame height in pixels
    pub height: usize,

    /// Frame width in pixels
    pub width: usize,

    /// Number of stacked frames (input and output channels)
    pub history_length: usize,

    /// Optimizer used by `fit`
    pub optimizer: OptimizerConfig,
}

impl ExtractorConfig {
    /// Atari preprocessing defaults: 84x84 grayscale, 4 frames, centered RMSProp
    pub fn atari() -> Self {
        Self {
            height: 84,
            width: 84,
            history_length: 4,
            optimizer: OptimizerConfig::RmsPropCentered {
                lr: 0.00025,
                decay: 0.95,
            },
        }
    }

    /// Parse and validate a configuration mapping
    ///
    /// # Errors
    ///
    /// - [`ExtractorError::MissingKey`] if a required key is absent
    /// - [`ExtractorError::UnknownOptimizer`] for an unavailable optimizer name
    /// - [`ExtractorError::InvalidValue`] / [`ExtractorError::InvalidConfig`]
    ///   for values the network cannot be built from
    pub fn from_value(pars: &Value) -> Result<Self> {
        let config = Self {
            height: usize_key(pars, "height")?,
            width: usize_key(pars, "width")?,
            history_length: usize_key(pars, "history_length")?,
            optimizer: OptimizerConfig::from_value(lookup(pars, "optimizer", "optimizer")?)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that a network can be built for this configuration
    ///
    /// Every encoder map must be at least 1x1 and the decoder must restore the
    /// exact input size, otherwise reconstruction and target could not be compared.
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("height", self.height),
            ("width", self.width),
            ("history_length", self.history_length),
        ] {
            if value == 0 {
                return Err(ExtractorError::InvalidValue {
                    key: key.to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
        }

        let (enc_h, enc_w) = self.encoded_map()?;
        let restored = decoded_dims(enc_h, enc_w);
        if restored != (self.height, self.width) {
            return Err(ExtractorError::InvalidConfig(format!(
                "decoder restores {}x{} from {}x{} frames; choose a size the strided layers divide evenly (e.g. 84x84)",
                restored.0, restored.1, self.height, self.width
            )));
        }

        self.optimizer.validate()
    }

    /// Size of the latent feature vector produced by `encode`
    ///
    /// Fails with [`ExtractorError::InvalidConfig`] for frames too small for the
    /// encoder.
    pub fn latent_dim(&self) -> Result<usize> {
        let (h, w) = self.encoded_map()?;
        Ok(h * w * ENCODER_LAYERS[ENCODER_LAYERS.len() - 1].channels)
    }

    fn encoded_map(&self) -> Result<(usize, usize)> {
        encoded_dims(self.height, self.width).ok_or_else(|| {
            ExtractorError::InvalidConfig(format!(
                "frames of {}x{} are too small for the encoder (at least 52x52 needed)",
                self.height, self.width
            ))
        })
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self::atari()
    }
}

fn lookup<'a>(pars: &'a Value, key: &str, path: &str) -> Result<&'a Value> {
    pars.get(key)
        .ok_or_else(|| ExtractorError::MissingKey(path.to_string()))
}

fn usize_key(pars: &Value, key: &str) -> Result<usize> {
    let value = lookup(pars, key, key)?;
    value
        .as_u64()
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| ExtractorError::InvalidValue {
            key: key.to_string(),
            reason: format!("expected a non-negative integer, got {value}"),
        })
}

fn f64_key(pars: &Value, key: &str, path: &str) -> Result<f64> {
    let value = lookup(pars, key, path)?;
    value.as_f64().ok_or_else(|| ExtractorError::InvalidValue {
        key: path.to_string(),
        reason: format!("expected a number, got {value}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn atari_value() -> Value {
        json!({
            "height": 84,
            "width": 84,
            "history_length": 4,
            "optimizer": { "name": "rmspropcentered", "lr": 0.00025, "decay": 0.95 },
        })
    }

    #[test]
    fn test_parse_atari_config() {
        let config = ExtractorConfig::from_value(&atari_value()).unwrap();
        assert_eq!(config, ExtractorConfig::atari());
        assert_eq!(config.latent_dim().unwrap(), 400);
    }

    #[test]
    fn test_parse_every_optimizer() {
        for (optimizer, expected) in [
            (json!({"name": "rmsprop", "lr": 0.001, "decay": 0.9}), OptimizerConfig::RmsProp { lr: 0.001, decay: 0.9 }),
            (json!({"name": "adam"}), OptimizerConfig::Adam),
            (json!({"name": "adadelta"}), OptimizerConfig::Adadelta),
        ] {
            let mut pars = atari_value();
            pars["optimizer"] = optimizer;
            let config = ExtractorConfig::from_value(&pars).unwrap();
            assert_eq!(config.optimizer, expected);
        }
    }

    #[test]
    fn test_missing_keys_are_named() {
        for key in ["height", "width", "history_length", "optimizer"] {
            let mut pars = atari_value();
            pars.as_object_mut().unwrap().remove(key);
            match ExtractorConfig::from_value(&pars) {
                Err(ExtractorError::MissingKey(missing)) => assert_eq!(missing, key),
                other => panic!("expected MissingKey({key}), got {other:?}"),
            }
        }
    }

    #[test]
    fn test_missing_rmsprop_learning_rate() {
        let mut pars = atari_value();
        pars["optimizer"].as_object_mut().unwrap().remove("lr");
        assert!(matches!(
            ExtractorConfig::from_value(&pars),
            Err(ExtractorError::MissingKey(key)) if key == "optimizer.lr"
        ));
    }

    #[test]
    fn test_empty_mapping_is_a_lookup_error() {
        assert!(matches!(
            ExtractorConfig::from_value(&json!({})),
            Err(ExtractorError::MissingKey(_))
        ));
        assert!(matches!(
            ExtractorConfig::from_value(&Value::Null),
            Err(ExtractorError::MissingKey(_))
        ));
    }

    #[test]
    fn test_unknown_optimizer() {
        let mut pars = atari_value();
        pars["optimizer"] = json!({"name": "sgd"});
        assert!(matches!(
            ExtractorConfig::from_value(&pars),
            Err(ExtractorError::UnknownOptimizer(name)) if name == "sgd"
        ));
    }

    #[test]
    fn test_invalid_values() {
        let mut pars = atari_value();
        pars["height"] = json!("tall");
        assert!(matches!(
            ExtractorConfig::from_value(&pars),
            Err(ExtractorError::InvalidValue { .. })
        ));

        let mut pars = atari_value();
        pars["optimizer"]["decay"] = json!(1.5);
        assert!(matches!(
            ExtractorConfig::from_value(&pars),
            Err(ExtractorError::InvalidValue { .. })
        ));

        let mut pars = atari_value();
        pars["width"] = json!(-84);
        assert!(matches!(
            ExtractorConfig::from_value(&pars),
            Err(ExtractorError::InvalidValue { key, .. }) if key == "width"
        ));

        let mut pars = atari_value();
        pars["width"] = json!(84.5);
        assert!(matches!(
            ExtractorConfig::from_value(&pars),
            Err(ExtractorError::InvalidValue { .. })
        ));

        let mut pars = atari_value();
        pars["history_length"] = json!(0);
        assert!(ExtractorConfig::from_value(&pars).is_err());
    }

    #[test]
    fn test_frame_size_must_round_trip() {
        let mut config = ExtractorConfig::atari();
        config.height = 20;
        assert!(matches!(config.validate(), Err(ExtractorError::InvalidConfig(_))));
        assert!(matches!(config.latent_dim(), Err(ExtractorError::InvalidConfig(_))));

        // 85 loses a row in the first strided convolution
        config.height = 85;
        assert!(matches!(config.validate(), Err(ExtractorError::InvalidConfig(_))));

        // smallest width the encoder reduces to a single column
        config.height = 84;
        config.width = 52;
        assert!(config.validate().is_ok());
        assert_eq!(config.latent_dim().unwrap(), 5 * 16);
    }

    #[test]
    fn test_serialized_shape_matches_mapping() {
        let config = ExtractorConfig::atari();
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value, atari_value());
        assert_eq!(ExtractorConfig::from_value(&value).unwrap(), config);
    }
}
