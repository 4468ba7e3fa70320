use burn::tensor::{Tensor, TensorData};
use deep_fqi_extractor::extractor::{
    ExtractorConfig, ExtractorError, FeatureExtractor, InferenceBackend, OptimizerConfig, TrainingBackend,
    default_device,
};
use deep_fqi_extractor::frames::{BouncingBall, transition_batch};
use serde_json::{Value, json};
use tempfile::TempDir;

fn small_config(optimizer: OptimizerConfig) -> ExtractorConfig {
    ExtractorConfig {
        height: 52,
        width: 52,
        history_length: 4,
        optimizer,
    }
}

fn build(folder: &std::path::Path, config: ExtractorConfig) -> FeatureExtractor {
    FeatureExtractor::build(None, folder, config, default_device()).unwrap()
}

fn batch(config: &ExtractorConfig, batch_size: usize, seed: u64) -> (Tensor<InferenceBackend, 4>, Tensor<InferenceBackend, 4>) {
    let mut generator = BouncingBall::new(config.height, config.width, seed);
    transition_batch(&mut generator, config.history_length, batch_size, &default_device())
}

fn values(tensor: Tensor<InferenceBackend, 4>) -> Vec<f32> {
    tensor.into_data().to_vec::<f32>().unwrap()
}

fn max_difference(a: &[TensorData], b: &[TensorData]) -> f32 {
    a.iter()
        .zip(b)
        .flat_map(|(a, b)| {
            let a = a.to_vec::<f32>().unwrap();
            let b = b.to_vec::<f32>().unwrap();
            a.into_iter().zip(b).map(|(x, y)| (x - y).abs()).collect::<Vec<_>>()
        })
        .fold(0.0, f32::max)
}

fn assert_close(a: &[f32], b: &[f32]) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        assert!((x - y).abs() < 1e-5, "{x} != {y}");
    }
}

#[test]
fn weights_are_stable_across_calls() {
    let temp_dir = TempDir::new().unwrap();
    let extractor = build(temp_dir.path(), ExtractorConfig::atari());

    let first = extractor.get_weights();
    let second = extractor.get_weights();
    assert_eq!(first.len(), 18);
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.shape, b.shape);
        assert_eq!(a.to_vec::<f32>().unwrap(), b.to_vec::<f32>().unwrap());
    }
}

#[test]
fn set_weights_with_own_weights_keeps_predictions() {
    let temp_dir = TempDir::new().unwrap();
    let config = small_config(OptimizerConfig::Adam);
    let mut extractor = build(temp_dir.path(), config.clone());
    let (x, _) = batch(&config, 2, 1);

    let before = values(extractor.predict(x.clone()).unwrap());
    extractor.set_weights(extractor.get_weights()).unwrap();
    let after = values(extractor.predict(x).unwrap());
    assert_close(&before, &after);
}

#[test]
fn weights_transfer_between_instances() {
    let temp_dir = TempDir::new().unwrap();
    let config = small_config(OptimizerConfig::Adam);
    let source = build(&temp_dir.path().join("a"), config.clone());
    let mut target = build(&temp_dir.path().join("b"), config.clone());
    let (x, _) = batch(&config, 2, 2);

    target.set_weights(source.get_weights()).unwrap();
    assert_close(
        &values(source.predict(x.clone()).unwrap()),
        &values(target.predict(x).unwrap()),
    );
}

#[test]
fn save_then_load_reproduces_predictions() {
    let temp_dir = TempDir::new().unwrap();
    let config = small_config(OptimizerConfig::RmsPropCentered { lr: 0.00025, decay: 0.95 });
    let mut extractor = build(temp_dir.path(), config.clone());
    let (x, y) = batch(&config, 2, 3);

    extractor.fit(x.clone(), y).unwrap();
    extractor.save().unwrap();

    let restored: FeatureExtractor = FeatureExtractor::new(
        None,
        temp_dir.path().join("restored"),
        Some(temp_dir.path()),
        &Value::Null,
        default_device(),
    )
    .unwrap();

    assert_eq!(restored.config(), extractor.config());
    assert_eq!(restored.name(), extractor.name());
    assert_eq!(restored.train_count(), 0);
    assert_close(
        &values(extractor.predict(x.clone()).unwrap()),
        &values(restored.predict(x).unwrap()),
    );
}

#[test]
fn repeated_saves_overwrite() {
    let temp_dir = TempDir::new().unwrap();
    let config = small_config(OptimizerConfig::Adam);
    let mut extractor = build(temp_dir.path(), config.clone());
    let (x, y) = batch(&config, 2, 4);

    extractor.save().unwrap();
    extractor.fit(x.clone(), y).unwrap();
    extractor.save().unwrap();

    let restored: FeatureExtractor =
        FeatureExtractor::load(None, temp_dir.path().join("restored"), temp_dir.path(), default_device()).unwrap();
    assert_close(
        &values(extractor.predict(x.clone()).unwrap()),
        &values(restored.predict(x).unwrap()),
    );
}

#[test]
fn fitting_reduces_loss() {
    let temp_dir = TempDir::new().unwrap();
    let config = small_config(OptimizerConfig::RmsProp { lr: 0.00025, decay: 0.95 });
    let mut extractor = build(temp_dir.path(), config.clone());
    let (x, y) = batch(&config, 4, 5);

    let initial = extractor.loss(x.clone(), y.clone()).unwrap();
    let mut losses = Vec::new();
    for _ in 0..20 {
        extractor.fit(x.clone(), y.clone()).unwrap();
        losses.push(extractor.loss(x.clone(), y.clone()).unwrap());
    }

    let mean = |losses: &[f32]| losses.iter().sum::<f32>() / losses.len() as f32;
    let early = mean(&losses[..5]);
    let late = mean(&losses[15..]);
    assert!(late < early, "mean loss went from {early} to {late}");
    assert!(late < initial, "loss went from {initial} to {late}");
}

#[test]
fn encode_width_for_atari_frames() {
    let temp_dir = TempDir::new().unwrap();
    let config = ExtractorConfig::atari();
    let extractor = build(temp_dir.path(), config.clone());

    for batch_size in [1, 3] {
        let (x, _) = batch(&config, batch_size, 6);
        assert_eq!(extractor.encode(x).unwrap().dims(), [batch_size, 400]);
    }
}

#[test]
fn mismatched_weights_leave_parameters_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let config = small_config(OptimizerConfig::Adam);
    let mut extractor = build(temp_dir.path(), config.clone());
    let (x, _) = batch(&config, 1, 7);
    let before = values(extractor.predict(x.clone()).unwrap());

    let mut short = extractor.get_weights();
    short.pop();
    assert!(matches!(
        extractor.set_weights(short),
        Err(ExtractorError::WeightCount { expected: 18, actual: 17 })
    ));

    // a valid leading array followed by a misshapen one must not be half-applied
    let mut misshapen: Vec<TensorData> = extractor
        .get_weights()
        .into_iter()
        .map(|data| TensorData::new(vec![0.0f32; data.num_elements()], data.shape.clone()))
        .collect();
    misshapen[5] = TensorData::new(vec![0.0f32; 3], vec![3]);
    assert!(matches!(
        extractor.set_weights(misshapen),
        Err(ExtractorError::WeightShape { index: 5, .. })
    ));

    assert_close(&before, &values(extractor.predict(x).unwrap()));
}

#[test]
fn invalid_configurations_fail_before_building() {
    let temp_dir = TempDir::new().unwrap();
    let folder = temp_dir.path().join("never");
    let new = |pars: Value| FeatureExtractor::<TrainingBackend>::new(None, &folder, None, &pars, default_device());

    assert!(matches!(
        new(json!({"height": 84, "width": 84, "history_length": 4, "optimizer": {"name": "sgd"}})),
        Err(ExtractorError::UnknownOptimizer(name)) if name == "sgd"
    ));
    assert!(matches!(
        new(json!({"height": 84, "width": 84, "history_length": 4})),
        Err(ExtractorError::MissingKey(key)) if key == "optimizer"
    ));
    assert!(matches!(
        new(json!({"height": 84, "width": 84, "history_length": 4, "optimizer": {"name": "rmsprop", "decay": 0.9}})),
        Err(ExtractorError::MissingKey(key)) if key == "optimizer.lr"
    ));
    assert!(!folder.exists());
}

#[test]
fn every_fit_records_one_summary() {
    let temp_dir = TempDir::new().unwrap();
    let config = small_config(OptimizerConfig::Adadelta);
    let mut extractor = build(temp_dir.path(), config.clone());
    let (x, y) = batch(&config, 2, 8);

    let event_files = extractor.summary().event_files().unwrap();
    assert_eq!(event_files.len(), 1);
    let initial_size = std::fs::metadata(&event_files[0]).unwrap().len();

    for step in 0..3 {
        extractor.fit(x.clone(), y.clone()).unwrap();
        assert_eq!(extractor.summary().last().unwrap().step, step);
    }

    assert_eq!(extractor.summary().written(), 3);
    assert_eq!(extractor.summary().last().unwrap().tag, "loss");
    assert!(std::fs::metadata(&event_files[0]).unwrap().len() > initial_size);
}

#[test]
fn extractors_are_isolated() {
    let temp_dir = TempDir::new().unwrap();
    let config = small_config(OptimizerConfig::Adam);
    let mut first = build(&temp_dir.path().join("first"), config.clone());
    let second = build(&temp_dir.path().join("second"), config.clone());
    let (x, y) = batch(&config, 2, 9);

    let before = values(second.predict(x.clone()).unwrap());
    first.fit(x.clone(), y).unwrap();
    assert_close(&before, &values(second.predict(x).unwrap()));
    assert_eq!(second.train_count(), 0);
}

#[test]
fn optimizer_state_survives_reload() {
    for optimizer in [
        OptimizerConfig::RmsPropCentered { lr: 0.00025, decay: 0.95 },
        OptimizerConfig::RmsProp { lr: 0.00025, decay: 0.95 },
        OptimizerConfig::Adam,
        OptimizerConfig::Adadelta,
    ] {
        let temp_dir = TempDir::new().unwrap();
        let config = small_config(optimizer);
        let saved = temp_dir.path().join("saved");
        let mut original = build(&saved, config.clone());
        let (x, y) = batch(&config, 2, 10);
        let (next_x, next_y) = batch(&config, 2, 11);

        for _ in 0..3 {
            original.fit(x.clone(), y.clone()).unwrap();
        }
        original.save().unwrap();

        let mut restored: FeatureExtractor =
            FeatureExtractor::load(None, temp_dir.path().join("restored"), &saved, default_device()).unwrap();
        original.fit(next_x.clone(), next_y.clone()).unwrap();
        restored.fit(next_x, next_y).unwrap();

        let difference = max_difference(&original.get_weights(), &restored.get_weights());
        assert!(difference < 1e-5, "{:?}: weights differ by {difference}", config.optimizer);
    }
}

#[test]
fn missing_optimizer_state_restarts_moments() {
    let temp_dir = TempDir::new().unwrap();
    let config = small_config(OptimizerConfig::Adam);
    let saved = temp_dir.path().join("saved");
    let mut original = build(&saved, config.clone());
    let (x, y) = batch(&config, 2, 12);
    let (next_x, next_y) = batch(&config, 2, 13);

    for _ in 0..3 {
        original.fit(x.clone(), y.clone()).unwrap();
    }
    original.save().unwrap();
    std::fs::remove_file(saved.join("deep_fqi_extractor_optim.mpk")).unwrap();

    let mut restored: FeatureExtractor =
        FeatureExtractor::load(None, temp_dir.path().join("restored"), &saved, default_device()).unwrap();
    assert_eq!(max_difference(&original.get_weights(), &restored.get_weights()), 0.0);

    original.fit(next_x.clone(), next_y.clone()).unwrap();
    restored.fit(next_x, next_y).unwrap();
    assert!(max_difference(&original.get_weights(), &restored.get_weights()) > 1e-5);
}
