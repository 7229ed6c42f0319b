use relu_dense::backprop::Layer;
use relu_dense::config::{load_config, InitScheme, LayerConfig};
use relu_dense::error::LayerError;
use relu_dense::layers::ReLu;
use relu_dense::ops::CpuOps;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("relu_dense_{}_{name}", std::process::id()))
}

#[test]
fn loads_a_config_file() {
    let path = temp_path("layer.json");
    fs::write(
        &path,
        r#"{ "n_in": 4, "n_out": 3, "init": "he_normal", "seed": 11, "drop": 0.2 }"#,
    )
    .unwrap();

    let cfg = load_config(&path).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(
        cfg,
        LayerConfig::new(4, 3)
            .with_init(InitScheme::HeNormal)
            .with_seed(11)
            .with_drop(0.2)
    );
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_config(temp_path("does_not_exist.json")).unwrap_err();
    assert!(matches!(err, LayerError::Io(_)));
}

#[test]
fn malformed_json_is_a_json_error() {
    let path = temp_path("broken.json");
    fs::write(&path, "{ n_in: 4 ").unwrap();
    let err = load_config(&path).unwrap_err();
    fs::remove_file(&path).unwrap();
    assert!(matches!(err, LayerError::Json(_)));
}

#[test]
fn out_of_range_drop_in_file_is_rejected() {
    let path = temp_path("bad_drop.json");
    fs::write(&path, r#"{ "n_in": 2, "n_out": 2, "drop": 1.5 }"#).unwrap();
    let err = load_config(&path).unwrap_err();
    fs::remove_file(&path).unwrap();
    assert!(matches!(err, LayerError::InvalidDropRate(_)));
}

#[test]
fn layers_built_from_one_seed_agree() {
    let cfg = LayerConfig::new(5, 4).with_init(InitScheme::HeNormal).with_seed(3);
    let a = ReLu::from_config(&cfg, Arc::new(CpuOps::new())).unwrap();
    let b = ReLu::from_config(&cfg, Arc::new(CpuOps::new())).unwrap();

    assert_eq!((a.n_in(), a.n_out()), (5, 4));
    assert_eq!(
        a.inner().params().unwrap().weights.value,
        b.inner().params().unwrap().weights.value
    );
    assert_ne!(a.inner().id(), b.inner().id());
}

#[test]
fn zero_width_config_does_not_build_a_layer() {
    let err = ReLu::from_config(&LayerConfig::new(3, 0), Arc::new(CpuOps::new())).unwrap_err();
    assert!(matches!(err, LayerError::Validation(_)));
}
