//! Configuration file handling

use std::{fs, path::PathBuf};

use head_pose_tracker::{
    config::{Config, EXAMPLE_CONFIG},
    pipeline::Pipeline,
    Error,
};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("head_pose_config_{name}_{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_file_round_trip() {
    let dir = scratch_dir("round_trip");
    let path = dir.join("config.yaml");

    let mut config = Config::default();
    config.adaptive.enabled = true;
    config.stabilizer.point.cov_process = 0.005;
    config.solver.max_iterations = 50;
    config.models.face_model_3d = Some(PathBuf::from("assets/model.txt"));
    config.to_file(&path).unwrap();

    let loaded = Config::from_file(&path).unwrap();
    assert_eq!(loaded, config);
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_example_config_builds_pipeline() {
    let config = Config::from_yaml(EXAMPLE_CONFIG).unwrap();
    config.validate().unwrap();
    let pipeline = Pipeline::new(config.pipeline_config()).unwrap();
    assert_eq!(pipeline.config().point_stabilizer.state_num, 4);
    assert_eq!(pipeline.config().pose_stabilizer.state_num, 2);
}

#[test]
fn test_missing_file() {
    let err = Config::from_file("/nonexistent/config.yaml").unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn test_stabilizer_override() {
    let yaml = r"
stabilizer:
  pose:
    state_num: 3
    measure_num: 1
    cov_process: 0.05
    cov_measure: 0.2
";
    let config = Config::from_yaml(yaml).unwrap();
    config.validate().unwrap();
    assert_eq!(config.stabilizer.pose.state_num, 3);
    assert_eq!(config.stabilizer.point, Config::default().stabilizer.point);

    let pipeline = Pipeline::new(config.pipeline_config()).unwrap();
    assert!(pipeline.pose_stabilizers().iter().all(|s| s.state_num() == 3));
}

#[test]
fn test_point_stabilizer_must_measure_points() {
    let yaml = r"
stabilizer:
  point:
    state_num: 2
    measure_num: 1
    cov_process: 0.001
    cov_measure: 0.1
";
    let config = Config::from_yaml(yaml).unwrap();
    assert!(matches!(config.validate(), Err(Error::ConfigError(_))));
}

#[test]
fn test_model_paths_checked() {
    let dir = scratch_dir("models");
    let mut config = Config::default();
    config.models.face_detector_prototxt = dir.join("deploy.prototxt");
    config.models.face_detector_weights = dir.join("weights.caffemodel");
    config.models.face_landmarks = dir.join("landmarks.onnx");

    assert!(config.validate_model_paths().is_err());

    for path in [
        &config.models.face_detector_prototxt,
        &config.models.face_detector_weights,
        &config.models.face_landmarks,
    ] {
        fs::write(path, b"").unwrap();
    }
    config.validate_model_paths().unwrap();

    config.models.face_model_3d = Some(dir.join("model.txt"));
    let err = config.validate_model_paths().unwrap_err();
    assert!(err.to_string().contains("3D face model"));

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_eye_flow_display_option() {
    assert!(!Config::default().display.show_eye_flow);

    let config = Config::from_yaml("display:\n  show_eye_flow: true\n").unwrap();
    assert!(config.display.show_eye_flow);
    assert!(config.display.mirror);
    config.validate().unwrap();
}
