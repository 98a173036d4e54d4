//! End-to-end tests of the tracking pipeline with synthetic collaborators


use head_pose_tracker::{
    constants::{ESCAPE_KEY, NUM_FACIAL_LANDMARKS},
    landmarks::LandmarkSet,
    pipeline::{Pipeline, PipelineConfig, PipelineState},
    pose_estimation::{project_annotation, FaceModel3D},
    render::ANNOTATION_COLOR,
    stabilizer::MotionRegime,
    Error,
};
use nalgebra::{Point2, Vector2};
use test_helpers::{
    peak_to_peak, rms_error, rotation_error, AlternatingRegressor, BlankSource, FailingRegressor, FixedDetector,
    GappyDetector, JitterRegressor, ScriptedDisplay, SyntheticScene, DETECTED_FACE,
};

/// ±2 px on the 200 px crop
const JITTER: f64 = 0.01;

#[test]
fn test_jitter_is_suppressed() {
    let scene = SyntheticScene::new();
    let frame = scene.frame();
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let mut detector = FixedDetector(Some(DETECTED_FACE));
    let mut regressor = JitterRegressor::new(scene.local_marks.clone(), JITTER, 42);

    let mut raw_error = 0.0;
    let mut stable_error = 0.0;
    for index in 0..100 {
        let output = pipeline.process_frame(&frame, &mut detector, &mut regressor).unwrap();
        assert_eq!(output.face, Some(scene.face));
        if index < 40 {
            continue;
        }

        let raw = output.raw_marks.unwrap();
        let stable = output.stable_marks.unwrap();
        raw_error += rms_error(&raw, &scene.global_marks).powi(2);
        stable_error += rms_error(&stable, &scene.global_marks).powi(2);

        let pose = output.pose.expect("pose for settled landmarks");
        let stable_pose = output.stable_pose.expect("stabilized pose");
        assert!(rotation_error(&pose, &scene.pose) < 0.1);
        assert!(rotation_error(&stable_pose, &scene.pose) < 0.1);
        let depth_error = (stable_pose.translation.z - scene.pose.translation.z).abs() / scene.pose.translation.z;
        assert!(depth_error < 0.1, "depth error {depth_error}");
    }

    assert!(
        stable_error.sqrt() < 0.75 * raw_error.sqrt(),
        "stable {stable_error} vs raw {raw_error}"
    );
    assert_eq!(pipeline.state(), PipelineState::Tracking);
}

#[test]
fn test_oscillation_peak_to_peak_is_reduced() {
    let scene = SyntheticScene::new();
    let frame = scene.frame();
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let mut detector = FixedDetector(Some(DETECTED_FACE));
    let mut regressor = AlternatingRegressor::new(scene.local_marks.clone(), JITTER);

    let mut raw = Vec::new();
    let mut stable = Vec::new();
    for _ in 0..30 {
        let output = pipeline.process_frame(&frame, &mut detector, &mut regressor).unwrap();
        raw.push(output.raw_marks.unwrap());
        stable.push(output.stable_marks.unwrap());
    }

    for index in 0..NUM_FACIAL_LANDMARKS {
        let raw_x = peak_to_peak(raw.iter().map(|m| m.as_slice()[index].x));
        let raw_y = peak_to_peak(raw.iter().map(|m| m.as_slice()[index].y));
        let stable_x = peak_to_peak(stable.iter().map(|m| m.as_slice()[index].x));
        let stable_y = peak_to_peak(stable.iter().map(|m| m.as_slice()[index].y));

        assert!((raw_x - 4.0).abs() < 1e-6, "landmark {index}: raw {raw_x}");
        assert!(stable_x < raw_x, "landmark {index}: {stable_x} vs {raw_x}");
        assert!(stable_y < raw_y, "landmark {index}: {stable_y} vs {raw_y}");
    }
}

#[test]
fn test_annotation_matches_true_pose() {
    let scene = SyntheticScene::new();
    let frame = scene.frame();
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let mut regressor = JitterRegressor::new(scene.local_marks.clone(), 0.0, 0);

    let output = pipeline
        .process_frame(&frame, &mut FixedDetector(Some(DETECTED_FACE)), &mut regressor)
        .unwrap();
    let expected = project_annotation(&scene.pose, &scene.camera, &FaceModel3D::standard());
    let annotation = output.annotation.unwrap();
    assert_eq!(annotation.len(), expected.len());
    for (drawn, truth) in annotation.iter().zip(&expected) {
        assert!((drawn - truth).norm() < 1e-3, "{drawn} vs {truth}");
    }
}

#[test]
fn test_static_landmarks_give_exact_pose() {
    let scene = SyntheticScene::new();
    let frame = scene.frame();
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let mut detector = FixedDetector(Some(DETECTED_FACE));
    let mut regressor = JitterRegressor::new(scene.local_marks.clone(), 0.0, 0);

    for _ in 0..5 {
        let output = pipeline.process_frame(&frame, &mut detector, &mut regressor).unwrap();
        let stable = output.stable_marks.unwrap();
        assert!(rms_error(&stable, &scene.global_marks) < 1e-9);

        let pose = output.pose.unwrap();
        assert!(rotation_error(&pose, &scene.pose) < 1e-6);
        assert!((pose.translation - scene.pose.translation).norm() < 1e-3);
    }
    assert!(pipeline.previous_pose().is_some());
}

#[test]
fn test_no_face_passes_frame_through() {
    let scene = SyntheticScene::new();
    let frame = scene.frame();
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let mut regressor = JitterRegressor::new(scene.local_marks.clone(), 0.0, 0);

    let output = pipeline
        .process_frame(&frame, &mut FixedDetector(None), &mut regressor)
        .unwrap();
    assert_eq!(pipeline.state(), PipelineState::NoFace);
    assert_eq!(output.rendered, frame);
    assert!(output.face.is_none());
    assert!(output.raw_marks.is_none());
    assert!(output.pose.is_none());
    assert!(output.annotation.is_none());

    pipeline
        .process_frame(&frame, &mut FixedDetector(Some(DETECTED_FACE)), &mut regressor)
        .unwrap();
    assert_eq!(pipeline.state(), PipelineState::Tracking);
}

#[test]
fn test_annotation_is_drawn() {
    let scene = SyntheticScene::new();
    let frame = scene.frame();
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let mut regressor = JitterRegressor::new(scene.local_marks.clone(), 0.0, 0);

    let output = pipeline
        .process_frame(&frame, &mut FixedDetector(Some(DETECTED_FACE)), &mut regressor)
        .unwrap();
    let annotation = output.annotation.unwrap();
    assert_eq!(annotation.len(), 10);
    assert!(output.rendered.pixels().any(|p| *p == ANNOTATION_COLOR));
}

#[test]
fn test_annotation_uses_raw_pose_by_default() {
    let scene = SyntheticScene::new();
    let frame = scene.frame();
    let model = FaceModel3D::standard();
    let mut detector = FixedDetector(Some(DETECTED_FACE));

    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let mut regressor = JitterRegressor::new(scene.local_marks.clone(), JITTER, 7);
    for _ in 0..3 {
        let output = pipeline.process_frame(&frame, &mut detector, &mut regressor).unwrap();
        let pose = output.pose.unwrap();
        assert_eq!(output.annotation.unwrap(), project_annotation(&pose, &scene.camera, &model));
    }

    let config = PipelineConfig {
        annotate_with_smoothed_pose: true,
        ..PipelineConfig::default()
    };
    let mut pipeline = Pipeline::new(config).unwrap();
    let mut regressor = JitterRegressor::new(scene.local_marks.clone(), JITTER, 7);
    for _ in 0..3 {
        let output = pipeline.process_frame(&frame, &mut detector, &mut regressor).unwrap();
        let stable_pose = output.stable_pose.unwrap();
        assert_eq!(
            output.annotation.unwrap(),
            project_annotation(&stable_pose, &scene.camera, &model)
        );
    }
}

#[test]
fn test_pose_failure_keeps_landmarks() {
    let scene = SyntheticScene::new();
    let frame = scene.frame();
    let collapsed = LandmarkSet::new([Point2::new(0.5, 0.5); NUM_FACIAL_LANDMARKS]);
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let mut regressor = JitterRegressor::new(collapsed, 0.0, 0);

    let output = pipeline
        .process_frame(&frame, &mut FixedDetector(Some(DETECTED_FACE)), &mut regressor)
        .unwrap();
    assert_eq!(pipeline.state(), PipelineState::Tracking);
    assert!(output.stable_marks.is_some());
    assert!(output.pose.is_none());
    assert!(output.stable_pose.is_none());
    assert!(output.annotation.is_none());
    assert!(pipeline.previous_pose().is_none());
}

#[test]
fn test_run_counts_frames() {
    let scene = SyntheticScene::new();
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let mut source = BlankSource { remaining: 6 };
    let mut detector = GappyDetector {
        face: DETECTED_FACE,
        missing: vec![2, 3],
        calls: 0,
    };
    let mut regressor = JitterRegressor::new(scene.local_marks.clone(), 0.0, 0);
    let mut display = ScriptedDisplay::default();

    let summary = pipeline
        .run(&mut source, &mut detector, &mut regressor, &mut display)
        .unwrap();
    assert_eq!(summary.frames, 6);
    assert_eq!(summary.tracked_frames, 4);
    assert_eq!(summary.pose_failures, 0);
    assert_eq!(display.shown, 6);
    assert_eq!(display.tracked_inputs.len(), 4);
    assert!(display
        .tracked_inputs
        .iter()
        .all(|input| input.pixels().all(|p| *p != ANNOTATION_COLOR)));
    assert_eq!(pipeline.state(), PipelineState::Terminated);
}

#[test]
fn test_run_counts_pose_failures() {
    let scene = SyntheticScene::new();
    let collapsed = LandmarkSet::new([Point2::new(0.5, 0.5); NUM_FACIAL_LANDMARKS]);
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let mut regressor = JitterRegressor::new(collapsed, 0.0, 0);

    let summary = pipeline
        .run(
            &mut BlankSource { remaining: 3 },
            &mut FixedDetector(Some(scene.face)),
            &mut regressor,
            &mut ScriptedDisplay::default(),
        )
        .unwrap();
    assert_eq!(summary.frames, 3);
    assert_eq!(summary.tracked_frames, 3);
    assert_eq!(summary.pose_failures, 3);
}

#[test]
fn test_run_stops_on_escape() {
    let scene = SyntheticScene::new();
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let mut regressor = JitterRegressor::new(scene.local_marks.clone(), 0.0, 0);
    let mut display = ScriptedDisplay::with_keys([None, Some(i32::from(b'a')), Some(ESCAPE_KEY), None]);

    let summary = pipeline
        .run(
            &mut BlankSource { remaining: 10 },
            &mut FixedDetector(Some(DETECTED_FACE)),
            &mut regressor,
            &mut display,
        )
        .unwrap();
    assert_eq!(summary.frames, 3);
    assert_eq!(display.shown, 3);
    assert_eq!(pipeline.state(), PipelineState::Terminated);
}

#[test]
fn test_run_stops_on_q() {
    let scene = SyntheticScene::new();
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let mut regressor = JitterRegressor::new(scene.local_marks.clone(), 0.0, 0);
    let mut display = ScriptedDisplay::with_keys([Some(i32::from(b'q'))]);

    let summary = pipeline
        .run(
            &mut BlankSource { remaining: 10 },
            &mut FixedDetector(None),
            &mut regressor,
            &mut display,
        )
        .unwrap();
    assert_eq!(summary.frames, 1);
    assert_eq!(summary.tracked_frames, 0);
}

#[test]
fn test_terminated_pipeline_can_be_reset() {
    let scene = SyntheticScene::new();
    let frame = scene.frame();
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let mut detector = FixedDetector(Some(DETECTED_FACE));
    let mut regressor = JitterRegressor::new(scene.local_marks.clone(), 0.0, 0);

    pipeline
        .run(
            &mut BlankSource { remaining: 2 },
            &mut detector,
            &mut regressor,
            &mut ScriptedDisplay::default(),
        )
        .unwrap();
    assert!(pipeline.process_frame(&frame, &mut detector, &mut regressor).is_err());

    pipeline.reset();
    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert!(pipeline.previous_pose().is_none());
    assert!(pipeline.mark_stabilizers().iter().all(|s| !s.is_initialized()));
    assert!(pipeline.process_frame(&frame, &mut detector, &mut regressor).is_ok());
}

#[test]
fn test_regressor_error_aborts_run() {
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let result = pipeline.run(
        &mut BlankSource { remaining: 3 },
        &mut FixedDetector(Some(DETECTED_FACE)),
        &mut FailingRegressor,
        &mut ScriptedDisplay::default(),
    );
    assert!(matches!(result, Err(Error::ModelError(_))));
}

#[test]
fn test_adaptive_regime_switching() {
    let scene = SyntheticScene::new();
    let frame = scene.frame();
    let mut config = PipelineConfig::default();
    config.adaptive.enabled = true;
    let still = config.adaptive.still;
    let moving = config.adaptive.moving;

    let mut pipeline = Pipeline::new(config).unwrap();
    let mut detector = FixedDetector(Some(DETECTED_FACE));
    let mut regressor = JitterRegressor::new(scene.local_marks.clone(), 0.0, 0);

    let regimes: Vec<_> = (0..6)
        .map(|_| {
            pipeline
                .process_frame(&frame, &mut detector, &mut regressor)
                .unwrap()
                .regime
                .unwrap()
        })
        .collect();
    assert_eq!(&regimes[..3], &[MotionRegime::Moving; 3]);
    assert_eq!(&regimes[3..], &[MotionRegime::Still; 3]);
    assert!(pipeline
        .mark_stabilizers()
        .iter()
        .all(|s| s.cov_process() == still.cov_process && s.cov_measure() == still.cov_measure));

    // 4 px per frame on the 200 px crop
    let step = Vector2::new(0.02, 0.0);
    let mut last = MotionRegime::Still;
    for _ in 0..6 {
        let shifted: Vec<Point2<f64>> = regressor.base.iter().map(|p| p + step).collect();
        regressor.base = LandmarkSet::from_slice(&shifted).unwrap();
        last = pipeline
            .process_frame(&frame, &mut detector, &mut regressor)
            .unwrap()
            .regime
            .unwrap();
    }
    assert_eq!(last, MotionRegime::Moving);
    assert!(pipeline
        .mark_stabilizers()
        .iter()
        .all(|s| s.cov_process() == moving.cov_process && s.cov_measure() == moving.cov_measure));
}

#[test]
fn test_adaptive_disabled_reports_no_regime() {
    let scene = SyntheticScene::new();
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let mut regressor = JitterRegressor::new(scene.local_marks.clone(), 0.0, 0);
    let output = pipeline
        .process_frame(&scene.frame(), &mut FixedDetector(Some(DETECTED_FACE)), &mut regressor)
        .unwrap();
    assert!(output.regime.is_none());
}
