//! Benchmarks for pose recovery and the per-frame pipeline

use std::f64::consts::PI;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use head_pose_tracker::{
    constants::NUM_FACIAL_LANDMARKS,
    landmarks::{FaceBox, LandmarkSet},
    pipeline::{FaceDetector, Frame, LandmarkRegressor, Pipeline, PipelineConfig},
    pose_estimation::{project_annotation, project_points, CameraModel, FaceModel3D, Pose, PoseSolver},
    Result,
};
use nalgebra::{Point2, Rotation3, Vector3};

fn truth_pose() -> Pose {
    let rotation = Rotation3::from_euler_angles(0.1, -0.2, 0.05) * Rotation3::from_axis_angle(&Vector3::x_axis(), PI);
    Pose::from_rotation(&rotation, Vector3::new(20.0, -15.0, 1800.0))
}

fn synthetic_marks(pose: &Pose, camera: &CameraModel, model: &FaceModel3D) -> LandmarkSet {
    let projected = project_points(pose, camera, model.points());
    let mut points = [projected[0]; NUM_FACIAL_LANDMARKS];
    for (index, point) in model.landmark_indices().iter().zip(projected) {
        points[*index] = point;
    }
    LandmarkSet::new(points)
}

fn benchmark_pose_solving(c: &mut Criterion) {
    let mut group = c.benchmark_group("pose_solver");

    let camera = CameraModel::from_frame_size(640, 480);
    let model = FaceModel3D::standard();
    let pose = truth_pose();
    let marks = synthetic_marks(&pose, &camera, &model);
    let solver = PoseSolver::default();

    group.bench_function("cold_start", |b| {
        b.iter(|| black_box(solver.solve_pose(black_box(&marks), &camera, &model, None).unwrap()));
    });

    let prior = Pose::new(pose.rotation * 1.01, pose.translation + Vector3::new(2.0, -2.0, 10.0));
    group.bench_function("with_prior", |b| {
        b.iter(|| black_box(solver.solve_pose(black_box(&marks), &camera, &model, Some(&prior)).unwrap()));
    });

    group.bench_function("project_annotation", |b| {
        b.iter(|| black_box(project_annotation(black_box(&pose), &camera, &model)));
    });

    group.finish();
}

struct StaticDetector;

impl FaceDetector for StaticDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Option<FaceBox>> {
        Ok(Some(FaceBox::new(220, 140, 420, 340)))
    }
}

struct StaticRegressor(LandmarkSet);

impl LandmarkRegressor for StaticRegressor {
    fn regress(&mut self, _face: &Frame) -> Result<LandmarkSet> {
        Ok(self.0.clone())
    }
}

fn benchmark_pipeline_frame(c: &mut Criterion) {
    let camera = CameraModel::from_frame_size(640, 480);
    let global = synthetic_marks(&truth_pose(), &camera, &FaceModel3D::standard());
    // Crop region the pipeline derives from the detector box
    let (x1, y1, size) = (220.0, 160.0, 200.0);
    let local: Vec<Point2<f64>> = global
        .iter()
        .map(|p| Point2::new((p.x - x1) / size, (p.y - y1) / size))
        .collect();

    let frame = Frame::new(640, 480);
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let mut detector = StaticDetector;
    let mut regressor = StaticRegressor(LandmarkSet::from_slice(&local).unwrap());

    c.bench_function("pipeline_process_frame", |b| {
        b.iter(|| black_box(pipeline.process_frame(black_box(&frame), &mut detector, &mut regressor).unwrap()));
    });
}

criterion_group!(benches, benchmark_pose_solving, benchmark_pipeline_frame);
criterion_main!(benches);
