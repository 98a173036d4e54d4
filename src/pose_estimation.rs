//! Head pose recovery from 2D landmarks.
//!
//! The pose is found by solving the Perspective-n-Point problem between a
//! static 3D face model and the observed landmarks with Levenberg-Marquardt
//! refinement of the reprojection error.

use crate::{
    constants::{
        CAMERA_CENTER_FACTOR, DEFAULT_SOLVER_DAMPING, DEFAULT_SOLVER_MAX_ITERATIONS, DEFAULT_SOLVER_TOLERANCE,
        EPSILON, MIN_PNP_CORRESPONDENCES, MODEL_POINTS_TOTAL_VALUES, NUM_FACIAL_LANDMARKS, POSE_COMPONENTS,
    },
    landmarks::{LandmarkSet, CHIN, LEFT_EYE_OUTER, MOUTH_LEFT, MOUTH_RIGHT, NOSE_TIP, RIGHT_EYE_OUTER},
    Error, Result,
};
use log::debug;
use nalgebra::{Matrix2x3, Matrix3, Matrix6, Point2, Point3, Rotation3, SMatrix, UnitQuaternion, Vector3, Vector6};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fs;
use std::path::Path;

/// Rotation (axis-angle) and translation of the head in camera coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Axis-angle rotation vector
    pub rotation: Vector3<f64>,
    /// Translation vector
    pub translation: Vector3<f64>,
}

impl Pose {
    #[must_use]
    pub const fn new(rotation: Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self { rotation, translation }
    }

    /// Pose from a rotation matrix.
    ///
    /// The axis is read through a quaternion: the skew-symmetric part of the
    /// matrix vanishes at half turns, where the frontal orientation lives.
    #[must_use]
    pub fn from_rotation(rotation: &Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self::new(UnitQuaternion::from_rotation_matrix(rotation).scaled_axis(), translation)
    }

    /// Flatten to `[r0, r1, r2, t0, t1, t2]`
    #[must_use]
    pub fn to_array(&self) -> [f64; POSE_COMPONENTS] {
        [
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
            self.translation.x,
            self.translation.y,
            self.translation.z,
        ]
    }

    #[must_use]
    pub fn from_array(values: [f64; POSE_COMPONENTS]) -> Self {
        Self::new(
            Vector3::new(values[0], values[1], values[2]),
            Vector3::new(values[3], values[4], values[5]),
        )
    }

    #[must_use]
    pub fn rotation_matrix(&self) -> Rotation3<f64> {
        Rotation3::new(self.rotation)
    }

    /// Transform a model point into camera coordinates
    #[must_use]
    pub fn transform(&self, point: &Point3<f64>) -> Point3<f64> {
        self.rotation_matrix() * point + self.translation
    }

    /// Pitch, yaw and roll in degrees
    #[must_use]
    pub fn euler_angles(&self) -> Vector3<f64> {
        rotation_matrix_to_euler(self.rotation_matrix().matrix())
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }

    /// Same pose with the rotation vector chosen closest to `reference`.
    ///
    /// A rotation by `θ` about `k` equals one by `θ - 2π` about `k`. Near
    /// `θ = π` the solver may return either branch from frame to frame,
    /// which per-component smoothing cannot average.
    #[must_use]
    pub fn aligned_to(&self, reference: &Self) -> Self {
        let angle = self.rotation.norm();
        if angle < EPSILON {
            return *self;
        }
        let alternative = self.rotation * (1.0 - 2.0 * PI / angle);
        if (alternative - reference.rotation).norm() < (self.rotation - reference.rotation).norm() {
            Self::new(alternative, self.translation)
        } else {
            *self
        }
    }
}

/// Convert rotation matrix to Euler angles (pitch, yaw, roll) in degrees
#[must_use]
pub fn rotation_matrix_to_euler(rotation_matrix: &Matrix3<f64>) -> Vector3<f64> {
    let r13 = rotation_matrix[(0, 2)];
    let r21 = rotation_matrix[(1, 0)];
    let r22 = rotation_matrix[(1, 1)];
    let r23 = rotation_matrix[(1, 2)];
    let r33 = rotation_matrix[(2, 2)];

    let pitch = (-r23).clamp(-1.0, 1.0).asin();
    let yaw = r13.atan2(r33);
    let roll = r21.atan2(r22);

    Vector3::new(pitch.to_degrees(), yaw.to_degrees(), roll.to_degrees())
}

/// Pinhole camera approximated from the frame size, without lens distortion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraModel {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraModel {
    /// Focal length equal to the frame width, principal point at the frame center
    #[must_use]
    pub fn from_frame_size(width: u32, height: u32) -> Self {
        let focal_length = f64::from(width);
        Self {
            fx: focal_length,
            fy: focal_length,
            cx: f64::from(width) / CAMERA_CENTER_FACTOR,
            cy: f64::from(height) / CAMERA_CENTER_FACTOR,
        }
    }

    /// Intrinsic matrix
    #[must_use]
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    /// Project a point given in camera coordinates.
    ///
    /// Returns `None` for points on or behind the image plane.
    #[must_use]
    pub fn project(&self, point: &Point3<f64>) -> Option<Point2<f64>> {
        if point.z <= EPSILON {
            return None;
        }
        Some(Point2::new(
            self.fx * point.x / point.z + self.cx,
            self.fy * point.y / point.z + self.cy,
        ))
    }
}

/// Static 3D face geometry used for pose recovery and annotation
#[derive(Debug, Clone)]
pub struct FaceModel3D {
    indices: Vec<usize>,
    points: Vec<Point3<f64>>,
    annotation: Vec<Point3<f64>>,
    frontal: Rotation3<f64>,
}

impl FaceModel3D {
    /// Six-point model: nose tip, chin, outer eye corners and mouth corners.
    ///
    /// Model axes: x to the subject's left, y up, z out of the face.
    #[must_use]
    pub fn standard() -> Self {
        let correspondences = [
            (NOSE_TIP, Point3::new(0.0, 0.0, 0.0)),
            (CHIN, Point3::new(0.0, -330.0, -65.0)),
            (LEFT_EYE_OUTER, Point3::new(-225.0, 170.0, -135.0)),
            (RIGHT_EYE_OUTER, Point3::new(225.0, 170.0, -135.0)),
            (MOUTH_LEFT, Point3::new(-150.0, -150.0, -125.0)),
            (MOUTH_RIGHT, Point3::new(150.0, -150.0, -125.0)),
        ];
        Self {
            indices: correspondences.iter().map(|(i, _)| *i).collect(),
            points: correspondences.iter().map(|(_, p)| *p).collect(),
            annotation: annotation_box(75.0, 0.0, 100.0, 100.0),
            // Face turned towards the camera: model y up becomes image y down
            frontal: Rotation3::from_axis_angle(&Vector3::x_axis(), PI),
        }
    }

    /// Load a full 68-point model.
    ///
    /// The file holds 204 numbers, one per line: all x coordinates, then all
    /// y coordinates, then all z coordinates. Depth is stored towards the
    /// face and flipped on load.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or holds the wrong number
    /// of values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        log::info!("Loading 3D face model: {}", path.as_ref().display());
        let content = fs::read_to_string(path)?;
        let points = parse_model_points(&content)?;
        Ok(Self {
            indices: (0..NUM_FACIAL_LANDMARKS).collect(),
            points,
            annotation: annotation_box(75.0, 0.0, 100.0, 100.0),
            frontal: Rotation3::from_axis_angle(&Vector3::z_axis(), PI),
        })
    }

    /// Model from explicit landmark indices and 3D points.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the lists differ in length or an
    /// index is outside the landmark range.
    pub fn with_correspondences(indices: Vec<usize>, points: Vec<Point3<f64>>, frontal: Rotation3<f64>) -> Result<Self> {
        if indices.len() != points.len() {
            return Err(Error::InvalidInput(format!(
                "{} landmark indices but {} model points",
                indices.len(),
                points.len()
            )));
        }
        if let Some(index) = indices.iter().find(|&&i| i >= NUM_FACIAL_LANDMARKS) {
            return Err(Error::InvalidInput(format!("Landmark index {index} out of range")));
        }
        Ok(Self {
            indices,
            points,
            annotation: annotation_box(75.0, 0.0, 100.0, 100.0),
            frontal,
        })
    }

    /// `(landmark index, model point)` pairs
    pub fn correspondences(&self) -> impl Iterator<Item = (usize, &Point3<f64>)> {
        self.indices.iter().copied().zip(self.points.iter())
    }

    #[must_use]
    pub fn landmark_indices(&self) -> &[usize] {
        &self.indices
    }

    #[must_use]
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    /// Cuboid vertices: rear square (closed), then front square (closed)
    #[must_use]
    pub fn annotation_points(&self) -> &[Point3<f64>] {
        &self.annotation
    }

    /// Orientation at which the model faces the camera
    #[must_use]
    pub fn frontal_rotation(&self) -> Rotation3<f64> {
        self.frontal
    }
}

impl Default for FaceModel3D {
    fn default() -> Self {
        Self::standard()
    }
}

fn annotation_box(rear_size: f64, rear_depth: f64, front_size: f64, front_depth: f64) -> Vec<Point3<f64>> {
    let mut points = Vec::with_capacity(10);
    for (size, depth) in [(rear_size, rear_depth), (front_size, front_depth)] {
        points.push(Point3::new(-size, -size, depth));
        points.push(Point3::new(-size, size, depth));
        points.push(Point3::new(size, size, depth));
        points.push(Point3::new(size, -size, depth));
        points.push(Point3::new(-size, -size, depth));
    }
    points
}

/// Parse 68 model points stored as three coordinate blocks
fn parse_model_points(content: &str) -> Result<Vec<Point3<f64>>> {
    let values: Vec<f64> = content
        .split_whitespace()
        .filter_map(|token| token.parse::<f64>().ok())
        .collect();

    if values.len() != MODEL_POINTS_TOTAL_VALUES {
        return Err(Error::InvalidInput(format!(
            "Expected {} coordinate values ({} points × 3), got {}",
            MODEL_POINTS_TOTAL_VALUES,
            NUM_FACIAL_LANDMARKS,
            values.len()
        )));
    }

    let n = NUM_FACIAL_LANDMARKS;
    Ok((0..n)
        .map(|i| Point3::new(values[i], values[n + i], -values[2 * n + i]))
        .collect())
}

/// Levenberg-Marquardt parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Upper bound on iterations, rejected steps included
    pub max_iterations: usize,
    /// Relative step size and gradient threshold for convergence
    pub tolerance: f64,
    /// Initial damping factor
    pub initial_damping: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_SOLVER_MAX_ITERATIONS,
            tolerance: DEFAULT_SOLVER_TOLERANCE,
            initial_damping: DEFAULT_SOLVER_DAMPING,
        }
    }
}

const MAX_DAMPING: f64 = 1e16;
const MIN_DAMPING: f64 = 1e-12;

/// Perspective-n-Point solver
#[derive(Debug, Clone, Default)]
pub struct PoseSolver {
    config: SolverConfig,
}

impl PoseSolver {
    #[must_use]
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Recover the head pose from landmarks in frame coordinates.
    ///
    /// `prior` seeds the refinement, typically with the previous frame's
    /// pose. Without one, or if refining from it fails, the solver starts
    /// from a frontal pose placed by the landmark centroid and spread.
    ///
    /// # Errors
    ///
    /// - [`Error::InsufficientCorrespondences`] with fewer than 4 usable landmarks
    /// - [`Error::PoseSolve`] if the refinement does not converge
    pub fn solve_pose(
        &self,
        landmarks: &LandmarkSet,
        camera: &CameraModel,
        model: &FaceModel3D,
        prior: Option<&Pose>,
    ) -> Result<Pose> {
        let (object, image): (Vec<Point3<f64>>, Vec<Point2<f64>>) = model
            .correspondences()
            .filter_map(|(index, point)| {
                landmarks
                    .get(index)
                    .filter(|mark| mark.x.is_finite() && mark.y.is_finite())
                    .map(|mark| (*point, *mark))
            })
            .unzip();

        if object.len() < MIN_PNP_CORRESPONDENCES {
            return Err(Error::InsufficientCorrespondences {
                required: MIN_PNP_CORRESPONDENCES,
                actual: object.len(),
            });
        }

        if let Some(prior) = prior.filter(|p| p.is_finite()) {
            match self.refine(&object, &image, camera, prior.rotation_matrix(), prior.translation) {
                Ok(pose) => return Ok(pose),
                Err(e) => debug!("Refinement from prior pose failed ({e}), retrying from frontal pose"),
            }
        }

        let (rotation, translation) = frontal_prior(&object, &image, camera, model.frontal_rotation())?;
        self.refine(&object, &image, camera, rotation, translation)
    }

    fn refine(
        &self,
        object: &[Point3<f64>],
        image: &[Point2<f64>],
        camera: &CameraModel,
        mut rotation: Rotation3<f64>,
        mut translation: Vector3<f64>,
    ) -> Result<Pose> {
        let tolerance = self.config.tolerance;
        let mut cost = reprojection_cost(object, image, camera, &rotation, &translation).ok_or_else(|| {
            Error::PoseSolve {
                iterations: 0,
                reason: "initial pose places model points behind the camera".to_string(),
            }
        })?;
        let mut damping = self.config.initial_damping;

        for iteration in 1..=self.config.max_iterations {
            let (hessian, gradient) = normal_equations(object, image, camera, &rotation, &translation);

            if cost <= f64::EPSILON || gradient.amax() <= tolerance * (1.0 + cost) {
                return converged(&rotation, translation, iteration, cost);
            }

            let mut augmented = hessian;
            for i in 0..6 {
                augmented[(i, i)] += damping * hessian[(i, i)].max(EPSILON);
            }

            let Some(step) = augmented.cholesky().map(|c| c.solve(&(-gradient))) else {
                damping *= 10.0;
                continue;
            };

            let step_rotation = Rotation3::new(step.fixed_rows::<3>(0).into_owned());
            let candidate_rotation = step_rotation * rotation;
            let candidate_translation = translation + step.fixed_rows::<3>(3);
            let scale = UnitQuaternion::from_rotation_matrix(&rotation).angle() + translation.norm();
            let small_step = step.norm() <= tolerance * (scale + tolerance);

            match reprojection_cost(object, image, camera, &candidate_rotation, &candidate_translation) {
                Some(candidate_cost) if candidate_cost < cost => {
                    let gauss_newton_like = damping < 1.0;

                    rotation = candidate_rotation;
                    rotation.renormalize();
                    translation = candidate_translation;
                    cost = candidate_cost;
                    damping = (damping * 0.1).max(MIN_DAMPING);

                    if small_step && gauss_newton_like {
                        return converged(&rotation, translation, iteration, cost);
                    }
                }
                // Noisy landmarks: no representable step lowers the cost any more
                _ if small_step => {
                    return converged(&rotation, translation, iteration, cost);
                }
                _ => {
                    damping *= 10.0;
                    if damping > MAX_DAMPING {
                        return Err(Error::PoseSolve {
                            iterations: iteration,
                            reason: format!("refinement stalled at cost {cost:.3e}"),
                        });
                    }
                }
            }
        }

        Err(Error::PoseSolve {
            iterations: self.config.max_iterations,
            reason: format!("no convergence, cost {cost:.3e}"),
        })
    }
}

/// Finish a refinement, rejecting poses that are not finite
fn converged(rotation: &Rotation3<f64>, translation: Vector3<f64>, iteration: usize, cost: f64) -> Result<Pose> {
    let pose = Pose::from_rotation(rotation, translation);
    if !pose.is_finite() {
        return Err(Error::PoseSolve {
            iterations: iteration,
            reason: format!("refinement produced a non-finite pose {:?}", pose.to_array()),
        });
    }
    debug!("PnP converged after {iteration} iterations, cost {cost:.3e}");
    Ok(pose)
}

/// Frontal pose whose depth matches the observed landmark spread
fn frontal_prior(
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    camera: &CameraModel,
    frontal: Rotation3<f64>,
) -> Result<(Rotation3<f64>, Vector3<f64>)> {
    let n = object.len() as f64;
    let rotated: Vec<Vector3<f64>> = object.iter().map(|p| frontal * p.coords).collect();
    let model_center = rotated.iter().sum::<Vector3<f64>>() / n;
    let image_center = image.iter().map(|p| p.coords).sum::<nalgebra::Vector2<f64>>() / n;

    let model_spread = (rotated
        .iter()
        .map(|p| (p - model_center).xy().norm_squared())
        .sum::<f64>()
        / n)
        .sqrt();
    let image_spread = (image.iter().map(|p| (p.coords - image_center).norm_squared()).sum::<f64>() / n).sqrt();

    if image_spread <= EPSILON || model_spread <= EPSILON {
        return Err(Error::PoseSolve {
            iterations: 0,
            reason: "landmarks collapse to a single point".to_string(),
        });
    }

    let depth = camera.fx * model_spread / image_spread;
    let center = Vector3::new(
        (image_center.x - camera.cx) / camera.fx * depth,
        (image_center.y - camera.cy) / camera.fy * depth,
        depth,
    );
    Ok((frontal, center - model_center))
}

/// Sum of squared reprojection residuals, `None` if a point is behind the camera
fn reprojection_cost(
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    camera: &CameraModel,
    rotation: &Rotation3<f64>,
    translation: &Vector3<f64>,
) -> Option<f64> {
    object.iter().zip(image).try_fold(0.0, |acc, (point, observed)| {
        let projected = camera.project(&(rotation * point + translation))?;
        Some(acc + (projected - *observed).norm_squared())
    })
}

/// `JᵀJ` and `Jᵀr` for a left-multiplied rotation increment and additive translation
fn normal_equations(
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    camera: &CameraModel,
    rotation: &Rotation3<f64>,
    translation: &Vector3<f64>,
) -> (Matrix6<f64>, Vector6<f64>) {
    let mut hessian = Matrix6::zeros();
    let mut gradient = Vector6::zeros();

    for (point, observed) in object.iter().zip(image) {
        let rotated = rotation * point.coords;
        let p = rotated + translation;
        let inv_z = 1.0 / p.z;

        let residual = nalgebra::Vector2::new(
            camera.fx * p.x * inv_z + camera.cx - observed.x,
            camera.fy * p.y * inv_z + camera.cy - observed.y,
        );

        #[rustfmt::skip]
        let d_projection = Matrix2x3::new(
            camera.fx * inv_z, 0.0, -camera.fx * p.x * inv_z * inv_z,
            0.0, camera.fy * inv_z, -camera.fy * p.y * inv_z * inv_z,
        );

        // d(exp(w) R X + t)/dw = -[R X]x, d/dt = I
        let mut d_point = SMatrix::<f64, 3, 6>::zeros();
        d_point.fixed_view_mut::<3, 3>(0, 0).copy_from(&(-rotated.cross_matrix()));
        d_point.fixed_view_mut::<3, 3>(0, 3).copy_from(&Matrix3::identity());

        let jacobian = d_projection * d_point;
        hessian += jacobian.transpose() * jacobian;
        gradient += jacobian.transpose() * residual;
    }

    (hessian, gradient)
}

/// Project model-space points through `pose` and `camera`.
///
/// Points behind the camera project to non-finite coordinates so the
/// output keeps one entry per input point.
#[must_use]
pub fn project_points(pose: &Pose, camera: &CameraModel, points: &[Point3<f64>]) -> Vec<Point2<f64>> {
    let rotation = pose.rotation_matrix();
    points
        .iter()
        .map(|point| {
            camera
                .project(&(rotation * point + pose.translation))
                .unwrap_or_else(|| Point2::new(f64::NAN, f64::NAN))
        })
        .collect()
}

/// Project the annotation cuboid, preserving vertex order
#[must_use]
pub fn project_annotation(pose: &Pose, camera: &CameraModel, model: &FaceModel3D) -> Vec<Point2<f64>> {
    project_points(pose, camera, model.annotation_points())
}

/// Root-mean-square reprojection error over the model correspondences
#[must_use]
pub fn reprojection_rmse(pose: &Pose, camera: &CameraModel, model: &FaceModel3D, landmarks: &LandmarkSet) -> Option<f64> {
    let (object, image): (Vec<Point3<f64>>, Vec<Point2<f64>>) = model
        .correspondences()
        .filter_map(|(index, point)| landmarks.get(index).map(|mark| (*point, *mark)))
        .unzip();
    if object.is_empty() {
        return None;
    }
    let cost = reprojection_cost(&object, &image, camera, &pose.rotation_matrix(), &pose.translation)?;
    Some((cost / object.len() as f64).sqrt())
}
