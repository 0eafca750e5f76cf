//! Geometric feature extraction from landmark frames.
//!
//! Each valid frame yields a fixed 33-dimensional vector split into three
//! groups consumed as separate model inputs: hand shape (7), hand position
//! relative to the face (18), and lip geometry (8). Motion components need
//! the two preceding frames, so the first two frames of any stream are
//! always invalid.

use crate::landmarks::{Landmark, LandmarkFrame};

/// Face mesh index of the left face edge (normalization anchor).
const FACE_EDGE_LEFT: usize = 454;
/// Face mesh index of the right face edge (normalization anchor).
const FACE_EDGE_RIGHT: usize = 234;
/// Face mesh index of the chin point; the hand angle is measured against it.
const FACE_CHIN: usize = 200;
/// Hand indices whose distances to the face reference points are emitted,
/// in emission order.
const HAND_POSITION_INDICES: [usize; 3] = [8, 9, 12];
/// Face reference points for hand-position distances, in emission order.
const FACE_POSITION_INDICES: [usize; 5] = [234, 200, 214, 454, 280];
/// Fingertip indices paired with the wrist for hand-shape distances.
const HAND_SHAPE_TIPS: [usize; 5] = [4, 8, 12, 16, 20];
/// Outer lip contour, ordered as a closed polygon.
const LIP_OUTER: [usize; 20] = [
    61, 185, 40, 39, 37, 0, 267, 269, 270, 409, 291, 375, 321, 405, 314, 17, 84, 181, 91, 146,
];

/// Degenerate-geometry threshold for normalization distances.
const MIN_NORM: f32 = 1e-6;

/// The 33-dimensional feature vector for one frame.
///
/// Fixed-size groups match the acoustic model's three input tensors. A value
/// produced by [`FeatureExtractor::extract`] always has finite components;
/// [`FrameFeatures::is_valid`] re-checks finiteness for values built by hand.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameFeatures {
    /// Wrist-to-fingertip distances plus index-finger velocity.
    pub hand_shape: [f32; 7],
    /// Hand-to-face distances plus the chin-relative angle.
    pub hand_position: [f32; 18],
    /// Mouth width/height/area/curvature plus lip velocity and acceleration.
    pub lips: [f32; 8],
}

impl FrameFeatures {
    /// The all-zero frame used to pad short windows.
    pub fn zeroed() -> Self {
        Self {
            hand_shape: [0.0; 7],
            hand_position: [0.0; 18],
            lips: [0.0; 8],
        }
    }

    /// True when every component is finite.
    pub fn is_valid(&self) -> bool {
        self.hand_shape.iter().all(|v| v.is_finite())
            && self.hand_position.iter().all(|v| v.is_finite())
            && self.lips.iter().all(|v| v.is_finite())
    }
}

impl Default for FrameFeatures {
    fn default() -> Self {
        Self::zeroed()
    }
}

fn distance(a: Landmark, b: Landmark) -> f32 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let dz = b.z - a.z;
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Shoelace polygon area in the x/y plane, absolute value.
fn polygon_area(points: &[(f32, f32)]) -> f32 {
    if points.is_empty() {
        return 0.0;
    }
    let n = points.len();
    let mut area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i].0 * points[j].1;
        area -= points[j].0 * points[i].1;
    }
    area.abs() * 0.5
}

/// Mean interior turning angle over a closed contour. Vertices whose
/// neighbor segments are degenerate contribute nothing; an empty angle set
/// yields 0.
fn mean_contour_curvature(points: &[(f32, f32)]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let n = points.len();
    let mut sum = 0.0;
    let mut count = 0usize;
    for i in 0..n {
        let prev = points[(i + n - 1) % n];
        let curr = points[i];
        let next = points[(i + 1) % n];

        let v1 = (prev.0 - curr.0, prev.1 - curr.1);
        let v2 = (next.0 - curr.0, next.1 - curr.1);
        let norm1 = (v1.0 * v1.0 + v1.1 * v1.1).sqrt();
        let norm2 = (v2.0 * v2.0 + v2.1 * v2.1).sqrt();
        if norm1 < MIN_NORM || norm2 < MIN_NORM {
            continue;
        }

        let cos = ((v1.0 * v2.0 + v1.1 * v2.1) / (norm1 * norm2)).clamp(-1.0, 1.0);
        sum += cos.acos();
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

/// Computes [`FrameFeatures`] from a 3-frame window of landmark frames.
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract the 33-d feature vector for the current frame.
    ///
    /// Returns `None` when any consulted landmark is missing or non-finite,
    /// when the face-width normalizer is degenerate, or when the motion
    /// context (`prev`, `prev2`) is absent.
    pub fn extract(
        &self,
        current: &LandmarkFrame,
        prev: Option<&LandmarkFrame>,
        prev2: Option<&LandmarkFrame>,
    ) -> Option<FrameFeatures> {
        let edge_left = current.face_point(FACE_EDGE_LEFT)?;
        let edge_right = current.face_point(FACE_EDGE_RIGHT)?;
        let face_width = distance(edge_left, edge_right);
        if face_width <= MIN_NORM {
            return None;
        }

        let hand_span = match (current.hand_point(0), current.hand_point(9)) {
            (Some(wrist), Some(knuckle)) => {
                let span = distance(wrist, knuckle);
                if span <= MIN_NORM {
                    face_width
                } else {
                    span
                }
            }
            _ => face_width,
        };

        let mut hand_position = Vec::with_capacity(18);
        for &hand_idx in &HAND_POSITION_INDICES {
            let h = current.hand_point(hand_idx)?;
            for &face_idx in &FACE_POSITION_INDICES {
                let f = current.face_point(face_idx)?;
                hand_position.push(distance(h, f) / face_width);
                if face_idx == FACE_CHIN {
                    let dx = (f.x - h.x) / face_width;
                    let dy = (f.y - h.y) / face_width;
                    hand_position.push(dy.atan2(dx));
                }
            }
        }

        let wrist = current.hand_point(0)?;
        let mut hand_shape = Vec::with_capacity(7);
        for &tip in &HAND_SHAPE_TIPS {
            let t = current.hand_point(tip)?;
            hand_shape.push(distance(wrist, t) / hand_span);
        }

        let corner_left = current.face_point(61)?;
        let corner_right = current.face_point(291)?;
        let lip_top = current.face_point(0)?;
        let lip_bottom = current.face_point(17)?;

        let mut lips = Vec::with_capacity(8);
        lips.push(distance(corner_left, corner_right) / face_width);
        lips.push(distance(lip_top, lip_bottom) / face_width);

        let mut contour = Vec::with_capacity(LIP_OUTER.len());
        for &idx in &LIP_OUTER {
            let p = current.face_point(idx)?;
            contour.push((p.x, p.y));
        }
        lips.push(polygon_area(&contour) / (face_width * face_width));
        lips.push(mean_contour_curvature(&contour));

        // Motion components need both preceding frames.
        let prev = prev?;
        let prev2 = prev2?;
        let prev_lip = prev.face_point(0)?;
        let prev2_lip = prev2.face_point(0)?;

        let lip_vel_x = (lip_top.x - prev_lip.x) / face_width;
        let lip_vel_y = (lip_top.y - prev_lip.y) / face_width;
        lips.push(lip_vel_x);
        lips.push(lip_vel_y);
        lips.push(lip_vel_x - (prev_lip.x - prev2_lip.x) / face_width);
        lips.push(lip_vel_y - (prev_lip.y - prev2_lip.y) / face_width);

        let index_tip = current.hand_point(8)?;
        let prev_index_tip = prev.hand_point(8)?;
        hand_shape.push((index_tip.x - prev_index_tip.x) / hand_span);
        hand_shape.push((index_tip.y - prev_index_tip.y) / hand_span);

        let features = FrameFeatures {
            hand_shape: hand_shape.try_into().ok()?,
            hand_position: hand_position.try_into().ok()?,
            lips: lips.try_into().ok()?,
        };
        if features.is_valid() {
            Some(features)
        } else {
            None
        }
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::Landmark;

    /// A frame with every consulted landmark at the origin except the left
    /// face edge at (1, 0, 0), giving a unit face width.
    fn unit_frame() -> LandmarkFrame {
        let mut frame = LandmarkFrame::default();
        frame.face = vec![Landmark::new(0.0, 0.0, 0.0); 468];
        frame.face[FACE_EDGE_LEFT] = Landmark::new(1.0, 0.0, 0.0);
        frame.hand = vec![Landmark::new(0.0, 0.0, 0.0); 21];
        frame
    }

    #[test]
    fn test_unit_frame_yields_zero_vector() {
        let extractor = FeatureExtractor::new();
        let frame = unit_frame();
        let features = extractor
            .extract(&frame, Some(&frame), Some(&frame))
            .expect("frame should be valid");

        assert_eq!(features.hand_shape, [0.0; 7]);
        assert_eq!(features.lips, [0.0; 8]);
        // All distances are measured against the origin or the unit edge;
        // with every point at the origin the only nonzero candidates are the
        // distances to face 454, which sit at exactly 1.0.
        for (i, &v) in features.hand_position.iter().enumerate() {
            // Slots 4, 10, 16 hold the distance to face index 454.
            if i % 6 == 4 {
                assert_eq!(v, 1.0, "slot {}", i);
            } else {
                assert_eq!(v, 0.0, "slot {}", i);
            }
        }
        assert!(features.is_valid());
    }

    #[test]
    fn test_first_two_frames_are_invalid() {
        let extractor = FeatureExtractor::new();
        let frame = unit_frame();

        assert!(extractor.extract(&frame, None, None).is_none());
        assert!(extractor.extract(&frame, Some(&frame), None).is_none());
    }

    #[test]
    fn test_degenerate_face_width_is_invalid() {
        let extractor = FeatureExtractor::new();
        let mut frame = unit_frame();
        frame.face[FACE_EDGE_LEFT] = Landmark::new(0.0, 0.0, 0.0);

        assert!(extractor.extract(&frame, Some(&frame), Some(&frame)).is_none());
    }

    #[test]
    fn test_missing_hand_is_invalid() {
        let extractor = FeatureExtractor::new();
        let mut frame = unit_frame();
        frame.hand.clear();

        assert!(extractor.extract(&frame, Some(&frame), Some(&frame)).is_none());
    }

    #[test]
    fn test_non_finite_landmark_is_invalid() {
        let extractor = FeatureExtractor::new();
        let mut frame = unit_frame();
        frame.face[FACE_CHIN] = Landmark::new(f32::NAN, 0.0, 0.0);

        assert!(extractor.extract(&frame, Some(&frame), Some(&frame)).is_none());
    }

    #[test]
    fn test_face_point_ordering_changes_output() {
        let extractor = FeatureExtractor::new();
        let mut frame = unit_frame();
        // Move face 214 away from the origin: exactly the slots measuring
        // against 214 (position 2 within each face group) must change.
        frame.face[214] = Landmark::new(0.0, 0.5, 0.0);

        let features = extractor
            .extract(&frame, Some(&frame), Some(&frame))
            .expect("frame should be valid");
        assert_eq!(features.hand_position[3], 0.5);
        assert_eq!(features.hand_position[9], 0.5);
        assert_eq!(features.hand_position[15], 0.5);
        assert_eq!(features.hand_position[0], 0.0);
    }

    #[test]
    fn test_motion_features_track_lip_velocity() {
        let extractor = FeatureExtractor::new();
        let mut current = unit_frame();
        let prev = unit_frame();
        let prev2 = unit_frame();
        current.face[0] = Landmark::new(0.2, 0.0, 0.0);

        let features = extractor
            .extract(&current, Some(&prev), Some(&prev2))
            .expect("frame should be valid");
        // Velocity appears in slot 4 and, with a static history, the same
        // value appears as acceleration in slot 6.
        assert!((features.lips[4] - 0.2).abs() < 1e-6);
        assert_eq!(features.lips[5], 0.0);
        assert!((features.lips[6] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_identical_inputs_identical_features() {
        let extractor = FeatureExtractor::new();
        let mut frame = unit_frame();
        frame.hand[8] = Landmark::new(0.3, 0.4, 0.0);
        frame.hand[9] = Landmark::new(0.0, 0.1, 0.0);

        let a = extractor.extract(&frame, Some(&frame), Some(&frame)).unwrap();
        let b = extractor.extract(&frame, Some(&frame), Some(&frame)).unwrap();
        assert_eq!(a, b);
    }
}
