//! Mounting-orientation codes and rotation matrices
//!
//! Sensors and the autopilot board itself can be mounted in any of a set of
//! canonical orientations. Each orientation is identified by a small integer
//! code (stored in parameters such as `SENS_BOARD_ROT` and `CAL_MAG<i>_ROT`)
//! and maps to a fixed roll/pitch/yaw triple in degrees.
//!
//! The engine composes these with a fine-tuning euler offset to rotate every
//! raw sensor vector into the body frame.

use nalgebra::{Matrix3, Rotation3};

/// Canonical mounting orientations.
///
/// The discriminants are contractual: they are the values stored in the
/// rotation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Rotation {
    None = 0,
    Yaw45 = 1,
    Yaw90 = 2,
    Yaw135 = 3,
    Yaw180 = 4,
    Yaw225 = 5,
    Yaw270 = 6,
    Yaw315 = 7,
    Roll180 = 8,
    Roll180Yaw45 = 9,
    Roll180Yaw90 = 10,
    Roll180Yaw135 = 11,
    Pitch180 = 12,
    Roll180Yaw225 = 13,
    Roll180Yaw270 = 14,
    Roll180Yaw315 = 15,
    Roll90 = 16,
    Roll90Yaw45 = 17,
    Roll90Yaw90 = 18,
    Roll90Yaw135 = 19,
    Roll270 = 20,
    Roll270Yaw45 = 21,
    Roll270Yaw90 = 22,
    Roll270Yaw135 = 23,
    Pitch90 = 24,
    Pitch270 = 25,
}

/// (roll, pitch, yaw) in degrees for each orientation code, indexed by
/// discriminant.
const ROTATION_TABLE: [(f32, f32, f32); 26] = [
    (0.0, 0.0, 0.0),
    (0.0, 0.0, 45.0),
    (0.0, 0.0, 90.0),
    (0.0, 0.0, 135.0),
    (0.0, 0.0, 180.0),
    (0.0, 0.0, 225.0),
    (0.0, 0.0, 270.0),
    (0.0, 0.0, 315.0),
    (180.0, 0.0, 0.0),
    (180.0, 0.0, 45.0),
    (180.0, 0.0, 90.0),
    (180.0, 0.0, 135.0),
    (0.0, 180.0, 0.0),
    (180.0, 0.0, 225.0),
    (180.0, 0.0, 270.0),
    (180.0, 0.0, 315.0),
    (90.0, 0.0, 0.0),
    (90.0, 0.0, 45.0),
    (90.0, 0.0, 90.0),
    (90.0, 0.0, 135.0),
    (270.0, 0.0, 0.0),
    (270.0, 0.0, 45.0),
    (270.0, 0.0, 90.0),
    (270.0, 0.0, 135.0),
    (0.0, 90.0, 0.0),
    (0.0, 270.0, 0.0),
];

impl Rotation {
    /// Maximum valid orientation code.
    pub const MAX_CODE: i32 = 25;

    /// Looks up an orientation by its parameter value.
    pub fn try_from_i32(code: i32) -> Option<Self> {
        use Rotation::*;
        Some(match code {
            0 => None,
            1 => Yaw45,
            2 => Yaw90,
            3 => Yaw135,
            4 => Yaw180,
            5 => Yaw225,
            6 => Yaw270,
            7 => Yaw315,
            8 => Roll180,
            9 => Roll180Yaw45,
            10 => Roll180Yaw90,
            11 => Roll180Yaw135,
            12 => Pitch180,
            13 => Roll180Yaw225,
            14 => Roll180Yaw270,
            15 => Roll180Yaw315,
            16 => Roll90,
            17 => Roll90Yaw45,
            18 => Roll90Yaw90,
            19 => Roll90Yaw135,
            20 => Roll270,
            21 => Roll270Yaw45,
            22 => Roll270Yaw90,
            23 => Roll270Yaw135,
            24 => Pitch90,
            25 => Pitch270,
            _ => return Option::None,
        })
    }

    /// Returns the (roll, pitch, yaw) triple of this orientation in degrees.
    pub fn euler_deg(self) -> (f32, f32, f32) {
        ROTATION_TABLE[self as usize]
    }
}

/// Builds a rotation matrix from euler angles given in degrees.
///
/// Angles follow the aerospace convention: roll about x, then pitch about y,
/// then yaw about z.
pub fn matrix_from_euler_deg(roll_deg: f32, pitch_deg: f32, yaw_deg: f32) -> Matrix3<f32> {
    Rotation3::from_euler_angles(
        roll_deg.to_radians(),
        pitch_deg.to_radians(),
        yaw_deg.to_radians(),
    )
    .into_inner()
}

/// Returns the rotation matrix for an enumerated orientation code.
pub fn rotation_matrix(rotation: Rotation) -> Matrix3<f32> {
    let (roll, pitch, yaw) = rotation.euler_deg();
    matrix_from_euler_deg(roll, pitch, yaw)
}
