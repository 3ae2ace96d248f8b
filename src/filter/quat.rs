use nalgebra::{Quaternion, UnitQuaternion, Vector3};

/// `q` の符号を反転したもの（同じ回転を表す）
pub fn negate(q: &UnitQuaternion<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::new_unchecked(-q.into_inner())
}

/// `reference` に近い方の符号 (q / -q) を返す
///
/// q と -q は同じ回転だが、フィルタ内で平均を取ると符号の
/// 跳びが180度相当のジャンプになるため、挿入前に揃える。
pub fn flip_quat_sign_to_match(
    reference: &UnitQuaternion<f64>,
    q: &UnitQuaternion<f64>,
) -> UnitQuaternion<f64> {
    if reference.coords.dot(&q.coords) < 0.0 {
        negate(q)
    } else {
        *q
    }
}

/// w >= 0 に正規化（初期基準用。符号自体に意味はない）
pub fn with_nonnegative_w(q: &UnitQuaternion<f64>) -> UnitQuaternion<f64> {
    if q.w >= 0.0 {
        *q
    } else {
        negate(q)
    }
}

/// Yaw about the vertical (+Y, gravity-aligned) axis, in radians.
pub fn extract_yaw(q: &UnitQuaternion<f64>) -> f64 {
    let r = q.to_rotation_matrix();
    r[(0, 2)].atan2(r[(2, 2)])
}

/// Pure rotation about the vertical axis.
pub fn yaw_rotation(yaw: f64) -> UnitQuaternion<f64> {
    UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw)
}

pub fn is_finite_quat(q: &Quaternion<f64>) -> bool {
    q.coords.iter().all(|c| c.is_finite())
}

pub fn is_finite_vector(v: &Vector3<f64>) -> bool {
    v.iter().all(|c| c.is_finite())
}
