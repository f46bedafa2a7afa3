use crate::domain::{CropKeyframe, Rect};

/// Interpolate a crop rectangle at `t` from an ordered list of keyframes,
/// per §4.3's rule: Catmull-Rom spline for four or more keyframes, linear
/// otherwise, clamped at the endpoints.
///
/// `keyframes` must be sorted by `source_time` and non-empty; callers
/// enforce this at `submit` via `ExportParams::validate`.
pub fn interpolate_crop(keyframes: &[CropKeyframe], t: f64) -> Rect {
    debug_assert!(!keyframes.is_empty(), "validated params always carry at least one crop keyframe");
    if keyframes.len() == 1 {
        return keyframes[0].rect;
    }
    if t <= keyframes[0].source_time {
        return keyframes[0].rect;
    }
    if t >= keyframes[keyframes.len() - 1].source_time {
        return keyframes[keyframes.len() - 1].rect;
    }

    let i = match keyframes.partition_point(|k| k.source_time <= t) {
        0 => 0,
        n => n - 1,
    };
    let span = keyframes[i + 1].source_time - keyframes[i].source_time;
    let local_t = if span > 0.0 { (t - keyframes[i].source_time) / span } else { 0.0 };

    if keyframes.len() >= 4 {
        catmull_rom(keyframes, i, local_t)
    } else {
        lerp_rect(keyframes[i].rect, keyframes[i + 1].rect, local_t)
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn lerp_rect(a: Rect, b: Rect, t: f64) -> Rect {
    Rect {
        x: lerp(a.x, b.x, t),
        y: lerp(a.y, b.y, t),
        width: lerp(a.width, b.width, t),
        height: lerp(a.height, b.height, t),
    }
}

/// Catmull-Rom spline through `keyframes[i]..keyframes[i+1]`, using the
/// neighbors on either side (clamped to the array bounds) as control
/// points.
fn catmull_rom(keyframes: &[CropKeyframe], i: usize, t: f64) -> Rect {
    let p0 = keyframes[i.saturating_sub(1)].rect;
    let p1 = keyframes[i].rect;
    let p2 = keyframes[(i + 1).min(keyframes.len() - 1)].rect;
    let p3 = keyframes[(i + 2).min(keyframes.len() - 1)].rect;

    Rect {
        x: catmull_rom_scalar(p0.x, p1.x, p2.x, p3.x, t),
        y: catmull_rom_scalar(p0.y, p1.y, p2.y, p3.y, t),
        width: catmull_rom_scalar(p0.width, p1.width, p2.width, p3.width, t),
        height: catmull_rom_scalar(p0.height, p1.height, p2.height, p3.height, t),
    }
}

fn catmull_rom_scalar(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * ((2.0 * p1)
        + (-p0 + p2) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (-p0 + 3.0 * p1 - 3.0 * p2 + p3) * t3)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kf(t: f64, x: f64) -> CropKeyframe {
        CropKeyframe { source_time: t, rect: Rect { x, y: 0.0, width: 100.0, height: 100.0 } }
    }

    #[test]
    fn single_keyframe_is_constant() {
        let keyframes = vec![kf(0.0, 10.0)];
        assert_eq!(interpolate_crop(&keyframes, 5.0).x, 10.0);
    }

    #[test]
    fn clamps_before_first_and_after_last() {
        let keyframes = vec![kf(1.0, 10.0), kf(2.0, 20.0)];
        assert_eq!(interpolate_crop(&keyframes, 0.0).x, 10.0);
        assert_eq!(interpolate_crop(&keyframes, 3.0).x, 20.0);
    }

    #[test]
    fn two_keyframes_interpolate_linearly() {
        let keyframes = vec![kf(0.0, 0.0), kf(10.0, 100.0)];
        let mid = interpolate_crop(&keyframes, 5.0);
        assert!((mid.x - 50.0).abs() < 1e-9);
    }

    #[test]
    fn four_keyframes_pass_through_each_point() {
        let keyframes = vec![kf(0.0, 0.0), kf(1.0, 10.0), kf(2.0, 20.0), kf(3.0, 5.0)];
        for k in &keyframes {
            let got = interpolate_crop(&keyframes, k.source_time);
            assert!((got.x - k.rect.x).abs() < 1e-6);
        }
    }
}
