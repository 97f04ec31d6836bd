/// `native/math.rs`: vector, matrix, color and collision helpers
///
/// Formulas follow the native library exactly so scripts get the same
/// results they would against a GPU build. Matrices use the native m-index
/// naming; `m12..m14` hold the translation.
use crate::marshal::values::{
    BoundingBox, Camera2D, Camera3D, Color, Matrix, Ray, RayCollision, Rectangle, Vector2, Vector3,
};

const EPSILON: f32 = 0.000_001;

// ── Vector2 ───────────────────────────────────────────────────────────────────

pub fn vector2_add(a: Vector2, b: Vector2) -> Vector2 {
    Vector2::new(a.x + b.x, a.y + b.y)
}

pub fn vector2_subtract(a: Vector2, b: Vector2) -> Vector2 {
    Vector2::new(a.x - b.x, a.y - b.y)
}

pub fn vector2_scale(v: Vector2, scale: f32) -> Vector2 {
    Vector2::new(v.x * scale, v.y * scale)
}

pub fn vector2_length(v: Vector2) -> f32 {
    (v.x * v.x + v.y * v.y).sqrt()
}

pub fn vector2_normalize(v: Vector2) -> Vector2 {
    let len = vector2_length(v);
    if len > 0.0 {
        vector2_scale(v, 1.0 / len)
    } else {
        v
    }
}

pub fn vector2_distance(a: Vector2, b: Vector2) -> f32 {
    vector2_length(vector2_subtract(a, b))
}

// ── Vector3 ───────────────────────────────────────────────────────────────────

pub fn vector3_add(a: Vector3, b: Vector3) -> Vector3 {
    Vector3::new(a.x + b.x, a.y + b.y, a.z + b.z)
}

pub fn vector3_subtract(a: Vector3, b: Vector3) -> Vector3 {
    Vector3::new(a.x - b.x, a.y - b.y, a.z - b.z)
}

pub fn vector3_scale(v: Vector3, scale: f32) -> Vector3 {
    Vector3::new(v.x * scale, v.y * scale, v.z * scale)
}

pub fn vector3_cross_product(a: Vector3, b: Vector3) -> Vector3 {
    Vector3::new(a.y * b.z - a.z * b.y, a.z * b.x - a.x * b.z, a.x * b.y - a.y * b.x)
}

pub fn vector3_dot_product(a: Vector3, b: Vector3) -> f32 {
    a.x * b.x + a.y * b.y + a.z * b.z
}

pub fn vector3_length(v: Vector3) -> f32 {
    vector3_dot_product(v, v).sqrt()
}

pub fn vector3_normalize(v: Vector3) -> Vector3 {
    let len = vector3_length(v);
    if len > 0.0 {
        vector3_scale(v, 1.0 / len)
    } else {
        v
    }
}

pub fn vector3_transform(v: Vector3, m: Matrix) -> Vector3 {
    Vector3::new(
        m.m0 * v.x + m.m4 * v.y + m.m8 * v.z + m.m12,
        m.m1 * v.x + m.m5 * v.y + m.m9 * v.z + m.m13,
        m.m2 * v.x + m.m6 * v.y + m.m10 * v.z + m.m14,
    )
}

// ── Matrix ────────────────────────────────────────────────────────────────────

pub fn matrix_identity() -> Matrix {
    Matrix { m0: 1.0, m5: 1.0, m10: 1.0, m15: 1.0, ..Default::default() }
}

fn to_array(m: &Matrix) -> [f32; 16] {
    [
        m.m0, m.m1, m.m2, m.m3, m.m4, m.m5, m.m6, m.m7, m.m8, m.m9, m.m10, m.m11, m.m12, m.m13,
        m.m14, m.m15,
    ]
}

fn from_array(a: [f32; 16]) -> Matrix {
    Matrix {
        m0: a[0], m1: a[1], m2: a[2], m3: a[3],
        m4: a[4], m5: a[5], m6: a[6], m7: a[7],
        m8: a[8], m9: a[9], m10: a[10], m11: a[11],
        m12: a[12], m13: a[13], m14: a[14], m15: a[15],
    }
}

/// `left * right` in the native convention: applying the result equals
/// applying `left` first, then `right`.
pub fn matrix_multiply(left: Matrix, right: Matrix) -> Matrix {
    let l = to_array(&left);
    let r = to_array(&right);
    let mut out = [0.0f32; 16];
    for col in 0..4 {
        for row in 0..4 {
            out[col * 4 + row] = (0..4).map(|k| l[col * 4 + k] * r[k * 4 + row]).sum();
        }
    }
    from_array(out)
}

pub fn matrix_translate(x: f32, y: f32, z: f32) -> Matrix {
    Matrix { m12: x, m13: y, m14: z, ..matrix_identity() }
}

pub fn matrix_scale(x: f32, y: f32, z: f32) -> Matrix {
    Matrix { m0: x, m5: y, m10: z, m15: 1.0, ..Default::default() }
}

/// Rotation around Z, angle in radians.
pub fn matrix_rotate_z(angle: f32) -> Matrix {
    let (s, c) = angle.sin_cos();
    Matrix { m0: c, m1: s, m4: -s, m5: c, ..matrix_identity() }
}

pub fn matrix_look_at(eye: Vector3, target: Vector3, up: Vector3) -> Matrix {
    let vz = vector3_normalize(vector3_subtract(eye, target));
    let vx = vector3_normalize(vector3_cross_product(up, vz));
    let vy = vector3_cross_product(vz, vx);
    Matrix {
        m0: vx.x, m1: vy.x, m2: vz.x, m3: 0.0,
        m4: vx.y, m5: vy.y, m6: vz.y, m7: 0.0,
        m8: vx.z, m9: vy.z, m10: vz.z, m11: 0.0,
        m12: -vector3_dot_product(vx, eye),
        m13: -vector3_dot_product(vy, eye),
        m14: -vector3_dot_product(vz, eye),
        m15: 1.0,
    }
}

// ── Cameras ───────────────────────────────────────────────────────────────────

pub fn get_camera_matrix(camera: &Camera3D) -> Matrix {
    matrix_look_at(camera.position, camera.target, camera.up)
}

/// World to screen transform for a 2D camera: translate by -target, scale
/// by zoom, rotate, then translate by offset.
pub fn get_camera_matrix_2d(camera: &Camera2D) -> Matrix {
    let origin = matrix_translate(-camera.target.x, -camera.target.y, 0.0);
    let rotation = matrix_rotate_z(camera.rotation.to_radians());
    let scale = matrix_scale(camera.zoom, camera.zoom, 1.0);
    let translation = matrix_translate(camera.offset.x, camera.offset.y, 0.0);
    matrix_multiply(matrix_multiply(origin, matrix_multiply(scale, rotation)), translation)
}

pub fn get_world_to_screen_2d(position: Vector2, camera: &Camera2D) -> Vector2 {
    let m = get_camera_matrix_2d(camera);
    let v = vector3_transform(Vector3::new(position.x, position.y, 0.0), m);
    Vector2::new(v.x, v.y)
}

// ── Colors ────────────────────────────────────────────────────────────────────

pub fn fade(color: Color, alpha: f32) -> Color {
    let alpha = alpha.clamp(0.0, 1.0);
    Color { a: (255.0 * alpha) as u8, ..color }
}

pub fn color_to_int(color: Color) -> i32 {
    (((color.r as u32) << 24) | ((color.g as u32) << 16) | ((color.b as u32) << 8) | color.a as u32)
        as i32
}

pub fn get_color(hex: u32) -> Color {
    Color::new((hex >> 24) as u8, (hex >> 16) as u8, (hex >> 8) as u8, hex as u8)
}

/// Hue in degrees, saturation and value in `0..=1`.
pub fn color_from_hsv(hue: f32, saturation: f32, value: f32) -> Color {
    let channel = |n: f32| {
        let k = (n + hue / 60.0) % 6.0;
        let k = (4.0 - k).min(k).clamp(0.0, 1.0);
        ((value - value * saturation * k) * 255.0) as u8
    };
    Color::new(channel(5.0), channel(3.0), channel(1.0), 255)
}

/// Returns `(hue, saturation, value)` as a Vector3.
pub fn color_to_hsv(color: Color) -> Vector3 {
    let r = color.r as f32 / 255.0;
    let g = color.g as f32 / 255.0;
    let b = color.b as f32 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    if delta < 0.000_01 || max <= 0.0 {
        return Vector3::new(0.0, 0.0, max);
    }
    let saturation = delta / max;
    let sector = if r >= max {
        (g - b) / delta
    } else if g >= max {
        2.0 + (b - r) / delta
    } else {
        4.0 + (r - g) / delta
    };
    let mut hue = sector * 60.0;
    if hue < 0.0 {
        hue += 360.0;
    }
    Vector3::new(hue, saturation, max)
}

// ── Collisions ────────────────────────────────────────────────────────────────

pub fn check_collision_recs(a: Rectangle, b: Rectangle) -> bool {
    a.x < b.x + b.width && a.x + a.width > b.x && a.y < b.y + b.height && a.y + a.height > b.y
}

/// Overlap of two rectangles; zero-sized when they do not collide.
pub fn get_collision_rec(a: Rectangle, b: Rectangle) -> Rectangle {
    let left = a.x.max(b.x);
    let right = (a.x + a.width).min(b.x + b.width);
    let top = a.y.max(b.y);
    let bottom = (a.y + a.height).min(b.y + b.height);
    if left < right && top < bottom {
        Rectangle::new(left, top, right - left, bottom - top)
    } else {
        Rectangle::default()
    }
}

pub fn check_collision_point_rec(point: Vector2, rec: Rectangle) -> bool {
    point.x >= rec.x && point.x < rec.x + rec.width && point.y >= rec.y && point.y < rec.y + rec.height
}

pub fn check_collision_circles(c1: Vector2, r1: f32, c2: Vector2, r2: f32) -> bool {
    let dx = c2.x - c1.x;
    let dy = c2.y - c1.y;
    dx * dx + dy * dy <= (r1 + r2) * (r1 + r2)
}

/// Even-odd rule; fewer than three points never contain anything.
pub fn check_collision_point_poly(point: Vector2, points: &[Vector2]) -> bool {
    if points.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        let (pi, pj) = (points[i], points[j]);
        if (pi.y > point.y) != (pj.y > point.y)
            && point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

pub fn check_collision_boxes(a: BoundingBox, b: BoundingBox) -> bool {
    a.max.x >= b.min.x
        && a.min.x <= b.max.x
        && a.max.y >= b.min.y
        && a.min.y <= b.max.y
        && a.max.z >= b.min.z
        && a.min.z <= b.max.z
}

pub fn get_ray_collision_sphere(ray: Ray, center: Vector3, radius: f32) -> RayCollision {
    let ray_sphere = vector3_subtract(center, ray.position);
    let vector = vector3_dot_product(ray_sphere, ray.direction);
    let distance = vector3_length(ray_sphere);
    let d = radius * radius - (distance * distance - vector * vector);
    if d < 0.0 {
        return RayCollision::default();
    }

    let inside = distance < radius;
    let distance = if inside { vector + d.sqrt() } else { vector - d.sqrt() };
    if distance < 0.0 {
        return RayCollision::default();
    }
    let point = vector3_add(ray.position, vector3_scale(ray.direction, distance));
    let mut normal = vector3_normalize(vector3_subtract(point, center));
    if inside {
        normal = vector3_scale(normal, -1.0);
    }
    RayCollision { hit: true, distance, point, normal }
}

/// Slab test against an axis-aligned box.
pub fn get_ray_collision_box(ray: Ray, bbox: BoundingBox) -> RayCollision {
    let origin = [ray.position.x, ray.position.y, ray.position.z];
    let dir = [ray.direction.x, ray.direction.y, ray.direction.z];
    let min = [bbox.min.x, bbox.min.y, bbox.min.z];
    let max = [bbox.max.x, bbox.max.y, bbox.max.z];

    let mut t_near = f32::NEG_INFINITY;
    let mut t_far = f32::INFINITY;
    let mut near_axis = 0usize;
    let mut near_sign = 0.0f32;

    for axis in 0..3 {
        if dir[axis].abs() < EPSILON {
            if origin[axis] < min[axis] || origin[axis] > max[axis] {
                return RayCollision::default();
            }
            continue;
        }
        let inv = 1.0 / dir[axis];
        let mut t0 = (min[axis] - origin[axis]) * inv;
        let mut t1 = (max[axis] - origin[axis]) * inv;
        let mut sign = -1.0;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
            sign = 1.0;
        }
        if t0 > t_near {
            t_near = t0;
            near_axis = axis;
            near_sign = sign;
        }
        t_far = t_far.min(t1);
        if t_near > t_far {
            return RayCollision::default();
        }
    }

    // Origin inside the box: report the exit point.
    let (distance, axis, sign) = if t_near < 0.0 {
        if t_far < 0.0 {
            return RayCollision::default();
        }
        let axis = (0..3)
            .filter(|&a| dir[a].abs() >= EPSILON)
            .min_by(|&a, &b| {
                let ta = exit_t(origin[a], dir[a], min[a], max[a]);
                let tb = exit_t(origin[b], dir[b], min[b], max[b]);
                ta.total_cmp(&tb)
            })
            .unwrap_or(0);
        (t_far, axis, -dir[axis].signum())
    } else {
        (t_near, near_axis, near_sign)
    };

    let point = vector3_add(ray.position, vector3_scale(ray.direction, distance));
    let mut normal = [0.0f32; 3];
    normal[axis] = sign;
    RayCollision {
        hit: true,
        distance,
        point,
        normal: Vector3::new(normal[0], normal[1], normal[2]),
    }
}

fn exit_t(origin: f32, dir: f32, min: f32, max: f32) -> f32 {
    let t0 = (min - origin) / dir;
    let t1 = (max - origin) / dir;
    t0.max(t1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn multiply_applies_left_then_right() {
        let m = matrix_multiply(matrix_scale(2.0, 2.0, 2.0), matrix_translate(1.0, 0.0, 0.0));
        let v = vector3_transform(Vector3::new(1.0, 1.0, 1.0), m);
        assert_eq!(v, Vector3::new(3.0, 2.0, 2.0));

        let id = matrix_identity();
        assert_eq!(matrix_multiply(id, m), m);
    }

    #[test]
    fn look_at_moves_eye_to_origin() {
        let eye = Vector3::new(0.0, 0.0, 5.0);
        let m = matrix_look_at(eye, Vector3::default(), Vector3::new(0.0, 1.0, 0.0));
        let v = vector3_transform(eye, m);
        assert!(close(v.x, 0.0) && close(v.y, 0.0) && close(v.z, 0.0), "{v:?}");
    }

    #[test]
    fn camera_2d_maps_target_to_offset() {
        let cam = Camera2D {
            offset: Vector2::new(400.0, 300.0),
            target: Vector2::new(10.0, 20.0),
            rotation: 45.0,
            zoom: 2.0,
        };
        let p = get_world_to_screen_2d(cam.target, &cam);
        assert!(close(p.x, 400.0) && close(p.y, 300.0), "{p:?}");
        let q = get_world_to_screen_2d(Vector2::new(11.0, 20.0), &Camera2D { rotation: 0.0, ..cam });
        assert!(close(q.x, 402.0) && close(q.y, 300.0), "{q:?}");
    }

    #[test]
    fn colors_convert() {
        assert_eq!(color_to_int(Color::new(255, 0, 0, 255)), 0xFF0000FFu32 as i32);
        assert_eq!(get_color(0xFF0000FF), Color::new(255, 0, 0, 255));
        assert_eq!(fade(Color::WHITE, 0.5).a, 127);
        assert_eq!(color_from_hsv(120.0, 1.0, 1.0), Color::new(0, 255, 0, 255));
        let hsv = color_to_hsv(Color::new(0, 0, 255, 255));
        assert!(close(hsv.x, 240.0) && close(hsv.y, 1.0) && close(hsv.z, 1.0), "{hsv:?}");
    }

    #[test]
    fn rectangles_collide() {
        let a = Rectangle::new(0.0, 0.0, 10.0, 10.0);
        let b = Rectangle::new(5.0, 5.0, 10.0, 10.0);
        assert!(check_collision_recs(a, b));
        assert_eq!(get_collision_rec(a, b), Rectangle::new(5.0, 5.0, 5.0, 5.0));
        let far = Rectangle::new(20.0, 20.0, 1.0, 1.0);
        assert!(!check_collision_recs(a, far));
        assert_eq!(get_collision_rec(a, far), Rectangle::default());
        assert!(check_collision_point_rec(Vector2::new(0.0, 9.9), a));
        assert!(!check_collision_point_rec(Vector2::new(10.0, 5.0), a));
    }

    #[test]
    fn point_in_polygon() {
        let square = [
            Vector2::new(0.0, 0.0),
            Vector2::new(4.0, 0.0),
            Vector2::new(4.0, 4.0),
            Vector2::new(0.0, 4.0),
        ];
        assert!(check_collision_point_poly(Vector2::new(2.0, 2.0), &square));
        assert!(!check_collision_point_poly(Vector2::new(5.0, 2.0), &square));
        assert!(!check_collision_point_poly(Vector2::new(1.0, 1.0), &square[..2]));
    }

    #[test]
    fn ray_hits_box_face() {
        let bbox = BoundingBox { min: Vector3::new(-1.0, -1.0, -1.0), max: Vector3::new(1.0, 1.0, 1.0) };
        let ray = Ray { position: Vector3::new(0.0, 0.0, 5.0), direction: Vector3::new(0.0, 0.0, -1.0) };
        let hit = get_ray_collision_box(ray, bbox);
        assert!(hit.hit);
        assert!(close(hit.distance, 4.0));
        assert_eq!(hit.normal, Vector3::new(0.0, 0.0, 1.0));

        let miss = Ray { position: Vector3::new(3.0, 0.0, 5.0), ..ray };
        assert!(!get_ray_collision_box(miss, bbox).hit);

        let inside = Ray { position: Vector3::default(), ..ray };
        let exit = get_ray_collision_box(inside, bbox);
        assert!(exit.hit && close(exit.distance, 1.0), "{exit:?}");
    }

    #[test]
    fn ray_hits_sphere() {
        let ray = Ray { position: Vector3::new(0.0, 0.0, -5.0), direction: Vector3::new(0.0, 0.0, 1.0) };
        let hit = get_ray_collision_sphere(ray, Vector3::default(), 1.0);
        assert!(hit.hit && close(hit.distance, 4.0));
        assert!(close(hit.normal.z, -1.0));
        assert!(!get_ray_collision_sphere(ray, Vector3::new(5.0, 0.0, 0.0), 1.0).hit);
    }
}
