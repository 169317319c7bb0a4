//! Fixed-point math utilities for deterministic simulation.
//!
//! All formation and territory math uses fixed-point arithmetic to ensure
//! deterministic behavior across platforms. Floating-point
//! operations can produce different results on different CPUs.
//!
//! World points are [`Vec3Fixed`] with `y` pointing up; the horizontal
//! plane is `x`/`z`.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// Range: approximately -2,147,483,648 to 2,147,483,647
/// Precision: approximately 0.00000000023
pub type Fixed = I32F32;

/// π as a fixed-point constant.
pub const PI: Fixed = Fixed::from_bits(13_493_037_705);

/// π / 2 as a fixed-point constant.
pub const FRAC_PI_2: Fixed = Fixed::from_bits(6_746_518_852);

/// 2π as a fixed-point constant.
pub const TAU: Fixed = Fixed::from_bits(26_986_075_409);

/// Fixed-point 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Fixed-point 3D vector (`y` up).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec3Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate (height).
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
    /// Z coordinate.
    #[serde(with = "fixed_serde")]
    pub z: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for hand-authored fixed-point values.
///
/// Config files spell fixed-point numbers as decimal strings (`"0.5"`),
/// which parse exactly without passing through a float.
pub mod fixed_decimal_serde {
    use super::Fixed;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a fixed-point number as a decimal string.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    /// Deserialize a fixed-point number from a decimal string.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.trim()
            .parse::<Fixed>()
            .map_err(|e| D::Error::custom(format!("invalid fixed-point value '{text}': {e}")))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x * other.x + self.y * other.y
    }
}

impl Vec3Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed, z: Fixed) -> Self {
        Self { x, y, z }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
        z: Fixed::ZERO,
    };

    /// World forward (+z).
    pub const FORWARD: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
        z: Fixed::ONE,
    };

    /// World right (+x).
    pub const RIGHT: Self = Self {
        x: Fixed::ONE,
        y: Fixed::ZERO,
        z: Fixed::ZERO,
    };

    /// Create a point on the ground plane.
    #[must_use]
    pub const fn flat(x: Fixed, z: Fixed) -> Self {
        Self { x, y: Fixed::ZERO, z }
    }

    /// Project onto the horizontal plane as a 2D vector (`x`, `z`).
    #[must_use]
    pub const fn horizontal(self) -> Vec2Fixed {
        Vec2Fixed::new(self.x, self.z)
    }

    /// Copy of this vector with a different height.
    #[must_use]
    pub const fn with_y(self, y: Fixed) -> Self {
        Self { x: self.x, y, z: self.z }
    }

    /// Squared distance in 3D space.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let d = self - other;
        d.dot(d)
    }

    /// Squared distance ignoring height.
    #[must_use]
    pub fn horizontal_distance_squared(self, other: Self) -> Fixed {
        self.horizontal().distance_squared(other.horizontal())
    }

    /// Distance ignoring height.
    #[must_use]
    pub fn horizontal_distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.horizontal_distance_squared(other))
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Multiply every component by a scalar.
    #[must_use]
    pub fn scale(self, factor: Fixed) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }

    /// Normalized horizontal direction of this vector.
    ///
    /// The height component is dropped. A zero-length input yields
    /// [`Vec3Fixed::FORWARD`].
    #[must_use]
    pub fn horizontal_direction(self) -> Self {
        let len_sq = self.x * self.x + self.z * self.z;
        if len_sq == Fixed::ZERO {
            return Self::FORWARD;
        }

        let len = fixed_sqrt(len_sq);
        if len == Fixed::ZERO {
            return Self::FORWARD;
        }

        Self::new(self.x / len, Fixed::ZERO, self.z / len)
    }

    /// Right-hand perpendicular of a horizontal direction (`up × self`).
    #[must_use]
    pub fn right(self) -> Self {
        Self::new(self.z, Fixed::ZERO, -self.x)
    }

    /// Rotate around the vertical axis by `angle` radians.
    ///
    /// Positive angles turn `+x` towards `+z`.
    #[must_use]
    pub fn rotate_y(self, angle: Fixed) -> Self {
        let (sin, cos) = sin_cos(angle);
        Self::new(
            self.x * cos - self.z * sin,
            self.y,
            self.x * sin + self.z * cos,
        )
    }

    /// Arithmetic mean of a set of points; zero for an empty set.
    #[must_use]
    pub fn centroid(points: impl IntoIterator<Item = Self>) -> Self {
        let mut sum = Self::ZERO;
        let mut count = 0i32;
        for point in points {
            sum = sum + point;
            count += 1;
        }

        if count == 0 {
            return Self::ZERO;
        }

        let divisor = Fixed::from_num(count);
        Self::new(sum.x / divisor, sum.y / divisor, sum.z / divisor)
    }
}

/// Computes the square root of a fixed-point number using binary search.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    // Exclusive upper bound, so exact roots such as sqrt(1) are reachable.
    let upper = if value > Fixed::ONE { value } else { Fixed::ONE };
    let mut high = upper.saturating_add(Fixed::DELTA);

    for _ in 0..64 {
        let mid = low + (high - low) / Fixed::const_from_int(2);
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

/// Deterministic sine and cosine of `angle` (radians).
///
/// The angle is reduced to `[-π/2, π/2]` and evaluated with a truncated
/// Taylor series; the absolute error stays below `1e-7`.
#[must_use]
pub fn sin_cos(angle: Fixed) -> (Fixed, Fixed) {
    let mut a = angle;
    while a > PI {
        a -= TAU;
    }
    while a < -PI {
        a += TAU;
    }

    // sin(π - a) = sin(a), cos(π - a) = -cos(a)
    let (reduced, cos_sign) = if a > FRAC_PI_2 {
        (PI - a, -Fixed::ONE)
    } else if a < -FRAC_PI_2 {
        (-PI - a, -Fixed::ONE)
    } else {
        (a, Fixed::ONE)
    };

    (taylor_sin(reduced), taylor_cos(reduced) * cos_sign)
}

fn taylor_sin(x: Fixed) -> Fixed {
    let x2 = x * x;
    let mut term = x;
    let mut sum = x;
    // term_{n+1} = -term_n * x² / ((2n+2)(2n+3))
    for n in 1..=6i32 {
        let denom = Fixed::from_num((2 * n) * (2 * n + 1));
        term = -(term * x2) / denom;
        sum += term;
    }
    sum
}

fn taylor_cos(x: Fixed) -> Fixed {
    let x2 = x * x;
    let mut term = Fixed::ONE;
    let mut sum = Fixed::ONE;
    for n in 1..=7i32 {
        let denom = Fixed::from_num((2 * n - 1) * (2 * n));
        term = -(term * x2) / denom;
        sum += term;
    }
    sum
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Add for Vec3Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl std::ops::Sub for Vec3Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

impl std::ops::Neg for Vec3Fixed {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y, -self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn close(a: Fixed, b: Fixed) -> bool {
        (a - b).abs() < Fixed::ONE / fixed(1_000_000)
    }

    #[test]
    fn test_vec2_distance_squared() {
        let a = Vec2Fixed::new(fixed(3), fixed(0));
        let b = Vec2Fixed::new(fixed(0), fixed(4));
        // 3² + 4² = 25
        assert_eq!(a.distance_squared(b), fixed(25));
    }

    #[test]
    fn test_fixed_determinism() {
        let a = Fixed::ONE / fixed(3);
        let b = Fixed::ONE / fixed(3);
        assert_eq!(a, b);
        assert_eq!(sin_cos(a), sin_cos(b));
    }

    #[test]
    fn test_constants_match_reference_values() {
        assert!(close(PI, Fixed::from_num(std::f64::consts::PI)));
        assert!(close(TAU, Fixed::from_num(std::f64::consts::TAU)));
        assert!(close(FRAC_PI_2, Fixed::from_num(std::f64::consts::FRAC_PI_2)));
    }

    #[test]
    fn test_sin_cos_cardinal_angles() {
        let (s, c) = sin_cos(Fixed::ZERO);
        assert!(close(s, Fixed::ZERO));
        assert!(close(c, Fixed::ONE));

        let (s, c) = sin_cos(FRAC_PI_2);
        assert!(close(s, Fixed::ONE));
        assert!(close(c, Fixed::ZERO));

        let (s, c) = sin_cos(PI);
        assert!(close(s, Fixed::ZERO));
        assert!(close(c, -Fixed::ONE));

        let (s, c) = sin_cos(PI + FRAC_PI_2);
        assert!(close(s, -Fixed::ONE));
        assert!(close(c, Fixed::ZERO));
    }

    #[test]
    fn test_sin_cos_matches_float_reference() {
        for step in 0..72 {
            let radians = std::f64::consts::TAU * f64::from(step) / 72.0;
            let (s, c) = sin_cos(Fixed::from_num(radians));
            assert!(close(s, Fixed::from_num(radians.sin())), "sin at step {step}");
            assert!(close(c, Fixed::from_num(radians.cos())), "cos at step {step}");
        }
    }

    #[test]
    fn test_fixed_sqrt() {
        assert_eq!(fixed_sqrt(fixed(25)), fixed(5));
        assert_eq!(fixed_sqrt(Fixed::ONE), Fixed::ONE);
        assert_eq!(fixed_sqrt(-Fixed::ONE), Fixed::ZERO);
        assert!(close(fixed_sqrt(fixed(2)), Fixed::from_num(std::f64::consts::SQRT_2)));
    }

    #[test]
    fn test_horizontal_direction_and_right() {
        let dir = Vec3Fixed::new(fixed(0), fixed(7), fixed(5)).horizontal_direction();
        assert_eq!(dir, Vec3Fixed::FORWARD);
        assert_eq!(dir.right(), Vec3Fixed::RIGHT);

        let zero = Vec3Fixed::ZERO.horizontal_direction();
        assert_eq!(zero, Vec3Fixed::FORWARD);
    }

    #[test]
    fn test_rotate_y_quarter_turn() {
        let rotated = Vec3Fixed::RIGHT.rotate_y(FRAC_PI_2);
        assert!(close(rotated.x, Fixed::ZERO));
        assert!(close(rotated.z, Fixed::ONE));
    }

    #[test]
    fn test_centroid() {
        let points = [
            Vec3Fixed::flat(fixed(0), fixed(0)),
            Vec3Fixed::flat(fixed(4), fixed(0)),
            Vec3Fixed::flat(fixed(2), fixed(6)),
        ];
        assert_eq!(Vec3Fixed::centroid(points), Vec3Fixed::flat(fixed(2), fixed(2)));
        assert_eq!(Vec3Fixed::centroid(Vec::new()), Vec3Fixed::ZERO);
    }
}
