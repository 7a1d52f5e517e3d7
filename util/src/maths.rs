//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Clamp a value into the range `[min, max]`.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T
where
    T: Float
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// This function is taken from the std library as num is missing it.
///
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()`, violating the mathematical definition, if
/// `self` is much smaller than `rhs.abs()` in magnitude and `self < 0.0`.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}

/// Normalise an angle into the range (-pi, pi].
///
/// Angles already inside the range are returned untouched so that exact values (like pi/2) stay
/// exact.
pub fn norm_angle<T>(value: T) -> T
where
    T: Float
{
    let pi_t: T = T::from(std::f64::consts::PI).unwrap();
    let tau_t: T = T::from(std::f64::consts::TAU).unwrap();

    if value > -pi_t && value <= pi_t {
        return value;
    }

    let mut r = rem_euclid(value + pi_t, tau_t) - pi_t;

    if r <= -pi_t {
        r = r + tau_t;
    }
    if r > pi_t {
        r = r - tau_t;
    }

    r
}

/// Map an angle onto the range [0, 2pi).
pub fn wrap_2pi<T>(value: T) -> T
where
    T: Float
{
    let tau_t: T = T::from(std::f64::consts::TAU).unwrap();

    let r = rem_euclid(value, tau_t);

    // Round-off can put us exactly on tau
    if r >= tau_t {
        T::zero()
    }
    else {
        r
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const PI: f64 = std::f64::consts::PI;
    const TAU: f64 = std::f64::consts::TAU;

    #[test]
    fn test_norm_angle() {
        assert_eq!(norm_angle(0f64), 0f64);
        assert_eq!(norm_angle(PI), PI);
        assert_eq!(norm_angle(-PI), PI);
        assert_eq!(norm_angle(PI / 2.0), PI / 2.0);
        assert!((norm_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
        assert!((norm_angle(-3.0 * PI / 2.0) - PI / 2.0).abs() < 1e-12);
        assert!((norm_angle(5.0 * TAU + 0.25) - 0.25).abs() < 1e-9);

        // Sweep a wide range of angles and check the invariant holds
        let mut a = -50.0;
        while a < 50.0 {
            let n = norm_angle(a);
            assert!(n > -PI && n <= PI, "norm_angle({}) = {}", a, n);
            a += 0.0137;
        }
    }

    #[test]
    fn test_wrap_2pi() {
        assert_eq!(wrap_2pi(0f64), 0f64);
        assert_eq!(wrap_2pi(TAU), 0f64);
        assert!((wrap_2pi(-PI / 2.0) - 3.0 * PI / 2.0).abs() < 1e-12);
        assert!((wrap_2pi(TAU + 1.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(&5.0, &-1.0, &1.0), 1.0);
        assert_eq!(clamp(&-5.0, &-1.0, &1.0), -1.0);
        assert_eq!(clamp(&0.5, &-1.0, &1.0), 0.5);
    }
}
