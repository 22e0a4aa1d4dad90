//! Angle arithmetic shared by the integrator, detector, and layout.

/// Degrees in a full turn.
pub const FULL_TURN: f64 = 360.0;

/// Wrap an angle into `[0, 360)`.
///
/// Unlike `%`, the result is never negative. `rem_euclid` can round up to
/// exactly `360.0` for tiny negative inputs, which is folded back to zero.
pub fn wrap_deg(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(FULL_TURN);
    if wrapped >= FULL_TURN {
        0.0
    } else {
        wrapped
    }
}

/// Wrap the magnitude of an angle into `[0, 360)` and reapply `sign`.
///
/// The result lies in `(-360, 360)`.
pub fn wrap_signed_deg(magnitude: f64, sign: f64) -> f64 {
    sign.signum() * wrap_deg(magnitude.abs())
}

/// Shortest angular distance between two angles, in `[0, 180]`.
pub fn separation_deg(a: f64, b: f64) -> f64 {
    let diff = wrap_deg((a - b).abs());
    diff.min(FULL_TURN - diff)
}

/// Angle swept after `elapsed` seconds by something with the given period.
pub fn swept_deg(elapsed: f64, period: f64) -> f64 {
    elapsed * FULL_TURN / period
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Least common multiple of a set of whole numbers.
///
/// Returns `None` on an empty set, a zero, or overflow.
pub fn lcm(values: impl IntoIterator<Item = u64>) -> Option<u64> {
    let mut acc: Option<u64> = None;
    for v in values {
        if v == 0 {
            return None;
        }
        acc = Some(match acc {
            None => v,
            Some(a) => (a / gcd(a, v)).checked_mul(v)?,
        });
    }
    acc
}

/// Interpret `x` as a whole number if it is within `tol` of one.
pub fn as_whole(x: f64, tol: f64) -> Option<u64> {
    let rounded = x.round();
    if (rounded - x).abs() > tol || !(1.0..=MAX_WHOLE).contains(&rounded) {
        return None;
    }
    #[allow(clippy::cast_sign_loss)]
    let whole = rounded as u64;
    Some(whole)
}

// 2^53; above this not every integer is representable.
const MAX_WHOLE: f64 = 9_007_199_254_740_992.0;

#[test]
fn wrap_is_never_negative() {
    assert_eq!(wrap_deg(-90.0), 270.0);
    assert_eq!(wrap_deg(720.0), 0.0);
    assert_eq!(wrap_deg(359.5), 359.5);
    let w = wrap_deg(-1e-17);
    assert!((0.0..FULL_TURN).contains(&w));
}

#[test]
fn signed_wrap_keeps_direction() {
    assert_eq!(wrap_signed_deg(370.0, -1.0), -10.0);
    assert_eq!(wrap_signed_deg(370.0, 1.0), 10.0);
    assert_eq!(wrap_signed_deg(90.0, -3.5), -90.0);
}

#[test]
fn separation_takes_the_short_way() {
    assert_eq!(separation_deg(359.0, 1.0), 2.0);
    assert_eq!(separation_deg(1.0, 359.0), 2.0);
    assert_eq!(separation_deg(0.0, 180.0), 180.0);
    assert_eq!(separation_deg(10.0, 10.0), 0.0);
}

#[test]
fn lcm_of_portfolio_periods() {
    assert_eq!(lcm([30, 45, 60, 75, 90, 105, 120, 135]), Some(37800));
    assert_eq!(lcm([7]), Some(7));
    assert_eq!(lcm(std::iter::empty()), None);
    assert_eq!(lcm([3, 0]), None);
}

#[test]
fn whole_numbers() {
    assert_eq!(as_whole(30.0, 1e-9), Some(30));
    assert_eq!(as_whole(29.999_999_999_9, 1e-9), Some(30));
    assert_eq!(as_whole(1.03, 1e-9), None);
    assert_eq!(as_whole(0.2, 1e-9), None);
}
