//! Fixed-point requantization primitives.
//!
//! These are the gemmlowp/TFLite integer kernels the gateware reproduces.
//! The rounding and overflow behaviour is part of the hardware contract: any
//! change here shows up as an equivalence mismatch against real silicon.
//!
//! ```text
//! acc (i32) ──► + bias ──► SRDHM(·, multiplier) ──► RDBPOT(·, -shift) ──► + offset ──► clamp
//!                          └──────────── multiply_by_quantized_multiplier ─┘
//! ```

/// Arithmetic shift right by `exponent` with round-to-nearest.
///
/// Ties round away from zero, matching a two's-complement shifter that adds
/// back the dropped remainder when it exceeds half (half minus one for
/// negative inputs).
///
/// `exponent` outside `0..=31` is undefined and only caught by a debug assertion.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn rounding_divide_by_pot(x: i32, exponent: u32) -> i32 {
    debug_assert!(exponent <= 31, "exponent {exponent} outside 0..=31");
    let mask = ((1_i64 << exponent) - 1) as i32;
    let remainder = x & mask;
    let threshold = (mask >> 1) + i32::from(x < 0);
    (x >> exponent) + i32::from(remainder > threshold)
}

/// High 32 bits of `2 * a * b`, rounded, saturating the single overflow case.
///
/// Only `a == b == i32::MIN` overflows; it saturates to `i32::MAX`.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn saturating_rounding_doubling_high_mul(a: i32, b: i32) -> i32 {
    if a == i32::MIN && b == i32::MIN {
        return i32::MAX;
    }
    let ab = i64::from(a) * i64::from(b);
    let nudge: i64 = if ab >= 0 { 1 << 30 } else { 1 - (1 << 30) };
    // i64 division truncates toward zero
    ((ab + nudge) / (1_i64 << 31)) as i32
}

/// Scale an accumulator by a Q31 multiplier and a signed power-of-two shift.
///
/// Positive `shift` is applied as a left shift before the multiply (wrapping,
/// as the hardware shifter does), negative `shift` as a rounding right shift
/// after it. `shift` outside `-31..=31` is undefined.
#[inline]
#[must_use]
pub fn multiply_by_quantized_multiplier(x: i32, multiplier: i32, shift: i32) -> i32 {
    debug_assert!((-31..=31).contains(&shift), "shift {shift} outside -31..=31");
    let left_shift = shift.max(0).unsigned_abs();
    let right_shift = (-shift).max(0).unsigned_abs();
    rounding_divide_by_pot(
        saturating_rounding_doubling_high_mul(x.wrapping_shl(left_shift), multiplier),
        right_shift,
    )
}

/// Per-channel output stage: bias, requantize, offset, clamp.
///
/// The clamp is written out rather than using `i32::clamp` so that an
/// inverted range behaves like the gateware comparator chain instead of
/// panicking.
#[inline]
#[must_use]
pub fn post_process(
    acc: i32,
    bias: i32,
    multiplier: i32,
    shift: i32,
    output_offset: i32,
    activation_min: i32,
    activation_max: i32,
) -> i32 {
    let acc = multiply_by_quantized_multiplier(acc.wrapping_add(bias), multiplier, shift)
        .wrapping_add(output_offset);
    if acc < activation_min {
        activation_min
    } else if acc > activation_max {
        activation_max
    } else {
        acc
    }
}

/// Q31 representation of 1.0 (saturated) used by identity requantization.
pub const Q31_ONE: i32 = i32::MAX;

/// Q31 representation of 0.5.
pub const Q31_HALF: i32 = 1 << 30;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn srdhm_reference(a: i32, b: i32) -> i64 {
        let p = i128::from(a) * i128::from(b);
        let half = 1_i128 << 30;
        let r = if p >= 0 { (p + half) >> 31 } else { -((-p + half - 1) >> 31) };
        r as i64
    }

    #[test]
    fn rdbpot_literals() {
        assert_eq!(rounding_divide_by_pot(5, 1), 3);
        assert_eq!(rounding_divide_by_pot(-5, 1), -3);
        assert_eq!(rounding_divide_by_pot(4, 1), 2);
        assert_eq!(rounding_divide_by_pot(-4, 1), -2);
        assert_eq!(rounding_divide_by_pot(7, 0), 7);
        assert_eq!(rounding_divide_by_pot(i32::MIN, 31), -1);
        assert_eq!(rounding_divide_by_pot(i32::MAX, 31), 1);
    }

    #[test]
    fn srdhm_saturates_min_times_min() {
        assert_eq!(saturating_rounding_doubling_high_mul(i32::MIN, i32::MIN), i32::MAX);
    }

    #[test]
    fn srdhm_literals() {
        assert_eq!(saturating_rounding_doubling_high_mul(Q31_HALF, 1000), 500);
        assert_eq!(saturating_rounding_doubling_high_mul(i32::MAX, i32::MAX), i32::MAX - 1);
        assert_eq!(saturating_rounding_doubling_high_mul(i32::MIN, i32::MAX), i32::MIN + 1);
        assert_eq!(saturating_rounding_doubling_high_mul(0, i32::MIN), 0);
    }

    #[test]
    fn mbqm_half() {
        let r = multiply_by_quantized_multiplier(1000, 1_073_741_824, 0);
        assert!((r - 500).abs() <= 1, "got {r}");
    }

    #[test]
    fn mbqm_shifts() {
        // 0.5 * 2^2 = 2.0
        assert_eq!(multiply_by_quantized_multiplier(100, Q31_HALF, 2), 200);
        // 0.5 / 2^3
        assert_eq!(multiply_by_quantized_multiplier(160, Q31_HALF, -3), 10);
    }

    #[test]
    fn post_process_identity_and_clamp() {
        assert_eq!(post_process(0, 5, Q31_ONE, 0, 0, -128, 127), 5);
        assert_eq!(post_process(0, -5, Q31_ONE, 0, 0, -128, 127), -5);
        assert_eq!(post_process(1000, 0, Q31_ONE, 0, 0, -128, 127), 127);
        assert_eq!(post_process(-1000, 0, Q31_ONE, 0, 3, -128, 127), -128);
        assert_eq!(post_process(10, 0, Q31_ONE, 0, 3, -128, 127), 13);
    }

    proptest! {
        #[test]
        fn rdbpot_within_half_ulp(x in any::<i32>(), exponent in 0u32..=31) {
            let r = i64::from(rounding_divide_by_pot(x, exponent));
            let err = (r * (1_i64 << exponent) - i64::from(x)).abs();
            // |err| <= 2^(exponent-1), kept integral
            prop_assert!(2 * err <= 1_i64 << exponent);
        }

        #[test]
        fn srdhm_is_rounded_product(a in any::<i32>(), b in any::<i32>()) {
            prop_assume!(!(a == i32::MIN && b == i32::MIN));
            prop_assert_eq!(
                i64::from(saturating_rounding_doubling_high_mul(a, b)),
                srdhm_reference(a, b)
            );
        }

        #[test]
        fn mbqm_no_shift_is_srdhm(x in any::<i32>(), m in any::<i32>()) {
            prop_assert_eq!(
                multiply_by_quantized_multiplier(x, m, 0),
                saturating_rounding_doubling_high_mul(x, m)
            );
        }
    }
}
