//! Arithmetic engine
//!
//! Pure 32-bit two's-complement arithmetic. Overflow wraps silently and
//! division by zero yields 0; no operation can fail.

use crate::protocol::Operation;

/// Compute `a <op> b`
pub fn compute(op: Operation, a: i32, b: i32) -> i32 {
    match op {
        Operation::Addition => a.wrapping_add(b),
        Operation::Subtraction => a.wrapping_sub(b),
        Operation::Multiplication => a.wrapping_mul(b),
        Operation::Division => {
            if b == 0 {
                0
            } else {
                // i32::MIN / -1 wraps back to i32::MIN
                a.wrapping_div(b)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: [i32; 9] = [0, 1, -1, 2, -7, 1000, i32::MAX, i32::MIN, 0x1234_5678];

    #[test]
    fn test_add_sub_mul_match_modular_arithmetic() {
        for a in SAMPLES {
            for b in SAMPLES {
                let wide_a = a as i64;
                let wide_b = b as i64;
                assert_eq!(compute(Operation::Addition, a, b), (wide_a + wide_b) as i32);
                assert_eq!(compute(Operation::Subtraction, a, b), (wide_a - wide_b) as i32);
                assert_eq!(compute(Operation::Multiplication, a, b), (wide_a * wide_b) as i32);
            }
        }
    }

    #[test]
    fn test_division_truncates() {
        assert_eq!(compute(Operation::Division, 7, 2), 3);
        assert_eq!(compute(Operation::Division, -7, 2), -3);
        assert_eq!(compute(Operation::Division, 7, -2), -3);
        assert_eq!(compute(Operation::Division, i32::MIN, -1), i32::MIN);
    }

    #[test]
    fn test_division_by_zero_is_zero() {
        for a in SAMPLES {
            assert_eq!(compute(Operation::Division, a, 0), 0);
        }
    }
}
