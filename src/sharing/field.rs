//! GF(2^8) arithmetic for the threshold splitter.
//!
//! Elements are bytes; addition is XOR and multiplication is carry-less
//! multiplication reduced modulo x^8 + x^4 + x^3 + x + 1 (the AES
//! polynomial). Every non-zero element has an inverse.

use std::ops::{Add, Mul};
use zeroize::Zeroize;

/// An element of GF(256)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Zeroize)]
pub(crate) struct Gf256(pub(crate) u8);

impl Gf256 {
    pub(crate) const ZERO: Self = Gf256(0);
    pub(crate) const ONE: Self = Gf256(1);

    /// Multiplicative inverse, `None` for zero.
    ///
    /// a^-1 = a^254, computed by square-and-multiply.
    pub(crate) fn inverse(self) -> Option<Self> {
        if self.0 == 0 {
            return None;
        }

        let mut result = Gf256::ONE;
        let mut base = self;
        let mut exp = 254u8;
        while exp > 0 {
            if exp & 1 == 1 {
                result = result * base;
            }
            base = base * base;
            exp >>= 1;
        }
        Some(result)
    }

    /// Evaluate `coeffs[0] + coeffs[1]·x + …` at `x` (Horner).
    pub(crate) fn eval_poly(coeffs: &[Self], x: Self) -> Self {
        coeffs
            .iter()
            .rev()
            .fold(Gf256::ZERO, |acc, &c| acc * x + c)
    }

    /// Lagrange interpolation of f(0) from `(x, y)` points.
    ///
    /// The x values must be distinct and non-zero; `None` otherwise.
    pub(crate) fn interpolate_at_zero(points: &[(Self, Self)]) -> Option<Self> {
        let mut acc = Gf256::ZERO;

        for (i, &(xi, yi)) in points.iter().enumerate() {
            let mut num = Gf256::ONE;
            let mut den = Gf256::ONE;

            for (j, &(xj, _)) in points.iter().enumerate() {
                if i != j {
                    // (0 - xj) / (xi - xj); subtraction is XOR in GF(2^8)
                    num = num * xj;
                    den = den * (xi + xj);
                }
            }

            acc = acc + yi * num * den.inverse()?;
        }

        Some(acc)
    }
}

impl Add for Gf256 {
    type Output = Self;

    #[allow(clippy::suspicious_arithmetic_impl)]
    fn add(self, rhs: Self) -> Self {
        Gf256(self.0 ^ rhs.0)
    }
}

impl Mul for Gf256 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let mut a = self.0;
        let mut b = rhs.0;
        let mut product = 0u8;

        // Fixed eight rounds so timing does not depend on the operands
        for _ in 0..8 {
            let mask = 0u8.wrapping_sub(b & 1);
            product ^= a & mask;

            let carry = 0u8.wrapping_sub(a >> 7);
            a = (a << 1) ^ (0x1B & carry);
            b >>= 1;
        }

        Gf256(product)
    }
}
