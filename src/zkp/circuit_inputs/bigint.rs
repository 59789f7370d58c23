// src/zkp/circuit_inputs/bigint.rs
//! Fixed-width limb decomposition of big integers.
//!
//! The proving field is ~254 bits, so RSA moduli, signatures and Barrett
//! constants are split into `count` limbs of `bits` bits each, least
//! significant limb first.

use num_bigint::BigUint;

use crate::error::{PassportError, Result};

/// Default limb width.
pub const DEFAULT_LIMB_BITS: usize = 120;

/// Widest limb that still fits below the BN254 scalar modulus.
pub const MAX_LIMB_BITS: usize = 253;

/// Extra exponent bits of the Barrett constant, `floor(2^(2n+k) / m)`.
pub const BARRETT_K: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimbLayout {
    pub bits: usize,
    pub count: usize,
}

impl LimbLayout {
    pub fn new(bits: usize, count: usize) -> Self {
        Self { bits, count }
    }

    /// Smallest layout of `bits`-wide limbs holding a `value_bits` value.
    ///
    /// # Errors
    /// `MalformedDocument` when `bits` is outside `1..=MAX_LIMB_BITS`.
    pub fn covering(value_bits: usize, bits: usize) -> Result<Self> {
        check_limb_bits(bits)?;
        Ok(Self {
            bits,
            count: (value_bits + bits - 1) / bits,
        })
    }

    pub fn capacity_bits(&self) -> usize {
        self.bits * self.count
    }

    /// Largest value the layout can hold, `2^(bits*count) - 1`.
    pub fn max_value(&self) -> BigUint {
        (BigUint::from(1u8) << self.capacity_bits()) - BigUint::from(1u8)
    }
}

fn check_limb_bits(bits: usize) -> Result<()> {
    if bits == 0 || bits > MAX_LIMB_BITS {
        return Err(PassportError::document(
            "limbs",
            0,
            format!("limb width {} outside 1..={}", bits, MAX_LIMB_BITS),
        ));
    }
    Ok(())
}

/// Splits `value` into limbs.
///
/// # Errors
/// `MalformedDocument` when the value does not fit the layout or the limb
/// width is unusable.
pub fn chunk(value: &BigUint, layout: LimbLayout) -> Result<Vec<BigUint>> {
    check_limb_bits(layout.bits)?;
    if value.bits() > layout.capacity_bits() as u64 {
        return Err(PassportError::document(
            "limbs",
            0,
            format!(
                "{}-bit value does not fit {} limbs of {} bits",
                value.bits(),
                layout.count,
                layout.bits
            ),
        ));
    }
    let mask = (BigUint::from(1u8) << layout.bits) - BigUint::from(1u8);
    Ok((0..layout.count)
        .map(|i| (value >> (i * layout.bits)) & &mask)
        .collect())
}

/// Big-endian bytes to limbs.
pub fn chunk_bytes(bytes: &[u8], layout: LimbLayout) -> Result<Vec<BigUint>> {
    chunk(&BigUint::from_bytes_be(bytes), layout)
}

/// Inverse of [`chunk`]: `sum(limb[i] << (i * bits))`.
pub fn reconstruct(limbs: &[BigUint], bits: usize) -> BigUint {
    limbs
        .iter()
        .enumerate()
        .fold(BigUint::default(), |acc, (i, limb)| acc + (limb << (i * bits)))
}

/// Barrett reduction constant `floor(2^(2*bits + k) / modulus)`.
///
/// # Errors
/// `MalformedDocument` for a zero modulus.
pub fn barrett_constant(modulus: &BigUint, bits: usize, k: usize) -> Result<BigUint> {
    if modulus == &BigUint::default() {
        return Err(PassportError::document("modulus", 0, "zero modulus"));
    }
    Ok((BigUint::from(1u8) << (2 * bits + k)) / modulus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::RandBigInt;

    const LAYOUT: LimbLayout = LimbLayout { bits: 120, count: 18 };

    #[test]
    fn test_round_trip_edge_values() {
        let zero = BigUint::default();
        let one = BigUint::from(1u8);
        for value in [zero, one, LAYOUT.max_value()] {
            let limbs = chunk(&value, LAYOUT).unwrap();
            assert_eq!(limbs.len(), 18);
            assert_eq!(reconstruct(&limbs, LAYOUT.bits), value);
        }
    }

    #[test]
    fn test_round_trip_random_2048() {
        let mut rng = rand::thread_rng();
        for _ in 0..16 {
            let value = rng.gen_biguint(2048);
            let limbs = chunk(&value, LAYOUT).unwrap();
            assert!(limbs.iter().all(|l| l.bits() <= 120));
            assert_eq!(reconstruct(&limbs, 120), value);
        }
    }

    #[test]
    fn test_little_limb_first() {
        let value = (BigUint::from(5u8) << 120) + BigUint::from(7u8);
        let limbs = chunk(&value, LimbLayout::new(120, 3)).unwrap();
        assert_eq!(limbs, vec![BigUint::from(7u8), BigUint::from(5u8), BigUint::default()]);
    }

    #[test]
    fn test_overflow_is_rejected() {
        let too_big = LAYOUT.max_value() + BigUint::from(1u8);
        assert!(chunk(&too_big, LAYOUT).is_err());
    }

    #[test]
    fn test_covering_layout() {
        assert_eq!(LimbLayout::covering(2048, 120).unwrap().count, 18);
        assert_eq!(LimbLayout::covering(2052, 120).unwrap().count, 18);
        assert_eq!(LimbLayout::covering(256, 64).unwrap().count, 4);
    }

    #[test]
    fn test_unusable_limb_width_is_an_error() {
        assert!(LimbLayout::covering(2048, 0).is_err());
        assert!(LimbLayout::covering(2048, MAX_LIMB_BITS + 1).is_err());
        assert!(LimbLayout::covering(2048, MAX_LIMB_BITS).is_ok());
        assert!(chunk(&BigUint::default(), LimbLayout::new(0, 4)).is_err());
    }

    #[test]
    fn test_barrett_constant_bounds() {
        let mut rng = rand::thread_rng();
        for bits in [1024usize, 2048, 4096] {
            let modulus = rng.gen_biguint(bits as u64) | (BigUint::from(1u8) << (bits - 1));
            let r = barrett_constant(&modulus, bits, BARRETT_K).unwrap();
            let power = BigUint::from(1u8) << (2 * bits + BARRETT_K);
            assert!(&r * &modulus <= power);
            assert!((&r + BigUint::from(1u8)) * &modulus > power);
            // constant has bits + k + 1 bits at most
            assert!(r.bits() as usize <= bits + BARRETT_K + 1);
        }
        assert!(barrett_constant(&BigUint::default(), 8, 2).is_err());
    }

    #[test]
    fn test_barrett_known_value() {
        // floor(2^(2*4+2) / 13) = floor(1024 / 13) = 78
        let r = barrett_constant(&BigUint::from(13u8), 4, 2).unwrap();
        assert_eq!(r, BigUint::from(78u8));
    }
}
