// Fixed-point helpers shared by the tick math and the auction engine.
// Amounts live in U256 (on-chain width), intermediates in BigInt so nothing
// silently wraps; narrowing back is always checked.

use ethers::types::U256;
use num_bigint::{BigInt, Sign};
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::errors::MathError;

/// 1e18, the scale of the tick accumulator and every normalized ratio.
pub const WAD: i128 = 1_000_000_000_000_000_000;

#[inline]
pub fn wad() -> BigInt {
    BigInt::from(WAD)
}

#[inline]
pub fn q96() -> BigInt {
    BigInt::one() << 96
}

pub fn u256_to_bigint(u: U256) -> BigInt {
    let mut buf = [0u8; 32];
    u.to_big_endian(&mut buf);
    BigInt::from_bytes_be(Sign::Plus, &buf)
}

pub fn bigint_to_u256(v: &BigInt, ctx: &'static str) -> Result<U256, MathError> {
    if v.is_negative() {
        return Err(MathError::Overflow(ctx));
    }
    let (_, bytes) = v.to_bytes_be();
    if bytes.len() > 32 {
        return Err(MathError::Overflow(ctx));
    }
    Ok(U256::from_big_endian(&bytes))
}

pub fn bigint_to_u128(v: &BigInt, ctx: &'static str) -> Result<u128, MathError> {
    v.to_u128().ok_or(MathError::Overflow(ctx))
}

pub fn bigint_to_i128(v: &BigInt, ctx: &'static str) -> Result<i128, MathError> {
    v.to_i128().ok_or(MathError::Overflow(ctx))
}

/// floor(a * b / d) at full width.
pub fn mul_div(a: U256, b: U256, d: U256, ctx: &'static str) -> Result<U256, MathError> {
    if d.is_zero() {
        return Err(MathError::DivisionByZero(ctx));
    }
    let r = u256_to_bigint(a) * u256_to_bigint(b) / u256_to_bigint(d);
    bigint_to_u256(&r, ctx)
}

#[inline]
pub fn ceil_div(a: &BigInt, b: &BigInt) -> BigInt {
    // assumes a>=0, b>0
    if a.is_zero() {
        return BigInt::zero();
    }
    (a + (b - BigInt::one())) / b
}
