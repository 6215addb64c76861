use anyhow::{anyhow, Result};
use bigdecimal::BigDecimal;
use num::bigint::Sign;
use num::BigInt;
use primitive_types::{H160, U256};

pub fn u256_to_big_int(input: &U256) -> BigInt {
    let mut bytes = [0; 32];
    input.to_big_endian(&mut bytes);
    BigInt::from_bytes_be(Sign::Plus, &bytes)
}

pub fn big_int_to_u256(input: &BigInt) -> Result<U256> {
    let (sign, bytes) = input.to_bytes_be();
    if sign == Sign::Minus {
        return Err(anyhow!("negative BigInt to U256 conversion"));
    }
    if bytes.len() > 32 {
        return Err(anyhow!("BigInt too big for U256 conversion"));
    }
    Ok(U256::from_big_endian(&bytes))
}

/// `U256` values are stored as `NUMERIC` columns, which `sqlx` maps onto
/// `BigDecimal`. Both directions only ever see non-negative integers.
pub fn u256_to_big_decimal(input: &U256) -> BigDecimal {
    BigDecimal::from(u256_to_big_int(input))
}

pub fn big_decimal_to_u256(input: &BigDecimal) -> Result<U256> {
    if !input.is_integer() {
        return Err(anyhow!("BigDecimal with fractional part can't become U256"));
    }
    let (digits, exponent) = input.as_bigint_and_exponent();
    if exponent != 0 {
        return Err(anyhow!("unexpected exponent in integral BigDecimal"));
    }
    big_int_to_u256(&digits)
}

/// The columns holding addresses are `BYTEA`, which `sqlx` maps onto
/// `Vec<u8>`. Converts back into an `H160`, failing if the column somehow
/// holds the wrong number of bytes.
pub fn h160_from_vec(bytes: Vec<u8>) -> Result<H160> {
    if bytes.len() != 20 {
        return Err(anyhow!(
            "expected 20 bytes for an address, got {}",
            bytes.len()
        ));
    }
    Ok(H160::from_slice(&bytes))
}
