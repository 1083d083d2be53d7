//! Two-currency coin arithmetic
//!
//! All monetary amounts are arbitrary-precision integers denominated in wei
//! (10^18 wei per whole coin). `PandoWei` is the native currency, `PTXWei`
//! the utility currency used for staking and rewards.

use num_bigint::{BigInt, Sign};
use num_traits::{Signed, Zero};
use once_cell::sync::Lazy;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;

/// Denomination name of the native currency
pub const DENOM_PANDO_WEI: &str = "PandoWei";

/// Denomination name of the utility currency
pub const DENOM_PTX_WEI: &str = "PTXWei";

/// Number of wei per whole coin (10^18)
pub static WEI_MULTIPLIER: Lazy<BigInt> = Lazy::new(|| BigInt::from(10u64).pow(18));

static HUNDRED: Lazy<BigInt> = Lazy::new(|| BigInt::from(100u8));

/// Converts a whole-coin amount into wei.
pub fn coins_to_wei(amount: u64) -> BigInt {
    BigInt::from(amount) * &*WEI_MULTIPLIER
}

/// A pair of native and utility currency amounts
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Coins {
    #[serde(default)]
    pub pando_wei: BigInt,
    #[serde(default)]
    pub ptx_wei: BigInt,
}

impl Coins {
    pub fn new(pando_wei: BigInt, ptx_wei: BigInt) -> Self {
        Self { pando_wei, ptx_wei }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Utility-currency-only coins, the common case for staking amounts.
    pub fn ptx(ptx_wei: BigInt) -> Self {
        Self {
            pando_wei: BigInt::zero(),
            ptx_wei,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_nonnegative()
    }

    pub fn is_zero(&self) -> bool {
        self.pando_wei.is_zero() && self.ptx_wei.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        (self.pando_wei.is_positive() && !self.ptx_wei.is_negative())
            || (!self.pando_wei.is_negative() && self.ptx_wei.is_positive())
    }

    pub fn is_nonnegative(&self) -> bool {
        !self.pando_wei.is_negative() && !self.ptx_wei.is_negative()
    }

    pub fn plus(&self, other: &Coins) -> Coins {
        Coins {
            pando_wei: &self.pando_wei + &other.pando_wei,
            ptx_wei: &self.ptx_wei + &other.ptx_wei,
        }
    }

    pub fn negative(&self) -> Coins {
        Coins {
            pando_wei: (&self.pando_wei).neg(),
            ptx_wei: (&self.ptx_wei).neg(),
        }
    }

    pub fn minus(&self, other: &Coins) -> Coins {
        self.plus(&other.negative())
    }

    pub fn is_gte(&self, other: &Coins) -> bool {
        self.minus(other).is_nonnegative()
    }

    /// Computes the given percentage of both fields, truncating toward zero.
    pub fn calculate_percentage(&self, percentage: u64) -> Coins {
        let p = BigInt::from(percentage);
        Coins {
            pando_wei: &self.pando_wei * &p / &*HUNDRED,
            ptx_wei: &self.ptx_wei * &p / &*HUNDRED,
        }
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}, {} {}",
            self.pando_wei, DENOM_PANDO_WEI, self.ptx_wei, DENOM_PTX_WEI
        )
    }
}

impl fmt::Debug for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Coins({}, {})", self.pando_wei, self.ptx_wei)
    }
}

/// Encodes a non-negative big integer as its minimal big-endian byte string.
///
/// Panics on negative values: persisted amounts are never negative.
pub fn bigint_to_rlp_bytes(value: &BigInt) -> Vec<u8> {
    assert!(
        !value.is_negative(),
        "cannot encode negative amount: {}",
        value
    );
    let (_, bytes) = value.to_bytes_be();
    if value.is_zero() {
        Vec::new()
    } else {
        bytes
    }
}

/// Decodes a minimal big-endian byte string into a big integer.
pub fn bigint_from_rlp_bytes(bytes: &[u8]) -> BigInt {
    BigInt::from_bytes_be(Sign::Plus, bytes)
}

impl Encodable for Coins {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&bigint_to_rlp_bytes(&self.pando_wei));
        s.append(&bigint_to_rlp_bytes(&self.ptx_wei));
    }
}

impl Decodable for Coins {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        let pando: Vec<u8> = rlp.val_at(0)?;
        let ptx: Vec<u8> = rlp.val_at(1)?;
        Ok(Coins {
            pando_wei: bigint_from_rlp_bytes(&pando),
            ptx_wei: bigint_from_rlp_bytes(&ptx),
        })
    }
}

/// Parses a string representation of a coin amount.
///
/// Accepts a decimal number with an optional fractional part and an optional
/// case-insensitive `wei` suffix. Without the suffix the value is scaled by
/// 10^18. Negative inputs are rejected. Fractional wei are truncated.
pub fn parse_coin_amount(input: &str) -> Option<BigInt> {
    let mut s = input.trim();
    let mut in_wei = false;
    if s.len() >= 3 && s[s.len() - 3..].eq_ignore_ascii_case("wei") {
        in_wei = true;
        s = s[..s.len() - 3].trim();
    }

    if s.is_empty() || s.starts_with('-') {
        return None;
    }
    let s = s.strip_prefix('+').unwrap_or(s);

    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    // The concatenated digits are the value scaled by 10^len(frac_part).
    let digits = [int_part, frac_part].concat();
    let mut value = BigInt::parse_bytes(digits.as_bytes(), 10)?;

    let frac_len = frac_part.len() as u32;
    if in_wei {
        value /= BigInt::from(10u32).pow(frac_len);
    } else if frac_len <= 18 {
        value *= BigInt::from(10u32).pow(18 - frac_len);
    } else {
        value /= BigInt::from(10u32).pow(frac_len - 18);
    }

    Some(value)
}
