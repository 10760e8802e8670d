//! Token amounts and the FIL denomination converter.
//!
//! Raw amounts are exact attoFIL integers. Conversion to FIL is done with
//! integer division against [`ATTO_PER_FIL`] and rounded half-to-even at
//! the requested number of decimal places, so the raw and FIL columns of a
//! report can never drift apart. Floating point is only used by
//! [`TokenAmount::to_fil_f64`], for ratios computed at display time.

use std::{fmt, str::FromStr};

use num_bigint::{BigInt, Sign};
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Number of attoFIL in one FIL (10^18).
pub const ATTO_PER_FIL: u64 = 1_000_000_000_000_000_000;

/// Decimal places used by the `*FIL` report columns.
pub const REPORT_FIL_PLACES: usize = 3;

/// An amount of attoFIL.
///
/// On the wire (Lotus JSON) amounts are decimal strings, which keeps values
/// above 2^64 intact.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(BigInt);

impl TokenAmount {
    /// Zero attoFIL.
    pub fn zero() -> Self {
        Self(BigInt::zero())
    }

    /// Amount from a raw attoFIL integer.
    pub fn from_atto(atto: impl Into<BigInt>) -> Self {
        Self(atto.into())
    }

    /// Amount of whole FIL.
    pub fn from_whole(fil: u64) -> Self {
        Self(BigInt::from(fil) * BigInt::from(ATTO_PER_FIL))
    }

    /// The raw attoFIL value.
    pub fn atto(&self) -> &BigInt {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_positive()
    }

    /// Exact decimal FIL string with `places` digits after the point.
    ///
    /// `fil_string(0)` of 1.5 FIL is "2"; ties go to the even neighbour.
    pub fn fil_string(&self, places: usize) -> String {
        let scale = BigInt::from(10u32).pow(places as u32);
        let atto_per_fil = BigInt::from(ATTO_PER_FIL);
        let magnitude = self.0.abs() * &scale;
        let (mut quotient, remainder) = magnitude.div_rem(&atto_per_fil);

        let twice = remainder * 2u32;
        let round_up = match twice.cmp(&atto_per_fil) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Equal => quotient.is_odd(),
            std::cmp::Ordering::Less => false,
        };
        if round_up {
            quotient += 1u32;
        }

        let (whole, frac) = quotient.div_rem(&scale);
        let sign = if self.0.sign() == Sign::Minus && !quotient.is_zero() {
            "-"
        } else {
            ""
        };
        if places == 0 {
            format!("{sign}{whole}")
        } else {
            format!("{sign}{whole}.{:0>places$}", frac.to_string())
        }
    }

    /// FIL value as the three-decimal string used by reports.
    pub fn report_fil(&self) -> String {
        self.fil_string(REPORT_FIL_PLACES)
    }

    /// Approximate FIL value as a float, for display-time ratios only.
    pub fn to_fil_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(f64::NAN) / ATTO_PER_FIL as f64
    }

    /// `self / denominator`, scaled by 10^18 and truncated.
    ///
    /// Returns zero when `denominator` is zero, so a miner without pledge
    /// has a zero fee-per-pledge ratio rather than a division fault.
    pub fn ratio_per(&self, denominator: &TokenAmount) -> TokenAmount {
        if denominator.is_zero() {
            return TokenAmount::zero();
        }
        TokenAmount((&self.0 * BigInt::from(ATTO_PER_FIL)) / &denominator.0)
    }

    /// Product with an unsigned count.
    pub fn mul_u64(&self, factor: u64) -> TokenAmount {
        TokenAmount(&self.0 * BigInt::from(factor))
    }

    /// Floor division by another amount, as a count.
    ///
    /// Returns `None` for a non-positive divisor or a result that does not
    /// fit in a `u64`.
    pub fn div_floor_count(&self, divisor: &TokenAmount) -> Option<u64> {
        if !divisor.0.is_positive() || self.0.is_negative() {
            return None;
        }
        (&self.0 / &divisor.0).to_u64()
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TokenAmount {
    type Err = num_bigint::ParseBigIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

impl From<u64> for TokenAmount {
    fn from(atto: u64) -> Self {
        Self(BigInt::from(atto))
    }
}

impl std::ops::Add for &TokenAmount {
    type Output = TokenAmount;

    fn add(self, rhs: &TokenAmount) -> TokenAmount {
        TokenAmount(&self.0 + &rhs.0)
    }
}

impl std::ops::AddAssign<&TokenAmount> for TokenAmount {
    fn add_assign(&mut self, rhs: &TokenAmount) {
        self.0 += &rhs.0;
    }
}

impl std::iter::Sum for TokenAmount {
    fn sum<I: Iterator<Item = TokenAmount>>(iter: I) -> Self {
        iter.fold(TokenAmount::zero(), |acc, x| TokenAmount(acc.0 + x.0))
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atto(s: &str) -> TokenAmount {
        s.parse().unwrap()
    }

    #[test]
    fn test_zero_formats_with_three_places() {
        assert_eq!(TokenAmount::zero().report_fil(), "0.000");
    }

    #[test]
    fn test_report_fil() {
        assert_eq!(TokenAmount::from_whole(1).report_fil(), "1.000");
        assert_eq!(atto("1234567890000000000000").report_fil(), "1234.568");
        assert_eq!(atto("999").report_fil(), "0.000");
        assert_eq!(atto("-2500000000000000000").report_fil(), "-2.500");
    }

    #[test]
    fn test_ties_round_to_even() {
        // 0.0005 FIL -> 0.000, 0.0015 FIL -> 0.002
        assert_eq!(atto("500000000000000").report_fil(), "0.000");
        assert_eq!(atto("1500000000000000").report_fil(), "0.002");
        assert_eq!(atto("1500000000000000000").fil_string(0), "2");
        assert_eq!(atto("2500000000000000000").fil_string(0), "2");
    }

    #[test]
    fn test_scaled_back_within_display_precision() {
        for raw in [
            "0",
            "1",
            "499999999999999",
            "500000000000001",
            "123456789012345678901234",
            "340282366920938463463374607431768211456",
        ] {
            let amount = atto(raw);
            let shown: f64 = amount.report_fil().parse().unwrap();
            let back = shown * ATTO_PER_FIL as f64;
            let original = amount.atto().to_f64().unwrap();
            let tolerance = 0.0005 * ATTO_PER_FIL as f64 + original.abs() * 1e-12;
            assert!((back - original).abs() <= tolerance, "{raw}");
        }
    }

    #[test]
    fn test_ratio_per_zero_pledge_is_zero() {
        let fee = TokenAmount::from_whole(42);
        assert!(fee.ratio_per(&TokenAmount::zero()).is_zero());
    }

    #[test]
    fn test_ratio_per_is_wad_scaled() {
        let fee = TokenAmount::from_whole(5);
        let pledge = TokenAmount::from_whole(100);
        let ratio = fee.ratio_per(&pledge);
        assert_eq!(ratio.to_string(), "50000000000000000");
        assert_eq!(ratio.report_fil(), "0.050");
    }

    #[test]
    fn test_serde_uses_decimal_strings() {
        let amount: TokenAmount =
            serde_json::from_str("\"100000000000000000000000\"").unwrap();
        assert_eq!(amount, TokenAmount::from_whole(100_000));
        assert_eq!(
            serde_json::to_string(&amount).unwrap(),
            "\"100000000000000000000000\""
        );
        assert!(serde_json::from_str::<TokenAmount>("\"12x\"").is_err());
    }

    #[test]
    fn test_div_floor_count() {
        let total = TokenAmount::from_whole(1000);
        let per = atto("3000000000000000000");
        assert_eq!(total.div_floor_count(&per), Some(333));
        assert_eq!(total.div_floor_count(&TokenAmount::zero()), None);
    }
}
