//! Sector sample bitmaps.
//!
//! A [`SectorSample`] is an ordered, duplicate-free set of sector numbers
//! stored as a run-length [`BitField`]. Lotus exchanges bitfields in JSON as
//! an array of run lengths that alternate between unset and set bits,
//! starting with an unset run: `{0, 1, 2, 5, 6}` is `[0, 3, 2, 2]`. Only the
//! first run may be empty.

use std::ops::Range;

use fvm_ipld_bitfield::{iter::Ranges, BitField};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::types::{SectorNumber, MAX_SECTOR_NUMBER};

/// Error building a [`SectorSample`].
#[derive(Debug, Clone, PartialEq, Eq, displaydoc::Display, thiserror::Error)]
pub enum SampleError {
    /// Sector number {0} is out of range
    OutOfRange(u64),

    /// Empty run at position {0}
    EmptyRun(usize),

    /// Run lengths overflow the sector number space
    Overflow,
}

/// A compact, immutable set of sector numbers.
#[derive(Debug, Clone, Default)]
pub struct SectorSample(BitField);

impl SectorSample {
    /// Build a sample from sector numbers in any order.
    ///
    /// Duplicates collapse; numbers above [`MAX_SECTOR_NUMBER`] are rejected.
    pub fn from_sectors<I>(sectors: I) -> Result<Self, SampleError>
    where
        I: IntoIterator<Item = SectorNumber>,
    {
        let mut numbers: Vec<SectorNumber> = sectors.into_iter().collect();
        if let Some(&bad) = numbers.iter().find(|&&n| n > MAX_SECTOR_NUMBER) {
            return Err(SampleError::OutOfRange(bad));
        }
        numbers.sort_unstable();
        numbers.dedup();
        BitField::try_from_bits(numbers)
            .map(Self)
            .map_err(|_| SampleError::Overflow)
    }

    /// Decode the Lotus JSON run-length form.
    ///
    /// Set runs become ranges directly, so the cost follows the number of
    /// runs rather than the number of sectors they cover.
    pub fn from_runs(runs: &[u64]) -> Result<Self, SampleError> {
        let mut ranges: Vec<Range<u64>> = Vec::with_capacity(runs.len() / 2);
        let mut position: u64 = 0;
        for (i, &len) in runs.iter().enumerate() {
            if len == 0 && i != 0 {
                return Err(SampleError::EmptyRun(i));
            }
            let end = position.checked_add(len).ok_or(SampleError::Overflow)?;
            if i % 2 == 1 {
                if end - 1 > MAX_SECTOR_NUMBER {
                    return Err(SampleError::OutOfRange(end - 1));
                }
                ranges.push(position..end);
            }
            position = end;
        }
        // Non-empty unset runs keep the set ranges ascending and disjoint.
        Ok(Self(BitField::from_ranges(Ranges::new(ranges))))
    }

    /// Encode as Lotus JSON run lengths.
    pub fn to_runs(&self) -> Vec<u64> {
        let mut runs = Vec::new();
        let mut position = 0;
        for range in self.0.ranges() {
            runs.push(range.start - position);
            runs.push(range.end - range.start);
            position = range.end;
        }
        runs
    }

    /// Union with another sample.
    pub fn union(&self, other: &SectorSample) -> SectorSample {
        SectorSample(&self.0 | &other.0)
    }

    /// Number of sectors in the sample.
    pub fn len(&self) -> u64 {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sector numbers in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = SectorNumber> + '_ {
        self.0.iter()
    }

    pub fn contains(&self, sector: SectorNumber) -> bool {
        self.0.get(sector)
    }

    /// The underlying bitfield.
    pub fn as_bitfield(&self) -> &BitField {
        &self.0
    }
}

impl PartialEq for SectorSample {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for SectorSample {}

impl Serialize for SectorSample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_runs().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SectorSample {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let runs = Option::<Vec<u64>>::deserialize(deserializer)?.unwrap_or_default();
        Self::from_runs(&runs).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_sectors_orders_and_dedups() {
        let sample = SectorSample::from_sectors([6, 0, 2, 5, 1, 2, 6]).unwrap();
        assert_eq!(sample.iter().collect::<Vec<_>>(), vec![0, 1, 2, 5, 6]);
        assert_eq!(sample.len(), 5);
        assert!(sample.contains(5));
        assert!(!sample.contains(3));
    }

    #[test]
    fn test_runs_encoding() {
        let sample = SectorSample::from_sectors([0, 1, 2, 5, 6]).unwrap();
        assert_eq!(sample.to_runs(), vec![0, 3, 2, 2]);

        let sample = SectorSample::from_sectors([3, 4, 10]).unwrap();
        assert_eq!(sample.to_runs(), vec![3, 2, 5, 1]);
        assert_eq!(SectorSample::from_runs(&[3, 2, 5, 1]).unwrap(), sample);

        assert!(SectorSample::default().to_runs().is_empty());
    }

    #[test]
    fn test_runs_reject_inner_empty_run() {
        assert_eq!(
            SectorSample::from_runs(&[0, 3, 0, 2]),
            Err(SampleError::EmptyRun(2))
        );
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert_eq!(
            SectorSample::from_sectors([1, u64::MAX]),
            Err(SampleError::OutOfRange(u64::MAX))
        );
        assert!(SectorSample::from_runs(&[MAX_SECTOR_NUMBER, 2]).is_err());
    }

    #[test]
    fn test_long_runs_stay_compact() {
        let runs = [0, 40_000_000_000, 5, MAX_SECTOR_NUMBER - 40_000_000_004];
        let sample = SectorSample::from_runs(&runs).unwrap();
        assert_eq!(sample.len(), MAX_SECTOR_NUMBER - 4);
        assert!(sample.contains(39_999_999_999));
        assert!(!sample.contains(40_000_000_000));
        assert!(sample.contains(MAX_SECTOR_NUMBER));
        assert_eq!(sample.to_runs(), runs);

        let sample: SectorSample = serde_json::from_str("[0, 40000000]").unwrap();
        assert_eq!(sample.len(), 40_000_000);
        assert_eq!(sample.iter().next(), Some(0));
    }

    #[test]
    fn test_json_null_is_empty() {
        let sample: SectorSample = serde_json::from_str("null").unwrap();
        assert!(sample.is_empty());
        let sample: SectorSample = serde_json::from_str("[1,2]").unwrap();
        assert_eq!(sample.iter().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(serde_json::to_string(&sample).unwrap(), "[1,2]");
    }

    #[test]
    fn test_union() {
        let a = SectorSample::from_sectors([1, 2]).unwrap();
        let b = SectorSample::from_sectors([2, 9]).unwrap();
        assert_eq!(a.union(&b).iter().collect::<Vec<_>>(), vec![1, 2, 9]);
    }
}
