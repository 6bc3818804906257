use std::cmp::Ordering;

/// Element type accepted by the rank engines.
///
/// A value is either orderable or missing. Missing values (NaN for the float
/// types) occupy a window slot but never enter the sorted containers, so
/// `rank_cmp` is only ever called on orderable values and is a total order
/// over them.
pub trait RankValue: Copy + PartialOrd + Send + Sync + 'static {
    fn is_missing(self) -> bool;

    #[inline(always)]
    fn rank_cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).unwrap_or(Ordering::Equal)
    }
}

macro_rules! impl_rank_value_ord {
    ($($t:ty),*) => {
        $(
            impl RankValue for $t {
                #[inline(always)]
                fn is_missing(self) -> bool {
                    false
                }

                #[inline(always)]
                fn rank_cmp(&self, other: &Self) -> Ordering {
                    self.cmp(other)
                }
            }
        )*
    };
}

macro_rules! impl_rank_value_float {
    ($($t:ty),*) => {
        $(
            impl RankValue for $t {
                #[inline(always)]
                fn is_missing(self) -> bool {
                    self.is_nan()
                }
            }
        )*
    };
}

impl_rank_value_ord!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, bool);
impl_rank_value_float!(f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_missing() {
        assert!(f64::NAN.is_missing());
        assert!(f32::NAN.is_missing());
        assert!(!0.0f64.is_missing());
        assert!(!f64::INFINITY.is_missing());
    }

    #[test]
    fn test_signed_zero_ties() {
        assert_eq!((-0.0f64).rank_cmp(&0.0), Ordering::Equal);
        assert_eq!(f64::NEG_INFINITY.rank_cmp(&-1e308), Ordering::Less);
    }

    #[test]
    fn test_integer_and_bool_order() {
        assert_eq!(3u8.rank_cmp(&200), Ordering::Less);
        assert_eq!((-5i64).rank_cmp(&-5), Ordering::Equal);
        assert_eq!(true.rank_cmp(&false), Ordering::Greater);
        assert!(!u64::MAX.is_missing());
    }
}
