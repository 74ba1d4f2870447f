//! Narrowing of analysis regions so that every window derived from them
//! (covariate rows, fragment window, shear window) lies inside the chromosome.

use crate::consts::{SONICATION_SHEAR_BIAS_OFFSET, START_INDEX_ADJUSTMENT};

///
/// Narrow `[start, end)` for a chromosome of length `chrom_length` and a
/// fragment length `frag_len`.
///
/// The fragment window of a region is `[start - F + 1, end + F - 1]` and the
/// shear window extends it by two bases on each side. When the shear window
/// would fall off the start of the chromosome the region start is raised to
/// at least 3, and when it would fall off the end the region end is lowered to
/// at most `chrom_length - 2`.
///
/// Returns `None` when nothing is left of the region.
///
pub fn align_coordinates(start: u32, end: u32, chrom_length: u32, frag_len: u32) -> Option<(u32, u32)> {
    let frag_len = frag_len as i64;
    let length = chrom_length as i64;
    let mut start = start as i64;
    let mut end = end as i64;

    let frag_start = start - frag_len + START_INDEX_ADJUSTMENT;
    let frag_end = end + frag_len - START_INDEX_ADJUSTMENT;
    let shear_start = frag_start - SONICATION_SHEAR_BIAS_OFFSET;
    let shear_end = frag_end + SONICATION_SHEAR_BIAS_OFFSET;

    if shear_start < 1 {
        let frag_start = SONICATION_SHEAR_BIAS_OFFSET + START_INDEX_ADJUSTMENT;
        start = start.max(frag_start);
    }

    if shear_end > length {
        let frag_end = length - SONICATION_SHEAR_BIAS_OFFSET;
        end = end.min(frag_end);
    }

    if end <= start || start < 0 {
        return None;
    }

    Some((start as u32, end as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    #[case(100, 200, 1000, 10, Some((100, 200)))]
    #[case(0, 50, 1000, 10, Some((3, 50)))]
    #[case(5, 50, 1000, 10, Some((5, 50)))]
    #[case(900, 1000, 1000, 10, Some((900, 998)))]
    #[case(0, 1000, 1000, 1, Some((3, 998)))]
    #[case(0, 3, 1000, 5, None)]
    #[case(998, 1000, 1000, 5, None)]
    fn test_align_coordinates(
        #[case] start: u32,
        #[case] end: u32,
        #[case] length: u32,
        #[case] frag_len: u32,
        #[case] expected: Option<(u32, u32)>,
    ) {
        assert_eq!(align_coordinates(start, end, length, frag_len), expected);
    }

    #[rstest]
    fn test_align_is_idempotent() {
        let length = 5_000;
        for frag_len in [1, 2, 10, 200, 600] {
            for (start, end) in [(0, 100), (1, 4_999), (250, 300), (4_900, 5_000), (0, 5_000)] {
                let Some((s1, e1)) = align_coordinates(start, end, length, frag_len) else {
                    continue;
                };
                assert_eq!(align_coordinates(s1, e1, length, frag_len), Some((s1, e1)));
            }
        }
    }

    #[rstest]
    fn test_align_stays_in_bounds() {
        let length = 2_000;
        for frag_len in 1..=300 {
            if let Some((start, end)) = align_coordinates(0, length, length, frag_len) {
                assert!(start >= 3);
                assert!(end <= length - 2);
                assert!(start < end);
            }
        }
    }
}
