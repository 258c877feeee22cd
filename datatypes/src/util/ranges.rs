/// Intersects two half-open ranges `[a_start, a_end)` and `[b_start, b_end)`.
/// Returns `None` if the intersection is empty.
pub fn intersect_half_open(
    (a_start, a_end): (isize, isize),
    (b_start, b_end): (isize, isize),
) -> Option<(isize, isize)> {
    let start = a_start.max(b_start);
    let end = a_end.min(b_end);

    (start < end).then_some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_open_intersection() {
        assert_eq!(intersect_half_open((0, 5), (3, 8)), Some((3, 5)));
        assert_eq!(intersect_half_open((-2, 2), (0, 10)), Some((0, 2)));
        assert_eq!(intersect_half_open((0, 5), (5, 8)), None);
        assert_eq!(intersect_half_open((6, 9), (0, 5)), None);
    }
}
