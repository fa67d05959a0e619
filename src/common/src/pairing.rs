//! Positional pairing of parallel DOM lists.
//!
//! Both sites render related data as sibling lists that only line up by
//! index: odds column headers and the value buttons of each player row, the
//! fixed names column and the scrolling stats table of a boxscore, period
//! headings and each team's period scores. Every such pairing goes through
//! [`zip_by_index`] so the matching rule lives in one place.

/// Pair every item of `primary` with the item of `secondary` at the same index.
///
/// `primary` drives the iteration; a missing counterpart is `None`, and extra
/// `secondary` items are ignored.
pub fn zip_by_index<'a, A, B>(
    primary: &'a [A],
    secondary: &'a [B],
) -> impl Iterator<Item = (&'a A, Option<&'a B>)> + 'a {
    primary
        .iter()
        .enumerate()
        .map(move |(index, item)| (item, secondary.get(index)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_by_position() {
        let labels = ["1", "2", "3"];
        let values = [10, 20, 30];
        let pairs: Vec<_> = zip_by_index(&labels, &values).collect();
        assert_eq!(pairs, vec![(&"1", Some(&10)), (&"2", Some(&20)), (&"3", Some(&30))]);
    }

    #[test]
    fn test_short_secondary_yields_none() {
        let labels = ["a", "b"];
        let values = [1];
        let pairs: Vec<_> = zip_by_index(&labels, &values).collect();
        assert_eq!(pairs, vec![(&"a", Some(&1)), (&"b", None)]);
    }

    #[test]
    fn test_extra_secondary_is_ignored() {
        let labels = ["a"];
        let values = [1, 2, 3];
        assert_eq!(zip_by_index(&labels, &values).count(), 1);
    }
}
