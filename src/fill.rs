//! Partition-local fill combinators shared by the schedule merge and the
//! metric derivation.
//!
//! Callers pass slices already ordered by the partition's key.

/// Carries the last known value forward over gaps.
pub fn forward_fill<T: Clone>(values: &mut [Option<T>]) {
    let mut last: Option<T> = None;
    for value in values.iter_mut() {
        match value {
            Some(v) => last = Some(v.clone()),
            None => *value = last.clone(),
        }
    }
}

/// Carries the next known value backward over gaps.
pub fn backward_fill<T: Clone>(values: &mut [Option<T>]) {
    let mut next: Option<T> = None;
    for value in values.iter_mut().rev() {
        match value {
            Some(v) => next = Some(v.clone()),
            None => *value = next.clone(),
        }
    }
}

/// Forward fill, then backward fill, so only an all-empty slice stays empty.
pub fn fill_both<T: Clone>(values: &mut [Option<T>]) {
    forward_fill(values);
    backward_fill(values);
}

/// Fills one column of a partition in place.
///
/// `get` and `set` project the column out of each record, which lets the same
/// routine reconcile any trip-constant attribute.
pub fn fill_column<R, T: Clone>(
    rows: &mut [R],
    get: impl Fn(&R) -> Option<T>,
    set: impl Fn(&mut R, Option<T>),
) {
    let mut column: Vec<Option<T>> = rows.iter().map(&get).collect();
    fill_both(&mut column);
    for (row, value) in rows.iter_mut().zip(column) {
        set(row, value);
    }
}

/// The maximum over all *previous* positions, ignoring gaps: a cumulative max
/// shifted by one. Position 0 is always `None`.
pub fn shifted_cummax<T: Ord + Clone>(values: &[Option<T>]) -> Vec<Option<T>> {
    let mut out = Vec::with_capacity(values.len());
    let mut running: Option<T> = None;
    for value in values {
        out.push(running.clone());
        if let Some(v) = value {
            running = match running {
                Some(r) if r >= *v => Some(r),
                _ => Some(v.clone()),
            };
        }
    }
    out
}

/// The next position's value (a lead by one). The last position is `None`.
pub fn lead<T: Clone>(values: &[Option<T>]) -> Vec<Option<T>> {
    let mut out: Vec<Option<T>> = values.iter().skip(1).cloned().collect();
    out.push(None);
    out.truncate(values.len());
    out
}

/// `min` over the present values only.
pub fn min_present<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// `max` over the present values only.
pub fn max_present<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_fill() {
        let mut v = vec![None, Some(1), None, Some(3), None];
        forward_fill(&mut v);
        assert_eq!(v, vec![None, Some(1), Some(1), Some(3), Some(3)]);
    }

    #[test]
    fn test_fill_both_reaches_leading_gap() {
        let mut v = vec![None, None, Some("a"), None, Some("b")];
        fill_both(&mut v);
        assert_eq!(v, vec![Some("a"), Some("a"), Some("a"), Some("a"), Some("b")]);
    }

    #[test]
    fn test_fill_both_all_empty() {
        let mut v: Vec<Option<i32>> = vec![None, None];
        fill_both(&mut v);
        assert_eq!(v, vec![None, None]);
    }

    #[test]
    fn test_fill_column_on_records() {
        #[derive(Debug, PartialEq)]
        struct Row {
            route: Option<String>,
        }
        let mut rows = vec![
            Row { route: None },
            Row {
                route: Some("1".into()),
            },
            Row { route: None },
        ];
        fill_column(&mut rows, |r| r.route.clone(), |r, v| r.route = v);
        assert!(rows.iter().all(|r| r.route.as_deref() == Some("1")));
    }

    #[test]
    fn test_shifted_cummax_skips_gaps() {
        let v = vec![Some(5), None, Some(3), Some(9), Some(1)];
        assert_eq!(
            shifted_cummax(&v),
            vec![None, Some(5), Some(5), Some(5), Some(9)]
        );
    }

    #[test]
    fn test_lead() {
        assert_eq!(
            lead(&[Some(1), None, Some(3)]),
            vec![None, Some(3), None]
        );
        assert!(lead::<i32>(&[]).is_empty());
    }

    #[test]
    fn test_min_max_present_ignore_nulls() {
        assert_eq!(min_present(Some(2), None), Some(2));
        assert_eq!(min_present(Some(2), Some(1)), Some(1));
        assert_eq!(max_present(None, Some(4)), Some(4));
        assert_eq!(max_present::<i32>(None, None), None);
    }
}
