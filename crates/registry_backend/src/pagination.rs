//! Shared `n`/`last` cursor pagination (§4.5, §4.6): sort, find the entry strictly
//! after `last` (if given), then take at most `n` entries. Returns whether more
//! entries remain past the returned page so callers can decide whether to signal
//! a `next` cursor -- §8's own boundary case requires that `n=len(all)` returns no
//! `next`, which a bare `page.len() == n` check can't distinguish from "there are
//! more".
pub fn paginate(mut items: Vec<String>, n: Option<i64>, last: Option<String>) -> (Vec<String>, bool) {
    items.sort();
    items.dedup();

    let start = match last {
        Some(last) => match items.binary_search(&last) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        },
        None => 0,
    };

    let remaining = &items[start.min(items.len())..];

    match n {
        Some(n) if n >= 0 => {
            let n = n as usize;
            let has_more = remaining.len() > n;
            (remaining.iter().take(n).cloned().collect(), has_more)
        }
        _ => (remaining.to_vec(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginates_after_cursor() {
        let items = vec!["a".into(), "c".into(), "b".into()];
        let (page, has_more) = paginate(items, Some(1), Some("a".into()));
        assert_eq!(page, vec!["b".to_string()]);
        assert!(has_more);
    }

    #[test]
    fn no_cursor_starts_at_beginning() {
        let items = vec!["b".into(), "a".into()];
        let (page, has_more) = paginate(items, Some(1), None);
        assert_eq!(page, vec!["a".to_string()]);
        assert!(has_more);
    }

    #[test]
    fn missing_cursor_falls_back_to_insertion_point() {
        let items = vec!["a".into(), "c".into()];
        let (page, has_more) = paginate(items, None, Some("b".into()));
        assert_eq!(page, vec!["c".to_string()]);
        assert!(!has_more);
    }

    #[test]
    fn n_equal_to_total_has_no_more() {
        let items = vec!["a".into(), "b".into()];
        let (page, has_more) = paginate(items, Some(2), None);
        assert_eq!(page, vec!["a".to_string(), "b".to_string()]);
        assert!(!has_more);
    }

    #[test]
    fn n_zero_returns_empty_and_no_more_when_collection_is_empty() {
        let (page, has_more) = paginate(Vec::new(), Some(0), None);
        assert!(page.is_empty());
        assert!(!has_more);
    }
}
