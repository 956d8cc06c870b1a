use proptest::prelude::*;

use ses::line_list::ChangeType;
use ses::{BufferPosition, LineList, PatternKind, SearchExpression};

fn lines_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-cé ]{0,12}", 0..8)
}

fn assert_clamped(list: &LineList, position: BufferPosition) {
    let lines = list.lines();
    assert!(position.line <= lines.len());
    match lines.get(position.line) {
        Some(text) => {
            assert!(position.column <= text.len());
            assert!(text.is_char_boundary(position.column));
        }
        None => assert_eq!(position.column, 0),
    }
}

proptest! {
    #[test]
    fn set_position_always_clamps(
        lines in lines_strategy(),
        line in any::<usize>(),
        column in any::<usize>(),
    ) {
        let mut list = LineList::from_lines(lines);
        list.set_position(line, column);
        assert_clamped(&list, list.cursor());
        list.set_mark(BufferPosition::new(column, line));
        assert_clamped(&list, list.mark());
    }

    #[test]
    fn adapt_is_idempotent(
        lines in prop::collection::vec("[a-z]{1,6}=[0-9]{0,3}", 0..6),
        key in "[a-z]{1,6}",
        value in "[0-9]{1,3}",
    ) {
        let mut list = LineList::from_lines(lines);
        let pattern = SearchExpression::regex(&format!("^{}=", key)).unwrap();
        let replacement = format!("{}={}", key, value);
        list.adapt(&pattern, &replacement, None, false);
        let before = list.lines().to_vec();
        prop_assert_eq!(list.adapt(&pattern, &replacement, None, false), ChangeType::Unchanged);
        prop_assert_eq!(list.lines(), &before[..]);
    }

    #[test]
    fn copy_delete_insert_round_trip(
        lines in lines_strategy(),
        a in (0usize..10, 0usize..16),
        b in (0usize..10, 0usize..16),
    ) {
        let mut list = LineList::from_lines(lines);
        let original = list.lines().to_vec();
        let start = BufferPosition::new(a.0, a.1).clamped(&original);
        let end = BufferPosition::new(b.0, b.1).clamped(&original);
        let (start, end) = BufferPosition::ordered(start, end);

        let copied = list.copy_range(start, end, true);
        list.delete_range(start, end);
        list.insert(start, &copied, false);
        prop_assert_eq!(list.lines(), &original[..]);
    }

    #[test]
    fn forward_search_never_starts_before_cursor(
        lines in lines_strategy(),
        line in 0usize..8,
        column in 0usize..16,
    ) {
        let mut list = LineList::from_lines(lines);
        list.set_position(line, column);
        let cursor = list.cursor();
        let expr = SearchExpression::new("a", PatternKind::Literal, "").unwrap();
        let result = list.search(&expr, false);
        if result.found {
            prop_assert!(result.position >= cursor);
        }
    }

    #[test]
    fn backward_search_never_ends_after_cursor(
        lines in lines_strategy(),
        line in 0usize..8,
        column in 0usize..16,
    ) {
        let mut list = LineList::from_lines(lines);
        list.set_position(line, column);
        let cursor = list.cursor();
        let expr = SearchExpression::new("ab", PatternKind::Literal, "B").unwrap();
        let result = list.search(&expr, false);
        if result.found {
            prop_assert!(result.end() <= cursor);
        }
    }

    #[test]
    fn anchored_search_hits_each_line_once(lines in lines_strategy()) {
        let mut list = LineList::from_lines(lines);
        let expected = list.lines().iter().filter(|l| l.starts_with('a')).count();
        let expr = SearchExpression::new("^a", PatternKind::Literal, "").unwrap();
        let mut hits = 0;
        while hits <= expected && list.search(&expr, true).found {
            hits += 1;
        }
        prop_assert_eq!(hits, expected);
    }
}

