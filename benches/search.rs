use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ses::{BufferPosition, LineList, PatternKind, SearchExpression};

fn make_lines(count: usize) -> LineList {
    LineList::from_lines((0..count).map(|i| format!("word1 word2 word3 word4 word5 line{}", i)))
}

fn bench_search(c: &mut Criterion) {
    let medium = make_lines(10_000);
    let large = make_lines(100_000);
    let literal = SearchExpression::new("line99999", PatternKind::Literal, "").unwrap();
    let regex = SearchExpression::new(r"line9{4}\b", PatternKind::Regex, "").unwrap();
    let backward = SearchExpression::new("line0", PatternKind::Literal, "B").unwrap();

    c.bench_function("search_literal_100k", |b| {
        b.iter(|| {
            let mut list = large.clone();
            black_box(list.search(&literal, true))
        })
    });

    c.bench_function("search_regex_10k", |b| {
        b.iter(|| {
            let mut list = medium.clone();
            black_box(list.search(&regex, true))
        })
    });

    c.bench_function("search_backward_10k", |b| {
        b.iter(|| {
            let mut list = medium.clone();
            list.set_cursor(list.end_position());
            black_box(list.search(&backward, true))
        })
    });
}

fn bench_find(c: &mut Criterion) {
    let large = make_lines(100_000);
    let glob = SearchExpression::new("*line5000?", PatternKind::Glob, "").unwrap();

    c.bench_function("find_glob_100k", |b| {
        b.iter(|| black_box(large.find(&glob, 0)))
    });

    c.bench_function("copy_range_100k", |b| {
        b.iter(|| {
            black_box(large.copy_range(
                BufferPosition::new(1_000, 3),
                BufferPosition::new(90_000, 7),
                true,
            ))
        })
    });
}

criterion_group!(benches, bench_search, bench_find);
criterion_main!(benches);
