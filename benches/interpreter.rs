use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ses::{MemoryLogger, Script, SearchEngine};

fn lines(source: &str) -> Vec<String> {
    source.lines().map(String::from).collect()
}

const COUNTING: &str = "\
i := 0
total := 0
while $(i) < 1000
  i := i + 1
  total := total + i
endwhile";

const EDITING: &str = "\
move <
while search r/value/^
  replace r/value/L VALUE
endwhile";

fn bench_check(c: &mut Criterion) {
    let source = lines(&format!("{}\n{}\n", COUNTING, EDITING).repeat(20));

    c.bench_function("check_200_lines", |b| {
        b.iter(|| {
            let mut script = Script::new("bench", source.clone());
            black_box(script.check().map(|program| program.len()).unwrap())
        })
    });
}

fn bench_run(c: &mut Criterion) {
    c.bench_function("run_counting_loop", |b| {
        b.iter(|| {
            let mut engine = SearchEngine::default();
            engine.set_logger(MemoryLogger::new());
            engine.load_script("count", lines(COUNTING)).unwrap();
            black_box(engine.test_and_run(None))
        })
    });

    let input: Vec<String> = (0..1_000).map(|i| format!("value {}", i)).collect();
    c.bench_function("run_editing_1k", |b| {
        b.iter(|| {
            let mut engine = SearchEngine::default();
            engine.set_logger(MemoryLogger::new());
            engine.load_script("edit", lines(EDITING)).unwrap();
            engine.main_buffer_mut().set_lines(input.clone());
            black_box(engine.test_and_run(None))
        })
    });
}

criterion_group!(benches, bench_check, bench_run);
criterion_main!(benches);
