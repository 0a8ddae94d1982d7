use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mcqeval_core::answer::normalize_answer;

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize_answer");

    let bare = "C";
    let sentence = "The answer is B.";
    let run_of_labels = "BD";
    let no_label = "I am not sure about this one, sorry.";

    let verbose = {
        let mut s = String::new();
        for i in 0..200 {
            s.push_str(&format!("Considering option number {i} carefully. "));
        }
        s.push_str("Final answer: D");
        s
    };

    group.bench_function("bare", |b| b.iter(|| normalize_answer(black_box(bare))));

    group.bench_function("sentence", |b| {
        b.iter(|| normalize_answer(black_box(sentence)))
    });

    group.bench_function("run_of_labels", |b| {
        b.iter(|| normalize_answer(black_box(run_of_labels)))
    });

    group.bench_function("no_label", |b| {
        b.iter(|| normalize_answer(black_box(no_label)))
    });

    group.bench_function("verbose", |b| {
        b.iter(|| normalize_answer(black_box(&verbose)))
    });

    group.finish();
}

fn bench_toml_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("toml_parsing");

    let small_toml = generate_question_set_toml(5);
    let large_toml = generate_question_set_toml(200);

    group.bench_function("5_questions", |b| {
        b.iter(|| {
            mcqeval_core::parser::parse_question_set_str(
                black_box(&small_toml),
                black_box("bench.toml".as_ref()),
            )
        })
    });

    group.bench_function("200_questions", |b| {
        b.iter(|| {
            mcqeval_core::parser::parse_question_set_str(
                black_box(&large_toml),
                black_box("bench.toml".as_ref()),
            )
        })
    });

    group.finish();
}

fn generate_question_set_toml(n: usize) -> String {
    let mut s = String::from("[question_set]\ndomain = \"History\"\n");
    for i in 0..n {
        s.push_str(&format!(
            r#"
[[questions]]
id = "q_{i}"
question = "Question number {i}?"
answer = "A"

[questions.choices]
A = "first {i}"
B = "second {i}"
C = "third {i}"
D = "fourth {i}"
"#
        ));
    }
    s
}

criterion_group!(benches, bench_normalize, bench_toml_parsing);
criterion_main!(benches);
