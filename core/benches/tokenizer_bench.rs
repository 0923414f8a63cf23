use criterion::{criterion_group, criterion_main, Criterion};
use quarry_core::tokenizer::{Analyzer, AnalyzerConfig};
use quarry_core::DocTerms;

const TEXT: &str = "Title: The Shawshank Redemption\nYear: 1994\nDirector: Frank Darabont\n\
Cast: Tim Robbins, Morgan Freeman, Bob Gunton, William Sadler\nGenre: Drama\n\
Notes: Two imprisoned men bond over a number of years, finding solace and eventual \
redemption through acts of common decency.\n";

fn bench_analyze(c: &mut Criterion) {
    let text = TEXT.repeat(50);
    let plain = Analyzer::default();
    let full = Analyzer::new(AnalyzerConfig { stopwords: true, stem: true });
    c.bench_function("analyze_plain", |b| b.iter(|| plain.analyze(&text).terms()));
    c.bench_function("analyze_stem_stop", |b| b.iter(|| full.analyze(&text).terms()));
    c.bench_function("doc_terms", |b| b.iter(|| DocTerms::from_stream(&plain.analyze(&text))));
}

criterion_group!(benches, bench_analyze);
criterion_main!(benches);
