use criterion::{black_box, criterion_group, criterion_main, Criterion};
use discourse_harvester::chapters::extractor::container_lines;
use discourse_harvester::chapters::similarity::ratio;
use discourse_harvester::chapters::strategies::FieldStrategies;
use discourse_harvester::config::Config;
use discourse_harvester::TranscriptCleaner;
use scraper::Html;

fn sample_lines(paragraphs: usize) -> Vec<String> {
    let mut lines = vec![
        "Home".to_string(),
        "Sample Series".to_string(),
        "Sample Series 04".to_string(),
        "01:24:07".to_string(),
        "WHAT IS MEDITATION".to_string(),
        "Copyright © OSHO International Foundation".to_string(),
    ];
    for i in 0..paragraphs {
        lines.push(format!(
            "Beloved ones, question {} is about awareness, and awareness is not an effort but a relaxation.",
            i
        ));
    }
    lines
}

fn bench_similarity(c: &mut Criterion) {
    c.bench_function("similarity_short", |b| {
        b.iter(|| black_box(ratio(black_box("Sample Series"), black_box("Sample Series 12"))))
    });

    let long_a = "The way of the heart is the way of love, and love knows no bounds.".repeat(4);
    let long_b = "The way of the head is the way of logic, and logic knows its bounds.".repeat(4);
    c.bench_function("similarity_long", |b| {
        b.iter(|| black_box(ratio(black_box(&long_a), black_box(&long_b))))
    });
}

fn bench_transcript_cleaner(c: &mut Criterion) {
    let config = Config::default();
    let cleaner = TranscriptCleaner::new(&config.transcript);

    let small = sample_lines(20);
    c.bench_function("clean_small_transcript", |b| {
        b.iter(|| black_box(cleaner.clean(black_box(&small), "Sample Series")))
    });

    let large = sample_lines(500);
    c.bench_function("clean_large_transcript", |b| {
        b.iter(|| black_box(cleaner.clean(black_box(&large), "Sample Series")))
    });
}

fn bench_container_lines(c: &mut Criterion) {
    let config = Config::default();
    let strategies = FieldStrategies::new(&config.extraction).expect("strategies");
    let body: String = sample_lines(200).iter().map(|line| format!("<p>{}</p>", line)).collect();
    let html = format!(r#"<html><body><div class="entry-content">{}</div></body></html>"#, body);

    c.bench_function("container_lines_200_paragraphs", |b| {
        b.iter(|| {
            let document = Html::parse_document(black_box(&html));
            let lines = strategies
                .container(&document)
                .map(|(_, container)| container_lines(container))
                .unwrap_or_default();
            black_box(lines)
        })
    });
}

criterion_group!(benches, bench_similarity, bench_transcript_cleaner, bench_container_lines);
criterion_main!(benches);
