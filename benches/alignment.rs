use autocue::align::emission::EmissionBuffer;
use autocue::align::online::OnlineMatcher;
use autocue::align::viterbi::ViterbiMatcher;
use autocue::align::{Matcher, TokenId};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

const VOCAB: usize = 32;
const BLANK: TokenId = 0;

fn peaked(sequence: &[TokenId]) -> EmissionBuffer {
    let mut buf = EmissionBuffer::new(VOCAB);
    let low = (0.2f32 / (VOCAB as f32 - 1.0)).ln();
    let high = 0.8f32.ln();
    for &token in sequence {
        let mut frame = vec![low; VOCAB];
        frame[token as usize] = high;
        buf.push_frame(&frame);
    }
    buf
}

/// A clean read of `count` tokens, one blank frame between each.
fn reading(count: usize) -> (EmissionBuffer, Vec<TokenId>) {
    let tokens: Vec<TokenId> = (0..count).map(|i| (i % (VOCAB - 1) + 1) as TokenId).collect();
    let mut frames = Vec::with_capacity(count * 2);
    for &token in &tokens {
        frames.push(token);
        frames.push(BLANK);
    }
    (peaked(&frames), tokens)
}

fn bench_trellis_match(c: &mut Criterion) {
    c.bench_function("viterbi_match_25_tokens_200_frames", |b| {
        let (emissions, tokens) = reading(25);
        let mut padded = emissions.clone();
        let view = emissions.view();
        for t in 0..(200usize.saturating_sub(view.frames())) {
            padded.push_frame(view.frame(t % view.frames()));
        }
        let matcher = ViterbiMatcher::new(BLANK, 3, 0.35);
        b.iter(|| {
            matcher
                .find_match(black_box(padded.view()), black_box(&tokens))
                .unwrap()
        });
    });
}

fn bench_online_stream(c: &mut Criterion) {
    c.bench_function("online_feed_1000_frames", |b| {
        let (emissions, tokens) = reading(100);
        let mut stream = EmissionBuffer::new(VOCAB);
        let view = emissions.view();
        for t in 0..1000 {
            stream.push_frame(view.frame(t % view.frames()));
        }
        b.iter(|| {
            let mut online =
                OnlineMatcher::new(ViterbiMatcher::new(BLANK, 3, 0.35), 150, 50).unwrap();
            online
                .feed(black_box(stream.view()), black_box(&tokens))
                .unwrap()
        });
    });
}

criterion_group!(alignment_benches, bench_trellis_match, bench_online_stream);
criterion_main!(alignment_benches);
