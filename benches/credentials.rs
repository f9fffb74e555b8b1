use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use uuid::Uuid;

use cinema_booking::config::JwtConfig;
use cinema_booking::services::credentials::{hash_password, verify_password, TokenService};

fn bench_passwords(c: &mut Criterion) {
    let hash = hash_password("Passw0rd!").expect("hash");

    let mut group = c.benchmark_group("password");
    group.sample_size(10);
    group.bench_function("hash", |b| b.iter(|| hash_password(black_box("Passw0rd!"))));
    group.bench_function("verify", |b| {
        b.iter(|| verify_password(black_box("Passw0rd!"), black_box(&hash)))
    });
    group.finish();
}

fn bench_tokens(c: &mut Criterion) {
    let tokens = TokenService::new(&JwtConfig {
        secret: "bench-secret".to_string(),
        expires_in_hours: 24,
    });
    let user_id = Uuid::new_v4();
    let token = tokens.issue_token_at(user_id, Utc::now()).expect("token");

    c.bench_function("token/issue", |b| b.iter(|| tokens.issue_token(black_box(user_id))));
    c.bench_function("token/verify", |b| b.iter(|| tokens.verify_token(black_box(&token))));
}

criterion_group!(benches, bench_passwords, bench_tokens);
criterion_main!(benches);
