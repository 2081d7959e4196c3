use std::path::Path;

use criterion::{Criterion, criterion_group, criterion_main};
use typenv::EnvLoader;

fn bench_load(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let env_path = dir.path().join(".env");
    write_file(&env_path, &make_env_content(2_000));

    c.bench_function("load_in_memory", |b| {
        b.iter(|| {
            let mut loader = EnvLoader::new().path(&env_path);
            loader.load().expect("load should succeed")
        });
    });
}

fn make_env_content(entries: usize) -> String {
    let mut content = String::with_capacity(entries * 24);
    content.push_str("BASE=/srv/app\n");
    for idx in 0..entries {
        content.push_str("KEY_");
        content.push_str(&idx.to_string());
        content.push('=');
        match idx % 3 {
            0 => content.push_str("${BASE}/value"),
            1 => content.push_str(&idx.to_string()),
            _ => content.push_str("true"),
        }
        content.push('\n');
    }
    content
}

fn write_file(path: &Path, content: &str) {
    std::fs::write(path, content).expect("failed to write bench file");
}

criterion_group!(benches, bench_load);
criterion_main!(benches);
