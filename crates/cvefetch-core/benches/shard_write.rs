use cvefetch_core::{ShardConfig, ShardWriter};
use serde_json::{Value, json};

fn synthetic_records(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            json!({
                "cve": {
                    "id": format!("CVE-2024-{i:05}"),
                    "published": "2024-01-01T00:00:00.000",
                    "descriptions": [{"lang": "en", "value": format!("Description for record {i}")}],
                }
            })
        })
        .collect()
}

#[divan::bench(args = [100, 1_000, 10_000])]
fn shard_write(bencher: divan::Bencher, max_records: usize) {
    let records = synthetic_records(10_000);
    let dir = tempfile::tempdir().unwrap();
    bencher.bench(|| {
        let mut writer = ShardWriter::create(ShardConfig {
            output_dir: dir.path().to_path_buf(),
            prefix: "cve".to_string(),
            max_records,
            max_bytes: usize::MAX,
        })
        .unwrap();
        for record in &records {
            writer.append(record).unwrap();
        }
        writer.finalize().unwrap();
    });
}

fn main() {
    divan::main();
}
