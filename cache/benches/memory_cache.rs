use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use glint_cache::{Bitmap, BitmapPool, MemoryCache, MemoryCacheKey, MemoryCacheValue, PixelConfig};
use std::sync::Arc;

const BITMAP_BYTES: u32 = 64 * 64;

fn build_cache(entries: u64, pooled: bool) -> MemoryCache {
  let budget = entries * BITMAP_BYTES as u64 * 4;
  let mut builder = MemoryCache::builder().max_size_bytes(budget);
  if pooled {
    builder = builder.bitmap_pooling_max_size(budget);
  }
  builder.build().unwrap()
}

fn value() -> MemoryCacheValue {
  MemoryCacheValue::new(Arc::new(Bitmap::new(64, 64, PixelConfig::Argb8888)))
}

fn get_hit(c: &mut Criterion) {
  let mut group = c.benchmark_group("MemoryCache/GetHit");
  for entries in [100u64, 1_000] {
    let cache = build_cache(entries, false);
    let keys: Vec<MemoryCacheKey> = (0..entries).map(|i| MemoryCacheKey::new(format!("image-{i}"))).collect();
    for key in &keys {
      cache.set(key.clone(), value());
    }

    group.throughput(Throughput::Elements(keys.len() as u64));
    group.bench_with_input(BenchmarkId::from_parameter(entries), &keys, |b, keys| {
      b.iter(|| {
        for key in keys {
          black_box(cache.get(key));
        }
      })
    });
  }
  group.finish();
}

fn set_evicting(c: &mut Criterion) {
  let mut group = c.benchmark_group("MemoryCache/SetEvicting");
  for pooled in [false, true] {
    let cache = build_cache(100, pooled);
    let keys: Vec<MemoryCacheKey> = (0..1_000).map(|i| MemoryCacheKey::new(format!("image-{i}"))).collect();

    group.throughput(Throughput::Elements(keys.len() as u64));
    let label = if pooled { "pooled" } else { "unpooled" };
    group.bench_with_input(BenchmarkId::from_parameter(label), &keys, |b, keys| {
      b.iter(|| {
        for key in keys {
          let bitmap = cache
            .bitmap_pool()
            .get_dirty(64, 64, PixelConfig::Argb8888);
          cache.set(key.clone(), MemoryCacheValue::new(Arc::new(bitmap)));
        }
      })
    });
  }
  group.finish();
}

criterion_group!(benches, get_hit, set_evicting);
criterion_main!(benches);
