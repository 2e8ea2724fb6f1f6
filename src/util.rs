use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Hash of an entity id that is identical across runs and engine restarts.
pub fn stable_hash(id: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    hasher.finish()
}

/// Deterministic pair in `[-1, 1]` derived from an entity id, used to spread
/// freshly spawned entities without depending on spawn order.
pub fn stable_pair(id: &str) -> (f32, f32) {
    let hash = stable_hash(id);

    let x = ((hash & 0xffff_ffff) as f64 / u32::MAX as f64) as f32;
    let y = (((hash >> 32) & 0xffff_ffff) as f64 / u32::MAX as f64) as f32;
    ((x * 2.0) - 1.0, (y * 2.0) - 1.0)
}
