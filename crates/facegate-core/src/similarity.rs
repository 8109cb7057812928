use crate::descriptor::Descriptor;

/// Cosine similarity between two validated descriptors.
///
/// Returns a value in [-1, 1]. A zero-magnitude vector, or a ratio that
/// is not finite, yields exactly 0. The result is clamped to absorb
/// rounding overshoot from the division.
pub fn cosine_similarity(a: &Descriptor, b: &Descriptor) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return 0.0;
    }
    let ratio = dot / denom;
    if !ratio.is_finite() {
        return 0.0;
    }
    ratio.clamp(-1.0, 1.0)
}
