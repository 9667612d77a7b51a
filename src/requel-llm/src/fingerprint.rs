//! Request fingerprinting for the response cache.

use common_config::GenerationConfig;

/// Stable fingerprint of one generation request.
///
/// Hashes the provider name, model name, prompt text, temperature (clamped
/// and rounded to three decimals), max tokens, and candidate count. Two
/// requests with equal fingerprints are interchangeable for caching and
/// single-flight coalescing.
pub fn request_fingerprint(provider: &str, prompt: &str, config: &GenerationConfig) -> String {
    let mut hasher = blake3::Hasher::new();
    for field in [
        provider,
        config.model_name.as_str(),
        prompt,
        &format!("{:.3}", clamp_temperature(config.temperature)),
        &config.max_tokens.to_string(),
        &config.num_candidates.to_string(),
    ] {
        hasher.update(field.as_bytes());
        hasher.update(&[0x1f]);
    }
    hasher.finalize().to_hex().to_string()
}

/// Temperature clamped to the recognized [0.0, 2.0] range.
pub fn clamp_temperature(temperature: f64) -> f64 {
    temperature.clamp(0.0, 2.0)
}
