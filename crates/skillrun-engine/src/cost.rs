//! Token cost estimate for runs whose result carries no cost.

use skillrun_core::Usage;

/// USD per million tokens: (input, output).
const OPUS: (f64, f64) = (15.0, 75.0);
const SONNET: (f64, f64) = (3.0, 15.0);
const HAIKU: (f64, f64) = (0.80, 4.0);

fn prices(model: &str) -> (f64, f64) {
    let model = model.to_ascii_lowercase();
    if model.contains("opus") {
        OPUS
    } else if model.contains("haiku") {
        HAIKU
    } else {
        SONNET
    }
}

/// Estimated cost of `usage` on `model`. Unknown models price as sonnet.
pub fn estimate_cost(model: &str, usage: &Usage) -> f64 {
    let (input, output) = prices(model);
    (usage.input_tokens as f64 * input + usage.output_tokens as f64 * output) / 1_000_000.0
}
