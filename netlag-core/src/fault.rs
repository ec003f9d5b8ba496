//! Error injection decisions and synthetic error responses.

use crate::network::HttpResponse;
use crate::random::RandomSource;

/// Decides whether the current call fails, given a rate in percent.
///
/// A rate of 0 never injects and a rate of 100 always does, since the
/// underlying draw is in `[0, 100)`.
pub fn should_inject_error(error_rate_percent: f64, rng: &mut dyn RandomSource) -> bool {
    rng.next_unit() * 100.0 < error_rate_percent
}

/// Builds the response returned in place of a real one when an error is injected.
///
/// The body is a JSON object `{"message": "Simulated <code> <text>"}`.
pub fn synthesize_error_response(status_code: u16, status_text: &str) -> HttpResponse {
    let body = serde_json::json!({
        "message": format!("Simulated {status_code} {status_text}"),
    });

    HttpResponse::new(status_code, body.to_string())
        .with_status_text(status_text)
        .with_header("content-type", "application/json")
}
