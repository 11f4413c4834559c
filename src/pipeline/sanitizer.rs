//! Strip the fenced-code wrapping generators put around their output.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// One fence opening at the very start of the input and one closing at the very end.
static WHOLE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\A\s*```[A-Za-z0-9#+._-]*[ \t]*\r?\n(?:(.*?)\r?\n)?[ \t]*```\s*\z")
        .expect("fence pattern is valid")
});

static FENCE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*```").expect("fence line pattern is valid"));

/// Return the body of a single fenced block spanning the whole input, trimmed.
///
/// Anything else (prose around the fence, several blocks, no fence at all) is
/// returned as-is apart from trimming.
pub fn sanitize(raw: &str) -> String {
    let Some(caps) = WHOLE_FENCE.captures(raw) else {
        return raw.trim().to_string();
    };

    let body = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    if FENCE_LINE.is_match(body) {
        debug!("Artifact contains more than one fenced block, leaving it untouched");
        return raw.trim().to_string();
    }

    body.trim().to_string()
}
