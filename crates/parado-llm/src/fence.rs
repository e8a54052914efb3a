use anyhow::{Result, anyhow};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fence {
    pub tag: String,
    pub body: String,
}

/// Splits out every ``` fenced block. The body is kept verbatim, including its
/// trailing newline; whatever follows the closing marker on its line is ignored.
pub fn fences(input: &str) -> Vec<Fence> {
    let mut found = Vec::new();
    let mut rest = input;

    while let Some(start) = rest.find("```") {
        let after_open = &rest[start + 3..];
        let Some(line_end) = after_open.find('\n') else {
            break;
        };
        let tag = after_open[..line_end].trim().to_string();
        let body_region = &after_open[line_end + 1..];
        let Some(end) = body_region.find("```") else {
            break;
        };

        found.push(Fence {
            tag,
            body: body_region[..end].to_string(),
        });

        let after_close = &body_region[end + 3..];
        rest = match after_close.find('\n') {
            Some(idx) => &after_close[idx + 1..],
            None => "",
        };
    }

    found
}

/// Picks a fence tagged with one of `preferred_tags`, then an untagged fence,
/// then the first fence of any kind.
pub fn extract_fenced_code(input: &str, preferred_tags: &[&str]) -> Option<String> {
    let all = fences(input);
    all.iter()
        .find(|fence| {
            preferred_tags
                .iter()
                .any(|tag| fence.tag.eq_ignore_ascii_case(tag))
        })
        .or_else(|| all.iter().find(|fence| fence.tag.is_empty()))
        .or_else(|| all.first())
        .map(|fence| fence.body.clone())
}

pub fn normalize_code_output(raw: &str, preferred_tags: &[&str]) -> Result<String> {
    if raw.trim().is_empty() {
        return Err(anyhow!("model returned empty output"));
    }

    if let Some(block) = extract_fenced_code(raw, preferred_tags) {
        if block.trim().is_empty() {
            return Err(anyhow!("model returned empty fenced output"));
        }
        return Ok(block);
    }

    Ok(raw.to_string())
}
