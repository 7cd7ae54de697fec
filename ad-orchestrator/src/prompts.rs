use crate::types::AdBrief;
use tracing::warn;

const STANDARD: &str = r#"IMPORTANT: You must output a single, valid UTF-8 JSON object. Absolutely nothing else.

Context:
You are generating a realistic product ad for the following:
- Product: {product_name}
- Target Audience: {audience_demographics}
- Tone: {tone}
- Reference Link: https://www.amazon.com/dp/{product_ref}

The goal is to:
1. Write an ad description using the specified tone and audience.
2. Provide a detailed scene prompt for use in image generation (include setting, objects, people if relevant).

STRICT RULES (Failure on any rule makes the output invalid):
1. Output only a raw JSON object. No markdown, no comments, no backticks, no prose.
2. All keys must be double-quoted ASCII.
3. All string values must be double-quoted UTF-8, with no control characters.
4. No trailing commas, missing commas, or malformed brackets/braces.
5. You MUST return at least these keys:
   - "product": string
   - "audience": string or list of strings
   - "tone": string
   - "description": string
   - "features": list of strings
   - "scene": a richly detailed text prompt for image generation

Output Example (for format only, do not copy):
{
  "product": "Example Product",
  "audience": ["photographers", "tech lovers"],
  "tone": "excited",
  "description": "This camera changes how you capture light and motion...",
  "features": ["Ultra HD", "Stabilized Zoom", "Wireless sync"],
  "scene": "A photographer holding the camera on a mountain at sunrise, dramatic golden light, 4K realism"
}"#;

const CREATIVE: &str = r#"Generate a creative advertisement in JSON format for:
Product: {product_name}
Target: {audience_demographics}
Style: {tone}
Amazon: https://www.amazon.com/dp/{product_ref}

Focus on emotional connection and storytelling. Return valid JSON with:
- product, audience, tone, description, features, scene

Keep description compelling and scene visually rich for image generation."#;

const CONCISE: &str = r#"Create JSON ad for {product_name} targeting {audience_demographics} with {tone} tone.
Amazon: https://www.amazon.com/dp/{product_ref}
Required: product, audience, tone, description, features, scene"#;

const TECH: &str = r#"Technical product advertisement for {product_name}:
Target: {audience_demographics}
Tone: {tone}
Link: https://www.amazon.com/dp/{product_ref}

Emphasize specifications, performance, and technical benefits.
JSON format with product, audience, tone, description, features, scene."#;

pub const TEMPLATE_NAMES: &[&str] = &["standard", "creative", "concise", "tech"];

fn builtin(name: &str) -> Option<&'static str> {
    match name {
        "standard" => Some(STANDARD),
        "creative" => Some(CREATIVE),
        "concise" => Some(CONCISE),
        "tech" => Some(TECH),
        _ => None,
    }
}

/// Picks and fills the prompt sent to the text generator.
#[derive(Debug, Clone)]
pub struct PromptCatalog {
    default_template: String,
    custom_template: Option<String>,
}

impl Default for PromptCatalog {
    fn default() -> Self {
        Self::new("standard", None)
    }
}

impl PromptCatalog {
    /// A non-empty custom template overrides every named template.
    pub fn new(default_template: impl Into<String>, custom_template: Option<String>) -> Self {
        let mut default_template = default_template.into();
        if builtin(&default_template).is_none() {
            warn!("Unknown prompt template '{}', using standard", default_template);
            default_template = "standard".to_string();
        }

        Self {
            default_template,
            custom_template: custom_template.filter(|t| !t.trim().is_empty()),
        }
    }

    pub fn is_known(name: &str) -> bool {
        builtin(name).is_some()
    }

    pub fn render(&self, brief: &AdBrief) -> String {
        let template = match &self.custom_template {
            Some(custom) => custom.as_str(),
            None => {
                let name = brief.template.as_deref().unwrap_or(&self.default_template);
                builtin(name).unwrap_or(STANDARD)
            }
        };

        let mut prompt = fill(template, brief);

        if let Some(theme) = &brief.theme_hint {
            prompt.push_str(&format!(
                "\n\nTrending theme: weave this upbeat theme into the description and scene: {}",
                theme
            ));
        }

        prompt
    }
}

fn placeholder<'a>(name: &str, brief: &'a AdBrief) -> Option<&'a str> {
    match name {
        "product_name" => Some(&brief.product),
        "audience_demographics" => Some(&brief.audience),
        "tone" => Some(&brief.tone),
        "product_ref" | "asin" => Some(&brief.product_ref),
        _ => None,
    }
}

/// Single pass over the template: `{{`/`}}` become literal braces and known
/// `{name}` placeholders are filled. Substituted text is never rescanned.
fn fill(template: &str, brief: &AdBrief) -> String {
    let mut out = String::with_capacity(template.len() + 128);
    let mut rest = template;

    while let Some(pos) = rest.find(|c: char| c == '{' || c == '}') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('{') {
            let filled = tail
                .find('}')
                .and_then(|end| placeholder(&tail[1..end], brief).map(|value| (value, end)));
            if let Some((value, end)) = filled {
                out.push_str(value);
                rest = &tail[end + 1..];
                continue;
            }
        }
        // Lone brace, or an unknown name: keep it as written.
        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brief() -> AdBrief {
        AdBrief {
            product: "Trail Runner X".to_string(),
            audience: "weekend hikers".to_string(),
            tone: "energetic".to_string(),
            product_ref: "B0TEST1234".to_string(),
            ..AdBrief::default()
        }
    }

    #[test]
    fn placeholders_are_filled() {
        let prompt = PromptCatalog::default().render(&brief());
        assert!(prompt.contains("- Product: Trail Runner X"));
        assert!(prompt.contains("https://www.amazon.com/dp/B0TEST1234"));
        assert!(!prompt.contains("{product_name}"));
    }

    #[test]
    fn brief_can_pick_a_template_and_theme() {
        let mut brief = brief();
        brief.template = Some("concise".to_string());
        brief.theme_hint = Some("A joyful autumn festival".to_string());

        let prompt = PromptCatalog::default().render(&brief);
        assert!(prompt.starts_with("Create JSON ad for Trail Runner X"));
        assert!(prompt.ends_with("A joyful autumn festival"));
    }

    #[test]
    fn custom_template_wins() {
        let catalog = PromptCatalog::new("tech", Some("Sell {product_name} to {audience_demographics}".to_string()));
        assert_eq!(catalog.render(&brief()), "Sell Trail Runner X to weekend hikers");
    }

    #[test]
    fn caller_braces_survive_rendering() {
        let mut brief = brief();
        brief.product = "Mug {tone} {{limited}}".to_string();
        let catalog = PromptCatalog::new("standard", Some("Sell {product_name} as {{json}} {unknown}".to_string()));

        assert_eq!(catalog.render(&brief), "Sell Mug {tone} {{limited}} as {json} {unknown}");
    }

    #[test]
    fn json_example_braces_are_kept() {
        let prompt = PromptCatalog::default().render(&brief());
        assert!(prompt.contains("{\n  \"product\": \"Example Product\""));
        assert!(prompt.ends_with("4K realism\"\n}"));
    }
}
