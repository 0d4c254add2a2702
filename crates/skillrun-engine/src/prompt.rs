//! System prompt assembly.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use skillrun_core::{Agent, Skill};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("valid placeholder pattern")
});

/// Prepended in forced mode.
pub const ISOLATION_BANNER: &str = "ISOLATED EXECUTION: only the capabilities selected for this task are \
available. Do not attempt to use tools or skills that are not listed.";

/// String form of a parameter value.
fn coerce(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Substitute `{{key}}` placeholders. Unknown keys are left as written.
pub fn render_template(text: &str, values: &BTreeMap<String, Value>) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => coerce(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Parameter listing, or `None` when there are no parameters.
pub fn parameter_block(values: &BTreeMap<String, Value>) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    let mut block = String::from("## Parameters\n");
    for (key, value) in values {
        block.push_str(&format!("- {}: {}\n", key, coerce(value)));
    }
    Some(block.trim_end().to_string())
}

/// Build the system prompt: banner (forced only), parameters, agent prompt,
/// then each skill body in selection order.
pub fn build_system_prompt(
    agent: &Agent,
    skills: &[Skill],
    forced: bool,
    values: &BTreeMap<String, Value>,
) -> String {
    let mut sections = Vec::new();
    if forced {
        sections.push(ISOLATION_BANNER.to_string());
    }
    if let Some(block) = parameter_block(values) {
        sections.push(block);
    }
    if !agent.system_prompt.trim().is_empty() {
        sections.push(render_template(agent.system_prompt.trim(), values));
    }
    for skill in skills {
        let mut section = format!("## Skill: {}", skill.name);
        if !skill.description.is_empty() {
            section.push_str(&format!("\n{}", skill.description));
        }
        if !skill.body.trim().is_empty() {
            section.push_str("\n\n");
            section.push_str(&render_template(skill.body.trim(), values));
        }
        sections.push(section);
    }
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values() -> BTreeMap<String, Value> {
        BTreeMap::from([
            ("url".to_string(), json!("https://example.com")),
            ("depth".to_string(), json!(2)),
        ])
    }

    #[test]
    fn placeholders_are_substituted() {
        assert_eq!(
            render_template("Fetch {{url}} to depth {{ depth }}", &values()),
            "Fetch https://example.com to depth 2"
        );
    }

    #[test]
    fn unresolved_placeholders_stay_verbatim() {
        assert_eq!(render_template("Use {{missing}}", &values()), "Use {{missing}}");
    }

    #[test]
    fn forced_prompt_has_banner_first() {
        let agent = Agent::new("a1", "Fetcher", "claude-sonnet-4");
        let skill = Skill::new("s1", "fetch", "Fetch {{url}}");

        let prompt = build_system_prompt(&agent, &[skill], true, &values());

        assert!(prompt.starts_with(ISOLATION_BANNER));
        assert!(prompt.contains("Fetch https://example.com"));
        assert!(prompt.contains("- url: https://example.com"));
        let params = prompt.find("## Parameters").unwrap();
        let body = prompt.find("## Skill: fetch").unwrap();
        assert!(params < body);
    }

    #[test]
    fn agent_prompt_without_banner() {
        let mut agent = Agent::new("a1", "Helper", "claude-sonnet-4");
        agent.system_prompt = "You are helpful.".into();

        let prompt = build_system_prompt(&agent, &[], false, &BTreeMap::new());
        assert_eq!(prompt, "You are helpful.");
    }
}
