//! Prompt definitions compiled into the binary.

/// Ids of every built-in prompt.
pub const BUILTIN_PROMPT_IDS: [&str; 7] = [
    "judge.safety",
    "judge.route",
    "judge.relevance",
    "judge.grounded",
    "judge.sufficient",
    "answer.rag",
    "answer.plain",
];

/// Raw YAML of a built-in prompt.
pub fn builtin_source(prompt_id: &str) -> Option<&'static str> {
    let source = match prompt_id {
        "judge.safety" => include_str!("../prompts/judge.safety.yml"),
        "judge.route" => include_str!("../prompts/judge.route.yml"),
        "judge.relevance" => include_str!("../prompts/judge.relevance.yml"),
        "judge.grounded" => include_str!("../prompts/judge.grounded.yml"),
        "judge.sufficient" => include_str!("../prompts/judge.sufficient.yml"),
        "answer.rag" => include_str!("../prompts/answer.rag.yml"),
        "answer.plain" => include_str!("../prompts/answer.plain.yml"),
        _ => return None,
    };
    Some(source)
}
