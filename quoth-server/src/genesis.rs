//! Genesis (C12, §4.12).
//!
//! `quoth_genesis` doesn't run any code server-side — it hands the calling
//! agent a fixed, parameterized system prompt that instructs it to scan the
//! connected repository itself and submit what it finds back through
//! `quoth_propose_update`. This module only builds that prompt text.
//!
//! Grounded on the teacher's `agents.rs` `TomlAgent`/`AgentPrompt` shape: a
//! static system prompt plus a fixed tool list, the same idiom scaled down
//! to one hardcoded persona instead of a registry of many.

const BASE_PROMPT: &str = "\
You are the Genesis Architect, tasked with bootstrapping documentation \
for a codebase that has none yet. Work through the following steps:

1. Scan the repository's structure, entry points, and build configuration \
to understand what this system does and how it's assembled.
2. Deduce its architecture: major components, how they communicate, and \
the data that flows between them.
3. Extract recurring patterns: testing conventions, error handling, \
naming, and anything else a new contributor would need to follow.
4. Submit what you find as documents via quoth_propose_update, one per \
logical topic (architecture, testing patterns, contracts), rather than a \
single monolithic document.

Do not execute or modify any code. Your output is documentation only.";

/// A prompt ready to hand to the calling agent.
pub struct GenesisPrompt {
    pub system: String,
    pub tools: Vec<String>,
}

/// Build the Genesis prompt, optionally narrowing scope with `focus` and
/// hinting the primary language with `language_hint` (§4.12).
pub fn build(focus: Option<&str>, language_hint: Option<&str>) -> GenesisPrompt {
    let mut system = BASE_PROMPT.to_string();

    if let Some(focus) = focus {
        system.push_str(&format!(
            "\n\nScope: update only documentation related to \"{focus}\". \
Leave unrelated documents untouched."
        ));
    }

    if let Some(language_hint) = language_hint {
        system.push_str(&format!(
            "\n\nThe codebase is primarily written in {language_hint}; tailor \
pattern extraction to idioms and tooling common in that language."
        ));
    }

    GenesisPrompt {
        system,
        tools: vec!["quoth_propose_update".to_string(), "quoth_read_doc".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_prompt_names_all_four_steps() {
        let prompt = build(None, None);
        for marker in ["1.", "2.", "3.", "4."] {
            assert!(prompt.system.contains(marker));
        }
    }

    #[test]
    fn focus_narrows_scope_in_prompt() {
        let prompt = build(Some("authentication"), None);
        assert!(prompt.system.contains("authentication"));
        assert!(prompt.system.contains("update only"));
    }

    #[test]
    fn language_hint_is_appended() {
        let prompt = build(None, Some("Rust"));
        assert!(prompt.system.contains("Rust"));
    }
}
