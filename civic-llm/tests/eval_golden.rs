//! Prompt quality evaluation: golden test set.
//!
//! Curated template/variable pairs with strings the rendered prompt must
//! and must not contain. These run offline and check only rendering; the
//! model's prose is not under test.

use civic_llm::prompt::{self, PromptEngine, PromptId};

/// A golden test case for prompt evaluation.
struct GoldenCase {
    /// Human-readable name.
    name: &'static str,
    /// Template constant to render.
    template: &'static str,
    /// Template variables.
    vars: Vec<(&'static str, &'static str)>,
    /// Strings that must appear in the rendered prompt.
    prompt_must_contain: Vec<&'static str>,
    /// Strings that must not appear in the rendered prompt.
    prompt_must_not_contain: Vec<&'static str>,
}

fn golden_cases() -> Vec<GoldenCase> {
    vec![
        // ---------------------------------------------------------------
        // 1. Newborn persona: first child of a young couple
        // ---------------------------------------------------------------
        GoldenCase {
            name: "first_child_persona_user",
            template: prompt::CHILD_PERSONA_USER,
            vars: vec![
                ("date", "2026-01-02"),
                ("address", "B-004"),
                (
                    "parents",
                    "- Marcus Reed (male, adult): Calm and methodical; values family, honesty\n- Elena Reed (female, adult): Warm and talkative; values community",
                ),
                ("recent_events", "(none)"),
            ],
            prompt_must_contain: vec!["2026-01-02", "B-004", "Marcus Reed", "Elena Reed", "\"age_group\""],
            prompt_must_not_contain: vec!["{date}", "{address}", "{parents}", "{recent_events}"],
        },
        GoldenCase {
            name: "persona_system_contract",
            template: prompt::CHILD_PERSONA_SYSTEM,
            vars: vec![],
            prompt_must_contain: vec!["child or teen", "JSON", "both parents"],
            prompt_must_not_contain: vec!["TODO"],
        },
        // ---------------------------------------------------------------
        // 2. Persona with earlier births as context
        // ---------------------------------------------------------------
        GoldenCase {
            name: "persona_with_recent_births",
            template: prompt::CHILD_PERSONA_USER,
            vars: vec![
                ("date", "2026-05-19"),
                ("address", "C-011"),
                ("parents", "- Omar Diaz (male, adult)\n- Priya Diaz (female, adult)"),
                (
                    "recent_events",
                    "- Born on 2026-01-02 at B-004 to Marcus Reed and Elena Reed.\n- Born on 2026-03-10 at A-002 to Noah Hale and Ivy Hale.",
                ),
            ],
            prompt_must_contain: vec!["C-011", "Noah Hale", "Omar Diaz"],
            prompt_must_not_contain: vec!["{recent_events}"],
        },
        // ---------------------------------------------------------------
        // 3. City chronicle: a fire and a festival
        // ---------------------------------------------------------------
        GoldenCase {
            name: "fire_chronicle_user",
            template: prompt::CITY_LOG_USER,
            vars: vec![
                ("date", "2026-01-04"),
                ("kind", "fire"),
                ("severity", "high"),
                ("location", "district C"),
                ("description", "A fire broke out in an apartment block in district C."),
            ],
            prompt_must_contain: vec!["Kind: fire", "Severity: high", "district C", "\"log_entry\""],
            prompt_must_not_contain: vec!["{kind}", "{severity}", "{location}", "{description}"],
        },
        GoldenCase {
            name: "festival_chronicle_user",
            template: prompt::CITY_LOG_USER,
            vars: vec![
                ("date", "2026-02-14"),
                ("kind", "festival"),
                ("severity", "low"),
                ("location", "citywide"),
                ("description", "Neighbours gathered for a lantern festival."),
            ],
            prompt_must_contain: vec!["festival", "lantern"],
            prompt_must_not_contain: vec!["{date}"],
        },
        GoldenCase {
            name: "chronicle_system_contract",
            template: prompt::CITY_LOG_SYSTEM,
            vars: vec![],
            prompt_must_contain: vec!["City Chronicle", "JSON", "summary"],
            prompt_must_not_contain: vec!["TODO"],
        },
        // ---------------------------------------------------------------
        // 4. Dialogue: opening line and a reply
        // ---------------------------------------------------------------
        GoldenCase {
            name: "dialogue_opening",
            template: prompt::DIALOGUE_USER,
            vars: vec![(
                "situation",
                "You are Ava Lin, a city resident (cheerful). You bump into Omar Diaz while commuting. Open the conversation with one short, friendly sentence.",
            )],
            prompt_must_contain: vec!["Ava Lin", "Omar Diaz", "Open the conversation"],
            prompt_must_not_contain: vec!["{situation}"],
        },
        GoldenCase {
            name: "dialogue_reply_with_history",
            template: prompt::DIALOGUE_USER,
            vars: vec![(
                "situation",
                "You are Omar Diaz, a city resident (reserved). You bump into Ava Lin while commuting. Continue the conversation with one short sentence.\n\nSo far:\nAva Lin: Morning! Busy road today.\n",
            )],
            prompt_must_contain: vec!["So far:", "Ava Lin: Morning!"],
            prompt_must_not_contain: vec!["{situation}"],
        },
        GoldenCase {
            name: "dialogue_system_contract",
            template: prompt::DIALOGUE_SYSTEM,
            vars: vec![],
            prompt_must_contain: vec!["one spoken line", "no speaker name"],
            prompt_must_not_contain: vec!["JSON"],
        },
    ]
}

fn preview(text: &str) -> String {
    text.chars().take(500).collect()
}

// ---------------------------------------------------------------------------
// Offline tests: template rendering
// ---------------------------------------------------------------------------

#[test]
fn golden_prompts_render_without_unresolved_vars() {
    for case in &golden_cases() {
        let rendered = prompt::render_template(case.template, &case.vars);

        for needle in &case.prompt_must_contain {
            assert!(
                rendered.contains(needle),
                "Golden case '{}': rendered prompt must contain '{}' but doesn't.\nRendered:\n{}",
                case.name,
                needle,
                preview(&rendered)
            );
        }

        for needle in &case.prompt_must_not_contain {
            assert!(
                !rendered.contains(needle),
                "Golden case '{}': rendered prompt must NOT contain '{}' but does.\nRendered:\n{}",
                case.name,
                needle,
                preview(&rendered)
            );
        }
    }
}

#[test]
fn golden_set_has_minimum_coverage() {
    let cases = golden_cases();
    assert!(cases.len() >= 8, "Golden set must have at least 8 cases, got {}", cases.len());
}

#[test]
fn structured_prompts_ask_for_json() {
    for (name, template) in [
        ("child_persona", prompt::CHILD_PERSONA_USER),
        ("city_log", prompt::CITY_LOG_USER),
    ] {
        assert!(template.contains("JSON"), "User prompt '{name}' must ask for JSON");
    }
}

#[test]
fn system_prompts_establish_identity() {
    for (name, template) in [
        ("child_persona", prompt::CHILD_PERSONA_SYSTEM),
        ("city_log", prompt::CITY_LOG_SYSTEM),
        ("dialogue", prompt::DIALOGUE_SYSTEM),
    ] {
        assert!(template.contains("You are"), "System prompt '{name}' must open with 'You are'");
    }
}

#[test]
fn engine_requests_match_output_mode() {
    let engine = PromptEngine::builtin();
    for id in PromptId::all() {
        let tpl = engine.get(*id).expect("builtin template");
        let request = tpl.request(&[]);
        assert_eq!(request.json_mode, *id != PromptId::Dialogue, "{id}");
        assert!(request.timeout_ms > 0);
    }
}
