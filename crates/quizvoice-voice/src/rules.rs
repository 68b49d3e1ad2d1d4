//! Code rule sets: what a valid code looks like and what the assistant says
//! about it.

use crate::error::VoiceError;
use regex::Regex;
use serde::Deserialize;

/// Built-in rule sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePreset {
    /// Short alphanumeric quiz join codes such as `QUIZ1234`.
    #[default]
    JoinCode,
    /// Institutional roll numbers such as `2023001` or `CS2023001`.
    RollNumber,
}

/// Everything the assistant says, as templates.
///
/// `{code}` is replaced with the spelled-out candidate code and `{reason}`
/// with the reason given by the submission API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phrases {
    pub intro: String,
    pub recognized: String,
    pub confirm_question: String,
    pub no_candidate: String,
    pub retry_after_negative: String,
    pub unclear_confirmation: String,
    pub accepted: String,
    pub rejected: String,
    pub unavailable: String,
    pub failed: String,
    pub unsupported: String,
    pub invalid_typed: String,
    pub ready: String,
    pub current_code: String,
    pub confirm_hint: String,
    pub edit_hint: String,
}

impl Phrases {
    fn join_code() -> Self {
        Self {
            intro: "Please speak your quiz code.".into(),
            recognized: "Code recognized: {code}.".into(),
            confirm_question: "Is this code correct? Say yes to proceed or no to try again."
                .into(),
            no_candidate:
                "I couldn't recognize a valid quiz code. Please try again, speaking clearly."
                    .into(),
            retry_after_negative: "Okay, let's try again. Please speak your quiz code clearly."
                .into(),
            unclear_confirmation:
                "I didn't understand. Please say yes to proceed or no to try again.".into(),
            accepted: "Great! Joining quiz {code} now.".into(),
            rejected: "{reason}. Please speak your quiz code again.".into(),
            unavailable: "Unable to verify the quiz code at the moment. Please try again later."
                .into(),
            failed: "Sorry, I still couldn't get that. Please type your quiz code instead.".into(),
            unsupported:
                "Voice input is not available here. Please type your quiz code instead.".into(),
            invalid_typed: "Invalid quiz code format. Please check the code and try again."
                .into(),
            ready: "Ready for your quiz code. Speak or type it now.".into(),
            current_code: "Current quiz code is {code}.".into(),
            confirm_hint: "Say yes to confirm or no to change it.".into(),
            edit_hint: "Speak again or type to change it.".into(),
        }
    }

    fn roll_number() -> Self {
        Self {
            intro: "Please speak your roll number.".into(),
            recognized: "Roll number recognized: {code}.".into(),
            confirm_question:
                "Is this roll number correct? Say yes to proceed or no to try again.".into(),
            no_candidate:
                "I couldn't recognize a valid roll number. Please try again, speaking clearly."
                    .into(),
            retry_after_negative:
                "Okay, let's try again. Please speak your roll number clearly.".into(),
            unclear_confirmation:
                "I didn't understand. Please say yes to proceed or no to try again.".into(),
            accepted: "Great! Verifying roll number {code} now.".into(),
            rejected: "{reason}. Please speak your roll number again.".into(),
            unavailable:
                "Unable to verify the roll number at the moment. Please try again later.".into(),
            failed: "Sorry, I still couldn't get that. Please type your roll number instead."
                .into(),
            unsupported:
                "Voice input is not available here. Please type your roll number instead.".into(),
            invalid_typed: "Invalid roll number format. Please check it and try again.".into(),
            ready: "Ready for your roll number. Speak or type it now.".into(),
            current_code: "Current roll number is {code}.".into(),
            confirm_hint: "Say yes to confirm or no to change it.".into(),
            edit_hint: "Speak again or type to change it.".into(),
        }
    }

    /// Fills a template.
    pub fn render(template: &str, code: Option<&str>, reason: Option<&str>) -> String {
        let mut text = template.to_string();
        if let Some(code) = code {
            text = text.replace("{code}", &crate::extractor::spell_code(code));
        }
        if let Some(reason) = reason {
            text = text.replace("{reason}", reason.trim_end_matches('.'));
        }
        text
    }
}

/// Per-phrase overrides read from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PhraseOverrides {
    pub intro: Option<String>,
    pub recognized: Option<String>,
    pub confirm_question: Option<String>,
    pub no_candidate: Option<String>,
    pub retry_after_negative: Option<String>,
    pub unclear_confirmation: Option<String>,
    pub accepted: Option<String>,
    pub rejected: Option<String>,
    pub unavailable: Option<String>,
    pub failed: Option<String>,
    pub unsupported: Option<String>,
    pub invalid_typed: Option<String>,
}

impl PhraseOverrides {
    fn apply(&self, phrases: &mut Phrases) {
        let pairs = [
            (&self.intro, &mut phrases.intro),
            (&self.recognized, &mut phrases.recognized),
            (&self.confirm_question, &mut phrases.confirm_question),
            (&self.no_candidate, &mut phrases.no_candidate),
            (&self.retry_after_negative, &mut phrases.retry_after_negative),
            (&self.unclear_confirmation, &mut phrases.unclear_confirmation),
            (&self.accepted, &mut phrases.accepted),
            (&self.rejected, &mut phrases.rejected),
            (&self.unavailable, &mut phrases.unavailable),
            (&self.failed, &mut phrases.failed),
            (&self.unsupported, &mut phrases.unsupported),
            (&self.invalid_typed, &mut phrases.invalid_typed),
        ];
        for (value, slot) in pairs {
            if let Some(value) = value {
                *slot = value.clone();
            }
        }
    }
}

/// The `[rules]` configuration section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub preset: RulePreset,
    /// Replaces the preset's structural patterns, tried in order.
    pub patterns: Option<Vec<String>>,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    /// Pattern a typed code must fully match.
    pub typed_format: Option<String>,
    /// Name of the form field the code is submitted under.
    pub submit_field: Option<String>,
    pub affirmative: Option<Vec<String>>,
    pub negative: Option<Vec<String>>,
    pub phrases: PhraseOverrides,
}

/// A compiled rule set.
#[derive(Debug, Clone)]
pub struct CodeRules {
    pub name: &'static str,
    pub patterns: Vec<Regex>,
    pub min_len: usize,
    pub max_len: usize,
    pub typed_format: Regex,
    pub submit_field: String,
    pub affirmative: Vec<String>,
    pub negative: Vec<String>,
    pub phrases: Phrases,
}

const AFFIRMATIVE: &[&str] = &["yes", "correct", "proceed"];
const NEGATIVE: &[&str] = &["no", "wrong", "try again", "incorrect"];

impl CodeRules {
    /// Quiz join codes: four letters and four digits, or eight alphanumerics.
    pub fn join_code() -> Self {
        Self::build(
            "join_code",
            &[r"[A-Z]{4}\d{4}", r"[A-Z0-9]{8}", r"[A-Z]{3,}\d{3,}"],
            4,
            8,
            r"^[A-Z0-9]{4,12}$",
            "code",
            Phrases::join_code(),
        )
    }

    /// Roll numbers: optional department prefix and a long digit run.
    pub fn roll_number() -> Self {
        Self::build(
            "roll_number",
            &[r"[A-Z]{2,4}\d{6,8}", r"\d{7,10}", r"[A-Z]{1,2}\d{5,8}"],
            6,
            10,
            r"^[A-Z0-9]{6,12}$",
            "rollNumber",
            Phrases::roll_number(),
        )
    }

    pub fn preset(preset: RulePreset) -> Self {
        match preset {
            RulePreset::JoinCode => Self::join_code(),
            RulePreset::RollNumber => Self::roll_number(),
        }
    }

    /// Builds a rule set from its configuration section.
    pub fn from_config(config: &RulesConfig) -> Result<Self, VoiceError> {
        let mut rules = Self::preset(config.preset);

        if let Some(patterns) = &config.patterns {
            if patterns.is_empty() {
                return Err(VoiceError::Config(
                    "rules.patterns must not be empty".to_string(),
                ));
            }
            rules.patterns = patterns
                .iter()
                .map(|p| compile(p))
                .collect::<Result<_, _>>()?;
        }
        if let Some(min_len) = config.min_len {
            rules.min_len = min_len;
        }
        if let Some(max_len) = config.max_len {
            rules.max_len = max_len;
        }
        if rules.min_len == 0 || rules.min_len > rules.max_len {
            return Err(VoiceError::Config(format!(
                "rules.min_len ({}) must be positive and not exceed rules.max_len ({})",
                rules.min_len, rules.max_len
            )));
        }
        if let Some(format) = &config.typed_format {
            rules.typed_format = compile(format)?;
        }
        if let Some(field) = &config.submit_field {
            rules.submit_field = field.clone();
        }
        if let Some(words) = &config.affirmative {
            rules.affirmative = lowercase_all(words);
        }
        if let Some(words) = &config.negative {
            rules.negative = lowercase_all(words);
        }
        config.phrases.apply(&mut rules.phrases);

        Ok(rules)
    }

    /// Normalizes a typed code: trimmed, upper-cased, inner spaces and dashes removed.
    pub fn normalize_typed(&self, code: &str) -> String {
        code.trim()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect::<String>()
            .to_uppercase()
    }

    pub fn is_valid_typed(&self, normalized: &str) -> bool {
        self.typed_format.is_match(normalized)
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        name: &'static str,
        patterns: &[&str],
        min_len: usize,
        max_len: usize,
        typed_format: &str,
        submit_field: &str,
        phrases: Phrases,
    ) -> Self {
        Self {
            name,
            patterns: patterns.iter().map(|p| builtin(p)).collect(),
            min_len,
            max_len,
            typed_format: builtin(typed_format),
            submit_field: submit_field.to_string(),
            affirmative: AFFIRMATIVE.iter().map(|w| w.to_string()).collect(),
            negative: NEGATIVE.iter().map(|w| w.to_string()).collect(),
            phrases,
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, VoiceError> {
    Regex::new(pattern)
        .map_err(|e| VoiceError::Config(format!("invalid pattern {:?}: {}", pattern, e)))
}

fn builtin(pattern: &str) -> Regex {
    // Built-in patterns are literals covered by the tests below.
    Regex::new(pattern).expect("built-in pattern compiles")
}

fn lowercase_all(words: &[String]) -> Vec<String> {
    words.iter().map(|w| w.trim().to_lowercase()).collect()
}
