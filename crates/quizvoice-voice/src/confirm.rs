//! Classification of spoken answers to the confirmation question.

use crate::rules::CodeRules;

/// A classified answer to the confirmation question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Affirmative,
    Negative,
    Unclear,
}

/// Classifies a confirmation transcript by substring match.
///
/// A negative token anywhere wins over an affirmative one, so
/// "yes, no wait" is [`Confirmation::Negative`].
pub fn classify_confirmation(transcript: &str, rules: &CodeRules) -> Confirmation {
    let text = transcript.trim().to_lowercase();
    if text.is_empty() {
        return Confirmation::Unclear;
    }
    let contains_any = |tokens: &[String]| {
        tokens
            .iter()
            .any(|t| !t.is_empty() && text.contains(t.as_str()))
    };

    if contains_any(&rules.negative) {
        Confirmation::Negative
    } else if contains_any(&rules.affirmative) {
        Confirmation::Affirmative
    } else {
        Confirmation::Unclear
    }
}
