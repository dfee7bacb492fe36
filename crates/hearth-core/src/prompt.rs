use hearth_schema::Strategy;

const PERSONA: &str = "You are a compassionate, professional AI therapist. Offer supportive, \
empathetic responses that help the person explore their thoughts and feelings.";

const DISCLAIMER: &str = "You are an AI assistant offering emotional support, not a licensed \
therapist. When someone describes a serious mental health concern, encourage them to seek \
professional help.";

const FORMAT: &str = "Break every reply into meaningful segments. Tag each segment with the \
techniques it uses, chosen only from the list above; a segment may use none.";

/// Built-in system instruction: persona, the closed technique list, and the
/// segmentation rule.
pub fn default_system_prompt() -> String {
    let mut parts = vec![PERSONA.to_string(), "\n## Techniques".to_string()];
    parts.extend(
        Strategy::ALL
            .iter()
            .map(|strategy| format!("- {} ({})", strategy.label(), strategy.as_str())),
    );
    parts.push(format!("\n## Format\n{FORMAT}"));
    parts.push(format!("\n## Boundaries\n{DISCLAIMER}"));
    parts.join("\n")
}
