//! Directives for the collaborator and the fixed survey texts.

use super::responses::ResponseStore;
use super::schema::{Field, FieldKind, FormSchema};

/// How the collaborator learns about stored answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DirectiveMode {
    /// Answers are read and written through `readFieldState` / `updateFieldValue`.
    #[default]
    ToolAugmented,
    /// The current answers are embedded in the directive itself.
    Embedded,
}

impl std::str::FromStr for DirectiveMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tools" | "tool_augmented" => Ok(Self::ToolAugmented),
            "embedded" => Ok(Self::Embedded),
            other => Err(format!("unknown prompt mode '{other}' (expected tools or embedded)")),
        }
    }
}

const PREAMBLE: &str = "\
You are an intelligent surveyor chatbot guiding a user through a form, one question at a time.

Rules:
- Ask exactly ONE field at a time, using its label as the question.
- Never ask a field that is already answered.
- Never ask a field whose condition is not met: a field with a condition is only asked \
when the stored answer under condition.key equals condition.value exactly.
- For select fields, offer only the declared options.
- For repeat fields, collect one record at a time (every sub-field of the record), then ask \
whether the user wants to add another. When they decline, store the whole list of records \
in a single write.
- When you reach the confirmation field, show a summary of every answer and ask the user to \
confirm with yes or no. If they say no, ask which answer to change, store the corrected value, \
and ask for confirmation again.
- After the user confirms, reply with a short final summary of all answers.
- Wrap the exact message the user should see in <question></question> tags. Put nothing \
the user should not see inside the tags.";

const TOOL_RULES: &str = "\
Tools:
- Call readFieldState(key) to check whether a field is already answered before asking it.
- Call updateFieldValue(key, value) as soon as the user answers a field. Use booleans for \
yes/no fields, numbers for numeric fields, and the exact option text for select fields.
- If a tool reports success=false, explain the problem to the user and ask the field again.
- The tool result of updateFieldValue names the next field to ask.";

/// Render the directive for one collaborator call.
pub fn compose(schema: &FormSchema, responses: &ResponseStore, mode: DirectiveMode) -> String {
    let schema_json = serde_json::to_string_pretty(schema).unwrap_or_default();
    let mut directive = format!("{PREAMBLE}\n\nForm (JSON):\n{schema_json}");

    match mode {
        DirectiveMode::ToolAugmented => {
            directive.push_str("\n\n");
            directive.push_str(TOOL_RULES);
        }
        DirectiveMode::Embedded => {
            let snapshot = serde_json::to_string_pretty(&responses.to_json()).unwrap_or_default();
            directive.push_str("\n\nAnswers collected so far (JSON):\n");
            directive.push_str(&snapshot);
            directive.push_str(
                "\n\nStore each answer with updateFieldValue(key, value) as soon as the user gives it.",
            );
        }
    }

    directive
}

/// Render the directive plus a hint naming the field due next.
///
/// At the confirmation field the hint carries the rendered summary so the
/// collaborator does not have to reconstruct it.
pub fn compose_for_turn(
    schema: &FormSchema,
    responses: &ResponseStore,
    next_field: Option<&Field>,
    mode: DirectiveMode,
) -> String {
    let mut directive = compose(schema, responses, mode);

    match next_field {
        Some(field) if field.kind == FieldKind::Confirmation => {
            directive.push_str(&format!(
                "\n\nNext field: {}. Ask the user to confirm with this message:\n{}",
                field.key,
                render_confirmation(schema, responses)
            ));
        }
        Some(field) => {
            directive.push_str(&format!(
                "\n\nNext field: {} ({}). Ask: \"{}\"",
                field.key, field.kind, field.label
            ));
        }
        None => {
            directive.push_str("\n\nAll fields are answered. Reply with the final summary.");
        }
    }

    directive
}

/// The yes/no question shown at a confirmation field.
pub fn render_confirmation(schema: &FormSchema, responses: &ResponseStore) -> String {
    format!(
        "I have collected the following information so far:\n{}\n\nDo you confirm that all of the information is correct? (yes/no)",
        responses.render_summary(schema)
    )
}

/// The closing message of a finished survey.
pub fn render_final_summary(schema: &FormSchema, responses: &ResponseStore) -> String {
    format!(
        "Thank you! The survey is complete. Here is a summary of your answers:\n{}",
        responses.render_summary(schema)
    )
}
