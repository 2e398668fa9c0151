use crate::errors::WorkerResult;
use crate::models::{ProblemSet, WorksheetRequest};

pub fn build_user_prompt(request: &WorksheetRequest) -> String {
    let notes = if request.additional_info.trim().is_empty() {
        "none"
    } else {
        request.additional_info.trim()
    };
    format!(
        "I want {count} problems on the subject of {subject}. The difficulty should be {difficulty}.\n\
         Additional information about the problem sheet: {notes}\n\
         Return only a JSON object that follows the template from the system prompt, with a \
         \"problems\" array whose entries have \"problem\" and \"answer\" strings.\n\
         Write math between $ signs. The JSON is parsed by a program, so do not wrap it in a \
         code fence and do not add any other text.",
        count = request.num_problems,
        subject = request.subject.trim(),
        difficulty = request.difficulty.trim(),
        notes = notes,
    )
}

/// Parses the model's reply. Tolerates a surrounding ```json fence.
pub fn parse_problem_set(raw: &str) -> WorkerResult<ProblemSet> {
    let body = strip_code_fence(raw.trim());
    Ok(serde_json::from_str(body)?)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // drop the info string (e.g. `json`) on the opening line
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
