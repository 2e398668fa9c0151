use std::path::Path;

use crate::errors::WorkerResult;
use crate::generator::math::embed_math;
use crate::models::{ProblemSet, WorksheetRequest};
use crate::services::{escape_html, fill};

/// Builds the worksheet document: the start template, every problem, then
/// an answer section in the same order. Math images are written into `dir`.
pub fn assemble(
    set: &ProblemSet,
    request: &WorksheetRequest,
    dir: &Path,
    tag: &str,
    start_template: &str,
    font_size: f64,
) -> WorkerResult<String> {
    let mut html = fill(
        start_template,
        &[
            ("subject", escape_html(request.subject.trim())),
            ("difficulty", escape_html(request.difficulty.trim())),
        ],
    );

    for (i, item) in set.problems.iter().enumerate() {
        let n = i + 1;
        let problem = embed_math(&item.problem, dir, &format!("{}_problem_{}", tag, n), font_size)?;
        html.push_str(&format!(
            r#"
    <div class="problem-container">
        <div class="problem-number">Problem {n}</div>
        <div class="problem-text">{problem}</div>
    </div>
"#
        ));
    }

    html.push_str(
        r#"
    <div class="answer-section">
        <h2>Answers</h2>
"#,
    );

    for (i, item) in set.problems.iter().enumerate() {
        let n = i + 1;
        let answer = embed_math(&item.answer, dir, &format!("{}_answer_{}", tag, n), font_size)?;
        html.push_str(&format!(
            r#"
        <div class="answer-container">
            <div class="answer-number">Problem {n}:</div>
            <div class="answer-text">{answer}</div>
        </div>
"#
        ));
    }

    html.push_str(
        r#"
    </div>
</body>
</html>
"#,
    );
    Ok(html)
}
