use std::path::PathBuf;

use crate::errors::{AppError, AppResult};

/// Minimal HTML escaping for text placed into templates.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Reads page templates from disk and fills `{{name}}` placeholders.
/// Values are inserted verbatim; escape user text before passing it in.
#[derive(Clone, Debug)]
pub struct PageRenderer {
    dir: PathBuf,
}

impl PageRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub async fn render(&self, name: &str, vars: &[(&str, String)]) -> AppResult<String> {
        let path = self.dir.join(name);
        let template = tokio::fs::read_to_string(&path).await.map_err(|e| {
            tracing::error!("Failed to read template {}: {}", path.display(), e);
            AppError::Template(format!("{}: {}", name, e))
        })?;
        Ok(fill(&template, vars))
    }
}

/// Replaces `{{key}}` placeholders in one pass over `template`. Inserted
/// values are never rescanned; unknown placeholders stay as they are.
pub fn fill(template: &str, vars: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = &after[..end];
        match vars.iter().find(|(name, _)| *name == key) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(
            escape_html(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn fill_replaces_every_occurrence() {
        let html = fill(
            "<h1>{{title}}</h1><p>{{title}} by {{user}}</p>{{missing}}",
            &[("title", "Algebra".into()), ("user", "ada".into())],
        );
        assert_eq!(html, "<h1>Algebra</h1><p>Algebra by ada</p>{{missing}}");
    }

    #[test]
    fn inserted_values_are_not_rescanned() {
        let html = fill(
            "<h1>{{subject}}</h1><p>{{owner}}</p>",
            &[("subject", "{{owner}}".into()), ("owner", "ada".into())],
        );
        assert_eq!(html, "<h1>{{owner}}</h1><p>ada</p>");
    }

    #[test]
    fn unterminated_placeholder_is_kept() {
        assert_eq!(fill("a {{b", &[("b", "x".into())]), "a {{b");
    }

    #[tokio::test]
    async fn missing_template_is_a_template_error() {
        let dir = tempfile::tempdir().unwrap();
        let pages = PageRenderer::new(dir.path());
        let err = pages.render("nope.html", &[]).await.unwrap_err();
        assert!(matches!(err, AppError::Template(_)));
    }

    #[tokio::test]
    async fn renders_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.html"), "Hi {{name}}").unwrap();
        let pages = PageRenderer::new(dir.path());
        assert_eq!(
            pages.render("hello.html", &[("name", "Ada".into())]).await.unwrap(),
            "Hi Ada"
        );
    }
}
