//! Context builder.
//!
//! Assembles the identity instructions and reference text that every
//! conversation is primed with. The result is built once by the composition
//! root and shared immutably afterwards.

use std::fmt;
use std::panic::UnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use relay_common::config::ContextConfig;

/// Placeholder used when no resume source can be read.
pub const RESUME_PLACEHOLDER: &str = "[Resume PDF not found]";

/// Placeholder used when no portfolio text can be read.
pub const PORTFOLIO_PLACEHOLDER: &str = "[Portfolio details not available]";

/// The static context prepended to every completion call.
///
/// Cheap to clone; the text itself is never copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextBlob(Arc<str>);

impl ContextBlob {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build the context blob from the configured sources.
///
/// Never fails: missing or unreadable sources degrade to placeholders so the
/// service can still answer from whatever is available.
pub fn build_context(config: &ContextConfig) -> ContextBlob {
    let resume = load_resume_text(&config.resume_paths);
    let portfolio = load_portfolio_text(config.portfolio_path.as_deref());

    let text = format!(
        "{instructions}\n\n=== RESUME (extracted from PDF) ===\n{resume}\n\n=== PORTFOLIO DETAILS ===\n{portfolio}",
        instructions = identity_instructions(&config.persona_name),
    );

    let blob = ContextBlob::new(text.trim());
    tracing::info!(
        persona = %config.persona_name,
        context_chars = blob.as_str().len(),
        "Context built"
    );
    blob
}

fn identity_instructions(name: &str) -> String {
    format!(
        r#"You are {name}, speaking directly to visitors of your own personal portfolio website.
Always answer in FIRST PERSON ("I", "my", "me"), never in third person.
Your goal is to help visitors learn about your skills, projects, experience, and interests in a clear, engaging, and confident way.

You are NOT an AI assistant.
You are NOT a chatbot.
You are NOT representing {name}; you ARE {name}.

If someone asks "introduce yourself", "who are you", or similar questions, answer as {name}, describing yourself, your skills, and your experience.

Do NOT say "I am an AI assistant".
Do NOT mention "portfolio chatbot".
Do NOT refer to {name} in third person.

Stay in character at all times.
Guidelines:

1. Always answer in FIRST PERSON ("I", "my", "me")
2. Be friendly, confident, and professional
3. Keep answers concise but informative
4. Highlight my skills and achievements naturally without exaggeration
5. If something is unknown, say:
   "I don't have that information right now, but feel free to ask something else!"
6. Encourage interaction when appropriate
7. Keep answers relevant to my profile"#
    )
}

/// Read the resume from the first existing candidate path.
fn load_resume_text(candidates: &[PathBuf]) -> String {
    let Some(path) = candidates.iter().find(|p| p.exists()) else {
        tracing::warn!(
            candidates = ?candidates,
            "Resume not found, continuing with placeholder"
        );
        return RESUME_PLACEHOLDER.to_string();
    };

    match extract_text(path) {
        Ok(text) => {
            if text.is_empty() {
                tracing::warn!(path = %path.display(), "Resume has no extractable text, may be image-based");
            } else {
                tracing::debug!(path = %path.display(), chars = text.len(), "Resume loaded");
            }
            text
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Resume unreadable, continuing with placeholder");
            RESUME_PLACEHOLDER.to_string()
        }
    }
}

fn extract_text(path: &Path) -> anyhow::Result<String> {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

    let text = if is_pdf {
        contain_panic(|| {
            pdf_extract::extract_text(path)
                .map_err(|e| anyhow::anyhow!("Failed to extract PDF text: {}", e))
        })?
    } else {
        std::fs::read_to_string(path)?
    };

    Ok(text.trim().to_string())
}

/// Run `f`, turning a panic into an error.
///
/// pdf-extract panics on some malformed fonts instead of returning an error.
fn contain_panic<T>(f: impl FnOnce() -> anyhow::Result<T> + UnwindSafe) -> anyhow::Result<T> {
    std::panic::catch_unwind(f).unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(anyhow::anyhow!("Text extraction panicked: {}", reason))
    })
}

fn load_portfolio_text(path: Option<&Path>) -> String {
    let Some(path) = path else {
        return PORTFOLIO_PLACEHOLDER.to_string();
    };

    match std::fs::read_to_string(path) {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Portfolio text unreadable");
            PORTFOLIO_PLACEHOLDER.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir, resume: &[&str], portfolio: Option<&str>) -> ContextConfig {
        ContextConfig {
            persona_name: "Ada Lovelace".into(),
            resume_paths: resume.iter().map(|p| dir.path().join(p)).collect(),
            portfolio_path: portfolio.map(|p| dir.path().join(p)),
        }
    }

    #[test]
    fn missing_sources_degrade_to_placeholders() {
        let dir = TempDir::new().unwrap();
        let blob = build_context(&config(&dir, &["resume.pdf"], Some("portfolio.txt")));

        assert!(blob.as_str().contains(RESUME_PLACEHOLDER));
        assert!(blob.as_str().contains(PORTFOLIO_PLACEHOLDER));
        assert!(blob.as_str().starts_with("You are Ada Lovelace"));
    }

    #[test]
    fn first_existing_resume_wins() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("fallback.txt"), "  Analytical Engine programmer \n").unwrap();
        std::fs::write(dir.path().join("portfolio.txt"), "Note G").unwrap();

        let blob = build_context(&config(
            &dir,
            &["deployed.txt", "fallback.txt"],
            Some("portfolio.txt"),
        ));

        assert!(blob
            .as_str()
            .contains("=== RESUME (extracted from PDF) ===\nAnalytical Engine programmer\n"));
        assert!(blob.as_str().ends_with("=== PORTFOLIO DETAILS ===\nNote G"));
        assert!(!blob.as_str().contains(RESUME_PLACEHOLDER));
    }

    #[test]
    fn corrupt_pdf_degrades_to_placeholder() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("resume.pdf"), b"not really a pdf").unwrap();

        let blob = build_context(&config(&dir, &["resume.pdf"], None));
        assert!(blob.as_str().contains(RESUME_PLACEHOLDER));
    }

    #[test]
    fn extraction_panic_becomes_error() {
        let err = contain_panic::<String>(|| panic!("missing font widths")).unwrap_err();
        assert!(err.to_string().contains("missing font widths"));

        assert_eq!(contain_panic(|| Ok(7)).unwrap(), 7);
    }

    #[test]
    fn build_is_deterministic() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("resume.md"), "# Resume").unwrap();
        let cfg = config(&dir, &["resume.md"], None);

        assert_eq!(build_context(&cfg), build_context(&cfg));
    }

    #[test]
    fn persona_name_is_substituted() {
        let text = identity_instructions("Grace Hopper");
        assert!(text.contains("you ARE Grace Hopper"));
        assert!(!text.contains("{name}"));
    }
}
