use std::fmt::Write as _;

use specforge_design::StructuredDesign;
use specforge_planner::GenerationBatch;

use crate::artifact::ArtifactSet;

/// Lines of each earlier file shown for import reference.
pub const EXCERPT_LINES: usize = 40;
/// Cap on the whole excerpt section.
pub const EXCERPT_CHARS: usize = 8000;
/// Cap on the feedback section. Feedback is already digested upstream.
pub const FEEDBACK_CHARS: usize = 4000;

const SQLMODEL_RULES: &str = "\
SQLModel rules:
- Do NOT pass foreign_key= and sa_column= together to Field(). Use only foreign_key=.
- Example: link_id: int = Field(foreign_key='links.id', index=True)
- Relationships: link: Optional['Link'] = Relationship(back_populates='clicks')
";

const JOSE_RULES: &str = "\
python-jose rules:
- Import as `from jose import JWTError, jwt`.
- Read the signing secret and algorithm from app.config settings, never hardcode them.
";

const PASSLIB_RULES: &str = "\
passlib rules:
- Use `CryptContext(schemes=['bcrypt'], deprecated='auto')`.
- Keep passwords within 72 bytes before hashing.
";

const ASYNCIO_TEST_RULE: &str = "- Async tests MUST use @pytest.mark.asyncio.\n";
const HTTPX_TEST_RULE: &str =
    "- Use httpx.AsyncClient with ASGITransport(app=app) and base_url='http://test'.\n";
const FASTAPI_TEST_RULE: &str = "- Use fastapi.testclient.TestClient against app.main.app.\n";
const NEUTRAL_TEST_RULE: &str =
    "- Drive the application in-process with the test client of its declared web framework.\n";
const ISOLATED_DB_RULE: &str =
    "- Use an isolated database per test session, never the application's database file.\n";

/// System instruction for every batch of a design.
///
/// Library rules are included only for libraries the design declares.
#[must_use]
pub fn batch_system_prompt(design: &StructuredDesign) -> String {
    let deps: Vec<&str> = design.dependencies.iter().map(|d| d.name.as_str()).collect();

    let mut prompt = String::from(
        "You are an expert Python developer generating files for a web service.\n\
         Output a JSON object where keys are file paths and values are complete file contents.\n\
         Return ONLY valid JSON, no markdown code fences, no explanation.\n\
         Every file must be complete: no placeholders, no TODOs.\n",
    );
    let _ = writeln!(
        prompt,
        "Use only these libraries (plus the standard library): {}.",
        if deps.is_empty() {
            "none declared".to_string()
        } else {
            deps.join(", ")
        }
    );

    let rules: [(&[&str], &str); 3] = [
        (&["sqlmodel"], SQLMODEL_RULES),
        (&["python-jose"], JOSE_RULES),
        (&["passlib"], PASSLIB_RULES),
    ];
    for (names, rules) in rules {
        if names.iter().any(|n| design.has_dependency(n)) {
            prompt.push('\n');
            prompt.push_str(rules);
        }
    }

    prompt.push_str("\nTest rules:\n");
    let asyncio = design.has_dependency("pytest-asyncio");
    if asyncio {
        prompt.push_str(ASYNCIO_TEST_RULE);
    }
    if asyncio && design.has_dependency("httpx") {
        prompt.push_str(HTTPX_TEST_RULE);
    } else if design.has_dependency("fastapi") {
        prompt.push_str(FASTAPI_TEST_RULE);
    } else {
        prompt.push_str(NEUTRAL_TEST_RULE);
    }
    prompt.push_str(ISOLATED_DB_RULE);
    prompt
}

/// Inputs of one batch request.
pub struct BatchPrompt<'a> {
    pub batch: &'a GenerationBatch,
    /// Full design slice as JSON on iteration 1, condensed design on repairs
    pub design_text: &'a str,
    pub feedback: Option<&'a str>,
    /// Files produced by earlier batches of this iteration
    pub existing: &'a ArtifactSet,
}

impl BatchPrompt<'_> {
    #[must_use]
    pub fn render(&self) -> String {
        let mut prompt = format!("System Design:\n{}\n\n", self.design_text);

        let _ = writeln!(
            prompt,
            "Generate ONLY these files (batch `{}`):",
            self.batch.name
        );
        for (i, target) in self.batch.targets.iter().enumerate() {
            let _ = writeln!(prompt, "{}. {} - {}", i + 1, target.path, target.instructions);
        }
        prompt.push_str(
            "\nReturn ONLY a JSON object mapping exactly these file paths to complete file contents.\n",
        );

        if let Some(feedback) = self.feedback.filter(|f| !f.trim().is_empty()) {
            let _ = write!(
                prompt,
                "\nProblems found in the previous attempt:\n{}\n\nFix ALL of these issues.\n",
                truncate(feedback, FEEDBACK_CHARS)
            );
        }

        let excerpts = existing_files_excerpt(self.existing);
        if !excerpts.is_empty() {
            prompt.push_str("\nAlready generated files (for import reference):\n");
            prompt.push_str(&excerpts);
        }
        prompt
    }
}

/// First lines of each earlier file, in path order, capped in total size.
#[must_use]
pub fn existing_files_excerpt(existing: &ArtifactSet) -> String {
    let mut out = String::new();
    for (path, content) in existing.iter() {
        let head: Vec<&str> = content.lines().take(EXCERPT_LINES).collect();
        let _ = write!(out, "\n--- {path} ---\n{}\n", head.join("\n"));
        if out.len() > EXCERPT_CHARS {
            out = truncate(&out, EXCERPT_CHARS);
            out.push_str("\n... (remaining files omitted)\n");
            break;
        }
    }
    out
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("\n... (truncated)");
    cut
}
