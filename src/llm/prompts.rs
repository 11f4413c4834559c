// Prompt template for unit test generation

use crate::language::Language;
use crate::pipeline::identifier::PrimaryIdentifier;
use crate::pipeline::repairer::SCRIPT_MODULE;

/// Build the prompt asking the model for a unit test of `code`.
///
/// Only the rules for `language` are included; the code goes last, fenced and tagged
/// with the language so the model answers in kind.
pub fn test_generation(
    code: &str,
    language: &Language,
    source: &PrimaryIdentifier,
    custom_instructions: Option<&str>,
) -> String {
    let mut prompt = format!(
        r#"You are an expert software engineer specialised in testing. Your task is to write clear, concise and thorough unit tests for the code below, in **{lang}**.

**GENERAL RULES:**
1. Output ONLY the test code. No explanations, introductions, conclusions or code fences (such as ```java or ```python).
2. Every expected value in an assertion MUST be mathematically CORRECT.
"#,
        lang = language
    );

    if let Some(rules) = language_rules(language, source) {
        prompt.push_str(&format!(
            "\n**LANGUAGE RULES ({}):**\n{}",
            language, rules
        ));
    }

    prompt.push_str(&format!(
        "\nCode to test:\n```{}\n{}\n```\n",
        language.fence_tag(),
        code.trim_end()
    ));

    if let Some(extra) = custom_instructions.map(str::trim).filter(|s| !s.is_empty()) {
        prompt.push_str(&format!("\n**ADDITIONAL INSTRUCTIONS:**\n{}\n", extra));
    }

    prompt
}

fn language_rules(language: &Language, source: &PrimaryIdentifier) -> Option<String> {
    match language {
        Language::Java => Some(
            r#"- **JUnit 5:** Always use JUnit 5. Import the @Test annotation and add the full static import `import static org.junit.jupiter.api.Assertions.*;`.
- **Getters:** Assume a **standard public getter** (e.g. `getName()`) exists for every private field.
- **Output:** Do not assert on methods that only print to the console (`System.out.println`).
"#
            .to_string(),
        ),
        Language::Python => {
            let import = if source.is_placeholder() {
                format!("from {} import *", SCRIPT_MODULE)
            } else {
                format!("from {} import {}", SCRIPT_MODULE, source)
            };
            Some(format!(
                r#"- **Unittest:** Use the standard `unittest` module.
- **Import:** Import the code under test with exactly `{import}`. **It is CRUCIAL to use '{module}', not the class name.**
- **Mocking:** Use `unittest.mock.patch` to capture console output (`sys.stdout`) when testing methods that call `print()`.
"#,
                import = import,
                module = SCRIPT_MODULE
            ))
        }
        _ => None,
    }
}
