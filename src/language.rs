use anyhow::{bail, Result};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Target language of a test generation request.
///
/// Only Python and Java have a toolchain behind them; every other label is accepted
/// for generation and staging but reported as unsupported at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    Java,
    JavaScript,
    TypeScript,
    CSharp,
    Other(String),
}

/// How a language's tests reach a runnable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toolchain {
    /// Interpreter runs the test file directly from a flat directory.
    Script,
    /// Build tool compiles a project tree described by a manifest.
    Build,
    /// Generation only, nothing to execute.
    Unsupported,
}

impl Language {
    pub fn as_str(&self) -> &str {
        match self {
            Language::Python => "python",
            Language::Java => "java",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::CSharp => "c#",
            Language::Other(name) => name,
        }
    }

    pub fn toolchain(&self) -> Toolchain {
        match self {
            Language::Python => Toolchain::Script,
            Language::Java => Toolchain::Build,
            _ => Toolchain::Unsupported,
        }
    }

    /// File extension used when staging code units of this language.
    pub fn extension(&self) -> &str {
        match self {
            Language::Python => "py",
            Language::Java => "java",
            Language::JavaScript => "js",
            Language::TypeScript => "ts",
            Language::CSharp => "cs",
            Language::Other(_) => "txt",
        }
    }

    /// Filesystem-safe tag used inside generated filenames (`c#` becomes `csharp`).
    pub fn file_tag(&self) -> String {
        self.as_str()
            .replace('#', "sharp")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }

    /// Language label used in fenced code blocks and prompts.
    pub fn fence_tag(&self) -> &str {
        match self {
            Language::CSharp => "csharp",
            other => other.as_str(),
        }
    }

    pub fn from_extension(path: &Path) -> Option<Language> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "py" => Some(Language::Python),
            "java" => Some(Language::Java),
            "js" | "mjs" | "cjs" => Some(Language::JavaScript),
            "ts" => Some(Language::TypeScript),
            "cs" => Some(Language::CSharp),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "" => bail!("Language must not be empty"),
            "python" | "py" | "python3" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            "typescript" | "ts" => Ok(Language::TypeScript),
            "c#" | "csharp" | "cs" => Ok(Language::CSharp),
            _ => Ok(Language::Other(normalized)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_from_str_aliases() {
        assert_eq!(Language::from_str("python").unwrap(), Language::Python);
        assert_eq!(Language::from_str("PY").unwrap(), Language::Python);
        assert_eq!(Language::from_str("python3").unwrap(), Language::Python);
        assert_eq!(Language::from_str("Java").unwrap(), Language::Java);
        assert_eq!(Language::from_str("js").unwrap(), Language::JavaScript);
        assert_eq!(Language::from_str("ts").unwrap(), Language::TypeScript);
        assert_eq!(Language::from_str("C#").unwrap(), Language::CSharp);
        assert_eq!(Language::from_str("csharp").unwrap(), Language::CSharp);
    }

    #[test]
    fn test_from_str_unknown_is_other() {
        assert_eq!(
            Language::from_str(" Ruby ").unwrap(),
            Language::Other("ruby".to_string())
        );
    }

    #[test]
    fn test_from_str_empty_rejected() {
        let err = Language::from_str("  ").unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn test_toolchain_classes() {
        assert_eq!(Language::Python.toolchain(), Toolchain::Script);
        assert_eq!(Language::Java.toolchain(), Toolchain::Build);
        assert_eq!(Language::CSharp.toolchain(), Toolchain::Unsupported);
        assert_eq!(Language::JavaScript.toolchain(), Toolchain::Unsupported);
        assert_eq!(
            Language::Other("go".to_string()).toolchain(),
            Toolchain::Unsupported
        );
    }

    #[test]
    fn test_extensions() {
        assert_eq!(Language::Python.extension(), "py");
        assert_eq!(Language::Java.extension(), "java");
        assert_eq!(Language::TypeScript.extension(), "ts");
        assert_eq!(Language::CSharp.extension(), "cs");
        assert_eq!(Language::Other("kotlin".to_string()).extension(), "txt");
    }

    #[test]
    fn test_file_tag_replaces_hash() {
        assert_eq!(Language::CSharp.file_tag(), "csharp");
        assert_eq!(Language::Python.file_tag(), "python");
        assert_eq!(Language::Other("f#".to_string()).file_tag(), "fsharp");
        assert_eq!(Language::Other("objective-c".to_string()).file_tag(), "objective_c");
    }

    #[test]
    fn test_from_extension() {
        assert_eq!(
            Language::from_extension(&PathBuf::from("Greeter.py")),
            Some(Language::Python)
        );
        assert_eq!(
            Language::from_extension(&PathBuf::from("src/Calculator.JAVA")),
            Some(Language::Java)
        );
        assert_eq!(
            Language::from_extension(&PathBuf::from("Program.cs")),
            Some(Language::CSharp)
        );
        assert_eq!(Language::from_extension(&PathBuf::from("README")), None);
        assert_eq!(Language::from_extension(&PathBuf::from("main.go")), None);
    }

    #[test]
    fn test_as_str_roundtrip() {
        for lang in &[
            Language::Python,
            Language::Java,
            Language::JavaScript,
            Language::TypeScript,
            Language::CSharp,
        ] {
            assert_eq!(Language::from_str(lang.as_str()).unwrap(), *lang);
        }
    }
}
