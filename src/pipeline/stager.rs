//! Lay out a (source, test) pair the way each toolchain expects to find it.

use chrono::Local;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::error::StagingError;
use super::repairer::SCRIPT_MODULE;
use super::workspace::Workspace;
use super::CodeUnit;
use crate::language::{Language, Toolchain};

pub const MANIFEST_FILE: &str = "pom.xml";

/// Minimal Maven project: JUnit 5 in test scope and a surefire recent enough to run it.
pub const MAVEN_POM: &str = r#"<project xmlns="http://maven.apache.org/POM/4.0.0"
         xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
         xsi:schemaLocation="http://maven.apache.org/POM/4.0.0 http://maven.apache.org/xsd/maven-4.0.0.xsd">
    <modelVersion>4.0.0</modelVersion>
    <groupId>com.ai</groupId>
    <artifactId>generated-tests</artifactId>
    <version>1.0</version>
    <properties>
        <maven.compiler.source>11</maven.compiler.source>
        <maven.compiler.target>11</maven.compiler.target>
        <project.build.sourceEncoding>UTF-8</project.build.sourceEncoding>
        <junit.jupiter.version>5.9.1</junit.jupiter.version>
    </properties>
    <dependencies>
        <dependency>
            <groupId>org.junit.jupiter</groupId>
            <artifactId>junit-jupiter-engine</artifactId>
            <version>${junit.jupiter.version}</version>
            <scope>test</scope>
        </dependency>
    </dependencies>
    <build>
        <plugins>
            <plugin>
                <groupId>org.apache.maven.plugins</groupId>
                <artifactId>maven-surefire-plugin</artifactId>
                <version>3.0.0-M5</version>
            </plugin>
        </plugins>
    </build>
</project>
"#;

/// Where a request's files ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedFiles {
    pub workspace: PathBuf,
    pub source_path: PathBuf,
    pub test_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_path: Option<PathBuf>,
}

fn main_tree() -> PathBuf {
    Path::new("src").join("main").join("java")
}

fn test_tree() -> PathBuf {
    Path::new("src").join("test").join("java")
}

/// `YYYYmmdd_HHMMSS_mmm`, local time.
fn request_stamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S_%3f").to_string()
}

/// Write `source` and `test` into `workspace` following the layout `language` needs.
pub fn stage(
    workspace: &Workspace,
    source: &CodeUnit,
    test: &CodeUnit,
    language: &Language,
) -> Result<StagedFiles, StagingError> {
    create_dir(workspace.path())?;

    let staged = match language.toolchain() {
        Toolchain::Script => stage_script(workspace, source, test, language)?,
        Toolchain::Build => stage_build(workspace, source, test, language)?,
        Toolchain::Unsupported => stage_flat(workspace, source, test, language)?,
    };

    info!(
        "Staged {} test {} (source {})",
        language,
        staged.test_path.display(),
        staged.source_path.display()
    );
    Ok(staged)
}

/// Fixed module file for the source, timestamped file for the test so earlier runs stay around.
fn stage_script(
    workspace: &Workspace,
    source: &CodeUnit,
    test: &CodeUnit,
    language: &Language,
) -> Result<StagedFiles, StagingError> {
    let ext = language.extension();
    let source_path = workspace.join(format!("{}.{}", SCRIPT_MODULE, ext));
    let test_path = workspace.join(format!(
        "{}_test_{}.{}",
        request_stamp(),
        language.file_tag(),
        ext
    ));

    write_file(&source_path, &source.content)?;
    write_file(&test_path, &test.content)?;

    Ok(StagedFiles {
        workspace: workspace.path().to_path_buf(),
        source_path,
        test_path,
        manifest_path: None,
    })
}

/// Maven layout. Files are named after their declared class, as javac requires.
fn stage_build(
    workspace: &Workspace,
    source: &CodeUnit,
    test: &CodeUnit,
    language: &Language,
) -> Result<StagedFiles, StagingError> {
    purge_build_tree(workspace)?;

    let main_dir = workspace.join(main_tree());
    let test_dir = workspace.join(test_tree());
    create_dir(&main_dir)?;
    create_dir(&test_dir)?;

    let ext = language.extension();
    let source_id = &source.identifier;
    let test_id = &test.identifier;
    debug!("Build identifiers: source={}, test={}", source_id, test_id);

    let source_path = main_dir.join(format!("{}.{}", source_id, ext));
    let test_path = test_dir.join(format!("{}.{}", test_id, ext));
    let manifest_path = workspace.join(MANIFEST_FILE);

    write_file(&source_path, &source.content)?;
    write_file(&test_path, &test.content)?;
    write_file(&manifest_path, MAVEN_POM)?;

    Ok(StagedFiles {
        workspace: workspace.path().to_path_buf(),
        source_path,
        test_path,
        manifest_path: Some(manifest_path),
    })
}

/// No toolchain: both files side by side, timestamped, for inspection only.
fn stage_flat(
    workspace: &Workspace,
    source: &CodeUnit,
    test: &CodeUnit,
    language: &Language,
) -> Result<StagedFiles, StagingError> {
    let stamp = request_stamp();
    let tag = language.file_tag();
    let ext = language.extension();
    let source_path = workspace.join(format!("{}_source_{}.{}", stamp, tag, ext));
    let test_path = workspace.join(format!("{}_test_{}.{}", stamp, tag, ext));

    write_file(&source_path, &source.content)?;
    write_file(&test_path, &test.content)?;

    Ok(StagedFiles {
        workspace: workspace.path().to_path_buf(),
        source_path,
        test_path,
        manifest_path: None,
    })
}

/// Maven compiles every class it finds, so classes from an earlier request must go.
fn purge_build_tree(workspace: &Workspace) -> Result<(), StagingError> {
    for dir in ["src", "target"] {
        let path = workspace.join(dir);
        match fs::remove_dir_all(&path) {
            Ok(()) => debug!("Purged {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(StagingError::Purge { path, source }),
        }
    }

    let manifest = workspace.join(MANIFEST_FILE);
    remove_file_if_present(&manifest)?;

    let entries = fs::read_dir(workspace.path()).map_err(|source| StagingError::Purge {
        path: workspace.path().to_path_buf(),
        source,
    })?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "java") {
            remove_file_if_present(&path)?;
        }
    }
    Ok(())
}

fn remove_file_if_present(path: &Path) -> Result<(), StagingError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StagingError::Purge {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn create_dir(path: &Path) -> Result<(), StagingError> {
    fs::create_dir_all(path).map_err(|source| StagingError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, content: &str) -> Result<(), StagingError> {
    fs::write(path, content).map_err(|source| StagingError::Write {
        path: path.to_path_buf(),
        source,
    })
}
