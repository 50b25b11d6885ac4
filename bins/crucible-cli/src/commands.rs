// CLI commands for managing Crucible language configuration
use anyhow::{bail, Context, Result};
use crucible_common::types::Language;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageEntry {
    pub name: String,
    pub image: String,
    pub entry_file: String,
    pub run_command: Vec<String>,
    pub memory_limit_mb: u32,
    pub cpu_limit: f64,
    pub pids_limit: i64,
    pub compile_error_markers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxEntry {
    pub timeout_ms: u64,
    pub max_output_bytes: usize,
    pub capture_grace_ms: u64,
}

impl Default for SandboxEntry {
    fn default() -> Self {
        SandboxEntry {
            timeout_ms: 10_000,
            max_output_bytes: 65_536,
            capture_grace_ms: 2_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub sandbox: SandboxEntry,
    pub languages: Vec<LanguageEntry>,
}

const CONFIG_PATH: &str = "config/languages.json";

fn load_config() -> Result<ConfigFile> {
    let config_path = Path::new(CONFIG_PATH);
    if !config_path.exists() {
        return Ok(ConfigFile {
            sandbox: SandboxEntry::default(),
            languages: vec![],
        });
    }

    let content = fs::read_to_string(config_path).context("Failed to read languages.json")?;
    serde_json::from_str(&content).context("Failed to parse languages.json")
}

fn save_config(config: &ConfigFile) -> Result<()> {
    let config_path = Path::new(CONFIG_PATH);
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json_content =
        serde_json::to_string_pretty(config).context("Failed to serialize languages.json")?;
    fs::write(config_path, json_content).context("Failed to write languages.json")?;

    Ok(())
}

/// Per-language defaults: entry filename, run command and the stderr
/// substrings that flag a compilation failure.
fn language_defaults(language: Language) -> (&'static str, Vec<String>, Vec<String>) {
    match language {
        Language::Javascript => (
            "harness.js",
            vec!["node".to_string(), "harness.js".to_string()],
            vec!["SyntaxError".to_string()],
        ),
        Language::Python => (
            "harness.py",
            vec!["python3".to_string(), "harness.py".to_string()],
            vec![
                "SyntaxError".to_string(),
                "IndentationError".to_string(),
                "TabError".to_string(),
            ],
        ),
        Language::Java => (
            "Main.java",
            vec![
                "sh".to_string(),
                "-c".to_string(),
                "javac Main.java && java Main".to_string(),
            ],
            vec!["error:".to_string(), "cannot find symbol".to_string()],
        ),
    }
}

/// Add a language to the execution configuration
pub async fn add_language(
    name: &str,
    image: Option<&str>,
    memory: u32,
    cpu: f64,
    pids: i64,
    dockerfile: bool,
) -> Result<()> {
    println!("Adding language: {}", name);

    let Some(language) = Language::from_str(name) else {
        bail!(
            "Unsupported language '{}'. Supported: javascript, python, java",
            name
        );
    };

    let mut config = load_config()?;
    if config.languages.iter().any(|l| l.name == language.as_str()) {
        bail!("Language '{}' already exists in config", language);
    }

    let (entry_file, run_command, markers) = language_defaults(language);
    let image = image
        .map(|i| i.to_string())
        .unwrap_or_else(|| format!("crucible-{}:latest", language));

    config.languages.push(LanguageEntry {
        name: language.as_str().to_string(),
        image: image.clone(),
        entry_file: entry_file.to_string(),
        run_command,
        memory_limit_mb: memory,
        cpu_limit: cpu,
        pids_limit: pids,
        compile_error_markers: markers,
    });

    println!("Updating {}...", CONFIG_PATH);
    save_config(&config)?;

    if dockerfile {
        let dockerfile_path = PathBuf::from(format!("dockerfiles/{}/Dockerfile", language));
        println!("Generating {}...", dockerfile_path.display());
        generate_dockerfile(&dockerfile_path, language)?;
        println!("Build it with: docker build -t {} dockerfiles/{}", image, language);
    }

    println!("Language '{}' added", language);
    Ok(())
}

/// Remove a language from the execution configuration
pub async fn remove_language(name: &str, yes: bool) -> Result<()> {
    let mut config = load_config()?;

    let index = config
        .languages
        .iter()
        .position(|l| l.name == name)
        .ok_or_else(|| anyhow::anyhow!("Language '{}' not found in config", name))?;

    if !yes {
        print!(
            "This removes '{}' from {} and deletes dockerfiles/{}. Continue? (y/N): ",
            name, CONFIG_PATH, name
        );
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted");
            return Ok(());
        }
    }

    config.languages.remove(index);
    println!("Updating {}...", CONFIG_PATH);
    save_config(&config)?;

    let dockerfile_dir = PathBuf::from(format!("dockerfiles/{}", name));
    if dockerfile_dir.exists() {
        println!("Removing {}...", dockerfile_dir.display());
        fs::remove_dir_all(&dockerfile_dir)
            .with_context(|| format!("Failed to remove {}", dockerfile_dir.display()))?;
    }

    println!("Language '{}' removed", name);
    Ok(())
}

/// List configured languages
pub async fn list_languages() -> Result<()> {
    let config = load_config()?;

    if config.languages.is_empty() {
        println!("No languages configured.");
        println!("Add one with: crucible-cli add-lang --name python");
        return Ok(());
    }

    println!(
        "{:<12} {:<28} {:<14} {:<8} {:<6} {:<6}",
        "Name", "Image", "Entry", "Mem(MB)", "CPU", "Pids"
    );
    println!("{}", "-".repeat(80));

    for lang in &config.languages {
        println!(
            "{:<12} {:<28} {:<14} {:<8} {:<6} {:<6}",
            lang.name,
            lang.image,
            lang.entry_file,
            lang.memory_limit_mb,
            lang.cpu_limit,
            lang.pids_limit
        );
    }

    println!("\nTotal: {} language(s)", config.languages.len());
    Ok(())
}

/// Initialize a Crucible deployment directory with all three languages
pub async fn init_project(path: &str) -> Result<()> {
    println!("Initializing Crucible deployment at: {}", path);

    let project_path = Path::new(path);
    for dir in ["config", "dockerfiles"] {
        let dir_path = project_path.join(dir);
        fs::create_dir_all(&dir_path)
            .with_context(|| format!("Failed to create directory: {}", dir))?;
        println!("  Created: {}", dir);
    }

    let config_path = project_path.join(CONFIG_PATH);
    if !config_path.exists() {
        let languages = [Language::Javascript, Language::Python, Language::Java]
            .into_iter()
            .map(|language| {
                let (entry_file, run_command, markers) = language_defaults(language);
                let (memory, cpu, pids) = match language {
                    Language::Java => (512, 1.0, 128),
                    _ => (256, 0.5, 64),
                };
                LanguageEntry {
                    name: language.as_str().to_string(),
                    image: format!("crucible-{}:latest", language),
                    entry_file: entry_file.to_string(),
                    run_command,
                    memory_limit_mb: memory,
                    cpu_limit: cpu,
                    pids_limit: pids,
                    compile_error_markers: markers,
                }
            })
            .collect();

        let config = ConfigFile {
            sandbox: SandboxEntry::default(),
            languages,
        };
        let json_content = serde_json::to_string_pretty(&config)?;
        fs::write(&config_path, json_content)?;
        println!("  Created: {}", CONFIG_PATH);
    }

    for language in [Language::Javascript, Language::Python, Language::Java] {
        let dockerfile_path = project_path.join(format!("dockerfiles/{}/Dockerfile", language));
        if !dockerfile_path.exists() {
            generate_dockerfile(&dockerfile_path, language)?;
            println!("  Created: dockerfiles/{}/Dockerfile", language);
        }
    }

    println!("Deployment initialized.");
    println!("\nNext steps:");
    println!("  1. Build images: docker build -t crucible-<lang>:latest dockerfiles/<lang>");
    println!("  2. Start Redis and run crucible-server");

    Ok(())
}

/// Write the execution-image Dockerfile for a language
fn generate_dockerfile(dockerfile_path: &Path, language: Language) -> Result<()> {
    if let Some(parent) = dockerfile_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let content = match language {
        Language::Javascript => generate_node_dockerfile(),
        Language::Python => generate_python_dockerfile(),
        Language::Java => generate_java_dockerfile(),
    };

    fs::write(dockerfile_path, content).context("Failed to write Dockerfile")?;
    Ok(())
}

fn generate_node_dockerfile() -> String {
    r#"# GENERATED BY crucible-cli — DO NOT EDIT
# Node.js execution environment
FROM node:20-alpine

WORKDIR /workspace

# Non-root user; the server bind-mounts harness sources into /workspace
RUN adduser -D -u 1000 crucible

USER crucible
"#
    .to_string()
}

fn generate_python_dockerfile() -> String {
    r#"# GENERATED BY crucible-cli — DO NOT EDIT
# Python execution environment
FROM python:3.12-slim

ENV PYTHONUNBUFFERED=1 \
    PYTHONDONTWRITEBYTECODE=1

WORKDIR /workspace

# Non-root user; the server bind-mounts harness sources into /workspace
RUN useradd -m -u 1000 crucible

USER crucible
"#
    .to_string()
}

fn generate_java_dockerfile() -> String {
    r#"# GENERATED BY crucible-cli — DO NOT EDIT
# Java execution environment
FROM eclipse-temurin:21-jdk-alpine

# Keep the JVM quiet on stderr so compile-error classification stays clean
ENV JAVA_TOOL_OPTIONS=""

WORKDIR /workspace

# Non-root user; the server bind-mounts harness sources into /workspace
# and javac writes build artifacts next to them
RUN adduser -D -u 1000 crucible

USER crucible
"#
    .to_string()
}
