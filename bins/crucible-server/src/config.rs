// Language and sandbox configuration for the Crucible server
use anyhow::{bail, Context, Result};
use crucible_common::types::Language;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageSettings {
    pub name: String,
    pub image: String,
    /// Canonical entry-point filename staged into the container workdir.
    pub entry_file: String,
    /// Fixed run command; compile-then-run for compiled languages.
    pub run_command: Vec<String>,
    pub memory_limit_mb: u32,
    pub cpu_limit: f64,
    pub pids_limit: i64,
    /// Heuristic stderr substrings that classify a nonzero exit as a
    /// compilation error. Interpreter-version dependent, so configured
    /// rather than hard-coded.
    pub compile_error_markers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSettings {
    /// Hard wall-clock deadline for one execution.
    pub timeout_ms: u64,
    /// Per-stream capture ceiling; excess is truncated with a marker.
    pub max_output_bytes: usize,
    /// Log-drain budget after the container has stopped.
    pub capture_grace_ms: u64,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        SandboxSettings {
            timeout_ms: 10_000,
            max_output_bytes: 64 * 1024,
            capture_grace_ms: 2_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    sandbox: SandboxSettings,
    languages: Vec<LanguageSettings>,
}

/// Execution configuration: one image per supported language plus the
/// shared sandbox limits.
#[derive(Debug, Clone)]
pub struct Settings {
    pub sandbox: SandboxSettings,
    languages: HashMap<Language, LanguageSettings>,
}

impl Settings {
    /// Load configuration from a languages.json file.
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path).context("Failed to read languages.json")?;
        let file: SettingsFile =
            serde_json::from_str(&content).context("Failed to parse languages.json")?;

        let mut languages = HashMap::new();
        for entry in file.languages {
            let Some(language) = Language::from_str(&entry.name) else {
                bail!("Unknown language '{}' in languages.json", entry.name);
            };
            languages.insert(language, entry);
        }

        Ok(Settings {
            sandbox: file.sandbox,
            languages,
        })
    }

    /// Load from `CRUCIBLE_CONFIG` (default `config/languages.json`),
    /// falling back to the built-in defaults when no file exists.
    pub fn load_or_default() -> Self {
        let path = std::env::var("CRUCIBLE_CONFIG")
            .unwrap_or_else(|_| "config/languages.json".to_string());
        match Self::load(Path::new(&path)) {
            Ok(settings) => settings,
            Err(err) => {
                info!("Using built-in language config ({})", err);
                Self::builtin()
            }
        }
    }

    /// Built-in defaults for the three supported languages.
    pub fn builtin() -> Self {
        let entries = vec![
            LanguageSettings {
                name: "javascript".to_string(),
                image: "crucible-node:latest".to_string(),
                entry_file: "harness.js".to_string(),
                run_command: vec!["node".to_string(), "harness.js".to_string()],
                memory_limit_mb: 256,
                cpu_limit: 0.5,
                pids_limit: 64,
                compile_error_markers: vec!["SyntaxError".to_string()],
            },
            LanguageSettings {
                name: "python".to_string(),
                image: "crucible-python:latest".to_string(),
                entry_file: "harness.py".to_string(),
                run_command: vec!["python3".to_string(), "harness.py".to_string()],
                memory_limit_mb: 256,
                cpu_limit: 0.5,
                pids_limit: 64,
                compile_error_markers: vec![
                    "SyntaxError".to_string(),
                    "IndentationError".to_string(),
                    "TabError".to_string(),
                ],
            },
            LanguageSettings {
                name: "java".to_string(),
                image: "crucible-java:latest".to_string(),
                entry_file: "Main.java".to_string(),
                run_command: vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    "javac Main.java && java Main".to_string(),
                ],
                memory_limit_mb: 512,
                cpu_limit: 1.0,
                pids_limit: 128,
                compile_error_markers: vec![
                    "error:".to_string(),
                    "cannot find symbol".to_string(),
                ],
            },
        ];

        let mut languages = HashMap::new();
        for entry in entries {
            if let Some(language) = Language::from_str(&entry.name) {
                languages.insert(language, entry);
            }
        }

        Settings {
            sandbox: SandboxSettings::default(),
            languages,
        }
    }

    pub fn language(&self, language: Language) -> Option<&LanguageSettings> {
        self.languages.get(&language)
    }

    pub fn supports(&self, language: Language) -> bool {
        self.languages.contains_key(&language)
    }

    pub fn configured_languages(&self) -> Vec<String> {
        let mut names: Vec<String> = self.languages.keys().map(|l| l.to_string()).collect();
        names.sort();
        names
    }
}
