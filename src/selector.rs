//! Picks the bounded, prioritized subset of a repository tree worth fetching.
//!
//! High-priority files (manifests, framework config, entry points, schemas,
//! docs, CI/container files) are always kept, in tree order. Recognized source
//! files follow, minus anything under a noise directory, capped at
//! `medium_cap`. The output is a pure function of the input.

use std::collections::HashSet;

use crate::source::{EntryType, TreeEntry};

/// Directory names whose contents are never worth analyzing.
const NOISE_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "vendor",
    "dist",
    "build",
    "target",
    "out",
    ".next",
    "__pycache__",
    "venv",
    ".venv",
    "coverage",
];

/// Exact file names that describe how a project is built or configured.
const MANIFEST_FILES: &[&str] = &[
    "package.json",
    "tsconfig.json",
    "cargo.toml",
    "go.mod",
    "pyproject.toml",
    "requirements.txt",
    "setup.py",
    "pipfile",
    "gemfile",
    "composer.json",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "cmakelists.txt",
    "makefile",
    "dockerfile",
    "docker-compose.yml",
    "docker-compose.yaml",
    ".gitlab-ci.yml",
    "vercel.json",
    "netlify.toml",
];

/// Framework config files, matched on the file name prefix (`next.config.js`,
/// `vite.config.ts`, ...).
const CONFIG_PREFIXES: &[&str] = &[
    "next.config.",
    "vite.config.",
    "webpack.config.",
    "nuxt.config.",
    "svelte.config.",
    "astro.config.",
    "tailwind.config.",
    "remix.config.",
    "angular.json",
    "babel.config.",
    "jest.config.",
];

/// Canonical entry-point stems (`index.js`, `main.rs`, `app.py`, ...).
const ENTRY_STEMS: &[&str] = &["index", "main", "app", "server", "lib", "mod", "__init__"];

/// Path fragments that mark schema, migration, CI or doc locations.
const HIGH_PRIORITY_FRAGMENTS: &[&str] = &[
    "schema.prisma",
    "/migrations/",
    "migrations/",
    ".github/workflows/",
    "schema.graphql",
    "schema.sql",
];

const SOURCE_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "rs", "go", "java", "kt", "rb", "php", "cs",
    "swift", "c", "cc", "cpp", "h", "hpp", "scala", "vue", "svelte",
];

/// Select important files from a repository tree.
///
/// High-priority matches come first in tree order, followed by up to
/// `medium_cap` source files in tree order. The caller truncates further.
pub fn select_important_files(entries: &[TreeEntry], medium_cap: usize) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut high = Vec::new();
    let mut medium = Vec::new();

    for entry in entries {
        if entry.entry_type != EntryType::Blob || !seen.insert(entry.path.as_str()) {
            continue;
        }
        let path = entry.path.as_str();
        if is_high_priority(path) {
            high.push(path.to_string());
        } else if is_source_file(path) && !in_noise_dir(path) && medium.len() < medium_cap {
            medium.push(path.to_string());
        }
    }

    high.extend(medium);
    high
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn extension(path: &str) -> Option<&str> {
    let name = file_name(path);
    name.rsplit_once('.').map(|(_, ext)| ext)
}

pub(crate) fn in_noise_dir(path: &str) -> bool {
    path.split('/')
        .rev()
        .skip(1)
        .any(|segment| NOISE_DIRS.contains(&segment))
}

fn is_high_priority(path: &str) -> bool {
    // Manifests inside dependency caches describe someone else's project.
    if in_noise_dir(path) {
        return false;
    }

    let lower = path.to_lowercase();
    let name = file_name(&lower);

    if MANIFEST_FILES.contains(&name) {
        return true;
    }
    if CONFIG_PREFIXES.iter().any(|p| name.starts_with(p)) {
        return true;
    }
    if HIGH_PRIORITY_FRAGMENTS.iter().any(|f| lower.contains(f)) {
        return true;
    }
    if name.starts_with("readme") || (lower.starts_with("docs/") && name.ends_with(".md")) {
        return true;
    }
    if is_source_file(&lower) {
        // Entry points only count at the repository root.
        let stem = name.split('.').next().unwrap_or_default();
        return ENTRY_STEMS.contains(&stem) && !lower.contains('/');
    }
    false
}

fn is_source_file(path: &str) -> bool {
    extension(path)
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
