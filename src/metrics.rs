//! Code metrics and the searchable index. Pure functions of already-fetched
//! data: no I/O, nothing to retry.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::extract::{detect_language, is_code_language};
use crate::models::{CodeMetrics, Complexity, FeatureSet, SearchableIndex, Structure, TechStack};
use crate::summarize::SourceFile;

/// `high` above 50 files or 10k lines, `medium` above 20 files or 5k lines.
pub fn complexity_for(file_count: usize, lines_of_code: usize) -> Complexity {
    if file_count > 50 || lines_of_code > 10_000 {
        Complexity::High
    } else if file_count > 20 || lines_of_code > 5_000 {
        Complexity::Medium
    } else {
        Complexity::Low
    }
}

/// 10 minus one point per ten files, kept within [1, 10].
pub fn maintainability_for(file_count: usize) -> f64 {
    (10.0 - file_count as f64 / 10.0).clamp(1.0, 10.0)
}

/// Metrics over the fetched files. `file_count` counts every analyzed file;
/// lines are summed over code files only.
pub fn compute_metrics(files: &[SourceFile]) -> CodeMetrics {
    let mut lines_of_code = 0;
    let mut languages: BTreeMap<String, usize> = BTreeMap::new();

    for file in files {
        let language = detect_language(&file.path);
        if !is_code_language(&language) {
            continue;
        }
        lines_of_code += file.content.lines().count();
        *languages.entry(language).or_default() += 1;
    }

    let file_count = files.len();
    CodeMetrics {
        lines_of_code,
        file_count,
        complexity: complexity_for(file_count, lines_of_code),
        maintainability: maintainability_for(file_count),
        languages,
    }
}

/// Flatten summarizer output and file layout into lowercase keywords,
/// directories and file extensions.
pub fn build_searchable_index(
    features: &FeatureSet,
    structure: &Structure,
    tech_stack: &TechStack,
    files: &[SourceFile],
) -> SearchableIndex {
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();
    let mut push = |word: &str| {
        let word = word.trim().to_lowercase();
        if !word.is_empty() && seen.insert(word.clone()) {
            keywords.push(word);
        }
    };

    for feature in &features.features {
        push(&feature.name);
        push(&feature.category);
    }
    if structure.architecture != "unknown" {
        push(&structure.architecture);
    }
    structure.patterns.iter().for_each(|p| push(p));
    for list in [
        &tech_stack.languages,
        &tech_stack.frameworks,
        &tech_stack.libraries,
        &tech_stack.tools,
        &tech_stack.databases,
    ] {
        list.iter().for_each(|item| push(item));
    }

    let mut directories: BTreeSet<String> = structure
        .directories
        .iter()
        .map(|d| d.path.trim_end_matches('/').to_string())
        .filter(|p| !p.is_empty())
        .collect();
    let mut file_types = BTreeSet::new();
    for file in files {
        if let Some((dir, _)) = file.path.rsplit_once('/') {
            directories.insert(dir.to_string());
        }
        let name = file.path.rsplit('/').next().unwrap_or(&file.path);
        if let Some((stem, ext)) = name.rsplit_once('.') {
            if !stem.is_empty() {
                file_types.insert(ext.to_lowercase());
            }
        }
    }

    SearchableIndex {
        keywords,
        directories: directories.into_iter().collect(),
        file_types: file_types.into_iter().collect(),
    }
}
