//! Development caches: catalog locations plus build and cache folders of
//! projects found under the usual project roots.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};

use super::{candidates_under, dedup_files, Mode, RunContext};
use crate::catalog::Category;
use crate::cleaner::{Cleaner, CleanupResult};
use crate::config::ProfileKind;
use crate::scoring::{DevelopmentScorer, PriorityScorer};
use crate::utils;
use crate::walker::CandidateFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectKind {
    Node,
    Python,
    Java,
    Dotnet,
    Rust,
    Go,
    Php,
    Unity,
    Flutter,
}

impl ProjectKind {
    pub const ALL: [ProjectKind; 9] = [
        ProjectKind::Node,
        ProjectKind::Python,
        ProjectKind::Java,
        ProjectKind::Dotnet,
        ProjectKind::Rust,
        ProjectKind::Go,
        ProjectKind::Php,
        ProjectKind::Unity,
        ProjectKind::Flutter,
    ];

    /// Entry names (or name globs) whose presence marks a project of this kind.
    fn indicators(self) -> &'static [&'static str] {
        match self {
            ProjectKind::Node => &["package.json", "yarn.lock", "package-lock.json", "node_modules"],
            ProjectKind::Python => &[
                "requirements.txt",
                "setup.py",
                "pyproject.toml",
                "__pycache__",
                ".venv",
                "venv",
            ],
            ProjectKind::Java => &["pom.xml", "build.gradle", "gradlew", ".gradle"],
            ProjectKind::Dotnet => &["*.csproj", "*.sln"],
            ProjectKind::Rust => &["Cargo.toml", "Cargo.lock"],
            ProjectKind::Go => &["go.mod", "go.sum"],
            ProjectKind::Php => &["composer.json", "composer.lock"],
            ProjectKind::Unity => &["Assets", "ProjectSettings"],
            ProjectKind::Flutter => &["pubspec.yaml", "pubspec.lock", ".dart_tool"],
        }
    }

    /// Disposable folders inside a project of this kind.
    pub fn cache_dirs(self) -> &'static [&'static str] {
        match self {
            ProjectKind::Node => &["node_modules/.cache", ".npm", ".yarn", "dist", "build"],
            ProjectKind::Python => &["__pycache__", ".pytest_cache", "build", "dist"],
            ProjectKind::Java => &["target", "build", ".gradle"],
            ProjectKind::Dotnet => &["bin", "obj", "packages"],
            ProjectKind::Rust => &["target"],
            ProjectKind::Go | ProjectKind::Php => &[],
            ProjectKind::Unity => &["Library/Cache", "Temp", "Logs"],
            ProjectKind::Flutter => &[".dart_tool", "build"],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ProjectKind::Node => "node",
            ProjectKind::Python => "python",
            ProjectKind::Java => "java",
            ProjectKind::Dotnet => "dotnet",
            ProjectKind::Rust => "rust",
            ProjectKind::Go => "go",
            ProjectKind::Php => "php",
            ProjectKind::Unity => "unity",
            ProjectKind::Flutter => "flutter",
        }
    }
}

/// Kinds of project rooted at `dir`, judged from its direct entries.
pub fn detect_project_kinds(dir: &Path) -> Vec<ProjectKind> {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let names: Vec<String> = read_dir
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();

    ProjectKind::ALL
        .into_iter()
        .filter(|kind| {
            kind.indicators().iter().any(|indicator| {
                if indicator.contains('*') {
                    Pattern::new(indicator)
                        .is_ok_and(|p| names.iter().any(|n| p.matches(n)))
                } else {
                    names.iter().any(|n| n == indicator)
                }
            })
        })
        .collect()
}

/// Direct subdirectories of each root that look like projects.
pub fn discover_projects(roots: &[PathBuf]) -> Vec<(PathBuf, Vec<ProjectKind>)> {
    let mut projects = Vec::new();
    for root in roots {
        let Ok(read_dir) = fs::read_dir(root) else {
            continue;
        };
        for entry in read_dir.flatten() {
            if !entry.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }
            let dir = entry.path();
            let kinds = detect_project_kinds(&dir);
            if !kinds.is_empty() {
                log::debug!(
                    "project {} ({})",
                    dir.display(),
                    kinds.iter().map(|k| k.name()).collect::<Vec<_>>().join(", ")
                );
                projects.push((dir, kinds));
            }
        }
    }
    projects
}

fn default_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if cfg!(windows) {
        roots.extend(["C:\\dev", "C:\\projects", "C:\\workspace", "C:\\src"].map(PathBuf::from));
    }
    if let Some(home) = utils::home_dir() {
        roots.extend(
            ["dev", "projects", "workspace", "source", "Documents/projects", "Desktop"]
                .map(|d| home.join(d)),
        );
    }
    roots
}

fn project_cache_templates(projects: &[(PathBuf, Vec<ProjectKind>)]) -> Vec<String> {
    projects
        .iter()
        .flat_map(|(dir, kinds)| {
            kinds
                .iter()
                .flat_map(|k| k.cache_dirs())
                .map(move |sub| dir.join(sub).to_string_lossy().into_owned())
        })
        .collect()
}

const SKIP_NAME_PATTERNS: &[&str] = &["*.git*", "*.svn*", ".env*", "config.*", "settings.*"];
const UNSAFE_NAMES: &[&str] = &["package.json", "composer.json", "cargo.toml"];
const DOC_MARKERS: &[&str] = &["license", "readme", "changelog"];
const UNSAFE_DIRS: &[&str] = &[".git", ".svn", ".hg", "src", "source", "app"];

/// Whether a file under a development cache `root` may be touched:
/// never version-control data, manifests, env/config files, project docs
/// or anything inside a source folder below `root`.
pub fn is_safe_development_file(root: &Path, file: &Path) -> bool {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };
    let skipped = SKIP_NAME_PATTERNS
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .any(|p| p.matches_with(&name, options));
    if skipped
        || UNSAFE_NAMES.contains(&name.as_str())
        || DOC_MARKERS.iter().any(|m| name.contains(m))
    {
        return false;
    }

    let relative = file.strip_prefix(root).unwrap_or(file);
    let in_unsafe_dir = relative
        .parent()
        .into_iter()
        .flat_map(Path::components)
        .any(|c| match c {
            Component::Normal(seg) => {
                let seg = seg.to_string_lossy().to_lowercase();
                UNSAFE_DIRS.contains(&seg.as_str())
            }
            _ => false,
        });
    !in_unsafe_dir
}

pub struct DevelopmentFiles;

impl DevelopmentFiles {
    fn run(&self, ctx: &RunContext, mode: Mode) -> CleanupResult {
        let category = Category::DevelopmentFiles;
        let templates = ctx.catalog.templates(category);
        if templates.is_empty() {
            return CleanupResult::failure("No paths defined for Development Files");
        }

        let roots = ctx.settings.dev_roots.clone().unwrap_or_else(default_roots);
        let projects = discover_projects(&roots);
        log::info!("Development Files: {} projects found", projects.len());

        let mut all = templates;
        all.extend(project_cache_templates(&projects));
        let mut seen = HashSet::new();
        all.retain(|t| seen.insert(t.clone()));

        let present = ctx.expander.prioritize(ctx.expander.expand(&all));
        if present.is_empty() {
            return CleanupResult::new();
        }

        let budget = ctx.settings.profile(ProfileKind::Development).walk;
        let mut dirs: Vec<PathBuf> = Vec::new();
        let mut files: Vec<CandidateFile> = Vec::new();
        'templates: for template in &present {
            for root in ctx.expander.resolve(template) {
                if ctx.stop.is_set() {
                    break 'templates;
                }
                let found = candidates_under(&root, budget);
                files.extend(
                    found
                        .into_iter()
                        .filter(|f| is_safe_development_file(&root, &f.path)),
                );
                if root.is_dir() {
                    dirs.push(root);
                }
            }
        }
        dedup_files(&mut files);
        if files.is_empty() {
            return CleanupResult::new();
        }

        let scorer = DevelopmentScorer;
        files.sort_by_cached_key(|f| Reverse(scorer.score(f)));

        let pipeline = ctx.pipeline(category, mode, files.len());
        let result = ctx.execute(category, files, pipeline);
        if mode.deletes() && result.files_deleted > 0 && ctx.settings.remove_empty_dirs {
            for dir in &dirs {
                utils::remove_empty_dirs(dir);
            }
        }
        result
    }
}

impl Cleaner for DevelopmentFiles {
    fn category(&self) -> Category {
        Category::DevelopmentFiles
    }

    fn scan(&self, ctx: &RunContext) -> CleanupResult {
        self.run(ctx, Mode::Scan)
    }

    fn clean(&self, ctx: &RunContext) -> CleanupResult {
        self.run(ctx, ctx.clean_mode())
    }
}
