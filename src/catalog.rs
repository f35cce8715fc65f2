//! Cleanup categories and the static catalog of path templates behind them.
//!
//! A template is an opaque string that may carry environment placeholders
//! (`%VAR%`, `$VAR`, `${VAR}`, leading `~`) and `*` wildcards. The catalog is
//! configuration data; the engine only reads it.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    TempFiles,
    BrowserCache,
    SystemFiles,
    DevelopmentFiles,
    MediaFiles,
    GamingFiles,
    SystemOptimization,
    RecycleBin,
    All,
}

impl Category {
    /// Concrete categories in full-run order.
    pub const CONCRETE: [Category; 8] = [
        Category::TempFiles,
        Category::BrowserCache,
        Category::SystemFiles,
        Category::DevelopmentFiles,
        Category::MediaFiles,
        Category::GamingFiles,
        Category::SystemOptimization,
        Category::RecycleBin,
    ];

    /// Machine-readable name used in --category flag (e.g. "browser-cache").
    pub fn name(self) -> &'static str {
        match self {
            Category::TempFiles => "temp-files",
            Category::BrowserCache => "browser-cache",
            Category::SystemFiles => "system-files",
            Category::DevelopmentFiles => "development-files",
            Category::MediaFiles => "media-files",
            Category::GamingFiles => "gaming-files",
            Category::SystemOptimization => "system-optimization",
            Category::RecycleBin => "recycle-bin",
            Category::All => "all",
        }
    }

    /// Human-readable label for display.
    pub fn label(self) -> &'static str {
        match self {
            Category::TempFiles => "Temp Files",
            Category::BrowserCache => "Browser Cache",
            Category::SystemFiles => "System Files",
            Category::DevelopmentFiles => "Development Files",
            Category::MediaFiles => "Media Files",
            Category::GamingFiles => "Gaming Files",
            Category::SystemOptimization => "System Optimization",
            Category::RecycleBin => "Recycle Bin",
            Category::All => "All Categories",
        }
    }

    /// Categories whose templates point into OS-owned locations.
    pub fn is_system(self) -> bool {
        matches!(self, Category::SystemFiles | Category::SystemOptimization)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Category::CONCRETE
            .iter()
            .copied()
            .chain(std::iter::once(Category::All))
            .find(|c| c.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownCategory(s.to_string()))
    }
}

/// Category → ordered template list, plus the locations that are worth
/// visiting first when several templates resolve.
#[derive(Debug, Clone)]
pub struct PathCatalog {
    templates: HashMap<Category, Vec<String>>,
    high_priority: Vec<String>,
}

impl PathCatalog {
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
            high_priority: Vec::new(),
        }
    }

    /// The built-in catalog.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        let owned = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let mut temp = owned(TEMP_PATHS);
        temp.extend(owned(ADDITIONAL_TEMP_PATHS));
        catalog.templates.insert(Category::TempFiles, temp);
        catalog
            .templates
            .insert(Category::BrowserCache, owned(BROWSER_CACHE_PATHS));
        catalog
            .templates
            .insert(Category::SystemFiles, owned(SYSTEM_CLEANUP_PATHS));
        catalog
            .templates
            .insert(Category::DevelopmentFiles, owned(DEVELOPMENT_PATHS));
        catalog
            .templates
            .insert(Category::MediaFiles, owned(MEDIA_PATHS));
        catalog
            .templates
            .insert(Category::GamingFiles, owned(GAMING_PATHS));
        catalog
            .templates
            .insert(Category::SystemOptimization, owned(SYSTEM_OPTIMIZATION_PATHS));
        catalog.high_priority = owned(HIGH_PRIORITY_PATHS);
        catalog
    }

    /// Replace the template list for one category.
    pub fn set(&mut self, category: Category, templates: Vec<String>) {
        self.templates.insert(category, templates);
    }

    /// Append templates to one category.
    pub fn extend(&mut self, category: Category, templates: impl IntoIterator<Item = String>) {
        self.templates.entry(category).or_default().extend(templates);
    }

    pub fn set_high_priority(&mut self, locations: Vec<String>) {
        self.high_priority = locations;
    }

    pub fn high_priority(&self) -> &[String] {
        &self.high_priority
    }

    /// Templates for a category. `All` is the concatenation of every concrete
    /// category in full-run order.
    pub fn templates(&self, category: Category) -> Vec<String> {
        match category {
            Category::All => Category::CONCRETE
                .iter()
                .flat_map(|c| self.templates.get(c).cloned().unwrap_or_default())
                .collect(),
            other => self.templates.get(&other).cloned().unwrap_or_default(),
        }
    }
}

impl Default for PathCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

const TEMP_PATHS: &[&str] = &[
    r"%TEMP%",
    r"%LOCALAPPDATA%\Temp",
    r"%WINDIR%\Temp",
    r"%WINDIR%\SoftwareDistribution\Download",
    r"%LOCALAPPDATA%\Microsoft\Windows\WebCache",
    "${TMPDIR}",
    "~/.cache/tmp",
    "~/Library/Caches/TemporaryItems",
];

const ADDITIONAL_TEMP_PATHS: &[&str] = &[
    r"%USERPROFILE%\AppData\Local\Temp",
    r"%SYSTEMROOT%\Temp",
    r"%APPDATA%\Microsoft\Windows\Recent",
    r"%LOCALAPPDATA%\Microsoft\Windows\WER",
    r"%LOCALAPPDATA%\CrashDumps",
    r"%WINDIR%\inf\setupapi.dev.log",
    r"%WINDIR%\setupact.log",
    r"%WINDIR%\setuperr.log",
];

const HIGH_PRIORITY_PATHS: &[&str] = &[
    r"%TEMP%",
    r"%LOCALAPPDATA%\Temp",
    r"%WINDIR%\Temp",
    r"%LOCALAPPDATA%\Google\Chrome\User Data\Default\Cache",
    r"%LOCALAPPDATA%\Microsoft\Edge\User Data\Default\Cache",
    r"%WINDIR%\SoftwareDistribution\Download",
    r"%LOCALAPPDATA%\Microsoft\Windows\WebCache",
    "~/.cache/google-chrome",
    "~/Library/Caches/Google/Chrome",
];

const BROWSER_CACHE_PATHS: &[&str] = &[
    r"%LOCALAPPDATA%\Google\Chrome\User Data\Default\Cache",
    r"%LOCALAPPDATA%\Google\Chrome\User Data\Default\Code Cache",
    r"%LOCALAPPDATA%\Google\Chrome\User Data\Default\GPUCache",
    r"%LOCALAPPDATA%\Google\Chrome\User Data\Default\Service Worker\CacheStorage",
    r"%LOCALAPPDATA%\Microsoft\Edge\User Data\Default\Cache",
    r"%LOCALAPPDATA%\Microsoft\Edge\User Data\Default\Code Cache",
    r"%LOCALAPPDATA%\Microsoft\Edge\User Data\Default\GPUCache",
    r"%APPDATA%\Mozilla\Firefox\Profiles\*\cache2",
    r"%LOCALAPPDATA%\Mozilla\Firefox\Profiles\*\cache2",
    r"%APPDATA%\Mozilla\Firefox\Profiles\*\startupCache",
    r"%LOCALAPPDATA%\Microsoft\Windows\INetCache",
    "~/.cache/google-chrome/Default/Cache",
    "~/.cache/chromium/Default/Cache",
    "~/.cache/mozilla/firefox/*/cache2",
    "~/Library/Caches/Google/Chrome/*/Cache",
    "~/Library/Caches/com.apple.Safari",
    "~/Library/Caches/Firefox/Profiles/*/cache2",
];

const SYSTEM_CLEANUP_PATHS: &[&str] = &[
    r"%WINDIR%\Logs\CBS",
    r"%WINDIR%\Logs\DISM",
    r"%WINDIR%\Logs\DPX",
    r"%WINDIR%\Logs\MoSetup",
    r"%WINDIR%\Panther",
    r"%WINDIR%\SoftwareDistribution\DataStore\Logs",
    r"%WINDIR%\WindowsUpdate.log",
    r"%LOCALAPPDATA%\Microsoft\Windows\Explorer\thumbcache_*.db",
    r"%WINDIR%\LiveKernelReports",
    r"%WINDIR%\Minidump",
    r"%WINDIR%\memory.dmp",
    r"%WINDIR%\System32\winevt\Logs\*.evtx",
    r"%PROGRAMDATA%\Microsoft\Windows Defender\Scans\History",
    "/var/crash",
    "~/Library/Logs",
    "~/.cache/thumbnails",
];

const DEVELOPMENT_PATHS: &[&str] = &[
    r"%APPDATA%\npm-cache",
    r"%LOCALAPPDATA%\npm-cache",
    r"%LOCALAPPDATA%\Yarn\Cache",
    r"%APPDATA%\npm\_logs",
    r"%TEMP%\npm-*",
    r"%LOCALAPPDATA%\pip\cache",
    r"%LOCALAPPDATA%\conda\pkgs",
    r"%TEMP%\pip-*",
    r"%USERPROFILE%\.gradle\caches",
    r"%USERPROFILE%\.gradle\daemon",
    r"%TEMP%\hsperfdata_*",
    r"%LOCALAPPDATA%\NuGet\Cache",
    r"%TEMP%\NuGetScratch",
    r"%TEMP%\MSBuild_*",
    r"%LOCALAPPDATA%\Microsoft\VisualStudio\*\ComponentModelCache",
    r"%APPDATA%\Code\logs",
    r"%APPDATA%\Code\CachedExtensions",
    r"%APPDATA%\Code\CachedData",
    r"%LOCALAPPDATA%\JetBrains\Toolbox\logs",
    r"%LOCALAPPDATA%\go-build",
    r"%USERPROFILE%\.cargo\registry\cache",
    r"%APPDATA%\Composer\cache",
    r"%LOCALAPPDATA%\electron\Cache",
    r"%TEMP%\webpack-*",
    "~/.npm/_cacache",
    "~/.npm/_logs",
    "~/.cache/yarn",
    "~/.cache/pip",
    "~/.cache/go-build",
    "~/.cache/electron",
    "~/.gradle/caches",
    "~/.cargo/registry/cache",
    "~/.cargo/git/db",
    "~/.pub-cache",
    "~/Library/Caches/Yarn",
    "~/Library/Caches/pip",
];

const MEDIA_PATHS: &[&str] = &[
    r"%LOCALAPPDATA%\Microsoft\Media Player",
    r"%LOCALAPPDATA%\Adobe\*\Cache",
    r"%TEMP%\Adobe*",
    r"%APPDATA%\Microsoft\Office\Recent",
    r"%LOCALAPPDATA%\Microsoft\Office\*\OfficeFileCache",
    r"%USERPROFILE%\Downloads\*.tmp",
    r"%USERPROFILE%\Downloads\*.crdownload",
    r"%USERPROFILE%\Downloads\*.partial",
    "~/Downloads/*.crdownload",
    "~/Downloads/*.part",
    "~/.cache/vlc",
];

const GAMING_PATHS: &[&str] = &[
    r"%PROGRAMFILES(X86)%\Steam\dumps",
    r"%PROGRAMFILES(X86)%\Steam\logs",
    r"%PROGRAMFILES(X86)%\Steam\appcache\httpcache",
    r"%LOCALAPPDATA%\EpicGamesLauncher\Saved\Logs",
    r"%LOCALAPPDATA%\EpicGamesLauncher\Saved\webcache",
    r"%APPDATA%\Origin\Logs",
    r"%PROGRAMDATA%\Battle.net\Setup\Logs",
    "~/.steam/steam/logs",
    "~/.local/share/Steam/appcache/httpcache",
    "~/Library/Application Support/Steam/logs",
];

const SYSTEM_OPTIMIZATION_PATHS: &[&str] = &[
    r"%LOCALAPPDATA%\Microsoft\Windows\WebCache\*.log",
    r"%PROGRAMDATA%\Microsoft\Search\Data\Temp\*",
    r"%LOCALAPPDATA%\Microsoft\Windows\Explorer\thumbcache_*.db",
    r"%LOCALAPPDATA%\Microsoft\Windows\Explorer\iconcache_*.db",
    r"%WINDIR%\SoftwareDistribution\Download\*",
    r"%WINDIR%\SoftwareDistribution\DataStore\Logs\*",
    r"%WINDIR%\WindowsUpdate.log",
    r"%WINDIR%\inf\*.log",
    r"%TEMP%\MSI*.LOG",
    r"%WINDIR%\Logs\CBS\*",
    r"%WINDIR%\Logs\DISM\*",
    r"%WINDIR%\System32\LogFiles\WMI\RtBackup\*",
    r"%WINDIR%\System32\WDI\LogFiles\*",
    r"%LOCALAPPDATA%\Microsoft\Windows\INetCache\*",
    r"%LOCALAPPDATA%\Microsoft\Windows\IECompatCache\*",
    r"%LOCALAPPDATA%\Microsoft\Windows\WER\ReportQueue\*",
    r"%PROGRAMDATA%\Microsoft\Windows\WER\ReportQueue\*",
    r"%LOCALAPPDATA%\CrashDumps\*",
    r"%WINDIR%\LiveKernelReports\*",
    r"%WINDIR%\Minidump\*",
    r"%WINDIR%\Prefetch\*.pf",
    r"%WINDIR%\System32\winevt\Logs\*.evtx",
    r"%LOCALAPPDATA%\FontCache\*",
    r"%LOCALAPPDATA%\Microsoft\Media Player\*",
    r"%LOCALAPPDATA%\Microsoft\Windows\Backup\*",
    r"%WINDIR%\System32\spp\store\cache\*",
    r"%LOCALAPPDATA%\D3DSCache\*",
    r"%APPDATA%\Microsoft\Windows\Recent\AutomaticDestinations\*",
    r"%WINDIR%\System32\config\RegBack\*",
    "~/.cache/thumbnails/*",
    "~/.cache/fontconfig/*",
    "~/.local/share/recently-used.xbel",
    "/var/crash/*",
    "~/Library/Logs/DiagnosticReports/*",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_names_round_trip() {
        for category in Category::CONCRETE {
            assert_eq!(category.name().parse::<Category>().unwrap(), category);
        }
        assert_eq!("ALL".parse::<Category>().unwrap(), Category::All);
        assert_eq!("temp_files".parse::<Category>().unwrap(), Category::TempFiles);
        assert!("nonsense".parse::<Category>().is_err());
    }

    #[test]
    fn all_concatenates_in_run_order() {
        let mut catalog = PathCatalog::empty();
        catalog.set(Category::BrowserCache, vec!["b".into()]);
        catalog.set(Category::TempFiles, vec!["t1".into(), "t2".into()]);
        catalog.set(Category::GamingFiles, vec!["g".into()]);

        assert_eq!(catalog.templates(Category::All), vec!["t1", "t2", "b", "g"]);
        assert!(catalog.templates(Category::MediaFiles).is_empty());
    }

    #[test]
    fn builtin_has_templates_for_path_categories() {
        let catalog = PathCatalog::builtin();
        for category in Category::CONCRETE {
            if category == Category::RecycleBin {
                continue;
            }
            assert!(!catalog.templates(category).is_empty(), "{category}");
        }
    }
}
