use std::path::{Path, PathBuf};

use crate::components::gesture::Difficulty;
use crate::prompt;

pub const MIN_GRID_SIZE: u32 = 8;
pub const MAX_GRID_SIZE: u32 = 128;
pub const MIN_COLOR_COUNT: usize = 2;
pub const MAX_COLOR_COUNT: usize = 100;

/// Preferences that persist across sessions
#[derive(Clone, Debug, PartialEq)]
pub struct AppSettings {
    /// Brush size preset for new puzzles
    pub difficulty: Difficulty,
    /// Cells per side of generated puzzles
    pub grid_size: u32,
    /// Requested palette size
    pub color_count: usize,
    /// Drawing style id (see `prompt::STYLES`)
    pub style: String,
    /// "Adult" transparent mode: shows generation stats and learning state,
    /// and doubles the weight of discard feedback
    pub transparent_mode: bool,
    /// Maximum number of undo strokes (0 = unbounded)
    pub max_undo_steps: usize,
    /// Gallery directory override (empty = default next to this file)
    pub gallery_dir: String,
    /// Directory served by the local image provider
    pub image_library_dir: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            difficulty: Difficulty::Medium,
            grid_size: 32,
            color_count: 10,
            style: prompt::DEFAULT_STYLE.to_string(),
            transparent_mode: false,
            max_undo_steps: 0,
            gallery_dir: String::new(),
            image_library_dir: String::new(),
        }
    }
}

impl AppSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/colorsplash/colorsplash_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\ColorSplash\colorsplash_settings.cfg
    /// On macOS:   ~/Library/Application Support/ColorSplash/colorsplash_settings.cfg
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("colorsplash");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("colorsplash_settings.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).unwrap_or_else(|_| {
                std::env::current_exe()
                    .ok()
                    .and_then(|p| p.parent().map(|d| d.to_string_lossy().into_owned()))
                    .unwrap_or_default()
            });
            let config_dir = PathBuf::from(appdata).join("ColorSplash");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("colorsplash_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            let config_dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("ColorSplash");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("colorsplash_settings.cfg"));
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join("colorsplash_settings.cfg")))
        }
    }

    /// `max_undo_steps` as the history cap (`None` = unbounded).
    pub fn undo_cap(&self) -> Option<usize> {
        (self.max_undo_steps > 0).then_some(self.max_undo_steps)
    }

    pub fn gallery_path(&self) -> Option<PathBuf> {
        if self.gallery_dir.is_empty() {
            crate::io::PuzzleStore::default_dir()
        } else {
            Some(PathBuf::from(&self.gallery_dir))
        }
    }

    pub fn image_library_path(&self) -> Option<PathBuf> {
        if self.image_library_dir.is_empty() {
            Self::settings_path().and_then(|p| p.parent().map(|d| d.join("library")))
        } else {
            Some(PathBuf::from(&self.image_library_dir))
        }
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "difficulty={}\n\
             grid_size={}\n\
             color_count={}\n\
             style={}\n\
             transparent_mode={}\n\
             max_undo_steps={}\n\
             gallery_dir={}\n\
             image_library_dir={}\n",
            self.difficulty.name(),
            self.grid_size,
            self.color_count,
            self.style,
            self.transparent_mode,
            self.max_undo_steps,
            self.gallery_dir,
            self.image_library_dir,
        )
    }

    /// Parse `key=value` lines. Unknown keys are ignored; bad values keep
    /// their defaults; numbers are clamped to their valid ranges.
    pub fn from_config_str(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "difficulty" => {
                    s.difficulty = Difficulty::parse(val).unwrap_or_default();
                }
                "grid_size" => {
                    s.grid_size = val
                        .parse::<u32>()
                        .map(|n| n.clamp(MIN_GRID_SIZE, MAX_GRID_SIZE))
                        .unwrap_or(32);
                }
                "color_count" => {
                    s.color_count = val
                        .parse::<usize>()
                        .map(|n| n.clamp(MIN_COLOR_COUNT, MAX_COLOR_COUNT))
                        .unwrap_or(10);
                }
                "style" => {
                    if prompt::style(val).is_some() {
                        s.style = val.to_string();
                    }
                }
                "transparent_mode" => {
                    s.transparent_mode = val == "true";
                }
                "max_undo_steps" => {
                    s.max_undo_steps = val.parse().unwrap_or(0);
                }
                "gallery_dir" => {
                    s.gallery_dir = val.to_string();
                }
                "image_library_dir" => {
                    s.image_library_dir = val.to_string();
                }
                _ => {}
            }
        }
        s
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_config_string())
    }

    /// Returns defaults if the file is missing or unreadable.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_config_str(&content),
            Err(_) => Self::default(),
        }
    }

    /// Save settings to disk
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            crate::log_warn!("Failed to save settings to {}: {}", path.display(), e);
        }
    }

    /// Load settings from disk (returns default if file missing or corrupt)
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        Self::load_from(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_string_reads_back() {
        let s = AppSettings {
            difficulty: Difficulty::Hard,
            grid_size: 48,
            color_count: 24,
            style: "anime".into(),
            transparent_mode: true,
            max_undo_steps: 30,
            gallery_dir: "/tmp/gallery".into(),
            image_library_dir: String::new(),
        };
        assert_eq!(AppSettings::from_config_str(&s.to_config_string()), s);
        assert_eq!(s.undo_cap(), Some(30));
    }

    #[test]
    fn bad_values_fall_back_and_ranges_clamp() {
        let s = AppSettings::from_config_str(
            "difficulty=extreme\ngrid_size=4096\ncolor_count=abc\nstyle=oil\nmystery=1\nnot a line\n",
        );
        assert_eq!(s.difficulty, Difficulty::Medium);
        assert_eq!(s.grid_size, MAX_GRID_SIZE);
        assert_eq!(s.color_count, 10);
        assert_eq!(s.style, "cute");
        assert_eq!(s.undo_cap(), None);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.cfg");
        assert_eq!(AppSettings::load_from(&path), AppSettings::default());

        let mut s = AppSettings::default();
        s.grid_size = 16;
        s.save_to(&path).unwrap();
        assert_eq!(AppSettings::load_from(&path).grid_size, 16);
    }
}
