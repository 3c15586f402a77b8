use std::path::{Path, PathBuf};

use crate::ops::geometry::BASE_RESOLUTION;
use crate::ops::measure::LABEL_SEPARATOR;

const SETTINGS_FILE: &str = "sizemarks_settings.cfg";

/// User-tunable constants of the size-mark operation.
#[derive(Clone, Debug, PartialEq)]
pub struct SizeMarkSettings {
    /// PostScript name of the label font.
    pub font_name: String,
    /// Label size in points.
    pub font_size: f64,
    /// Opacity of the mark layer before the label is merged in (percent).
    pub mark_opacity: f64,
    /// Opacity of the finished layer (percent).
    pub final_opacity: f64,
    /// Resolution the nominal line/tick/margin sizes are designed for.
    pub base_resolution: f64,
    /// Character between the value and the unit in the label.
    pub label_separator: char,
    /// Font file used instead of the system font lookup.
    pub font_file: Option<PathBuf>,
    pub max_undo_steps: usize,
    /// Undo memory cap in megabytes; older steps are dropped beyond it.
    pub max_undo_memory_mb: usize,
}

impl Default for SizeMarkSettings {
    fn default() -> Self {
        Self {
            font_name: "ArialMT".to_string(),
            font_size: 12.0,
            mark_opacity: 85.0,
            final_opacity: 65.0,
            base_resolution: BASE_RESOLUTION,
            label_separator: LABEL_SEPARATOR,
            font_file: None,
            max_undo_steps: 50,
            max_undo_memory_mb: 100,
        }
    }
}

impl SizeMarkSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/sizemarks/sizemarks_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\SizeMarks\sizemarks_settings.cfg
    /// On macOS:   ~/Library/Application Support/SizeMarks/sizemarks_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("sizemarks");
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            return Some(PathBuf::from(appdata).join("SizeMarks").join(SETTINGS_FILE));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("SizeMarks")
                    .join(SETTINGS_FILE),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join(SETTINGS_FILE)))
        }
    }

    /// Load settings from the default location (defaults if missing).
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                tracing::info!(path = %path.display(), "loaded settings");
                Self::parse(&content)
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "no settings file, using defaults");
                Self::default()
            }
        }
    }

    /// Parse `key=value` lines over the defaults. Unknown keys and bad values
    /// are skipped with a warning.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else {
                tracing::warn!(line = lineno + 1, "settings line without '='");
                continue;
            };
            let key = key.trim();
            let val = val.trim();
            let ok = match key {
                "font_name" if !val.is_empty() => {
                    s.font_name = val.to_string();
                    true
                }
                "font_size" => parse_positive(val).map(|v| s.font_size = v).is_some(),
                "mark_opacity" => parse_percent(val).map(|v| s.mark_opacity = v).is_some(),
                "final_opacity" => parse_percent(val).map(|v| s.final_opacity = v).is_some(),
                "base_resolution" => parse_positive(val).map(|v| s.base_resolution = v).is_some(),
                "label_separator" => parse_codepoint(val).map(|c| s.label_separator = c).is_some(),
                "font_file" => {
                    s.font_file = (!val.is_empty()).then(|| PathBuf::from(val));
                    true
                }
                "max_undo_steps" => parse_count(val).map(|n| s.max_undo_steps = n).is_some(),
                "max_undo_memory_mb" => parse_count(val).map(|n| s.max_undo_memory_mb = n).is_some(),
                _ => {
                    tracing::warn!(key, "unknown settings key");
                    continue;
                }
            };
            if !ok {
                tracing::warn!(key, value = val, "ignoring malformed settings value");
            }
        }
        s
    }
}

fn parse_positive(val: &str) -> Option<f64> {
    val.parse::<f64>().ok().filter(|v| v.is_finite() && *v > 0.0)
}

fn parse_count(val: &str) -> Option<usize> {
    val.parse::<usize>().ok().filter(|n| *n > 0)
}

fn parse_percent(val: &str) -> Option<f64> {
    val.parse::<f64>().ok().filter(|v| (0.0..=100.0).contains(v))
}

/// Accepts `U+200A`, a bare hex code point, or a single literal character.
fn parse_codepoint(val: &str) -> Option<char> {
    let hex = val.strip_prefix("U+").or_else(|| val.strip_prefix("u+"));
    if let Some(hex) = hex {
        return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
    }
    let mut chars = val.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => u32::from_str_radix(val, 16).ok().and_then(char::from_u32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(SizeMarkSettings::parse(""), SizeMarkSettings::default());
        let d = SizeMarkSettings::default();
        assert_eq!(d.font_name, "ArialMT");
        assert_eq!(d.font_size, 12.0);
        assert_eq!((d.mark_opacity, d.final_opacity), (85.0, 65.0));
        assert_eq!(d.label_separator, '\u{200A}');
    }

    #[test]
    fn known_keys_override_and_bad_values_are_skipped() {
        let s = SizeMarkSettings::parse(
            "# comment\n\
             font_name = Helvetica\n\
             font_size=14\n\
             mark_opacity=140\n\
             final_opacity=50\n\
             label_separator=U+0020\n\
             colour=red\n\
             max_undo_steps=0\n\
             garbage line\n",
        );
        assert_eq!(s.font_name, "Helvetica");
        assert_eq!(s.font_size, 14.0);
        assert_eq!(s.mark_opacity, 85.0);
        assert_eq!(s.final_opacity, 50.0);
        assert_eq!(s.label_separator, ' ');
        assert_eq!(s.max_undo_steps, 50);
    }

    #[test]
    fn settings_file_is_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(
            &path,
            "font_name=DejaVuSans\nfont_file=/fonts/dejavu.ttf\nbase_resolution=96\nmax_undo_memory_mb=8\n",
        )
        .unwrap();

        let expected = SizeMarkSettings {
            font_name: "DejaVuSans".into(),
            font_file: Some(PathBuf::from("/fonts/dejavu.ttf")),
            base_resolution: 96.0,
            max_undo_memory_mb: 8,
            ..SizeMarkSettings::default()
        };
        assert_eq!(SizeMarkSettings::load_from(&path), expected);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = SizeMarkSettings::load_from(&dir.path().join("absent.cfg"));
        assert_eq!(s, SizeMarkSettings::default());
    }
}
