use std::path::{Path, PathBuf};

use crate::components::tools::{MAX_BRUSH_SIZE, MAX_OPACITY, MIN_BRUSH_SIZE, MIN_OPACITY, Tool};

const SETTINGS_FILE: &str = "maskpaint_settings.cfg";

/// Editor defaults that persist across sessions.
#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    /// Initial brush size (stroke width in mask pixels).
    pub brush_size: u32,
    /// Initial overlay opacity.
    pub opacity: f32,
    /// Tool selected when a session starts.  Every image load resets to the brush.
    pub default_tool: Tool,
    /// File-name prefix for masks written by the directory store.
    pub mask_prefix: String,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            brush_size: 80,
            opacity: 0.5,
            default_tool: Tool::Brush,
            mask_prefix: "mask".to_string(),
        }
    }
}

impl EditorSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/maskpaint/maskpaint_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\MaskPaint\maskpaint_settings.cfg
    /// On macOS:   ~/Library/Application Support/MaskPaint/maskpaint_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            return Some(PathBuf::from(appdata).join("MaskPaint").join(SETTINGS_FILE));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("MaskPaint")
                    .join(SETTINGS_FILE),
            );
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
                .ok()?;
            Some(config_dir.join("maskpaint").join(SETTINGS_FILE))
        }
    }

    /// Load from the default location (defaults if missing or corrupt).
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    /// Parse `key=value` lines.  Unknown keys and bad values fall back to defaults.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "brush_size" => {
                    if let Ok(v) = val.parse::<u32>() {
                        s.brush_size = v.clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE);
                    }
                }
                "opacity" => {
                    if let Ok(v) = val.parse::<f32>()
                        && v.is_finite()
                    {
                        s.opacity = v.clamp(MIN_OPACITY, MAX_OPACITY);
                    }
                }
                "default_tool" => {
                    if let Some(tool) = Tool::from_name(val) {
                        s.default_tool = tool;
                    }
                }
                "mask_prefix" => {
                    if !val.is_empty()
                        && val.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                    {
                        s.mask_prefix = val.to_string();
                    }
                }
                _ => {}
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "brush_size={}\n\
             opacity={}\n\
             default_tool={}\n\
             mask_prefix={}\n",
            self.brush_size,
            self.opacity,
            self.default_tool.name(),
            self.mask_prefix,
        )
    }

    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            log_warn!("Failed to save settings to {}: {}", path.display(), e);
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reads_known_keys_and_clamps() {
        let s = EditorSettings::parse(
            "# comment\nbrush_size=500\nopacity=0.02\ndefault_tool=eraser\nmask_prefix=brushmask\nbogus=1\n",
        );
        assert_eq!(s.brush_size, 200);
        assert_eq!(s.opacity, 0.1);
        assert_eq!(s.default_tool, Tool::Eraser);
        assert_eq!(s.mask_prefix, "brushmask");
    }

    #[test]
    fn corrupt_values_fall_back_to_defaults() {
        let s = EditorSettings::parse("brush_size=big\nopacity=NaN\ndefault_tool=lasso\nmask_prefix=../x\nno equals sign");
        assert_eq!(s, EditorSettings::default());
    }

    #[test]
    fn config_string_round_trips() {
        let s = EditorSettings {
            brush_size: 33,
            opacity: 0.75,
            default_tool: Tool::Fill,
            mask_prefix: "m".to_string(),
        };
        assert_eq!(EditorSettings::parse(&s.to_config_string()), s);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let s = EditorSettings::load_from(Path::new("/definitely/not/here.cfg"));
        assert_eq!(s, EditorSettings::default());
    }
}
