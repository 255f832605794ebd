// ============================================================================
// LEARNING: per-category bias counters that steer future prompts
// ============================================================================
//
// Discard feedback raises one counter; saving a puzzle slowly heals them.
// Counters index into fixed keyword banks, so the prompt can only ever gain
// pre-approved phrases.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rand::Rng;

pub const MAX_LEVEL: u8 = 3;
/// Chance that a save lowers each non-zero counter by one.
pub const HEAL_CHANCE: f64 = 0.25;

const SIMPLIFY: [&str; 4] = [
    "",
    "use thick outlines and simple shapes",
    "very simple, minimal details, bold thick lines, easy to color",
    "preschool level, massive shapes, very thick lines, no small details",
];
const QUALITY: [&str; 4] = [
    "",
    "ensure symmetry and clear features",
    "anatomically correct, high quality vector art, perfect proportions",
    "masterpiece, distinct features, professional illustration, perfect composition",
];
const CUTENESS: [&str; 4] = [
    "",
    "friendly appearance, rounded shapes",
    "kawaii style, big eyes, happy expression",
    "extremely cute, baby style, adorable, soft edges, smiling",
];
const EXCITEMENT: [&str; 4] = [
    "",
    "active pose",
    "dynamic motion, energetic composition",
    "exciting action pose, dramatic angle, dynamic movement",
];
const PENALTY: [&str; 4] = [
    "",
    "focus on the main subject",
    "single subject only, do not add background characters",
    "single isolated subject, strictly no extra objects, no background characters",
];

/// Why a preview was discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Feedback {
    Complex,
    Distorted,
    Scary,
    Boring,
    UnwantedObject,
}

impl Feedback {
    pub fn name(&self) -> &'static str {
        match self {
            Feedback::Complex => "complex",
            Feedback::Distorted => "distorted",
            Feedback::Scary => "scary",
            Feedback::Boring => "boring",
            Feedback::UnwantedObject => "unwanted_object",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Feedback::Complex => "Too complex",
            Feedback::Distorted => "Looks weird",
            Feedback::Scary => "Too scary",
            Feedback::Boring => "Boring",
            Feedback::UnwantedObject => "Extra stuff",
        }
    }

    pub fn all() -> &'static [Feedback] {
        &[
            Feedback::Complex,
            Feedback::Distorted,
            Feedback::Scary,
            Feedback::Boring,
            Feedback::UnwantedObject,
        ]
    }
}

/// Feedback weight: doubled when a grown-up is driving.
pub fn feedback_weight(transparent_mode: bool) -> u8 {
    if transparent_mode { 2 } else { 1 }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CategoryProfile {
    pub simplify: u8,
    pub quality: u8,
    pub cuteness: u8,
    pub excitement: u8,
    pub object_penalty: u8,
}

impl CategoryProfile {
    fn counter_mut(&mut self, feedback: Feedback) -> &mut u8 {
        match feedback {
            Feedback::Complex => &mut self.simplify,
            Feedback::Distorted => &mut self.quality,
            Feedback::Scary => &mut self.cuteness,
            Feedback::Boring => &mut self.excitement,
            Feedback::UnwantedObject => &mut self.object_penalty,
        }
    }

    fn counters_mut(&mut self) -> [&mut u8; 5] {
        [
            &mut self.simplify,
            &mut self.quality,
            &mut self.cuteness,
            &mut self.excitement,
            &mut self.object_penalty,
        ]
    }

    /// Comma-separated bank phrases for every non-zero counter.
    pub fn modifiers(&self) -> String {
        [
            (self.simplify, &SIMPLIFY),
            (self.quality, &QUALITY),
            (self.cuteness, &CUTENESS),
            (self.excitement, &EXCITEMENT),
            (self.object_penalty, &PENALTY),
        ]
        .iter()
        .filter(|(level, _)| *level > 0)
        .map(|(level, bank)| bank[(*level).min(MAX_LEVEL) as usize])
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// Learning data for every category, optionally backed by a file.
#[derive(Debug, Default)]
pub struct LearningStore {
    profiles: BTreeMap<String, CategoryProfile>,
    path: Option<PathBuf>,
}

impl LearningStore {
    /// Not persisted anywhere.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// `<config dir>/colorsplash_learning.cfg`
    pub fn default_path() -> Option<PathBuf> {
        crate::settings::AppSettings::settings_path()
            .and_then(|p| p.parent().map(|d| d.join("colorsplash_learning.cfg")))
    }

    /// Load from `path`; a missing or unreadable file starts empty. Later
    /// changes are written back to the same path.
    pub fn open(path: &Path) -> Self {
        let mut store = match std::fs::read_to_string(path) {
            Ok(content) => Self::from_config_str(&content),
            Err(_) => Self::default(),
        };
        store.path = Some(path.to_path_buf());
        store
    }

    /// Lines of `category.counter=level`.
    pub fn from_config_str(content: &str) -> Self {
        let mut store = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let Some((category, counter)) = key.trim().rsplit_once('.') else { continue };
            let Ok(level) = val.trim().parse::<u8>() else { continue };
            let level = level.min(MAX_LEVEL);
            let profile = store.profiles.entry(category.to_string()).or_default();
            match counter {
                "simplify" => profile.simplify = level,
                "quality" => profile.quality = level,
                "cuteness" => profile.cuteness = level,
                "excitement" => profile.excitement = level,
                "object_penalty" => profile.object_penalty = level,
                _ => {}
            }
        }
        store
    }

    pub fn to_config_string(&self) -> String {
        let mut out = String::new();
        for (category, p) in &self.profiles {
            out.push_str(&format!(
                "{c}.simplify={}\n{c}.quality={}\n{c}.cuteness={}\n{c}.excitement={}\n{c}.object_penalty={}\n",
                p.simplify,
                p.quality,
                p.cuteness,
                p.excitement,
                p.object_penalty,
                c = category
            ));
        }
        out
    }

    fn persist(&self) {
        let Some(path) = &self.path else { return };
        if let Err(e) = std::fs::write(path, self.to_config_string()) {
            crate::log_warn!("Failed to save learning data to {}: {}", path.display(), e);
        }
    }

    pub fn profile(&self, category: &str) -> Option<&CategoryProfile> {
        self.profiles.get(category)
    }

    /// Negative feedback: raise the matching counter by `weight`, capped.
    pub fn record_feedback(&mut self, category: &str, feedback: Feedback, weight: u8) {
        let profile = self.profiles.entry(category.to_string()).or_default();
        let counter = profile.counter_mut(feedback);
        *counter = counter.saturating_add(weight).min(MAX_LEVEL);
        crate::log_info!("Learning: {} feedback '{}' (weight {})", category, feedback.name(), weight);
        self.persist();
    }

    /// Positive signal: each non-zero counter drops by one with
    /// [`HEAL_CHANCE`]. Categories with no data are left alone.
    pub fn record_save<R: Rng + ?Sized>(&mut self, category: &str, rng: &mut R) {
        let Some(profile) = self.profiles.get_mut(category) else { return };
        for counter in profile.counters_mut() {
            if *counter > 0 && rng.gen_bool(HEAL_CHANCE) {
                *counter -= 1;
            }
        }
        self.persist();
    }

    /// Character companions are blocked once any object penalty is learned.
    pub fn should_include_extra_objects(&self, category: &str) -> bool {
        self.profile(category).is_none_or(|p| p.object_penalty == 0)
    }

    pub fn prompt_modifiers(&self, category: &str) -> String {
        self.profile(category).map(|p| p.modifiers()).unwrap_or_default()
    }

    pub fn profile_stats(&self, category: &str) -> String {
        match self.profile(category) {
            Some(p) => format!(
                "Simp:{} Qual:{} Cute:{} ObjPen:{}",
                p.simplify, p.quality, p.cuteness, p.object_penalty
            ),
            None => "No data".to_string(),
        }
    }

    /// Human-readable summary for transparent mode.
    pub fn explanation(&self, category: &str) -> Vec<String> {
        let default = vec!["System is using default settings.".to_string()];
        let Some(p) = self.profile(category) else { return default };

        let lines: Vec<String> = [
            (p.simplify, "Too Complex: forcing simplification"),
            (p.quality, "Distortions: forcing anatomy/quality checks"),
            (p.cuteness, "Scary: forcing cuteness/rounding"),
            (p.excitement, "Boring: forcing dynamic action"),
            (p.object_penalty, "Cluttered: removing extras/backgrounds"),
        ]
        .iter()
        .filter(|(level, _)| *level > 0)
        .map(|(level, text)| format!("{} (Level {}/{})", text, level, MAX_LEVEL))
        .collect();

        if lines.is_empty() { default } else { lines }
    }
}
