// ============================================================================
// IMAGE PROVIDER: text in, raster bytes + usage metadata out
// ============================================================================

use std::path::{Path, PathBuf};

use crate::prompt::construct_generation_prompt;

/// File types [`FolderProvider`] will serve.
const LIBRARY_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "gif"];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UsageStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub model: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    /// Subject phrase, e.g. "A cute puppy riding in a race car".
    pub subject: String,
    pub style: String,
    pub modifiers: Option<String>,
    /// Full provider prompt built from the fields above.
    pub prompt: String,
}

impl GenerationRequest {
    pub fn new(subject: &str, style: &str, modifiers: Option<String>) -> Self {
        let modifiers = modifiers.filter(|m| !m.trim().is_empty());
        Self {
            prompt: construct_generation_prompt(subject, style, modifiers.as_deref()),
            subject: subject.to_string(),
            style: style.to_string(),
            modifiers,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GeneratedImage {
    /// Encoded image (PNG, JPEG, ...).
    pub bytes: Vec<u8>,
    pub stats: UsageStats,
}

/// Generation failures, in user-facing categories.
#[derive(Clone, Debug, PartialEq)]
pub enum GenerationError {
    InvalidCredential,
    PermissionDenied,
    RateLimited,
    SafetyRejected,
    Network,
    MissingKey,
    NoImage,
    Other(String),
}

impl GenerationError {
    /// Map a raw provider error message onto a category.
    pub fn categorize(message: &str) -> Self {
        if message.contains("API key") {
            GenerationError::InvalidCredential
        } else if message.contains("403") {
            GenerationError::PermissionDenied
        } else if message.contains("429") {
            GenerationError::RateLimited
        } else if message.contains("safety") {
            GenerationError::SafetyRejected
        } else if message.contains("fetch failed") {
            GenerationError::Network
        } else if message.trim().is_empty() {
            GenerationError::Other("An unknown error occurred.".to_string())
        } else {
            GenerationError::Other(message.to_string())
        }
    }
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationError::InvalidCredential => write!(f, "Check your Magic Key (API Key is invalid or expired)."),
            GenerationError::PermissionDenied => write!(f, "Magic Key doesn't have permission."),
            GenerationError::RateLimited => write!(f, "The magic pencil is tired. Wait a few seconds!"),
            GenerationError::SafetyRejected => write!(f, "That idea is a bit too wild! Try a different animal."),
            GenerationError::Network => write!(f, "Could not connect to the magic cloud. Check your internet!"),
            GenerationError::MissingKey => write!(f, "Missing Magic Key. Please add your key in the settings."),
            GenerationError::NoImage => write!(f, "No image was returned."),
            GenerationError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Anything that can turn a prompt into an image. Implementations may
/// report raw failures as [`GenerationError::Other`]; [`request_image`]
/// sorts them into user-facing categories.
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, GenerationError>;
}

/// Run one provider call. Raw messages are categorized and a panicking
/// provider becomes an error instead of taking the caller down.
pub fn request_image(provider: &dyn ImageProvider, request: &GenerationRequest) -> Result<GeneratedImage, GenerationError> {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| provider.generate(request)))
        .unwrap_or_else(|_| Err(GenerationError::Other("The image provider crashed.".to_string())));
    outcome.map_err(|e| match e {
        GenerationError::Other(msg) => {
            let categorized = GenerationError::categorize(&msg);
            crate::log_warn!("Provider {} failed: {} ({:?})", provider.name(), msg, categorized);
            categorized
        }
        other => other,
    })
}

// ============================================================================
// FOLDER PROVIDER: serves pre-rendered images by subject
// ============================================================================

/// Looks up `<dir>/<slug>.<ext>` for the request subject. When there is no
/// exact match, the longest file stem that appears inside the subject slug
/// wins (so `lion.png` answers "A lion").
pub struct FolderProvider {
    dir: PathBuf,
}

impl FolderProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn find(&self, subject: &str) -> Result<Option<PathBuf>, GenerationError> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| GenerationError::Other(format!("Image library {} unavailable: {}", self.dir.display(), e)))?;

        let wanted = slug(subject);
        let mut best: Option<(usize, PathBuf)> = None;
        for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| LIBRARY_EXTENSIONS.contains(&e.to_lowercase().as_str()));
            if !is_image {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(slug) else { continue };
            if stem.is_empty() {
                continue;
            }
            if stem == wanted {
                return Ok(Some(path));
            }
            let contained = format!("-{}-", wanted).contains(&format!("-{}-", stem));
            if contained && best.as_ref().is_none_or(|(len, p)| stem.len() > *len || (stem.len() == *len && path < *p)) {
                best = Some((stem.len(), path));
            }
        }
        Ok(best.map(|(_, p)| p))
    }
}

impl ImageProvider for FolderProvider {
    fn name(&self) -> &str {
        "local-folder"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, GenerationError> {
        let path = self.find(&request.subject)?.ok_or(GenerationError::NoImage)?;
        let bytes = std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => GenerationError::PermissionDenied,
            _ => GenerationError::Other(format!("Could not read {}: {}", path.display(), e)),
        })?;
        crate::log_info!("Folder provider served {} for '{}'", path.display(), request.subject);
        Ok(GeneratedImage {
            bytes,
            stats: UsageStats {
                model: self.name().to_string(),
                ..Default::default()
            },
        })
    }
}

/// Lowercase alphanumeric words joined by `-`.
fn slug(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorizes_provider_messages() {
        assert_eq!(GenerationError::categorize("API key not valid"), GenerationError::InvalidCredential);
        assert_eq!(GenerationError::categorize("HTTP 403 Forbidden"), GenerationError::PermissionDenied);
        assert_eq!(GenerationError::categorize("status 429"), GenerationError::RateLimited);
        assert_eq!(GenerationError::categorize("blocked for safety"), GenerationError::SafetyRejected);
        assert_eq!(GenerationError::categorize("TypeError: fetch failed"), GenerationError::Network);
        assert_eq!(
            GenerationError::categorize("model overloaded"),
            GenerationError::Other("model overloaded".into())
        );
    }

    #[test]
    fn request_builds_full_prompt() {
        let req = GenerationRequest::new("A lion", "cartoon", Some(String::new()));
        assert_eq!(req.modifiers, None);
        assert!(req.prompt.contains("Subject: A lion."));
    }

    #[test]
    fn slug_normalizes_words() {
        assert_eq!(slug("A Cute  Puppy, riding!"), "a-cute-puppy-riding");
    }

    #[test]
    fn folder_provider_prefers_exact_then_longest_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lion.png"), b"lion").unwrap();
        std::fs::write(dir.path().join("race-car.png"), b"car").unwrap();
        std::fs::write(dir.path().join("car.png"), b"short").unwrap();
        std::fs::write(dir.path().join("a-cat.jpg"), b"cat").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        let provider = FolderProvider::new(dir.path());

        let get = |subject: &str| provider.generate(&GenerationRequest::new(subject, "cute", None));
        assert_eq!(get("A cat").unwrap().bytes, b"cat");
        assert_eq!(get("A lion").unwrap().bytes, b"lion");
        assert_eq!(get("A tiny robot riding in a race car").unwrap().bytes, b"car");
        assert_eq!(get("A notes").unwrap_err(), GenerationError::NoImage);
        assert_eq!(get("A lion").unwrap().stats.model, "local-folder");
    }

    #[test]
    fn missing_library_is_an_error() {
        let provider = FolderProvider::new("/definitely/not/here");
        let err = provider.generate(&GenerationRequest::new("A lion", "cute", None)).unwrap_err();
        assert!(matches!(err, GenerationError::Other(_)));
    }

    /// Answers every request with a fixed raw failure message.
    struct FailingProvider(&'static str);

    impl ImageProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        fn generate(&self, _request: &GenerationRequest) -> Result<GeneratedImage, GenerationError> {
            Err(GenerationError::Other(self.0.to_string()))
        }
    }

    struct PanickingProvider;

    impl ImageProvider for PanickingProvider {
        fn name(&self) -> &str {
            "panicking"
        }

        fn generate(&self, _request: &GenerationRequest) -> Result<GeneratedImage, GenerationError> {
            panic!("provider bug")
        }
    }

    #[test]
    fn request_image_categorizes_raw_failures() {
        let req = GenerationRequest::new("A lion", "cute", None);
        let get = |msg: &'static str| request_image(&FailingProvider(msg), &req).unwrap_err();
        assert_eq!(get("HTTP 429 Too Many Requests"), GenerationError::RateLimited);
        assert_eq!(get("API key expired"), GenerationError::InvalidCredential);
        assert_eq!(get("candidate blocked for safety"), GenerationError::SafetyRejected);
        assert_eq!(get("disk on fire"), GenerationError::Other("disk on fire".into()));
        assert_eq!(
            get("HTTP 429 Too Many Requests").to_string(),
            "The magic pencil is tired. Wait a few seconds!"
        );
    }

    #[test]
    fn request_image_survives_a_panicking_provider() {
        let req = GenerationRequest::new("A lion", "cute", None);
        let err = request_image(&PanickingProvider, &req).unwrap_err();
        assert_eq!(err, GenerationError::Other("The image provider crashed.".into()));
    }

    #[test]
    fn request_image_passes_folder_results_through() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lion.png"), b"lion").unwrap();
        let provider = FolderProvider::new(dir.path());
        let req = GenerationRequest::new("A lion", "cute", None);
        assert_eq!(request_image(&provider, &req).unwrap().bytes, b"lion");
        let req = GenerationRequest::new("A zebra", "cute", None);
        assert_eq!(request_image(&provider, &req).unwrap_err(), GenerationError::NoImage);
    }
}
