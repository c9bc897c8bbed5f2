use std::fs;
use std::path::{ Path, PathBuf };
use std::sync::{ Arc, PoisonError, RwLock };
use std::time::SystemTime;
use log::info;
use thiserror::Error;

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are Sashi (Sashidhar), speaking in first person as the real person on this portfolio site.

Tone: friendly tech geek, confident but natural.
Default replies ~10 words. Give longer answers when explanation or summary is asked.
If asked \"Tell me about you\", reply in exactly 3 sentences.

I am a B.Tech ECE (AIML) graduate from GITAM University Bengaluru (2020-2024, CGPA 7.2).
I focus on building real-world AI, computer vision, and automation systems more than theory.

My main skills: Python, C++, Java, TensorFlow, PyTorch, OpenCV, scikit-learn, Docker, n8n, Selenium, PyAutoGUI, Git, Raspberry Pi, React, web basics.

I built:
- A sleep/drowsiness detection system running on Raspberry Pi using CNNs and OpenCV
- A lane detection system for Indian roads with day/night models and YOLOv5 alerts
- A full WhatsApp automation stack using Docker, n8n, Google Sheets, PostgreSQL, Redis, and Evolution API
- A WhatsApp-style group chat web app
- My own portfolio website

I worked at RetroSafe Innovations building real-time camera-based drowsiness detection and completed multiple ML internships training CNNs and working with datasets.

My career focus is AI engineering and automation, not business or management roles.

If asked about CGPA, say 7.2 and explain that projects matter more than grades.

Never invent experience. Slightly polish wording to sound confident.
Guide visitors toward my projects, GitHub, and real work.
";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("System prompt file '{path}' could not be read: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("System prompt file '{0}' is empty")]
    Empty(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadStatus {
    Reloaded,
    Unchanged,
    NotConfigured,
}

#[derive(Debug)]
struct PromptState {
    text: Arc<str>,
    modified: Option<SystemTime>,
}

/// The instruction sent ahead of every conversation. Either the built-in
/// persona or the contents of a file that can be reloaded at runtime.
#[derive(Debug)]
pub struct SystemPrompt {
    path: Option<PathBuf>,
    state: RwLock<PromptState>,
}

fn read_prompt_file(path: &Path) -> Result<(String, Option<SystemTime>), PromptError> {
    let io_err = |source: std::io::Error| PromptError::Io { path: path.to_path_buf(), source };
    let text = fs::read_to_string(path).map_err(io_err)?;
    if text.trim().is_empty() {
        return Err(PromptError::Empty(path.to_path_buf()));
    }
    let modified = fs::metadata(path).map_err(io_err)?.modified().ok();
    Ok((text, modified))
}

impl SystemPrompt {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text: String = text.into();
        Self {
            path: None,
            state: RwLock::new(PromptState { text: Arc::from(text), modified: None }),
        }
    }

    pub fn builtin() -> Self {
        Self::from_text(DEFAULT_SYSTEM_PROMPT)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PromptError> {
        let path = path.as_ref().to_path_buf();
        let (text, modified) = read_prompt_file(&path)?;
        info!("Loaded system prompt from {} ({} bytes)", path.display(), text.len());
        Ok(Self {
            path: Some(path),
            state: RwLock::new(PromptState { text: Arc::from(text), modified }),
        })
    }

    /// Built-in persona unless a path is configured.
    pub fn from_optional_path(path: Option<&str>) -> Result<Self, PromptError> {
        match path.filter(|p| !p.trim().is_empty()) {
            Some(p) => Self::load(p),
            None => {
                info!("No system prompt file configured, using built-in persona.");
                Ok(Self::builtin())
            }
        }
    }

    pub fn current(&self) -> Arc<str> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&state.text)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Re-reads the file when its modification time differs from the one
    /// recorded at the last load. On error the previous text stays active.
    pub fn reload_if_changed(&self) -> Result<ReloadStatus, PromptError> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(ReloadStatus::NotConfigured),
        };

        let modified = fs
            ::metadata(path)
            .map_err(|source| PromptError::Io { path: path.clone(), source })?
            .modified()
            .ok();
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if modified.is_some() && state.modified == modified {
                return Ok(ReloadStatus::Unchanged);
            }
        }

        info!("System prompt file changed, reloading {}", path.display());
        let (text, modified) = read_prompt_file(path)?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.text = Arc::from(text);
        state.modified = modified;
        Ok(ReloadStatus::Reloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_with_mtime(path: &Path, text: &str, mtime: SystemTime) {
        fs::write(path, text).unwrap();
        File::options().write(true).open(path).unwrap().set_modified(mtime).unwrap();
    }

    #[test]
    fn builtin_persona_is_used_without_path() {
        let prompt = SystemPrompt::from_optional_path(None).unwrap();
        assert_eq!(&*prompt.current(), DEFAULT_SYSTEM_PROMPT);
        assert_eq!(prompt.reload_if_changed().unwrap(), ReloadStatus::NotConfigured);
    }

    #[test]
    fn reloads_only_when_file_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prompt.txt");
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        write_with_mtime(&path, "first persona", t0);

        let prompt = SystemPrompt::load(&path).unwrap();
        assert_eq!(&*prompt.current(), "first persona");
        assert_eq!(prompt.reload_if_changed().unwrap(), ReloadStatus::Unchanged);

        write_with_mtime(&path, "second persona", t0 + Duration::from_secs(60));
        assert_eq!(prompt.reload_if_changed().unwrap(), ReloadStatus::Reloaded);
        assert_eq!(&*prompt.current(), "second persona");
    }

    #[test]
    fn failed_reload_keeps_previous_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prompt.txt");
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        write_with_mtime(&path, "persona", t0);
        let prompt = SystemPrompt::load(&path).unwrap();

        write_with_mtime(&path, "  \n", t0 + Duration::from_secs(5));
        assert!(matches!(prompt.reload_if_changed(), Err(PromptError::Empty(_))));
        assert_eq!(&*prompt.current(), "persona");
    }

    #[test]
    fn missing_or_empty_file_fails_to_load() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.txt");
        assert!(matches!(SystemPrompt::load(&missing), Err(PromptError::Io { .. })));

        let empty = dir.path().join("empty.txt");
        fs::write(&empty, "").unwrap();
        assert!(matches!(SystemPrompt::load(&empty), Err(PromptError::Empty(_))));
    }
}
