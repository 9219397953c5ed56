//! Loading character personas and stories from a story directory.
//!
//! A story directory looks like:
//!
//! ```text
//! <base>/characters/<lowercased name>.json
//! <base>/story/<anything>.json      (exactly one)
//! ```

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::character::CharacterPersona;
use crate::error::{RealmError, Result};
use crate::story::Story;

fn require_dir(path: &Path, what: &str) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(RealmError::Loader(format!("{what} not found: {}", path.display())))
    }
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "json"))
        .collect();
    files.sort();
    Ok(files)
}

/// Reads personas from `<base>/characters/`.
#[derive(Debug, Clone)]
pub struct CharacterLoader {
    characters_dir: PathBuf,
}

impl CharacterLoader {
    /// Open the characters directory under `base_dir`.
    ///
    /// # Errors
    /// `RealmError::Loader` if either directory is missing.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base = base_dir.as_ref();
        require_dir(base, "Story base directory")?;
        let characters_dir = base.join("characters");
        require_dir(&characters_dir, "Characters directory")?;
        Ok(Self { characters_dir })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.characters_dir.join(format!("{}.json", name.to_lowercase()))
    }

    /// Load one persona by name (case-insensitive file lookup).
    ///
    /// # Errors
    /// `RealmError::Loader` if the file is missing or not a valid persona.
    pub fn load_character(&self, name: &str) -> Result<CharacterPersona> {
        let path = self.path_for(name);
        if !path.is_file() {
            return Err(RealmError::Loader(format!(
                "Character file not found: {} (available: {})",
                path.display(),
                self.list_available()?.join(", ")
            )));
        }
        let content = std::fs::read_to_string(&path)?;
        let persona: CharacterPersona = serde_json::from_str(&content)
            .map_err(|e| RealmError::Loader(format!("Invalid character file {}: {e}", path.display())))?;
        debug!(character = %persona.name, path = %path.display(), "Loaded character");
        Ok(persona)
    }

    /// Load several personas, failing on the first problem.
    ///
    /// # Errors
    /// See [`Self::load_character`].
    pub fn load_characters<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<CharacterPersona>> {
        names.iter().map(|n| self.load_character(n.as_ref())).collect()
    }

    /// Names (file stems) of every available persona, sorted.
    ///
    /// # Errors
    /// I/O errors reading the directory.
    pub fn list_available(&self) -> Result<Vec<String>> {
        Ok(json_files(&self.characters_dir)?
            .iter()
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect())
    }

    /// Whether a persona file exists for `name`.
    #[must_use]
    pub fn character_exists(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }
}

/// Reads the single story file from `<base>/story/`.
#[derive(Debug, Clone)]
pub struct StoryLoader {
    story_dir: PathBuf,
}

impl StoryLoader {
    /// Open the story directory under `base_dir`.
    ///
    /// # Errors
    /// `RealmError::Loader` if either directory is missing.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base = base_dir.as_ref();
        require_dir(base, "Story base directory")?;
        let story_dir = base.join("story");
        require_dir(&story_dir, "Story directory")?;
        Ok(Self { story_dir })
    }

    /// Load the story.
    ///
    /// # Errors
    /// `RealmError::Loader` when there is not exactly one story file, when it
    /// does not parse, or when its objective index is out of range.
    pub fn load_story(&self) -> Result<Story> {
        let files = json_files(&self.story_dir)?;
        let path = match files.as_slice() {
            [only] => only,
            [] => {
                return Err(RealmError::Loader(format!(
                    "No story file found in {}",
                    self.story_dir.display()
                )));
            }
            many => {
                return Err(RealmError::Loader(format!(
                    "Expected one story file in {}, found {}",
                    self.story_dir.display(),
                    many.len()
                )));
            }
        };

        let content = std::fs::read_to_string(path)?;
        let story: Story = serde_json::from_str(&content)
            .map_err(|e| RealmError::Loader(format!("Invalid story file {}: {e}", path.display())))?;
        if story.current_objective_index() > story.objectives.len() {
            return Err(RealmError::Loader(format!(
                "current_objective_index {} is beyond the {} objectives",
                story.current_objective_index(),
                story.objectives.len()
            )));
        }
        debug!(title = %story.title, objectives = story.objectives.len(), "Loaded story");
        Ok(story)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn story_dir() -> TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("characters")).expect("mkdir");
        std::fs::create_dir(dir.path().join("story")).expect("mkdir");
        std::fs::write(
            dir.path().join("characters/hermione.json"),
            r#"{"name": "Hermione", "traits": ["clever"], "temperature": 0.6}"#,
        )
        .expect("write");
        std::fs::write(dir.path().join("characters/ron.json"), r#"{"name": "Ron"}"#).expect("write");
        dir
    }

    #[test]
    fn loads_characters_case_insensitively() {
        let dir = story_dir();
        let loader = CharacterLoader::new(dir.path()).expect("loader");
        let hermione = loader.load_character("Hermione").expect("hermione");
        assert_eq!(hermione.traits, vec!["clever"]);
        assert!(loader.character_exists("RON"));
        assert!(!loader.character_exists("Draco"));
        assert_eq!(loader.list_available().expect("list"), vec!["hermione", "ron"]);

        let both = loader.load_characters(&["Ron", "Hermione"]).expect("both");
        assert_eq!(both.len(), 2);
    }

    #[test]
    fn missing_character_lists_alternatives() {
        let dir = story_dir();
        let loader = CharacterLoader::new(dir.path()).expect("loader");
        let err = loader.load_character("Draco").expect_err("missing");
        assert!(err.to_string().contains("hermione, ron"), "{err}");
    }

    #[test]
    fn missing_directories_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(CharacterLoader::new(dir.path()), Err(RealmError::Loader(_))));
        assert!(matches!(StoryLoader::new(dir.path()), Err(RealmError::Loader(_))));
        assert!(CharacterLoader::new(dir.path().join("nope")).is_err());
    }

    #[test]
    fn loads_the_single_story() {
        let dir = story_dir();
        std::fs::write(
            dir.path().join("story/locked_room.json"),
            r#"{"title": "The Locked Room", "description": "Escape.", "objectives": ["find the key", "open the door"]}"#,
        )
        .expect("write");
        let story = StoryLoader::new(dir.path()).expect("loader").load_story().expect("story");
        assert_eq!(story.current_objective(), Some("find the key"));
    }

    #[test]
    fn story_count_must_be_one() {
        let dir = story_dir();
        let loader = StoryLoader::new(dir.path()).expect("loader");
        assert!(loader.load_story().is_err());

        for name in ["a.json", "b.json"] {
            std::fs::write(
                dir.path().join("story").join(name),
                r#"{"title": "T", "objectives": []}"#,
            )
            .expect("write");
        }
        let err = loader.load_story().expect_err("two stories");
        assert!(err.to_string().contains("found 2"), "{err}");
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let dir = story_dir();
        std::fs::write(
            dir.path().join("story/s.json"),
            r#"{"title": "T", "objectives": ["a"], "current_objective_index": 3}"#,
        )
        .expect("write");
        let loader = StoryLoader::new(dir.path()).expect("loader");
        assert!(matches!(loader.load_story(), Err(RealmError::Loader(_))));
    }
}
