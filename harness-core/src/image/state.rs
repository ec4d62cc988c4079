use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{HarnessError, Result};

pub static DEFAULT_STATE_FILE: &str = ".harness.state";

/// Persisted metadata for one built image, keyed by its recipe's content
/// hash. Lets a second run against the same task skip the Docker build
/// entirely.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageState {
    pub content_hash: String,
    pub image_name: String,
    pub tag: String,
    pub timestamp: SystemTime,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ImagesState {
    pub images: HashMap<String, ImageState>,
    path: PathBuf,
    #[serde(skip)]
    has_changed: bool,
}

impl ImagesState {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            images: HashMap::new(),
            path: path.into(),
            has_changed: false,
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let state_file = path.as_ref();
        if !state_file.exists() {
            debug!("state file doesn't exist, starting fresh");
            return Ok(ImagesState::new(state_file));
        }
        debug!("loading image state");
        let contents = fs::read(state_file).map_err(|e| HarnessError::io(state_file, e))?;
        let mut state: ImagesState = serde_cbor::from_slice(&contents)?;
        state.path = state_file.to_path_buf();
        Ok(state)
    }

    pub fn update(&mut self, content_hash: String, state: ImageState) {
        if self.images.get(&content_hash) != Some(&state) {
            self.has_changed = true;
        }
        self.images.insert(content_hash, state);
    }

    pub fn save(&self) -> Result<()> {
        trace!("saving image state");
        let data = serde_cbor::to_vec(self)?;
        fs::write(&self.path, data).map_err(|e| HarnessError::io(self.path.clone(), e))
    }

    pub fn has_changed(&self) -> bool {
        self.has_changed
    }

    pub fn find(&self, content_hash: &str) -> Option<&ImageState> {
        self.images.get(content_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_marks_changed_only_on_new_value() {
        let mut state = ImagesState::new(DEFAULT_STATE_FILE);
        assert!(!state.has_changed());

        let first = ImageState {
            content_hash: "abc".into(),
            image_name: "img".into(),
            tag: "v1".into(),
            timestamp: SystemTime::UNIX_EPOCH,
        };
        state.update("abc".into(), first.clone());
        assert!(state.has_changed());
    }

    #[test]
    fn load_missing_file_returns_empty_state() {
        let state = ImagesState::load("/nonexistent/.harness.state").unwrap();
        assert!(state.images.is_empty());
    }
}
