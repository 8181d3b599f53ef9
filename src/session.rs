use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::io::EditorError;

/// Leading tag of a session file, bumped when the layout changes.
const SESSION_MAGIC: [u8; 4] = *b"MPS1";

/// The two values a host has to persist to bring a masking session back:
/// the source image name and the handle of its uploaded mask (`""` = none).
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    pub image: String,
    pub mask_data: String,
}

#[derive(Serialize, Deserialize)]
struct SessionFile {
    magic: [u8; 4],
    state: SessionState,
}

impl SessionState {
    pub fn to_bytes(&self) -> Result<Vec<u8>, EditorError> {
        let file = SessionFile {
            magic: SESSION_MAGIC,
            state: self.clone(),
        };
        Ok(bincode::serialize(&file)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EditorError> {
        let file: SessionFile = bincode::deserialize(bytes)?;
        if file.magic != SESSION_MAGIC {
            return Err(EditorError::Session("not a maskpaint session file".to_string()));
        }
        Ok(file.state)
    }

    pub fn save(&self, path: &Path) -> Result<(), EditorError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)
            .map_err(|e| EditorError::Session(format!("{}: {}", path.display(), e)))
    }

    pub fn load(path: &Path) -> Result<Self, EditorError> {
        let bytes = std::fs::read(path)
            .map_err(|e| EditorError::Session(format!("{}: {}", path.display(), e)))?;
        Self::from_bytes(&bytes)
    }
}
