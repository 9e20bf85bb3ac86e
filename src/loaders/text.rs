use std::path::Path;

use super::Document;
use crate::error::LoadError;

pub async fn load_txt(path: &Path) -> Result<Document, LoadError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|err| LoadError::Txt(format!("failed reading {}: {err}", path.display())))?;

    let text = String::from_utf8(bytes)
        .map_err(|err| LoadError::Txt(format!("file is not valid UTF-8: {err}")))?;

    let document = Document::from_fragments([text.trim_start_matches('\u{FEFF}')]);
    if document.is_empty() {
        return Err(LoadError::EmptyTxt);
    }
    Ok(document)
}
