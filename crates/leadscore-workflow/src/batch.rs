use std::path::Path;
use std::sync::Arc;

use leadscore_core::ValidationError;

pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// A prospect batch selected for upload.
#[derive(Debug, Clone)]
pub struct BatchFile {
    name: String,
    content_type: Option<String>,
    contents: Arc<[u8]>,
}

impl BatchFile {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        content_type: Option<String>,
        contents: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type,
            contents: contents.into(),
        }
    }

    /// Reads a batch from disk. The content type is inferred from a `.csv`
    /// extension and left unset otherwise.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the file cannot be read.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let contents = std::fs::read(path)?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let content_type = has_csv_extension(&name).then(|| CSV_CONTENT_TYPE.to_owned());
        Ok(Self::new(name, content_type, contents))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    pub(crate) fn contents(&self) -> Arc<[u8]> {
        Arc::clone(&self.contents)
    }

    /// Accepts the batch if it is named `*.csv` or typed `text/csv`, and is
    /// not empty.
    ///
    /// # Errors
    ///
    /// [`ValidationError::NotCsv`] or [`ValidationError::EmptyFile`].
    pub fn check(&self) -> Result<(), ValidationError> {
        let typed_csv = self
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.trim().eq_ignore_ascii_case(CSV_CONTENT_TYPE));
        if !has_csv_extension(&self.name) && !typed_csv {
            return Err(ValidationError::NotCsv {
                name: self.name.clone(),
            });
        }
        if self.contents.is_empty() {
            return Err(ValidationError::EmptyFile {
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

fn has_csv_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(name: &str, content_type: Option<&str>, contents: &[u8]) -> BatchFile {
        BatchFile::new(name, content_type.map(str::to_owned), contents)
    }

    #[test]
    fn csv_extension_is_accepted_case_insensitively() {
        assert!(batch("leads.CSV", None, b"name\nAva\n").check().is_ok());
    }

    #[test]
    fn csv_content_type_is_accepted_without_extension() {
        assert!(batch("export", Some("text/csv"), b"name\nAva\n").check().is_ok());
    }

    #[test]
    fn other_files_are_rejected() {
        let err = batch("leads.xlsx", Some("application/vnd.ms-excel"), b"PK")
            .check()
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::NotCsv {
                name: "leads.xlsx".into()
            }
        );
    }

    #[test]
    fn empty_csv_is_rejected() {
        let err = batch("leads.csv", None, b"").check().unwrap_err();
        assert_eq!(
            err,
            ValidationError::EmptyFile {
                name: "leads.csv".into()
            }
        );
    }

    #[test]
    fn from_path_infers_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leads.csv");
        std::fs::write(&path, "name\nAva\n").unwrap();

        let file = BatchFile::from_path(&path).unwrap();
        assert_eq!(file.name(), "leads.csv");
        assert_eq!(file.content_type(), Some(CSV_CONTENT_TYPE));
        assert_eq!(file.len(), 9);
    }
}
