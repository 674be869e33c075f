//! Size and extension policy for inbound documents.

use std::path::Path;

use crate::error::ConversionError;
use crate::pipeline::InboundFile;

/// Rejects documents that are too large or of an unsupported type.
#[derive(Debug, Clone)]
pub struct FileValidator {
    max_file_size: u64,
    allowed_extensions: Vec<String>,
}

impl FileValidator {
    /// Create a validator. Extensions are matched case-insensitively and may
    /// be given with or without the leading dot.
    pub fn new(max_file_size: u64, allowed_extensions: &[String]) -> Self {
        Self {
            max_file_size,
            allowed_extensions: allowed_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .collect(),
        }
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    /// Size policy alone, for byte counts known only after download.
    pub fn check_size(&self, size: u64) -> Result<(), ConversionError> {
        if size > self.max_file_size {
            return Err(ConversionError::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }
        Ok(())
    }

    /// Check size first, then extension.
    pub fn validate(&self, file: &InboundFile) -> Result<(), ConversionError> {
        self.check_size(file.byte_size)?;

        let extension = Path::new(&file.name)
            .extension()
            .map(|e| normalize_extension(&e.to_string_lossy()));

        match extension {
            Some(ext) if self.allowed_extensions.contains(&ext) => Ok(()),
            _ => Err(ConversionError::UnsupportedFormat {
                file_name: file.name.clone(),
                allowed: self.allowed_extensions.clone(),
            }),
        }
    }
}

/// Lowercase with a single leading dot: `TXT` and `.txt` both become `.txt`.
fn normalize_extension(ext: &str) -> String {
    format!(".{}", ext.trim().trim_start_matches('.').to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn validator() -> FileValidator {
        FileValidator::new(
            10 * MIB,
            &[".txt".to_string(), ".md".to_string(), ".rtf".to_string()],
        )
    }

    fn file(name: &str, size: u64) -> InboundFile {
        InboundFile::new(name, size, "file-id")
    }

    #[test]
    fn test_accepts_supported_file() {
        assert!(validator().validate(&file("notes.txt", 500)).is_ok());
        assert!(validator().validate(&file("README.md", 10 * MIB)).is_ok());
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        assert!(validator().validate(&file("NOTES.TXT", 1)).is_ok());
        assert!(validator().validate(&file("Draft.Rtf", 1)).is_ok());
    }

    #[test]
    fn test_rejects_large_file() {
        let err = validator()
            .validate(&file("notes.txt", 15 * MIB))
            .unwrap_err();
        assert!(matches!(err, ConversionError::FileTooLarge { size, max }
            if size == 15 * MIB && max == 10 * MIB));
    }

    #[test]
    fn test_size_checked_before_extension() {
        let err = validator()
            .validate(&file("slides.pdf", 15 * MIB))
            .unwrap_err();
        assert!(matches!(err, ConversionError::FileTooLarge { .. }));
    }

    #[test]
    fn test_rejects_unsupported_extension() {
        for name in ["notes.pdf", "notes", "notes.txt.exe", ".bashrc"] {
            let err = validator().validate(&file(name, 10)).unwrap_err();
            assert!(
                matches!(err, ConversionError::UnsupportedFormat { .. }),
                "{} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_check_size_boundary() {
        assert!(validator().check_size(10 * MIB).is_ok());
        assert!(matches!(
            validator().check_size(10 * MIB + 1),
            Err(ConversionError::FileTooLarge { .. })
        ));
    }

    #[test]
    fn test_allow_list_accepts_bare_extensions() {
        let v = FileValidator::new(100, &["TXT".to_string(), " md ".to_string()]);
        assert_eq!(v.allowed_extensions(), &[".txt".to_string(), ".md".to_string()]);
        assert!(v.validate(&file("a.md", 1)).is_ok());
    }
}
