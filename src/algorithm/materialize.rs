//! Scoped temporary files for file-mode algorithms

use std::io::{BufWriter, Write};
use std::path::Path;

use tempfile::{Builder, NamedTempFile};
use tracing::debug;

use crate::Result;

/// Write `values` as comma-delimited rows to a fresh temporary file.
///
/// The file lives exactly as long as the returned handle.
///
/// # Errors
///
/// Returns `Io` if the file cannot be created or written.
pub(crate) fn write_values(values: &[Vec<f64>], temp_dir: Option<&Path>) -> Result<NamedTempFile> {
    let mut builder = Builder::new();
    builder.prefix("tsad-trial-").suffix(".csv");
    let mut file = match temp_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };

    {
        let mut writer = BufWriter::new(file.as_file_mut());
        for row in values {
            let mut cells = row.iter();
            if let Some(first) = cells.next() {
                write!(writer, "{first}")?;
            }
            for cell in cells {
                write!(writer, ",{cell}")?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
    }

    debug!(path = %file.path().display(), rows = values.len(), "Materialized trial input");
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_written_and_removed_on_drop() {
        let file = write_values(&[vec![1.5, 2.0], vec![3.0, -4.25]], None).unwrap();
        let path = file.path().to_path_buf();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "1.5,2\n3,-4.25\n");

        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn test_custom_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_values(&[vec![1.0]], Some(dir.path())).unwrap();
        assert!(file.path().starts_with(dir.path()));
    }
}
