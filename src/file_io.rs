//! Plain-text file access: files are read and written as line sequences.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};

/// Read a file into lines. Line terminators (`\n` or `\r\n`) are removed.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let file = fs::File::open(path).map_err(|e| Error::io(path.display(), e))?;
    let reader = BufReader::new(file);
    reader
        .lines()
        .map(|line| line.map_err(|e| Error::io(path.display(), e)))
        .collect()
}

/// Write lines to a file, each terminated by `\n`.
pub fn write_lines(path: &Path, lines: &[String], append: bool) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .map_err(|e| Error::io(path.display(), e))?;
    let mut writer = BufWriter::new(file);
    for line in lines {
        writeln!(writer, "{}", line).map_err(|e| Error::io(path.display(), e))?;
    }
    writer.flush().map_err(|e| Error::io(path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        write_lines(&path, &["one".to_string(), "two".to_string()], false).unwrap();
        write_lines(&path, &["three".to_string()], true).unwrap();
        assert_eq!(read_lines(&path).unwrap(), vec!["one", "two", "three"]);
    }

    #[test]
    fn crlf_is_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dos.txt");
        fs::write(&path, "a\r\nb\r\n").unwrap();
        assert_eq!(read_lines(&path).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_lines(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Io);
    }
}
