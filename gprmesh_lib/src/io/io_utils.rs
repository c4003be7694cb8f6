use std::ffi::OsString;
use std::fs;
use std::fs::File;
use std::io;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Returns the path of the temporary file used while writing the given destination
///
/// The temporary file is a hidden sibling of the destination, so the final rename does not cross
/// file systems.
pub fn temporary_sibling(path: &Path) -> io::Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("\"{}\" does not name a file", path.display()),
        )
    })?;

    let mut temp_name = OsString::from(".");
    temp_name.push(file_name);
    temp_name.push(".tmp");
    Ok(path.with_file_name(temp_name))
}

/// Writes a file through a buffered writer into a temporary sibling and renames it to the destination
///
/// If writing fails, the temporary file is removed and an existing destination file is kept as is.
pub fn write_atomically<P, F>(path: P, write_contents: F) -> io::Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let path = path.as_ref();
    let temp_path = temporary_sibling(path)?;

    let write_temp = || -> io::Result<()> {
        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        let mut writer = BufWriter::with_capacity(100000, file);
        write_contents(&mut writer)?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|err| err.into_error())?;
        file.sync_all()
    };

    match write_temp().and_then(|_| fs::rename(&temp_path, path)) {
        Ok(()) => Ok(()),
        Err(err) => {
            // Nothing to clean up if the temporary file was never created
            let _ = fs::remove_file(&temp_path);
            Err(err)
        }
    }
}
