use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use memmap::Mmap;

use super::error::{MuxError, Result};

/// Resolves an input that is either an `.mcap` file or a rosbag2 directory
/// holding one.
pub fn check_mcap_input_path<P: AsRef<Utf8Path>>(input: P) -> Result<Utf8PathBuf> {
    let input = input.as_ref();
    if input.is_file() {
        if input.extension() != Some("mcap") {
            return Err(MuxError::unreadable(
                input,
                "input path must point to an .mcap file or a folder containing one",
            ));
        }
        return Ok(input.to_path_buf());
    }
    if input.is_dir() {
        let mut candidates: Vec<Utf8PathBuf> = Vec::new();
        for entry in input.read_dir_utf8()? {
            let path = entry?.into_path();
            if path.extension() == Some("mcap") {
                candidates.push(path);
            }
        }
        candidates.sort();
        return match candidates.len() {
            0 => Err(MuxError::unreadable(
                input,
                "folder does not contain an .mcap file",
            )),
            1 => Ok(candidates.remove(0)),
            n => Err(MuxError::unreadable(
                input,
                format!("folder contains {} .mcap files, pass one explicitly", n),
            )),
        };
    }
    Err(MuxError::unreadable(input, "no such file or directory"))
}

/// Checks the shape of an output path without touching the filesystem and
/// returns the bag name it implies.
pub fn check_output_name(output: &Utf8Path) -> Result<&str> {
    let extension = output.extension();
    if extension != Some("mcap") && extension.is_some() {
        return Err(MuxError::Usage(format!(
            "output path {} must either be an .mcap file, or a directory",
            output
        )));
    }
    output
        .file_stem()
        .ok_or_else(|| MuxError::Usage(format!("output path {} has no file name", output)))
}

/// Lays out the output like rosbag2 does: `<dir>/<name>/<name>.mcap`.
///
/// A path without extension is taken as the bag directory itself. Existing
/// bags are never overwritten.
pub fn check_mcap_output_path<P: AsRef<Utf8Path>>(output: P) -> Result<Utf8PathBuf> {
    let output = output.as_ref();
    let directory_name = check_output_name(output)?;
    let extension = output.extension();

    let bag_dir = match extension {
        Some(_) => output
            .parent()
            .unwrap_or_else(|| Utf8Path::new(""))
            .join(directory_name),
        None => output.to_path_buf(),
    };
    let output_path = bag_dir.join(format!("{}.mcap", directory_name));
    if output_path.exists() {
        return Err(MuxError::output(&output_path, "output bag already exists"));
    }
    if !bag_dir.exists() {
        fs::create_dir_all(&bag_dir)?;
    }
    if !bag_dir.is_dir() {
        return Err(MuxError::output(&bag_dir, "not a directory"));
    }
    Ok(output_path)
}

pub fn map_mcap<P: AsRef<Utf8Path>>(p: P) -> Result<Mmap> {
    let fd = fs::File::open(p.as_ref())
        .map_err(|e| MuxError::unreadable(p.as_ref(), format!("couldn't open MCAP file: {}", e)))?;
    // Safety: inputs are only read, and a bag being rewritten underneath a
    // running merge is outside what this tool supports.
    unsafe { Mmap::map(&fd) }
        .map_err(|e| MuxError::unreadable(p.as_ref(), format!("couldn't map MCAP file: {}", e)))
}
