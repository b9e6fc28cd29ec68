use std::fs;
use std::fs::File;
use std::io::prelude::*;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use simple_error::bail;

use crate::FnResult;

/// On-disk encodings of the calibrated-curve artifact. Json is the
/// interchange format; MessagePack is the compact one for large corridors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerdeFormat {
    Json,
    MessagePack,
}

impl SerdeFormat {
    /// Pick the format from the file name: `.json` is Json, everything
    /// else (conventionally `.mpack`) is MessagePack.
    pub fn from_filename(filename: &str) -> SerdeFormat {
        match Path::new(filename).extension().and_then(|e| e.to_str()) {
            Some("json") => SerdeFormat::Json,
            _ => SerdeFormat::MessagePack,
        }
    }
}

pub fn save_to_file<T: Serialize>(object: &T, filename: &str, format: &SerdeFormat) -> FnResult<()> {
    if let Some(parent) = Path::new(filename).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let bytes = match format {
        SerdeFormat::Json => serde_json::to_vec_pretty(object)?,
        SerdeFormat::MessagePack => rmp_serde::to_vec_named(object)?,
    };
    let mut file = File::create(filename)?;
    file.write_all(&bytes)?;
    Ok(())
}

pub fn load_from_file<T: DeserializeOwned>(filename: &str, format: &SerdeFormat) -> FnResult<T> {
    let mut file = match File::open(filename) {
        Ok(file) => file,
        Err(e) => bail!("Could not open {}: {}", filename, e),
    };
    let mut buffer = Vec::<u8>::new();
    file.read_to_end(&mut buffer)?;
    let parsed = match format {
        SerdeFormat::Json => serde_json::from_slice::<T>(&buffer)?,
        SerdeFormat::MessagePack => rmp_serde::from_slice::<T>(&buffer)?,
    };
    Ok(parsed)
}
