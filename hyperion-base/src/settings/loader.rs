use std::env;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use eyre::{bail, Context, Result};
use serde::de::DeserializeOwned;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "HYPERION";

/// Load settings from `./config/*.json`, `CONFIG_FILES`, `HYPERION_*`
/// variables and finally `overrides`, which are `(dotted.key, value)` pairs
/// coming from the command line.
pub fn load_settings<T: DeserializeOwned>(overrides: &[(&str, String)]) -> Result<T> {
    load_settings_from(Path::new("./config"), overrides)
}

/// `load_settings` with an explicit directory of base config files.
pub fn load_settings_from<T: DeserializeOwned>(
    config_dir: &Path,
    overrides: &[(&str, String)],
) -> Result<T> {
    let mut builder = Config::builder();

    for path in base_config_files(config_dir)? {
        builder = builder.add_source(File::from(path).format(FileFormat::Json));
    }

    for path in env::var("CONFIG_FILES")
        .iter()
        .flat_map(|files| files.split(','))
        .map(str::trim)
        .filter(|f| !f.is_empty())
    {
        let path = PathBuf::from(path);
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            bail!("Provided config path via CONFIG_FILES is of an unsupported type ({path:?})");
        }
        if !path.is_file() {
            bail!("Provided config path via CONFIG_FILES is not a file ({path:?})");
        }
        builder = builder.add_source(File::from(path).format(FileFormat::Json));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    for (key, value) in overrides {
        builder = builder
            .set_override(*key, value.as_str())
            .with_context(|| format!("Invalid override for {key}"))?;
    }

    builder
        .build()
        .context("Failed to load config sources")?
        .try_deserialize()
        .context("Failed to deserialize settings")
}

fn base_config_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }
    let mut files = dir
        .read_dir()
        .with_context(|| format!("Reading {dir:?}"))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect::<Vec<_>>();
    files.sort();
    Ok(files)
}
