use config::{Config, File};
use std::path::{Path, PathBuf};

use super::*;

/// A helper function that will search for all config files in the given directory and return them as a vec
/// of the paths.
///
/// Supported file extensions are:
/// - `.toml`.
/// - `.json`.
pub fn search_config_files<P: AsRef<Path>>(
    base_dir: P,
) -> tally_relayer_utils::Result<Vec<PathBuf>> {
    // A pattern that covers all toml or json files in the config directory and subdirectories.
    let toml_pattern = format!("{}/**/*.toml", base_dir.as_ref().display());
    let json_pattern = format!("{}/**/*.json", base_dir.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let toml_files = glob::glob(&toml_pattern)?;
    let json_files = glob::glob(&json_pattern)?;
    toml_files
        .chain(json_files)
        .map(|v| v.map_err(tally_relayer_utils::Error::from))
        .collect()
}

/// Try to parse the [`TallyRelayerConfig`] from the given config file(s).
pub fn parse_from_files(
    files: &[PathBuf],
) -> tally_relayer_utils::Result<TallyRelayerConfig> {
    let mut builder = Config::builder();
    for config_file in files {
        tracing::trace!("Loading config file: {}", config_file.display());
        let ext = config_file
            .extension()
            .map(|e| e.to_str().unwrap_or(""))
            .unwrap_or("");
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        builder = builder
            .add_source(File::from(config_file.as_path()).format(format));
    }

    // also merge in the environment (with a prefix of TALLY).
    let builder = builder
        .add_source(config::Environment::with_prefix("TALLY").separator("_"));
    let cfg = builder.build()?;
    // and finally deserialize the config and post-process it
    let config: Result<
        TallyRelayerConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    match config {
        Ok(c) => postloading_process(c),
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

/// Load the configuration files from the given directory.
///
/// It is the same as using the [`search_config_files`] and
/// [`parse_from_files`] functions combined.
pub fn load<P: AsRef<Path>>(
    path: P,
) -> tally_relayer_utils::Result<TallyRelayerConfig> {
    parse_from_files(&search_config_files(path)?)
}

/// The postloading_process exists to validate configuration and
/// standardize the format of the configuration.
pub fn postloading_process(
    mut config: TallyRelayerConfig,
) -> tally_relayer_utils::Result<TallyRelayerConfig> {
    tracing::trace!("Checking configuration sanity ...");
    config.evm.name = config.evm.name.to_lowercase();
    config.verify()?;
    // watch-list entries are UUID strings, normalize them once here so
    // the derived target ids stay stable regardless of config casing.
    for t in &mut config.poller.targets {
        *t = t.trim().to_lowercase();
    }
    tracing::trace!(
        "postloaded config: {}",
        serde_json::to_string_pretty(&config)?
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
port = 9755

[evm]
name = "Localnet"
http-endpoint = "http://127.0.0.1:8545/"
chain-id = 31337
private-key = "0x00000000000000000000000000000000000000000000000000000000000000aa"

[evm.vault]
address = "0x5fbdb2315678afecb367f032d93f642f64180aa3"
deployed-at = 1

[evm.acl]
address = "0xe7f1725e7734ce288f8367e1bb143e90bb3f0512"
deployed-at = 1

[gateway]
url = "https://gateway.example.com/"

[poller]
targets = ["1B671A64-40D5-491E-99B0-DA01FF1F3341"]
"#;

    #[test]
    fn parses_a_full_config_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.toml"), SAMPLE).unwrap();
        let config = load(dir.path()).unwrap();
        assert_eq!(config.port, 9755);
        assert_eq!(config.evm.chain_id, 31337);
        assert_eq!(config.evm.name, "localnet");
        // defaults kick in for everything unspecified.
        assert_eq!(config.poller.interval_ms, 30_000);
        assert_eq!(config.poller.settle_delay_ms, 3_000);
        assert_eq!(config.gateway.request_timeout_ms, 15_000);
        assert_eq!(config.evm.tx.gas_limit, 500_000);
        // watch-list entries get normalized.
        assert_eq!(
            config.poller.targets,
            vec!["1b671a64-40d5-491e-99b0-da01ff1f3341".to_string()]
        );
    }

    #[test]
    fn missing_private_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let without_key = SAMPLE.replace(
            "private-key = \"0x00000000000000000000000000000000000000000000000000000000000000aa\"\n",
            "",
        );
        std::fs::write(dir.path().join("main.toml"), without_key).unwrap();
        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, tally_relayer_utils::Error::MissingSecrets));
    }
}
