use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use linkage::{Error, PartyId, Preprocessing, SessionConfig};
use serde::{Deserialize, Serialize};

use crate::FileSource;

/// How the report is printed to stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One `key: value` line per field.
    #[default]
    Text,
    /// A single JSON object.
    Json,
}

/// The configuration of a party, merged from defaults, config files, the environment and flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartyConfig {
    /// The number of parties, including the 2 input parties.
    pub party_count: usize,
    /// The id of the local party. Parties 0 and 1 provide the two lists.
    pub pid: PartyId,
    /// The listening address of every party, indexed by party id.
    pub peers: Vec<SocketAddr>,
    /// The file containing the local identifiers.
    pub input: Option<PathBuf>,
    /// The zero-based column holding the identifiers, or `None` for one identifier per line.
    pub column: Option<usize>,
    /// The column delimiter.
    pub delimiter: char,
    /// Whether the first line of the input is a header row.
    pub header: bool,
    /// Whether the indices of matching records are revealed after the count.
    pub reveal_pairs: bool,
    /// The number of bits used to share the list lengths.
    pub length_width_bits: u32,
    /// The number of bits used to share identifiers.
    pub value_width_bits: u32,
    /// Aborts the session after this many seconds.
    pub deadline_secs: Option<u64>,
    /// Gives up connecting to the peers after this many seconds.
    pub connect_timeout_secs: u64,
    /// How correlated randomness is produced.
    pub preprocessing: Preprocessing,
    /// How the report is printed.
    pub output: OutputFormat,
}

impl Default for PartyConfig {
    fn default() -> Self {
        let session = SessionConfig::new(2, 0);
        Self {
            party_count: session.party_count,
            pid: session.local_pid,
            peers: vec![],
            input: None,
            column: None,
            delimiter: ',',
            header: false,
            reveal_pairs: session.reveal_pairs,
            length_width_bits: session.length_width_bits,
            value_width_bits: session.value_width_bits,
            deadline_secs: None,
            connect_timeout_secs: 30,
            preprocessing: session.preprocessing,
            output: OutputFormat::default(),
        }
    }
}

/// Settings that take precedence over every other configuration source.
///
/// Unset fields leave the value of the lower layers untouched.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<PartyId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peers: Option<Vec<SocketAddr>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reveal_pairs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preprocessing: Option<Preprocessing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputFormat>,
}

impl PartyConfig {
    /// Merges defaults, `Linkage.toml`, `Linkage.json`, the optional `config_file`, `LINKAGE_`
    /// environment variables and the `overrides`, in increasing order of precedence.
    pub fn figment(config_file: Option<&Path>, overrides: &Overrides) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(PartyConfig::default()))
            .merge(Toml::file("Linkage.toml"))
            .merge(Json::file("Linkage.json"));
        if let Some(path) = config_file {
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("json") => figment.merge(Json::file(path)),
                _ => figment.merge(Toml::file(path)),
            };
        }
        figment
            .merge(Env::prefixed("LINKAGE_"))
            .merge(Serialized::defaults(overrides))
    }

    /// Loads the configuration from all sources.
    pub fn load(config_file: Option<&Path>, overrides: &Overrides) -> Result<Self, figment::Error> {
        Self::figment(config_file, overrides).extract()
    }

    /// The session parameters, validated before any connection is opened.
    pub fn session_config(&self) -> Result<SessionConfig, Error> {
        let mut config = SessionConfig::new(self.party_count, self.pid)
            .with_reveal_pairs(self.reveal_pairs)
            .with_preprocessing(self.preprocessing)
            .with_length_width(self.length_width_bits);
        config.value_width_bits = self.value_width_bits;
        if let Some(secs) = self.deadline_secs {
            config = config.with_deadline(Duration::from_secs(secs));
        }
        config.validate()?;
        if self.peers.len() != self.party_count {
            return Err(Error::TransportMismatch);
        }
        if self.pid < 2 && self.input.is_none() {
            return Err(Error::InputUnavailable(format!(
                "party {} provides a list but no input file is configured",
                self.pid
            )));
        }
        Ok(config)
    }

    /// The identifier file of an input party, `None` for helpers.
    pub fn source(&self) -> Option<FileSource> {
        match &self.input {
            Some(path) if self.pid < 2 => Some(FileSource {
                path: path.clone(),
                column: self.column,
                delimiter: self.delimiter,
                header: self.header,
            }),
            _ => None,
        }
    }

    /// How long to keep trying to reach the peers.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Parses the name of a preprocessing mode as used in config files.
pub fn parse_preprocessing(name: &str) -> Result<Preprocessing, String> {
    match name {
        "oblivious-transfer" => Ok(Preprocessing::ObliviousTransfer),
        "trusted-seed" => Ok(Preprocessing::TrustedSeed),
        _ => Err("expected `oblivious-transfer` or `trusted-seed`".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_without_sources() {
        Jail::expect_with(|_| {
            let config = PartyConfig::load(None, &Overrides::default())?;
            assert_eq!(config, PartyConfig::default());
            assert_eq!(config.preprocessing, Preprocessing::ObliviousTransfer);
            assert_eq!(config.output, OutputFormat::Text);
            Ok(())
        });
    }

    #[test]
    fn toml_then_env_then_overrides() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "Linkage.toml",
                r#"
                party_count = 3
                pid = 1
                peers = ["127.0.0.1:8001", "127.0.0.1:8002", "127.0.0.1:8003"]
                input = "ids.csv"
                column = 2
                delimiter = ";"
                header = true
                preprocessing = "trusted-seed"
            "#,
            )?;
            let config = PartyConfig::load(None, &Overrides::default())?;
            assert_eq!(config.party_count, 3);
            assert_eq!(config.peers[2], "127.0.0.1:8003".parse().unwrap());
            assert_eq!(config.column, Some(2));
            assert_eq!(config.delimiter, ';');
            assert!(config.header);
            assert_eq!(config.preprocessing, Preprocessing::TrustedSeed);

            jail.set_env("LINKAGE_PID", "2");
            jail.set_env("LINKAGE_OUTPUT", "json");
            let config = PartyConfig::load(None, &Overrides::default())?;
            assert_eq!(config.pid, 2);
            assert_eq!(config.output, OutputFormat::Json);

            let overrides = Overrides {
                pid: Some(0),
                reveal_pairs: Some(true),
                ..Overrides::default()
            };
            let config = PartyConfig::load(None, &overrides)?;
            assert_eq!(config.pid, 0);
            assert!(config.reveal_pairs);
            assert_eq!(config.output, OutputFormat::Json);
            Ok(())
        });
    }

    #[test]
    fn explicit_json_file() {
        Jail::expect_with(|jail| {
            jail.create_file("Linkage.toml", "pid = 1")?;
            jail.create_file(
                "party.json",
                r#"{ "deadline_secs": 60, "reveal_pairs": true }"#,
            )?;
            let config = PartyConfig::load(Some(Path::new("party.json")), &Overrides::default())?;
            assert_eq!(config.pid, 1);
            assert_eq!(config.deadline_secs, Some(60));
            assert!(config.reveal_pairs);
            Ok(())
        });
    }

    #[test]
    fn invalid_values_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("Linkage.toml", r#"preprocessing = "magic""#)?;
            assert!(PartyConfig::load(None, &Overrides::default()).is_err());
            Ok(())
        });
    }

    #[test]
    fn session_config_is_validated() {
        let peers: Vec<SocketAddr> = vec![
            "127.0.0.1:8001".parse().unwrap(),
            "127.0.0.1:8002".parse().unwrap(),
        ];
        let config = PartyConfig {
            peers: peers.clone(),
            input: Some("ids.txt".into()),
            deadline_secs: Some(5),
            ..PartyConfig::default()
        };
        let session = config.session_config().unwrap();
        assert_eq!(session.deadline, Some(Duration::from_secs(5)));
        assert!(config.source().is_some());

        let too_few_peers = PartyConfig {
            peers: peers[..1].to_vec(),
            ..config.clone()
        };
        assert_eq!(
            too_few_peers.session_config(),
            Err(Error::TransportMismatch)
        );

        let unknown_pid = PartyConfig {
            pid: 2,
            ..config.clone()
        };
        assert_eq!(unknown_pid.session_config(), Err(Error::InvalidPartyId));

        let narrow_values = PartyConfig {
            value_width_bits: 32,
            ..config.clone()
        };
        assert_eq!(
            narrow_values.session_config(),
            Err(Error::ValueWidthMismatch)
        );

        let no_input = PartyConfig {
            input: None,
            ..config
        };
        assert!(matches!(
            no_input.session_config(),
            Err(Error::InputUnavailable(_))
        ));
    }

    #[test]
    fn helpers_need_no_input() {
        let config = PartyConfig {
            party_count: 3,
            pid: 2,
            peers: vec!["127.0.0.1:8001".parse().unwrap(); 3],
            input: Some("ignored.txt".into()),
            ..PartyConfig::default()
        };
        assert!(config.session_config().is_ok());
        assert!(config.source().is_none());
    }

    #[test]
    fn preprocessing_names() {
        assert_eq!(
            parse_preprocessing("trusted-seed"),
            Ok(Preprocessing::TrustedSeed)
        );
        assert!(parse_preprocessing("TrustedSeed").is_err());
    }
}
