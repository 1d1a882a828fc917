use crate::naming::NamingStrategy;
use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub uploads_dir: PathBuf,
    pub naming: NamingStrategy,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8001,
            uploads_dir: PathBuf::from("uploads"),
            naming: NamingStrategy::Random,
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Default, Parser)]
#[command(name = "server")]
#[command(about = "Courseware upload server", long_about = None)]
pub struct ServerArgs {
    #[arg(short, long, help = "Optional TOML config file")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "COURSEWARE_HOST", help = "Bind address, e.g. 127.0.0.1 or 0.0.0.0")]
    pub host: Option<IpAddr>,

    #[arg(short, long, env = "COURSEWARE_PORT", help = "Listening port")]
    pub port: Option<u16>,

    #[arg(long, env = "COURSEWARE_UPLOADS_DIR", help = "Directory uploaded files are stored in")]
    pub uploads_dir: Option<PathBuf>,

    #[arg(long, value_enum, env = "COURSEWARE_NAMING", help = "Stored filename strategy")]
    pub naming: Option<NamingStrategy>,

    #[arg(long, env = "COURSEWARE_MAX_UPLOAD_BYTES", help = "Largest accepted request body")]
    pub max_upload_bytes: Option<usize>,
}

impl ServerConfig {
    /// File values (if any) first, then command line / environment on top.
    pub fn load(args: &ServerArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(host) = args.host {
            config.host = host;
        }
        if let Some(port) = args.port {
            config.port = port;
        }
        if let Some(dir) = &args.uploads_dir {
            config.uploads_dir = dir.clone();
        }
        if let Some(naming) = args.naming {
            config.naming = naming;
        }
        if let Some(max) = args.max_upload_bytes {
            config.max_upload_bytes = max;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            bail!("port must be > 0");
        }
        if self.max_upload_bytes == 0 {
            bail!("max_upload_bytes must be > 0");
        }
        if self.uploads_dir.as_os_str().is_empty() {
            bail!("uploads_dir must not be empty");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::load(&ServerArgs::default()).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.bind_addr().to_string(), "0.0.0.0:8001");
    }

    #[test]
    fn file_values_are_overridden_by_args() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "host = \"127.0.0.1\"\nport = 8080\nnaming = \"timestamp\"\nuploads_dir = \"/srv/courseware\""
        )
        .unwrap();

        let args = ServerArgs {
            config: Some(file.path().to_path_buf()),
            port: Some(9000),
            ..Default::default()
        };
        let config = ServerConfig::load(&args).unwrap();

        assert_eq!(config.bind_addr().to_string(), "127.0.0.1:9000");
        assert_eq!(config.naming, NamingStrategy::Timestamp);
        assert_eq!(config.uploads_dir, PathBuf::from("/srv/courseware"));
        assert_eq!(config.max_upload_bytes, ServerConfig::default().max_upload_bytes);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "prot = 8080").unwrap();
        assert!(ServerConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn zero_port_is_rejected() {
        let args = ServerArgs {
            port: Some(0),
            ..Default::default()
        };
        assert!(ServerConfig::load(&args).is_err());
    }
}
