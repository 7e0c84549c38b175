use anyhow::{Context, Result};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use postgres_native_tls::MakeTlsConnector;
use serde::{Deserialize, Serialize};
use tokio_postgres::NoTls;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    #[serde(default)]
    pub ssl_mode: SslMode,
    /// Only honoured for `Prefer` and `Require`.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// PEM bundle trusted in addition to the system roots.
    #[serde(default)]
    pub ca_cert_path: Option<String>,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// TLS policy for pool connections. `Prefer` and `Require` skip certificate
/// checks only when `accept_invalid_certs` is set; `VerifyCa` checks the
/// chain and `VerifyFull` the chain and hostname.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl ConnectionConfig {
    /// libpq-style connection string. The verify modes are sent as
    /// `require`; certificate checks happen in the TLS connector.
    pub fn connection_string(&self) -> String {
        let sslmode = match self.ssl_mode {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => "require",
        };
        format!(
            "host={} port={} dbname={} user={} password={} sslmode={} connect_timeout=10",
            quote_conn_value(&self.host),
            self.port,
            quote_conn_value(&self.database),
            quote_conn_value(&self.username),
            quote_conn_value(&self.password),
            sslmode
        )
    }

    pub fn display_string(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: 5432,
            database: String::from("postgres"),
            username: String::from("postgres"),
            password: String::new(),
            ssl_mode: SslMode::default(),
            accept_invalid_certs: false,
            ca_cert_path: None,
            pool_size: default_pool_size(),
        }
    }
}

/// Build a connection pool. No connection is opened until the first
/// checkout.
pub fn create_pool(config: &ConnectionConfig) -> Result<Pool> {
    let pg_config: tokio_postgres::Config = config
        .connection_string()
        .parse()
        .context("Invalid PostgreSQL connection settings")?;
    let manager_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };

    let manager = match config.ssl_mode {
        SslMode::Disable => Manager::from_config(pg_config, NoTls, manager_config),
        SslMode::Prefer | SslMode::Require => {
            let tls = build_tls_connector(config, false)?;
            Manager::from_config(pg_config, tls, manager_config)
        }
        SslMode::VerifyCa | SslMode::VerifyFull => {
            let tls = build_tls_connector(config, true)?;
            Manager::from_config(pg_config, tls, manager_config)
        }
    };

    let pool = Pool::builder(manager)
        .max_size(config.pool_size.max(1))
        .build()
        .context("Failed to build connection pool")?;
    info!(
        server = %config.display_string(),
        size = config.pool_size.max(1),
        "created PostgreSQL pool"
    );
    Ok(pool)
}

/// `strict_verify` is set for the verify modes, which never honour
/// `accept_invalid_certs`.
fn build_tls_connector(config: &ConnectionConfig, strict_verify: bool) -> Result<MakeTlsConnector> {
    let mut builder = native_tls::TlsConnector::builder();

    if config.accept_invalid_certs && !strict_verify {
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    } else {
        if let Some(ca_path) = &config.ca_cert_path {
            let ca_data = std::fs::read(ca_path)
                .with_context(|| format!("Failed to read CA certificate file: {}", ca_path))?;
            add_ca_certificates(&mut builder, &ca_data)?;
        }
        // VerifyCa checks the chain only.
        if config.ssl_mode == SslMode::VerifyCa {
            builder.danger_accept_invalid_hostnames(true);
        }
    }

    let connector = builder.build().context("Failed to build TLS connector")?;

    Ok(MakeTlsConnector::new(connector))
}

/// Add every certificate of a PEM bundle as a trusted root.
fn add_ca_certificates(
    builder: &mut native_tls::TlsConnectorBuilder,
    pem_data: &[u8],
) -> Result<()> {
    for block in pem_blocks(pem_data)? {
        let cert = native_tls::Certificate::from_pem(block.as_bytes())
            .context("Failed to parse certificate")?;
        builder.add_root_certificate(cert);
    }
    Ok(())
}

/// Split a PEM bundle into its individual certificate blocks.
fn pem_blocks(pem_data: &[u8]) -> Result<Vec<String>> {
    const BEGIN: &str = "-----BEGIN CERTIFICATE-----";
    const END: &str = "-----END CERTIFICATE-----";

    let pem_str =
        std::str::from_utf8(pem_data).context("CA certificate file is not valid UTF-8")?;

    let mut blocks = Vec::new();
    let mut current: Option<String> = None;
    for line in pem_str.lines() {
        let line = line.trim();
        if line.contains(BEGIN) {
            current = Some(format!("{}\n", BEGIN));
        } else if line.contains(END) {
            if let Some(mut block) = current.take() {
                block.push_str(END);
                block.push('\n');
                blocks.push(block);
            }
        } else if let Some(block) = current.as_mut() {
            block.push_str(line);
            block.push('\n');
        }
    }

    if blocks.is_empty() {
        anyhow::bail!("No valid certificates found in PEM data");
    }

    Ok(blocks)
}

/// Quote a value for use in a libpq key=value connection string.
/// Wraps in single quotes and escapes backslashes and single quotes.
fn quote_conn_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}
