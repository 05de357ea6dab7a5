// ABOUTME: Connection string parsing for MySQL endpoints
// ABOUTME: Accepts mysql:// URLs and PDO-style mysql:key=value;... DSNs

use anyhow::{bail, Context, Result};
use mysql_async::{Opts, OptsBuilder};

use crate::config::EndpointConfig;

/// Run on every new connection so `SHOW TABLE STATUS` reports times in UTC,
/// the same clock the watermark is taken from.
pub const SESSION_INIT: &str = "SET time_zone = '+00:00'";

/// Fields of a PDO-style DSN (`mysql:host=db;port=3306;dbname=shop`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdoDsn {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dbname: Option<String>,
    pub unix_socket: Option<String>,
}

impl PdoDsn {
    pub fn parse(dsn: &str) -> Result<Self> {
        let Some(body) = dsn.strip_prefix("mysql:") else {
            bail!("Unsupported DSN driver in '{}': only mysql is supported", dsn);
        };

        let mut parsed = PdoDsn::default();
        for pair in body.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((key, value)) = pair.split_once('=') else {
                bail!("Malformed DSN segment '{}'", pair);
            };
            let value = value.trim().to_string();
            match key.trim() {
                "host" => parsed.host = Some(value),
                "port" => {
                    parsed.port = Some(
                        value
                            .parse()
                            .with_context(|| format!("Invalid port '{}' in DSN", value))?,
                    )
                }
                "dbname" => parsed.dbname = Some(value),
                "unix_socket" => parsed.unix_socket = Some(value),
                other => tracing::debug!("Ignoring DSN option '{}'", other),
            }
        }
        Ok(parsed)
    }
}

/// Build driver options for an endpoint.
///
/// `user`, `password` and `db` from the configuration take precedence over
/// anything the DSN carries.
pub fn build_opts(endpoint: &EndpointConfig) -> Result<Opts> {
    let dsn = endpoint.dsn.trim();
    if dsn.is_empty() {
        bail!("Connection string cannot be empty");
    }

    let mut builder = if dsn.starts_with("mysql://") {
        let opts = Opts::from_url(dsn)
            .with_context(|| format!("Invalid MySQL URL '{}'", crate::utils::sanitize_url(dsn)))?;
        OptsBuilder::from_opts(opts)
    } else {
        let parsed = PdoDsn::parse(dsn)?;
        let mut builder = OptsBuilder::default();
        if let Some(host) = parsed.host {
            builder = builder.ip_or_hostname(host);
        }
        if let Some(port) = parsed.port {
            builder = builder.tcp_port(port);
        }
        builder.db_name(parsed.dbname).socket(parsed.unix_socket)
    };

    if let Some(user) = &endpoint.user {
        builder = builder.user(Some(user.clone()));
    }
    if let Some(password) = &endpoint.password {
        builder = builder.pass(Some(password.clone()));
    }
    if !endpoint.db.is_empty() {
        builder = builder.db_name(Some(endpoint.db.clone()));
    }

    Ok(builder.init(vec![SESSION_INIT]).into())
}
