use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;
use url::Url;
use x509_parser::prelude::*;

use crate::monitoring::types::CertInfo;

const DEFAULT_HTTPS_PORT: u16 = 443;

/// Opens a bare TLS connection to capture the peer certificate.
///
/// Chain verification is disabled on purpose: the point is introspection
/// of whatever certificate the server presents, not validation. Every
/// failure degrades to "no certificate info" and never fails the probe.
pub struct CertInspector {
    connect_timeout: Duration,
}

impl CertInspector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    pub async fn inspect(&self, raw_url: &str) -> Option<CertInfo> {
        let url = match Url::parse(raw_url) {
            Ok(url) => url,
            Err(err) => {
                debug!(url = raw_url, error = %err, "certificate check skipped, unparsable url");
                return None;
            }
        };
        let host = url.host_str()?.to_string();
        let port = url.port().unwrap_or(DEFAULT_HTTPS_PORT);

        match self.fetch_peer_certificate(&host, port).await {
            Ok(info) => info,
            Err(err) => {
                debug!(%host, port, error = %format!("{err:#}"), "certificate inspection failed");
                None
            }
        }
    }

    async fn fetch_peer_certificate(&self, host: &str, port: u16) -> Result<Option<CertInfo>> {
        let tcp = timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
            .context("connect timed out")?
            .context("connect failed")?;

        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()?;
        let connector = tokio_native_tls::TlsConnector::from(connector);
        let tls = timeout(self.connect_timeout, connector.connect(host, tcp))
            .await
            .context("tls handshake timed out")?
            .context("tls handshake failed")?;

        let Some(certificate) = tls.get_ref().peer_certificate()? else {
            return Ok(None);
        };
        let der = certificate.to_der()?;
        Ok(parse_certificate(&der))
    }
}

fn parse_certificate(der: &[u8]) -> Option<CertInfo> {
    let (_, cert) = X509Certificate::from_der(der).ok()?;

    let subject = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or("Unknown")
        .to_string();
    let issuer = cert
        .issuer()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or("Unknown")
        .to_string();

    let validity = cert.validity();
    Some(CertInfo {
        subject,
        issuer,
        valid_from: epoch_to_system_time(validity.not_before.timestamp()),
        valid_to: epoch_to_system_time(validity.not_after.timestamp()),
    })
}

fn epoch_to_system_time(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}
