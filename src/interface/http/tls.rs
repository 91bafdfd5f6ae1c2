use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use rustls::{Certificate, PrivateKey, ServerConfig};
use rustls_pemfile::Item;
use tokio_rustls::TlsAcceptor;

use crate::shared::config::HttpsListenerConfig;

/// Builds the acceptor for the HTTPS listener. Without configured PEM files a
/// self-signed certificate for the listen host is generated in memory.
pub fn build_tls_acceptor(settings: &HttpsListenerConfig) -> Result<TlsAcceptor> {
    let (certs, key) = if settings.has_certificate() {
        (
            load_cert_chain(settings.ssl_certificate.trim())?,
            load_private_key(settings.ssl_certificate_key.trim())?,
        )
    } else {
        let host = tls_host(&settings.listen);
        log::warn!(
            "[tls] no certificate configured, serving a self-signed one for {}",
            host
        );
        self_signed(&host)?
    };

    let config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("build tls server config")?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Host part of a listen address; wildcard or empty hosts become `localhost`.
pub fn tls_host(listen: &str) -> String {
    let host = match listen.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => listen,
    };
    let host = host.trim().trim_start_matches('[').trim_end_matches(']');
    match host {
        "" | "0.0.0.0" | "::" => "localhost".to_string(),
        other => other.to_string(),
    }
}

fn self_signed(host: &str) -> Result<(Vec<Certificate>, PrivateKey)> {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec![host.to_string()])
            .with_context(|| format!("generate self-signed certificate for {}", host))?;
    Ok((
        vec![Certificate(cert.der().to_vec())],
        PrivateKey(key_pair.serialize_der()),
    ))
}

fn load_cert_chain(path: &str) -> Result<Vec<Certificate>> {
    let certs: Vec<Certificate> = read_pem(path, "cert")?
        .into_iter()
        .filter_map(|item| match item {
            Item::X509Certificate(der) => Some(Certificate(der)),
            _ => None,
        })
        .collect();
    if certs.is_empty() {
        return Err(anyhow!("no certificates found in {}", path));
    }
    Ok(certs)
}

/// First PKCS#8 key, else first RSA key, else first SEC1 EC key.
fn load_private_key(path: &str) -> Result<PrivateKey> {
    let items = read_pem(path, "key")?;
    let pick = |wanted: fn(&Item) -> bool| items.iter().find(|item| wanted(item));
    let key = pick(|i| matches!(i, Item::PKCS8Key(_)))
        .or_else(|| pick(|i| matches!(i, Item::RSAKey(_))))
        .or_else(|| pick(|i| matches!(i, Item::ECKey(_))));
    match key {
        Some(Item::PKCS8Key(der) | Item::RSAKey(der) | Item::ECKey(der)) => {
            Ok(PrivateKey(der.clone()))
        }
        _ => Err(anyhow!("no private keys found in {}", path)),
    }
}

fn read_pem(path: &str, kind: &str) -> Result<Vec<Item>> {
    let file = File::open(path).with_context(|| format!("open {} file {}", kind, path))?;
    rustls_pemfile::read_all(&mut BufReader::new(file))
        .with_context(|| format!("read pem items from {}", path))
}
