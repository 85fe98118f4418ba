use std::{
    fmt, fs, io,
    path::Path,
    sync::Arc,
};

use rustls::{
    ClientConfig, RootCertStore,
    pki_types::{CertificateDer, PrivateKeyDer},
};
use tonic::transport::{Certificate, ClientTlsConfig, Identity};
use tracing::{debug, warn};

use crate::{error::RouterError, target::DialTarget};

struct ClientIdentity {
    cert_pem: Vec<u8>,
    key_pem: Vec<u8>,
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

/// CA and client identity read from a target's TLS files.
///
/// A file that disappeared between lookup and load is treated as absent.
#[derive(Default)]
pub struct TlsMaterial {
    ca_pem: Option<Vec<u8>>,
    ca_certs: Vec<CertificateDer<'static>>,
    identity: Option<ClientIdentity>,
}

impl TlsMaterial {
    /// Read and parse every TLS file named by `target`.
    ///
    /// Missing files are skipped; unreadable or malformed ones are errors.
    pub fn load(target: &DialTarget) -> Result<Self, RouterError> {
        let mut material = TlsMaterial::default();

        if let Some(path) = &target.tls_ca_file {
            if let Some(pem) = read_optional(path)? {
                material.ca_certs = parse_certs(&pem, path)?;
                material.ca_pem = Some(pem);
            }
        }

        if let (Some(cert_path), Some(key_path)) = (&target.tls_cert_file, &target.tls_key_file) {
            if let (Some(cert_pem), Some(key_pem)) =
                (read_optional(cert_path)?, read_optional(key_path)?)
            {
                let chain = parse_certs(&cert_pem, cert_path)?;
                let key = parse_key(&key_pem, key_path)?;
                material.identity = Some(ClientIdentity {
                    cert_pem,
                    key_pem,
                    chain,
                    key,
                });
            }
        }

        Ok(material)
    }

    #[inline]
    pub fn has_ca(&self) -> bool {
        self.ca_pem.is_some()
    }

    /// True when both the client certificate and its key were loaded.
    #[inline]
    pub fn has_identity(&self) -> bool {
        self.identity.is_some()
    }

    /// Settings for a `grpcs` channel: native roots plus the optional CA.
    pub fn tonic_config(&self, domain: &str) -> ClientTlsConfig {
        let mut tls = ClientTlsConfig::new()
            .domain_name(domain)
            .with_native_roots();
        if let Some(pem) = &self.ca_pem {
            tls = tls.ca_certificate(Certificate::from_pem(pem));
        }
        if let Some(id) = &self.identity {
            tls = tls.identity(Identity::from_pem(&id.cert_pem, &id.key_pem));
        }
        tls
    }

    /// Settings for a `wss` tunnel.
    pub fn rustls_config(&self) -> Result<Arc<ClientConfig>, RouterError> {
        let mut roots = RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        for e in &native.errors {
            debug!(error = %e, "skipping unreadable native root store");
        }
        roots.add_parsable_certificates(native.certs);
        for cert in &self.ca_certs {
            roots.add(cert.clone())?;
        }

        let builder =
            ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
                .with_safe_default_protocol_versions()?
                .with_root_certificates(roots);

        let config = match &self.identity {
            Some(id) => builder.with_client_auth_cert(id.chain.clone(), id.key.clone_key())?,
            None => builder.with_no_client_auth(),
        };
        Ok(Arc::new(config))
    }
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("ca_certs", &self.ca_certs.len())
            .field("identity", &self.identity.is_some())
            .finish()
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, RouterError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "tls file disappeared, continuing without it");
            Ok(None)
        }
        Err(e) => Err(RouterError::io("read", path, e)),
    }
}

fn parse_certs(pem: &[u8], path: &Path) -> Result<Vec<CertificateDer<'static>>, RouterError> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RouterError::tls(path, e.to_string()))?;
    if certs.is_empty() {
        return Err(RouterError::tls(path, "no PEM certificates found"));
    }
    Ok(certs)
}

fn parse_key(pem: &[u8], path: &Path) -> Result<PrivateKeyDer<'static>, RouterError> {
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|e| RouterError::tls(path, e.to_string()))?
        .ok_or_else(|| RouterError::tls(path, "no PEM private key found"))
}
