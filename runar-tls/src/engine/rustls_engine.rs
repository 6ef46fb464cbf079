//! rustls implementation of [`TlsEngine`]

use std::sync::Arc;

use rustls::client::danger::HandshakeSignatureValid;
use rustls::client::Resumption;
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{
    CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer, PrivateSec1KeyDer,
    UnixTime,
};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::server::{ClientHello, ResolvesServerCert, WebPkiClientVerifier};
use rustls::sign::CertifiedKey;
use rustls::{
    CipherSuite, ClientConfig, DigitallySignedStruct, DistinguishedName, RootCertStore,
    ServerConfig, SignatureScheme, SupportedCipherSuite,
};
use rustls_pemfile::Item;
use runar_common::logging::{Component, Logger};
use runar_common::{log_debug, log_warn};

use super::{
    ClientHandshakerFactory, ClientHandshakerOptions, EngineClientCertificatePolicy, EngineError,
    PemKeyCertPair, ServerHandshakerFactory, ServerHandshakerOptions, TlsEngine,
};
use crate::name_check::{PeerNameMatcher, X509NameMatcher};
use crate::peer::PeerCredential;

type EngineResult<T> = std::result::Result<T, EngineError>;

/// TLS engine backed by rustls
#[derive(Debug, Clone)]
pub struct RustlsEngine {
    provider: Arc<CryptoProvider>,
    logger: Logger,
}

impl Default for RustlsEngine {
    fn default() -> Self {
        Self::with_provider(rustls::crypto::ring::default_provider())
    }
}

impl RustlsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(provider: CryptoProvider) -> Self {
        Self {
            provider: Arc::new(provider),
            logger: Logger::new_root(Component::Handshake, "process"),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Provider restricted to the suites named in `cipher_suites`
    fn provider_for(&self, cipher_suites: &str) -> EngineResult<Arc<CryptoProvider>> {
        let suites =
            select_cipher_suites(&self.provider.cipher_suites, cipher_suites, &self.logger)?;
        Ok(Arc::new(CryptoProvider {
            cipher_suites: suites,
            ..(*self.provider).clone()
        }))
    }
}

impl TlsEngine for RustlsEngine {
    fn create_client_factory(
        &self,
        options: ClientHandshakerOptions,
    ) -> EngineResult<ClientHandshakerFactory> {
        let provider = self.provider_for(&options.cipher_suites)?;
        let roots = match (&options.root_store, &options.pem_root_certs) {
            (Some(store), _) => store.clone(),
            (None, Some(pem)) => Arc::new(parse_root_store(pem, &self.logger)?),
            (None, None) => {
                return Err(EngineError::InvalidArgument(
                    "Root certificates are required".to_string(),
                ))
            }
        };

        let builder = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots);
        let mut config = match &options.pem_key_cert_pair {
            Some(pair) => builder.with_client_auth_cert(
                parse_certificates(&pair.cert_chain)?,
                parse_private_key(&pair.private_key)?,
            )?,
            None => builder.with_no_client_auth(),
        };
        config.alpn_protocols = options.alpn_protocols;
        if let Some(cache) = &options.session_cache {
            config.resumption = Resumption::store(cache.client_store());
        }

        Ok(ClientHandshakerFactory::new(Arc::new(config))
            .with_session_cache(options.session_cache))
    }

    fn create_server_factory(
        &self,
        options: ServerHandshakerOptions,
    ) -> EngineResult<ServerHandshakerFactory> {
        let provider = self.provider_for(&options.cipher_suites)?;
        let resolver = SniCertResolver::new(&provider, &options.pem_key_cert_pairs)?;

        let builder = ServerConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?;
        let builder = match client_cert_verifier(
            &provider,
            options.client_certificate_request,
            options.pem_client_root_certs.as_deref(),
            &self.logger,
        )? {
            Some(verifier) => builder.with_client_cert_verifier(verifier),
            None => builder.with_no_client_auth(),
        };
        let mut config = builder.with_cert_resolver(Arc::new(resolver));
        config.alpn_protocols = options.alpn_protocols;

        Ok(ServerHandshakerFactory::new(Arc::new(config)))
    }
}

fn client_cert_verifier(
    provider: &Arc<CryptoProvider>,
    policy: EngineClientCertificatePolicy,
    pem_client_root_certs: Option<&[u8]>,
    logger: &Logger,
) -> EngineResult<Option<Arc<dyn ClientCertVerifier>>> {
    let (verify, mandatory) = match policy {
        EngineClientCertificatePolicy::DontRequest => return Ok(None),
        EngineClientCertificatePolicy::RequestButDontVerify => (false, false),
        EngineClientCertificatePolicy::RequireButDontVerify => (false, true),
        EngineClientCertificatePolicy::RequestAndVerify => (true, false),
        EngineClientCertificatePolicy::RequireAndVerify => (true, true),
    };

    if !verify {
        return Ok(Some(Arc::new(AcceptAnyClientCert {
            provider: provider.clone(),
            mandatory,
        })));
    }

    let pem = pem_client_root_certs.ok_or_else(|| {
        EngineError::InvalidArgument(
            "Client root certificates are required to verify clients".to_string(),
        )
    })?;
    let roots = Arc::new(parse_root_store(pem, logger)?);
    let builder = WebPkiClientVerifier::builder_with_provider(roots, provider.clone());
    let builder = if mandatory {
        builder
    } else {
        builder.allow_unauthenticated()
    };
    let verifier = builder
        .build()
        .map_err(|e| EngineError::Verifier(e.to_string()))?;
    Ok(Some(verifier))
}

/// Accepts any client chain; the handshake signature is still checked so the
/// client has to own the presented key.
#[derive(Debug)]
struct AcceptAnyClientCert {
    provider: Arc<CryptoProvider>,
    mandatory: bool,
}

impl ClientCertVerifier for AcceptAnyClientCert {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        self.mandatory
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Picks the server certificate whose leaf matches the client's SNI,
/// falling back to the first configured pair.
#[derive(Debug)]
struct SniCertResolver {
    entries: Vec<(PeerCredential, Arc<CertifiedKey>)>,
}

impl SniCertResolver {
    fn new(provider: &CryptoProvider, pairs: &[PemKeyCertPair]) -> EngineResult<Self> {
        if pairs.is_empty() {
            return Err(EngineError::InvalidArgument(
                "At least one key/certificate pair is required".to_string(),
            ));
        }

        let mut entries = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let chain = parse_certificates(&pair.cert_chain)?;
            let leaf = chain.first().ok_or_else(|| {
                EngineError::InvalidArgument("Certificate chain is empty".to_string())
            })?;
            let credential = PeerCredential::from_certificate_der(leaf.as_ref(), false)
                .map_err(|e| EngineError::InvalidArgument(e.to_string()))?;
            let key = provider
                .key_provider
                .load_private_key(parse_private_key(&pair.private_key)?)?;
            entries.push((credential, Arc::new(CertifiedKey::new(chain, key))));
        }
        Ok(Self { entries })
    }
}

impl ResolvesServerCert for SniCertResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        if let Some(name) = client_hello.server_name() {
            let matched = self
                .entries
                .iter()
                .find(|(credential, _)| X509NameMatcher.matches_name(&credential.view(), name));
            if let Some((_, key)) = matched {
                return Some(key.clone());
            }
        }
        self.entries.first().map(|(_, key)| key.clone())
    }
}

fn openssl_cipher_name(name: &str) -> Option<CipherSuite> {
    let suite = match name {
        "ECDHE-ECDSA-AES128-GCM-SHA256" => CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
        "ECDHE-ECDSA-AES256-GCM-SHA384" => CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
        "ECDHE-ECDSA-CHACHA20-POLY1305" => {
            CipherSuite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256
        }
        "ECDHE-RSA-AES128-GCM-SHA256" => CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
        "ECDHE-RSA-AES256-GCM-SHA384" => CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
        "ECDHE-RSA-CHACHA20-POLY1305" => CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
        "TLS_AES_128_GCM_SHA256" => CipherSuite::TLS13_AES_128_GCM_SHA256,
        "TLS_AES_256_GCM_SHA384" => CipherSuite::TLS13_AES_256_GCM_SHA384,
        "TLS_CHACHA20_POLY1305_SHA256" => CipherSuite::TLS13_CHACHA20_POLY1305_SHA256,
        _ => return None,
    };
    Some(suite)
}

fn is_tls13(suite: &SupportedCipherSuite) -> bool {
    matches!(suite, SupportedCipherSuite::Tls13(_))
}

/// Select the suites named in a colon separated list.
///
/// The list governs TLS 1.2 and below; when it names no TLS 1.3 suite every
/// TLS 1.3 suite of the provider stays enabled.
pub(crate) fn select_cipher_suites(
    available: &[SupportedCipherSuite],
    list: &str,
    logger: &Logger,
) -> EngineResult<Vec<SupportedCipherSuite>> {
    let mut selected: Vec<SupportedCipherSuite> = Vec::new();
    for name in list.split(':').map(str::trim).filter(|n| !n.is_empty()) {
        let found = openssl_cipher_name(name)
            .and_then(|id| available.iter().find(|suite| suite.suite() == id));
        match found {
            Some(suite) => {
                if !selected.iter().any(|s| s.suite() == suite.suite()) {
                    selected.push(*suite);
                }
            }
            None => log_warn!(logger, "Ignoring unsupported cipher suite {name}"),
        }
    }

    if selected.is_empty() {
        return Err(EngineError::InvalidArgument(format!(
            "No supported cipher suite in {list:?}"
        )));
    }
    if !selected.iter().any(is_tls13) {
        let mut with_tls13: Vec<SupportedCipherSuite> =
            available.iter().filter(|s| is_tls13(s)).copied().collect();
        with_tls13.extend(selected);
        selected = with_tls13;
    }
    Ok(selected)
}

fn parse_certificates(pem: &[u8]) -> EngineResult<Vec<CertificateDer<'static>>> {
    let ders = rustls_pemfile::certs(&mut &pem[..]).map_err(EngineError::Pem)?;
    Ok(ders.into_iter().map(CertificateDer::from).collect())
}

fn parse_root_store(pem: &[u8], logger: &Logger) -> EngineResult<RootCertStore> {
    let mut store = RootCertStore::empty();
    let (added, ignored) = store.add_parsable_certificates(parse_certificates(pem)?);
    if ignored > 0 {
        log_debug!(logger, "Ignored {ignored} unparsable root certificates");
    }
    if added == 0 {
        return Err(EngineError::InvalidArgument(
            "No valid root certificate found".to_string(),
        ));
    }
    Ok(store)
}

fn parse_private_key(pem: &[u8]) -> EngineResult<PrivateKeyDer<'static>> {
    let mut reader = pem;
    loop {
        match rustls_pemfile::read_one(&mut reader).map_err(EngineError::Pem)? {
            Some(Item::RSAKey(key)) => return Ok(PrivatePkcs1KeyDer::from(key).into()),
            Some(Item::PKCS8Key(key)) => return Ok(PrivatePkcs8KeyDer::from(key).into()),
            Some(Item::ECKey(key)) => return Ok(PrivateSec1KeyDer::from(key).into()),
            Some(_) => continue,
            None => {
                return Err(EngineError::InvalidArgument(
                    "No private key found".to_string(),
                ))
            }
        }
    }
}
