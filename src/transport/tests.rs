use crate::core::error::ConfigError;
use crate::transport::http::HttpTransport;

#[test]
fn test_transport_exports_compile() {
    let transport = HttpTransport::new(1_000);
    assert!(transport.is_ok());
    assert_eq!(transport.map(|transport| transport.timeout_ms()).ok(), Some(1_000));
}

#[test]
fn test_transport_rejects_zero_timeout() {
    assert!(matches!(
        HttpTransport::new(0),
        Err(ConfigError::InvalidTimeout { timeout_ms: 0 })
    ));
}
