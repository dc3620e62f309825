use super::*;

#[test]
fn test_defaults() {
    let config = Config::default();

    assert_eq!(config.address, "127.0.0.1:24224");
    assert_eq!(config.network, Network::Tcp);
    assert_eq!(config.dial_timeout, Duration::from_secs(3));
    assert_eq!(config.write_timeout, Duration::from_secs(3));
    assert_eq!(config.buffer_limit, 8 * 1024 * 1024);
    assert_eq!(config.write_threshold, 8 * 1024);
    assert_eq!(config.write_queue_size, 6);
    assert_eq!(config.max_conn_attempts, 64);
    assert!(config.marshaler.is_none());
    assert!(config.tag_prefix.is_none());
    assert!(!config.subsecond);
    assert!(config.tls.is_none());
    assert_eq!(config.method, Method::Forward);
    assert_eq!(config.max_http_buffered, 8 * 1024);
    assert_eq!(config.max_http_package_size, 10);
    assert!(!config.http_package_gzip);
    assert_eq!(config.http_retries, 5);
    assert!(!config.connect_on_start);
}

#[test]
fn test_builders() {
    let config = Config::new("logs.example.com:24224")
        .with_network(Network::Tcp)
        .with_dial_timeout(Duration::from_millis(500))
        .with_write_timeout(Duration::from_secs(10))
        .with_buffer_limit(1024)
        .with_write_threshold(0)
        .with_write_queue_size(32)
        .with_max_conn_attempts(3)
        .with_tag_prefix("acme")
        .with_subsecond(true)
        .with_method(Method::Http)
        .with_max_http_package_size(3)
        .with_http_package_gzip(true)
        .with_http_retries(1)
        .with_connect_on_start(true);

    assert_eq!(config.address, "logs.example.com:24224");
    assert_eq!(config.dial_timeout, Duration::from_millis(500));
    assert_eq!(config.write_timeout, Duration::from_secs(10));
    assert_eq!(config.buffer_limit, 1024);
    assert_eq!(config.write_threshold, 0);
    assert_eq!(config.write_queue_size, 32);
    assert_eq!(config.max_conn_attempts, 3);
    assert_eq!(config.tag_prefix.as_deref(), Some("acme"));
    assert!(config.subsecond);
    assert_eq!(config.method, Method::Http);
    assert_eq!(config.max_http_package_size, 3);
    assert!(config.http_package_gzip);
    assert_eq!(config.http_retries, 1);
    assert!(config.connect_on_start);
}

#[test]
fn test_network_from_str() {
    assert_eq!("tcp".parse::<Network>().unwrap(), Network::Tcp);
    assert_eq!("unix".parse::<Network>().unwrap(), Network::Unix);

    let err = "udp".parse::<Network>().unwrap_err();
    assert_eq!(err.to_string(), "invalid network type: udp");
}

#[test]
fn test_network_display() {
    assert_eq!(Network::Tcp.to_string(), "tcp");
    assert_eq!(Network::Unix.to_string(), "unix");
}

#[test]
fn test_queue_sizes_clamp_to_one() {
    let config = Config::default()
        .with_write_queue_size(0)
        .with_max_http_package_size(0)
        .with_max_http_buffered(0);

    assert_eq!(config.write_queue_size, 1);
    assert_eq!(config.max_http_package_size, 1);
    assert_eq!(config.max_http_buffered, 1);
}

#[test]
fn test_tls_options_connector() {
    let opts = TlsOptions {
        domain: Some("logs.example.com".into()),
        insecure_skip_verify: true,
    };
    assert!(opts.connector().is_ok());
    assert!(TlsOptions::default().connector().is_ok());
}
