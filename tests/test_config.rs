use switchboard::config::{Config, ListenSpec};
use switchboard::responder::Protocol;

#[test]
fn test_config_defaults() {
    let cfg = Config::default();

    assert_eq!(cfg.responders.http, 4);
    assert_eq!(cfg.responders.total(), 6);
    assert_eq!(cfg.http.session_timeout_ms, 8000);
    assert_eq!(cfg.buffers.file_chunk, 1024);
    assert!(cfg.ftp.password.is_empty());

    let listeners = cfg.listeners().unwrap();
    assert_eq!(listeners.len(), 3);
    assert_eq!(listeners[0].protocol, Protocol::Http);
    assert_eq!(listeners[0].addr(), ("127.0.0.1", 8080));
}

#[test]
fn test_config_empty_yaml_is_default() {
    let cfg = Config::from_yaml("  \n").unwrap();

    assert_eq!(cfg.server.poll_interval_ms, 2);
}

#[test]
fn test_config_partial_yaml_keeps_other_defaults() {
    let yaml = r#"
responders:
  http: 2
  telnet: 0
ftp:
  password: secret
  data_port_timeout_ms: 500
"#;
    let cfg = Config::from_yaml(yaml).unwrap();

    assert_eq!(cfg.responders.http, 2);
    assert_eq!(cfg.responders.ftp, 1);
    assert_eq!(cfg.responders.telnet, 0);
    assert_eq!(cfg.ftp.password, "secret");
    assert_eq!(cfg.ftp.data_port_timeout_ms, 500);
    assert_eq!(cfg.ftp.idle_timeout_ms, 60_000);
}

#[test]
fn test_config_invalid_yaml() {
    assert!(Config::from_yaml("responders: [1, 2").is_err());
}

#[test]
fn test_listen_spec_default_ports() {
    let ftp = ListenSpec::parse("ftp://0.0.0.0").unwrap();
    assert_eq!(ftp.protocol, Protocol::Ftp);
    assert_eq!(ftp.port, 21);

    let telnet = ListenSpec::parse("telnet://[::1]:2323").unwrap();
    assert_eq!(telnet.host, "::1");
    assert_eq!(telnet.port, 2323);
}

#[test]
fn test_listen_spec_rejects_unknown_scheme() {
    assert!(ListenSpec::parse("gopher://127.0.0.1:70").is_err());
    assert!(ListenSpec::parse("not a url").is_err());
}

#[test]
fn test_override_listen_replaces_only_that_protocol() {
    let mut cfg = Config::default();
    cfg.override_listen(Protocol::Http, "0.0.0.0:3000");

    let listeners = cfg.listeners().unwrap();
    let http: Vec<_> = listeners
        .iter()
        .filter(|l| l.protocol == Protocol::Http)
        .collect();
    assert_eq!(http.len(), 1);
    assert_eq!(http[0].addr(), ("0.0.0.0", 3000));
    assert_eq!(listeners.len(), 3);
}

#[test]
fn test_config_load_from_env() {
    // Environment is process-wide, so all env handling lives in one test.
    let path = std::env::temp_dir().join(format!("switchboard-test-{}.yaml", std::process::id()));
    std::fs::write(&path, "responders:\n  http: 1\n").unwrap();

    unsafe {
        std::env::set_var("SWITCHBOARD_CONFIG", &path);
        std::env::set_var("LISTEN", "127.0.0.1:8000");
    }
    let cfg = Config::load().unwrap();
    unsafe {
        std::env::remove_var("SWITCHBOARD_CONFIG");
        std::env::remove_var("LISTEN");
    }
    let _ = std::fs::remove_file(&path);

    assert_eq!(cfg.responders.http, 1);
    let http = cfg
        .listeners()
        .unwrap()
        .into_iter()
        .find(|l| l.protocol == Protocol::Http)
        .unwrap();
    assert_eq!(http.addr(), ("127.0.0.1", 8000));
}
