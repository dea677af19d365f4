use super::*;
use serde_json::json;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("hrsync").chain(args.iter().copied())).expect("valid arguments")
}

#[test]
fn watch_parses_view_flags() {
    let cli = parse(&["watch", "contracts", "--search", "analyst", "--sort", "salary", "--desc", "--page-size", "5"]);
    let Command::Watch { kind, view } = cli.command else {
        panic!("expected watch");
    };
    assert_eq!(kind, EntityKind::Contract);
    let state = view.view_state(1);
    assert_eq!(state.search, "analyst");
    assert_eq!(state.sort, Some(SortSpec::new("salary", SortDirection::Descending)));
    assert_eq!(state.page_size, 5);
    assert_eq!(state.page, 1);
}

#[test]
fn view_defaults() {
    let cli = parse(&["list", "job"]);
    let Command::List { view, page, .. } = cli.command else {
        panic!("expected list");
    };
    let state = view.view_state(page);
    assert_eq!(state, ViewState::default());
}

#[test]
fn update_takes_id_and_data() {
    let cli = parse(&["update", "Employee", "e42", "--data", r#"{"status":"on-leave"}"#]);
    let Command::Update { kind, id, data } = cli.command else {
        panic!("expected update");
    };
    assert_eq!(kind, EntityKind::Employee);
    assert_eq!(id, "e42");
    assert_eq!(parse_data(&data).expect("object"), json!({"status": "on-leave"}));
}

#[test]
fn unknown_kind_is_rejected() {
    assert!(Cli::try_parse_from(["hrsync", "delete", "invoices", "i1"]).is_err());
}

#[test]
fn url_flags_override_environment_config() {
    let cli = parse(&["--api-url", "https://hr.example.org/api", "delete", "job", "j1"]);
    let config = build_config(SyncConfig::default(), &cli).expect("valid config");
    assert_eq!(config.api_url, "https://hr.example.org/api");
    assert_eq!(config.socket_url, SyncConfig::default().socket_url);
}

#[test]
fn bad_url_flag_is_a_config_error() {
    let cli = parse(&["--socket-url", "http://not-a-socket", "list", "jobs"]);
    assert!(matches!(build_config(SyncConfig::default(), &cli), Err(CliError::Config(_))));
}

#[test]
fn data_must_be_a_json_object() {
    assert!(matches!(parse_data("[1, 2]"), Err(CliError::DataNotObject)));
    assert!(matches!(parse_data("{oops"), Err(CliError::InvalidJson(_))));
}

#[test]
fn page_rendering_lists_ids_and_fields() {
    let department: Department =
        serde_json::from_value(json!({"id": "d1", "name": "Census", "code": "CEN"})).expect("department");
    let page = ViewPage { items: vec![department], page: 1, total_pages: 3, total_matches: 21 };
    let out = render_page(&page, &SearchContext::default());
    assert!(out.starts_with("departments page 1/3 (21 matching)\n"));
    assert!(out.contains("d1"));
    assert!(out.contains("Census | CEN"));
}

#[test]
fn status_rendering_shows_error_only_while_down() {
    let down = ConnectionStatus {
        state: ConnectionState::Reconnecting,
        last_error: Some("connection refused".to_owned()),
        attempt: 2,
    };
    assert_eq!(render_status(&down), "[relay] reconnecting (attempt 2): connection refused");
    let up = ConnectionStatus { state: ConnectionState::Connected, ..ConnectionStatus::default() };
    assert_eq!(render_status(&up), "[relay] connected");
}

#[test]
fn ack_rendering() {
    assert_eq!(render_ack(&json!({"delivered": 1})), "broadcast to 1 other session");
    assert_eq!(render_ack(&json!({"delivered": 0})), "broadcast to 0 other sessions");
    assert_eq!(render_ack(&json!({"message": "nope"})), r#"relay replied: {"message":"nope"}"#);
}
