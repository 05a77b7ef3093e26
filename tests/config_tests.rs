use std::io::Write;

use podcast_bot::config::Community;
use podcast_bot::config::community::ConfigError;
use teloxide::types::ChatId;
use tempfile::NamedTempFile;

const EXAMPLE: &str = include_str!("../config.example.toml");

#[test]
fn test_load_example_config_from_file() {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(EXAMPLE.as_bytes())
        .expect("Failed to write config");

    let community = Community::load(file.path()).expect("Example config should load");

    let main = community.chat("main").unwrap();
    assert_eq!(main.chat_id(), ChatId(-1001000000001));
    assert!(main.invite);
    assert_eq!(community.default_invite_chat().unwrap().slug, "main");
    assert_eq!(community.managed_chats(ChatId(-1001000000003)), ["lounge", "main"]);
    assert_eq!(community.show("TS").unwrap().slug, "show");
    assert_eq!(community.timezone_alias("uk"), Some("Europe/London"));
    assert_eq!(community.now_playing_chats("show").unwrap().len(), 2);
    assert_eq!(
        community.settings.version_url.as_deref(),
        Some("https://example.com/podcast-bot")
    );
}

#[test]
fn test_multiline_templates_keep_placeholders() {
    let community = Community::from_toml_str(EXAMPLE).unwrap();
    let greeting = community.chat("main").unwrap().invite_greeting.clone().unwrap();

    let rendered = podcast_bot::utils::render_template(&greeting, "Fox", "main");
    assert!(rendered.starts_with("Hi Fox! Before joining <b>main</b>"));
    assert!(rendered.contains("rules:\n 1. Be excellent"));
}

#[test]
fn test_missing_file_is_an_io_error() {
    let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let err = Community::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn test_invalid_toml_is_a_parse_error() {
    let err = Community::from_toml_str("[chats.a\nid = 1").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_now_playing_list_must_name_known_chats() {
    let text = "[chats.a]\nid = 1\n[announce]\nshow-np = [\"a\", \"b\"]\n";
    let err = Community::from_toml_str(text).unwrap_err();
    assert!(err.to_string().contains("'b'"));
}
