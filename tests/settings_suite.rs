use clap::Parser;
use pixelsong::color::Color;
use pixelsong::config::{Config, SourceKind};
use pixelsong::settings::{InstrumentMapping, Settings, SettingsError, Span};
use pixelsong::view::ViewMode;
use std::path::Path;

#[test]
fn settings_file_parses_every_group() {
    let text = r#"
        # installation tuning
        camera.threshold = 0.4
        camera.contrast = 3
        particle.speed = 2, 8
        particle.radius = 0.5,4
        cursor.color = 0.2, 0.4, 1.0
        cursor.trail = 6
        music.tempo = 90
        music.beats = 32
        music.octaves = 3, 7
        music.mapping = nearest
    "#;

    let s = Settings::parse(text).expect("settings should parse");
    assert_eq!(s.camera.threshold, 0.4);
    assert_eq!(s.camera.contrast, 3.0);
    assert_eq!(s.particle.speed, Span::new(2.0, 8.0));
    assert_eq!(s.particle.radius, Span::new(0.5, 4.0));
    assert_eq!(s.cursor.color, Color::new(0.2, 0.4, 1.0));
    assert_eq!(s.cursor.trail, 6.0);
    assert_eq!(s.music.tempo, 90.0);
    assert_eq!(s.music.beats, 32);
    assert_eq!(s.music.octaves, (3, 7));
    assert_eq!(s.music.mapping, InstrumentMapping::NearestColor);
    // Untouched keys keep their defaults.
    assert_eq!(s.particle.friction, Settings::default().particle.friction);
}

#[test]
fn unknown_keys_are_rejected_with_their_line() {
    let err = Settings::parse("music.tempo = 100\ncamera.sparkle = 1\n")
        .expect_err("unknown key should fail");
    assert_eq!(
        err,
        SettingsError::UnknownKey {
            line: 2,
            key: "camera.sparkle".to_string()
        }
    );
}

#[test]
fn malformed_lines_and_values_are_parse_errors() {
    assert!(matches!(
        Settings::parse("camera.threshold 0.5"),
        Err(SettingsError::Parse { line: 1, .. })
    ));
    assert!(matches!(
        Settings::parse("\ncamera.threshold = bright"),
        Err(SettingsError::Parse { line: 2, .. })
    ));
    assert!(matches!(
        Settings::parse("particle.speed = 1,2,3"),
        Err(SettingsError::Parse { .. })
    ));
    assert!(matches!(
        Settings::parse("music.mapping = loudest"),
        Err(SettingsError::Parse { .. })
    ));
}

#[test]
fn integer_settings_are_never_truncated() {
    for text in [
        "music.octaves = -5, 4",
        "music.octaves = 3.5, 7",
        "music.octaves = 2, 300",
        "music.beats = 4294967297",
        "music.beats = 2.5",
        "music.voices = -1",
    ] {
        assert!(
            matches!(Settings::parse(text), Err(SettingsError::Parse { line: 1, .. })),
            "{text}"
        );
    }

    let s = Settings::parse("music.beats = 4294967295
music.octaves = 0,10")
        .expect("largest values in range parse");
    assert_eq!(s.music.beats, u32::MAX);
    assert_eq!(s.music.octaves, (0, 10));
}

#[test]
fn out_of_range_values_fail_validation() {
    assert!(matches!(
        Settings::parse("camera.threshold = 1.5"),
        Err(SettingsError::InvalidValue {
            field: "camera.threshold",
            ..
        })
    ));
    assert!(matches!(
        Settings::parse("particle.count = 20, 5"),
        Err(SettingsError::InvalidValue {
            field: "particle.count",
            ..
        })
    ));
    assert!(matches!(
        Settings::parse("music.beats = 0"),
        Err(SettingsError::InvalidValue {
            field: "music.beats",
            ..
        })
    ));
    assert!(matches!(
        Settings::parse("music.octaves = 6, 11"),
        Err(SettingsError::InvalidValue {
            field: "music.octaves",
            ..
        })
    ));
}

#[test]
fn missing_settings_file_falls_back_to_defaults() {
    let s = Settings::load(Some(Path::new("/nonexistent/pixelsong/settings.conf")))
        .expect("missing file should not be an error");
    assert_eq!(s, Settings::default());
    assert_eq!(Settings::load(None), Ok(Settings::default()));
}

#[test]
fn command_line_overrides_win_and_are_validated() {
    let cfg = Config::parse_from(["pixelsong", "--tempo", "140", "--voices", "4"]);
    let mut s = Settings::default();
    s.apply_overrides(&cfg).expect("overrides are in range");
    assert_eq!(s.music.tempo, 140.0);
    assert_eq!(s.music.voices, 4);
    assert_eq!(s.music.beats, 16);

    let cfg = Config::parse_from(["pixelsong", "--voices", "0"]);
    let mut s = Settings::default();
    assert!(matches!(
        s.apply_overrides(&cfg),
        Err(SettingsError::InvalidValue {
            field: "music.voices",
            ..
        })
    ));
}

#[test]
fn config_defaults_and_aliases() {
    let cfg = Config::parse_from(["pixelsong"]);
    assert_eq!(cfg.source, SourceKind::Pattern);
    assert_eq!(cfg.input, "-");
    assert_eq!(cfg.view, ViewMode::Composite);
    assert!(cfg.sync_updates);
    assert!(!cfg.mute);

    let cfg = Config::parse_from([
        "pixelsong",
        "--source",
        "pipe",
        "--view",
        "shapes",
        "--sync-updates",
        "false",
    ]);
    assert_eq!(cfg.source, SourceKind::Stream);
    assert_eq!(cfg.view, ViewMode::Shapes);
    assert!(!cfg.sync_updates);
}
