//! Configuration files written to disk and read back

use forge_engine::config::{ApplicationConfig, Config, ConfigError, VulkanRendererConfig, WindowConfig};
use forge_engine::render::backends::vulkan::SelectionPolicy;

fn custom_config() -> ApplicationConfig {
    ApplicationConfig::new("Round Trip")
        .with_window(WindowConfig::new("Round Trip", 1024, 768).with_resizable(false))
        .with_renderer(
            VulkanRendererConfig::new("Round Trip")
                .with_version(2, 1, 0)
                .with_max_frames_in_flight(2)
                .with_msaa(false)
                .with_clear_color([0.1, 0.2, 0.3, 1.0])
                .with_device_selection(SelectionPolicy::MostVideoMemory),
        )
}

#[test]
fn toml_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("viewer.toml");

    let config = custom_config();
    config.save_to_file(&path).unwrap();
    let loaded = ApplicationConfig::load_from_file(&path).unwrap();

    assert_eq!(loaded, config);
}

#[test]
fn ron_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("viewer.ron");

    let config = custom_config();
    config.save_to_file(&path).unwrap();
    let loaded = ApplicationConfig::load_from_file(&path).unwrap();

    assert_eq!(loaded, config);
    assert_eq!(loaded.renderer.max_frames_in_flight, 2);
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.toml");
    std::fs::write(
        &path,
        "[window]\ntitle = \"Partial\"\nwidth = 640\nheight = 480\nresizable = true\n",
    )
    .unwrap();

    let loaded = ApplicationConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded.window.width, 640);
    assert_eq!(loaded.renderer, ApplicationConfig::default().renderer);
    assert!(loaded.validate().is_ok());
}

#[test]
fn unknown_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("viewer.json");

    let result = ApplicationConfig::default().save_to_file(&path);
    assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    assert!(!path.exists());
}

#[test]
fn malformed_file_reports_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[window\nwidth = ").unwrap();

    assert!(matches!(
        ApplicationConfig::load_from_file(&path),
        Err(ConfigError::Parse(_))
    ));
}
