//! Error handling integration tests.
//!
//! These tests verify that meaningful errors, with the right kind, are
//! returned for various failure conditions.

use std::path::Path;

use vidmesh::{
    ExifTool, FfmpegProber, Meshroom, ProcessFailure, Quality, RotationChoice, VideoProber,
    VidmeshError, parse_timecode,
};

#[test]
fn probe_nonexistent_file() {
    let error = FfmpegProber::new()
        .describe(Path::new("this_file_does_not_exist.mp4"))
        .unwrap_err();

    assert_eq!(error.kind(), "ProbeError");
    let message = error.to_string();
    assert!(
        message.contains("this_file_does_not_exist.mp4"),
        "Error message should name the input: {message}",
    );
}

#[test]
fn probe_invalid_file() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let invalid_file_path = temporary_directory.path().join("invalid.mp4");
    std::fs::write(&invalid_file_path, b"this is not a media file").expect("Failed to write invalid file");

    let error = FfmpegProber::new().describe(&invalid_file_path).unwrap_err();
    assert!(matches!(error, VidmeshError::Probe { .. }), "{error}");
}

#[test]
fn malformed_timecodes_are_config_errors() {
    for value in ["", "abc", "1:2:3:4", "00:75:00", "-5"] {
        let error = parse_timecode(value).unwrap_err();
        assert_eq!(error.kind(), "ConfigError", "{value:?}");
    }
}

#[test]
fn unknown_choices_are_config_errors() {
    assert!(matches!("45".parse::<RotationChoice>(), Err(VidmeshError::Config(_))));
    assert!(matches!("ultra".parse::<Quality>(), Err(VidmeshError::Config(_))));
}

#[test]
fn missing_tools_are_not_found() {
    let exiftool = ExifTool::with_binary("/nonexistent/exiftool");
    assert!(!exiftool.is_available());
    assert!(matches!(
        exiftool.version(),
        Err(VidmeshError::Process {
            failure: ProcessFailure::NotFound,
            ..
        })
    ));

    let error = Meshroom::locate(Some(Path::new("/nonexistent/meshroom_batch"))).unwrap_err();
    assert_eq!(error.kind(), "ProcessError");
}

#[test]
fn error_messages_are_descriptive() {
    let error = VidmeshError::Process {
        tool: "exiftool".into(),
        failure: ProcessFailure::Timeout(std::time::Duration::from_secs(60)),
        detail: "process killed".into(),
    };
    assert_eq!(error.to_string(), "exiftool timed out after 60s: process killed");

    let error = VidmeshError::MissingBaseTime {
        path: "clip.mp4".into(),
    };
    assert_eq!(error.kind(), "MissingBaseTimeError");
    assert!(error.to_string().contains("clip.mp4"));
}
