use assert_cmd::Command;
use marker_pose::aruco::builtin_dictionary;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

const BITS: u32 = 4;
const CELL_PX: u32 = 20;

/// Upright marker with its top-left corner at (`x0`, `y0`).
fn write_marker_png(path: &Path, code: u64, x0: u32, y0: u32) {
    let cells = BITS + 2;
    let mut img = image::RgbImage::from_pixel(320, 240, image::Rgb([255, 255, 255]));
    for cy in 0..cells {
        for cx in 0..cells {
            let border = cx == 0 || cy == 0 || cx + 1 == cells || cy + 1 == cells;
            let black =
                border || (code >> ((cy - 1) * BITS + (cx - 1))) & 1 == 1;
            if !black {
                continue;
            }
            for y in 0..CELL_PX {
                for x in 0..CELL_PX {
                    img.put_pixel(
                        x0 + cx * CELL_PX + x,
                        y0 + cy * CELL_PX + y,
                        image::Rgb([0, 0, 0]),
                    );
                }
            }
        }
    }
    img.save(path).expect("save png");
}

fn marker_pose_cmd() -> Command {
    Command::cargo_bin("marker-pose").expect("binary")
}

#[test]
fn default_config_prints_json() {
    marker_pose_cmd()
        .arg("default-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("MARKER_POSE_4X4_250"))
        .stdout(predicate::str::contains("/marker_detection/pose/rvec"))
        .stdout(predicate::str::contains("277.191356"));
}

#[test]
fn run_writes_frames_and_pose_records() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    fs::create_dir(&input).expect("mkdir");

    let dict = builtin_dictionary("DEMO_4X4_9").expect("builtin");
    let dict_path = dir.path().join("dict.json");
    dict.write_json(&dict_path).expect("dict");

    write_marker_png(&input.join("000.png"), dict.codes[3], 100, 60);
    image::RgbImage::from_pixel(320, 240, image::Rgb([90, 90, 90]))
        .save(input.join("001.png"))
        .expect("save png");

    marker_pose_cmd()
        .args(["run", "--log-level", "warn", "--input"])
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .arg("--dictionary")
        .arg(&dict_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("frames=2 dropped=0 markers=1"));

    assert!(output.join("frames/frame_000000.png").is_file());
    assert!(output.join("frames/frame_000001.png").is_file());

    for (file, topic) in [
        ("rvec.jsonl", "/marker_detection/pose/rvec"),
        ("tvec.jsonl", "/marker_detection/pose/tvec"),
    ] {
        let text = fs::read_to_string(output.join(file)).expect("jsonl");
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 1, "{file}");
        assert_eq!(lines[0]["topic"], topic);
        assert_eq!(lines[0]["msg"]["marker_id"], 3);
        assert_eq!(lines[0]["msg"]["header"]["seq"], 0);
    }

    let tvec: serde_json::Value = serde_json::from_str(
        fs::read_to_string(output.join("tvec.jsonl"))
            .expect("jsonl")
            .trim(),
    )
    .expect("json");
    assert!(tvec["msg"]["vector"]["z"].as_f64().expect("z") > 0.0);
}

#[test]
fn default_config_detects_the_default_vocabulary() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    fs::create_dir(&input).expect("mkdir");

    let dict = builtin_dictionary("MARKER_POSE_4X4_250").expect("builtin");
    write_marker_png(&input.join("000.png"), dict.codes[201], 90, 50);

    marker_pose_cmd()
        .args(["run", "--log-level", "warn", "--input"])
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("frames=1 dropped=0 markers=1"));

    let text = fs::read_to_string(output.join("rvec.jsonl")).expect("jsonl");
    let record: serde_json::Value = serde_json::from_str(text.trim()).expect("json");
    assert_eq!(record["msg"]["marker_id"], 201);
}

#[cfg(not(feature = "opencv"))]
#[test]
fn opencv_dictionary_names_need_the_opencv_feature() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("in");
    fs::create_dir(&input).expect("mkdir");
    image::RgbImage::from_pixel(8, 8, image::Rgb([0, 0, 0]))
        .save(input.join("a.png"))
        .expect("save png");
    let config = dir.path().join("config.json");
    fs::write(&config, r#"{"dictionary": {"predefined": "DICT_4X4_250"}}"#).expect("config");

    marker_pose_cmd()
        .args(["run", "--input"])
        .arg(&input)
        .arg("--output")
        .arg(dir.path().join("out"))
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("DICT_4X4_250"));
}

#[test]
fn log_level_is_parsed_from_the_command_line() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("in");
    fs::create_dir(&input).expect("mkdir");
    image::RgbImage::from_pixel(16, 16, image::Rgb([200, 200, 200]))
        .save(input.join("a.png"))
        .expect("save png");

    marker_pose_cmd()
        .args(["run", "--log-level", "debug", "--input"])
        .arg(&input)
        .arg("--output")
        .arg(dir.path().join("out"))
        .assert()
        .success()
        .stdout(predicate::str::contains("frames=1 dropped=0 markers=0"));

    marker_pose_cmd()
        .args(["run", "--log-level", "loud", "--input"])
        .arg(&input)
        .arg("--output")
        .arg(dir.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("--log-level"));
}

#[test]
fn missing_input_directory_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    marker_pose_cmd()
        .args(["run", "--input"])
        .arg(dir.path().join("nope"))
        .arg("--output")
        .arg(dir.path().join("out"))
        .assert()
        .failure();
}
