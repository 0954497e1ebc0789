//! Headless integration tests for stationFlow.
//!
//! These tests load the JSON stations under `tests/fixtures/` and exercise
//! the public API end to end: rule graph construction, seeded playlist
//! builds, composition windows and day rollover.

use chrono::NaiveDate;
use station_flow::builder::PlaylistBuilder;
use station_flow::config::Config;
use station_flow::continuity::{ContinuityEvent, spawn_continuity};
use station_flow::error::Error;
use station_flow::program::{DAY_SECONDS, Program, load_catalog};
use station_flow::random::Rand48;
use station_flow::rules::RuleGraph;
use station_flow::station::StationDef;
use station_flow::timeline::AudioComponent;
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::time::Duration;

const EPS: f64 = 1e-6;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn test_config() -> Config {
    Config {
        verify_assets: false,
        debounce_ms: 50,
        ..Config::default()
    }
}

fn fixture_graph(name: &str, common: Option<&str>) -> RuleGraph {
    let path = fixture(name);
    let def = StationDef::load(&path).unwrap();
    let common = common.map(fixture);
    let catalog = load_catalog(&def, &path, common.as_deref()).unwrap();
    RuleGraph::build(&def.playlist, &catalog).unwrap()
}

fn name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().to_string()
}

fn summary(sequence: &[AudioComponent]) -> Vec<(String, f64, f64)> {
    sequence
        .iter()
        .map(|c| (name(&c.path), c.playing.start, c.playing.duration))
        .collect()
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < EPS,
        "expected {}, got {}",
        expected,
        actual
    );
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ── Seeded builds ─────────────────────────────────────────────────────────

#[test]
fn fixture_station_golden_output() {
    let graph = fixture_graph("station.json", None);
    let mut rng = Rand48::seeded(100);
    let seq = PlaylistBuilder::new(&graph, &mut rng)
        .build_sequence(3.0 * 3600.0)
        .unwrap();

    // id, then a track running 5.18 -> 215.38, then a track 215.38 -> 433.04
    // carrying one sweeper.
    assert_close(seq[0].playing.duration, 5.18);
    assert_close(seq[1].playing.start, 5.18);
    assert_close(seq[1].playing.end(), 215.38);
    assert!(seq[1].mixes.is_empty());
    assert_close(seq[2].playing.start, 215.38);
    assert_close(seq[2].playing.end(), 433.04);
    assert_eq!(seq[2].mixes.len(), 1);
    assert!((seq[2].mixes[0].playing.start - 221.73).abs() < 0.01);
    assert!((seq[2].mixes[0].playing.end() - 227.92).abs() < 0.01);

    let expected = [
        ("id-morning.mp3", 0.0, 5.18),
        ("t3.mp3", 5.18, 210.2),
        ("t2.mp3", 215.38, 217.66),
        ("t7.mp3", 433.04, 201.9),
        ("t1.mp3", 634.94, 198.4),
        ("t3.mp3", 833.34, 210.2),
        ("t4.mp3", 1043.54, 245.0),
        ("id-evening.mp3", 1288.54, 5.18),
        ("t5.mp3", 1293.72, 187.5),
        ("t7.mp3", 1481.22, 201.9),
        ("id-morning.mp3", 1683.12, 5.18),
        ("t3.mp3", 1688.3, 210.2),
    ];
    let actual = summary(&seq);
    for ((file, start, duration), (a_file, a_start, a_duration)) in expected.iter().zip(&actual) {
        assert_eq!(a_file, file);
        assert_close(*a_start, *start);
        assert_close(*a_duration, *duration);
    }
    assert_eq!(seq.len(), 62);

    let mixed: Vec<usize> = seq[..7]
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.mixes.is_empty())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(mixed, vec![2, 3, 4, 6]);
    assert_eq!(name(&seq[3].mixes[0].path), "sw1.mp3");
}

#[test]
fn builds_are_identical_across_runs() {
    let graph = fixture_graph("station.json", None);
    let run = || {
        let mut rng = Rand48::seeded(1_709_251_200);
        PlaylistBuilder::new(&graph, &mut rng)
            .build_sequence(DAY_SECONDS)
            .unwrap()
    };
    let first = run();
    assert_eq!(first, run());
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&run()).unwrap()
    );
}

#[test]
fn sequence_is_contiguous_and_covers_the_day() {
    let graph = fixture_graph("station.json", None);
    let mut rng = Rand48::seeded(7);
    let seq = PlaylistBuilder::new(&graph, &mut rng)
        .build_sequence(DAY_SECONDS)
        .unwrap();
    assert_eq!(seq[0].playing.start, 0.0);
    for pair in seq.windows(2) {
        assert_eq!(pair[0].playing.end(), pair[1].playing.start);
    }
    assert!(seq.last().unwrap().playing.end() >= DAY_SECONDS);
    for component in &seq {
        for mix in &component.mixes {
            assert!(mix.playing.start >= component.playing.start - EPS);
            assert!(mix.playing.end() <= component.playing.end() + EPS);
        }
    }
}

#[test]
fn group_picks_never_repeat_inside_the_window() {
    let graph = fixture_graph("station.json", None);
    let mut rng = Rand48::seeded(2024);
    let seq = PlaylistBuilder::new(&graph, &mut rng)
        .build_sequence(DAY_SECONDS)
        .unwrap();
    // 7 tracks, 3 held back: a track cannot come back within 3 later picks.
    let tracks: Vec<String> = seq
        .iter()
        .map(|c| name(&c.path))
        .filter(|n| n.starts_with('t'))
        .collect();
    for (i, track) in tracks.iter().enumerate() {
        for later in tracks.iter().skip(i + 1).take(3) {
            assert_ne!(later, track);
        }
    }
}

// ── Common groups and attachments ─────────────────────────────────────────

#[test]
fn series_station_uses_common_groups_and_attachments() {
    let graph = fixture_graph("series.json", Some("common.json"));
    let mut rng = Rand48::seeded(1_709_251_200);
    let seq = PlaylistBuilder::new(&graph, &mut rng)
        .build_sequence(3600.0)
        .unwrap();
    assert_eq!(seq.len(), 16);

    let expected = [
        ("opener.mp3", 0.0, 12.0),
        ("b1.mp3", 12.0, 300.0),
        ("b2.mp3", 312.0, 280.0),
        ("opener.mp3", 592.0, 12.0),
        ("b1.mp3", 604.0, 300.0),
        ("opener.mp3", 904.0, 12.0),
        ("b3.mp3", 916.0, 320.0),
    ];
    for ((file, start, duration), (a_file, a_start, a_duration)) in
        expected.iter().zip(summary(&seq))
    {
        assert_eq!(&a_file, file);
        assert_close(a_start, *start);
        assert_close(a_duration, *duration);
    }

    // Attachment at the head, closer on the tail before the next opener.
    let mixes: Vec<(String, f64)> = seq[2]
        .mixes
        .iter()
        .map(|m| (name(&m.path), m.playing.start))
        .collect();
    assert_eq!(
        mixes,
        vec![("b2-intro.mp3".to_string(), 312.0), ("closer.mp3".to_string(), 583.0)]
    );
    assert_eq!(name(&seq[4].mixes[0].path), "b1-outro.mp3");
    // b3 has no attachments.
    assert!(seq[6].mixes.is_empty());
}

#[test]
fn station_groups_override_common_ones() {
    let path = fixture("series.json");
    let def = StationDef::load(&path).unwrap();
    let catalog = load_catalog(&def, &path, Some(fixture("common.json").as_path())).unwrap();
    let bulletins: Vec<String> = catalog
        .files("bulletins")
        .unwrap()
        .iter()
        .map(|f| f.label())
        .collect();
    assert_eq!(bulletins, vec!["b1", "b2", "b3"]);
    assert_eq!(catalog.group_tags(), vec!["bulletins", "jingles"]);
    assert!(catalog.file("jingles", "opener").unwrap().path.is_absolute());
}

#[test]
fn series_station_without_common_groups_fails() {
    let path = fixture("series.json");
    let def = StationDef::load(&path).unwrap();
    let catalog = load_catalog(&def, &path, None).unwrap();
    let err = RuleGraph::build(&def.playlist, &catalog).unwrap_err();
    assert!(matches!(err, Error::FileGroupNotFound(group) if group == "jingles"));
}

// ── Static checks ─────────────────────────────────────────────────────────

#[test]
fn half_weights_are_not_exhaustive() {
    let path = fixture("station.json");
    let json = std::fs::read_to_string(&path)
        .unwrap()
        .replace("\"probability\": 0.15", "\"probability\": 0.5")
        .replace("\"probability\": 0.85", "\"probability\": 0.0");
    let def = StationDef::from_json(&json).unwrap();
    let catalog = load_catalog(&def, &path, None).unwrap();
    let graph = RuleGraph::build(&def.playlist, &catalog).unwrap();
    assert!(matches!(
        graph.check_exhaustive(),
        Err(Error::NotExhaustiveTransition(tag)) if tag == "track"
    ));
    assert!(fixture_graph("station.json", None).check_exhaustive().is_ok());
}

#[test]
fn long_sweeper_is_rejected() {
    let path = fixture("station.json");
    let json = std::fs::read_to_string(&path)
        .unwrap()
        .replace("\"duration\": 6.19", "\"duration\": 600.0");
    let def = StationDef::from_json(&json).unwrap();
    let catalog = load_catalog(&def, &path, None).unwrap();
    let err = RuleGraph::build(&def.playlist, &catalog).unwrap_err();
    assert!(matches!(err, Error::MixLongerThanHost { fragment, .. } if fragment == "track"));
}

// ── Program windows ───────────────────────────────────────────────────────

#[test]
fn compose_window_clips_and_ducks() {
    let program = Program::load(&fixture("station.json"), None, test_config()).unwrap();
    let result = program
        .compose_window(date(2024, 3, 1), 180.0, 600.0)
        .unwrap();
    let window = &result.window;
    let composition = &window.composition;

    assert!(window.depleted);
    assert_eq!(result.first_day, date(2024, 3, 1));
    assert_eq!(result.last_day, date(2024, 3, 1));

    let main: Vec<(String, f64, f64, f64)> = composition
        .main
        .iter()
        .map(|s| (name(&s.path), s.source.start, s.source.duration, s.at))
        .collect();
    let expected = [
        ("t2.mp3", 174.82, 42.84, 0.0),
        ("id-evening.mp3", 0.0, 5.18, 42.84),
        ("t4.mp3", 0.0, 245.0, 48.02),
        ("t7.mp3", 0.0, 201.9, 293.02),
    ];
    assert_eq!(main.len(), expected.len());
    for ((file, clip, duration, at), (a_file, a_clip, a_duration, a_at)) in
        expected.iter().zip(&main)
    {
        assert_eq!(a_file, file);
        assert_close(*a_clip, *clip);
        assert_close(*a_duration, *duration);
        assert_close(*a_at, *at);
    }

    assert_eq!(composition.mix.len(), 2);
    assert_eq!(name(&composition.mix[0].path), "sw2.mp3");
    assert_close(composition.mix[0].at, 55.1914643);
    assert_eq!(name(&composition.mix[1].path), "sw1.mp3");
    assert_close(composition.mix[1].at, 298.8971713);

    assert_eq!(composition.ramps.len(), 4);
    assert_close(composition.ramps[0].range.start, 54.1914643);
    assert_close(composition.ramps[0].range.end(), 55.1914643);
    assert_eq!(composition.ramps[0].to_volume, 0.3);
    assert_close(composition.ramps[1].range.start, 61.3814643);
    assert_eq!(composition.ramps[1].to_volume, 1.0);
    assert_eq!(composition.main_volume_at(58.0), 0.3);
    assert_eq!(composition.main_volume_at(10.0), 1.0);

    let last = window.last_range.unwrap();
    assert_close(last.start, 473.02);
    assert_close(window.end_in_composition, 494.92);
}

#[test]
fn prepare_next_continues_without_gap() {
    let program = Program::load(&fixture("station.json"), None, test_config()).unwrap();
    let first = program
        .compose_window(date(2024, 3, 1), 180.0, 600.0)
        .unwrap();
    let next = program
        .prepare_next(first.window.last_range.unwrap(), first.last_day, 1800.0)
        .unwrap();
    let day = program.build_playlist(date(2024, 3, 1), 3000.0).unwrap();
    let following = day
        .iter()
        .position(|c| Some(c.playing) == first.window.last_range)
        .unwrap()
        + 1;
    let head = &next.window.composition.main[0];
    assert_eq!(head.path, day[following].path);
    assert_eq!(head.source.start, 0.0);
    assert_eq!(head.at, 0.0);
    assert!(next.window.composition.duration() >= 1800.0);
}

#[test]
fn window_across_midnight_joins_both_days() {
    let program = Program::load(&fixture("station.json"), None, test_config()).unwrap();
    let day1 = program.build_playlist(date(2024, 3, 1), DAY_SECONDS).unwrap();
    let day2 = program.build_playlist(date(2024, 3, 2), 600.0).unwrap();
    let from = DAY_SECONDS - 900.0;

    let result = program
        .compose_window(date(2024, 3, 1), from, DAY_SECONDS + 900.0)
        .unwrap();
    assert_eq!(result.last_day, date(2024, 3, 2));
    assert!(result.window.depleted);

    let main = &result.window.composition.main;
    let boundary = day1.iter().filter(|c| c.playing.end() > from).count();
    let day1_end = day1.last().unwrap().playing.end() - from;
    assert_close(main[boundary - 1].range().end(), day1_end);
    assert_eq!(main[boundary].path, day2[0].path);
    assert_close(main[boundary].at, day1_end);
    for pair in main.windows(2) {
        assert_close(pair[0].range().end(), pair[1].at);
    }
}

// ── Continuity worker ─────────────────────────────────────────────────────

#[test]
fn continuity_worker_prepares_selected_station() {
    let program = Program::load(&fixture("station.json"), None, test_config()).unwrap();
    let (tx, rx) = mpsc::channel();
    let handle = spawn_continuity(move |evt| {
        let _ = tx.send(evt);
    })
    .unwrap();

    handle.select(Arc::new(program));
    match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
        ContinuityEvent::Prepared { station, window } => {
            assert_eq!(station, "fixture");
            assert!(window.window.composition.duration() >= 3600.0);
        }
        other => panic!("expected Prepared, got {:?}", other),
    }
    handle.shutdown();
}

#[test]
fn config_file_drives_program_settings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let config = Config {
        utc_offset_secs: 3600,
        ..test_config()
    };
    config.save(&path).unwrap();

    let program = Program::load(&fixture("station.json"), None, Config::load(&path)).unwrap();
    assert_eq!(program.config().utc_offset_secs, 3600);

    // Local midnight an hour earlier gives another seed, so another day.
    let shifted = program.build_playlist(date(2024, 3, 1), 3600.0).unwrap();
    let utc = Program::load(&fixture("station.json"), None, test_config())
        .unwrap()
        .build_playlist(date(2024, 3, 1), 3600.0)
        .unwrap();
    assert_ne!(shifted, utc);
}

#[test]
fn full_ratio_config_still_builds_group_fragments() {
    let config = Config {
        anti_repeat_ratio: 1.0,
        ..test_config()
    };
    let program = Program::load(&fixture("station.json"), None, config).unwrap();
    // The two-file id group would run dry if the pile could hold both.
    let seq = program.build_playlist(date(2024, 3, 1), DAY_SECONDS).unwrap();
    assert!(seq.iter().filter(|c| name(&c.path).starts_with("id")).count() > 2);
}
