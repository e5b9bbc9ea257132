//! End-to-end pipeline tests against scripted stand-ins for the external
//! tools and a mount backend that only records what it was asked to do.

#![cfg(unix)]
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use convcheck_common::config::HarnessConfig;
use convcheck_common::constants::APP_NAME;
use convcheck_common::error::{HarnessError, Result};
use convcheck_core::mount::{MountBackend, MountRequest, Release};
use convcheck_core::runner::ToolRunner;
use convcheck_fixture::catalog::{Catalog, TestCase};
use convcheck_runtime::pipeline::{FixtureOutcome, Pipeline, Stage};
use convcheck_runtime::suite::Suite;
use tempfile::TempDir;

/// Failure the recording backend injects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Fault {
    #[default]
    None,
    /// The mount utility exits with an error.
    AttachRefused,
    /// The mount utility is killed at its deadline.
    AttachHung,
    /// Every release fails.
    DetachBusy,
}

#[derive(Debug, Default)]
struct RecordingMounts {
    fault: Fault,
    events: Mutex<Vec<String>>,
    mount_points: Mutex<Vec<PathBuf>>,
}

impl RecordingMounts {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn mount_points(&self) -> Vec<PathBuf> {
        self.mount_points.lock().unwrap().clone()
    }
}

impl MountBackend for RecordingMounts {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn required_tools(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    fn tool_names(&self) -> Vec<&'static str> {
        vec!["mount", "umount"]
    }

    fn attach(&self, _runner: &mut ToolRunner, request: &MountRequest<'_>) -> Result<Release> {
        let access = if request.access.is_readonly() { "ro" } else { "rw" };
        self.events
            .lock()
            .unwrap()
            .push(format!("attach {} {access}", request.kind));
        self.mount_points
            .lock()
            .unwrap()
            .push(request.mount_point.to_path_buf());
        let timed_out = match self.fault {
            Fault::AttachRefused => false,
            Fault::AttachHung => true,
            Fault::None | Fault::DetachBusy => return Ok(Release::Unmount),
        };
        Err(HarnessError::Mount {
            image: request.image.to_path_buf(),
            mount_point: request.mount_point.to_path_buf(),
            timed_out,
            detail: "mount did not exit cleanly".into(),
        })
    }

    fn detach(&self, _runner: &mut ToolRunner, mount_point: &Path, _release: Release) -> Result<()> {
        let kind = mount_point.file_name().unwrap().to_string_lossy().into_owned();
        self.events.lock().unwrap().push(format!("detach {kind}"));
        if self.fault == Fault::DetachBusy {
            return Err(HarnessError::Unmount {
                mount_point: mount_point.to_path_buf(),
                detail: "target is busy".into(),
            });
        }
        Ok(())
    }
}

/// Bodies of the scripted tools. Each runs under `/bin/sh`.
struct Tools {
    converter: &'static str,
    mkfs: &'static str,
    fsck: &'static str,
    rsync: &'static str,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            converter: r#"printf EXT4 > "$1""#,
            mkfs: r#": > "$1""#,
            fsck: "exit 0",
            rsync: "exit 0",
        }
    }
}

struct Harness {
    _dir: TempDir,
    bin: PathBuf,
    fixtures: PathBuf,
    config: HarnessConfig,
    mounts: Arc<RecordingMounts>,
}

impl Harness {
    fn new(tools: &Tools) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let bin = dir.path().join("bin");
        let fixtures = dir.path().join("fixtures");
        std::fs::create_dir_all(&bin).expect("bin dir");
        std::fs::create_dir_all(&fixtures).expect("fixtures dir");

        let mut config = HarnessConfig::new(write_script(&bin.join("ofs-convert"), tools.converter), &fixtures);
        config.tools.mkfs_fat = write_script(&bin.join("mkfs.fat"), tools.mkfs);
        config.tools.fsck_ext4 = write_script(&bin.join("fsck.ext4"), tools.fsck);
        config.tools.rsync = write_script(&bin.join("rsync"), tools.rsync);

        Self {
            _dir: dir,
            bin,
            fixtures,
            config,
            mounts: Arc::new(RecordingMounts::default()),
        }
    }

    fn with_fault(mut self, fault: Fault) -> Self {
        self.mounts = Arc::new(RecordingMounts {
            fault,
            ..RecordingMounts::default()
        });
        self
    }

    fn prebuilt(&self, name: &str, image: &[u8]) -> PathBuf {
        let dir = self.fixtures.join(format!("{name}.test"));
        std::fs::create_dir_all(&dir).expect("fixture dir");
        std::fs::write(dir.join("fat.img"), image).expect("image");
        dir
    }

    fn generated(&self, name: &str, mkfs_args: &str, script: &str) -> PathBuf {
        let dir = self.fixtures.join(format!("{name}.test"));
        std::fs::create_dir_all(&dir).expect("fixture dir");
        std::fs::write(dir.join("mkfs.args"), mkfs_args).expect("mkfs.args");
        let _ = write_script(&dir.join("generate.sh"), script);
        dir
    }

    fn flat_image(&self, stem: &str, image: &[u8]) -> PathBuf {
        let path = self.fixtures.join(format!("{stem}.img"));
        std::fs::write(&path, image).expect("image");
        path
    }

    fn flat_script(&self, stem: &str, mkfs_args: &str, script: &str) -> PathBuf {
        std::fs::write(self.fixtures.join(format!("{stem}.mkfs")), mkfs_args).expect("mkfs options");
        write_script(&self.fixtures.join(format!("{stem}.sh")), script)
    }

    fn cases(&self) -> Vec<TestCase> {
        Catalog::discover(&self.fixtures).expect("discover").into_cases()
    }

    fn run_only(&self) -> FixtureOutcome {
        let cases = self.cases();
        assert_eq!(cases.len(), 1);
        Pipeline::new(&self.config, self.mounts.clone()).run(&cases[0])
    }

    fn run_case(&self, name: &str) -> FixtureOutcome {
        let case = self
            .cases()
            .into_iter()
            .find(|c| c.name == name)
            .unwrap_or_else(|| panic!("no test case named {name}"));
        Pipeline::new(&self.config, self.mounts.clone()).run(&case)
    }

    /// Temp dir of the fixture run, recovered from the first mount point
    /// (`<temp>/mnt/<kind>`).
    fn temp_dir(&self) -> PathBuf {
        let mount_points = self.mounts.mount_points();
        let first = mount_points.first().expect("no mount was attempted");
        first.parent().and_then(Path::parent).unwrap().to_path_buf()
    }
}

fn write_script(path: &Path, body: &str) -> PathBuf {
    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path.to_path_buf()
}

fn failure(outcome: &FixtureOutcome) -> (Stage, &HarnessError, &[PathBuf]) {
    let failure = outcome.failure.as_ref().expect("fixture should have failed");
    (failure.stage, &failure.error, &failure.artifacts)
}

fn artifacts_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read_dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".out.txt") || n.ends_with(".err.txt"))
        .collect();
    names.sort();
    names
}

#[test]
fn prebuilt_fixture_passes_and_leaves_its_image_alone() {
    let harness = Harness::new(&Tools::default());
    let fixture = harness.prebuilt("basic", b"FATIMAGE");

    let outcome = harness.run_only();

    assert!(outcome.passed(), "{:?}", outcome.failure);
    assert_eq!(outcome.name, "test_basic");
    assert_eq!(std::fs::read(fixture.join("fat.img")).unwrap(), b"FATIMAGE");
    assert_eq!(
        harness.mounts.events(),
        ["attach vfat ro", "attach ext4 ro", "detach ext4", "detach vfat"]
    );
    assert!(artifacts_in(&fixture).is_empty());
}

#[test]
fn temporary_directory_is_removed_after_a_pass() {
    let harness = Harness::new(&Tools::default());
    let _ = harness.prebuilt("basic", b"FATIMAGE");

    assert!(harness.run_only().passed());

    let mount_points = harness.mounts.mount_points();
    assert!(!mount_points.is_empty());
    for mount_point in mount_points {
        let temp_dir = mount_point.parent().and_then(Path::parent).unwrap();
        assert!(!temp_dir.exists(), "{} left behind", temp_dir.display());
    }
}

#[test]
fn checker_corrected_errors_pass() {
    let harness = Harness::new(&Tools {
        fsck: "echo 'fixed extent tree'; exit 12",
        ..Tools::default()
    });
    let fixture = harness.prebuilt("corrected", b"FATIMAGE");

    let outcome = harness.run_only();

    assert!(outcome.passed(), "{:?}", outcome.failure);
    assert!(artifacts_in(&fixture).is_empty());
}

#[test]
fn checker_errors_fail_and_keep_its_output() {
    let harness = Harness::new(&Tools {
        fsck: "echo 'Inode 12 has corrupt extent'; exit 1",
        ..Tools::default()
    });
    let fixture = harness.prebuilt("corrupt", b"FATIMAGE");

    let outcome = harness.run_only();

    let (stage, error, artifacts) = failure(&outcome);
    assert_eq!(stage, Stage::Checked);
    assert!(matches!(error, HarnessError::StructuralCheckFailure { code: 1, .. }));
    assert_eq!(error.to_string(), "fsck.ext4 reported errors in image (exit code 1)");
    assert_eq!(artifacts, [fixture.join("corrupt.fsck.ext4.out.txt")]);
    assert_eq!(
        std::fs::read_to_string(fixture.join("corrupt.fsck.ext4.out.txt")).unwrap(),
        "Inode 12 has corrupt extent\n"
    );
    assert!(harness.mounts.events().is_empty());
}

#[test]
fn checker_operational_error_is_unexpected() {
    let harness = Harness::new(&Tools {
        fsck: "exit 16",
        ..Tools::default()
    });
    let _ = harness.prebuilt("broken", b"FATIMAGE");

    let outcome = harness.run_only();

    let (stage, error, _) = failure(&outcome);
    assert_eq!(stage, Stage::Checked);
    assert_eq!(error.to_string(), "fsck.ext4 exited with unexpected exit code (exit code 16)");
}

#[test]
fn content_difference_fails_with_mounts_released() {
    let harness = Harness::new(&Tools {
        rsync: "echo '>f+++++++++ extra.txt'; echo '*deleting   gone.txt'",
        ..Tools::default()
    });
    let fixture = harness.prebuilt("diff", b"FATIMAGE");

    let outcome = harness.run_only();

    let (stage, error, _) = failure(&outcome);
    assert_eq!(stage, Stage::ContentVerified);
    assert!(matches!(error, HarnessError::ContentMismatch { changes: 2 }));
    assert_eq!(
        harness.mounts.events(),
        ["attach vfat ro", "attach ext4 ro", "detach ext4", "detach vfat"]
    );
    assert_eq!(artifacts_in(&fixture), ["diff.rsync.out.txt"]);
}

#[test]
fn converter_failure_stops_before_checking() {
    let harness = Harness::new(&Tools {
        converter: "echo 'unsupported cluster size' >&2; exit 3",
        ..Tools::default()
    });
    let fixture = harness.prebuilt("reject", b"FATIMAGE");

    let outcome = harness.run_only();

    let (stage, error, _) = failure(&outcome);
    assert_eq!(stage, Stage::Converted);
    assert!(matches!(error, HarnessError::UnexpectedExit { code: 3, .. }));
    assert_eq!(artifacts_in(&fixture), ["reject.ofs-convert.err.txt"]);
    assert!(harness.mounts.events().is_empty());
}

#[test]
fn hanging_converter_times_out() {
    let mut harness = Harness::new(&Tools {
        converter: "echo started; sleep 30",
        ..Tools::default()
    });
    harness.config.tool_timeout_secs = 1;
    let fixture = harness.prebuilt("hang", b"FATIMAGE");

    let outcome = harness.run_only();

    let (stage, error, _) = failure(&outcome);
    assert_eq!(stage, Stage::Converted);
    assert!(matches!(error, HarnessError::Timeout { .. }));
    assert!(outcome.elapsed < Duration::from_secs(10));
    assert_eq!(
        std::fs::read_to_string(fixture.join("hang.ofs-convert.out.txt")).unwrap(),
        "started\n"
    );
}

#[test]
fn stale_artifacts_are_removed_before_running() {
    let harness = Harness::new(&Tools::default());
    let fixture = harness.prebuilt("rerun", b"FATIMAGE");
    std::fs::write(fixture.join("rerun.rsync.out.txt"), "old diff\n").unwrap();
    std::fs::write(fixture.join("notes.txt"), "keep me\n").unwrap();

    let outcome = harness.run_only();

    assert!(outcome.passed(), "{:?}", outcome.failure);
    assert!(!fixture.join("rerun.rsync.out.txt").exists());
    assert!(fixture.join("notes.txt").exists());
}

#[test]
fn formatter_cluster_warning_fails_image_stage() {
    let harness = Harness::new(&Tools {
        mkfs: r#": > "$1"; echo 'WARNING: Not enough clusters for a 32 bit FAT!' >&2"#,
        ..Tools::default()
    });
    let fixture = harness.generated("tiny", "-F 32 1024\n", "exit 0");

    let outcome = harness.run_only();

    let (stage, error, _) = failure(&outcome);
    assert_eq!(stage, Stage::ImageReady);
    assert!(matches!(error, HarnessError::FormatWarning { .. }));
    assert_eq!(artifacts_in(&fixture), ["tiny.mkfs.fat.err.txt"]);
    assert!(harness.mounts.events().is_empty());
}

#[test]
fn generated_fixture_is_formatted_populated_and_verified() {
    // The rsync stand-in reports a difference unless the source tree holds
    // the ten files the generation script wrote.
    let mut tools = Tools {
        rsync: r#"[ "$(ls "${10}" | wc -l)" -eq 10 ] || echo '>f+++++++++ missing'"#,
        ..Tools::default()
    };
    tools.mkfs = r#"echo "$@" > "$(dirname "$0")/mkfs.log"; : > "$1""#;
    let harness = Harness::new(&tools);
    let _ = harness.generated(
        "many_files",
        "-F 32 -n TEST 65536\n",
        r#"for i in 1 2 3 4 5 6 7 8 9 10; do echo "$i" > "$1/file$i.txt"; done"#,
    );

    let outcome = harness.run_only();

    assert!(outcome.passed(), "{:?}", outcome.failure);
    let mkfs_log = std::fs::read_to_string(harness.bin.join("mkfs.log")).unwrap();
    assert!(mkfs_log.trim_end().ends_with("fat.img -F 32 -n TEST 65536"), "{mkfs_log}");
    assert_eq!(
        harness.mounts.events(),
        [
            "attach vfat rw",
            "detach vfat",
            "attach vfat ro",
            "attach ext4 ro",
            "detach ext4",
            "detach vfat",
        ]
    );
}

#[test]
fn failing_generation_script_releases_its_mount() {
    let harness = Harness::new(&Tools::default());
    let fixture = harness.generated("bad_script", "-F 32 65536\n", "echo 'disk full' >&2; exit 1");

    let outcome = harness.run_only();

    let (stage, error, _) = failure(&outcome);
    assert_eq!(stage, Stage::ImageReady);
    assert!(matches!(error, HarnessError::UnexpectedExit { code: 1, .. }));
    assert_eq!(harness.mounts.events(), ["attach vfat rw", "detach vfat"]);
    assert_eq!(artifacts_in(&fixture), ["bad_script.gen-script.err.txt"]);
}

#[test]
fn repeated_runs_agree() {
    let harness = Harness::new(&Tools::default());
    let _ = harness.prebuilt("stable", b"FATIMAGE");

    assert!(harness.run_only().passed());
    assert!(harness.run_only().passed());
}

fn split_suite_harness() -> Harness {
    let harness = Harness::new(&Tools {
        converter: r#"grep -q BAD "$1" && exit 1; printf EXT4 > "$1""#,
        ..Tools::default()
    });
    let _ = harness.prebuilt("a_bad", b"BAD");
    let _ = harness.prebuilt("b_good", b"GOOD");
    harness
}

#[test]
fn suite_keeps_going_after_a_failure() {
    let harness = split_suite_harness();
    let suite = Suite::discover(harness.config.clone(), harness.mounts.clone()).expect("suite");

    let report = suite.run();

    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.passed(), 1);
    assert_eq!(report.failed(), 1);
    assert!(!report.outcomes[0].passed);
    assert!(report.outcomes[1].passed);
    assert!(report.not_run.is_empty());
}

#[test]
fn suite_fail_fast_stops_and_lists_the_rest() {
    let mut harness = split_suite_harness();
    harness.config.fail_fast = true;
    let suite = Suite::discover(harness.config.clone(), harness.mounts.clone()).expect("suite");

    let mut seen = Vec::new();
    let report = suite.run_with(|outcome| seen.push(outcome.name.clone()));

    assert_eq!(seen, ["test_a_bad"]);
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.not_run, ["test_b_good"]);
    assert!(!report.success());
}

#[test]
fn suite_filter_selects_by_name() {
    let mut harness = split_suite_harness();
    harness.config.filter = Some("good".into());
    let suite = Suite::discover(harness.config.clone(), harness.mounts.clone()).expect("suite");

    let names: Vec<&str> = suite.cases().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["test_b_good"]);
    assert!(suite.run().success());
}

#[test]
fn refused_mount_removes_temporary_directory() {
    let harness = Harness::new(&Tools::default()).with_fault(Fault::AttachRefused);
    let _ = harness.prebuilt("refused", b"FATIMAGE");

    let outcome = harness.run_only();

    let (stage, error, _) = failure(&outcome);
    assert_eq!(stage, Stage::ContentVerified);
    assert!(matches!(error, HarnessError::Mount { timed_out: false, .. }));
    assert_eq!(harness.mounts.events(), ["attach vfat ro"]);
    let temp_dir = harness.temp_dir();
    let temp_name = temp_dir.file_name().unwrap().to_string_lossy().into_owned();
    assert!(temp_name.starts_with(&format!("{APP_NAME}-")), "{temp_name}");
    assert!(!temp_dir.exists(), "{} left behind", temp_dir.display());
}

#[test]
fn hung_mount_keeps_temporary_directory() {
    let harness = Harness::new(&Tools::default()).with_fault(Fault::AttachHung);
    let _ = harness.prebuilt("hung", b"FATIMAGE");

    let outcome = harness.run_only();

    let (_, error, _) = failure(&outcome);
    assert!(error.may_leave_mount_live());
    let temp_dir = harness.temp_dir();
    assert!(temp_dir.join("ext4.img").exists());
    std::fs::remove_dir_all(&temp_dir).unwrap();
}

#[test]
fn failed_release_keeps_temporary_directory_and_still_releases_outer_mount() {
    let harness = Harness::new(&Tools::default()).with_fault(Fault::DetachBusy);
    let _ = harness.prebuilt("busy", b"FATIMAGE");

    let outcome = harness.run_only();

    let (stage, error, _) = failure(&outcome);
    assert_eq!(stage, Stage::ContentVerified);
    assert!(matches!(error, HarnessError::Unmount { .. }));
    assert_eq!(
        harness.mounts.events(),
        ["attach vfat ro", "attach ext4 ro", "detach ext4", "detach vfat"]
    );
    let temp_dir = harness.temp_dir();
    assert!(temp_dir.exists());
    std::fs::remove_dir_all(&temp_dir).unwrap();
}

#[test]
fn flat_image_failure_writes_artifacts_beside_the_image() {
    let harness = Harness::new(&Tools {
        fsck: "echo 'bad superblock'; exit 1",
        ..Tools::default()
    });
    let image = harness.flat_image("flat", b"FATIMAGE");

    let outcome = harness.run_only();

    assert_eq!(outcome.name, "test_flat");
    let (stage, _, artifacts) = failure(&outcome);
    assert_eq!(stage, Stage::Checked);
    assert_eq!(artifacts, [harness.fixtures.join("flat.fsck.ext4.out.txt")]);
    assert_eq!(std::fs::read(&image).unwrap(), b"FATIMAGE");
}

#[test]
fn flat_script_is_formatted_with_its_paired_options() {
    let mut tools = Tools::default();
    tools.mkfs = r#"echo "$@" > "$(dirname "$0")/mkfs.log"; : > "$1""#;
    let harness = Harness::new(&tools);
    let _ = harness.flat_script("flat_gen", "-F 32 -n FLAT 65536\n", r#"echo hi > "$1/hello.txt""#);

    let outcome = harness.run_only();

    assert!(outcome.passed(), "{:?}", outcome.failure);
    let mkfs_log = std::fs::read_to_string(harness.bin.join("mkfs.log")).unwrap();
    assert!(mkfs_log.trim_end().ends_with("fat.img -F 32 -n FLAT 65536"), "{mkfs_log}");
    assert_eq!(harness.mounts.events()[0], "attach vfat rw");
}

#[test]
fn cleaning_one_flat_fixture_spares_a_longer_dotted_neighbour() {
    let harness = Harness::new(&Tools::default());
    let _ = harness.flat_image("a", b"FATIMAGE");
    let _ = harness.flat_image("a.b", b"FATIMAGE");
    std::fs::write(harness.fixtures.join("a.rsync.out.txt"), "old\n").unwrap();
    std::fs::write(harness.fixtures.join("a.b.rsync.out.txt"), "evidence\n").unwrap();

    let outcome = harness.run_case("test_a");

    assert!(outcome.passed(), "{:?}", outcome.failure);
    assert!(!harness.fixtures.join("a.rsync.out.txt").exists());
    assert_eq!(
        std::fs::read_to_string(harness.fixtures.join("a.b.rsync.out.txt")).unwrap(),
        "evidence\n"
    );
}

#[test]
fn converter_with_lingering_helper_times_out() {
    let mut harness = Harness::new(&Tools {
        converter: r#"printf EXT4 > "$1"; sleep 30 &"#,
        ..Tools::default()
    });
    harness.config.tool_timeout_secs = 1;
    let _ = harness.prebuilt("lingering", b"FATIMAGE");

    let outcome = harness.run_only();

    let (stage, error, _) = failure(&outcome);
    assert_eq!(stage, Stage::Converted);
    assert!(matches!(error, HarnessError::Timeout { .. }));
    assert!(outcome.elapsed < Duration::from_secs(10));
}
