//! System-wide constants, file names, and defaults.

/// Application name used in CLI output and reports.
pub const APP_NAME: &str = "convcheck";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "convcheck";

/// Environment variable naming the converter under test.
pub const ENV_CONVERTER: &str = "OFS_CONVERT";

/// Environment variable naming the fixtures root directory.
pub const ENV_FIXTURES_ROOT: &str = "OFS_CONVERT_TESTS_DIR";

/// Default per-tool deadline in seconds.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 5;

/// Interval between child liveness polls in milliseconds.
pub const POLL_INTERVAL_MS: u64 = 10;

/// Warning `mkfs.fat` prints when FAT32 is requested on a too-small volume.
pub const NOT_ENOUGH_CLUSTERS_MSG: &str = "WARNING: Not enough clusters for a 32 bit FAT!";

/// Checker exit bits acknowledging corrected errors (bits 2 and 3).
pub const CHECKER_ACK_MASK: i32 = 0b1100;

/// Checker exit bits meaning errors were found (bits 0 and 1).
pub const CHECKER_ERROR_MASK: i32 = 0b0011;

/// Directory suffix marking a fixture directory.
pub const FIXTURE_DIR_SUFFIX: &str = ".test";

/// Prebuilt image inside a fixture directory.
pub const PREBUILT_IMAGE_NAME: &str = "fat.img";

/// Formatter options inside a fixture directory.
pub const MKFS_ARGS_NAME: &str = "mkfs.args";

/// Population script inside a fixture directory.
pub const GENERATE_SCRIPT_NAME: &str = "generate.sh";

/// Extension of a flat prebuilt image fixture.
pub const FLAT_IMAGE_EXT: &str = "img";

/// Extension of a flat population script fixture.
pub const FLAT_SCRIPT_EXT: &str = "sh";

/// Extension of the formatter options paired with a flat script.
pub const FLAT_MKFS_EXT: &str = "mkfs";

/// Suffix of captured standard output artifacts.
pub const STDOUT_SUFFIX: &str = ".out.txt";

/// Suffix of captured standard error artifacts.
pub const STDERR_SUFFIX: &str = ".err.txt";

/// File name of a synthesized source image inside the fixture temp dir.
pub const GENERATED_IMAGE_NAME: &str = "fat.img";

/// File name of the working copy handed to the converter.
pub const WORKING_IMAGE_NAME: &str = "ext4.img";

/// Directory under the fixture temp dir holding mount points.
pub const MOUNTS_DIR_NAME: &str = "mnt";

/// ext4 recovery directory excluded from the content diff.
pub const RESERVED_RECOVERY_DIR: &str = "lost+found";
