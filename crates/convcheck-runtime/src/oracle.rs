//! Success policies for the formatter, the structural checker, and the
//! content diff.

use convcheck_common::constants::{CHECKER_ACK_MASK, CHECKER_ERROR_MASK, NOT_ENOUGH_CLUSTERS_MSG};
use convcheck_common::error::{HarnessError, Result};
use convcheck_core::exec::ToolResult;

/// How a structural checker exit code is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckerVerdict {
    /// Zero once the corrected-error bits (2 and 3) are masked off.
    Clean,
    /// Only the error-found bits remain.
    Errors,
    /// Any other code, including death by signal.
    Unexpected,
}

/// Classifies a checker exit code.
#[must_use]
pub const fn classify_checker_code(code: i32) -> CheckerVerdict {
    let masked = code & !CHECKER_ACK_MASK;
    if masked == 0 {
        CheckerVerdict::Clean
    } else if code > 0 && masked & !CHECKER_ERROR_MASK == 0 {
        CheckerVerdict::Errors
    } else {
        CheckerVerdict::Unexpected
    }
}

/// Formatter policy: exit zero and no under-provisioning warning.
///
/// # Errors
///
/// Returns [`HarnessError::UnexpectedExit`] on a non-zero exit, or
/// [`HarnessError::FormatWarning`] if stderr carries the FAT32 cluster
/// warning.
pub fn check_formatter(result: &ToolResult) -> Result<()> {
    if result.exit_code != 0 {
        return Err(HarnessError::UnexpectedExit {
            tool: result.tool.clone(),
            code: result.exit_code,
            message: format!("{} did not exit cleanly", result.tool),
        });
    }
    if result.stderr_lossy().contains(NOT_ENOUGH_CLUSTERS_MSG) {
        return Err(HarnessError::FormatWarning {
            warning: NOT_ENOUGH_CLUSTERS_MSG.to_string(),
        });
    }
    Ok(())
}

/// Structural checker policy.
///
/// # Errors
///
/// Returns [`HarnessError::StructuralCheckFailure`] unless the code is
/// [`CheckerVerdict::Clean`].
pub fn check_structure(result: &ToolResult) -> Result<()> {
    let message = match classify_checker_code(result.exit_code) {
        CheckerVerdict::Clean => return Ok(()),
        CheckerVerdict::Errors => format!("{} reported errors in image", result.tool),
        CheckerVerdict::Unexpected => format!("{} exited with unexpected exit code", result.tool),
    };
    Err(HarnessError::StructuralCheckFailure {
        code: result.exit_code,
        message,
    })
}

/// Content diff policy: a clean exit with no itemized changes.
///
/// # Errors
///
/// Returns [`HarnessError::UnexpectedExit`] if the diff tool failed, or
/// [`HarnessError::ContentMismatch`] if it reported any difference.
pub fn check_content(result: &ToolResult) -> Result<()> {
    if result.exit_code != 0 {
        return Err(HarnessError::UnexpectedExit {
            tool: result.tool.clone(),
            code: result.exit_code,
            message: format!("{} did not exit cleanly", result.tool),
        });
    }
    if result.stdout.is_empty() {
        return Ok(());
    }
    let changes = result
        .stdout_lossy()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .count();
    Err(HarnessError::ContentMismatch {
        changes: changes.max(1),
    })
}
