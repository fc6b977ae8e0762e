//! Job descriptor: the immutable parameter set for one worker run.
//!
//! Construction validates everything the worker would otherwise reject
//! with exit code 2, so a descriptor that exists is one the worker accepts.

pub mod pattern;

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pattern::{parse_pattern, pattern_properties};

/// Checkpoint interval used when a skip list is enabled without one.
pub const DEFAULT_CHECKPOINT_INTERVAL_SECS: u32 = 10;

/// Errors raised while building a [`JobDescriptor`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("charset cannot be empty")]
    EmptyCharset,

    #[error("length bounds must be positive (got min {min}, max {max})")]
    ZeroLength { min: u32, max: u32 },

    #[error("min length {min} cannot be greater than max length {max}")]
    MinExceedsMax { min: u32, max: u32 },

    #[error("pattern cannot be empty")]
    EmptyPattern,

    #[error("archive path {0:?} is not an existing file")]
    ArchiveNotFound(PathBuf),
}

// ---------------------------------------------------------------------------
// Search order
// ---------------------------------------------------------------------------

/// Order in which the worker enumerates candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOrder {
    #[default]
    Ascending,
    Descending,
    /// Pseudo-random enumeration; the worker token is `random`.
    Random,
}

impl fmt::Display for SearchOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ascending => "ascending",
            Self::Descending => "descending",
            Self::Random => "random",
        };
        f.write_str(s)
    }
}

impl FromStr for SearchOrder {
    type Err = SearchOrderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ascending" => Ok(Self::Ascending),
            "descending" => Ok(Self::Descending),
            "random" => Ok(Self::Random),
            _ => Err(SearchOrderParseError(s.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`SearchOrder`] string.
#[derive(Debug, Clone)]
pub struct SearchOrderParseError(pub String);

impl fmt::Display for SearchOrderParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid search order: {:?} (expected ascending, descending, or random)",
            self.0
        )
    }
}

impl std::error::Error for SearchOrderParseError {}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// The candidate space: plain length bounds or a pattern.
///
/// Pattern mode still carries bounds because the worker always takes them
/// positionally; they are derived from the pattern at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SearchSpace {
    Lengths { min: u32, max: u32 },
    Pattern { pattern: String, min: u32, max: u32 },
}

impl SearchSpace {
    pub fn bounds(&self) -> (u32, u32) {
        match self {
            Self::Lengths { min, max } | Self::Pattern { min, max, .. } => (*min, *max),
        }
    }

    pub fn pattern(&self) -> Option<&str> {
        match self {
            Self::Lengths { .. } => None,
            Self::Pattern { pattern, .. } => Some(pattern),
        }
    }
}

/// Skip-list persistence settings passed through to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipList {
    pub path: PathBuf,
    pub checkpoint_interval_secs: u32,
}

impl SkipList {
    /// Path of the cooperative stop-flag file: `<skip-list-path>.stop`.
    pub fn stop_flag_path(&self) -> PathBuf {
        stop_flag_path(&self.path)
    }
}

/// Append `.stop` to the full file name (not a replaced extension).
pub fn stop_flag_path(skip_list_path: &Path) -> PathBuf {
    let mut raw: OsString = skip_list_path.as_os_str().to_owned();
    raw.push(".stop");
    PathBuf::from(raw)
}

/// Immutable description of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    charset: String,
    space: SearchSpace,
    archive: PathBuf,
    order: SearchOrder,
    skip_list: Option<SkipList>,
}

impl JobDescriptor {
    /// Length-bounds mode.
    pub fn lengths(
        charset: impl Into<String>,
        min: u32,
        max: u32,
        archive: impl Into<PathBuf>,
        order: SearchOrder,
    ) -> Result<Self, JobError> {
        let charset = validate_charset(charset.into())?;
        validate_bounds(min, max)?;
        let archive = validate_archive(archive.into())?;
        Ok(Self {
            charset,
            space: SearchSpace::Lengths { min, max },
            archive,
            order,
            skip_list: None,
        })
    }

    /// Pattern mode.
    ///
    /// A pattern without `*` fixes both bounds to its own length and the
    /// requested bounds are ignored. With `*`, `min` is raised to the
    /// pattern's shortest expansion and `max` defaults to that minimum.
    pub fn pattern(
        charset: impl Into<String>,
        pattern: impl Into<String>,
        min: Option<u32>,
        max: Option<u32>,
        archive: impl Into<PathBuf>,
        order: SearchOrder,
    ) -> Result<Self, JobError> {
        let charset = validate_charset(charset.into())?;
        let pattern = pattern.into().trim().to_string();
        if pattern.is_empty() {
            return Err(JobError::EmptyPattern);
        }

        let props = pattern_properties(&parse_pattern(&pattern));
        let (min, max) = if props.open_ended {
            let min = min.unwrap_or(props.min_length).max(props.min_length);
            (min, max.unwrap_or(min))
        } else {
            (props.min_length, props.min_length)
        };
        validate_bounds(min, max)?;

        let archive = validate_archive(archive.into())?;
        Ok(Self {
            charset,
            space: SearchSpace::Pattern { pattern, min, max },
            archive,
            order,
            skip_list: None,
        })
    }

    /// Enable skip-list persistence. `None` uses the default interval.
    pub fn with_skip_list(
        mut self,
        path: impl Into<PathBuf>,
        checkpoint_interval_secs: Option<u32>,
    ) -> Self {
        self.skip_list = Some(SkipList {
            path: path.into(),
            checkpoint_interval_secs: checkpoint_interval_secs
                .unwrap_or(DEFAULT_CHECKPOINT_INTERVAL_SECS),
        });
        self
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    pub fn order(&self) -> SearchOrder {
        self.order
    }

    pub fn skip_list(&self) -> Option<&SkipList> {
        self.skip_list.as_ref()
    }

    /// Worker argument vector, excluding the binary itself:
    ///
    /// ```text
    /// <charset> <min> <max> <archive> <order>
    ///   [--pattern <p>] [--skip-file <path> --checkpoint-interval <secs>]
    /// ```
    pub fn worker_args(&self) -> Vec<OsString> {
        let (min, max) = self.space.bounds();
        let mut args: Vec<OsString> = vec![
            self.charset.clone().into(),
            min.to_string().into(),
            max.to_string().into(),
            self.archive.clone().into_os_string(),
            self.order.to_string().into(),
        ];
        if let Some(pattern) = self.space.pattern() {
            args.push("--pattern".into());
            args.push(pattern.into());
        }
        if let Some(skip) = &self.skip_list {
            args.push("--skip-file".into());
            args.push(skip.path.clone().into_os_string());
            args.push("--checkpoint-interval".into());
            args.push(skip.checkpoint_interval_secs.to_string().into());
        }
        args
    }
}

fn validate_charset(charset: String) -> Result<String, JobError> {
    if charset.is_empty() {
        return Err(JobError::EmptyCharset);
    }
    Ok(charset)
}

fn validate_bounds(min: u32, max: u32) -> Result<(), JobError> {
    if min == 0 || max == 0 {
        return Err(JobError::ZeroLength { min, max });
    }
    if min > max {
        return Err(JobError::MinExceedsMax { min, max });
    }
    Ok(())
}

fn validate_archive(archive: PathBuf) -> Result<PathBuf, JobError> {
    if !archive.is_file() {
        return Err(JobError::ArchiveNotFound(archive));
    }
    // The worker runs from its own directory, so relative paths would
    // resolve against the wrong place.
    Ok(std::fs::canonicalize(&archive).unwrap_or(archive))
}
