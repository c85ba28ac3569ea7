use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Parsed replay output destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputUri {
    /// `file://path`: JSON lines, one wire batch per line.
    Jsonl { path: PathBuf },
    /// `arrow://path`: one Arrow IPC file for the whole replay.
    ArrowIpc { path: PathBuf },
    /// `stdout:`: JSON lines on standard output.
    Stdout,
}

impl OutputUri {
    /// File path for file-backed destinations.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Jsonl { path } | Self::ArrowIpc { path } => Some(path),
            Self::Stdout => None,
        }
    }
}

pub fn parse_output_uri(uri: &str) -> anyhow::Result<OutputUri> {
    let uri = uri.trim();
    if uri == "stdout:" || uri == "stdout://" {
        return Ok(OutputUri::Stdout);
    }
    let (scheme, rest) = uri
        .split_once("://")
        .ok_or_else(|| anyhow::anyhow!("output destination {uri:?} has no scheme"))?;
    if rest.is_empty() {
        anyhow::bail!("output destination {uri:?} has an empty path");
    }
    let path = PathBuf::from(rest);
    match scheme {
        "file" => Ok(OutputUri::Jsonl { path }),
        "arrow" => Ok(OutputUri::ArrowIpc { path }),
        other => anyhow::bail!("unsupported output scheme {other:?} in {uri:?}"),
    }
}

impl FromStr for OutputUri {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        parse_output_uri(s)
    }
}

impl fmt::Display for OutputUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jsonl { path } => write!(f, "file://{}", path.display()),
            Self::ArrowIpc { path } => write!(f, "arrow://{}", path.display()),
            Self::Stdout => f.write_str("stdout:"),
        }
    }
}
