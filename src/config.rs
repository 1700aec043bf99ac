//! Attach-time option parsing.
//!
//! Grammar: `[verbose,][count,](<directory> | socket,<host>:<port>)`. The
//! prefixes are optional but their order is fixed.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Fixed name of the trace log inside the output directory.
pub const LOG_FILE_NAME: &str = "refl.log";

/// Environment variable naming the support archive.
pub const SUPPORT_JAR_ENV: &str = "PLAYOUT_SUPPORT_JAR";

const VERBOSE_PREFIX: &str = "verbose,";
const COUNT_PREFIX: &str = "count,";
const SOCKET_PREFIX: &str = "socket,";

pub const USAGE: &str = concat!(
    "Play-Out reflection trace agent (playout-agent ",
    env!("CARGO_PKG_VERSION"),
    ")\n",
    "\n",
    "This agent accepts the following options:\n",
    "[verbose,][count,]<path>\n",
    "[verbose,][count,]socket,<host>:<port>\n",
    "\n",
    "If 'verbose' is selected then the agent will print out all entries that it also added\n",
    "to the log file for the current run.\n",
    "\n",
    "If 'count' is selected then the agent will add the number of reflective invocations\n",
    "to the end of each line of the trace file.\n",
    "\n",
    "The <path> points to the output directory. The agent will write all class files\n",
    "into this directory. In addition, the agent will write a log file 'refl.log'. If this\n",
    "file already exists in the <path> directory then the agent will add to the log,\n",
    "incrementing the respective counts.\n",
    "\n",
    "With 'socket,<host>:<port>' the agent streams every trace entry to a collector\n",
    "listening on that address instead of writing to disk. No class files are written.\n",
    "\n",
    "For instance, the following command will cause the agent to dump class files into\n",
    "the directory /tmp/out, counting reflective invocations:\n",
    "java -agentpath:libplayout_agent.so=count,/tmp/out ...\n",
);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no output path given")]
    MissingDestination,
    #[error("malformed socket address {0:?}, expected <host>:<port>")]
    MalformedEndpoint(String),
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("cannot create directory {}: {source}", .path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Offline,
    Online,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Endpoint {
    fn parse(text: &str) -> Result<Self, ConfigError> {
        let malformed = || ConfigError::MalformedEndpoint(text.to_owned());
        let (host, port) = text.rsplit_once(':').ok_or_else(malformed)?;
        if host.is_empty() {
            return Err(malformed());
        }
        let port: u16 = port.parse().map_err(|_| malformed())?;
        if port == 0 {
            return Err(malformed());
        }
        Ok(Endpoint { host: host.to_owned(), port })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Directory(PathBuf),
    Socket(Endpoint),
}

/// Options fixed at attach time. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfiguration {
    pub verbose: bool,
    pub count_enabled: bool,
    pub destination: Destination,
}

impl AgentConfiguration {
    pub fn parse(options: &str) -> Result<Self, ConfigError> {
        let mut rest = options;

        let verbose = strip(&mut rest, VERBOSE_PREFIX);
        let count_enabled = strip(&mut rest, COUNT_PREFIX);
        let online = strip(&mut rest, SOCKET_PREFIX);

        if rest.is_empty() {
            return Err(ConfigError::MissingDestination);
        }

        let destination = if online {
            Destination::Socket(Endpoint::parse(rest)?)
        } else {
            Destination::Directory(PathBuf::from(rest))
        };

        Ok(AgentConfiguration { verbose, count_enabled, destination })
    }

    pub fn mode(&self) -> Mode {
        match self.destination {
            Destination::Directory(_) => Mode::Offline,
            Destination::Socket(_) => Mode::Online,
        }
    }

    pub fn output_dir(&self) -> Option<&Path> {
        match &self.destination {
            Destination::Directory(dir) => Some(dir),
            Destination::Socket(_) => None,
        }
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        match &self.destination {
            Destination::Socket(endpoint) => Some(endpoint),
            Destination::Directory(_) => None,
        }
    }
}

fn strip(rest: &mut &str, prefix: &str) -> bool {
    match rest.strip_prefix(prefix) {
        Some(tail) => {
            *rest = tail;
            true
        }
        None => false,
    }
}

/// Makes sure `dir` exists and is a directory, creating it if needed.
pub fn prepare_directory(dir: &Path) -> Result<(), ConfigError> {
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ConfigError::NotADirectory(dir.to_path_buf()));
        }
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|source| ConfigError::CreateDirectory {
        path: dir.to_path_buf(),
        source,
    })
}

/// Prints the usage text and terminates the process with status 1.
pub fn usage_and_exit() -> ! {
    print!("{USAGE}");
    std::process::exit(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_and_directory() {
        let cfg = AgentConfiguration::parse("count,/tmp/out").unwrap();
        assert!(!cfg.verbose);
        assert!(cfg.count_enabled);
        assert_eq!(cfg.mode(), Mode::Offline);
        assert_eq!(cfg.output_dir(), Some(Path::new("/tmp/out")));
    }

    #[test]
    fn verbose_socket() {
        let cfg = AgentConfiguration::parse("verbose,socket,localhost:9000").unwrap();
        assert!(cfg.verbose);
        assert!(!cfg.count_enabled);
        assert_eq!(cfg.mode(), Mode::Online);
        assert_eq!(
            cfg.endpoint(),
            Some(&Endpoint { host: "localhost".into(), port: 9000 })
        );
    }

    #[test]
    fn all_prefixes() {
        let cfg = AgentConfiguration::parse("verbose,count,socket,10.0.0.1:4000").unwrap();
        assert!(cfg.verbose && cfg.count_enabled);
        assert_eq!(cfg.endpoint().map(|e| e.to_string()), Some("10.0.0.1:4000".into()));
    }

    #[test]
    fn prefixes_out_of_order_become_the_path() {
        let cfg = AgentConfiguration::parse("count,verbose,out").unwrap();
        assert!(cfg.count_enabled);
        assert!(!cfg.verbose);
        assert_eq!(cfg.output_dir(), Some(Path::new("verbose,out")));
    }

    #[test]
    fn empty_remainder_is_usage_error() {
        for options in ["", "verbose,", "verbose,count,", "count,socket,"] {
            assert!(
                matches!(AgentConfiguration::parse(options), Err(ConfigError::MissingDestination)),
                "{options:?}"
            );
        }
    }

    #[test]
    fn malformed_endpoints() {
        for options in [
            "socket,localhost",
            "socket,:9000",
            "socket,localhost:",
            "socket,localhost:http",
            "socket,localhost:0",
            "socket,localhost:70000",
        ] {
            assert!(
                matches!(AgentConfiguration::parse(options), Err(ConfigError::MalformedEndpoint(_))),
                "{options:?}"
            );
        }
    }

    #[test]
    fn usage_mentions_log_file_and_grammar() {
        assert!(USAGE.contains("[verbose,][count,]<path>"));
        assert!(USAGE.contains(LOG_FILE_NAME));
        assert!(USAGE.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn prepare_directory_creates_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a/b/c");
        prepare_directory(&nested).unwrap();
        assert!(nested.is_dir());
        // existing directory is fine
        prepare_directory(&nested).unwrap();
    }

    #[test]
    fn prepare_directory_rejects_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("plain");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(prepare_directory(&file), Err(ConfigError::NotADirectory(_))));
        assert!(file.is_file());
    }
}
