// src/commands.rs
//! Typed command surface over a [`Keyspace`].
//!
//! Every command has a static [`CommandSpec`]: its name, arity and the declared
//! type of each argument. A request is checked against its descriptor (name, arity,
//! argument parsing) before anything touches the key space, so a rejected
//! command never leaves partial state behind.

use std::fmt;
use std::path::PathBuf;

use serde_json::json;
use tracing::debug;

use crate::store::Keyspace;
use crate::tdigest::{DigestInfo, TDigest};
use crate::{TdError, TdResult};

/* =============================================================================
 * Descriptors
 * ============================================================================= */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Key,
    Float,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
}

/// Argument count, excluding the command name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    /// At least this many; the last declared argument repeats.
    AtLeast(usize),
}

impl Arity {
    fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Exact(k) => n == k,
            Arity::AtLeast(k) => n >= k,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub arity: Arity,
    pub args: &'static [ArgSpec],
}

const fn arg(name: &'static str, kind: ArgKind) -> ArgSpec {
    ArgSpec { name, kind }
}

const KEY: ArgSpec = arg("key", ArgKind::Key);

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "tdigest.create",
        arity: Arity::Exact(2),
        args: &[KEY, arg("compression", ArgKind::Float)],
    },
    CommandSpec {
        name: "tdigest.reset",
        arity: Arity::Exact(1),
        args: &[KEY],
    },
    CommandSpec {
        name: "tdigest.add",
        arity: Arity::Exact(3),
        args: &[
            KEY,
            arg("value", ArgKind::Float),
            arg("weight", ArgKind::Float),
        ],
    },
    CommandSpec {
        name: "tdigest.merge",
        arity: Arity::Exact(2),
        args: &[arg("dest", ArgKind::Key), arg("src", ArgKind::Key)],
    },
    CommandSpec {
        name: "tdigest.min",
        arity: Arity::Exact(1),
        args: &[KEY],
    },
    CommandSpec {
        name: "tdigest.max",
        arity: Arity::Exact(1),
        args: &[KEY],
    },
    CommandSpec {
        name: "tdigest.quantile",
        arity: Arity::Exact(2),
        args: &[KEY, arg("quantile", ArgKind::Float)],
    },
    CommandSpec {
        name: "tdigest.cdf",
        arity: Arity::Exact(2),
        args: &[KEY, arg("value", ArgKind::Float)],
    },
    CommandSpec {
        name: "tdigest.info",
        arity: Arity::Exact(1),
        args: &[KEY],
    },
    CommandSpec {
        name: "set",
        arity: Arity::Exact(2),
        args: &[KEY, arg("value", ArgKind::Text)],
    },
    CommandSpec {
        name: "get",
        arity: Arity::Exact(1),
        args: &[KEY],
    },
    CommandSpec {
        name: "del",
        arity: Arity::AtLeast(1),
        args: &[KEY],
    },
    CommandSpec {
        name: "exists",
        arity: Arity::AtLeast(1),
        args: &[KEY],
    },
    CommandSpec {
        name: "memory.usage",
        arity: Arity::Exact(1),
        args: &[KEY],
    },
    CommandSpec {
        name: "save",
        arity: Arity::Exact(0),
        args: &[],
    },
];

/// Case-insensitive descriptor lookup.
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

/* =============================================================================
 * Parsed commands
 * ============================================================================= */

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Create { key: String, compression: f64 },
    Reset { key: String },
    Add { key: String, value: f64, weight: f64 },
    Merge { dest: String, src: String },
    Min { key: String },
    Max { key: String },
    Quantile { key: String, q: f64 },
    Cdf { key: String, value: f64 },
    Info { key: String },
    Set { key: String, value: String },
    Get { key: String },
    Del { keys: Vec<String> },
    Exists { keys: Vec<String> },
    MemoryUsage { key: String },
    Save,
}

#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Str(String),
    Float(f64),
}

impl Arg {
    fn text(&self) -> String {
        match self {
            Arg::Str(s) => s.clone(),
            Arg::Float(f) => f.to_string(),
        }
    }

    fn float(&self) -> Option<f64> {
        match self {
            Arg::Float(f) => Some(*f),
            Arg::Str(_) => None,
        }
    }
}

fn parse_float(spec: &ArgSpec, raw: &str) -> TdResult<f64> {
    raw.parse::<f64>()
        .map_err(|_| TdError::invalid(spec.name, format!("not a number: {raw:?}")))
}

/// Check `args` against `spec` and convert each to its declared kind.
fn typed_args(spec: &CommandSpec, args: &[String]) -> TdResult<Vec<Arg>> {
    if !spec.arity.accepts(args.len()) {
        return Err(TdError::Arity {
            command: spec.name.to_string(),
        });
    }
    let mut out = Vec::with_capacity(args.len());
    for (i, raw) in args.iter().enumerate() {
        let Some(decl) = spec.args.get(i).or_else(|| spec.args.last()) else {
            return Err(TdError::Arity {
                command: spec.name.to_string(),
            });
        };
        out.push(match decl.kind {
            ArgKind::Key | ArgKind::Text => Arg::Str(raw.clone()),
            ArgKind::Float => Arg::Float(parse_float(decl, raw)?),
        });
    }
    Ok(out)
}

impl Command {
    /// Parse a tokenized request: `tokens[0]` is the command name.
    pub fn parse(tokens: &[String]) -> TdResult<Command> {
        let Some((name, rest)) = tokens.split_first() else {
            return Err(TdError::UnknownCommand {
                command: String::new(),
            });
        };
        let spec = lookup(name).ok_or_else(|| TdError::UnknownCommand {
            command: name.clone(),
        })?;
        // arity is checked, so positional indexing below is in bounds
        let args = typed_args(spec, rest)?;
        let key = |i: usize| args[i].text();
        let float = |i: usize| {
            args[i]
                .float()
                .ok_or_else(|| TdError::invalid(spec.args[i].name, "expected a number"))
        };

        let cmd = match spec.name {
            "tdigest.create" => Command::Create {
                key: key(0),
                compression: float(1)?,
            },
            "tdigest.reset" => Command::Reset { key: key(0) },
            "tdigest.add" => Command::Add {
                key: key(0),
                value: float(1)?,
                weight: float(2)?,
            },
            "tdigest.merge" => Command::Merge {
                dest: key(0),
                src: key(1),
            },
            "tdigest.min" => Command::Min { key: key(0) },
            "tdigest.max" => Command::Max { key: key(0) },
            "tdigest.quantile" => Command::Quantile {
                key: key(0),
                q: float(1)?,
            },
            "tdigest.cdf" => Command::Cdf {
                key: key(0),
                value: float(1)?,
            },
            "tdigest.info" => Command::Info { key: key(0) },
            "set" => Command::Set {
                key: key(0),
                value: key(1),
            },
            "get" => Command::Get { key: key(0) },
            "del" => Command::Del {
                keys: args.iter().map(Arg::text).collect(),
            },
            "exists" => Command::Exists {
                keys: args.iter().map(Arg::text).collect(),
            },
            "memory.usage" => Command::MemoryUsage { key: key(0) },
            "save" => Command::Save,
            other => {
                return Err(TdError::UnknownCommand {
                    command: other.to_string(),
                })
            }
        };
        Ok(cmd)
    }
}

/// Split a request line on whitespace; double quotes group a token.
pub fn tokenize(line: &str) -> TdResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    tokens.push(std::mem::take(&mut cur));
                    has_token = false;
                }
            }
            c => {
                cur.push(c);
                has_token = true;
            }
        }
    }
    if in_quotes {
        return Err(TdError::invalid("command line", "unbalanced quotes"));
    }
    if has_token {
        tokens.push(cur);
    }
    Ok(tokens)
}

/* =============================================================================
 * Replies
 * ============================================================================= */

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok,
    Float(f64),
    Int(i64),
    Bulk(String),
    Nil,
    Info(DigestInfo),
}

impl Reply {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Reply::Ok => json!("OK"),
            Reply::Float(f) => json!(f),
            Reply::Int(i) => json!(i),
            Reply::Bulk(s) => json!(s),
            Reply::Nil => serde_json::Value::Null,
            Reply::Info(info) => json!({
                "Compression": info.compression,
                "Merged nodes": info.merged_nodes,
                "Unmerged nodes": info.unmerged_nodes,
                "Merged weight": info.merged_weight,
                "Unmerged weight": info.unmerged_weight,
                "Total compressions": info.total_compressions,
            }),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => write!(f, "OK"),
            Reply::Float(v) => write!(f, "{v}"),
            Reply::Int(i) => write!(f, "(integer) {i}"),
            Reply::Bulk(s) => write!(f, "\"{s}\""),
            Reply::Nil => write!(f, "(nil)"),
            Reply::Info(info) => {
                writeln!(f, "Compression: {}", info.compression)?;
                writeln!(f, "Merged nodes: {}", info.merged_nodes)?;
                writeln!(f, "Unmerged nodes: {}", info.unmerged_nodes)?;
                writeln!(f, "Merged weight: {}", info.merged_weight)?;
                writeln!(f, "Unmerged weight: {}", info.unmerged_weight)?;
                write!(f, "Total compressions: {}", info.total_compressions)
            }
        }
    }
}

/* =============================================================================
 * Dispatch
 * ============================================================================= */

/// A key space plus the session settings commands may need.
#[derive(Debug, Default)]
pub struct Session {
    keyspace: Keyspace,
    snapshot: Option<PathBuf>,
}

impl Session {
    pub fn new(keyspace: Keyspace) -> Self {
        Self {
            keyspace,
            snapshot: None,
        }
    }

    /// Target of `SAVE`.
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot = Some(path.into());
        self
    }

    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    pub fn keyspace_mut(&mut self) -> &mut Keyspace {
        &mut self.keyspace
    }

    /// Tokenize, parse and run one request line.
    pub fn execute_line(&mut self, line: &str) -> TdResult<Reply> {
        let tokens = tokenize(line)?;
        self.execute(&tokens)
    }

    /// Parse and run one tokenized request.
    pub fn execute(&mut self, tokens: &[String]) -> TdResult<Reply> {
        let res = Command::parse(tokens).and_then(|cmd| self.apply(cmd));
        if let Err(err) = &res {
            debug!(
                command = tokens.first().map(String::as_str).unwrap_or(""),
                error = %err,
                "command failed"
            );
        }
        res
    }

    /// Run an already-parsed command.
    pub fn apply(&mut self, cmd: Command) -> TdResult<Reply> {
        let ks = &mut self.keyspace;
        match cmd {
            Command::Create { key, compression } => {
                let td = TDigest::new(compression)?;
                ks.create_digest(&key, td)?;
                Ok(Reply::Ok)
            }
            Command::Reset { key } => {
                ks.digest_mut(&key)?.reset();
                Ok(Reply::Ok)
            }
            Command::Add { key, value, weight } => {
                ks.digest_mut(&key)?.add(value, weight)?;
                Ok(Reply::Ok)
            }
            Command::Merge { dest, src } => {
                ks.digest(&dest)?;
                let source = ks.digest(&src)?.clone();
                ks.digest_mut(&dest)?.merge(&source)?;
                Ok(Reply::Ok)
            }
            Command::Min { key } => Ok(Reply::Float(ks.digest(&key)?.min())),
            Command::Max { key } => Ok(Reply::Float(ks.digest(&key)?.max())),
            Command::Quantile { key, q } => Ok(Reply::Float(ks.digest_mut(&key)?.quantile(q)?)),
            Command::Cdf { key, value } => Ok(Reply::Float(ks.digest_mut(&key)?.cdf(value)?)),
            Command::Info { key } => Ok(Reply::Info(ks.digest(&key)?.info())),
            Command::Set { key, value } => {
                ks.set_string(&key, value);
                Ok(Reply::Ok)
            }
            Command::Get { key } => Ok(match ks.get_string(&key)? {
                Some(s) => Reply::Bulk(s.to_string()),
                None => Reply::Nil,
            }),
            Command::Del { keys } => {
                let mut n = 0;
                for k in &keys {
                    if ks.delete(k) {
                        n += 1;
                    }
                }
                Ok(Reply::Int(n))
            }
            Command::Exists { keys } => {
                let n = keys.iter().filter(|k| ks.exists(k.as_str())).count();
                Ok(Reply::Int(n as i64))
            }
            Command::MemoryUsage { key } => Ok(match ks.memory_usage(&key) {
                Some(n) => Reply::Int(n as i64),
                None => Reply::Nil,
            }),
            Command::Save => {
                let Some(path) = self.snapshot.as_deref() else {
                    return Err(TdError::Io("no snapshot path configured".into()));
                };
                ks.save(path)?;
                Ok(Reply::Ok)
            }
        }
    }
}
