use crate::browser;
use crate::executor::{ExecError, Executor, DEFAULT_BINARY};
use crate::model::{Invocation, InvocationError};
use crate::store::{Store, StoreError};
use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use std::io;
use std::path::{Path, PathBuf};

/// Process exit codes, one per failure class.
pub mod exit_codes {
    pub const OTHER: i32 = 1;
    pub const STORE: i32 = 3;
    pub const LAUNCH: i32 = 4;
    pub const PATH: i32 = 5;
    #[cfg(feature = "tui")]
    pub const BROWSER: i32 = 6;
}

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("cannot resolve playbook path {path}")]
    Resolve {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("playbook path {0} is not valid UTF-8")]
    NotUtf8(String),
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "ansibank",
    version,
    about = "Run ansible-playbook and keep a browsable record of every run",
    after_help = "Examples:\n  ansibank -i hosts site.yml\n  ansibank list\n  ansibank --plain list\n\n\
                  The playbook is always the last argument. Use `--` before playbook\n\
                  arguments that clash with ansibank's own flags."
)]
pub struct Cli {
    /// SQLite database holding recorded runs [default: <data dir>/ansibank/ansibank.db]
    #[arg(long, env = "ANSIBANK_DB")]
    pub db: Option<PathBuf>,

    /// Playbook executable to wrap
    #[arg(long, env = "ANSIBANK_BINARY", default_value = DEFAULT_BINARY)]
    pub binary: String,

    /// Only with `list`: print `target:start time` lines instead of opening the browser
    #[arg(long)]
    pub plain: bool,

    /// Only with `list`: load every run's output up front instead of on selection
    #[arg(long)]
    pub preload: bool,

    /// `list`, or arguments for the playbook executable followed by the playbook path
    #[arg(
        value_name = "ARGS",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub args: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Mode<'a> {
    List,
    Record {
        target: &'a str,
        arguments: &'a [String],
    },
}

impl Cli {
    fn mode(&self) -> Mode<'_> {
        match self.args.as_slice() {
            [only] if only == "list" => Mode::List,
            [arguments @ .., target] => Mode::Record { target, arguments },
            // clap enforces at least one argument
            [] => Mode::List,
        }
    }

    /// Reject list-only flags on a recorded run instead of silently ignoring them.
    pub fn check(&self) -> Result<(), clap::Error> {
        if let Mode::Record { .. } = self.mode() {
            for (set, flag) in [(self.plain, "--plain"), (self.preload, "--preload")] {
                if set {
                    return Err(Self::command().error(
                        ErrorKind::ArgumentConflict,
                        format!("{flag} only applies to `list`"),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Map an error chain to the exit code of its failure class.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<StoreError>().is_some() {
        return exit_codes::STORE;
    }
    if err.downcast_ref::<ExecError>().is_some() {
        return exit_codes::LAUNCH;
    }
    if err.downcast_ref::<PathError>().is_some() || err.downcast_ref::<InvocationError>().is_some() {
        return exit_codes::PATH;
    }
    #[cfg(feature = "tui")]
    if err.downcast_ref::<crate::tui::BrowserError>().is_some() {
        return exit_codes::BROWSER;
    }
    exit_codes::OTHER
}

fn default_db_path() -> PathBuf {
    match dirs::data_dir() {
        Some(dir) => dir.join("ansibank").join("ansibank.db"),
        None => PathBuf::from("ansibank.db"),
    }
}

fn resolve_target(path: &str) -> Result<String, PathError> {
    let resolved = std::fs::canonicalize(Path::new(path)).map_err(|source| PathError::Resolve {
        path: path.to_string(),
        source,
    })?;
    resolved
        .into_os_string()
        .into_string()
        .map_err(|raw| PathError::NotUtf8(raw.to_string_lossy().into_owned()))
}

pub fn run(args: Cli) -> Result<()> {
    let db_path = args.db.clone().unwrap_or_else(default_db_path);
    let store = Store::open(&db_path)
        .with_context(|| format!("open result store {}", db_path.display()))?;
    store.init().context("initialize result store")?;

    match args.mode() {
        Mode::List => list(&args, &store),
        Mode::Record { target, arguments } => record(&args, &store, target, arguments),
    }
}

fn record(args: &Cli, store: &Store, target: &str, arguments: &[String]) -> Result<()> {
    let resolved = resolve_target(target)?;
    let invocation = Invocation::new(resolved, arguments.to_vec())?;

    let executor = Executor::new(args.binary.as_str());
    let result = executor.run(&invocation)?;

    store.insert(&result).context("record run")?;
    let key = result.index_entry();
    tracing::info!(playbook = %key.target, start_time = %key.start_time, "run recorded");
    Ok(())
}

fn list(args: &Cli, store: &Store) -> Result<()> {
    let offset = browser::local_offset();

    if args.plain || cfg!(not(feature = "tui")) {
        let index = store.list_index().context("list recorded runs")?;
        let stdout = io::stdout();
        browser::write_listing(&index, offset, &mut stdout.lock()).context("write listing")?;
        return Ok(());
    }

    #[cfg(feature = "tui")]
    {
        use crate::browser::Browser;
        use crate::tui::{self, RenderStyle};

        let b = if args.preload {
            Browser::from_results(store.get_all_results().context("load recorded runs")?)
        } else {
            Browser::from_index(store.list_index().context("list recorded runs")?)
        };
        if b.entries().is_empty() {
            eprintln!("No recorded runs yet.");
            return Ok(());
        }

        let outcome = tui::run(b, store, &RenderStyle::with_offset(offset))?;
        browser::emit(&outcome, &mut io::stdout().lock(), &mut io::stderr().lock())
            .context("write selected output")?;
    }

    Ok(())
}
