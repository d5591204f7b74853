use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::config::{self, Config, ConfigError};
use crate::dialog::HeadlessView;
use crate::dialog_process::{DialogOptions, DialogProcess};
use crate::dictionary::Dictionary;
use crate::entry_store::StoreError;
use crate::model::{outline_to_text, text_to_outline, Entry};
use crate::settings::{self, DictionarySettings};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("dictionary error: {0}")]
    Store(#[from] StoreError),
    #[error("failed to initialize logging: {0}")]
    Logging(#[source] std::io::Error),
    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),
    #[error("invalid stroke: {0}")]
    InvalidStroke(String),
    #[error("{0} conflicts with an existing entry")]
    Rejected(Entry),
    #[error("translation and description are both required")]
    MissingFields,
}

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(
    name = "phrasefind-core",
    about = "Search and edit phrase dictionaries.",
    disable_help_subcommand = true
)]
pub struct Cli {
    /// Config file to use instead of the default location.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create an empty dictionary file.
    Init {
        dictionary: PathBuf,
        #[arg(long, default_value = settings::DEFAULT_SEARCH_STROKE)]
        search_stroke: String,
        #[arg(long)]
        pick_on_write: bool,
    },
    /// Print the ranked matches for a query, best first.
    Search { dictionary: PathBuf, query: String },
    /// Print what a brief (e.g. `T/H`) writes.
    Lookup { dictionary: PathBuf, brief: String },
    /// Add an entry and save the dictionary.
    Add {
        dictionary: PathBuf,
        #[arg(long)]
        translation: String,
        #[arg(long)]
        description: String,
        #[arg(long, default_value = "")]
        brief: String,
    },
    /// Remove an entry and save the dictionary.
    Remove {
        dictionary: PathBuf,
        #[arg(long)]
        translation: String,
        #[arg(long)]
        description: String,
        #[arg(long, default_value = "")]
        brief: String,
    },
    /// Serve the dialog side of the session on stdin/stdout.
    Dialog,
}

pub fn parse_cli_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}

pub fn run_with_options(cli: Cli) -> Result<(), RuntimeError> {
    let config = config::load(cli.config.as_deref())?;
    crate::logging::init(&config.log_level).map_err(RuntimeError::Logging)?;
    tracing::info!(config_path = %config.config_path.display(), command = ?cli.command, "startup");

    if cli.command == Command::Dialog {
        run_dialog(&config);
        return Ok(());
    }

    let output = execute(&cli.command, &config)?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn run_dialog(config: &Config) {
    let options = DialogOptions {
        request_timeout: config.request_timeout(),
        search_debounce: config.search_debounce(),
    };
    let process = DialogProcess::spawn(
        std::io::stdin(),
        std::io::stdout(),
        HeadlessView::default(),
        options,
    );
    process.wait();
    tracing::info!("dialog process exiting");
}

pub fn execute(command: &Command, config: &Config) -> Result<String, RuntimeError> {
    match command {
        Command::Init {
            dictionary,
            search_stroke,
            pick_on_write,
        } => {
            if dictionary.exists() {
                return Err(RuntimeError::AlreadyExists(dictionary.clone()));
            }
            let search_stroke =
                settings::validate_stroke(search_stroke).map_err(RuntimeError::InvalidStroke)?;
            let settings = DictionarySettings {
                search_stroke,
                pick_on_write: *pick_on_write,
                ..DictionarySettings::default()
            };
            let created = Dictionary::create(dictionary, settings)
                .with_lock_timeout(config.lock_timeout());
            created.save()?;
            Ok(format!("created {}", dictionary.display()))
        }
        Command::Search { dictionary, query } => {
            let loaded = open(dictionary, config)?;
            let results = loaded.search(query)?;
            Ok(results.iter().map(format_row).collect::<Vec<_>>().join("\n"))
        }
        Command::Lookup { dictionary, brief } => {
            let loaded = open(dictionary, config)?;
            let outline = text_to_outline(brief);
            Ok(match loaded.translate(&outline, false)? {
                Some(translation) => translation,
                None => format!("{} is not mapped", outline_to_text(&outline)),
            })
        }
        Command::Add {
            dictionary,
            translation,
            description,
            brief,
        } => {
            let entry = cli_entry(translation.trim(), description.trim(), brief);
            if !entry.is_valid() {
                return Err(RuntimeError::MissingFields);
            }
            let loaded = open(dictionary, config)?;
            if !loaded.add(entry.clone())? {
                return Err(RuntimeError::Rejected(entry));
            }
            loaded.save()?;
            Ok(format!("added {entry}"))
        }
        Command::Remove {
            dictionary,
            translation,
            description,
            brief,
        } => {
            let loaded = open(dictionary, config)?;
            let entry = cli_entry(translation, description, brief);
            loaded.remove(&entry)?;
            loaded.save()?;
            Ok(format!("removed {entry}"))
        }
        Command::Dialog => Ok(String::new()),
    }
}

fn open(path: &Path, config: &Config) -> Result<Dictionary, RuntimeError> {
    let (dictionary, warnings) = Dictionary::load(path)?;
    for warning in warnings {
        eprintln!("[phrasefind-core] {warning}");
    }
    Ok(dictionary.with_lock_timeout(config.lock_timeout()))
}

fn cli_entry(translation: &str, description: &str, brief: &str) -> Entry {
    Entry::from_owned(
        translation.to_string(),
        description.to_string(),
        text_to_outline(brief),
    )
}

fn format_row(entry: &Entry) -> String {
    format!(
        "{}\t{}\t{}",
        outline_to_text(&entry.brief),
        entry.translation,
        entry.description
    )
}

#[cfg(test)]
mod tests {
    use super::{execute, parse_cli_args, Command, RuntimeError};
    use crate::config::Config;

    #[test]
    fn parses_add_with_brief() {
        let cli = parse_cli_args([
            "phrasefind-core",
            "add",
            "dict.json",
            "--translation",
            "Hello",
            "--description",
            "greeting",
            "--brief",
            "T/H",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Add { ref brief, .. } if brief == "T/H"));
        assert!(cli.config.is_none());
    }

    #[test]
    fn rejects_unknown_subcommand() {
        assert!(parse_cli_args(["phrasefind-core", "frobnicate"]).is_err());
    }

    #[test]
    fn init_add_search_lookup_flow() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phrases.json");
        let config = Config::default();

        let init = Command::Init {
            dictionary: path.clone(),
            search_stroke: "SPWR-FP".into(),
            pick_on_write: false,
        };
        execute(&init, &config).unwrap();
        assert!(matches!(
            execute(&init, &config),
            Err(RuntimeError::AlreadyExists(_))
        ));

        let add = Command::Add {
            dictionary: path.clone(),
            translation: "Hello world".into(),
            description: "greeting".into(),
            brief: "T/H".into(),
        };
        execute(&add, &config).unwrap();
        assert!(matches!(
            execute(&add, &config),
            Err(RuntimeError::Rejected(_))
        ));

        let search = Command::Search {
            dictionary: path.clone(),
            query: "greet".into(),
        };
        assert_eq!(
            execute(&search, &config).unwrap(),
            "T/H\tHello world\tgreeting"
        );

        let lookup = Command::Lookup {
            dictionary: path.clone(),
            brief: "T H".into(),
        };
        assert_eq!(execute(&lookup, &config).unwrap(), "Hello world");

        let remove = Command::Remove {
            dictionary: path.clone(),
            translation: "Hello world".into(),
            description: "greeting".into(),
            brief: "T/H".into(),
        };
        execute(&remove, &config).unwrap();
        let lookup_again = Command::Lookup {
            dictionary: path,
            brief: "T/H".into(),
        };
        assert_eq!(
            execute(&lookup_again, &config).unwrap(),
            "T/H is not mapped"
        );
    }

    #[test]
    fn add_rejects_blank_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phrases.json");
        let config = Config::default();
        let init = Command::Init {
            dictionary: path.clone(),
            search_stroke: "SPWR-FP".into(),
            pick_on_write: false,
        };
        execute(&init, &config).unwrap();

        let add = Command::Add {
            dictionary: path.clone(),
            translation: "   ".into(),
            description: "blank output".into(),
            brief: "PW-L".into(),
        };
        assert!(matches!(
            execute(&add, &config),
            Err(RuntimeError::MissingFields)
        ));

        let search = Command::Search {
            dictionary: path,
            query: String::new(),
        };
        assert_eq!(execute(&search, &config).unwrap(), "");
    }

    #[test]
    fn init_rejects_stroke_with_slash() {
        let dir = tempfile::tempdir().unwrap();
        let init = Command::Init {
            dictionary: dir.path().join("d.json"),
            search_stroke: "A/B".into(),
            pick_on_write: false,
        };
        assert!(matches!(
            execute(&init, &Config::default()),
            Err(RuntimeError::InvalidStroke(_))
        ));
    }
}
