use std::env;
use std::process;
use std::sync::Arc;

use domain::ResponseRepository;
use fixtures::{FixtureDir, Harness};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn print_usage() {
    eprintln!(
        "{} v{}\n\nUsage:\n  fixtures insert <table> <fixture> [--if-absent]\n  fixtures delete <table> <id>\n  fixtures get <table> <id>\n\nEnvironment:\n  FIXTURES_DIR       fixture directory (default ./fixtures)\n  STORAGE_PROVIDER   sqlite (default) or dynamo (needs --features dynamo)\n  DB_PATH            sqlite file (default ./data/questionnaire_responses.db)",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    );
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

// Open the named table on the configured backend.
fn open_table(table: &str) -> Result<Arc<dyn ResponseRepository>, String> {
    let provider = env::var("STORAGE_PROVIDER").unwrap_or_else(|_| "sqlite".into());
    if provider.eq_ignore_ascii_case("dynamo") {
        #[cfg(feature = "dynamo")]
        {
            let repo = aws_dynamo::DynamoRepo::new(table)
                .map_err(|e| format!("dynamo init error: {e}"))?;
            return Ok(Arc::new(repo));
        }
        #[cfg(not(feature = "dynamo"))]
        return Err("STORAGE_PROVIDER=dynamo requires the `dynamo` feature".into());
    }

    #[cfg(feature = "sqlite")]
    {
        // The local database only carries the one table.
        if table != domain::TABLE_QUESTIONNAIRE_RESPONSES {
            return Err(format!("unknown table for sqlite storage: {table}"));
        }
        let repo = sqlite_adapter::SqliteRepo::from_env()
            .map_err(|e| format!("sqlite init error: {e}"))?;
        Ok(Arc::new(repo))
    }
    #[cfg(not(feature = "sqlite"))]
    {
        let _ = table;
        Err("no storage backend compiled in".into())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Insert {
        table: String,
        fixture: String,
        if_absent: bool,
    },
    Delete {
        table: String,
        id: String,
    },
    Get {
        table: String,
        id: String,
    },
}

impl Command {
    fn table(&self) -> &str {
        match self {
            Command::Insert { table, .. } | Command::Delete { table, .. } | Command::Get { table, .. } => {
                table
            }
        }
    }
}

// `Ok(None)` means usage was asked for.
fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Option<Command>, String> {
    let mut args = args.into_iter();

    let Some(cmd) = args.next() else {
        return Ok(None);
    };
    match cmd.as_str() {
        "insert" | "delete" | "get" => {}
        "help" | "-h" | "--help" => return Ok(None),
        _ => return Err(format!("unknown command: {cmd}")),
    }

    let Some(table) = args.next() else {
        return Err(format!("missing <table> for {cmd}"));
    };
    let Some(target) = args.next() else {
        return Err(format!("missing fixture or id for {cmd}"));
    };
    let rest: Vec<String> = args.collect();

    let command = match cmd.as_str() {
        "insert" => {
            let mut if_absent = false;
            for arg in &rest {
                match arg.as_str() {
                    "--if-absent" => if_absent = true,
                    unk => return Err(format!("unknown argument: {}", unk)),
                }
            }
            Command::Insert {
                table,
                fixture: target,
                if_absent,
            }
        }
        other => {
            if let Some(unk) = rest.first() {
                return Err(format!("unknown argument: {}", unk));
            }
            if other == "delete" {
                Command::Delete { table, id: target }
            } else {
                Command::Get { table, id: target }
            }
        }
    };
    Ok(Some(command))
}

fn run() -> Result<(), String> {
    let Some(command) = parse_args(env::args().skip(1))? else {
        print_usage();
        return Ok(());
    };

    let table = command.table().to_string();
    let fixtures = FixtureDir::from_env();
    tracing::debug!(dir = %fixtures.root().display(), table = %table, "fixture harness ready");
    let harness = Harness::new(fixtures).with_table(table.clone(), open_table(&table)?);

    match command {
        Command::Insert {
            fixture, if_absent, ..
        } => {
            if if_absent {
                let written = harness
                    .insert_if_absent(&table, &fixture)
                    .map_err(|e| format!("insert failed: {e}"))?;
                println!("{}", if written { "inserted" } else { "already present" });
            } else {
                let id = harness
                    .insert_from_file(&table, &fixture)
                    .map_err(|e| format!("insert failed: {e}"))?;
                println!("inserted: {}", id);
            }
            Ok(())
        }
        Command::Delete { id, .. } => {
            harness
                .delete_by_id(&table, &id)
                .map_err(|e| format!("delete failed: {e}"))?;
            println!("deleted: {}", id);
            Ok(())
        }
        Command::Get { id, .. } => match harness.lookup(&table, &id) {
            Ok(Some(doc)) => {
                let text = serde_json::to_string_pretty(&doc)
                    .map_err(|e| format!("render failed: {e}"))?;
                println!("{}", text);
                Ok(())
            }
            Ok(None) => Err("not found".into()),
            Err(e) => Err(format!("get failed: {e}")),
        },
    }
}

fn main() {
    init_tracing();
    if let Err(msg) = run() {
        eprintln!("error: {}", msg);
        process::exit(1);
    }
}
