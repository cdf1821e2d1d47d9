use castmark::action::ActionPayload;
use castmark::import::{ImportOutcome, Importer};
use castmark::lookup::{lookup_cast, LookupPlan, NeynarClient};
use castmark::collection::{CollectionStore, CollectionUpdate, NewCollection};
use castmark::store::{BookmarkStore, BookmarkUpdate, SupabaseBookmarkStore};
use castmark::{Branding, Resolver};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod config;
mod infrastructure;
mod services;

use config::{check_env_vars, Config};
use infrastructure::{invalid_input, CircuitBreaker, Error};
use services::{import_all, GuardedLookup};

/// Consecutive transient failures before lookups stop being sent
const BREAKER_THRESHOLD: u32 = 5;
const BREAKER_RESET: Duration = Duration::from_secs(30);

/// Save Farcaster casts as bookmarks from pasted URLs and hashes
#[derive(Debug, Parser)]
#[command(name = "castmark", version)]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check whether input looks like a cast reference
    Check { input: String },
    /// Resolve a cast URL or hash without fetching anything
    Resolve { input: String },
    /// Resolve input and fetch the cast it points at
    Lookup { input: String },
    /// Save a cast to a user's bookmarks
    Import {
        #[arg(long, env = "CASTMARK_USER_ID")]
        user_id: String,
        input: String,
    },
    /// Save every cast listed in a file, one reference per line
    ImportFile {
        #[arg(long, env = "CASTMARK_USER_ID")]
        user_id: String,
        path: PathBuf,
    },
    /// Save the cast named by a cast-action payload (read from stdin without a path)
    Action {
        #[arg(long, env = "CASTMARK_USER_ID")]
        user_id: Option<String>,
        path: Option<PathBuf>,
    },
    /// List a user's bookmarks, newest first
    List {
        #[arg(long, env = "CASTMARK_USER_ID")]
        user_id: String,
    },
    /// Change the note or tags of a bookmark
    Update {
        id: String,
        #[arg(long)]
        note: Option<String>,
        /// Replaces the bookmark's tags; repeat for several
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Removes every tag
        #[arg(long, conflicts_with = "tags")]
        clear_tags: bool,
    },
    /// Delete a bookmark by id
    Delete { id: String },
    /// Group bookmarks into collections
    Collection {
        #[command(subcommand)]
        command: CollectionCommand,
    },
}

#[derive(Debug, Subcommand)]
enum CollectionCommand {
    /// List a user's collections, newest first
    List {
        #[arg(long, env = "CASTMARK_USER_ID")]
        user_id: String,
    },
    /// Create a collection
    Create {
        #[arg(long, env = "CASTMARK_USER_ID")]
        user_id: String,
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        public: bool,
        #[arg(long)]
        collaborative: bool,
    },
    /// Change a collection's details
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        public: Option<bool>,
        #[arg(long)]
        collaborative: Option<bool>,
        #[arg(long)]
        cover_image: Option<String>,
    },
    /// Delete a collection and its items
    Delete { id: String },
    /// List the bookmarks in a collection
    Items { id: String },
    /// Add a bookmark to the end of a collection
    Add {
        #[arg(long, env = "CASTMARK_USER_ID")]
        user_id: String,
        collection_id: String,
        bookmark_id: String,
    },
    /// Remove an item from its collection
    Remove { item_id: String },
}

fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            let printer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(true)
                .with_writer(std::io::stderr)
                .with_thread_names(true);

            let filter = EnvFilter::builder();

            let filter = if std::env::var("RUST_LOG").is_ok() {
                eprintln!("loaded logger directives from `RUST_LOG` env");

                filter.from_env()?
            } else {
                filter.parse("info")?
            };

            tracing_subscriber::registry()
                .with(printer)
                .with(filter)
                .init();

            if let (Ok(name), Ok(email)) =
                (dotenvy::var("BRAND_NAME"), dotenvy::var("SUPPORT_EMAIL"))
            {
                Branding::set_branding(Branding::new(name, email))?;
            }

            if let Err(err) = run(cli).await {
                error!(error = %err, permanent = err.is_permanent(), "Command failed");
                eprintln!("{}", err.user_message());
                // EX_TEMPFAIL tells callers the same command may work later
                std::process::exit(if err.is_permanent() { 1 } else { 75 });
            }

            Ok::<(), anyhow::Error>(())
        })
}

async fn run(cli: Cli) -> Result<(), Error> {
    let config = Config::from_env()?;
    let resolver = Resolver::new(config.known_domains.clone());
    let json = cli.json;

    match cli.command {
        Command::Check { input } => {
            let plausible = resolver.is_plausible_reference(&input);

            #[derive(Serialize)]
            struct Check<'a> {
                input: &'a str,
                plausible: bool,
            }

            print(json, &Check { input: &input, plausible }, || {
                if plausible {
                    "Looks like a cast reference".to_string()
                } else {
                    "Not a cast reference".to_string()
                }
            })?;
        }
        Command::Resolve { input } => {
            let reference = resolver
                .resolve_reference(&input)
                .map_err(castmark::Error::from)?;

            print(json, &reference, || {
                let mut text = format!("Hash: {}", reference.canonical_id);
                if let Some(url) = &reference.canonical_url {
                    text.push_str(&format!("\nURL:  {}", url));
                }
                if reference.is_shortened {
                    text.push_str("\nShortened hash, the full hash is confirmed on import");
                }
                text
            })?;
        }
        Command::Lookup { input } => {
            check_env_vars(&["NEYNAR_API_KEY"])?;

            let reference = resolver
                .resolve_reference(&input)
                .map_err(castmark::Error::from)?;
            let plan = LookupPlan::for_reference(&reference, resolver.domains())
                .with_max_attempts(config.max_lookup_attempts);
            let cast = lookup_cast(&guarded_lookup(&config)?, &plan).await?;

            print(json, &cast, || {
                let author = cast
                    .author
                    .username
                    .as_deref()
                    .map(|username| format!("@{}", username))
                    .unwrap_or_else(|| format!("fid {}", cast.author.fid));
                format!("{} ({})\n{}", cast.hash, author, cast.text)
            })?;
        }
        Command::Import { user_id, input } => {
            check_env_vars(&["NEYNAR_API_KEY", "SUPABASE_URL", "SUPABASE_KEY"])?;

            let outcome = importer(&config, resolver)?.import(&user_id, &input).await?;
            print_outcome(json, &outcome)?;
        }
        Command::ImportFile { user_id, path } => {
            check_env_vars(&["NEYNAR_API_KEY", "SUPABASE_URL", "SUPABASE_KEY"])?;

            let contents = tokio::fs::read_to_string(&path).await?;
            let importer = importer(&config, resolver)?;
            let report = import_all(&importer, &user_id, &contents, config.concurrency).await;

            print(json, &report, || {
                let mut text = format!(
                    "{} lines: {} imported, {} already saved, {} failed",
                    report.total(),
                    report.imported.len(),
                    report.already_saved.len(),
                    report.failed.len()
                );
                for failed in &report.failed {
                    text.push_str(&format!(
                        "\nline {}: {}: {}",
                        failed.line, failed.input, failed.message
                    ));
                }
                text
            })?;
        }
        Command::Action { user_id, path } => {
            check_env_vars(&["NEYNAR_API_KEY", "SUPABASE_URL", "SUPABASE_KEY"])?;

            let body = match path {
                Some(path) => tokio::fs::read_to_string(&path).await?,
                None => {
                    let mut body = String::new();
                    tokio::io::stdin().read_to_string(&mut body).await?;
                    body
                }
            };
            let payload: ActionPayload = serde_json::from_str(&body)?;

            let outcome = importer(&config, resolver)?
                .import_action(&payload, user_id.as_deref())
                .await?;
            print_outcome(json, &outcome)?;
        }
        Command::List { user_id } => {
            check_env_vars(&["SUPABASE_URL", "SUPABASE_KEY"])?;

            let bookmarks = config.supabase()?.list(&user_id).await?;
            info!(count = bookmarks.len(), "Bookmarks listed");

            print(json, &bookmarks, || {
                bookmarks
                    .iter()
                    .map(|bookmark| {
                        format!(
                            "{}  {}  {}",
                            bookmark.id,
                            bookmark.cast_hash,
                            bookmark
                                .cast_text
                                .as_deref()
                                .and_then(|text| text.lines().next())
                                .unwrap_or_default()
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }
        Command::Update {
            id,
            note,
            tags,
            clear_tags,
        } => {
            check_env_vars(&["SUPABASE_URL", "SUPABASE_KEY"])?;

            let changes = BookmarkUpdate {
                note,
                tags: (clear_tags || !tags.is_empty()).then_some(tags),
            };
            if changes.is_empty() {
                return Err(invalid_input("Nothing to update, pass --note, --tag or --clear-tags"));
            }

            let bookmark = config
                .supabase()?
                .update(&id, changes)
                .await?
                .ok_or_else(|| invalid_input(format!("No bookmark with id `{}`", id)))?;

            print(json, &bookmark, || {
                format!(
                    "Updated {}\nNote: {}\nTags: {}",
                    bookmark.id,
                    bookmark.note.as_deref().unwrap_or_default(),
                    bookmark.tags.join(", ")
                )
            })?;
        }
        Command::Collection { command } => {
            check_env_vars(&["SUPABASE_URL", "SUPABASE_KEY"])?;
            run_collection(&config, command, json).await?;
        }
        Command::Delete { id } => {
            check_env_vars(&["SUPABASE_URL", "SUPABASE_KEY"])?;

            if !config.supabase()?.delete(&id).await? {
                return Err(invalid_input(format!("No bookmark with id `{}`", id)));
            }
            print(json, &serde_json::json!({ "deleted": &id }), || {
                format!("Deleted {}", id)
            })?;
        }
    }

    Ok(())
}

async fn run_collection(config: &Config, command: CollectionCommand, json: bool) -> Result<(), Error> {
    let store = config.supabase_collections()?;

    match command {
        CollectionCommand::List { user_id } => {
            let collections = store.list(&user_id).await?;
            info!(count = collections.len(), "Collections listed");

            print(json, &collections, || {
                collections
                    .iter()
                    .map(|collection| format!("{}  {}", collection.id, collection.name))
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }
        CollectionCommand::Create {
            user_id,
            name,
            description,
            public,
            collaborative,
        } => {
            let mut new = NewCollection::new(user_id, name);
            new.description = description;
            new.is_public = public;
            new.is_collaborative = collaborative;

            let collection = store.create(new).await?;
            print(json, &collection, || {
                format!("Created {} as {}", collection.name, collection.id)
            })?;
        }
        CollectionCommand::Update {
            id,
            name,
            description,
            public,
            collaborative,
            cover_image,
        } => {
            let changes = CollectionUpdate {
                name,
                description,
                is_public: public,
                is_collaborative: collaborative,
                cover_image,
            };

            let collection = store
                .update(&id, changes)
                .await?
                .ok_or_else(|| invalid_input(format!("No collection with id `{}`", id)))?;
            print(json, &collection, || format!("Updated {}", collection.id))?;
        }
        CollectionCommand::Delete { id } => {
            if !store.delete(&id).await? {
                return Err(invalid_input(format!("No collection with id `{}`", id)));
            }
            print(json, &serde_json::json!({ "deleted": &id }), || {
                format!("Deleted {}", id)
            })?;
        }
        CollectionCommand::Items { id } => {
            let items = store.items(&id).await?;
            print(json, &items, || {
                items
                    .iter()
                    .map(|item| format!("{}  {}", item.id, item.bookmark_id))
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }
        CollectionCommand::Add {
            user_id,
            collection_id,
            bookmark_id,
        } => {
            let item = store.add_item(&collection_id, &bookmark_id, &user_id).await?;
            print(json, &item, || {
                format!("Added {} to {} as {}", item.bookmark_id, item.collection_id, item.id)
            })?;
        }
        CollectionCommand::Remove { item_id } => {
            if !store.remove_item(&item_id).await? {
                return Err(invalid_input(format!("No collection item with id `{}`", item_id)));
            }
            print(json, &serde_json::json!({ "removed": &item_id }), || {
                format!("Removed {}", item_id)
            })?;
        }
    }

    Ok(())
}

fn guarded_lookup(config: &Config) -> Result<GuardedLookup<NeynarClient>, Error> {
    Ok(GuardedLookup::new(
        config.neynar()?,
        Arc::new(CircuitBreaker::new("neynar", BREAKER_THRESHOLD, BREAKER_RESET)),
        Arc::new(Semaphore::new(config.concurrency)),
    ))
}

fn importer(
    config: &Config,
    resolver: Resolver,
) -> Result<Importer<GuardedLookup<NeynarClient>, SupabaseBookmarkStore>, Error> {
    Ok(
        Importer::new(resolver, guarded_lookup(config)?, config.supabase()?)
            .with_max_attempts(config.max_lookup_attempts),
    )
}

fn print_outcome(json: bool, outcome: &ImportOutcome) -> Result<(), Error> {
    let bookmark = outcome.saved.bookmark();

    print(json, bookmark, || {
        if outcome.saved.is_new() {
            format!("Saved {} as {}", bookmark.cast_hash, bookmark.id)
        } else {
            format!("Already saved {} as {}", bookmark.cast_hash, bookmark.id)
        }
    })
}

fn print<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<(), Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}
