use std::env;
use std::sync::Arc;

use anyhow::{Result, bail};
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use doclib_client::{
    Config, FeedPhase, LoginOutcome, NavTarget, Navigator, NotificationFeed, SearchResults,
    SessionStore, files, requests, search::SearchAggregator,
};

/// The shell here is a terminal, so "navigation" is just a log line telling
/// the operator where a UI would have gone.
struct PrintNavigator;

impl Navigator for PrintNavigator {
    fn navigate(&self, target: NavTarget) {
        info!(?target, "navigate");
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_tracing();

    if let Err(err) = app_main().await {
        error!(?err, "command failed");
        std::process::exit(1);
    }
}

async fn app_main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        print_usage();
        std::process::exit(2);
    };

    let config = Config::from_env()?;
    let store = SessionStore::new(config.clone(), Arc::new(PrintNavigator));

    match command {
        "login" => {
            let Some(user_id) = args.get(1) else {
                bail!("usage: doclib login <user-id> [password]");
            };
            let password = match args.get(2) {
                Some(password) => password.clone(),
                None => env::var("DOCLIB_PASSWORD")
                    .map_err(|_| anyhow::anyhow!("pass the password as an argument or set DOCLIB_PASSWORD"))?,
            };
            match store.login(user_id, &password).await {
                LoginOutcome::Success { user } => {
                    println!("Signed in as {} ({})", user.name, user.role);
                }
                LoginOutcome::Rejected { message } => bail!(message),
            }
        }
        "logout" => {
            store.logout();
            println!("Signed out.");
        }
        "whoami" => {
            let session = store.restore().await;
            match session.user {
                Some(user) => {
                    println!("{} <{}>", user.name, user.email);
                    println!("role: {}", user.role);
                    if let Some(department) = user.department {
                        println!("department: {department}");
                    }
                }
                None => println!("Not signed in."),
            }
        }
        "notifications" => {
            require_session(&store).await?;
            let watch_mode = args.iter().any(|arg| arg == "--watch");
            show_notifications(&store, watch_mode).await?;
        }
        "read" => {
            let Some(id) = args.get(1) else {
                bail!("usage: doclib read <notification-id>");
            };
            require_session(&store).await?;
            let feed = spawn_ready_feed(&store).await?;
            feed.mark_read(id).await;
            println!("{} unread left", feed.unread_count());
            feed.shutdown();
        }
        "read-all" => {
            require_session(&store).await?;
            let feed = spawn_ready_feed(&store).await?;
            feed.mark_all_read().await;
            println!("All notifications read.");
            feed.shutdown();
        }
        "search" => {
            let Some(query) = args.get(1) else {
                bail!("usage: doclib search <query>");
            };
            require_session(&store).await?;
            let aggregator =
                SearchAggregator::new(store.client(), store.subscribe(), config.search_debounce);
            let results = aggregator.run(query).await;
            print_search_results(&results);
        }
        "files" => {
            require_session(&store).await?;
            let records = files::list(&store.client()).await?;
            if records.is_empty() {
                println!("No files.");
            }
            for record in records {
                let category = record.category.as_deref().unwrap_or("-");
                println!("{}  [{}]  {}", record.id, category, record.title);
            }
        }
        "requests" => {
            require_session(&store).await?;
            let records = requests::list(&store.client()).await?;
            if records.is_empty() {
                println!("No requests.");
            }
            for record in records {
                let title = record.title.as_deref().unwrap_or("(untitled)");
                println!("{}  {}  {}", record.id, record.status, title);
            }
        }
        other => {
            print_usage();
            bail!("unknown command: {other}");
        }
    }

    Ok(())
}

async fn require_session(store: &SessionStore) -> Result<()> {
    let session = store.restore().await;
    if !session.authenticated {
        bail!("not signed in; run `doclib login <user-id>` first");
    }
    Ok(())
}

/// Start the background feed and wait for its first fetch to settle.
async fn spawn_ready_feed(store: &SessionStore) -> Result<NotificationFeed> {
    let feed = NotificationFeed::spawn(
        store.client(),
        store.subscribe(),
        store.client().config().notification_refresh,
    );
    let mut rx = feed.subscribe();
    while rx.borrow().phase != FeedPhase::Ready {
        if rx.changed().await.is_err() {
            bail!("notification feed stopped before it loaded");
        }
    }
    Ok(feed)
}

async fn show_notifications(store: &SessionStore, watch_mode: bool) -> Result<()> {
    let feed = spawn_ready_feed(store).await?;
    print_feed(&feed);

    if watch_mode {
        println!("Watching for changes; press Ctrl-C to stop.");
        let mut rx = feed.subscribe();
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    print_feed(&feed);
                }
            }
        }
    }

    feed.shutdown();
    Ok(())
}

fn print_feed(feed: &NotificationFeed) {
    let state = feed.snapshot();
    println!("-- {} notifications, {} unread --", state.records.len(), state.unread_count());
    for record in &state.records {
        let marker = if record.read { ' ' } else { '*' };
        let title = record.title.as_deref().unwrap_or("");
        if title.is_empty() {
            println!("{marker} {}  {}", record.id, record.message);
        } else {
            println!("{marker} {}  {}: {}", record.id, title, record.message);
        }
    }
}

fn print_search_results(results: &SearchResults) {
    if results.is_empty() {
        println!("No matches for \"{}\".", results.query);
        return;
    }
    if !results.files.is_empty() {
        println!("Files:");
        for file in &results.files {
            println!("  {}  {}", file.id, file.title);
        }
    }
    if !results.requests.is_empty() {
        println!("Requests:");
        for request in &results.requests {
            let title = request.title.as_deref().unwrap_or("(untitled)");
            println!("  {}  {}  {}", request.id, request.status, title);
        }
    }
    if !results.users.is_empty() {
        println!("Users:");
        for user in &results.users {
            println!("  {}  {} <{}>", user.id, user.name, user.email);
        }
    }
}

fn print_usage() {
    eprintln!("usage: doclib <command>");
    eprintln!();
    eprintln!("commands:");
    eprintln!("  login <user-id> [password]   sign in and cache the session");
    eprintln!("  logout                       drop the cached session");
    eprintln!("  whoami                       show the signed-in account");
    eprintln!("  notifications [--watch]      list notifications, optionally live");
    eprintln!("  read <notification-id>       mark one notification read");
    eprintln!("  read-all                     mark every notification read");
    eprintln!("  search <query>               search files, requests and users");
    eprintln!("  files                        list documents");
    eprintln!("  requests                     list borrow requests");
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
