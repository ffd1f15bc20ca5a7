//! Command implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context as _, Result};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::warn;

use fleetcache_core::models::{
    find_parameter, AppParameter, ChatMessage, Contact, Intervention, Record, User, Vehicule,
    SYNCABLE_COLLECTIONS,
};
use fleetcache_core::queue::LOCAL_ID_PREFIX;
use fleetcache_core::utils::{format_bytes, format_date, format_optional, truncate_string};
use fleetcache_core::{
    spawn_background_sync, ApiClient, ApiError, Config, ListQuery, LoadResult, LocalStore,
    MergedLoad, OfflineLoader, RemoteSource, Session, SyncEngine, SyncEvent, SyncTracker,
};

/// Channel capacity for sync progress events
const EVENT_CHANNEL_SIZE: usize = 32;

/// Column width for record descriptions
const DESCRIPTION_WIDTH: usize = 60;

/// Parameter holding the server-side application version
const VERSION_PARAM: &str = "VERSION";

/// One-line rendering of a record for list output
trait Describe {
    fn describe(&self) -> String;
}

impl Describe for Contact {
    fn describe(&self) -> String {
        format!(
            "{}  {}  {}",
            self.display_name(),
            format_optional(&self.email, "-"),
            format_optional(&self.phone, "-"),
        )
    }
}

impl Describe for Vehicule {
    fn describe(&self) -> String {
        match self.mileage {
            Some(km) => format!("{}  {} km", self.label(), km),
            None => self.label(),
        }
    }
}

impl Describe for Intervention {
    fn describe(&self) -> String {
        let date = self.date.as_deref().map(format_date).unwrap_or_else(|| "-".to_string());
        format!(
            "[{}] {}  {}",
            self.status_display(),
            date,
            format_optional(&self.designation, "(no designation)"),
        )
    }
}

impl Describe for User {
    fn describe(&self) -> String {
        format!(
            "{}  {}  {}",
            format_optional(&self.code, "-"),
            self.full_name(),
            format_optional(&self.role, ""),
        )
    }
}

impl Describe for AppParameter {
    fn describe(&self) -> String {
        format!("{} = {}", self.key, format_optional(&self.value, ""))
    }
}

/// Everything a command needs, wired from the config
struct Context {
    config: Config,
    store: Arc<LocalStore>,
    tracker: SyncTracker,
    session: Session,
    client: Arc<ApiClient>,
    loader: OfflineLoader,
    engine: Arc<SyncEngine>,
}

impl Context {
    fn new(config: Config, cache_dir: &Path) -> Result<Self> {
        let store = Arc::new(
            LocalStore::new(cache_dir.join("data")).context("Failed to open local store")?,
        );
        let tracker = SyncTracker::new(Arc::clone(&store), config.storage_quota_bytes);

        let mut session = Session::new(cache_dir.to_path_buf());
        if let Err(e) = session.load() {
            warn!(error = %e, "Ignoring unreadable session");
        }

        let mut client = ApiClient::new(&config.api_base_url)?;
        client.set_session(&session);
        let client = Arc::new(client);
        let remote: Arc<dyn RemoteSource> = client.clone();

        let loader = OfflineLoader::new(Arc::clone(&remote), Arc::clone(&store), tracker.clone())
            .with_forced_offline(config.offline_mode);
        let engine = Arc::new(SyncEngine::new(remote, Arc::clone(&store), tracker.clone()));

        Ok(Self {
            config,
            store,
            tracker,
            session,
            client,
            loader,
            engine,
        })
    }
}

pub async fn run(config: Config, cache_dir: &Path, command: &str, args: &[String]) -> Result<()> {
    // Needs no store or client
    if command == "offline" {
        return set_offline(config, args);
    }

    let ctx = Context::new(config, cache_dir)?;
    match command {
        "list" => list(&ctx, args).await,
        "pending" => pending(&ctx, args.first().map(String::as_str)),
        "new-intervention" => {
            let json = args.first().ok_or_else(|| anyhow!("Usage: new-intervention <json>"))?;
            let intervention: Intervention = parse_json(json)?;
            if intervention.id.is_some() {
                bail!("A new intervention must not carry IDINTER; use `edit interventions` instead");
            }
            let local_id = ctx.engine.queue::<Intervention>().enqueue(intervention)?;
            print_queued(&ctx, &local_id);
            Ok(())
        }
        "edit" => edit(&ctx, args),
        "discard" => discard(&ctx, args),
        "sync" => sync(&ctx).await,
        "status" => {
            status(&ctx);
            Ok(())
        }
        "chat" => chat(&ctx, args).await,
        "instructions" => instructions(&ctx, args).await,
        "params" => params(&ctx).await,
        other => bail!("Unknown command: {} (try --help)", other),
    }
}

fn parse_json<T: DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).context("Invalid record JSON")
}

fn parse_id(arg: Option<&String>, usage: &str) -> Result<i64> {
    let raw = arg.ok_or_else(|| anyhow!("Usage: {}", usage))?;
    raw.parse()
        .with_context(|| format!("Invalid intervention id: {}", raw))
}

/// Value following `flag` in the argument list
fn flag_value(args: &[String], flag: &str) -> Result<Option<u32>> {
    match args.iter().position(|a| a == flag) {
        Some(pos) => {
            let raw = args
                .get(pos + 1)
                .ok_or_else(|| anyhow!("{} needs a value", flag))?;
            let value = raw
                .parse()
                .with_context(|| format!("Invalid value for {}: {}", flag, raw))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

fn print_queued(ctx: &Context, local_id: &str) {
    if ctx.tracker.is_online() {
        println!("Queued {} (run `fleetcache sync` to upload)", local_id);
    } else {
        println!("Queued {} while offline", local_id);
    }
}

// ============================================================================
// Lists
// ============================================================================

async fn list(ctx: &Context, args: &[String]) -> Result<()> {
    let collection = args
        .first()
        .ok_or_else(|| anyhow!("Usage: list <collection> [--page N] [--limit N]"))?;

    let mut query = ListQuery::new();
    if let Some(page) = flag_value(args, "--page")? {
        query = query.page(page);
    }
    if let Some(limit) = flag_value(args, "--limit")? {
        query = query.limit(limit);
    }

    match collection.as_str() {
        "contacts" => list_merged::<Contact>(ctx, &query).await,
        "vehicules" => list_merged::<Vehicule>(ctx, &query).await,
        "interventions" => list_merged::<Intervention>(ctx, &query).await,
        "users" => print_load(ctx.loader.load::<User>(&query).await),
        "paramappli" => print_load(ctx.loader.load::<AppParameter>(&query).await),
        other => bail!("Unknown collection: {}", other),
    }
    Ok(())
}

async fn list_merged<T: Record + Describe>(ctx: &Context, query: &ListQuery) {
    let queue = ctx.engine.queue::<T>();
    let merged: MergedLoad<T> = ctx.loader.load_merged(&queue, query).await;

    print_source_line(merged.offline, merged.cached_at.is_some(), &merged.error);
    if merged.entries.is_empty() {
        println!("(no {})", T::COLLECTION);
    }
    for entry in &merged.entries {
        let marker = match entry.pending_status {
            Some(status) => format!("  <{}>", status),
            None => String::new(),
        };
        println!(
            "{:>10}  {}{}",
            entry.key.to_string(),
            truncate_string(&entry.data.describe(), DESCRIPTION_WIDTH),
            marker
        );
    }
}

fn print_load<T: Describe>(result: LoadResult<T>) {
    print_source_line(result.offline, result.cached_at.is_some(), &result.error);
    if let Some(ref e) = result.error {
        if result.items.is_empty() {
            eprintln!("Error: {}", e);
        }
    }
    for item in &result.items {
        println!("  {}", truncate_string(&item.describe(), DESCRIPTION_WIDTH));
    }
    if result.cached_at.is_some() {
        println!("(cached {})", result.freshness());
    }
}

fn print_source_line(offline: bool, from_cache: bool, error: &Option<String>) {
    if offline {
        if from_cache {
            println!("Offline: showing cached data");
        } else {
            println!("Offline: no cached data");
        }
    } else if let Some(e) = error {
        println!("Server error: {}", e);
    }
}

// ============================================================================
// Pending queue
// ============================================================================

fn not_syncable(name: &str) -> anyhow::Error {
    anyhow!(
        "{} is not a syncable collection (expected one of: {})",
        name,
        SYNCABLE_COLLECTIONS.join(", ")
    )
}

fn pending(ctx: &Context, collection: Option<&str>) -> Result<()> {
    match collection {
        Some(name) => pending_for(ctx, name),
        None => SYNCABLE_COLLECTIONS
            .iter()
            .try_for_each(|name| pending_for(ctx, name)),
    }
}

fn pending_for(ctx: &Context, collection: &str) -> Result<()> {
    match collection {
        "interventions" => print_pending::<Intervention>(ctx),
        "contacts" => print_pending::<Contact>(ctx),
        "vehicules" => print_pending::<Vehicule>(ctx),
        other => Err(not_syncable(other)),
    }
}

fn print_pending<T: Record + Describe>(ctx: &Context) -> Result<()> {
    let records = ctx.engine.queue::<T>().list_pending()?;
    if records.is_empty() {
        return Ok(());
    }
    println!("{} ({})", T::COLLECTION, records.len());
    for record in &records {
        let action = if record.is_update() { "edit" } else { "new" };
        println!(
            "  {:<10} {:<8} {:<4} {}",
            record.local_id,
            record.status.to_string(),
            action,
            truncate_string(&record.payload.describe(), DESCRIPTION_WIDTH)
        );
        if let Some(ref e) = record.last_error {
            println!(
                "             last error after {} attempt(s): {}",
                record.attempts,
                truncate_string(e, DESCRIPTION_WIDTH)
            );
        }
    }
    Ok(())
}

fn edit(ctx: &Context, args: &[String]) -> Result<()> {
    const USAGE: &str = "edit <collection> [local-id] <json>";
    let collection = args.first().ok_or_else(|| anyhow!("Usage: {}", USAGE))?;
    // `edit <collection> local-3 <json>` rewrites a queued record in place
    let (local_id, json) = match (args.get(1), args.get(2)) {
        (Some(id), Some(json)) if id.starts_with(LOCAL_ID_PREFIX) => (Some(id.as_str()), json),
        (Some(json), None) => (None, json),
        _ => bail!("Usage: {}", USAGE),
    };

    match collection.as_str() {
        "interventions" => queue_edit::<Intervention>(ctx, local_id, json),
        "contacts" => queue_edit::<Contact>(ctx, local_id, json),
        "vehicules" => queue_edit::<Vehicule>(ctx, local_id, json),
        other => return Err(not_syncable(other)),
    }
}

fn queue_edit<T: Record>(ctx: &Context, local_id: Option<&str>, json: &str) -> Result<()> {
    let payload: T = parse_json(json)?;
    let queue = ctx.engine.queue::<T>();
    match local_id {
        Some(id) => {
            queue.update(id, payload)?;
            println!("Updated {}", id);
        }
        None => {
            if payload.server_id().is_none() {
                bail!("Edited record must carry its server id");
            }
            let id = queue.enqueue(payload)?;
            print_queued(ctx, &id);
        }
    }
    Ok(())
}

fn discard(ctx: &Context, args: &[String]) -> Result<()> {
    let (Some(collection), Some(local_id)) = (args.first(), args.get(1)) else {
        bail!("Usage: discard <collection> <local-id>");
    };
    match collection.as_str() {
        "interventions" => {
            ctx.engine.queue::<Intervention>().discard(local_id)?;
        }
        "contacts" => {
            ctx.engine.queue::<Contact>().discard(local_id)?;
        }
        "vehicules" => {
            ctx.engine.queue::<Vehicule>().discard(local_id)?;
        }
        other => return Err(not_syncable(other)),
    }
    println!("Discarded {}", local_id);
    Ok(())
}

// ============================================================================
// Sync and status
// ============================================================================

async fn sync(ctx: &Context) -> Result<()> {
    if ctx.config.offline_mode {
        bail!("Offline mode is on; run `fleetcache offline off` first");
    }

    let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
    let handle = spawn_background_sync(Arc::clone(&ctx.engine), tx);

    let mut went_offline = false;
    while let Some(event) = rx.recv().await {
        match event {
            SyncEvent::Uploaded(up) => match up.server_id {
                Some(id) => println!("  {} {} -> #{}", up.collection, up.local_id, id),
                None => println!("  {} {} uploaded", up.collection, up.local_id),
            },
            SyncEvent::Conflict {
                collection,
                local_id,
                message,
            } => println!("  {} {} conflict: {}", collection, local_id, message),
            SyncEvent::Failed {
                collection,
                local_id,
                message,
            } => println!("  {} {} failed: {}", collection, local_id, message),
            SyncEvent::WentOffline => {
                went_offline = true;
                println!("  Server unreachable, sync paused");
            }
            SyncEvent::Complete(report) => {
                println!(
                    "Sync complete: {} uploaded, {} conflict(s), {} failed, {} remaining",
                    report.uploaded.len(),
                    report.conflicts.len(),
                    report.failed.len(),
                    report.remaining
                );
            }
            SyncEvent::Error(e) => bail!("Sync failed: {}", e),
        }
    }
    handle.await.context("Sync task panicked")?;

    if !went_offline {
        refresh_snapshots(ctx).await;
    }
    Ok(())
}

/// Reload the first page of each syncable collection so cached lists
/// reflect what was just uploaded
async fn refresh_snapshots(ctx: &Context) {
    let query = ListQuery::new();
    let (interventions, contacts, vehicules) = futures::join!(
        ctx.loader.load::<Intervention>(&query),
        ctx.loader.load::<Contact>(&query),
        ctx.loader.load::<Vehicule>(&query),
    );
    for (collection, error) in [
        (Intervention::COLLECTION, interventions.error),
        (Contact::COLLECTION, contacts.error),
        (Vehicule::COLLECTION, vehicules.error),
    ] {
        if let Some(e) = error {
            warn!(collection, error = %e, "Refresh after sync failed");
        }
    }
}

fn status(ctx: &Context) {
    let status = ctx.tracker.status();
    println!("{}", status.summary());
    println!(
        "Server: {}{}",
        ctx.config.api_base_url,
        if ctx.config.offline_mode { " (offline mode)" } else { "" }
    );
    match ctx.session.username() {
        Some(user) => println!("Session: {}", user),
        None if ctx.session.cookie().is_some() => println!("Session: present"),
        None => println!("Session: none"),
    }
    println!("Store: {} ({})", ctx.store.dir().display(), format_bytes(status.storage_used_bytes));

    let ages = ctx.store.snapshot_ages();
    if !ages.is_empty() {
        println!("Cached lists:");
        for (key, age) in ages {
            println!("  {:<40} {}", key, age);
        }
    }
}

fn set_offline(mut config: Config, args: &[String]) -> Result<()> {
    config.offline_mode = match args.first().map(String::as_str) {
        Some("on") => true,
        Some("off") => false,
        _ => bail!("Usage: offline on|off"),
    };
    config.save().context("Failed to save config")?;
    println!(
        "Offline mode {}",
        if config.offline_mode { "enabled" } else { "disabled" }
    );
    Ok(())
}

// ============================================================================
// Intervention details and parameters
// ============================================================================

/// Only forced offline mode stops a post; the saved connectivity flag may
/// be stale, so the request itself decides
fn check_can_post(config: &Config) -> Result<()> {
    if config.offline_mode {
        bail!("Offline mode is on; run `fleetcache offline off` to post messages");
    }
    Ok(())
}

fn note_outcome<T>(tracker: &SyncTracker, result: &Result<T, ApiError>) {
    match result {
        Err(e) if e.is_network_failure() => tracker.record_offline(),
        _ => tracker.record_online(),
    }
}

async fn chat(ctx: &Context, args: &[String]) -> Result<()> {
    let id = parse_id(args.first(), "chat <intervention-id> [message]")?;

    if let Some(text) = args.get(1) {
        check_can_post(&ctx.config)?;
        let message = ChatMessage {
            message: text.clone(),
            user_code: ctx
                .session
                .username()
                .map(str::to_string)
                .or_else(|| ctx.config.last_username.clone()),
            ..Default::default()
        };
        let result = ctx.client.post_chat_message(id, &message).await;
        note_outcome(&ctx.tracker, &result);
        result.context("Failed to post message")?;
    }

    let result = ctx.loader.load_chat(id).await;
    print_source_line(result.offline, result.cached_at.is_some(), &result.error);
    for msg in &result.items {
        let when = msg.sent_at.as_deref().map(format_date).unwrap_or_default();
        println!(
            "{:<10} {:<8} {}",
            when,
            format_optional(&msg.user_code, "?"),
            msg.message
        );
    }
    Ok(())
}

async fn instructions(ctx: &Context, args: &[String]) -> Result<()> {
    let id = parse_id(args.first(), "instructions <intervention-id>")?;
    let result = ctx.loader.load_instructions(id).await;
    print_source_line(result.offline, result.cached_at.is_some(), &result.error);

    let mut items = result.items;
    items.sort_by_key(|i| i.position.unwrap_or(i32::MAX));
    for item in &items {
        println!("  [{}] {}", if item.done { "x" } else { " " }, item.label);
    }
    Ok(())
}

async fn params(ctx: &Context) -> Result<()> {
    let result = ctx.loader.load::<AppParameter>(&ListQuery::new()).await;
    if let Some(version) = find_parameter(&result.items, VERSION_PARAM) {
        println!("Server version: {}", version);
    }
    print_load(result);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_flag_value() {
        let a = args(&["interventions", "--page", "2", "--limit", "20"]);
        assert_eq!(flag_value(&a, "--page").unwrap(), Some(2));
        assert_eq!(flag_value(&a, "--limit").unwrap(), Some(20));
        assert_eq!(flag_value(&a, "--other").unwrap(), None);
        assert!(flag_value(&args(&["--page"]), "--page").is_err());
        assert!(flag_value(&args(&["--page", "two"]), "--page").is_err());
    }

    #[test]
    fn test_intervention_description() {
        let inter: Intervention = serde_json::from_str(
            r#"{"IDINTER": 7, "ST_INTER": "EN COURS", "DT_INTER": "2024-03-05", "DESIGNATION": "Vidange"}"#,
        )
        .unwrap();
        assert_eq!(inter.describe(), "[EN COURS] 05/03/2024  Vidange");
    }

    #[test]
    fn test_unknown_collection_lists_syncable_ones() {
        let message = not_syncable("users").to_string();
        assert_eq!(
            message,
            "users is not a syncable collection (expected one of: interventions, contacts, vehicules)"
        );
    }

    #[test]
    fn test_stale_offline_flag_does_not_block_posting() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalStore::new(dir.path().to_path_buf()).unwrap());
        let tracker = SyncTracker::new(store, 1024);
        tracker.record_offline();

        assert!(check_can_post(&Config::default()).is_ok());
        let forced = Config {
            offline_mode: true,
            ..Default::default()
        };
        assert!(check_can_post(&forced).is_err());

        note_outcome(&tracker, &Ok::<(), ApiError>(()));
        assert!(tracker.is_online());
        note_outcome(&tracker, &Err::<(), _>(ApiError::Offline));
        assert!(!tracker.is_online());
        note_outcome(&tracker, &Err::<(), _>(ApiError::ServerError("boom".to_string())));
        assert!(tracker.is_online());
    }

    #[test]
    fn test_parameter_description() {
        let param = AppParameter {
            key: "VERSION".to_string(),
            value: Some("2.4".to_string()),
            ..Default::default()
        };
        assert_eq!(param.describe(), "VERSION = 2.4");
    }
}
