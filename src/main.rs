use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use std::io::Read;
use std::panic;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use inlyne_client::cli::{self, Cli, Command, LineOutcome};
use inlyne_client::clients::ApiClient;
use inlyne_client::config::Config;
use inlyne_client::models::{ApiError, DocHandle, PermissionUpdate, Redirect};
use inlyne_client::session::{self, SessionContext, SessionStore};
use inlyne_client::sync::{EditingError, EditingSession, EventOutcome, HtmlBuffer};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    let cli = Cli::parse();
    let loaded = Config::load();

    // Logs go to stderr, stdout carries document content
    let fallback = loaded.as_ref().map(Config::log_filter).unwrap_or_else(|_| Config::default().log_filter());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&fallback))
        .unwrap_or_else(|_| EnvFilter::new("inlyne_client=info,inlyne=info,warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut config = loaded.unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });
    if let Some(api_base) = cli.api_base.clone() {
        config.api_base = api_base;
    }
    if let Some(path) = cli.session_file.clone() {
        config.session_file = Some(path);
    }
    info!("Configuration loaded (api: {})", config.api_base);

    if let Err(e) = run(cli.command, config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(command: Command, config: Config) -> anyhow::Result<()> {
    let store = SessionStore::new(config.session_path());
    let mut ctx = store.load()?;
    let api = ApiClient::new(config.api_base.clone(), ctx.usable_token(Utc::now()))?;

    match command {
        Command::Login { email, password, redirect } => {
            let login = api.login(&email, &password).await?;
            match redirect {
                Some(target) if session::is_external_redirect(&target) => {
                    println!("{}", session::login_redirect_url(&target, &login.token, &email));
                }
                _ => {
                    ctx.signed_in(&email, login);
                    let api = api.with_token(ctx.token.clone());
                    if let Ok(docs) = api.list_documents().await {
                        ctx.refresh_docs(&docs);
                    }
                    store.save(&ctx)?;
                    println!("Signed in as {}", email);
                }
            }
        }
        Command::Signup { username, email, password, confirm } => {
            api.signup(&username, &email, &password, &confirm).await?;
            println!("Account created, sign in with `inlyne login {}`", email);
        }
        Command::Logout => {
            store.clear()?;
            println!("Signed out");
        }
        Command::Whoami => whoami(&ctx),
        Command::Profile { username, email, password, confirm } => {
            if let Some(username) = username {
                api.update_username(&username).await?;
            }
            if let Some(new_email) = email {
                api.update_email(&new_email).await?;
                ctx.email = Some(new_email);
                store.save(&ctx)?;
            }
            if let Some(password) = password {
                api.update_password(&password, confirm.as_deref().unwrap_or_default()).await?;
            }
            let profile = api.fetch_profile().await?;
            println!("{} <{}>", profile.username, profile.email);
            if let Some(pfp) = profile.pfp_url {
                println!("avatar: {}", pfp);
            }
        }
        Command::Create => {
            let handle = api.create_document().await?;
            ctx.remember_doc(&handle, None);
            store.save(&ctx)?;
            println!("{}", handle);
        }
        Command::Docs => {
            let docs = api.list_documents().await?;
            ctx.refresh_docs(&docs);
            store.save(&ctx)?;
            for doc in docs {
                println!("{}  {}", doc.doc_key, doc.title.unwrap_or_default());
            }
        }
        Command::Show { doc } => {
            let handle = DocHandle::parse(&doc)?;
            match api.fetch_document(&handle).await {
                Ok(view) => {
                    ctx.remember_doc(&handle, Some(&view.title));
                    store.save(&ctx)?;
                    println!("# {} ({:?})", view.display_title(), view.access_level);
                    println!("{}", view.content);
                }
                Err(e) => report_read_failure(&e),
            }
        }
        Command::Edit { doc } => {
            let handle = DocHandle::parse(&doc)?;
            edit(&config, Arc::new(api), &mut ctx, handle).await?;
            store.save(&ctx)?;
        }
        Command::Save { doc, file } => {
            let handle = DocHandle::parse(&doc)?;
            let content = match file {
                Some(path) => std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            api.save_document(&handle, &content).await?;
            println!("Saved {}", handle);
        }
        Command::Public { doc, public } => {
            let handle = DocHandle::parse(&doc)?;
            let title = match api.fetch_document(&handle).await {
                Ok(view) => view.title,
                Err(e) => {
                    report_read_failure(&e);
                    return Ok(());
                }
            };
            let now_public = api.set_public(&handle, public, &title).await?;
            println!("{} is now {}", handle, if now_public { "public" } else { "private" });
        }
        Command::Share { doc, email, role } => {
            let handle = DocHandle::parse(&doc)?;
            warn_unless_admin(&api, &handle, ctx.email.as_deref()).await;
            api.update_permissions(&handle, vec![PermissionUpdate::grant(email, role.into())]).await?;
            println!("Shared {}", handle);
        }
        Command::Unshare { doc, email, role } => {
            let handle = DocHandle::parse(&doc)?;
            warn_unless_admin(&api, &handle, ctx.email.as_deref()).await;
            api.update_permissions(&handle, vec![PermissionUpdate::revoke(email, role.into())]).await?;
            println!("Updated permissions of {}", handle);
        }
        Command::Rename { doc, title } => {
            let handle = DocHandle::parse(&doc)?;
            api.rename_document(&handle, &title).await?;
            ctx.remember_doc(&handle, Some(&title));
            store.save(&ctx)?;
            println!("Renamed {} to '{}'", handle, title);
        }
    }
    Ok(())
}

/// Live editing loop: stdin lines replace the document, remote updates are printed.
async fn edit(config: &Config, api: Arc<ApiClient>, ctx: &mut SessionContext, handle: DocHandle) -> anyhow::Result<()> {
    let mut session = EditingSession::from_config(config, api, HtmlBuffer::default());
    match session.open(handle.clone()).await {
        Ok(doc) => {
            ctx.remember_doc(&handle, Some(&doc.title));
            println!("# {} ({:?})", doc.display_title(), doc.access_level);
            println!("{}", doc.content);
        }
        Err(EditingError::Api(e)) => {
            report_read_failure(&e);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match cli::apply_edit_line(&mut session, &line).await {
                    LineOutcome::Quit => break,
                    LineOutcome::Continue(Some(message)) => eprintln!("{}", message),
                    LineOutcome::Continue(None) => {}
                }
            }
            event = session.next_event() => {
                let Some(event) = event else { break };
                match session.process(event).await {
                    EventOutcome::Applied => println!("{}", session.html()),
                    EventOutcome::StateChanged(state) => info!("Channel {:?}", state),
                    _ => {}
                }
            }
        }
    }

    session.close();
    Ok(())
}

fn whoami(ctx: &SessionContext) {
    let Some(email) = &ctx.email else {
        println!("Not signed in");
        return;
    };
    println!("{}", email);
    if let Some(claims) = ctx.claims() {
        if let Some(subject) = &claims.sub {
            println!("subject: {}", subject);
        }
        if let Some(exp) = claims.expires_at() {
            let state = if exp <= Utc::now() { "expired" } else { "valid" };
            println!("token {} until {}", state, exp.to_rfc3339());
        }
    }
    for doc in &ctx.recent_docs {
        println!("  {}  {}", doc.doc_key, doc.title.as_deref().unwrap_or_default());
    }
}

/// Permission changes are the owner's and admins' business; say so before trying
async fn warn_unless_admin(api: &ApiClient, handle: &DocHandle, email: Option<&str>) {
    match api.fetch_document(handle).await {
        Ok(view) => {
            if let Some(warning) = view.permission_warning(email) {
                eprintln!("Warning: {}", warning);
            }
        }
        Err(e) => warn!("Could not check permissions on {}: {}", handle, e),
    }
}

fn report_read_failure(e: &ApiError) {
    eprintln!("Cannot open document: {}", e);
    match e.redirect() {
        Redirect::Login => eprintln!("Sign in first: inlyne login <email>"),
        Redirect::DocumentList => eprintln!("See your documents: inlyne docs"),
    }
}
