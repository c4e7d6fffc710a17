mod cli;
mod config;
mod guard;
mod issuer;
mod session;
mod store;
mod token;

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;
use std::rc::Rc;
use store::{DisabledStore, FileStore, MemoryStore, TokenStore};

#[derive(Parser)]
#[command(name = "unihub", about = "UniHub portal session client")]
pub struct Args {
    #[arg(long, env = "UNIHUB_API_URL", help = "Backend API base URL")]
    pub base_url: Option<String>,

    #[arg(long, help = "Config file path")]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "UNIHUB_STORE",
        value_name = "KIND",
        help = "Token store: memory, file, disabled"
    )]
    pub store: Option<String>,

    #[arg(long, env = "UNIHUB_TAB", help = "Tab name; each tab holds its own session")]
    pub tab: Option<String>,

    #[arg(long, conflicts_with = "tab", help = "Open a fresh tab with no session")]
    pub new_tab: bool,

    #[arg(long, help = "Verbose output (log session transitions)")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Log in through the backend
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, help = "lecturer or student")]
        role: String,
        #[arg(
            long,
            env = "UNIHUB_PASSWORD",
            hide_env_values = true,
            help = "Prompted for (without echo) when omitted"
        )]
        password: Option<String>,
    },
    /// Install a token obtained elsewhere
    Token { token: String },
    /// Log out of this tab
    Logout,
    /// Show the current session
    Status,
    /// List navbar entries for the current session
    Nav,
    /// Check access to a route, e.g. /courses
    Check { route: String },
    /// Close this tab, discarding everything it stored
    Close,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let default_filter = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    let mut cfg = if let Some(config_path) = &args.config {
        config::Config::load_from(config_path)?
    } else {
        config::Config::load().unwrap_or_else(|e| {
            log::warn!("ignoring unreadable config: {}", e);
            config::Config::default()
        })
    };

    // CLI and env overrides
    if let Some(url) = &args.base_url {
        cfg.api.base_url = Some(url.clone());
    }
    if let Some(kind_str) = &args.store {
        let kind = config::StoreKind::from_str(kind_str).ok_or_else(|| {
            anyhow::anyhow!(
                "Invalid store: {}. Use: memory, file, disabled",
                kind_str
            )
        })?;
        cfg.store.kind = Some(kind);
    }
    if args.new_tab {
        cfg.store.tab = Some(uuid::Uuid::new_v4().to_string());
    } else if let Some(tab) = &args.tab {
        cfg.store.tab = Some(tab.clone());
    }

    if let Err(errors) = cfg.validate() {
        for e in &errors {
            eprintln!("Config error {}", e);
        }
        return Err(anyhow::anyhow!("Invalid configuration"));
    }

    if let Some(Command::Close) = &args.command {
        if cfg.store_kind() == config::StoreKind::File {
            let tab_store = FileStore::new(&cfg.store_dir(), cfg.tab());
            tab_store.close()?;
            log::debug!("removed {}", tab_store.dir().display());
        }
        println!("Closed tab {}", cfg.tab());
        return Ok(());
    }

    let store: Box<dyn TokenStore> = match cfg.store_kind() {
        config::StoreKind::Memory => Box::new(MemoryStore::new()),
        config::StoreKind::File => Box::new(FileStore::new(&cfg.store_dir(), cfg.tab())),
        config::StoreKind::Disabled => Box::new(DisabledStore),
    };

    let session = Rc::new(session::SessionManager::new(store, cfg.token_key()));
    session.subscribe(|s| log::info!("session changed: {}", s));
    session.bootstrap();

    if args.new_tab {
        println!("Tab: {}", cfg.tab());
    }

    let ctx = cli::Context {
        issuer: Box::new(issuer::HttpIssuer::new(cfg.base_url())),
        config: cfg,
        session,
    };

    match args.command {
        None => cli::run_repl(ctx),
        Some(Command::Login {
            email,
            role,
            password,
        }) => {
            let password = match password {
                Some(p) => p,
                None => cli::prompt_password()?,
            };
            let state = cli::login(&ctx, &email, &password, &role)?;
            cli::print_status(&state);
            Ok(())
        }
        Some(Command::Token { token }) => {
            let state = cli::install_token(&ctx, &token)?;
            cli::print_status(&state);
            Ok(())
        }
        Some(Command::Logout) => {
            ctx.session.logout();
            cli::print_status(&ctx.session.state());
            Ok(())
        }
        Some(Command::Status) => {
            cli::print_status(&ctx.session.state());
            Ok(())
        }
        Some(Command::Nav) => {
            cli::print_nav(&ctx.session.state());
            Ok(())
        }
        Some(Command::Check { route }) => {
            println!("{}", cli::describe_access(&ctx.session.state(), &route)?);
            Ok(())
        }
        Some(Command::Close) => Ok(()),
    }
}
